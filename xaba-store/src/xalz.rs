//! XALZ compression envelope handling.
//!
//! Individual assembly payloads may be wrapped in a fixed 12-byte header
//! (magic, descriptor index, declared uncompressed size) followed by a
//! single raw LZ4 block. This is not a framed LZ4 stream.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use tracing::{debug, trace};

use crate::{Error, Result};

/// Magic bytes of a compressed payload envelope.
pub const XALZ_MAGIC: [u8; 4] = *b"XALZ";

/// Fixed envelope header length: magic + descriptor index + declared size.
pub const ENVELOPE_HEADER_LEN: usize = 12;

/// Default ceiling on the declared uncompressed size.
pub const DEFAULT_MAX_UNCOMPRESSED: usize = 64 * 1024 * 1024;

/// `true` if `data` starts with the XALZ magic.
pub fn is_wrapped(data: &[u8]) -> bool {
    data.len() >= XALZ_MAGIC.len() && data[..XALZ_MAGIC.len()] == XALZ_MAGIC
}

/// Unwrap an XALZ envelope with the default size ceiling.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    decompress_with_limit(data, DEFAULT_MAX_UNCOMPRESSED)
}

/// Unwrap an XALZ envelope, decoding the trailing LZ4 block to exactly the
/// declared uncompressed size.
///
/// # Errors
///
/// The envelope being shorter than 12 bytes, a declared size above
/// `max_size`, or the block decoding to any length other than the declared
/// one are all fatal for this payload.
pub fn decompress_with_limit(data: &[u8], max_size: usize) -> Result<Vec<u8>> {
    if data.len() < ENVELOPE_HEADER_LEN {
        return Err(Error::EnvelopeTooShort(data.len()));
    }
    if !is_wrapped(data) {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&data[..4]);
        return Err(Error::InvalidEnvelopeMagic(magic));
    }

    let mut cursor = Cursor::new(&data[4..ENVELOPE_HEADER_LEN]);
    let descriptor_index = cursor.read_u32::<LittleEndian>()?;
    let declared = cursor.read_u32::<LittleEndian>()? as usize;
    trace!("XALZ envelope: descriptor index {descriptor_index}, declared size {declared}");

    if declared > max_size {
        return Err(Error::SizeCeilingExceeded {
            declared,
            max: max_size,
        });
    }

    let block = &data[ENVELOPE_HEADER_LEN..];
    let result = lz4_flex::decompress(block, declared)
        .map_err(|e| Error::DecompressionFailed(format!("LZ4 block decode failed: {e}")))?;

    if result.len() != declared {
        return Err(Error::SizeMismatch {
            declared,
            actual: result.len(),
        });
    }

    debug!("XALZ: {} bytes -> {} bytes", data.len(), result.len());
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&XALZ_MAGIC);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&lz4_flex::compress(payload));
        out
    }

    #[test]
    fn test_round_trip() {
        let payload = b"MZ-this is a fake assembly image with some repetition repetition";
        let envelope = wrap(payload);

        assert!(is_wrapped(&envelope));
        assert_eq!(decompress(&envelope).unwrap(), payload);
    }

    #[test]
    fn test_round_trip_empty() {
        let envelope = wrap(b"");
        assert_eq!(decompress(&envelope).unwrap(), b"");
    }

    #[test]
    fn test_envelope_too_short() {
        let err = decompress(b"XALZ\x00\x00\x00").unwrap_err();
        assert!(matches!(err, Error::EnvelopeTooShort(7)));
    }

    #[test]
    fn test_wrong_magic() {
        let mut envelope = wrap(b"data");
        envelope[..4].copy_from_slice(b"LZ4F");
        assert!(!is_wrapped(&envelope));

        let err = decompress(&envelope).unwrap_err();
        assert!(matches!(err, Error::InvalidEnvelopeMagic(_)));
    }

    #[test]
    fn test_declared_size_over_ceiling() {
        let envelope = wrap(b"tiny");
        let err = decompress_with_limit(&envelope, 3).unwrap_err();
        assert!(matches!(
            err,
            Error::SizeCeilingExceeded {
                declared: 4,
                max: 3,
            }
        ));
    }

    #[test]
    fn test_declared_size_mismatch() {
        let mut envelope = wrap(b"exactly-sixteen!");
        // Lie about the uncompressed size
        envelope[8..12].copy_from_slice(&99u32.to_le_bytes());

        let err = decompress(&envelope).unwrap_err();
        assert!(
            matches!(
                err,
                Error::DecompressionFailed(_) | Error::SizeMismatch { .. }
            ),
            "actual error: {err:?}",
        );
    }
}
