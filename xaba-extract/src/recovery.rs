//! Heuristic salvage for files the canonical store parser rejects.
//!
//! Best-effort recovery, not faithful reconstruction: a ladder of passes
//! runs in priority order and the first pass that yields at least one
//! acceptable assembly wins. Output carries no manifest names; the
//! orchestrator numbers the images in traversal order.

use flate2::read::{GzDecoder, ZlibDecoder};
use std::io::{Cursor, Read};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::manifest::Manifest;
use crate::pe::{self, METADATA_MAGIC, find_subslice};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZLIB_MAGICS: [[u8; 2]; 2] = [[0x78, 0x9c], [0x78, 0xda]];
const LZ4_FRAME_MAGIC: [u8; 4] = [0x04, 0x22, 0x4d, 0x18];
const ZIP_LOCAL_HEADER: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// Header lengths probed by the manifest-guided pass.
const HEADER_SKIPS: [usize; 7] = [0, 4, 8, 16, 32, 64, 128];

/// Boundary slices below this length are noise.
const MIN_SLICE_LEN: usize = 512;

/// How far a metadata magic is walked back to the nearest `MZ`.
const METADATA_BACKSCAN: usize = 1024;

/// How far a diagnostic string is walked back to the nearest `MZ`.
const KEYWORD_BACKSCAN: usize = 2048;

const KEYWORDS: [&[u8]; 5] = [
    b"System.Runtime",
    b"System.Collections",
    b"mscorlib",
    b".NETFramework",
    b".NETCoreApp",
];

/// Run the salvage ladder over a rejected file's bytes.
///
/// Returns acceptable assembly images in boundary order, low offset
/// first. An empty result means nothing was salvageable.
pub fn scan(data: &[u8], manifest: &Manifest) -> Vec<Vec<u8>> {
    if let Some(found) = guided_slices(data, manifest) {
        info!("Recovery: manifest-guided slicing yielded {} assemblies", found.len());
        return found;
    }
    if let Some(found) = compressed_sweep(data) {
        info!("Recovery: compressed-container sweep yielded {} assemblies", found.len());
        return found;
    }
    if let Some(found) = zip_sweep(data) {
        info!("Recovery: embedded archive yielded {} assemblies", found.len());
        return found;
    }

    let found = boundary_slices(data);
    info!("Recovery: boundary slicing yielded {} assemblies", found.len());
    found
}

/// Recovery acceptance: canonical validation, or the weak path for
/// images whose optional header did not survive.
fn accept(slice: &[u8]) -> bool {
    pe::is_valid_assembly(slice) || pe::is_probable_assembly(slice)
}

/// Trim any leading bytes before the first `MZ` pair.
fn trim_to_mz(slice: &[u8]) -> Option<&[u8]> {
    find_subslice(slice, b"MZ").map(|k| &slice[k..])
}

/// Pass (a): slice consecutive runs of the manifest's recorded sizes,
/// probing a handful of candidate header lengths.
fn guided_slices(data: &[u8], manifest: &Manifest) -> Option<Vec<Vec<u8>>> {
    let Some(sizes) = manifest.sizes() else {
        debug!("Recovery: manifest carries no sizes, skipping guided pass");
        return None;
    };

    for skip in HEADER_SKIPS {
        let mut offset = skip;
        let mut found = Vec::new();

        for &size in &sizes {
            let size = size as usize;
            let Some(end) = offset.checked_add(size).filter(|&e| e <= data.len()) else {
                break;
            };
            if let Some(image) = trim_to_mz(&data[offset..end]).filter(|s| accept(s)) {
                found.push(image.to_vec());
            }
            offset = end;
        }

        if !found.is_empty() {
            debug!("Recovery: header skip {skip} produced {} images", found.len());
            return Some(found);
        }
    }

    None
}

/// Pass (b): find the first compressed-stream signature and inflate the
/// remainder, then boundary-slice the decompressed bytes.
fn compressed_sweep(data: &[u8]) -> Option<Vec<Vec<u8>>> {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Codec {
        Gzip,
        Zlib,
        Lz4Frame,
    }

    let mut earliest: Option<(usize, Codec)> = None;
    let mut note = |offset: Option<usize>, codec: Codec| {
        if let Some(offset) = offset
            && earliest.is_none_or(|(best, _)| offset < best)
        {
            earliest = Some((offset, codec));
        }
    };

    note(find_subslice(data, &GZIP_MAGIC), Codec::Gzip);
    for magic in &ZLIB_MAGICS {
        note(find_subslice(data, magic), Codec::Zlib);
    }
    note(find_subslice(data, &LZ4_FRAME_MAGIC), Codec::Lz4Frame);

    let (offset, codec) = earliest?;
    debug!("Recovery: {codec:?} signature at offset {offset:#x}");

    let inflated = match codec {
        Codec::Gzip => {
            let mut out = Vec::new();
            GzDecoder::new(&data[offset..]).read_to_end(&mut out).ok()?;
            out
        }
        Codec::Zlib => {
            let mut out = Vec::new();
            ZlibDecoder::new(&data[offset..]).read_to_end(&mut out).ok()?;
            out
        }
        Codec::Lz4Frame => {
            warn!("Recovery: LZ4 frame at {offset:#x} is not supported, skipping sweep");
            return None;
        }
    };

    let found = boundary_slices(&inflated);
    (!found.is_empty()).then_some(found)
}

/// Pass (c): open an embedded ZIP archive and pull out `.dll` entries.
fn zip_sweep(data: &[u8]) -> Option<Vec<Vec<u8>>> {
    let offset = find_subslice(data, &ZIP_LOCAL_HEADER)?;
    debug!("Recovery: ZIP local header at offset {offset:#x}");

    let mut archive = match ZipArchive::new(Cursor::new(&data[offset..])) {
        Ok(archive) => archive,
        Err(e) => {
            warn!("Recovery: embedded ZIP did not open: {e}");
            return None;
        }
    };

    let mut found = Vec::new();
    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Recovery: ZIP entry {i} unreadable: {e}");
                continue;
            }
        };
        if !entry.name().to_ascii_lowercase().ends_with(".dll") {
            continue;
        }

        let mut bytes = Vec::new();
        if let Err(e) = entry.read_to_end(&mut bytes) {
            warn!("Recovery: ZIP entry {:?} unreadable: {e}", entry.name());
            continue;
        }
        if accept(&bytes) {
            found.push(bytes);
        }
    }

    (!found.is_empty()).then_some(found)
}

/// Pass (d): slice between candidate image boundaries.
fn boundary_slices(data: &[u8]) -> Vec<Vec<u8>> {
    let mut boundaries = find_all(data, b"MZ");

    for pos in find_all(data, METADATA_MAGIC) {
        if let Some(mz) = backscan_to_mz(data, pos, METADATA_BACKSCAN) {
            boundaries.push(mz);
        }
    }
    for keyword in KEYWORDS {
        for pos in find_all(data, keyword) {
            if let Some(mz) = backscan_to_mz(data, pos, KEYWORD_BACKSCAN) {
                boundaries.push(mz);
            }
        }
    }

    // The three sources overlap heavily; duplicates would make the
    // emitted counter skip values.
    boundaries.sort_unstable();
    boundaries.dedup();
    debug!("Recovery: {} candidate boundaries", boundaries.len());

    let mut found = Vec::new();
    for (i, &start) in boundaries.iter().enumerate() {
        let end = boundaries.get(i + 1).copied().unwrap_or(data.len());
        let slice = &data[start..end];
        if slice.len() < MIN_SLICE_LEN {
            continue;
        }

        match trim_to_mz(slice).filter(|s| accept(s)) {
            Some(image) => found.push(image.to_vec()),
            None => debug!(
                "Recovery: slice at {start:#x} rejected, starts {}",
                hex::encode(&slice[..slice.len().min(8)])
            ),
        }
    }
    found
}

/// Every occurrence of `needle`, by straight index scan.
fn find_all(data: &[u8], needle: &[u8]) -> Vec<usize> {
    let mut hits = Vec::new();
    if needle.is_empty() || data.len() < needle.len() {
        return hits;
    }
    for i in 0..=data.len() - needle.len() {
        if &data[i..i + needle.len()] == needle {
            hits.push(i);
        }
    }
    hits
}

/// Nearest `MZ` at or before `from`, within `window` bytes.
fn backscan_to_mz(data: &[u8], from: usize, window: usize) -> Option<usize> {
    let floor = from.saturating_sub(window);
    (floor..=from.min(data.len().saturating_sub(2)))
        .rev()
        .find(|&i| data[i..i + 2] == *b"MZ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::testimage::marked_assembly;
    use flate2::{Compression, write::ZlibEncoder};
    use std::io::Write;

    fn manifestless() -> Manifest {
        Manifest::default()
    }

    /// A marked image padded past the minimum boundary-slice length.
    fn sliceable_assembly() -> Vec<u8> {
        let mut image = marked_assembly();
        image.resize(600, 0);
        image
    }

    #[test]
    fn test_boundary_slicing_two_images() {
        let image = sliceable_assembly();
        let mut blob = b"QQQQ-not-a-store".to_vec();
        blob.extend_from_slice(&image);
        blob.extend(std::iter::repeat_n(0u8, 256));
        blob.extend_from_slice(&image);

        let found = scan(&blob, &manifestless());
        assert_eq!(found.len(), 2);
        // The first slice runs up to the next boundary, padding included
        assert!(found[0].starts_with(&image));
        assert_eq!(found[0].len(), image.len() + 256);
        assert_eq!(found[1], image);
    }

    #[test]
    fn test_boundaries_deduplicate() {
        // One image whose body contains BSJB and mscorlib: three boundary
        // sources, one slice
        let mut image = sliceable_assembly();
        image.extend_from_slice(b"mscorlib");
        let mut blob = vec![0u8; 16];
        blob.extend_from_slice(&image);

        let found = scan(&blob, &manifestless());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], image);
    }

    #[test]
    fn test_short_slices_skipped() {
        // An MZ pair with nothing behind it
        let mut blob = vec![0u8; 64];
        blob.extend_from_slice(b"MZ");
        blob.extend(std::iter::repeat_n(0u8, 100));

        assert!(scan(&blob, &manifestless()).is_empty());
    }

    #[test]
    fn test_zlib_container() {
        let inner = sliceable_assembly();

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&inner).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut blob = b"JUNK-prefi_".to_vec();
        blob.extend_from_slice(&compressed);

        let found = scan(&blob, &manifestless());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], inner);
    }

    #[test]
    fn test_embedded_zip() {
        let image = marked_assembly();

        let mut zip_bytes = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut zip_bytes));
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            writer.start_file("lib/Extracted.DLL", options).unwrap();
            writer.write_all(&image).unwrap();
            writer.start_file("readme.txt", options).unwrap();
            writer.write_all(b"not an assembly").unwrap();
            writer.finish().unwrap();
        }

        let mut blob = b"prefix".to_vec();
        blob.extend_from_slice(&zip_bytes);

        let found = scan(&blob, &manifestless());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], image);
    }

    #[test]
    fn test_guided_slicing_with_exact_sizes() {
        let image = marked_assembly();
        let manifest = Manifest::parse(&format!(
            r#"{{ "Assemblies": [ {{ "Name": "A", "Size": {0} }}, {{ "Name": "B", "Size": {0} }} ] }}"#,
            image.len()
        ));

        let mut blob = image.clone();
        blob.extend_from_slice(&image);

        let found = scan(&blob, &manifest);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], image);
        assert_eq!(found[1], image);
    }

    #[test]
    fn test_lz4_frame_is_a_no_op() {
        let mut blob = LZ4_FRAME_MAGIC.to_vec();
        blob.extend(std::iter::repeat_n(0u8, 64));

        assert!(scan(&blob, &manifestless()).is_empty());
    }

    #[test]
    fn test_backscan() {
        let mut data = vec![0u8; 300];
        data[100] = b'M';
        data[101] = b'Z';
        assert_eq!(backscan_to_mz(&data, 250, 1024), Some(100));
        assert_eq!(backscan_to_mz(&data, 250, 100), None);
        assert_eq!(backscan_to_mz(&data, 50, 1024), None);
    }
}
