//! Structural PE/CLI image validation and repair.
//!
//! A candidate assembly is judged valid purely by byte inspection: DOS
//! stub, PE signature offset, and a nonzero CLI runtime header directory
//! entry. Nothing here loads or executes managed code.
//!
//! The repair pass fixes the two corruptions that show up in practice:
//! leading junk before the DOS stub, and a miscopied PE-offset field at
//! 0x3C.

use tracing::{debug, trace};

/// Minimum plausible image length.
pub const MIN_IMAGE_LEN: usize = 128;

const DOS_MAGIC: [u8; 2] = *b"MZ";
const PE_SIGNATURE: [u8; 2] = *b"PE";

/// Offset of the little-endian PE-offset field in the DOS header.
const PE_OFFSET_FIELD: usize = 0x3c;

/// CLI runtime header directory entry, relative to the PE signature
/// (PE32 optional header, data directory 14).
const CLI_DIRECTORY_RVA: usize = 232;
const CLI_DIRECTORY_SIZE: usize = 236;

/// The directory entry is only probed when this much of the headers fits.
const CLI_DIRECTORY_PROBE_LEN: usize = 248;

/// Window scanned for an interior `MZ` during repair.
const LEADING_JUNK_WINDOW: usize = 1024;

/// Range scanned in 4-byte strides for a misplaced PE signature.
const PE_PATCH_SCAN_START: usize = 0x40;
const PE_PATCH_SCAN_END: usize = 0x200;

/// Magic of the CLI metadata root.
pub(crate) const METADATA_MAGIC: &[u8] = b"BSJB";

/// Strings whose presence marks a probable managed image.
const WEAK_MARKERS: [&[u8]; 3] = [METADATA_MAGIC, b"System.", b"mscorlib"];

fn read_u32_at(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    let mut b = [0u8; 4];
    b.copy_from_slice(bytes);
    Some(u32::from_le_bytes(b))
}

/// First occurrence of `needle` in `haystack`, by straight index scan.
pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// DOS stub and PE signature checks shared by both validation paths.
fn has_pe_headers(data: &[u8]) -> bool {
    if data.len() < MIN_IMAGE_LEN || data[..2] != DOS_MAGIC {
        return false;
    }
    let Some(pe_offset) = read_u32_at(data, PE_OFFSET_FIELD) else {
        return false;
    };
    let pe_offset = pe_offset as usize;
    if pe_offset > data.len() - 4 {
        return false;
    }
    data[pe_offset..pe_offset + 2] == PE_SIGNATURE
}

/// Canonical validation: PE headers plus a strictly positive CLI runtime
/// header directory entry (when enough of the optional header is present
/// to read it).
pub fn is_valid_assembly(data: &[u8]) -> bool {
    if !has_pe_headers(data) {
        return false;
    }
    // has_pe_headers established that this read succeeds
    let Some(pe_offset) = read_u32_at(data, PE_OFFSET_FIELD) else {
        return false;
    };
    let pe_offset = pe_offset as usize;

    if pe_offset + CLI_DIRECTORY_PROBE_LEN <= data.len() {
        let rva = read_u32_at(data, pe_offset + CLI_DIRECTORY_RVA);
        let size = read_u32_at(data, pe_offset + CLI_DIRECTORY_SIZE);
        matches!((rva, size), (Some(r), Some(s)) if r > 0 && s > 0)
    } else {
        true
    }
}

/// Weak validation for recovery output: PE headers plus one of the
/// well-known in-file magic strings. Never sufficient for the canonical
/// extraction path.
pub fn is_probable_assembly(data: &[u8]) -> bool {
    has_pe_headers(data)
        && WEAK_MARKERS
            .iter()
            .any(|marker| find_subslice(data, marker).is_some())
}

/// Attempt a single structural repair of a rejected image.
///
/// Either strips leading junk before an interior `MZ` in the first 1 KiB,
/// or patches an out-of-range PE-offset field by scanning for the real
/// signature. Returns the repaired bytes only if they then validate.
pub fn repair(data: &[u8]) -> Option<Vec<u8>> {
    let window = &data[..data.len().min(LEADING_JUNK_WINDOW)];
    match find_subslice(window, &DOS_MAGIC) {
        Some(k) if k > 0 => {
            trace!("Repair: stripping {k} bytes of leading junk");
            let trimmed = data[k..].to_vec();
            return is_valid_assembly(&trimmed).then_some(trimmed);
        }
        Some(_) => {}
        None => return None,
    }

    // MZ is at offset 0; only a bogus PE-offset field is repairable
    let pe_offset = read_u32_at(data, PE_OFFSET_FIELD)? as usize;
    if pe_offset <= data.len().saturating_sub(4) {
        return None;
    }

    let scan_end = PE_PATCH_SCAN_END.min(data.len().saturating_sub(2));
    for i in (PE_PATCH_SCAN_START..scan_end).step_by(4) {
        if data[i..i + 2] == PE_SIGNATURE {
            debug!("Repair: patching PE-offset field {pe_offset:#x} -> {i:#x}");
            let mut patched = data.to_vec();
            patched[PE_OFFSET_FIELD..PE_OFFSET_FIELD + 4]
                .copy_from_slice(&(i as u32).to_le_bytes());
            return is_valid_assembly(&patched).then_some(patched);
        }
    }

    None
}
