//! Store extraction pipeline.
//!
//! The orchestrator is the sole writer: per descriptor it resolves the
//! manifest name, slices the payload, unwraps the XALZ envelope, runs the
//! validator (with one repair attempt), and emits the named DLL. Files the
//! validator still rejects land under `invalid/` for forensic inspection
//! instead of being dropped.
//!
//! Failures are contained at the descriptor level; a bad entry never
//! stops the rest of the store.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};
use xaba_store::{AssemblyStore, StoreKind, xalz};

use crate::manifest::Manifest;
use crate::{Error, Result, pe, recovery};

/// Subdirectory receiving files that fail validation after repair.
const INVALID_DIR: &str = "invalid";

/// Counters for one store (or one whole run when merged).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractStats {
    /// Canonical emissions that passed validation (repaired or not).
    pub extracted: usize,
    /// Emissions routed to `invalid/`.
    pub invalid: usize,
    /// Descriptors skipped: missing manifest row, bad bounds, or a
    /// payload that would not decompress.
    pub skipped: usize,
    /// Images salvaged by the recovery scanner.
    pub recovered: usize,
}

impl ExtractStats {
    /// Fold another store's counters into this one.
    pub fn merge(&mut self, other: &ExtractStats) {
        self.extracted += other.extracted;
        self.invalid += other.invalid;
        self.skipped += other.skipped;
        self.recovered += other.recovered;
    }

    /// Total files written to disk.
    pub fn emitted(&self) -> usize {
        self.extracted + self.invalid + self.recovered
    }
}

/// Process one store file end to end.
///
/// Canonical parsing first; a file without the store magic goes to the
/// recovery scanner instead. Output lands under
/// `<output_root>/<store file stem>/`.
///
/// # Errors
///
/// IO failures (unreadable input, unwritable output root) and malformed
/// stores (unsupported version, truncation) surface as errors; callers
/// log them and move on to the next store. A missing magic is not an
/// error here, it reroutes to recovery.
pub fn process_store_file(
    path: &Path,
    kind: StoreKind,
    manifest: &Manifest,
    output_root: &Path,
) -> Result<ExtractStats> {
    let store_name = file_stem(path);
    info!("Processing store {:?} ({kind:?})", path);

    let data = std::fs::read(path)?;
    match AssemblyStore::parse(data, kind) {
        Ok(store) => extract_store(&store, manifest, output_root, &store_name),
        Err(xaba_store::Error::NotAnAssemblyStore(magic)) => {
            warn!(
                "{:?} is not an AssemblyStore (magic {:02x?}), trying recovery",
                path, magic
            );
            let data = std::fs::read(path)?;
            recover_file(&data, manifest, output_root, &store_name)
        }
        Err(e) => Err(e.into()),
    }
}

/// Extract every descriptor of a parsed store.
pub fn extract_store(
    store: &AssemblyStore,
    manifest: &Manifest,
    output_root: &Path,
    store_name: &str,
) -> Result<ExtractStats> {
    let out_dir = output_root.join(store_name);
    let store_id = store.store_id();
    let mut stats = ExtractStats::default();

    check_hash_tables(store);

    for index in 0..store.entry_count() {
        let Some(entry) = manifest.get(store_id, index as u32) else {
            warn!("Store {store_id} entry {index} has no manifest row, skipping");
            stats.skipped += 1;
            continue;
        };

        let raw = match store.entry_data(index) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Store {store_id} entry {index} ({}): {e}", entry.name);
                stats.skipped += 1;
                continue;
            }
        };
        if raw.is_empty() {
            warn!("Store {store_id} entry {index} ({}) is empty, skipping", entry.name);
            stats.skipped += 1;
            continue;
        }

        if let Ok(Some(debug_region)) = store.debug_data(index) {
            debug!("Entry {} carries {} bytes of debug data", entry.name, debug_region.len());
        }
        if let Ok(Some(config_region)) = store.config_data(index) {
            debug!("Entry {} carries {} bytes of config data", entry.name, config_region.len());
        }

        let payload: Cow<'_, [u8]> = if xalz::is_wrapped(raw) {
            match xalz::decompress(raw) {
                Ok(bytes) => Cow::Owned(bytes),
                Err(e) => {
                    error!("Store {store_id} entry {index} ({}): {e}", entry.name);
                    stats.skipped += 1;
                    continue;
                }
            }
        } else {
            Cow::Borrowed(raw)
        };

        let file_name = assembly_file_name(&entry.name);
        if pe::is_valid_assembly(&payload) {
            write_assembly(&out_dir, &file_name, &payload)?;
            stats.extracted += 1;
            continue;
        }

        match pe::repair(&payload) {
            Some(repaired) => {
                info!("Repaired {} after validation failure", entry.name);
                write_assembly(&out_dir, &file_name, &repaired)?;
                stats.extracted += 1;
            }
            None => {
                warn!(
                    "{} failed validation (starts {}), emitting under {INVALID_DIR}/",
                    entry.name,
                    hex::encode(&payload[..payload.len().min(8)])
                );
                write_assembly(&out_dir.join(INVALID_DIR), &file_name, &payload)?;
                stats.invalid += 1;
            }
        }
    }

    info!(
        "Store {store_name}: {} extracted, {} invalid, {} skipped",
        stats.extracted, stats.invalid, stats.skipped
    );
    Ok(stats)
}

/// Salvage a file the canonical parser rejected and emit anonymously
/// numbered images in boundary order.
pub fn recover_file(
    data: &[u8],
    manifest: &Manifest,
    output_root: &Path,
    store_name: &str,
) -> Result<ExtractStats> {
    let images = recovery::scan(data, manifest);
    let out_dir = output_root.join(store_name);
    let mut stats = ExtractStats::default();

    for (counter, image) in images.iter().enumerate() {
        let file_name = format!("{store_name}_assembly_{counter:03}.dll");
        write_assembly(&out_dir, &file_name, image)?;
        stats.recovered += 1;
    }

    if stats.recovered == 0 {
        warn!("Recovery salvaged nothing from {store_name}");
    }
    Ok(stats)
}

/// Primary-store hash tables are diagnostic only; mismatched store ids
/// usually mean the manifest and blobs come from different builds.
fn check_hash_tables(store: &AssemblyStore) {
    let store_id = store.store_id();
    let mismatched = store
        .hash32_entries()
        .iter()
        .map(|e| e.store_id)
        .chain(store.hash64_entries().iter().map(|e| e.store_id))
        .filter(|&id| id != store_id)
        .count();
    if mismatched > 0 {
        warn!("{mismatched} hash table entries reference a different store id than {store_id}");
    }
    debug!(
        "Hash tables: {} x 32-bit, {} x 64-bit",
        store.hash32_entries().len(),
        store.hash64_entries().len()
    );
}

/// Append `.dll` unless the name already ends with it, case-insensitively.
fn assembly_file_name(name: &str) -> String {
    if name.to_ascii_lowercase().ends_with(".dll") {
        name.to_string()
    } else {
        format!("{name}.dll")
    }
}

/// Write one assembly, creating any directories its name implies.
fn write_assembly(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut path = dir.to_path_buf();
    let mut pushed = 0;
    for component in normalized.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            continue;
        }
        path.push(component);
        pushed += 1;
    }
    if pushed == 0 {
        return Err(Error::EmptyAssemblyName(name.to_string()));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, bytes)?;
    debug!("Wrote {} bytes to {:?}", bytes.len(), path);
    Ok(path)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string())
}
