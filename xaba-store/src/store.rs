//! Parsed AssemblyStore containers.
//!
//! An [`AssemblyStore`] owns the raw bytes of one store file for the
//! lifetime of its extraction; entry accessors hand out bounds-checked
//! slices into that buffer.

use std::path::Path;

use tracing::debug;

use crate::{
    Error, Result,
    format::{EntryDescriptor, Hash32Entry, Hash64Entry, StoreHeader},
    reader::Reader,
};

/// Whether a store file is the primary store or a per-architecture one.
///
/// Only the primary store (base filename `assemblies`) carries the two
/// global hash tables after its descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Primary,
    Secondary,
}

/// A fully parsed store file.
#[derive(Debug)]
pub struct AssemblyStore {
    data: Vec<u8>,
    kind: StoreKind,
    header: StoreHeader,
    descriptors: Vec<EntryDescriptor>,
    hash32: Vec<Hash32Entry>,
    hash64: Vec<Hash64Entry>,
}

impl AssemblyStore {
    /// Parse a store from its raw bytes, taking ownership of them.
    ///
    /// # Errors
    ///
    /// [`Error::NotAnAssemblyStore`] if the magic does not match (the
    /// caller may fall back to recovery scanning);
    /// [`Error::UnsupportedVersion`] or [`Error::ShortRead`] if the file
    /// claims to be a store but cannot be parsed.
    pub fn parse(data: Vec<u8>, kind: StoreKind) -> Result<Self> {
        let mut r = Reader::new(&data);
        let header = StoreHeader::parse(&mut r)?;
        let count = header.local_entry_count as usize;

        let mut descriptors = Vec::with_capacity(count);
        for _ in 0..count {
            descriptors.push(EntryDescriptor::parse(&mut r)?);
        }

        let (hash32, hash64) = match kind {
            StoreKind::Primary => {
                let mut hash32 = Vec::with_capacity(count);
                for _ in 0..count {
                    hash32.push(Hash32Entry::parse(&mut r)?);
                }
                let mut hash64 = Vec::with_capacity(count);
                for _ in 0..count {
                    hash64.push(Hash64Entry::parse(&mut r)?);
                }
                (hash32, hash64)
            }
            StoreKind::Secondary => (Vec::new(), Vec::new()),
        };

        debug!(
            "Parsed store id {} (version {}): {} entries, {} global, {} bytes",
            header.store_id,
            header.version,
            count,
            header.global_entry_count,
            data.len()
        );

        Ok(Self {
            data,
            kind,
            header,
            descriptors,
            hash32,
            hash64,
        })
    }

    /// Read and parse a store file from disk.
    pub fn open(path: &Path, kind: StoreKind) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::parse(data, kind)
    }

    /// The parsed fixed header.
    pub fn header(&self) -> &StoreHeader {
        &self.header
    }

    /// The store identifier joined against manifest rows.
    pub fn store_id(&self) -> u32 {
        self.header.store_id
    }

    /// Whether this is the primary or a per-architecture store.
    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// Number of assemblies described by this store.
    pub fn entry_count(&self) -> usize {
        self.descriptors.len()
    }

    /// The descriptor table, in local-index order.
    pub fn descriptors(&self) -> &[EntryDescriptor] {
        &self.descriptors
    }

    /// Length of the raw store file.
    pub fn file_len(&self) -> u64 {
        self.data.len() as u64
    }

    /// The 32-bit hash table (empty for secondary stores).
    pub fn hash32_entries(&self) -> &[Hash32Entry] {
        &self.hash32
    }

    /// The 64-bit hash table (empty for secondary stores).
    pub fn hash64_entries(&self) -> &[Hash64Entry] {
        &self.hash64
    }

    fn region(&self, index: usize, offset: u32, size: u32) -> Result<&[u8]> {
        let start = offset as usize;
        let end = start.checked_add(size as usize).filter(|&e| e <= self.data.len());
        match end {
            Some(end) => Ok(&self.data[start..end]),
            None => Err(Error::OutOfBoundsDescriptor {
                index,
                offset: u64::from(offset),
                size: u64::from(size),
                file_len: self.file_len(),
            }),
        }
    }

    /// The raw assembly image bytes for the entry at `index`.
    ///
    /// The slice may still be XALZ-wrapped; see [`crate::xalz`].
    pub fn entry_data(&self, index: usize) -> Result<&[u8]> {
        let d = self
            .descriptors
            .get(index)
            .ok_or(Error::EntryIndexOutOfRange(index, self.descriptors.len()))?;
        d.check_data_bounds(index, self.file_len())?;
        let start = d.data_offset as usize;
        Ok(&self.data[start..start + d.data_size as usize])
    }

    /// The debug-symbol region for the entry at `index`, if present.
    pub fn debug_data(&self, index: usize) -> Result<Option<&[u8]>> {
        let d = self
            .descriptors
            .get(index)
            .ok_or(Error::EntryIndexOutOfRange(index, self.descriptors.len()))?;
        if !d.has_debug() {
            return Ok(None);
        }
        self.region(index, d.debug_offset, d.debug_size).map(Some)
    }

    /// The embedded config region for the entry at `index`, if present.
    pub fn config_data(&self, index: usize) -> Result<Option<&[u8]>> {
        let d = self
            .descriptors
            .get(index)
            .ok_or(Error::EntryIndexOutOfRange(index, self.descriptors.len()))?;
        if !d.has_config() {
            return Ok(None);
        }
        self.region(index, d.config_offset, d.config_size).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{DESCRIPTOR_LEN, STORE_HEADER_LEN, STORE_MAGIC};

    /// Build a store whose entries hold the given payloads back to back.
    fn build_store(kind: StoreKind, store_id: u32, payloads: &[&[u8]]) -> Vec<u8> {
        let count = payloads.len() as u32;
        let tables_len = match kind {
            StoreKind::Primary => payloads.len() * (20 + 24),
            StoreKind::Secondary => 0,
        };
        let data_start = STORE_HEADER_LEN + payloads.len() * DESCRIPTOR_LEN + tables_len;

        let mut out = Vec::new();
        out.extend_from_slice(&STORE_MAGIC);
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&store_id.to_le_bytes());

        let mut offset = data_start as u32;
        for p in payloads {
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&(p.len() as u32).to_le_bytes());
            out.extend_from_slice(&[0u8; 16]); // no debug/config regions
            offset += p.len() as u32;
        }

        if kind == StoreKind::Primary {
            for (i, _) in payloads.iter().enumerate() {
                out.extend_from_slice(&(i as u32).to_le_bytes()); // hash32
                out.extend_from_slice(&0u32.to_le_bytes()); // reserved
                out.extend_from_slice(&(i as u32).to_le_bytes());
                out.extend_from_slice(&(i as u32).to_le_bytes());
                out.extend_from_slice(&store_id.to_le_bytes());
            }
            for (i, _) in payloads.iter().enumerate() {
                out.extend_from_slice(&(i as u64).to_le_bytes()); // hash64
                out.extend_from_slice(&(i as u32).to_le_bytes());
                out.extend_from_slice(&(i as u32).to_le_bytes());
                out.extend_from_slice(&store_id.to_le_bytes());
            }
        }

        for p in payloads {
            out.extend_from_slice(p);
        }
        out
    }

    #[test]
    fn test_primary_store_round_trip() {
        let data = build_store(StoreKind::Primary, 0, &[b"first", b"second!"]);
        let store = AssemblyStore::parse(data, StoreKind::Primary).unwrap();

        assert_eq!(store.entry_count(), 2);
        assert_eq!(store.store_id(), 0);
        assert_eq!(store.hash32_entries().len(), 2);
        assert_eq!(store.hash64_entries().len(), 2);
        assert_eq!(store.entry_data(0).unwrap(), b"first");
        assert_eq!(store.entry_data(1).unwrap(), b"second!");
        assert_eq!(store.hash64_entries()[1].hash, 1);
    }

    #[test]
    fn test_secondary_store_has_no_hash_tables() {
        let data = build_store(StoreKind::Secondary, 3, &[b"payload"]);
        let store = AssemblyStore::parse(data, StoreKind::Secondary).unwrap();

        assert_eq!(store.store_id(), 3);
        assert!(store.hash32_entries().is_empty());
        assert!(store.hash64_entries().is_empty());
        assert_eq!(store.entry_data(0).unwrap(), b"payload");
    }

    #[test]
    fn test_wrong_magic_is_recoverable() {
        let mut data = build_store(StoreKind::Secondary, 0, &[b"x"]);
        data[..4].copy_from_slice(b"ZZZZ");

        let err = AssemblyStore::parse(data, StoreKind::Secondary).unwrap_err();
        assert!(matches!(err, Error::NotAnAssemblyStore(_)));
    }

    #[test]
    fn test_truncated_hash_tables() {
        let mut data = build_store(StoreKind::Primary, 0, &[b"abc"]);
        // Chop the store in the middle of the hash64 table
        data.truncate(STORE_HEADER_LEN + DESCRIPTOR_LEN + 20 + 10);

        let err = AssemblyStore::parse(data, StoreKind::Primary).unwrap_err();
        assert!(matches!(err, Error::ShortRead { .. }), "actual error: {err:?}");
    }

    #[test]
    fn test_out_of_bounds_entry() {
        let mut data = build_store(StoreKind::Secondary, 0, &[b"abc"]);
        // Inflate the descriptor's data_size past the end of the file
        let size_field = STORE_HEADER_LEN + 4;
        data[size_field..size_field + 4].copy_from_slice(&1_000_000u32.to_le_bytes());

        let store = AssemblyStore::parse(data, StoreKind::Secondary).unwrap();
        let err = store.entry_data(0).unwrap_err();
        assert!(matches!(err, Error::OutOfBoundsDescriptor { index: 0, .. }));
    }

    #[test]
    fn test_entry_index_out_of_range() {
        let data = build_store(StoreKind::Secondary, 0, &[b"abc"]);
        let store = AssemblyStore::parse(data, StoreKind::Secondary).unwrap();
        let err = store.entry_data(5).unwrap_err();
        assert!(matches!(err, Error::EntryIndexOutOfRange(5, 1)));
    }
}
