//! On-disk records of the AssemblyStore container format.
//!
//! All fields are little-endian and packed with no alignment padding. The
//! primary store (the one named `assemblies`) carries two global hash
//! tables after its descriptor table; per-architecture stores carry
//! descriptors only.

use crate::{Error, Result, reader::Reader};

/// Magic bytes at offset 0 of every store file.
pub const STORE_MAGIC: [u8; 4] = *b"XABA";

/// Highest format version this parser understands.
pub const MAX_SUPPORTED_VERSION: u32 = 1;

/// Fixed header length in bytes.
pub const STORE_HEADER_LEN: usize = 20;

/// Length of one [`EntryDescriptor`] record.
pub const DESCRIPTOR_LEN: usize = 24;

/// Length of one [`Hash32Entry`] record: 32-bit hash, 4 reserved bytes,
/// then three index fields.
pub const HASH32_ENTRY_LEN: usize = 20;

/// Length of one [`Hash64Entry`] record: 64-bit hash, then three index
/// fields.
pub const HASH64_ENTRY_LEN: usize = 24;

/// The fixed 20-byte store header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    /// Format version; versions above [`MAX_SUPPORTED_VERSION`] are rejected.
    pub version: u32,
    /// Number of [`EntryDescriptor`] records in this store.
    pub local_entry_count: u32,
    /// Number of entries in each hash table of the primary store.
    pub global_entry_count: u32,
    /// Identifier joined against manifest rows.
    pub store_id: u32,
}

impl StoreHeader {
    /// Parse the header at the reader's current position.
    ///
    /// A magic mismatch yields [`Error::NotAnAssemblyStore`] so callers can
    /// fall back to heuristic recovery; any other failure means the file
    /// claimed to be a store but is unusable.
    pub fn parse(r: &mut Reader<'_>) -> Result<Self> {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(r.read_bytes(4)?);
        if magic != STORE_MAGIC {
            return Err(Error::NotAnAssemblyStore(magic));
        }

        let version = r.read_u32()?;
        if version > MAX_SUPPORTED_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        Ok(Self {
            version,
            local_entry_count: r.read_u32()?,
            global_entry_count: r.read_u32()?,
            store_id: r.read_u32()?,
        })
    }
}

/// A 24-byte record locating one assembly's regions within the store.
///
/// Offsets are absolute within the store file. Only the `data` region is
/// extracted; `debug` and `config` regions ride along for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryDescriptor {
    pub data_offset: u32,
    pub data_size: u32,
    pub debug_offset: u32,
    pub debug_size: u32,
    pub config_offset: u32,
    pub config_size: u32,
}

impl EntryDescriptor {
    /// Parse one descriptor at the reader's current position.
    pub fn parse(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            data_offset: r.read_u32()?,
            data_size: r.read_u32()?,
            debug_offset: r.read_u32()?,
            debug_size: r.read_u32()?,
            config_offset: r.read_u32()?,
            config_size: r.read_u32()?,
        })
    }

    /// `true` if a debug region is present.
    pub fn has_debug(&self) -> bool {
        self.debug_size != 0
    }

    /// `true` if an embedded config region is present.
    pub fn has_config(&self) -> bool {
        self.config_size != 0
    }

    /// Check that the data region fits inside a file of `file_len` bytes.
    pub fn check_data_bounds(&self, index: usize, file_len: u64) -> Result<()> {
        let offset = u64::from(self.data_offset);
        let size = u64::from(self.data_size);
        if offset + size > file_len {
            return Err(Error::OutOfBoundsDescriptor {
                index,
                offset,
                size,
                file_len,
            });
        }
        Ok(())
    }
}

/// Primary-store hash table entry keyed by a 32-bit assembly name hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hash32Entry {
    pub hash: u32,
    pub mapping_index: u32,
    pub local_store_index: u32,
    pub store_id: u32,
}

impl Hash32Entry {
    /// Parse one entry at the reader's current position.
    pub fn parse(r: &mut Reader<'_>) -> Result<Self> {
        let hash = r.read_u32()?;
        let _reserved = r.read_u32()?;
        Ok(Self {
            hash,
            mapping_index: r.read_u32()?,
            local_store_index: r.read_u32()?,
            store_id: r.read_u32()?,
        })
    }
}

/// Primary-store hash table entry keyed by a 64-bit assembly name hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hash64Entry {
    pub hash: u64,
    pub mapping_index: u32,
    pub local_store_index: u32,
    pub store_id: u32,
}

impl Hash64Entry {
    /// Parse one entry at the reader's current position.
    pub fn parse(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            hash: r.read_u64()?,
            mapping_index: r.read_u32()?,
            local_store_index: r.read_u32()?,
            store_id: r.read_u32()?,
        })
    }
}
