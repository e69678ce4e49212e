//! AssemblyStore (XABA) Container Parsing Library
//!
//! AssemblyStore is the binary container format used by the .NET for
//! Android toolchain to bundle managed assemblies into native `.blob`
//! files inside an APK. This crate parses the container — fixed header,
//! descriptor table, and (for the primary store) the two global hash
//! tables — and unwraps the per-assembly XALZ compression envelope.
//!
//! The format is little-endian throughout, packed with no alignment
//! padding. Version 1 and below are supported.
//!
//! Higher-level concerns (manifest joins, PE validation, recovery of
//! corrupt stores) live in the `xaba-extract` crate.

pub mod error;
pub mod format;
pub mod reader;
pub mod store;
pub mod xalz;

pub use error::{Error, Result};
pub use format::{
    DESCRIPTOR_LEN, EntryDescriptor, HASH32_ENTRY_LEN, HASH64_ENTRY_LEN, Hash32Entry, Hash64Entry,
    MAX_SUPPORTED_VERSION, STORE_HEADER_LEN, STORE_MAGIC, StoreHeader,
};
pub use reader::Reader;
pub use store::{AssemblyStore, StoreKind};
pub use xalz::{DEFAULT_MAX_UNCOMPRESSED, ENVELOPE_HEADER_LEN, XALZ_MAGIC};
