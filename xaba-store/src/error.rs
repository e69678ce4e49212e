//! Error types for AssemblyStore parsing and payload decompression

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// AssemblyStore error types
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not carry the XABA magic at offset 0
    #[error("Not an AssemblyStore: expected XABA magic, got {0:02x?}")]
    NotAnAssemblyStore([u8; 4]),

    /// Header version above the supported maximum
    #[error("Unsupported AssemblyStore version: {0}")]
    UnsupportedVersion(u32),

    /// A fixed-width read ran past the end of the buffer
    #[error("Short read at offset {position}: wanted {wanted} bytes, {available} available")]
    ShortRead {
        position: usize,
        wanted: usize,
        available: usize,
    },

    /// Entry index beyond the descriptor table
    #[error("Entry index {0} is out of range, store has {1} entries")]
    EntryIndexOutOfRange(usize, usize),

    /// A descriptor region runs past the end of the store file
    #[error(
        "Descriptor {index} out of bounds: offset {offset} + size {size} exceeds store length {file_len}"
    )]
    OutOfBoundsDescriptor {
        index: usize,
        offset: u64,
        size: u64,
        file_len: u64,
    },

    /// Payload does not start with the XALZ magic
    #[error("Invalid XALZ magic: {0:02x?}")]
    InvalidEnvelopeMagic([u8; 4]),

    /// XALZ envelope shorter than its fixed header
    #[error("XALZ envelope too short: {0} bytes (minimum 12)")]
    EnvelopeTooShort(usize),

    /// Declared uncompressed size above the configured ceiling
    #[error("Declared uncompressed size {declared} exceeds ceiling {max}")]
    SizeCeilingExceeded { declared: usize, max: usize },

    /// LZ4 block failed to decode
    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    /// LZ4 block decoded to a different length than the envelope declared
    #[error("Decompressed length {actual} does not match declared size {declared}")]
    SizeMismatch { declared: usize, actual: usize },
}
