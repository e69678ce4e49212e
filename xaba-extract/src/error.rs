//! Error types for the extraction pipeline

use thiserror::Error;

/// Result type for extraction operations
pub type Result<T> = std::result::Result<T, Error>;

/// Extraction pipeline error types
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Container format error from xaba-store
    #[error("Store error: {0}")]
    Store(#[from] xaba_store::Error),

    /// A manifest name resolved to an empty output path
    #[error("Assembly name {0:?} yields no usable output path")]
    EmptyAssemblyName(String),
}
