//! Assembly Extraction Pipeline
//!
//! Turns parsed AssemblyStore containers back into individual PE/CLI
//! assembly files: joins store entries against the text (or JSON)
//! manifest, unwraps XALZ payloads, validates images structurally, and
//! falls back to a heuristic recovery scanner when a file is not a
//! recognizable store at all.
//!
//! The orchestrator in [`extract`] is the only component that touches the
//! filesystem for output; validation and decoding are pure functions over
//! byte slices.

pub mod error;
pub mod extract;
pub mod manifest;
pub mod pe;
pub mod recovery;

pub use error::{Error, Result};
pub use extract::{ExtractStats, extract_store, process_store_file, recover_file};
pub use manifest::{Manifest, ManifestEntry};
