//! Manifest parsing.
//!
//! The text manifest pairs `(blob_id, blob_idx)` tuples with assembly
//! names. Newer toolchains sometimes ship a JSON manifest instead; that
//! shape is detected by a leading `{` and mapped onto the same entry
//! type. A manifest that cannot be parsed at all is not fatal — the
//! extractor falls through to heuristic recovery with an empty one.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// One row of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// 32-bit name hash, as the hex string found in the file.
    pub hash32: String,
    /// 64-bit name hash, as the hex string found in the file.
    pub hash64: String,
    /// Store identifier this row belongs to.
    pub blob_id: u32,
    /// Local index within that store.
    pub blob_idx: u32,
    /// Assembly name; may contain path separators and may lack `.dll`.
    pub name: String,
    /// Uncompressed size, known only for the JSON manifest shape.
    pub size: Option<u64>,
}

/// An ordered collection of manifest rows indexed by `(blob_id, blob_idx)`.
#[derive(Debug, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    index: HashMap<(u32, u32), usize>,
}

#[derive(Deserialize)]
struct JsonManifest {
    #[serde(rename = "Assemblies", default)]
    assemblies: Vec<JsonAssembly>,
}

#[derive(Deserialize)]
struct JsonAssembly {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Size", default)]
    size: Option<u64>,
    #[serde(rename = "Hash", default)]
    hash: Option<String>,
}

impl Manifest {
    /// Parse manifest text, detecting the JSON shape by a leading `{`.
    ///
    /// Unparseable rows are skipped with a warning; an entirely
    /// unparseable file yields an empty manifest.
    pub fn parse(text: &str) -> Self {
        if text.trim_start().starts_with('{') {
            return Self::parse_json(text);
        }
        Self::parse_rows(text)
    }

    /// Load a manifest file from disk; unreadable files yield an empty
    /// manifest with a warning.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let manifest = Self::parse(&text);
                debug!("Loaded {} manifest entries from {:?}", manifest.len(), path);
                manifest
            }
            Err(e) => {
                warn!("Cannot read manifest {:?}: {e}", path);
                Self::default()
            }
        }
    }

    fn parse_rows(text: &str) -> Self {
        let mut manifest = Self::default();
        let mut header_skipped = false;

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let tokens: Vec<&str> = line.split_whitespace().collect();
            if !header_skipped && tokens[0].starts_with("Hash") {
                header_skipped = true;
                continue;
            }

            if tokens.len() < 5 {
                warn!("Manifest line {}: {} tokens, need 5; skipped", lineno + 1, tokens.len());
                continue;
            }

            let (Ok(blob_id), Ok(blob_idx)) = (tokens[2].parse::<u32>(), tokens[3].parse::<u32>())
            else {
                warn!("Manifest line {}: non-integer blob id/index; skipped", lineno + 1);
                continue;
            };

            manifest.push(ManifestEntry {
                hash32: tokens[0].to_string(),
                hash64: tokens[1].to_string(),
                blob_id,
                blob_idx,
                name: tokens[4].to_string(),
                size: None,
            });
        }

        manifest
    }

    fn parse_json(text: &str) -> Self {
        let parsed: JsonManifest = match serde_json::from_str(text) {
            Ok(p) => p,
            Err(e) => {
                warn!("JSON manifest did not parse: {e}");
                return Self::default();
            }
        };

        let mut manifest = Self::default();
        for (i, a) in parsed.assemblies.into_iter().enumerate() {
            manifest.push(ManifestEntry {
                hash32: a.hash.unwrap_or_default(),
                hash64: String::new(),
                blob_id: 0,
                blob_idx: i as u32,
                name: a.name,
                size: a.size,
            });
        }
        manifest
    }

    fn push(&mut self, entry: ManifestEntry) {
        self.index
            .insert((entry.blob_id, entry.blob_idx), self.entries.len());
        self.entries.push(entry);
    }

    /// Look up the row for `(blob_id, blob_idx)`.
    pub fn get(&self, blob_id: u32, blob_idx: u32) -> Option<&ManifestEntry> {
        self.index
            .get(&(blob_id, blob_idx))
            .map(|&i| &self.entries[i])
    }

    /// All rows, in file order.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the manifest has no rows.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Per-assembly sizes in file order, when every row carries one.
    ///
    /// Only the JSON manifest shape records sizes; the guided recovery
    /// pass is skipped without them.
    pub fn sizes(&self) -> Option<Vec<u64>> {
        if self.entries.is_empty() {
            return None;
        }
        self.entries.iter().map(|e| e.size).collect()
    }
}
