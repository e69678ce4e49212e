//! Input discovery: store blobs and the manifest under the input root.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;
use xaba_store::StoreKind;

/// File name of the assembly manifest shipped next to the blobs.
const MANIFEST_NAME: &str = "assemblies.manifest";

/// Base name (stem) identifying the primary store.
const PRIMARY_STEM: &str = "assemblies";

/// One store file found under the input root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFile {
    pub path: PathBuf,
    pub kind: StoreKind,
}

/// Everything the pipeline consumes from the input directory.
#[derive(Debug, Default)]
pub struct DiscoveredInputs {
    /// `.blob` files in sorted path order.
    pub stores: Vec<StoreFile>,
    /// The first `assemblies.manifest` found, if any.
    pub manifest: Option<PathBuf>,
}

/// Recursively collect every `.blob` store and the first manifest.
///
/// Sorted traversal keeps reruns deterministic: recovery-path output is
/// numbered in processing order.
pub fn find_inputs(root: &Path) -> std::io::Result<DiscoveredInputs> {
    let mut inputs = DiscoveredInputs::default();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();

        if inputs.manifest.is_none()
            && path
                .file_name()
                .is_some_and(|n| n.eq_ignore_ascii_case(MANIFEST_NAME))
        {
            debug!("Found manifest at {:?}", path);
            inputs.manifest = Some(path.to_path_buf());
            continue;
        }

        let is_blob = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("blob"));
        if !is_blob {
            continue;
        }

        let kind = if path
            .file_stem()
            .is_some_and(|stem| stem.eq_ignore_ascii_case(PRIMARY_STEM))
        {
            StoreKind::Primary
        } else {
            StoreKind::Secondary
        };
        debug!("Found store {:?} ({kind:?})", path);
        inputs.stores.push(StoreFile {
            path: path.to_path_buf(),
            kind,
        });
    }

    info!(
        "Discovered {} store(s), manifest {}",
        inputs.stores.len(),
        if inputs.manifest.is_some() { "present" } else { "absent" }
    );
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("arm64")).unwrap();
        std::fs::write(tmp.path().join("assemblies.blob"), b"x").unwrap();
        std::fs::write(tmp.path().join("arm64").join("assemblies.arm64.blob"), b"x").unwrap();
        std::fs::write(tmp.path().join("assemblies.manifest"), b"x").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"x").unwrap();

        let inputs = find_inputs(tmp.path()).unwrap();
        assert_eq!(inputs.stores.len(), 2);
        assert!(inputs.manifest.is_some());

        let primary: Vec<_> = inputs
            .stores
            .iter()
            .filter(|s| s.kind == StoreKind::Primary)
            .collect();
        assert_eq!(primary.len(), 1);
        assert!(primary[0].path.ends_with("assemblies.blob"));
    }

    #[test]
    fn test_empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let inputs = find_inputs(tmp.path()).unwrap();
        assert!(inputs.stores.is_empty());
        assert!(inputs.manifest.is_none());
    }
}
