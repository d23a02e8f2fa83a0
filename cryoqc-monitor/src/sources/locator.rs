//! Metadata store discovery
//!
//! Stage outputs are found by walking the project directory for the store file
//! names of each [`SourceKind`]. A store that does not exist yet simply is not
//! found; early in a session that is the normal state.

use super::SourceKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Location of one metadata store
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StoreHandle {
    pub kind: SourceKind,
    pub path: PathBuf,
}

/// Find every metadata store below `project_dir`
///
/// Results are ordered by path so merge order is stable across poll cycles.
pub fn locate_stores(project_dir: &Path) -> Vec<StoreHandle> {
    if !project_dir.is_dir() {
        tracing::debug!(
            project = %project_dir.display(),
            "Project directory not present yet, no stores"
        );
        return Vec::new();
    }

    let mut stores: Vec<StoreHandle> = WalkDir::new(project_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Error accessing entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let kind = SourceKind::from_store_file_name(entry.file_name().to_str()?)?;
            Some(StoreHandle {
                kind,
                path: entry.into_path(),
            })
        })
        .collect();

    stores.sort_by(|a, b| a.path.cmp(&b.path));
    stores
}

/// Stores of one kind only
pub fn locate_stores_of_kind(project_dir: &Path, kind: SourceKind) -> Vec<StoreHandle> {
    locate_stores(project_dir)
        .into_iter()
        .filter(|s| s.kind == kind)
        .collect()
}
