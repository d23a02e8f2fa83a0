//! Startup backlog scan
//!
//! Enumerates the files already present in the watched directory when the
//! monitor starts. Only the directory itself is listed (no recursion); each
//! accepted entry is returned as its own path so the caller submits exactly the
//! file it examined.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// True if the file name's extension is in the allow-list (case-sensitive)
pub fn has_accepted_extension(path: &Path, accepted: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| accepted.iter().any(|a| a == ext))
        .unwrap_or(false)
}

/// Regular files directly inside `dir` with an accepted extension, sorted by name
pub fn scan_backlog(dir: &Path, accepted: &[String]) -> Result<Vec<PathBuf>, ScanError> {
    if !dir.exists() {
        return Err(ScanError::PathNotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(ScanError::NotADirectory(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && has_accepted_extension(entry.path(), accepted) {
                    files.push(entry.into_path());
                }
            }
            Err(e) => {
                tracing::warn!("Error accessing entry: {}", e);
                // Continue scanning, don't abort
            }
        }
    }

    tracing::debug!(
        dir = %dir.display(),
        files = files.len(),
        "Backlog scan complete"
    );

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn accepted() -> Vec<String> {
        vec!["mrcs".to_string(), "mrc".to_string()]
    }

    #[test]
    fn test_each_accepted_file_listed_once() {
        let temp = TempDir::new().unwrap();
        for name in ["b.mrcs", "a.mrc", "notes.txt", "c.MRC"] {
            std::fs::write(temp.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        std::fs::write(temp.path().join("sub").join("d.mrc"), b"x").unwrap();

        let files = scan_backlog(temp.path(), &accepted()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a.mrc", "b.mrcs"]);
    }

    #[test]
    fn test_extension_match_is_case_sensitive() {
        assert!(has_accepted_extension(Path::new("/in/a.mrc"), &accepted()));
        assert!(!has_accepted_extension(Path::new("/in/a.MRC"), &accepted()));
        assert!(!has_accepted_extension(Path::new("/in/mrc"), &accepted()));
        assert!(!has_accepted_extension(Path::new("/in/a.mrc.part"), &accepted()));
    }

    #[test]
    fn test_missing_directory() {
        let temp = TempDir::new().unwrap();
        let result = scan_backlog(&temp.path().join("absent"), &accepted());
        assert!(matches!(result, Err(ScanError::PathNotFound(_))));

        let file = temp.path().join("file.mrc");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(scan_backlog(&file, &accepted()), Err(ScanError::NotADirectory(_))));
    }
}
