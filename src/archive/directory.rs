use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use tokio::fs::File;
use walkdir::WalkDir;

use crate::archive::{open_error, ArchiveEntry, ArchiveOptions, ContentOpener, EntryReader};
use crate::errors::{Result, UploadError};

/// Content of a regular file on local storage
#[derive(Debug, Clone)]
pub struct FileContent {
    path: PathBuf,
}

impl FileContent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ContentOpener for FileContent {
    async fn open(&self, name: &str) -> Result<EntryReader> {
        let file = File::open(&self.path)
            .await
            .map_err(|e| open_error(name, e))?;
        Ok(Box::new(file))
    }
}

/// Walk `root` and build one entry per regular file (and directory, if asked).
pub(crate) fn scan_directory(root: &Path, options: &ArchiveOptions) -> Result<Vec<ArchiveEntry>> {
    let invalid = |reason: String| UploadError::InvalidArchive {
        path: root.to_path_buf(),
        reason,
    };

    let metadata = std::fs::metadata(root).map_err(|e| invalid(e.to_string()))?;
    if !metadata.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }

    let mut entries = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(options.follow_links)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| invalid(e.to_string()))?;
        let name = relative_name(root, entry.path()).ok_or_else(|| {
            invalid(format!("{} is not valid UTF-8", entry.path().display()))
        })?;
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if options.include_directories {
                let mut dir = ArchiveEntry::directory(name);
                if let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) {
                    dir = dir.with_last_modified(modified);
                }
                entries.push(dir);
            }
        } else if file_type.is_file() {
            let metadata = entry.metadata().map_err(|e| invalid(e.to_string()))?;
            let mut file = ArchiveEntry::new(
                name,
                metadata.len(),
                Arc::new(FileContent::new(entry.path())),
            );
            if let Ok(modified) = metadata.modified() {
                file = file.with_last_modified(modified);
            }
            entries.push(file);
        } else {
            debug!("Skipping {} (not a regular file)", entry.path().display());
        }
    }

    Ok(entries)
}

/// Archive-relative, `/`-separated name of `path` under `root`.
///
/// `None` when a component is not UTF-8; a lossy conversion could give two
/// files the same name.
fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_str()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    use crate::archive::SourceArchive;

    fn sample_app() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("lib/nested")).unwrap();
        fs::write(dir.path().join("manifest.yml"), "applications: []").unwrap();
        fs::write(dir.path().join("lib/a.jar"), vec![7u8; 64]).unwrap();
        fs::write(dir.path().join("lib/nested/b.txt"), "nested").unwrap();
        dir
    }

    #[test]
    fn test_scan_orders_files_by_name() {
        let dir = sample_app();
        let archive = SourceArchive::from_directory(dir.path(), &ArchiveOptions::default()).unwrap();

        let names: Vec<&str> = archive.entries().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["lib/a.jar", "lib/nested/b.txt", "manifest.yml"]);
        assert_eq!(archive.total_size(), 64 + 6 + 16);
    }

    #[test]
    fn test_scan_includes_directories_when_asked() {
        let dir = sample_app();
        let options = ArchiveOptions {
            include_directories: true,
            ..Default::default()
        };
        let archive = SourceArchive::from_directory(dir.path(), &options).unwrap();

        let names: Vec<&str> = archive.entries().iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec!["lib/", "lib/a.jar", "lib/nested/", "lib/nested/b.txt", "manifest.yml"]
        );
    }

    #[test]
    fn test_missing_root_is_invalid_archive() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");

        let err = SourceArchive::from_directory(&missing, &ArchiveOptions::default()).unwrap_err();
        assert!(matches!(err, UploadError::InvalidArchive { .. }));
    }

    #[test]
    fn test_file_root_is_invalid_archive() {
        let dir = sample_app();
        let err = SourceArchive::from_directory(dir.path().join("manifest.yml"), &ArchiveOptions::default())
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidArchive { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_is_invalid_archive() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = sample_app();
        let path = dir.path().join(OsStr::from_bytes(b"bad-\xff.txt"));
        if fs::write(&path, "x").is_err() {
            // Filesystem refuses non-UTF-8 names
            return;
        }

        let err = SourceArchive::from_directory(dir.path(), &ArchiveOptions::default()).unwrap_err();
        assert!(matches!(err, UploadError::InvalidArchive { ref reason, .. } if reason.contains("UTF-8")));
    }

    #[tokio::test]
    async fn test_open_after_delete_is_not_found() {
        let dir = sample_app();
        let archive = SourceArchive::from_directory(dir.path(), &ArchiveOptions::default()).unwrap();
        let entry = archive.entries()[1].clone();

        let mut content = String::new();
        archive.open(&entry).await.unwrap().read_to_string(&mut content).await.unwrap();
        assert_eq!(content, "nested");

        fs::remove_file(dir.path().join("lib/nested/b.txt")).unwrap();
        let err = archive.open(&entry).await.err().unwrap();
        assert!(matches!(err, UploadError::NotFound { ref name } if name == "lib/nested/b.txt"));
    }
}
