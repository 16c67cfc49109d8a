//! Read-only views over an application's file bundle.
//!
//! A [`SourceArchive`] enumerates its entries once, at construction, and never
//! loads their content. Each [`ArchiveEntry`] carries a re-invocable
//! [`ContentOpener`] so the selector, the hasher and the encoder can each open
//! an independent stream over the same bytes, in whatever order they need.
//!
//! ## Sources
//!
//! - **Directory**: an exploded application directory, walked in file name order
//! - **ZIP file**: an existing `.zip`/`.jar`/`.war`, read through its central directory
//! - **Entries**: any caller-supplied storage, including in-memory content
//!
//! ```no_run
//! use cf_bits::archive::{ArchiveOptions, SourceArchive};
//!
//! # fn example() -> cf_bits::errors::Result<()> {
//! let archive = SourceArchive::from_directory("/srv/app", &ArchiveOptions::default())?;
//! println!("{} entries, {} bytes", archive.len(), archive.total_size());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use tokio::io::AsyncRead;

use crate::constants::ARCHIVE_SOURCE_EXTENSIONS;
use crate::errors::{Result, UploadError};

mod directory;
mod zip_file;

pub use directory::FileContent;
pub use zip_file::ZipEntryContent;

/// A readable stream over one entry's uncompressed content.
pub type EntryReader = Box<dyn AsyncRead + Send + Unpin>;

/// Capability to open a fresh content stream for an entry.
///
/// Every call must return an independent stream positioned at the start of
/// the content, so concurrent encode passes never share a cursor.
#[async_trait]
pub trait ContentOpener: Send + Sync {
    /// Open the content of the entry called `name`.
    ///
    /// Fails with [`UploadError::NotFound`] when the backing storage entry no
    /// longer exists.
    async fn open(&self, name: &str) -> Result<EntryReader>;
}

/// Kind of an archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Options controlling how a source is enumerated
#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    /// Emit directory entries (names ending in `/`) alongside files
    pub include_directories: bool,
    /// Follow symbolic links while walking a directory
    pub follow_links: bool,
}

/// One file (or directory) to be packed.
#[derive(Clone)]
pub struct ArchiveEntry {
    name: String,
    size: u64,
    kind: EntryKind,
    last_modified: Option<SystemTime>,
    opener: Arc<dyn ContentOpener>,
}

impl ArchiveEntry {
    /// Create a file entry backed by `opener`.
    ///
    /// `size` must equal the number of bytes every stream from `opener` yields.
    pub fn new(name: impl Into<String>, size: u64, opener: Arc<dyn ContentOpener>) -> Self {
        Self {
            name: name.into(),
            size,
            kind: EntryKind::File,
            last_modified: None,
            opener,
        }
    }

    /// Create a file entry whose content lives in memory.
    pub fn from_bytes(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        let content = content.into();
        let size = content.len() as u64;
        Self::new(name, size, Arc::new(MemoryContent(content)))
    }

    /// Create a zero-length directory entry. A trailing `/` is added if missing.
    pub fn directory(name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }

        Self {
            name,
            size: 0,
            kind: EntryKind::Directory,
            last_modified: None,
            opener: Arc::new(EmptyContent),
        }
    }

    pub fn with_last_modified(mut self, last_modified: SystemTime) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }

    /// Open a fresh stream over this entry's content.
    pub async fn open(&self) -> Result<EntryReader> {
        self.opener.open(&self.name).await
    }
}

impl fmt::Debug for ArchiveEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveEntry")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("kind", &self.kind)
            .field("last_modified", &self.last_modified)
            .finish()
    }
}

/// Ordered, immutable collection of entries plus the storage they came from.
#[derive(Debug, Clone)]
pub struct SourceArchive {
    root: PathBuf,
    entries: Vec<ArchiveEntry>,
}

impl SourceArchive {
    /// Enumerate an exploded application directory.
    pub fn from_directory(root: impl AsRef<Path>, options: &ArchiveOptions) -> Result<Self> {
        let root = root.as_ref();
        let entries = directory::scan_directory(root, options)?;
        debug!("Enumerated {} entries under {}", entries.len(), root.display());

        Ok(Self::from_entries(root, entries))
    }

    /// Enumerate the entries of an existing ZIP file.
    pub fn from_zip_file(path: impl AsRef<Path>, options: &ArchiveOptions) -> Result<Self> {
        let path = path.as_ref();
        let entries = zip_file::scan_zip_file(path, options)?;
        debug!("Enumerated {} entries in {}", entries.len(), path.display());

        Ok(Self::from_entries(path, entries))
    }

    /// Enumerate `path` as a ZIP file when it is a regular file with an
    /// archive extension, otherwise as a directory.
    pub fn open_path(path: impl AsRef<Path>, options: &ArchiveOptions) -> Result<Self> {
        let path = path.as_ref();
        let is_archive_file = path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| ARCHIVE_SOURCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);

        if is_archive_file {
            Self::from_zip_file(path, options)
        } else {
            Self::from_directory(path, options)
        }
    }

    /// Wrap entries supplied by an external storage collaborator.
    pub fn from_entries(root: impl Into<PathBuf>, entries: Vec<ArchiveEntry>) -> Self {
        Self {
            root: root.into(),
            entries,
        }
    }

    /// Storage location this archive was enumerated from
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the sizes of every entry, selected or not.
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(ArchiveEntry::size).sum()
    }

    /// Open a fresh content stream for `entry`.
    pub async fn open(&self, entry: &ArchiveEntry) -> Result<EntryReader> {
        entry.open().await
    }
}

/// Content held in memory
struct MemoryContent(Bytes);

#[async_trait]
impl ContentOpener for MemoryContent {
    async fn open(&self, _name: &str) -> Result<EntryReader> {
        Ok(Box::new(Cursor::new(self.0.clone())))
    }
}

/// Content of a directory entry
struct EmptyContent;

#[async_trait]
impl ContentOpener for EmptyContent {
    async fn open(&self, _name: &str) -> Result<EntryReader> {
        Ok(Box::new(tokio::io::empty()))
    }
}

/// Helper for openers that surface a missing backing file
pub(crate) fn open_error(name: &str, err: std::io::Error) -> UploadError {
    if err.kind() == std::io::ErrorKind::NotFound {
        UploadError::NotFound {
            name: name.to_string(),
        }
    } else {
        UploadError::source_unavailable(name, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_memory_entry_reopens_from_start() {
        let entry = ArchiveEntry::from_bytes("a.txt", "hello");
        assert_eq!(entry.size(), 5);

        for _ in 0..2 {
            let mut content = String::new();
            entry.open().await.unwrap().read_to_string(&mut content).await.unwrap();
            assert_eq!(content, "hello");
        }
    }

    #[test]
    fn test_directory_entry_name_and_size() {
        let entry = ArchiveEntry::directory("static/css");
        assert_eq!(entry.name(), "static/css/");
        assert_eq!(entry.size(), 0);
        assert!(entry.is_directory());
    }

    #[test]
    fn test_total_size_counts_every_entry() {
        let archive = SourceArchive::from_entries(
            "/mem",
            vec![
                ArchiveEntry::from_bytes("a.txt", vec![0u8; 10]),
                ArchiveEntry::from_bytes("b.txt", vec![0u8; 20]),
            ],
        );
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.total_size(), 30);
        assert_eq!(archive.root(), Path::new("/mem"));
    }
}
