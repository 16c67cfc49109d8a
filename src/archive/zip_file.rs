use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{NaiveDate, TimeZone, Utc};
use log::debug;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use zip::ZipArchive;

use crate::archive::{open_error, ArchiveEntry, ArchiveOptions, ContentOpener, EntryReader};
use crate::constants::{DEFAULT_CHUNK_SIZE, ZIP_SOURCE_CHANNEL_DEPTH};
use crate::errors::{Result, UploadError};

/// Content of one entry inside an existing ZIP file.
///
/// `zip` only offers blocking reads, so each open spawns a blocking task that
/// inflates the entry into a bounded channel. The channel depth caps how far
/// the reader can run ahead of the consumer; dropping the returned stream
/// closes the channel and the task stops at its next send.
#[derive(Debug, Clone)]
pub struct ZipEntryContent {
    archive_path: Arc<PathBuf>,
    index: usize,
}

#[async_trait]
impl ContentOpener for ZipEntryContent {
    async fn open(&self, name: &str) -> Result<EntryReader> {
        let file = tokio::fs::File::open(self.archive_path.as_path())
            .await
            .map_err(|e| open_error(name, e))?
            .into_std()
            .await;

        let (sender, receiver) = mpsc::channel::<io::Result<Bytes>>(ZIP_SOURCE_CHANNEL_DEPTH);
        let index = self.index;
        tokio::task::spawn_blocking(move || pump_entry(file, index, sender));

        let chunks = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|chunk| (chunk, receiver))
        });

        Ok(Box::new(StreamReader::new(Box::pin(chunks))))
    }
}

/// Inflate entry `index` of `file` into `sender` until EOF or until the
/// receiving side goes away.
fn pump_entry(file: fs::File, index: usize, sender: mpsc::Sender<io::Result<Bytes>>) {
    let result = (|| -> io::Result<()> {
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(zip_error)?;
        let mut entry = archive.by_index(index).map_err(zip_error)?;
        let mut buffer = vec![0u8; DEFAULT_CHUNK_SIZE];

        loop {
            let bytes_read = entry.read(&mut buffer)?;
            if bytes_read == 0 {
                return Ok(());
            }
            if sender
                .blocking_send(Ok(Bytes::copy_from_slice(&buffer[..bytes_read])))
                .is_err()
            {
                debug!("Reader for zip entry {} dropped before EOF", index);
                return Ok(());
            }
        }
    })();

    if let Err(e) = result {
        let _ = sender.blocking_send(Err(e));
    }
}

fn zip_error(err: zip::result::ZipError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Read the central directory of `path` into archive entries.
pub(crate) fn scan_zip_file(path: &Path, options: &ArchiveOptions) -> Result<Vec<ArchiveEntry>> {
    let invalid = |reason: String| UploadError::InvalidArchive {
        path: path.to_path_buf(),
        reason,
    };

    let file = fs::File::open(path).map_err(|e| invalid(e.to_string()))?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| invalid(e.to_string()))?;
    let archive_path = Arc::new(path.to_path_buf());
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let file = archive.by_index(index).map_err(|e| invalid(e.to_string()))?;
        let modified = to_system_time(file.last_modified());

        let entry = if file.is_dir() {
            if !options.include_directories {
                continue;
            }
            ArchiveEntry::directory(file.name())
        } else {
            let content = ZipEntryContent {
                archive_path: Arc::clone(&archive_path),
                index,
            };
            ArchiveEntry::new(file.name(), file.size(), Arc::new(content))
        };

        entries.push(match modified {
            Some(modified) => entry.with_last_modified(modified),
            None => entry,
        });
    }

    Ok(entries)
}

/// Convert a ZIP (DOS) timestamp to `SystemTime`, treating it as UTC
fn to_system_time(time: zip::DateTime) -> Option<SystemTime> {
    let naive = NaiveDate::from_ymd_opt(time.year() as i32, time.month() as u32, time.day() as u32)?
        .and_hms_opt(time.hour() as u32, time.minute() as u32, time.second() as u32)?;
    Some(SystemTime::from(Utc.from_utc_datetime(&naive)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use zip::write::FileOptions;

    use crate::archive::SourceArchive;

    fn write_zip(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("app.jar");
        let mut zip = zip::ZipWriter::new(fs::File::create(&path).unwrap());
        zip.add_directory("META-INF/", FileOptions::default()).unwrap();
        zip.start_file("META-INF/MANIFEST.MF", FileOptions::default()).unwrap();
        zip.write_all(b"Manifest-Version: 1.0\n").unwrap();
        zip.start_file("big.bin", FileOptions::default()).unwrap();
        zip.write_all(&vec![42u8; 3 * DEFAULT_CHUNK_SIZE + 17]).unwrap();
        zip.finish().unwrap();
        path
    }

    #[test]
    fn test_scan_zip_skips_directories_by_default() {
        let dir = TempDir::new().unwrap();
        let archive = SourceArchive::from_zip_file(write_zip(&dir), &ArchiveOptions::default()).unwrap();

        let names: Vec<&str> = archive.entries().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["META-INF/MANIFEST.MF", "big.bin"]);
        assert_eq!(archive.entries()[1].size(), 3 * DEFAULT_CHUNK_SIZE as u64 + 17);
    }

    #[test]
    fn test_open_path_detects_archive_extension() {
        let dir = TempDir::new().unwrap();
        let path = write_zip(&dir);
        let options = ArchiveOptions {
            include_directories: true,
            ..Default::default()
        };

        let archive = SourceArchive::open_path(&path, &options).unwrap();
        assert_eq!(archive.len(), 3);
        assert!(archive.entries()[0].is_directory());
    }

    #[test]
    fn test_corrupt_zip_is_invalid_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.zip");
        fs::write(&path, b"not a zip").unwrap();

        let err = SourceArchive::from_zip_file(&path, &ArchiveOptions::default()).unwrap_err();
        assert!(matches!(err, UploadError::InvalidArchive { .. }));
    }

    #[tokio::test]
    async fn test_zip_entry_streams_full_content() {
        let dir = TempDir::new().unwrap();
        let archive = SourceArchive::from_zip_file(write_zip(&dir), &ArchiveOptions::default()).unwrap();
        let entry = &archive.entries()[1];

        let mut content = Vec::new();
        entry.open().await.unwrap().read_to_end(&mut content).await.unwrap();
        assert_eq!(content.len() as u64, entry.size());
        assert!(content.iter().all(|b| *b == 42));
    }
}
