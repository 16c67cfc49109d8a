use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use log::{debug, warn};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::constants::PARTIAL_UPLOAD_SUFFIX;
use crate::errors::{Result, UploadError};
use crate::upload::target::UploadTarget;

/// Upload target that writes the archive to local storage.
///
/// Bytes go to `<path>.part`; the file only appears under its final name once
/// the upload completes, and an aborted upload leaves nothing behind.
pub struct FileTarget {
    path: PathBuf,
    partial_path: PathBuf,
    file: File,
    bytes_uploaded: u64,
}

impl FileTarget {
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut partial_path = path.clone().into_os_string();
        partial_path.push(".");
        partial_path.push(PARTIAL_UPLOAD_SUFFIX);
        let partial_path = PathBuf::from(partial_path);

        let file = File::create(&partial_path).await?;
        debug!("Writing archive to {}", partial_path.display());

        Ok(Self {
            path,
            partial_path,
            file,
            bytes_uploaded: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the partial file and move it to its final name
    async fn persist(&mut self) -> Result<()> {
        self.file.flush().await.map_err(|e| self.target_error(e))?;
        self.file.sync_all().await.map_err(|e| self.target_error(e))?;

        tokio::fs::rename(&self.partial_path, &self.path)
            .await
            .map_err(|e| self.target_error(e))
    }

    fn target_error(&self, err: io::Error) -> UploadError {
        UploadError::Target {
            target: self.target_name(),
            source: err.into(),
        }
    }
}

impl AsyncWrite for FileTarget {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let written = ready!(Pin::new(&mut this.file).poll_write(cx, buf))?;
        this.bytes_uploaded += written as u64;
        Poll::Ready(Ok(written))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_shutdown(cx)
    }
}

impl UploadTarget for FileTarget {
    fn target_name(&self) -> String {
        format!("file://{}", self.path.display())
    }

    fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded
    }

    async fn complete(mut self) -> Result<()> {
        if let Err(e) = self.persist().await {
            let Self {
                partial_path, file, ..
            } = self;
            drop(file);

            if let Err(remove_err) = tokio::fs::remove_file(&partial_path).await {
                warn!("Failed to remove {}: {}", partial_path.display(), remove_err);
            }
            return Err(e);
        }

        debug!("Wrote {} bytes to {}", self.bytes_uploaded, self.path.display());
        Ok(())
    }

    async fn abort(self) -> Result<()> {
        let Self {
            partial_path, file, ..
        } = self;
        drop(file);

        match tokio::fs::remove_file(&partial_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_complete_renames_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bits.zip");

        let mut target = FileTarget::create(&path).await.unwrap();
        target.write_all(b"PK").await.unwrap();
        assert_eq!(target.bytes_uploaded(), 2);
        assert!(dir.path().join("bits.zip.part").exists());

        target.complete().await.unwrap();
        assert!(!dir.path().join("bits.zip.part").exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"PK");
    }

    #[tokio::test]
    async fn test_abort_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bits.zip");

        let mut target = FileTarget::create(&path).await.unwrap();
        target.write_all(b"partial").await.unwrap();
        target.abort().await.unwrap();

        assert!(!path.exists());
        assert!(!dir.path().join("bits.zip.part").exists());
    }

    #[tokio::test]
    async fn test_failed_complete_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        // A directory already occupies the final name, so the rename fails
        let path = dir.path().join("bits.zip");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        let mut target = FileTarget::create(&path).await.unwrap();
        target.write_all(b"PK").await.unwrap();

        let err = target.complete().await.unwrap_err();
        assert!(matches!(err, UploadError::Target { .. }));
        assert!(!dir.path().join("bits.zip.part").exists());
        assert!(path.is_dir());
    }
}
