use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Boxed cause carried by errors that wrap a collaborator failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the archive, selection and encoding pipeline.
///
/// None of these are retried internally. A failure after bytes have been
/// emitted invalidates the whole stream; callers restart from enumeration.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The source archive could not be enumerated.
    #[error("invalid archive {}: {reason}", .path.display())]
    InvalidArchive { path: PathBuf, reason: String },

    /// An entry's backing storage disappeared after enumeration.
    #[error("archive entry not found: {name}")]
    NotFound { name: String },

    /// An entry could not be read while it was being encoded.
    #[error("source for entry {name} became unavailable: {source}")]
    SourceUnavailable {
        name: String,
        #[source]
        source: BoxError,
    },

    /// The fingerprint function had no checksum for an entry.
    #[error("no fingerprint available for entry {name}")]
    MissingFingerprint { name: String },

    /// A 32-bit entry turned out larger than its header allowed for.
    #[error("entry {name} exceeds the size declared in its local header")]
    EntryOverflow { name: String },

    /// An entry name does not fit the 16-bit name length of a ZIP header.
    #[error("entry name of {name_len} bytes exceeds the ZIP limit of 65535")]
    NameTooLong { name_len: usize },

    /// The encoder already failed or was cancelled mid-pull.
    #[error("archive stream was aborted by an earlier failure")]
    StreamAborted,

    /// The upload target rejected the stream.
    #[error("upload target {target} failed: {source}")]
    Target {
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to parse resource payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl UploadError {
    pub(crate) fn source_unavailable<E>(name: &str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        UploadError::SourceUnavailable {
            name: name.to_string(),
            source: source.into(),
        }
    }

    /// Whether restarting the pipeline from enumeration could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            UploadError::NotFound { .. }
                | UploadError::SourceUnavailable { .. }
                | UploadError::Target { .. }
                | UploadError::Io(_)
        )
    }
}

impl From<UploadError> for io::Error {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Io(inner) => inner,
            UploadError::NotFound { .. } => io::Error::new(io::ErrorKind::NotFound, err),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, UploadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_conversion_keeps_not_found_kind() {
        let err: io::Error = UploadError::NotFound { name: "a.txt".into() }.into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("a.txt"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(UploadError::NotFound { name: "x".into() }.is_transient());
        assert!(!UploadError::StreamAborted.is_transient());
        assert!(!UploadError::MissingFingerprint { name: "x".into() }.is_transient());
    }
}
