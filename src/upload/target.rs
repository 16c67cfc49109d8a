use tokio::io::AsyncWrite;

use crate::errors::Result;

/// A destination that receives the encoded archive and can complete or abort
/// the upload.
///
/// This abstracts over transports (controller HTTP upload, local file, ...),
/// allowing the pipeline to drive any of them the same way.
pub trait UploadTarget: AsyncWrite + Unpin + Send {
    /// Get the unique identifier for this target (for logs/errors)
    fn target_name(&self) -> String;

    /// Get the number of bytes accepted so far
    fn bytes_uploaded(&self) -> u64;

    /// Complete the upload operation
    async fn complete(self) -> Result<()>;

    /// Abort the upload operation and clean up resources
    async fn abort(self) -> Result<()>;
}
