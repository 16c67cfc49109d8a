mod encoder;
mod formats;
mod helpers;

// Re-export the main types and functions
pub use encoder::{EncoderOptions, StreamingArchiveEncoder};
pub use formats::{CompressionLevel, CompressionMethod, CompressionPolicy, DirectoryRecord};
pub use helpers::{dos_time, ChecksumReader};
