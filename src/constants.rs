//! Global constants for cf-bits.
//!
//! This module centralizes the hardcoded values used by the archive walker,
//! the streaming encoder and the upload pipeline.

// Buffer size constants
/// Default chunk size pulled from an entry's content per encoder read (64KB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Buffer size used when hashing entry content (1MB)
pub const HASH_BUFFER_SIZE: usize = 1024 * 1024;

/// Number of chunks buffered between a blocking ZIP reader and its consumer
pub const ZIP_SOURCE_CHANNEL_DEPTH: usize = 2;

// Progress reporting
/// Progress reporting interval for uploads in seconds
pub const UPLOAD_PROGRESS_INTERVAL_SECS: u64 = 2;

// ZIP format constants
/// ZIP local file header signature
pub const ZIP_LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;

/// ZIP data descriptor signature
pub const ZIP_DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;

/// ZIP central directory header signature
pub const ZIP_CENTRAL_DIR_HEADER_SIGNATURE: u32 = 0x02014b50;

/// ZIP end of central directory signature
pub const ZIP_END_OF_CENTRAL_DIR_SIGNATURE: u32 = 0x06054b50;

/// ZIP64 end of central directory record signature
pub const ZIP64_END_OF_CENTRAL_DIR_SIGNATURE: u32 = 0x06064b50;

/// ZIP64 end of central directory locator signature
pub const ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE: u32 = 0x07064b50;

/// ZIP64 extended information extra field tag
pub const ZIP64_EXTRA_FIELD_TAG: u16 = 0x0001;

/// ZIP version needed to extract
pub const ZIP_VERSION_NEEDED: u16 = 20; // 2.0

/// ZIP version needed to extract ZIP64 entries
pub const ZIP64_VERSION_NEEDED: u16 = 45; // 4.5

/// Host system in the high byte of "version made by" (UNIX)
pub const ZIP_HOST_UNIX: u16 = 3 << 8;

/// ZIP compression method: deflate
pub const ZIP_COMPRESSION_METHOD_DEFLATE: u16 = 8;

/// ZIP compression method: store (no compression)
pub const ZIP_COMPRESSION_METHOD_STORE: u16 = 0;

/// General purpose flag: CRC and sizes follow the data in a descriptor
pub const ZIP_FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// General purpose flag: file name is UTF-8
pub const ZIP_FLAG_UTF8: u16 = 1 << 11;

/// Sentinel stored in 32-bit fields whose real value lives in the ZIP64 extra
pub const ZIP64_MARKER_U32: u32 = 0xFFFF_FFFF;

/// Sentinel stored in 16-bit entry counts when the ZIP64 trailer holds the value
pub const ZIP64_MARKER_U16: u16 = 0xFFFF;

/// Declared entry size from which an entry is written as ZIP64 up front.
///
/// Deflate can grow incompressible input slightly, so the threshold leaves
/// headroom below `u32::MAX` for the compressed size as well.
pub const ZIP64_ENTRY_THRESHOLD: u64 = 0xF000_0000;

/// Unix mode bits recorded for regular files (`-rw-r--r--`)
pub const UNIX_FILE_MODE: u32 = 0o100644;

/// Unix mode bits recorded for directories (`drwxr-xr-x`)
pub const UNIX_DIR_MODE: u32 = 0o040755;

/// MS-DOS directory attribute
pub const DOS_DIRECTORY_ATTRIBUTE: u32 = 0x10;

// File types that are not worth deflating again
pub const COMPRESSED_EXTENSIONS: &[&str] = &[
    "zip", "gz", "xz", "bz2", "7z", "rar", "jar", "war", "jpg", "jpeg", "png", "gif", "mp3",
    "mp4", "avi", "mov", "mpg", "mpeg", "woff", "woff2",
];

// Archive files accepted as an upload source
pub const ARCHIVE_SOURCE_EXTENSIONS: &[&str] = &["zip", "jar", "war", "ear"];

/// File mode reported to the controller for regular files
pub const RESOURCE_FILE_MODE: &str = "644";

// Default file names
pub const DEFAULT_CONFIG_NAME: &str = "cf-bits.yaml";
pub const PARTIAL_UPLOAD_SUFFIX: &str = "part";
