use async_compression::Level;
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::archive::ArchiveEntry;
use crate::constants::{
    COMPRESSED_EXTENSIONS, DOS_DIRECTORY_ATTRIBUTE, UNIX_DIR_MODE, UNIX_FILE_MODE,
    ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE, ZIP64_END_OF_CENTRAL_DIR_SIGNATURE,
    ZIP64_EXTRA_FIELD_TAG, ZIP64_MARKER_U32, ZIP64_VERSION_NEEDED,
    ZIP_CENTRAL_DIR_HEADER_SIGNATURE as CENTRAL_DIR_HEADER_SIGNATURE,
    ZIP_COMPRESSION_METHOD_DEFLATE, ZIP_COMPRESSION_METHOD_STORE,
    ZIP_DATA_DESCRIPTOR_SIGNATURE as DATA_DESCRIPTOR_SIGNATURE,
    ZIP_END_OF_CENTRAL_DIR_SIGNATURE as END_OF_CENTRAL_DIR_SIGNATURE, ZIP_FLAG_DATA_DESCRIPTOR,
    ZIP_FLAG_UTF8, ZIP_HOST_UNIX,
    ZIP_LOCAL_FILE_HEADER_SIGNATURE as LOCAL_FILE_HEADER_SIGNATURE, ZIP_VERSION_NEEDED,
};

/// Fixed part of a local file header
pub const LOCAL_FILE_HEADER_LEN: u64 = 30;
/// Fixed part of a central directory header
pub const CENTRAL_DIR_HEADER_LEN: u64 = 46;
/// End of central directory record without comment
pub const END_OF_CENTRAL_DIR_LEN: u64 = 22;
/// ZIP64 end of central directory record
pub const ZIP64_END_OF_CENTRAL_DIR_LEN: u64 = 56;
/// ZIP64 end of central directory locator
pub const ZIP64_LOCATOR_LEN: u64 = 20;
/// Local ZIP64 extra field: tag, length and two zeroed sizes
pub const ZIP64_LOCAL_EXTRA_LEN: u64 = 20;

/// Compression method applied to one entry
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CompressionMethod {
    Stored,
    Deflated,
}

impl CompressionMethod {
    pub fn code(self) -> u16 {
        match self {
            CompressionMethod::Stored => ZIP_COMPRESSION_METHOD_STORE,
            CompressionMethod::Deflated => ZIP_COMPRESSION_METHOD_DEFLATE,
        }
    }
}

/// How the encoder picks a compression method per entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionPolicy {
    /// Store directories and already-compressed file types, deflate the rest
    #[default]
    Auto,
    Stored,
    Deflated,
}

impl CompressionPolicy {
    pub fn method_for(self, entry: &ArchiveEntry) -> CompressionMethod {
        match self {
            CompressionPolicy::Stored => CompressionMethod::Stored,
            _ if entry.is_directory() => CompressionMethod::Stored,
            CompressionPolicy::Deflated => CompressionMethod::Deflated,
            CompressionPolicy::Auto => {
                let already_compressed = entry
                    .name()
                    .rsplit_once('.')
                    .map(|(_, ext)| COMPRESSED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false);

                if already_compressed {
                    CompressionMethod::Stored
                } else {
                    CompressionMethod::Deflated
                }
            }
        }
    }
}

/// Deflate effort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Fastest,
    #[default]
    Default,
    Best,
}

impl From<CompressionLevel> for Level {
    fn from(level: CompressionLevel) -> Self {
        match level {
            CompressionLevel::Fastest => Level::Fastest,
            CompressionLevel::Default => Level::Default,
            CompressionLevel::Best => Level::Best,
        }
    }
}

/// Metadata remembered for each streamed entry until the central directory
/// is written.
#[derive(Debug, Clone)]
pub struct DirectoryRecord {
    pub name: String,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub local_header_offset: u64,
    pub compression_method: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub is_directory: bool,
    pub zip64: bool,
}

impl DirectoryRecord {
    /// Build the central directory header, moving any value that does not
    /// fit 32 bits into a ZIP64 extra field.
    pub fn central_header(&self) -> CentralDirectoryHeader {
        let mut extra = Zip64ExtraField::default();
        let uncompressed_size = fit_u32(self.uncompressed_size, &mut extra.uncompressed_size);
        let compressed_size = fit_u32(self.compressed_size, &mut extra.compressed_size);
        let local_header_offset = fit_u32(self.local_header_offset, &mut extra.local_header_offset);

        let version_needed = if self.zip64 || !extra.is_empty() {
            ZIP64_VERSION_NEEDED
        } else {
            ZIP_VERSION_NEEDED
        };

        let external_file_attributes = if self.is_directory {
            (UNIX_DIR_MODE << 16) | DOS_DIRECTORY_ATTRIBUTE
        } else {
            UNIX_FILE_MODE << 16
        };

        CentralDirectoryHeader {
            version_made_by: ZIP_HOST_UNIX | version_needed,
            version_needed,
            bit_flag: entry_flags(),
            compression_method: self.compression_method.code(),
            last_mod_time: self.last_mod_time,
            last_mod_date: self.last_mod_date,
            crc32: self.crc32,
            compressed_size,
            uncompressed_size,
            disk_number_start: 0,
            internal_file_attributes: 0,
            external_file_attributes,
            local_header_offset,
            file_name: self.name.as_bytes().to_vec(),
            extra_field: extra.encode(),
            file_comment: Vec::new(),
        }
    }
}

/// General purpose flags used for every entry: sizes deferred, UTF-8 names
pub fn entry_flags() -> u16 {
    ZIP_FLAG_DATA_DESCRIPTOR | ZIP_FLAG_UTF8
}

/// Store `value` in 32 bits, or the ZIP64 marker with the value moved to `slot`
fn fit_u32(value: u64, slot: &mut Option<u64>) -> u32 {
    if value >= ZIP64_MARKER_U32 as u64 {
        *slot = Some(value);
        ZIP64_MARKER_U32
    } else {
        value as u32
    }
}

/// ZIP64 extended information extra field.
///
/// Only the values whose 32-bit header field holds the marker are present,
/// in the fixed order uncompressed, compressed, offset.
#[derive(Debug, Default, Clone)]
pub struct Zip64ExtraField {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub local_header_offset: Option<u64>,
}

impl Zip64ExtraField {
    pub fn is_empty(&self) -> bool {
        self.uncompressed_size.is_none()
            && self.compressed_size.is_none()
            && self.local_header_offset.is_none()
    }

    pub fn encode(&self) -> Vec<u8> {
        if self.is_empty() {
            return Vec::new();
        }

        let values: Vec<u64> = [self.uncompressed_size, self.compressed_size, self.local_header_offset]
            .into_iter()
            .flatten()
            .collect();

        let mut bytes = BytesMut::with_capacity(4 + values.len() * 8);
        bytes.put_u16_le(ZIP64_EXTRA_FIELD_TAG);
        bytes.put_u16_le((values.len() * 8) as u16);
        for value in values {
            bytes.put_u64_le(value);
        }
        bytes.to_vec()
    }
}

/// Local file header structure
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub bit_flag: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name: Vec<u8>,
    pub extra_field: Vec<u8>,
}

impl LocalFileHeader {
    /// Header for an entry whose CRC and sizes follow in a data descriptor.
    ///
    /// ZIP64 entries mark both sizes and carry a zeroed ZIP64 extra field, which
    /// tells readers the descriptor uses 8-byte sizes.
    pub fn deferred(
        name: &str,
        method: CompressionMethod,
        (last_mod_time, last_mod_date): (u16, u16),
        zip64: bool,
    ) -> Self {
        let (version_needed, size_field, extra_field) = if zip64 {
            let extra = Zip64ExtraField {
                uncompressed_size: Some(0),
                compressed_size: Some(0),
                local_header_offset: None,
            };
            (ZIP64_VERSION_NEEDED, ZIP64_MARKER_U32, extra.encode())
        } else {
            (ZIP_VERSION_NEEDED, 0, Vec::new())
        };

        Self {
            version_needed,
            bit_flag: entry_flags(),
            compression_method: method.code(),
            last_mod_time,
            last_mod_date,
            crc32: 0,
            compressed_size: size_field,
            uncompressed_size: size_field,
            file_name: name.as_bytes().to_vec(),
            extra_field,
        }
    }

    pub fn encode(&self, bytes: &mut BytesMut) -> u64 {
        let start = bytes.len();

        bytes.put_u32_le(LOCAL_FILE_HEADER_SIGNATURE);
        bytes.put_u16_le(self.version_needed);
        bytes.put_u16_le(self.bit_flag);
        bytes.put_u16_le(self.compression_method);
        bytes.put_u16_le(self.last_mod_time);
        bytes.put_u16_le(self.last_mod_date);
        bytes.put_u32_le(self.crc32);
        bytes.put_u32_le(self.compressed_size);
        bytes.put_u32_le(self.uncompressed_size);
        bytes.put_u16_le(self.file_name.len() as u16);
        bytes.put_u16_le(self.extra_field.len() as u16);
        bytes.put_slice(&self.file_name);
        bytes.put_slice(&self.extra_field);

        (bytes.len() - start) as u64
    }
}

/// Data descriptor written after an entry's content
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub zip64: bool,
}

impl DataDescriptor {
    pub fn encoded_len(zip64: bool) -> u64 {
        if zip64 {
            24
        } else {
            16
        }
    }

    pub fn encode(&self, bytes: &mut BytesMut) -> u64 {
        let start = bytes.len();

        bytes.put_u32_le(DATA_DESCRIPTOR_SIGNATURE);
        bytes.put_u32_le(self.crc32);
        if self.zip64 {
            bytes.put_u64_le(self.compressed_size);
            bytes.put_u64_le(self.uncompressed_size);
        } else {
            bytes.put_u32_le(self.compressed_size as u32);
            bytes.put_u32_le(self.uncompressed_size as u32);
        }

        (bytes.len() - start) as u64
    }
}

/// Central directory header structure
pub struct CentralDirectoryHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub bit_flag: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number_start: u16,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub local_header_offset: u32,
    pub file_name: Vec<u8>,
    pub extra_field: Vec<u8>,
    pub file_comment: Vec<u8>,
}

impl CentralDirectoryHeader {
    pub fn encode(&self, bytes: &mut BytesMut) -> u64 {
        let start = bytes.len();

        bytes.put_u32_le(CENTRAL_DIR_HEADER_SIGNATURE);
        bytes.put_u16_le(self.version_made_by);
        bytes.put_u16_le(self.version_needed);
        bytes.put_u16_le(self.bit_flag);
        bytes.put_u16_le(self.compression_method);
        bytes.put_u16_le(self.last_mod_time);
        bytes.put_u16_le(self.last_mod_date);
        bytes.put_u32_le(self.crc32);
        bytes.put_u32_le(self.compressed_size);
        bytes.put_u32_le(self.uncompressed_size);
        bytes.put_u16_le(self.file_name.len() as u16);
        bytes.put_u16_le(self.extra_field.len() as u16);
        bytes.put_u16_le(self.file_comment.len() as u16);
        bytes.put_u16_le(self.disk_number_start);
        bytes.put_u16_le(self.internal_file_attributes);
        bytes.put_u32_le(self.external_file_attributes);
        bytes.put_u32_le(self.local_header_offset);
        bytes.put_slice(&self.file_name);
        bytes.put_slice(&self.extra_field);
        bytes.put_slice(&self.file_comment);

        (bytes.len() - start) as u64
    }
}

/// ZIP64 end of central directory record
pub struct Zip64EndOfCentralDirectoryRecord {
    pub total_entries: u64,
    pub central_dir_size: u64,
    pub central_dir_offset: u64,
}

impl Zip64EndOfCentralDirectoryRecord {
    pub fn encode(&self, bytes: &mut BytesMut) -> u64 {
        let start = bytes.len();

        bytes.put_u32_le(ZIP64_END_OF_CENTRAL_DIR_SIGNATURE);
        // Size of the remaining record
        bytes.put_u64_le(ZIP64_END_OF_CENTRAL_DIR_LEN - 12);
        bytes.put_u16_le(ZIP_HOST_UNIX | ZIP64_VERSION_NEEDED);
        bytes.put_u16_le(ZIP64_VERSION_NEEDED);
        bytes.put_u32_le(0);
        bytes.put_u32_le(0);
        bytes.put_u64_le(self.total_entries);
        bytes.put_u64_le(self.total_entries);
        bytes.put_u64_le(self.central_dir_size);
        bytes.put_u64_le(self.central_dir_offset);

        (bytes.len() - start) as u64
    }
}

/// ZIP64 end of central directory locator
pub struct Zip64EndOfCentralDirectoryLocator {
    pub record_offset: u64,
}

impl Zip64EndOfCentralDirectoryLocator {
    pub fn encode(&self, bytes: &mut BytesMut) -> u64 {
        let start = bytes.len();

        bytes.put_u32_le(ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE);
        bytes.put_u32_le(0);
        bytes.put_u64_le(self.record_offset);
        bytes.put_u32_le(1);

        (bytes.len() - start) as u64
    }
}

/// End of central directory record structure
pub struct EndOfCentralDirectoryRecord {
    pub disk_number: u16,
    pub central_dir_disk: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub central_dir_size: u32,
    pub central_dir_offset: u32,
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectoryRecord {
    pub fn encode(&self, bytes: &mut BytesMut) -> u64 {
        let start = bytes.len();

        bytes.put_u32_le(END_OF_CENTRAL_DIR_SIGNATURE);
        bytes.put_u16_le(self.disk_number);
        bytes.put_u16_le(self.central_dir_disk);
        bytes.put_u16_le(self.disk_entries);
        bytes.put_u16_le(self.total_entries);
        bytes.put_u32_le(self.central_dir_size);
        bytes.put_u32_le(self.central_dir_offset);
        bytes.put_u16_le(self.comment.len() as u16);
        bytes.put_slice(&self.comment);

        (bytes.len() - start) as u64
    }
}
