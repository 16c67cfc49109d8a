use std::io;

use async_compression::tokio::bufread::DeflateEncoder;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use log::{debug, info};
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio_util::io::StreamReader;

use crate::archive::{ArchiveEntry, EntryReader};
use crate::constants::{
    DEFAULT_CHUNK_SIZE, ZIP64_ENTRY_THRESHOLD, ZIP64_MARKER_U16, ZIP64_MARKER_U32,
};
use crate::errors::{Result, UploadError};
use crate::selector::UploadPlan;
use crate::utils::streaming_zip::formats::{
    CentralDirectoryHeader, CompressionLevel, CompressionMethod, CompressionPolicy, DataDescriptor,
    DirectoryRecord, EndOfCentralDirectoryRecord, LocalFileHeader, Zip64EndOfCentralDirectoryLocator,
    Zip64EndOfCentralDirectoryRecord, CENTRAL_DIR_HEADER_LEN, END_OF_CENTRAL_DIR_LEN,
    LOCAL_FILE_HEADER_LEN, ZIP64_END_OF_CENTRAL_DIR_LEN, ZIP64_LOCAL_EXTRA_LEN, ZIP64_LOCATOR_LEN,
};
use crate::utils::streaming_zip::helpers::{dos_time, ChecksumReader};

/// Options for one encode pass
#[derive(Debug, Clone)]
pub struct EncoderOptions {
    /// Maximum number of bytes pulled from an entry per chunk
    pub chunk_size: usize,
    pub compression: CompressionPolicy,
    pub compression_level: CompressionLevel,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression: CompressionPolicy::default(),
            compression_level: CompressionLevel::default(),
        }
    }
}

/// Content of the entry currently being streamed
enum EntryBody {
    Stored(ChecksumReader<EntryReader>),
    Deflated(DeflateEncoder<BufReader<ChecksumReader<EntryReader>>>),
}

impl EntryBody {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            EntryBody::Stored(reader) => reader.read(buf).await,
            EntryBody::Deflated(reader) => reader.read(buf).await,
        }
    }

    /// CRC-32 and length of the uncompressed content consumed so far
    fn finish(self) -> (u32, u64) {
        let reader = match self {
            EntryBody::Stored(reader) => reader,
            EntryBody::Deflated(encoder) => encoder.into_inner().into_inner(),
        };
        reader.finalize()
    }
}

struct ActiveEntry<'a> {
    entry: &'a ArchiveEntry,
    body: EntryBody,
    local_header_offset: u64,
    compressed_size: u64,
    method: CompressionMethod,
    last_modified: (u16, u16),
    zip64: bool,
}

enum EncoderState<'a> {
    BeforeEntry(usize),
    StreamingContent(usize, ActiveEntry<'a>),
    EntryDone(usize, ActiveEntry<'a>),
    WritingDirectory,
    Done,
    Failed,
}

/// Pull-based ZIP encoder over an [`UploadPlan`].
///
/// Each call to [`next_chunk`](Self::next_chunk) advances a state machine:
/// a local header for the next entry, then its content as it is compressed,
/// then a data descriptor carrying the CRC and sizes observed while streaming.
/// After the last entry the central directory and its trailer are emitted in
/// one chunk. Only the current entry's content stream is ever open, and only
/// per-entry metadata is kept in memory.
///
/// The stream is single-use. Once a pull fails, or a pull is cancelled
/// mid-await, every later pull returns [`UploadError::StreamAborted`].
pub struct StreamingArchiveEncoder<'a> {
    plan: &'a UploadPlan<'a>,
    options: EncoderOptions,
    state: EncoderState<'a>,
    offset: u64,
    directory: Vec<DirectoryRecord>,
    chunk: Vec<u8>,
}

impl<'a> StreamingArchiveEncoder<'a> {
    pub fn new(plan: &'a UploadPlan<'a>, options: EncoderOptions) -> Self {
        let chunk = vec![0u8; options.chunk_size.max(1)];
        Self {
            plan,
            options,
            state: EncoderState::BeforeEntry(0),
            offset: 0,
            directory: Vec::with_capacity(plan.entry_count()),
            chunk,
        }
    }

    /// Bytes emitted so far
    pub fn bytes_emitted(&self) -> u64 {
        self.offset
    }

    /// Best-effort total size of the archive.
    ///
    /// Exact when every entry is stored; deflated entries are counted at their
    /// uncompressed size since the ratio is unknown until they are encoded.
    pub fn size_hint(&self) -> u64 {
        let mut offset = 0u64;
        let mut directory_size = 0u64;

        for entry in self.plan.entries() {
            let name_len = entry.name().len() as u64;
            let zip64 = entry.size() >= ZIP64_ENTRY_THRESHOLD;

            let mut widened = 0u64;
            if offset >= ZIP64_MARKER_U32 as u64 {
                widened += 1;
            }
            if entry.size() >= ZIP64_MARKER_U32 as u64 {
                widened += 2;
            }
            let extra = if widened > 0 { 4 + widened * 8 } else { 0 };
            directory_size += CENTRAL_DIR_HEADER_LEN + name_len + extra;

            offset += LOCAL_FILE_HEADER_LEN + name_len;
            if zip64 {
                offset += ZIP64_LOCAL_EXTRA_LEN;
            }
            offset += entry.size() + DataDescriptor::encoded_len(zip64);
        }

        let mut total = offset + directory_size + END_OF_CENTRAL_DIR_LEN;
        if needs_zip64_trailer(self.plan.entry_count() as u64, directory_size, offset) {
            total += ZIP64_END_OF_CENTRAL_DIR_LEN + ZIP64_LOCATOR_LEN;
        }
        total
    }

    /// Pull the next chunk of the archive. `Ok(None)` marks the end.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            // Until a state is put back, a dropped future leaves the encoder failed
            match std::mem::replace(&mut self.state, EncoderState::Failed) {
                EncoderState::BeforeEntry(index) => {
                    let Some(entry) = self.plan.entries().get(index).copied() else {
                        self.state = EncoderState::WritingDirectory;
                        continue;
                    };

                    let (active, header) =
                        Self::start_entry(&self.options, self.chunk.len(), self.offset, entry).await?;
                    self.offset += header.len() as u64;
                    self.state = EncoderState::StreamingContent(index, active);
                    return Ok(Some(header));
                }
                EncoderState::StreamingContent(index, mut active) => {
                    let bytes_read = active
                        .body
                        .read(&mut self.chunk)
                        .await
                        .map_err(|e| UploadError::source_unavailable(active.entry.name(), e))?;

                    if bytes_read == 0 {
                        self.state = EncoderState::EntryDone(index, active);
                        continue;
                    }

                    active.compressed_size += bytes_read as u64;
                    self.offset += bytes_read as u64;
                    self.state = EncoderState::StreamingContent(index, active);
                    return Ok(Some(Bytes::copy_from_slice(&self.chunk[..bytes_read])));
                }
                EncoderState::EntryDone(index, active) => {
                    let descriptor = self.finish_entry(active)?;
                    self.offset += descriptor.len() as u64;
                    self.state = EncoderState::BeforeEntry(index + 1);
                    return Ok(Some(descriptor));
                }
                EncoderState::WritingDirectory => {
                    let directory = self.write_directory();
                    self.state = EncoderState::Done;
                    return Ok(Some(directory));
                }
                EncoderState::Done => {
                    self.state = EncoderState::Done;
                    return Ok(None);
                }
                EncoderState::Failed => return Err(UploadError::StreamAborted),
            }
        }
    }

    /// Open `entry` and build its local header, placed at `offset`.
    async fn start_entry(
        options: &EncoderOptions,
        chunk_len: usize,
        offset: u64,
        entry: &'a ArchiveEntry,
    ) -> Result<(ActiveEntry<'a>, Bytes)> {
        if entry.name().len() > u16::MAX as usize {
            return Err(UploadError::NameTooLong {
                name_len: entry.name().len(),
            });
        }

        let reader = entry.open().await.map_err(|e| match e {
            UploadError::SourceUnavailable { .. } => e,
            other => UploadError::source_unavailable(entry.name(), other),
        })?;

        let method = options.compression.method_for(entry);
        let zip64 = entry.size() >= ZIP64_ENTRY_THRESHOLD;
        let last_modified = dos_time(entry.last_modified());

        let checked = ChecksumReader::new(reader);
        let body = match method {
            CompressionMethod::Stored => EntryBody::Stored(checked),
            CompressionMethod::Deflated => EntryBody::Deflated(DeflateEncoder::with_quality(
                BufReader::with_capacity(chunk_len, checked),
                options.compression_level.into(),
            )),
        };

        let mut bytes = BytesMut::new();
        LocalFileHeader::deferred(entry.name(), method, last_modified, zip64).encode(&mut bytes);

        debug!(
            "Streaming {} ({} bytes, {:?}{}) at offset {}",
            entry.name(),
            entry.size(),
            method,
            if zip64 { ", zip64" } else { "" },
            offset
        );

        let active = ActiveEntry {
            entry,
            body,
            local_header_offset: offset,
            compressed_size: 0,
            method,
            last_modified,
            zip64,
        };

        Ok((active, bytes.freeze()))
    }

    /// Close the content stream, record the entry and build its descriptor.
    fn finish_entry(&mut self, active: ActiveEntry<'a>) -> Result<Bytes> {
        let ActiveEntry {
            entry,
            body,
            local_header_offset,
            compressed_size,
            method,
            last_modified,
            zip64,
        } = active;
        let (crc32, uncompressed_size) = body.finish();

        if uncompressed_size != entry.size() {
            let reason = io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "content changed: expected {} bytes, read {}",
                    entry.size(),
                    uncompressed_size
                ),
            );
            return Err(UploadError::source_unavailable(entry.name(), reason));
        }
        if !zip64 && compressed_size >= ZIP64_MARKER_U32 as u64 {
            return Err(UploadError::EntryOverflow {
                name: entry.name().to_string(),
            });
        }

        let mut bytes = BytesMut::new();
        DataDescriptor {
            crc32,
            compressed_size,
            uncompressed_size,
            zip64,
        }
        .encode(&mut bytes);

        debug!(
            "Finished {}: crc32={:08x} compressed={} uncompressed={}",
            entry.name(),
            crc32,
            compressed_size,
            uncompressed_size
        );

        self.directory.push(DirectoryRecord {
            name: entry.name().to_string(),
            crc32,
            compressed_size,
            uncompressed_size,
            local_header_offset,
            compression_method: method,
            last_mod_time: last_modified.0,
            last_mod_date: last_modified.1,
            is_directory: entry.is_directory(),
            zip64,
        });

        Ok(bytes.freeze())
    }

    /// Central directory records followed by the end-of-directory trailer
    fn write_directory(&mut self) -> Bytes {
        let mut bytes = BytesMut::new();
        let central_dir_offset = self.offset;

        for record in &self.directory {
            let header: CentralDirectoryHeader = record.central_header();
            header.encode(&mut bytes);
        }

        let central_dir_size = bytes.len() as u64;
        let total_entries = self.directory.len() as u64;

        if needs_zip64_trailer(total_entries, central_dir_size, central_dir_offset) {
            Zip64EndOfCentralDirectoryRecord {
                total_entries,
                central_dir_size,
                central_dir_offset,
            }
            .encode(&mut bytes);
            Zip64EndOfCentralDirectoryLocator {
                record_offset: central_dir_offset + central_dir_size,
            }
            .encode(&mut bytes);
        }

        let entries_u16 = u16::try_from(total_entries)
            .ok()
            .filter(|n| *n < ZIP64_MARKER_U16)
            .unwrap_or(ZIP64_MARKER_U16);

        EndOfCentralDirectoryRecord {
            disk_number: 0,
            central_dir_disk: 0,
            disk_entries: entries_u16,
            total_entries: entries_u16,
            central_dir_size: clamp_u32(central_dir_size),
            central_dir_offset: clamp_u32(central_dir_offset),
            comment: Vec::new(),
        }
        .encode(&mut bytes);

        self.offset += bytes.len() as u64;
        info!(
            "Archive complete: {} entries, {} bytes",
            total_entries, self.offset
        );

        bytes.freeze()
    }

    /// Turn the encoder into a stream of chunks that ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send + 'a {
        futures::stream::unfold(Some(self), |encoder| async move {
            let mut encoder = encoder?;
            match encoder.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(encoder))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    /// Expose the archive as an `AsyncRead` for transports that consume readers.
    pub fn into_async_read(self) -> impl AsyncRead + Send + 'a {
        let chunks = self.into_stream().map(|chunk| chunk.map_err(io::Error::from));
        StreamReader::new(Box::pin(chunks))
    }
}

fn needs_zip64_trailer(total_entries: u64, central_dir_size: u64, central_dir_offset: u64) -> bool {
    total_entries >= ZIP64_MARKER_U16 as u64
        || central_dir_size >= ZIP64_MARKER_U32 as u64
        || central_dir_offset >= ZIP64_MARKER_U32 as u64
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value)
        .ok()
        .filter(|v| *v < ZIP64_MARKER_U32)
        .unwrap_or(ZIP64_MARKER_U32)
}
