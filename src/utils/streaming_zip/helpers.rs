use chrono::{Datelike, Timelike};
use crc32fast::Hasher;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, ReadBuf};

/// DOS date for 1980-01-01, the earliest representable day
const DOS_EPOCH_DATE: u16 = (1 << 5) | 1;

/// Reader that tracks the CRC-32 and byte count of everything read through it.
///
/// Sits between an entry's content stream and the compressor, so both values
/// describe the uncompressed bytes.
pub struct ChecksumReader<R> {
    inner: R,
    hasher: Hasher,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> ChecksumReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Consume the reader, returning the CRC-32 and the uncompressed length.
    pub fn finalize(self) -> (u32, u64) {
        (self.hasher.finalize(), self.bytes_read)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ChecksumReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;

        let fresh = &buf.filled()[before..];
        this.hasher.update(fresh);
        this.bytes_read += fresh.len() as u64;

        Poll::Ready(Ok(()))
    }
}

/// Convert time to DOS format.
///
/// Entries without a timestamp get the DOS epoch so repeated encodes of the
/// same plan carry identical metadata.
pub fn dos_time(time: Option<SystemTime>) -> (u16, u16) {
    let Some(time) = time else {
        return (0, DOS_EPOCH_DATE);
    };

    let secs_since_epoch = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let Some(datetime) = chrono::DateTime::<chrono::Utc>::from_timestamp(secs_since_epoch as i64, 0)
    else {
        return (0, DOS_EPOCH_DATE);
    };
    let datetime = datetime.naive_utc();

    if datetime.year() < 1980 {
        return (0, DOS_EPOCH_DATE);
    }
    if datetime.year() > 2107 {
        // Latest representable instant: 2107-12-31 23:59:58
        return ((23 << 11) | (59 << 5) | 29, (127 << 9) | (12 << 5) | 31);
    }

    let year = datetime.year() as u16;
    let month = datetime.month() as u16;
    let day = datetime.day() as u16;
    let hour = datetime.hour() as u16;
    let minute = datetime.minute() as u16;
    let second = datetime.second() as u16;

    let date = ((year - 1980) << 9) | (month << 5) | day;
    let time = (hour << 11) | (minute << 5) | (second >> 1);

    (time, date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_checksum_reader_matches_crc32fast() {
        let data = b"The quick brown fox jumps over the lazy dog".to_vec();
        let mut reader = ChecksumReader::new(Cursor::new(data.clone()));

        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).await.unwrap();
        assert_eq!(reader.bytes_read(), data.len() as u64);

        let (crc, len) = reader.finalize();
        assert_eq!(crc, crc32fast::hash(&data));
        assert_eq!(crc, 0x414fa339);
        assert_eq!(len, data.len() as u64);
    }

    #[test]
    fn test_dos_time_without_timestamp_is_epoch() {
        assert_eq!(dos_time(None), (0, DOS_EPOCH_DATE));
    }

    #[test]
    fn test_dos_time_known_instant() {
        // 2024-01-15 14:30:52 UTC
        let time = UNIX_EPOCH + Duration::from_secs(1_705_329_052);
        let (time, date) = dos_time(Some(time));
        assert_eq!(date, (44 << 9) | (1 << 5) | 15);
        assert_eq!(time, (14 << 11) | (30 << 5) | 26);
    }

    #[test]
    fn test_dos_time_before_1980_clamps() {
        assert_eq!(dos_time(Some(UNIX_EPOCH)), (0, DOS_EPOCH_DATE));
    }
}
