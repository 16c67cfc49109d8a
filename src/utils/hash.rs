use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::archive::{ArchiveEntry, SourceArchive};
use crate::constants::HASH_BUFFER_SIZE;
use crate::errors::{Result, UploadError};

/// Digest algorithms the controller reports for resources and packages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

/// Calculate the lowercase hex digest of an entry's content.
///
/// The content is streamed in fixed-size chunks; it is never held in full.
pub async fn digest_entry(entry: &ArchiveEntry, algorithm: ChecksumAlgorithm) -> Result<String> {
    match algorithm {
        ChecksumAlgorithm::Sha1 => digest_with::<Sha1>(entry).await,
        ChecksumAlgorithm::Sha256 => digest_with::<Sha256>(entry).await,
    }
}

async fn digest_with<D: Digest>(entry: &ArchiveEntry) -> Result<String> {
    let mut reader = entry.open().await?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .await
            .map_err(|e| UploadError::source_unavailable(entry.name(), e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let hash = hasher.finalize();
    Ok(hash.iter().map(|b| format!("{:02x}", b)).collect())
}

/// Compute the checksum of every entry of `archive`, keyed by entry name.
pub async fn compute_fingerprints(
    archive: &SourceArchive,
    algorithm: ChecksumAlgorithm,
) -> Result<HashMap<String, String>> {
    let mut checksums = HashMap::with_capacity(archive.len());

    for entry in archive.entries() {
        let checksum = digest_entry(entry, algorithm).await?;
        debug!("{} {:?} {}", entry.name(), algorithm, checksum);
        checksums.insert(entry.name().to_string(), checksum);
    }

    Ok(checksums)
}
