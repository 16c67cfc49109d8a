use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;

use crate::archive::SourceArchive;
use crate::constants::UPLOAD_PROGRESS_INTERVAL_SECS;
use crate::errors::{Result, UploadError};
use crate::selector::{KnownFingerprints, UploadPlan, UploadSelector};
use crate::upload::target::UploadTarget;
use crate::utils::hash::{compute_fingerprints, ChecksumAlgorithm};
use crate::utils::streaming_zip::{EncoderOptions, StreamingArchiveEncoder};

/// Progress tracker for streaming uploads
pub struct ProgressTracker {
    total_size: u64,
    bytes_uploaded: Arc<AtomicU64>,
    start_time: Instant,
    last_percentage: u8,
}

impl ProgressTracker {
    /// Create a new progress tracker; `total_size` is the encoder's size hint
    pub fn new(total_size: u64, bytes_uploaded: Arc<AtomicU64>) -> Self {
        Self {
            total_size,
            bytes_uploaded,
            start_time: Instant::now(),
            last_percentage: 0,
        }
    }

    /// Start tracking progress in a background task
    pub fn start_tracking(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if self.total_size == 0 {
                return;
            }

            loop {
                sleep(Duration::from_secs(UPLOAD_PROGRESS_INTERVAL_SECS)).await;

                let bytes_uploaded = self.bytes_uploaded.load(Ordering::SeqCst);
                // The size hint overestimates deflated entries, so cap at 99%
                let percentage = ((bytes_uploaded as f64 / self.total_size as f64) * 100.0).min(99.0) as u8;

                // Report progress if it's changed by at least 5%
                if percentage >= self.last_percentage + 5 {
                    let elapsed = self.start_time.elapsed().as_secs_f64();
                    let speed = if elapsed > 0.0 { bytes_uploaded as f64 / elapsed / 1024.0 / 1024.0 } else { 0.0 };

                    info!("Upload progress: ~{}% ({}/~{} bytes, {:.2} MB/s)",
                          percentage, bytes_uploaded, self.total_size, speed);
                    self.last_percentage = percentage;
                }
            }
        })
    }
}

/// Result of an upload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The controller already had every entry; nothing was sent
    NothingToUpload,
    Uploaded(UploadSummary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub entry_count: usize,
    pub excluded_count: usize,
    pub uncompressed_bytes: u64,
    pub bytes_sent: u64,
    pub elapsed: Duration,
}

/// Encode `plan` and stream it into `target`.
///
/// An empty plan aborts the target without writing anything. On any failure
/// the target is aborted and the error returned; the caller decides whether
/// to rerun the whole pipeline.
pub async fn upload_plan<T: UploadTarget>(
    plan: &UploadPlan<'_>,
    options: &EncoderOptions,
    mut target: T,
) -> Result<UploadOutcome> {
    if plan.is_empty() {
        info!(
            "All {} entries already known to the controller, skipping upload",
            plan.excluded_count()
        );
        target.abort().await?;
        return Ok(UploadOutcome::NothingToUpload);
    }

    let target_name = target.target_name();
    info!(
        "Uploading {} entries ({} bytes uncompressed) to {}",
        plan.entry_count(),
        plan.total_uncompressed_size(),
        target_name
    );

    let start = Instant::now();
    let mut encoder = StreamingArchiveEncoder::new(plan, options.clone());

    // Track upload progress
    let bytes_sent = Arc::new(AtomicU64::new(0));
    let progress_handle = ProgressTracker::new(encoder.size_hint(), Arc::clone(&bytes_sent)).start_tracking();

    let result = pump(&mut encoder, &mut target, &bytes_sent).await;
    progress_handle.abort();
    // Release the open entry and compressor before completing or aborting
    drop(encoder);

    match result {
        Ok(()) => {
            target.complete().await?;
            let summary = UploadSummary {
                entry_count: plan.entry_count(),
                excluded_count: plan.excluded_count(),
                uncompressed_bytes: plan.total_uncompressed_size(),
                bytes_sent: bytes_sent.load(Ordering::SeqCst),
                elapsed: start.elapsed(),
            };
            info!(
                "Upload completed: {} bytes sent to {} in {:?}",
                summary.bytes_sent, target_name, summary.elapsed
            );
            Ok(UploadOutcome::Uploaded(summary))
        }
        Err(e) => {
            warn!("Upload to {} failed, aborting: {}", target_name, e);
            if let Err(abort_err) = target.abort().await {
                warn!("Failed to abort upload to {}: {}", target_name, abort_err);
            }
            Err(e)
        }
    }
}

/// Pull every chunk from the encoder and write it to the target
async fn pump<T: UploadTarget>(
    encoder: &mut StreamingArchiveEncoder<'_>,
    target: &mut T,
    bytes_sent: &AtomicU64,
) -> Result<()> {
    let target_error = |target: &T, err: std::io::Error| UploadError::Target {
        target: target.target_name(),
        source: err.into(),
    };

    while let Some(chunk) = encoder.next_chunk().await? {
        if let Err(e) = target.write_all(&chunk).await {
            return Err(target_error(&*target, e));
        }
        bytes_sent.fetch_add(chunk.len() as u64, Ordering::SeqCst);
    }

    if let Err(e) = target.flush().await {
        return Err(target_error(&*target, e));
    }
    Ok(())
}

/// Run the whole pipeline: fingerprint, select, encode, upload.
pub async fn prepare_and_upload<T: UploadTarget>(
    archive: &SourceArchive,
    known: &KnownFingerprints,
    algorithm: ChecksumAlgorithm,
    options: &EncoderOptions,
    target: T,
) -> Result<UploadOutcome> {
    info!("Fingerprinting {} entries ({} bytes)", archive.len(), archive.total_size());
    let checksums = compute_fingerprints(archive, algorithm).await?;
    let plan = UploadSelector::select_with(archive, known, &checksums)?;

    upload_plan(&plan, options, target).await
}
