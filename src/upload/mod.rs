//! Driving an encoded archive into a transport.
//!
//! The HTTP transport to the controller lives outside this crate; it plugs in
//! by implementing [`UploadTarget`]. [`FileTarget`] writes the archive to
//! local storage and backs the `pack` command.
//!
//! ```no_run
//! use cf_bits::archive::{ArchiveOptions, SourceArchive};
//! use cf_bits::selector::KnownFingerprints;
//! use cf_bits::upload::{prepare_and_upload, FileTarget, UploadOutcome};
//! use cf_bits::utils::hash::ChecksumAlgorithm;
//! use cf_bits::utils::streaming_zip::EncoderOptions;
//!
//! # async fn example() -> cf_bits::errors::Result<()> {
//! let archive = SourceArchive::from_directory("/srv/app", &ArchiveOptions::default())?;
//! let target = FileTarget::create("/tmp/bits.zip").await?;
//!
//! match prepare_and_upload(
//!     &archive,
//!     &KnownFingerprints::new(),
//!     ChecksumAlgorithm::Sha1,
//!     &EncoderOptions::default(),
//!     target,
//! )
//! .await?
//! {
//!     UploadOutcome::NothingToUpload => println!("nothing to upload"),
//!     UploadOutcome::Uploaded(summary) => println!("sent {} bytes", summary.bytes_sent),
//! }
//! # Ok(())
//! # }
//! ```

mod core;
mod file_target;
mod target;

pub use self::core::{prepare_and_upload, upload_plan, ProgressTracker, UploadOutcome, UploadSummary};
pub use file_target::FileTarget;
pub use target::UploadTarget;
