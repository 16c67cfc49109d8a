//! Utilities behind the upload pipeline.
//!
//! ## Components
//!
//! - **Hashing**: SHA-1 / SHA-256 digests of entry content for fingerprints
//! - **Streaming ZIP**: the pull-based archive encoder
//!
//! ### Encoding a plan
//!
//! ```no_run
//! use cf_bits::archive::{ArchiveOptions, SourceArchive};
//! use cf_bits::selector::UploadPlan;
//! use cf_bits::utils::streaming_zip::{EncoderOptions, StreamingArchiveEncoder};
//!
//! # async fn example() -> cf_bits::errors::Result<()> {
//! let archive = SourceArchive::from_directory("/srv/app", &ArchiveOptions::default())?;
//! let plan = UploadPlan::all(&archive);
//! let mut encoder = StreamingArchiveEncoder::new(&plan, EncoderOptions::default());
//!
//! while let Some(chunk) = encoder.next_chunk().await? {
//!     // hand `chunk` to the transport
//!     let _ = chunk;
//! }
//! # Ok(())
//! # }
//! ```

/// Content digests used as fingerprints
pub mod hash;

/// Streaming ZIP encoding with deferred per-entry metadata
pub mod streaming_zip;
