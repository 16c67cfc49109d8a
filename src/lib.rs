//! # cf-bits
//!
//! Incremental application-bits packaging for Cloud Foundry style
//! controllers.
//!
//! ## Overview
//!
//! Pushing an application means sending its files to the controller. Most of
//! those files are usually already stored there from an earlier push, so the
//! client fingerprints every file, asks the controller which fingerprints it
//! knows, and uploads a ZIP containing only the rest. The ZIP is produced
//! incrementally so memory stays bounded no matter how large the
//! application is.
//!
//! ## Features
//!
//! - **Two source shapes**: exploded directories and existing ZIP/JAR/WAR files
//! - **Fingerprint selection**: exclude entries by `(name, checksum)` identity
//! - **Pull-based encoding**: chunks are produced only when the consumer asks
//! - **ZIP64**: large entries, offsets and entry counts
//! - **YAML configuration**: chunk size, compression and checksum algorithm
//!
//! ## Usage
//!
//! ```no_run
//! use cf_bits::archive::{ArchiveOptions, SourceArchive};
//! use cf_bits::selector::{KnownFingerprints, UploadSelector};
//! use cf_bits::utils::hash::{compute_fingerprints, ChecksumAlgorithm};
//! use cf_bits::utils::streaming_zip::{EncoderOptions, StreamingArchiveEncoder};
//!
//! # async fn example() -> cf_bits::errors::Result<()> {
//! let archive = SourceArchive::open_path("app.war", &ArchiveOptions::default())?;
//! let checksums = compute_fingerprints(&archive, ChecksumAlgorithm::Sha1).await?;
//!
//! let known: KnownFingerprints = vec![("WEB-INF/lib/spring.jar", "0a1b2c")].into_iter().collect();
//! let plan = UploadSelector::select_with(&archive, &known, &checksums)?;
//!
//! let mut encoder = StreamingArchiveEncoder::new(&plan, EncoderOptions::default());
//! while let Some(chunk) = encoder.next_chunk().await? {
//!     println!("{} bytes", chunk.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`archive`]: Source archives and their entries
//! - [`selector`]: Fingerprints and upload plans
//! - [`resource_match`]: Resource-match request and response bodies
//! - [`utils`]: Hashing and the streaming ZIP encoder
//! - [`upload`]: Upload targets and the end-to-end pipeline
//! - [`config`]: YAML configuration
//! - [`errors`]: Error type shared by the library
//! - [`constants`]: Application-wide constants

/// Source archives: directories, ZIP files, in-memory entries
pub mod archive;

/// Configuration management
pub mod config;

/// Application constants and configuration values
pub mod constants;

/// Library error type
pub mod errors;

/// Controller resource-match payloads
pub mod resource_match;

/// Choosing which entries to upload
pub mod selector;

/// Upload targets and pipeline
pub mod upload;

/// Hashing and streaming ZIP encoding
pub mod utils;
