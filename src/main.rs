use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use tokio::runtime::Runtime;

use cf_bits::archive::SourceArchive;
use cf_bits::config::{load_or_default, UploadConfig};
use cf_bits::resource_match::ResourceMatch;
use cf_bits::selector::{KnownFingerprints, UploadSelector};
use cf_bits::upload::{upload_plan, FileTarget, UploadOutcome};
use cf_bits::utils::hash::compute_fingerprints;

mod cli;

use cli::{Args, Commands};

fn main() -> Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Initialize logging
    initialize_logging(args.verbose)?;

    let config = load_or_default(args.config.as_deref())?;
    let runtime = Runtime::new().context("Failed to create tokio runtime")?;

    match args.command {
        Commands::Fingerprints { source } => runtime.block_on(print_fingerprints(&source, &config)),
        Commands::Plan { source, known } => runtime.block_on(show_plan(&source, known.as_deref(), &config)),
        Commands::Pack { source, known, output } => {
            runtime.block_on(pack(&source, known.as_deref(), &output, &config))
        }
        Commands::InitConfig { path } => {
            info!("Creating default configuration file at {}", path.display());
            UploadConfig::default().save_to_yaml_file(&path)
        }
    }
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ).context("Failed to initialize logger")?;
    Ok(())
}

fn open_source(source: &Path, config: &UploadConfig) -> Result<SourceArchive> {
    SourceArchive::open_path(source, &config.archive_options())
        .context(format!("Failed to read application source {}", source.display()))
}

fn load_known(path: Option<&Path>) -> Result<KnownFingerprints> {
    let Some(path) = path else {
        return Ok(KnownFingerprints::new());
    };

    let json = fs::read_to_string(path)
        .context(format!("Failed to read resource-match response {}", path.display()))?;
    let known = ResourceMatch::from_json(&json)
        .context(format!("Failed to parse resource-match response {}", path.display()))?
        .into_known_fingerprints();

    info!("Controller already has {} resources", known.len());
    Ok(known)
}

async fn print_fingerprints(source: &Path, config: &UploadConfig) -> Result<()> {
    let archive = open_source(source, config)?;
    let checksums = compute_fingerprints(&archive, config.checksum_algorithm).await?;
    let request = ResourceMatch::from_archive(&archive, &checksums)?;

    println!("{}", request.to_json()?);
    Ok(())
}

async fn show_plan(source: &Path, known: Option<&Path>, config: &UploadConfig) -> Result<()> {
    let archive = open_source(source, config)?;
    let known = load_known(known)?;
    let checksums = compute_fingerprints(&archive, config.checksum_algorithm).await?;
    let plan = UploadSelector::select_with(&archive, &known, &checksums)?;

    for entry in plan.entries() {
        println!("{:>12}  {}", entry.size(), entry.name());
    }
    info!(
        "{} of {} entries to upload ({} of {} bytes), {} already known",
        plan.entry_count(),
        archive.len(),
        plan.total_uncompressed_size(),
        archive.total_size(),
        plan.excluded_count()
    );
    Ok(())
}

async fn pack(source: &Path, known: Option<&Path>, output: &Path, config: &UploadConfig) -> Result<()> {
    let archive = open_source(source, config)?;
    let known = load_known(known)?;
    let checksums = compute_fingerprints(&archive, config.checksum_algorithm).await?;
    let plan = UploadSelector::select_with(&archive, &known, &checksums)?;

    if plan.is_empty() {
        info!("Nothing to upload: the controller already has all {} entries", archive.len());
        return Ok(());
    }

    let target = FileTarget::create(output).await
        .context(format!("Failed to create {}", output.display()))?;

    match upload_plan(&plan, &config.encoder_options(), target).await? {
        UploadOutcome::NothingToUpload => info!("Nothing to upload"),
        UploadOutcome::Uploaded(summary) => info!(
            "Packed {} entries ({} bytes uncompressed) into {} ({} bytes)",
            summary.entry_count,
            summary.uncompressed_bytes,
            output.display(),
            summary.bytes_sent
        ),
    }
    Ok(())
}
