use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::archive::ArchiveOptions;
use crate::constants::DEFAULT_CHUNK_SIZE;
use crate::utils::hash::ChecksumAlgorithm;
use crate::utils::streaming_zip::{CompressionLevel, CompressionPolicy, EncoderOptions};

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

/// Settings for enumerating, fingerprinting and encoding an upload.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Bytes pulled from an entry per encoder chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub compression: CompressionPolicy,
    #[serde(default)]
    pub compression_level: CompressionLevel,
    #[serde(default)]
    pub checksum_algorithm: ChecksumAlgorithm,
    #[serde(default)]
    pub include_directories: bool,
    #[serde(default)]
    pub follow_links: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression: CompressionPolicy::default(),
            compression_level: CompressionLevel::default(),
            checksum_algorithm: ChecksumAlgorithm::default(),
            include_directories: false,
            follow_links: false,
        }
    }
}

impl UploadConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: UploadConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML config")?;

        if config.chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than zero in {}", path.display());
        }

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .context(format!("Failed to write config to {}", path.display()))?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    pub fn encoder_options(&self) -> EncoderOptions {
        EncoderOptions {
            chunk_size: self.chunk_size,
            compression: self.compression,
            compression_level: self.compression_level,
        }
    }

    pub fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions {
            include_directories: self.include_directories,
            follow_links: self.follow_links,
        }
    }
}

/// Load the configuration at `path`, or the defaults when no path is given
pub fn load_or_default(path: Option<&Path>) -> Result<UploadConfig> {
    match path {
        Some(path) => UploadConfig::from_yaml_file(path),
        None => {
            debug!("No configuration file given, using defaults");
            Ok(UploadConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cf-bits.yaml");
        fs::write(&path, "compression: stored\nchecksum_algorithm: sha256\n").unwrap();

        let config = UploadConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.compression, CompressionPolicy::Stored);
        assert_eq!(config.checksum_algorithm, ChecksumAlgorithm::Sha256);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(!config.include_directories);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cf-bits.yaml");
        let config = UploadConfig {
            chunk_size: 4096,
            compression_level: CompressionLevel::Best,
            include_directories: true,
            ..Default::default()
        };

        config.save_to_yaml_file(&path).unwrap();
        assert_eq!(UploadConfig::from_yaml_file(&path).unwrap(), config);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cf-bits.yaml");
        fs::write(&path, "chunk_size: 0\n").unwrap();

        assert!(UploadConfig::from_yaml_file(&path).is_err());
    }

    #[test]
    fn test_missing_path_uses_defaults() {
        assert_eq!(load_or_default(None).unwrap(), UploadConfig::default());
    }
}
