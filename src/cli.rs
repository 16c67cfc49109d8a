use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the cf-bits tool.
///
/// `SOURCE` is either an exploded application directory or an existing
/// `.zip`/`.jar`/`.war` file. `--known` points at the controller's
/// resource-match response; without it every entry is treated as new.
#[derive(Parser, Debug)]
#[clap(name = "cf-bits", about = "Incremental application bits packer")]
pub struct Args {
    /// Verbose logging
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Path to configuration YAML file
    #[clap(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the resource-match request describing every file in SOURCE
    Fingerprints {
        source: PathBuf,
    },

    /// Show which entries would be uploaded
    Plan {
        source: PathBuf,

        /// Resource-match response listing files the controller already has
        #[clap(long)]
        known: Option<PathBuf>,
    },

    /// Write the archive of entries the controller is missing
    Pack {
        source: PathBuf,

        /// Resource-match response listing files the controller already has
        #[clap(long)]
        known: Option<PathBuf>,

        /// Output ZIP path
        #[clap(short, long)]
        output: PathBuf,
    },

    /// Write a configuration file with default settings
    InitConfig {
        #[clap(default_value = cf_bits::constants::DEFAULT_CONFIG_NAME)]
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pack_with_known() {
        let args = Args::parse_from([
            "cf-bits", "-v", "pack", "./app", "--known", "match.json", "-o", "bits.zip",
        ]);
        assert!(args.verbose);
        match args.command {
            Commands::Pack { source, known, output } => {
                assert_eq!(source, PathBuf::from("./app"));
                assert_eq!(known, Some(PathBuf::from("match.json")));
                assert_eq!(output, PathBuf::from("bits.zip"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_init_config_default_path() {
        let args = Args::parse_from(["cf-bits", "init-config"]);
        match args.command {
            Commands::InitConfig { path } => assert_eq!(path, PathBuf::from("cf-bits.yaml")),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
