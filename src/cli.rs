//! # CLI Module
//!
//! This module provides the command-line interface for mogreps-pair, including:
//! - Argument parsing with clap
//! - Configuration file loading (JSON/YAML)
//! - Environment variable support with the MOGREPS_ prefix
//! - Merging of command-line, file and default settings
//! - Configuration templates

use crate::config::{ConfigError, PairingConfig};
use crate::storage::StorageConfig;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Pair Mogreps-UK regional forecasts with their Mogreps-G global counterparts
#[derive(Parser, Debug)]
#[command(name = "mogreps-pair")]
#[command(about = "Fetch, pair and align Mogreps UK and global forecast files")]
#[command(version)]
#[command(long_about = "
mogreps-pair lists Mogreps ensemble forecast files on S3 or local disk, matches each
regional (Mogreps-UK) file with the global (Mogreps-G) run covering the same valid time,
and aligns both fields onto the same latitude/longitude area.

FEATURES:
  • Archive listing: S3 buckets with pagination or local directories
  • Filename metadata: date, run hour, ensemble member and lead time
  • Grid alignment: rotated-pole unrotation and bounding-box cropping
  • Ground level selection for height and pressure coordinates
  • Parquet export of aligned fields, locally or to S3
  • Configuration files: JSON and YAML format support with templates

EXAMPLES:
  # List regional files
  mogreps-pair list s3://mogreps-uk/prods_op_mogreps-uk --max-files 10

  # Pair local archives
  mogreps-pair pair -n air_temperature \\
    --regional-path ../data/mogreps-uk/ --global-path ../data/mogreps-gg/

  # Pair and export to Parquet
  mogreps-pair pair --config pairing.yaml -o pairs/

  # Inspect a file
  mogreps-pair info prods_op_mogreps-uk_20160107_03_00_003.nc --detailed

  # Generate templates
  mogreps-pair template s3 --format yaml > pairing.yaml
")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format for structured data
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Configuration file path (JSON or YAML)
    #[arg(short, long, global = true, env = "MOGREPS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List forecast files in an archive
    #[command(long_about = "
List forecast files under a location, either an S3 prefix or a local directory
optionally followed by a filename prefix.

Without a location the regional archive and prefix of the configuration are used.

EXAMPLES:
  # First 20 keys of a bucket prefix
  mogreps-pair list s3://mogreps-uk/prods_op_mogreps-uk --max-files 20

  # Files of a local directory
  mogreps-pair list ../data/mogreps-gg/

  # Public bucket without credentials, JSON output
  mogreps-pair --output-format json list s3://mogreps-g/ --anonymous
")]
    List {
        /// Listing location (local or S3)
        #[arg(value_name = "LOCATION")]
        location: Option<String>,

        /// Maximum number of entries
        #[arg(long, env = "MOGREPS_MAX_FILES", value_parser = parse_max_files)]
        max_files: Option<usize>,

        #[command(flatten)]
        storage: StorageArgs,
    },

    /// Show information about a forecast file
    #[command(long_about = "
Inspect a forecast file (local or S3) and display:
• Date, run hour, ensemble member and lead time from the filename
• The global file it pairs with
• The fields it contains, with shapes and units
• Coordinates and coordinate systems (with --detailed)

EXAMPLES:
  mogreps-pair info prods_op_mogreps-uk_20160107_03_00_003.nc
  mogreps-pair info s3://mogreps-uk/prods_op_mogreps-uk_20160107_03_00_003.nc --detailed
  mogreps-pair info data.nc -n air_temperature --format json
")]
    Info {
        /// Forecast file path (local or S3)
        file: String,

        /// Show coordinates of each field
        #[arg(long)]
        detailed: bool,

        /// Show only this field
        #[arg(short = 'n', long)]
        parameter: Option<String>,

        /// Output format for file information
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        #[command(flatten)]
        storage: StorageArgs,
    },

    /// Pair regional files with their global counterparts
    #[command(long_about = "
Pair each listed regional file with the global file covering the same valid time.

The global counterpart of a regional run at hour H with lead time L is the global
run at hour H-3 with lead time L+3. Both fields are reduced to the latest regional
timestep at ground level; the regional grid is unrotated and the global grid is
cropped to the regional extent. Files without a usable counterpart are skipped
and reported.

EXAMPLES:
  # Local archives with defaults
  mogreps-pair pair -n air_temperature

  # S3 archives, export aligned fields
  mogreps-pair pair -n air_temperature \\
    --regional-path s3://mogreps-uk/ --global-path s3://mogreps-g/ -o s3://pairs/out/

  # Show the expected counterparts without loading anything
  mogreps-pair pair --config pairing.json --dry-run
")]
    Pair {
        #[command(flatten)]
        args: PairArgs,

        /// Overwrite existing Parquet outputs
        #[arg(long, env = "MOGREPS_FORCE")]
        force: bool,

        /// List files and expected counterparts without loading them
        #[arg(long, env = "MOGREPS_DRY_RUN")]
        dry_run: bool,
    },

    /// Generate configuration templates
    #[command(long_about = "
Generate configuration file templates.

Available templates:
• local: archives on local disk
• s3: signed access to S3 archives with Parquet export
• anonymous: unsigned access to public S3 buckets

EXAMPLES:
  mogreps-pair template local
  mogreps-pair template s3 --format yaml -o pairing.yaml
")]
    Template {
        /// Template type to generate
        #[arg(value_enum)]
        template_type: TemplateType,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration format
        #[arg(long, value_enum, default_value_t = ConfigFormat::Json)]
        format: ConfigFormat,
    },

    /// Generate shell completions
    #[command(long_about = "
Generate shell completion scripts for bash, zsh, fish and PowerShell.

EXAMPLES:
  mogreps-pair completions bash > ~/.bash_completion.d/mogreps-pair
  mogreps-pair completions zsh -o _mogreps-pair
")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// S3 connection overrides shared by the commands that touch storage
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct StorageArgs {
    /// AWS region of the buckets
    #[arg(long, env = "MOGREPS_REGION")]
    pub region: Option<String>,

    /// Custom S3 endpoint URL
    #[arg(long, env = "MOGREPS_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// Send unsigned requests (public buckets)
    #[arg(long, env = "MOGREPS_ANONYMOUS")]
    pub anonymous: bool,

    /// Use path-style bucket addressing
    #[arg(long, env = "MOGREPS_FORCE_PATH_STYLE")]
    pub force_path_style: bool,
}

impl StorageArgs {
    pub fn apply(&self, config: &mut StorageConfig) {
        if let Some(region) = &self.region {
            config.region = region.clone();
        }
        if let Some(endpoint) = &self.endpoint_url {
            config.endpoint_url = Some(endpoint.clone());
        }
        if self.anonymous {
            config.anonymous = true;
        }
        if self.force_path_style {
            config.force_path_style = true;
        }
    }
}

/// Pairing settings that override the configuration file
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct PairArgs {
    /// Field name to pair
    #[arg(short = 'n', long, env = "MOGREPS_PARAMETER")]
    pub parameter: Option<String>,

    /// Regional archive root (local or S3)
    #[arg(long, env = "MOGREPS_REGIONAL_PATH")]
    pub regional_path: Option<String>,

    /// Global archive root (local or S3)
    #[arg(long, env = "MOGREPS_GLOBAL_PATH")]
    pub global_path: Option<String>,

    /// Filename prefix for listing regional files
    #[arg(long, env = "MOGREPS_REGIONAL_PREFIX")]
    pub regional_prefix: Option<String>,

    /// Filename prefix of global files
    #[arg(long, env = "MOGREPS_GLOBAL_PREFIX")]
    pub global_prefix: Option<String>,

    /// Maximum number of files listed per archive
    #[arg(long, env = "MOGREPS_MAX_FILES", value_parser = parse_max_files)]
    pub max_files: Option<usize>,

    /// Directory for Parquet exports (local or S3)
    #[arg(short, long, env = "MOGREPS_OUTPUT_DIR")]
    pub output_dir: Option<String>,

    #[command(flatten)]
    pub storage: StorageArgs,
}

impl PairArgs {
    /// Applies the command-line values on top of `config`
    pub fn apply(&self, mut config: PairingConfig) -> PairingConfig {
        let overrides = [
            (&self.parameter, &mut config.parameter),
            (&self.regional_path, &mut config.regional_path),
            (&self.global_path, &mut config.global_path),
            (&self.regional_prefix, &mut config.regional_prefix),
            (&self.global_prefix, &mut config.global_prefix),
        ];
        for (value, target) in overrides {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        if let Some(max_files) = self.max_files {
            config.max_files = max_files;
        }
        if self.output_dir.is_some() {
            config.output_dir = self.output_dir.clone();
        }
        self.storage.apply(&mut config.storage);
        config
    }
}

#[derive(ValueEnum, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON structured output
    Json,
    /// YAML structured output
    Yaml,
    /// CSV output (where applicable)
    Csv,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum TemplateType {
    /// Local archives
    Local,
    /// Signed S3 archives with Parquet export
    S3,
    /// Public S3 buckets without credentials
    Anonymous,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON configuration format
    Json,
    /// YAML configuration format
    Yaml,
}

/// Parse a positive file count
fn parse_max_files(s: &str) -> Result<usize, String> {
    let value = s
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("Invalid file count: '{}'", s))?;
    if value == 0 {
        return Err("File count must be at least 1".to_string());
    }
    Ok(value)
}

/// Loads the configuration file if one is given, defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<PairingConfig, ConfigError> {
    match path {
        Some(path) => PairingConfig::from_file(path),
        None => Ok(PairingConfig::default()),
    }
}

/// Builds the configuration of a template
pub fn generate_template(template_type: &TemplateType) -> PairingConfig {
    match template_type {
        TemplateType::Local => PairingConfig::default(),
        TemplateType::S3 => PairingConfig {
            regional_path: "s3://mogreps-uk/".to_string(),
            global_path: "s3://mogreps-g/".to_string(),
            output_dir: Some("s3://my-bucket/mogreps-pairs/".to_string()),
            ..PairingConfig::default()
        },
        TemplateType::Anonymous => {
            let mut config = PairingConfig {
                regional_path: "s3://mogreps-uk/".to_string(),
                global_path: "s3://mogreps-g/".to_string(),
                max_files: 10,
                ..PairingConfig::default()
            };
            config.storage.anonymous = true;
            config
        }
    }
}

/// Serializes a configuration in the requested format
pub fn render_config(config: &PairingConfig, format: &ConfigFormat) -> Result<String, ConfigError> {
    match format {
        ConfigFormat::Json => config.to_json(),
        ConfigFormat::Yaml => config.to_yaml(),
    }
}

// Global mutex to ensure tests touching MOGREPS_ variables run sequentially
#[cfg(test)]
pub(crate) static ENV_TEST_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    const PAIR_ENV_VARS: [&str; 3] =
        ["MOGREPS_PARAMETER", "MOGREPS_MAX_FILES", "MOGREPS_ANONYMOUS"];

    #[test]
    fn test_parse_max_files() {
        assert_eq!(parse_max_files("25"), Ok(25));
        assert_eq!(parse_max_files(" 3 "), Ok(3));
        assert!(parse_max_files("0").is_err());
        assert!(parse_max_files("-1").is_err());
        assert!(parse_max_files("many").is_err());
    }

    #[test]
    fn test_pair_args_override_config() {
        let base =
            PairingConfig::from_json(r#"{"parameter": "rainfall_rate", "max_files": 7}"#).unwrap();
        let args = PairArgs {
            parameter: Some("air_temperature".to_string()),
            global_path: Some("s3://mogreps-g/".to_string()),
            output_dir: Some("pairs".to_string()),
            storage: StorageArgs {
                anonymous: true,
                ..StorageArgs::default()
            },
            ..PairArgs::default()
        };

        let merged = args.apply(base);
        assert_eq!(merged.parameter, "air_temperature");
        assert_eq!(merged.global_path, "s3://mogreps-g/");
        // untouched values come from the file
        assert_eq!(merged.max_files, 7);
        assert_eq!(merged.regional_path, "../data/mogreps-uk/");
        assert_eq!(merged.output_dir.as_deref(), Some("pairs"));
        assert!(merged.storage.anonymous);
    }

    #[test]
    fn test_storage_args_apply() {
        let mut config = StorageConfig::default();
        StorageArgs {
            region: Some("us-east-1".to_string()),
            endpoint_url: Some("http://localhost:9000".to_string()),
            anonymous: false,
            force_path_style: true,
        }
        .apply(&mut config);
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.endpoint_url.as_deref(), Some("http://localhost:9000"));
        assert!(!config.anonymous);
        assert!(config.force_path_style);
    }

    #[test]
    fn test_templates_are_valid() {
        for template in [TemplateType::Local, TemplateType::S3, TemplateType::Anonymous] {
            let config = generate_template(&template);
            assert!(config.validate().is_ok());
            let json = render_config(&config, &ConfigFormat::Json).unwrap();
            assert_eq!(PairingConfig::from_json(&json).unwrap(), config);
            let yaml = render_config(&config, &ConfigFormat::Yaml).unwrap();
            assert_eq!(PairingConfig::from_yaml(&yaml).unwrap(), config);
        }
        assert!(generate_template(&TemplateType::Anonymous).storage.anonymous);
    }

    #[test]
    fn test_load_config_without_file() {
        assert_eq!(load_config(None).unwrap(), PairingConfig::default());
    }

    #[test]
    fn test_environment_variable_overrides() {
        // Acquire mutex to ensure exclusive access to environment variables
        let _guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

        let original: Vec<Option<String>> =
            PAIR_ENV_VARS.iter().map(|k| std::env::var(k).ok()).collect();

        unsafe {
            std::env::set_var("MOGREPS_PARAMETER", "wind_speed");
            std::env::set_var("MOGREPS_MAX_FILES", "12");
            std::env::set_var("MOGREPS_ANONYMOUS", "true");
        }

        let cli = Cli::try_parse_from(["mogreps-pair", "pair"]).unwrap();
        let Commands::Pair { args, .. } = &cli.command else {
            panic!("Expected Pair command");
        };
        assert_eq!(args.parameter.as_deref(), Some("wind_speed"));
        assert_eq!(args.max_files, Some(12));
        assert!(args.storage.anonymous);

        // command-line values beat the environment
        let cli = Cli::try_parse_from(["mogreps-pair", "pair", "-n", "air_temperature"]).unwrap();
        let Commands::Pair { args, .. } = &cli.command else {
            panic!("Expected Pair command");
        };
        assert_eq!(args.parameter.as_deref(), Some("air_temperature"));

        unsafe {
            std::env::set_var("MOGREPS_MAX_FILES", "0");
        }
        assert!(Cli::try_parse_from(["mogreps-pair", "pair"]).is_err());

        // Cleanup and restore original state
        unsafe {
            for (key, value) in PAIR_ENV_VARS.iter().zip(original) {
                match value {
                    Some(v) => std::env::set_var(key, v),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}
