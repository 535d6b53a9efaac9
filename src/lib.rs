//! # mogreps-pair
//!
//! A Rust library for fetching and pairing Met Office Mogreps ensemble forecast
//! files. Regional (Mogreps-UK) files are matched with the global (Mogreps-G)
//! run covering the same valid time, and both fields are aligned onto the same
//! latitude/longitude area.
//!
//! ## Features
//!
//! - **Archive listing**: S3 buckets (paginated) and local directories
//! - **Filename metadata**: date, run hour, ensemble member and lead time
//! - **Ground level selection**: lowest height or highest pressure level
//! - **Grid alignment**: rotated-pole unrotation and bounding-box cropping
//! - **Typed outcomes**: every regional file is either paired or skipped with a reason
//! - **Parquet export** of aligned fields
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mogreps_pair::config::PairingConfig;
//! use mogreps_pair::{list_inputs, pair_listed};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PairingConfig::from_file("pairing.yaml")?;
//!     let (regional, global) = list_inputs(&config).await?;
//!     let report = pair_listed(&config, &regional, &global, |_| {}).await?;
//!
//!     let (uk_cubes, global_cubes) = report.into_cube_lists();
//!     println!("{} pairs", uk_cubes.len().min(global_cubes.len()));
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! parameter: air_temperature
//! regional_path: s3://mogreps-uk/
//! global_path: s3://mogreps-g/
//! max_files: 100
//! storage:
//!   region: eu-west-2
//!   anonymous: true
//! ```

pub mod cli;
pub mod config;
pub mod cube;
pub mod filename;
pub mod grid;
pub mod info;
pub mod levels;
pub mod loader;
pub mod log;
pub mod output;
pub mod pairing;
pub mod storage;

#[cfg(test)]
mod cli_tests;

use crate::config::PairingConfig;
use crate::filename::{ForecastFile, base_name};
use crate::loader::NetcdfLoader;
use crate::pairing::{PairOutcome, PairingReport, pair};
use crate::storage::{
    StorageBackend, StorageConfig, StorageFactory, join_path, relative_to_root,
};
use anyhow::{Context, Result};
use ::log::debug;
use std::collections::HashSet;

/// Lists up to `max_files` names under `root` starting with `prefix`,
/// relative to `root`.
pub async fn list_archive(
    root: &str,
    prefix: &str,
    max_files: usize,
    storage_config: &StorageConfig,
) -> Result<Vec<String>> {
    let location = join_path(root, prefix);
    let storage = StorageFactory::from_path(root, storage_config)
        .await
        .context("Failed to create storage backend")?;
    let entries = storage
        .list(&location, max_files)
        .await
        .with_context(|| format!("Failed to list {}", location))?;
    debug!("Listed {} entries under {}", entries.len(), location);
    Ok(entries
        .iter()
        .map(|e| relative_to_root(root, e).to_string())
        .collect())
}

/// Lists the regional and global archives of `config`.
pub async fn list_inputs(config: &PairingConfig) -> Result<(Vec<String>, Vec<String>)> {
    let regional = list_archive(
        &config.regional_path,
        &config.regional_prefix,
        config.max_files,
        &config.storage,
    )
    .await?;
    let global = list_archive(
        &config.global_path,
        &config.global_prefix,
        config.max_files,
        &config.storage,
    )
    .await?;
    Ok((regional, global))
}

/// Pairs listed regional files against the listed global files, calling
/// `on_outcome` after each regional file.
///
/// # Errors
///
/// This function will return an error if:
/// - A storage backend cannot be created
/// - A regional filename does not follow the naming convention
/// - A listed file cannot be loaded
/// - A regional field has no time coordinate
/// - Grid alignment fails for a reason other than a missing rotated pole
pub async fn pair_listed<F>(
    config: &PairingConfig,
    regional_files: &[String],
    global_files: &[String],
    on_outcome: F,
) -> Result<PairingReport>
where
    F: FnMut(&PairOutcome),
{
    let loader = NetcdfLoader::new(&config.regional_path, &config.global_path, &config.storage)
        .await
        .context("Failed to create field loader")?;
    let options = config.pairing_options();
    let report = pair(&loader, &options, regional_files, global_files, on_outcome)
        .await
        .context("Pairing failed")?;
    Ok(report)
}

/// Expected global counterpart of each regional file and whether it was listed.
pub fn expected_counterparts(
    config: &PairingConfig,
    regional_files: &[String],
    global_files: &[String],
) -> Result<Vec<(String, String, bool)>> {
    let available: HashSet<&str> = global_files.iter().map(String::as_str).collect();
    regional_files
        .iter()
        .map(|regional| -> Result<(String, String, bool)> {
            let info = ForecastFile::parse(base_name(regional))?;
            let global = info.global_filename(&config.global_prefix, &config.extension);
            let listed = available.contains(global.as_str());
            Ok((regional.clone(), global, listed))
        })
        .collect()
}
