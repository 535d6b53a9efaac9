//! # Pairing Driver
//!
//! Matches each regional (Mogreps-UK) file with the global (Mogreps-G) run
//! covering the same valid time, then reduces both to one timestep at ground
//! level on a common latitude/longitude area.
//!
//! Every regional file produces a [`PairOutcome`]: either an aligned
//! [`FieldPair`] or a [`SkipReason`]. Only the recoverable conditions below
//! are reported as skips; anything else aborts the run.
//!
//! - the expected global file is not in the global listing
//! - the parameter is missing from either file
//! - the regional time coordinate has no points or the global field lacks the
//!   selected timestamp
//! - level selection fails or the regional field has no rotated pole
//!
//! A regional field without any `time` coordinate aborts the run.

use crate::cube::{Cube, CubeList, FieldError};
use crate::filename::{
    DEFAULT_EXTENSION, DEFAULT_GLOBAL_PREFIX, FilenameError, ForecastFile, base_name,
};
use crate::grid::{GridError, crop_to_bounds, unrotate};
use crate::levels::select_ground_level;
use crate::loader::{FieldLoader, LoaderError, Product};
use log::{debug, info, warn};
use std::collections::HashSet;
use thiserror::Error;

/// Failures that abort pairing
#[derive(Error, Debug)]
pub enum PairingError {
    #[error(transparent)]
    Filename(#[from] FilenameError),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("Field of '{file}' is unusable: {source}")]
    Field {
        file: String,
        #[source]
        source: FieldError,
    },

    #[error("Aligning '{file}' failed: {source}")]
    Grid {
        file: String,
        #[source]
        source: GridError,
    },
}

/// Why a regional file produced no pair
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkipReason {
    #[error("global file '{expected}' is not available")]
    GlobalFileMissing { expected: String },

    #[error("parameter '{parameter}' not found in '{file}'")]
    ParameterNotFound { file: String, parameter: String },

    #[error("missing attribute: {0}")]
    MissingAttribute(String),
}

/// Regional and global fields aligned onto the same area and timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPair {
    pub regional_file: String,
    pub global_file: String,
    /// Selected time point, in the regional time coordinate's units
    pub time: f64,
    pub regional: Cube,
    pub global: Cube,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    Paired(FieldPair),
    Skipped {
        regional_file: String,
        reason: SkipReason,
    },
}

impl PairOutcome {
    pub fn regional_file(&self) -> &str {
        match self {
            PairOutcome::Paired(pair) => &pair.regional_file,
            PairOutcome::Skipped { regional_file, .. } => regional_file,
        }
    }
}

/// Settings shared by every pair in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingOptions {
    /// Field name to extract from both files
    pub parameter: String,
    /// Product prefix of the global filenames
    pub global_prefix: String,
    /// Extension of the global filenames, without the dot
    pub extension: String,
}

impl PairingOptions {
    pub fn new(parameter: &str) -> Self {
        PairingOptions {
            parameter: parameter.to_string(),
            global_prefix: DEFAULT_GLOBAL_PREFIX.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

/// Outcomes of a pairing run, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairingReport {
    pub outcomes: Vec<PairOutcome>,
}

impl PairingReport {
    pub fn pairs(&self) -> impl Iterator<Item = &FieldPair> {
        self.outcomes.iter().filter_map(|o| match o {
            PairOutcome::Paired(pair) => Some(pair),
            PairOutcome::Skipped { .. } => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&str, &SkipReason)> {
        self.outcomes.iter().filter_map(|o| match o {
            PairOutcome::Skipped {
                regional_file,
                reason,
            } => Some((regional_file.as_str(), reason)),
            PairOutcome::Paired(_) => None,
        })
    }

    pub fn paired_count(&self) -> usize {
        self.pairs().count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.len() - self.paired_count()
    }

    /// The aligned regional fields and global fields as two parallel sequences.
    pub fn into_cube_lists(self) -> (Vec<Cube>, Vec<Cube>) {
        let (regional, global, _) = self.split();
        (regional, global)
    }

    /// Aligned regional fields, aligned global fields and the skipped files.
    pub fn split(self) -> (Vec<Cube>, Vec<Cube>, Vec<(String, SkipReason)>) {
        let mut regional = Vec::new();
        let mut global = Vec::new();
        let mut skipped = Vec::new();
        for outcome in self.outcomes {
            match outcome {
                PairOutcome::Paired(pair) => {
                    regional.push(pair.regional);
                    global.push(pair.global);
                }
                PairOutcome::Skipped {
                    regional_file,
                    reason,
                } => skipped.push((regional_file, reason)),
            }
        }
        (regional, global, skipped)
    }
}

/// Pairs every file of `regional_files` against the `global_files` listing,
/// calling `on_outcome` after each regional file.
///
/// # Errors
///
/// Returns [`PairingError`] for malformed filenames, load failures, regional
/// fields without a time coordinate and grid alignment failures other than a
/// missing rotated pole.
pub async fn pair<F>(
    loader: &dyn FieldLoader,
    options: &PairingOptions,
    regional_files: &[String],
    global_files: &[String],
    mut on_outcome: F,
) -> Result<PairingReport, PairingError>
where
    F: FnMut(&PairOutcome),
{
    let available: HashSet<&str> = global_files.iter().map(String::as_str).collect();
    let mut report = PairingReport::default();
    for regional_file in regional_files {
        let outcome = pair_one(loader, options, regional_file, &available).await?;
        on_outcome(&outcome);
        report.outcomes.push(outcome);
    }
    Ok(report)
}

/// Pairs a single regional file, see [`pair`].
pub async fn pair_one(
    loader: &dyn FieldLoader,
    options: &PairingOptions,
    regional_file: &str,
    global_files: &HashSet<&str>,
) -> Result<PairOutcome, PairingError> {
    let info = ForecastFile::parse(base_name(regional_file))?;
    let global_file = info.global_filename(&options.global_prefix, &options.extension);
    let skip = |reason: SkipReason| -> Result<PairOutcome, PairingError> {
        warn!("Skipping {}: {}", regional_file, reason);
        Ok(PairOutcome::Skipped {
            regional_file: regional_file.to_string(),
            reason,
        })
    };

    if !global_files.contains(global_file.as_str()) {
        debug!("No global counterpart {} for {}", global_file, regional_file);
        return skip(SkipReason::GlobalFileMissing {
            expected: global_file,
        });
    }

    let global_cubes = loader.load(Product::Global, &global_file).await?;
    let regional_cubes = loader.load(Product::Regional, regional_file).await?;

    let (regional, global) = match (
        find_parameter(&regional_cubes, &options.parameter, regional_file),
        find_parameter(&global_cubes, &options.parameter, &global_file),
    ) {
        (Ok(r), Ok(g)) => (r, g),
        (Err(reason), _) | (_, Err(reason)) => return skip(reason),
    };

    let time_coord = regional.coord("time").map_err(|source| PairingError::Field {
        file: regional_file.to_string(),
        source,
    })?;
    let Some(time) = time_coord.max() else {
        return skip(SkipReason::MissingAttribute(format!(
            "time coordinate of '{}' has no points",
            regional.name
        )));
    };
    let (regional, global) = match (regional.extract("time", time), global.extract("time", time)) {
        (Ok(r), Ok(g)) => (r, g),
        (Err(e), _) | (_, Err(e)) => return skip(SkipReason::MissingAttribute(e.to_string())),
    };
    if let Ok(coord) = regional.coord("time") {
        info!("{}: {}", regional_file, coord);
    }

    let (regional, global) = match (ground_level(&regional), ground_level(&global)) {
        (Ok(r), Ok(g)) => (r, g),
        (Err(e), _) | (_, Err(e)) => return skip(SkipReason::MissingAttribute(e.to_string())),
    };

    let grid_error = |source: GridError| PairingError::Grid {
        file: regional_file.to_string(),
        source,
    };
    let regional = match unrotate(&regional, &global) {
        Ok(cube) => cube,
        Err(e @ GridError::MissingPole(_)) => {
            return skip(SkipReason::MissingAttribute(e.to_string()));
        }
        Err(e) => return Err(grid_error(e)),
    };
    let global = crop_to_bounds(&global, &regional).map_err(grid_error)?;

    Ok(PairOutcome::Paired(FieldPair {
        regional_file: regional_file.to_string(),
        global_file,
        time,
        regional,
        global,
    }))
}

fn find_parameter<'a>(
    cubes: &'a CubeList,
    parameter: &str,
    file: &str,
) -> Result<&'a Cube, SkipReason> {
    cubes.get(parameter).map_err(|_| SkipReason::ParameterNotFound {
        file: file.to_string(),
        parameter: parameter.to_string(),
    })
}

/// Ground level with its vertical coordinate removed.
fn ground_level(cube: &Cube) -> Result<Cube, FieldError> {
    let (mut level, vertical) = select_ground_level(cube)?;
    if let Some(name) = vertical {
        level.remove_coord(&name)?;
    }
    Ok(level)
}
