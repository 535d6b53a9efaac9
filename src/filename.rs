//! # Forecast Filename Parsing
//!
//! Mogreps files follow the naming convention
//! `{prefix}_op_{product}_{YYYYMMDD}_{HH}_{MM}_{LLL}.{ext}`, where `HH` is the
//! run hour, `MM` the ensemble member and `LLL` the lead time in hours.
//!
//! ```rust
//! use mogreps_pair::filename::ForecastFile;
//!
//! let info = ForecastFile::parse("prods_op_mogreps-g_20160107_00_00_003.nc")?;
//! assert_eq!(info.date, "20160107");
//! assert_eq!((info.run_hour, info.member, info.lead_hours), (0, 0, 3));
//! # Ok::<(), mogreps_pair::filename::FilenameError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Regional and global cycles are offset by this many hours.
pub const CYCLE_OFFSET_HOURS: i32 = 3;

/// Product prefix of the global (Mogreps-G) files.
pub const DEFAULT_GLOBAL_PREFIX: &str = "prods_op_mogreps-g";

/// Product prefix of the regional (Mogreps-UK) files.
pub const DEFAULT_REGIONAL_PREFIX: &str = "prods_op_mogreps-uk";

pub const DEFAULT_EXTENSION: &str = "nc";

/// Errors raised for filenames that do not follow the convention
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilenameError {
    #[error("filename '{filename}' has {found} '_'-separated segments, expected at least 4")]
    TooFewSegments { filename: String, found: usize },

    #[error("segment '{segment}' of filename '{filename}' is not an integer")]
    InvalidInteger { filename: String, segment: String },
}

/// Structured metadata extracted from a forecast filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastFile {
    /// Forecast date, kept exactly as written (`YYYYMMDD`)
    pub date: String,
    /// Model run hour
    pub run_hour: i32,
    /// Ensemble member
    pub member: i32,
    /// Lead time in hours
    pub lead_hours: i32,
}

impl ForecastFile {
    /// Parses the trailing date, run hour, member and lead time segments.
    ///
    /// Anything before the fourth-from-last segment is ignored, and the
    /// extension is cut from the final segment at its first `.`.
    ///
    /// # Errors
    ///
    /// Returns [`FilenameError::TooFewSegments`] if there are fewer than four
    /// segments and [`FilenameError::InvalidInteger`] if one of the last three
    /// does not parse as an integer.
    pub fn parse(filename: &str) -> Result<Self, FilenameError> {
        let mut segments: Vec<&str> = filename.split('_').collect();
        if segments.len() < 4 {
            return Err(FilenameError::TooFewSegments {
                filename: filename.to_string(),
                found: segments.len(),
            });
        }

        let last = segments.len() - 1;
        segments[last] = segments[last].split('.').next().unwrap_or_default();

        let tail = &segments[segments.len() - 4..];
        let int_at = |segment: &str| {
            segment
                .parse::<i32>()
                .map_err(|_| FilenameError::InvalidInteger {
                    filename: filename.to_string(),
                    segment: segment.to_string(),
                })
        };

        Ok(ForecastFile {
            date: tail[0].to_string(),
            run_hour: int_at(tail[1])?,
            member: int_at(tail[2])?,
            lead_hours: int_at(tail[3])?,
        })
    }

    /// Formats this metadata back into a filename with the given product prefix.
    pub fn to_filename(&self, prefix: &str, extension: &str) -> String {
        format!(
            "{}_{}_{:02}_{:02}_{:03}.{}",
            prefix, self.date, self.run_hour, self.member, self.lead_hours, extension
        )
    }

    /// Metadata of the global run that covers the same valid time.
    ///
    /// The global run started [`CYCLE_OFFSET_HOURS`] earlier, so its lead time
    /// is longer by the same amount. No day rollover is applied: a regional
    /// run at hour 0 yields run hour `-3`.
    pub fn global_counterpart(&self) -> ForecastFile {
        ForecastFile {
            date: self.date.clone(),
            run_hour: self.run_hour - CYCLE_OFFSET_HOURS,
            member: self.member,
            lead_hours: self.lead_hours + CYCLE_OFFSET_HOURS,
        }
    }

    /// Expected filename of the matching global file.
    pub fn global_filename(&self, prefix: &str, extension: &str) -> String {
        self.global_counterpart().to_filename(prefix, extension)
    }
}

impl fmt::Display for ForecastFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "date {} run {:02}Z member {:02} lead T+{:03}",
            self.date, self.run_hour, self.member, self.lead_hours
        )
    }
}

/// Final path component of a key or path, used to compare listings.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
