//! # Forecast File Information Module
//!
//! Inspects a forecast file: the metadata encoded in its name, the global file
//! it pairs with, and the fields it contains with their coordinates.

use crate::config::PairingConfig;
use crate::cube::{CoordSystem, Cube};
use crate::filename::{ForecastFile, base_name};
use crate::loader::load_path;
use crate::storage::StorageFactory;
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

/// Information about one coordinate of a field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordInfo {
    pub name: String,
    pub units: Option<String>,
    /// Data dimension described by the coordinate, `None` for scalars
    pub dim: Option<usize>,
    pub length: usize,
    pub first: Option<f64>,
    pub last: Option<f64>,
}

/// Information about one field (data variable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub var_name: Option<String>,
    pub units: Option<String>,
    pub shape: Vec<usize>,
    pub coord_system: Option<String>,
    pub coords: Vec<CoordInfo>,
}

/// Complete information about a forecast file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastInfo {
    pub path: String,
    /// Filename metadata, absent when the name does not follow the convention
    pub forecast: Option<ForecastFile>,
    /// Name of the global file covering the same valid time
    pub global_counterpart: Option<String>,
    pub file_size: Option<u64>,
    pub fields: Vec<FieldInfo>,
}

impl From<&Cube> for FieldInfo {
    fn from(cube: &Cube) -> Self {
        FieldInfo {
            name: cube.name.clone(),
            var_name: cube.var_name.clone(),
            units: cube.units.clone(),
            shape: cube.shape().to_vec(),
            coord_system: cube.coord_system.map(|cs| match cs {
                CoordSystem::RotatedPole {
                    grid_north_pole_latitude,
                    grid_north_pole_longitude,
                } => format!(
                    "rotated pole (lat {}, lon {})",
                    grid_north_pole_latitude, grid_north_pole_longitude
                ),
                CoordSystem::Geog { semi_major_axis } => {
                    format!("geographic (radius {} m)", semi_major_axis)
                }
            }),
            coords: cube
                .coords()
                .iter()
                .map(|c| CoordInfo {
                    name: c.name.clone(),
                    units: c.units.clone(),
                    dim: c.dim,
                    length: c.points.len(),
                    first: c.first(),
                    last: c.last(),
                })
                .collect(),
        }
    }
}

/// Extract information from a local or S3 forecast file
///
/// The global counterpart is named with the prefix and extension of `config`,
/// whose storage settings are used to reach `file_path`.
pub async fn get_forecast_info(
    file_path: &str,
    parameter: Option<&str>,
    config: &PairingConfig,
) -> Result<ForecastInfo> {
    let storage = StorageFactory::from_path(file_path, &config.storage)
        .await
        .context("Failed to create storage backend")?;
    let cubes = load_path(file_path, &storage)
        .await
        .with_context(|| format!("Failed to load forecast file: {}", file_path))?;

    let file_size = if StorageFactory::is_local_path(file_path) {
        tokio::fs::metadata(file_path).await.ok().map(|m| m.len())
    } else {
        None
    };

    let forecast = match ForecastFile::parse(base_name(file_path)) {
        Ok(forecast) => Some(forecast),
        Err(e) => {
            debug!("{}", e);
            None
        }
    };
    let global_counterpart = forecast
        .as_ref()
        .map(|f| f.global_filename(&config.global_prefix, &config.extension));

    let fields = cubes
        .iter()
        .filter(|c| parameter.is_none_or(|p| c.name == p || c.var_name.as_deref() == Some(p)))
        .map(FieldInfo::from)
        .collect();

    Ok(ForecastInfo {
        path: file_path.to_string(),
        forecast,
        global_counterpart,
        file_size,
        fields,
    })
}

/// Print forecast info in human-readable format
pub fn print_file_info_human(info: &ForecastInfo, detailed: bool) {
    println!("Forecast File Information:");
    println!("  Path: {}", info.path);
    if let Some(size) = info.file_size {
        println!("  File Size: {:.2} MB", size as f64 / 1_048_576.0);
    }
    match &info.forecast {
        Some(forecast) => {
            println!("  Date: {}", forecast.date);
            println!("  Run Hour: {:02}", forecast.run_hour);
            println!("  Member: {:02}", forecast.member);
            println!("  Lead Time: {:03} h", forecast.lead_hours);
        }
        None => println!("  Filename does not follow the Mogreps convention"),
    }
    if let Some(global) = &info.global_counterpart {
        println!("  Global Counterpart: {}", global);
    }
    println!("  Fields: {} total", info.fields.len());
    for field in &info.fields {
        let shape: Vec<String> = field.shape.iter().map(|s| s.to_string()).collect();
        println!(
            "    {} [{}] ({})",
            field.name,
            field.units.as_deref().unwrap_or("-"),
            shape.join(" x ")
        );
        if !detailed {
            continue;
        }
        if let Some(cs) = &field.coord_system {
            println!("      coordinate system: {}", cs);
        }
        for coord in &field.coords {
            let kind = match coord.dim {
                Some(d) => format!("dim {}", d),
                None => "scalar".to_string(),
            };
            println!(
                "      {} ({}, {} points): {} .. {}",
                coord.name,
                kind,
                coord.length,
                coord.first.unwrap_or(f64::NAN),
                coord.last.unwrap_or(f64::NAN)
            );
        }
    }
}

/// Print forecast info in JSON format
pub fn print_file_info_json(info: &ForecastInfo) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(info)?);
    Ok(())
}

/// Print forecast info in YAML format
pub fn print_file_info_yaml(info: &ForecastInfo) -> Result<()> {
    let yaml = serde_yaml::to_string(info).context("Failed to serialize forecast info to YAML")?;
    println!("{}", yaml);
    Ok(())
}

/// Print forecast info in CSV format (fields only)
pub fn print_file_info_csv(info: &ForecastInfo) -> Result<()> {
    println!("field_name,units,shape,coordinates");
    for field in &info.fields {
        let shape: Vec<String> = field.shape.iter().map(|s| s.to_string()).collect();
        let coords: Vec<&str> = field.coords.iter().map(|c| c.name.as_str()).collect();
        println!(
            "{},{},\"{}\",\"{}\"",
            field.name,
            field.units.as_deref().unwrap_or(""),
            shape.join(";"),
            coords.join(";")
        );
    }
    Ok(())
}
