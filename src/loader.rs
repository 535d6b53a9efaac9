//! # Field Loading
//!
//! Reads NetCDF forecast files into a [`CubeList`], one [`Cube`] per data
//! variable. Coordinates come from CF coordinate variables (1-D variables
//! named after a dimension), scalar variables listed in a `coordinates`
//! attribute, and the `grid_mapping` variable for the coordinate system.
//!
//! Files on S3 are staged into a temporary file before being opened, since
//! the NetCDF library reads from a filesystem path.

use crate::cube::{Coord, CoordSystem, Cube, CubeList, FieldError};
use crate::grid::EARTH_RADIUS_M;
use crate::storage::{
    Storage, StorageBackend, StorageConfig, StorageError, StorageFactory, join_path,
};
use log::debug;
use ndarray::{ArrayD, IxDyn};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to open NetCDF file '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: netcdf::Error,
    },

    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    #[error("Variable '{var}' has inconsistent shape: {source}")]
    Shape {
        var: String,
        #[source]
        source: ndarray::ShapeError,
    },

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which archive a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Product {
    Regional,
    Global,
}

/// Source of field collections for the pairing driver.
#[async_trait::async_trait]
pub trait FieldLoader: Send + Sync {
    /// Loads every field of `filename` from the archive of `product`.
    async fn load(&self, product: Product, filename: &str) -> Result<CubeList, LoaderError>;
}

/// Loads NetCDF files from a regional and a global archive root, each either
/// a local directory or an `s3://bucket/prefix/` location.
pub struct NetcdfLoader {
    regional_root: String,
    global_root: String,
    regional_storage: Storage,
    global_storage: Storage,
}

impl NetcdfLoader {
    pub async fn new(
        regional_root: &str,
        global_root: &str,
        config: &StorageConfig,
    ) -> Result<Self, StorageError> {
        Ok(NetcdfLoader {
            regional_root: regional_root.to_string(),
            global_root: global_root.to_string(),
            regional_storage: StorageFactory::from_path(regional_root, config).await?,
            global_storage: StorageFactory::from_path(global_root, config).await?,
        })
    }
}

#[async_trait::async_trait]
impl FieldLoader for NetcdfLoader {
    async fn load(&self, product: Product, filename: &str) -> Result<CubeList, LoaderError> {
        let (root, storage) = match product {
            Product::Regional => (&self.regional_root, &self.regional_storage),
            Product::Global => (&self.global_root, &self.global_storage),
        };
        load_path(&join_path(root, filename), storage).await
    }
}

/// Loads a local or `s3://` NetCDF file through `storage`.
pub async fn load_path(path: &str, storage: &Storage) -> Result<CubeList, LoaderError> {
    match storage {
        Storage::Local(_) => read_cubes(path),
        Storage::S3(s3) => {
            let data = s3.read(path).await?;
            let staged = tempfile::Builder::new().suffix(".nc").tempfile()?;
            debug!("Staging {} ({} bytes) at {:?}", path, data.len(), staged.path());
            tokio::fs::write(staged.path(), data).await?;
            // temp file must outlive the open NetCDF handle inside read_cubes
            let cubes = read_cubes(staged.path())?;
            drop(staged);
            Ok(cubes)
        }
    }
}

/// Reads every data variable of a NetCDF file as a [`Cube`].
pub fn read_cubes<P: AsRef<Path>>(path: P) -> Result<CubeList, LoaderError> {
    let path_str = path.as_ref().to_string_lossy().to_string();
    debug!("Opening NetCDF file: {}", path_str);
    let file = netcdf::open(path.as_ref()).map_err(|source| LoaderError::Open {
        path: path_str.clone(),
        source,
    })?;

    let dimension_names: HashSet<String> = file.dimensions().map(|d| d.name()).collect();
    let auxiliary = auxiliary_variable_names(&file);

    let mut cubes = CubeList::new();
    for var in file.variables() {
        let name = var.name();
        let is_coordinate = dimension_names.contains(&name) && var.dimensions().len() == 1;
        if is_coordinate || auxiliary.contains(&name) {
            continue;
        }
        cubes.push(read_cube(&file, &var)?);
    }

    debug!("Loaded {} fields from {}: {:?}", cubes.len(), path_str, cubes.names());
    Ok(cubes)
}

/// Names of variables that describe other variables rather than hold data.
fn auxiliary_variable_names(file: &netcdf::File) -> HashSet<String> {
    let mut names = HashSet::new();
    for var in file.variables() {
        if let Some(coords) = attr_string(&var, "coordinates") {
            names.extend(coords.split_whitespace().map(str::to_string));
        }
        for key in ["grid_mapping", "bounds"] {
            if let Some(target) = attr_string(&var, key) {
                names.insert(target);
            }
        }
        if attr_string(&var, "grid_mapping_name").is_some() {
            names.insert(var.name());
        }
    }
    names
}

fn read_cube(file: &netcdf::File, var: &netcdf::Variable) -> Result<Cube, LoaderError> {
    let var_name = var.name();
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    let values = unpack(var, var.get_values::<f64, _>(..)?);
    let data = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|source| LoaderError::Shape {
        var: var_name.clone(),
        source,
    })?;

    let mut cube = Cube::new(&display_name(var), data);
    cube.var_name = Some(var_name.clone());
    cube.units = attr_string(var, "units");

    for (i, dim) in var.dimensions().iter().enumerate() {
        let dim_name = dim.name();
        if let Some(coord_var) = file.variable(&dim_name) {
            if coord_var.dimensions().len() == 1 {
                let coord = read_coord(&coord_var)?;
                cube.add_dim_coord(coord, i)?;
            }
        }
    }

    if let Some(coords) = attr_string(var, "coordinates") {
        for coord_name in coords.split_whitespace() {
            let Some(coord_var) = file.variable(coord_name) else {
                debug!("'{}' lists missing coordinate '{}'", var_name, coord_name);
                continue;
            };
            let coord = read_coord(&coord_var)?;
            if coord.points.len() == 1 && !cube.has_coord(&coord.name) {
                cube.add_scalar_coord(coord)?;
            }
        }
    }

    if let Some(mapping) = attr_string(var, "grid_mapping") {
        cube.coord_system = file.variable(&mapping).and_then(|m| coord_system(&m));
    }

    Ok(cube)
}

fn read_coord(var: &netcdf::Variable) -> Result<Coord, LoaderError> {
    let points = var.get_values::<f64, _>(..)?;
    let mut coord = Coord::new(&display_name(var), points).with_var_name(&var.name());
    coord.units = attr_string(var, "units");
    Ok(coord)
}

fn coord_system(var: &netcdf::Variable) -> Option<CoordSystem> {
    match attr_string(var, "grid_mapping_name")?.as_str() {
        "rotated_latitude_longitude" => Some(CoordSystem::RotatedPole {
            grid_north_pole_latitude: attr_f64(var, "grid_north_pole_latitude")?,
            grid_north_pole_longitude: attr_f64(var, "grid_north_pole_longitude")?,
        }),
        "latitude_longitude" => Some(CoordSystem::Geog {
            semi_major_axis: attr_f64(var, "earth_radius")
                .or_else(|| attr_f64(var, "semi_major_axis"))
                .unwrap_or(EARTH_RADIUS_M),
        }),
        other => {
            debug!("Unsupported grid mapping '{}'", other);
            None
        }
    }
}

/// CF-convention name: `standard_name`, then `long_name`, then the variable name.
fn display_name(var: &netcdf::Variable) -> String {
    attr_string(var, "standard_name")
        .or_else(|| attr_string(var, "long_name"))
        .unwrap_or_else(|| var.name())
}

/// Applies fill values and packing attributes.
fn unpack(var: &netcdf::Variable, mut values: Vec<f64>) -> Vec<f64> {
    let fill = attr_f64(var, "_FillValue").or_else(|| attr_f64(var, "missing_value"));
    let scale = attr_f64(var, "scale_factor").unwrap_or(1.0);
    let offset = attr_f64(var, "add_offset").unwrap_or(0.0);

    for v in values.iter_mut() {
        if fill.is_some_and(|f| *v == f) {
            *v = f64::NAN;
        } else {
            *v = *v * scale + offset;
        }
    }
    values
}

fn attr_string(var: &netcdf::Variable, name: &str) -> Option<String> {
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        netcdf::AttributeValue::Strs(v) => v.into_iter().next(),
        _ => None,
    }
}

fn attr_f64(var: &netcdf::Variable, name: &str) -> Option<f64> {
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Double(d) => Some(d),
        netcdf::AttributeValue::Float(f) => Some(f as f64),
        netcdf::AttributeValue::Int(i) => Some(i as f64),
        netcdf::AttributeValue::Short(s) => Some(s as f64),
        netcdf::AttributeValue::Longlong(l) => Some(l as f64),
        netcdf::AttributeValue::Doubles(v) => v.first().copied(),
        netcdf::AttributeValue::Floats(v) => v.first().map(|f| *f as f64),
        _ => None,
    }
}
