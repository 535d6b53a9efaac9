//! # Parquet Output Module
//!
//! Flattens aligned fields into Polars DataFrames (one row per grid point, one
//! column per dimension coordinate followed by the field values) and writes
//! them as Parquet files, locally or to S3.
//!
//! Each pair produces two files named after the regional source file:
//! `{stem}_regional.parquet` and `{stem}_global.parquet`.

use crate::cube::Cube;
use crate::filename::base_name;
use crate::pairing::FieldPair;
use crate::storage::{StorageBackend, StorageConfig, StorageError, StorageFactory, join_path};
use log::debug;
use polars::prelude::*;
use std::fs::File;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output '{0}' already exists (use --force to overwrite)")]
    AlreadyExists(String),
}

/// Flattens `cube` into a DataFrame in row-major order.
///
/// Dimensions without a coordinate get an index column named `dim_{n}`.
pub fn cube_to_dataframe(cube: &Cube) -> Result<DataFrame, OutputError> {
    let ndim = cube.data.ndim();
    let names: Vec<String> = (0..ndim)
        .map(|d| match cube.dim_coord(d) {
            Some(coord) => coord.name.clone(),
            None => format!("dim_{}", d),
        })
        .collect();

    let mut coord_values: Vec<Vec<f64>> = vec![Vec::with_capacity(cube.data.len()); ndim];
    let mut values = Vec::with_capacity(cube.data.len());
    for (index, value) in cube.data.indexed_iter() {
        for (d, column) in coord_values.iter_mut().enumerate() {
            let i = index[d];
            let point = cube.dim_coord(d).map(|c| c.points[i]).unwrap_or(i as f64);
            column.push(point);
        }
        values.push(*value);
    }

    let mut columns: Vec<Column> = names
        .iter()
        .zip(coord_values)
        .map(|(name, points)| Series::new(name.as_str().into(), points).into())
        .collect();
    columns.push(Series::new(cube.name.as_str().into(), values).into());

    Ok(DataFrame::new(columns)?)
}

/// Writes `df` to a local Parquet file.
pub fn write_dataframe_to_parquet(df: &DataFrame, output_path: &str) -> Result<(), OutputError> {
    debug!("Writing DataFrame {:?} to {}", df.shape(), output_path);
    debug!("DataFrame schema:\n{:?}", df.schema());

    let file = File::create(output_path)?;
    let mut df = df.clone();
    ParquetWriter::new(file).finish(&mut df)?;
    Ok(())
}

/// Writes `df` to a local path or an `s3://` location.
///
/// S3 outputs are written to a temporary file first and then uploaded.
pub async fn write_dataframe(
    df: &DataFrame,
    output_path: &str,
    storage_config: &StorageConfig,
    force: bool,
) -> Result<(), OutputError> {
    let storage = StorageFactory::from_path(output_path, storage_config).await?;
    if !force && storage.exists(output_path).await? {
        return Err(OutputError::AlreadyExists(output_path.to_string()));
    }

    if StorageFactory::is_s3_path(output_path) {
        let temp_file = tempfile::Builder::new().suffix(".parquet").tempfile()?;
        write_dataframe_to_parquet(df, &temp_file.path().to_string_lossy())?;
        let data = tokio::fs::read(temp_file.path()).await?;
        storage.write(output_path, &data).await?;
        debug!("Uploaded {} bytes to {}", data.len(), output_path);
    } else {
        if let Some(parent) = std::path::Path::new(output_path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        write_dataframe_to_parquet(df, output_path)?;
    }
    Ok(())
}

/// Output paths of a pair's regional and global files under `output_dir`.
pub fn pair_output_paths(pair: &FieldPair, output_dir: &str) -> (String, String) {
    let name = base_name(&pair.regional_file);
    let stem = name.split_once('.').map_or(name, |(stem, _)| stem);
    (
        join_path(output_dir, &format!("{}_regional.parquet", stem)),
        join_path(output_dir, &format!("{}_global.parquet", stem)),
    )
}

/// Exports both fields of `pair`, returning the written paths.
pub async fn write_pair(
    pair: &FieldPair,
    output_dir: &str,
    storage_config: &StorageConfig,
    force: bool,
) -> Result<(String, String), OutputError> {
    let (regional_path, global_path) = pair_output_paths(pair, output_dir);
    let regional = cube_to_dataframe(&pair.regional)?;
    write_dataframe(&regional, &regional_path, storage_config, force).await?;
    let global = cube_to_dataframe(&pair.global)?;
    write_dataframe(&global, &global_path, storage_config, force).await?;
    Ok((regional_path, global_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::Coord;
    use ndarray::{ArrayD, IxDyn};

    fn column_values(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
        df.column(name).unwrap().f64().unwrap().into_iter().collect()
    }

    fn small_cube() -> Cube {
        let data =
            ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let mut cube = Cube::new("air_temperature", data);
        cube.add_dim_coord(Coord::new("latitude", vec![50.0, 51.0]), 0).unwrap();
        cube.add_dim_coord(Coord::new("longitude", vec![-2.0, -1.0, 0.0]), 1).unwrap();
        cube.add_scalar_coord(Coord::new("height", vec![1.5])).unwrap();
        cube
    }

    #[test]
    fn test_cube_to_dataframe() {
        let df = cube_to_dataframe(&small_cube()).unwrap();
        assert_eq!(df.shape(), (6, 3));
        let names: Vec<&str> = df.get_column_names().iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["latitude", "longitude", "air_temperature"]);

        let lat = column_values(&df, "latitude");
        assert_eq!(lat[2], Some(50.0));
        assert_eq!(lat[3], Some(51.0));
        let lon = column_values(&df, "longitude");
        assert_eq!(lon[4], Some(-1.0));
        let values = column_values(&df, "air_temperature");
        assert_eq!(values[5], Some(6.0));
    }

    #[test]
    fn test_dimension_without_coord_uses_index() {
        let data = ArrayD::from_shape_vec(IxDyn(&[3]), vec![7.0, 8.0, 9.0]).unwrap();
        let df = cube_to_dataframe(&Cube::new("x", data)).unwrap();
        assert_eq!(column_values(&df, "dim_0"), vec![Some(0.0), Some(1.0), Some(2.0)]);
    }

    #[tokio::test]
    async fn test_write_dataframe_respects_force() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.parquet");
        let path = path.to_string_lossy().to_string();
        let df = cube_to_dataframe(&small_cube()).unwrap();
        let config = StorageConfig::default();

        write_dataframe(&df, &path, &config, false).await.unwrap();
        assert!(std::path::Path::new(&path).exists());

        assert!(matches!(
            write_dataframe(&df, &path, &config, false).await,
            Err(OutputError::AlreadyExists(_))
        ));
        write_dataframe(&df, &path, &config, true).await.unwrap();

        let read_back = ParquetReader::new(File::open(&path).unwrap()).finish().unwrap();
        assert_eq!(read_back.shape(), (6, 3));
    }

    #[test]
    fn test_pair_output_paths() {
        let pair = FieldPair {
            regional_file: "uk/prods_op_mogreps-uk_20160107_03_00_003.nc".to_string(),
            global_file: "prods_op_mogreps-g_20160107_00_00_006.nc".to_string(),
            time: 6.0,
            regional: small_cube(),
            global: small_cube(),
        };
        let (regional, global) = pair_output_paths(&pair, "s3://pairs/out");
        let stem = "s3://pairs/out/prods_op_mogreps-uk_20160107_03_00_003";
        assert_eq!(regional, format!("{}_regional.parquet", stem));
        assert_eq!(global, format!("{}_global.parquet", stem));
    }
}
