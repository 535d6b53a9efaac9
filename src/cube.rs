//! # Forecast Field Model
//!
//! A [`Cube`] is a named n-dimensional array with labelled coordinates, the
//! in-memory shape of one NetCDF data variable. Coordinates are either
//! attached to a data dimension or scalar (a single point describing the
//! whole field, such as a 1.5 m screen height).
//!
//! ```rust
//! use mogreps_pair::cube::{Coord, Cube};
//! use ndarray::{ArrayD, IxDyn};
//!
//! let data = ArrayD::from_shape_vec(IxDyn(&[3, 2]), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
//! let mut cube = Cube::new("air_temperature", data);
//! cube.add_dim_coord(Coord::new("pressure", vec![1000.0, 850.0, 500.0]), 0)?;
//! cube.add_dim_coord(Coord::new("latitude", vec![50.0, 51.0]), 1)?;
//!
//! let surface = cube.extract("pressure", 1000.0)?;
//! assert_eq!(surface.shape(), &[2]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use ndarray::{ArrayD, Axis};
use std::fmt;
use thiserror::Error;

/// Errors raised while querying or slicing a field
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("Coordinate '{0}' not found")]
    CoordinateNotFound(String),

    #[error("Parameter '{0}' not found in field collection")]
    ParameterNotFound(String),

    #[error("No point of coordinate '{coord}' equals {value}")]
    Selection { coord: String, value: f64 },

    #[error("Intersection of '{coord}' with [{min}, {max}] is empty")]
    EmptyIntersection { coord: String, min: f64, max: f64 },

    #[error("Coordinate '{coord}' has {points} points but dimension {dim} has length {len}")]
    ShapeMismatch {
        coord: String,
        points: usize,
        dim: usize,
        len: usize,
    },

    #[error("Coordinate '{0}' is not a dimension coordinate")]
    NotDimensionCoord(String),
}

/// Coordinate reference system attached to a field's horizontal grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordSystem {
    /// Latitude/longitude on a sphere rotated so that its north pole sits at
    /// the given geographic position.
    RotatedPole {
        grid_north_pole_latitude: f64,
        grid_north_pole_longitude: f64,
    },
    /// Plain geographic latitude/longitude on a sphere of the given radius.
    Geog { semi_major_axis: f64 },
}

/// A labelled coordinate of a [`Cube`].
#[derive(Debug, Clone, PartialEq)]
pub struct Coord {
    pub name: String,
    pub var_name: Option<String>,
    pub units: Option<String>,
    pub points: Vec<f64>,
    /// Data dimension this coordinate describes, `None` for scalar coordinates
    pub dim: Option<usize>,
}

impl Coord {
    pub fn new(name: &str, points: Vec<f64>) -> Self {
        Coord {
            name: name.to_string(),
            var_name: None,
            units: None,
            points,
            dim: None,
        }
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.units = Some(units.to_string());
        self
    }

    pub fn with_var_name(mut self, var_name: &str) -> Self {
        self.var_name = Some(var_name.to_string());
        self
    }

    pub fn is_scalar(&self) -> bool {
        self.dim.is_none()
    }

    pub fn min(&self) -> Option<f64> {
        self.points.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.points.iter().copied().reduce(f64::max)
    }

    pub fn first(&self) -> Option<f64> {
        self.points.first().copied()
    }

    pub fn last(&self) -> Option<f64> {
        self.points.last().copied()
    }

    /// True when every point is strictly greater than the one before it.
    pub fn is_ascending(&self) -> bool {
        self.points.windows(2).all(|w| w[0] < w[1])
    }

    /// Points decoded as timestamps when the units follow the CF
    /// `"<unit> since <epoch>"` form.
    ///
    /// `None` when a point falls outside the representable date range.
    pub fn datetime_points(&self) -> Option<Vec<NaiveDateTime>> {
        let (step, epoch) = parse_time_units(self.units.as_deref()?)?;
        self.points
            .iter()
            .map(|p| {
                let millis = (p * step.num_milliseconds() as f64).round();
                if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
                    return None;
                }
                epoch.checked_add_signed(TimeDelta::try_milliseconds(millis as i64)?)
            })
            .collect()
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(units) = &self.units {
            write!(f, " [{}]", units)?;
        }
        match self.datetime_points() {
            Some(times) if times.len() <= 4 => {
                let shown: Vec<String> = times.iter().map(|t| t.to_string()).collect();
                write!(f, ": {}", shown.join(", "))
            }
            _ if self.points.len() <= 4 => write!(f, ": {:?}", self.points),
            _ => write!(
                f,
                ": {} points from {} to {}",
                self.points.len(),
                self.first().unwrap_or(f64::NAN),
                self.last().unwrap_or(f64::NAN)
            ),
        }
    }
}

fn parse_time_units(units: &str) -> Option<(TimeDelta, NaiveDateTime)> {
    let (unit, epoch) = units.split_once(" since ")?;
    let step = match unit.trim().to_ascii_lowercase().as_str() {
        "seconds" | "second" | "s" => TimeDelta::seconds(1),
        "minutes" | "minute" => TimeDelta::minutes(1),
        "hours" | "hour" | "h" => TimeDelta::hours(1),
        "days" | "day" | "d" => TimeDelta::days(1),
        _ => return None,
    };
    let epoch = epoch.trim().trim_end_matches(" UTC").trim_end_matches('Z');
    let parsed = NaiveDateTime::parse_from_str(epoch, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(epoch, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(epoch, "%Y-%m-%d %H:%M"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(epoch, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Some((step, parsed))
}

/// A named forecast field with its coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Cube {
    pub name: String,
    pub var_name: Option<String>,
    pub units: Option<String>,
    pub data: ArrayD<f64>,
    pub coord_system: Option<CoordSystem>,
    coords: Vec<Coord>,
}

impl Cube {
    pub fn new(name: &str, data: ArrayD<f64>) -> Self {
        Cube {
            name: name.to_string(),
            var_name: None,
            units: None,
            data,
            coord_system: None,
            coords: Vec::new(),
        }
    }

    pub fn with_coord_system(mut self, coord_system: CoordSystem) -> Self {
        self.coord_system = Some(coord_system);
        self
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Coordinates in the order they were added.
    pub fn coords(&self) -> &[Coord] {
        &self.coords
    }

    pub fn has_coord(&self, name: &str) -> bool {
        self.coords.iter().any(|c| c.name == name)
    }

    pub fn coord(&self, name: &str) -> Result<&Coord, FieldError> {
        self.coords
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| FieldError::CoordinateNotFound(name.to_string()))
    }

    /// The dimension coordinate describing `dim`, if any.
    pub fn dim_coord(&self, dim: usize) -> Option<&Coord> {
        self.coords.iter().find(|c| c.dim == Some(dim))
    }

    /// Attaches `coord` to data dimension `dim`, replacing any coordinate
    /// already describing that dimension.
    pub fn add_dim_coord(&mut self, mut coord: Coord, dim: usize) -> Result<(), FieldError> {
        let len = self.data.shape().get(dim).copied().unwrap_or(0);
        if dim >= self.data.ndim() || coord.points.len() != len {
            return Err(FieldError::ShapeMismatch {
                coord: coord.name,
                points: coord.points.len(),
                dim,
                len,
            });
        }
        self.coords.retain(|c| c.dim != Some(dim));
        coord.dim = Some(dim);
        self.coords.push(coord);
        Ok(())
    }

    /// Attaches a single-point coordinate that describes the whole field.
    pub fn add_scalar_coord(&mut self, mut coord: Coord) -> Result<(), FieldError> {
        if coord.points.len() != 1 {
            return Err(FieldError::ShapeMismatch {
                coord: coord.name,
                points: coord.points.len(),
                dim: 0,
                len: 1,
            });
        }
        coord.dim = None;
        self.coords.push(coord);
        Ok(())
    }

    pub fn remove_coord(&mut self, name: &str) -> Result<Coord, FieldError> {
        let pos = self
            .coords
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| FieldError::CoordinateNotFound(name.to_string()))?;
        Ok(self.coords.remove(pos))
    }

    /// Sub-field where coordinate `name` equals `value`.
    ///
    /// Selecting on a dimension coordinate removes that dimension from the
    /// data and keeps the coordinate as a scalar. Selecting on a scalar
    /// coordinate returns the field unchanged when its point matches.
    pub fn extract(&self, name: &str, value: f64) -> Result<Cube, FieldError> {
        let coord = self.coord(name)?;
        let not_found = || FieldError::Selection {
            coord: name.to_string(),
            value,
        };

        let Some(dim) = coord.dim else {
            return if coord.points.contains(&value) {
                Ok(self.clone())
            } else {
                Err(not_found())
            };
        };

        let index = coord
            .points
            .iter()
            .position(|p| *p == value)
            .ok_or_else(not_found)?;

        let data = self.data.index_axis(Axis(dim), index).to_owned();
        let coords = self
            .coords
            .iter()
            .map(|c| match c.dim {
                Some(d) if d == dim => Coord {
                    points: vec![c.points[index]],
                    dim: None,
                    ..c.clone()
                },
                Some(d) if d > dim => Coord {
                    dim: Some(d - 1),
                    ..c.clone()
                },
                _ => c.clone(),
            })
            .collect();

        Ok(Cube {
            data,
            coords,
            ..self.clone_meta()
        })
    }

    /// Sub-field of points of dimension coordinate `name` inside
    /// `[min, max]`.
    ///
    /// A coordinate named `longitude` is treated as circular: points are
    /// wrapped into `[min, min + 360)` before the test and the result is
    /// ordered by the wrapped values.
    pub fn intersection(&self, name: &str, min: f64, max: f64) -> Result<Cube, FieldError> {
        let coord = self.coord(name)?;
        let dim = coord
            .dim
            .ok_or_else(|| FieldError::NotDimensionCoord(name.to_string()))?;

        let circular = coord.name == "longitude";
        let mut selected: Vec<(usize, f64)> = coord
            .points
            .iter()
            .enumerate()
            .filter_map(|(i, &p)| {
                let v = if circular { min + (p - min).rem_euclid(360.0) } else { p };
                (v >= min && v <= max).then_some((i, v))
            })
            .collect();

        if selected.is_empty() {
            return Err(FieldError::EmptyIntersection {
                coord: name.to_string(),
                min,
                max,
            });
        }
        if circular {
            selected.sort_by(|a, b| a.1.total_cmp(&b.1));
        }

        let indices: Vec<usize> = selected.iter().map(|(i, _)| *i).collect();
        let points: Vec<f64> = selected.iter().map(|(_, v)| *v).collect();
        self.take_along(dim, &indices, Some(points))
    }

    /// Reorders or subsets dimension `dim` by `indices`, optionally
    /// replacing that dimension's coordinate points.
    fn take_along(
        &self,
        dim: usize,
        indices: &[usize],
        replacement: Option<Vec<f64>>,
    ) -> Result<Cube, FieldError> {
        let data = self.data.select(Axis(dim), indices);
        let coords = self
            .coords
            .iter()
            .map(|c| {
                if c.dim == Some(dim) {
                    let points = replacement
                        .clone()
                        .unwrap_or_else(|| indices.iter().map(|&i| c.points[i]).collect());
                    Coord { points, ..c.clone() }
                } else {
                    c.clone()
                }
            })
            .collect();
        Ok(Cube {
            data,
            coords,
            ..self.clone_meta()
        })
    }

    fn clone_meta(&self) -> Cube {
        Cube {
            name: self.name.clone(),
            var_name: self.var_name.clone(),
            units: self.units.clone(),
            data: ArrayD::zeros(ndarray::IxDyn(&[0])),
            coord_system: self.coord_system,
            coords: Vec::new(),
        }
    }
}

impl fmt::Display for Cube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(units) = &self.units {
            write!(f, " / ({})", units)?;
        }
        let dims: Vec<String> = (0..self.data.ndim())
            .map(|d| match self.dim_coord(d) {
                Some(c) => format!("{}: {}", c.name, self.data.shape()[d]),
                None => format!("-- : {}", self.data.shape()[d]),
            })
            .collect();
        write!(f, " ({})", dims.join("; "))
    }
}

/// Ordered collection of fields loaded from one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CubeList {
    cubes: Vec<Cube>,
}

impl CubeList {
    pub fn new() -> Self {
        CubeList { cubes: Vec::new() }
    }

    pub fn push(&mut self, cube: Cube) {
        self.cubes.push(cube);
    }

    pub fn len(&self) -> usize {
        self.cubes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cubes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cube> {
        self.cubes.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.cubes.iter().map(|c| c.name.as_str()).collect()
    }

    /// First field whose name equals `name`.
    pub fn get(&self, name: &str) -> Result<&Cube, FieldError> {
        self.cubes
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| FieldError::ParameterNotFound(name.to_string()))
    }
}

impl From<Vec<Cube>> for CubeList {
    fn from(cubes: Vec<Cube>) -> Self {
        CubeList { cubes }
    }
}

impl IntoIterator for CubeList {
    type Item = Cube;
    type IntoIter = std::vec::IntoIter<Cube>;

    fn into_iter(self) -> Self::IntoIter {
        self.cubes.into_iter()
    }
}
