//! Ground-level selection for fields with a vertical coordinate.

use crate::cube::{Coord, Cube, FieldError};
use log::debug;

const HEIGHT_PREFIX: &str = "height";
const PRESSURE_PREFIX: &str = "pressure";

/// Reduces `cube` to the level closest to the ground.
///
/// Height coordinates take precedence over pressure coordinates: a coordinate
/// whose name starts with `"height"` selects its minimum value, otherwise one
/// starting with `"pressure"` selects its maximum value. When several
/// coordinates share a prefix, the last one in coordinate order is used.
///
/// Returns the reduced field and the name of the vertical coordinate, which
/// callers usually remove afterwards. A field without a vertical coordinate
/// is returned unchanged with `None`.
///
/// # Errors
///
/// Returns [`FieldError::Selection`] if the chosen value cannot be selected.
pub fn select_ground_level(cube: &Cube) -> Result<(Cube, Option<String>), FieldError> {
    if let Some(coord) = last_with_prefix(cube, HEIGHT_PREFIX) {
        let value = lowest(coord)?;
        debug!("Selecting {} = {} from '{}'", coord.name, value, cube.name);
        return Ok((cube.extract(&coord.name, value)?, Some(coord.name.clone())));
    }

    if let Some(coord) = last_with_prefix(cube, PRESSURE_PREFIX) {
        let value = highest(coord)?;
        debug!("Selecting {} = {} from '{}'", coord.name, value, cube.name);
        return Ok((cube.extract(&coord.name, value)?, Some(coord.name.clone())));
    }

    Ok((cube.clone(), None))
}

fn last_with_prefix<'a>(cube: &'a Cube, prefix: &str) -> Option<&'a Coord> {
    cube.coords().iter().rev().find(|c| c.name.starts_with(prefix))
}

fn lowest(coord: &Coord) -> Result<f64, FieldError> {
    coord.min().ok_or_else(|| FieldError::Selection {
        coord: coord.name.clone(),
        value: f64::NAN,
    })
}

fn highest(coord: &Coord) -> Result<f64, FieldError> {
    coord.max().ok_or_else(|| FieldError::Selection {
        coord: coord.name.clone(),
        value: f64::NAN,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn levels_cube(vertical: &str, points: Vec<f64>) -> Cube {
        let n = points.len();
        let values = (0..n * 2).map(|v| v as f64).collect();
        let data = ArrayD::from_shape_vec(IxDyn(&[n, 2]), values).unwrap();
        let mut cube = Cube::new("wind_speed", data);
        cube.add_dim_coord(Coord::new(vertical, points), 0).unwrap();
        cube.add_dim_coord(Coord::new("grid_latitude", vec![-1.0, 1.0]), 1).unwrap();
        cube
    }

    #[test]
    fn test_height_selects_minimum() {
        let cube = levels_cube("height", vec![100.0, 10.0, 1000.0]);
        let (ground, name) = select_ground_level(&cube).unwrap();
        assert_eq!(name.as_deref(), Some("height"));
        assert_eq!(ground.shape(), &[2]);
        assert_eq!(ground.data.as_slice().unwrap(), &[2.0, 3.0]);
        assert_eq!(ground.coord("height").unwrap().points, vec![10.0]);
    }

    #[test]
    fn test_pressure_selects_maximum() {
        let cube = levels_cube("pressure", vec![500.0, 1000.0, 850.0]);
        let (ground, name) = select_ground_level(&cube).unwrap();
        assert_eq!(name.as_deref(), Some("pressure"));
        assert_eq!(ground.data.as_slice().unwrap(), &[2.0, 3.0]);
    }

    #[test]
    fn test_prefix_match_on_longer_names() {
        let cube = levels_cube("height_above_reference_ellipsoid", vec![20.0, 5.0]);
        let (ground, name) = select_ground_level(&cube).unwrap();
        assert_eq!(name.as_deref(), Some("height_above_reference_ellipsoid"));
        assert_eq!(ground.data.as_slice().unwrap(), &[2.0, 3.0]);
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let cube = levels_cube("Height", vec![20.0, 5.0]);
        let (ground, name) = select_ground_level(&cube).unwrap();
        assert!(name.is_none());
        assert_eq!(ground, cube);
    }

    #[test]
    fn test_height_takes_precedence_over_pressure() {
        let mut cube = levels_cube("pressure", vec![1000.0, 850.0]);
        cube.add_scalar_coord(Coord::new("height", vec![1.5])).unwrap();
        let (ground, name) = select_ground_level(&cube).unwrap();
        assert_eq!(name.as_deref(), Some("height"));
        // scalar height leaves the field untouched
        assert_eq!(ground, cube);
    }

    #[test]
    fn test_last_matching_coord_wins() {
        let mut cube = levels_cube("height", vec![100.0, 10.0]);
        cube.add_scalar_coord(Coord::new("height_of_model_level", vec![7.0])).unwrap();
        let (_, name) = select_ground_level(&cube).unwrap();
        assert_eq!(name.as_deref(), Some("height_of_model_level"));
    }

    #[test]
    fn test_no_vertical_coord() {
        let cube = levels_cube("model_level_number", vec![1.0, 2.0]);
        let (ground, name) = select_ground_level(&cube).unwrap();
        assert!(name.is_none());
        assert_eq!(ground, cube);
    }
}
