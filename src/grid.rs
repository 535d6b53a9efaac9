//! # Grid Alignment
//!
//! Brings a rotated-pole regional field onto plain latitude/longitude and
//! crops a global field down to the regional extent, so that both describe
//! the same area.
//!
//! The rotation maps a rotated point `(λ', φ')` to geographic coordinates by
//! expressing it in the basis formed by the rotated origin, the rotated east
//! axis and the rotated pole. The rotated origin lands on
//! `(pole_lon - 180, 90 - pole_lat)`.

use crate::cube::{Coord, CoordSystem, Cube, FieldError};
use log::debug;
use thiserror::Error;

/// Earth radius used for the unrotated coordinate system (metres).
pub const EARTH_RADIUS_M: f64 = 6_371_229.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Field '{0}' has no rotated-pole coordinate system")]
    MissingPole(String),

    #[error("Coordinate '{coord}' of field '{cube}' must be strictly ascending")]
    NotAscending { cube: String, coord: String },

    #[error("Coordinate '{coord}' of field '{cube}' has no points")]
    EmptyCoord { cube: String, coord: String },

    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Converts rotated-pole coordinates to geographic longitudes and latitudes
/// (degrees). Input slices are element-wise pairs.
pub fn unrotate_pole(
    rotated_lons: &[f64],
    rotated_lats: &[f64],
    pole_lon: f64,
    pole_lat: f64,
) -> (Vec<f64>, Vec<f64>) {
    let (sin_pl, cos_pl) = pole_lat.to_radians().sin_cos();
    let (sin_pn, cos_pn) = pole_lon.to_radians().sin_cos();

    rotated_lons
        .iter()
        .zip(rotated_lats)
        .map(|(&lon, &lat)| {
            let (sin_lon, cos_lon) = lon.to_radians().sin_cos();
            let (sin_lat, cos_lat) = lat.to_radians().sin_cos();
            let x = cos_lat * cos_lon;
            let y = cos_lat * sin_lon;
            let z = sin_lat;

            let gx = -x * sin_pl * cos_pn + y * sin_pn + z * cos_pl * cos_pn;
            let gy = -x * sin_pl * sin_pn - y * cos_pn + z * cos_pl * sin_pn;
            let gz = x * cos_pl + z * sin_pl;

            let glon = gy.atan2(gx).to_degrees();
            let glat = gz.clamp(-1.0, 1.0).asin().to_degrees();
            (wrap_longitude(glon), glat)
        })
        .unzip()
}

fn wrap_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 { 180.0 } else { wrapped }
}

/// Replaces the `grid_latitude`/`grid_longitude` coordinates of `regional`
/// with geographic `latitude`/`longitude` dimension coordinates.
///
/// The unrotated meshgrid is not regular; latitudes are taken along the
/// first longitude column and longitudes along the first latitude row. Units
/// of the new coordinates are copied from `reference`.
///
/// # Errors
///
/// Returns [`GridError::MissingPole`] when `regional` has no rotated-pole
/// coordinate system, or a [`FieldError`] when a required coordinate is
/// missing.
pub fn unrotate(regional: &Cube, reference: &Cube) -> Result<Cube, GridError> {
    let Some(CoordSystem::RotatedPole {
        grid_north_pole_latitude,
        grid_north_pole_longitude,
    }) = regional.coord_system
    else {
        return Err(GridError::MissingPole(regional.name.clone()));
    };

    let grid_lat = regional.coord("grid_latitude")?;
    let grid_lon = regional.coord("grid_longitude")?;
    let lat_dim = grid_lat
        .dim
        .ok_or_else(|| FieldError::NotDimensionCoord(grid_lat.name.clone()))?;
    let lon_dim = grid_lon
        .dim
        .ok_or_else(|| FieldError::NotDimensionCoord(grid_lon.name.clone()))?;
    let lon0 = grid_lon.first().ok_or_else(|| GridError::EmptyCoord {
        cube: regional.name.clone(),
        coord: grid_lon.name.clone(),
    })?;
    let lat0 = grid_lat.first().ok_or_else(|| GridError::EmptyCoord {
        cube: regional.name.clone(),
        coord: grid_lat.name.clone(),
    })?;

    // Column at the first rotated longitude gives the latitudes, row at the
    // first rotated latitude gives the longitudes.
    let (_, lats) = unrotate_pole(
        &vec![lon0; grid_lat.points.len()],
        &grid_lat.points,
        grid_north_pole_longitude,
        grid_north_pole_latitude,
    );
    let (lons, _) = unrotate_pole(
        &grid_lon.points,
        &vec![lat0; grid_lon.points.len()],
        grid_north_pole_longitude,
        grid_north_pole_latitude,
    );
    debug!(
        "Unrotated '{}' with pole ({}, {}): lat {:?}..{:?}, lon {:?}..{:?}",
        regional.name,
        grid_north_pole_longitude,
        grid_north_pole_latitude,
        lats.first(),
        lats.last(),
        lons.first(),
        lons.last()
    );

    let mut latitude = Coord::new("latitude", lats).with_var_name("latitude");
    latitude.units = reference.coord("latitude")?.units.clone();
    let mut longitude = Coord::new("longitude", lons).with_var_name("longitude");
    longitude.units = reference.coord("longitude")?.units.clone();

    let mut unrotated = regional.clone();
    unrotated.remove_coord("grid_latitude")?;
    unrotated.add_dim_coord(latitude, lat_dim)?;
    unrotated.remove_coord("grid_longitude")?;
    unrotated.add_dim_coord(longitude, lon_dim)?;
    unrotated.coord_system = Some(CoordSystem::Geog {
        semi_major_axis: EARTH_RADIUS_M,
    });
    Ok(unrotated)
}

/// Crops `large` to the latitude/longitude bounds of `small`.
///
/// The bounds are the first and last points of `small`'s `latitude` and
/// `longitude` coordinates, which must be strictly ascending.
///
/// # Errors
///
/// Returns [`GridError::NotAscending`] if a bounding coordinate of `small` is
/// not strictly ascending, or a [`FieldError`] if a coordinate is missing or
/// the intersection is empty.
pub fn crop_to_bounds(large: &Cube, small: &Cube) -> Result<Cube, GridError> {
    let (min_lat, max_lat) = ascending_bounds(small, "latitude")?;
    let (min_lon, max_lon) = ascending_bounds(small, "longitude")?;
    debug!(
        "Cropping '{}' to lat [{}, {}], lon [{}, {}]",
        large.name, min_lat, max_lat, min_lon, max_lon
    );

    let cropped = large
        .intersection("latitude", min_lat, max_lat)?
        .intersection("longitude", min_lon, max_lon)?;
    Ok(cropped)
}

fn ascending_bounds(cube: &Cube, name: &str) -> Result<(f64, f64), GridError> {
    let coord = cube.coord(name)?;
    if !coord.is_ascending() {
        return Err(GridError::NotAscending {
            cube: cube.name.clone(),
            coord: name.to_string(),
        });
    }
    match (coord.first(), coord.last()) {
        (Some(first), Some(last)) => Ok((first, last)),
        _ => Err(GridError::EmptyCoord {
            cube: cube.name.clone(),
            coord: name.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    const UKV_POLE_LON: f64 = 177.5;
    const UKV_POLE_LAT: f64 = 37.5;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn rotated_cube() -> Cube {
        let data =
            ArrayD::from_shape_vec(IxDyn(&[3, 4]), (0..12).map(f64::from).collect()).unwrap();
        let mut cube =
            Cube::new("air_temperature", data).with_coord_system(CoordSystem::RotatedPole {
                grid_north_pole_latitude: UKV_POLE_LAT,
                grid_north_pole_longitude: UKV_POLE_LON,
            });
        cube.add_dim_coord(
            Coord::new("grid_latitude", vec![-1.0, 0.0, 1.0]).with_units("degrees"),
            0,
        )
        .unwrap();
        cube.add_dim_coord(
            Coord::new("grid_longitude", vec![-1.5, -0.5, 0.5, 1.5]).with_units("degrees"),
            1,
        )
        .unwrap();
        cube
    }

    fn geographic_cube(lats: Vec<f64>, lons: Vec<f64>) -> Cube {
        let shape = [lats.len(), lons.len()];
        let n = shape[0] * shape[1];
        let values = (0..n).map(|v| v as f64).collect();
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values).unwrap();
        let mut cube = Cube::new("air_temperature", data);
        cube.add_dim_coord(Coord::new("latitude", lats).with_units("degrees_north"), 0)
            .unwrap();
        cube.add_dim_coord(Coord::new("longitude", lons).with_units("degrees_east"), 1)
            .unwrap();
        cube
    }

    #[test]
    fn test_unrotate_pole_origin() {
        let (lons, lats) = unrotate_pole(&[0.0], &[0.0], UKV_POLE_LON, UKV_POLE_LAT);
        assert!(close(lons[0], -2.5));
        assert!(close(lats[0], 52.5));
    }

    #[test]
    fn test_unrotate_pole_identity_for_north_pole() {
        // pole at the geographic north pole with pole_lon 180 is no rotation
        let (lons, lats) = unrotate_pole(&[10.0, -45.0], &[20.0, -30.0], 180.0, 90.0);
        assert!(close(lons[0], 10.0) && close(lats[0], 20.0));
        assert!(close(lons[1], -45.0) && close(lats[1], -30.0));
    }

    #[test]
    fn test_unrotate_pole_rotated_pole_maps_to_pole() {
        let (lons, lats) = unrotate_pole(&[0.0], &[90.0], UKV_POLE_LON, UKV_POLE_LAT);
        assert!(close(lats[0], UKV_POLE_LAT));
        assert!(close(lons[0], UKV_POLE_LON));
    }

    #[test]
    fn test_unrotate_replaces_coords() {
        let regional = rotated_cube();
        let reference = geographic_cube(vec![40.0, 60.0], vec![-20.0, 20.0]);
        let unrotated = unrotate(&regional, &reference).unwrap();

        assert!(!unrotated.has_coord("grid_latitude"));
        assert!(!unrotated.has_coord("grid_longitude"));
        let lat = unrotated.coord("latitude").unwrap();
        let lon = unrotated.coord("longitude").unwrap();
        assert_eq!(lat.dim, Some(0));
        assert_eq!(lon.dim, Some(1));
        assert_eq!(lat.units.as_deref(), Some("degrees_north"));
        assert_eq!(lon.units.as_deref(), Some("degrees_east"));
        assert!(lat.is_ascending());
        assert!(lon.is_ascending());
        assert!(lat.points.iter().all(|p| (50.0..55.0).contains(p)));
        assert!(lon.points.iter().all(|p| (-6.0..1.0).contains(p)));
        assert_eq!(unrotated.data, regional.data);
        assert_eq!(
            unrotated.coord_system,
            Some(CoordSystem::Geog {
                semi_major_axis: EARTH_RADIUS_M
            })
        );
    }

    #[test]
    fn test_unrotate_requires_pole() {
        let mut regional = rotated_cube();
        regional.coord_system = None;
        let reference = geographic_cube(vec![40.0, 60.0], vec![-20.0, 20.0]);
        assert_eq!(
            unrotate(&regional, &reference).unwrap_err(),
            GridError::MissingPole("air_temperature".to_string())
        );
    }

    #[test]
    fn test_crop_to_bounds() {
        let global = geographic_cube(
            vec![48.0, 50.0, 52.0, 54.0, 56.0],
            vec![350.0, 355.0, 0.0, 5.0, 10.0],
        );
        let regional = geographic_cube(vec![49.0, 53.0], vec![-6.0, 1.0]);
        let cropped = crop_to_bounds(&global, &regional).unwrap();

        assert_eq!(cropped.coord("latitude").unwrap().points, vec![50.0, 52.0]);
        assert_eq!(cropped.coord("longitude").unwrap().points, vec![-5.0, 0.0]);
        // row 50N is index 1, columns 355 and 0 are indices 1 and 2
        assert_eq!(cropped.data[[0, 0]], 6.0);
        assert_eq!(cropped.data[[0, 1]], 7.0);
        assert_eq!(cropped.data[[1, 1]], 12.0);
    }

    #[test]
    fn test_crop_rejects_descending_bounds() {
        let global = geographic_cube(vec![48.0, 50.0, 52.0], vec![0.0, 5.0]);
        let regional = geographic_cube(vec![52.0, 49.0], vec![0.0, 5.0]);
        assert_eq!(
            crop_to_bounds(&global, &regional).unwrap_err(),
            GridError::NotAscending {
                cube: "air_temperature".to_string(),
                coord: "latitude".to_string()
            }
        );
    }

    #[test]
    fn test_crop_disjoint_regions() {
        let global = geographic_cube(vec![0.0, 10.0], vec![0.0, 10.0]);
        let regional = geographic_cube(vec![50.0, 60.0], vec![0.0, 10.0]);
        assert!(matches!(
            crop_to_bounds(&global, &regional),
            Err(GridError::Field(FieldError::EmptyIntersection { .. }))
        ));
    }
}
