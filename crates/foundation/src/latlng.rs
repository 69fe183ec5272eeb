use crate::bounds::GeometryError;

/// Highest latitude the Web Mercator map surface can display.
pub const MAX_CAMERA_LAT: f64 = 85.0;

/// A geographic position in degrees.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Validates finiteness and coordinate ranges (±90 lat, ±180 lng).
    pub fn new(lat: f64, lng: f64) -> Result<Self, GeometryError> {
        if !lat.is_finite() {
            return Err(GeometryError::NonFinite {
                what: "latitude",
                value: lat,
            });
        }
        if !lng.is_finite() {
            return Err(GeometryError::NonFinite {
                what: "longitude",
                value: lng,
            });
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(GeometryError::LatitudeOutOfRange { value: lat });
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(GeometryError::LongitudeOutOfRange { value: lng });
        }
        Ok(Self { lat, lng })
    }

    /// Clamps latitude into the range the map camera accepts.
    pub fn clamped_for_camera(self) -> Self {
        Self {
            lat: self.lat.clamp(-MAX_CAMERA_LAT, MAX_CAMERA_LAT),
            lng: self.lng,
        }
    }
}

/// Wraps a longitude into [-180, 180].
pub fn wrap_lon(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        return lon;
    }
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::{LatLng, wrap_lon};
    use crate::bounds::GeometryError;

    #[test]
    fn rejects_non_finite_latitude() {
        let err = LatLng::new(f64::NAN, 0.0).unwrap_err();
        assert!(matches!(err, GeometryError::NonFinite { what: "latitude", .. }));
    }

    #[test]
    fn rejects_out_of_range_longitude() {
        let err = LatLng::new(0.0, 200.0).unwrap_err();
        assert_eq!(err, GeometryError::LongitudeOutOfRange { value: 200.0 });
    }

    #[test]
    fn clamps_polar_latitude_for_camera() {
        let p = LatLng::new(89.9, 10.0).unwrap().clamped_for_camera();
        assert_eq!(p.lat, 85.0);
        assert_eq!(p.lng, 10.0);
    }

    #[test]
    fn wraps_longitudes_past_the_antimeridian() {
        assert_eq!(wrap_lon(190.0), -170.0);
        assert_eq!(wrap_lon(-190.0), 170.0);
        assert_eq!(wrap_lon(180.0), 180.0);
        assert_eq!(wrap_lon(0.0), 0.0);
    }
}
