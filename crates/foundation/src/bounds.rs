use crate::latlng::{LatLng, MAX_CAMERA_LAT, wrap_lon};

/// Invalid or degenerate geographic input.
///
/// Raised instead of handing bad coordinates to the map surface; callers keep
/// their prior state when they see one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryError {
    NonFinite { what: &'static str, value: f64 },
    LatitudeOutOfRange { value: f64 },
    LongitudeOutOfRange { value: f64 },
    InvertedLatitudes { south: f64, north: f64 },
}

impl std::fmt::Display for GeometryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeometryError::NonFinite { what, value } => {
                write!(f, "non-finite {what}: {value}")
            }
            GeometryError::LatitudeOutOfRange { value } => {
                write!(f, "latitude out of range: {value}")
            }
            GeometryError::LongitudeOutOfRange { value } => {
                write!(f, "longitude out of range: {value}")
            }
            GeometryError::InvertedLatitudes { south, north } => {
                write!(f, "south must be less than north: south={south} north={north}")
            }
        }
    }
}

impl std::error::Error for GeometryError {}

/// Geographic bounding box `(west, south, east, north)` in degrees.
///
/// `west > east` is a valid antimeridian crossing, not an error. `south`
/// must be strictly less than `north`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self, GeometryError> {
        for (what, value) in [
            ("west", west),
            ("south", south),
            ("east", east),
            ("north", north),
        ] {
            if !value.is_finite() {
                return Err(GeometryError::NonFinite { what, value });
            }
        }
        for value in [south, north] {
            if !(-90.0..=90.0).contains(&value) {
                return Err(GeometryError::LatitudeOutOfRange { value });
            }
        }
        for value in [west, east] {
            if !(-180.0..=180.0).contains(&value) {
                return Err(GeometryError::LongitudeOutOfRange { value });
            }
        }
        if south >= north {
            return Err(GeometryError::InvertedLatitudes { south, north });
        }
        Ok(Self {
            west,
            south,
            east,
            north,
        })
    }

    pub fn from_wsen(wsen: [f64; 4]) -> Result<Self, GeometryError> {
        Self::new(wsen[0], wsen[1], wsen[2], wsen[3])
    }

    pub fn to_wsen(&self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// Longitudinal extent in degrees, antimeridian aware.
    pub fn width_deg(&self) -> f64 {
        if self.crosses_antimeridian() {
            360.0 - (self.west - self.east)
        } else {
            self.east - self.west
        }
    }

    pub fn height_deg(&self) -> f64 {
        self.north - self.south
    }

    pub fn area_deg2(&self) -> f64 {
        self.width_deg() * self.height_deg()
    }

    pub fn center(&self) -> LatLng {
        LatLng {
            lat: (self.south + self.north) / 2.0,
            lng: wrap_lon(self.west + self.width_deg() / 2.0),
        }
    }

    /// Smallest box covering both inputs.
    ///
    /// When either side crosses the antimeridian, the other box is tried at
    /// longitude shifts of ±360 and the narrowest covering interval wins.
    pub fn union(&self, other: &GeoBounds) -> GeoBounds {
        let south = self.south.min(other.south);
        let north = self.north.max(other.north);

        if !self.crosses_antimeridian() && !other.crosses_antimeridian() {
            return GeoBounds {
                west: self.west.min(other.west),
                south,
                east: self.east.max(other.east),
                north,
            };
        }

        let a = (self.west, self.west + self.width_deg());
        let mut best = (f64::NEG_INFINITY, f64::INFINITY);
        for shift in [-360.0, 0.0, 360.0] {
            let b_lo = other.west + shift;
            let b_hi = b_lo + other.width_deg();
            let lo = a.0.min(b_lo);
            let hi = a.1.max(b_hi);
            if hi - lo < best.1 - best.0 {
                best = (lo, hi);
            }
        }

        let (lo, hi) = best;
        if hi - lo >= 360.0 {
            return GeoBounds {
                west: -180.0,
                south,
                east: 180.0,
                north,
            };
        }
        GeoBounds {
            west: wrap_lon(lo),
            south,
            east: wrap_lon(hi),
            north,
        }
    }

    /// Grows the box by `fraction` of its extent on each axis, clamped to
    /// valid latitudes. Exceeding a full circle of longitude yields the
    /// whole-world box.
    pub fn padded(&self, fraction: f64) -> GeoBounds {
        let pad_lon = self.width_deg() * fraction;
        let pad_lat = self.height_deg() * fraction;

        let south = (self.south - pad_lat).max(-90.0);
        let north = (self.north + pad_lat).min(90.0);

        if self.width_deg() + 2.0 * pad_lon >= 360.0 {
            return GeoBounds {
                west: -180.0,
                south,
                east: 180.0,
                north,
            };
        }
        GeoBounds {
            west: wrap_lon(self.west - pad_lon),
            south,
            east: wrap_lon(self.east + pad_lon),
            north,
        }
    }

    /// Clamps latitudes into the range the map camera accepts.
    pub fn clamped_for_camera(&self) -> GeoBounds {
        GeoBounds {
            west: self.west,
            south: self.south.clamp(-MAX_CAMERA_LAT, MAX_CAMERA_LAT),
            east: self.east,
            north: self.north.clamp(-MAX_CAMERA_LAT, MAX_CAMERA_LAT),
        }
    }
}
