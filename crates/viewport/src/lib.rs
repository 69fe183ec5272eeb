//! Camera placement for imagery descriptors.
//!
//! Maps a descriptor's bounding box and collection class to a camera target:
//! either "fit these bounds" with a zoom hint, or "center here at exactly
//! this zoom" when a collection's minimum-zoom floor applies (fitting the
//! full bbox would under-zoom below the floor and show nothing).

use foundation::{GeoBounds, GeometryError, LatLng};
use imagery::CollectionClass;

pub const MIN_ZOOM: u8 = 0;
pub const MAX_ZOOM: u8 = 22;

/// Resolved camera instruction for the map surface.
///
/// Coordinates inside a target are always clamped to ±85° latitude and
/// ±180° longitude before the surface sees them.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraTarget {
    /// Frame the whole box. `zoom` is a hint for surfaces without native
    /// bounds fitting.
    FitBounds { bounds: GeoBounds, zoom: u8 },
    /// Center at exactly this zoom; used when a zoom floor applies.
    CenterZoom { center: LatLng, zoom: u8 },
}

impl CameraTarget {
    pub fn zoom(&self) -> u8 {
        match self {
            CameraTarget::FitBounds { zoom, .. } => *zoom,
            CameraTarget::CenterZoom { zoom, .. } => *zoom,
        }
    }
}

/// Monotonic area → zoom step table: first row whose bound covers the area
/// wins. Areas in square degrees.
type ZoomSteps = &'static [(f64, u8)];

const STANDARD_STEPS: ZoomSteps = &[
    (0.02, 13),
    (0.1, 12),
    (0.5, 11),
    (1.0, 10),
    (5.0, 9),
    (25.0, 8),
    (100.0, 7),
    (400.0, 6),
    (1600.0, 5),
    (6400.0, 4),
    (f64::INFINITY, 3),
];

/// Coarse (≥500 m/pixel) collections step lower: there is no detail to see
/// at high zooms, and framing wide keeps the composite legible.
const COARSE_STEPS: ZoomSteps = &[
    (0.1, 10),
    (1.0, 9),
    (25.0, 8),
    (100.0, 7),
    (1600.0, 5),
    (6400.0, 4),
    (f64::INFINITY, 3),
];

#[derive(Debug, Default)]
pub struct ViewportController;

impl ViewportController {
    pub fn new() -> Self {
        Self
    }

    /// Area-based zoom before any floor is applied. Always within
    /// [`MIN_ZOOM`, `MAX_ZOOM`].
    pub fn zoom_for(&self, bounds: &GeoBounds, class: CollectionClass) -> u8 {
        let steps = if class.is_coarse_resolution() {
            COARSE_STEPS
        } else {
            STANDARD_STEPS
        };
        let area = bounds.area_deg2();
        for (bound, zoom) in steps {
            if area <= *bound {
                return (*zoom).clamp(MIN_ZOOM, MAX_ZOOM);
            }
        }
        MIN_ZOOM
    }

    /// Computes the camera target for a descriptor's bbox.
    ///
    /// When the collection has a minimum-zoom floor and the area-based zoom
    /// falls below it, the camera centers on the bbox centroid at exactly
    /// the floor instead of fitting the bounds.
    pub fn camera_for(
        &self,
        bounds: &GeoBounds,
        class: CollectionClass,
    ) -> Result<CameraTarget, GeometryError> {
        let zoom = self.zoom_for(bounds, class);
        if let Some(floor) = class.min_zoom() {
            if zoom < floor {
                let center = bounds.center().clamped_for_camera();
                return Ok(CameraTarget::CenterZoom {
                    center,
                    zoom: floor.clamp(MIN_ZOOM, MAX_ZOOM),
                });
            }
        }
        Ok(CameraTarget::FitBounds {
            bounds: bounds.clamped_for_camera(),
            zoom,
        })
    }

    /// Camera target from raw backend coordinates; rejects bad geometry
    /// before it can reach the map surface.
    pub fn camera_for_wsen(
        &self,
        wsen: [f64; 4],
        class: CollectionClass,
    ) -> Result<CameraTarget, GeometryError> {
        let bounds = GeoBounds::from_wsen(wsen)?;
        self.camera_for(&bounds, class)
    }
}
