//! Virtual map surface for terminal sessions.
//!
//! There is no canvas; the surface records the camera and active layers in
//! shared state and logs every mutation, which is enough to drive the
//! interpreter, renderer and expansion engine end to end from stdin.

use std::sync::{Arc, Mutex};

use foundation::{GeoBounds, GeometryError, LatLng};
use interpreter::BoxFuture;
use render::{MapSurface, SurfaceError, TileLayerSpec};
use tracing::info;
use viewport::CameraTarget;

#[derive(Debug, Default)]
pub struct ViewState {
    pub camera: Option<CameraTarget>,
    pub layers: Vec<TileLayerSpec>,
}

pub type SharedView = Arc<Mutex<ViewState>>;

pub struct LoggingSurface {
    view: SharedView,
}

impl LoggingSurface {
    pub fn new(view: SharedView) -> Self {
        Self { view }
    }
}

impl MapSurface for LoggingSurface {
    fn set_camera(&self, target: &CameraTarget) -> Result<(), SurfaceError> {
        match target {
            CameraTarget::FitBounds { bounds, zoom } => {
                info!("camera: fit {:?} (zoom {zoom})", bounds.to_wsen());
            }
            CameraTarget::CenterZoom { center, zoom } => {
                info!("camera: center ({:.4}, {:.4}) zoom {zoom}", center.lat, center.lng);
            }
        }
        self.view
            .lock()
            .map_err(|_| SurfaceError::new("view state poisoned"))?
            .camera = Some(target.clone());
        Ok(())
    }

    fn replace_tile_layers(&self, layers: Vec<TileLayerSpec>) -> Result<(), SurfaceError> {
        info!("layers: {} attached in one batch", layers.len());
        for layer in &layers {
            info!("  {} -> {}", layer.id, layer.url);
        }
        self.view
            .lock()
            .map_err(|_| SurfaceError::new("view state poisoned"))?
            .layers = layers;
        Ok(())
    }

    fn read_pixels(&self) -> BoxFuture<'_, Option<Vec<u8>>> {
        // Nothing is rasterized here.
        Box::pin(async { None })
    }
}

/// The extent the virtual camera currently sees. Fit targets report their
/// own bounds; center targets derive a span from the zoom level (one
/// mercator-style halving per level, 2:1 aspect).
pub fn visible_bounds(camera: &CameraTarget) -> Result<GeoBounds, GeometryError> {
    match camera {
        CameraTarget::FitBounds { bounds, .. } => Ok(*bounds),
        CameraTarget::CenterZoom { center, zoom } => {
            let width = 360.0 / f64::powi(2.0, *zoom as i32);
            let half_w = width / 2.0;
            let half_h = width / 4.0;
            let west = (center.lng - half_w).max(-180.0);
            let east = (center.lng + half_w).min(180.0);
            let south = (center.lat - half_h).max(-89.0);
            let north = (center.lat + half_h).min(89.0);
            GeoBounds::new(west, south, east, north)
        }
    }
}

/// Center a camera target keeps, for requests that need a representative
/// point (analysis pins default here when none is given).
pub fn camera_center(camera: &CameraTarget) -> LatLng {
    match camera {
        CameraTarget::FitBounds { bounds, .. } => bounds.center(),
        CameraTarget::CenterZoom { center, .. } => *center,
    }
}
