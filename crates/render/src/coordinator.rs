//! One-writer render coordination.
//!
//! Guarantees, in order of importance:
//! 1. a descriptor is applied to the map at most once (render signature);
//! 2. no second apply may start while one is in flight (re-entrancy guard);
//! 3. all tile layers for one descriptor attach in a single batch;
//! 4. the camera moves exactly once per descriptor, from the camera target
//!    the interpreter resolved, never recomputed from descriptor state that
//!    may have been superseded since.
//!
//! The guard and last-applied signature live in an explicit [`RenderState`]
//! owned by the coordinator, not in module-level mutable cells, so both are
//! testable in isolation.

use futures_util::future::join_all;
use imagery::{ImageryDescriptor, RenderSignature, TileStrategy};
use tracing::{debug, info};
use viewport::CameraTarget;

use crate::surface::{
    DEFAULT_OPACITY, MapSurface, SurfaceError, THERMAL_OPACITY, TileLayerSpec, UrlSigner,
    sign_or_original,
};

#[derive(Debug, Default)]
pub struct RenderState {
    pub last_signature: Option<RenderSignature>,
    pub applying: bool,
}

#[derive(Debug, PartialEq)]
pub enum RenderOutcome {
    Applied { layer_count: usize },
    /// Same signature as the last applied descriptor; no work done.
    SkippedIdentical,
    /// An apply sequence is already in flight; this attempt is dropped.
    Busy,
}

#[derive(Debug)]
pub enum RenderError {
    Surface(SurfaceError),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::Surface(err) => write!(f, "map surface rejected render: {err}"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Surface(err) => Some(err),
        }
    }
}

impl From<SurfaceError> for RenderError {
    fn from(err: SurfaceError) -> Self {
        RenderError::Surface(err)
    }
}

#[derive(Debug, Default)]
pub struct RenderCoordinator {
    state: RenderState,
}

impl RenderCoordinator {
    pub fn new() -> Self {
        Self {
            state: RenderState::default(),
        }
    }

    /// Guard state injection for tests.
    pub fn with_state(state: RenderState) -> Self {
        Self { state }
    }

    pub fn is_applying(&self) -> bool {
        self.state.applying
    }

    pub fn last_signature(&self) -> Option<&RenderSignature> {
        self.state.last_signature.as_ref()
    }

    /// Forgets the last-applied signature. Called when a new query
    /// supersedes the current descriptor, so the replacement always
    /// renders even if it happens to produce an identical signature.
    pub fn invalidate(&mut self) {
        self.state.last_signature = None;
    }

    /// Applies a descriptor to the surface: camera once, then all layers
    /// in one batch. Tile URLs are signed in parallel, bounding latency to
    /// the slowest signature rather than their sum.
    pub async fn apply(
        &mut self,
        descriptor: &ImageryDescriptor,
        camera: &CameraTarget,
        surface: &dyn MapSurface,
        signer: &dyn UrlSigner,
    ) -> Result<RenderOutcome, RenderError> {
        let signature = descriptor.signature();
        if self.state.last_signature.as_ref() == Some(&signature) {
            debug!("descriptor already rendered; skipping");
            return Ok(RenderOutcome::SkippedIdentical);
        }
        if self.state.applying {
            debug!("render already in flight; dropping attempt");
            return Ok(RenderOutcome::Busy);
        }

        self.state.applying = true;
        let result = self.apply_inner(descriptor, camera, surface, signer).await;
        self.state.applying = false;

        let layer_count = result?;
        self.state.last_signature = Some(signature);
        info!(
            "applied descriptor for {} ({} layers)",
            descriptor.collection, layer_count
        );
        Ok(RenderOutcome::Applied { layer_count })
    }

    /// Camera-only framing for navigation and non-visualizable results.
    /// Does not touch layers or the signature.
    pub fn frame(
        &self,
        camera: &CameraTarget,
        surface: &dyn MapSurface,
    ) -> Result<(), RenderError> {
        surface.set_camera(camera)?;
        Ok(())
    }

    async fn apply_inner(
        &self,
        descriptor: &ImageryDescriptor,
        camera: &CameraTarget,
        surface: &dyn MapSurface,
        signer: &dyn UrlSigner,
    ) -> Result<usize, RenderError> {
        surface.set_camera(camera)?;

        let specs = layer_specs(descriptor);
        let signed = join_all(
            specs
                .iter()
                .map(|spec| sign_or_original(signer, &spec.url)),
        )
        .await;
        let layers: Vec<TileLayerSpec> = specs
            .into_iter()
            .zip(signed)
            .map(|(spec, url)| TileLayerSpec { url, ..spec })
            .collect();

        let count = layers.len();
        surface.replace_tile_layers(layers)?;
        Ok(count)
    }
}

/// Tile layer specs for one descriptor. Order matches item order.
fn layer_specs(descriptor: &ImageryDescriptor) -> Vec<TileLayerSpec> {
    let opacity = if descriptor.thermal {
        THERMAL_OPACITY
    } else {
        DEFAULT_OPACITY
    };
    match &descriptor.strategy {
        TileStrategy::Single { url } => vec![TileLayerSpec {
            id: "imagery".to_string(),
            url: url.clone(),
            bbox: Some(descriptor.bbox),
            opacity,
        }],
        TileStrategy::Mosaic { url, search_id } => vec![TileLayerSpec {
            id: format!("mosaic-{search_id}"),
            url: url.clone(),
            bbox: None,
            opacity,
        }],
        TileStrategy::MultiItem { tiles } => tiles
            .iter()
            .map(|tile| TileLayerSpec {
                id: tile.item_id.clone(),
                url: tile.url.clone(),
                bbox: Some(tile.bbox),
                opacity,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use foundation::GeoBounds;
    use imagery::{DescriptorOrigin, ImageryDescriptor, ItemTile, TileStrategy};
    use interpreter::BoxFuture;
    use pretty_assertions::assert_eq;
    use viewport::CameraTarget;

    use super::{RenderCoordinator, RenderOutcome, RenderState};
    use crate::surface::{MapSurface, NoopSigner, SurfaceError, TileLayerSpec};

    #[derive(Debug, PartialEq)]
    enum SurfaceCall {
        Camera(u8),
        Layers(Vec<String>),
    }

    #[derive(Default)]
    struct RecordingSurface {
        calls: Mutex<Vec<SurfaceCall>>,
    }

    impl MapSurface for RecordingSurface {
        fn set_camera(&self, target: &CameraTarget) -> Result<(), SurfaceError> {
            self.calls
                .lock()
                .unwrap()
                .push(SurfaceCall::Camera(target.zoom()));
            Ok(())
        }

        fn replace_tile_layers(&self, layers: Vec<TileLayerSpec>) -> Result<(), SurfaceError> {
            self.calls
                .lock()
                .unwrap()
                .push(SurfaceCall::Layers(layers.into_iter().map(|l| l.id).collect()));
            Ok(())
        }

        fn read_pixels(&self) -> BoxFuture<'_, Option<Vec<u8>>> {
            Box::pin(async { None })
        }
    }

    fn descriptor(tiles: usize) -> ImageryDescriptor {
        let tiles: Vec<ItemTile> = (0..tiles)
            .map(|i| ItemTile {
                item_id: format!("item-{i}"),
                bbox: [0.0, 0.0, 1.0, 1.0],
                url: format!("https://tiles/{i}"),
            })
            .collect();
        ImageryDescriptor::new(
            GeoBounds::new(0.0, 0.0, 1.0, 1.0).unwrap(),
            TileStrategy::MultiItem { tiles },
            vec![],
            "sentinel-2-l2a",
            DescriptorOrigin::Query,
        )
    }

    fn camera() -> CameraTarget {
        CameraTarget::CenterZoom {
            center: foundation::LatLng::new(0.5, 0.5).unwrap(),
            zoom: 9,
        }
    }

    #[tokio::test]
    async fn applies_once_then_skips_identical_descriptor() {
        let mut coord = RenderCoordinator::new();
        let surface = RecordingSurface::default();
        let d = descriptor(3);

        let first = coord
            .apply(&d, &camera(), &surface, &NoopSigner)
            .await
            .unwrap();
        assert_eq!(first, RenderOutcome::Applied { layer_count: 3 });

        let second = coord
            .apply(&d, &camera(), &surface, &NoopSigner)
            .await
            .unwrap();
        assert_eq!(second, RenderOutcome::SkippedIdentical);

        // One camera move, one batch attach: nothing ran twice.
        let calls = surface.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                SurfaceCall::Camera(9),
                SurfaceCall::Layers(vec![
                    "item-0".to_string(),
                    "item-1".to_string(),
                    "item-2".to_string(),
                ]),
            ]
        );
    }

    #[tokio::test]
    async fn in_flight_guard_drops_second_attempt() {
        let mut coord = RenderCoordinator::with_state(RenderState {
            last_signature: None,
            applying: true,
        });
        let surface = RecordingSurface::default();
        let out = coord
            .apply(&descriptor(1), &camera(), &surface, &NoopSigner)
            .await
            .unwrap();
        assert_eq!(out, RenderOutcome::Busy);
        assert!(surface.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalidate_allows_identical_signature_to_re_render() {
        let mut coord = RenderCoordinator::new();
        let surface = RecordingSurface::default();
        let d = descriptor(1);

        coord
            .apply(&d, &camera(), &surface, &NoopSigner)
            .await
            .unwrap();
        coord.invalidate();
        let again = coord
            .apply(&d, &camera(), &surface, &NoopSigner)
            .await
            .unwrap();
        assert_eq!(again, RenderOutcome::Applied { layer_count: 1 });
    }

    #[tokio::test]
    async fn surface_failure_keeps_prior_signature_clear() {
        struct FailingSurface;
        impl MapSurface for FailingSurface {
            fn set_camera(&self, _t: &CameraTarget) -> Result<(), SurfaceError> {
                Ok(())
            }
            fn replace_tile_layers(
                &self,
                _layers: Vec<TileLayerSpec>,
            ) -> Result<(), SurfaceError> {
                Err(SurfaceError::new("gpu context lost"))
            }
            fn read_pixels(&self) -> BoxFuture<'_, Option<Vec<u8>>> {
                Box::pin(async { None })
            }
        }

        let mut coord = RenderCoordinator::new();
        let d = descriptor(1);
        let err = coord
            .apply(&d, &camera(), &FailingSurface, &NoopSigner)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("gpu context lost"));
        // The failed apply must not poison the guard or record a signature.
        assert!(!coord.is_applying());

        let surface = RecordingSurface::default();
        let retry = coord
            .apply(&d, &camera(), &surface, &NoopSigner)
            .await
            .unwrap();
        assert_eq!(retry, RenderOutcome::Applied { layer_count: 1 });
    }

    #[tokio::test]
    async fn thermal_descriptors_render_translucent() {
        let d = descriptor(1).with_thermal(true);
        let specs = super::layer_specs(&d);
        assert_eq!(specs[0].opacity, crate::surface::THERMAL_OPACITY);
        let plain = descriptor(1);
        assert_eq!(super::layer_specs(&plain)[0].opacity, crate::surface::DEFAULT_OPACITY);
    }
}
