//! Backend response interpretation.
//!
//! Normalizes every backend reply into one tagged [`Interpretation`] before
//! any rendering logic runs. The messy part (heterogeneous response shapes)
//! is isolated here; everything downstream sees a single descriptor type.
//!
//! Priority order, highest first:
//! 1. plain narrative text → no visual change
//! 2. navigation with no results → camera move only, no tiles
//! 3. pre-built mosaic reference → seamless mosaic descriptor
//! 4. multiple explicit tile URLs → multi-item descriptor
//! 5. continuous-coverage collection → mosaic from the item's tile index
//! 6. single item's best visual asset → single descriptor

use std::future::Future;
use std::pin::Pin;

use foundation::{GeoBounds, GeometryError, LatLng};
use imagery::{
    CollectionClass, DescriptorOrigin, ImageryDescriptor, ItemRecord, ItemTile, TileStrategy,
    classify,
};
use serde::Deserialize;
use tracing::{debug, warn};
use viewport::{CameraTarget, MAX_ZOOM, ViewportController};

use crate::payload::{ChatResponse, NavigateTarget};
use crate::resolver::{TileSourceError, TileSourceResolver};

/// Boxed future alias so collaborator traits stay dyn-compatible.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Zoom applied to a center-only navigation that names no zoom of its own.
const DEFAULT_NAVIGATE_ZOOM: u8 = 10;

/// A fetched tile-index document (tilejson-shaped).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TileIndexDoc {
    #[serde(default)]
    pub tiles: Vec<String>,
    #[serde(default)]
    pub minzoom: Option<u8>,
    #[serde(default)]
    pub maxzoom: Option<u8>,
    #[serde(default)]
    pub bounds: Option<[f64; 4]>,
}

#[derive(Debug)]
pub struct TileIndexError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TileIndexError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

impl std::fmt::Display for TileIndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TileIndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Fetches tile-index documents. Implementations must be `Send + Sync`;
/// methods return boxed futures for dyn-compatibility.
pub trait TileIndexFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<TileIndexDoc, TileIndexError>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterpretError {
    /// The backend's stated query extent is invalid; prior state is kept.
    Geometry(GeometryError),
    /// Results carry no usable bounding box at all.
    MissingBounds,
}

impl std::fmt::Display for InterpretError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterpretError::Geometry(err) => write!(f, "invalid geometry: {err}"),
            InterpretError::MissingBounds => write!(f, "response has no usable bounding box"),
        }
    }
}

impl std::error::Error for InterpretError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InterpretError::Geometry(err) => Some(err),
            InterpretError::MissingBounds => None,
        }
    }
}

impl From<GeometryError> for InterpretError {
    fn from(err: GeometryError) -> Self {
        InterpretError::Geometry(err)
    }
}

/// The normalized outcome of one backend response.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// New imagery to apply. The camera target is resolved here, once, from
    /// the interpreter's bbox; the renderer must not recompute it later.
    NewImagery {
        descriptor: ImageryDescriptor,
        camera: CameraTarget,
    },
    /// Camera move only; no tiles are fetched.
    NavigateTo(CameraTarget),
    /// The data exists but nothing can be rendered for it. The area is
    /// still framed so the user sees where the results are.
    NonVisualizable {
        camera: CameraTarget,
        collection: String,
        reason: TileSourceError,
    },
    /// Plain conversational reply; previously rendered imagery stays up.
    NoChange,
}

pub struct ResponseInterpreter {
    viewport: ViewportController,
    resolver: TileSourceResolver,
}

impl ResponseInterpreter {
    pub fn new(resolver: TileSourceResolver) -> Self {
        Self {
            viewport: ViewportController::new(),
            resolver,
        }
    }

    pub fn resolver(&self) -> &TileSourceResolver {
        &self.resolver
    }

    /// Interprets one backend response. Only rule 5 (tile-index lookup for
    /// continuous collections) suspends; everything else is synchronous
    /// state derivation.
    pub async fn interpret(
        &self,
        resp: &ChatResponse,
        fetcher: &dyn TileIndexFetcher,
    ) -> Result<Interpretation, InterpretError> {
        // Rule 1: a follow-up conversational reply must not clear imagery.
        if !resp.has_geospatial_payload() {
            return Ok(Interpretation::NoChange);
        }

        let has_results = !resp.items.is_empty()
            || !resp.all_tile_urls.is_empty()
            || resp.mosaic_reference.is_some();

        // Rule 2: navigation with no search results stops here.
        if !has_results {
            if let Some(nav) = &resp.navigate_to {
                return Ok(Interpretation::NavigateTo(self.navigate_camera(nav)?));
            }
            if let Some(wsen) = resp.query_bbox {
                let bounds = GeoBounds::from_wsen(wsen)?;
                let camera = self.viewport.camera_for(&bounds, CollectionClass::Other)?;
                return Ok(Interpretation::NavigateTo(camera));
            }
            return Ok(Interpretation::NoChange);
        }

        let collection = resp
            .items
            .iter()
            .find_map(|i| i.collection.clone())
            .unwrap_or_default();
        let class = classify(&collection);
        let bounds = self.camera_bounds(resp)?;
        let camera = self.viewport.camera_for(&bounds, class)?;
        let records: Vec<ItemRecord> = resp
            .items
            .iter()
            .map(|i| i.to_record(&collection))
            .collect();
        let (params, thermal) = self
            .resolver
            .render_params(&collection, resp.query.as_deref());

        // Rule 3: pre-built seamless mosaic, no per-item URL assembly.
        if let Some(mosaic) = &resp.mosaic_reference {
            let descriptor = ImageryDescriptor::new(
                bounds,
                TileStrategy::Mosaic {
                    url: mosaic.tile_url.clone(),
                    search_id: mosaic.search_id.clone(),
                },
                records,
                collection,
                DescriptorOrigin::Query,
            )
            .with_thermal(thermal);
            return Ok(self.new_imagery(descriptor, camera));
        }

        // Rule 4: the backend already assembled per-item tile URLs.
        if resp.all_tile_urls.len() > 1 {
            let tiles: Vec<ItemTile> = resp
                .all_tile_urls
                .iter()
                .map(|t| ItemTile {
                    item_id: t.item_id.clone(),
                    bbox: t.bbox,
                    url: t.tile_url.clone(),
                })
                .collect();
            let descriptor = ImageryDescriptor::new(
                bounds,
                TileStrategy::MultiItem { tiles },
                records,
                collection,
                DescriptorOrigin::Query,
            )
            .with_thermal(thermal);
            return Ok(self.new_imagery(descriptor, camera));
        }
        if let Some(only) = resp.all_tile_urls.first() {
            let descriptor = ImageryDescriptor::new(
                bounds,
                TileStrategy::Single {
                    url: only.tile_url.clone(),
                },
                records,
                collection,
                DescriptorOrigin::Query,
            )
            .with_thermal(thermal);
            return Ok(self.new_imagery(descriptor, camera));
        }

        let Some(first) = records.first() else {
            return Err(InterpretError::MissingBounds);
        };

        // Rule 5: continuous coverage renders as a mosaic built from the
        // item's tile index (or the collection's deterministic template).
        if class.is_continuous() {
            for candidate in self.resolver.tile_index_candidates(first) {
                match fetcher.fetch(&candidate).await {
                    Ok(doc) if !doc.tiles.is_empty() => {
                        let descriptor = ImageryDescriptor::new(
                            bounds,
                            TileStrategy::Mosaic {
                                url: doc.tiles[0].clone(),
                                search_id: collection.clone(),
                            },
                            records,
                            collection,
                            DescriptorOrigin::Query,
                        )
                        .with_thermal(thermal);
                        return Ok(self.new_imagery(descriptor, camera));
                    }
                    Ok(_) => {
                        debug!("tile index at {candidate} has no tile template");
                    }
                    Err(err) => {
                        warn!("tile index fetch failed for {candidate}: {err}");
                    }
                }
            }
        }

        // Rule 6: fall back to the first item's best visual asset.
        match self.resolver.single_item_url(first, &params) {
            Ok(url) => {
                let descriptor = ImageryDescriptor::new(
                    bounds,
                    TileStrategy::Single { url },
                    records,
                    collection,
                    DescriptorOrigin::Query,
                )
                .with_thermal(thermal);
                Ok(self.new_imagery(descriptor, camera))
            }
            Err(reason) => {
                warn!("non-visualizable result for {collection}: {reason}");
                Ok(Interpretation::NonVisualizable {
                    camera,
                    collection,
                    reason,
                })
            }
        }
    }

    fn new_imagery(&self, descriptor: ImageryDescriptor, camera: CameraTarget) -> Interpretation {
        if let Some(total) = descriptor.truncated_from {
            warn!(
                "result set truncated: showing first {} of {total} items",
                descriptor.items.len()
            );
        }
        Interpretation::NewImagery { descriptor, camera }
    }

    /// Camera placement always prefers the originally requested extent.
    /// Item footprints are only a fallback: a single scene's native
    /// footprint (~185 km square for Landsat) is usually nothing like the
    /// area the user asked about.
    fn camera_bounds(&self, resp: &ChatResponse) -> Result<GeoBounds, InterpretError> {
        if let Some(wsen) = resp.query_bbox {
            return GeoBounds::from_wsen(wsen).map_err(Into::into);
        }
        let mut acc: Option<GeoBounds> = None;
        let footprints = resp
            .items
            .iter()
            .map(|i| i.bbox)
            .chain(resp.all_tile_urls.iter().map(|t| t.bbox));
        for wsen in footprints {
            match GeoBounds::from_wsen(wsen) {
                Ok(b) => {
                    acc = Some(match acc {
                        Some(existing) => existing.union(&b),
                        None => b,
                    });
                }
                Err(err) => warn!("skipping item with invalid bbox: {err}"),
            }
        }
        acc.ok_or(InterpretError::MissingBounds)
    }

    fn navigate_camera(&self, nav: &NavigateTarget) -> Result<CameraTarget, InterpretError> {
        if let Some(wsen) = nav.bbox {
            let bounds = GeoBounds::from_wsen(wsen)?;
            return Ok(self.viewport.camera_for(&bounds, CollectionClass::Other)?);
        }
        if let Some([lng, lat]) = nav.center {
            let center = LatLng::new(lat, lng)?.clamped_for_camera();
            let zoom = nav.zoom.unwrap_or(DEFAULT_NAVIGATE_ZOOM).min(MAX_ZOOM);
            return Ok(CameraTarget::CenterZoom { center, zoom });
        }
        Err(InterpretError::MissingBounds)
    }
}
