//! Coverage expansion for discrete per-item tile sets.
//!
//! When the user zooms well out of the originally searched area, the items
//! on screen no longer cover the view. The engine watches camera-settle
//! events and, past a coverage ratio threshold, asks for one supplementary
//! bounded search over the enlarged area. Continuous mosaics are exempt:
//! they already cover every zoom level.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use foundation::GeoBounds;
use imagery::{DescriptorOrigin, ImageryDescriptor, ItemRecord, ItemTile, TileStrategy};
use interpreter::TileSourceResolver;
use tracing::{debug, warn};

use crate::search::SearchQuery;

/// Camera-to-original coverage ratio at which expansion fires.
pub const EXPANSION_RATIO_THRESHOLD: f64 = 3.0;
/// Padding applied to each axis of the expanded search box.
pub const EXPANSION_PAD_FRACTION: f64 = 0.10;
/// How long the `expanding` flag may stay set with no camera event before
/// it is cleared, so the "adjusting tiles" indicator cannot get stuck.
pub const EXPANDING_STUCK_CLEAR: Duration = Duration::from_secs(3);

/// Snapshot of expansion tracking, for indicators and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionState {
    pub original_bounds: GeoBounds,
    pub last_collection: String,
    pub expanding: bool,
}

/// A decided expansion: the padded union area and the search to issue.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionRequest {
    pub bounds: GeoBounds,
    pub query: SearchQuery,
}

#[derive(Debug)]
struct Tracked {
    original_bounds: GeoBounds,
    collection: String,
    expanding_since: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct CoverageExpansionEngine {
    resolver: TileSourceResolver,
    tracked: Option<Tracked>,
}

impl CoverageExpansionEngine {
    pub fn new(resolver: TileSourceResolver) -> Self {
        Self {
            resolver,
            tracked: None,
        }
    }

    pub fn state(&self) -> Option<ExpansionState> {
        self.tracked.as_ref().map(|t| ExpansionState {
            original_bounds: t.original_bounds,
            last_collection: t.collection.clone(),
            expanding: t.expanding_since.is_some(),
        })
    }

    /// Tracks the descriptor currently on screen. Fresh-query descriptors
    /// re-seed the original bounds; expansion-origin descriptors must not,
    /// or repeated zoom-outs would loop forever on the same ratio.
    pub fn observe_descriptor(&mut self, descriptor: &ImageryDescriptor) {
        if !descriptor.strategy.is_discrete() {
            self.tracked = None;
            return;
        }
        let Some(bounds) = descriptor.bounds() else {
            warn!("descriptor with unusable bbox; expansion tracking disabled");
            self.tracked = None;
            return;
        };
        match descriptor.origin {
            DescriptorOrigin::Query => {
                self.tracked = Some(Tracked {
                    original_bounds: bounds,
                    collection: descriptor.collection.clone(),
                    expanding_since: None,
                });
            }
            DescriptorOrigin::Expansion => {
                if let Some(tracked) = self.tracked.as_mut() {
                    tracked.original_bounds = bounds;
                    tracked.expanding_since = None;
                }
            }
        }
    }

    /// Clears a stuck `expanding` flag after [`EXPANDING_STUCK_CLEAR`] of
    /// camera silence. Driven by a periodic timer, not camera events.
    pub fn tick(&mut self, now: Instant) {
        let Some(tracked) = self.tracked.as_mut() else {
            return;
        };
        if let Some(since) = tracked.expanding_since {
            if now.duration_since(since) >= EXPANDING_STUCK_CLEAR {
                debug!("expansion indicator idle for 3s; clearing");
                tracked.expanding_since = None;
            }
        }
    }

    /// Decides whether a settled camera warrants an expansion search.
    ///
    /// Fires if and only if the coverage ratio reaches
    /// [`EXPANSION_RATIO_THRESHOLD`] and no expansion is already in flight.
    pub fn on_camera_settled(
        &mut self,
        current: GeoBounds,
        now: Instant,
    ) -> Option<ExpansionRequest> {
        let tracked = self.tracked.as_mut()?;
        if tracked.expanding_since.is_some() {
            // Camera activity while a search is in flight restarts the
            // stuck-clear countdown; only camera silence clears it.
            tracked.expanding_since = Some(now);
            return None;
        }
        let original = tracked.original_bounds;
        let ratio = (current.width_deg() / original.width_deg())
            .max(current.height_deg() / original.height_deg());
        if !ratio.is_finite() || ratio < EXPANSION_RATIO_THRESHOLD {
            return None;
        }

        let expanded = current.union(&original).padded(EXPANSION_PAD_FRACTION);
        tracked.expanding_since = Some(now);
        debug!(
            "coverage ratio {ratio:.2} over {}; expanding search area",
            tracked.collection
        );
        Some(ExpansionRequest {
            bounds: expanded,
            query: SearchQuery::bounded(tracked.collection.clone(), expanded.to_wsen()),
        })
    }

    /// Merges a successful expansion search into a replacement descriptor.
    ///
    /// Existing items keep their order and backend-supplied tile URLs; new
    /// items are appended (deduplicated by id) with URLs derived from their
    /// assets. Tracking resets to the expanded bounds so the next large
    /// zoom-out keeps expanding instead of re-firing on the same ratio.
    pub fn apply_result(
        &mut self,
        current: &ImageryDescriptor,
        request: &ExpansionRequest,
        new_items: Vec<ItemRecord>,
    ) -> ImageryDescriptor {
        let mut known_urls: BTreeMap<String, ItemTile> = BTreeMap::new();
        match &current.strategy {
            TileStrategy::MultiItem { tiles } => {
                for tile in tiles {
                    known_urls.insert(tile.item_id.clone(), tile.clone());
                }
            }
            TileStrategy::Single { url } => {
                if let Some(first) = current.items.first() {
                    known_urls.insert(
                        first.id.clone(),
                        ItemTile {
                            item_id: first.id.clone(),
                            bbox: first.bbox,
                            url: url.clone(),
                        },
                    );
                }
            }
            TileStrategy::Mosaic { .. } => {}
        }

        let mut merged: Vec<ItemRecord> = current.items.clone();
        for item in new_items {
            if merged.iter().any(|existing| existing.id == item.id) {
                continue;
            }
            merged.push(item);
        }

        let (params, _) = self.resolver.render_params(&current.collection, None);
        let mut tiles = Vec::with_capacity(merged.len());
        for item in &merged {
            if let Some(tile) = known_urls.get(&item.id) {
                tiles.push(tile.clone());
                continue;
            }
            match self.resolver.single_item_url(item, &params) {
                Ok(url) => tiles.push(ItemTile {
                    item_id: item.id.clone(),
                    bbox: item.bbox,
                    url,
                }),
                Err(err) => warn!("skipping expanded item {}: {err}", item.id),
            }
        }

        let replacement = ImageryDescriptor::new(
            request.bounds,
            TileStrategy::MultiItem { tiles },
            merged,
            current.collection.clone(),
            DescriptorOrigin::Expansion,
        )
        .with_thermal(current.thermal);

        if let Some(tracked) = self.tracked.as_mut() {
            tracked.original_bounds = request.bounds;
            tracked.expanding_since = None;
        }
        replacement
    }

    /// Expansion failed or timed out: clear the in-flight flag and leave
    /// the prior descriptor untouched.
    pub fn abandon(&mut self) {
        if let Some(tracked) = self.tracked.as_mut() {
            tracked.expanding_since = None;
        }
    }
}
