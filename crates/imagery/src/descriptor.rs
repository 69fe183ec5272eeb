//! The canonical imagery descriptor.
//!
//! Every geospatial backend response is normalized into exactly one
//! [`ImageryDescriptor`] before any rendering logic runs. Descriptors are
//! immutable: updates replace the whole value, never mutate in place, so a
//! consumer can never observe a half-updated descriptor.

use std::collections::BTreeMap;

use foundation::GeoBounds;
use serde::{Deserialize, Serialize};

use crate::signature::RenderSignature;

/// Hard cap on items carried by one descriptor, protecting the tile backend.
///
/// Truncation is a stable prefix of the backend's result order.
pub const MAX_RENDER_ITEMS: usize = 50;

/// A named asset on a catalog item (band, preview, tile index).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRef {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// Lightweight record of one catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: String,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    pub bbox: [f64; 4],
    /// Keyed deterministically so asset preference scans are stable.
    #[serde(default)]
    pub assets: BTreeMap<String, AssetRef>,
}

impl ItemRecord {
    pub fn bounds(&self) -> Option<GeoBounds> {
        GeoBounds::from_wsen(self.bbox).ok()
    }
}

/// One per-item tile source within a multi-item strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemTile {
    pub item_id: String,
    pub bbox: [f64; 4],
    pub url: String,
}

/// How tiles for a descriptor are sourced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TileStrategy {
    /// One tile template covering the whole descriptor.
    Single { url: String },
    /// One tile layer per item; discrete footprints.
    MultiItem { tiles: Vec<ItemTile> },
    /// Backend-composited seamless mosaic addressed by a search id.
    Mosaic { url: String, search_id: String },
}

impl TileStrategy {
    /// Whether tiles come from discrete per-item footprints. Continuous
    /// mosaics cover every zoom level and are exempt from coverage expansion.
    pub fn is_discrete(&self) -> bool {
        !matches!(self, TileStrategy::Mosaic { .. })
    }

    pub fn primary_url(&self) -> Option<&str> {
        match self {
            TileStrategy::Single { url } => Some(url),
            TileStrategy::MultiItem { tiles } => tiles.first().map(|t| t.url.as_str()),
            TileStrategy::Mosaic { url, .. } => Some(url),
        }
    }
}

/// Where a descriptor came from, controlling expansion-state resets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorOrigin {
    /// A fresh user query; expansion tracking restarts from this bbox.
    Query,
    /// Produced by coverage expansion; must not re-seed expansion tracking.
    Expansion,
}

/// Single source of truth for "what is currently shown".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageryDescriptor {
    /// Camera extent: the originally requested query area when present,
    /// otherwise the union of item footprints.
    pub bbox: [f64; 4],
    pub strategy: TileStrategy,
    pub items: Vec<ItemRecord>,
    pub collection: String,
    /// Set by the resolver for thermal/fire queries; the renderer selects
    /// overlay opacity from it.
    #[serde(default)]
    pub thermal: bool,
    pub origin: DescriptorOrigin,
    /// Original result count when the item cap applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated_from: Option<usize>,
}

impl ImageryDescriptor {
    /// Builds a descriptor, applying the stable-prefix item cap.
    pub fn new(
        bbox: GeoBounds,
        strategy: TileStrategy,
        items: Vec<ItemRecord>,
        collection: impl Into<String>,
        origin: DescriptorOrigin,
    ) -> Self {
        let total = items.len();
        let (items, truncated_from) = if total > MAX_RENDER_ITEMS {
            (items[..MAX_RENDER_ITEMS].to_vec(), Some(total))
        } else {
            (items, None)
        };
        let strategy = match strategy {
            TileStrategy::MultiItem { mut tiles } => {
                tiles.truncate(MAX_RENDER_ITEMS);
                TileStrategy::MultiItem { tiles }
            }
            other => other,
        };
        Self {
            bbox: bbox.to_wsen(),
            strategy,
            items,
            collection: collection.into(),
            thermal: false,
            origin,
            truncated_from,
        }
    }

    pub fn with_thermal(mut self, thermal: bool) -> Self {
        self.thermal = thermal;
        self
    }

    pub fn bounds(&self) -> Option<GeoBounds> {
        GeoBounds::from_wsen(self.bbox).ok()
    }

    /// Recomputed on every call; signatures must never outlive the
    /// descriptor they were derived from.
    pub fn signature(&self) -> RenderSignature {
        RenderSignature {
            primary_url: self
                .strategy
                .primary_url()
                .unwrap_or_default()
                .to_string(),
            item_count: self.items.len(),
            first_item_id: self.items.first().map(|i| i.id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use foundation::GeoBounds;
    use pretty_assertions::assert_eq;

    use super::{
        DescriptorOrigin, ImageryDescriptor, ItemRecord, ItemTile, MAX_RENDER_ITEMS, TileStrategy,
    };

    fn item(id: &str) -> ItemRecord {
        ItemRecord {
            id: id.to_string(),
            collection: "sentinel-2-l2a".to_string(),
            datetime: None,
            bbox: [0.0, 0.0, 1.0, 1.0],
            assets: BTreeMap::new(),
        }
    }

    fn bbox() -> GeoBounds {
        GeoBounds::new(0.0, 0.0, 1.0, 1.0).unwrap()
    }

    #[test]
    fn caps_items_to_stable_prefix() {
        let items: Vec<_> = (0..120).map(|i| item(&format!("item-{i:03}"))).collect();
        let d = ImageryDescriptor::new(
            bbox(),
            TileStrategy::Single {
                url: "https://tiles.example/{z}/{x}/{y}".to_string(),
            },
            items,
            "sentinel-2-l2a",
            DescriptorOrigin::Query,
        );
        assert_eq!(d.items.len(), MAX_RENDER_ITEMS);
        assert_eq!(d.items[0].id, "item-000");
        assert_eq!(d.items[49].id, "item-049");
        assert_eq!(d.truncated_from, Some(120));
    }

    #[test]
    fn caps_multi_item_tile_list_too() {
        let tiles: Vec<_> = (0..120)
            .map(|i| ItemTile {
                item_id: format!("item-{i:03}"),
                bbox: [0.0, 0.0, 1.0, 1.0],
                url: format!("https://tiles.example/{i}"),
            })
            .collect();
        let items: Vec<_> = (0..120).map(|i| item(&format!("item-{i:03}"))).collect();
        let d = ImageryDescriptor::new(
            bbox(),
            TileStrategy::MultiItem { tiles },
            items,
            "sentinel-2-l2a",
            DescriptorOrigin::Query,
        );
        match &d.strategy {
            TileStrategy::MultiItem { tiles } => assert_eq!(tiles.len(), MAX_RENDER_ITEMS),
            other => panic!("expected MultiItem, got {other:?}"),
        }
    }

    #[test]
    fn small_result_sets_are_untouched() {
        let d = ImageryDescriptor::new(
            bbox(),
            TileStrategy::Single {
                url: "u".to_string(),
            },
            vec![item("a"), item("b")],
            "sentinel-2-l2a",
            DescriptorOrigin::Query,
        );
        assert_eq!(d.items.len(), 2);
        assert_eq!(d.truncated_from, None);
    }

    #[test]
    fn signature_tracks_strategy_and_items() {
        let d = ImageryDescriptor::new(
            bbox(),
            TileStrategy::Single {
                url: "https://a".to_string(),
            },
            vec![item("a")],
            "sentinel-2-l2a",
            DescriptorOrigin::Query,
        );
        let sig = d.signature();
        assert_eq!(sig.primary_url, "https://a");
        assert_eq!(sig.item_count, 1);
        assert_eq!(sig.first_item_id.as_deref(), Some("a"));
        assert_eq!(sig, d.signature());
    }

    #[test]
    fn mosaic_strategy_is_not_discrete() {
        let mosaic = TileStrategy::Mosaic {
            url: "https://mosaic".to_string(),
            search_id: "s1".to_string(),
        };
        assert!(!mosaic.is_discrete());
        assert!(
            TileStrategy::Single {
                url: "u".to_string()
            }
            .is_discrete()
        );
    }
}
