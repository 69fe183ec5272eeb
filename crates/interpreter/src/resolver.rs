//! Per-collection tile source resolution.
//!
//! The backend is the single source of truth for tile URLs: the resolver
//! never invents one. What it does own is the declarative mapping from
//! collection class to rendering parameters, thermal-query overrides, the
//! preference order for a single item's visual asset, and idempotent
//! corrections to malformed asset lists.

use imagery::{CollectionClass, ItemRecord, RenderParams, classify};

use crate::payload::LINKED_PREVIEW_ASSET;

/// Keywords in the user's query that switch rendering to thermal/fire
/// bands.
const THERMAL_KEYWORDS: &[&str] = &["thermal", "fire", "wildfire", "burn", "hotspot", "heat signature"];

/// Asset key carrying a per-item tile-index document.
const TILE_INDEX_ASSET: &str = "tilejson";
/// Asset key for a backend-rendered preview image.
const RENDERED_PREVIEW_ASSET: &str = "rendered_preview";

#[derive(Debug, Clone, PartialEq)]
pub enum TileSourceError {
    /// The backend supplied no usable tile reference; the data exists but
    /// cannot be visualized. The imagery area is still framed on the map.
    NonVisualizable {
        collection: String,
        item_id: Option<String>,
    },
}

impl std::fmt::Display for TileSourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TileSourceError::NonVisualizable {
                collection,
                item_id,
            } => match item_id {
                Some(id) => write!(f, "no usable tile reference for item {id} in {collection}"),
                None => write!(f, "no usable tile reference for collection {collection}"),
            },
        }
    }
}

impl std::error::Error for TileSourceError {}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Base URL of the tile/preview API used when converting a visual band
    /// asset into a preview request or deriving a fallback tile index.
    pub tile_api_base: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tile_api_base: "https://tiles.skylens.dev/api/data/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TileSourceResolver {
    cfg: ResolverConfig,
}

impl TileSourceResolver {
    pub fn new(cfg: ResolverConfig) -> Self {
        Self { cfg }
    }

    pub fn is_thermal_query(&self, query: Option<&str>) -> bool {
        let Some(query) = query else {
            return false;
        };
        let query = query.to_ascii_lowercase();
        THERMAL_KEYWORDS.iter().any(|k| query.contains(k))
    }

    /// Rendering parameters for a collection, with the thermal override
    /// applied when the originating query asks for heat/fire. Returns the
    /// parameters and whether thermal mode is active.
    pub fn render_params(&self, collection: &str, query: Option<&str>) -> (RenderParams, bool) {
        let class = classify(collection);
        let mut params = class.default_render_params();
        params.assets = self.correct_assets(collection, params.assets);

        if !self.is_thermal_query(query) {
            return (params, false);
        }
        match self.thermal_override(collection, class) {
            Some(thermal) => (thermal, true),
            None => (params, false),
        }
    }

    /// Thermal band selection per collection. Collections with no thermal
    /// band keep their default rendering.
    fn thermal_override(&self, collection: &str, class: CollectionClass) -> Option<RenderParams> {
        let id = collection.to_ascii_lowercase();
        if id.contains("landsat") {
            return Some(RenderParams {
                assets: vec!["lwir11".to_string()],
                rescale: Some((273.0, 373.0)),
                colormap: Some("magma".to_string()),
            });
        }
        if class == CollectionClass::FireComposite || class == CollectionClass::CoarseComposite {
            return Some(RenderParams {
                assets: vec!["data".to_string()],
                rescale: Some((0.0, 100.0)),
                colormap: Some("inferno".to_string()),
            });
        }
        None
    }

    /// Repairs malformed asset lists for optical collections: a three-band
    /// RGB request is rewritten to the single composited visual asset.
    /// Applying the fix twice is a no-op.
    pub fn correct_assets(&self, collection: &str, assets: Vec<String>) -> Vec<String> {
        let class = classify(collection);
        if !matches!(
            class,
            CollectionClass::Optical | CollectionClass::OpticalMosaic
        ) {
            return assets;
        }
        let mut lower: Vec<String> = assets.iter().map(|a| a.to_ascii_lowercase()).collect();
        lower.sort();
        let is_rgb_triplet = lower == ["blue", "green", "red"] || lower == ["b02", "b03", "b04"];
        if is_rgb_triplet {
            return vec!["visual".to_string()];
        }
        assets
    }

    /// Candidate tile-index URLs for a continuous-coverage item, in fetch
    /// order: the item's own tile-index asset, then the deterministic
    /// collection-level template.
    pub fn tile_index_candidates(&self, item: &ItemRecord) -> Vec<String> {
        let mut candidates = Vec::new();
        if let Some(asset) = item.assets.get(TILE_INDEX_ASSET) {
            candidates.push(asset.href.clone());
        }
        let class = classify(&item.collection);
        if let Some(url) = class.fallback_tile_index_url(&self.cfg.tile_api_base, &item.collection)
        {
            candidates.push(url);
        }
        candidates
    }

    /// Best available visual source for a single item, in preference order:
    /// dedicated tile-index asset, rendered preview, band asset converted
    /// to a preview request, then a linked preview URL.
    pub fn single_item_url(
        &self,
        item: &ItemRecord,
        params: &RenderParams,
    ) -> Result<String, TileSourceError> {
        if let Some(asset) = item.assets.get(TILE_INDEX_ASSET) {
            return Ok(asset.href.clone());
        }
        if let Some(asset) = item.assets.get(RENDERED_PREVIEW_ASSET) {
            return Ok(asset.href.clone());
        }
        for band in params.assets.iter().map(String::as_str).chain(["visual"]) {
            if item.assets.contains_key(band) {
                return Ok(self.preview_request_url(item, band, params));
            }
        }
        if let Some(asset) = item.assets.get(LINKED_PREVIEW_ASSET) {
            return Ok(asset.href.clone());
        }
        Err(TileSourceError::NonVisualizable {
            collection: item.collection.clone(),
            item_id: Some(item.id.clone()),
        })
    }

    fn preview_request_url(&self, item: &ItemRecord, asset: &str, params: &RenderParams) -> String {
        let mut url = format!(
            "{}/item/preview.png?collection={}&item={}&assets={}",
            self.cfg.tile_api_base.trim_end_matches('/'),
            item.collection,
            item.id,
            asset
        );
        if let Some((lo, hi)) = params.rescale {
            url.push_str(&format!("&rescale={lo},{hi}"));
        }
        if let Some(colormap) = &params.colormap {
            url.push_str(&format!("&colormap_name={colormap}"));
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use imagery::{AssetRef, ItemRecord};
    use pretty_assertions::assert_eq;

    use super::{TileSourceError, TileSourceResolver};

    fn resolver() -> TileSourceResolver {
        TileSourceResolver::default()
    }

    fn item_with_assets(collection: &str, keys: &[(&str, &str)]) -> ItemRecord {
        let assets: BTreeMap<String, AssetRef> = keys
            .iter()
            .map(|(k, href)| {
                (
                    k.to_string(),
                    AssetRef {
                        href: href.to_string(),
                        media_type: None,
                    },
                )
            })
            .collect();
        ItemRecord {
            id: "item-1".to_string(),
            collection: collection.to_string(),
            datetime: None,
            bbox: [0.0, 0.0, 1.0, 1.0],
            assets,
        }
    }

    #[test]
    fn thermal_keywords_are_detected_case_insensitively() {
        let r = resolver();
        assert!(r.is_thermal_query(Some("Show me WILDFIRE spread near Chico")));
        assert!(r.is_thermal_query(Some("thermal anomalies in the valley")));
        assert!(!r.is_thermal_query(Some("show me crops near Chico")));
        assert!(!r.is_thermal_query(None));
    }

    #[test]
    fn thermal_query_swaps_landsat_to_lwir_band() {
        let r = resolver();
        let (params, thermal) = r.render_params("landsat-c2-l2", Some("fire damage"));
        assert!(thermal);
        assert_eq!(params.assets, vec!["lwir11".to_string()]);
        assert_eq!(params.rescale, Some((273.0, 373.0)));
        assert_eq!(params.colormap.as_deref(), Some("magma"));
    }

    #[test]
    fn thermal_query_without_thermal_band_keeps_defaults() {
        let r = resolver();
        let (params, thermal) = r.render_params("sentinel-2-l2a", Some("wildfire burn scar"));
        assert!(!thermal);
        assert_eq!(params.assets, vec!["visual".to_string()]);
    }

    #[test]
    fn rgb_triplet_is_rewritten_to_visual_idempotently() {
        let r = resolver();
        let once = r.correct_assets(
            "sentinel-2-l2a",
            vec!["red".to_string(), "green".to_string(), "blue".to_string()],
        );
        assert_eq!(once, vec!["visual".to_string()]);
        let twice = r.correct_assets("sentinel-2-l2a", once.clone());
        assert_eq!(twice, once);
    }

    #[test]
    fn non_optical_asset_lists_are_left_alone() {
        let r = resolver();
        let assets = vec!["red".to_string(), "green".to_string(), "blue".to_string()];
        assert_eq!(r.correct_assets("cop-dem-glo-30", assets.clone()), assets);
    }

    #[test]
    fn single_item_preference_order() {
        let r = resolver();
        let (params, _) = r.render_params("sentinel-2-l2a", None);

        let tilejson = item_with_assets(
            "sentinel-2-l2a",
            &[("tilejson", "https://t/index.json"), ("visual", "https://t/v.tif")],
        );
        assert_eq!(
            r.single_item_url(&tilejson, &params).unwrap(),
            "https://t/index.json"
        );

        let preview = item_with_assets(
            "sentinel-2-l2a",
            &[("rendered_preview", "https://t/p.png"), ("visual", "https://t/v.tif")],
        );
        assert_eq!(r.single_item_url(&preview, &params).unwrap(), "https://t/p.png");

        let visual = item_with_assets("sentinel-2-l2a", &[("visual", "https://t/v.tif")]);
        let url = r.single_item_url(&visual, &params).unwrap();
        assert!(url.contains("/item/preview.png?"), "got {url}");
        assert!(url.contains("item=item-1"));

        let linked = item_with_assets("sentinel-2-l2a", &[("linked_preview", "https://t/l.png")]);
        assert_eq!(r.single_item_url(&linked, &params).unwrap(), "https://t/l.png");
    }

    #[test]
    fn thermal_preview_carries_rescale_and_colormap() {
        let r = resolver();
        let (params, thermal) = r.render_params("landsat-c2-l2", Some("thermal hotspots"));
        assert!(thermal);
        let item = item_with_assets("landsat-c2-l2", &[("lwir11", "https://t/lwir.tif")]);
        let url = r.single_item_url(&item, &params).unwrap();
        assert!(url.contains("assets=lwir11"), "got {url}");
        assert!(url.contains("rescale=273,373"), "got {url}");
        assert!(url.contains("colormap_name=magma"), "got {url}");
    }

    #[test]
    fn item_without_any_visual_asset_is_non_visualizable() {
        let r = resolver();
        let (params, _) = r.render_params("sentinel-2-l2a", None);
        let bare = item_with_assets("sentinel-2-l2a", &[("metadata", "https://t/m.json")]);
        let err = r.single_item_url(&bare, &params).unwrap_err();
        assert_eq!(
            err,
            TileSourceError::NonVisualizable {
                collection: "sentinel-2-l2a".to_string(),
                item_id: Some("item-1".to_string()),
            }
        );
    }

    #[test]
    fn tile_index_candidates_prefer_item_asset_then_template() {
        let r = resolver();
        let dem = item_with_assets("cop-dem-glo-30", &[("tilejson", "https://t/item-index.json")]);
        let candidates = r.tile_index_candidates(&dem);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], "https://t/item-index.json");
        assert!(candidates[1].contains("/collection/cop-dem-glo-30/tilejson.json"));

        let scene = item_with_assets("sentinel-2-l2a", &[]);
        assert!(r.tile_index_candidates(&scene).is_empty());
    }
}
