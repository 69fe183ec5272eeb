//! Backend chat-response payload shapes.
//!
//! The chat backend answers with a loosely shaped JSON object: narrative
//! text, optionally accompanied by search results, explicit per-item tile
//! URLs, a pre-built mosaic reference, or a navigation instruction. These
//! types normalize that surface so the interpreter can branch on a tagged
//! shape instead of nested JSON probing.

use std::collections::BTreeMap;

use imagery::{AssetRef, ItemRecord};
use serde::Deserialize;

/// Asset key under which a `rel="preview"` link is recorded on the
/// converted [`ItemRecord`], keeping the record's asset map the single
/// place the resolver scans.
pub const LINKED_PREVIEW_ASSET: &str = "linked_preview";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatResponse {
    /// Narrative reply text; may be the whole response.
    pub response: Option<String>,
    /// The user's original query text; drives thermal/fire detection.
    pub query: Option<String>,
    /// The extent the user actually asked about. Always preferred for
    /// camera placement over item footprints.
    pub query_bbox: Option<[f64; 4]>,
    pub items: Vec<RawStacItem>,
    /// Backend-assembled per-item tile URLs, when it chose to render
    /// server-side.
    pub all_tile_urls: Vec<RawTileUrl>,
    /// Pre-built seamless mosaic; takes precedence over per-item assembly.
    pub mosaic_reference: Option<MosaicReference>,
    pub navigate_to: Option<NavigateTarget>,
}

impl ChatResponse {
    /// Whether the response carries any structured geospatial payload at
    /// all. Plain narrative replies return `false` and must leave existing
    /// imagery untouched.
    pub fn has_geospatial_payload(&self) -> bool {
        !self.items.is_empty()
            || !self.all_tile_urls.is_empty()
            || self.mosaic_reference.is_some()
            || self.navigate_to.is_some()
            || self.query_bbox.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTileUrl {
    pub item_id: String,
    pub bbox: [f64; 4],
    pub tile_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MosaicReference {
    pub tile_url: String,
    pub search_id: String,
}

/// Navigation without imagery: either a bbox to frame or a center+zoom.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigateTarget {
    pub bbox: Option<[f64; 4]>,
    pub center: Option<[f64; 2]>,
    pub zoom: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStacItem {
    pub id: String,
    #[serde(default)]
    pub collection: Option<String>,
    pub bbox: [f64; 4],
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub assets: BTreeMap<String, RawAsset>,
    #[serde(default)]
    pub links: Vec<RawLink>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAsset {
    pub href: String,
    #[serde(default, rename = "type")]
    pub media_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLink {
    pub rel: String,
    pub href: String,
}

impl RawStacItem {
    /// Converts to the lightweight item record. A `rel="preview"` link is
    /// folded into the asset map under [`LINKED_PREVIEW_ASSET`].
    pub fn to_record(&self, fallback_collection: &str) -> ItemRecord {
        let mut assets: BTreeMap<String, AssetRef> = self
            .assets
            .iter()
            .map(|(k, a)| {
                (
                    k.clone(),
                    AssetRef {
                        href: a.href.clone(),
                        media_type: a.media_type.clone(),
                    },
                )
            })
            .collect();
        if let Some(link) = self.links.iter().find(|l| l.rel == "preview") {
            assets.entry(LINKED_PREVIEW_ASSET.to_string()).or_insert(AssetRef {
                href: link.href.clone(),
                media_type: None,
            });
        }
        ItemRecord {
            id: self.id.clone(),
            collection: self
                .collection
                .clone()
                .unwrap_or_else(|| fallback_collection.to_string()),
            datetime: self.datetime.clone(),
            bbox: self.bbox,
            assets,
        }
    }
}
