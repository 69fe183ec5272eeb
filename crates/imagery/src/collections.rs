//! Declarative collection classification.
//!
//! Rendering behavior (asset selection, rescale/colormap, zoom floors,
//! mosaic-vs-discrete handling) is keyed by a small classification of the
//! backend collection id. The table is ordered: the first matching keyword
//! wins.

use serde::{Deserialize, Serialize};

/// Rendering class of a catalog collection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionClass {
    /// Global elevation models (DEMs); continuous coverage.
    Elevation,
    /// Coarse (≥500 m/pixel) periodic global composites; continuous coverage.
    CoarseComposite,
    /// Fire/burn composites; coarse and continuous.
    FireComposite,
    /// Medium-resolution optical basemap mosaics; tile index starts at z8.
    OpticalMosaic,
    /// Discrete optical scenes (Sentinel-2, Landsat, aerial).
    Optical,
    /// Synthetic aperture radar scenes.
    Sar,
    /// Anything unrecognized; treated as discrete imagery.
    Other,
}

/// Ordered keyword table; first match wins. `mosaic` outranks the optical
/// keywords so `sentinel-2-mosaic`-style ids classify as mosaics.
const CLASS_TABLE: &[(&str, CollectionClass)] = &[
    ("mosaic", CollectionClass::OpticalMosaic),
    ("basemap", CollectionClass::OpticalMosaic),
    ("fire", CollectionClass::FireComposite),
    ("burn", CollectionClass::FireComposite),
    ("dem", CollectionClass::Elevation),
    ("dsm", CollectionClass::Elevation),
    ("dtm", CollectionClass::Elevation),
    ("elevation", CollectionClass::Elevation),
    ("modis", CollectionClass::CoarseComposite),
    ("viirs", CollectionClass::CoarseComposite),
    ("sentinel-1", CollectionClass::Sar),
    ("sar", CollectionClass::Sar),
    ("rtc", CollectionClass::Sar),
    ("sentinel-2", CollectionClass::Optical),
    ("landsat", CollectionClass::Optical),
    ("naip", CollectionClass::Optical),
    ("hls", CollectionClass::Optical),
];

pub fn classify(collection_id: &str) -> CollectionClass {
    let id = collection_id.to_ascii_lowercase();
    for (keyword, class) in CLASS_TABLE {
        if id.contains(keyword) {
            return *class;
        }
    }
    CollectionClass::Other
}

/// Default rendering parameters for one collection class.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderParams {
    pub assets: Vec<String>,
    pub rescale: Option<(f64, f64)>,
    pub colormap: Option<String>,
}

impl CollectionClass {
    /// Continuous-coverage collections are rendered as seamless mosaics and
    /// never need per-item tile expansion.
    pub fn is_continuous(self) -> bool {
        matches!(
            self,
            CollectionClass::Elevation
                | CollectionClass::CoarseComposite
                | CollectionClass::FireComposite
                | CollectionClass::OpticalMosaic
        )
    }

    /// Ground resolution is 500 m/pixel or worse; these use the lower zoom
    /// step table.
    pub fn is_coarse_resolution(self) -> bool {
        matches!(
            self,
            CollectionClass::CoarseComposite | CollectionClass::FireComposite
        )
    }

    /// Minimum zoom at which the collection produces visible pixels.
    ///
    /// Coarse composites have nothing to show below z7; optical mosaic tile
    /// indexes have no entries below z8. The floor is only ever raised to,
    /// never lowered from.
    pub fn min_zoom(self) -> Option<u8> {
        match self {
            CollectionClass::CoarseComposite | CollectionClass::FireComposite => Some(7),
            CollectionClass::OpticalMosaic => Some(8),
            _ => None,
        }
    }

    pub fn default_render_params(self) -> RenderParams {
        match self {
            CollectionClass::Elevation => RenderParams {
                assets: vec!["data".to_string()],
                rescale: Some((0.0, 4000.0)),
                colormap: Some("terrain".to_string()),
            },
            CollectionClass::CoarseComposite => RenderParams {
                assets: vec!["data".to_string()],
                rescale: Some((0.0, 255.0)),
                colormap: None,
            },
            CollectionClass::FireComposite => RenderParams {
                assets: vec!["data".to_string()],
                rescale: Some((0.0, 100.0)),
                colormap: Some("inferno".to_string()),
            },
            CollectionClass::OpticalMosaic | CollectionClass::Optical => RenderParams {
                assets: vec!["visual".to_string()],
                rescale: None,
                colormap: None,
            },
            CollectionClass::Sar => RenderParams {
                assets: vec!["vv".to_string()],
                rescale: Some((0.0, 0.3)),
                colormap: Some("gray".to_string()),
            },
            CollectionClass::Other => RenderParams {
                assets: Vec::new(),
                rescale: None,
                colormap: None,
            },
        }
    }

    /// Deterministic tile-index URL for continuous collections whose items
    /// carry no tile-index asset of their own. Discrete collections return
    /// `None`: the backend is the source of truth for their tile URLs.
    pub fn fallback_tile_index_url(self, tile_api_base: &str, collection_id: &str) -> Option<String> {
        if !self.is_continuous() {
            return None;
        }
        let params = self.default_render_params();
        let assets = params.assets.join(",");
        Some(format!(
            "{}/collection/{}/tilejson.json?assets={}",
            tile_api_base.trim_end_matches('/'),
            collection_id,
            assets
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{CollectionClass, classify};

    #[test]
    fn classifies_known_collections() {
        assert_eq!(classify("cop-dem-glo-30"), CollectionClass::Elevation);
        assert_eq!(classify("modis-09A1-061"), CollectionClass::CoarseComposite);
        assert_eq!(classify("mtbs-burn-severity"), CollectionClass::FireComposite);
        assert_eq!(classify("sentinel-2-l2a"), CollectionClass::Optical);
        assert_eq!(classify("landsat-c2-l2"), CollectionClass::Optical);
        assert_eq!(classify("sentinel-1-rtc"), CollectionClass::Sar);
        assert_eq!(classify("planet-monthly-mosaic"), CollectionClass::OpticalMosaic);
        assert_eq!(classify("something-unheard-of"), CollectionClass::Other);
    }

    #[test]
    fn mosaic_keyword_outranks_optical_keywords() {
        assert_eq!(classify("sentinel-2-mosaic"), CollectionClass::OpticalMosaic);
    }

    #[test]
    fn zoom_floors_follow_resolution_class() {
        assert_eq!(CollectionClass::CoarseComposite.min_zoom(), Some(7));
        assert_eq!(CollectionClass::FireComposite.min_zoom(), Some(7));
        assert_eq!(CollectionClass::OpticalMosaic.min_zoom(), Some(8));
        assert_eq!(CollectionClass::Optical.min_zoom(), None);
    }

    #[test]
    fn continuous_collections_get_a_fallback_tile_index() {
        let url = CollectionClass::Elevation
            .fallback_tile_index_url("https://tiles.example/api/", "cop-dem-glo-30")
            .unwrap();
        assert_eq!(
            url,
            "https://tiles.example/api/collection/cop-dem-glo-30/tilejson.json?assets=data"
        );
        assert_eq!(
            CollectionClass::Optical.fallback_tile_index_url("https://tiles.example", "sentinel-2-l2a"),
            None
        );
    }
}
