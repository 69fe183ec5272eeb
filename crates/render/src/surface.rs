//! Map surface and URL signing collaborator contracts.
//!
//! The surface's active tile layers are a single-writer resource: only the
//! render coordinator may add or remove layers. Everything else reads
//! camera state or submits descriptors.

use interpreter::BoxFuture;
use tracing::warn;
use viewport::CameraTarget;

/// Opacity for thermal/fire overlays; the basemap should stay readable
/// underneath.
pub const THERMAL_OPACITY: f64 = 0.75;
pub const DEFAULT_OPACITY: f64 = 1.0;

/// One tile layer to attach to the map surface.
#[derive(Debug, Clone, PartialEq)]
pub struct TileLayerSpec {
    pub id: String,
    pub url: String,
    /// Footprint for discrete per-item layers; `None` for full-extent
    /// mosaics.
    pub bbox: Option<[f64; 4]>,
    pub opacity: f64,
}

#[derive(Debug)]
pub struct SurfaceError {
    pub message: String,
}

impl SurfaceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SurfaceError {}

/// Rendering backend abstraction (primary engine, fallback engine, or the
/// static placeholder). Implementations must be `Send + Sync`.
pub trait MapSurface: Send + Sync {
    fn set_camera(&self, target: &CameraTarget) -> Result<(), SurfaceError>;

    /// Replaces all active tile layers in one batch operation. Layers are
    /// never attached one at a time; partial layer sets flicker.
    fn replace_tile_layers(&self, layers: Vec<TileLayerSpec>) -> Result<(), SurfaceError>;

    /// Raw pixel readback of the rendered canvas, RGBA. `None` when the
    /// surface cannot be read (fresh frame, headless, placeholder).
    fn read_pixels(&self) -> BoxFuture<'_, Option<Vec<u8>>>;
}

#[derive(Debug)]
pub struct SignError {
    pub message: String,
}

impl std::fmt::Display for SignError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SignError {}

/// Tile URL signing. Best-effort by contract: callers fall back to the
/// unsigned URL on failure.
pub trait UrlSigner: Send + Sync {
    fn sign<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, SignError>>;
}

/// Pass-through signer for backends whose tile URLs need no signing.
#[derive(Debug, Default)]
pub struct NoopSigner;

impl UrlSigner for NoopSigner {
    fn sign<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, SignError>> {
        Box::pin(async move { Ok(url.to_string()) })
    }
}

/// Signs a URL, falling back to the original on failure.
pub async fn sign_or_original(signer: &dyn UrlSigner, url: &str) -> String {
    match signer.sign(url).await {
        Ok(signed) => signed,
        Err(err) => {
            warn!("url signing failed, using unsigned url: {err}");
            url.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use interpreter::BoxFuture;

    use super::{NoopSigner, SignError, UrlSigner, sign_or_original};

    struct FailingSigner;

    impl UrlSigner for FailingSigner {
        fn sign<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<String, SignError>> {
            Box::pin(async {
                Err(SignError {
                    message: "signing service unavailable".to_string(),
                })
            })
        }
    }

    #[tokio::test]
    async fn signing_failure_falls_back_to_unsigned_url() {
        let url = sign_or_original(&FailingSigner, "https://tiles/x").await;
        assert_eq!(url, "https://tiles/x");
    }

    #[tokio::test]
    async fn noop_signer_passes_through() {
        let url = sign_or_original(&NoopSigner, "https://tiles/x").await;
        assert_eq!(url, "https://tiles/x");
    }
}
