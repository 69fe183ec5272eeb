//! Map provider fallback chain.
//!
//! Modeled as a small one-directional state machine instead of nested
//! try/catch with side-effectful reinitialization: `Primary → Fallback →
//! StaticPlaceholder`, never backwards. Returning to the primary engine
//! requires an explicit `reset()`, it is never automatic.

use interpreter::BoxFuture;
use tracing::{error, warn};
use viewport::CameraTarget;

use crate::surface::{MapSurface, SurfaceError, TileLayerSpec};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    /// Full-featured map engine (vector basemap, camera animation).
    Primary,
    /// Simpler tile-based engine used when the primary SDK fails to load
    /// or authenticate.
    Fallback,
    /// Static informational placeholder; nothing renders but the app keeps
    /// working.
    StaticPlaceholder,
}

#[derive(Debug)]
pub struct ProviderInitError {
    pub provider: ProviderKind,
    pub message: String,
}

impl ProviderInitError {
    pub fn new(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ProviderInitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} provider failed to initialize: {}", self.provider, self.message)
    }
}

impl std::error::Error for ProviderInitError {}

#[derive(Debug)]
pub struct ProviderChain {
    active: ProviderKind,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self {
            active: ProviderKind::Primary,
        }
    }

    pub fn active(&self) -> ProviderKind {
        self.active
    }

    /// Advances to the next provider after an init failure. The chain ends
    /// at the placeholder and stays there.
    pub fn on_init_failure(&mut self) -> ProviderKind {
        self.active = match self.active {
            ProviderKind::Primary => ProviderKind::Fallback,
            ProviderKind::Fallback | ProviderKind::StaticPlaceholder => {
                ProviderKind::StaticPlaceholder
            }
        };
        self.active
    }

    /// Explicit reinitialization back to the primary engine. This is the
    /// only path that moves the chain backwards.
    pub fn reset(&mut self) {
        self.active = ProviderKind::Primary;
    }

    /// Walks the chain through `init` until a provider comes up. The
    /// placeholder always succeeds, so this terminates with a usable
    /// surface.
    pub fn initialize<F>(&mut self, mut init: F) -> (ProviderKind, Box<dyn MapSurface>)
    where
        F: FnMut(ProviderKind) -> Result<Box<dyn MapSurface>, ProviderInitError>,
    {
        loop {
            if self.active == ProviderKind::StaticPlaceholder {
                warn!("all map engines failed; using static placeholder");
                return (self.active, Box::new(PlaceholderSurface));
            }
            match init(self.active) {
                Ok(surface) => return (self.active, surface),
                Err(err) => {
                    error!("{err}");
                    self.on_init_failure();
                }
            }
        }
    }
}

impl Default for ProviderChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal surface: accepts every call and renders nothing.
#[derive(Debug, Default)]
pub struct PlaceholderSurface;

impl MapSurface for PlaceholderSurface {
    fn set_camera(&self, _target: &CameraTarget) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn replace_tile_layers(&self, _layers: Vec<TileLayerSpec>) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn read_pixels(&self) -> BoxFuture<'_, Option<Vec<u8>>> {
        Box::pin(async { None })
    }
}
