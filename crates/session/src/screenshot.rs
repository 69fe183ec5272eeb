//! Map view capture for analysis requests.
//!
//! Readback from a freshly-presented frame can come back empty, so the
//! primary readback is retried across animation-frame boundaries before
//! the secondary copy path is tried. Capture is best effort: `None` means
//! the analysis proceeds without a screenshot.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use interpreter::BoxFuture;
use render::MapSurface;
use tracing::{debug, warn};

/// Extra readback attempts after the first, each behind a frame boundary.
pub const CAPTURE_FRAME_RETRIES: usize = 2;

/// Frame pacing source. The browser build waits on animation frames; the
/// headless build sleeps one nominal frame.
pub trait FrameScheduler: Send + Sync {
    fn next_frame(&self) -> BoxFuture<'_, ()>;
}

#[derive(Debug, Default)]
pub struct TokioFrameScheduler;

impl FrameScheduler for TokioFrameScheduler {
    fn next_frame(&self) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(std::time::Duration::from_millis(16)))
    }
}

/// Secondary capture path, typically a 2D-canvas copy of the rendered
/// view.
pub trait PixelSource: Send + Sync {
    fn capture(&self) -> BoxFuture<'_, Option<Vec<u8>>>;
}

/// Captures the current view as base64 PNG bytes.
pub async fn capture_screenshot(
    surface: &dyn MapSurface,
    secondary: Option<&dyn PixelSource>,
    frames: &dyn FrameScheduler,
) -> Option<String> {
    for attempt in 0..=CAPTURE_FRAME_RETRIES {
        if attempt > 0 {
            frames.next_frame().await;
        }
        if let Some(pixels) = surface.read_pixels().await {
            debug!(attempt, bytes = pixels.len(), "captured map view");
            return Some(STANDARD.encode(pixels));
        }
    }

    if let Some(source) = secondary {
        if let Some(pixels) = source.capture().await {
            debug!(bytes = pixels.len(), "captured map view via canvas copy");
            return Some(STANDARD.encode(pixels));
        }
    }

    warn!("map view capture failed; continuing without a screenshot");
    None
}
