//! Frame ingestion.
//!
//! A `FrameSource` is the capture stage of the pipeline: it runs its own
//! producer thread, keeps the most recent frames in a bounded ring and hands
//! out the latest one on request. `ScreenCapture` is the standard
//! implementation; it pulls raw images from a `Grabber`, the OS screenshot
//! collaborator, which is pluggable.
//!
//! The source MUST NOT block the consumer: `get_frame` only reads the ring.

mod capture;
mod grabbers;

pub use capture::ScreenCapture;
pub use grabbers::{FnGrabber, SyntheticConfig, SyntheticGrabber};

use anyhow::Result;
use image::RgbImage;
use std::sync::Arc;

use crate::frame::Frame;

pub trait FrameSource: Send + Sync {
    /// Start producing frames. Starting a running source is a no-op.
    fn start(&self) -> Result<()>;

    /// Stop producing frames and drop any buffered ones.
    fn stop(&self);

    /// Most recent captured frame, if any.
    fn get_frame(&self) -> Option<Arc<Frame>>;

    /// Measured capture rate.
    fn fps(&self) -> f64;

    fn is_running(&self) -> bool;
}

/// Produces raw screen images on demand.
pub trait Grabber: Send + 'static {
    fn name(&self) -> &'static str;

    /// Grab one image. `Ok(None)` means nothing was available this time.
    fn grab(&mut self) -> Result<Option<RgbImage>>;
}
