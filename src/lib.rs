//! Wildlife Tracker
//!
//! Real-time detection and tracking of small moving objects (birds, insects,
//! anything crossing a feeder cam) in captured screen frames.
//!
//! # Architecture
//!
//! Frames flow through two worker threads:
//!
//! 1. **Capture**: a `Grabber` produces images; `ScreenCapture` stamps them
//!    into `Frame`s and keeps the newest few in a ring buffer.
//! 2. **Processing**: the `Pipeline` pulls the latest frame, runs the active
//!    `DetectionStrategy` through a `Detector` (ids, tracking table,
//!    observers), renders an overlay and folds the detections into
//!    `TrackingStatistics`.
//!
//! Overlays and statistics snapshots leave through bounded queues that drop
//! items rather than block.
//!
//! # Module Structure
//!
//! - `frame`: timestamped frames and the capture ring buffer
//! - `imaging`: grayscale/morphology/contour primitives, background model,
//!   adaptive equalization, colormaps
//! - `detect`: detection results, the seven strategies, factory, IoU merge,
//!   the `Detector` shell
//! - `ingest`: frame sources and grabbers
//! - `render`: overlay drawing
//! - `stats`: running statistics and FPS measurement
//! - `pipeline`: the capture → detect → render orchestration
//! - `config`: file + environment configuration

pub mod config;
pub mod detect;
pub mod frame;
pub mod imaging;
pub mod ingest;
pub mod pipeline;
pub mod render;
pub mod stats;
pub mod worker;

pub use config::{ConfigError, TrackerConfig};
pub use detect::{
    create_detector, create_strategy, BoundingBox, Category, Detection, DetectionObserver,
    DetectionStrategy, Detector, StrategyKind,
};
pub use frame::{Frame, FrameBuffer, SharedFrameBuffer};
pub use ingest::{FrameSource, Grabber, ScreenCapture, SyntheticConfig, SyntheticGrabber};
pub use pipeline::Pipeline;
pub use render::{OverlayFrame, OverlayRenderer, Renderer};
pub use stats::{StatsSnapshot, TrackingStatistics};
