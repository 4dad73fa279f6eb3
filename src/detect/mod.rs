mod factory;
mod merge;
mod result;
mod shell;
pub mod strategies;
mod strategy;

pub use factory::{create_detector, create_strategy, StrategyKind};
pub use merge::merge_detections;
pub use result::{BoundingBox, Category, Detection};
pub use shell::{ChannelObserver, DetectionObserver, Detector, ObserverId, DETECTION_EVENT};
pub use strategies::Strategy;
pub use strategy::{apply_sensitivity, classify_object, DetectionStrategy};
