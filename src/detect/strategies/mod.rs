//! The closed set of detection strategies.

mod adaptive;
mod contour;
mod motion;
mod multiscale;
mod sensitive;
mod thermal;
mod trails;

pub use adaptive::AdaptiveStrategy;
pub use contour::ContourStrategy;
pub use motion::MotionStrategy;
pub use multiscale::MultiScaleStrategy;
pub use sensitive::SensitiveStrategy;
pub use thermal::ThermalStrategy;
pub use trails::{Trail, TrailPoint, TrailsStrategy, TRAIL_PALETTE, TRAIL_TIMEOUT};

use anyhow::Result;
use std::collections::BTreeMap;

use crate::detect::result::Detection;
use crate::detect::strategy::DetectionStrategy;
use crate::frame::Frame;

/// One of the built-in strategies.
pub enum Strategy {
    Contour(ContourStrategy),
    Motion(MotionStrategy),
    Adaptive(AdaptiveStrategy),
    Sensitive(SensitiveStrategy),
    MultiScale(MultiScaleStrategy),
    Thermal(ThermalStrategy),
    Trails(TrailsStrategy),
}

impl Strategy {
    fn inner(&self) -> &dyn DetectionStrategy {
        match self {
            Strategy::Contour(s) => s,
            Strategy::Motion(s) => s,
            Strategy::Adaptive(s) => s,
            Strategy::Sensitive(s) => s,
            Strategy::MultiScale(s) => s,
            Strategy::Thermal(s) => s,
            Strategy::Trails(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn DetectionStrategy {
        match self {
            Strategy::Contour(s) => s,
            Strategy::Motion(s) => s,
            Strategy::Adaptive(s) => s,
            Strategy::Sensitive(s) => s,
            Strategy::MultiScale(s) => s,
            Strategy::Thermal(s) => s,
            Strategy::Trails(s) => s,
        }
    }

    /// Motion trails, when this is the trails strategy.
    pub fn trails(&self) -> Option<&BTreeMap<u64, Trail>> {
        match self {
            Strategy::Trails(s) => Some(s.trails()),
            _ => None,
        }
    }
}

impl DetectionStrategy for Strategy {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn required_config(&self) -> &'static str {
        self.inner().required_config()
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.inner_mut().detect(frame)
    }

    fn reset(&mut self) {
        self.inner_mut().reset()
    }
}
