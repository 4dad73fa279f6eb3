use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::TrackerConfig;

use super::shell::Detector;
use super::strategies::{
    AdaptiveStrategy, ContourStrategy, MotionStrategy, MultiScaleStrategy, SensitiveStrategy,
    Strategy, ThermalStrategy, TrailsStrategy,
};

/// Strategy selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Contour,
    Motion,
    Adaptive,
    Sensitive,
    MultiScale,
    Thermal,
    Trails,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 7] = [
        StrategyKind::Contour,
        StrategyKind::Motion,
        StrategyKind::Adaptive,
        StrategyKind::Sensitive,
        StrategyKind::MultiScale,
        StrategyKind::Thermal,
        StrategyKind::Trails,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Contour => "contour",
            StrategyKind::Motion => "motion",
            StrategyKind::Adaptive => "adaptive",
            StrategyKind::Sensitive => "sensitive",
            StrategyKind::MultiScale => "multi_scale",
            StrategyKind::Thermal => "thermal",
            StrategyKind::Trails => "trails",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "contour" => Ok(StrategyKind::Contour),
            "motion" => Ok(StrategyKind::Motion),
            "adaptive" => Ok(StrategyKind::Adaptive),
            "sensitive" => Ok(StrategyKind::Sensitive),
            "multi_scale" | "multiscale" => Ok(StrategyKind::MultiScale),
            "thermal" => Ok(StrategyKind::Thermal),
            "trails" => Ok(StrategyKind::Trails),
            other => Err(format!("unknown strategy '{}'", other)),
        }
    }
}

/// Build the strategy for `kind` from its config section.
pub fn create_strategy(kind: StrategyKind, config: &TrackerConfig) -> Strategy {
    match kind {
        StrategyKind::Contour => Strategy::Contour(ContourStrategy::new(config.contour.clone())),
        StrategyKind::Motion => Strategy::Motion(MotionStrategy::new(config.motion.clone())),
        StrategyKind::Adaptive => Strategy::Adaptive(AdaptiveStrategy::new(config.adaptive.clone())),
        StrategyKind::Sensitive => {
            Strategy::Sensitive(SensitiveStrategy::new(config.sensitive.clone()))
        }
        StrategyKind::MultiScale => Strategy::MultiScale(MultiScaleStrategy::new(
            config.multi_scale.clone(),
            config.adaptive.clone(),
        )),
        StrategyKind::Thermal => Strategy::Thermal(ThermalStrategy::new(config.thermal.clone())),
        StrategyKind::Trails => Strategy::Trails(TrailsStrategy::new(
            config.trails.clone(),
            config.motion.clone(),
        )),
    }
}

/// Build a detector shell around the strategy the config selects.
pub fn create_detector(config: &TrackerConfig) -> Detector {
    Detector::new(create_strategy(config.strategy, config))
}
