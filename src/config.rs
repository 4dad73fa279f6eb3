//! Tracker configuration.
//!
//! `TrackerConfig::load()` reads the optional file named by `TRACKER_CONFIG`
//! (TOML when the path ends in `.toml`, JSON otherwise), applies environment
//! overrides and validates the result. Every section has defaults, so partial
//! files are fine.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::detect::StrategyKind;
use crate::imaging::ColorMap;

pub const ENV_CONFIG: &str = "TRACKER_CONFIG";
pub const ENV_STRATEGY: &str = "TRACKER_STRATEGY";
pub const ENV_UPDATE_INTERVAL_MS: &str = "TRACKER_UPDATE_INTERVAL_MS";
pub const ENV_SENSITIVITY: &str = "TRACKER_SENSITIVITY";

const MIN_SENSITIVITY: f64 = 0.1;
const MAX_SENSITIVITY: f64 = 3.0;

// ----------------------------------------------------------------------------
// ConfigError
// ----------------------------------------------------------------------------

/// A rejected configuration value.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid config field '{}': {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

fn check(ok: bool, field: &str, message: &str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::new(field, message))
    }
}

fn check_sensitivity(section: &str, value: f64) -> Result<(), ConfigError> {
    check(
        (MIN_SENSITIVITY..=MAX_SENSITIVITY).contains(&value),
        &format!("{}.sensitivity", section),
        "must be between 0.1 and 3.0",
    )
}

// ----------------------------------------------------------------------------
// Capture / queues / display
// ----------------------------------------------------------------------------

/// What the external screen grabber should capture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    #[default]
    FullScreen,
    ActiveWindow,
    WindowByTitle,
    Region,
    Synthetic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: CaptureSource,
    pub window_title: Option<String>,
    pub region: Option<Region>,
    /// Upper bound on captured frames per second; 0 disables the limit.
    pub fps_limit: u32,
    pub buffer_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: CaptureSource::FullScreen,
            window_title: None,
            region: None,
            fps_limit: 30,
            buffer_size: crate::frame::DEFAULT_BUFFER_FRAMES,
        }
    }
}

impl CaptureConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check(self.buffer_size >= 1, "capture.buffer_size", "must be at least 1")?;
        if self.source == CaptureSource::WindowByTitle {
            check(
                self.window_title
                    .as_deref()
                    .is_some_and(|t| !t.trim().is_empty()),
                "capture.window_title",
                "required when source is window_by_title",
            )?;
        }
        if self.source == CaptureSource::Region {
            check(self.region.is_some(), "capture.region", "required when source is region")?;
        }
        if let Some(region) = &self.region {
            check(
                region.width > 0 && region.height > 0,
                "capture.region",
                "width and height must be greater than zero",
            )?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub overlay_capacity: usize,
    pub stats_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            overlay_capacity: 2,
            stats_capacity: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub show_heatmap: bool,
    /// Blend the annotated overlay 70/30 with the untouched frame.
    pub show_original: bool,
    pub show_contours: bool,
    pub show_trails: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_heatmap: false,
            show_original: false,
            show_contours: true,
            show_trails: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Strategy sections
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourConfig {
    pub min_area: f64,
    pub max_area: f64,
    pub threshold: f64,
    pub blur_size: u32,
    pub aspect_ratio_min: f64,
    pub aspect_ratio_max: f64,
    pub solidity_threshold: f64,
    pub sensitivity: f64,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            min_area: 30.0,
            max_area: 50_000.0,
            threshold: 25.0,
            blur_size: 3,
            aspect_ratio_min: 0.2,
            aspect_ratio_max: 5.0,
            solidity_threshold: 0.5,
            sensitivity: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub min_pixel_change: f64,
    pub temporal_buffer_size: usize,
    pub velocity_threshold: f64,
    pub sensitivity: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            min_pixel_change: 5.0,
            temporal_buffer_size: 3,
            velocity_threshold: 5.0,
            sensitivity: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub learning_rate: f64,
    pub history_length: u32,
    pub var_threshold: f64,
    pub detect_shadows: bool,
    /// Darkest relative brightness still counted as a shadow.
    pub shadow_threshold: f64,
    pub sensitivity: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            history_length: 200,
            var_threshold: 16.0,
            detect_shadows: true,
            shadow_threshold: 0.5,
            sensitivity: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitiveConfig {
    pub min_pixel_change: f64,
    pub frame_buffer_size: usize,
    pub accumulation_threshold: u32,
    /// Require change across two consecutive frame pairs.
    pub temporal_filter: bool,
    pub spatial_filter: bool,
    pub enhancement_factor: f64,
    pub noise_reduction: f64,
    pub sensitivity: f64,
}

impl Default for SensitiveConfig {
    fn default() -> Self {
        Self {
            min_pixel_change: 3.0,
            frame_buffer_size: 5,
            accumulation_threshold: 2,
            temporal_filter: true,
            spatial_filter: true,
            enhancement_factor: 2.0,
            noise_reduction: 0.8,
            sensitivity: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiScaleConfig {
    pub scales: Vec<f64>,
    pub scale_weights: Vec<f64>,
    pub merge_threshold: f64,
    pub sensitivity: f64,
}

impl Default for MultiScaleConfig {
    fn default() -> Self {
        Self {
            scales: vec![1.0, 0.5, 0.25],
            scale_weights: vec![1.0, 0.7, 0.5],
            merge_threshold: 0.5,
            sensitivity: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalConfig {
    pub color_map: ColorMap,
    pub highlight_cold: bool,
    pub sensitivity: f64,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            color_map: ColorMap::Jet,
            highlight_cold: false,
            sensitivity: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailsConfig {
    pub trail_length: usize,
    /// Give each new trail the next palette colour; otherwise all share one.
    pub color_cycling: bool,
    pub sensitivity: f64,
}

impl Default for TrailsConfig {
    fn default() -> Self {
        Self {
            trail_length: 50,
            color_cycling: true,
            sensitivity: 1.0,
        }
    }
}

// ----------------------------------------------------------------------------
// TrackerConfig
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub strategy: StrategyKind,
    /// Seconds the processing loop sleeps after each iteration.
    pub update_interval: f64,
    pub capture: CaptureConfig,
    pub queues: QueueConfig,
    pub display: DisplayConfig,
    pub contour: ContourConfig,
    pub motion: MotionConfig,
    pub adaptive: AdaptiveConfig,
    pub sensitive: SensitiveConfig,
    pub multi_scale: MultiScaleConfig,
    pub thermal: ThermalConfig,
    pub trails: TrailsConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Adaptive,
            update_interval: 0.05,
            capture: CaptureConfig::default(),
            queues: QueueConfig::default(),
            display: DisplayConfig::default(),
            contour: ContourConfig::default(),
            motion: MotionConfig::default(),
            adaptive: AdaptiveConfig::default(),
            sensitive: SensitiveConfig::default(),
            multi_scale: MultiScaleConfig::default(),
            thermal: ThermalConfig::default(),
            trails: TrailsConfig::default(),
        }
    }
}

impl TrackerConfig {
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG) {
            Ok(path) if !path.trim().is_empty() => Self::from_path(Path::new(&path))?,
            _ => Self::default(),
        };
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a config file without env overrides or validation.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let cfg = if is_toml {
            toml::from_str(&raw)
                .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
        } else {
            serde_json::from_str(&raw)
                .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
        };
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(strategy) = std::env::var(ENV_STRATEGY) {
            if !strategy.trim().is_empty() {
                self.strategy = strategy
                    .parse()
                    .map_err(|e| anyhow!("{} is invalid: {}", ENV_STRATEGY, e))?;
            }
        }
        if let Ok(interval) = std::env::var(ENV_UPDATE_INTERVAL_MS) {
            let millis: u64 = interval.trim().parse().map_err(|_| {
                anyhow!("{} must be an integer number of milliseconds", ENV_UPDATE_INTERVAL_MS)
            })?;
            self.update_interval = millis as f64 / 1000.0;
        }
        if let Ok(sensitivity) = std::env::var(ENV_SENSITIVITY) {
            let value: f64 = sensitivity
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be a number", ENV_SENSITIVITY))?;
            self.set_sensitivity(value);
        }
        Ok(())
    }

    /// Apply one sensitivity to every strategy section.
    pub fn set_sensitivity(&mut self, value: f64) {
        self.contour.sensitivity = value;
        self.motion.sensitivity = value;
        self.adaptive.sensitivity = value;
        self.sensitive.sensitivity = value;
        self.multi_scale.sensitivity = value;
        self.thermal.sensitivity = value;
        self.trails.sensitivity = value;
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs_f64(self.update_interval.max(0.0))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check(
            self.update_interval.is_finite() && self.update_interval >= 0.0,
            "update_interval",
            "must be a non-negative number of seconds",
        )?;
        check(
            self.queues.overlay_capacity >= 1,
            "queues.overlay_capacity",
            "must be at least 1",
        )?;
        check(
            self.queues.stats_capacity >= 1,
            "queues.stats_capacity",
            "must be at least 1",
        )?;
        self.capture.validate()?;

        let c = &self.contour;
        check_sensitivity("contour", c.sensitivity)?;
        check(c.min_area > 0.0, "contour.min_area", "must be greater than zero")?;
        check(
            c.max_area > c.min_area,
            "contour.max_area",
            "must be greater than min_area",
        )?;
        check(
            c.aspect_ratio_min < c.aspect_ratio_max,
            "contour.aspect_ratio_min",
            "must be less than aspect_ratio_max",
        )?;
        check(
            (0.0..=1.0).contains(&c.solidity_threshold),
            "contour.solidity_threshold",
            "must be between 0 and 1",
        )?;

        let m = &self.motion;
        check_sensitivity("motion", m.sensitivity)?;
        check(
            m.min_pixel_change > 0.0,
            "motion.min_pixel_change",
            "must be greater than zero",
        )?;
        check(
            m.temporal_buffer_size >= 2,
            "motion.temporal_buffer_size",
            "must be at least 2",
        )?;

        let a = &self.adaptive;
        check_sensitivity("adaptive", a.sensitivity)?;
        check(
            a.learning_rate > 0.0 && a.learning_rate <= 1.0,
            "adaptive.learning_rate",
            "must be in (0, 1]",
        )?;
        check(
            a.history_length > 0,
            "adaptive.history_length",
            "must be greater than zero",
        )?;
        check(
            a.var_threshold > 0.0,
            "adaptive.var_threshold",
            "must be greater than zero",
        )?;

        let s = &self.sensitive;
        check_sensitivity("sensitive", s.sensitivity)?;
        check(
            s.min_pixel_change > 0.0,
            "sensitive.min_pixel_change",
            "must be greater than zero",
        )?;
        check(
            s.frame_buffer_size >= 3,
            "sensitive.frame_buffer_size",
            "must be at least 3",
        )?;
        check(
            (0.0..1.0).contains(&s.noise_reduction),
            "sensitive.noise_reduction",
            "must be in [0, 1)",
        )?;
        check(
            s.accumulation_threshold > 0,
            "sensitive.accumulation_threshold",
            "must be greater than zero",
        )?;

        let ms = &self.multi_scale;
        check_sensitivity("multi_scale", ms.sensitivity)?;
        check(!ms.scales.is_empty(), "multi_scale.scales", "must not be empty")?;
        check(
            ms.scales.iter().all(|s| s.is_finite() && *s > 0.0),
            "multi_scale.scales",
            "every scale must be greater than zero",
        )?;
        check(
            !ms.scale_weights.is_empty(),
            "multi_scale.scale_weights",
            "must not be empty",
        )?;
        check(
            ms.merge_threshold > 0.0 && ms.merge_threshold <= 1.0,
            "multi_scale.merge_threshold",
            "must be in (0, 1]",
        )?;

        check_sensitivity("thermal", self.thermal.sensitivity)?;

        check_sensitivity("trails", self.trails.sensitivity)?;
        check(
            self.trails.trail_length > 0,
            "trails.trail_length",
            "must be greater than zero",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = TrackerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.strategy, StrategyKind::Adaptive);
        assert_eq!(cfg.capture.buffer_size, 5);
        assert_eq!(cfg.queues.overlay_capacity, 2);
        assert_eq!(cfg.queues.stats_capacity, 10);
    }

    #[test]
    fn rejects_out_of_range_sensitivity() {
        let mut cfg = TrackerConfig::default();
        cfg.thermal.sensitivity = 3.5;
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.field, "thermal.sensitivity");
    }

    #[test]
    fn rejects_inverted_area_bounds() {
        let mut cfg = TrackerConfig::default();
        cfg.contour.max_area = 10.0;
        assert_eq!(cfg.validate().unwrap_err().field, "contour.max_area");
    }

    #[test]
    fn rejects_short_sensitive_buffer() {
        let mut cfg = TrackerConfig::default();
        cfg.sensitive.frame_buffer_size = 2;
        assert_eq!(
            cfg.validate().unwrap_err().field,
            "sensitive.frame_buffer_size"
        );
    }

    #[test]
    fn window_capture_requires_title() {
        let mut cfg = TrackerConfig::default();
        cfg.capture.source = CaptureSource::WindowByTitle;
        assert_eq!(cfg.validate().unwrap_err().field, "capture.window_title");
        cfg.capture.window_title = Some("Bird Cam".to_string());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: TrackerConfig =
            serde_json::from_str(r#"{"strategy": "thermal", "thermal": {"color_map": "hot"}}"#)
                .unwrap();
        assert_eq!(cfg.strategy, StrategyKind::Thermal);
        assert_eq!(cfg.thermal.color_map, ColorMap::Hot);
        assert_eq!(cfg.contour, ContourConfig::default());
    }

    #[test]
    fn unknown_color_map_is_a_parse_error() {
        let parsed: Result<TrackerConfig, _> =
            serde_json::from_str(r#"{"thermal": {"color_map": "viridis"}}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn set_sensitivity_reaches_every_section() {
        let mut cfg = TrackerConfig::default();
        cfg.set_sensitivity(0.4);
        assert_eq!(cfg.contour.sensitivity, 0.4);
        assert_eq!(cfg.trails.sensitivity, 0.4);
        assert_eq!(cfg.multi_scale.sensitivity, 0.4);
    }
}
