use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use wildlife_tracker::config::{CaptureSource, TrackerConfig};
use wildlife_tracker::imaging::ColorMap;
use wildlife_tracker::StrategyKind;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "TRACKER_CONFIG",
        "TRACKER_STRATEGY",
        "TRACKER_UPDATE_INTERVAL_MS",
        "TRACKER_SENSITIVITY",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_defaults_without_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = TrackerConfig::load().expect("load defaults");
    assert_eq!(cfg, TrackerConfig::default());
    assert_eq!(cfg.update_interval(), Duration::from_millis(50));
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "strategy": "contour",
        "update_interval": 0.2,
        "capture": {
            "source": "window_by_title",
            "window_title": "Feeder Cam",
            "fps_limit": 15
        },
        "contour": {
            "min_area": 80.0,
            "threshold": 40.0
        },
        "trails": {
            "trail_length": 20
        }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("TRACKER_CONFIG", file.path());
    std::env::set_var("TRACKER_STRATEGY", "multi-scale");
    std::env::set_var("TRACKER_SENSITIVITY", "2.0");

    let cfg = TrackerConfig::load().expect("load config");

    assert_eq!(cfg.strategy, StrategyKind::MultiScale);
    assert_eq!(cfg.update_interval(), Duration::from_millis(200));
    assert_eq!(cfg.capture.source, CaptureSource::WindowByTitle);
    assert_eq!(cfg.capture.window_title.as_deref(), Some("Feeder Cam"));
    assert_eq!(cfg.capture.fps_limit, 15);
    assert_eq!(cfg.capture.buffer_size, 5);
    assert_eq!(cfg.contour.min_area, 80.0);
    assert_eq!(cfg.contour.threshold, 40.0);
    assert_eq!(cfg.contour.max_area, 50000.0);
    assert_eq!(cfg.trails.trail_length, 20);
    assert_eq!(cfg.contour.sensitivity, 2.0);
    assert_eq!(cfg.adaptive.sensitivity, 2.0);
    assert_eq!(cfg.thermal.sensitivity, 2.0);

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
strategy = "thermal"

[thermal]
color_map = "autumn"
highlight_cold = true

[queues]
overlay_capacity = 4
"#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("TRACKER_CONFIG", file.path());
    std::env::set_var("TRACKER_UPDATE_INTERVAL_MS", "0");

    let cfg = TrackerConfig::load().expect("load config");

    assert_eq!(cfg.strategy, StrategyKind::Thermal);
    assert_eq!(cfg.thermal.color_map, ColorMap::Autumn);
    assert!(cfg.thermal.highlight_cold);
    assert_eq!(cfg.queues.overlay_capacity, 4);
    assert_eq!(cfg.queues.stats_capacity, 10);
    assert_eq!(cfg.update_interval(), Duration::ZERO);

    clear_env();
}

#[test]
fn rejects_invalid_file_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{"motion": {"temporal_buffer_size": 1}}"#)
        .expect("write config");
    std::env::set_var("TRACKER_CONFIG", file.path());

    let err = TrackerConfig::load().unwrap_err();
    assert!(
        err.to_string().contains("motion.temporal_buffer_size"),
        "unexpected error: {}",
        err
    );

    clear_env();
}

#[test]
fn rejects_invalid_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("TRACKER_STRATEGY", "yolo");
    assert!(TrackerConfig::load().is_err());
    std::env::remove_var("TRACKER_STRATEGY");

    std::env::set_var("TRACKER_SENSITIVITY", "5.0");
    let err = TrackerConfig::load().unwrap_err();
    assert!(err.to_string().contains("sensitivity"), "unexpected error: {}", err);
    std::env::remove_var("TRACKER_SENSITIVITY");

    std::env::set_var("TRACKER_UPDATE_INTERVAL_MS", "soon");
    assert!(TrackerConfig::load().is_err());

    clear_env();
}

#[test]
fn missing_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    std::env::set_var("TRACKER_CONFIG", dir.path().join("absent.json"));
    assert!(TrackerConfig::load().is_err());

    clear_env();
}
