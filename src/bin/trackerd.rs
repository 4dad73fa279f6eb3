//! trackerd - wildlife tracker daemon
//!
//! This daemon:
//! 1. Loads the tracker config (file from TRACKER_CONFIG plus env overrides)
//! 2. Starts a capture source and the detection pipeline
//! 3. Drains the overlay and statistics queues as the presentation layer
//! 4. Logs a statistics line per snapshot and optionally saves the last overlay

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use wildlife_tracker::config::CaptureSource;
use wildlife_tracker::{
    Detection, OverlayFrame, Pipeline, ScreenCapture, StrategyKind, SyntheticConfig,
    SyntheticGrabber, TrackerConfig,
};

const DRAIN_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(author, version, about = "Detect and track moving wildlife in captured frames")]
struct Args {
    /// Config file (TOML or JSON).
    #[arg(long, env = "TRACKER_CONFIG")]
    config: Option<PathBuf>,
    /// Override the configured detection strategy.
    #[arg(long)]
    strategy: Option<StrategyKind>,
    /// Stop after this many seconds; runs until Ctrl-C when omitted.
    #[arg(long)]
    seconds: Option<u64>,
    /// Synthetic scene width.
    #[arg(long, default_value_t = 320)]
    width: u32,
    /// Synthetic scene height.
    #[arg(long, default_value_t = 240)]
    height: u32,
    /// Number of moving objects in the synthetic scene.
    #[arg(long, default_value_t = 2)]
    objects: u32,
    /// Per-pixel noise amplitude for the synthetic scene.
    #[arg(long, default_value_t = 0)]
    noise: u8,
    /// Write the last overlay frame to this PNG on exit.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(path) = &args.config {
        std::env::set_var(wildlife_tracker::config::ENV_CONFIG, path);
    }
    let mut cfg = TrackerConfig::load()?;
    if let Some(strategy) = args.strategy {
        cfg.strategy = strategy;
    }
    cfg.validate()?;

    if cfg.capture.source != CaptureSource::Synthetic {
        log::warn!(
            "capture source {:?} needs an OS screen grabber, which this build does not include; \
             using the synthetic scene",
            cfg.capture.source
        );
    }
    if args.width == 0 || args.height == 0 {
        return Err(anyhow!("--width and --height must be >= 1"));
    }

    let grabber = SyntheticGrabber::new(SyntheticConfig {
        width: args.width,
        height: args.height,
        objects: args.objects,
        noise: args.noise,
        ..SyntheticConfig::default()
    });
    let source = Arc::new(ScreenCapture::new(grabber, &cfg.capture));

    let mut pipeline = Pipeline::new(cfg, source)?;
    pipeline.attach_observer(Arc::new(|event: &str, detections: &[Detection]| -> Result<()> {
        log::debug!("{}: {} object(s)", event, detections.len());
        Ok(())
    }));

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("error setting Ctrl-C handler")?;

    let overlays = pipeline.overlay_queue();
    let snapshots = pipeline.stats_queue();
    pipeline.start()?;
    log::info!("trackerd running; press Ctrl-C to stop");

    let deadline = args
        .seconds
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut last_overlay: Option<OverlayFrame> = None;

    while !shutdown.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        for overlay in overlays.try_iter() {
            last_overlay = Some(overlay);
        }
        for snapshot in snapshots.try_iter() {
            match serde_json::to_string(&snapshot) {
                Ok(line) => log::info!("stats {}", line),
                Err(e) => log::warn!("failed to encode stats: {}", e),
            }
        }
        std::thread::sleep(DRAIN_INTERVAL);
    }

    log::info!("shutdown requested, stopping pipeline...");
    pipeline.stop();

    if let Some(path) = &args.snapshot {
        match last_overlay {
            Some(overlay) => {
                overlay
                    .image
                    .save(path)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                log::info!(
                    "last overlay ({} detection(s)) written to {}",
                    overlay.detections.len(),
                    path.display()
                );
            }
            None => log::warn!("no overlay frame was produced; {} not written", path.display()),
        }
    }
    Ok(())
}
