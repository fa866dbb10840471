use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::Parser;

use proctor_core::detection::domain::detection::Detection;
use proctor_core::detection::domain::face_detector::FaceDetector;
use proctor_core::detection::infrastructure::detector_loader::{
    yolo_factory, DetectorFactory, DetectorLoader, InitializationError,
};
use proctor_core::detection::infrastructure::model_resolver::ModelSource;
use proctor_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use proctor_core::monitoring::domain::monitor_listener::{LogMonitorListener, MonitorListener};
use proctor_core::monitoring::domain::monitor_snapshot::{LifecycleState, MonitorSnapshot};
use proctor_core::monitoring::domain::violation_tracker::{ViolationEvent, ViolationKind};
use proctor_core::monitoring::monitor_config::MonitorConfig;
use proctor_core::monitoring::monitor_controller::MonitorHandle;
use proctor_core::shared::constants::{FACE_MODEL_NAME, FACE_MODEL_URL, VIDEO_EXTENSIONS};
use proctor_core::video::infrastructure::ffmpeg_video_source::FfmpegVideoSource;

/// Replays a recorded exam session through the proctoring monitor.
#[derive(Parser)]
#[command(name = "proctor")]
struct Cli {
    /// Recorded session video.
    input: PathBuf,

    /// Monitor config file (default: user config dir).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Milliseconds between sampled frames.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Milliseconds between readiness checks.
    #[arg(long)]
    readiness_poll_ms: Option<u64>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Local face model; skips the cache and download.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Playback speed relative to real time.
    #[arg(long, default_value = "1.0")]
    playback_rate: f64,

    /// Emit violations and the final report as JSON lines on stdout.
    #[arg(long)]
    json: bool,

    /// Write the effective config to the user config dir and exit.
    #[arg(long)]
    save_config: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    if cli.save_config {
        config.save()?;
        if let Some(path) = MonitorConfig::default_path() {
            log::info!("Config written to {}", path.display());
        }
        return Ok(());
    }
    validate(&cli)?;

    let source = FfmpegVideoSource::open(&cli.input)?.with_playback_rate(cli.playback_rate);
    let loader = DetectorLoader::new(build_factory(&cli, config.confidence));
    let listener = CliListener {
        json: cli.json,
        log: LogMonitorListener,
    };

    let mut handle = MonitorHandle::spawn(Box::new(source), loader, Box::new(listener), config);
    handle.start();

    let finished = loop {
        if let Some(snapshot) = handle.wait_for(is_finished, Duration::from_secs(1)) {
            break snapshot;
        }
    };
    handle.shutdown();

    if let Some(error) = finished.error.as_ref() {
        if finished.lifecycle != LifecycleState::Stopped {
            return Err(error.clone().into());
        }
        log::warn!("{error}");
    }

    let snapshot = handle.snapshot();
    if cli.json {
        println!("{}", serde_json::to_string(&snapshot)?);
    } else {
        eprintln!("{}", summary_string(&snapshot));
    }
    Ok(())
}

fn is_finished(snapshot: &MonitorSnapshot) -> bool {
    snapshot.lifecycle == LifecycleState::Stopped || snapshot.error.is_some()
}

fn build_config(cli: &Cli) -> Result<MonitorConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => MonitorConfig::load_from(path)?,
        None => MonitorConfig::load().unwrap_or_else(|e| {
            log::warn!("Ignoring user config: {e}");
            MonitorConfig::default()
        }),
    };
    if let Some(ms) = cli.interval_ms {
        config.sample_interval_ms = ms;
    }
    if let Some(ms) = cli.readiness_poll_ms {
        config.readiness_poll_ms = ms;
    }
    if let Some(confidence) = cli.confidence {
        config.confidence = confidence;
    }
    config.validate()?;
    Ok(config)
}

fn build_factory(cli: &Cli, confidence: f64) -> DetectorFactory {
    match &cli.model {
        Some(path) => {
            let path = path.clone();
            Box::new(move || {
                let detector = OnnxYoloDetector::new(&path, confidence)
                    .map_err(|e| InitializationError::Runtime(e.to_string()))?;
                Ok(Box::new(detector) as Box<dyn FaceDetector>)
            })
        }
        None => {
            log::info!("Resolving model: {FACE_MODEL_NAME}");
            yolo_factory(
                ModelSource::new(FACE_MODEL_NAME, FACE_MODEL_URL),
                confidence,
                Some(Box::new(download_progress)),
            )
        }
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input file not found: {}", cli.input.display()).into());
    }
    if !is_video(&cli.input) {
        return Err(format!(
            "Unsupported input '{}', expected one of: {}",
            cli.input.display(),
            VIDEO_EXTENSIONS.join(", ")
        )
        .into());
    }
    if cli.playback_rate <= 0.0 {
        return Err(format!(
            "Playback rate must be positive, got {}",
            cli.playback_rate
        )
        .into());
    }
    if let Some(model) = &cli.model {
        if !model.exists() {
            return Err(format!("Model file not found: {}", model.display()).into());
        }
    }
    Ok(())
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Prints violations as they happen; everything else goes to the log.
struct CliListener {
    json: bool,
    log: LogMonitorListener,
}

impl MonitorListener for CliListener {
    fn on_violation(&mut self, event: &ViolationEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => log::error!("Failed to serialize violation: {e}"),
            }
        } else {
            println!(
                "[{:>7.1}s] {}",
                event.timestamp_ms as f64 / 1000.0,
                event.description
            );
        }
    }

    fn on_detection_result(&mut self, detections: &[Detection]) {
        self.log.on_detection_result(detections);
    }

    fn on_snapshot(&mut self, snapshot: &MonitorSnapshot) {
        self.log.on_snapshot(snapshot);
    }
}

fn summary_string(snapshot: &MonitorSnapshot) -> String {
    let mut lines = vec![format!(
        "Session summary ({} ticks, {} skipped, {} detection errors):",
        snapshot.ticks, snapshot.skipped_ticks, snapshot.detection_errors
    )];
    for kind in ViolationKind::ALL {
        lines.push(format!(
            "  {:24}: {}",
            kind.description(),
            snapshot.counts.get(kind)
        ));
    }
    lines.push(format!("  Total violations: {}", snapshot.violation_count));
    if snapshot.suspicious_activity {
        lines.push("  Suspicious activity flagged".to_string());
    }
    lines.join("\n")
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
