mod source;

use motion_overlay_common::config::Config;
use motion_overlay_detector::{
    JsonLinesSink, MotionEventSink, OverlayState, StreamMonitor, StreamRegistry, TracingEventSink,
    ViewSize,
};
use source::SourceFrame;
use std::fs::OpenOptions;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Frames buffered between a source and its pipeline before the source waits.
const FRAME_QUEUE_DEPTH: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("failed to read frame directory {0}: {1}")]
    ReadDir(String, std::io::Error),
    #[error("failed to read frame {0}: {1}")]
    ReadFrame(String, std::io::Error),
    #[error("stream {0} fps {1} has no representable frame period")]
    FrameRate(String, f64),
    #[error("failed to open events file {0}: {1}")]
    EventsFile(String, std::io::Error),
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        streams = config.streams.len(),
        mode = ?config.pipeline.mode,
        pixel_threshold = config.detector.pixel_threshold,
        activity_threshold = config.detector.activity_threshold,
        min_region_area = config.detector.min_region_area,
        view_width = config.overlay.view_width,
        view_height = config.overlay.view_height,
        "starting motion-overlay replay"
    );

    if config.streams.is_empty() {
        error!("no [[streams]] configured, nothing to replay");
        std::process::exit(1);
    }

    let events = match open_event_sink(&config) {
        Ok(sink) => sink,
        Err(e) => {
            error!(error = %e, "failed to set up motion event sink");
            std::process::exit(1);
        }
    };

    let registry = Arc::new(StreamRegistry::new());
    let view = ViewSize::new(config.overlay.view_width, config.overlay.view_height);
    let mut handles = Vec::new();

    for stream in &config.streams {
        let overlay = Arc::new(OverlayState::new(view));
        let monitor = registry.attach(
            &stream.id,
            &config.detector_for(stream),
            config.mode_for(stream),
            overlay.clone(),
            Some(Arc::clone(&events)),
        );

        let (tx, rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let source_stream = stream.clone();
        handles.push(tokio::spawn(async move {
            let id = source_stream.id.clone();
            if let Err(e) = source::run_source(source_stream, tx).await {
                error!(stream = id, error = %e, "frame source failed");
            }
        }));
        handles.push(tokio::spawn(run_monitor_loop(monitor, overlay, rx)));
    }

    let all_done = async {
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "replay task panicked");
            }
        }
    };

    tokio::select! {
        _ = all_done => info!("all frame sources exhausted"),
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    registry.teardown_all();
    events.flush();
    info!("replay finished");
}

fn open_event_sink(config: &Config) -> Result<Arc<dyn MotionEventSink>, ReplayError> {
    match &config.telemetry.events_path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| ReplayError::EventsFile(path.display().to_string(), e))?;
            info!(path = %path.display(), "writing motion events as JSON lines");
            Ok(Arc::new(JsonLinesSink::new(BufWriter::new(file))))
        }
        None => Ok(Arc::new(TracingEventSink)),
    }
}

/// Deliver frames to one stream's pipeline in arrival order.
async fn run_monitor_loop(
    monitor: Arc<StreamMonitor>,
    overlay: Arc<OverlayState>,
    mut rx: mpsc::Receiver<SourceFrame>,
) {
    while let Some(frame) = rx.recv().await {
        match monitor.on_frame(&frame.as_buffer()) {
            Ok(outcome) => {
                if outcome.motion_detected {
                    debug!(
                        stream = monitor.id(),
                        seq = frame.seq,
                        captured_at_ms = frame.captured_at_ms,
                        rects = ?overlay.snapshot().rects,
                        "overlay updated"
                    );
                }
            }
            Err(e) => {
                debug!(stream = monitor.id(), seq = frame.seq, error = %e, "frame dropped");
            }
        }
    }

    let (processed, dropped) = monitor.frame_counts();
    info!(stream = monitor.id(), processed, dropped, "stream ended");
}
