use std::io::Write;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::mapping::{MappedRect, ViewSize};

/// The surface that draws motion rectangles over a video view.
///
/// Implementations own the drawing; the pipeline only hands over the
/// rectangles for the current frame.
pub trait OverlaySink: Send + Sync {
    /// Current pixel size of the view, read once per frame.
    fn view_size(&self) -> ViewSize;

    /// Replace the drawn rectangles with `rects` and schedule a redraw.
    fn update_motion_rects(&self, rects: &[MappedRect], view: ViewSize);

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "overlay"
    }
}

/// Optional receiver of "motion detected" notifications.
pub trait MotionEventSink: Send + Sync {
    fn motion_detected(&self, event: &MotionEvent);

    /// Push out anything buffered. Called once when streams are torn down.
    fn flush(&self) {}
}

#[derive(Debug, Clone, Serialize)]
pub struct MotionEvent {
    pub stream_id: String,
    /// Index of the frame within the stream, counting from 0.
    pub seq: u64,
    pub changed_pixels: u64,
    /// Regions that survived the area filter; 0 in motion-only mode.
    pub regions: usize,
    pub observed_at: DateTime<Utc>,
}

/// In-memory overlay: keeps the last rectangle set and counts redraw requests.
#[derive(Debug)]
pub struct OverlayState {
    view: ViewSize,
    inner: Mutex<OverlaySnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlaySnapshot {
    pub rects: Vec<MappedRect>,
    pub view: ViewSize,
    pub redraws: u64,
}

impl OverlayState {
    pub fn new(view: ViewSize) -> Self {
        Self {
            view,
            inner: Mutex::new(OverlaySnapshot::default()),
        }
    }

    pub fn snapshot(&self) -> OverlaySnapshot {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl OverlaySink for OverlayState {
    fn view_size(&self) -> ViewSize {
        self.view
    }

    fn update_motion_rects(&self, rects: &[MappedRect], view: ViewSize) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.rects = rects.to_vec();
        inner.view = view;
        inner.redraws += 1;
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// Reports motion events as structured log lines.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl MotionEventSink for TracingEventSink {
    fn motion_detected(&self, event: &MotionEvent) {
        info!(
            stream = event.stream_id,
            seq = event.seq,
            changed_pixels = event.changed_pixels,
            regions = event.regions,
            "motion detected"
        );
    }
}

/// Writes one JSON object per motion event. Output is only flushed on
/// [`MotionEventSink::flush`], so wrap files in a `BufWriter`.
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> MotionEventSink for JsonLinesSink<W> {
    fn motion_detected(&self, event: &MotionEvent) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = write_line(&mut *out, event) {
            warn!(error = %e, stream = event.stream_id, "failed to write motion event");
        }
    }

    fn flush(&self) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = out.flush() {
            warn!(error = %e, "failed to flush motion events");
        }
    }
}

fn write_line<W: Write>(out: &mut W, event: &MotionEvent) -> std::io::Result<()> {
    serde_json::to_writer(&mut *out, event)?;
    out.write_all(b"\n")
}
