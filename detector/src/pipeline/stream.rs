use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use motion_overlay_common::config::PipelineMode;
use motion_overlay_common::frame::RawFrameBuffer;
use tracing::debug;

use super::state::{FrameOutcome, FramePipeline, PipelineError};
use crate::sink::{MotionEvent, MotionEventSink, OverlaySink};

/// One video stream's motion pipeline wired to its overlay and event sink.
///
/// `on_frame` is the frame-delivery callback and may be called from any
/// thread. Calls are serialized on the pipeline lock, and the overlay is
/// updated under that lock, so rectangles reach the overlay in frame order.
/// Motion events are emitted after the lock is released.
pub struct StreamMonitor {
    id: String,
    pipeline: Mutex<FramePipeline>,
    overlay: Arc<dyn OverlaySink>,
    events: Option<Arc<dyn MotionEventSink>>,
}

impl StreamMonitor {
    pub fn new(
        id: impl Into<String>,
        pipeline: FramePipeline,
        overlay: Arc<dyn OverlaySink>,
        events: Option<Arc<dyn MotionEventSink>>,
    ) -> Self {
        Self {
            id: id.into(),
            pipeline: Mutex::new(pipeline),
            overlay,
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn on_frame(&self, buffer: &RawFrameBuffer<'_>) -> Result<FrameOutcome, PipelineError> {
        let outcome = {
            let mut pipeline = self.lock();
            let view = self.overlay.view_size();
            let outcome = pipeline.process(buffer, view)?;

            if let Some(rects) = &outcome.rects {
                debug!(
                    stream = self.id,
                    overlay = self.overlay.name(),
                    rects = rects.len(),
                    "updating overlay"
                );
                self.overlay.update_motion_rects(rects, view);
            }
            outcome
        };

        // Emitted outside the lock; ordering is recoverable from `seq`.
        if outcome.motion_detected {
            if let Some(events) = &self.events {
                events.motion_detected(&MotionEvent {
                    stream_id: self.id.clone(),
                    seq: outcome.seq,
                    changed_pixels: outcome.changed_pixels,
                    regions: outcome.boxes.len(),
                    observed_at: Utc::now(),
                });
            }
        }

        Ok(outcome)
    }

    /// The stream's video source went away. Clears any drawn rectangles and
    /// drops the retained frame; a frame already in flight finishes first.
    pub fn teardown(&self) {
        let mut pipeline = self.lock();
        pipeline.teardown();
        if pipeline.mode() == PipelineMode::Regions {
            self.overlay.update_motion_rects(&[], self.overlay.view_size());
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.lock().is_tracking()
    }

    /// `(processed, dropped)` frame counts.
    pub fn frame_counts(&self) -> (u64, u64) {
        let pipeline = self.lock();
        (pipeline.frames_processed(), pipeline.frames_dropped())
    }

    // A panic mid-frame cannot leave the state half-written: the retained
    // frame is swapped in with a single assignment.
    fn lock(&self) -> MutexGuard<'_, FramePipeline> {
        self.pipeline.lock().unwrap_or_else(|e| e.into_inner())
    }
}
