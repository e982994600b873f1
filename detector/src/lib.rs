//! Frame-differencing motion detection for live video streams, with
//! region extraction and mapping onto a mirrored, rotated overlay.

pub mod mapping;
pub mod motion;
pub mod pipeline;
pub mod sink;

pub use mapping::{map_to_view, MappedRect, MappingError, ViewSize};
pub use motion::{extract, BoundingBox, DetectError, DetectionResult, DifferenceMask, MotionDetector};
pub use pipeline::{FrameOutcome, FramePipeline, PipelineError, PipelineState, StreamMonitor, StreamRegistry};
pub use sink::{JsonLinesSink, MotionEvent, MotionEventSink, OverlaySink, OverlayState, TracingEventSink};
