use motion_overlay_common::config::{DetectorConfig, PipelineMode};
use motion_overlay_common::frame::{convert, FrameError, GrayscaleImage, RawFrameBuffer};
use tracing::{debug, info, warn};

use crate::mapping::{map_to_view, MappedRect, MappingError, ViewSize};
use crate::motion::{align_to, extract, BoundingBox, DetectError, MotionDetector};

#[derive(Debug)]
pub enum PipelineState {
    /// No frame has been retained yet (stream start, or after teardown).
    Uninitialized,
    /// The last successfully processed frame is held for the next comparison.
    Tracking { previous: GrayscaleImage },
}

/// Everything one frame produced.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    /// Index of the frame within the stream, counting dropped frames.
    pub seq: u64,
    pub motion_detected: bool,
    pub changed_pixels: u64,
    /// Size of the coordinate frame `boxes` are expressed in.
    pub frame_size: (u32, u32),
    /// Empty in motion-only mode.
    pub boxes: Vec<BoundingBox>,
    /// `None` in motion-only mode; the overlay is not touched then.
    pub rects: Option<Vec<MappedRect>>,
}

/// Per-stream motion pipeline: convert, diff against the retained frame,
/// optionally extract and map regions, then retain the new frame.
///
/// A frame that fails at any stage is dropped without touching the
/// retained frame.
pub struct FramePipeline {
    state: PipelineState,
    detector: MotionDetector,
    min_region_area: u64,
    mode: PipelineMode,
    frames_processed: u64,
    frames_dropped: u64,
}

impl FramePipeline {
    pub fn new(config: &DetectorConfig, mode: PipelineMode) -> Self {
        Self {
            state: PipelineState::Uninitialized,
            detector: MotionDetector::new(config),
            min_region_area: config.min_region_area,
            mode,
            frames_processed: 0,
            frames_dropped: 0,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, PipelineState::Tracking { .. })
    }

    pub fn previous(&self) -> Option<&GrayscaleImage> {
        match &self.state {
            PipelineState::Tracking { previous } => Some(previous),
            PipelineState::Uninitialized => None,
        }
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Process one delivered frame. This is the main entry point.
    pub fn process(
        &mut self,
        buffer: &RawFrameBuffer<'_>,
        view: ViewSize,
    ) -> Result<FrameOutcome, PipelineError> {
        let seq = self.frames_processed + self.frames_dropped;

        let (outcome, current) = match self.evaluate(seq, buffer, view) {
            Ok(result) => result,
            Err(e) => {
                self.frames_dropped += 1;
                warn!(
                    seq,
                    error = %e,
                    dropped = self.frames_dropped,
                    "dropping frame, keeping previous"
                );
                return Err(e);
            }
        };

        let was_tracking = self.is_tracking();
        // Replaces (and frees) the old previous frame.
        self.state = PipelineState::Tracking { previous: current };
        self.frames_processed += 1;

        if !was_tracking {
            info!(
                seq,
                width = outcome.frame_size.0,
                height = outcome.frame_size.1,
                "UNINITIALIZED→TRACKING: retained first frame"
            );
        }
        if self.frames_processed % 100 == 0 {
            debug!(
                processed = self.frames_processed,
                dropped = self.frames_dropped,
                "frames processed"
            );
        }

        Ok(outcome)
    }

    fn evaluate(
        &self,
        seq: u64,
        buffer: &RawFrameBuffer<'_>,
        view: ViewSize,
    ) -> Result<(FrameOutcome, GrayscaleImage), PipelineError> {
        let current = convert(buffer)?;
        let previous = self.previous();

        // The retained frame fixes the coordinate frame for the stream.
        let current = match previous {
            Some(prev) => align_to(prev, current, self.detector.filter())?,
            None => current,
        };

        let detection = self.detector.detect(previous, &current)?;
        let frame_size = detection.mask.dimensions();

        let (boxes, rects) = match self.mode {
            PipelineMode::Motion => (Vec::new(), None),
            PipelineMode::Regions => {
                let boxes = extract(&detection.mask, self.min_region_area);
                let rects = map_to_view(&boxes, frame_size.0, frame_size.1, view.width, view.height)?;
                (boxes, Some(rects))
            }
        };

        debug!(
            seq,
            motion = detection.motion_detected,
            changed_pixels = detection.changed_pixels,
            regions = boxes.len(),
            "frame evaluated"
        );

        let outcome = FrameOutcome {
            seq,
            motion_detected: detection.motion_detected,
            changed_pixels: detection.changed_pixels,
            frame_size,
            boxes,
            rects,
        };
        Ok((outcome, current))
    }

    /// Stream ended: release the retained frame.
    pub fn teardown(&mut self) {
        if let PipelineState::Tracking { .. } =
            std::mem::replace(&mut self.state, PipelineState::Uninitialized)
        {
            info!(
                processed = self.frames_processed,
                dropped = self.frames_dropped,
                "TRACKING→UNINITIALIZED: released previous frame"
            );
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Detect(#[from] DetectError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEW: ViewSize = ViewSize {
        width: 200,
        height: 400,
    };

    fn config(min_region_area: u64) -> DetectorConfig {
        DetectorConfig {
            pixel_threshold: 35,
            activity_threshold: 500,
            min_region_area,
            ..DetectorConfig::default()
        }
    }

    fn frame_with_block(w: u32, h: u32, block: Option<(u32, u32, u32)>) -> Vec<u8> {
        let mut data = vec![0u8; (w * h) as usize];
        if let Some((bx, by, size)) = block {
            for y in by..by + size {
                for x in bx..bx + size {
                    data[(y * w + x) as usize] = 255;
                }
            }
        }
        data
    }

    #[test]
    fn first_frame_starts_tracking_without_motion() {
        let mut pipeline = FramePipeline::new(&config(100), PipelineMode::Regions);
        assert!(!pipeline.is_tracking());

        let data = frame_with_block(50, 50, Some((0, 0, 40)));
        let outcome = pipeline.process(&RawFrameBuffer::new(50, 50, &data), VIEW).unwrap();

        assert!(!outcome.motion_detected);
        assert!(outcome.boxes.is_empty());
        assert_eq!(outcome.rects, Some(vec![]));
        assert!(pipeline.is_tracking());
        assert_eq!(pipeline.previous().unwrap().as_raw(), &data);
    }

    #[test]
    fn motion_between_frames_yields_mapped_region() {
        let mut pipeline = FramePipeline::new(&config(100), PipelineMode::Regions);
        let blank = frame_with_block(100, 100, None);
        let moved = frame_with_block(100, 100, Some((10, 10, 30)));

        pipeline.process(&RawFrameBuffer::new(100, 100, &blank), VIEW).unwrap();
        let outcome = pipeline.process(&RawFrameBuffer::new(100, 100, &moved), VIEW).unwrap();

        assert!(outcome.motion_detected);
        assert_eq!(outcome.seq, 1);
        assert_eq!(outcome.boxes, vec![BoundingBox::new(10, 10, 30, 30)]);
        assert_eq!(
            outcome.rects,
            Some(vec![MappedRect {
                left: 120,
                top: 40,
                right: 180,
                bottom: 160
            }])
        );
    }

    #[test]
    fn motion_mode_skips_regions() {
        let mut pipeline = FramePipeline::new(&config(100), PipelineMode::Motion);
        let blank = frame_with_block(100, 100, None);
        let moved = frame_with_block(100, 100, Some((10, 10, 30)));

        pipeline.process(&RawFrameBuffer::new(100, 100, &blank), VIEW).unwrap();
        let outcome = pipeline.process(&RawFrameBuffer::new(100, 100, &moved), VIEW).unwrap();

        assert!(outcome.motion_detected);
        assert_eq!(outcome.changed_pixels, 900);
        assert!(outcome.boxes.is_empty());
        assert!(outcome.rects.is_none());
    }

    #[test]
    fn bad_frame_keeps_previous() {
        let mut pipeline = FramePipeline::new(&config(100), PipelineMode::Regions);
        let first = frame_with_block(20, 20, Some((2, 2, 5)));
        pipeline.process(&RawFrameBuffer::new(20, 20, &first), VIEW).unwrap();

        let err = pipeline
            .process(&RawFrameBuffer::new(20, 20, &first[..100]), VIEW)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Frame(_)));
        assert_eq!(pipeline.previous().unwrap().as_raw(), &first);
        assert_eq!(pipeline.frames_processed(), 1);
        assert_eq!(pipeline.frames_dropped(), 1);

        // Dropped frames still advance the sequence.
        let outcome = pipeline.process(&RawFrameBuffer::new(20, 20, &first), VIEW).unwrap();
        assert_eq!(outcome.seq, 2);
        assert!(!outcome.motion_detected);
    }

    #[test]
    fn resized_stream_keeps_original_coordinates() {
        let mut pipeline = FramePipeline::new(&config(0), PipelineMode::Regions);
        let small = frame_with_block(40, 40, None);
        pipeline.process(&RawFrameBuffer::new(40, 40, &small), VIEW).unwrap();

        let large = frame_with_block(80, 80, None);
        let outcome = pipeline.process(&RawFrameBuffer::new(80, 80, &large), VIEW).unwrap();

        assert_eq!(outcome.frame_size, (40, 40));
        assert_eq!(pipeline.previous().unwrap().dimensions(), (40, 40));
    }

    #[test]
    fn teardown_returns_to_uninitialized() {
        let mut pipeline = FramePipeline::new(&config(100), PipelineMode::Regions);
        let blank = frame_with_block(100, 100, None);
        let moved = frame_with_block(100, 100, Some((10, 10, 30)));

        pipeline.process(&RawFrameBuffer::new(100, 100, &blank), VIEW).unwrap();
        pipeline.teardown();
        assert!(matches!(pipeline.state(), PipelineState::Uninitialized));

        // The next frame is treated as the first of a new stream.
        let outcome = pipeline.process(&RawFrameBuffer::new(100, 100, &moved), VIEW).unwrap();
        assert!(!outcome.motion_detected);
        assert!(pipeline.is_tracking());
    }
}
