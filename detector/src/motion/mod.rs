pub mod detect;
pub mod regions;

pub use detect::{align_to, DetectError, DetectionResult, DifferenceMask, MotionDetector};
pub use regions::{extract, BoundingBox};
