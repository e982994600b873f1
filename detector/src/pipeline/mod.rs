pub mod registry;
pub mod state;
pub mod stream;

pub use registry::StreamRegistry;
pub use state::{FrameOutcome, FramePipeline, PipelineError, PipelineState};
pub use stream::StreamMonitor;
