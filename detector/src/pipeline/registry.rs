use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use motion_overlay_common::config::{DetectorConfig, PipelineMode};
use tracing::info;

use super::state::FramePipeline;
use super::stream::StreamMonitor;
use crate::sink::{MotionEventSink, OverlaySink};

/// Independent monitors for every video stream currently being watched
/// (the local camera plus any subscribed remote streams).
#[derive(Default)]
pub struct StreamRegistry {
    streams: Mutex<HashMap<String, Arc<StreamMonitor>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching a stream. An existing monitor under the same id is
    /// torn down and replaced.
    pub fn attach(
        &self,
        id: &str,
        config: &DetectorConfig,
        mode: PipelineMode,
        overlay: Arc<dyn OverlaySink>,
        events: Option<Arc<dyn MotionEventSink>>,
    ) -> Arc<StreamMonitor> {
        let monitor = Arc::new(StreamMonitor::new(
            id,
            FramePipeline::new(config, mode),
            overlay,
            events,
        ));

        let replaced = self.lock().insert(id.to_string(), Arc::clone(&monitor));
        if let Some(old) = replaced {
            old.teardown();
        }

        info!(
            stream = id,
            pixel_threshold = config.pixel_threshold,
            activity_threshold = config.activity_threshold,
            min_region_area = config.min_region_area,
            ?mode,
            "attached motion pipeline"
        );
        monitor
    }

    pub fn get(&self, id: &str) -> Option<Arc<StreamMonitor>> {
        self.lock().get(id).cloned()
    }

    /// Stop watching a stream. Returns `false` if it was not attached.
    pub fn detach(&self, id: &str) -> bool {
        let removed = self.lock().remove(id);
        match removed {
            Some(monitor) => {
                monitor.teardown();
                info!(stream = id, "detached motion pipeline");
                true
            }
            None => false,
        }
    }

    /// Tear down every stream, e.g. when the hosting view is destroyed.
    pub fn teardown_all(&self) {
        let drained: Vec<_> = self.lock().drain().collect();
        for (id, monitor) in &drained {
            monitor.teardown();
            let (processed, dropped) = monitor.frame_counts();
            info!(stream = id, processed, dropped, "stream torn down");
        }
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<StreamMonitor>>> {
        self.streams.lock().unwrap_or_else(|e| e.into_inner())
    }
}
