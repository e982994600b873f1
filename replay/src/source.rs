use chrono::Utc;
use motion_overlay_common::config::StreamConfig;
use motion_overlay_common::frame::RawFrameBuffer;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::ReplayError;

const FRAME_EXTENSIONS: &[&str] = &["y", "gray", "raw"];

/// One recorded luma plane, owned so it can cross the channel.
#[derive(Debug)]
pub struct SourceFrame {
    pub seq: u64,
    pub captured_at_ms: i64,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub data: Vec<u8>,
}

impl SourceFrame {
    /// Borrow as the buffer handed to a frame callback.
    pub fn as_buffer(&self) -> RawFrameBuffer<'_> {
        RawFrameBuffer::with_stride(self.width, self.height, self.stride, &self.data)
    }
}

/// Frame files in `dir`, in name order.
pub async fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, ReplayError> {
    let read_dir_err = |e| ReplayError::ReadDir(dir.display().to_string(), e);
    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_dir_err)?;

    let mut frames = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_dir_err)? {
        let path = entry.path();
        let is_frame = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext));
        if is_frame {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

/// Read every frame of `stream` and deliver it at the configured rate.
/// Stops early when the receiving side goes away. Returns frames sent.
pub async fn run_source(
    stream: StreamConfig,
    tx: mpsc::Sender<SourceFrame>,
) -> Result<u64, ReplayError> {
    let period = stream
        .frame_period()
        .ok_or_else(|| ReplayError::FrameRate(stream.id.clone(), stream.fps))?;
    let files = list_frames(&stream.frames_dir).await?;
    info!(
        stream = stream.id,
        dir = %stream.frames_dir.display(),
        frames = files.len(),
        fps = stream.fps,
        "starting frame source"
    );

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut sent: u64 = 0;
    for path in files {
        ticker.tick().await;

        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| ReplayError::ReadFrame(path.display().to_string(), e))?;
        debug!(stream = stream.id, seq = sent, bytes = data.len(), "read frame");

        let frame = SourceFrame {
            seq: sent,
            captured_at_ms: Utc::now().timestamp_millis(),
            width: stream.width,
            height: stream.height,
            stride: stream.stride(),
            data,
        };
        if tx.send(frame).await.is_err() {
            info!(stream = stream.id, sent, "receiver closed, stopping source");
            return Ok(sent);
        }
        sent += 1;
    }

    info!(stream = stream.id, sent, "frame source exhausted");
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(dir: &Path) -> StreamConfig {
        StreamConfig {
            id: "test".into(),
            frames_dir: dir.to_path_buf(),
            width: 4,
            height: 2,
            stride: Some(6),
            fps: 1000.0,
            mode: None,
            pixel_threshold: None,
            activity_threshold: None,
            min_region_area: None,
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("motion-overlay-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn frames_listed_in_name_order() {
        let dir = temp_dir("list");
        for name in ["0002.y", "0001.y", "notes.txt", "0003.gray"] {
            std::fs::write(dir.join(name), [0u8; 4]).unwrap();
        }

        let frames = list_frames(&dir).await.unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["0001.y", "0002.y", "0003.gray"]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn source_sends_every_frame_with_geometry() {
        let dir = temp_dir("send");
        std::fs::write(dir.join("a.y"), [1u8; 10]).unwrap();
        std::fs::write(dir.join("b.y"), [2u8; 10]).unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let sent = run_source(stream(&dir), tx).await.unwrap();
        assert_eq!(sent, 2);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.seq, 0);
        assert_eq!(first.as_buffer().stride, 6);
        assert_eq!(first.data, vec![1u8; 10]);
        assert_eq!(rx.recv().await.unwrap().seq, 1);
        assert!(rx.recv().await.is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn unrepresentable_frame_rate_is_an_error() {
        let dir = temp_dir("rate");
        for fps in [1e-20, 1e300] {
            let (tx, _rx) = mpsc::channel(1);
            let config = StreamConfig { fps, ..stream(&dir) };
            assert!(matches!(
                run_source(config, tx).await,
                Err(ReplayError::FrameRate(_, f)) if f == fps
            ));
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = std::env::temp_dir().join("motion-overlay-does-not-exist");
        assert!(matches!(
            list_frames(&dir).await,
            Err(ReplayError::ReadDir(..))
        ));
    }
}
