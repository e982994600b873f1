use image::imageops::FilterType;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Frame sources for the replay harness; the detector library ignores these.
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
}

/// Thresholds shared by the motion detector and region extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DetectorConfig {
    /// A pixel is "changed" when `|prev - curr| > pixel_threshold`.
    #[serde(default = "default_pixel_threshold")]
    pub pixel_threshold: u8,
    /// Motion is reported when more than this many pixels changed.
    #[serde(default = "default_activity_threshold")]
    pub activity_threshold: u64,
    /// Regions whose bounding box area is `<=` this are discarded.
    #[serde(default = "default_min_region_area")]
    pub min_region_area: u64,
    #[serde(default)]
    pub resize_filter: ResizeFilter,
}

impl DetectorConfig {
    /// Cutoffs used by the overlay (bounding box) call site.
    pub fn regions_preset() -> Self {
        Self {
            pixel_threshold: 35,
            activity_threshold: 5000,
            min_region_area: 5000,
            resize_filter: ResizeFilter::Triangle,
        }
    }

    /// Cutoffs used by the boolean activity call site.
    pub fn activity_preset() -> Self {
        Self {
            pixel_threshold: 25,
            ..Self::regions_preset()
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::regions_preset()
    }
}

/// Interpolation used when a frame has to be resized to the retained
/// previous frame's dimensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// What a stream's consumer wants out of each frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// Bounding boxes, mapped to overlay coordinates.
    #[default]
    Regions,
    /// Only the global motion flag.
    Motion,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub mode: PipelineMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_view_width")]
    pub view_width: u32,
    #[serde(default = "default_view_height")]
    pub view_height: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            view_width: default_view_width(),
            view_height: default_view_height(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    /// Motion events are appended here as JSON lines when set.
    #[serde(default)]
    pub events_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub id: String,
    pub frames_dir: PathBuf,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub stride: Option<u32>,
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default)]
    pub mode: Option<PipelineMode>,
    #[serde(default)]
    pub pixel_threshold: Option<u8>,
    #[serde(default)]
    pub activity_threshold: Option<u64>,
    #[serde(default)]
    pub min_region_area: Option<u64>,
}

impl StreamConfig {
    pub fn stride(&self) -> u32 {
        self.stride.unwrap_or(self.width)
    }

    /// Time between frames, if `fps` maps to a non-zero `Duration`.
    pub fn frame_period(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(1.0 / self.fps)
            .ok()
            .filter(|p| !p.is_zero())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.overlay.view_width == 0 || self.overlay.view_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "overlay view must be non-empty, got {}x{}",
                self.overlay.view_width, self.overlay.view_height
            )));
        }

        let mut seen = HashSet::new();
        for stream in &self.streams {
            if !seen.insert(stream.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate stream id {:?}",
                    stream.id
                )));
            }
            if stream.width == 0 || stream.height == 0 {
                return Err(ConfigError::Invalid(format!(
                    "stream {:?} has empty frame size {}x{}",
                    stream.id, stream.width, stream.height
                )));
            }
            if stream.stride() < stream.width {
                return Err(ConfigError::Invalid(format!(
                    "stream {:?} stride {} is smaller than width {}",
                    stream.id,
                    stream.stride(),
                    stream.width
                )));
            }
            if !(stream.fps > 0.0 && stream.fps.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "stream {:?} fps must be positive, got {}",
                    stream.id, stream.fps
                )));
            }
            if stream.frame_period().is_none() {
                return Err(ConfigError::Invalid(format!(
                    "stream {:?} fps {} gives no usable frame period",
                    stream.id, stream.fps
                )));
            }
        }
        Ok(())
    }

    /// Detector settings for `stream`, with its overrides applied on top of
    /// `[detector]`.
    pub fn detector_for(&self, stream: &StreamConfig) -> DetectorConfig {
        DetectorConfig {
            pixel_threshold: stream
                .pixel_threshold
                .unwrap_or(self.detector.pixel_threshold),
            activity_threshold: stream
                .activity_threshold
                .unwrap_or(self.detector.activity_threshold),
            min_region_area: stream
                .min_region_area
                .unwrap_or(self.detector.min_region_area),
            resize_filter: self.detector.resize_filter,
        }
    }

    pub fn mode_for(&self, stream: &StreamConfig) -> PipelineMode {
        stream.mode.unwrap_or(self.pipeline.mode)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_pixel_threshold() -> u8 {
    35
}
fn default_activity_threshold() -> u64 {
    5000
}
fn default_min_region_area() -> u64 {
    5000
}
fn default_view_width() -> u32 {
    1080
}
fn default_view_height() -> u32 {
    1920
}
fn default_fps() -> f64 {
    30.0
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.detector, DetectorConfig::regions_preset());
        assert_eq!(config.pipeline.mode, PipelineMode::Regions);
        assert_eq!(config.overlay.view_width, 1080);
        assert_eq!(config.logging.level, "info");
        assert!(config.telemetry.events_path.is_none());
        assert!(config.streams.is_empty());
    }

    #[test]
    fn stream_overrides_apply_on_top_of_detector() {
        let config = Config::parse(
            r#"
            [detector]
            pixel_threshold = 30
            resize_filter = "nearest"

            [pipeline]
            mode = "motion"

            [[streams]]
            id = "local"
            frames_dir = "frames/local"
            width = 800
            height = 800

            [[streams]]
            id = "remote"
            frames_dir = "frames/remote"
            width = 640
            height = 480
            stride = 704
            mode = "regions"
            pixel_threshold = 25
            min_region_area = 900
            "#,
        )
        .unwrap();

        let local = &config.streams[0];
        assert_eq!(local.stride(), 800);
        assert_eq!(config.mode_for(local), PipelineMode::Motion);
        assert_eq!(config.detector_for(local).pixel_threshold, 30);

        let remote = &config.streams[1];
        assert_eq!(remote.stride(), 704);
        assert_eq!(config.mode_for(remote), PipelineMode::Regions);
        let detector = config.detector_for(remote);
        assert_eq!(detector.pixel_threshold, 25);
        assert_eq!(detector.activity_threshold, 5000);
        assert_eq!(detector.min_region_area, 900);
        assert_eq!(detector.resize_filter, ResizeFilter::Nearest);
    }

    #[test]
    fn activity_preset_uses_lower_cutoff() {
        let preset = DetectorConfig::activity_preset();
        assert_eq!(preset.pixel_threshold, 25);
        assert_eq!(preset.activity_threshold, 5000);
    }

    #[test]
    fn unknown_mode_is_a_parse_error() {
        let err = Config::parse("[pipeline]\nmode = \"boxes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_view_rejected() {
        let err = Config::parse("[overlay]\nview_width = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn duplicate_stream_ids_rejected() {
        let stream = "[[streams]]\nid = \"a\"\nframes_dir = \"f\"\nwidth = 4\nheight = 4\n";
        let err = Config::parse(&format!("{stream}{stream}")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn fps_without_frame_period_rejected() {
        let stream = "[[streams]]\nid = \"a\"\nframes_dir = \"f\"\nwidth = 4\nheight = 4\n";
        for fps in ["1e-20", "1e300"] {
            let err = Config::parse(&format!("{stream}fps = {fps}\n")).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("frame period")));
        }
        let ok = Config::parse(&format!("{stream}fps = 0.5\n")).unwrap();
        assert_eq!(ok.streams[0].frame_period(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn narrow_stride_rejected() {
        let err = Config::parse(
            "[[streams]]\nid = \"a\"\nframes_dir = \"f\"\nwidth = 8\nheight = 4\nstride = 4\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
