use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use motion_overlay_common::config::DetectorConfig;
use motion_overlay_common::frame::GrayscaleImage;
use tracing::debug;

const MASK_ON: u8 = 255;

/// Binary change mask: every sample is either 0 or 255.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferenceMask(GrayImage);

impl DifferenceMask {
    /// All-zero mask of the given size.
    pub fn empty(width: u32, height: u32) -> Self {
        Self(GrayImage::new(width, height))
    }

    /// Build a mask from an arbitrary image, treating any non-zero sample as set.
    pub fn from_image(image: &GrayImage) -> Self {
        let mut mask = image.clone();
        for p in mask.pixels_mut() {
            if p.0[0] != 0 {
                p.0[0] = MASK_ON;
            }
        }
        Self(mask)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y).0[0] != 0
    }

    pub fn count_nonzero(&self) -> u64 {
        self.0.as_raw().iter().filter(|&&v| v != 0).count() as u64
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub motion_detected: bool,
    /// Number of set pixels in `mask`.
    pub changed_pixels: u64,
    pub mask: DifferenceMask,
}

/// Frame-differencing motion detector.
///
/// Stateless: the caller owns the previous frame. Each call computes
/// `|previous - current|`, thresholds it into a 0/255 mask and raises the
/// motion flag when the number of changed pixels exceeds
/// `activity_threshold`.
#[derive(Debug, Clone)]
pub struct MotionDetector {
    pixel_threshold: u8,
    activity_threshold: u64,
    filter: FilterType,
}

impl MotionDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            pixel_threshold: config.pixel_threshold,
            activity_threshold: config.activity_threshold,
            filter: config.resize_filter.into(),
        }
    }

    pub fn filter(&self) -> FilterType {
        self.filter
    }

    /// Compare `current` against `previous`.
    ///
    /// - No previous frame: no motion, all-zero mask the size of `current`.
    /// - Different sizes: `current` is resized to `previous`'s size first,
    ///   so the mask is always in the previous frame's coordinates.
    pub fn detect(
        &self,
        previous: Option<&GrayscaleImage>,
        current: &GrayscaleImage,
    ) -> Result<DetectionResult, DetectError> {
        let Some(previous) = previous else {
            debug!(
                width = current.width(),
                height = current.height(),
                "no previous frame, reporting no motion"
            );
            return Ok(DetectionResult {
                motion_detected: false,
                changed_pixels: 0,
                mask: DifferenceMask::empty(current.width(), current.height()),
            });
        };

        let resized;
        let current = if previous.dimensions() != current.dimensions() {
            resized = resize_to(previous.dimensions(), current, self.filter)?;
            &resized
        } else {
            current
        };

        let mask = self.threshold_diff(previous, current);
        let changed_pixels = mask.count_nonzero();
        let motion_detected = changed_pixels > self.activity_threshold;

        debug!(
            changed_pixels,
            activity_threshold = self.activity_threshold,
            pixel_threshold = self.pixel_threshold,
            motion_detected,
            "frame difference"
        );

        Ok(DetectionResult {
            motion_detected,
            changed_pixels,
            mask,
        })
    }

    fn threshold_diff(&self, previous: &GrayImage, current: &GrayImage) -> DifferenceMask {
        let cutoff = self.pixel_threshold;
        // `current` has already been brought to `previous`'s size.
        DifferenceMask(GrayImage::from_fn(previous.width(), previous.height(), |x, y| {
            let a = previous.get_pixel(x, y).0[0];
            let b = current.get_pixel(x, y).0[0];
            Luma([if a.abs_diff(b) > cutoff { MASK_ON } else { 0 }])
        }))
    }
}

/// Bring `current` to `reference`'s dimensions, passing it through untouched
/// when they already match.
pub fn align_to(
    reference: &GrayscaleImage,
    current: GrayscaleImage,
    filter: FilterType,
) -> Result<GrayscaleImage, DetectError> {
    if reference.dimensions() == current.dimensions() {
        return Ok(current);
    }
    resize_to(reference.dimensions(), &current, filter)
}

fn resize_to(
    (width, height): (u32, u32),
    image: &GrayImage,
    filter: FilterType,
) -> Result<GrayImage, DetectError> {
    if width == 0 || height == 0 || image.width() == 0 || image.height() == 0 {
        return Err(DetectError::DimensionMismatch {
            prev_width: width,
            prev_height: height,
            width: image.width(),
            height: image.height(),
        });
    }
    debug!(
        from_width = image.width(),
        from_height = image.height(),
        to_width = width,
        to_height = height,
        "resizing frame to match previous"
    );
    Ok(imageops::resize(image, width, height, filter))
}

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error(
        "cannot reconcile frame sizes: previous {prev_width}x{prev_height}, \
         current {width}x{height}"
    )]
    DimensionMismatch {
        prev_width: u32,
        prev_height: u32,
        width: u32,
        height: u32,
    },
}
