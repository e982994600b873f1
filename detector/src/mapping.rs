use serde::Serialize;

use crate::motion::BoundingBox;

/// Pixel size of the overlay surface the rectangles are drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ViewSize {
    pub width: u32,
    pub height: u32,
}

impl ViewSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Rectangle in overlay pixels, edges truncated toward zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MappedRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl MappedRect {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Map source-frame boxes onto the overlay.
///
/// The sensor is rotated 90 degrees relative to the display: a box's
/// vertical extent (scaled by `view_width / frame_height`) becomes the
/// horizontal extent on screen, its horizontal extent (scaled by
/// `view_height / frame_width`) becomes the vertical one. The result is then
/// mirrored about the view's vertical centre line. Degenerate rectangles
/// are passed through.
pub fn map_to_view(
    boxes: &[BoundingBox],
    frame_width: u32,
    frame_height: u32,
    view_width: u32,
    view_height: u32,
) -> Result<Vec<MappedRect>, MappingError> {
    if frame_width == 0 || frame_height == 0 {
        return Err(MappingError::DegenerateFrameDimensions {
            width: frame_width,
            height: frame_height,
        });
    }

    let fw = frame_width as f64;
    let fh = frame_height as f64;
    let vw = view_width as f64;
    let vh = view_height as f64;

    Ok(boxes
        .iter()
        .map(|b| {
            let unmirrored_left = b.y as f64 * vw / fh;
            let unmirrored_right = b.bottom() as f64 * vw / fh;
            let top = b.x as f64 * vh / fw;
            let bottom = b.right() as f64 * vh / fw;

            MappedRect {
                left: (vw - unmirrored_right) as i32,
                top: top as i32,
                right: (vw - unmirrored_left) as i32,
                bottom: bottom as i32,
            }
        })
        .collect())
}

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("cannot map from a {width}x{height} frame")]
    DegenerateFrameDimensions { width: u32, height: u32 },
}
