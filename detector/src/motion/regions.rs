use imageproc::contours::{find_contours, BorderType, Contour};
use serde::Serialize;
use tracing::debug;

use super::detect::DifferenceMask;

/// Axis-aligned rectangle in source-frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    fn enclosing(contour: &Contour<u32>) -> Option<Self> {
        let first = contour.points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &contour.points {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
    }
}

/// Bounding boxes of the outermost changed regions in `mask`.
///
/// Regions are traced as 8-connected outer borders. A region nested inside
/// a hole of another region is not reported on its own, only borders with
/// no enclosing parent are kept. Boxes with `area() <= min_area` are
/// dropped. Results come back in raster order of each region's first pixel.
pub fn extract(mask: &DifferenceMask, min_area: u64) -> Vec<BoundingBox> {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let contours = find_contours::<u32>(mask.as_image());
    let mut boxes = Vec::new();
    let mut nested = 0usize;
    let mut too_small = 0usize;

    for contour in &contours {
        if !matches!(contour.border_type, BorderType::Outer) {
            continue;
        }
        if contour.parent.is_some() {
            nested += 1;
            continue;
        }
        let Some(bbox) = BoundingBox::enclosing(contour) else {
            continue;
        };
        if bbox.area() > min_area {
            boxes.push(bbox);
        } else {
            too_small += 1;
        }
    }

    debug!(
        contours = contours.len(),
        regions = boxes.len(),
        nested,
        too_small,
        min_area,
        "extracted motion regions"
    );
    boxes
}
