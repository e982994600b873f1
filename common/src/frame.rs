use image::GrayImage;

/// Dense 8-bit luma image, one sample per pixel, `width * height` bytes.
pub type GrayscaleImage = GrayImage;

/// A borrowed luma plane handed over by the video source for the duration of
/// one frame callback.
///
/// Layout:
///   row `r` starts at byte `r * stride`; its first `width` bytes are samples,
///   anything after that up to `stride` is padding. The last row only needs
///   `width` bytes, so the plane must hold at least
///   `stride * (height - 1) + width` bytes. Chroma planes, if the producer
///   has them, are never looked at.
#[derive(Debug, Clone, Copy)]
pub struct RawFrameBuffer<'a> {
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of two consecutive rows (>= `width`).
    pub stride: u32,
    pub data_y: &'a [u8],
}

impl<'a> RawFrameBuffer<'a> {
    /// Tightly packed plane (`stride == width`).
    pub fn new(width: u32, height: u32, data_y: &'a [u8]) -> Self {
        Self {
            width,
            height,
            stride: width,
            data_y,
        }
    }

    pub fn with_stride(width: u32, height: u32, stride: u32, data_y: &'a [u8]) -> Self {
        Self {
            width,
            height,
            stride,
            data_y,
        }
    }

    /// Minimum number of luma bytes this geometry needs, or `None` if it
    /// does not fit in `usize`.
    pub fn required_len(&self) -> Option<usize> {
        if self.height == 0 {
            return Some(0);
        }
        (self.stride as usize)
            .checked_mul(self.height as usize - 1)?
            .checked_add(self.width as usize)
    }

    fn validate(&self) -> Result<usize, FrameError> {
        let invalid = |reason: &'static str, expected: usize| FrameError::InvalidFrameFormat {
            reason,
            width: self.width,
            height: self.height,
            stride: self.stride,
            got: self.data_y.len(),
            expected,
        };

        if self.width == 0 || self.height == 0 {
            return Err(invalid("zero dimension", 0));
        }
        if self.stride < self.width {
            return Err(invalid("stride smaller than width", 0));
        }
        let expected = self
            .required_len()
            .ok_or_else(|| invalid("plane size overflows", usize::MAX))?;
        if self.data_y.len() < expected {
            return Err(invalid("luma plane too short", expected));
        }
        Ok(expected)
    }
}

/// Copy the luma plane of `buffer` into a dense grayscale image, dropping any
/// per-row padding.
pub fn convert(buffer: &RawFrameBuffer<'_>) -> Result<GrayscaleImage, FrameError> {
    buffer.validate()?;

    let width = buffer.width as usize;
    let height = buffer.height as usize;
    let stride = buffer.stride as usize;

    let mut dense = Vec::with_capacity(width * height);
    if stride == width {
        dense.extend_from_slice(&buffer.data_y[..width * height]);
    } else {
        for row in buffer.data_y.chunks(stride).take(height) {
            dense.extend_from_slice(&row[..width]);
        }
    }

    GrayImage::from_raw(buffer.width, buffer.height, dense).ok_or(FrameError::InvalidFrameFormat {
        reason: "dense copy has wrong length",
        width: buffer.width,
        height: buffer.height,
        stride: buffer.stride,
        got: buffer.data_y.len(),
        expected: width * height,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(
        "invalid frame format ({reason}): {width}x{height} stride {stride}, \
         luma plane has {got} bytes, need {expected}"
    )]
    InvalidFrameFormat {
        reason: &'static str,
        width: u32,
        height: u32,
        stride: u32,
        got: usize,
        expected: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_plane_copied_verbatim() {
        let data: Vec<u8> = (0..12).collect();
        let img = convert(&RawFrameBuffer::new(4, 3, &data)).unwrap();
        assert_eq!(img.dimensions(), (4, 3));
        assert_eq!(img.as_raw(), &data);
    }

    #[test]
    fn stride_padding_is_dropped() {
        // 3x2 image with 2 bytes of padding per row; last row unpadded.
        let data = [1, 2, 3, 0xEE, 0xEE, 4, 5, 6];
        let img = convert(&RawFrameBuffer::with_stride(3, 2, 5, &data)).unwrap();
        assert_eq!(img.as_raw(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(img.get_pixel(2, 1).0[0], 6);
    }

    #[test]
    fn trailing_chroma_is_ignored() {
        // Y plane followed by (fake) interleaved UV bytes.
        let mut data = vec![7u8; 4 * 4];
        data.extend_from_slice(&[0x80; 8]);
        let img = convert(&RawFrameBuffer::new(4, 4, &data)).unwrap();
        assert_eq!(img.as_raw().len(), 16);
        assert!(img.pixels().all(|p| p.0[0] == 7));
    }

    #[test]
    fn undersized_plane_rejected() {
        let data = [0u8; 10];
        let err = convert(&RawFrameBuffer::new(4, 3, &data)).unwrap_err();
        match err {
            FrameError::InvalidFrameFormat { got, expected, .. } => {
                assert_eq!(got, 10);
                assert_eq!(expected, 12);
            }
        }
    }

    #[test]
    fn padded_plane_needs_full_stride_except_last_row() {
        let buf = RawFrameBuffer::with_stride(3, 3, 8, &[0u8; 18]);
        assert_eq!(buf.required_len(), Some(19));
        assert!(convert(&buf).is_err());
        assert!(convert(&RawFrameBuffer::with_stride(3, 3, 8, &[0u8; 19])).is_ok());
    }

    #[test]
    fn stride_smaller_than_width_rejected() {
        let data = [0u8; 64];
        assert!(convert(&RawFrameBuffer::with_stride(8, 2, 4, &data)).is_err());
    }

    #[test]
    fn zero_dimension_rejected() {
        assert!(convert(&RawFrameBuffer::new(0, 4, &[])).is_err());
        assert!(convert(&RawFrameBuffer::new(4, 0, &[0; 4])).is_err());
    }
}
