//! Frame type handed from the video source to the detector and capture sink.

/// Pixel layout of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// 8-bit grayscale (1 byte/pixel).
    Gray8,
    /// Packed 8-bit RGB (3 bytes/pixel).
    Rgb8,
}

impl PixelLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::Gray8 => 1,
            PixelLayout::Rgb8 => 3,
        }
    }
}

/// A captured camera frame.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub sequence: u32,
}

impl Frame {
    /// Wrap a raw buffer, checking its length against the dimensions.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        layout: PixelLayout,
        sequence: u32,
    ) -> Result<Self, FrameError> {
        let expected = expected_len(width, height, layout);
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            layout,
            sequence,
        })
    }

    /// Uniform mid-gray frame, used when frames are synthesised (replay).
    pub fn blank(width: u32, height: u32, sequence: u32) -> Self {
        Self {
            data: vec![128; expected_len(width, height, PixelLayout::Gray8)],
            width,
            height,
            layout: PixelLayout::Gray8,
            sequence,
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layout", &self.layout)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

fn expected_len(width: u32, height: u32, layout: PixelLayout) -> usize {
    width as usize * height as usize * layout.bytes_per_pixel()
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
