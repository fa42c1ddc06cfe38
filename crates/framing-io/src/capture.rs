//! Photo capture sink: encodes a frame and writes it to the photo directory.

use crate::frame::{Frame, PixelLayout};
use image::{GrayImage, ImageFormat, RgbImage};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Collision suffixes tried before giving up on a timestamped name.
const MAX_NAME_ATTEMPTS: u32 = 100;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to create photo directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("frame buffer does not match {width}x{height} {layout:?}")]
    InvalidFrame {
        width: u32,
        height: u32,
        layout: PixelLayout,
    },
    #[error("no free file name in {0}")]
    NameExhausted(PathBuf),
    #[error("encode failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Where captured photos go.
pub trait CaptureSink: Send + Sync {
    fn capture_and_save(&self, frame: &Frame) -> Result<PathBuf, CaptureError>;
}

/// Output encoding for saved photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhotoFormat {
    #[default]
    Jpeg,
    Png,
}

impl PhotoFormat {
    pub fn extension(self) -> &'static str {
        match self {
            PhotoFormat::Jpeg => "jpg",
            PhotoFormat::Png => "png",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            PhotoFormat::Jpeg => ImageFormat::Jpeg,
            PhotoFormat::Png => ImageFormat::Png,
        }
    }
}

impl FromStr for PhotoFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(PhotoFormat::Jpeg),
            "png" => Ok(PhotoFormat::Png),
            other => Err(format!("unsupported photo format: {other}")),
        }
    }
}

/// Saves photos as `photo_YYYYmmdd_HHMMSS.<ext>` in a directory.
pub struct DirectoryCapturer {
    dir: PathBuf,
    format: PhotoFormat,
}

impl DirectoryCapturer {
    /// Create the capturer, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>, format: PhotoFormat) -> Result<Self, CaptureError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| CaptureError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        tracing::info!(dir = %dir.display(), format = format.extension(), "photo directory ready");
        Ok(Self { dir, format })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Next unused timestamped path. Photos within the same second get a
    /// numeric suffix.
    fn next_path(&self) -> Result<PathBuf, CaptureError> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let ext = self.format.extension();
        for n in 0..MAX_NAME_ATTEMPTS {
            let name = if n == 0 {
                format!("photo_{stamp}.{ext}")
            } else {
                format!("photo_{stamp}_{n}.{ext}")
            };
            let path = self.dir.join(name);
            if !path.exists() {
                return Ok(path);
            }
        }
        Err(CaptureError::NameExhausted(self.dir.clone()))
    }
}

impl CaptureSink for DirectoryCapturer {
    fn capture_and_save(&self, frame: &Frame) -> Result<PathBuf, CaptureError> {
        let invalid = || CaptureError::InvalidFrame {
            width: frame.width,
            height: frame.height,
            layout: frame.layout,
        };
        let path = self.next_path()?;
        let format = self.format.image_format();

        match frame.layout {
            PixelLayout::Gray8 => GrayImage::from_raw(frame.width, frame.height, frame.data.clone())
                .ok_or_else(invalid)?
                .save_with_format(&path, format)?,
            PixelLayout::Rgb8 => RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
                .ok_or_else(invalid)?
                .save_with_format(&path, format)?,
        }

        tracing::debug!(path = %path.display(), seq = frame.sequence, "frame encoded");
        Ok(path)
    }
}
