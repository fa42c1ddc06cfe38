//! Subject detector seam.
//!
//! The computer-vision detector lives outside this crate; the agent only
//! needs one [`DetectionRecord`] per frame.

use crate::types::DetectionRecord;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detection failed: {0}")]
    DetectionFailed(String),
    #[error("invalid detection record: {0}")]
    InvalidRecord(String),
    #[error("detector source exhausted")]
    Exhausted,
}

/// Produces a detection record for a single frame.
///
/// Called once per frame on the frame path, so implementations must not block
/// on I/O and must not mutate the frame.
pub trait SubjectDetector {
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32)
        -> Result<DetectionRecord, DetectorError>;
}

/// Run `detector` and check the record invariants before handing it on.
pub fn detect_checked<D: SubjectDetector + ?Sized>(
    detector: &mut D,
    pixels: &[u8],
    width: u32,
    height: u32,
) -> Result<DetectionRecord, DetectorError> {
    let record = detector.detect(pixels, width, height)?;
    record.validate()?;
    Ok(record)
}
