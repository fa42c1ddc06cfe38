//! Detector that plays back recorded detection records.
//!
//! The input is JSON lines, one [`DetectionRecord`] per frame. Blank lines are
//! skipped; a line that does not parse is reported as a detection failure for
//! that frame and playback continues with the next line.

use framing_core::{DetectionRecord, DetectorError, SubjectDetector};
use std::path::Path;

pub struct ReplayDetector {
    lines: std::vec::IntoIter<(usize, String)>,
}

impl ReplayDetector {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let detector = Self::from_text(&text);
        tracing::info!(path = %path.display(), records = detector.remaining(), "replay loaded");
        Ok(detector)
    }

    pub fn from_text(text: &str) -> Self {
        let lines: Vec<(usize, String)> = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| (i + 1, line.to_string()))
            .collect();
        Self {
            lines: lines.into_iter(),
        }
    }

    /// Records not yet played.
    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl SubjectDetector for ReplayDetector {
    fn detect(
        &mut self,
        _pixels: &[u8],
        _width: u32,
        _height: u32,
    ) -> Result<DetectionRecord, DetectorError> {
        let (line_no, line) = self.lines.next().ok_or(DetectorError::Exhausted)?;
        serde_json::from_str(&line)
            .map_err(|e| DetectorError::DetectionFailed(format!("line {line_no}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framing_core::detector::detect_checked;
    use framing_core::BodyPose;

    const RECORDING: &str = r#"
{"face_detected": true, "bbox": {"cx": 0.5, "cy": 0.5, "width": 0.4, "height": 0.6}, "smile": true, "body_pose": "center"}

{"face_detected": false}
not json
{"face_detected": true}
"#;

    #[test]
    fn test_plays_records_in_order() {
        let mut detector = ReplayDetector::from_text(RECORDING);
        assert_eq!(detector.remaining(), 4);

        let first = detector.detect(&[], 0, 0).unwrap();
        assert!(first.face_detected && first.smile);
        assert_eq!(first.body_pose, Some(BodyPose::Center));

        let second = detector.detect(&[], 0, 0).unwrap();
        assert!(!second.face_detected);
    }

    #[test]
    fn test_bad_line_fails_one_frame() {
        let mut detector = ReplayDetector::from_text(RECORDING);
        detector.detect(&[], 0, 0).unwrap();
        detector.detect(&[], 0, 0).unwrap();

        let err = detector.detect(&[], 0, 0).unwrap_err();
        assert!(matches!(err, DetectorError::DetectionFailed(ref msg) if msg.starts_with("line 5")));

        // Parses, but a face without a box is rejected by validation.
        assert!(matches!(
            detect_checked(&mut detector, &[], 0, 0),
            Err(DetectorError::InvalidRecord(_))
        ));
        assert!(matches!(detector.detect(&[], 0, 0), Err(DetectorError::Exhausted)));
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ReplayDetector::open(&dir.path().join("missing.jsonl")).is_err());
    }
}
