//! Status summary handed to the remote suggestion service.

use crate::advisory::HEAD_POSE_THRESHOLD;
use crate::types::{BodyPose, DetectionRecord};

const LOW_BAND: f32 = 0.4;
const HIGH_BAND: f32 = 0.6;

/// Describe a detection in plain words, e.g.
/// `"face detected, not smiling, body leaning left, positioned left, vertically centered"`.
pub fn status_summary(detection: &DetectionRecord) -> String {
    let mut parts: Vec<&str> = Vec::new();

    parts.push(if detection.face_detected {
        "face detected"
    } else {
        "no face detected"
    });
    parts.push(if detection.smile { "smiling" } else { "not smiling" });

    match detection.body_pose {
        Some(BodyPose::Left) => parts.push("body leaning left"),
        Some(BodyPose::Right) => parts.push("body leaning right"),
        Some(BodyPose::Center) => parts.push("body centered"),
        None => {}
    }

    if let Some(pose) = &detection.head_pose {
        if pose.yaw.abs() > HEAD_POSE_THRESHOLD {
            parts.push(if pose.yaw > 0.0 {
                "head turned left"
            } else {
                "head turned right"
            });
        }
        if pose.pitch.abs() > HEAD_POSE_THRESHOLD {
            parts.push(if pose.pitch > 0.0 {
                "head tilted down"
            } else {
                "head tilted up"
            });
        }
    }

    if let Some(bbox) = &detection.bbox {
        parts.push(if bbox.cx < LOW_BAND {
            "positioned left"
        } else if bbox.cx > HIGH_BAND {
            "positioned right"
        } else {
            "horizontally centered"
        });
        parts.push(if bbox.cy < LOW_BAND {
            "positioned high"
        } else if bbox.cy > HIGH_BAND {
            "positioned low"
        } else {
            "vertically centered"
        });
    }

    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    #[test]
    fn test_summary_no_face() {
        assert_eq!(
            status_summary(&DetectionRecord::no_face()),
            "no face detected, not smiling"
        );
    }

    #[test]
    fn test_summary_full_record() {
        let detection = DetectionRecord::face(BoundingBox::new(0.3, 0.5, 0.4, 0.6))
            .with_head_pose(0.1, 0.05)
            .with_body_pose(BodyPose::Left);
        assert_eq!(
            status_summary(&detection),
            "face detected, not smiling, body leaning left, head turned left, positioned left, vertically centered"
        );
    }

    #[test]
    fn test_summary_quadrants() {
        let detection = DetectionRecord::face(BoundingBox::new(0.7, 0.2, 0.4, 0.6)).with_smile(true);
        assert_eq!(
            status_summary(&detection),
            "face detected, smiling, positioned right, positioned high"
        );

        let detection = DetectionRecord::face(BoundingBox::new(0.5, 0.8, 0.4, 0.6))
            .with_smile(true)
            .with_head_pose(-0.2, -0.2)
            .with_body_pose(BodyPose::Center);
        assert_eq!(
            status_summary(&detection),
            "face detected, smiling, body centered, head turned right, head tilted up, horizontally centered, positioned low"
        );
    }
}
