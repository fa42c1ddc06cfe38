//! Advisory aggregator: one ordered advice string and a readiness flag per frame.

use crate::composition::{offset_nudges, render_nudges, Nudge, GOOD_POSITION};
use crate::types::{BodyPose, DetectionRecord, ReferenceComposition, TargetSize};
use serde::Serialize;

pub const NO_FACE: &str = "No face detected, please face the camera";
pub const PLEASE_SMILE: &str = "Please smile";

/// Dead-zone for head yaw/pitch, in pose units.
pub const HEAD_POSE_THRESHOLD: f32 = 0.08;

/// Advice for a single frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advice {
    pub text: String,
    /// Position is good and the subject is smiling.
    pub capture_ready: bool,
    /// Positional corrections behind `text`, empty when none or no face.
    pub nudges: Vec<Nudge>,
}

impl Advice {
    fn no_face() -> Self {
        Self {
            text: NO_FACE.to_string(),
            capture_ready: false,
            nudges: Vec::new(),
        }
    }

    pub fn into_parts(self) -> (String, bool) {
        (self.text, self.capture_ready)
    }
}

/// Combine position, smile, head and body checks into one advice line.
///
/// Readiness depends on position and smile only; head and body advice is
/// informational.
pub fn generate_advice(
    detection: &DetectionRecord,
    reference: &ReferenceComposition,
    target: TargetSize,
) -> Advice {
    let bbox = match (detection.face_detected, detection.bbox.as_ref()) {
        (true, Some(bbox)) => bbox,
        _ => return Advice::no_face(),
    };

    let nudges = offset_nudges(reference, bbox, target);
    let position_ok = nudges.is_empty();
    let mut advice: Vec<String> = Vec::new();

    if !position_ok {
        advice.push(render_nudges(&nudges));
    }

    if !detection.smile {
        advice.push(PLEASE_SMILE.to_string());
    }

    if let Some(pose) = &detection.head_pose {
        if pose.yaw > HEAD_POSE_THRESHOLD {
            advice.push("Turn your head left".to_string());
        } else if pose.yaw < -HEAD_POSE_THRESHOLD {
            advice.push("Turn your head right".to_string());
        }

        if pose.pitch > HEAD_POSE_THRESHOLD {
            advice.push("Lower your head".to_string());
        } else if pose.pitch < -HEAD_POSE_THRESHOLD {
            advice.push("Raise your head".to_string());
        }
    }

    match detection.body_pose {
        Some(BodyPose::Left) => advice.push("Turn your body right".to_string()),
        Some(BodyPose::Right) => advice.push("Turn your body left".to_string()),
        Some(BodyPose::Center) | None => {}
    }

    if advice.is_empty() {
        advice.push(GOOD_POSITION.to_string());
    }

    Advice {
        text: advice.join(", "),
        capture_ready: position_ok && detection.smile,
        nudges,
    }
}
