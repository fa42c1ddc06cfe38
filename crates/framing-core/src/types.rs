use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subject bounding box, as ratios of the frame dimensions.
///
/// Unlike pixel boxes this is center-anchored: `(cx, cy)` is the box center
/// and `width`/`height` are fractions of the frame width/height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub cx: f32,
    pub cy: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub const fn new(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self { cx, cy, width, height }
    }

    /// True when all four components lie in [0, 1].
    pub fn is_normalized(&self) -> bool {
        [self.cx, self.cy, self.width, self.height]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }
}

impl From<(f32, f32, f32, f32)> for BoundingBox {
    fn from((cx, cy, width, height): (f32, f32, f32, f32)) -> Self {
        Self::new(cx, cy, width, height)
    }
}

/// Head orientation estimate. Positive yaw = head turned toward the viewer's left.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeadPose {
    pub yaw: f32,
    pub pitch: f32,
    #[serde(default)]
    pub roll: f32,
}

/// Horizontal placement of the subject's upper body in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyPose {
    Left,
    Right,
    Center,
}

/// Per-frame output of the subject detector.
///
/// `bbox` is present exactly when `face_detected` is true. `head_pose` may be
/// absent even with a face (pose estimation failed).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub face_detected: bool,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    #[serde(default)]
    pub smile: bool,
    #[serde(default)]
    pub head_pose: Option<HeadPose>,
    #[serde(default)]
    pub body_pose: Option<BodyPose>,
}

impl DetectionRecord {
    /// Record for a frame with no face.
    pub fn no_face() -> Self {
        Self::default()
    }

    /// Record for a frame with a face at `bbox` and no other signals.
    pub fn face(bbox: BoundingBox) -> Self {
        Self {
            face_detected: true,
            bbox: Some(bbox),
            ..Self::default()
        }
    }

    pub fn with_smile(mut self, smile: bool) -> Self {
        self.smile = smile;
        self
    }

    pub fn with_head_pose(mut self, yaw: f32, pitch: f32) -> Self {
        self.head_pose = Some(HeadPose { yaw, pitch, roll: 0.0 });
        self
    }

    pub fn with_body_pose(mut self, pose: BodyPose) -> Self {
        self.body_pose = Some(pose);
        self
    }

    /// Check the face/bbox/head-pose invariants.
    pub fn validate(&self) -> Result<(), crate::detector::DetectorError> {
        use crate::detector::DetectorError;

        match (self.face_detected, &self.bbox) {
            (true, None) => {
                return Err(DetectorError::InvalidRecord(
                    "face detected without a bounding box".into(),
                ))
            }
            (false, Some(_)) => {
                return Err(DetectorError::InvalidRecord(
                    "bounding box present without a face".into(),
                ))
            }
            _ => {}
        }
        if !self.face_detected && self.head_pose.is_some() {
            return Err(DetectorError::InvalidRecord(
                "head pose present without a face".into(),
            ));
        }
        if let Some(bbox) = &self.bbox {
            if !bbox.is_normalized() {
                return Err(DetectorError::InvalidRecord(format!(
                    "bounding box not normalized: {bbox:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Ideal subject placement for the session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceComposition(pub BoundingBox);

impl ReferenceComposition {
    pub fn bbox(&self) -> &BoundingBox {
        &self.0
    }
}

impl Default for ReferenceComposition {
    fn default() -> Self {
        Self(BoundingBox::new(0.5, 0.5, 0.4, 0.6))
    }
}

/// Composition goal, used to judge subject distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetSize {
    FullBody,
    #[default]
    HalfBody,
    Portrait,
}

impl TargetSize {
    /// Target bbox height as a ratio of the frame height.
    pub fn height_ratio(self) -> f32 {
        match self {
            TargetSize::FullBody => 0.3,
            TargetSize::HalfBody => 0.5,
            TargetSize::Portrait => 0.7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TargetSize::FullBody => "full-body",
            TargetSize::HalfBody => "half-body",
            TargetSize::Portrait => "portrait",
        }
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown target size: {0} (expected full-body, half-body or portrait)")]
pub struct ParseTargetSizeError(pub String);

impl FromStr for TargetSize {
    type Err = ParseTargetSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "full-body" | "fullbody" => Ok(TargetSize::FullBody),
            "half-body" | "halfbody" => Ok(TargetSize::HalfBody),
            "portrait" => Ok(TargetSize::Portrait),
            _ => Err(ParseTargetSizeError(s.to_string())),
        }
    }
}
