//! Composition advisor: compares the subject box against the reference
//! composition and the target size.

use crate::types::{BoundingBox, ReferenceComposition, TargetSize};
use serde::Serialize;

// --- Named constants (no magic numbers) ---
pub const X_THRESHOLD: f32 = 0.20;
pub const Y_THRESHOLD: f32 = 0.36;
pub const SIZE_TOLERANCE: f32 = 0.15;

/// Returned when no correction is needed. Compared by equality downstream.
pub const GOOD_POSITION: &str = "Good position, hold";

/// A single positional correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Nudge {
    Left,
    Right,
    Back,
    Closer,
    FillFrame,
    ShrinkFrame,
}

/// Direction a nudge is spoken as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Left,
    Right,
    Back,
    Closer,
}

impl Nudge {
    pub fn message(self) -> &'static str {
        match self {
            Nudge::Left => "Move left",
            Nudge::Right => "Move right",
            Nudge::Back => "Move back",
            Nudge::Closer => "Move closer",
            Nudge::FillFrame => "Move closer to fill the frame",
            Nudge::ShrinkFrame => "Move back to adjust size",
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Nudge::Left => Direction::Left,
            Nudge::Right => Direction::Right,
            Nudge::Back | Nudge::ShrinkFrame => Direction::Back,
            Nudge::Closer | Nudge::FillFrame => Direction::Closer,
        }
    }
}

impl Direction {
    /// Speaking priority when several directions apply at once.
    pub const PRIORITY: [Direction; 4] = [
        Direction::Back,
        Direction::Closer,
        Direction::Left,
        Direction::Right,
    ];

    pub fn spoken(self) -> &'static str {
        match self {
            Direction::Left => "Please move left",
            Direction::Right => "Please move right",
            Direction::Back => "Please move back",
            Direction::Closer => "Please move closer",
        }
    }
}

/// Evaluate the horizontal, vertical and size checks, in that order.
///
/// All three checks run independently; an empty result means the subject is
/// where the reference wants them.
pub fn offset_nudges(
    reference: &ReferenceComposition,
    current: &BoundingBox,
    target: TargetSize,
) -> Vec<Nudge> {
    let reference = reference.bbox();
    let mut nudges = Vec::with_capacity(3);

    // Image coordinates: a subject right of the reference must move left.
    let x_offset = current.cx - reference.cx;
    if x_offset.abs() > X_THRESHOLD {
        nudges.push(if x_offset > 0.0 { Nudge::Left } else { Nudge::Right });
    }

    let y_offset = current.cy - reference.cy;
    if y_offset.abs() > Y_THRESHOLD {
        nudges.push(if y_offset > 0.0 { Nudge::Back } else { Nudge::Closer });
    }

    let target_ratio = target.height_ratio();
    if (current.height - target_ratio).abs() > SIZE_TOLERANCE {
        nudges.push(if current.height < target_ratio {
            Nudge::FillFrame
        } else {
            Nudge::ShrinkFrame
        });
    }

    nudges
}

/// Render nudges as the comma-separated advice string.
pub fn render_nudges(nudges: &[Nudge]) -> String {
    if nudges.is_empty() {
        return GOOD_POSITION.to_string();
    }
    nudges
        .iter()
        .map(|n| n.message())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Positional advice for a detected face, or [`GOOD_POSITION`].
pub fn compute_offset_advice(
    reference: &ReferenceComposition,
    current: &BoundingBox,
    target: TargetSize,
) -> String {
    render_nudges(&offset_nudges(reference, current, target))
}
