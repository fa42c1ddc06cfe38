//! framing-core: Composition advice and capture-readiness decisions.
//!
//! Turns per-frame detection records into an advice line, a readiness flag,
//! and a throttled stream of spoken suggestions. Everything here is
//! synchronous and free of I/O.

pub mod advisory;
pub mod composition;
pub mod detector;
pub mod keywords;
pub mod summary;
pub mod throttle;
pub mod types;

pub use advisory::{generate_advice, Advice};
pub use composition::{compute_offset_advice, Direction, Nudge, GOOD_POSITION};
pub use detector::{DetectorError, SubjectDetector};
pub use keywords::{simplify_suggestion, KeywordMatcher, ReplyCommand, VoiceCommand};
pub use summary::status_summary;
pub use throttle::{
    has_significant_change, AdvisorySession, CaptureSource, CaptureTicket, GateDecision,
    SuggestionOutcome, SuggestionTicket, ThrottleConfig,
};
pub use types::{BodyPose, BoundingBox, DetectionRecord, HeadPose, ReferenceComposition, TargetSize};
