//! Notification throttle and capture-readiness gate.
//!
//! [`AdvisorySession`] owns every counter that survives across frames. Time is
//! always passed in by the caller so the session can be driven by synthetic
//! timestamps.

use crate::composition::{Direction, Nudge};
use crate::types::DetectionRecord;
use std::collections::HashMap;
use std::time::{Duration, Instant};

// --- Named constants (no magic numbers) ---
pub const STABLE_FRAMES: u32 = 3;
pub const MAX_PHOTOS_PER_SESSION: u32 = 3;
pub const PROMPT_INTERVAL: Duration = Duration::from_secs(15);
pub const NUDGE_INTERVAL: Duration = Duration::from_secs(4);
pub const HEAD_CHANGE_THRESHOLD: f32 = 0.1;

/// Tunables for the throttle and the readiness gate.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleConfig {
    /// Consecutive ready frames before an automatic capture.
    pub stable_frames: u32,
    pub max_photos_per_session: u32,
    /// Minimum time between high-level suggestion requests.
    pub prompt_interval: Duration,
    /// Minimum time between two spoken nudges in the same direction.
    pub nudge_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            stable_frames: STABLE_FRAMES,
            max_photos_per_session: MAX_PHOTOS_PER_SESSION,
            prompt_interval: PROMPT_INTERVAL,
            nudge_interval: NUDGE_INTERVAL,
        }
    }
}

/// True when `current` differs enough from `last` to justify a new suggestion.
///
/// Head pose is compared only when both records carry one.
pub fn has_significant_change(current: &DetectionRecord, last: Option<&DetectionRecord>) -> bool {
    let Some(last) = last else {
        return true;
    };

    if current.face_detected != last.face_detected
        || current.smile != last.smile
        || current.body_pose != last.body_pose
    {
        return true;
    }

    match (&current.head_pose, &last.head_pose) {
        (Some(cur), Some(prev)) => {
            (cur.yaw - prev.yaw).abs() > HEAD_CHANGE_THRESHOLD
                || (cur.pitch - prev.pitch).abs() > HEAD_CHANGE_THRESHOLD
        }
        _ => false,
    }
}

/// What triggered a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// Readiness held for the configured number of frames.
    Stability,
    /// A remote suggestion contained a ready keyword.
    Keyword,
    /// The user asked for a photo.
    Manual,
}

/// Permission to run one capture. Must be handed back via
/// [`AdvisorySession::finish_capture`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTicket {
    generation: u64,
    pub source: CaptureSource,
}

/// Result of feeding one frame's readiness to the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Not ready; counter reset and latch re-armed.
    Idle,
    /// Ready, waiting for more stable frames.
    Counting(u32),
    /// Fire the capture now.
    Capture(CaptureTicket),
    /// Ready, but a capture already fired for this pose or is still running.
    Latched,
    /// Photo bound reached or session stopped.
    SessionFull,
}

/// Permission to run one remote request. Only one exists at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionTicket {
    generation: u64,
    /// Detection the request was built from; `None` for conversation turns.
    detection: Option<DetectionRecord>,
}

/// What to do with a completed suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionOutcome {
    /// New text: speak it.
    Emit(String),
    /// Same as the last emitted prompt.
    Duplicate,
    /// The service failed or returned nothing usable.
    Failed,
    /// The session ended or restarted while the request was in flight.
    Discarded,
}

/// Snapshot of the session counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub photo_count: u32,
    pub stable_frame_count: u32,
    pub photo_taken: bool,
    pub capture_in_progress: bool,
    pub suggestion_in_flight: bool,
}

/// Per-direction debounce for spoken positional nudges.
#[derive(Debug, Clone)]
pub struct NudgeLimiter {
    interval: Duration,
    last_spoken: HashMap<Direction, Instant>,
}

impl NudgeLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_spoken: HashMap::new(),
        }
    }

    /// Pick the highest-priority direction in `nudges` whose window has
    /// elapsed, and start a new window for it.
    pub fn next(&mut self, nudges: &[Nudge], now: Instant) -> Option<Direction> {
        let direction = Direction::PRIORITY.into_iter().find(|dir| {
            nudges.iter().any(|n| n.direction() == *dir) && self.is_open(*dir, now)
        })?;
        self.last_spoken.insert(direction, now);
        Some(direction)
    }

    fn is_open(&self, direction: Direction, now: Instant) -> bool {
        self.last_spoken
            .get(&direction)
            .map_or(true, |last| now.saturating_duration_since(*last) >= self.interval)
    }

    pub fn clear(&mut self) {
        self.last_spoken.clear();
    }
}

/// Cross-frame state of one capture session.
#[derive(Debug, Clone)]
pub struct AdvisorySession {
    config: ThrottleConfig,
    last_detection: Option<DetectionRecord>,
    last_emitted_prompt: Option<String>,
    last_emission_time: Option<Instant>,
    stable_frame_count: u32,
    photo_taken: bool,
    photo_count: u32,
    capture_in_progress: bool,
    suggestion_in_flight: bool,
    stopped: bool,
    /// Bumped on every reset/stop; tickets from older generations are stale.
    generation: u64,
    nudges: NudgeLimiter,
}

impl AdvisorySession {
    pub fn new(config: ThrottleConfig) -> Self {
        let nudges = NudgeLimiter::new(config.nudge_interval);
        Self {
            config,
            last_detection: None,
            last_emitted_prompt: None,
            last_emission_time: None,
            stable_frame_count: 0,
            photo_taken: false,
            photo_count: 0,
            capture_in_progress: false,
            suggestion_in_flight: false,
            stopped: false,
            generation: 0,
            nudges,
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    pub fn photo_count(&self) -> u32 {
        self.photo_count
    }

    pub fn photo_taken(&self) -> bool {
        self.photo_taken
    }

    pub fn stable_frame_count(&self) -> u32 {
        self.stable_frame_count
    }

    pub fn capture_in_progress(&self) -> bool {
        self.capture_in_progress
    }

    pub fn last_emitted_prompt(&self) -> Option<&str> {
        self.last_emitted_prompt.as_deref()
    }

    /// Photo bound reached or session stopped; the frame loop should end.
    pub fn is_complete(&self) -> bool {
        self.stopped || self.photo_count >= self.config.max_photos_per_session
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            photo_count: self.photo_count,
            stable_frame_count: self.stable_frame_count,
            photo_taken: self.photo_taken,
            capture_in_progress: self.capture_in_progress,
            suggestion_in_flight: self.suggestion_in_flight,
        }
    }

    /// Reset every counter and invalidate outstanding tickets.
    pub fn start_new_session(&mut self) {
        self.generation += 1;
        self.last_detection = None;
        self.last_emitted_prompt = None;
        self.last_emission_time = None;
        self.stable_frame_count = 0;
        self.photo_taken = false;
        self.photo_count = 0;
        self.capture_in_progress = false;
        self.suggestion_in_flight = false;
        self.stopped = false;
        self.nudges.clear();
        tracing::info!(generation = self.generation, "new capture session");
    }

    /// End the session. Results of in-flight work are discarded.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.stopped = true;
        self.suggestion_in_flight = false;
        self.capture_in_progress = false;
    }

    fn is_current(&self, generation: u64) -> bool {
        !self.stopped && generation == self.generation
    }

    fn has_room(&self) -> bool {
        !self.is_complete() && !self.capture_in_progress
    }

    fn issue_capture(&mut self, source: CaptureSource) -> CaptureTicket {
        self.stable_frame_count = 0;
        self.photo_taken = true;
        self.capture_in_progress = true;
        tracing::debug!(?source, photo_count = self.photo_count, "capture armed");
        CaptureTicket {
            generation: self.generation,
            source,
        }
    }

    /// Feed one frame's readiness to the stability gate.
    pub fn observe_readiness(&mut self, capture_ready: bool) -> GateDecision {
        if !capture_ready {
            if self.photo_taken {
                tracing::debug!("readiness lost, capture re-armed");
            }
            self.photo_taken = false;
            self.stable_frame_count = 0;
            return GateDecision::Idle;
        }

        if self.is_complete() {
            self.stable_frame_count = 0;
            return GateDecision::SessionFull;
        }

        if self.photo_taken || self.capture_in_progress {
            self.stable_frame_count = 0;
            return GateDecision::Latched;
        }

        self.stable_frame_count += 1;
        if self.stable_frame_count >= self.config.stable_frames {
            return GateDecision::Capture(self.issue_capture(CaptureSource::Stability));
        }
        GateDecision::Counting(self.stable_frame_count)
    }

    /// Capture requested by a ready keyword. Bypasses the stability counter
    /// but honours the latch and the photo bound.
    pub fn request_keyword_capture(&mut self) -> Option<CaptureTicket> {
        if self.photo_taken || !self.has_room() {
            return None;
        }
        Some(self.issue_capture(CaptureSource::Keyword))
    }

    /// Capture requested explicitly by the user. Honours only the photo bound.
    pub fn request_manual_capture(&mut self) -> Option<CaptureTicket> {
        if !self.has_room() {
            return None;
        }
        Some(self.issue_capture(CaptureSource::Manual))
    }

    /// Complete a capture. Returns true when the photo was counted.
    ///
    /// A failed capture leaves the latch as it is.
    pub fn finish_capture(&mut self, ticket: CaptureTicket, saved: bool) -> bool {
        if !self.is_current(ticket.generation) {
            tracing::debug!(?ticket, "discarding capture from a finished session");
            return false;
        }
        self.capture_in_progress = false;
        if saved && self.photo_count < self.config.max_photos_per_session {
            self.photo_count += 1;
            return true;
        }
        false
    }

    /// True when the capture's session is still live.
    pub fn capture_is_current(&self, ticket: &CaptureTicket) -> bool {
        self.is_current(ticket.generation)
    }

    /// Next spoken nudge for this frame, if any direction's window is open.
    pub fn next_nudge(&mut self, nudges: &[Nudge], now: Instant) -> Option<Direction> {
        self.nudges.next(nudges, now)
    }

    fn prompt_window_open(&self, now: Instant) -> bool {
        self.last_emission_time.map_or(true, |last| {
            now.saturating_duration_since(last) >= self.config.prompt_interval
        })
    }

    /// Decide whether to request a new high-level suggestion for `detection`.
    pub fn try_begin_suggestion(
        &mut self,
        detection: &DetectionRecord,
        now: Instant,
    ) -> Option<SuggestionTicket> {
        if self.stopped || self.suggestion_in_flight || !self.prompt_window_open(now) {
            return None;
        }
        if !has_significant_change(detection, self.last_detection.as_ref()) {
            return None;
        }
        self.suggestion_in_flight = true;
        Some(SuggestionTicket {
            generation: self.generation,
            detection: Some(detection.clone()),
        })
    }

    /// Apply a completed suggestion request.
    ///
    /// Success or failure both close the prompt window; only success records
    /// the detection used for change comparison.
    pub fn finish_suggestion<E>(
        &mut self,
        ticket: SuggestionTicket,
        result: Result<String, E>,
        now: Instant,
    ) -> SuggestionOutcome {
        if !self.is_current(ticket.generation) {
            return SuggestionOutcome::Discarded;
        }
        self.suggestion_in_flight = false;
        self.last_emission_time = Some(now);

        let text = match result {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => return SuggestionOutcome::Failed,
        };

        if let Some(detection) = ticket.detection {
            self.last_detection = Some(detection);
        }

        if self.last_emitted_prompt.as_deref() == Some(text.as_str()) {
            return SuggestionOutcome::Duplicate;
        }
        self.last_emitted_prompt = Some(text.clone());
        SuggestionOutcome::Emit(text)
    }

    /// Claim the remote slot for a conversation turn.
    pub fn try_begin_exchange(&mut self) -> Option<SuggestionTicket> {
        if self.stopped || self.suggestion_in_flight {
            return None;
        }
        self.suggestion_in_flight = true;
        Some(SuggestionTicket {
            generation: self.generation,
            detection: None,
        })
    }

    /// Release the remote slot after a conversation turn. Returns false when
    /// the reply should be dropped.
    pub fn finish_exchange(&mut self, ticket: SuggestionTicket) -> bool {
        if !self.is_current(ticket.generation) {
            return false;
        }
        self.suggestion_in_flight = false;
        true
    }
}

impl Default for AdvisorySession {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BodyPose, BoundingBox};

    fn face() -> DetectionRecord {
        DetectionRecord::face(BoundingBox::new(0.5, 0.5, 0.4, 0.6))
    }

    fn ready_frames(session: &mut AdvisorySession, n: usize) -> Vec<GateDecision> {
        (0..n).map(|_| session.observe_readiness(true)).collect()
    }

    fn captures(decisions: &[GateDecision]) -> usize {
        decisions
            .iter()
            .filter(|d| matches!(d, GateDecision::Capture(_)))
            .count()
    }

    fn take_ticket(decision: GateDecision) -> CaptureTicket {
        match decision {
            GateDecision::Capture(ticket) => ticket,
            other => panic!("expected capture, got {other:?}"),
        }
    }

    #[test]
    fn test_change_without_history() {
        assert!(has_significant_change(&face(), None));
    }

    #[test]
    fn test_change_on_discrete_fields() {
        let base = face();
        assert!(!has_significant_change(&base, Some(&base)));
        assert!(has_significant_change(&base.clone().with_smile(true), Some(&base)));
        assert!(has_significant_change(&DetectionRecord::no_face(), Some(&base)));
        assert!(has_significant_change(
            &base.clone().with_body_pose(BodyPose::Left),
            Some(&base)
        ));
    }

    #[test]
    fn test_change_on_head_pose() {
        let last = face().with_head_pose(0.0, 0.0);
        assert!(!has_significant_change(&face().with_head_pose(0.05, 0.05), Some(&last)));
        assert!(has_significant_change(&face().with_head_pose(0.15, 0.0), Some(&last)));
        assert!(has_significant_change(&face().with_head_pose(0.0, -0.15), Some(&last)));
        // Pose appearing or vanishing alone is not a change.
        assert!(!has_significant_change(&face(), Some(&last)));
    }

    #[test]
    fn test_capture_after_three_stable_frames() {
        let mut session = AdvisorySession::default();
        assert_eq!(session.observe_readiness(true), GateDecision::Counting(1));
        assert_eq!(session.observe_readiness(true), GateDecision::Counting(2));
        let ticket = take_ticket(session.observe_readiness(true));
        assert_eq!(ticket.source, CaptureSource::Stability);
        assert!(session.photo_taken());
    }

    #[test]
    fn test_interrupted_readiness_resets_counter() {
        let mut session = AdvisorySession::default();
        ready_frames(&mut session, 2);
        assert_eq!(session.observe_readiness(false), GateDecision::Idle);
        assert_eq!(session.stable_frame_count(), 0);
        assert_eq!(session.observe_readiness(true), GateDecision::Counting(1));
    }

    #[test]
    fn test_latch_holds_until_readiness_lost() {
        let mut session = AdvisorySession::default();
        let ticket = take_ticket(ready_frames(&mut session, 3).pop().unwrap());
        assert!(session.finish_capture(ticket, true));

        let held = ready_frames(&mut session, 20);
        assert_eq!(captures(&held), 0);
        assert!(held.iter().all(|d| *d == GateDecision::Latched));

        session.observe_readiness(false);
        let rearmed = ready_frames(&mut session, 3);
        assert_eq!(captures(&rearmed), 1);
    }

    #[test]
    fn test_no_second_capture_while_first_is_running() {
        let mut session = AdvisorySession::default();
        ready_frames(&mut session, 3);
        // Subject breaks and re-establishes the pose during the countdown.
        session.observe_readiness(false);
        let decisions = ready_frames(&mut session, 5);
        assert_eq!(captures(&decisions), 0);
    }

    #[test]
    fn test_photo_count_bounded() {
        let mut session = AdvisorySession::default();
        let mut fired = 0;
        for _ in 0..10 {
            for decision in ready_frames(&mut session, 3) {
                if let GateDecision::Capture(ticket) = decision {
                    fired += 1;
                    session.finish_capture(ticket, true);
                }
            }
            session.observe_readiness(false);
        }
        assert_eq!(fired, 3);
        assert_eq!(session.photo_count(), MAX_PHOTOS_PER_SESSION);
        assert!(session.is_complete());
        assert_eq!(session.observe_readiness(true), GateDecision::SessionFull);
        assert!(session.request_keyword_capture().is_none());
        assert!(session.request_manual_capture().is_none());
    }

    #[test]
    fn test_failed_capture_keeps_latch() {
        let mut session = AdvisorySession::default();
        let ticket = take_ticket(ready_frames(&mut session, 3).pop().unwrap());
        assert!(!session.finish_capture(ticket, false));
        assert_eq!(session.photo_count(), 0);
        assert!(session.photo_taken());
        assert!(!session.capture_in_progress());
        assert_eq!(session.observe_readiness(true), GateDecision::Latched);
    }

    #[test]
    fn test_keyword_capture_respects_latch() {
        let mut session = AdvisorySession::default();
        let ticket = session.request_keyword_capture().unwrap();
        assert_eq!(ticket.source, CaptureSource::Keyword);
        session.finish_capture(ticket, true);
        assert!(session.request_keyword_capture().is_none());

        session.observe_readiness(false);
        assert!(session.request_keyword_capture().is_some());
    }

    #[test]
    fn test_manual_capture_ignores_latch() {
        let mut session = AdvisorySession::default();
        let ticket = session.request_manual_capture().unwrap();
        session.finish_capture(ticket, true);
        assert!(session.photo_taken());
        assert!(session.request_manual_capture().is_some());
    }

    #[test]
    fn test_new_session_resets_and_discards() {
        let mut session = AdvisorySession::default();
        let ticket = take_ticket(ready_frames(&mut session, 3).pop().unwrap());
        session.start_new_session();
        assert!(!session.capture_is_current(&ticket));
        assert!(!session.finish_capture(ticket, true));
        assert_eq!(session.photo_count(), 0);
        assert!(!session.photo_taken());
        assert_eq!(session.observe_readiness(true), GateDecision::Counting(1));
    }

    #[test]
    fn test_suggestion_time_gate() {
        let mut session = AdvisorySession::default();
        let t0 = Instant::now();

        let ticket = session.try_begin_suggestion(&face(), t0).unwrap();
        let outcome = session.finish_suggestion::<()>(ticket, Ok("Hold still".into()), t0);
        assert_eq!(outcome, SuggestionOutcome::Emit("Hold still".into()));

        let changed = face().with_smile(true);
        assert!(session
            .try_begin_suggestion(&changed, t0 + Duration::from_secs(14))
            .is_none());
        assert!(session
            .try_begin_suggestion(&changed, t0 + Duration::from_secs(15))
            .is_some());
    }

    #[test]
    fn test_suggestion_requires_change() {
        let mut session = AdvisorySession::default();
        let t0 = Instant::now();
        let ticket = session.try_begin_suggestion(&face(), t0).unwrap();
        session.finish_suggestion::<()>(ticket, Ok("Smile please".into()), t0);

        let later = t0 + Duration::from_secs(60);
        assert!(session.try_begin_suggestion(&face(), later).is_none());
        assert!(session
            .try_begin_suggestion(&face().with_smile(true), later)
            .is_some());
    }

    #[test]
    fn test_single_suggestion_in_flight() {
        let mut session = AdvisorySession::default();
        let t0 = Instant::now();
        let ticket = session.try_begin_suggestion(&face(), t0).unwrap();
        assert!(session.try_begin_suggestion(&face(), t0).is_none());
        assert!(session.try_begin_exchange().is_none());
        session.finish_suggestion::<()>(ticket, Err(()), t0);
        assert!(session.try_begin_exchange().is_some());
    }

    #[test]
    fn test_duplicate_suggestion_not_emitted() {
        let mut session = AdvisorySession::default();
        let t0 = Instant::now();
        let ticket = session.try_begin_suggestion(&face(), t0).unwrap();
        session.finish_suggestion::<()>(ticket, Ok("Perfect, hold".into()), t0);

        let t1 = t0 + Duration::from_secs(20);
        let ticket = session
            .try_begin_suggestion(&face().with_smile(true), t1)
            .unwrap();
        let outcome = session.finish_suggestion::<()>(ticket, Ok("Perfect, hold".into()), t1);
        assert_eq!(outcome, SuggestionOutcome::Duplicate);
    }

    #[test]
    fn test_failed_suggestion_closes_window_only() {
        let mut session = AdvisorySession::default();
        let t0 = Instant::now();
        let ticket = session.try_begin_suggestion(&face(), t0).unwrap();
        assert_eq!(
            session.finish_suggestion(ticket, Err("timeout"), t0),
            SuggestionOutcome::Failed
        );
        assert!(session.last_emitted_prompt().is_none());
        assert!(session.try_begin_suggestion(&face(), t0).is_none());
        // No detection was recorded, so the same frame counts as a change later.
        assert!(session
            .try_begin_suggestion(&face(), t0 + PROMPT_INTERVAL)
            .is_some());
    }

    #[test]
    fn test_blank_suggestion_is_failure() {
        let mut session = AdvisorySession::default();
        let t0 = Instant::now();
        let ticket = session.try_begin_suggestion(&face(), t0).unwrap();
        assert_eq!(
            session.finish_suggestion::<()>(ticket, Ok("  ".into()), t0),
            SuggestionOutcome::Failed
        );
    }

    #[test]
    fn test_stop_discards_in_flight_suggestion() {
        let mut session = AdvisorySession::default();
        let t0 = Instant::now();
        let ticket = session.try_begin_suggestion(&face(), t0).unwrap();
        session.stop();
        assert_eq!(
            session.finish_suggestion::<()>(ticket, Ok("Ready to capture".into()), t0),
            SuggestionOutcome::Discarded
        );
        assert!(session.last_emitted_prompt().is_none());
        assert!(session.is_complete());
    }

    #[test]
    fn test_stale_exchange_does_not_release_new_slot() {
        let mut session = AdvisorySession::default();
        let old = session.try_begin_exchange().unwrap();
        session.start_new_session();
        let current = session.try_begin_exchange().unwrap();
        assert!(!session.finish_exchange(old));
        assert!(session.try_begin_exchange().is_none());
        assert!(session.finish_exchange(current));
    }

    #[test]
    fn test_nudges_rate_limited_per_direction() {
        let mut session = AdvisorySession::default();
        let t0 = Instant::now();

        assert_eq!(session.next_nudge(&[Nudge::Left], t0), Some(Direction::Left));
        assert_eq!(session.next_nudge(&[Nudge::Left], t0 + Duration::from_secs(1)), None);
        // A different direction has its own window.
        assert_eq!(
            session.next_nudge(&[Nudge::Left, Nudge::Back], t0 + Duration::from_secs(1)),
            Some(Direction::Back)
        );
        assert_eq!(
            session.next_nudge(&[Nudge::Left], t0 + NUDGE_INTERVAL),
            Some(Direction::Left)
        );
    }

    #[test]
    fn test_nudge_priority() {
        let mut limiter = NudgeLimiter::new(NUDGE_INTERVAL);
        let t0 = Instant::now();
        assert_eq!(
            limiter.next(&[Nudge::Right, Nudge::FillFrame], t0),
            Some(Direction::Closer)
        );
        assert_eq!(limiter.next(&[], t0), None);
    }
}
