use std::sync::Arc;
use std::time::{Duration, Instant};

use framing_core::keywords::PoseAdjustment;
use framing_core::throttle::SessionStats;
use framing_core::{
    generate_advice, simplify_suggestion, status_summary, Advice, AdvisorySession, CaptureTicket,
    DetectionRecord, GateDecision, KeywordMatcher, ReferenceComposition, ReplyCommand,
    SuggestionOutcome, SuggestionTicket, TargetSize, ThrottleConfig, VoiceCommand,
};
use framing_io::{CaptureError, CaptureSink, Frame};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::remote::SuggestionService;
use crate::speech::SpeechSink;

/// Spoken before the shutter on automatic and keyword captures.
pub const COUNTDOWN: [&str; 4] = ["3", "2", "1", "Cheese!"];

const FALLBACK_REPLY: &str = "Sorry, I didn't catch that. Please try again.";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("no frame available to capture")]
    NoFrame,
    #[error("capture task aborted: {0}")]
    TaskAborted(#[from] tokio::task::JoinError),
}

/// Tunables for [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub throttle: ThrottleConfig,
    pub reference: ReferenceComposition,
    pub target_size: TargetSize,
    /// Wait between a ready keyword and the capture it triggers.
    pub keyword_capture_delay: Duration,
    pub countdown_step: Duration,
    pub worker_pool_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            throttle: ThrottleConfig::default(),
            reference: ReferenceComposition::default(),
            target_size: TargetSize::default(),
            keyword_capture_delay: Duration::from_secs(1),
            countdown_step: Duration::from_secs(1),
            worker_pool_size: 4,
        }
    }
}

/// What the frame loop learns about one frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub advice: Advice,
    pub decision: GateDecision,
}

/// Everything behind the session lock.
struct AgentState {
    session: AdvisorySession,
    target_size: TargetSize,
    auto_prompts: bool,
    conversation: bool,
    latest_frame: Option<Arc<Frame>>,
}

struct Shared {
    state: Mutex<AgentState>,
    reference: ReferenceComposition,
    keyword_capture_delay: Duration,
    countdown_step: Duration,
    ready_keywords: KeywordMatcher,
    workers: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    speech: Arc<dyn SpeechSink>,
    capture: Arc<dyn CaptureSink>,
    suggestions: Arc<dyn SuggestionService>,
}

/// The capture session engine.
///
/// Per-frame work runs synchronously under the session lock; captures,
/// countdowns and remote requests run as background tasks bounded by the
/// worker pool. Clones share one session.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Shared>,
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        speech: Arc<dyn SpeechSink>,
        capture: Arc<dyn CaptureSink>,
        suggestions: Arc<dyn SuggestionService>,
    ) -> Self {
        let state = AgentState {
            session: AdvisorySession::new(settings.throttle),
            target_size: settings.target_size,
            auto_prompts: true,
            conversation: false,
            latest_frame: None,
        };
        Self {
            inner: Arc::new(Shared {
                state: Mutex::new(state),
                reference: settings.reference,
                keyword_capture_delay: settings.keyword_capture_delay,
                countdown_step: settings.countdown_step,
                ready_keywords: KeywordMatcher::ready(),
                workers: Arc::new(Semaphore::new(settings.worker_pool_size.max(1))),
                tasks: Mutex::new(JoinSet::new()),
                speech,
                capture,
                suggestions,
            }),
        }
    }

    /// Run one frame through the aggregator, the readiness gate, the nudge
    /// limiter and the suggestion throttle. Never blocks on I/O.
    pub fn process_frame(&self, frame: Frame, detection: DetectionRecord, now: Instant) -> FrameReport {
        let frame = Arc::new(frame);
        let (advice, decision, nudge, suggestion) = {
            let mut state = self.inner.state.lock();
            state.latest_frame = Some(frame.clone());

            let advice = generate_advice(&detection, &self.inner.reference, state.target_size);
            let decision = state.session.observe_readiness(advice.capture_ready);

            let quiet = state.conversation || state.session.capture_in_progress();
            let nudge = if quiet {
                None
            } else {
                state.session.next_nudge(&advice.nudges, now)
            };

            let suggestion = if state.auto_prompts && !state.conversation {
                state.session.try_begin_suggestion(&detection, now)
            } else {
                None
            };
            (advice, decision, nudge, suggestion)
        };

        tracing::debug!(
            seq = frame.sequence,
            advice = %advice.text,
            ready = advice.capture_ready,
            ?decision,
            "frame evaluated"
        );

        if let GateDecision::Capture(ticket) = &decision {
            tracing::info!(seq = frame.sequence, "pose held, starting capture");
            self.spawn_capture(ticket.clone(), true);
        }
        if let Some(direction) = nudge {
            self.inner.speech.speak(direction.spoken());
        }
        if let Some(ticket) = suggestion {
            self.spawn_suggestion(ticket, detection);
        }

        FrameReport { advice, decision }
    }

    /// Handle one line of recognised user speech.
    pub fn handle_utterance(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let conversation = self.inner.state.lock().conversation;
        match VoiceCommand::parse(text) {
            Some(command) if !conversation || command.is_mode_switch() => {
                self.apply_command(command)
            }
            _ if conversation => self.spawn_exchange(text.to_string()),
            _ => tracing::debug!(text, "no command recognised"),
        }
    }

    fn apply_command(&self, command: VoiceCommand) {
        tracing::info!(?command, "voice command");
        let speech = &self.inner.speech;
        match command {
            VoiceCommand::StartConversation => {
                let mut state = self.inner.state.lock();
                state.conversation = true;
                state.auto_prompts = false;
                drop(state);
                speech.speak("Conversation mode on. Tell me what kind of photo you want.");
            }
            VoiceCommand::ExitConversation => {
                let mut state = self.inner.state.lock();
                state.conversation = false;
                state.auto_prompts = true;
                drop(state);
                speech.speak("Conversation mode off. Smart prompts enabled.");
            }
            VoiceCommand::DisablePrompts => {
                self.inner.state.lock().auto_prompts = false;
                speech.speak("Smart prompts disabled");
            }
            VoiceCommand::EnablePrompts => {
                self.inner.state.lock().auto_prompts = true;
                speech.speak("Smart prompts enabled");
            }
            VoiceCommand::TakePhoto => self.manual_capture(false),
            VoiceCommand::AnotherPhoto => {
                self.inner.state.lock().session.start_new_session();
                self.manual_capture(true);
            }
            VoiceCommand::SetTarget(target) => {
                self.set_target_size(target);
                speech.speak(&format!("Target set to {target}"));
            }
            VoiceCommand::Stop => {
                self.stop();
                speech.speak("Session ended");
            }
        }
    }

    fn manual_capture(&self, countdown: bool) {
        let ticket = {
            let mut state = self.inner.state.lock();
            if state.latest_frame.is_none() {
                tracing::warn!(error = %EngineError::NoFrame, "manual capture skipped");
                return;
            }
            state.session.request_manual_capture()
        };
        match ticket {
            Some(ticket) => self.spawn_capture(ticket, countdown),
            None => tracing::debug!("manual capture refused: session full or busy"),
        }
    }

    /// Change the composition goal used from the next frame on.
    pub fn set_target_size(&self, target: TargetSize) {
        self.inner.state.lock().target_size = target;
        tracing::info!(target = %target, "target size changed");
    }

    pub fn target_size(&self) -> TargetSize {
        self.inner.state.lock().target_size
    }

    pub fn in_conversation(&self) -> bool {
        self.inner.state.lock().conversation
    }

    /// Photo bound reached or session stopped.
    pub fn is_complete(&self) -> bool {
        self.inner.state.lock().session.is_complete()
    }

    pub fn stats(&self) -> SessionStats {
        self.inner.state.lock().session.stats()
    }

    /// End the session. Work still in flight finishes but its results are
    /// discarded.
    pub fn stop(&self) {
        self.inner.state.lock().session.stop();
        tracing::info!("session stopped");
    }

    /// Abort every background task and wait for them to unwind.
    ///
    /// Used after [`Engine::stop`], when pending results would be discarded
    /// anyway.
    pub async fn cancel(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.inner.tasks.lock());
            if tasks.is_empty() {
                return;
            }
            tasks.abort_all();
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    if !e.is_cancelled() {
                        tracing::warn!(error = %e, "background task failed");
                    }
                }
            }
        }
    }

    /// Wait for every background task spawned so far, including ones they
    /// spawn while draining.
    pub async fn drain(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.inner.tasks.lock());
            if tasks.is_empty() {
                return;
            }
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "background task failed");
                }
            }
        }
    }

    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let workers = self.inner.workers.clone();
        let mut tasks = self.inner.tasks.lock();
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                tracing::warn!(error = %e, "background task failed");
            }
        }
        tasks.spawn(async move {
            let Ok(_permit) = workers.acquire_owned().await else {
                return;
            };
            task.await;
        });
    }

    fn spawn_capture(&self, ticket: CaptureTicket, countdown: bool) {
        let engine = self.clone();
        self.spawn(async move { engine.run_capture(ticket, countdown).await });
    }

    /// Countdown, shutter, bookkeeping. The ticket is always handed back.
    ///
    /// The shutter takes the frame current when the countdown ends.
    async fn run_capture(&self, ticket: CaptureTicket, countdown: bool) {
        if countdown {
            for step in COUNTDOWN {
                if !self.inner.state.lock().session.capture_is_current(&ticket) {
                    tracing::debug!("session ended during countdown");
                    return;
                }
                self.inner.speech.say(step).await;
                tokio::time::sleep(self.inner.countdown_step).await;
            }
        }

        let frame = {
            let state = self.inner.state.lock();
            if !state.session.capture_is_current(&ticket) {
                return;
            }
            state.latest_frame.clone()
        };

        let source = ticket.source;
        let result = match frame {
            Some(frame) => self.save(frame).await,
            None => Err(EngineError::NoFrame),
        };
        let counted = self
            .inner
            .state
            .lock()
            .session
            .finish_capture(ticket, result.is_ok());

        match result {
            Ok(path) if counted => {
                tracing::info!(path = %path.display(), ?source, "photo saved");
                self.inner
                    .speech
                    .speak(&format!("Photo saved to {}", path.display()));
            }
            Ok(path) => {
                tracing::debug!(path = %path.display(), "photo saved after session ended; not counted")
            }
            Err(e) => tracing::warn!(error = %e, ?source, "capture failed"),
        }
    }

    async fn save(&self, frame: Arc<Frame>) -> Result<std::path::PathBuf, EngineError> {
        let sink = self.inner.capture.clone();
        let path = tokio::task::spawn_blocking(move || sink.capture_and_save(&frame)).await??;
        Ok(path)
    }

    /// Keyword-triggered capture: wait, then re-check the latch.
    async fn keyword_capture(&self) {
        tokio::time::sleep(self.inner.keyword_capture_delay).await;
        let ticket = {
            let mut state = self.inner.state.lock();
            if state.latest_frame.is_none() {
                return;
            }
            state.session.request_keyword_capture()
        };
        match ticket {
            Some(ticket) => {
                tracing::info!("ready keyword heard, starting capture");
                self.run_capture(ticket, true).await;
            }
            None => tracing::debug!("keyword capture suppressed by latch or photo bound"),
        }
    }

    fn spawn_suggestion(&self, ticket: SuggestionTicket, detection: DetectionRecord) {
        let engine = self.clone();
        self.spawn(async move {
            let summary = status_summary(&detection);
            let result = engine.inner.suggestions.suggest(&summary).await;
            if let Err(e) = &result {
                tracing::warn!(error = %e, "suggestion request failed");
            }

            let outcome = engine
                .inner
                .state
                .lock()
                .session
                .finish_suggestion(ticket, result, Instant::now());

            match outcome {
                SuggestionOutcome::Emit(text) => {
                    engine.inner.speech.speak(&text);
                    if let Some(short) = simplify_suggestion(&text) {
                        engine.inner.speech.speak(&short);
                    }
                    if engine.inner.ready_keywords.matches(&text) {
                        engine.keyword_capture().await;
                    }
                }
                other => tracing::debug!(?other, "suggestion not spoken"),
            }
        });
    }

    fn spawn_exchange(&self, text: String) {
        let Some(ticket) = self.inner.state.lock().session.try_begin_exchange() else {
            tracing::debug!("remote busy; dropping conversation turn");
            return;
        };
        let engine = self.clone();
        self.spawn(async move {
            let result = engine.inner.suggestions.converse(&text).await;
            if !engine.inner.state.lock().session.finish_exchange(ticket) {
                return;
            }

            let reply = match result {
                Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
                Ok(_) => FALLBACK_REPLY.to_string(),
                Err(e) => {
                    tracing::warn!(error = %e, "conversation request failed");
                    FALLBACK_REPLY.to_string()
                }
            };
            engine.inner.speech.speak(&reply);

            let command = ReplyCommand::parse(&reply);
            if command.take_photo {
                engine.keyword_capture().await;
            } else if let Some(pose) = command.pose_adjustment {
                engine.inner.speech.speak(&pose_prompt(pose));
            }
        });
    }
}

fn pose_prompt(pose: PoseAdjustment) -> String {
    format!("Please adjust {}", pose.as_str())
}
