//! Queued speech output.
//!
//! Utterances go through a channel to a dedicated thread that owns the
//! voice backend, so the frame loop never waits on text-to-speech.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// Something that can speak.
#[async_trait]
pub trait SpeechSink: Send + Sync {
    /// Queue `text` and return immediately.
    fn speak(&self, text: &str);

    /// Queue `text` and wait until it has been spoken.
    async fn say(&self, text: &str);
}

/// Text-to-speech backend. Runs on the speech thread and may block.
pub trait Voice: Send + 'static {
    fn utter(&mut self, text: &str);
}

/// Renders speech as `info` events on the `speech` target.
#[derive(Debug, Default)]
pub struct LogVoice;

impl Voice for LogVoice {
    fn utter(&mut self, text: &str) {
        tracing::info!(target: "speech", "{text}");
    }
}

struct Utterance {
    text: String,
    done: Option<oneshot::Sender<()>>,
}

/// Clone-safe handle to the speech thread.
#[derive(Clone)]
pub struct QueuedSpeaker {
    tx: mpsc::UnboundedSender<Utterance>,
}

impl QueuedSpeaker {
    /// Spawn the speech thread around `voice`.
    ///
    /// The thread exits once every handle is dropped and the queue drains.
    pub fn spawn<V: Voice>(mut voice: V) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Utterance>();

        std::thread::Builder::new()
            .name("framing-speech".into())
            .spawn(move || {
                tracing::debug!("speech thread started");
                while let Some(utterance) = rx.blocking_recv() {
                    voice.utter(&utterance.text);
                    if let Some(done) = utterance.done {
                        let _ = done.send(());
                    }
                }
                tracing::debug!("speech thread exiting");
            })?;

        Ok(Self { tx })
    }

    fn enqueue(&self, text: &str, done: Option<oneshot::Sender<()>>) -> bool {
        let utterance = Utterance {
            text: text.to_string(),
            done,
        };
        if self.tx.send(utterance).is_err() {
            tracing::warn!(text, "speech thread gone; dropping utterance");
            return false;
        }
        true
    }
}

#[async_trait]
impl SpeechSink for QueuedSpeaker {
    fn speak(&self, text: &str) {
        self.enqueue(text, None);
    }

    async fn say(&self, text: &str) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.enqueue(text, Some(done_tx)) {
            let _ = done_rx.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Transcript(Arc<parking_lot::Mutex<Vec<String>>>);

    impl Voice for Transcript {
        fn utter(&mut self, text: &str) {
            self.0.lock().push(text.to_string());
        }
    }

    #[tokio::test]
    async fn test_say_waits_for_earlier_utterances() {
        let transcript = Transcript::default();
        let speaker = QueuedSpeaker::spawn(transcript.clone()).unwrap();

        speaker.speak("Please move left");
        speaker.speak("Please smile");
        speaker.say("Cheese!").await;

        assert_eq!(
            *transcript.0.lock(),
            vec!["Please move left", "Please smile", "Cheese!"]
        );
    }

    #[tokio::test]
    async fn test_clones_share_one_queue() {
        let transcript = Transcript::default();
        let speaker = QueuedSpeaker::spawn(transcript.clone()).unwrap();
        let other = speaker.clone();

        other.speak("3");
        speaker.say("2").await;
        assert_eq!(transcript.0.lock().len(), 2);
    }
}
