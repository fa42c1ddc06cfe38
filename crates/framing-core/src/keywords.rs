//! Literal keyword classifiers for free-form text at the edges of the agent.
//!
//! These are membership tests over fixed phrase lists and nothing more. Text
//! that matches nothing is "no command".

use crate::types::TargetSize;

/// Phrases in a remote suggestion that mean "shoot now".
pub const READY_KEYWORDS: &[&str] = &[
    "ready to capture",
    "take photo now",
    "perfect timing",
    "capture now",
];

/// Case-insensitive phrase matcher.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
}

impl KeywordMatcher {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Matcher for [`READY_KEYWORDS`].
    pub fn ready() -> Self {
        Self::new(READY_KEYWORDS)
    }

    pub fn matches(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self::ready()
    }
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// Pose correction named in a dialogue reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseAdjustment {
    Left,
    Right,
    Back,
    Closer,
    Smile,
}

impl PoseAdjustment {
    pub fn as_str(self) -> &'static str {
        match self {
            PoseAdjustment::Left => "left",
            PoseAdjustment::Right => "right",
            PoseAdjustment::Back => "back",
            PoseAdjustment::Closer => "closer",
            PoseAdjustment::Smile => "smile",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    Now,
    Wait,
    Countdown,
}

/// Commands recognised in a conversation-mode reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyCommand {
    pub take_photo: bool,
    pub pose_adjustment: Option<PoseAdjustment>,
    pub timing: Option<Timing>,
}

impl ReplyCommand {
    pub fn parse(reply: &str) -> Self {
        let text = reply.to_lowercase();

        let pose_adjustment = [
            (PoseAdjustment::Left, "left"),
            (PoseAdjustment::Right, "right"),
            (PoseAdjustment::Back, "back"),
            (PoseAdjustment::Closer, "closer"),
            (PoseAdjustment::Smile, "smile"),
        ]
        .into_iter()
        .find(|(_, word)| text.contains(word))
        .map(|(pose, _)| pose);

        let timing = if text.contains("now") {
            Some(Timing::Now)
        } else if text.contains("wait") {
            Some(Timing::Wait)
        } else if text.contains("countdown") {
            Some(Timing::Countdown)
        } else {
            None
        };

        Self {
            take_photo: contains_any(&text, &["take photo", "take a photo", "capture"]),
            pose_adjustment,
            timing,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Commands recognised in transcribed user speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceCommand {
    StartConversation,
    ExitConversation,
    DisablePrompts,
    EnablePrompts,
    AnotherPhoto,
    TakePhoto,
    SetTarget(TargetSize),
    Stop,
}

impl VoiceCommand {
    pub fn parse(utterance: &str) -> Option<Self> {
        let text = utterance.to_lowercase();
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let command = if contains_any(text, &["exit conversation", "basic mode"]) {
            VoiceCommand::ExitConversation
        } else if contains_any(text, &["start conversation", "conversation mode"]) {
            VoiceCommand::StartConversation
        } else if contains_any(text, &["disable prompts", "stop prompts"]) {
            VoiceCommand::DisablePrompts
        } else if contains_any(text, &["enable prompts", "start prompts"]) {
            VoiceCommand::EnablePrompts
        } else if contains_any(text, &["one more", "another photo"]) {
            VoiceCommand::AnotherPhoto
        } else if contains_any(text, &["take photo", "take a photo", "capture"]) {
            VoiceCommand::TakePhoto
        } else if contains_any(text, &["full body", "full-body"]) {
            VoiceCommand::SetTarget(TargetSize::FullBody)
        } else if contains_any(text, &["half body", "half-body"]) {
            VoiceCommand::SetTarget(TargetSize::HalfBody)
        } else if text.contains("portrait") {
            VoiceCommand::SetTarget(TargetSize::Portrait)
        } else if contains_any(text, &["stop session", "end session"]) {
            VoiceCommand::Stop
        } else {
            return None;
        };
        Some(command)
    }

    /// Commands honoured even in conversation mode.
    pub fn is_mode_switch(self) -> bool {
        matches!(
            self,
            VoiceCommand::StartConversation
                | VoiceCommand::ExitConversation
                | VoiceCommand::DisablePrompts
                | VoiceCommand::EnablePrompts
                | VoiceCommand::Stop
        )
    }
}

/// Words of `text`, lowercased, split on anything that is not alphanumeric.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Short key-action line for a spoken suggestion, e.g.
/// `"Shift a bit to the left and smile"` becomes `"Move left, keep smiling"`.
///
/// Only whole words count, so "alright" is not "right". Returns `None` when
/// the suggestion names no recognised action.
pub fn simplify_suggestion(text: &str) -> Option<String> {
    let words = words(text);
    let has = |w: &str| words.iter().any(|word| word == w);
    let mut actions: Vec<&str> = Vec::new();

    if has("left") {
        actions.push("move left");
    } else if has("right") {
        actions.push("move right");
    } else if has("back") {
        actions.push("step back");
    } else if has("closer") {
        actions.push("step closer");
    }

    if has("smile") || has("smiling") {
        actions.push("keep smiling");
    }

    if has("chin") || has("look") {
        if has("up") {
            actions.push("lift your chin");
        } else if has("down") {
            actions.push("lower your chin");
        }
    }

    if KeywordMatcher::ready().matches(text) {
        actions.push("ready for the photo");
    }

    let line = actions.join(", ");
    let mut chars = line.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}
