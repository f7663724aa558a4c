use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    System,
    Client,
}

/// One turn of the conversation. Lives only as long as the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub speaker: Speaker,
    pub text: String,
    /// True for spoken turns (synthesized prompt or transcribed recording).
    pub has_audio: bool,
    pub audio_url: Option<String>,
}

impl ConversationMessage {
    pub fn system(text: impl Into<String>, audio_url: Option<String>) -> Self {
        Self {
            speaker: Speaker::System,
            text: text.into(),
            has_audio: audio_url.is_some(),
            audio_url,
        }
    }

    pub fn client(text: impl Into<String>, has_audio: bool) -> Self {
        Self {
            speaker: Speaker::Client,
            text: text.into(),
            has_audio,
            audio_url: None,
        }
    }
}

/// Ordered log of the session's messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<ConversationMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ConversationMessage) {
        self.messages.push(message);
    }

    /// Replaces the whole log, as a fresh greeting does.
    pub fn reset_with(&mut self, message: ConversationMessage) {
        self.messages.clear();
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ConversationMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
