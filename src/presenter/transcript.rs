use serde::{Deserialize, Serialize};

use super::Finalized;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// One turn of the conversation as shown to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_id: Option<String>,
    #[serde(default)]
    pub show_sign_up: bool,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            youtube_id: None,
            show_sign_up: false,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
            youtube_id: None,
            show_sign_up: false,
        }
    }
}

/// Append-only conversation transcript. Only the last entry is ever mutated,
/// and only while its assistant turn is streaming; user entries are immutable
/// once pushed.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Message>,
}

impl Transcript {
    pub fn seeded(greeting: Message) -> Self {
        Self {
            entries: vec![greeting],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.entries.push(message);
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }

    /// Wholesale reset back to a seeded greeting.
    pub fn reset(&mut self, greeting: Message) {
        self.entries.clear();
        self.entries.push(greeting);
    }

    /// Append the placeholder entry for a new streaming assistant turn.
    pub(crate) fn begin_assistant(&mut self) {
        self.entries.push(Message::assistant(""));
    }

    /// Grow the in-flight entry's visible text. Monotonic: never truncates.
    pub(crate) fn append_streaming(&mut self, text: &str) {
        if let Some(last) = self.entries.last_mut() {
            last.text.push_str(text);
        }
    }

    /// The one permitted post-stream rewrite: swap in the display segment and
    /// attach the extracted directives.
    pub(crate) fn finalize_streaming(&mut self, finalized: &Finalized) {
        if let Some(last) = self.entries.last_mut() {
            last.text = finalized.text.clone();
            last.youtube_id = finalized.youtube_id.clone();
            last.show_sign_up = finalized.show_sign_up;
        }
    }

    /// Remove the in-flight entry if nothing was ever revealed, so an aborted
    /// turn leaves no empty bubble behind. Returns whether an entry was
    /// removed.
    pub(crate) fn drop_empty_streaming(&mut self) -> bool {
        match self.entries.last() {
            Some(last) if last.sender == Sender::Assistant && last.text.is_empty() => {
                self.entries.pop();
                true
            }
            _ => false,
        }
    }
}
