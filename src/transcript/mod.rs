use crate::models::chat::{ ChatMessage, HistoryEntry, MessageId, Role, Source };
use chrono::Utc;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("message id {0} is already in the transcript")]
    DuplicateId(MessageId),
}

/// Partial update applied to a single message.
#[derive(Clone, Debug, PartialEq)]
pub enum MessagePatch {
    AppendText(String),
    ReplaceText(String),
    ReplaceSources(Vec<Source>),
}

impl MessagePatch {
    fn apply(self, message: &mut ChatMessage) {
        match self {
            MessagePatch::AppendText(fragment) => message.text.push_str(&fragment),
            MessagePatch::ReplaceText(text) => {
                message.text = text;
            }
            MessagePatch::ReplaceSources(sources) => {
                message.sources = Some(sources);
            }
        }
    }
}

/// Hands out strictly increasing ids derived from the wall clock in milliseconds.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    last: i64,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> MessageId {
        let now = Utc::now().timestamp_millis();
        self.last = if now > self.last { now } else { self.last + 1 };
        MessageId(self.last)
    }
}

/// Ordered conversation log. Insertion order is chronological order.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    positions: HashMap<MessageId, usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: ChatMessage) -> Result<(), TranscriptError> {
        if self.positions.contains_key(&message.id) {
            return Err(TranscriptError::DuplicateId(message.id));
        }
        self.positions.insert(message.id, self.messages.len());
        self.messages.push(message);
        Ok(())
    }

    /// Applies `patch` to the message with `id`. Returns `false` when no such message exists.
    pub fn mutate(&mut self, id: MessageId, patch: MessagePatch) -> bool {
        match self.positions.get(&id) {
            Some(&pos) => {
                patch.apply(&mut self.messages[pos]);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: MessageId) -> Option<&ChatMessage> {
        self.positions.get(&id).map(|&pos| &self.messages[pos])
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.positions.clear();
    }

    /// The transcript reduced to `{role, content}` pairs, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.messages
            .iter()
            .map(|m| HistoryEntry {
                role: m.role,
                content: m.text.clone(),
            })
            .collect()
    }
}

pub fn format_transcript(transcript: &Transcript) -> String {
    let mut result = String::new();
    for msg in transcript.messages() {
        let role_display = match msg.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        result.push_str(&format!("{}: {}\n", role_display, msg.text));
    }
    result
}
