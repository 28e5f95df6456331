use serde::{ Serialize, Deserialize };
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A citation attached to an answer by the retrieval backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub distance: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub sources: Option<Vec<Source>>,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(id: MessageId, role: Role, text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id,
            role,
            text: text.into(),
            sources: None,
            timestamp,
        }
    }
}

/// One prior turn as the backend expects it in `messages`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    pub limit: usize,
    pub messages: Vec<HistoryEntry>,
    pub session_id: String,
}

/// Renders sources the way the backend's `sources_text` does: `[n] title - link`.
pub fn format_sources(sources: &[Source]) -> String {
    let mut result = String::new();
    for (i, source) in sources.iter().enumerate() {
        let index = source.index.unwrap_or((i + 1) as u32);
        let title = source.title.as_deref().unwrap_or("(untitled)");
        match source.link.as_deref() {
            Some(link) if !link.is_empty() => {
                result.push_str(&format!("[{}] {} - {}\n", index, title, link));
            }
            _ => result.push_str(&format!("[{}] {}\n", index, title)),
        }
    }
    result
}
