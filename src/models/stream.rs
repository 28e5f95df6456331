use serde::{ Serialize, Deserialize };
use super::chat::Source;

/// A decoded `data:` payload from the chat stream.
///
/// Fields are optional so that a frame with a known `type` but a missing body still
/// decodes; the interpreter decides whether such a frame mutates anything.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "token")] Token {
        #[serde(default)]
        content: Option<String>,
    },
    #[serde(rename = "meta")] Meta {
        #[serde(default)]
        sources: Option<Vec<Source>>,
    },
    #[serde(rename = "final")] Final {
        #[serde(default)]
        answer: Option<String>,
        #[serde(default)]
        sources: Option<Vec<Source>>,
    },
    #[serde(other)]
    Unknown,
}
