use thiserror::Error;

/// Failures that end a request before or during the read loop.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("request to {url} failed: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("backend responded with status {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("stream interrupted: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_default();
        ChatError::Connection { url, source: err }
    }
}

/// Why a single frame was dropped.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("frame payload is not a valid event: {0}")]
    Json(#[from] serde_json::Error),
}
