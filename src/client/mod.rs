use crate::config::ClientConfig;
use crate::error::ChatError;
use crate::models::chat::ChatRequest;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{ Stream, StreamExt };
use log::{ debug, info };
use reqwest::header::{ ACCEPT, HeaderMap, HeaderValue, CONTENT_TYPE };
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::pin::Pin;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ChatError>> + Send>>;

/// Opens the streaming chat request and hands back the raw response body.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ChatError>;
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

pub struct HttpChatClient {
    http: HttpClient,
    base_url: String,
    chat_route: String,
}

impl HttpChatClient {
    pub fn new(base_url: &str, chat_route: &str) -> Result<Self, ChatError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_route: normalize_route(chat_route),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ChatError> {
        Self::new(config.base_url.as_str(), &config.chat_route)
    }

    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url, self.chat_route)
    }

    /// Probes `GET /health`; true when the backend reports itself healthy.
    pub async fn health(&self) -> Result<bool, ChatError> {
        let url = format!("{}/health", self.base_url);
        let resp = self.http
            .get(&url)
            .send().await
            .map_err(|e| ChatError::Connection { url: url.clone(), source: e })?;
        if !resp.status().is_success() {
            return Err(ChatError::Status { url, status: resp.status() });
        }
        let body = resp.json::<HealthResponse>().await?;
        debug!("Health check at {} returned status '{}'", url, body.status);
        Ok(body.status == "healthy")
    }
}

fn normalize_route(route: &str) -> String {
    let trimmed = route.trim();
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[async_trait]
impl ChatTransport for HttpChatClient {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ChatError> {
        let url = self.chat_url();
        info!(
            "POST {} (session={}, history={} messages, limit={})",
            url,
            request.session_id,
            request.messages.len(),
            request.limit
        );

        let resp = self.http
            .post(&url)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send().await
            .map_err(|e| ChatError::Connection { url: url.clone(), source: e })?;

        if !resp.status().is_success() {
            return Err(ChatError::Status { url, status: resp.status() });
        }

        let stream = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ChatError::Transport(e.to_string())));
        Ok(Box::pin(stream))
    }
}
