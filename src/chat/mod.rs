use crate::client::{ ByteStream, ChatTransport };
use crate::error::ChatError;
use crate::models::chat::{ ChatMessage, ChatRequest, MessageId, Role };
use crate::stream::{ frames, StreamInterpreter, StreamOutcome };
use crate::transcript::{ MessageIdGenerator, Transcript };
use chrono::Utc;
use futures::{ future, Future, StreamExt };
use log::{ error, info };
use std::sync::Arc;

enum Opened {
    Stream(ByteStream),
    Failed(ChatError),
    Cancelled,
}

/// One conversation against the backend: owns the transcript and drives one request at a time.
///
/// `send` takes `&mut self`, so a second request cannot start while a stream is being read
/// and frames of one stream are always applied by a single task, in arrival order.
pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    transcript: Transcript,
    ids: MessageIdGenerator,
    session_id: String,
    limit: usize,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn ChatTransport>, session_id: String, limit: usize) -> Self {
        Self {
            transport,
            transcript: Transcript::new(),
            ids: MessageIdGenerator::new(),
            session_id,
            limit,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Forgets the local transcript. The session id is kept.
    pub fn reset(&mut self) {
        self.transcript.clear();
    }

    /// Sends `query` and reads the answer to completion. Blank queries are ignored.
    pub async fn send(&mut self, query: &str) -> Option<StreamOutcome> {
        self.send_with(query, future::pending::<()>(), |_| {}).await
    }

    /// Like [`send`](Self::send), but stops early when `cancel` resolves and calls
    /// `on_update` with every message that was added or changed.
    pub async fn send_with<C, F>(
        &mut self,
        query: &str,
        cancel: C,
        mut on_update: F
    ) -> Option<StreamOutcome>
        where C: Future<Output = ()>, F: FnMut(&ChatMessage)
    {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        let request = ChatRequest {
            query: query.to_string(),
            limit: self.limit,
            messages: self.transcript.history(),
            session_id: self.session_id.clone(),
        };

        self.push_message(Role::User, query, &mut on_update);
        let placeholder = self.push_message(Role::Assistant, "", &mut on_update);
        let mut interpreter = StreamInterpreter::new(placeholder);

        tokio::pin!(cancel);

        let opened = tokio::select! {
            biased;
            _ = &mut cancel => Opened::Cancelled,
            result = self.transport.open_stream(&request) => match result {
                Ok(stream) => Opened::Stream(stream),
                Err(e) => Opened::Failed(e),
            },
        };

        let bytes = match opened {
            Opened::Stream(bytes) => bytes,
            Opened::Failed(e) => {
                self.record_failure(&mut interpreter, &e, &mut on_update);
                return Some(self.finish(&interpreter));
            }
            Opened::Cancelled => {
                interpreter.cancel();
                return Some(self.finish(&interpreter));
            }
        };

        let frame_stream = frames(bytes);
        tokio::pin!(frame_stream);

        loop {
            let next = tokio::select! {
                biased;
                _ = &mut cancel => {
                    interpreter.cancel();
                    break;
                }
                next = frame_stream.next() => next,
            };

            match next {
                Some(Ok(frame)) => {
                    if interpreter.apply(&mut self.transcript, frame) {
                        if let Some(message) = self.transcript.get(placeholder) {
                            on_update(message);
                        }
                    }
                    if interpreter.is_closed() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    self.record_failure(&mut interpreter, &e, &mut on_update);
                    break;
                }
                None => {
                    interpreter.end_of_stream();
                    break;
                }
            }
        }

        Some(self.finish(&interpreter))
    }

    fn push_message<F: FnMut(&ChatMessage)>(
        &mut self,
        role: Role,
        text: &str,
        on_update: &mut F
    ) -> MessageId {
        let id = self.ids.next_id();
        let message = ChatMessage::new(id, role, text, Utc::now().timestamp());
        if let Err(e) = self.transcript.append(message) {
            error!("Failed to append {} message: {}", role.as_str(), e);
        }
        if let Some(message) = self.transcript.get(id) {
            on_update(message);
        }
        id
    }

    fn record_failure<F: FnMut(&ChatMessage)>(
        &mut self,
        interpreter: &mut StreamInterpreter,
        err: &ChatError,
        on_update: &mut F
    ) {
        if let Some(id) = interpreter.fail(&mut self.transcript, &mut self.ids, err) {
            if let Some(message) = self.transcript.get(id) {
                on_update(message);
            }
        }
    }

    fn finish(&self, interpreter: &StreamInterpreter) -> StreamOutcome {
        let outcome = interpreter.outcome();
        info!(
            "Stream for message {} closed: {:?} ({} frames, {} dropped)",
            outcome.placeholder,
            outcome.reason,
            outcome.frames,
            outcome.dropped_frames
        );
        outcome
    }
}
