use super::framer::Frame;
use crate::error::ChatError;
use crate::models::chat::{ ChatMessage, MessageId, Role };
use crate::models::stream::StreamEvent;
use crate::transcript::{ MessageIdGenerator, MessagePatch, Transcript };
use chrono::Utc;
use log::{ debug, error, warn };

/// Shown in place of an answer when the connection fails.
pub const STREAM_FAILURE_MESSAGE: &str =
    "Sorry, something went wrong while receiving the answer. Please try again.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    StreamEnded,
    FinalAnswer,
    TransportError,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Streaming,
    Closed(CloseReason),
}

/// Summary of one finished request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamOutcome {
    pub placeholder: MessageId,
    pub reason: CloseReason,
    pub frames: usize,
    pub dropped_frames: usize,
    pub error_message: Option<MessageId>,
}

impl StreamOutcome {
    /// True when at least one frame had to be discarded.
    pub fn is_degraded(&self) -> bool {
        self.dropped_frames > 0
    }
}

/// Drives the placeholder message of a single request from STREAMING to CLOSED.
#[derive(Debug)]
pub struct StreamInterpreter {
    placeholder: MessageId,
    state: StreamState,
    frames: usize,
    dropped_frames: usize,
    error_message: Option<MessageId>,
}

impl StreamInterpreter {
    pub fn new(placeholder: MessageId) -> Self {
        Self {
            placeholder,
            state: StreamState::Streaming,
            frames: 0,
            dropped_frames: 0,
            error_message: None,
        }
    }

    pub fn placeholder(&self) -> MessageId {
        self.placeholder
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, StreamState::Closed(_))
    }

    /// Applies one frame. Returns true if the transcript changed.
    pub fn apply(&mut self, transcript: &mut Transcript, frame: Frame) -> bool {
        if self.is_closed() {
            debug!("Ignoring frame received after the stream closed");
            return false;
        }
        self.frames += 1;

        let event = match frame {
            Frame::Event(event) => event,
            Frame::Malformed(e) => {
                self.dropped_frames += 1;
                warn!("Dropping malformed frame #{}: {}", self.frames, e);
                return false;
            }
        };

        match event {
            StreamEvent::Token { content: Some(content) } => {
                self.patch(transcript, MessagePatch::AppendText(content))
            }
            StreamEvent::Meta { sources: Some(sources) } => {
                self.patch(transcript, MessagePatch::ReplaceSources(sources))
            }
            StreamEvent::Final { answer: Some(answer), sources } => {
                let mut changed = self.patch(transcript, MessagePatch::ReplaceText(answer));
                if let Some(sources) = sources {
                    changed |= self.patch(transcript, MessagePatch::ReplaceSources(sources));
                }
                self.state = StreamState::Closed(CloseReason::FinalAnswer);
                changed
            }
            StreamEvent::Final { answer: None, .. } => {
                debug!("Final frame without an answer; keeping accumulated text");
                self.state = StreamState::Closed(CloseReason::FinalAnswer);
                false
            }
            StreamEvent::Token { content: None } | StreamEvent::Meta { sources: None } => {
                debug!("Frame #{} carried no payload", self.frames);
                false
            }
            StreamEvent::Unknown => {
                debug!("Ignoring frame #{} with unrecognized type", self.frames);
                false
            }
        }
    }

    pub fn end_of_stream(&mut self) {
        if !self.is_closed() {
            self.state = StreamState::Closed(CloseReason::StreamEnded);
        }
    }

    pub fn cancel(&mut self) {
        if !self.is_closed() {
            self.state = StreamState::Closed(CloseReason::Cancelled);
        }
    }

    /// Closes the stream after a transport failure and appends a separate error message.
    /// The placeholder keeps whatever it had accumulated.
    pub fn fail(
        &mut self,
        transcript: &mut Transcript,
        ids: &mut MessageIdGenerator,
        err: &ChatError
    ) -> Option<MessageId> {
        if self.is_closed() {
            return None;
        }
        error!("Chat stream failed: {}", err);
        self.state = StreamState::Closed(CloseReason::TransportError);

        let id = ids.next_id();
        let message = ChatMessage::new(
            id,
            Role::Assistant,
            STREAM_FAILURE_MESSAGE,
            Utc::now().timestamp()
        );
        match transcript.append(message) {
            Ok(()) => {
                self.error_message = Some(id);
                Some(id)
            }
            Err(e) => {
                error!("Could not record stream failure: {}", e);
                None
            }
        }
    }

    /// Final summary. A stream still marked STREAMING is reported as ended.
    pub fn outcome(&self) -> StreamOutcome {
        let reason = match self.state {
            StreamState::Closed(reason) => reason,
            StreamState::Streaming => CloseReason::StreamEnded,
        };
        StreamOutcome {
            placeholder: self.placeholder,
            reason,
            frames: self.frames,
            dropped_frames: self.dropped_frames,
            error_message: self.error_message,
        }
    }

    fn patch(&self, transcript: &mut Transcript, patch: MessagePatch) -> bool {
        let applied = transcript.mutate(self.placeholder, patch);
        if !applied {
            warn!("Placeholder {} is missing from the transcript", self.placeholder);
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameError;
    use crate::models::chat::Source;

    fn setup() -> (Transcript, MessageIdGenerator, StreamInterpreter) {
        let mut ids = MessageIdGenerator::new();
        let mut transcript = Transcript::new();
        let id = ids.next_id();
        transcript.append(ChatMessage::new(id, Role::Assistant, "", 0)).unwrap();
        (transcript, ids, StreamInterpreter::new(id))
    }

    fn token(s: &str) -> Frame {
        Frame::Event(StreamEvent::Token { content: Some(s.to_string()) })
    }

    fn text(transcript: &Transcript, id: MessageId) -> String {
        transcript.get(id).unwrap().text.clone()
    }

    #[test]
    fn tokens_concatenate_in_arrival_order() {
        let (mut transcript, _, mut interp) = setup();
        for part in ["The ", "quick ", "brown ", "fox"] {
            assert!(interp.apply(&mut transcript, token(part)));
        }
        interp.end_of_stream();
        assert_eq!(text(&transcript, interp.placeholder()), "The quick brown fox");
        assert_eq!(interp.state(), StreamState::Closed(CloseReason::StreamEnded));
    }

    #[test]
    fn final_answer_replaces_tokens_and_keeps_sources_when_absent() {
        let (mut transcript, _, mut interp) = setup();
        let sources = vec![Source { index: Some(1), ..Default::default() }];
        interp.apply(&mut transcript, token("Hel"));
        interp.apply(
            &mut transcript,
            Frame::Event(StreamEvent::Meta { sources: Some(sources.clone()) })
        );
        interp.apply(&mut transcript, token("lo"));
        interp.apply(
            &mut transcript,
            Frame::Event(StreamEvent::Final { answer: Some("Hello!".into()), sources: None })
        );

        let placeholder = transcript.get(interp.placeholder()).unwrap();
        assert_eq!(placeholder.text, "Hello!");
        assert_eq!(placeholder.sources.as_ref(), Some(&sources));
        assert_eq!(interp.state(), StreamState::Closed(CloseReason::FinalAnswer));
    }

    #[test]
    fn final_sources_overwrite_meta_sources() {
        let (mut transcript, _, mut interp) = setup();
        let early = vec![Source { title: Some("early".into()), ..Default::default() }];
        let late = vec![Source { title: Some("late".into()), ..Default::default() }];
        interp.apply(&mut transcript, Frame::Event(StreamEvent::Meta { sources: Some(early) }));
        interp.apply(
            &mut transcript,
            Frame::Event(StreamEvent::Final { answer: Some("a".into()), sources: Some(late.clone()) })
        );
        assert_eq!(transcript.get(interp.placeholder()).unwrap().sources, Some(late));
    }

    #[test]
    fn frames_after_final_are_ignored() {
        let (mut transcript, _, mut interp) = setup();
        interp.apply(
            &mut transcript,
            Frame::Event(StreamEvent::Final { answer: Some("done".into()), sources: None })
        );
        assert!(!interp.apply(&mut transcript, token(" extra")));
        assert_eq!(text(&transcript, interp.placeholder()), "done");
    }

    #[test]
    fn malformed_and_unknown_frames_do_not_mutate() {
        let (mut transcript, _, mut interp) = setup();
        interp.apply(&mut transcript, token("a"));
        let bad = serde_json::from_str::<StreamEvent>("{").unwrap_err();
        assert!(!interp.apply(&mut transcript, Frame::Malformed(FrameError::Json(bad))));
        assert!(!interp.apply(&mut transcript, Frame::Event(StreamEvent::Unknown)));
        assert!(!interp.apply(&mut transcript, Frame::Event(StreamEvent::Token { content: None })));
        interp.apply(&mut transcript, token("b"));
        interp.end_of_stream();

        assert_eq!(text(&transcript, interp.placeholder()), "ab");
        let outcome = interp.outcome();
        assert_eq!(outcome.frames, 5);
        assert_eq!(outcome.dropped_frames, 1);
        assert!(outcome.is_degraded());
    }

    #[test]
    fn failure_appends_distinct_error_message() {
        let (mut transcript, mut ids, mut interp) = setup();
        interp.apply(&mut transcript, token("partial"));
        let err_id = interp
            .fail(&mut transcript, &mut ids, &ChatError::Transport("reset".into()))
            .unwrap();

        assert_ne!(err_id, interp.placeholder());
        assert_eq!(transcript.len(), 2);
        assert_eq!(text(&transcript, interp.placeholder()), "partial");
        assert_eq!(text(&transcript, err_id), STREAM_FAILURE_MESSAGE);
        assert_eq!(interp.outcome().reason, CloseReason::TransportError);

        assert!(interp.fail(&mut transcript, &mut ids, &ChatError::Transport("again".into())).is_none());
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn cancel_closes_without_mutation() {
        let (mut transcript, _, mut interp) = setup();
        interp.apply(&mut transcript, token("half"));
        interp.cancel();
        interp.end_of_stream();
        assert_eq!(interp.state(), StreamState::Closed(CloseReason::Cancelled));
        assert_eq!(text(&transcript, interp.placeholder()), "half");
    }
}
