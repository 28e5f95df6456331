use crate::error::{ ChatError, FrameError };
use crate::models::stream::StreamEvent;
use bytes::Bytes;
use futures::{ stream, Stream, StreamExt };
use log::debug;
use std::collections::VecDeque;

pub const DATA_PREFIX: &str = "data:";

/// One complete frame pulled off the wire.
#[derive(Debug)]
pub enum Frame {
    Event(StreamEvent),
    Malformed(FrameError),
}

/// Accumulates raw bytes and cuts them into blank-line delimited frames.
///
/// Bytes are kept undecoded until a boundary is seen, so a multi-byte character split
/// across two chunks is only decoded once both halves are buffered.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    // Bytes already searched for a boundary; the next search resumes two bytes back so a
    // separator split across chunks is still found.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every frame it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        let mut from = self.scanned.saturating_sub(2);
        while let Some((end, boundary_len)) = find_boundary(&self.buffer, from) {
            if let Some(frame) = decode_frame(&self.buffer[start..end]) {
                frames.push(frame);
            }
            start = end + boundary_len;
            from = start;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        frames
    }

    /// Bytes received after the last boundary.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

// Returns the offset of the first newline at or after `from` that opens a blank line,
// and the length of the separator. Accepts both `\n\n` and `\n\r\n`.
fn find_boundary(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    for i in from..buf.len() {
        if buf[i] != b'\n' {
            continue;
        }
        match (buf.get(i + 1).copied(), buf.get(i + 2).copied()) {
            (Some(b'\n'), _) => {
                return Some((i, 2));
            }
            (Some(b'\r'), Some(b'\n')) => {
                return Some((i, 3));
            }
            _ => {}
        }
    }
    None
}

fn decode_frame(raw: &[u8]) -> Option<Frame> {
    let text = match String::from_utf8(raw.to_vec()) {
        Ok(text) => text,
        Err(e) => {
            return Some(Frame::Malformed(e.into()));
        }
    };

    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();
    if data.is_empty() {
        return None;
    }

    match serde_json::from_str::<StreamEvent>(&data.join("\n")) {
        Ok(event) => Some(Frame::Event(event)),
        Err(e) => Some(Frame::Malformed(e.into())),
    }
}

struct FrameState<S> {
    bytes: S,
    decoder: FrameDecoder,
    ready: VecDeque<Frame>,
    done: bool,
}

/// Turns a byte stream into a lazy, finite stream of frames.
///
/// A transport error is yielded once and ends the stream. Trailing bytes without a
/// closing blank line are discarded when the byte stream ends.
pub fn frames<S>(bytes: S) -> impl Stream<Item = Result<Frame, ChatError>>
    where S: Stream<Item = Result<Bytes, ChatError>> + Unpin
{
    let state = FrameState {
        bytes,
        decoder: FrameDecoder::new(),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(frame) = st.ready.pop_front() {
                return Some((Ok(frame), st));
            }
            if st.done {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => st.ready.extend(st.decoder.push(&chunk)),
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.done = true;
                    if st.decoder.pending() > 0 {
                        debug!(
                            "Stream ended with {} unterminated bytes; discarding",
                            st.decoder.pending()
                        );
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(frames: Vec<Frame>) -> Vec<StreamEvent> {
        frames
            .into_iter()
            .filter_map(|f| match f {
                Frame::Event(e) => Some(e),
                Frame::Malformed(_) => None,
            })
            .collect()
    }

    #[test]
    fn splits_on_blank_lines_and_keeps_remainder() {
        let mut decoder = FrameDecoder::new();
        let out = decoder.push(
            b"data: {\"type\":\"token\",\"content\":\"a\"}\n\ndata: {\"type\":\"token\""
        );
        assert_eq!(events(out), vec![StreamEvent::Token { content: Some("a".into()) }]);
        assert!(decoder.pending() > 0);

        let out = decoder.push(b",\"content\":\"b\"}\n\n");
        assert_eq!(events(out), vec![StreamEvent::Token { content: Some("b".into()) }]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn accepts_crlf_separators() {
        let mut decoder = FrameDecoder::new();
        let out = decoder.push(b"data: {\"type\":\"token\",\"content\":\"x\"}\r\n\r\n");
        assert_eq!(events(out), vec![StreamEvent::Token { content: Some("x".into()) }]);
    }

    #[test]
    fn ignores_lines_without_data_marker() {
        let mut decoder = FrameDecoder::new();
        let out = decoder.push(
            b": keep-alive\n\nevent: message\nid: 7\ndata: {\"type\":\"final\",\"answer\":\"ok\"}\n\n"
        );
        assert_eq!(events(out), vec![StreamEvent::Final { answer: Some("ok".into()), sources: None }]);
    }

    #[test]
    fn malformed_payload_is_reported_not_fatal() {
        let mut decoder = FrameDecoder::new();
        let out = decoder.push(
            b"data: {not json\n\ndata: {\"type\":\"token\",\"content\":\"still here\"}\n\n"
        );
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Frame::Malformed(FrameError::Json(_))));
        assert!(matches!(out[1], Frame::Event(StreamEvent::Token { .. })));
    }

    #[test]
    fn multibyte_characters_survive_any_split() {
        let wire = "data: {\"type\":\"token\",\"content\":\"안녕하세요 👋\"}\n\n".as_bytes();
        for split in 1..wire.len() {
            let mut decoder = FrameDecoder::new();
            let mut out = decoder.push(&wire[..split]);
            out.extend(decoder.push(&wire[split..]));
            assert_eq!(
                events(out),
                vec![StreamEvent::Token { content: Some("안녕하세요 👋".into()) }],
                "split at {}",
                split
            );
        }
    }

    #[test]
    fn separator_split_across_chunks_is_found() {
        let wire = b"data: {\"type\":\"token\",\"content\":\"a\"}\r\n\r\n";
        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        for byte in wire.iter() {
            out.extend(decoder.push(std::slice::from_ref(byte)));
        }
        assert_eq!(events(out), vec![StreamEvent::Token { content: Some("a".into()) }]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn large_frame_fed_bytewise_decodes_in_linear_time() {
        let answer = "x".repeat(256 * 1024);
        let wire = format!("data: {{\"type\":\"final\",\"answer\":\"{}\"}}\n\n", answer);

        let started = std::time::Instant::now();
        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        for byte in wire.as_bytes() {
            out.extend(decoder.push(std::slice::from_ref(byte)));
        }
        let elapsed = started.elapsed();

        assert_eq!(events(out), vec![StreamEvent::Final { answer: Some(answer), sources: None }]);
        assert!(elapsed < std::time::Duration::from_secs(5), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn frame_stream_stops_after_transport_error() {
        let chunks: Vec<Result<Bytes, ChatError>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"token\",\"content\":\"a\"}\n\n")),
            Err(ChatError::Transport("reset by peer".into())),
            Ok(Bytes::from_static(b"data: {\"type\":\"token\",\"content\":\"b\"}\n\n"))
        ];
        let collected: Vec<_> = frames(stream::iter(chunks)).collect().await;
        assert_eq!(collected.len(), 2);
        assert!(matches!(collected[0], Ok(Frame::Event(_))));
        assert!(matches!(collected[1], Err(ChatError::Transport(_))));
    }

    #[tokio::test]
    async fn unterminated_tail_is_dropped_at_end() {
        let chunks: Vec<Result<Bytes, ChatError>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"token\",\"content\":\"a\"}\n\n")),
            Ok(Bytes::from_static(b"data: {\"type\":\"token\",\"content\":\"b\"}"))
        ];
        let collected: Vec<_> = frames(stream::iter(chunks)).collect().await;
        assert_eq!(collected.len(), 1);
    }
}
