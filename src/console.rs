use crate::chat::ChatSession;
use crate::models::chat::{ format_sources, ChatMessage, MessageId, Role };
use crate::stream::{ CloseReason, StreamOutcome };
use crate::transcript::format_transcript;
use log::{ info, warn };
use std::error::Error;
use std::io::{ self, Write };
use tokio::io::{ AsyncBufReadExt, BufReader };
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

const PROMPT: &str = "you> ";

/// Tracks what has already been printed for the message being streamed, so each update
/// only emits the new suffix.
#[derive(Debug, Default)]
pub struct LiveRender {
    current: Option<MessageId>,
    printed: String,
}

impl LiveRender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the text to write for `message`, or `None` for user echoes.
    ///
    /// A final answer that diverges from the tokens shown so far is reprinted in full
    /// on a fresh line.
    pub fn render(&mut self, message: &ChatMessage) -> Option<String> {
        if message.role == Role::User {
            return None;
        }

        let mut out = String::new();
        if self.current != Some(message.id) {
            if self.current.is_some() {
                out.push('\n');
            }
            out.push_str("assistant> ");
            self.current = Some(message.id);
            self.printed.clear();
        }

        match message.text.strip_prefix(self.printed.as_str()) {
            Some(suffix) => out.push_str(suffix),
            None => {
                out.push_str("\n[revised] ");
                out.push_str(&message.text);
            }
        }
        self.printed = message.text.clone();
        Some(out)
    }
}

fn print_flush(text: &str) {
    print!("{}", text);
    let _ = io::stdout().flush();
}

fn print_summary(session: &ChatSession, outcome: &StreamOutcome) {
    println!();
    if outcome.reason == CloseReason::Cancelled {
        println!("(cancelled)");
    }
    if outcome.is_degraded() {
        println!("(warning: {} malformed frame(s) were skipped)", outcome.dropped_frames);
    }
    if let Some(sources) = session
        .transcript()
        .get(outcome.placeholder)
        .and_then(|m| m.sources.as_ref())
    {
        if !sources.is_empty() {
            println!("Sources:");
            print!("{}", format_sources(sources));
        }
    }
}

/// Line-oriented chat loop over stdin. Ctrl-C cancels the answer being streamed, or exits
/// when idle.
pub async fn run_console(session: &mut ChatSession) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("Connected. Session {}. Type /history to review, /reset to start over, /quit to exit.", session.session_id());

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    loop {
        print_flush(PROMPT);
        let line = tokio::select! {
            line = lines.next() => line,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let line = match line {
            Some(line) => line?,
            None => {
                break;
            }
        };

        match line.trim() {
            "" => {
                continue;
            }
            "/quit" | "/exit" => {
                break;
            }
            "/history" => {
                print!("{}", format_transcript(session.transcript()));
                continue;
            }
            "/reset" => {
                session.reset();
                info!("Transcript cleared");
                println!("(transcript cleared)");
                continue;
            }
            query => {
                let mut live = LiveRender::new();
                let cancel = async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                };
                let outcome = session.send_with(query, cancel, |message| {
                    if let Some(text) = live.render(message) {
                        print_flush(&text);
                    }
                }).await;
                if let Some(outcome) = outcome {
                    print_summary(session, &outcome);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant(id: i64, text: &str) -> ChatMessage {
        ChatMessage::new(MessageId(id), Role::Assistant, text, 0)
    }

    #[test]
    fn emits_only_new_suffixes() {
        let mut live = LiveRender::new();
        assert_eq!(live.render(&ChatMessage::new(MessageId(1), Role::User, "q", 0)), None);
        assert_eq!(live.render(&assistant(2, "")).as_deref(), Some("assistant> "));
        assert_eq!(live.render(&assistant(2, "Hel")).as_deref(), Some("Hel"));
        assert_eq!(live.render(&assistant(2, "Hello")).as_deref(), Some("lo"));
        assert_eq!(live.render(&assistant(2, "Hello!")).as_deref(), Some("!"));
    }

    #[test]
    fn divergent_final_answer_is_reprinted() {
        let mut live = LiveRender::new();
        live.render(&assistant(2, "Helo"));
        assert_eq!(live.render(&assistant(2, "Hello!")).as_deref(), Some("\n[revised] Hello!"));
    }

    #[test]
    fn new_message_starts_on_a_new_line() {
        let mut live = LiveRender::new();
        live.render(&assistant(2, "partial"));
        assert_eq!(
            live.render(&assistant(3, "error")).as_deref(),
            Some("\nassistant> error")
        );
    }
}
