//! Streamed-turn presentation: turns the fragment sequence of one assistant
//! reply into a word-paced, monotonically growing transcript entry, then
//! strips trailing out-of-band directives from the finished text.
//!
//! The machine is driven by a channel of [`StreamEvent`]s so it does not care
//! how the transport produces them. Cancellation is cooperative: it is
//! checked at every word boundary and at every fragment receipt, never
//! mid-word.

pub mod transcript;

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::control::StopToken;
use crate::llm::{LlmError, StreamEvent};
use transcript::Transcript;

pub const DEFAULT_WORD_DELAY: Duration = Duration::from_millis(60);

/// Field separator for trailing directives in assistant output.
pub const DIRECTIVE_SEPARATOR: &str = "||";
const YOUTUBE_PREFIX: &str = "YOUTUBE::";
const SIGNUP_TOKEN: &str = "SIGNUP";

/// Result of scanning a finished reply for trailing directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finalized {
    pub text: String,
    pub youtube_id: Option<String>,
    pub show_sign_up: bool,
}

/// Split `raw` on the directive separator. The first field is the display
/// text; later fields attach a video id or the sign-up flag. Unknown fields
/// are ignored so new directives can ship without breaking old clients.
/// Without a separator the text passes through unchanged.
pub fn parse_directives(raw: &str) -> Finalized {
    let mut fields = raw.split(DIRECTIVE_SEPARATOR);
    let display = fields.next().unwrap_or_default();

    let mut youtube_id = None;
    let mut show_sign_up = false;
    let mut any_directive = false;
    for field in fields {
        any_directive = true;
        let field = field.trim();
        if let Some(id) = field.strip_prefix(YOUTUBE_PREFIX) {
            youtube_id = Some(id.to_string());
        } else if field == SIGNUP_TOKEN {
            show_sign_up = true;
        }
    }

    if any_directive {
        Finalized {
            text: display.trim().to_string(),
            youtube_id,
            show_sign_up,
        }
    } else {
        Finalized {
            text: raw.to_string(),
            youtube_id: None,
            show_sign_up: false,
        }
    }
}

/// How a streaming turn ended.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Stream completed; directives were parsed and applied.
    Finalized { raw_text: String },
    /// Stopped by the user at a word or fragment boundary.
    Cancelled { revealed: String },
    /// Transport failed mid-turn; an empty bubble was removed, revealed text
    /// is kept unfinalized.
    Aborted { error: LlmError, revealed: String },
}

pub struct Presenter {
    word_delay: Duration,
}

impl Presenter {
    pub fn new(word_delay: Duration) -> Self {
        Self { word_delay }
    }

    /// Drive one assistant turn to its terminal state, mutating the
    /// transcript as words are revealed. `on_reveal` sees every revealed
    /// token in order.
    pub async fn run_turn(
        &self,
        transcript: &mut Transcript,
        mut events: UnboundedReceiver<StreamEvent>,
        stop: &StopToken,
        mut on_reveal: impl FnMut(&str),
    ) -> TurnOutcome {
        transcript.begin_assistant();

        let mut raw = String::new();
        let mut revealed = String::new();
        let mut pending = String::new();

        loop {
            match events.recv().await {
                Some(StreamEvent::Delta(delta)) => {
                    if stop.is_stopped() {
                        return TurnOutcome::Cancelled { revealed };
                    }
                    raw.push_str(&delta);
                    pending.push_str(&delta);

                    // Only whole words are shown; the trailing partial word
                    // stays pending for the next fragment or the final flush.
                    if let Some(cut) = last_whitespace_boundary(&pending) {
                        let rest = pending.split_off(cut);
                        let ready = std::mem::replace(&mut pending, rest);
                        for token in split_keeping_whitespace(&ready) {
                            if stop.is_stopped() {
                                return TurnOutcome::Cancelled { revealed };
                            }
                            transcript.append_streaming(token);
                            revealed.push_str(token);
                            on_reveal(token);
                            tokio::time::sleep(self.word_delay).await;
                        }
                    }
                }
                Some(StreamEvent::Done) => {
                    if !pending.is_empty() {
                        transcript.append_streaming(&pending);
                        revealed.push_str(&pending);
                        on_reveal(&pending);
                        pending.clear();
                    }
                    if raw.contains(DIRECTIVE_SEPARATOR) {
                        transcript.finalize_streaming(&parse_directives(&raw));
                    }
                    return TurnOutcome::Finalized { raw_text: raw };
                }
                Some(StreamEvent::Failed(error)) => {
                    transcript.drop_empty_streaming();
                    return TurnOutcome::Aborted { error, revealed };
                }
                None => {
                    // Sender gone without a terminal event: a stopped
                    // producer on cancellation, otherwise a dead transport.
                    if stop.is_stopped() {
                        return TurnOutcome::Cancelled { revealed };
                    }
                    transcript.drop_empty_streaming();
                    return TurnOutcome::Aborted {
                        error: LlmError::Interrupted,
                        revealed,
                    };
                }
            }
        }
    }
}

/// Byte index just past the last whitespace character, if any.
fn last_whitespace_boundary(s: &str) -> Option<usize> {
    s.char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
}

/// Split into alternating word and whitespace runs, both kept, so pacing
/// ticks once per run and reassembly is lossless.
fn split_keeping_whitespace(s: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_whitespace = None;
    for (i, c) in s.char_indices() {
        let ws = c.is_whitespace();
        match in_whitespace {
            Some(prev) if prev != ws => {
                tokens.push(&s[start..i]);
                start = i;
                in_whitespace = Some(ws);
            }
            Some(_) => {}
            None => in_whitespace = Some(ws),
        }
    }
    if start < s.len() {
        tokens.push(&s[start..]);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::transcript::{Message, Sender, Transcript};
    use super::*;
    use tokio::sync::mpsc;

    fn presenter() -> Presenter {
        Presenter::new(Duration::ZERO)
    }

    fn channel_with(
        events: Vec<StreamEvent>,
    ) -> mpsc::UnboundedReceiver<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        for event in events {
            tx.send(event).unwrap();
        }
        rx
    }

    #[test]
    fn directive_roundtrip() {
        let f = parse_directives("Texto||YOUTUBE::abc123||SIGNUP");
        assert_eq!(f.text, "Texto");
        assert_eq!(f.youtube_id.as_deref(), Some("abc123"));
        assert!(f.show_sign_up);
    }

    #[test]
    fn no_separator_passes_through_unchanged() {
        let f = parse_directives("Boa tarde! Como vai?  ");
        assert_eq!(f.text, "Boa tarde! Como vai?  ");
        assert_eq!(f.youtube_id, None);
        assert!(!f.show_sign_up);
    }

    #[test]
    fn unknown_directives_are_ignored() {
        let f = parse_directives("Oi||CONFETTI::rain||SIGNUP");
        assert_eq!(f.text, "Oi");
        assert_eq!(f.youtube_id, None);
        assert!(f.show_sign_up);
    }

    #[test]
    fn tokenizer_alternates_runs() {
        assert_eq!(
            split_keeping_whitespace("Boa  tarde! "),
            vec!["Boa", "  ", "tarde!", " "]
        );
        assert_eq!(split_keeping_whitespace(""), Vec::<&str>::new());
    }

    #[tokio::test]
    async fn streams_fragments_into_one_assistant_message() {
        let mut transcript = Transcript::seeded(Message::assistant("olá"));
        transcript.push(Message::user("oi"));
        let rx = channel_with(
            ["Boa ", "tarde", "! ", "Como ", "vai?"]
                .into_iter()
                .map(|s| StreamEvent::Delta(s.to_string()))
                .chain([StreamEvent::Done])
                .collect(),
        );

        let outcome = presenter()
            .run_turn(&mut transcript, rx, &StopToken::new(), |_| {})
            .await;

        assert!(matches!(outcome, TurnOutcome::Finalized { .. }));
        assert_eq!(transcript.entries().len(), 3);
        let last = transcript.last().unwrap();
        assert_eq!(last.sender, Sender::Assistant);
        assert_eq!(last.text, "Boa tarde! Como vai?");
        assert_eq!(last.youtube_id, None);
        assert!(!last.show_sign_up);
    }

    #[tokio::test]
    async fn reveals_grow_monotonically() {
        let mut transcript = Transcript::default();
        let rx = channel_with(vec![
            StreamEvent::Delta("Um dois ".into()),
            StreamEvent::Delta("três qua".into()),
            StreamEvent::Delta("tro".into()),
            StreamEvent::Done,
        ]);

        let mut snapshots: Vec<String> = vec![String::new()];
        presenter()
            .run_turn(&mut transcript, rx, &StopToken::new(), |token| {
                let mut next = snapshots.last().unwrap().clone();
                next.push_str(token);
                snapshots.push(next);
            })
            .await;

        for pair in snapshots.windows(2) {
            assert!(pair[1].starts_with(&pair[0]));
        }
        assert_eq!(snapshots.last().unwrap(), "Um dois três quatro");
    }

    #[tokio::test]
    async fn finalize_strips_directives_from_visible_text() {
        let mut transcript = Transcript::default();
        let rx = channel_with(vec![
            StreamEvent::Delta("A CLT é um absurdo. ".into()),
            StreamEvent::Delta("||YOUTUBE::l-p5IBSs3s8||SIGNUP".into()),
            StreamEvent::Done,
        ]);

        presenter()
            .run_turn(&mut transcript, rx, &StopToken::new(), |_| {})
            .await;

        let last = transcript.last().unwrap();
        assert_eq!(last.text, "A CLT é um absurdo.");
        assert_eq!(last.youtube_id.as_deref(), Some("l-p5IBSs3s8"));
        assert!(last.show_sign_up);
    }

    #[tokio::test]
    async fn cancel_takes_effect_at_word_boundary() {
        let mut transcript = Transcript::default();
        let stop = StopToken::new();
        let rx = channel_with(vec![
            StreamEvent::Delta("Boa tarde! Como vai? ".into()),
            StreamEvent::Done,
        ]);

        let stopper = stop.clone();
        let outcome = presenter()
            .run_turn(&mut transcript, rx, &stop, move |token| {
                if token == "tarde!" {
                    stopper.stop();
                }
            })
            .await;

        assert!(matches!(outcome, TurnOutcome::Cancelled { .. }));
        // Nothing after the word that raised the stop, not even whitespace.
        assert_eq!(transcript.last().unwrap().text, "Boa tarde!");
    }

    #[tokio::test]
    async fn cancel_between_fragments_drops_later_fragments() {
        let mut transcript = Transcript::default();
        let stop = StopToken::new();
        let rx = channel_with(vec![
            StreamEvent::Delta("Primeira parte ".into()),
            StreamEvent::Delta("segunda parte ".into()),
            StreamEvent::Done,
        ]);

        let stopper = stop.clone();
        let outcome = presenter()
            .run_turn(&mut transcript, rx, &stop, move |token| {
                // Raised while the first fragment's trailing space is shown;
                // checked again when the second fragment arrives.
                if token == "parte" {
                    stopper.stop();
                }
            })
            .await;

        let TurnOutcome::Cancelled { revealed } = outcome else {
            panic!("expected cancellation");
        };
        assert_eq!(revealed, "Primeira parte");
        assert_eq!(transcript.last().unwrap().text, "Primeira parte");
    }

    #[tokio::test]
    async fn abort_before_first_fragment_leaves_no_bubble() {
        let mut transcript = Transcript::seeded(Message::assistant("olá"));
        let rx = channel_with(vec![StreamEvent::Failed(LlmError::Interrupted)]);

        let outcome = presenter()
            .run_turn(&mut transcript, rx, &StopToken::new(), |_| {})
            .await;

        assert!(matches!(outcome, TurnOutcome::Aborted { .. }));
        assert_eq!(transcript.entries().len(), 1, "no empty bubble left");
    }

    #[tokio::test]
    async fn abort_after_partial_reveal_keeps_text_unfinalized() {
        let mut transcript = Transcript::default();
        let rx = channel_with(vec![
            StreamEvent::Delta("Texto visível ||".into()),
            StreamEvent::Failed(LlmError::Interrupted),
        ]);

        presenter()
            .run_turn(&mut transcript, rx, &StopToken::new(), |_| {})
            .await;

        // Only the whole words revealed so far; no final flush, no directive
        // parsing on partial text.
        assert_eq!(transcript.last().unwrap().text, "Texto visível ");
        assert_eq!(transcript.last().unwrap().youtube_id, None);
    }

    #[tokio::test]
    async fn trailing_partial_word_flushes_on_done() {
        let mut transcript = Transcript::default();
        let rx = channel_with(vec![
            StreamEvent::Delta("sem espaço".into()),
            StreamEvent::Done,
        ]);

        presenter()
            .run_turn(&mut transcript, rx, &StopToken::new(), |_| {})
            .await;

        assert_eq!(transcript.last().unwrap().text, "sem espaço");
    }
}
