//! Session orchestration: wires user input, the hosted chat call, the stream
//! presenter, and the asset cache together. One session is one logical
//! thread of control; at most one turn streams at a time.

pub mod nav;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::assets::{AssetCache, AssetError, HttpSource, StoreError, StoredBlob};
use crate::control::StopToken;
use crate::db::models::AssetRecord;
use crate::db::Database;
use crate::llm::gemini::{self, GeminiConfig};
use crate::llm::{ChatMessage, ChatRequest, StreamEvent};
use crate::persona;
use crate::presenter::transcript::{Message, Sender, Transcript};
use crate::presenter::{Presenter, TurnOutcome, DEFAULT_WORD_DELAY};
use nav::NavState;

/// Quiescence interval before a synthetic re-engagement turn.
pub const IDLE_REENGAGE: Duration = Duration::from_secs(10);

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Admin-tunable settings. Everything else is rejected.
pub const SETTING_KEYS: &[&str] = &[
    "gemini_api_key",
    "gemini_base_url",
    "chat_model",
    "main_pdf_url",
    "booker_pdf_url",
];

/// The two document slots the product ships with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentSlot {
    Main,
    Booker,
}

impl DocumentSlot {
    pub fn key(self) -> &'static str {
        match self {
            DocumentSlot::Main => "pdf",
            DocumentSlot::Booker => "booker",
        }
    }

    fn filename(self) -> &'static str {
        match self {
            DocumentSlot::Main => "pdf.pdf",
            DocumentSlot::Booker => "booker-page.pdf",
        }
    }

    fn url_setting(self) -> &'static str {
        match self {
            DocumentSlot::Main => "main_pdf_url",
            DocumentSlot::Booker => "booker_pdf_url",
        }
    }

    pub fn parse(name: &str) -> Option<DocumentSlot> {
        match name {
            "pdf" | "main" => Some(DocumentSlot::Main),
            "booker" => Some(DocumentSlot::Booker),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("chat is not available: {0}")]
    ChatConfig(String),
    #[error("a response is already streaming")]
    Busy,
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unknown setting key: {0}")]
    UnknownSetting(String),
    #[error("admin access required")]
    AdminRequired,
    #[error("file does not look like a PDF")]
    NotPdf,
}

#[derive(Clone)]
struct ChatHandle {
    config: GeminiConfig,
    model: String,
}

/// Tracks conversational quiescence for the synthetic re-engagement turn.
/// Any recorded state change restarts the countdown; the fired flag rearms
/// only when a new user message arrives.
#[derive(Debug)]
pub struct IdleTracker {
    deadline: Instant,
    fired: bool,
    interval: Duration,
}

impl IdleTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            deadline: Instant::now() + interval,
            fired: false,
            interval,
        }
    }

    /// A state change happened; restart the countdown.
    pub fn touch(&mut self) {
        self.deadline = Instant::now() + self.interval;
    }

    /// A user message arrived: rearm and restart.
    pub fn user_message(&mut self) {
        self.fired = false;
        self.touch();
    }

    pub fn mark_fired(&mut self) {
        self.fired = true;
    }

    pub fn fired(&self) -> bool {
        self.fired
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

pub struct Session {
    db: Arc<Database>,
    assets: AssetCache<Arc<Database>>,
    source: HttpSource,
    chat: Option<ChatHandle>,
    config_error: Option<String>,
    presenter: Presenter,
    transcript: Transcript,
    /// Provider-visible history. Includes synthetic re-engagement prompts
    /// that never show in the transcript; excludes the seeded greeting.
    history: Vec<ChatMessage>,
    loading: bool,
    error: Option<String>,
    stop: StopToken,
    idle: IdleTracker,
    pub nav: NavState,
}

impl Session {
    pub fn new(db: Arc<Database>) -> Self {
        let (chat, config_error) = match resolve_chat(&db) {
            Ok(handle) => (Some(handle), None),
            Err(e) => {
                tracing::error!(error = %e, "failed to initialize chat");
                (None, Some(persona::CHAT_INIT_FAILED.to_string()))
            }
        };

        Self {
            assets: AssetCache::new(Arc::clone(&db)),
            db,
            source: HttpSource::new(),
            chat,
            config_error,
            presenter: Presenter::new(DEFAULT_WORD_DELAY),
            transcript: Transcript::seeded(Message::assistant(persona::greeting())),
            history: Vec::new(),
            loading: false,
            error: None,
            stop: StopToken::new(),
            idle: IdleTracker::new(IDLE_REENGAGE),
            nav: NavState::new(),
        }
    }

    // ── Chat ──

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Set only when the chat service could not be initialized; sending is
    /// disabled for the whole session while it stands.
    pub fn config_error(&self) -> Option<&str> {
        self.config_error.as_deref()
    }

    pub fn can_send(&self) -> bool {
        self.chat.is_some() && !self.loading
    }

    /// Handle for wiring an external stop signal (e.g. Ctrl-C) to the turn
    /// in flight.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub fn stop_generation(&self) {
        self.stop.stop();
    }

    /// One user turn: append the message, stream the reply through the
    /// presenter, record the outcome. Transport failures do not propagate;
    /// they abort the turn and set the session error.
    pub async fn send_message(
        &mut self,
        input: &str,
        on_reveal: impl FnMut(&str),
    ) -> Result<TurnOutcome, SessionError> {
        let chat = self
            .chat
            .clone()
            .ok_or_else(|| SessionError::ChatConfig(self.config_error.clone().unwrap_or_default()))?;
        if self.loading {
            return Err(SessionError::Busy);
        }

        self.stop.reset();
        self.error = None;
        self.loading = true;
        self.transcript.push(Message::user(input));
        self.history.push(ChatMessage {
            role: "user".into(),
            content: input.to_string(),
        });
        self.idle.user_message();

        let outcome = self.run_stream_turn(chat, on_reveal).await;
        if let TurnOutcome::Aborted { error, .. } = &outcome {
            tracing::warn!(error = %error, "chat turn aborted");
            self.error = Some(persona::CHAT_UNAVAILABLE.to_string());
        }

        self.loading = false;
        self.stop.reset();
        self.idle.touch();
        Ok(outcome)
    }

    /// Synthetic turn fired after idle silence. Failures are swallowed; the
    /// empty-bubble cleanup still applies inside the presenter.
    pub async fn re_engage(&mut self, on_reveal: impl FnMut(&str)) -> Option<TurnOutcome> {
        let chat = self.chat.clone()?;
        if self.loading {
            return None;
        }

        self.idle.mark_fired();
        self.stop.reset();
        self.error = None;
        self.loading = true;
        self.history.push(ChatMessage {
            role: "user".into(),
            content: persona::RE_ENGAGE_PROMPT.to_string(),
        });

        let outcome = self.run_stream_turn(chat, on_reveal).await;
        if let TurnOutcome::Aborted { error, .. } = &outcome {
            tracing::debug!(error = %error, "re-engagement turn failed, ignoring");
        }

        self.loading = false;
        self.stop.reset();
        self.idle.touch();
        Some(outcome)
    }

    async fn run_stream_turn(
        &mut self,
        chat: ChatHandle,
        on_reveal: impl FnMut(&str),
    ) -> TurnOutcome {
        let (tx, rx) = mpsc::unbounded_channel();
        // The persona rides along as the system message of every request;
        // the transport hoists it out of the message list.
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.push(ChatMessage {
            role: "system".into(),
            content: persona::SYSTEM_INSTRUCTION.to_string(),
        });
        messages.extend(self.history.iter().cloned());
        let request = ChatRequest {
            messages,
            model: chat.model,
        };
        let stop = self.stop.clone();
        tokio::spawn(async move {
            let sender = tx.clone();
            let result = gemini::chat_stream(&chat.config, &request, &stop, move |chunk| {
                if !chunk.delta.is_empty() {
                    let _ = sender.send(StreamEvent::Delta(chunk.delta));
                }
                if chunk.done {
                    let _ = sender.send(StreamEvent::Done);
                }
            })
            .await;
            if let Err(e) = result {
                let _ = tx.send(StreamEvent::Failed(e));
            }
        });

        let presenter = &self.presenter;
        let outcome = presenter
            .run_turn(&mut self.transcript, rx, &self.stop, on_reveal)
            .await;

        // What the user saw is what the model said, so partial turns still
        // belong to the provider-visible history.
        let said = match &outcome {
            TurnOutcome::Finalized { raw_text } => raw_text,
            TurnOutcome::Cancelled { revealed } => revealed,
            TurnOutcome::Aborted { revealed, .. } => revealed,
        };
        if !said.is_empty() {
            self.history.push(ChatMessage {
                role: "assistant".into(),
                content: said.clone(),
            });
        }
        outcome
    }

    // ── Idle re-engagement ──

    pub fn idle_deadline(&self) -> Instant {
        self.idle.deadline()
    }

    pub fn can_re_engage(&self) -> bool {
        !self.loading
            && !self.idle.fired()
            && self.chat.is_some()
            && matches!(self.transcript.last(), Some(m) if m.sender == Sender::Assistant)
    }

    /// Wholesale conversation reset, back to the seeded greeting.
    pub fn reset(&mut self) {
        self.stop.reset();
        self.transcript
            .reset(Message::assistant(persona::greeting()));
        self.history.clear();
        self.error = None;
        self.idle = IdleTracker::new(IDLE_REENGAGE);
        tracing::info!("conversation reset");
    }

    // ── Documents ──

    /// Cache-or-fetch the document behind a slot, for viewing.
    pub async fn open_document(&self, slot: DocumentSlot) -> Result<StoredBlob, SessionError> {
        let locator = self
            .db
            .get_setting(slot.url_setting())?
            .ok_or_else(|| AssetError::Content {
                key: slot.key().to_string(),
                reason: "no source configured".into(),
            })?;
        let blob = self
            .assets
            .load_or_fetch(slot.key(), slot.filename(), &locator, &self.source)
            .await?;
        Ok(blob)
    }

    // ── Admin ──

    fn require_admin(&self) -> Result<(), SessionError> {
        if self.nav.is_admin() {
            Ok(())
        } else {
            Err(SessionError::AdminRequired)
        }
    }

    /// Replace a slot's document with a local file.
    pub fn upload_asset(&self, slot: DocumentSlot, path: &Path) -> Result<(), SessionError> {
        self.require_admin()?;
        let bytes = std::fs::read(path)?;
        if !bytes.starts_with(b"%PDF-") {
            return Err(SessionError::NotPdf);
        }
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.pdf");
        self.assets.put(slot.key(), filename, &bytes)?;
        tracing::info!(slot = slot.key(), filename, size = bytes.len(), "asset uploaded");
        Ok(())
    }

    pub fn remove_asset(&self, slot: DocumentSlot) -> Result<(), SessionError> {
        self.require_admin()?;
        self.assets.delete(slot.key())?;
        Ok(())
    }

    pub fn list_assets(&self) -> Result<Vec<AssetRecord>, SessionError> {
        self.require_admin()?;
        Ok(self.db.list_assets()?)
    }

    // ── Settings ──

    pub fn settings(&self) -> Result<Vec<(String, String)>, SessionError> {
        let mut out = Vec::new();
        for key in SETTING_KEYS {
            if let Some(value) = self.db.get_setting(key)? {
                // Mask API keys for display.
                if key.ends_with("_api_key") && value.len() > 8 {
                    let masked = format!("{}...{}", &value[..4], &value[value.len() - 4..]);
                    out.push((key.to_string(), masked));
                } else {
                    out.push((key.to_string(), value));
                }
            }
        }
        Ok(out)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.require_admin()?;
        if !SETTING_KEYS.contains(&key) {
            return Err(SessionError::UnknownSetting(key.to_string()));
        }
        Ok(self.db.set_setting(key, value)?)
    }
}

fn resolve_chat(db: &Database) -> Result<ChatHandle, SessionError> {
    let api_key = std::env::var("GEMINI_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
        .or(db.get_setting("gemini_api_key").ok().flatten())
        .ok_or_else(|| SessionError::ChatConfig("GEMINI_API_KEY not set".into()))?;
    let base_url = db
        .get_setting("gemini_base_url")
        .ok()
        .flatten()
        .unwrap_or_else(|| gemini::DEFAULT_BASE_URL.to_string());
    let model = db
        .get_setting("chat_model")
        .ok()
        .flatten()
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    Ok(ChatHandle {
        config: GeminiConfig { api_key, base_url },
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_key() -> Session {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.set_setting("gemini_api_key", "test-key").unwrap();
        Session::new(db)
    }

    #[test]
    fn seeds_greeting_and_empty_history() {
        let session = session_with_key();
        let entries = session.transcript().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sender, Sender::Assistant);
        assert!(session.history.is_empty());
    }

    #[test]
    fn missing_api_key_disables_chat_persistently() {
        // No env var in tests that would mask the missing setting.
        std::env::remove_var("GEMINI_API_KEY");
        let db = Arc::new(Database::open_in_memory().unwrap());
        let session = Session::new(db);
        assert!(session.config_error().is_some());
        assert!(!session.can_send());
        assert!(!session.can_re_engage());
    }

    #[test]
    fn idle_tracker_fires_once_per_silence() {
        let mut idle = IdleTracker::new(Duration::from_secs(10));
        assert!(!idle.fired());

        idle.mark_fired();
        assert!(idle.fired(), "second silence must not fire again");

        idle.user_message();
        assert!(!idle.fired(), "a user message rearms the tracker");
    }

    #[test]
    fn re_engage_respects_last_sender_and_fired_flag() {
        let mut session = session_with_key();
        // Greeting is an assistant message: eligible.
        assert!(session.can_re_engage());

        session.idle.mark_fired();
        assert!(!session.can_re_engage());

        session.transcript.push(Message::user("oi"));
        session.idle.user_message();
        // Last message is now the user's: wait for the reply first.
        assert!(!session.can_re_engage());
    }

    #[test]
    fn admin_gate_covers_assets_and_settings() {
        let mut session = session_with_key();
        assert!(matches!(
            session.list_assets(),
            Err(SessionError::AdminRequired)
        ));
        assert!(matches!(
            session.set_setting("chat_model", "gemini-2.5-pro"),
            Err(SessionError::AdminRequired)
        ));

        assert!(session.nav.admin_login("1234", "1234"));
        session.set_setting("chat_model", "gemini-2.5-pro").unwrap();
        assert!(matches!(
            session.set_setting("theme", "dark"),
            Err(SessionError::UnknownSetting(_))
        ));
        assert!(session.list_assets().unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_document_without_source_is_content_unavailable() {
        let session = session_with_key();
        let err = session.open_document(DocumentSlot::Main).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Asset(AssetError::Content { .. })
        ));
    }

    #[test]
    fn stop_generation_raises_the_shared_token() {
        let session = session_with_key();
        let token = session.stop_token();
        assert!(!token.is_stopped());
        session.stop_generation();
        assert!(token.is_stopped());
    }

    #[test]
    fn reset_returns_to_seeded_state() {
        let mut session = session_with_key();
        session.transcript.push(Message::user("oi"));
        session.history.push(ChatMessage {
            role: "user".into(),
            content: "oi".into(),
        });
        session.error = Some("boom".into());

        session.reset();
        assert_eq!(session.transcript().entries().len(), 1);
        assert!(session.history.is_empty());
        assert!(session.last_error().is_none());
    }
}
