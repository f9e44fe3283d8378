use super::streaming::ActiveStream;
use crate::api::stream::DecodeTruncation;
use crate::api::ChatBackend;
use crate::error::{SessionError, TransportError};
use crate::state::MessageStore;
use crate::types::{Chat, ChatId, Message, PromptSettings};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No chat selected.
    Idle,
    ChatLoaded,
    Streaming,
    /// Stream finished, authoritative history requested.
    Reconciling,
}

/// Everything the front end renders. Only the controller mutates it.
#[derive(Debug)]
pub struct SessionState {
    pub chats: Vec<Chat>,
    pub active_chat: Option<ChatId>,
    pub messages: MessageStore,
    pub input: String,
    pub title_draft: String,
    pub error: Option<String>,
    pub decode_warning: Option<DecodeTruncation>,
    pub settings: PromptSettings,
    pub phase: SessionPhase,
}

impl SessionState {
    fn new(settings: PromptSettings) -> Self {
        Self {
            chats: Vec::new(),
            active_chat: None,
            messages: MessageStore::new(),
            input: String::new(),
            title_draft: String::new(),
            error: None,
            decode_warning: None,
            settings,
            phase: SessionPhase::Idle,
        }
    }

    /// Cached metadata of the selected chat.
    pub fn active_chat(&self) -> Option<&Chat> {
        let id = self.active_chat?;
        self.chats.iter().find(|chat| chat.id == id)
    }
}

/// Results of background work, delivered to [`SessionController::handle_event`].
///
/// Every event carries the generation that was current when the work started.
#[derive(Debug)]
pub enum SessionEvent {
    StreamChunk {
        generation: u64,
        chunk: Bytes,
    },
    StreamClosed {
        generation: u64,
    },
    StreamFailed {
        generation: u64,
        error: TransportError,
    },
    HistoryFetched {
        generation: u64,
        chat_id: ChatId,
        result: Result<Vec<Message>, TransportError>,
    },
}

impl SessionEvent {
    pub fn generation(&self) -> u64 {
        match self {
            SessionEvent::StreamChunk { generation, .. }
            | SessionEvent::StreamClosed { generation }
            | SessionEvent::StreamFailed { generation, .. }
            | SessionEvent::HistoryFetched { generation, .. } => *generation,
        }
    }
}

/// What a controller call changed.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// Stale or empty input; state untouched.
    Ignored,
    ChatsLoaded { count: usize },
    ChatCreated(ChatId),
    ChatSelected(ChatId),
    TitleSaved(String),
    SettingsChanged,
    StreamStarted { generation: u64 },
    Fragment(String),
    Reconciling,
    Reconciled,
    HistoryLoaded(ChatId),
    Cancelled,
    /// Also mirrored into `SessionState::error`.
    Failed(SessionError),
}

pub struct SessionController<B: ChatBackend> {
    pub(super) backend: Arc<B>,
    pub(super) state: SessionState,
    pub(super) generation: u64,
    pub(super) active_stream: Option<ActiveStream>,
    /// A history fetch under the current generation has not been applied yet.
    pub(super) history_pending: bool,
    pub(super) events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl<B: ChatBackend> SessionController<B> {
    /// Builds a controller and the receiver its background work reports to.
    /// The owner's event loop feeds every received event back through
    /// `handle_event`.
    pub fn new(
        backend: Arc<B>,
        settings: PromptSettings,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let controller = Self {
            backend,
            state: SessionState::new(settings),
            generation: 0,
            active_stream: None,
            history_pending: false,
            events_tx,
        };
        (controller, events_rx)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_streaming(&self) -> bool {
        self.active_stream.is_some()
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.state.input = text.into();
    }

    pub fn set_title_draft(&mut self, title: impl Into<String>) {
        self.state.title_draft = title.into();
    }

    pub fn set_model(&mut self, model: &str) -> SessionUpdate {
        let model = model.trim();
        if model.is_empty() {
            return self.fail(SessionError::InvalidSetting(
                "model must not be empty".to_string(),
            ));
        }
        if !crate::types::KNOWN_MODELS.contains(&model) {
            tracing::warn!(model, "model is not one of the known backend models");
        }
        self.state.settings.model = model.to_string();
        SessionUpdate::SettingsChanged
    }

    pub fn set_temperature(&mut self, temperature: f32) -> SessionUpdate {
        if !(0.0..=1.0).contains(&temperature) {
            return self.fail(SessionError::InvalidSetting(format!(
                "temperature must be between 0.0 and 1.0, got {temperature}"
            )));
        }
        self.state.settings.temperature = temperature;
        SessionUpdate::SettingsChanged
    }

    pub fn set_role(&mut self, role: &str) -> SessionUpdate {
        self.state.settings.role = role.to_string();
        SessionUpdate::SettingsChanged
    }

    /// Records a failure as the single user-visible error.
    pub(super) fn fail(&mut self, error: SessionError) -> SessionUpdate {
        tracing::warn!(%error, "session operation failed");
        self.state.error = Some(error.user_message());
        SessionUpdate::Failed(error)
    }
}
