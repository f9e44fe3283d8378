use super::{ByteStream, ChatBackend};
use crate::error::TransportError;
use crate::types::{Chat, ChatId, Message, PromptRequest};
use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc as fmpsc;
use futures::stream;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub type LiveChunkSender = fmpsc::UnboundedSender<Result<Bytes, TransportError>>;

enum ScriptedStream {
    Chunks(Vec<Result<Bytes, TransportError>>),
    Fail(TransportError),
    Live(fmpsc::UnboundedReceiver<Result<Bytes, TransportError>>),
}

#[derive(Default)]
struct MockState {
    chats: Vec<Chat>,
    next_chat_id: i64,
    histories: HashMap<ChatId, VecDeque<Result<Vec<Message>, TransportError>>>,
    streams: VecDeque<ScriptedStream>,
    title_normalizer: Option<fn(&str) -> String>,
    list_error: Option<TransportError>,
    rename_error: Option<TransportError>,
    prompt_requests: Vec<PromptRequest>,
    history_requests: Vec<ChatId>,
    rename_requests: Vec<(ChatId, String)>,
}

/// Scripted in-process backend for controller tests.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chats(chats: Vec<Chat>) -> Self {
        let next_chat_id = chats.iter().map(|chat| chat.id.0).max().unwrap_or(0) + 1;
        Self {
            state: Mutex::new(MockState {
                chats,
                next_chat_id,
                ..MockState::default()
            }),
        }
    }

    pub fn fail_list(&self, error: TransportError) {
        self.state.lock().unwrap().list_error = Some(error);
    }

    /// Fails the next rename only.
    pub fn fail_next_rename(&self, error: TransportError) {
        self.state.lock().unwrap().rename_error = Some(error);
    }

    pub fn push_history(&self, chat_id: ChatId, messages: Vec<Message>) {
        self.state
            .lock()
            .unwrap()
            .histories
            .entry(chat_id)
            .or_default()
            .push_back(Ok(messages));
    }

    pub fn fail_history(&self, chat_id: ChatId, error: TransportError) {
        self.state
            .lock()
            .unwrap()
            .histories
            .entry(chat_id)
            .or_default()
            .push_back(Err(error));
    }

    pub fn push_stream(&self, chunks: &[&str]) {
        let chunks = chunks
            .iter()
            .map(|chunk| Ok(Bytes::from(chunk.to_string())))
            .collect();
        self.push_stream_results(chunks);
    }

    pub fn push_stream_results(&self, chunks: Vec<Result<Bytes, TransportError>>) {
        self.state
            .lock()
            .unwrap()
            .streams
            .push_back(ScriptedStream::Chunks(chunks));
    }

    pub fn fail_stream(&self, error: TransportError) {
        self.state
            .lock()
            .unwrap()
            .streams
            .push_back(ScriptedStream::Fail(error));
    }

    /// Queues a stream whose chunks the test sends by hand. Dropping the
    /// sender ends the stream.
    pub fn push_live_stream(&self) -> LiveChunkSender {
        let (tx, rx) = fmpsc::unbounded();
        self.state
            .lock()
            .unwrap()
            .streams
            .push_back(ScriptedStream::Live(rx));
        tx
    }

    pub fn normalize_titles(&self, normalizer: fn(&str) -> String) {
        self.state.lock().unwrap().title_normalizer = Some(normalizer);
    }

    pub fn prompt_requests(&self) -> Vec<PromptRequest> {
        self.state.lock().unwrap().prompt_requests.clone()
    }

    pub fn history_requests(&self) -> Vec<ChatId> {
        self.state.lock().unwrap().history_requests.clone()
    }

    pub fn rename_requests(&self) -> Vec<(ChatId, String)> {
        self.state.lock().unwrap().rename_requests.clone()
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn list_chats(&self) -> Result<Vec<Chat>, TransportError> {
        let state = self.state.lock().unwrap();
        match &state.list_error {
            Some(error) => Err(error.clone()),
            None => Ok(state.chats.clone()),
        }
    }

    async fn create_chat(&self, title: &str) -> Result<Chat, TransportError> {
        let mut state = self.state.lock().unwrap();
        let id = ChatId(state.next_chat_id.max(1));
        state.next_chat_id = id.0 + 1;
        let chat = Chat {
            id,
            title: title.to_string(),
            created_at: format!("2024-01-01T00:00:{:02}", id.0 % 60),
        };
        state.chats.insert(0, chat.clone());
        Ok(chat)
    }

    async fn rename_chat(&self, chat_id: ChatId, title: &str) -> Result<String, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.rename_requests.push((chat_id, title.to_string()));
        if let Some(error) = state.rename_error.take() {
            return Err(error);
        }
        let saved = match state.title_normalizer {
            Some(normalize) => normalize(title),
            None => title.to_string(),
        };
        match state.chats.iter_mut().find(|chat| chat.id == chat_id) {
            Some(chat) => {
                chat.title = saved.clone();
                Ok(saved)
            }
            None => Err(TransportError::Status {
                status: 404,
                message: Some("Chat not found".to_string()),
            }),
        }
    }

    async fn fetch_messages(&self, chat_id: ChatId) -> Result<Vec<Message>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.history_requests.push(chat_id);
        state
            .histories
            .get_mut(&chat_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn open_prompt_stream(
        &self,
        request: &PromptRequest,
    ) -> Result<ByteStream, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.prompt_requests.push(request.clone());
        match state.streams.pop_front() {
            Some(ScriptedStream::Chunks(chunks)) => Ok(Box::pin(stream::iter(chunks))),
            Some(ScriptedStream::Fail(error)) => Err(error),
            Some(ScriptedStream::Live(rx)) => Ok(Box::pin(rx)),
            None => Err(TransportError::Status {
                status: 500,
                message: Some("MockBackend: no stream configured".to_string()),
            }),
        }
    }
}
