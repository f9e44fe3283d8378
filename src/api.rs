mod client;
#[cfg(test)]
pub mod mock_client;
pub mod stream;

pub use client::ApiClient;

use crate::error::TransportError;
use crate::types::{Chat, ChatId, Message, PromptRequest};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// The backend operations the session controller consumes.
///
/// Orders returned by `list_chats` and `fetch_messages` are authoritative and
/// must be kept as-is by callers.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    async fn list_chats(&self) -> Result<Vec<Chat>, TransportError>;

    async fn create_chat(&self, title: &str) -> Result<Chat, TransportError>;

    /// Returns the title as saved by the server, which may differ from `title`.
    async fn rename_chat(&self, chat_id: ChatId, title: &str) -> Result<String, TransportError>;

    async fn fetch_messages(&self, chat_id: ChatId) -> Result<Vec<Message>, TransportError>;

    /// Opens the streaming prompt endpoint. A non-success status is reported
    /// here, before any body bytes are handed out.
    async fn open_prompt_stream(&self, request: &PromptRequest)
        -> Result<ByteStream, TransportError>;
}
