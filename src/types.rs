use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_CHAT_TITLE: &str = "New Chat";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_ROLE: &str = "You are a helpful assistant.";
pub const KNOWN_MODELS: &[&str] = &["gpt-3.5-turbo", "gpt-4"];

static NEXT_PROVISIONAL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a message in the store.
///
/// `Provisional` ids are minted locally for an optimistic message while its
/// response is streaming. They never leave the process and are dropped when
/// the authoritative history replaces the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Persisted(i64),
    Provisional(u64),
}

impl MessageId {
    pub fn provisional() -> Self {
        MessageId::Provisional(NEXT_PROVISIONAL_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, MessageId::Provisional(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub title: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub response: String,
    pub model: String,
    pub temperature: f32,
    pub role: String,
    pub chat_id: ChatId,
}

impl Message {
    /// Optimistic message for a prompt whose response has not arrived yet.
    pub fn provisional(chat_id: ChatId, prompt: &str, settings: &PromptSettings) -> Self {
        Self {
            id: MessageId::provisional(),
            content: prompt.to_string(),
            response: String::new(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            role: settings.role.clone(),
            chat_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptSettings {
    pub model: String,
    pub temperature: f32,
    pub role: String,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            role: DEFAULT_ROLE.to_string(),
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptRequest {
    pub prompt: String,
    pub temperature: f32,
    pub model: String,
    pub role: String,
    pub chat_id: ChatId,
}

impl PromptRequest {
    pub fn new(chat_id: ChatId, prompt: &str, settings: &PromptSettings) -> Self {
        Self {
            prompt: prompt.to_string(),
            temperature: settings.temperature,
            model: settings.model.clone(),
            role: settings.role.clone(),
            chat_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleBody {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisional_ids_are_unique() {
        let first = MessageId::provisional();
        let second = MessageId::provisional();
        assert_ne!(first, second);
        assert!(first.is_provisional());
    }

    #[test]
    fn test_server_message_ids_deserialize_as_persisted() {
        let message: Message = serde_json::from_str(
            r#"{"id":42,"content":"Hi","response":"Hello!","model":"gpt-3.5-turbo","temperature":0.7,"role":"You are a helpful assistant.","chat_id":1}"#,
        )
        .unwrap();
        assert_eq!(message.id, MessageId::Persisted(42));
        assert_eq!(message.chat_id, ChatId(1));
    }

    #[test]
    fn test_prompt_request_uses_wire_field_names() {
        let request = PromptRequest::new(ChatId(3), "Hi", &PromptSettings::default());
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "prompt": "Hi",
                "temperature": 0.7f32,
                "model": "gpt-3.5-turbo",
                "role": "You are a helpful assistant.",
                "chat_id": 3
            })
        );
    }
}
