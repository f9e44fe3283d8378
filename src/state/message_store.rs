use crate::types::Message;

/// Ordered messages of the active chat.
#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    messages: Vec<Message>,
    rejected_amendments: usize,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether any message still awaits its server counterpart.
    pub fn has_provisional(&self) -> bool {
        self.messages.iter().any(|message| message.id.is_provisional())
    }

    /// How many `amend_last` calls found nothing to amend.
    pub fn rejected_amendments(&self) -> usize {
        self.rejected_amendments
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Replaces the response of the last message. Returns false, without
    /// touching anything, when the store is empty.
    pub fn amend_last(&mut self, partial_response: &str) -> bool {
        let Some(last) = self.messages.last_mut() else {
            self.rejected_amendments += 1;
            tracing::error!("amend_last called on an empty message store");
            return false;
        };

        debug_assert!(
            partial_response.len() >= last.response.len(),
            "streamed response must not shrink"
        );
        last.response.clear();
        last.response.push_str(partial_response);
        true
    }

    /// Installs the server's sequence exactly as given.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
