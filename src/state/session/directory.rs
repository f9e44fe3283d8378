use super::{SessionController, SessionPhase, SessionUpdate};
use crate::api::ChatBackend;
use crate::error::SessionError;
use crate::types::{Chat, ChatId, DEFAULT_CHAT_TITLE};

impl<B: ChatBackend> SessionController<B> {
    /// Refreshes the chat list. When nothing is selected yet, the first chat
    /// in server order becomes active.
    pub async fn load_chats(&mut self) -> SessionUpdate {
        let chats = match self.backend.list_chats().await {
            Ok(chats) => chats,
            Err(error) => return self.fail(error.into()),
        };

        let count = chats.len();
        let first = chats.first().map(|chat| chat.id);
        self.state.chats = chats;
        self.state.error = None;
        tracing::debug!(count, "chat list loaded");

        if self.state.active_chat.is_none() {
            if let Some(chat_id) = first {
                self.select_chat(chat_id);
            }
        }
        SessionUpdate::ChatsLoaded { count }
    }

    pub async fn create_chat(&mut self) -> SessionUpdate {
        let chat = match self.backend.create_chat(DEFAULT_CHAT_TITLE).await {
            Ok(chat) => chat,
            Err(error) => return self.fail(error.into()),
        };

        let chat_id = chat.id;
        self.supersede();
        self.activate(&chat);
        self.state.chats.insert(0, chat);
        tracing::info!(%chat_id, "chat created");
        SessionUpdate::ChatCreated(chat_id)
    }

    /// Switches to `chat_id`. The message view is emptied at once and the
    /// chat's history is fetched in the background.
    ///
    /// Re-selecting the chat whose response is still streaming is a no-op.
    pub fn select_chat(&mut self, chat_id: ChatId) -> SessionUpdate {
        if self.state.active_chat == Some(chat_id) && self.active_stream.is_some() {
            tracing::debug!(%chat_id, "chat already active with a live stream");
            return SessionUpdate::Ignored;
        }
        self.supersede();
        match self.state.chats.iter().find(|chat| chat.id == chat_id).cloned() {
            Some(chat) => self.activate(&chat),
            None => {
                tracing::warn!(%chat_id, "selected chat is not in the cached list");
                self.state.active_chat = Some(chat_id);
                self.state.messages.clear();
                self.state.title_draft.clear();
                self.state.phase = SessionPhase::ChatLoaded;
                self.state.error = None;
            }
        }
        self.spawn_history_fetch(chat_id);
        tracing::info!(%chat_id, generation = self.generation, "chat selected");
        SessionUpdate::ChatSelected(chat_id)
    }

    /// Saves `title` for the active chat and adopts the title the server
    /// actually stored.
    pub async fn rename_active_chat(&mut self, title: &str) -> SessionUpdate {
        self.state.title_draft = title.to_string();
        let Some(chat_id) = self.state.active_chat else {
            return self.fail(SessionError::NoActiveChat);
        };

        let saved = match self.backend.rename_chat(chat_id, title).await {
            Ok(saved) => saved,
            Err(error) => return self.fail(error.into()),
        };

        if let Some(chat) = self.state.chats.iter_mut().find(|chat| chat.id == chat_id) {
            chat.title = saved.clone();
        }
        if self.state.active_chat == Some(chat_id) {
            self.state.title_draft = saved.clone();
        }
        self.state.error = None;
        SessionUpdate::TitleSaved(saved)
    }

    /// Saves the current title draft for the active chat.
    pub async fn save_title_draft(&mut self) -> SessionUpdate {
        let title = self.state.title_draft.clone();
        self.rename_active_chat(&title).await
    }

    fn activate(&mut self, chat: &Chat) {
        self.state.active_chat = Some(chat.id);
        self.state.title_draft = chat.title.clone();
        self.state.messages.clear();
        self.state.phase = SessionPhase::ChatLoaded;
        self.state.error = None;
    }
}
