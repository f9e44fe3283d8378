use super::streaming::{spawn_stream_pump, ActiveStream};
use super::{SessionController, SessionEvent, SessionPhase, SessionUpdate};
use crate::api::stream::StreamDecoder;
use crate::api::ChatBackend;
use crate::error::{SessionError, TransportError};
use crate::types::{ChatId, Message, PromptRequest};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

impl<B: ChatBackend> SessionController<B> {
    /// Sends the current input as a prompt to the active chat.
    ///
    /// The input is cleared and an optimistic message appended only once the
    /// backend has accepted the stream. Acceptance also supersedes the prior
    /// in-flight stream and any history fetch still outstanding. A rejected
    /// prompt changes neither.
    pub async fn submit_prompt(&mut self) -> SessionUpdate {
        let Some(chat_id) = self.state.active_chat else {
            return self.fail(SessionError::NoActiveChat);
        };

        self.state.error = None;
        let prompt = self.state.input.clone();
        let request = PromptRequest::new(chat_id, &prompt, &self.state.settings);
        let stream = match self.backend.open_prompt_stream(&request).await {
            Ok(stream) => stream,
            Err(error) => return self.fail(error.into()),
        };

        // Whatever history is about to go stale must be fetched again if
        // this stream never reaches reconciliation.
        let refetch_on_failure = self.history_pending || self.state.messages.has_provisional();
        self.supersede();
        let generation = self.generation;

        let message = Message::provisional(chat_id, &prompt, &self.state.settings);
        let target = message.id;
        self.state.messages.append(message);
        self.state.input.clear();
        self.state.decode_warning = None;
        self.state.phase = SessionPhase::Streaming;

        let cancel = CancellationToken::new();
        spawn_stream_pump(generation, stream, cancel.clone(), self.events_tx.clone());
        self.active_stream = Some(ActiveStream {
            generation,
            chat_id,
            target,
            decoder: StreamDecoder::new(),
            accumulated: String::new(),
            refetch_on_failure,
            cancel,
        });

        tracing::info!(%chat_id, generation, "prompt stream opened");
        SessionUpdate::StreamStarted { generation }
    }

    /// Stops the in-flight response without recording an error. The partial
    /// text stays visible until the chat's history replaces it.
    pub fn cancel_stream(&mut self) -> SessionUpdate {
        if self.active_stream.is_none() {
            return SessionUpdate::Ignored;
        }
        self.supersede();
        self.state.phase = SessionPhase::ChatLoaded;
        if let Some(chat_id) = self.state.active_chat {
            self.spawn_history_fetch(chat_id);
        }
        SessionUpdate::Cancelled
    }

    /// Applies one background result. Events from a superseded generation
    /// are dropped without touching state.
    pub fn handle_event(&mut self, event: SessionEvent) -> SessionUpdate {
        if event.generation() != self.generation {
            tracing::debug!(
                event_generation = event.generation(),
                current_generation = self.generation,
                "dropping stale session event"
            );
            return SessionUpdate::Ignored;
        }

        match event {
            SessionEvent::StreamChunk { chunk, .. } => self.apply_chunk(&chunk),
            SessionEvent::StreamClosed { .. } => self.close_stream(),
            SessionEvent::StreamFailed { error, .. } => self.abort_stream(error),
            SessionEvent::HistoryFetched {
                chat_id, result, ..
            } => self.install_history(chat_id, result),
        }
    }

    fn apply_chunk(&mut self, chunk: &Bytes) -> SessionUpdate {
        let Some(active) = self.active_stream.as_mut() else {
            return SessionUpdate::Ignored;
        };

        let fragment = active.decoder.feed(chunk);
        if fragment.is_empty() {
            return SessionUpdate::Ignored;
        }

        if self.state.messages.last().map(|message| message.id) != Some(active.target) {
            tracing::error!(
                generation = active.generation,
                "streamed fragment has no placeholder to amend"
            );
            return SessionUpdate::Ignored;
        }

        active.accumulated.push_str(&fragment);
        self.state.messages.amend_last(&active.accumulated);
        SessionUpdate::Fragment(fragment)
    }

    fn close_stream(&mut self) -> SessionUpdate {
        let Some(mut active) = self.active_stream.take() else {
            return SessionUpdate::Ignored;
        };

        let flush = active.decoder.finish();
        if !flush.text.is_empty() {
            active.accumulated.push_str(&flush.text);
            self.state.messages.amend_last(&active.accumulated);
        }
        if let Some(truncation) = flush.truncation {
            tracing::warn!(
                dropped_bytes = truncation.dropped_bytes,
                "response ended inside a multi-byte character"
            );
            self.state.decode_warning = Some(truncation);
        }

        tracing::info!(
            chat_id = %active.chat_id,
            generation = active.generation,
            bytes = active.accumulated.len(),
            "stream finished, reconciling"
        );
        self.state.phase = SessionPhase::Reconciling;
        self.spawn_history_fetch(active.chat_id);
        SessionUpdate::Reconciling
    }

    fn abort_stream(&mut self, error: TransportError) -> SessionUpdate {
        self.state.phase = SessionPhase::ChatLoaded;
        if let Some(active) = self.active_stream.take() {
            if let Some(truncation) = active.decoder.finish().truncation {
                self.state.decode_warning = Some(truncation);
            }
            if active.refetch_on_failure {
                tracing::debug!(
                    chat_id = %active.chat_id,
                    "refetching history superseded by failed stream"
                );
                self.spawn_history_fetch(active.chat_id);
            }
        }
        self.fail(error.into())
    }

    fn install_history(
        &mut self,
        chat_id: ChatId,
        result: Result<Vec<Message>, TransportError>,
    ) -> SessionUpdate {
        self.history_pending = false;
        if self.state.active_chat != Some(chat_id) {
            return SessionUpdate::Ignored;
        }

        let reconciling = self.state.phase == SessionPhase::Reconciling
            || self.state.messages.has_provisional();
        self.state.phase = SessionPhase::ChatLoaded;
        match result {
            Ok(messages) => {
                self.state.messages.replace_all(messages);
                if reconciling {
                    SessionUpdate::Reconciled
                } else {
                    SessionUpdate::HistoryLoaded(chat_id)
                }
            }
            Err(error) => self.fail(error.into()),
        }
    }
}
