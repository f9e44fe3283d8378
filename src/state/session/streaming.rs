use super::{SessionController, SessionEvent};
use crate::api::stream::StreamDecoder;
use crate::api::{ByteStream, ChatBackend};
use crate::types::{ChatId, MessageId};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The one response currently being accumulated.
pub(crate) struct ActiveStream {
    pub(super) generation: u64,
    pub(super) chat_id: ChatId,
    pub(super) target: MessageId,
    pub(super) decoder: StreamDecoder,
    pub(super) accumulated: String,
    /// History was superseded when this stream started.
    pub(super) refetch_on_failure: bool,
    pub(super) cancel: CancellationToken,
}

impl<B: ChatBackend> SessionController<B> {
    /// Starts a new generation: cancels the in-flight stream, if any, and
    /// makes every outstanding event stale.
    pub(super) fn supersede(&mut self) {
        self.generation += 1;
        self.history_pending = false;
        let Some(stream) = self.active_stream.take() else {
            return;
        };
        stream.cancel.cancel();
        tracing::debug!(
            chat_id = %stream.chat_id,
            generation = stream.generation,
            received = stream.accumulated.len(),
            "cancelled in-flight stream"
        );
    }

    /// Fetches `chat_id`'s history in the background under the current generation.
    pub(super) fn spawn_history_fetch(&mut self, chat_id: ChatId) {
        self.history_pending = true;
        let backend = self.backend.clone();
        let events_tx = self.events_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = backend.fetch_messages(chat_id).await;
            let _ = events_tx.send(SessionEvent::HistoryFetched {
                generation,
                chat_id,
                result,
            });
        });
    }
}

/// Forwards body chunks as session events until the body ends, fails, or
/// `cancel` fires. Nothing is forwarded once cancellation is observed, and
/// the body (with its connection) is dropped on exit.
pub(super) fn spawn_stream_pump(
    generation: u64,
    mut stream: ByteStream,
    cancel: CancellationToken,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
) {
    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = stream.next() => next,
            };
            if cancel.is_cancelled() {
                break;
            }

            let (event, done) = match next {
                Some(Ok(chunk)) => (SessionEvent::StreamChunk { generation, chunk }, false),
                Some(Err(error)) => (SessionEvent::StreamFailed { generation, error }, true),
                None => (SessionEvent::StreamClosed { generation }, true),
            };
            if events_tx.send(event).is_err() || done {
                return;
            }
        }
        tracing::debug!(generation, "stream pump stopped after cancellation");
    });
}
