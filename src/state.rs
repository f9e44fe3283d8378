mod message_store;
mod session;

pub use message_store::MessageStore;
pub use session::{SessionController, SessionEvent, SessionPhase, SessionState, SessionUpdate};
