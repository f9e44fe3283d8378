pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod state;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;

pub use api::{ApiClient, ChatBackend};
pub use error::{SessionError, TransportError};
pub use state::{MessageStore, SessionController, SessionEvent, SessionPhase, SessionUpdate};
