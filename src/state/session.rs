mod core;
mod directory;
mod state;
mod streaming;


pub use state::{SessionController, SessionEvent, SessionPhase, SessionState, SessionUpdate};
