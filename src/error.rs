use thiserror::Error;

/// Shown when the backend gives no usable error text of its own.
pub const GENERIC_FAILURE_MESSAGE: &str = "An error occurred while fetching the response.";

/// Failure talking to the chat backend.
///
/// Everything is stored as owned strings so the error can travel through the
/// session event channel and be cloned into a `SessionUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Non-success status. `message` is the `{error}` field of the body, if any.
    #[error("backend returned HTTP {status}: {}", .message.as_deref().unwrap_or(GENERIC_FAILURE_MESSAGE))]
    Status { status: u16, message: Option<String> },

    #[error("cannot reach chat backend '{url}': {reason}")]
    Connect { url: String, reason: String },

    #[error("request to '{url}' timed out")]
    Timeout { url: String },

    #[error("request to '{url}' failed: {reason}")]
    Request { url: String, reason: String },

    #[error("invalid response from '{url}': {reason}")]
    InvalidBody { url: String, reason: String },
}

impl TransportError {
    /// Text for the error line of the UI: the server's own words when it sent
    /// any, the generic failure message otherwise.
    pub fn user_message(&self) -> String {
        match self {
            TransportError::Status {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("select or create a chat first")]
    NoActiveChat,

    #[error("{0}")]
    InvalidSetting(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SessionError {
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Transport(error) => error.user_message(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_surfaces_server_text_verbatim() {
        let error = TransportError::Status {
            status: 500,
            message: Some("rate limited".to_string()),
        };
        assert_eq!(error.user_message(), "rate limited");
        assert_eq!(
            SessionError::from(error).user_message(),
            "rate limited".to_string()
        );
    }

    #[test]
    fn test_errors_without_server_text_use_generic_message() {
        let missing = TransportError::Status {
            status: 502,
            message: None,
        };
        assert_eq!(missing.user_message(), GENERIC_FAILURE_MESSAGE);

        let network = TransportError::Connect {
            url: "http://localhost:5000/api/chat".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(network.user_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[test]
    fn test_no_active_chat_message() {
        assert_eq!(
            SessionError::NoActiveChat.user_message(),
            "select or create a chat first"
        );
    }
}
