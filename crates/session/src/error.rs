//! Error types for the account session and its coordinator.

/// Login failures reported by an [`AccountConnector`](crate::AccountConnector).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    /// The credentials were rejected; they must not be reused.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The account service failed for another reason; retrying may help.
    #[error("account service error: {0}")]
    Upstream(String),
}

/// Failures of a single account capability call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    Upstream(String),

    #[error("session closed")]
    Closed,
}

/// Reasons a coordinator command is rejected before it runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Bot is not fully connected yet")]
    NotReady,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    MalformedInput(String),

    #[error("Bot is busy ({0}), please wait")]
    Busy(&'static str),
}

/// Errors reading or writing the credential file.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_errors_read_as_notifications() {
        assert_eq!(SessionError::NotReady.to_string(), "Bot is not fully connected yet");
        assert_eq!(
            SessionError::NotFound("Friend not found".into()).to_string(),
            "Friend not found"
        );
        assert_eq!(
            SessionError::Busy("rebooting").to_string(),
            "Bot is busy (rebooting), please wait"
        );
    }
}
