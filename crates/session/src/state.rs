/// Lifecycle state of the account session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No login attempted yet.
    Uninitialized,
    /// Login in progress.
    Authenticating,
    /// Logged in; session commands are accepted.
    Ready,
    /// Tearing down the current session before logging in again.
    Rebooting,
    /// As `Rebooting`, with stored credentials discarded.
    ChangingAccount,
    /// Login failed or the connection was lost. Left by reboot or
    /// account change.
    Failed { reason: String },
}

impl SessionState {
    /// Returns the wire name of the state.
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Authenticating => "authenticating",
            SessionState::Ready => "ready",
            SessionState::Rebooting => "rebooting",
            SessionState::ChangingAccount => "changingAccount",
            SessionState::Failed { .. } => "failed",
        }
    }

    /// Returns `true` while a login or teardown is under way.
    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            SessionState::Authenticating | SessionState::Rebooting | SessionState::ChangingAccount
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Failed { reason } => write!(f, "failed ({reason})"),
            other => f.write_str(other.name()),
        }
    }
}
