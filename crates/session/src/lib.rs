//! Session lifecycle for the external account service.
//!
//! The [`SessionCoordinator`] owns the account connection and its state
//! machine. It is driven from a single loop: commands are called directly,
//! while results of account calls, login attempts and account events come
//! back as generation-tagged [`Signal`]s. Anything viewers should see is
//! emitted as a [`SessionNotice`].

pub mod account;
pub mod coordinator;
pub mod credentials;
pub mod error;
pub mod rotation;
pub mod sandbox;
pub mod state;

pub use account::{
    AccountConnector, AccountEvent, AccountFuture, AccountSession, Friend, LoginFuture,
    LoginOutcome, PendingFriend, Slot, Style,
};
pub use coordinator::{Presentation, SessionConfig, SessionCoordinator, SessionNotice, Signal};
pub use credentials::{CredentialPrompt, CredentialStore, Credentials, PromptFuture};
pub use error::{AccountError, AuthError, CredentialError, SessionError};
pub use rotation::StatusRotation;
pub use sandbox::{SandboxCall, SandboxConnector};
pub use state::SessionState;
