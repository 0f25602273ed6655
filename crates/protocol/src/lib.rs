//! Wire protocol spoken between lobbyhost and its connected viewers.
//!
//! Every frame is a JSON object of the form `{type, ...fields}`. Inbound
//! frames are parsed in two steps so the server can gate on the command
//! kind before validating its fields: [`Envelope::parse`] followed by
//! [`Command::from_envelope`].

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;
pub mod viewer;

// Re-export primary types for convenience.
pub use constants::CommandKind;
pub use envelope::{Command, Envelope, ProtocolError};
pub use messages::{NotificationLevel, ServerMessage};
pub use types::{
    BotInfo, BotLevel, ChatEntry, CosmeticChange, CosmeticEntry, FriendEntry, MemberEntry,
    RequestEntry, VariantChoice, VariantEntry,
};
pub use viewer::ViewerId;
