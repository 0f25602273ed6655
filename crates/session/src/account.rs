//! Capability boundary of the external account service.
//!
//! The remote protocol itself lives behind [`AccountConnector`] and
//! [`AccountSession`]; the coordinator only sees typed calls and a stream of
//! [`AccountEvent`]s.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::credentials::Credentials;
use crate::error::{AccountError, AuthError};

/// Boxed future returned by [`AccountSession`] calls.
pub type AccountFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AccountError>> + Send + 'a>>;

/// Boxed future returned by [`AccountConnector::login`].
pub type LoginFuture<'a> = Pin<Box<dyn Future<Output = Result<LoginOutcome, AuthError>> + Send + 'a>>;

/// Equipment slot an item is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Outfit,
    Backpack,
    Emote,
    Pickaxe,
}

impl Slot {
    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Outfit => "outfit",
            Slot::Backpack => "backpack",
            Slot::Emote => "emote",
            Slot::Pickaxe => "pickaxe",
        }
    }

    /// Maps a category name to its slot. Only the four equipable
    /// categories have one.
    pub fn from_category(category: &str) -> Option<Slot> {
        match category.to_ascii_lowercase().as_str() {
            "outfit" => Some(Slot::Outfit),
            "backpack" => Some(Slot::Backpack),
            "emote" => Some(Slot::Emote),
            "pickaxe" => Some(Slot::Pickaxe),
            _ => None,
        }
    }
}

/// One style choice: the variant `tag` for a `channel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Style {
    pub channel: String,
    pub tag: String,
}

/// A friend of the logged-in account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Friend {
    pub id: String,
    pub display_name: String,
    pub is_online: bool,
}

/// An inbound friend request waiting for an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFriend {
    pub id: String,
    pub display_name: String,
}

/// Domain events pushed by the account service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    FriendRequest {
        id: String,
        display_name: String,
    },
    FriendMessage {
        sender_id: String,
        sender_name: String,
        content: String,
    },
    PartyInvite {
        id: String,
        sender_name: String,
    },
    FriendPresence {
        id: String,
        display_name: String,
        is_online: bool,
    },
    PartyMemberJoined {
        id: String,
        display_name: String,
    },
}

/// A logged-in account.
///
/// Getters read the locally tracked view of the account and never block.
pub trait AccountSession: Send + Sync {
    fn display_name(&self) -> String;

    fn level(&self) -> u32;

    fn friends(&self) -> Vec<Friend>;

    /// Inbound friend requests that have not been answered.
    fn pending_friends(&self) -> Vec<PendingFriend>;

    fn apply_cosmetic<'a>(
        &'a self,
        slot: Slot,
        id: &'a str,
        styles: &'a [Style],
    ) -> AccountFuture<'a, ()>;

    fn set_level(&self, level: u32) -> AccountFuture<'_, ()>;

    /// Stops the emote currently playing.
    fn clear_emote(&self) -> AccountFuture<'_, ()>;

    fn set_status<'a>(&'a self, status: &'a str) -> AccountFuture<'a, ()>;

    fn accept_friend_request<'a>(&'a self, id: &'a str) -> AccountFuture<'a, ()>;

    fn accept_party_invite<'a>(&'a self, id: &'a str) -> AccountFuture<'a, ()>;

    fn invite_friend<'a>(&'a self, id: &'a str) -> AccountFuture<'a, ()>;

    fn remove_friend<'a>(&'a self, id: &'a str) -> AccountFuture<'a, ()>;

    fn send_message<'a>(&'a self, id: &'a str, content: &'a str) -> AccountFuture<'a, ()>;

    fn logout(&self) -> AccountFuture<'_, ()>;
}

/// A successful login: the session and its event stream.
///
/// The stream ends when the account connection is lost.
pub struct LoginOutcome {
    pub session: Arc<dyn AccountSession>,
    pub events: mpsc::Receiver<AccountEvent>,
}

/// Opens account sessions.
pub trait AccountConnector: Send + Sync {
    fn login<'a>(&'a self, credentials: &'a Credentials) -> LoginFuture<'a>;
}
