use serde::{Deserialize, Serialize};

/// Level shown in a bot info snapshot.
///
/// Serialized as a bare number when known and as a placeholder string
/// (`"N/A"`) when no session is ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BotLevel {
    Known(u32),
    Unknown(String),
}

/// Snapshot of the account session as shown to viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotInfo {
    pub display_name: String,
    pub level: BotLevel,
    pub friend_count: usize,
    pub status: String,
}

impl BotInfo {
    /// Snapshot sent while the session is not ready.
    pub fn offline() -> Self {
        Self {
            display_name: "Not connected".into(),
            level: BotLevel::Unknown("N/A".into()),
            friend_count: 0,
            status: "Offline".into(),
        }
    }
}

/// A cached catalog item as listed to viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CosmeticEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub category: String,
    pub rarity: String,
    pub icon: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub added_at: String,
}

/// Announces the item that was just applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CosmeticChange {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub category: String,
}

/// A friend of the current account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendEntry {
    pub id: String,
    pub display_name: String,
    pub is_online: bool,
}

/// A cached style variant of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantEntry {
    pub channel: String,
    pub tag: String,
    pub name: String,
    pub image: Option<String>,
}

/// A viewer's chosen style for one variant channel.
///
/// Both fields are optional on the wire; incomplete choices are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantChoice {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
}

/// An inbound friend request or party invite, with the auto-accept outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEntry {
    pub id: String,
    pub display_name: String,
    pub accepted: bool,
}

/// A whisper received from a friend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    /// RFC 3339 receive time.
    pub timestamp: String,
}

/// A member that joined the current party.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberEntry {
    pub id: String,
    pub display_name: String,
}
