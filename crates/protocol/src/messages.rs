use serde::{Deserialize, Serialize};

use crate::types::{
    BotInfo, ChatEntry, CosmeticChange, CosmeticEntry, FriendEntry, MemberEntry, RequestEntry,
    VariantEntry,
};

/// Severity carried by a `notification` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Every message the server sends to a viewer.
///
/// Serialized as `{type, ...payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Pong,
    BotInfo {
        info: BotInfo,
    },
    Cosmetics {
        cosmetics: Vec<CosmeticEntry>,
    },
    Friends {
        friends: Vec<FriendEntry>,
    },
    CosmeticChanged {
        cosmetic: CosmeticChange,
    },
    LevelChanged {
        level: u32,
    },
    StatusChanged {
        status: String,
    },
    EmoteStop {
        message: String,
    },
    VariantsData {
        outfit_name: String,
        variants: Vec<VariantEntry>,
    },
    FriendRequest {
        request: RequestEntry,
    },
    PartyInvite {
        invite: RequestEntry,
    },
    Message {
        message: ChatEntry,
    },
    PartyMemberJoined {
        member: MemberEntry,
    },
    SessionState {
        state: String,
        generation: u64,
    },
    Notification {
        message: String,
        message_type: NotificationLevel,
    },
}

impl ServerMessage {
    /// Creates a notification with the given severity.
    pub fn notification(level: NotificationLevel, message: impl Into<String>) -> Self {
        ServerMessage::Notification {
            message: message.into(),
            message_type: level,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::notification(NotificationLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::notification(NotificationLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::notification(NotificationLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::notification(NotificationLevel::Error, message)
    }

    /// Returns the wire `type` of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Pong => "pong",
            ServerMessage::BotInfo { .. } => "botInfo",
            ServerMessage::Cosmetics { .. } => "cosmetics",
            ServerMessage::Friends { .. } => "friends",
            ServerMessage::CosmeticChanged { .. } => "cosmeticChanged",
            ServerMessage::LevelChanged { .. } => "levelChanged",
            ServerMessage::StatusChanged { .. } => "statusChanged",
            ServerMessage::EmoteStop { .. } => "emoteStop",
            ServerMessage::VariantsData { .. } => "variantsData",
            ServerMessage::FriendRequest { .. } => "friendRequest",
            ServerMessage::PartyInvite { .. } => "partyInvite",
            ServerMessage::Message { .. } => "message",
            ServerMessage::PartyMemberJoined { .. } => "partyMemberJoined",
            ServerMessage::SessionState { .. } => "sessionState",
            ServerMessage::Notification { .. } => "notification",
        }
    }

    /// Serializes the message to a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
