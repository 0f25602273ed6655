use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::constants::CommandKind;
use crate::types::VariantChoice;

/// Errors produced while decoding an inbound viewer frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    /// The frame is not a JSON object with a string `type`.
    #[error("unparseable message: {0}")]
    Unparseable(String),

    /// The `type` does not name a known command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A required field is missing or has the wrong shape.
    #[error("{0}")]
    MalformedInput(String),
}

impl ProtocolError {
    /// Returns the text shown to the viewer for this error.
    pub fn user_message(&self) -> String {
        match self {
            ProtocolError::Unparseable(_) => "Invalid message format".into(),
            ProtocolError::UnknownCommand(_) => "Unknown command".into(),
            ProtocolError::MalformedInput(msg) => msg.clone(),
        }
    }
}

/// Raw inbound frame: the `type` plus every other field, still untyped.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Envelope {
    /// Parses a text frame into an envelope.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Unparseable(e.to_string()))
    }

    /// Resolves the command kind named by `type`.
    pub fn command_kind(&self) -> Result<CommandKind, ProtocolError> {
        CommandKind::from_wire(&self.kind)
            .ok_or_else(|| ProtocolError::UnknownCommand(self.kind.clone()))
    }

    /// Deserializes the remaining fields into a request type.
    fn fields<T: DeserializeOwned>(&self, missing: &str) -> Result<T, ProtocolError> {
        serde_json::from_value(serde_json::Value::Object(self.fields.clone()))
            .map_err(|_| ProtocolError::MalformedInput(missing.to_string()))
    }
}

/// A fully validated viewer command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    GetBotInfo,
    GetCosmetics,
    GetFriends,
    /// Apply an item to the slot derived from `category`.
    SetCosmetic {
        id: String,
        category: String,
    },
    CheckCosmeticVariants {
        id: String,
        name: String,
    },
    SetOutfitWithVariants {
        outfit_id: String,
        variants: Vec<VariantChoice>,
    },
    StopEmote,
    SetLevel {
        level: u32,
    },
    SetStatus {
        status: String,
    },
    RefreshCosmetics,
    AcceptAllFriends,
    InviteFriend {
        friend_id: String,
    },
    RemoveFriend {
        friend_id: String,
    },
    SendMessage {
        recipient_id: String,
        content: String,
    },
    RebootBot,
    ChangeAccount,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetCosmeticFields {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, alias = "category")]
    cosmetic_type: Option<String>,
}

#[derive(Deserialize)]
struct CheckVariantsFields {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutfitVariantsFields {
    #[serde(default)]
    outfit_id: Option<String>,
    #[serde(default)]
    variants: Option<Vec<VariantChoice>>,
}

#[derive(Deserialize)]
struct LevelFields {
    #[serde(default)]
    level: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct StatusFields {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FriendFields {
    #[serde(default)]
    friend_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageFields {
    #[serde(default)]
    recipient_id: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Treats empty strings the same as absent fields.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Accepts a positive level given as a JSON number or a numeric string.
fn parse_level(value: Option<serde_json::Value>) -> Option<u32> {
    let level = match value? {
        serde_json::Value::Number(n) => n.as_u64()?,
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    if level < 1 {
        return None;
    }
    u32::try_from(level).ok()
}

impl Command {
    /// Validates the envelope's fields for the given command kind.
    pub fn from_envelope(kind: CommandKind, env: &Envelope) -> Result<Command, ProtocolError> {
        let cmd = match kind {
            CommandKind::Ping => Command::Ping,
            CommandKind::GetBotInfo => Command::GetBotInfo,
            CommandKind::GetCosmetics => Command::GetCosmetics,
            CommandKind::GetFriends => Command::GetFriends,
            CommandKind::SetCosmetic => {
                const MISSING: &str = "Missing cosmetic ID or type";
                let f: SetCosmeticFields = env.fields(MISSING)?;
                match (present(f.id), present(f.cosmetic_type)) {
                    (Some(id), Some(category)) => Command::SetCosmetic { id, category },
                    _ => return Err(ProtocolError::MalformedInput(MISSING.into())),
                }
            }
            CommandKind::Outfit
            | CommandKind::Backpack
            | CommandKind::Emote
            | CommandKind::Pickaxe => {
                const MISSING: &str = "Missing cosmetic ID or type";
                let f: SetCosmeticFields = env.fields(MISSING)?;
                let id = present(f.id)
                    .ok_or_else(|| ProtocolError::MalformedInput(MISSING.into()))?;
                Command::SetCosmetic {
                    id,
                    category: kind.as_str().to_string(),
                }
            }
            CommandKind::CheckCosmeticVariants => {
                const MISSING: &str = "Missing cosmetic ID";
                let f: CheckVariantsFields = env.fields(MISSING)?;
                let id = present(f.id)
                    .ok_or_else(|| ProtocolError::MalformedInput(MISSING.into()))?;
                let name = present(f.name).unwrap_or_else(|| id.clone());
                Command::CheckCosmeticVariants { id, name }
            }
            CommandKind::SetOutfitWithVariants => {
                const MISSING: &str = "Missing outfit ID";
                let f: OutfitVariantsFields = env.fields(MISSING)?;
                let outfit_id = present(f.outfit_id)
                    .ok_or_else(|| ProtocolError::MalformedInput(MISSING.into()))?;
                Command::SetOutfitWithVariants {
                    outfit_id,
                    variants: f.variants.unwrap_or_default(),
                }
            }
            CommandKind::StopEmote => Command::StopEmote,
            CommandKind::SetLevel => {
                const INVALID: &str = "Invalid level (minimum 1)";
                let f: LevelFields = env.fields(INVALID)?;
                let level = parse_level(f.level)
                    .ok_or_else(|| ProtocolError::MalformedInput(INVALID.into()))?;
                Command::SetLevel { level }
            }
            CommandKind::SetStatus => {
                const MISSING: &str = "Missing status message";
                let f: StatusFields = env.fields(MISSING)?;
                let status = present(f.status)
                    .ok_or_else(|| ProtocolError::MalformedInput(MISSING.into()))?;
                Command::SetStatus { status }
            }
            CommandKind::RefreshCosmetics => Command::RefreshCosmetics,
            CommandKind::AcceptAllFriends => Command::AcceptAllFriends,
            CommandKind::InviteFriend | CommandKind::RemoveFriend => {
                const MISSING: &str = "Missing friend ID";
                let f: FriendFields = env.fields(MISSING)?;
                let friend_id = present(f.friend_id)
                    .ok_or_else(|| ProtocolError::MalformedInput(MISSING.into()))?;
                if kind == CommandKind::InviteFriend {
                    Command::InviteFriend { friend_id }
                } else {
                    Command::RemoveFriend { friend_id }
                }
            }
            CommandKind::SendMessage => {
                const MISSING: &str = "Missing recipient ID or message content";
                let f: MessageFields = env.fields(MISSING)?;
                match (present(f.recipient_id), present(f.content)) {
                    (Some(recipient_id), Some(content)) => Command::SendMessage {
                        recipient_id,
                        content,
                    },
                    _ => return Err(ProtocolError::MalformedInput(MISSING.into())),
                }
            }
            CommandKind::RebootBot => Command::RebootBot,
            CommandKind::ChangeAccount => Command::ChangeAccount,
        };
        Ok(cmd)
    }

    /// Parses and validates a text frame in one step.
    pub fn parse(text: &str) -> Result<Command, ProtocolError> {
        let env = Envelope::parse(text)?;
        let kind = env.command_kind()?;
        Command::from_envelope(kind, &env)
    }
}
