use std::time::Duration;

/// Time to wait for a pong response (or any incoming frame).
///
/// Acts as a read deadline: a viewer that sends nothing at all within this
/// window is considered dead and its channel is closed.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often the server pings each viewer (must be < `WS_PONG_WAIT`).
pub const WS_PING_PERIOD: Duration = Duration::from_secs(20);

/// Maximum inbound message size in bytes (1 MB).
///
/// Viewer commands are small JSON objects; anything larger is a protocol
/// violation.
pub const WS_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Command type carried in the `type` field of an inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Ping,
    GetBotInfo,
    GetCosmetics,
    GetFriends,
    SetCosmetic,
    // Legacy single-slot aliases of `setCosmetic`.
    Outfit,
    Backpack,
    Emote,
    Pickaxe,
    CheckCosmeticVariants,
    SetOutfitWithVariants,
    StopEmote,
    SetLevel,
    SetStatus,
    RefreshCosmetics,
    AcceptAllFriends,
    InviteFriend,
    RemoveFriend,
    SendMessage,
    RebootBot,
    ChangeAccount,
}

impl CommandKind {
    /// Every known command kind, in wire-table order.
    pub const ALL: [CommandKind; 21] = [
        CommandKind::Ping,
        CommandKind::GetBotInfo,
        CommandKind::GetCosmetics,
        CommandKind::GetFriends,
        CommandKind::SetCosmetic,
        CommandKind::Outfit,
        CommandKind::Backpack,
        CommandKind::Emote,
        CommandKind::Pickaxe,
        CommandKind::CheckCosmeticVariants,
        CommandKind::SetOutfitWithVariants,
        CommandKind::StopEmote,
        CommandKind::SetLevel,
        CommandKind::SetStatus,
        CommandKind::RefreshCosmetics,
        CommandKind::AcceptAllFriends,
        CommandKind::InviteFriend,
        CommandKind::RemoveFriend,
        CommandKind::SendMessage,
        CommandKind::RebootBot,
        CommandKind::ChangeAccount,
    ];

    /// Returns the wire name of this command.
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Ping => "ping",
            CommandKind::GetBotInfo => "getBotInfo",
            CommandKind::GetCosmetics => "getCosmetics",
            CommandKind::GetFriends => "getFriends",
            CommandKind::SetCosmetic => "setCosmetic",
            CommandKind::Outfit => "outfit",
            CommandKind::Backpack => "backpack",
            CommandKind::Emote => "emote",
            CommandKind::Pickaxe => "pickaxe",
            CommandKind::CheckCosmeticVariants => "checkCosmeticVariants",
            CommandKind::SetOutfitWithVariants => "setOutfitWithVariants",
            CommandKind::StopEmote => "stopEmote",
            CommandKind::SetLevel => "setLevel",
            CommandKind::SetStatus => "setStatus",
            CommandKind::RefreshCosmetics => "refreshCosmetics",
            CommandKind::AcceptAllFriends => "acceptAllFriends",
            CommandKind::InviteFriend => "inviteFriend",
            CommandKind::RemoveFriend => "removeFriend",
            CommandKind::SendMessage => "sendMessage",
            CommandKind::RebootBot => "rebootBot",
            CommandKind::ChangeAccount => "changeAccount",
        }
    }

    /// Looks up a command by its wire name.
    pub fn from_wire(name: &str) -> Option<CommandKind> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Returns `true` if the command needs a ready account session.
    ///
    /// These commands are rejected outright (never queued) while the
    /// session is in any state other than ready.
    pub fn requires_session(self) -> bool {
        matches!(
            self,
            CommandKind::SetCosmetic
                | CommandKind::Outfit
                | CommandKind::Backpack
                | CommandKind::Emote
                | CommandKind::Pickaxe
                | CommandKind::CheckCosmeticVariants
                | CommandKind::SetOutfitWithVariants
                | CommandKind::StopEmote
                | CommandKind::SetLevel
                | CommandKind::SetStatus
                | CommandKind::AcceptAllFriends
                | CommandKind::InviteFriend
                | CommandKind::RemoveFriend
                | CommandKind::SendMessage
        )
    }
}
