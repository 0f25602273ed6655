//! Single-loop command dispatcher.
//!
//! One task owns the [`BroadcastHub`] and the [`SessionCoordinator`] and
//! processes viewer frames, session signals and catalog completions one at
//! a time. Anything that waits on the network runs as a spawned task and
//! reports back through a channel, so handlers never interleave.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use lobbyhost_catalog::{CatalogCache, CatalogError, Category, Item, ReconcileReport, Variant};
use lobbyhost_protocol::{
    Command, CosmeticChange, CosmeticEntry, Envelope, ServerMessage, VariantChoice, VariantEntry,
    ViewerId,
};
use lobbyhost_session::{
    SessionCoordinator, SessionError, SessionNotice, Signal, Slot, Style,
};

use crate::ServerError;
use crate::connection::Sender;
use crate::hub::BroadcastHub;

/// Events delivered to the dispatcher by viewer connections.
pub enum Inbound {
    Connected { viewer: ViewerId, sender: Sender },
    Frame { viewer: ViewerId, text: String },
    Disconnected { viewer: ViewerId },
}

enum CatalogDone {
    Refreshed {
        origin: Option<ViewerId>,
        result: Result<ReconcileReport, CatalogError>,
    },
    Variants {
        origin: ViewerId,
        name: String,
        variants: Vec<Variant>,
    },
}

/// Owns the viewer registry and the session and routes every command.
pub struct Dispatcher {
    hub: BroadcastHub,
    session: SessionCoordinator,
    catalog: Arc<CatalogCache>,
    inbound: mpsc::Receiver<Inbound>,
    signals: mpsc::UnboundedReceiver<Signal>,
    notices: mpsc::UnboundedReceiver<SessionNotice>,
    catalog_tx: mpsc::UnboundedSender<CatalogDone>,
    catalog_rx: mpsc::UnboundedReceiver<CatalogDone>,
    refreshing: bool,
}

impl Dispatcher {
    pub fn new(
        mut session: SessionCoordinator,
        catalog: Arc<CatalogCache>,
        inbound: mpsc::Receiver<Inbound>,
    ) -> Result<Self, ServerError> {
        let signals = session.take_signals().ok_or(ServerError::SessionAttached)?;
        let notices = session.take_notices().ok_or(ServerError::SessionAttached)?;
        let (catalog_tx, catalog_rx) = mpsc::unbounded_channel();

        Ok(Self {
            hub: BroadcastHub::new(),
            session,
            catalog,
            inbound,
            signals,
            notices,
            catalog_tx,
            catalog_rx,
            refreshing: false,
        })
    }

    /// Starts a background catalog refresh. The result is reported to
    /// `origin` (if any) and the new listing is broadcast.
    pub fn refresh_catalog(&mut self, origin: Option<ViewerId>) {
        if self.refreshing {
            if let Some(viewer) = origin {
                self.reply(viewer, ServerMessage::info("Cosmetics refresh already in progress"));
            }
            return;
        }
        self.refreshing = true;
        if let Some(viewer) = origin {
            self.reply(viewer, ServerMessage::info("Refreshing cosmetics database..."));
        }

        info!("refreshing catalog");
        let catalog = self.catalog.clone();
        let tx = self.catalog_tx.clone();
        tokio::spawn(async move {
            let result = catalog.refresh().await;
            let _ = tx.send(CatalogDone::Refreshed { origin, result });
        });
    }

    /// Runs until `cancel` fires or every connection source is gone, then
    /// logs the account session out.
    pub async fn run(mut self, cancel: CancellationToken) {
        self.session.start();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                Some(notice) = self.notices.recv() => self.deliver(notice),

                Some(signal) = self.signals.recv() => self.session.handle_signal(signal),

                Some(done) = self.catalog_rx.recv() => self.finish_catalog(done),

                inbound = self.inbound.recv() => match inbound {
                    Some(event) => self.handle_inbound(event),
                    None => break,
                },
            }
        }

        info!("dispatcher stopping");
        self.session.shutdown().await;
        while let Ok(notice) = self.notices.try_recv() {
            self.deliver(notice);
        }
    }

    fn handle_inbound(&mut self, event: Inbound) {
        match event {
            Inbound::Connected { viewer, sender } => {
                self.hub.register(viewer, sender);
            }
            Inbound::Disconnected { viewer } => {
                self.hub.unregister(viewer);
            }
            Inbound::Frame { viewer, text } => self.handle_frame(viewer, &text),
        }
    }

    /// Parses, gates and executes one viewer frame.
    fn handle_frame(&mut self, viewer: ViewerId, text: &str) {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(%viewer, "invalid message: {e}");
                self.reply(viewer, ServerMessage::error(e.user_message()));
                return;
            }
        };

        let kind = match envelope.command_kind() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(%viewer, command = %envelope.kind, "unknown command");
                self.reply(viewer, ServerMessage::error(e.user_message()));
                return;
            }
        };

        if kind.requires_session() && !self.session.is_ready() {
            debug!(%viewer, command = kind.as_str(), state = %self.session.state(), "rejected, session not ready");
            self.reply(viewer, ServerMessage::error(SessionError::NotReady.to_string()));
            return;
        }

        let command = match Command::from_envelope(kind, &envelope) {
            Ok(command) => command,
            Err(e) => {
                debug!(%viewer, command = kind.as_str(), "malformed command: {e}");
                self.reply(viewer, ServerMessage::error(e.user_message()));
                return;
            }
        };

        trace!(%viewer, ?command, "dispatching");
        if let Err(e) = self.execute(viewer, command) {
            debug!(%viewer, command = kind.as_str(), "command rejected: {e}");
            self.reply(viewer, ServerMessage::error(e.to_string()));
        }
    }

    fn execute(&mut self, viewer: ViewerId, command: Command) -> Result<(), SessionError> {
        match command {
            Command::Ping => self.reply(viewer, ServerMessage::Pong),
            Command::GetBotInfo => {
                let info = self.session.bot_info();
                self.reply(viewer, ServerMessage::BotInfo { info });
            }
            Command::GetCosmetics => {
                let cosmetics = self.cosmetic_entries();
                self.reply(viewer, ServerMessage::Cosmetics { cosmetics });
            }
            Command::GetFriends => {
                let friends = self.session.friends();
                self.reply(viewer, ServerMessage::Friends { friends });
            }
            Command::SetCosmetic { id, category } => self.apply_cosmetic(viewer, id, category)?,
            Command::CheckCosmeticVariants { id, name } => self.lookup_variants(viewer, id, name),
            Command::SetOutfitWithVariants {
                outfit_id,
                variants,
            } => {
                let item = self.ensure_item(&outfit_id, Category::Outfit);
                let change = CosmeticChange {
                    id: item.id,
                    name: item.name,
                    category: Category::Outfit.as_str().into(),
                };
                self.session
                    .apply_outfit_with_styles(viewer, change, styles_from(&variants))?;
            }
            Command::StopEmote => self.session.clear_emote(viewer)?,
            Command::SetLevel { level } => self.session.set_level(viewer, level)?,
            Command::SetStatus { status } => self.session.set_status(viewer, status)?,
            Command::RefreshCosmetics => self.refresh_catalog(Some(viewer)),
            Command::AcceptAllFriends => self.session.accept_all_friends(viewer)?,
            Command::InviteFriend { friend_id } => self.session.invite_friend(viewer, &friend_id)?,
            Command::RemoveFriend { friend_id } => self.session.remove_friend(viewer, &friend_id)?,
            Command::SendMessage {
                recipient_id,
                content,
            } => self.session.send_message(viewer, &recipient_id, content)?,
            Command::RebootBot => self.session.reboot(viewer)?,
            Command::ChangeAccount => self.session.change_account(viewer)?,
        }
        Ok(())
    }

    fn apply_cosmetic(
        &mut self,
        viewer: ViewerId,
        id: String,
        requested: String,
    ) -> Result<(), SessionError> {
        let category = Category::from_remote(&requested);
        let item = self.ensure_item(&id, category);

        let slot = match Slot::from_category(category.as_str()) {
            Some(slot) => slot,
            None => {
                warn!(%viewer, item = %id, category = %requested, "unsupported category, applying as outfit");
                self.reply(
                    viewer,
                    ServerMessage::warning(format!(
                        "Unsupported cosmetic type: {requested}, attempting to apply as outfit"
                    )),
                );
                Slot::Outfit
            }
        };

        let change = CosmeticChange {
            id: item.id,
            name: item.name,
            category: category.as_str().into(),
        };
        self.session.apply_item(viewer, slot, change)
    }

    /// Returns the stored item, creating a placeholder if unknown. A store
    /// failure is logged and does not block the apply.
    fn ensure_item(&self, id: &str, category: Category) -> Item {
        match self.catalog.ensure_item(id, category) {
            Ok(item) => item,
            Err(e) => {
                error!(item = %id, error = %e, "failed to record item");
                Item::placeholder(id, category)
            }
        }
    }

    fn lookup_variants(&mut self, viewer: ViewerId, id: String, name: String) {
        let catalog = self.catalog.clone();
        let tx = self.catalog_tx.clone();
        tokio::spawn(async move {
            let variants = catalog.resolve_variants(&id).await;
            let _ = tx.send(CatalogDone::Variants {
                origin: viewer,
                name,
                variants,
            });
        });
    }

    fn finish_catalog(&mut self, done: CatalogDone) {
        match done {
            CatalogDone::Variants {
                origin,
                name,
                variants,
            } => {
                let variants = variants.into_iter().map(variant_entry).collect();
                self.reply(
                    origin,
                    ServerMessage::VariantsData {
                        outfit_name: name,
                        variants,
                    },
                );
            }
            CatalogDone::Refreshed { origin, result } => {
                self.refreshing = false;
                match result {
                    Ok(report) => {
                        info!(
                            added = report.added,
                            updated = report.updated,
                            skipped = report.skipped,
                            "catalog refreshed"
                        );
                        let cosmetics = self.cosmetic_entries();
                        self.broadcast(ServerMessage::Cosmetics { cosmetics });
                        if let Some(viewer) = origin {
                            self.reply(
                                viewer,
                                ServerMessage::success(format!(
                                    "Cosmetics database refreshed successfully ({} added, {} updated, {} skipped)",
                                    report.added, report.updated, report.skipped
                                )),
                            );
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "catalog refresh failed");
                        if let Some(viewer) = origin {
                            self.reply(
                                viewer,
                                ServerMessage::error(format!("Failed to refresh cosmetics: {e}")),
                            );
                        }
                    }
                }
            }
        }
    }

    fn deliver(&mut self, notice: SessionNotice) {
        match notice {
            SessionNotice::Reply { to, message } => self.reply(to, message),
            SessionNotice::Broadcast(message) => self.broadcast(message),
        }
    }

    fn reply(&mut self, viewer: ViewerId, message: ServerMessage) {
        self.hub.send_to(viewer, &message);
    }

    fn broadcast(&mut self, message: ServerMessage) {
        self.hub.broadcast_all(&message);
    }

    fn cosmetic_entries(&self) -> Vec<CosmeticEntry> {
        self.catalog.items().iter().map(cosmetic_entry).collect()
    }
}

/// Builds the style list from choices that name both a channel and a
/// variant. A later choice for the same channel replaces an earlier one.
fn styles_from(choices: &[VariantChoice]) -> Vec<Style> {
    let mut styles: Vec<Style> = Vec::new();
    for choice in choices {
        let (Some(channel), Some(tag)) = (&choice.channel, &choice.variant) else {
            continue;
        };
        if channel.is_empty() || tag.is_empty() {
            continue;
        }
        match styles.iter_mut().find(|s| s.channel == *channel) {
            Some(style) => style.tag = tag.clone(),
            None => styles.push(Style {
                channel: channel.clone(),
                tag: tag.clone(),
            }),
        }
    }
    styles
}

fn cosmetic_entry(item: &Item) -> CosmeticEntry {
    CosmeticEntry {
        id: item.id.clone(),
        name: item.name.clone(),
        category: item.category.as_str().into(),
        rarity: item.rarity.clone(),
        icon: item.icon.clone(),
        added_at: item.added_at.to_rfc3339(),
    }
}

fn variant_entry(variant: Variant) -> VariantEntry {
    VariantEntry {
        channel: variant.channel,
        tag: variant.tag,
        name: variant.name,
        image: variant.image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use lobbyhost_catalog::{
        CatalogSource, CatalogStore, RawItem, RawVariantChannel, RawVariantOption, SourceFuture,
        SqliteCatalogStore,
    };
    use lobbyhost_protocol::{BotInfo, NotificationLevel};
    use lobbyhost_session::{
        CredentialPrompt, CredentialStore, Credentials, Friend, PromptFuture, SandboxCall,
        SandboxConnector, SessionConfig,
    };
    use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

    struct StaticSource {
        listing: Vec<RawItem>,
        channels: Vec<RawVariantChannel>,
    }

    impl CatalogSource for StaticSource {
        fn list_all(&self) -> SourceFuture<'_, Vec<RawItem>> {
            Box::pin(async move { Ok(self.listing.clone()) })
        }

        fn variants<'a>(&'a self, _item_id: &'a str) -> SourceFuture<'a, Vec<RawVariantChannel>> {
            Box::pin(async move { Ok(self.channels.clone()) })
        }
    }

    struct NoPrompt;

    impl CredentialPrompt for NoPrompt {
        fn request(&self) -> PromptFuture<'_> {
            Box::pin(async { None })
        }
    }

    struct Harness {
        inbound: mpsc::Sender<Inbound>,
        sandbox: SandboxConnector,
        store: Arc<SqliteCatalogStore>,
        cancel: CancellationToken,
        task: tokio::task::JoinHandle<()>,
        _tmp: tempfile::TempDir,
    }

    struct Viewer {
        id: ViewerId,
        rx: mpsc::Receiver<WsMessage>,
    }

    impl Harness {
        fn start(with_credentials: bool) -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let credentials =
                Arc::new(CredentialStore::new(tmp.path().join("deviceauth.json")).unwrap());
            if with_credentials {
                credentials
                    .save(&Credentials {
                        account_id: "acc".into(),
                        device_id: "dev".into(),
                        secret: "secret".into(),
                    })
                    .unwrap();
            }

            let sandbox = SandboxConnector::new("Host").with_friends(vec![Friend {
                id: "f1".into(),
                display_name: "One".into(),
                is_online: true,
            }]);
            let config = SessionConfig {
                status_messages: vec!["online".into()],
                status_interval: Duration::from_secs(3600),
                ..SessionConfig::default()
            };
            let session = SessionCoordinator::new(
                config,
                Arc::new(sandbox.clone()),
                credentials,
                Arc::new(NoPrompt),
            );

            let listing: Vec<RawItem> = serde_json::from_str(
                r#"[{"id":"CID_A","name":"Knight","type":{"value":"outfit"},"images":{"icon":"u"}},{"id":"broken"}]"#,
            )
            .unwrap();
            let channels = vec![RawVariantChannel {
                channel: "Material".into(),
                options: vec![
                    RawVariantOption {
                        tag: "Mat1".into(),
                        name: "Gold".into(),
                        image: None,
                    },
                    RawVariantOption {
                        tag: "Mat2".into(),
                        name: "Silver".into(),
                        image: Some("s".into()),
                    },
                ],
            }];
            let store = Arc::new(SqliteCatalogStore::in_memory().unwrap());
            let source = Arc::new(StaticSource { listing, channels });
            let catalog = Arc::new(CatalogCache::new(store.clone(), source).unwrap());

            let (inbound, rx) = mpsc::channel(64);
            let dispatcher = Dispatcher::new(session, catalog, rx).unwrap();
            let cancel = CancellationToken::new();
            let task = tokio::spawn(dispatcher.run(cancel.clone()));

            Self {
                inbound,
                sandbox,
                store,
                cancel,
                task,
                _tmp: tmp,
            }
        }

        async fn connect(&self) -> Viewer {
            let (tx, rx) = mpsc::channel(64);
            let id = ViewerId::new();
            self.inbound
                .send(Inbound::Connected {
                    viewer: id,
                    sender: Sender::new(tx, CancellationToken::new()),
                })
                .await
                .unwrap();
            Viewer { id, rx }
        }

        async fn send(&self, viewer: &Viewer, frame: serde_json::Value) {
            self.send_raw(viewer, &frame.to_string()).await;
        }

        async fn send_raw(&self, viewer: &Viewer, text: &str) {
            self.inbound
                .send(Inbound::Frame {
                    viewer: viewer.id,
                    text: text.into(),
                })
                .await
                .unwrap();
        }

        /// Polls the bot snapshot until the session is ready.
        async fn wait_ready(&self, viewer: &mut Viewer) {
            for _ in 0..20 {
                self.send(viewer, serde_json::json!({"type": "getBotInfo"})).await;
                let ready = viewer.settle().await.iter().any(|m| {
                    matches!(m, ServerMessage::BotInfo { info } if info.display_name == "Host")
                });
                if ready {
                    return;
                }
            }
            panic!("session never became ready");
        }

        async fn stop(self) {
            self.cancel.cancel();
            self.task.await.unwrap();
        }
    }

    impl Viewer {
        /// Collects messages until none arrive for a short while.
        async fn settle(&mut self) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Ok(Some(frame)) =
                tokio::time::timeout(Duration::from_millis(150), self.rx.recv()).await
            {
                if let WsMessage::Text(text) = frame {
                    out.push(serde_json::from_str(text.as_str()).unwrap());
                }
            }
            out
        }
    }

    fn notifications(messages: &[ServerMessage], level: NotificationLevel) -> Vec<String> {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::Notification {
                    message,
                    message_type,
                } if *message_type == level => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn applied(calls: &[SandboxCall]) -> Vec<(Slot, String, usize)> {
        calls
            .iter()
            .filter_map(|c| match c {
                SandboxCall::Apply { slot, id, styles } => Some((*slot, id.clone(), styles.len())),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn ping_and_protocol_errors() {
        let h = Harness::start(false);
        let mut viewer = h.connect().await;
        viewer.settle().await;

        h.send(&viewer, serde_json::json!({"type": "ping"})).await;
        assert_eq!(viewer.settle().await, [ServerMessage::Pong]);

        h.send_raw(&viewer, "not json").await;
        assert_eq!(
            viewer.settle().await,
            [ServerMessage::error("Invalid message format")]
        );

        h.send(&viewer, serde_json::json!({"type": "fly"})).await;
        assert_eq!(viewer.settle().await, [ServerMessage::error("Unknown command")]);

        h.stop().await;
    }

    #[tokio::test]
    async fn session_commands_rejected_while_not_ready() {
        let h = Harness::start(false);
        let mut viewer = h.connect().await;
        viewer.settle().await;

        h.send(&viewer, serde_json::json!({"type": "setLevel", "level": 50})).await;
        // Gating happens before validation.
        h.send(&viewer, serde_json::json!({"type": "setLevel", "level": "abc"})).await;
        let messages = viewer.settle().await;
        assert_eq!(
            notifications(&messages, NotificationLevel::Error),
            ["Bot is not fully connected yet", "Bot is not fully connected yet"]
        );

        h.send(&viewer, serde_json::json!({"type": "getBotInfo"})).await;
        assert_eq!(
            viewer.settle().await,
            [ServerMessage::BotInfo {
                info: BotInfo::offline()
            }]
        );
        assert!(h.sandbox.calls().is_empty());

        h.stop().await;
    }

    #[tokio::test]
    async fn level_change_reaches_every_viewer_once() {
        let h = Harness::start(true);
        let mut first = h.connect().await;
        let mut second = h.connect().await;
        h.wait_ready(&mut first).await;
        second.settle().await;

        h.send(&first, serde_json::json!({"type": "setLevel", "level": 50})).await;

        assert_eq!(first.settle().await, [ServerMessage::LevelChanged { level: 50 }]);
        assert_eq!(second.settle().await, [ServerMessage::LevelChanged { level: 50 }]);
        assert!(h.sandbox.calls().contains(&SandboxCall::SetLevel(50)));

        h.stop().await;
    }

    #[tokio::test]
    async fn invalid_level_is_malformed() {
        let h = Harness::start(true);
        let mut viewer = h.connect().await;
        h.wait_ready(&mut viewer).await;

        h.send(&viewer, serde_json::json!({"type": "setLevel", "level": 0})).await;
        assert_eq!(
            viewer.settle().await,
            [ServerMessage::error("Invalid level (minimum 1)")]
        );

        h.stop().await;
    }

    #[tokio::test]
    async fn unknown_item_gets_one_placeholder() {
        let h = Harness::start(true);
        let mut viewer = h.connect().await;
        h.wait_ready(&mut viewer).await;
        h.sandbox.clear_calls();

        for _ in 0..2 {
            h.send(
                &viewer,
                serde_json::json!({"type": "setCosmetic", "id": "X", "cosmeticType": "outfit"}),
            )
            .await;
        }
        let messages = viewer.settle().await;

        let item = h.store.get("X").unwrap().unwrap();
        assert_eq!(item.name, "X");
        assert_eq!(item.rarity, "common");
        assert_eq!(item.category, Category::Outfit);
        assert_eq!(h.store.list_all().unwrap().len(), 1);

        assert_eq!(
            applied(&h.sandbox.calls()),
            [(Slot::Outfit, "X".to_string(), 0), (Slot::Outfit, "X".to_string(), 0)]
        );
        assert!(messages.contains(&ServerMessage::CosmeticChanged {
            cosmetic: CosmeticChange {
                id: "X".into(),
                name: "X".into(),
                category: "outfit".into(),
            }
        }));

        h.stop().await;
    }

    #[tokio::test]
    async fn unsupported_category_applies_as_outfit() {
        let h = Harness::start(true);
        let mut viewer = h.connect().await;
        h.wait_ready(&mut viewer).await;
        h.sandbox.clear_calls();

        h.send(
            &viewer,
            serde_json::json!({"type": "setCosmetic", "id": "G1", "cosmeticType": "glider"}),
        )
        .await;
        let messages = viewer.settle().await;

        assert_eq!(
            notifications(&messages, NotificationLevel::Warning),
            ["Unsupported cosmetic type: glider, attempting to apply as outfit"]
        );
        assert_eq!(
            applied(&h.sandbox.calls()),
            [(Slot::Outfit, "G1".to_string(), 0)]
        );
        assert_eq!(h.store.get("G1").unwrap().unwrap().category, Category::Glider);

        h.stop().await;
    }

    #[tokio::test]
    async fn alias_command_names_the_slot() {
        let h = Harness::start(true);
        let mut viewer = h.connect().await;
        h.wait_ready(&mut viewer).await;
        h.sandbox.clear_calls();

        h.send(&viewer, serde_json::json!({"type": "backpack", "id": "BID_1"})).await;
        viewer.settle().await;

        assert_eq!(
            applied(&h.sandbox.calls()),
            [(Slot::Backpack, "BID_1".to_string(), 0)]
        );

        h.stop().await;
    }

    #[tokio::test]
    async fn variant_lookup_replies_and_caches() {
        let h = Harness::start(true);
        let mut viewer = h.connect().await;
        h.wait_ready(&mut viewer).await;

        h.send(
            &viewer,
            serde_json::json!({"type": "checkCosmeticVariants", "id": "CID_A", "name": "Knight"}),
        )
        .await;
        let messages = viewer.settle().await;

        match messages.as_slice() {
            [ServerMessage::VariantsData {
                outfit_name,
                variants,
            }] => {
                assert_eq!(outfit_name, "Knight");
                assert_eq!(variants.len(), 2);
                assert_eq!(variants[1].tag, "Mat2");
            }
            other => panic!("unexpected messages: {other:?}"),
        }
        assert_eq!(h.store.get_variants("CID_A").unwrap().len(), 2);

        h.stop().await;
    }

    #[tokio::test]
    async fn outfit_with_variants_uses_complete_choices() {
        let h = Harness::start(true);
        let mut viewer = h.connect().await;
        h.wait_ready(&mut viewer).await;
        h.sandbox.clear_calls();

        h.send(
            &viewer,
            serde_json::json!({
                "type": "setOutfitWithVariants",
                "outfitId": "CID_A",
                "variants": [
                    {"channel": "Material", "variant": "Mat2"},
                    {"channel": "Parts"}
                ]
            }),
        )
        .await;
        let messages = viewer.settle().await;

        let calls = h.sandbox.calls();
        assert!(calls.contains(&SandboxCall::Apply {
            slot: Slot::Outfit,
            id: "CID_A".into(),
            styles: vec![Style {
                channel: "Material".into(),
                tag: "Mat2".into(),
            }],
        }));
        assert_eq!(
            notifications(&messages, NotificationLevel::Success),
            ["Changed outfit to CID_A with custom variants"]
        );

        h.stop().await;
    }

    #[tokio::test]
    async fn refresh_broadcasts_listing() {
        let h = Harness::start(false);
        let mut origin = h.connect().await;
        let mut other = h.connect().await;
        origin.settle().await;
        other.settle().await;

        h.send(&origin, serde_json::json!({"type": "refreshCosmetics"})).await;

        let messages = origin.settle().await;
        assert_eq!(
            notifications(&messages, NotificationLevel::Info),
            ["Refreshing cosmetics database..."]
        );
        assert_eq!(
            notifications(&messages, NotificationLevel::Success),
            ["Cosmetics database refreshed successfully (1 added, 0 updated, 1 skipped)"]
        );

        let broadcast = other.settle().await;
        match broadcast.as_slice() {
            [ServerMessage::Cosmetics { cosmetics }] => {
                assert_eq!(cosmetics.len(), 1);
                assert_eq!(cosmetics[0].id, "CID_A");
                assert_eq!(cosmetics[0].category, "outfit");
            }
            other => panic!("unexpected messages: {other:?}"),
        }

        h.send(&other, serde_json::json!({"type": "getCosmetics"})).await;
        assert!(matches!(
            other.settle().await.as_slice(),
            [ServerMessage::Cosmetics { cosmetics }] if cosmetics.len() == 1
        ));

        h.stop().await;
    }

    #[tokio::test]
    async fn friend_commands_check_the_friend_list() {
        let h = Harness::start(true);
        let mut viewer = h.connect().await;
        h.wait_ready(&mut viewer).await;

        h.send(&viewer, serde_json::json!({"type": "inviteFriend", "friendId": "ghost"})).await;
        assert_eq!(viewer.settle().await, [ServerMessage::error("Friend not found")]);

        h.send(&viewer, serde_json::json!({"type": "getFriends"})).await;
        assert!(matches!(
            viewer.settle().await.as_slice(),
            [ServerMessage::Friends { friends }] if friends.len() == 1 && friends[0].id == "f1"
        ));

        h.send(
            &viewer,
            serde_json::json!({"type": "sendMessage", "recipientId": "f1", "content": "hey"}),
        )
        .await;
        viewer.settle().await;
        assert!(h.sandbox.calls().contains(&SandboxCall::SendMessage {
            to: "f1".into(),
            content: "hey".into(),
        }));

        h.stop().await;
    }

    #[tokio::test]
    async fn disconnected_viewer_gets_nothing() {
        let h = Harness::start(false);
        let mut gone = h.connect().await;
        let mut stays = h.connect().await;
        gone.settle().await;
        stays.settle().await;

        h.inbound
            .send(Inbound::Disconnected { viewer: gone.id })
            .await
            .unwrap();
        h.send(&stays, serde_json::json!({"type": "refreshCosmetics"})).await;
        stays.settle().await;

        assert!(gone.settle().await.is_empty());

        h.stop().await;
    }

    #[tokio::test]
    async fn stop_logs_out() {
        let h = Harness::start(true);
        let mut viewer = h.connect().await;
        h.wait_ready(&mut viewer).await;
        let sandbox = h.sandbox.clone();

        h.stop().await;

        assert_eq!(sandbox.calls().last(), Some(&SandboxCall::Logout));
    }

    #[test]
    fn styles_skip_incomplete_choices() {
        let choices = vec![
            VariantChoice {
                channel: Some("Material".into()),
                variant: Some("Mat1".into()),
            },
            VariantChoice {
                channel: Some("Parts".into()),
                variant: None,
            },
            VariantChoice {
                channel: Some("Material".into()),
                variant: Some("Mat3".into()),
            },
        ];

        assert_eq!(
            styles_from(&choices),
            [Style {
                channel: "Material".into(),
                tag: "Mat3".into(),
            }]
        );
    }
}
