//! Session coordinator.
//!
//! Owns the account session and its lifecycle state. Every call into the
//! account service runs as a spawned task whose result comes back as a
//! [`Signal`] tagged with the generation that started it; the owner loop
//! feeds signals to [`SessionCoordinator::handle_signal`]. The generation
//! is bumped on every reboot, account change and login attempt, so results
//! from a superseded session are dropped instead of applied.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lobbyhost_protocol::{
    BotInfo, BotLevel, ChatEntry, CosmeticChange, FriendEntry, MemberEntry, RequestEntry,
    ServerMessage, ViewerId,
};

use crate::account::{
    AccountConnector, AccountEvent, AccountSession, Friend, LoginOutcome, Slot, Style,
};
use crate::credentials::{CredentialPrompt, CredentialStore, Credentials};
use crate::error::{AccountError, AuthError, SessionError};
use crate::rotation::StatusRotation;
use crate::state::SessionState;

/// Presentation applied every time the session becomes ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Presentation {
    pub outfit: String,
    pub backpack: String,
    pub emote: String,
    pub level: u32,
}

impl Default for Presentation {
    fn default() -> Self {
        Self {
            outfit: "CID_028_Athena_Commando_F".into(),
            backpack: "BID_004_BlackKnight".into(),
            emote: "EID_Floss".into(),
            level: 200,
        }
    }
}

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub defaults: Presentation,
    pub status_messages: Vec<String>,
    pub status_interval: Duration,
    pub auto_accept_friend_requests: bool,
    pub auto_accept_party_invites: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            defaults: Presentation::default(),
            status_messages: vec![
                "SaphyreFN - The Best Fortnite Bot".into(),
                "Add me to play together!".into(),
                "SaphyreFN - Custom Cosmetics".into(),
                "SaphyreFN - Ready to join!".into(),
                "SaphyreFN - Join my party!".into(),
            ],
            status_interval: Duration::from_secs(300),
            auto_accept_friend_requests: true,
            auto_accept_party_invites: true,
        }
    }
}

/// Output for viewers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    /// Sent to one viewer only.
    Reply { to: ViewerId, message: ServerMessage },
    /// Sent to every viewer.
    Broadcast(ServerMessage),
}

/// Completion of work started by the coordinator.
pub struct Signal {
    generation: u64,
    kind: SignalKind,
}

impl Signal {
    /// Generation that was current when the work started.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

enum SignalKind {
    CredentialsResolved(Option<Credentials>),
    LoginFinished {
        result: Result<LoginOutcome, AuthError>,
        credentials: Credentials,
        fresh: bool,
    },
    LoggedOut,
    DefaultsApplied(Result<(), AccountError>),
    OpFinished {
        origin: Option<ViewerId>,
        op: Op,
        result: Result<usize, AccountError>,
    },
    Event(AccountEvent),
    StreamClosed,
    RotateStatus,
}

impl SignalKind {
    fn name(&self) -> &'static str {
        match self {
            SignalKind::CredentialsResolved(_) => "credentials",
            SignalKind::LoginFinished { .. } => "login",
            SignalKind::LoggedOut => "logout",
            SignalKind::DefaultsApplied(_) => "defaults",
            SignalKind::OpFinished { .. } => "operation",
            SignalKind::Event(_) => "event",
            SignalKind::StreamClosed => "stream closed",
            SignalKind::RotateStatus => "rotate status",
        }
    }
}

/// An account call in flight, with what is needed to report its outcome.
enum Op {
    Apply {
        change: CosmeticChange,
        // Number of styles for an outfit applied with variants.
        styled: Option<usize>,
    },
    Level(u32),
    ClearEmote,
    Status(String),
    Rotation(String),
    Invite { name: String },
    Remove { name: String },
    Message { name: String },
    AcceptAll,
    AutoAcceptFriend { id: String, name: String },
    AutoAcceptParty { id: String, name: String },
}

impl Op {
    fn verb(&self) -> &'static str {
        match self {
            Op::Apply { styled: Some(_), .. } => "set outfit",
            Op::Apply { .. } => "set cosmetic",
            Op::Level(_) => "set level",
            Op::ClearEmote => "stop emote",
            Op::Status(_) => "set status",
            Op::Rotation(_) => "rotate status",
            Op::Invite { .. } => "invite friend",
            Op::Remove { .. } => "remove friend",
            Op::Message { .. } => "send message",
            Op::AcceptAll => "accept friend requests",
            Op::AutoAcceptFriend { .. } => "accept friend request",
            Op::AutoAcceptParty { .. } => "accept party invite",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Restart {
    Reboot,
    ChangeAccount,
}

impl Restart {
    fn state(self) -> SessionState {
        match self {
            Restart::Reboot => SessionState::Rebooting,
            Restart::ChangeAccount => SessionState::ChangingAccount,
        }
    }

    fn started(self) -> &'static str {
        match self {
            Restart::Reboot => "Rebooting bot...",
            Restart::ChangeAccount => "Changing account...",
        }
    }

    fn announcement(self) -> &'static str {
        match self {
            Restart::Reboot => "Bot is rebooting, please wait...",
            Restart::ChangeAccount => "Bot is changing account, please wait...",
        }
    }

    fn succeeded(self) -> &'static str {
        match self {
            Restart::Reboot => "Bot rebooted successfully",
            Restart::ChangeAccount => "Account changed successfully",
        }
    }

    fn failed(self, reason: &str) -> String {
        match self {
            Restart::Reboot => format!("Failed to reboot bot: {reason}"),
            Restart::ChangeAccount => format!("Failed to change account: {reason}"),
        }
    }
}

/// Owns the account session and drives its lifecycle.
pub struct SessionCoordinator {
    config: SessionConfig,
    connector: Arc<dyn AccountConnector>,
    credentials: Arc<CredentialStore>,
    prompt: Arc<dyn CredentialPrompt>,
    state: SessionState,
    generation: u64,
    session: Option<Arc<dyn AccountSession>>,
    rotation: StatusRotation,
    /// Cancels the event forwarder and status ticker of the ready session.
    ready_cancel: Option<CancellationToken>,
    /// Viewer waiting for the outcome of a reboot or account change.
    pending_restart: Option<(ViewerId, Restart)>,
    signals_tx: mpsc::UnboundedSender<Signal>,
    signals_rx: Option<mpsc::UnboundedReceiver<Signal>>,
    notices_tx: mpsc::UnboundedSender<SessionNotice>,
    notices_rx: Option<mpsc::UnboundedReceiver<SessionNotice>>,
}

impl SessionCoordinator {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn AccountConnector>,
        credentials: Arc<CredentialStore>,
        prompt: Arc<dyn CredentialPrompt>,
    ) -> Self {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let rotation = StatusRotation::new(config.status_messages.clone());

        Self {
            config,
            connector,
            credentials,
            prompt,
            state: SessionState::Uninitialized,
            generation: 0,
            session: None,
            rotation,
            ready_cancel: None,
            pending_restart: None,
            signals_tx,
            signals_rx: Some(signals_rx),
            notices_tx,
            notices_rx: Some(notices_rx),
        }
    }

    /// Takes the signal receiver. Can only be called once.
    pub fn take_signals(&mut self) -> Option<mpsc::UnboundedReceiver<Signal>> {
        self.signals_rx.take()
    }

    /// Takes the notice receiver. Can only be called once.
    pub fn take_notices(&mut self) -> Option<mpsc::UnboundedReceiver<SessionNotice>> {
        self.notices_rx.take()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready && self.session.is_some()
    }

    /// Snapshot of the account for viewers.
    pub fn bot_info(&self) -> BotInfo {
        match (&self.state, &self.session) {
            (SessionState::Ready, Some(session)) => BotInfo {
                display_name: session.display_name(),
                level: BotLevel::Known(session.level()),
                friend_count: session.friends().len(),
                status: "Online".into(),
            },
            _ => BotInfo::offline(),
        }
    }

    /// Friend list for viewers; empty unless ready.
    pub fn friends(&self) -> Vec<FriendEntry> {
        match (&self.state, &self.session) {
            (SessionState::Ready, Some(session)) => {
                session.friends().into_iter().map(friend_entry).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Starts the first login.
    pub fn start(&mut self) {
        if self.state != SessionState::Uninitialized {
            warn!(state = %self.state, "session already started");
            return;
        }
        self.begin_authentication();
    }

    /// Logs out and logs in again with the stored credentials.
    pub fn reboot(&mut self, origin: ViewerId) -> Result<(), SessionError> {
        self.restart(origin, Restart::Reboot)
    }

    /// Logs out, discards the stored credentials and logs in with fresh ones.
    pub fn change_account(&mut self, origin: ViewerId) -> Result<(), SessionError> {
        self.restart(origin, Restart::ChangeAccount)
    }

    /// Applies an item to `slot`.
    pub fn apply_item(
        &mut self,
        origin: ViewerId,
        slot: Slot,
        change: CosmeticChange,
    ) -> Result<(), SessionError> {
        let session = self.ready_session()?;
        let id = change.id.clone();
        debug!(viewer = %origin, slot = slot.as_str(), item = %id, "applying item");
        self.spawn_op(
            Some(origin),
            Op::Apply {
                change,
                styled: None,
            },
            async move { session.apply_cosmetic(slot, &id, &[]).await.map(|_| 0) },
        );
        Ok(())
    }

    /// Applies an outfit with the given styles.
    pub fn apply_outfit_with_styles(
        &mut self,
        origin: ViewerId,
        change: CosmeticChange,
        styles: Vec<Style>,
    ) -> Result<(), SessionError> {
        let session = self.ready_session()?;
        let id = change.id.clone();
        debug!(viewer = %origin, item = %id, styles = styles.len(), "applying outfit with styles");
        self.spawn_op(
            Some(origin),
            Op::Apply {
                change,
                styled: Some(styles.len()),
            },
            async move {
                session
                    .apply_cosmetic(Slot::Outfit, &id, &styles)
                    .await
                    .map(|_| 0)
            },
        );
        Ok(())
    }

    pub fn set_level(&mut self, origin: ViewerId, level: u32) -> Result<(), SessionError> {
        let session = self.ready_session()?;
        if level < 1 {
            return Err(SessionError::MalformedInput(
                "Invalid level (minimum 1)".into(),
            ));
        }
        self.spawn_op(Some(origin), Op::Level(level), async move {
            session.set_level(level).await.map(|_| 0)
        });
        Ok(())
    }

    /// Stops the emote currently playing.
    pub fn clear_emote(&mut self, origin: ViewerId) -> Result<(), SessionError> {
        let session = self.ready_session()?;
        self.spawn_op(Some(origin), Op::ClearEmote, async move {
            session.clear_emote().await.map(|_| 0)
        });
        Ok(())
    }

    pub fn set_status(&mut self, origin: ViewerId, status: String) -> Result<(), SessionError> {
        let session = self.ready_session()?;
        if status.is_empty() {
            return Err(SessionError::MalformedInput("Missing status message".into()));
        }
        let text = status.clone();
        self.spawn_op(Some(origin), Op::Status(status), async move {
            session.set_status(&text).await.map(|_| 0)
        });
        Ok(())
    }

    /// Accepts every pending inbound friend request.
    pub fn accept_all_friends(&mut self, origin: ViewerId) -> Result<(), SessionError> {
        let session = self.ready_session()?;
        let pending = session.pending_friends();
        if pending.is_empty() {
            self.reply(origin, ServerMessage::info("No pending friend requests"));
            return Ok(());
        }

        self.spawn_op(Some(origin), Op::AcceptAll, async move {
            let mut accepted = 0;
            for request in &pending {
                match session.accept_friend_request(&request.id).await {
                    Ok(()) => accepted += 1,
                    Err(e) => warn!(friend = %request.id, error = %e, "failed to accept friend request"),
                }
            }
            Ok(accepted)
        });
        Ok(())
    }

    pub fn invite_friend(&mut self, origin: ViewerId, friend_id: &str) -> Result<(), SessionError> {
        let session = self.ready_session()?;
        let friend = find_friend(session.as_ref(), friend_id)?;
        self.spawn_op(
            Some(origin),
            Op::Invite {
                name: friend.display_name,
            },
            async move { session.invite_friend(&friend.id).await.map(|_| 0) },
        );
        Ok(())
    }

    pub fn remove_friend(&mut self, origin: ViewerId, friend_id: &str) -> Result<(), SessionError> {
        let session = self.ready_session()?;
        let friend = find_friend(session.as_ref(), friend_id)?;
        self.spawn_op(
            Some(origin),
            Op::Remove {
                name: friend.display_name,
            },
            async move { session.remove_friend(&friend.id).await.map(|_| 0) },
        );
        Ok(())
    }

    pub fn send_message(
        &mut self,
        origin: ViewerId,
        recipient_id: &str,
        content: String,
    ) -> Result<(), SessionError> {
        let session = self.ready_session()?;
        let friend = find_friend(session.as_ref(), recipient_id)?;
        self.spawn_op(
            Some(origin),
            Op::Message {
                name: friend.display_name,
            },
            async move { session.send_message(&friend.id, &content).await.map(|_| 0) },
        );
        Ok(())
    }

    /// Applies the outcome of work started earlier.
    pub fn handle_signal(&mut self, signal: Signal) {
        if signal.generation != self.generation {
            self.discard_stale(signal);
            return;
        }

        match signal.kind {
            SignalKind::CredentialsResolved(Some(credentials)) => {
                if self.state == SessionState::Authenticating {
                    self.spawn_login(credentials, true);
                }
            }
            SignalKind::CredentialsResolved(None) => {
                self.fail("no credentials available".into());
            }
            SignalKind::LoginFinished {
                result,
                credentials,
                fresh,
            } => self.finish_login(result, credentials, fresh),
            SignalKind::LoggedOut => self.after_logout(),
            SignalKind::DefaultsApplied(result) => {
                if !self.is_ready() {
                    return;
                }
                match result {
                    Ok(()) => info!("default presentation applied"),
                    Err(e) => error!(error = %e, "failed to apply default presentation"),
                }
                self.broadcast(ServerMessage::BotInfo {
                    info: self.bot_info(),
                });
            }
            SignalKind::OpFinished { origin, op, result } => {
                if self.is_ready() {
                    self.finish_op(origin, op, result);
                } else {
                    debug!(op = op.verb(), "discarding result, session not ready");
                }
            }
            SignalKind::Event(event) => {
                if self.is_ready() {
                    self.on_event(event);
                }
            }
            SignalKind::StreamClosed => {
                if self.is_ready() {
                    self.fail("account connection lost".into());
                }
            }
            SignalKind::RotateStatus => self.rotate_status(),
        }
    }

    /// Stops the session for process exit, logging out best-effort.
    pub async fn shutdown(&mut self) {
        self.generation += 1;
        if let Some(session) = self.leave_ready() {
            match session.logout().await {
                Ok(()) => info!("logged out of account session"),
                Err(e) => warn!(error = %e, "logout failed during shutdown"),
            }
        }
        self.state = SessionState::Uninitialized;
    }

    // --- lifecycle ---

    fn set_state(&mut self, state: SessionState) {
        info!(
            from = %self.state,
            to = %state,
            generation = self.generation,
            "session state changed"
        );
        self.state = state;
        self.broadcast(ServerMessage::SessionState {
            state: self.state.name().into(),
            generation: self.generation,
        });
    }

    fn begin_authentication(&mut self) {
        self.generation += 1;
        self.set_state(SessionState::Authenticating);

        match self.credentials.get() {
            Some(credentials) => self.spawn_login(credentials, false),
            None => {
                info!("no stored credentials, requesting new ones");
                let prompt = self.prompt.clone();
                self.spawn_signal(async move {
                    SignalKind::CredentialsResolved(prompt.request().await)
                });
            }
        }
    }

    fn spawn_login(&self, credentials: Credentials, fresh: bool) {
        info!(account = %credentials.account_id, "logging in");
        let connector = self.connector.clone();
        self.spawn_signal(async move {
            let result = connector.login(&credentials).await;
            SignalKind::LoginFinished {
                result,
                credentials,
                fresh,
            }
        });
    }

    fn finish_login(
        &mut self,
        result: Result<LoginOutcome, AuthError>,
        credentials: Credentials,
        fresh: bool,
    ) {
        if self.state != SessionState::Authenticating {
            return;
        }

        match result {
            Ok(outcome) => {
                if fresh {
                    if let Err(e) = self.credentials.save(&credentials) {
                        warn!(error = %e, "failed to persist credentials");
                    }
                }
                self.enter_ready(outcome);
            }
            Err(e) => {
                if matches!(e, AuthError::InvalidCredentials(_)) {
                    match self.credentials.clear() {
                        Ok(()) => info!("discarded rejected credentials"),
                        Err(e) => warn!(error = %e, "failed to discard rejected credentials"),
                    }
                }
                self.fail(e.to_string());
            }
        }
    }

    fn enter_ready(&mut self, outcome: LoginOutcome) {
        let LoginOutcome { session, events } = outcome;
        info!(display_name = %session.display_name(), "account session ready");

        let cancel = CancellationToken::new();
        self.session = Some(session.clone());
        self.ready_cancel = Some(cancel.clone());
        self.set_state(SessionState::Ready);

        self.spawn_forwarder(events, cancel.clone());

        let defaults = self.config.defaults.clone();
        let target = session.clone();
        self.spawn_signal(async move {
            SignalKind::DefaultsApplied(apply_defaults(target.as_ref(), &defaults).await)
        });

        self.rotation.reset();
        if let Some(first) = self.rotation.current() {
            let status = first.to_string();
            self.spawn_status(session, status);
        }
        self.spawn_rotation_ticker(cancel);

        if let Some((to, restart)) = self.pending_restart.take() {
            self.reply(to, ServerMessage::success(restart.succeeded()));
        }
    }

    /// Cancels the ready-session tasks and hands back the session.
    fn leave_ready(&mut self) -> Option<Arc<dyn AccountSession>> {
        if let Some(cancel) = self.ready_cancel.take() {
            cancel.cancel();
        }
        self.session.take()
    }

    fn restart(&mut self, origin: ViewerId, restart: Restart) -> Result<(), SessionError> {
        if self.state.is_transitioning() {
            return Err(SessionError::Busy(self.state.name()));
        }

        warn!(viewer = %origin, ?restart, "restarting account session on request");
        self.reply(origin, ServerMessage::info(restart.started()));
        self.broadcast(ServerMessage::info(restart.announcement()));
        self.pending_restart = Some((origin, restart));

        self.generation += 1;
        self.set_state(restart.state());

        match self.leave_ready() {
            Some(session) => self.spawn_signal(async move {
                match session.logout().await {
                    Ok(()) => info!("logged out of previous session"),
                    Err(e) => warn!(error = %e, "logout failed, continuing"),
                }
                SignalKind::LoggedOut
            }),
            None => self.after_logout(),
        }
        Ok(())
    }

    fn after_logout(&mut self) {
        match self.state {
            SessionState::ChangingAccount => match self.credentials.clear() {
                Ok(()) => info!("discarded stored credentials"),
                Err(e) => warn!(error = %e, "failed to discard stored credentials"),
            },
            SessionState::Rebooting => {}
            _ => return,
        }
        self.begin_authentication();
    }

    fn fail(&mut self, reason: String) {
        error!(%reason, "account session failed");
        if let Some(session) = self.leave_ready() {
            tokio::spawn(async move {
                if let Err(e) = session.logout().await {
                    warn!(error = %e, "logout after failure failed");
                }
            });
        }
        self.set_state(SessionState::Failed {
            reason: reason.clone(),
        });
        if let Some((to, restart)) = self.pending_restart.take() {
            self.reply(to, ServerMessage::error(restart.failed(&reason)));
        }
    }

    fn discard_stale(&mut self, signal: Signal) {
        debug!(
            signal = signal.kind.name(),
            signal_generation = signal.generation,
            generation = self.generation,
            "discarding stale signal"
        );
        // A login that finished after being superseded still holds a live
        // session.
        if let SignalKind::LoginFinished {
            result: Ok(outcome),
            ..
        } = signal.kind
        {
            let session = outcome.session;
            tokio::spawn(async move {
                if let Err(e) = session.logout().await {
                    warn!(error = %e, "logout of superseded session failed");
                }
            });
        }
    }

    // --- background tasks ---

    fn spawn_signal<F>(&self, fut: F)
    where
        F: Future<Output = SignalKind> + Send + 'static,
    {
        let tx = self.signals_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let kind = fut.await;
            let _ = tx.send(Signal { generation, kind });
        });
    }

    fn spawn_op<F>(&self, origin: Option<ViewerId>, op: Op, fut: F)
    where
        F: Future<Output = Result<usize, AccountError>> + Send + 'static,
    {
        self.spawn_signal(async move {
            let result = fut.await;
            SignalKind::OpFinished { origin, op, result }
        });
    }

    fn spawn_status(&self, session: Arc<dyn AccountSession>, status: String) {
        let text = status.clone();
        self.spawn_op(None, Op::Rotation(status), async move {
            session.set_status(&text).await.map(|_| 0)
        });
    }

    fn spawn_forwarder(&self, mut events: mpsc::Receiver<AccountEvent>, cancel: CancellationToken) {
        let tx = self.signals_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => {
                        let kind = match event {
                            Some(event) => SignalKind::Event(event),
                            None => SignalKind::StreamClosed,
                        };
                        let closed = matches!(kind, SignalKind::StreamClosed);
                        if tx.send(Signal { generation, kind }).is_err() || closed {
                            break;
                        }
                    }
                }
            }
            debug!(generation, "account event forwarder stopped");
        });
    }

    fn spawn_rotation_ticker(&self, cancel: CancellationToken) {
        let period = self.config.status_interval;
        if self.rotation.is_empty() || period.is_zero() {
            return;
        }
        let tx = self.signals_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let signal = Signal { generation, kind: SignalKind::RotateStatus };
                        if tx.send(signal).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn rotate_status(&mut self) {
        let Some(session) = self.session.clone().filter(|_| self.is_ready()) else {
            return;
        };
        if let Some(next) = self.rotation.advance() {
            let status = next.to_string();
            self.spawn_status(session, status);
        }
    }

    // --- results ---

    fn finish_op(&mut self, origin: Option<ViewerId>, op: Op, result: Result<usize, AccountError>) {
        let count = match result {
            Ok(count) => count,
            Err(e) => {
                error!(op = op.verb(), error = %e, "account call failed");
                if let Some(to) = origin {
                    self.reply(to, ServerMessage::error(format!("Failed to {}: {e}", op.verb())));
                }
                // The event itself is still forwarded, as not accepted.
                match op {
                    Op::AutoAcceptFriend { id, name } => {
                        self.broadcast(ServerMessage::FriendRequest {
                            request: RequestEntry {
                                id,
                                display_name: name,
                                accepted: false,
                            },
                        });
                    }
                    Op::AutoAcceptParty { id, name } => {
                        self.broadcast(ServerMessage::PartyInvite {
                            invite: RequestEntry {
                                id,
                                display_name: name,
                                accepted: false,
                            },
                        });
                    }
                    _ => {}
                }
                return;
            }
        };

        match op {
            Op::Apply { change, styled } => {
                info!(item = %change.id, name = %change.name, kind = %change.category, "item applied");
                let message = match styled {
                    Some(styles) if styles > 0 => format!("Changed outfit to {} with custom variants", change.name),
                    Some(_) => format!("Changed outfit to {}", change.name),
                    None => String::new(),
                };
                self.broadcast(ServerMessage::CosmeticChanged { cosmetic: change });
                if let (Some(to), false) = (origin, message.is_empty()) {
                    self.reply(to, ServerMessage::success(message));
                }
            }
            Op::Level(level) => {
                info!(level, "level set");
                self.broadcast(ServerMessage::LevelChanged { level });
            }
            Op::ClearEmote => {
                info!("emote stopped");
                self.broadcast(ServerMessage::EmoteStop {
                    message: "Emote stopped".into(),
                });
            }
            Op::Status(status) => {
                info!(%status, "status set");
                self.broadcast(ServerMessage::StatusChanged { status });
                if let Some(to) = origin {
                    self.reply(to, ServerMessage::success("Status updated successfully"));
                }
            }
            Op::Rotation(status) => {
                info!(%status, "status rotated");
                self.broadcast(ServerMessage::StatusChanged { status });
            }
            Op::Invite { name } => {
                info!(friend = %name, "invited friend to party");
                if let Some(to) = origin {
                    self.reply(to, ServerMessage::success(format!("Invited {name} to the party")));
                }
            }
            Op::Remove { name } => {
                info!(friend = %name, "removed friend");
                self.broadcast_friends();
                if let Some(to) = origin {
                    self.reply(
                        to,
                        ServerMessage::success(format!("Removed {name} from friends list")),
                    );
                }
            }
            Op::Message { name } => {
                info!(friend = %name, "message sent");
            }
            Op::AcceptAll => {
                info!(accepted = count, "accepted pending friend requests");
                self.broadcast_friends();
                if let Some(to) = origin {
                    self.reply(
                        to,
                        ServerMessage::success(format!("Accepted {count} friend requests")),
                    );
                }
            }
            Op::AutoAcceptFriend { id, name } => {
                info!(friend = %name, "accepted friend request");
                self.broadcast(ServerMessage::FriendRequest {
                    request: RequestEntry {
                        id,
                        display_name: name,
                        accepted: true,
                    },
                });
                self.broadcast_friends();
            }
            Op::AutoAcceptParty { id, name } => {
                info!(sender = %name, "accepted party invite");
                self.broadcast(ServerMessage::PartyInvite {
                    invite: RequestEntry {
                        id,
                        display_name: name,
                        accepted: true,
                    },
                });
            }
        }
    }

    fn on_event(&mut self, event: AccountEvent) {
        let Some(session) = self.session.clone() else {
            return;
        };

        match event {
            AccountEvent::FriendRequest { id, display_name } => {
                if self.config.auto_accept_friend_requests {
                    let target = id.clone();
                    self.spawn_op(
                        None,
                        Op::AutoAcceptFriend {
                            id,
                            name: display_name,
                        },
                        async move { session.accept_friend_request(&target).await.map(|_| 0) },
                    );
                } else {
                    info!(friend = %display_name, "friend request received, auto-accept disabled");
                    self.broadcast(ServerMessage::FriendRequest {
                        request: RequestEntry {
                            id,
                            display_name,
                            accepted: false,
                        },
                    });
                }
            }
            AccountEvent::PartyInvite { id, sender_name } => {
                if self.config.auto_accept_party_invites {
                    let target = id.clone();
                    self.spawn_op(
                        None,
                        Op::AutoAcceptParty {
                            id,
                            name: sender_name,
                        },
                        async move { session.accept_party_invite(&target).await.map(|_| 0) },
                    );
                } else {
                    info!(sender = %sender_name, "party invite received, auto-accept disabled");
                    self.broadcast(ServerMessage::PartyInvite {
                        invite: RequestEntry {
                            id,
                            display_name: sender_name,
                            accepted: false,
                        },
                    });
                }
            }
            AccountEvent::FriendMessage {
                sender_id,
                sender_name,
                content,
            } => {
                info!(sender = %sender_name, "message received");
                self.broadcast(ServerMessage::Message {
                    message: ChatEntry {
                        sender_id,
                        sender_name,
                        content,
                        timestamp: Utc::now().to_rfc3339(),
                    },
                });
            }
            AccountEvent::FriendPresence {
                display_name,
                is_online,
                ..
            } => {
                debug!(friend = %display_name, is_online, "friend presence changed");
                self.broadcast_friends();
            }
            AccountEvent::PartyMemberJoined { id, display_name } => {
                info!(member = %display_name, "member joined the party");
                self.broadcast(ServerMessage::PartyMemberJoined {
                    member: MemberEntry { id, display_name },
                });
            }
        }
    }

    // --- helpers ---

    fn ready_session(&self) -> Result<Arc<dyn AccountSession>, SessionError> {
        match (&self.state, &self.session) {
            (SessionState::Ready, Some(session)) => Ok(session.clone()),
            _ => Err(SessionError::NotReady),
        }
    }

    fn reply(&self, to: ViewerId, message: ServerMessage) {
        let _ = self.notices_tx.send(SessionNotice::Reply { to, message });
    }

    fn broadcast(&self, message: ServerMessage) {
        let _ = self.notices_tx.send(SessionNotice::Broadcast(message));
    }

    fn broadcast_friends(&self) {
        self.broadcast(ServerMessage::Friends {
            friends: self.friends(),
        });
    }
}

fn friend_entry(friend: Friend) -> FriendEntry {
    FriendEntry {
        id: friend.id,
        display_name: friend.display_name,
        is_online: friend.is_online,
    }
}

fn find_friend(session: &dyn AccountSession, id: &str) -> Result<Friend, SessionError> {
    session
        .friends()
        .into_iter()
        .find(|f| f.id == id)
        .ok_or_else(|| SessionError::NotFound("Friend not found".into()))
}

async fn apply_defaults(
    session: &dyn AccountSession,
    defaults: &Presentation,
) -> Result<(), AccountError> {
    session
        .apply_cosmetic(Slot::Outfit, &defaults.outfit, &[])
        .await?;
    session
        .apply_cosmetic(Slot::Backpack, &defaults.backpack, &[])
        .await?;
    session
        .apply_cosmetic(Slot::Emote, &defaults.emote, &[])
        .await?;
    session.set_level(defaults.level).await
}
