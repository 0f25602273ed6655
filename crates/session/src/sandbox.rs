//! In-process account backend.
//!
//! Simulates the account service well enough to run the host without the
//! real one: a friend list, pending requests, a level, and an event stream
//! that can be fed from outside. Every call is recorded, and logins and
//! calls can be made to fail.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::account::{
    AccountConnector, AccountEvent, AccountFuture, AccountSession, Friend, LoginFuture,
    LoginOutcome, PendingFriend, Slot, Style,
};
use crate::credentials::Credentials;
use crate::error::{AccountError, AuthError};

/// A call received by the sandbox, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxCall {
    Login { account_id: String },
    Logout,
    Apply { slot: Slot, id: String, styles: Vec<Style> },
    SetLevel(u32),
    ClearEmote,
    SetStatus(String),
    AcceptFriend(String),
    AcceptPartyInvite(String),
    Invite(String),
    Remove(String),
    SendMessage { to: String, content: String },
}

struct Shared {
    display_name: String,
    level: u32,
    friends: Vec<Friend>,
    pending: Vec<PendingFriend>,
    calls: Vec<SandboxCall>,
    login_error: Option<AuthError>,
    fail_calls: bool,
    call_delay: Option<Duration>,
    events_tx: Option<mpsc::Sender<AccountEvent>>,
}

/// Sandbox [`AccountConnector`]. Clones share the same simulated account.
#[derive(Clone)]
pub struct SandboxConnector {
    shared: Arc<Mutex<Shared>>,
}

impl SandboxConnector {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                display_name: display_name.into(),
                level: 1,
                friends: Vec::new(),
                pending: Vec::new(),
                calls: Vec::new(),
                login_error: None,
                fail_calls: false,
                call_delay: None,
                events_tx: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_friends(self, friends: Vec<Friend>) -> Self {
        self.lock().friends = friends;
        self
    }

    pub fn with_pending(self, pending: Vec<PendingFriend>) -> Self {
        self.lock().pending = pending;
        self
    }

    /// Makes every following login fail with `error` (or succeed on `None`).
    pub fn fail_logins(&self, error: Option<AuthError>) {
        self.lock().login_error = error;
    }

    /// Makes every following session call fail.
    pub fn fail_calls(&self, fail: bool) {
        self.lock().fail_calls = fail;
    }

    /// Delays every following session call.
    pub fn delay_calls(&self, delay: Option<Duration>) {
        self.lock().call_delay = delay;
    }

    /// Returns the calls received so far.
    pub fn calls(&self) -> Vec<SandboxCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Adds an inbound friend request without emitting an event.
    pub fn push_pending(&self, request: PendingFriend) {
        self.lock().pending.push(request);
    }

    /// Pushes an event to the current session.
    ///
    /// Returns `false` when no session is listening.
    pub async fn emit(&self, event: AccountEvent) -> bool {
        let tx = self.lock().events_tx.clone();
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Ends the current session's event stream, as a dropped connection
    /// would.
    pub fn drop_connection(&self) {
        self.lock().events_tx = None;
    }
}

impl AccountConnector for SandboxConnector {
    fn login<'a>(&'a self, credentials: &'a Credentials) -> LoginFuture<'a> {
        Box::pin(async move {
            let mut shared = self.lock();
            shared.calls.push(SandboxCall::Login {
                account_id: credentials.account_id.clone(),
            });
            if let Some(err) = shared.login_error.clone() {
                debug!(account = %credentials.account_id, "sandbox login rejected");
                return Err(err);
            }

            let (tx, rx) = mpsc::channel(64);
            shared.events_tx = Some(tx);
            info!(account = %credentials.account_id, "sandbox session opened");

            let session: Arc<dyn AccountSession> = Arc::new(SandboxSession {
                shared: self.shared.clone(),
            });
            Ok(LoginOutcome {
                session,
                events: rx,
            })
        })
    }
}

struct SandboxSession {
    shared: Arc<Mutex<Shared>>,
}

impl SandboxSession {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `call` after the configured delay and applies `effect`
    /// unless calls are set to fail.
    async fn call(
        &self,
        call: SandboxCall,
        effect: impl FnOnce(&mut Shared),
    ) -> Result<(), AccountError> {
        let delay = self.lock().call_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut shared = self.lock();
        shared.calls.push(call);
        if shared.fail_calls {
            return Err(AccountError::Upstream("sandbox call failed".into()));
        }
        effect(&mut *shared);
        Ok(())
    }
}

impl AccountSession for SandboxSession {
    fn display_name(&self) -> String {
        self.lock().display_name.clone()
    }

    fn level(&self) -> u32 {
        self.lock().level
    }

    fn friends(&self) -> Vec<Friend> {
        self.lock().friends.clone()
    }

    fn pending_friends(&self) -> Vec<PendingFriend> {
        self.lock().pending.clone()
    }

    fn apply_cosmetic<'a>(
        &'a self,
        slot: Slot,
        id: &'a str,
        styles: &'a [Style],
    ) -> AccountFuture<'a, ()> {
        let call = SandboxCall::Apply {
            slot,
            id: id.to_string(),
            styles: styles.to_vec(),
        };
        Box::pin(self.call(call, |_| {}))
    }

    fn set_level(&self, level: u32) -> AccountFuture<'_, ()> {
        Box::pin(self.call(SandboxCall::SetLevel(level), move |s| s.level = level))
    }

    fn clear_emote(&self) -> AccountFuture<'_, ()> {
        Box::pin(self.call(SandboxCall::ClearEmote, |_| {}))
    }

    fn set_status<'a>(&'a self, status: &'a str) -> AccountFuture<'a, ()> {
        Box::pin(self.call(SandboxCall::SetStatus(status.to_string()), |_| {}))
    }

    fn accept_friend_request<'a>(&'a self, id: &'a str) -> AccountFuture<'a, ()> {
        Box::pin(self.call(SandboxCall::AcceptFriend(id.to_string()), move |s| {
            if let Some(pos) = s.pending.iter().position(|p| p.id == id) {
                let request = s.pending.remove(pos);
                s.friends.push(Friend {
                    id: request.id,
                    display_name: request.display_name,
                    is_online: false,
                });
            }
        }))
    }

    fn accept_party_invite<'a>(&'a self, id: &'a str) -> AccountFuture<'a, ()> {
        Box::pin(self.call(SandboxCall::AcceptPartyInvite(id.to_string()), |_| {}))
    }

    fn invite_friend<'a>(&'a self, id: &'a str) -> AccountFuture<'a, ()> {
        Box::pin(self.call(SandboxCall::Invite(id.to_string()), |_| {}))
    }

    fn remove_friend<'a>(&'a self, id: &'a str) -> AccountFuture<'a, ()> {
        Box::pin(self.call(SandboxCall::Remove(id.to_string()), move |s| {
            s.friends.retain(|f| f.id != id);
        }))
    }

    fn send_message<'a>(&'a self, id: &'a str, content: &'a str) -> AccountFuture<'a, ()> {
        let call = SandboxCall::SendMessage {
            to: id.to_string(),
            content: content.to_string(),
        };
        Box::pin(self.call(call, |_| {}))
    }

    fn logout(&self) -> AccountFuture<'_, ()> {
        Box::pin(async move {
            let mut shared = self.lock();
            shared.calls.push(SandboxCall::Logout);
            shared.events_tx = None;
            Ok(())
        })
    }
}
