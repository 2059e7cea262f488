// File: tunebot-core/src/test_utils/helpers.rs
//
// In-memory stand-ins for every seam of the runtime. Integration tests wire
// these into a `BotRuntime` and drive it on paused tokio time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Map;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use tunebot_common::models::{ChatEvent, CredentialRecord, NowPlayingRecord};
use crate::auth::{TokenAuthority, TokenGrant};
use crate::platforms::{ChatClient, ChatClientFactory, PresenceDisplay};
use crate::repositories::{NowPlayingStore, TokenStore};
use crate::utils::Clock;
use crate::Error;

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Epoch clock that advances with tokio time, so `start_paused` tests move
/// wall time and timers together.
pub struct PausedClock {
    base_ms: i64,
    origin: Instant,
}

impl PausedClock {
    pub fn new(base_ms: i64) -> Self {
        Self {
            base_ms,
            origin: Instant::now(),
        }
    }
}

impl Clock for PausedClock {
    fn now_ms(&self) -> i64 {
        self.base_ms + self.origin.elapsed().as_millis() as i64
    }
}

// -----------------------------------------------------------------------------
// Stores
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryTokenStore {
    record: Mutex<Option<CredentialRecord>>,
    saves: AtomicUsize,
}

impl MemoryTokenStore {
    pub fn with_record(record: CredentialRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn current(&self) -> Option<CredentialRecord> {
        guard(&self.record).clone()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<CredentialRecord>, Error> {
        Ok(guard(&self.record).clone())
    }

    async fn save(&self, record: &CredentialRecord) -> Result<(), Error> {
        *guard(&self.record) = Some(record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Token store whose backing file cannot be read.
#[derive(Default)]
pub struct UnreadableTokenStore {
    loads: AtomicUsize,
}

impl UnreadableTokenStore {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for UnreadableTokenStore {
    async fn load(&self) -> Result<Option<CredentialRecord>, Error> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Err(Error::Persistence("twitch_token.json: permission denied".into()))
    }

    async fn save(&self, _record: &CredentialRecord) -> Result<(), Error> {
        Err(Error::Persistence("twitch_token.json: permission denied".into()))
    }
}

#[derive(Default)]
pub struct MemoryNowPlayingStore {
    record: Mutex<Option<NowPlayingRecord>>,
    saves: AtomicUsize,
}

impl MemoryNowPlayingStore {
    pub fn with_record(record: NowPlayingRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn current(&self) -> Option<NowPlayingRecord> {
        guard(&self.record).clone()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NowPlayingStore for MemoryNowPlayingStore {
    async fn load(&self) -> Result<Option<NowPlayingRecord>, Error> {
        Ok(guard(&self.record).clone())
    }

    async fn save(&self, record: Option<&NowPlayingRecord>) -> Result<(), Error> {
        *guard(&self.record) = record.cloned();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Record that expires `expires_in_ms` after `now_ms`.
pub fn credential_record(access: &str, refresh: &str, now_ms: i64, expires_in_ms: i64) -> CredentialRecord {
    CredentialRecord {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        expires_in: expires_in_ms / 1000,
        expires_at: Some(now_ms + expires_in_ms),
        extra: Map::new(),
    }
}

// -----------------------------------------------------------------------------
// Token authority
// -----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum AuthOutcome {
    Grant { access_token: String, expires_in: i64 },
    Fail(String),
}

/// Authority that answers from a script, then with fresh four-hour grants.
#[derive(Default)]
pub struct ScriptedAuthority {
    script: Mutex<VecDeque<AuthOutcome>>,
    calls: AtomicUsize,
}

impl ScriptedAuthority {
    pub fn push(&self, outcome: AuthOutcome) {
        guard(&self.script).push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenAuthority for ScriptedAuthority {
    async fn exchange_refresh_token(&self, _refresh_token: &str) -> Result<TokenGrant, Error> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = guard(&self.script).pop_front().unwrap_or(AuthOutcome::Grant {
            access_token: format!("fresh-{n}"),
            expires_in: 4 * 60 * 60,
        });
        match outcome {
            AuthOutcome::Grant { access_token, expires_in } => Ok(TokenGrant {
                access_token,
                refresh_token: None,
                expires_in,
                extra: Map::new(),
            }),
            AuthOutcome::Fail(body) => Err(Error::RefreshFailed(body)),
        }
    }
}

// -----------------------------------------------------------------------------
// Presence display
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayCall {
    Listening(String),
    Hidden,
    Cleared,
}

#[derive(Default)]
pub struct RecordingDisplay {
    calls: Mutex<Vec<DisplayCall>>,
}

impl RecordingDisplay {
    pub fn calls(&self) -> Vec<DisplayCall> {
        guard(&self.calls).clone()
    }
}

impl PresenceDisplay for RecordingDisplay {
    fn show_listening(&self, text: &str) -> Result<(), Error> {
        guard(&self.calls).push(DisplayCall::Listening(text.to_string()));
        Ok(())
    }

    fn show_hidden(&self) -> Result<(), Error> {
        guard(&self.calls).push(DisplayCall::Hidden);
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        guard(&self.calls).push(DisplayCall::Cleared);
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Chat clients
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Ok,
    AuthRejected,
    TransportError,
}

#[derive(Default)]
struct FakeChatState {
    bearers: Mutex<Vec<String>>,
    senders: Mutex<Vec<UnboundedSender<ChatEvent>>>,
    script: Mutex<VecDeque<ConnectOutcome>>,
    said: Mutex<Vec<(String, String)>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    disconnects: AtomicUsize,
}

/// Factory for in-memory chat clients. Clones share state, so a test keeps
/// one clone and hands the other to the runtime.
#[derive(Clone, Default)]
pub struct FakeChatFactory {
    state: Arc<FakeChatState>,
}

impl FakeChatFactory {
    /// Outcomes for the next `connect` calls, in order. Unscripted connects
    /// succeed.
    pub fn script_connects(&self, outcomes: impl IntoIterator<Item = ConnectOutcome>) {
        guard(&self.state.script).extend(outcomes);
    }

    pub fn builds(&self) -> usize {
        guard(&self.state.bearers).len()
    }

    pub fn bearers(&self) -> Vec<String> {
        guard(&self.state.bearers).clone()
    }

    /// Pushes an event as if the `index`-th built client produced it.
    pub fn emit(&self, index: usize, event: ChatEvent) -> bool {
        guard(&self.state.senders)
            .get(index)
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Pushes an event from the most recently built client.
    pub fn emit_latest(&self, event: ChatEvent) -> bool {
        let latest = self.builds().saturating_sub(1);
        self.emit(latest, event)
    }

    pub fn said(&self) -> Vec<(String, String)> {
        guard(&self.state.said).clone()
    }

    /// Clients between the start of `connect` and their disconnect.
    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Highest number of clients ever active at once.
    pub fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }
}

impl ChatClientFactory for FakeChatFactory {
    fn build(&self, bearer: &str) -> Box<dyn ChatClient> {
        let (tx, rx) = mpsc::unbounded_channel();
        guard(&self.state.bearers).push(bearer.to_string());
        guard(&self.state.senders).push(tx);
        Box::new(FakeChatClient {
            state: self.state.clone(),
            rx: Some(rx),
            active: false,
        })
    }
}

struct FakeChatClient {
    state: Arc<FakeChatState>,
    rx: Option<UnboundedReceiver<ChatEvent>>,
    active: bool,
}

impl FakeChatClient {
    fn deactivate(&mut self) {
        if self.active {
            self.active = false;
            self.state.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ChatClient for FakeChatClient {
    fn take_events(&mut self) -> Option<UnboundedReceiver<ChatEvent>> {
        self.rx.take()
    }

    async fn connect(&mut self) -> Result<(), Error> {
        self.active = true;
        let now_active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(now_active, Ordering::SeqCst);
        tokio::task::yield_now().await;

        let outcome = guard(&self.state.script)
            .pop_front()
            .unwrap_or(ConnectOutcome::Ok);
        match outcome {
            ConnectOutcome::Ok => Ok(()),
            ConnectOutcome::AuthRejected => {
                self.deactivate();
                Err(Error::AuthRejected("Login authentication failed".into()))
            }
            ConnectOutcome::TransportError => {
                self.deactivate();
                Err(Error::Transport("connection refused".into()))
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        self.deactivate();
        Ok(())
    }

    async fn say(&self, channel: &str, message: &str) -> Result<(), Error> {
        guard(&self.state.said).push((channel.to_string(), message.to_string()));
        Ok(())
    }
}

impl Drop for FakeChatClient {
    fn drop(&mut self) {
        self.deactivate();
    }
}
