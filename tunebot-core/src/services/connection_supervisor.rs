//! Owns the single live chat client and every transition of its lifecycle:
//! initialization, credential-driven rebuilds, teardown, and the
//! cooldown-gated reconnection protocol.
//!
//! Lifecycle of a client instance: construct → attach (event forwarder) →
//! connect → run → detach → disconnect → drop. Teardown of the previous
//! instance always completes before the next one is constructed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use tunebot_common::models::{ChatEvent, ChatMessage, ConnectionState, Credential};
use crate::auth::CredentialRefresher;
use crate::eventbus::{BotEvent, EventSender, RefreshAttempt};
use crate::platforms::{ChatClient, ChatClientFactory, ChatOutbound};
use crate::repositories::TokenStore;
use crate::settings::Timings;
use crate::tasks::RefreshScheduler;
use crate::utils::{Clock, SingleSlotTimer, TimerToken};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectSource {
    Disconnected,
    Error,
}

impl fmt::Display for ReconnectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconnectSource::Disconnected => write!(f, "disconnected"),
            ReconnectSource::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Scheduled,
    AlreadyReconnecting,
    WithinCooldown,
}

/// Guard against overlapping or rapid-fire reconnection attempts.
#[derive(Debug, Clone)]
pub struct ReconnectGovernor {
    is_reconnecting: bool,
    last_attempt_ms: Option<i64>,
    cooldown_ms: i64,
}

impl ReconnectGovernor {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            is_reconnecting: false,
            last_attempt_ms: None,
            cooldown_ms: cooldown.as_millis() as i64,
        }
    }

    /// Starts an attempt unless one is in flight or the last one began less
    /// than the cooldown ago.
    pub fn try_begin(&mut self, now_ms: i64) -> ReconnectDecision {
        if self.is_reconnecting {
            return ReconnectDecision::AlreadyReconnecting;
        }
        if let Some(last) = self.last_attempt_ms {
            if now_ms - last < self.cooldown_ms {
                return ReconnectDecision::WithinCooldown;
            }
        }
        self.is_reconnecting = true;
        self.last_attempt_ms = Some(now_ms);
        ReconnectDecision::Scheduled
    }

    /// Called once an attempt is over, whatever its outcome.
    pub fn finish(&mut self) {
        self.is_reconnecting = false;
    }

    pub fn is_reconnecting(&self) -> bool {
        self.is_reconnecting
    }

    pub fn last_attempt_ms(&self) -> Option<i64> {
        self.last_attempt_ms
    }
}

struct LiveClient {
    generation: u64,
    client: Box<dyn ChatClient>,
    forwarder: JoinHandle<()>,
}

pub struct ConnectionSupervisor {
    factory: Arc<dyn ChatClientFactory>,
    store: Arc<dyn TokenStore>,
    refresher: CredentialRefresher,
    clock: Arc<dyn Clock>,
    events: EventSender,

    state: ConnectionState,
    live: Option<LiveClient>,
    generation: u64,

    governor: ReconnectGovernor,
    refresh: RefreshScheduler,
    reconnect_timer: SingleSlotTimer,
    init_retry_timer: SingleSlotTimer,
    reconnect_cooldown: Duration,
    init_retry: Duration,
}

impl ConnectionSupervisor {
    pub fn new(
        factory: Arc<dyn ChatClientFactory>,
        store: Arc<dyn TokenStore>,
        refresher: CredentialRefresher,
        clock: Arc<dyn Clock>,
        timings: &Timings,
        events: EventSender,
    ) -> Self {
        Self {
            factory,
            store,
            refresher,
            clock,
            events,
            state: ConnectionState::Disconnected,
            live: None,
            generation: 0,
            governor: ReconnectGovernor::new(timings.reconnect_cooldown),
            refresh: RefreshScheduler::new(timings),
            reconnect_timer: SingleSlotTimer::new("reconnect"),
            init_retry_timer: SingleSlotTimer::new("init-retry"),
            reconnect_cooldown: timings.reconnect_cooldown,
            init_retry: timings.init_retry,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.live.is_some()
    }

    /// Generation of the live client, if any.
    pub fn live_generation(&self) -> Option<u64> {
        self.live.as_ref().map(|l| l.generation)
    }

    pub fn governor(&self) -> &ReconnectGovernor {
        &self.governor
    }

    pub fn refresh_pending(&self) -> bool {
        self.refresh.is_pending()
    }

    /// Loads the credential, refreshes it first if expired, connects, and
    /// arms the proactive refresh. A rejected login gets exactly one
    /// refresh-and-retry.
    pub async fn initialize(&mut self) -> Result<(), Error> {
        let record = match self.store.load().await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(Error::CredentialMissing),
            Err(e) => {
                warn!("Could not read stored credential, treating as absent: {e}");
                return Err(Error::CredentialMissing);
            }
        };

        let mut credential = if record.is_expired_at(self.clock.now_ms()) {
            info!("Token expired, refreshing before connecting...");
            self.refresher.refresh().await?
        } else {
            record.to_credential()
        };

        if let Err(e) = self.connect_with(&credential).await {
            if !e.is_auth_rejected() {
                return Err(e);
            }
            warn!("Login failed ({e}), attempting to refresh OAuth token...");
            credential = match self.refresher.refresh().await {
                Ok(fresh) => fresh,
                Err(refresh_err) => {
                    error!("Failed to refresh token: {refresh_err}");
                    return Err(Error::AuthRejected(
                        "authentication failed and token refresh unsuccessful, re-authenticate".into(),
                    ));
                }
            };
            self.connect_with(&credential).await?;
        }

        self.refresh
            .arm(credential.expires_at_ms, self.clock.now_ms(), &self.events);
        Ok(())
    }

    /// The outer initialization routine. On failure it schedules another
    /// full attempt after a flat delay; it never gives up.
    pub async fn ensure_connected(&mut self) -> bool {
        let ok = match self.initialize().await {
            Ok(()) => {
                self.init_retry_timer.cancel_if_pending();
                info!("Chat client successfully initialized and connected");
                true
            }
            Err(e) => {
                error!("Failed to initialize chat client: {e}");
                self.arm_init_retry();
                false
            }
        };
        self.governor.finish();
        ok
    }

    /// Replaces the live client with one built from `credential`.
    pub async fn rebuild(&mut self, credential: &Credential) -> Result<(), Error> {
        self.connect_with(credential).await?;
        self.refresh
            .arm(credential.expires_at_ms, self.clock.now_ms(), &self.events);
        info!("Chat client rebuilt with refreshed credential");
        Ok(())
    }

    /// Detaches and closes the live client and cancels the proactive
    /// refresh. Safe to call at any time.
    pub async fn teardown(&mut self) {
        self.refresh.cancel();
        if let Some(live) = self.live.take() {
            Self::close(live).await;
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Teardown plus cancellation of every pending timer.
    pub async fn shutdown(&mut self) {
        self.reconnect_timer.cancel_if_pending();
        self.init_retry_timer.cancel_if_pending();
        self.teardown().await;
        info!("Connection supervisor stopped");
    }

    /// Entry point of the reconnection protocol. Returns whether an attempt
    /// was scheduled; skipped triggers are dropped, not queued.
    pub fn request_reconnect(&mut self, source: ReconnectSource) -> bool {
        match self.governor.try_begin(self.clock.now_ms()) {
            ReconnectDecision::Scheduled => {
                self.state = ConnectionState::ReconnectCooldown;
                info!(
                    "Initiating reconnection from {source} in {}ms",
                    self.reconnect_cooldown.as_millis()
                );
                self.reconnect_timer
                    .arm(self.reconnect_cooldown, self.events.raw(), BotEvent::ReconnectDue);
                true
            }
            ReconnectDecision::AlreadyReconnecting => {
                info!("Skipping reconnection attempt from {source} - already reconnecting");
                false
            }
            ReconnectDecision::WithinCooldown => {
                info!("Skipping reconnection attempt from {source} - within cooldown period");
                false
            }
        }
    }

    /// Filters an event from a chat client. Messages from the live client
    /// are handed back for routing; transport events start the reconnection
    /// protocol; anything from a detached client is dropped.
    pub fn on_chat_event(&mut self, generation: u64, event: ChatEvent) -> Option<ChatMessage> {
        if self.live_generation() != Some(generation) {
            debug!("Ignoring event from detached chat client (generation {generation})");
            return None;
        }
        match event {
            ChatEvent::Message(msg) => Some(msg),
            ChatEvent::Disconnected(reason) => {
                warn!("Chat client disconnected: {reason}");
                self.request_reconnect(ReconnectSource::Disconnected);
                None
            }
            ChatEvent::Error(err) => {
                error!("Chat client error: {err}");
                self.request_reconnect(ReconnectSource::Error);
                None
            }
        }
    }

    /// Proactive refresh cycle: refresh, rebuild, re-arm. A failed scheduled
    /// cycle gets one retry; a failed retry gives up until the next cycle,
    /// unless the failure left no client at all, in which case the outer
    /// initialization loop takes over.
    pub async fn on_refresh_due(&mut self, token: TimerToken, attempt: RefreshAttempt) {
        if !self.refresh.fire(token) {
            return;
        }
        info!("Proactively refreshing chat OAuth token before expiry...");
        let outcome = match self.refresher.refresh().await {
            Ok(credential) => self.rebuild(&credential).await,
            Err(e) => Err(e),
        };
        let Err(e) = outcome else {
            return;
        };

        match attempt {
            RefreshAttempt::Scheduled => {
                error!("Proactive token refresh failed: {e}");
                let delay = self.refresh.arm_retry(&self.events);
                warn!("Retrying token refresh in {}s", delay.as_secs());
            }
            RefreshAttempt::Retry => {
                error!("Second proactive refresh attempt failed: {e}");
                if self.live.is_none()
                    && !self.governor.is_reconnecting()
                    && !self.init_retry_timer.is_pending()
                {
                    warn!("No chat client left after failed refresh; falling back to initialization loop");
                    self.arm_init_retry();
                }
            }
        }
    }

    pub async fn on_reconnect_due(&mut self, token: TimerToken) {
        if !self.reconnect_timer.fire(token) {
            return;
        }
        self.teardown().await;
        self.ensure_connected().await;
    }

    pub async fn on_initialize_due(&mut self, token: TimerToken) {
        if !self.init_retry_timer.fire(token) {
            return;
        }
        if self.is_connected() {
            debug!("Initialization retry fired while connected; nothing to do");
            return;
        }
        self.ensure_connected().await;
    }

    fn arm_init_retry(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.init_retry_timer
            .arm(self.init_retry, self.events.raw(), BotEvent::InitializeDue);
        info!("Retrying chat initialization in {}s", self.init_retry.as_secs());
    }

    /// Tears down whatever is live, then builds, attaches and connects a new
    /// client for `credential`.
    async fn connect_with(&mut self, credential: &Credential) -> Result<(), Error> {
        self.teardown().await;

        self.generation += 1;
        let generation = self.generation;
        self.state = ConnectionState::Connecting;

        let mut client = self.factory.build(&credential.bearer());
        let Some(rx) = client.take_events() else {
            self.state = ConnectionState::Disconnected;
            return Err(Error::Platform("chat client exposes no event stream".into()));
        };
        let forwarder = spawn_forwarder(rx, generation, self.events.clone());

        info!("Connecting chat client (generation {generation})");
        if let Err(e) = client.connect().await {
            Self::close(LiveClient { generation, client, forwarder }).await;
            self.state = ConnectionState::Disconnected;
            return Err(e);
        }

        self.live = Some(LiveClient { generation, client, forwarder });
        self.state = ConnectionState::Connected;
        Ok(())
    }

    async fn close(mut live: LiveClient) {
        live.forwarder.abort();
        if let Err(e) = live.client.disconnect().await {
            debug!("Ignoring disconnect error during teardown: {e}");
        }
        trace!("Chat client generation {} destroyed", live.generation);
    }
}

fn spawn_forwarder(
    mut rx: UnboundedReceiver<ChatEvent>,
    generation: u64,
    events: EventSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if !events.publish(BotEvent::Chat { generation, event }) {
                break;
            }
        }
        trace!("Event forwarder for generation {generation} ended");
    })
}

#[async_trait]
impl ChatOutbound for ConnectionSupervisor {
    async fn say(&self, channel: &str, message: &str) -> Result<(), Error> {
        match &self.live {
            Some(live) if self.state == ConnectionState::Connected => {
                live.client.say(channel, message).await
            }
            _ => {
                debug!("Chat client not ready yet, skipping message");
                Ok(())
            }
        }
    }
}
