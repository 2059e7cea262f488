//! The single owning task. Every timer fire, chat event and presence
//! snapshot arrives as a [`BotEvent`] and is handled here in order, so the
//! supervisor, tracker and router are never mutated concurrently.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::auth::{CredentialRefresher, TokenAuthority};
use crate::eventbus::{BotEvent, EventSender};
use crate::platforms::{ChatClientFactory, PresenceDisplay};
use crate::repositories::{NowPlayingStore, TokenStore};
use crate::settings::BotSettings;
use crate::utils::Clock;
use super::command_router::CommandRouter;
use super::connection_supervisor::ConnectionSupervisor;
use super::presence_tracker::PresenceTracker;

/// External collaborators of the runtime.
pub struct RuntimeDeps {
    pub chat_factory: Arc<dyn ChatClientFactory>,
    pub token_store: Arc<dyn TokenStore>,
    pub now_playing_store: Arc<dyn NowPlayingStore>,
    pub authority: Arc<dyn TokenAuthority>,
    pub display: Arc<dyn PresenceDisplay>,
    pub clock: Arc<dyn Clock>,
}

pub struct BotRuntime {
    supervisor: ConnectionSupervisor,
    tracker: PresenceTracker,
    router: CommandRouter,
    display: Arc<dyn PresenceDisplay>,
    clock: Arc<dyn Clock>,
    events: EventSender,
    rx: UnboundedReceiver<BotEvent>,
}

impl BotRuntime {
    /// `events`/`rx` come from [`EventSender::channel`]; producers outside
    /// the runtime (the presence gateway, Ctrl-C) get clones of `events`.
    pub fn new(
        settings: &BotSettings,
        deps: RuntimeDeps,
        events: EventSender,
        rx: UnboundedReceiver<BotEvent>,
    ) -> Self {
        let refresher = CredentialRefresher::new(
            deps.token_store.clone(),
            deps.authority,
            deps.clock.clone(),
        );
        let supervisor = ConnectionSupervisor::new(
            deps.chat_factory,
            deps.token_store,
            refresher,
            deps.clock.clone(),
            &settings.timings,
            events.clone(),
        );
        let tracker = PresenceTracker::new(
            settings,
            deps.now_playing_store,
            deps.clock.clone(),
            events.clone(),
        );
        Self {
            supervisor,
            tracker,
            router: CommandRouter::new(settings),
            display: deps.display,
            clock: deps.clock,
            events,
            rx,
        }
    }

    pub fn events(&self) -> EventSender {
        self.events.clone()
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    pub fn tracker(&self) -> &PresenceTracker {
        &self.tracker
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    /// Restores the persisted track and runs the first initialization.
    pub async fn start(&mut self) {
        self.tracker.restore().await;
        self.supervisor.ensure_connected().await;
    }

    /// Runs until a `Shutdown` event arrives, then tears everything down.
    pub async fn run(mut self) {
        self.start().await;
        while self.step().await {}
        self.stop().await;
    }

    /// Handles the next event. Returns `false` on shutdown.
    pub async fn step(&mut self) -> bool {
        match self.rx.recv().await {
            Some(event) => self.handle(event).await,
            None => false,
        }
    }

    /// Handles events until `duration` of (tokio) time has passed. Returns
    /// `false` if a shutdown was handled.
    pub async fn run_for(&mut self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(event)) => {
                    if !self.handle(event).await {
                        return false;
                    }
                }
                Ok(None) => return false,
                Err(_) => return true,
            }
        }
    }

    pub async fn stop(&mut self) {
        self.tracker.shutdown();
        self.supervisor.shutdown().await;
        info!("Bot runtime stopped");
    }

    async fn handle(&mut self, event: BotEvent) -> bool {
        debug!("Handling {} event", event.event_type());
        match event {
            BotEvent::Chat { generation, event } => {
                if let Some(msg) = self.supervisor.on_chat_event(generation, event) {
                    let now = self.clock.now_ms();
                    self.router
                        .handle_message(&msg, &self.tracker, &self.supervisor, self.display.as_ref(), now)
                        .await;
                }
            }
            BotEvent::Presence(update) => {
                if let Some(change) = self.tracker.on_snapshot(&update).await {
                    self.router
                        .on_presence_change(&change, &self.supervisor, self.display.as_ref())
                        .await;
                }
            }
            BotEvent::SilenceElapsed(token) => {
                if let Some(change) = self.tracker.on_silence_elapsed(token).await {
                    self.router
                        .on_presence_change(&change, &self.supervisor, self.display.as_ref())
                        .await;
                }
            }
            BotEvent::RefreshDue { token, attempt } => {
                self.supervisor.on_refresh_due(token, attempt).await;
            }
            BotEvent::ReconnectDue(token) => self.supervisor.on_reconnect_due(token).await,
            BotEvent::InitializeDue(token) => self.supervisor.on_initialize_due(token).await,
            BotEvent::Shutdown => {
                info!("Shutdown requested");
                return false;
            }
        }
        true
    }
}
