//! src/eventbus/mod.rs
//!
//! The single event queue the bot runtime drains. Chat clients, the presence
//! gateway and every timer post into it; only the runtime task consumes it,
//! so all state changes happen on one logical thread.

use tokio::sync::mpsc;
use tracing::trace;

use tunebot_common::models::{ChatEvent, PresenceUpdate};

use crate::utils::TimerToken;

/// Which run of the refresh cycle a `RefreshDue` belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshAttempt {
    Scheduled,
    Retry,
}

#[derive(Debug, Clone)]
pub enum BotEvent {
    /// Event from a chat client. `generation` identifies the client instance
    /// so events from a torn-down client can be discarded.
    Chat { generation: u64, event: ChatEvent },

    /// Presence snapshot from the gateway.
    Presence(PresenceUpdate),

    RefreshDue { token: TimerToken, attempt: RefreshAttempt },
    ReconnectDue(TimerToken),
    InitializeDue(TimerToken),
    SilenceElapsed(TimerToken),

    Shutdown,
}

impl BotEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            BotEvent::Chat { .. } => "chat",
            BotEvent::Presence(_) => "presence",
            BotEvent::RefreshDue { .. } => "refresh_due",
            BotEvent::ReconnectDue(_) => "reconnect_due",
            BotEvent::InitializeDue(_) => "initialize_due",
            BotEvent::SilenceElapsed(_) => "silence_elapsed",
            BotEvent::Shutdown => "shutdown",
        }
    }
}

/// Cloneable handle for posting into the runtime's queue.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<BotEvent>,
}

impl EventSender {
    /// Creates the queue. The receiver goes to the runtime.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BotEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns `false` once the runtime has stopped.
    pub fn publish(&self, event: BotEvent) -> bool {
        let kind = event.event_type();
        match self.tx.send(event) {
            Ok(()) => true,
            Err(_) => {
                trace!("(EventSender) runtime gone, dropping {kind} event");
                false
            }
        }
    }

    pub fn shutdown(&self) {
        self.publish(BotEvent::Shutdown);
    }

    /// Raw sender for [`crate::utils::SingleSlotTimer::arm`].
    pub fn raw(&self) -> &mpsc::UnboundedSender<BotEvent> {
        &self.tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_reports_a_stopped_runtime() {
        let (events, mut rx) = EventSender::channel();
        assert!(events.publish(BotEvent::Shutdown));
        assert!(matches!(rx.try_recv(), Ok(BotEvent::Shutdown)));

        drop(rx);
        assert!(!events.publish(BotEvent::Shutdown));
    }
}
