// File: src/platforms/mod.rs

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use tunebot_common::models::ChatEvent;
use crate::Error;

/// A chat protocol client. One instance per connection attempt; it is never
/// reconnected, the supervisor builds a fresh one instead.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Hands out the event stream. Returns `Some` exactly once, and is
    /// callable before `connect` so listeners attach first.
    fn take_events(&mut self) -> Option<UnboundedReceiver<ChatEvent>>;

    /// Resolves once the server accepted the login. A rejected login is
    /// reported as `Error::AuthRejected`.
    async fn connect(&mut self) -> Result<(), Error>;

    async fn disconnect(&mut self) -> Result<(), Error>;

    async fn say(&self, channel: &str, message: &str) -> Result<(), Error>;
}

/// Builds chat clients for a bearer credential.
pub trait ChatClientFactory: Send + Sync {
    fn build(&self, bearer: &str) -> Box<dyn ChatClient>;
}

/// Outbound side of chat as seen by the command router.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatOutbound: Send + Sync {
    async fn say(&self, channel: &str, message: &str) -> Result<(), Error>;
}

/// The bot's own presence status on the presence platform.
#[cfg_attr(test, mockall::automock)]
pub trait PresenceDisplay: Send + Sync {
    /// Shows "listening to `text`" and an online status.
    fn show_listening(&self, text: &str) -> Result<(), Error>;
    /// Shows the hidden/secret state used while the bot is disabled.
    fn show_hidden(&self) -> Result<(), Error>;
    /// Removes any activity.
    fn clear(&self) -> Result<(), Error>;
}

/// Display used when no presence platform is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyDisplay;

impl PresenceDisplay for LogOnlyDisplay {
    fn show_listening(&self, text: &str) -> Result<(), Error> {
        tracing::debug!("(LogOnlyDisplay) listening to {text}");
        Ok(())
    }

    fn show_hidden(&self) -> Result<(), Error> {
        tracing::debug!("(LogOnlyDisplay) hidden");
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        tracing::debug!("(LogOnlyDisplay) cleared");
        Ok(())
    }
}

// Re-export submodules
pub mod discord;
pub mod twitch_irc;
