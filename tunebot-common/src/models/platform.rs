// File: tunebot-common/src/models/platform.rs

use std::fmt;

/// Lifecycle of the supervised chat connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// A reconnect was accepted and is waiting out the cooldown.
    ReconnectCooldown,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::ReconnectCooldown => write!(f, "reconnect-cooldown"),
        }
    }
}
