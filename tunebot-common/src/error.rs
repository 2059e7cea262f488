// ================================================================
// File: tunebot-common/src/error.rs
// ================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// No stored credential at all; the operator has to run the
    /// authorization-code flow once before the bot can start.
    #[error("No token data found. Please authenticate first.")]
    CredentialMissing,

    #[error("No refresh token available. Please authenticate first.")]
    NoRefreshToken,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The chat server rejected the login (expired or revoked token).
    #[error("Login authentication failed: {0}")]
    AuthRejected(String),

    #[error("Transport dropped: {0}")]
    TransportDropped(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for the one failure class that warrants an immediate
    /// refresh-and-retry during initialization.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Error::AuthRejected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_login_rejection_triggers_the_refresh_retry() {
        assert!(Error::AuthRejected("bad token".into()).is_auth_rejected());
        assert!(!Error::TransportDropped("eof".into()).is_auth_rejected());
        assert!(!Error::CredentialMissing.is_auth_rejected());
    }

    #[test]
    fn free_text_failures_name_their_category() {
        assert_eq!(
            Error::Platform("no connection".into()).to_string(),
            "Platform error: no connection"
        );
        assert_eq!(
            Error::RefreshFailed("{\"status\":400}".into()).to_string(),
            "Token refresh failed: {\"status\":400}"
        );
    }
}
