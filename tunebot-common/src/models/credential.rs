use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix the Twitch chat server expects in front of a user access token.
pub const CHAT_BEARER_PREFIX: &str = "oauth:";

/// The credential record exactly as it sits on disk.
///
/// Anything the authority returns beyond the fields the bot needs
/// (`scope`, `token_type`, ...) is kept in `extra` so a save/load cycle
/// never loses data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: i64,
    /// Epoch milliseconds. Absent only in records written by hand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CredentialRecord {
    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.trim().is_empty()
    }

    /// Expired when `now >= expires_at`. A record without an expiry is
    /// treated as expired so the first start refreshes it.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        match self.expires_at {
            Some(at) => now_ms >= at,
            None => true,
        }
    }

    pub fn to_credential(&self) -> Credential {
        Credential {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at_ms: self.expires_at,
        }
    }
}

/// In-memory view of the current credential, read-copied from the store.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at_ms: Option<i64>,
}

impl Credential {
    /// The password form the chat client logs in with.
    pub fn bearer(&self) -> String {
        if self.access_token.starts_with(CHAT_BEARER_PREFIX) {
            self.access_token.clone()
        } else {
            format!("{}{}", CHAT_BEARER_PREFIX, self.access_token)
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at_ms
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

// Tokens never end up in logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at_ms", &self.expires_at_ms)
            .finish()
    }
}
