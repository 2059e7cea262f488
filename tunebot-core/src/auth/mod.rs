// =============================================================================
// tunebot-core/src/auth/mod.rs
// =============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::Error;

pub mod refresher;

pub use refresher::CredentialRefresher;

/// Response of a successful refresh exchange.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Some authorities rotate the refresh token, some do not.
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The external authorization authority.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenAuthority: Send + Sync {
    /// One exchange of `refresh_token` for a new grant. Failures are
    /// `Error::RefreshFailed` with the authority's response body verbatim.
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, Error>;
}
