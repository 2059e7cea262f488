use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::debug;

use crate::auth::{TokenAuthority, TokenGrant};
use crate::Error;

pub const TWITCH_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const USER_AGENT: &str = concat!("tunebot/", env!("CARGO_PKG_VERSION"));

/// Twitch's OAuth token endpoint, used for the refresh-token grant.
pub struct TwitchTokenEndpoint {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl TwitchTokenEndpoint {
    pub fn new(client_id: &str, client_secret: &str) -> Result<Self, Error> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            token_url: TWITCH_TOKEN_URL.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    /// Points the endpoint somewhere else (tests, proxies).
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }
}

#[async_trait]
impl TokenAuthority for TwitchTokenEndpoint {
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, Error> {
        let body = json!({
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        });

        let resp = self
            .http
            .post(&self.token_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::RefreshFailed(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::RefreshFailed(e.to_string()))?;
        debug!("(TwitchTokenEndpoint) refresh => HTTP {status}");

        if status != StatusCode::OK {
            return Err(Error::RefreshFailed(text));
        }
        serde_json::from_str(&text)
            .map_err(|e| Error::RefreshFailed(format!("unexpected token response ({e}): {text}")))
    }
}
