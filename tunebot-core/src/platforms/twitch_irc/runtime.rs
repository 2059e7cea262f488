//! src/platforms/twitch_irc/runtime.rs
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use tunebot_common::models::{ChatEvent, CHAT_BEARER_PREFIX};
use crate::platforms::{ChatClient, ChatClientFactory};
use crate::Error;

use super::client::{TwitchIrcClient, TWITCH_IRC_HOST, TWITCH_IRC_TLS_PORT};

/// One Twitch chat session. Built per connection attempt by
/// [`TwitchIrcClientFactory`] and thrown away on teardown.
pub struct TwitchChatClient {
    username: String,
    bearer: String,
    channel: String,
    host: String,
    port: u16,

    tx: mpsc::UnboundedSender<ChatEvent>,
    rx: Option<mpsc::UnboundedReceiver<ChatEvent>>,
    client: Option<TwitchIrcClient>,
}

impl TwitchChatClient {
    pub fn new(username: &str, bearer: &str, channel: &str, host: &str, port: u16) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            username: username.to_string(),
            bearer: bearer.to_string(),
            channel: channel.to_string(),
            host: host.to_string(),
            port,
            tx,
            rx: Some(rx),
            client: None,
        }
    }
}

#[async_trait]
impl ChatClient for TwitchChatClient {
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ChatEvent>> {
        self.rx.take()
    }

    async fn connect(&mut self) -> Result<(), Error> {
        if self.client.is_some() {
            info!("(TwitchChatClient) connect => already connected");
            return Ok(());
        }
        if !self.bearer.starts_with(CHAT_BEARER_PREFIX) {
            return Err(Error::Platform(format!(
                "Twitch IRC token must start with '{CHAT_BEARER_PREFIX}'"
            )));
        }
        if self.username.is_empty() {
            return Err(Error::Config("Twitch IRC bot username is empty".into()));
        }

        let stream = TwitchIrcClient::connect_tls(&self.host, self.port).await?;
        let (client, login) =
            TwitchIrcClient::start(stream, &self.username, &self.bearer, self.tx.clone());

        match login.await {
            Ok(Ok(())) => {
                client.join_channel(&self.channel);
                info!("(TwitchChatClient) logged in as {} and joined {}", self.username, self.channel);
                self.client = Some(client);
                Ok(())
            }
            Ok(Err(e)) => {
                client.close().await;
                Err(e)
            }
            Err(_) => {
                client.close().await;
                Err(Error::TransportDropped("reader ended before login completed".into()))
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        if let Some(client) = self.client.take() {
            client.close().await;
            debug!("(TwitchChatClient) disconnected from {}", self.channel);
        }
        Ok(())
    }

    async fn say(&self, channel: &str, message: &str) -> Result<(), Error> {
        match &self.client {
            Some(client) => {
                client.send_privmsg(channel, message);
                Ok(())
            }
            None => Err(Error::Platform("No active Twitch IRC connection".into())),
        }
    }
}

/// Builds [`TwitchChatClient`]s for the configured bot login and channel.
#[derive(Debug, Clone)]
pub struct TwitchIrcClientFactory {
    username: String,
    channel: String,
    host: String,
    port: u16,
}

impl TwitchIrcClientFactory {
    pub fn new(username: &str, channel: &str) -> Self {
        Self {
            username: username.to_string(),
            channel: channel.to_string(),
            host: TWITCH_IRC_HOST.to_string(),
            port: TWITCH_IRC_TLS_PORT,
        }
    }

    pub fn with_endpoint(mut self, host: &str, port: u16) -> Self {
        self.host = host.to_string();
        self.port = port;
        self
    }
}

impl ChatClientFactory for TwitchIrcClientFactory {
    fn build(&self, bearer: &str) -> Box<dyn ChatClient> {
        Box::new(TwitchChatClient::new(
            &self.username,
            bearer,
            &self.channel,
            &self.host,
            self.port,
        ))
    }
}
