//! tunebot-server/src/server.rs
//!
//! Wires the stores, the Twitch chat factory and the Discord bridge into a
//! `BotRuntime` and runs it until Ctrl-C.

use std::sync::Arc;

use tracing::{error, info};

use tunebot_core::Error;
use tunebot_core::BotSettings;
use tunebot_core::eventbus::EventSender;
use tunebot_core::platforms::discord::DiscordPresenceBridge;
use tunebot_core::platforms::twitch_irc::{TwitchIrcClientFactory, TwitchTokenEndpoint};
use tunebot_core::platforms::{LogOnlyDisplay, PresenceDisplay};
use tunebot_core::repositories::json_file::{FileNowPlayingStore, FileTokenStore};
use tunebot_core::services::{BotRuntime, RuntimeDeps};
use tunebot_core::utils::SystemClock;

use crate::Args;

fn required_env(key: &str) -> Result<String, Error> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Config(format!("environment variable {key} is not set"))),
    }
}

pub fn settings_from_args(args: &Args) -> BotSettings {
    let mut settings = BotSettings::new(&args.bot_username, &args.channel, &args.observe_user_id);
    settings.tracked_source = args.tracked_source.clone();
    settings.token_file = args.token_file.clone().into();
    settings.now_playing_file = args.now_playing_file.clone().into();
    settings
}

pub async fn run_server(args: Args) -> Result<(), Error> {
    let settings = settings_from_args(&args);
    let client_id = required_env("CLIENT_ID")?;
    let client_secret = required_env("CLIENT_SECRET")?;

    let authority = TwitchTokenEndpoint::new(&client_id, &client_secret)?;
    let (events, rx) = EventSender::channel();

    let bridge = if args.no_discord {
        info!("--no-discord given; presence display goes to the log only.");
        None
    } else {
        let token = required_env("DISCORD_TOKEN")?;
        Some(Arc::new(DiscordPresenceBridge::start(token, events.clone())))
    };
    let display: Arc<dyn PresenceDisplay> = match &bridge {
        Some(b) => b.clone() as Arc<dyn PresenceDisplay>,
        None => Arc::new(LogOnlyDisplay),
    };

    let deps = RuntimeDeps {
        chat_factory: Arc::new(TwitchIrcClientFactory::new(
            &settings.bot_username,
            &settings.irc_channel(),
        )),
        token_store: Arc::new(FileTokenStore::new(settings.token_file.clone())),
        now_playing_store: Arc::new(FileNowPlayingStore::new(settings.now_playing_file.clone())),
        authority: Arc::new(authority),
        display,
        clock: Arc::new(SystemClock),
    };
    let runtime = BotRuntime::new(&settings, deps, events.clone(), rx);

    let ctrlc_events = events.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C detected; shutting down TuneBot...");
                ctrlc_events.shutdown();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {:?}", e),
        }
    });

    runtime.run().await;

    if let Some(bridge) = bridge {
        bridge.shutdown().await;
    }
    info!("Server shutdown complete.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_defaults_fill_settings() {
        let args = Args::parse_from([
            "tunebot",
            "--bot-username",
            "TuneBot",
            "--channel",
            "#Cremosa",
            "--observe-user-id",
            "1234",
        ]);
        let settings = settings_from_args(&args);
        assert_eq!(settings.irc_channel(), "#cremosa");
        assert_eq!(settings.bot_username, "tunebot");
        assert_eq!(settings.tracked_source, "Spotify");
        assert_eq!(settings.token_file.to_str(), Some("twitch_token.json"));
        assert_eq!(settings.now_playing_file.to_str(), Some("latestSongInfo.json"));
        assert!(!args.no_discord);
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "tunebot",
            "--bot-username",
            "b",
            "--channel",
            "c",
            "--observe-user-id",
            "1",
            "--tracked-source",
            "Deezer",
            "--token-file",
            "/tmp/t.json",
            "--no-discord",
        ]);
        let settings = settings_from_args(&args);
        assert_eq!(settings.tracked_source, "Deezer");
        assert_eq!(settings.token_file.to_str(), Some("/tmp/t.json"));
        assert!(args.no_discord);
    }
}
