//! Runtime settings for the bot. The binary fills these from CLI flags and
//! the environment; tests build them directly.

use std::path::PathBuf;
use std::time::Duration;

/// Every delay the supervisor, scheduler and tracker use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// How long before expiry the proactive refresh fires.
    pub refresh_lead: Duration,
    /// Lower bound for any refresh delay.
    pub refresh_floor: Duration,
    /// Delay before the single retry of a failed refresh.
    pub refresh_retry: Duration,
    pub reconnect_cooldown: Duration,
    /// Flat delay between attempts of the outer initialization loop.
    pub init_retry: Duration,
    pub silence_window: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            refresh_lead: Duration::from_secs(2 * 60),
            refresh_floor: Duration::from_secs(30),
            refresh_retry: Duration::from_secs(60),
            reconnect_cooldown: Duration::from_millis(5000),
            init_retry: Duration::from_secs(30),
            silence_window: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BotSettings {
    /// Login the bot chats as.
    pub bot_username: String,
    /// Channel to join and announce in, without the leading `#`.
    pub channel: String,
    /// Login that counts as the channel owner for admin commands.
    pub channel_owner: String,
    /// Presence identity whose listening activity is tracked.
    pub observed_user_id: String,
    /// Activity name that qualifies, e.g. `Spotify`.
    pub tracked_source: String,
    pub token_file: PathBuf,
    pub now_playing_file: PathBuf,
    pub timings: Timings,
}

impl BotSettings {
    pub fn new(bot_username: &str, channel: &str, observed_user_id: &str) -> Self {
        let channel = channel.trim_start_matches('#').to_lowercase();
        Self {
            bot_username: bot_username.to_lowercase(),
            channel_owner: channel.clone(),
            channel,
            observed_user_id: observed_user_id.to_string(),
            tracked_source: "Spotify".to_string(),
            token_file: PathBuf::from("twitch_token.json"),
            now_playing_file: PathBuf::from("latestSongInfo.json"),
            timings: Timings::default(),
        }
    }

    /// IRC form of the target channel.
    pub fn irc_channel(&self) -> String {
        format!("#{}", self.channel)
    }
}
