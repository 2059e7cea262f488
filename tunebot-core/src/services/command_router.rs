use tracing::{debug, error, info, warn};

use tunebot_common::models::{ChatMessage, NowPlayingFact, PresenceChange};
use crate::platforms::{ChatOutbound, PresenceDisplay};
use crate::settings::BotSettings;
use super::presence_tracker::PresenceTracker;

pub const ADMIN_COMMANDS: [&str; 2] = ["!mstart", "!mstop"];

pub const MUSIC_COMMANDS: [&str; 8] = [
    "!musica",
    "!song",
    "!nowplaying",
    "!np",
    "!current",
    "!playing",
    "!music",
    "!m",
];

pub const REPLY_ALREADY_ACTIVE: &str = "Já estou de olho!";
pub const REPLY_ENABLED: &str = "Tá bom minha vida, tô de olho...";
pub const REPLY_ALREADY_HIDDEN: &str = "Já estou em segredo!";
pub const REPLY_DISABLED: &str = "Tá bom minha vida, não vou mais vazar nada!";
pub const REPLY_NO_DATA: &str = "Não tenho informações da musica da CREMOSA ainda...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Enable,
    Disable,
    NowPlaying,
}

impl Command {
    /// Case-insensitive exact match of the whole message.
    pub fn parse(text: &str) -> Option<Self> {
        let lowered = text.to_lowercase();
        match lowered.as_str() {
            "!mstart" => Some(Command::Enable),
            "!mstop" => Some(Command::Disable),
            other if MUSIC_COMMANDS.contains(&other) => Some(Command::NowPlaying),
            _ => None,
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Command::Enable | Command::Disable)
    }
}

/// Text shown on the presence display and in announcements.
pub fn listening_text(fact: &NowPlayingFact) -> String {
    format!("{} por {}", fact.title, fact.attribution)
}

/// Chat commands plus the bot-active flag they toggle.
pub struct CommandRouter {
    channel: String,
    channel_owner: String,
    active: bool,
}

impl CommandRouter {
    pub fn new(settings: &BotSettings) -> Self {
        Self {
            channel: settings.irc_channel(),
            channel_owner: settings.channel_owner.clone(),
            active: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Channel owner, moderator or broadcaster.
    pub fn has_permission(&self, msg: &ChatMessage) -> bool {
        msg.sender_login.to_lowercase() == self.channel_owner
            || msg.is_moderator
            || msg.is_broadcaster
    }

    /// Handles one inbound chat line. Returns the reply that was sent, if
    /// any; denied and flag-gated commands produce nothing.
    pub async fn handle_message(
        &mut self,
        msg: &ChatMessage,
        tracker: &PresenceTracker,
        outbound: &dyn ChatOutbound,
        display: &dyn PresenceDisplay,
        now_ms: i64,
    ) -> Option<String> {
        if msg.is_self {
            return None;
        }
        let command = Command::parse(&msg.text)?;

        if command.is_admin() && !self.has_permission(msg) {
            debug!("Dropping {:?} from unprivileged user {}", command, msg.sender_login);
            return None;
        }

        let reply = match command {
            Command::Enable if self.active => REPLY_ALREADY_ACTIVE.to_string(),
            Command::Enable => {
                self.active = true;
                info!("Bot enabled by {}", msg.sender_login);
                if let Some(fact) = tracker.fact() {
                    report(display.show_listening(&listening_text(fact)));
                }
                REPLY_ENABLED.to_string()
            }
            Command::Disable if !self.active => REPLY_ALREADY_HIDDEN.to_string(),
            Command::Disable => {
                self.active = false;
                info!("Bot disabled by {}", msg.sender_login);
                report(display.show_hidden());
                REPLY_DISABLED.to_string()
            }
            Command::NowPlaying if !self.active => {
                debug!("Ignoring music query while inactive");
                return None;
            }
            Command::NowPlaying => match tracker.fact() {
                Some(fact) => format!(
                    "-> {} por {} - {} restantes",
                    fact.title,
                    fact.attribution,
                    tracker.remaining(now_ms)
                ),
                None => REPLY_NO_DATA.to_string(),
            },
        };

        if let Err(e) = outbound.say(&msg.channel, &reply).await {
            error!("Failed to send reply to {}: {e}", msg.channel);
        }
        Some(reply)
    }

    /// Announces a new item and mirrors it on the presence display while
    /// active; a cleared fact clears the display.
    pub async fn on_presence_change(
        &self,
        change: &PresenceChange,
        outbound: &dyn ChatOutbound,
        display: &dyn PresenceDisplay,
    ) {
        match change {
            PresenceChange::Changed(fact) => {
                if !self.active {
                    debug!("Inactive, not announcing {}", fact.title);
                    return;
                }
                let line = format!("Tocando agora -> {}", listening_text(fact));
                if let Err(e) = outbound.say(&self.channel, &line).await {
                    error!("Failed to announce track: {e}");
                }
                report(display.show_listening(&listening_text(fact)));
            }
            PresenceChange::Cleared => report(display.clear()),
        }
    }
}

fn report(result: Result<(), crate::Error>) {
    if let Err(e) = result {
        warn!("Presence display update failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use tunebot_common::models::{ActivityKind, ActivityWindow, PresenceActivity, PresenceUpdate};

    use crate::eventbus::EventSender;
    use crate::platforms::{MockChatOutbound, MockPresenceDisplay};
    use crate::test_utils::{MemoryNowPlayingStore, PausedClock};

    const T: i64 = 1_700_000_000_000;

    fn settings() -> BotSettings {
        BotSettings::new("tunebot", "cremosa", "observed")
    }

    fn msg(sender: &str, text: &str) -> ChatMessage {
        ChatMessage {
            channel: "#cremosa".into(),
            sender_login: sender.into(),
            display_name: sender.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    fn empty_tracker() -> PresenceTracker {
        let (events, _rx) = EventSender::channel();
        PresenceTracker::new(
            &settings(),
            Arc::new(MemoryNowPlayingStore::default()),
            Arc::new(PausedClock::new(T)),
            events,
        )
    }

    async fn tracker_playing(events: EventSender) -> PresenceTracker {
        let mut tracker = PresenceTracker::new(
            &settings(),
            Arc::new(MemoryNowPlayingStore::default()),
            Arc::new(PausedClock::new(T)),
            events,
        );
        tracker
            .on_snapshot(&PresenceUpdate {
                user_id: "observed".into(),
                activities: vec![PresenceActivity {
                    kind: ActivityKind::Listening,
                    name: "Spotify".into(),
                    details: Some("X".into()),
                    state: Some("Y".into()),
                    timestamps: Some(ActivityWindow { start: T, end: T + 180_000 }),
                }],
            })
            .await;
        tracker
    }

    #[test]
    fn parses_case_insensitive_exact_commands() {
        assert_eq!(Command::parse("!MSTART"), Some(Command::Enable));
        assert_eq!(Command::parse("!NowPlaying"), Some(Command::NowPlaying));
        assert_eq!(Command::parse("!m"), Some(Command::NowPlaying));
        assert_eq!(Command::parse("!m please"), None);
        assert_eq!(Command::parse(" !np"), None);
        for cmd in ADMIN_COMMANDS {
            assert!(Command::parse(cmd).is_some_and(Command::is_admin));
        }
    }

    #[test]
    fn permission_rules() {
        let router = CommandRouter::new(&settings());
        assert!(router.has_permission(&msg("Cremosa", "!mstop")));
        assert!(!router.has_permission(&msg("viewer", "!mstop")));

        let mut moderator = msg("viewer", "!mstop");
        moderator.is_moderator = true;
        assert!(router.has_permission(&moderator));

        let mut broadcaster = msg("other", "!mstop");
        broadcaster.is_broadcaster = true;
        assert!(router.has_permission(&broadcaster));
    }

    #[tokio::test]
    async fn unprivileged_admin_command_is_silent_and_changes_nothing() {
        let mut router = CommandRouter::new(&settings());
        let mut outbound = MockChatOutbound::new();
        outbound.expect_say().never();
        let mut display = MockPresenceDisplay::new();
        display.expect_show_hidden().never();

        let reply = router
            .handle_message(&msg("viewer", "!mstop"), &empty_tracker(), &outbound, &display, T)
            .await;
        assert_eq!(reply, None);
        assert!(router.is_active());
    }

    #[tokio::test]
    async fn self_messages_are_ignored() {
        let mut router = CommandRouter::new(&settings());
        let mut outbound = MockChatOutbound::new();
        outbound.expect_say().never();
        let display = MockPresenceDisplay::new();

        let mut own = msg("tunebot", "!np");
        own.is_self = true;
        assert_eq!(
            router.handle_message(&own, &empty_tracker(), &outbound, &display, T).await,
            None
        );
    }

    #[tokio::test]
    async fn disable_then_queries_go_silent() {
        let mut router = CommandRouter::new(&settings());
        let tracker = empty_tracker();
        let mut outbound = MockChatOutbound::new();
        outbound
            .expect_say()
            .withf(|channel: &str, text: &str| channel == "#cremosa" && text == REPLY_DISABLED)
            .times(1)
            .returning(|_, _| Ok(()));
        let mut display = MockPresenceDisplay::new();
        display.expect_show_hidden().times(1).returning(|| Ok(()));

        router
            .handle_message(&msg("cremosa", "!mstop"), &tracker, &outbound, &display, T)
            .await;
        assert!(!router.is_active());

        for query in MUSIC_COMMANDS {
            assert_eq!(
                router.handle_message(&msg("viewer", query), &tracker, &outbound, &display, T).await,
                None
            );
        }
    }

    #[tokio::test]
    async fn second_disable_reports_already_hidden() {
        let mut router = CommandRouter::new(&settings());
        let tracker = empty_tracker();
        let mut outbound = MockChatOutbound::new();
        outbound.expect_say().returning(|_, _| Ok(()));
        let mut display = MockPresenceDisplay::new();
        display.expect_show_hidden().times(1).returning(|| Ok(()));

        router.handle_message(&msg("cremosa", "!mstop"), &tracker, &outbound, &display, T).await;
        let reply = router
            .handle_message(&msg("cremosa", "!MSTOP"), &tracker, &outbound, &display, T)
            .await;
        assert_eq!(reply.as_deref(), Some(REPLY_ALREADY_HIDDEN));
    }

    #[tokio::test]
    async fn enable_restores_display_when_a_fact_is_held() {
        let (events, _rx) = EventSender::channel();
        let tracker = tracker_playing(events).await;
        let mut router = CommandRouter::new(&settings());
        let mut outbound = MockChatOutbound::new();
        outbound.expect_say().returning(|_, _| Ok(()));
        let mut display = MockPresenceDisplay::new();
        display.expect_show_hidden().returning(|| Ok(()));
        display
            .expect_show_listening()
            .withf(|text: &str| text == "X por Y")
            .times(1)
            .returning(|_| Ok(()));

        router.handle_message(&msg("cremosa", "!mstop"), &tracker, &outbound, &display, T).await;
        let reply = router
            .handle_message(&msg("cremosa", "!mstart"), &tracker, &outbound, &display, T)
            .await;
        assert_eq!(reply.as_deref(), Some(REPLY_ENABLED));
        assert!(router.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn now_playing_scenario() {
        let (events, _rx) = EventSender::channel();
        let tracker = tracker_playing(events).await;
        let mut router = CommandRouter::new(&settings());

        let mut outbound = MockChatOutbound::new();
        outbound
            .expect_say()
            .withf(|_: &str, text: &str| text == "-> X por Y - 01:30 restantes")
            .times(1)
            .returning(|_, _| Ok(()));
        outbound
            .expect_say()
            .withf(|_: &str, text: &str| text == REPLY_ALREADY_ACTIVE)
            .times(1)
            .returning(|_, _| Ok(()));
        let mut display = MockPresenceDisplay::new();
        display.expect_show_listening().never();
        display.expect_show_hidden().never();

        tokio::time::sleep(Duration::from_secs(90)).await;
        let now = T + 90_000;
        router.handle_message(&msg("viewer", "!song"), &tracker, &outbound, &display, now).await;

        let mut broadcaster = msg("someone", "!mstart");
        broadcaster.is_broadcaster = true;
        let reply = router.handle_message(&broadcaster, &tracker, &outbound, &display, now).await;
        assert_eq!(reply.as_deref(), Some(REPLY_ALREADY_ACTIVE));
        assert!(router.is_active());
    }

    #[tokio::test]
    async fn query_without_fact_reports_no_data() {
        let mut router = CommandRouter::new(&settings());
        let mut outbound = MockChatOutbound::new();
        outbound
            .expect_say()
            .withf(|_: &str, text: &str| text == REPLY_NO_DATA)
            .times(1)
            .returning(|_, _| Ok(()));
        let display = MockPresenceDisplay::new();

        router
            .handle_message(&msg("viewer", "!Musica"), &empty_tracker(), &outbound, &display, T)
            .await;
    }

    #[tokio::test]
    async fn change_is_announced_only_while_active() {
        let fact = NowPlayingFact {
            title: "X".into(),
            attribution: "Y".into(),
            started_at_ms: T,
            window_start_ms: T,
            window_end_ms: T + 1000,
        };
        let mut router = CommandRouter::new(&settings());
        let mut outbound = MockChatOutbound::new();
        outbound
            .expect_say()
            .withf(|channel: &str, text: &str| {
                channel == "#cremosa" && text == "Tocando agora -> X por Y"
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let mut display = MockPresenceDisplay::new();
        display.expect_show_listening().times(1).returning(|_| Ok(()));
        display.expect_show_hidden().returning(|| Ok(()));
        display.expect_clear().times(1).returning(|| Ok(()));

        let change = PresenceChange::Changed(fact);
        router.on_presence_change(&change, &outbound, &display).await;

        router.handle_message(&msg("cremosa", "!mstop"), &empty_tracker(), &outbound_ok(), &display, T).await;
        router.on_presence_change(&change, &outbound, &display).await;
        router.on_presence_change(&PresenceChange::Cleared, &outbound, &display).await;
    }

    fn outbound_ok() -> MockChatOutbound {
        let mut outbound = MockChatOutbound::new();
        outbound.expect_say().returning(|_, _| Ok(()));
        outbound
    }
}
