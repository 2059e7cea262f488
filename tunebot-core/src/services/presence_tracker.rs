use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use tunebot_common::models::{NowPlayingFact, PresenceChange, PresenceUpdate};
use crate::eventbus::{BotEvent, EventSender};
use crate::repositories::NowPlayingStore;
use crate::settings::BotSettings;
use crate::utils::time::format_mm_ss;
use crate::utils::{Clock, SingleSlotTimer, TimerToken};

/// Holds the "now playing" fact derived from presence snapshots of one
/// observed identity, debounced by (title, attribution), and expires it
/// after a window without qualifying snapshots.
pub struct PresenceTracker {
    observed_user_id: String,
    tracked_source: String,
    store: Arc<dyn NowPlayingStore>,
    clock: Arc<dyn Clock>,
    events: EventSender,
    fact: Option<NowPlayingFact>,
    silence: SingleSlotTimer,
    silence_window: Duration,
}

impl PresenceTracker {
    pub fn new(
        settings: &BotSettings,
        store: Arc<dyn NowPlayingStore>,
        clock: Arc<dyn Clock>,
        events: EventSender,
    ) -> Self {
        Self {
            observed_user_id: settings.observed_user_id.clone(),
            tracked_source: settings.tracked_source.clone(),
            store,
            clock,
            events,
            fact: None,
            silence: SingleSlotTimer::new("silence"),
            silence_window: settings.timings.silence_window,
        }
    }

    pub fn fact(&self) -> Option<&NowPlayingFact> {
        self.fact.as_ref()
    }

    pub fn silence_pending(&self) -> bool {
        self.silence.is_pending()
    }

    /// Loads the persisted record from a previous run. The record has no
    /// start checkpoint, so the restored fact counts as started now.
    pub async fn restore(&mut self) -> Option<&NowPlayingFact> {
        match self.store.load().await {
            Ok(Some(record)) => {
                let fact = record.into_fact(self.clock.now_ms());
                info!("Restored last track: {} by {}", fact.title, fact.attribution);
                self.fact = Some(fact);
                self.arm_silence();
            }
            Ok(None) => info!("No stored track to restore"),
            Err(e) => warn!("Could not read stored track, starting empty: {e}"),
        }
        self.fact.as_ref()
    }

    /// Applies one presence snapshot. Returns `Changed` only when the
    /// (title, attribution) pair differs from the held fact.
    pub async fn on_snapshot(&mut self, update: &PresenceUpdate) -> Option<PresenceChange> {
        if update.user_id != self.observed_user_id {
            trace!("Ignoring presence of user {}", update.user_id);
            return None;
        }
        let Some(activity) = update.listening_to(&self.tracked_source) else {
            debug!("No {} listening activity detected", self.tracked_source);
            return None;
        };

        let title = activity.details.clone().unwrap_or_default();
        let attribution = activity.state.clone().unwrap_or_default();

        if let Some(held) = &self.fact {
            if held.same_item(&title, &attribution) {
                debug!("Track has not changed, skipping update");
                self.arm_silence();
                return None;
            }
        }

        let window = activity.timestamps.unwrap_or_default();
        let fact = NowPlayingFact {
            title,
            attribution,
            started_at_ms: self.clock.now_ms(),
            window_start_ms: window.start,
            window_end_ms: window.end,
        };
        info!("Now playing: {} by {}", fact.title, fact.attribution);

        self.persist(Some(&fact)).await;
        self.fact = Some(fact.clone());
        self.arm_silence();
        Some(PresenceChange::Changed(fact))
    }

    /// Silence window elapsed: drop the fact.
    pub async fn on_silence_elapsed(&mut self, token: TimerToken) -> Option<PresenceChange> {
        if !self.silence.fire(token) {
            return None;
        }
        self.fact = None;
        self.persist(None).await;
        info!(
            "Cleared now-playing after {} minutes without {} updates",
            self.silence_window.as_secs() / 60,
            self.tracked_source
        );
        Some(PresenceChange::Cleared)
    }

    /// Time left in the held item as `MM:SS`.
    pub fn remaining(&self, now_ms: i64) -> String {
        remaining(self.fact.as_ref(), now_ms)
    }

    pub fn shutdown(&mut self) {
        self.silence.cancel_if_pending();
    }

    fn arm_silence(&mut self) {
        self.silence
            .arm(self.silence_window, self.events.raw(), BotEvent::SilenceElapsed);
    }

    async fn persist(&self, fact: Option<&NowPlayingFact>) {
        let record = fact.map(NowPlayingFact::to_record);
        if let Err(e) = self.store.save(record.as_ref()).await {
            error!("Error saving now-playing record: {e}");
        }
    }
}

/// `max(0, total - elapsed)` where elapsed counts from when the bot first
/// saw the item, floored to whole seconds. `00:00` without a fact.
pub fn remaining(fact: Option<&NowPlayingFact>, now_ms: i64) -> String {
    let Some(fact) = fact else {
        return format_mm_ss(0);
    };
    let elapsed = (now_ms - fact.started_at_ms).div_euclid(1000);
    format_mm_ss((fact.total_duration_secs() - elapsed).max(0))
}
