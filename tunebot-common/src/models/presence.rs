use serde::{Deserialize, Serialize};

/// Kind of a presence activity, mirrored from the gateway so the core
/// never depends on a particular presence SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Playing,
    Streaming,
    Listening,
    Watching,
    Custom,
    Competing,
    Other,
}

/// Start/end of the media item, epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivityWindow {
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub end: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceActivity {
    pub kind: ActivityKind,
    pub name: String,
    pub details: Option<String>,
    pub state: Option<String>,
    pub timestamps: Option<ActivityWindow>,
}

/// A presence snapshot for one user, as delivered by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceUpdate {
    pub user_id: String,
    pub activities: Vec<PresenceActivity>,
}

impl PresenceUpdate {
    /// The listening activity published by `source`, if any.
    pub fn listening_to(&self, source: &str) -> Option<&PresenceActivity> {
        if !self.activities.iter().any(|a| a.kind == ActivityKind::Listening) {
            return None;
        }
        self.activities.iter().find(|a| a.name == source)
    }
}

/// The tracked "now playing" fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlayingFact {
    pub title: String,
    pub attribution: String,
    /// When the bot first saw this item, not when the item started.
    pub started_at_ms: i64,
    pub window_start_ms: i64,
    pub window_end_ms: i64,
}

impl NowPlayingFact {
    pub fn same_item(&self, title: &str, attribution: &str) -> bool {
        self.title == title && self.attribution == attribution
    }

    pub fn total_duration_secs(&self) -> i64 {
        (self.window_end_ms - self.window_start_ms) / 1000
    }

    pub fn to_record(&self) -> NowPlayingRecord {
        NowPlayingRecord {
            details: self.title.clone(),
            state: self.attribution.clone(),
            timestamps: ActivityWindow {
                start: self.window_start_ms,
                end: self.window_end_ms,
            },
        }
    }
}

/// Persisted form of the fact; the file holds either this or `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NowPlayingRecord {
    pub details: String,
    pub state: String,
    #[serde(default)]
    pub timestamps: ActivityWindow,
}

impl NowPlayingRecord {
    /// The record keeps no start checkpoint, so the caller supplies one.
    pub fn into_fact(self, started_at_ms: i64) -> NowPlayingFact {
        NowPlayingFact {
            title: self.details,
            attribution: self.state,
            started_at_ms,
            window_start_ms: self.timestamps.start,
            window_end_ms: self.timestamps.end,
        }
    }
}

/// What the tracker emits when the fact changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    Changed(NowPlayingFact),
    Cleared,
}
