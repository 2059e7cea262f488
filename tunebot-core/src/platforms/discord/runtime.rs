use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};

use twilight_gateway::{
    CloseFrame, Event, EventTypeFlags, Intents, MessageSender, Shard, ShardId, StreamExt,
};
use twilight_model::gateway::payload::outgoing::update_presence::UpdatePresencePayload;
use twilight_model::gateway::payload::outgoing::UpdatePresence;
use twilight_model::gateway::presence::{Activity, ActivityType, MinimalActivity, Presence, Status};
use twilight_model::gateway::OpCode;

use tunebot_common::models::{ActivityKind, ActivityWindow, PresenceActivity, PresenceUpdate};
use crate::eventbus::{BotEvent, EventSender};
use crate::platforms::PresenceDisplay;
use crate::Error;

/// Activity text of the hidden state.
pub const HIDDEN_ACTIVITY: &str = "é segredo";

pub fn activity_kind(kind: ActivityType) -> ActivityKind {
    match kind {
        ActivityType::Playing => ActivityKind::Playing,
        ActivityType::Streaming => ActivityKind::Streaming,
        ActivityType::Listening => ActivityKind::Listening,
        ActivityType::Watching => ActivityKind::Watching,
        ActivityType::Custom => ActivityKind::Custom,
        ActivityType::Competing => ActivityKind::Competing,
        _ => ActivityKind::Other,
    }
}

pub fn activity_from_gateway(activity: &Activity) -> PresenceActivity {
    PresenceActivity {
        kind: activity_kind(activity.kind),
        name: activity.name.clone(),
        details: activity.details.clone(),
        state: activity.state.clone(),
        timestamps: activity.timestamps.as_ref().map(|t| ActivityWindow {
            start: t.start.unwrap_or_default() as i64,
            end: t.end.unwrap_or_default() as i64,
        }),
    }
}

pub fn presence_from_gateway(presence: &Presence) -> PresenceUpdate {
    PresenceUpdate {
        user_id: presence.user.id().to_string(),
        activities: presence.activities.iter().map(activity_from_gateway).collect(),
    }
}

/// Reads presence updates off the shard and forwards them to the runtime.
/// Filtering by identity happens in the tracker.
async fn shard_runner(mut shard: Shard, events: EventSender) {
    let shard_id = shard.id().number();
    info!("(ShardRunner) Shard {shard_id} started. Listening for presence updates.");

    let wanted = EventTypeFlags::READY | EventTypeFlags::PRESENCE_UPDATE;
    while let Some(item) = shard.next_event(wanted).await {
        match item {
            Ok(Event::Ready(ready)) => {
                info!("Shard {shard_id} => READY as {} (ID={})", ready.user.name, ready.user.id);
            }
            Ok(Event::PresenceUpdate(update)) => {
                let snapshot = presence_from_gateway(&update.0);
                trace!(
                    "Shard {shard_id} => presence of {} with {} activities",
                    snapshot.user_id,
                    snapshot.activities.len()
                );
                if !events.publish(BotEvent::Presence(snapshot)) {
                    break;
                }
            }
            Ok(other) => trace!("Shard {shard_id} => unhandled event: {:?}", other.kind()),
            Err(err) => error!("Shard {shard_id} => error receiving event: {err:?}"),
        }
    }

    warn!("(ShardRunner) Shard {shard_id} event loop ended.");
}

/// Discord side of the bot: one gateway shard for presence input, and the
/// bot's own presence as output.
pub struct DiscordPresenceBridge {
    sender: MessageSender,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DiscordPresenceBridge {
    pub fn start(token: String, events: EventSender) -> Self {
        let shard = Shard::new(ShardId::ONE, token, Intents::GUILDS | Intents::GUILD_PRESENCES);
        let sender = shard.sender();
        let task = tokio::spawn(shard_runner(shard, events));
        Self {
            sender,
            task: Mutex::new(Some(task)),
        }
    }

    /// Closes the shard and waits briefly for the runner to finish.
    pub async fn shutdown(&self) {
        let _ = self.sender.close(CloseFrame::NORMAL);
        if let Some(task) = self.task.lock().await.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                abort.abort();
            }
        }
        info!("(DiscordPresenceBridge) shut down");
    }

    fn send(&self, activities: Vec<Activity>, status: Status) -> Result<(), Error> {
        let update = UpdatePresence {
            d: UpdatePresencePayload {
                activities,
                afk: false,
                since: None,
                status,
            },
            op: OpCode::PresenceUpdate,
        };
        self.sender
            .command(&update)
            .map_err(|e| Error::Platform(format!("Discord presence update failed: {e}")))
    }
}

fn listening(name: &str) -> Activity {
    Activity::from(MinimalActivity {
        kind: ActivityType::Listening,
        name: name.to_string(),
        url: None,
    })
}

impl PresenceDisplay for DiscordPresenceBridge {
    fn show_listening(&self, text: &str) -> Result<(), Error> {
        self.send(vec![listening(text)], Status::Online)
    }

    fn show_hidden(&self) -> Result<(), Error> {
        self.send(vec![listening(HIDDEN_ACTIVITY)], Status::Idle)
    }

    fn clear(&self) -> Result<(), Error> {
        self.send(Vec::new(), Status::Online)
    }
}
