pub mod chat;
pub mod credential;
pub mod platform;
pub mod presence;

pub use chat::{ChatEvent, ChatMessage};
pub use credential::{Credential, CredentialRecord, CHAT_BEARER_PREFIX};
pub use platform::ConnectionState;
pub use presence::{
    ActivityKind, ActivityWindow, NowPlayingFact, NowPlayingRecord, PresenceActivity,
    PresenceChange, PresenceUpdate,
};
