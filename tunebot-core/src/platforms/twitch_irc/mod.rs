pub mod auth;
pub mod client;
pub mod runtime;

pub use auth::TwitchTokenEndpoint;
pub use runtime::{TwitchChatClient, TwitchIrcClientFactory};
