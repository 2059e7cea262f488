pub mod bot_runtime;
pub mod command_router;
pub mod connection_supervisor;
pub mod presence_tracker;

pub use bot_runtime::{BotRuntime, RuntimeDeps};
pub use command_router::{Command, CommandRouter};
pub use connection_supervisor::{ConnectionSupervisor, ReconnectGovernor, ReconnectSource};
pub use presence_tracker::PresenceTracker;
