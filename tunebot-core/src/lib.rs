// src/lib.rs

pub mod auth;
pub mod eventbus;
pub mod platforms;
pub mod repositories;
pub mod services;
pub mod settings;
pub mod tasks;
pub mod test_utils;
pub mod utils;

pub use tunebot_common::error::Error;
pub use settings::{BotSettings, Timings};
