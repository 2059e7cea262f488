// File: src/repositories/mod.rs

use async_trait::async_trait;

use tunebot_common::models::{CredentialRecord, NowPlayingRecord};
use crate::Error;

pub mod json_file;

pub use json_file::{FileNowPlayingStore, FileTokenStore};

/// Durable holder of the current credential record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<CredentialRecord>, Error>;
    /// Fully replaces the stored record.
    async fn save(&self, record: &CredentialRecord) -> Result<(), Error>;
}

/// Durable mirror of the now-playing fact.
#[async_trait]
pub trait NowPlayingStore: Send + Sync {
    async fn load(&self) -> Result<Option<NowPlayingRecord>, Error>;
    /// `None` persists the cleared state.
    async fn save(&self, record: Option<&NowPlayingRecord>) -> Result<(), Error>;
}
