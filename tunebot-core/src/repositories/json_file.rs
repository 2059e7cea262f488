//! JSON-file backed stores.
//!
//! Writes go to a sibling `*.tmp` file that is then renamed over the target,
//! so a crash mid-write never leaves a truncated record that still parses.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use tunebot_common::models::{CredentialRecord, NowPlayingRecord};
use crate::Error;
use super::{NowPlayingStore, TokenStore};

/// Reads `path` as JSON. A missing file is `Ok(None)`, and so is a file
/// holding `null`.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, Error> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::Persistence(format!("reading {}: {e}", path.display())));
        }
    };
    serde_json::from_str::<Option<T>>(&raw)
        .map_err(|e| Error::Persistence(format!("parsing {}: {e}", path.display())))
}

async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = tmp_path_for(path);
    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Persistence(format!("writing {}: {e}", tmp_path.display())))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Persistence(format!("replacing {}: {e}", path.display())))?;
    debug!("Persisted {}", path.display());
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Token record in a JSON file (`twitch_token.json` by default).
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<CredentialRecord>, Error> {
        read_json(&self.path).await
    }

    async fn save(&self, record: &CredentialRecord) -> Result<(), Error> {
        write_json_atomic(&self.path, record).await
    }
}

/// Now-playing record in a JSON file; the cleared state is stored as `null`.
#[derive(Debug, Clone)]
pub struct FileNowPlayingStore {
    path: PathBuf,
}

impl FileNowPlayingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl NowPlayingStore for FileNowPlayingStore {
    async fn load(&self) -> Result<Option<NowPlayingRecord>, Error> {
        read_json(&self.path).await
    }

    async fn save(&self, record: Option<&NowPlayingRecord>) -> Result<(), Error> {
        write_json_atomic(&self.path, &record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use tunebot_common::models::ActivityWindow;

    fn sample_record() -> CredentialRecord {
        let mut extra = Map::new();
        extra.insert("scope".into(), json!(["chat:read", "chat:edit"]));
        extra.insert("token_type".into(), json!("bearer"));
        CredentialRecord {
            access_token: "access-1".into(),
            refresh_token: "refresh-1".into(),
            expires_in: 14_400,
            expires_at: Some(1_700_000_000_123),
            extra,
        }
    }

    #[tokio::test]
    async fn credential_round_trip_is_identical() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let store = FileTokenStore::new(dir.path().join("twitch_token.json"));
        let record = sample_record();

        store.save(&record).await?;
        let loaded = store.load().await?.expect("record present");
        assert_eq!(loaded, record);
        Ok(())
    }

    #[tokio::test]
    async fn save_replaces_previous_content_and_leaves_no_tmp_file() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("twitch_token.json");
        let store = FileTokenStore::new(&path);

        let mut record = sample_record();
        store.save(&record).await?;
        record.access_token = "access-2".into();
        record.extra.clear();
        store.save(&record).await?;

        assert_eq!(store.load().await?, Some(record));
        assert!(!dir.path().join("twitch_token.json.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let store = FileTokenStore::new(dir.path().join("absent.json"));
        assert!(store.load().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn garbage_file_is_a_persistence_error() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("twitch_token.json");
        std::fs::write(&path, "{ not json")?;
        let store = FileTokenStore::new(&path);
        assert!(matches!(store.load().await, Err(Error::Persistence(_))));
        Ok(())
    }

    #[tokio::test]
    async fn now_playing_persists_null_when_cleared() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("latestSongInfo.json");
        let store = FileNowPlayingStore::new(&path);

        let record = NowPlayingRecord {
            details: "X".into(),
            state: "Y".into(),
            timestamps: ActivityWindow { start: 10, end: 20 },
        };
        store.save(Some(&record)).await?;
        assert_eq!(store.load().await?, Some(record));

        store.save(None).await?;
        assert_eq!(std::fs::read_to_string(&path)?.trim(), "null");
        assert!(store.load().await?.is_none());
        Ok(())
    }
}
