use std::sync::Arc;

use tracing::{error, info, warn};

use tunebot_common::models::{Credential, CredentialRecord};
use crate::Error;
use crate::repositories::TokenStore;
use crate::utils::Clock;
use super::TokenAuthority;

/// Exchanges the stored refresh token for a new access token and persists
/// the result. No retries here; the scheduler owns the retry policy.
pub struct CredentialRefresher {
    store: Arc<dyn TokenStore>,
    authority: Arc<dyn TokenAuthority>,
    clock: Arc<dyn Clock>,
}

impl CredentialRefresher {
    pub fn new(
        store: Arc<dyn TokenStore>,
        authority: Arc<dyn TokenAuthority>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, authority, clock }
    }

    pub async fn refresh(&self) -> Result<Credential, Error> {
        let current = match self.store.load().await {
            Ok(Some(record)) if record.has_refresh_token() => record,
            Ok(_) => return Err(Error::NoRefreshToken),
            Err(e) => {
                warn!("Could not read stored credential, treating as absent: {e}");
                return Err(Error::NoRefreshToken);
            }
        };

        info!("Refreshing chat OAuth token...");
        let grant = self.authority.exchange_refresh_token(&current.refresh_token).await?;

        let now = self.clock.now_ms();
        let mut extra = current.extra;
        extra.extend(grant.extra);
        let record = CredentialRecord {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.unwrap_or(current.refresh_token),
            expires_in: grant.expires_in,
            expires_at: Some(now.saturating_add(grant.expires_in.saturating_mul(1000))),
            extra,
        };

        // The new token is valid whether or not it hit the disk; losing the
        // write only costs an extra refresh after a restart.
        if let Err(e) = self.store.save(&record).await {
            error!("Failed to persist refreshed token: {e}");
        }

        let credential = record.to_credential();
        info!("Token refreshed; new expiry {:?}", credential.expires_at());
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MockTokenAuthority, TokenGrant};
    use crate::repositories::MockTokenStore;
    use serde_json::{json, Map};

    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now_ms(&self) -> i64 {
            self.0
        }
    }

    fn stored(refresh_token: &str) -> CredentialRecord {
        let mut extra = Map::new();
        extra.insert("scope".into(), json!(["chat:read"]));
        CredentialRecord {
            access_token: "old-access".into(),
            refresh_token: refresh_token.into(),
            expires_in: 100,
            expires_at: Some(5),
            extra,
        }
    }

    fn refresher(store: MockTokenStore, authority: MockTokenAuthority) -> CredentialRefresher {
        CredentialRefresher::new(Arc::new(store), Arc::new(authority), Arc::new(FixedClock(1_000_000)))
    }

    #[tokio::test]
    async fn computes_expiry_and_persists() -> Result<(), Error> {
        let mut store = MockTokenStore::new();
        store.expect_load().returning(|| Ok(Some(stored("refresh-1"))));
        store
            .expect_save()
            .withf(|r: &CredentialRecord| {
                r.access_token == "new-access"
                    && r.refresh_token == "refresh-2"
                    && r.expires_in == 3600
                    && r.expires_at == Some(1_000_000 + 3_600_000)
                    && r.extra.get("scope") == Some(&json!(["chat:read"]))
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut authority = MockTokenAuthority::new();
        authority
            .expect_exchange_refresh_token()
            .withf(|rt: &str| rt == "refresh-1")
            .times(1)
            .returning(|_| {
                Ok(TokenGrant {
                    access_token: "new-access".into(),
                    refresh_token: Some("refresh-2".into()),
                    expires_in: 3600,
                    extra: Map::new(),
                })
            });

        let credential = refresher(store, authority).refresh().await?;
        assert_eq!(credential.bearer(), "oauth:new-access");
        assert_eq!(credential.expires_at_ms, Some(4_600_000));
        Ok(())
    }

    #[tokio::test]
    async fn keeps_old_refresh_token_when_not_rotated() -> Result<(), Error> {
        let mut store = MockTokenStore::new();
        store.expect_load().returning(|| Ok(Some(stored("keep-me"))));
        store
            .expect_save()
            .withf(|r: &CredentialRecord| r.refresh_token == "keep-me")
            .returning(|_| Ok(()));

        let mut authority = MockTokenAuthority::new();
        authority.expect_exchange_refresh_token().returning(|_| {
            Ok(TokenGrant {
                access_token: "a".into(),
                refresh_token: None,
                expires_in: 10,
                extra: Map::new(),
            })
        });

        let credential = refresher(store, authority).refresh().await?;
        assert_eq!(credential.refresh_token, "keep-me");
        Ok(())
    }

    #[tokio::test]
    async fn absurd_lifetime_saturates_instead_of_overflowing() -> Result<(), Error> {
        let mut store = MockTokenStore::new();
        store.expect_load().returning(|| Ok(Some(stored("r"))));
        store
            .expect_save()
            .withf(|r: &CredentialRecord| r.expires_at == Some(i64::MAX))
            .times(1)
            .returning(|_| Ok(()));
        let mut authority = MockTokenAuthority::new();
        authority.expect_exchange_refresh_token().returning(|_| {
            Ok(TokenGrant {
                access_token: "forever".into(),
                refresh_token: None,
                expires_in: i64::MAX / 10,
                extra: Map::new(),
            })
        });

        let credential = refresher(store, authority).refresh().await?;
        assert_eq!(credential.expires_at_ms, Some(i64::MAX));
        Ok(())
    }

    #[tokio::test]
    async fn no_refresh_token_fails_without_network() {
        let mut store = MockTokenStore::new();
        store.expect_load().returning(|| Ok(Some(stored("  "))));
        let mut authority = MockTokenAuthority::new();
        authority.expect_exchange_refresh_token().never();

        let err = refresher(store, authority).refresh().await.unwrap_err();
        assert!(matches!(err, Error::NoRefreshToken));
    }

    #[tokio::test]
    async fn unreadable_store_counts_as_missing() {
        let mut store = MockTokenStore::new();
        store
            .expect_load()
            .returning(|| Err(Error::Persistence("disk on fire".into())));
        let mut authority = MockTokenAuthority::new();
        authority.expect_exchange_refresh_token().never();

        let err = refresher(store, authority).refresh().await.unwrap_err();
        assert!(matches!(err, Error::NoRefreshToken));
    }

    #[tokio::test]
    async fn authority_failure_is_surfaced_and_nothing_saved() {
        let mut store = MockTokenStore::new();
        store.expect_load().returning(|| Ok(Some(stored("r"))));
        store.expect_save().never();
        let mut authority = MockTokenAuthority::new();
        authority
            .expect_exchange_refresh_token()
            .returning(|_| Err(Error::RefreshFailed("{\"status\":400}".into())));

        let err = refresher(store, authority).refresh().await.unwrap_err();
        assert!(matches!(err, Error::RefreshFailed(body) if body.contains("400")));
    }

    #[tokio::test]
    async fn save_failure_still_returns_the_new_credential() -> Result<(), Error> {
        let mut store = MockTokenStore::new();
        store.expect_load().returning(|| Ok(Some(stored("r"))));
        store
            .expect_save()
            .returning(|_| Err(Error::Persistence("read-only".into())));
        let mut authority = MockTokenAuthority::new();
        authority.expect_exchange_refresh_token().returning(|_| {
            Ok(TokenGrant {
                access_token: "fresh".into(),
                refresh_token: None,
                expires_in: 60,
                extra: Map::new(),
            })
        });

        let credential = refresher(store, authority).refresh().await?;
        assert_eq!(credential.access_token, "fresh");
        Ok(())
    }
}
