use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use tokio::sync::RwLock;

use crate::ProviderApiError;

pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Bearer tokens keyed by provider (or provider audience).
///
/// Readers share a read lock. A token is refreshed on a miss, or when it is within the refresh margin of expiring.
/// The credential endpoint is called without holding any lock, so concurrent misses may refresh the same token
/// more than once; the last one to finish wins.
#[derive(Clone)]
pub struct TokenCache {
    tokens: Arc<RwLock<HashMap<String, CachedToken>>>,
    margin: chrono::Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_MARGIN)
    }
}

impl TokenCache {
    pub fn new(margin: Duration) -> Self {
        let margin = chrono::Duration::from_std(margin).unwrap_or_else(|_| chrono::Duration::seconds(60));
        Self { tokens: Arc::new(RwLock::new(HashMap::new())), margin }
    }

    /// Returns a valid token for `key`, calling `fetch` for a new one if necessary. `fetch` resolves to the token
    /// and its lifetime.
    pub async fn get_token<F, Fut>(&self, key: &str, fetch: F) -> Result<String, ProviderApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, Duration), ProviderApiError>>,
    {
        if let Some(token) = self.cached(key).await {
            return Ok(token);
        }
        debug!("🔑️ Refreshing access token for {key}");
        let (value, ttl) = fetch().await?;
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        let expires_at = Utc::now() + ttl;
        self.tokens.write().await.insert(key.to_string(), CachedToken { value: value.clone(), expires_at });
        info!("🔑️ New access token for {key} is valid until {expires_at}");
        Ok(value)
    }

    /// Drops the token for `key`, e.g. after the provider has rejected it.
    pub async fn invalidate(&self, key: &str) {
        self.tokens.write().await.remove(key);
    }

    async fn cached(&self, key: &str) -> Option<String> {
        let tokens = self.tokens.read().await;
        tokens.get(key).filter(|t| Utc::now() + self.margin < t.expires_at).map(|t| t.value.clone())
    }
}
