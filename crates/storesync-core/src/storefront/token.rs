//! Cached bearer tokens for storefront clients.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{StorefrontError, StorefrontResult};
use crate::util::unix_timestamp_now;

const EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    /// Expiry (Unix seconds)
    pub expires_at: i64,
}

impl AccessToken {
    /// Whether the token is expired or expires within the skew window.
    #[must_use]
    pub fn needs_refresh(&self, now: i64) -> bool {
        self.expires_at <= now.saturating_add(EXPIRY_SKEW_SECONDS)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Mints access tokens. Signing details live behind this trait.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> StorefrontResult<AccessToken>;
}

/// A pre-issued token that never expires from the client's point of view.
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> StorefrontResult<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(StorefrontError::Auth("token must not be empty".to_string()));
        }
        Ok(Self { token })
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("StaticToken")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn fetch_token(&self) -> StorefrontResult<AccessToken> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_at: i64::MAX,
        })
    }
}

/// Per-client token cache, refreshed when within 60 seconds of expiry.
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
        }
    }

    /// Current bearer token, refreshing it first when needed.
    pub async fn bearer(&self) -> StorefrontResult<String> {
        let mut guard = self.cached.lock().await;
        if let Some(token) = guard.as_ref() {
            if !token.needs_refresh(unix_timestamp_now()) {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.source.fetch_token().await?;
        tracing::debug!(expires_at = fresh.expires_at, "Refreshed storefront token");
        let bearer = fresh.token.clone();
        *guard = Some(fresh);
        Ok(bearer)
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("TokenCache").finish_non_exhaustive()
    }
}
