//! Storefront boundary: the operations the core needs from each back-end,
//! snapshot capture, and the shared HTTP error handling of both clients.

mod app_store;
mod google_play;
mod token;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::locale::canonicalize;
use crate::models::{Field, LocaleDetail, Snapshot, Store};
use crate::util::compact_text;

pub use app_store::{AppStoreConnectClient, AppStoreTarget, DEFAULT_APP_STORE_API_URL};
pub use google_play::{GooglePlayClient, DEFAULT_GOOGLE_PLAY_API_URL};
pub use token::{AccessToken, StaticToken, TokenCache, TokenSource};

#[derive(Debug, Error)]
pub enum StorefrontError {
    #[error("{store} request failed: {message}")]
    Http { store: Store, message: String },
    #[error("{store} API error ({status}): {message}")]
    Api {
        store: Store,
        status: u16,
        message: String,
    },
    #[error("{store} returned an invalid payload: {message}")]
    InvalidPayload { store: Store, message: String },
    #[error("{store} has no locale {locale}")]
    LocaleNotFound { store: Store, locale: String },
    #[error("{store} rejected the request: {message}")]
    InvalidRequest { store: Store, message: String },
    #[error("Storefront credentials unavailable: {0}")]
    Auth(String),
}

pub type StorefrontResult<T> = Result<T, StorefrontError>;

impl StorefrontError {
    pub(crate) fn http(store: Store, error: &reqwest::Error) -> Self {
        Self::Http {
            store,
            message: error.to_string().replace('\n', " ").trim().to_string(),
        }
    }

    pub(crate) fn payload(store: Store, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            store,
            message: message.into(),
        }
    }
}

/// One locale's listing as the storefront returns it: native locale code and
/// native attribute names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteListing {
    pub native_locale: String,
    pub values: BTreeMap<String, String>,
}

impl RemoteListing {
    /// Map native attribute names to field concepts; unknown keys are dropped.
    pub fn into_detail(self, store: Store) -> LocaleDetail {
        let fields = self
            .values
            .into_iter()
            .filter_map(|(key, value)| store.field_for_key(&key).map(|field| (field, value)))
            .collect();
        LocaleDetail::new(store, canonicalize(&self.native_locale), fields)
    }
}

/// Convert field values to the attribute names `store` expects.
pub fn to_native_values<'a>(
    store: Store,
    values: impl IntoIterator<Item = (Field, &'a str)>,
) -> BTreeMap<String, String> {
    values
        .into_iter()
        .filter_map(|(field, value)| {
            store
                .field_spec(field)
                .map(|spec| (spec.key.to_string(), value.to_string()))
        })
        .collect()
}

/// An open batch of writes on stores that require one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    pub id: String,
}

/// Authenticated access to one app on one storefront.
#[async_trait]
pub trait Storefront: Send + Sync {
    fn store(&self) -> Store;

    /// Fetch every locale's listing, following pagination.
    async fn fetch_listings(&self) -> StorefrontResult<Vec<RemoteListing>>;

    /// Number of screenshot sets for one locale.
    async fn fetch_screenshot_count(&self, native_locale: &str) -> StorefrontResult<usize>;

    /// Open a write transaction; stores without one return `None`.
    async fn begin_edit(&self) -> StorefrontResult<Option<EditSession>> {
        Ok(None)
    }

    async fn create_locale(
        &self,
        edit: Option<&EditSession>,
        native_locale: &str,
        values: &BTreeMap<String, String>,
    ) -> StorefrontResult<()>;

    async fn update_locale(
        &self,
        edit: Option<&EditSession>,
        native_locale: &str,
        values: &BTreeMap<String, String>,
    ) -> StorefrontResult<()>;

    async fn delete_locale(
        &self,
        edit: Option<&EditSession>,
        native_locale: &str,
    ) -> StorefrontResult<()>;

    async fn commit_edit(&self, _edit: EditSession) -> StorefrontResult<()> {
        Ok(())
    }

    async fn discard_edit(&self, _edit: EditSession) -> StorefrontResult<()> {
        Ok(())
    }
}

/// Storefront clients for every configured app, keyed by app id.
#[derive(Default, Clone)]
pub struct StorefrontRegistry {
    apps: BTreeMap<String, BTreeMap<Store, Arc<dyn Storefront>>>,
}

impl StorefrontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client, replacing any previous one for the same app and store.
    pub fn insert(&mut self, app_id: impl Into<String>, storefront: Arc<dyn Storefront>) {
        self.apps
            .entry(app_id.into())
            .or_default()
            .insert(storefront.store(), storefront);
    }

    pub fn get(&self, app_id: &str, store: Store) -> Option<Arc<dyn Storefront>> {
        self.apps.get(app_id)?.get(&store).cloned()
    }

    /// Stores configured for the app
    pub fn stores(&self, app_id: &str) -> Vec<Store> {
        self.apps
            .get(app_id)
            .map(|stores| stores.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn app_ids(&self) -> Vec<String> {
        self.apps.keys().cloned().collect()
    }

    pub fn contains_app(&self, app_id: &str) -> bool {
        self.apps.contains_key(app_id)
    }
}

/// Capture a full snapshot of one storefront.
///
/// Screenshot counts are fetched concurrently; a failed sub-fetch leaves the
/// count empty instead of failing the snapshot.
pub async fn capture_snapshot(storefront: &dyn Storefront) -> StorefrontResult<Snapshot> {
    let store = storefront.store();
    let listings = storefront.fetch_listings().await?;
    tracing::debug!(store = %store, locales = listings.len(), "Fetched storefront listings");

    let details = join_all(listings.into_iter().map(|listing| async move {
        let count = match storefront
            .fetch_screenshot_count(&listing.native_locale)
            .await
        {
            Ok(count) => Some(count),
            Err(error) => {
                tracing::warn!(
                    store = %store,
                    locale = %listing.native_locale,
                    "Screenshot fetch failed: {}",
                    error
                );
                None
            }
        };
        listing.into_detail(store).with_screenshot_count(count)
    }))
    .await;

    Ok(Snapshot::new(store, details))
}

#[derive(Debug, Deserialize)]
struct AppStoreErrorBody {
    #[serde(default)]
    errors: Vec<AppStoreErrorItem>,
}

#[derive(Debug, Deserialize)]
struct AppStoreErrorItem {
    title: Option<String>,
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleErrorItem,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorItem {
    message: Option<String>,
}

/// Build an API error from a non-success response body.
pub(crate) fn api_error(store: Store, status: StatusCode, body: &str) -> StorefrontError {
    let message = serde_json::from_str::<AppStoreErrorBody>(body)
        .ok()
        .and_then(|payload| {
            payload
                .errors
                .into_iter()
                .next()
                .and_then(|item| item.detail.or(item.title))
        })
        .or_else(|| {
            serde_json::from_str::<GoogleErrorBody>(body)
                .ok()
                .and_then(|payload| payload.error.message)
        })
        .map_or_else(
            || {
                let trimmed = compact_text(body);
                if trimmed.is_empty() {
                    format!("HTTP {}", status.as_u16())
                } else {
                    trimmed
                }
            },
            |message| compact_text(&message),
        );

    StorefrontError::Api {
        store,
        status: status.as_u16(),
        message,
    }
}

/// Send a request and turn non-success statuses into [`StorefrontError::Api`].
pub(crate) async fn send_checked(
    store: Store,
    request: reqwest::RequestBuilder,
) -> StorefrontResult<reqwest::Response> {
    let response = request
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|error| StorefrontError::http(store, &error))?;

    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(api_error(store, status, &body))
}
