//! Google Play Console client.
//!
//! Every listing read or write goes through an edit. Reads reuse one
//! long-lived edit per client; writes get a fresh edit that the apply engine
//! commits or discards.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{
    send_checked, EditSession, RemoteListing, Storefront, StorefrontError, StorefrontResult,
    TokenCache, TokenSource,
};
use crate::models::Store;
use crate::util::normalize_text_option;

pub const DEFAULT_GOOGLE_PLAY_API_URL: &str =
    "https://androidpublisher.googleapis.com/androidpublisher/v3";

const STORE: Store = Store::GooglePlay;
const LISTING_KEYS: [&str; 3] = ["title", "shortDescription", "fullDescription"];

pub struct GooglePlayClient {
    base_url: String,
    client: Client,
    tokens: TokenCache,
    package_name: String,
    read_edit: Mutex<Option<String>>,
}

impl GooglePlayClient {
    pub fn new(
        base_url: impl Into<String>,
        package_name: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
    ) -> StorefrontResult<Self> {
        let base_url = normalize_text_option(Some(base_url.into()))
            .ok_or_else(|| {
                StorefrontError::Auth("Google Play API URL must not be empty".to_string())
            })?
            .trim_end_matches('/')
            .to_string();
        let package_name = normalize_text_option(Some(package_name.into())).ok_or_else(|| {
            StorefrontError::InvalidRequest {
                store: STORE,
                message: "package name must not be empty".to_string(),
            }
        })?;
        let client = Client::builder()
            .build()
            .map_err(|error| StorefrontError::http(STORE, &error))?;

        Ok(Self {
            base_url,
            client,
            tokens: TokenCache::new(tokens),
            package_name,
            read_edit: Mutex::new(None),
        })
    }

    fn edits_url(&self) -> String {
        format!(
            "{}/applications/{}/edits",
            self.base_url, self.package_name
        )
    }

    fn listing_url(&self, edit_id: &str, native_locale: &str) -> String {
        format!("{}/{edit_id}/listings/{native_locale}", self.edits_url())
    }

    async fn request(&self, method: Method, url: &str) -> StorefrontResult<reqwest::RequestBuilder> {
        let token = self.tokens.bearer().await?;
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    async fn open_edit(&self) -> StorefrontResult<String> {
        let request = self
            .request(Method::POST, &self.edits_url())
            .await?
            .json(&serde_json::json!({}));
        let response = send_checked(STORE, request).await?;
        let edit = response
            .json::<AppEdit>()
            .await
            .map_err(|error| StorefrontError::payload(STORE, error.to_string()))?;
        tracing::debug!(package = %self.package_name, edit = %edit.id, "Opened Google Play edit");
        Ok(edit.id)
    }

    async fn read_edit_id(&self) -> StorefrontResult<String> {
        let mut guard = self.read_edit.lock().await;
        if let Some(id) = guard.as_ref() {
            return Ok(id.clone());
        }
        let id = self.open_edit().await?;
        *guard = Some(id.clone());
        Ok(id)
    }

    fn require_edit<'a>(&self, edit: Option<&'a EditSession>) -> StorefrontResult<&'a str> {
        edit.map(|edit| edit.id.as_str())
            .ok_or_else(|| StorefrontError::InvalidRequest {
                store: STORE,
                message: "writes require an open edit".to_string(),
            })
    }

    async fn write_listing(
        &self,
        method: Method,
        edit: Option<&EditSession>,
        native_locale: &str,
        values: &BTreeMap<String, String>,
    ) -> StorefrontResult<()> {
        let edit_id = self.require_edit(edit)?;
        let mut body = serde_json::Map::new();
        body.insert("language".to_string(), Value::from(native_locale));
        for (key, value) in values {
            if LISTING_KEYS.contains(&key.as_str()) {
                body.insert(key.clone(), Value::from(value.as_str()));
            }
        }
        let request = self
            .request(method, &self.listing_url(edit_id, native_locale))
            .await?
            .json(&Value::Object(body));
        send_checked(STORE, request).await?;
        Ok(())
    }
}

#[async_trait]
impl Storefront for GooglePlayClient {
    fn store(&self) -> Store {
        STORE
    }

    async fn fetch_listings(&self) -> StorefrontResult<Vec<RemoteListing>> {
        // A fresh read edit per fetch so the listing reflects the live state.
        let edit_id = self.open_edit().await?;
        *self.read_edit.lock().await = Some(edit_id.clone());

        let url = format!("{}/{edit_id}/listings", self.edits_url());
        let response = send_checked(STORE, self.request(Method::GET, &url).await?).await?;
        let payload = response
            .json::<ListingsResponse>()
            .await
            .map_err(|error| StorefrontError::payload(STORE, error.to_string()))?;

        Ok(payload
            .listings
            .into_iter()
            .map(|listing| RemoteListing {
                native_locale: listing.language,
                values: listing
                    .values
                    .into_iter()
                    .filter(|(key, _)| LISTING_KEYS.contains(&key.as_str()))
                    .filter_map(|(key, value)| value.as_str().map(|text| (key, text.to_string())))
                    .collect(),
            })
            .collect())
    }

    async fn fetch_screenshot_count(&self, native_locale: &str) -> StorefrontResult<usize> {
        let edit_id = self.read_edit_id().await?;
        let url = format!(
            "{}/phoneScreenshots",
            self.listing_url(&edit_id, native_locale)
        );
        let response = send_checked(STORE, self.request(Method::GET, &url).await?).await?;
        let payload = response
            .json::<ImagesResponse>()
            .await
            .map_err(|error| StorefrontError::payload(STORE, error.to_string()))?;
        Ok(payload.images.len())
    }

    async fn begin_edit(&self) -> StorefrontResult<Option<EditSession>> {
        Ok(Some(EditSession {
            id: self.open_edit().await?,
        }))
    }

    async fn create_locale(
        &self,
        edit: Option<&EditSession>,
        native_locale: &str,
        values: &BTreeMap<String, String>,
    ) -> StorefrontResult<()> {
        self.write_listing(Method::PUT, edit, native_locale, values)
            .await
    }

    async fn update_locale(
        &self,
        edit: Option<&EditSession>,
        native_locale: &str,
        values: &BTreeMap<String, String>,
    ) -> StorefrontResult<()> {
        self.write_listing(Method::PATCH, edit, native_locale, values)
            .await
    }

    async fn delete_locale(
        &self,
        edit: Option<&EditSession>,
        native_locale: &str,
    ) -> StorefrontResult<()> {
        let edit_id = self.require_edit(edit)?;
        let url = self.listing_url(edit_id, native_locale);
        send_checked(STORE, self.request(Method::DELETE, &url).await?).await?;
        Ok(())
    }

    async fn commit_edit(&self, edit: EditSession) -> StorefrontResult<()> {
        let url = format!("{}/{}:commit", self.edits_url(), edit.id);
        send_checked(STORE, self.request(Method::POST, &url).await?).await?;
        tracing::info!(package = %self.package_name, edit = %edit.id, "Committed Google Play edit");
        Ok(())
    }

    async fn discard_edit(&self, edit: EditSession) -> StorefrontResult<()> {
        let url = format!("{}/{}", self.edits_url(), edit.id);
        send_checked(STORE, self.request(Method::DELETE, &url).await?).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct AppEdit {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ListingsResponse {
    #[serde(default)]
    listings: Vec<ListingResource>,
}

#[derive(Debug, Deserialize)]
struct ListingResource {
    language: String,
    #[serde(flatten)]
    values: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    images: Vec<Value>,
}
