//! App Store Connect client.
//!
//! A listing is split over two resources: the app info localization holds
//! `name` and `subtitle`, the version localization holds the remaining
//! fields. Both are addressed by opaque ids, cached per client after each
//! listing fetch.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

use super::{
    send_checked, EditSession, RemoteListing, Storefront, StorefrontError, StorefrontResult,
    TokenCache, TokenSource,
};
use crate::models::Store;
use crate::util::normalize_text_option;

pub const DEFAULT_APP_STORE_API_URL: &str = "https://api.appstoreconnect.apple.com";

const STORE: Store = Store::AppStore;
const INFO_KEYS: [&str; 2] = ["name", "subtitle"];
const VERSION_KEYS: [&str; 4] = ["description", "keywords", "promotionalText", "whatsNew"];
const PAGE_LIMIT: u32 = 200;

/// The App Store Connect resources that make up one app's listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStoreTarget {
    pub app_info_id: String,
    pub version_id: String,
}

#[derive(Debug, Clone, Default)]
struct LocalizationIds {
    info: Option<String>,
    version: Option<String>,
}

pub struct AppStoreConnectClient {
    base_url: String,
    client: Client,
    tokens: TokenCache,
    target: AppStoreTarget,
    ids: Mutex<HashMap<String, LocalizationIds>>,
}

impl AppStoreConnectClient {
    pub fn new(
        base_url: impl Into<String>,
        target: AppStoreTarget,
        tokens: Arc<dyn TokenSource>,
    ) -> StorefrontResult<Self> {
        let base_url = normalize_text_option(Some(base_url.into()))
            .ok_or_else(|| StorefrontError::Auth("App Store API URL must not be empty".to_string()))?
            .trim_end_matches('/')
            .to_string();
        let client = Client::builder()
            .build()
            .map_err(|error| StorefrontError::http(STORE, &error))?;

        Ok(Self {
            base_url,
            client,
            tokens: TokenCache::new(tokens),
            target,
            ids: Mutex::new(HashMap::new()),
        })
    }

    async fn request(&self, method: Method, url: &str) -> StorefrontResult<reqwest::RequestBuilder> {
        let token = self.tokens.bearer().await?;
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    async fn get_all(&self, first_url: String) -> StorefrontResult<Vec<Resource>> {
        let mut resources = Vec::new();
        let mut next = Some(first_url);
        while let Some(url) = next {
            let response = send_checked(STORE, self.request(Method::GET, &url).await?).await?;
            let page = response
                .json::<Page>()
                .await
                .map_err(|error| StorefrontError::payload(STORE, error.to_string()))?;
            resources.extend(page.data);
            next = page.links.and_then(|links| links.next);
        }
        Ok(resources)
    }

    async fn send_document(
        &self,
        method: Method,
        url: &str,
        document: &Value,
    ) -> StorefrontResult<Option<String>> {
        let request = self.request(method, url).await?.json(document);
        let response = send_checked(STORE, request).await?;
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let created = response
            .json::<Single>()
            .await
            .map_err(|error| StorefrontError::payload(STORE, error.to_string()))?;
        Ok(Some(created.data.id))
    }

    async fn resolve_ids(&self, native_locale: &str) -> StorefrontResult<LocalizationIds> {
        if let Some(ids) = self.ids.lock().await.get(native_locale) {
            return Ok(ids.clone());
        }
        self.fetch_listings().await?;
        self.ids
            .lock()
            .await
            .get(native_locale)
            .cloned()
            .ok_or_else(|| StorefrontError::LocaleNotFound {
                store: STORE,
                locale: native_locale.to_string(),
            })
    }

    async fn patch_resource(
        &self,
        kind: &str,
        id: &str,
        attributes: Map<String, Value>,
    ) -> StorefrontResult<()> {
        let url = format!("{}/v1/{kind}/{id}", self.base_url);
        let document = json!({
            "data": { "type": kind, "id": id, "attributes": attributes }
        });
        self.send_document(Method::PATCH, &url, &document).await?;
        Ok(())
    }
}

#[async_trait]
impl Storefront for AppStoreConnectClient {
    fn store(&self) -> Store {
        STORE
    }

    async fn fetch_listings(&self) -> StorefrontResult<Vec<RemoteListing>> {
        let info = self
            .get_all(format!(
                "{}/v1/appInfos/{}/appInfoLocalizations?limit={PAGE_LIMIT}",
                self.base_url, self.target.app_info_id
            ))
            .await?;
        let version = self
            .get_all(format!(
                "{}/v1/appStoreVersions/{}/appStoreVersionLocalizations?limit={PAGE_LIMIT}",
                self.base_url, self.target.version_id
            ))
            .await?;

        let mut listings: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        let mut ids: HashMap<String, LocalizationIds> = HashMap::new();

        for (resource, keys, is_info) in info
            .into_iter()
            .map(|resource| (resource, &INFO_KEYS[..], true))
            .chain(
                version
                    .into_iter()
                    .map(|resource| (resource, &VERSION_KEYS[..], false)),
            )
        {
            let Some(locale) = resource.string_attribute("locale") else {
                tracing::warn!(id = %resource.id, "Skipping localization without locale");
                continue;
            };
            let values = listings.entry(locale.clone()).or_default();
            for key in keys {
                if let Some(value) = resource.string_attribute(key) {
                    values.insert((*key).to_string(), value);
                }
            }
            let entry = ids.entry(locale).or_default();
            if is_info {
                entry.info = Some(resource.id);
            } else {
                entry.version = Some(resource.id);
            }
        }

        *self.ids.lock().await = ids;

        Ok(listings
            .into_iter()
            .map(|(native_locale, values)| RemoteListing {
                native_locale,
                values,
            })
            .collect())
    }

    async fn fetch_screenshot_count(&self, native_locale: &str) -> StorefrontResult<usize> {
        let Some(version_id) = self.resolve_ids(native_locale).await?.version else {
            return Ok(0);
        };
        let sets = self
            .get_all(format!(
                "{}/v1/appStoreVersionLocalizations/{version_id}/appScreenshotSets",
                self.base_url
            ))
            .await?;
        Ok(sets.len())
    }

    /// Create both localizations for a locale.
    ///
    /// Each id is cached as soon as its resource exists, so a retry after a
    /// partial failure patches the existing half instead of posting it again.
    async fn create_locale(
        &self,
        _edit: Option<&EditSession>,
        native_locale: &str,
        values: &BTreeMap<String, String>,
    ) -> StorefrontResult<()> {
        let (info_attributes, version_attributes) = split_attributes(values);
        let known = self
            .ids
            .lock()
            .await
            .get(native_locale)
            .cloned()
            .unwrap_or_default();

        match known.info {
            Some(id) if !info_attributes.is_empty() => {
                self.patch_resource("appInfoLocalizations", &id, info_attributes)
                    .await?;
            }
            Some(_) => {}
            None => {
                let mut info = info_attributes;
                info.insert("locale".to_string(), Value::from(native_locale));
                let info_id = self
                    .send_document(
                        Method::POST,
                        &format!("{}/v1/appInfoLocalizations", self.base_url),
                        &json!({
                            "data": {
                                "type": "appInfoLocalizations",
                                "attributes": info,
                                "relationships": {
                                    "appInfo": { "data": { "type": "appInfos", "id": self.target.app_info_id } }
                                }
                            }
                        }),
                    )
                    .await?;
                self.ids
                    .lock()
                    .await
                    .entry(native_locale.to_string())
                    .or_default()
                    .info = info_id;
            }
        }

        match known.version {
            Some(id) if !version_attributes.is_empty() => {
                self.patch_resource("appStoreVersionLocalizations", &id, version_attributes)
                    .await?;
            }
            Some(_) => {}
            None => {
                let mut version = version_attributes;
                version.insert("locale".to_string(), Value::from(native_locale));
                let version_id = self
                    .send_document(
                        Method::POST,
                        &format!("{}/v1/appStoreVersionLocalizations", self.base_url),
                        &json!({
                            "data": {
                                "type": "appStoreVersionLocalizations",
                                "attributes": version,
                                "relationships": {
                                    "appStoreVersion": { "data": { "type": "appStoreVersions", "id": self.target.version_id } }
                                }
                            }
                        }),
                    )
                    .await?;
                self.ids
                    .lock()
                    .await
                    .entry(native_locale.to_string())
                    .or_default()
                    .version = version_id;
            }
        }
        Ok(())
    }

    async fn update_locale(
        &self,
        _edit: Option<&EditSession>,
        native_locale: &str,
        values: &BTreeMap<String, String>,
    ) -> StorefrontResult<()> {
        let ids = self.resolve_ids(native_locale).await?;
        let (info, version) = split_attributes(values);
        let missing = |part: &str| StorefrontError::InvalidRequest {
            store: STORE,
            message: format!("{native_locale} has no {part} localization"),
        };

        if !info.is_empty() {
            let id = ids.info.as_deref().ok_or_else(|| missing("app info"))?;
            self.patch_resource("appInfoLocalizations", id, info).await?;
        }
        if !version.is_empty() {
            let id = ids.version.as_deref().ok_or_else(|| missing("version"))?;
            self.patch_resource("appStoreVersionLocalizations", id, version)
                .await?;
        }
        Ok(())
    }

    async fn delete_locale(
        &self,
        _edit: Option<&EditSession>,
        native_locale: &str,
    ) -> StorefrontResult<()> {
        let ids = self.resolve_ids(native_locale).await?;
        if let Some(id) = ids.version.as_deref() {
            let url = format!("{}/v1/appStoreVersionLocalizations/{id}", self.base_url);
            send_checked(STORE, self.request(Method::DELETE, &url).await?).await?;
        }
        if let Some(id) = ids.info.as_deref() {
            let url = format!("{}/v1/appInfoLocalizations/{id}", self.base_url);
            send_checked(STORE, self.request(Method::DELETE, &url).await?).await?;
        }
        self.ids.lock().await.remove(native_locale);
        Ok(())
    }
}

/// Split native values into app-info and version attributes.
fn split_attributes(values: &BTreeMap<String, String>) -> (Map<String, Value>, Map<String, Value>) {
    let mut info = Map::new();
    let mut version = Map::new();
    for (key, value) in values {
        if INFO_KEYS.contains(&key.as_str()) {
            info.insert(key.clone(), Value::from(value.as_str()));
        } else if VERSION_KEYS.contains(&key.as_str()) {
            version.insert(key.clone(), Value::from(value.as_str()));
        }
    }
    (info, version)
}

#[derive(Debug, Deserialize)]
struct Page {
    data: Vec<Resource>,
    #[serde(default)]
    links: Option<PageLinks>,
}

#[derive(Debug, Deserialize)]
struct PageLinks {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Single {
    data: Resource,
}

#[derive(Debug, Deserialize)]
struct Resource {
    id: String,
    #[serde(default)]
    attributes: Map<String, Value>,
}

impl Resource {
    fn string_attribute(&self, key: &str) -> Option<String> {
        self.attributes
            .get(key)
            .and_then(Value::as_str)
            .map(ToString::to_string)
    }
}
