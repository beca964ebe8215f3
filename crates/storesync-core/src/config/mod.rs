//! Apps manifest: which storefront resources belong to each app id.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storefront::{
    AppStoreConnectClient, AppStoreTarget, GooglePlayClient, StorefrontRegistry, TokenSource,
};
use crate::util::normalize_text_option;

const APPS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppsManifest {
    pub schema_version: u32,
    pub apps: BTreeMap<String, AppEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppEntry {
    #[serde(default)]
    pub app_store: Option<AppStoreTarget>,
    #[serde(default)]
    pub google_play: Option<GooglePlayEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GooglePlayEntry {
    pub package_name: String,
}

/// API endpoints and credentials shared by every app's clients.
#[derive(Clone)]
pub struct StorefrontCredentials {
    pub app_store_url: String,
    pub app_store_token: Option<Arc<dyn TokenSource>>,
    pub google_play_url: String,
    pub google_play_token: Option<Arc<dyn TokenSource>>,
}

/// Parse and validate an apps manifest from a raw JSON payload.
pub fn parse_apps_manifest(payload: &str) -> Result<AppsManifest> {
    let manifest: AppsManifest = serde_json::from_str(payload)
        .map_err(|error| Error::InvalidInput(format!("invalid apps manifest JSON: {error}")))?;
    manifest.validate()?;
    Ok(manifest)
}

pub fn load_apps_manifest(path: impl AsRef<Path>) -> Result<AppsManifest> {
    let payload = std::fs::read_to_string(path.as_ref())?;
    parse_apps_manifest(&payload)
}

impl AppsManifest {
    fn validate(&self) -> Result<()> {
        if self.schema_version != APPS_SCHEMA_VERSION {
            return Err(Error::InvalidInput(format!(
                "unsupported apps schema_version {} (expected {APPS_SCHEMA_VERSION})",
                self.schema_version
            )));
        }
        for (app_id, entry) in &self.apps {
            if app_id.trim().is_empty() {
                return Err(Error::InvalidInput("app id must not be empty".to_string()));
            }
            if entry.app_store.is_none() && entry.google_play.is_none() {
                return Err(Error::InvalidInput(format!(
                    "app '{app_id}' configures no storefront"
                )));
            }
            if let Some(target) = &entry.app_store {
                required(app_id, "app_info_id", &target.app_info_id)?;
                required(app_id, "version_id", &target.version_id)?;
            }
            if let Some(play) = &entry.google_play {
                required(app_id, "package_name", &play.package_name)?;
            }
        }
        Ok(())
    }

    /// Build a client for every configured app and store.
    ///
    /// Stores without a token are left out of the registry.
    pub fn build_registry(&self, credentials: &StorefrontCredentials) -> Result<StorefrontRegistry> {
        let mut registry = StorefrontRegistry::new();
        for (app_id, entry) in &self.apps {
            if let Some(target) = &entry.app_store {
                match &credentials.app_store_token {
                    Some(tokens) => registry.insert(
                        app_id.clone(),
                        Arc::new(AppStoreConnectClient::new(
                            credentials.app_store_url.clone(),
                            target.clone(),
                            tokens.clone(),
                        )?),
                    ),
                    None => tracing::warn!(app_id = %app_id, "No App Store token, skipping app_store"),
                }
            }
            if let Some(play) = &entry.google_play {
                match &credentials.google_play_token {
                    Some(tokens) => registry.insert(
                        app_id.clone(),
                        Arc::new(GooglePlayClient::new(
                            credentials.google_play_url.clone(),
                            play.package_name.clone(),
                            tokens.clone(),
                        )?),
                    ),
                    None => {
                        tracing::warn!(app_id = %app_id, "No Google Play token, skipping google_play");
                    }
                }
            }
        }
        Ok(registry)
    }
}

fn required(app_id: &str, field: &str, value: &str) -> Result<()> {
    normalize_text_option(Some(value.to_string()))
        .map(|_| ())
        .ok_or_else(|| Error::InvalidInput(format!("app '{app_id}' field '{field}' is required")))
}
