use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use storesync_core::storefront::{DEFAULT_APP_STORE_API_URL, DEFAULT_GOOGLE_PLAY_API_URL};
use storesync_core::translate::{DEFAULT_TEXT_API_URL, DEFAULT_TEXT_MODEL};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: String,
    pub apps_file: String,
    pub app_store_api_url: String,
    pub app_store_token: Option<String>,
    pub google_play_api_url: String,
    pub google_play_token: Option<String>,
    pub text: Option<TextServiceConfig>,
}

/// Text generation service; absent when no API key is configured.
#[derive(Clone, PartialEq, Eq)]
pub struct TextServiceConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub call_delay: Duration,
}

impl fmt::Debug for TextServiceConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TextServiceConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("call_delay", &self.call_delay)
            .finish()
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "[REDACTED]");
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("db_path", &self.db_path)
            .field("apps_file", &self.apps_file)
            .field("app_store_api_url", &self.app_store_api_url)
            .field("app_store_token", &redact(&self.app_store_token))
            .field("google_play_api_url", &self.google_play_api_url)
            .field("google_play_token", &redact(&self.google_play_token))
            .field("text", &self.text)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "STORESYNC_BIND_ADDR", "127.0.0.1:8080");
        let db_path = value_or_default(&lookup, "STORESYNC_DB_PATH", "storesync.db");
        let apps_file = value_or_default(&lookup, "STORESYNC_APPS_FILE", "apps.json");

        let app_store_api_url =
            http_url_or_default(&lookup, "APP_STORE_API_URL", DEFAULT_APP_STORE_API_URL)?;
        let google_play_api_url =
            http_url_or_default(&lookup, "GOOGLE_PLAY_API_URL", DEFAULT_GOOGLE_PLAY_API_URL)?;
        let app_store_token = optional_trimmed(&lookup, "APP_STORE_TOKEN");
        let google_play_token = optional_trimmed(&lookup, "GOOGLE_PLAY_TOKEN");

        let text = parse_text_config(&lookup)?;

        Ok(Self {
            bind_addr,
            db_path,
            apps_file,
            app_store_api_url,
            app_store_token,
            google_play_api_url,
            google_play_token,
            text,
        })
    }
}

fn parse_text_config(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<TextServiceConfig>, ConfigError> {
    let Some(api_key) = optional_trimmed(&lookup, "TEXT_API_KEY") else {
        return Ok(None);
    };
    let api_url = http_url_or_default(&lookup, "TEXT_API_URL", DEFAULT_TEXT_API_URL)?;
    let model = value_or_default(&lookup, "TEXT_MODEL", DEFAULT_TEXT_MODEL);

    let max_retries = value_or_default(&lookup, "TEXT_MAX_RETRIES", "3")
        .parse::<u32>()
        .map_err(|_| {
            ConfigError::Invalid("TEXT_MAX_RETRIES must be an integer in [0, 10]".to_string())
        })?;
    if max_retries > 10 {
        return Err(ConfigError::Invalid(
            "TEXT_MAX_RETRIES must be in [0, 10]".to_string(),
        ));
    }

    let retry_base_ms = value_or_default(&lookup, "TEXT_RETRY_BASE_MS", "1000")
        .parse::<u64>()
        .map_err(|_| {
            ConfigError::Invalid(
                "TEXT_RETRY_BASE_MS must be an integer in [100, 60000]".to_string(),
            )
        })?;
    if !(100..=60_000).contains(&retry_base_ms) {
        return Err(ConfigError::Invalid(
            "TEXT_RETRY_BASE_MS must be in [100, 60000]".to_string(),
        ));
    }

    let call_delay_ms = value_or_default(&lookup, "TEXT_CALL_DELAY_MS", "250")
        .parse::<u64>()
        .map_err(|_| {
            ConfigError::Invalid("TEXT_CALL_DELAY_MS must be an integer in [0, 10000]".to_string())
        })?;
    if call_delay_ms > 10_000 {
        return Err(ConfigError::Invalid(
            "TEXT_CALL_DELAY_MS must be in [0, 10000]".to_string(),
        ));
    }

    Ok(Some(TextServiceConfig {
        api_url,
        api_key,
        model,
        max_retries,
        retry_base_delay: Duration::from_millis(retry_base_ms),
        call_delay: Duration::from_millis(call_delay_ms),
    }))
}

fn http_url_or_default(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> Result<String, ConfigError> {
    let value = value_or_default(lookup, name, default);
    if !is_http_url(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must start with http:// or https://"
        )));
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}
