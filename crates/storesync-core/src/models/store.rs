//! Storefront identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two storefront back-ends a listing is published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Store {
    /// Apple App Store Connect
    AppStore,
    /// Google Play Console
    GooglePlay,
}

impl Store {
    /// Every supported storefront, in a stable order.
    pub const ALL: [Self; 2] = [Self::AppStore, Self::GooglePlay];

    /// Wire/storage name of the store
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AppStore => "app_store",
            Self::GooglePlay => "google_play",
        }
    }

    /// The other storefront
    pub const fn counterpart(self) -> Self {
        match self {
            Self::AppStore => Self::GooglePlay,
            Self::GooglePlay => Self::AppStore,
        }
    }

    /// Whether writes to this store must be wrapped in an edit transaction
    pub const fn requires_edit_session(self) -> bool {
        matches!(self, Self::GooglePlay)
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Store {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "app_store" | "appstore" | "apple" | "ios" => Ok(Self::AppStore),
            "google_play" | "googleplay" | "google" | "android" => Ok(Self::GooglePlay),
            other => Err(format!("unknown store '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!("apple".parse::<Store>().unwrap(), Store::AppStore);
        assert_eq!(" Google_Play ".parse::<Store>().unwrap(), Store::GooglePlay);
        assert!("amazon".parse::<Store>().is_err());
    }

    #[test]
    fn counterpart_is_an_involution() {
        for store in Store::ALL {
            assert_eq!(store.counterpart().counterpart(), store);
            assert_ne!(store.counterpart(), store);
        }
    }

    #[test]
    fn serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&Store::GooglePlay).unwrap(),
            "\"google_play\""
        );
    }
}
