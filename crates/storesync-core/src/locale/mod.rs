//! Locale catalog
//!
//! Canonical codes follow App Store Connect. Google Play uses a different
//! dialect for some languages (`iw-IL` for Hebrew, `zh-CN` for Simplified
//! Chinese, region-qualified codes where App Store Connect uses bare ones);
//! those codes are listed in an alias table and collapse to the canonical
//! code. Codes absent from the table pass through unchanged both ways.

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use crate::models::Store;

/// `(store, native, canonical)`; the first entry for a store and canonical
/// code is the one used when mapping back to that store.
const ALIASES: &[(Store, &str, &str)] = &[
    (Store::GooglePlay, "ar", "ar-SA"),
    (Store::GooglePlay, "cs-CZ", "cs"),
    (Store::GooglePlay, "da-DK", "da"),
    (Store::GooglePlay, "el-GR", "el"),
    (Store::GooglePlay, "es-419", "es-MX"),
    (Store::GooglePlay, "fi-FI", "fi"),
    (Store::GooglePlay, "hi-IN", "hi"),
    (Store::GooglePlay, "hu-HU", "hu"),
    (Store::GooglePlay, "it-IT", "it"),
    (Store::GooglePlay, "iw-IL", "he"),
    (Store::GooglePlay, "he-IL", "he"),
    (Store::GooglePlay, "ja-JP", "ja"),
    (Store::GooglePlay, "ko-KR", "ko"),
    (Store::GooglePlay, "ms-MY", "ms"),
    (Store::GooglePlay, "no-NO", "no"),
    (Store::GooglePlay, "pl-PL", "pl"),
    (Store::GooglePlay, "ru-RU", "ru"),
    (Store::GooglePlay, "sv-SE", "sv"),
    (Store::GooglePlay, "tr-TR", "tr"),
    (Store::GooglePlay, "zh-CN", "zh-Hans"),
    (Store::GooglePlay, "zh-TW", "zh-Hant"),
];

const APP_STORE_LOCALES: &[&str] = &[
    "ar-SA", "ca", "cs", "da", "de-DE", "el", "en-AU", "en-CA", "en-GB", "en-US", "es-ES",
    "es-MX", "fi", "fr-CA", "fr-FR", "he", "hi", "hr", "hu", "id", "it", "ja", "ko", "ms",
    "nl-NL", "no", "pl", "pt-BR", "pt-PT", "ro", "ru", "sk", "sv", "th", "tr", "uk", "vi",
    "zh-Hans", "zh-Hant",
];

const GOOGLE_PLAY_LOCALES: &[&str] = &[
    "af", "am", "ar", "bg", "ca", "cs-CZ", "da-DK", "de-DE", "el-GR", "en-AU", "en-CA", "en-GB",
    "en-IN", "en-US", "es-419", "es-ES", "es-US", "et", "fa", "fi-FI", "fil", "fr-CA", "fr-FR",
    "hi-IN", "hr", "hu-HU", "id", "it-IT", "iw-IL", "ja-JP", "ko-KR", "lt", "lv", "ms", "ms-MY",
    "nl-NL", "no-NO", "pl-PL", "pt-BR", "pt-PT", "ro", "ru-RU", "sk", "sl", "sr", "sv-SE", "sw",
    "th", "tr-TR", "uk", "vi", "zh-CN", "zh-HK", "zh-TW", "zu",
];

static LOCALE_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z]{2,3}(-[A-Za-z0-9]{2,8})*$").expect("locale code pattern is valid")
});

/// Map any storefront-native code to its canonical code.
pub fn canonicalize(code: &str) -> &str {
    let code = code.trim();
    ALIASES
        .iter()
        .find(|(_, native, _)| *native == code)
        .map_or(code, |(_, _, canonical)| *canonical)
}

/// Map a canonical code to the code `store` expects.
pub fn to_store_native(code: &str, store: Store) -> &str {
    let code = code.trim();
    ALIASES
        .iter()
        .find(|(alias_store, _, canonical)| *alias_store == store && *canonical == code)
        .map_or(code, |(_, native, _)| *native)
}

/// Canonical codes a storefront accepts.
pub fn supported_locales(store: Store) -> BTreeSet<&'static str> {
    let native = match store {
        Store::AppStore => APP_STORE_LOCALES,
        Store::GooglePlay => GOOGLE_PLAY_LOCALES,
    };
    native.iter().copied().map(canonicalize).collect()
}

/// Whether `store` accepts the locale, given any of its codes.
pub fn is_supported(code: &str, store: Store) -> bool {
    supported_locales(store).contains(canonicalize(code))
}

/// Every canonical code either storefront supports.
pub fn known_locales() -> BTreeSet<&'static str> {
    Store::ALL.into_iter().flat_map(supported_locales).collect()
}

/// Syntactic check for a BCP-47-like locale code.
pub fn is_valid_code(code: &str) -> bool {
    LOCALE_CODE.is_match(code)
}

/// One storefront's view of a locale row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreMembership {
    /// The locale exists on the storefront
    pub configured: bool,
    /// The storefront accepts the locale
    pub supported: bool,
    pub native_code: String,
}

/// A canonical locale and its presence on each storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocaleRow {
    pub locale: String,
    pub stores: BTreeMap<Store, StoreMembership>,
    /// Stores that support the locale but do not have it yet
    pub addable_to: Vec<Store>,
}

impl LocaleRow {
    pub fn is_configured(&self, store: Store) -> bool {
        self.stores.get(&store).is_some_and(|member| member.configured)
    }
}

/// Combine a locale universe with each store's configured locales.
///
/// Configured codes may be native or canonical; rows come back sorted by
/// canonical code.
pub fn build_locale_matrix<'a>(
    known: impl IntoIterator<Item = &'a str>,
    configured: &'a BTreeMap<Store, Vec<String>>,
) -> Vec<LocaleRow> {
    let configured: BTreeMap<Store, BTreeSet<&str>> = configured
        .iter()
        .map(|(store, codes)| (*store, codes.iter().map(|code| canonicalize(code)).collect()))
        .collect();

    let universe: BTreeSet<&str> = known
        .into_iter()
        .map(canonicalize)
        .chain(configured.values().flatten().copied())
        .collect();

    universe
        .into_iter()
        .map(|locale| {
            let stores: BTreeMap<Store, StoreMembership> = Store::ALL
                .into_iter()
                .map(|store| {
                    let membership = StoreMembership {
                        configured: configured
                            .get(&store)
                            .is_some_and(|codes| codes.contains(locale)),
                        supported: is_supported(locale, store),
                        native_code: to_store_native(locale, store).to_string(),
                    };
                    (store, membership)
                })
                .collect();
            let addable_to = stores
                .iter()
                .filter(|(_, member)| member.supported && !member.configured)
                .map(|(store, _)| *store)
                .collect();
            LocaleRow {
                locale: locale.to_string(),
                stores,
                addable_to,
            }
        })
        .collect()
}
