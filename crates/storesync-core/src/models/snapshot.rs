//! Point-in-time captures of storefront listings

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Field, Store};
use crate::locale::canonicalize;
use crate::util::{normalize_listing_text, unix_millis_now};

/// One storefront's listing for one locale, as last fetched.
///
/// A detail is never edited in place; the next fetch replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleDetail {
    pub store: Store,
    /// Canonical locale code
    pub locale: String,
    pub fields: BTreeMap<Field, String>,
    /// Length of each field value in that field's declared unit
    pub lengths: BTreeMap<Field, usize>,
    /// Number of screenshot sets, when that sub-fetch succeeded
    #[serde(default)]
    pub screenshot_count: Option<usize>,
}

impl LocaleDetail {
    /// Build a detail, canonicalizing the locale and measuring every field.
    ///
    /// Fields the store does not define are dropped.
    pub fn new(store: Store, locale: &str, fields: BTreeMap<Field, String>) -> Self {
        let fields: BTreeMap<Field, String> = fields
            .into_iter()
            .filter(|(field, _)| store.field_spec(*field).is_some())
            .collect();
        let lengths = fields
            .iter()
            .filter_map(|(field, value)| {
                store
                    .field_spec(*field)
                    .map(|spec| (*field, spec.measure(value)))
            })
            .collect();

        Self {
            store,
            locale: canonicalize(locale).to_string(),
            fields,
            lengths,
            screenshot_count: None,
        }
    }

    #[must_use]
    pub fn with_screenshot_count(mut self, count: Option<usize>) -> Self {
        self.screenshot_count = count;
        self
    }

    /// Normalized value of a field, `None` when absent or blank.
    pub fn value(&self, field: Field) -> Option<&str> {
        self.fields
            .get(&field)
            .map(|value| normalize_listing_text(value))
            .filter(|value| !value.trim().is_empty())
    }

    /// Whether the field has a non-blank value.
    pub fn has_value(&self, field: Field) -> bool {
        self.value(field).is_some()
    }

    /// Fields whose stored value exceeds the store's limit.
    pub fn over_limit(&self) -> Vec<Field> {
        self.lengths
            .iter()
            .filter(|(field, length)| {
                self.store
                    .field_spec(**field)
                    .is_some_and(|spec| **length > spec.max_len)
            })
            .map(|(field, _)| *field)
            .collect()
    }
}

/// Every locale of one storefront at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub store: Store,
    /// Capture timestamp (Unix ms)
    pub captured_at: i64,
    pub locales: BTreeMap<String, LocaleDetail>,
}

impl Snapshot {
    /// Create a snapshot captured now.
    ///
    /// Details belonging to another store are ignored.
    pub fn new(store: Store, details: impl IntoIterator<Item = LocaleDetail>) -> Self {
        Self::captured_at(store, unix_millis_now(), details)
    }

    pub fn captured_at(
        store: Store,
        captured_at: i64,
        details: impl IntoIterator<Item = LocaleDetail>,
    ) -> Self {
        let locales = details
            .into_iter()
            .filter(|detail| detail.store == store)
            .map(|detail| (detail.locale.clone(), detail))
            .collect();
        Self {
            store,
            captured_at,
            locales,
        }
    }

    /// Look up a locale by any code, native or canonical.
    pub fn locale(&self, code: &str) -> Option<&LocaleDetail> {
        self.locales.get(canonicalize(code))
    }

    pub fn locale_codes(&self) -> Vec<String> {
        self.locales.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.locales.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(Field, &str)]) -> BTreeMap<Field, String> {
        pairs
            .iter()
            .map(|(field, value)| (*field, (*value).to_string()))
            .collect()
    }

    #[test]
    fn detail_measures_in_declared_unit() {
        let detail = LocaleDetail::new(
            Store::AppStore,
            "ja",
            fields(&[(Field::Name, "アプリ"), (Field::Keywords, "写真,編集")]),
        );
        assert_eq!(detail.lengths[&Field::Name], 3);
        assert_eq!(detail.lengths[&Field::Keywords], "写真,編集".len());
    }

    #[test]
    fn detail_canonicalizes_locale_and_drops_unknown_fields() {
        let detail = LocaleDetail::new(
            Store::GooglePlay,
            "iw-IL",
            fields(&[(Field::Name, "App"), (Field::Keywords, "ignored")]),
        );
        assert_eq!(detail.locale, "he");
        assert!(!detail.fields.contains_key(&Field::Keywords));
    }

    #[test]
    fn blank_values_are_treated_as_absent() {
        let detail = LocaleDetail::new(
            Store::AppStore,
            "en-US",
            fields(&[(Field::Name, "  \n"), (Field::Subtitle, "Edit photos\n")]),
        );
        assert_eq!(detail.value(Field::Name), None);
        assert_eq!(detail.value(Field::Subtitle), Some("Edit photos"));
    }

    #[test]
    fn over_limit_reports_long_fields() {
        let detail = LocaleDetail::new(
            Store::GooglePlay,
            "en-US",
            fields(&[(Field::Name, "x".repeat(31).as_str())]),
        );
        assert_eq!(detail.over_limit(), vec![Field::Name]);
    }

    #[test]
    fn snapshot_lookup_accepts_native_codes() {
        let snapshot = Snapshot::new(
            Store::GooglePlay,
            [LocaleDetail::new(
                Store::GooglePlay,
                "zh-CN",
                fields(&[(Field::Name, "应用")]),
            )],
        );
        assert!(snapshot.locale("zh-CN").is_some());
        assert!(snapshot.locale("zh-Hans").is_some());
        assert_eq!(snapshot.locale_codes(), vec!["zh-Hans".to_string()]);
    }
}
