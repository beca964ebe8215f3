//! Snapshot diffing
//!
//! Compares a source-of-truth snapshot against a counterpart: the other
//! storefront, or the same storefront with locally queued edits applied.

use serde::{Deserialize, Serialize};

use crate::locale::{is_supported, to_store_native};
use crate::models::{shared_fields, Field, LocaleDetail, Snapshot, Store};
use crate::util::normalize_listing_text;

pub const MISSING_NAME: &str = "missing app name";

/// A value that should change on the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field: Field,
    pub old_value: Option<String>,
    pub new_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub source_locale: String,
    /// Canonical target locale
    pub target_locale: String,
    /// Code the target store uses for the locale
    pub target_native_locale: String,
    pub target_store: Store,
    pub is_new_locale: bool,
    pub fields: Vec<FieldDiff>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLocale {
    pub locale: String,
    pub reason: String,
}

/// Outcome of comparing one source locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocaleDiff {
    Entry(DiffEntry),
    Skip(SkippedLocale),
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    pub source_store: Store,
    pub target_store: Store,
    pub entries: Vec<DiffEntry>,
    pub skipped: Vec<SkippedLocale>,
}

impl DiffReport {
    pub fn field_diff_count(&self) -> usize {
        self.entries.iter().map(|entry| entry.fields.len()).sum()
    }

    pub fn new_locale_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_new_locale).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compare one source locale with its counterpart on `target_store`.
pub fn diff_locale(
    source: &LocaleDetail,
    target: Option<&LocaleDetail>,
    target_store: Store,
) -> LocaleDiff {
    let locale = source.locale.as_str();
    if !is_supported(locale, target_store) {
        return LocaleDiff::Skip(SkippedLocale {
            locale: locale.to_string(),
            reason: format!("{target_store} does not support {locale}"),
        });
    }
    if !source.has_value(Field::Name) {
        return LocaleDiff::Skip(SkippedLocale {
            locale: locale.to_string(),
            reason: MISSING_NAME.to_string(),
        });
    }

    let mut fields = Vec::new();
    for field in shared_fields(source.store, target_store) {
        let (Some(value), Some(spec)) = (source.value(field), target_store.field_spec(field))
        else {
            continue;
        };
        let candidate = normalize_listing_text(spec.truncate(value));
        let current = target.and_then(|detail| detail.value(field));
        if current != Some(candidate) {
            fields.push(FieldDiff {
                field,
                old_value: current.map(str::to_string),
                new_value: candidate.to_string(),
            });
        }
    }

    let is_new_locale = target.is_none();
    if fields.is_empty() && !is_new_locale {
        return LocaleDiff::Unchanged;
    }

    LocaleDiff::Entry(DiffEntry {
        source_locale: locale.to_string(),
        target_locale: locale.to_string(),
        target_native_locale: to_store_native(locale, target_store).to_string(),
        target_store,
        is_new_locale,
        fields,
    })
}

/// Compare every locale of `source` against `target`.
///
/// Entries and skips come back ordered by canonical source locale.
pub fn diff_snapshots(source: &Snapshot, target: &Snapshot) -> DiffReport {
    let mut report = DiffReport {
        source_store: source.store,
        target_store: target.store,
        entries: Vec::new(),
        skipped: Vec::new(),
    };

    for detail in source.locales.values() {
        match diff_locale(detail, target.locale(&detail.locale), target.store) {
            LocaleDiff::Entry(entry) => report.entries.push(entry),
            LocaleDiff::Skip(skip) => {
                tracing::debug!(locale = %skip.locale, reason = %skip.reason, "Skipping locale");
                report.skipped.push(skip);
            }
            LocaleDiff::Unchanged => {}
        }
    }

    report
}
