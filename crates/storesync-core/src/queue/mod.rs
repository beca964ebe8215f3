//! Change queue and write planning
//!
//! Pending edits are keyed by `(store, locale, field | "__locale__")`, so a
//! key holds at most one change. Diff output, translations and direct user
//! edits all go through [`ChangeQueue::upsert_field`]; a value that returns to
//! the baseline the key was first queued against drops the entry.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::apply::ApplyReport;
use crate::diff::DiffReport;
use crate::locale::{canonicalize, is_supported, to_store_native};
use crate::models::{Field, LocaleDetail, Snapshot, Store, Unit};
use crate::translate::TranslatedField;
use crate::util::normalize_listing_text;

const LOCALE_SLOT: &str = "__locale__";

/// What a queue key points at within one locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Slot {
    Field(Field),
    Locale,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(field) => f.write_str(field.as_str()),
            Self::Locale => f.write_str(LOCALE_SLOT),
        }
    }
}

impl From<Slot> for String {
    fn from(slot: Slot) -> Self {
        slot.to_string()
    }
}

impl TryFrom<String> for Slot {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == LOCALE_SLOT {
            Ok(Self::Locale)
        } else {
            value.parse().map(Self::Field)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChangeKey {
    pub store: Store,
    /// Canonical locale code
    pub locale: String,
    pub slot: Slot,
}

impl ChangeKey {
    pub fn new(store: Store, locale: &str, slot: Slot) -> Self {
        Self {
            store,
            locale: canonicalize(locale).to_string(),
            slot,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocaleAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub store: Store,
    pub locale: String,
    pub field: Field,
    /// Remote value the key was first queued against
    pub old_value: Option<String>,
    pub new_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleChange {
    pub store: Store,
    pub locale: String,
    pub action: LocaleAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingChange {
    Field(FieldChange),
    Locale(LocaleChange),
}

impl PendingChange {
    pub fn key(&self) -> ChangeKey {
        match self {
            Self::Field(change) => {
                ChangeKey::new(change.store, &change.locale, Slot::Field(change.field))
            }
            Self::Locale(change) => ChangeKey::new(change.store, &change.locale, Slot::Locale),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Cannot add {locale} to {store}: missing mandatory fields: {}", join_fields(.fields))]
    MissingMandatoryFields {
        store: Store,
        locale: String,
        fields: Vec<Field>,
    },
    #[error("{locale} is queued for removal from {store}")]
    RemovalPending { store: Store, locale: String },
    #[error("{store} does not support {locale}")]
    UnsupportedLocale { store: Store, locale: String },
    #[error("{store} has no {field} field")]
    UnknownField { store: Store, field: Field },
    #[error("{field} is {length} {}, limit is {max_len}", .unit.label())]
    TooLong {
        field: Field,
        length: usize,
        max_len: usize,
        unit: Unit,
    },
}

fn join_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|field| field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Effect of a queue write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOutcome {
    Queued,
    /// The key matched its baseline (or cancelled a pending add) and was dropped
    Reverted,
}

/// Result of bulk-queueing diff or translation output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnqueueReport {
    pub fields_queued: usize,
    pub fields_reverted: usize,
    pub locales_added: usize,
    pub rejected: Vec<String>,
}

/// One write against one locale of one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
    Create {
        store: Store,
        locale: String,
        native_locale: String,
        fields: Vec<FieldChange>,
    },
    Update {
        store: Store,
        locale: String,
        native_locale: String,
        fields: Vec<FieldChange>,
    },
    Delete {
        store: Store,
        locale: String,
        native_locale: String,
    },
}

impl PlannedAction {
    pub const fn store(&self) -> Store {
        match self {
            Self::Create { store, .. } | Self::Update { store, .. } | Self::Delete { store, .. } => {
                *store
            }
        }
    }

    pub fn locale(&self) -> &str {
        match self {
            Self::Create { locale, .. } | Self::Update { locale, .. } | Self::Delete { locale, .. } => {
                locale
            }
        }
    }

    pub fn native_locale(&self) -> &str {
        match self {
            Self::Create { native_locale, .. }
            | Self::Update { native_locale, .. }
            | Self::Delete { native_locale, .. } => native_locale,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }

    pub fn field_changes(&self) -> &[FieldChange] {
        match self {
            Self::Create { fields, .. } | Self::Update { fields, .. } => fields,
            Self::Delete { .. } => &[],
        }
    }

    /// The queue entries this action writes.
    pub fn changes(&self) -> Vec<PendingChange> {
        let locale_change = |action| {
            PendingChange::Locale(LocaleChange {
                store: self.store(),
                locale: self.locale().to_string(),
                action,
            })
        };
        let mut changes = match self {
            Self::Create { .. } => vec![locale_change(LocaleAction::Add)],
            Self::Delete { .. } => vec![locale_change(LocaleAction::Remove)],
            Self::Update { .. } => Vec::new(),
        };
        changes.extend(self.field_changes().iter().cloned().map(PendingChange::Field));
        changes
    }
}

/// The conflict-resolved set of writes for one apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritePlan {
    pub actions: Vec<PlannedAction>,
    /// Locale adds that cannot run yet, with the reason
    pub blocked: Vec<String>,
}

impl WritePlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn stores(&self) -> BTreeSet<Store> {
        self.actions.iter().map(PlannedAction::store).collect()
    }
}

/// Pending edits for one app.
#[derive(Debug, Clone, Default)]
pub struct ChangeQueue {
    entries: BTreeMap<ChangeKey, PendingChange>,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &ChangeKey) -> Option<&PendingChange> {
        self.entries.get(key)
    }

    /// Pending changes in key order.
    pub fn pending(&self) -> Vec<PendingChange> {
        self.entries.values().cloned().collect()
    }

    pub fn remove(&mut self, key: &ChangeKey) -> Option<PendingChange> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn locale_action(&self, store: Store, locale: &str) -> Option<LocaleAction> {
        match self.entries.get(&ChangeKey::new(store, locale, Slot::Locale)) {
            Some(PendingChange::Locale(change)) => Some(change.action),
            _ => None,
        }
    }

    fn has_field_value(&self, store: Store, locale: &str, field: Field) -> bool {
        matches!(
            self.entries.get(&ChangeKey::new(store, locale, Slot::Field(field))),
            Some(PendingChange::Field(change)) if !change.new_value.trim().is_empty()
        )
    }

    fn missing_for_add(&self, store: Store, locale: &str) -> Vec<Field> {
        store
            .draft_required_fields()
            .into_iter()
            .filter(|field| !self.has_field_value(store, locale, *field))
            .collect()
    }

    /// Record a field edit against its remote `baseline`.
    ///
    /// An existing entry keeps the baseline it was first queued with.
    pub fn upsert_field(
        &mut self,
        store: Store,
        locale: &str,
        field: Field,
        baseline: Option<String>,
        new_value: &str,
    ) -> Result<QueueOutcome, QueueError> {
        let locale = canonicalize(locale);
        if self.locale_action(store, locale) == Some(LocaleAction::Remove) {
            return Err(QueueError::RemovalPending {
                store,
                locale: locale.to_string(),
            });
        }
        let spec = store
            .field_spec(field)
            .ok_or(QueueError::UnknownField { store, field })?;
        let new_value = normalize_listing_text(new_value);
        let length = spec.measure(new_value);
        if length > spec.max_len {
            return Err(QueueError::TooLong {
                field,
                length,
                max_len: spec.max_len,
                unit: spec.unit,
            });
        }

        let key = ChangeKey::new(store, locale, Slot::Field(field));
        let baseline = match self.entries.get(&key) {
            Some(PendingChange::Field(existing)) => existing.old_value.clone(),
            _ => baseline,
        };
        let baseline_text = baseline.as_deref().map_or("", normalize_listing_text);
        if baseline_text == new_value {
            self.entries.remove(&key);
            return Ok(QueueOutcome::Reverted);
        }

        self.entries.insert(
            key,
            PendingChange::Field(FieldChange {
                store,
                locale: locale.to_string(),
                field,
                old_value: baseline,
                new_value: new_value.to_string(),
            }),
        );
        Ok(QueueOutcome::Queued)
    }

    /// Queue creation of a locale; every draft-mandatory field must already
    /// be queued.
    pub fn queue_locale_add(
        &mut self,
        store: Store,
        locale: &str,
    ) -> Result<QueueOutcome, QueueError> {
        let locale = canonicalize(locale);
        if !is_supported(locale, store) {
            return Err(QueueError::UnsupportedLocale {
                store,
                locale: locale.to_string(),
            });
        }
        let missing = self.missing_for_add(store, locale);
        if !missing.is_empty() {
            return Err(QueueError::MissingMandatoryFields {
                store,
                locale: locale.to_string(),
                fields: missing,
            });
        }

        self.entries.insert(
            ChangeKey::new(store, locale, Slot::Locale),
            PendingChange::Locale(LocaleChange {
                store,
                locale: locale.to_string(),
                action: LocaleAction::Add,
            }),
        );
        Ok(QueueOutcome::Queued)
    }

    /// Queue deletion of a locale, dropping its pending field edits.
    ///
    /// Removing a locale whose add is still pending just cancels the add.
    pub fn queue_locale_remove(&mut self, store: Store, locale: &str) -> QueueOutcome {
        let locale = canonicalize(locale).to_string();
        let cancels_add = self.locale_action(store, &locale) == Some(LocaleAction::Add);
        self.entries
            .retain(|key, _| !(key.store == store && key.locale == locale));
        if cancels_add {
            return QueueOutcome::Reverted;
        }

        self.entries.insert(
            ChangeKey::new(store, &locale, Slot::Locale),
            PendingChange::Locale(LocaleChange {
                store,
                locale,
                action: LocaleAction::Remove,
            }),
        );
        QueueOutcome::Queued
    }

    /// Queue every field diff, then the add for each new locale.
    pub fn enqueue_diff(&mut self, report: &DiffReport) -> EnqueueReport {
        let mut result = EnqueueReport::default();
        for entry in &report.entries {
            for diff in &entry.fields {
                self.record_field(
                    &mut result,
                    entry.target_store,
                    &entry.target_locale,
                    diff.field,
                    diff.old_value.clone(),
                    &diff.new_value,
                );
            }
            if entry.is_new_locale {
                match self.queue_locale_add(entry.target_store, &entry.target_locale) {
                    Ok(_) => result.locales_added += 1,
                    Err(error) => result.rejected.push(error.to_string()),
                }
            }
        }
        result
    }

    /// Queue the output of a translation batch.
    pub fn enqueue_translations(&mut self, translations: &[TranslatedField]) -> EnqueueReport {
        let mut result = EnqueueReport::default();
        for translation in translations {
            self.record_field(
                &mut result,
                translation.store,
                &translation.locale,
                translation.field,
                translation.old_value.clone(),
                &translation.new_value,
            );
        }
        result
    }

    fn record_field(
        &mut self,
        result: &mut EnqueueReport,
        store: Store,
        locale: &str,
        field: Field,
        baseline: Option<String>,
        new_value: &str,
    ) {
        match self.upsert_field(store, locale, field, baseline, new_value) {
            Ok(QueueOutcome::Queued) => result.fields_queued += 1,
            Ok(QueueOutcome::Reverted) => result.fields_reverted += 1,
            Err(error) => result.rejected.push(error.to_string()),
        }
    }

    /// Group pending changes into per-locale writes.
    ///
    /// Adds are re-checked here; an add whose mandatory fields were reverted
    /// since it was queued is blocked along with its field changes.
    pub fn write_plan(&self) -> WritePlan {
        let mut grouped: BTreeMap<(Store, &str), (Option<LocaleAction>, Vec<FieldChange>)> =
            BTreeMap::new();
        for (key, change) in &self.entries {
            let group = grouped.entry((key.store, key.locale.as_str())).or_default();
            match change {
                PendingChange::Locale(change) => group.0 = Some(change.action),
                PendingChange::Field(change) => group.1.push(change.clone()),
            }
        }

        let mut plan = WritePlan::default();
        for ((store, locale), (action, fields)) in grouped {
            let native_locale = to_store_native(locale, store).to_string();
            let locale = locale.to_string();
            match action {
                Some(LocaleAction::Add) => {
                    let missing = self.missing_for_add(store, &locale);
                    if missing.is_empty() {
                        plan.actions.push(PlannedAction::Create {
                            store,
                            locale,
                            native_locale,
                            fields,
                        });
                    } else {
                        plan.blocked.push(
                            QueueError::MissingMandatoryFields {
                                store,
                                locale,
                                fields: missing,
                            }
                            .to_string(),
                        );
                    }
                }
                Some(LocaleAction::Remove) => plan.actions.push(PlannedAction::Delete {
                    store,
                    locale,
                    native_locale,
                }),
                None => plan.actions.push(PlannedAction::Update {
                    store,
                    locale,
                    native_locale,
                    fields,
                }),
            }
        }
        plan
    }

    /// Drop entries an apply wrote, unless they were edited meanwhile.
    ///
    /// Returns the number of entries removed.
    pub fn acknowledge(&mut self, report: &ApplyReport) -> usize {
        let mut removed = 0;
        for action in &report.succeeded {
            for change in action.changes() {
                let key = change.key();
                if self.entries.get(&key) == Some(&change) {
                    self.entries.remove(&key);
                    removed += 1;
                }
            }
        }
        removed
    }

    /// `snapshot` as it would look once every pending change for its store
    /// is applied.
    pub fn project(&self, snapshot: &Snapshot) -> Snapshot {
        let store = snapshot.store;
        let mut locales = snapshot.locales.clone();
        for change in self.entries.values() {
            match change {
                PendingChange::Locale(change) if change.store == store => match change.action {
                    LocaleAction::Add => {
                        locales.entry(change.locale.clone()).or_insert_with(|| {
                            LocaleDetail::new(store, &change.locale, BTreeMap::new())
                        });
                    }
                    LocaleAction::Remove => {
                        locales.remove(&change.locale);
                    }
                },
                PendingChange::Field(change) if change.store == store => {
                    let existing = locales.get(&change.locale);
                    let screenshot_count = existing.and_then(|detail| detail.screenshot_count);
                    let mut fields = existing
                        .map(|detail| detail.fields.clone())
                        .unwrap_or_default();
                    fields.insert(change.field, change.new_value.clone());
                    locales.insert(
                        change.locale.clone(),
                        LocaleDetail::new(store, &change.locale, fields)
                            .with_screenshot_count(screenshot_count),
                    );
                }
                _ => {}
            }
        }
        Snapshot::captured_at(store, snapshot.captured_at, locales.into_values())
    }
}
