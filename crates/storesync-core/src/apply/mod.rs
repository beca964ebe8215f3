//! Apply engine
//!
//! Executes a [`WritePlan`] against the storefronts. Every store is written
//! concurrently; within a store each locale action settles on its own, and
//! stores with edit transactions get one edit per apply.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;

use crate::db::Repository;
use crate::error::Result;
use crate::models::Store;
use crate::queue::{FieldChange, PlannedAction, WritePlan};
use crate::storefront::{
    to_native_values, EditSession, Storefront, StorefrontRegistry, StorefrontResult,
};

/// A planned action that did not land, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAction {
    pub action: PlannedAction,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub succeeded: Vec<PlannedAction>,
    pub failed: Vec<FailedAction>,
    /// Configured locales per store after the apply
    pub locales: BTreeMap<Store, Vec<String>>,
    /// Bookkeeping that failed after the remote writes landed
    pub warnings: Vec<String>,
}

impl ApplyReport {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default)]
struct StoreOutcome {
    succeeded: Vec<PlannedAction>,
    failed: Vec<FailedAction>,
}

impl StoreOutcome {
    fn all_failed(actions: Vec<PlannedAction>, error: &str) -> Self {
        Self {
            succeeded: Vec::new(),
            failed: actions
                .into_iter()
                .map(|action| FailedAction {
                    action,
                    error: error.to_string(),
                })
                .collect(),
        }
    }
}

pub struct ApplyEngine {
    repo: Arc<dyn Repository>,
    registry: Arc<StorefrontRegistry>,
}

impl ApplyEngine {
    pub fn new(repo: Arc<dyn Repository>, registry: Arc<StorefrontRegistry>) -> Self {
        Self { repo, registry }
    }

    /// Run every action of `plan` for `app_id`.
    ///
    /// Storefront failures are reported per action. A locale list that
    /// cannot be stored afterwards becomes a warning, so the per-action
    /// results always reach the caller.
    pub async fn apply(&self, app_id: &str, plan: &WritePlan) -> ApplyReport {
        let mut by_store: BTreeMap<Store, Vec<PlannedAction>> = BTreeMap::new();
        for action in &plan.actions {
            by_store.entry(action.store()).or_default().push(action.clone());
        }
        tracing::info!(
            app_id,
            actions = plan.actions.len(),
            stores = by_store.len(),
            "Applying write plan"
        );

        let outcomes = join_all(by_store.into_iter().map(|(store, actions)| {
            let storefront = self.registry.get(app_id, store);
            async move {
                let outcome = match storefront {
                    Some(storefront) => apply_store(storefront.as_ref(), actions).await,
                    None => StoreOutcome::all_failed(
                        actions,
                        &format!("no {store} client configured for {app_id}"),
                    ),
                };
                (store, outcome)
            }
        }))
        .await;

        let mut report = ApplyReport::default();
        for (store, outcome) in outcomes {
            tracing::info!(
                app_id,
                store = %store,
                succeeded = outcome.succeeded.len(),
                failed = outcome.failed.len(),
                "Store apply finished"
            );
            match self.refresh_locales(app_id, store, &outcome.succeeded) {
                Ok(locales) => {
                    report.locales.insert(store, locales);
                }
                Err(error) => {
                    tracing::warn!(app_id, store = %store, "Locale list refresh failed: {}", error);
                    report
                        .warnings
                        .push(format!("{store} locale list not refreshed: {error}"));
                }
            }
            report.succeeded.extend(outcome.succeeded);
            report.failed.extend(outcome.failed);
        }
        report
    }

    /// Fold successful locale adds and removals into the stored locale list.
    fn refresh_locales(
        &self,
        app_id: &str,
        store: Store,
        succeeded: &[PlannedAction],
    ) -> Result<Vec<String>> {
        let prior = self.repo.list_locales(app_id, store)?;
        let mut locales: BTreeSet<String> = prior.iter().cloned().collect();
        for action in succeeded {
            match action {
                PlannedAction::Create { locale, .. } => {
                    locales.insert(locale.clone());
                }
                PlannedAction::Delete { locale, .. } => {
                    locales.remove(locale);
                }
                PlannedAction::Update { .. } => {}
            }
        }

        let locales: Vec<String> = locales.into_iter().collect();
        if locales != prior {
            self.repo.replace_locales(app_id, store, &locales)?;
            return self.repo.list_locales(app_id, store);
        }
        Ok(locales)
    }
}

async fn apply_store(storefront: &dyn Storefront, actions: Vec<PlannedAction>) -> StoreOutcome {
    let store = storefront.store();
    let edit = match storefront.begin_edit().await {
        Ok(edit) => edit,
        Err(error) => {
            tracing::warn!(store = %store, "Could not open edit: {}", error);
            return StoreOutcome::all_failed(actions, &error.to_string());
        }
    };

    let results = join_all(
        actions
            .iter()
            .map(|action| write_action(storefront, edit.as_ref(), action)),
    )
    .await;

    let mut outcome = StoreOutcome::default();
    for (action, result) in actions.into_iter().zip(results) {
        match result {
            Ok(()) => outcome.succeeded.push(action),
            Err(error) => {
                tracing::warn!(
                    store = %store,
                    locale = %action.locale(),
                    action = action.kind(),
                    "Write failed: {}",
                    error
                );
                outcome.failed.push(FailedAction {
                    action,
                    error: error.to_string(),
                });
            }
        }
    }

    if let Some(edit) = edit {
        finish_edit(storefront, edit, &mut outcome).await;
    }
    outcome
}

/// Commit an edit that carried successes, or discard an empty one.
async fn finish_edit(storefront: &dyn Storefront, edit: EditSession, outcome: &mut StoreOutcome) {
    let store = storefront.store();
    if outcome.succeeded.is_empty() {
        if let Err(error) = storefront.discard_edit(edit).await {
            tracing::warn!(store = %store, "Discarding edit failed: {}", error);
        }
        return;
    }

    if let Err(error) = storefront.commit_edit(edit).await {
        tracing::warn!(store = %store, "Commit failed: {}", error);
        let message = format!("commit failed: {error}");
        let committed = std::mem::take(&mut outcome.succeeded);
        outcome
            .failed
            .extend(committed.into_iter().map(|action| FailedAction {
                action,
                error: message.clone(),
            }));
    }
}

async fn write_action(
    storefront: &dyn Storefront,
    edit: Option<&EditSession>,
    action: &PlannedAction,
) -> StorefrontResult<()> {
    match action {
        PlannedAction::Create {
            store,
            native_locale,
            fields,
            ..
        } => {
            storefront
                .create_locale(edit, native_locale, &native_values(*store, fields))
                .await
        }
        PlannedAction::Update {
            store,
            native_locale,
            fields,
            ..
        } => {
            storefront
                .update_locale(edit, native_locale, &native_values(*store, fields))
                .await
        }
        PlannedAction::Delete { native_locale, .. } => {
            storefront.delete_locale(edit, native_locale).await
        }
    }
}

fn native_values(store: Store, fields: &[FieldChange]) -> BTreeMap<String, String> {
    to_native_values(
        store,
        fields
            .iter()
            .map(|change| (change.field, change.new_value.as_str())),
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::SqliteRepository;
    use crate::locale::to_store_native;
    use crate::models::Field;
    use crate::test_support::{FakeStorefront, FlakyRepository};

    fn change(store: Store, locale: &str, field: Field, value: &str) -> FieldChange {
        FieldChange {
            store,
            locale: locale.to_string(),
            field,
            old_value: None,
            new_value: value.to_string(),
        }
    }

    fn create(store: Store, locale: &str, fields: Vec<FieldChange>) -> PlannedAction {
        PlannedAction::Create {
            store,
            locale: locale.to_string(),
            native_locale: to_store_native(locale, store).to_string(),
            fields,
        }
    }

    fn update(store: Store, locale: &str, fields: Vec<FieldChange>) -> PlannedAction {
        PlannedAction::Update {
            store,
            locale: locale.to_string(),
            native_locale: to_store_native(locale, store).to_string(),
            fields,
        }
    }

    fn delete(store: Store, locale: &str) -> PlannedAction {
        PlannedAction::Delete {
            store,
            locale: locale.to_string(),
            native_locale: to_store_native(locale, store).to_string(),
        }
    }

    struct Harness {
        repo: Arc<SqliteRepository>,
        engine: ApplyEngine,
    }

    fn harness(storefronts: Vec<Arc<FakeStorefront>>) -> Harness {
        let repo = Arc::new(SqliteRepository::open_in_memory().unwrap());
        let mut registry = StorefrontRegistry::new();
        for storefront in storefronts {
            registry.insert("demo", storefront);
        }
        let engine = ApplyEngine::new(repo.clone(), Arc::new(registry));
        Harness { repo, engine }
    }

    #[tokio::test]
    async fn google_play_writes_share_one_committed_edit() {
        let play = Arc::new(
            FakeStorefront::new(Store::GooglePlay)
                .with_listing("en-US", &[("title", "Demo")])
                .with_listing("fr-FR", &[("title", "Démo")]),
        );
        let h = harness(vec![play.clone()]);
        h.repo
            .replace_locales(
                "demo",
                Store::GooglePlay,
                &["en-US".to_string(), "fr-FR".to_string()],
            )
            .unwrap();

        let plan = WritePlan {
            actions: vec![
                create(
                    Store::GooglePlay,
                    "he",
                    vec![change(Store::GooglePlay, "he", Field::Name, "דמו")],
                ),
                update(
                    Store::GooglePlay,
                    "en-US",
                    vec![change(Store::GooglePlay, "en-US", Field::Description, "Hello")],
                ),
                delete(Store::GooglePlay, "fr-FR"),
            ],
            blocked: Vec::new(),
        };
        let report = h.engine.apply("demo", &plan).await;

        assert!(report.is_complete());
        assert_eq!(report.succeeded_count(), 3);
        let calls = play.calls();
        assert_eq!(calls.first().map(String::as_str), Some("begin:edit-1"));
        assert_eq!(calls.last().map(String::as_str), Some("commit:edit-1"));
        assert!(calls.contains(&"create:iw-IL".to_string()));

        assert_eq!(
            play.listing("iw-IL").unwrap().get("title").map(String::as_str),
            Some("דמו")
        );
        assert_eq!(
            play.listing("en-US")
                .unwrap()
                .get("fullDescription")
                .map(String::as_str),
            Some("Hello")
        );
        assert_eq!(
            report.locales[&Store::GooglePlay],
            vec!["en-US".to_string(), "he".to_string()]
        );
        assert_eq!(
            h.repo.list_locales("demo", Store::GooglePlay).unwrap(),
            vec!["en-US".to_string(), "he".to_string()]
        );
    }

    #[tokio::test]
    async fn failed_action_does_not_block_siblings() {
        let apple = Arc::new(
            FakeStorefront::new(Store::AppStore)
                .with_listing("en-US", &[("name", "Demo")])
                .with_write_failure("ja"),
        );
        let h = harness(vec![apple.clone()]);

        let plan = WritePlan {
            actions: vec![
                create(
                    Store::AppStore,
                    "ja",
                    vec![change(Store::AppStore, "ja", Field::Description, "説明")],
                ),
                update(
                    Store::AppStore,
                    "en-US",
                    vec![change(Store::AppStore, "en-US", Field::Subtitle, "Edit")],
                ),
            ],
            blocked: Vec::new(),
        };
        let report = h.engine.apply("demo", &plan).await;

        assert_eq!(report.succeeded_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.failed[0].action.locale(), "ja");
        assert!(report.failed[0].error.contains("locked"));
        assert!(report.locales[&Store::AppStore].is_empty());
        assert!(!apple.calls().iter().any(|call| call.starts_with("begin")));
    }

    #[tokio::test]
    async fn failed_commit_turns_successes_into_failures() {
        let play = Arc::new(
            FakeStorefront::new(Store::GooglePlay)
                .with_listing("en-US", &[("title", "Demo")])
                .with_commit_failure(),
        );
        let h = harness(vec![play]);

        let plan = WritePlan {
            actions: vec![update(
                Store::GooglePlay,
                "en-US",
                vec![change(Store::GooglePlay, "en-US", Field::Subtitle, "Short")],
            )],
            blocked: Vec::new(),
        };
        let report = h.engine.apply("demo", &plan).await;

        assert_eq!(report.succeeded_count(), 0);
        assert_eq!(report.failed_count(), 1);
        assert!(report.failed[0].error.starts_with("commit failed:"));
    }

    #[tokio::test]
    async fn edit_without_successes_is_discarded() {
        let play = Arc::new(FakeStorefront::new(Store::GooglePlay).with_write_failure("ja-JP"));
        let h = harness(vec![play.clone()]);

        let plan = WritePlan {
            actions: vec![create(
                Store::GooglePlay,
                "ja",
                vec![change(Store::GooglePlay, "ja", Field::Name, "デモ")],
            )],
            blocked: Vec::new(),
        };
        let report = h.engine.apply("demo", &plan).await;

        assert_eq!(report.failed_count(), 1);
        assert_eq!(
            play.calls(),
            vec![
                "begin:edit-1".to_string(),
                "create:ja-JP".to_string(),
                "discard:edit-1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn stores_apply_independently() {
        let play = Arc::new(FakeStorefront::new(Store::GooglePlay));
        let h = harness(vec![play.clone()]);

        let plan = WritePlan {
            actions: vec![
                create(
                    Store::AppStore,
                    "en-US",
                    vec![change(Store::AppStore, "en-US", Field::Name, "Demo")],
                ),
                create(
                    Store::GooglePlay,
                    "en-US",
                    vec![change(Store::GooglePlay, "en-US", Field::Name, "Demo")],
                ),
            ],
            blocked: Vec::new(),
        };
        let report = h.engine.apply("demo", &plan).await;

        assert_eq!(report.succeeded_count(), 1);
        assert_eq!(report.succeeded[0].store(), Store::GooglePlay);
        assert_eq!(report.failed[0].action.store(), Store::AppStore);
        assert_eq!(
            report.failed[0].error,
            "no app_store client configured for demo"
        );
        assert_eq!(play.native_locales(), vec!["en-US".to_string()]);
    }

    #[tokio::test]
    async fn locale_refresh_failure_keeps_action_results() {
        let play = Arc::new(FakeStorefront::new(Store::GooglePlay));
        let repo = Arc::new(FlakyRepository::new().fail_replace_locales(1));
        let mut registry = StorefrontRegistry::new();
        registry.insert("demo", play.clone());
        let engine = ApplyEngine::new(repo.clone(), Arc::new(registry));

        let plan = WritePlan {
            actions: vec![create(
                Store::GooglePlay,
                "ja",
                vec![change(Store::GooglePlay, "ja", Field::Name, "デモ")],
            )],
            blocked: Vec::new(),
        };
        let report = engine.apply("demo", &plan).await;

        assert_eq!(report.succeeded_count(), 1);
        assert!(report.is_complete());
        assert!(!report.locales.contains_key(&Store::GooglePlay));
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("google_play locale list not refreshed"));
        assert_eq!(play.native_locales(), vec!["ja-JP".to_string()]);
        assert!(repo.list_locales("demo", Store::GooglePlay).unwrap().is_empty());
    }
}
