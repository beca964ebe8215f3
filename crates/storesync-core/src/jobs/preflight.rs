//! Preflight: refresh snapshots and size up the sync workload

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use super::{JobContext, JobExecutor};
use crate::diff::diff_snapshots;
use crate::error::{Error, Result};
use crate::models::{Field, Snapshot, Store, SyncJob};
use crate::storefront::{capture_snapshot, StorefrontRegistry};

/// Work needed to bring `target_store` in line with `source_store`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionWorkload {
    pub source_store: Store,
    pub target_store: Store,
    pub entries: usize,
    pub field_diffs: usize,
    pub new_locales: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub directions: Vec<DirectionWorkload>,
}

/// A fetched locale whose remote values already exceed the store limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverLimitLocale {
    pub store: Store,
    pub locale: String,
    pub fields: Vec<Field>,
}

/// Summary stored on a finished preflight job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightSummary {
    /// Locale count per refreshed store
    pub fetched: BTreeMap<Store, usize>,
    #[serde(default)]
    pub over_limit: Vec<OverLimitLocale>,
    pub workload: Option<Workload>,
}

pub struct PreflightExecutor {
    registry: Arc<StorefrontRegistry>,
}

impl PreflightExecutor {
    pub fn new(registry: Arc<StorefrontRegistry>) -> Self {
        Self { registry }
    }

    fn workload(
        snapshots: &BTreeMap<Store, Snapshot>,
        source_store: Option<Store>,
    ) -> Workload {
        let sources = source_store.map_or_else(|| Store::ALL.to_vec(), |store| vec![store]);
        let directions = sources
            .into_iter()
            .filter_map(|source_store| {
                let target_store = source_store.counterpart();
                let report = diff_snapshots(
                    snapshots.get(&source_store)?,
                    snapshots.get(&target_store)?,
                );
                Some(DirectionWorkload {
                    source_store,
                    target_store,
                    entries: report.entries.len(),
                    field_diffs: report.field_diff_count(),
                    new_locales: report.new_locale_count(),
                    skipped: report.skipped.len(),
                })
            })
            .collect();
        Workload { directions }
    }
}

#[async_trait]
impl JobExecutor for PreflightExecutor {
    async fn execute(&self, job: SyncJob, context: JobContext) -> Result<serde_json::Value> {
        let app_id = job.app_id.as_str();
        let repo = context.repo();

        let mut storefronts = Vec::new();
        for store in job.scope.stores() {
            let storefront = self.registry.get(app_id, store).ok_or_else(|| {
                Error::InvalidInput(format!("no {store} client configured for {app_id}"))
            })?;
            storefronts.push(storefront);
        }

        context.log(format!("Fetching {} storefront(s)", storefronts.len()));
        let captured = join_all(
            storefronts
                .iter()
                .map(|storefront| capture_snapshot(storefront.as_ref())),
        )
        .await;

        let mut fetched = BTreeMap::new();
        let mut over_limit = Vec::new();
        let mut snapshots = BTreeMap::new();
        for snapshot in captured {
            let snapshot = snapshot?;
            let store = snapshot.store;
            context.log(format!("Fetched {} {store} locales", snapshot.locales.len()));
            for detail in snapshot.locales.values() {
                let fields = detail.over_limit();
                if !fields.is_empty() {
                    context.log(format!(
                        "{store} {} exceeds limits: {}",
                        detail.locale,
                        fields
                            .iter()
                            .map(|field| field.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
                    over_limit.push(OverLimitLocale {
                        store,
                        locale: detail.locale.clone(),
                        fields,
                    });
                }
            }
            repo.replace_locale_details(app_id, &snapshot)?;
            repo.replace_locales(app_id, store, &snapshot.locale_codes())?;
            fetched.insert(store, snapshot.locales.len());
            snapshots.insert(store, snapshot);
        }

        let workload = if job.payload.compute_workload {
            for store in Store::ALL {
                if !snapshots.contains_key(&store) {
                    if let Some(snapshot) = repo.load_snapshot(app_id, store)? {
                        snapshots.insert(store, snapshot);
                    }
                }
            }
            let workload = Self::workload(&snapshots, job.payload.source_store);
            if workload.directions.is_empty() {
                context.log("Workload skipped: both storefronts need a snapshot");
            }
            for direction in &workload.directions {
                context.log(format!(
                    "{} -> {}: {} locale(s), {} field diff(s), {} new locale(s)",
                    direction.source_store,
                    direction.target_store,
                    direction.entries,
                    direction.field_diffs,
                    direction.new_locales
                ));
            }
            Some(workload)
        } else {
            None
        };

        Ok(serde_json::to_value(PreflightSummary {
            fetched,
            over_limit,
            workload,
        })?)
    }
}
