//! In-memory fakes shared by the crate's tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::db::{Repository, SqliteRepository};
use crate::error::{Error, Result};
use crate::models::{JobId, JobLogLine, LocaleDetail, NewJob, Snapshot, Store, SyncJob};
use crate::storefront::{
    EditSession, RemoteListing, Storefront, StorefrontError, StorefrontResult,
};
use crate::translate::{GenerationError, GenerationMode, GenerationRequest, TextGenerator};

/// A storefront backed by a map of native locale code to native values.
pub struct FakeStorefront {
    store: Store,
    listings: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    screenshot_failures: BTreeSet<String>,
    write_failures: BTreeSet<String>,
    fail_commit: bool,
    edits: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl FakeStorefront {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            listings: Mutex::new(BTreeMap::new()),
            screenshot_failures: BTreeSet::new(),
            write_failures: BTreeSet::new(),
            fail_commit: false,
            edits: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_listing(self, native_locale: &str, values: &[(&str, &str)]) -> Self {
        self.listings.lock().unwrap().insert(
            native_locale.to_string(),
            values
                .iter()
                .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
                .collect(),
        );
        self
    }

    pub fn with_screenshot_failure(mut self, native_locale: &str) -> Self {
        self.screenshot_failures.insert(native_locale.to_string());
        self
    }

    /// Every write for this native locale fails.
    pub fn with_write_failure(mut self, native_locale: &str) -> Self {
        self.write_failures.insert(native_locale.to_string());
        self
    }

    pub fn with_commit_failure(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    /// Recorded calls, e.g. `create:ja` or `commit:edit-1`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn native_locales(&self) -> Vec<String> {
        self.listings.lock().unwrap().keys().cloned().collect()
    }

    pub fn listing(&self, native_locale: &str) -> Option<BTreeMap<String, String>> {
        self.listings.lock().unwrap().get(native_locale).cloned()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_write(&self, edit: Option<&EditSession>, native_locale: &str) -> StorefrontResult<()> {
        if self.store.requires_edit_session() && edit.is_none() {
            return Err(StorefrontError::InvalidRequest {
                store: self.store,
                message: "writes require an open edit".to_string(),
            });
        }
        if self.write_failures.contains(native_locale) {
            return Err(StorefrontError::Api {
                store: self.store,
                status: 409,
                message: format!("{native_locale} is locked"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Storefront for FakeStorefront {
    fn store(&self) -> Store {
        self.store
    }

    async fn fetch_listings(&self) -> StorefrontResult<Vec<RemoteListing>> {
        self.record("fetch".to_string());
        Ok(self
            .listings
            .lock()
            .unwrap()
            .iter()
            .map(|(native_locale, values)| RemoteListing {
                native_locale: native_locale.clone(),
                values: values.clone(),
            })
            .collect())
    }

    async fn fetch_screenshot_count(&self, native_locale: &str) -> StorefrontResult<usize> {
        if self.screenshot_failures.contains(native_locale) {
            return Err(StorefrontError::Http {
                store: self.store,
                message: "connection reset".to_string(),
            });
        }
        Ok(0)
    }

    async fn begin_edit(&self) -> StorefrontResult<Option<EditSession>> {
        if !self.store.requires_edit_session() {
            return Ok(None);
        }
        let id = format!("edit-{}", self.edits.fetch_add(1, Ordering::SeqCst) + 1);
        self.record(format!("begin:{id}"));
        Ok(Some(EditSession { id }))
    }

    async fn create_locale(
        &self,
        edit: Option<&EditSession>,
        native_locale: &str,
        values: &BTreeMap<String, String>,
    ) -> StorefrontResult<()> {
        self.record(format!("create:{native_locale}"));
        self.check_write(edit, native_locale)?;
        self.listings
            .lock()
            .unwrap()
            .insert(native_locale.to_string(), values.clone());
        Ok(())
    }

    async fn update_locale(
        &self,
        edit: Option<&EditSession>,
        native_locale: &str,
        values: &BTreeMap<String, String>,
    ) -> StorefrontResult<()> {
        self.record(format!("update:{native_locale}"));
        self.check_write(edit, native_locale)?;
        let mut listings = self.listings.lock().unwrap();
        let listing = listings
            .get_mut(native_locale)
            .ok_or_else(|| StorefrontError::LocaleNotFound {
                store: self.store,
                locale: native_locale.to_string(),
            })?;
        listing.extend(values.clone());
        Ok(())
    }

    async fn delete_locale(
        &self,
        edit: Option<&EditSession>,
        native_locale: &str,
    ) -> StorefrontResult<()> {
        self.record(format!("delete:{native_locale}"));
        self.check_write(edit, native_locale)?;
        self.listings.lock().unwrap().remove(native_locale);
        Ok(())
    }

    async fn commit_edit(&self, edit: EditSession) -> StorefrontResult<()> {
        self.record(format!("commit:{}", edit.id));
        if self.fail_commit {
            return Err(StorefrontError::Api {
                store: self.store,
                status: 400,
                message: "edit is no longer valid".to_string(),
            });
        }
        Ok(())
    }

    async fn discard_edit(&self, edit: EditSession) -> StorefrontResult<()> {
        self.record(format!("discard:{}", edit.id));
        Ok(())
    }
}

/// What a [`ScriptedGenerator`] does once its script runs out.
#[derive(Debug, Clone)]
pub enum Fallback {
    /// Translate as `{target}:{text}`; shorten by truncating to the budget
    Echo,
    /// Always return this text
    Text(String),
    /// Always report a rate limit without a retry hint
    RateLimited,
}

/// A text generator that replays scripted responses and records requests.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<std::result::Result<String, GenerationError>>>,
    fallback: Fallback,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(fallback: Fallback) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn echo() -> Self {
        Self::new(Fallback::Echo)
    }

    pub fn then(self, response: std::result::Result<String, GenerationError>) -> Self {
        self.script.lock().unwrap().push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<String, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(response) = self.script.lock().unwrap().pop_front() {
            return response;
        }
        match &self.fallback {
            Fallback::Echo => Ok(match request.mode {
                GenerationMode::Translate => {
                    format!("{}:{}", request.target_locale, request.text)
                }
                GenerationMode::Shorten => request
                    .unit
                    .truncate(&request.text, request.max_len)
                    .to_string(),
            }),
            Fallback::Text(text) => Ok(text.clone()),
            Fallback::RateLimited => Err(GenerationError::RateLimited { retry_after: None }),
        }
    }
}

/// Repository whose chosen writes fail a set number of times.
pub struct FlakyRepository {
    inner: SqliteRepository,
    replace_locales_failures: AtomicUsize,
    finish_failures: AtomicUsize,
}

impl FlakyRepository {
    pub fn new() -> Self {
        Self {
            inner: SqliteRepository::open_in_memory().unwrap(),
            replace_locales_failures: AtomicUsize::new(0),
            finish_failures: AtomicUsize::new(0),
        }
    }

    pub fn fail_replace_locales(self, times: usize) -> Self {
        self.replace_locales_failures.store(times, Ordering::SeqCst);
        self
    }

    /// `mark_succeeded` and `mark_failed` share one failure budget.
    pub fn fail_finish(self, times: usize) -> Self {
        self.finish_failures.store(times, Ordering::SeqCst);
        self
    }

    fn trip(counter: &AtomicUsize, what: &str) -> Result<()> {
        let tripped = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if tripped {
            Err(Error::Database(format!("{what}: disk I/O error")))
        } else {
            Ok(())
        }
    }
}

impl Repository for FlakyRepository {
    fn list_locales(&self, app_id: &str, store: Store) -> Result<Vec<String>> {
        self.inner.list_locales(app_id, store)
    }

    fn replace_locales(&self, app_id: &str, store: Store, locales: &[String]) -> Result<()> {
        Self::trip(&self.replace_locales_failures, "replace_locales")?;
        self.inner.replace_locales(app_id, store, locales)
    }

    fn get_locale_detail(
        &self,
        app_id: &str,
        store: Store,
        locale: &str,
    ) -> Result<Option<LocaleDetail>> {
        self.inner.get_locale_detail(app_id, store, locale)
    }

    fn list_locale_details(&self, app_id: &str, store: Store) -> Result<Vec<LocaleDetail>> {
        self.inner.list_locale_details(app_id, store)
    }

    fn replace_locale_details(&self, app_id: &str, snapshot: &Snapshot) -> Result<()> {
        self.inner.replace_locale_details(app_id, snapshot)
    }

    fn load_snapshot(&self, app_id: &str, store: Store) -> Result<Option<Snapshot>> {
        self.inner.load_snapshot(app_id, store)
    }

    fn create_job(&self, job: &NewJob) -> Result<SyncJob> {
        self.inner.create_job(job)
    }

    fn get_job(&self, id: &JobId) -> Result<Option<SyncJob>> {
        self.inner.get_job(id)
    }

    fn list_jobs(&self, app_id: &str, limit: usize) -> Result<Vec<SyncJob>> {
        self.inner.list_jobs(app_id, limit)
    }

    fn list_unfinished_jobs(&self) -> Result<Vec<SyncJob>> {
        self.inner.list_unfinished_jobs()
    }

    fn mark_running(&self, id: &JobId) -> Result<SyncJob> {
        self.inner.mark_running(id)
    }

    fn mark_succeeded(&self, id: &JobId, summary: &serde_json::Value) -> Result<SyncJob> {
        Self::trip(&self.finish_failures, "mark_succeeded")?;
        self.inner.mark_succeeded(id, summary)
    }

    fn mark_failed(&self, id: &JobId, error: &str) -> Result<SyncJob> {
        Self::trip(&self.finish_failures, "mark_failed")?;
        self.inner.mark_failed(id, error)
    }

    fn append_log(&self, id: &JobId, message: &str) -> Result<()> {
        self.inner.append_log(id, message)
    }

    fn job_logs(&self, id: &JobId) -> Result<Vec<JobLogLine>> {
        self.inner.job_logs(id)
    }
}
