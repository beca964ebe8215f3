//! Listing and job repository

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT and counts

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use super::Database;
use crate::error::{Error, Result};
use crate::locale::canonicalize;
use crate::models::{
    Field, JobId, JobLogLine, JobStatus, LocaleDetail, NewJob, Snapshot, Store, SyncJob,
};
use crate::util::unix_millis_now;

/// Persisted listings and job state.
///
/// Every `replace_*` call fully overwrites the given app/store scope.
pub trait Repository: Send + Sync {
    /// Configured canonical locales for one store, sorted
    fn list_locales(&self, app_id: &str, store: Store) -> Result<Vec<String>>;

    fn replace_locales(&self, app_id: &str, store: Store, locales: &[String]) -> Result<()>;

    fn get_locale_detail(
        &self,
        app_id: &str,
        store: Store,
        locale: &str,
    ) -> Result<Option<LocaleDetail>>;

    fn list_locale_details(&self, app_id: &str, store: Store) -> Result<Vec<LocaleDetail>>;

    /// Replace every stored detail for the snapshot's store
    fn replace_locale_details(&self, app_id: &str, snapshot: &Snapshot) -> Result<()>;

    /// Last captured snapshot, if the store was ever fetched
    fn load_snapshot(&self, app_id: &str, store: Store) -> Result<Option<Snapshot>>;

    fn create_job(&self, job: &NewJob) -> Result<SyncJob>;

    fn get_job(&self, id: &JobId) -> Result<Option<SyncJob>>;

    /// Newest first
    fn list_jobs(&self, app_id: &str, limit: usize) -> Result<Vec<SyncJob>>;

    /// Jobs left `queued` or `running`, oldest first
    fn list_unfinished_jobs(&self) -> Result<Vec<SyncJob>>;

    fn mark_running(&self, id: &JobId) -> Result<SyncJob>;

    fn mark_succeeded(&self, id: &JobId, summary: &serde_json::Value) -> Result<SyncJob>;

    fn mark_failed(&self, id: &JobId, error: &str) -> Result<SyncJob>;

    fn append_log(&self, id: &JobId, message: &str) -> Result<()>;

    fn job_logs(&self, id: &JobId) -> Result<Vec<JobLogLine>>;
}

/// `SQLite` implementation of [`Repository`]
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

const JOB_COLUMNS: &str =
    "id, app_id, scope, status, payload, summary, error, created_at, started_at, finished_at";

impl SqliteRepository {
    pub fn new(database: Database) -> Self {
        Self {
            conn: Mutex::new(database.into_connection()),
        }
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("connection lock poisoned".into()))
    }

    /// Parse a job from a database row
    fn parse_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncJob> {
        let text_error = |index: usize, error: String| {
            rusqlite::Error::FromSqlConversionFailure(
                index,
                rusqlite::types::Type::Text,
                error.into(),
            )
        };
        let json_error = |index: usize, error: serde_json::Error| {
            rusqlite::Error::FromSqlConversionFailure(
                index,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        };

        let id: String = row.get(0)?;
        let scope: String = row.get(2)?;
        let status: String = row.get(3)?;
        let payload: String = row.get(4)?;
        let summary: Option<String> = row.get(5)?;

        Ok(SyncJob {
            id: id
                .parse()
                .map_err(|error: uuid::Error| text_error(0, error.to_string()))?,
            app_id: row.get(1)?,
            scope: scope.parse().map_err(|error| text_error(2, error))?,
            status: status.parse().map_err(|error| text_error(3, error))?,
            payload: serde_json::from_str(&payload).map_err(|error| json_error(4, error))?,
            summary: summary
                .map(|summary| serde_json::from_str(&summary))
                .transpose()
                .map_err(|error| json_error(5, error))?,
            error: row.get(6)?,
            created_at: row.get(7)?,
            started_at: row.get(8)?,
            finished_at: row.get(9)?,
        })
    }

    fn parse_detail(store: Store, row: &rusqlite::Row<'_>) -> rusqlite::Result<LocaleDetail> {
        let locale: String = row.get(0)?;
        let fields: String = row.get(1)?;
        let count: Option<i64> = row.get(2)?;
        let fields: BTreeMap<Field, String> = serde_json::from_str(&fields).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(error))
        })?;
        Ok(LocaleDetail::new(store, &locale, fields)
            .with_screenshot_count(count.and_then(|count| usize::try_from(count).ok())))
    }

    fn fetch_job(conn: &Connection, id: &JobId) -> Result<Option<SyncJob>> {
        Ok(conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"),
                params![id.as_str()],
                Self::parse_job,
            )
            .optional()?)
    }

    /// Move a job to `next`, rejecting steps the state machine forbids.
    fn transition(
        &self,
        id: &JobId,
        next: JobStatus,
        summary: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<SyncJob> {
        let conn = self.conn()?;
        let job = Self::fetch_job(&conn, id)?
            .ok_or_else(|| Error::NotFound(format!("job {id}")))?;
        if !job.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                id: id.as_str(),
                from: job.status,
                to: next,
            });
        }

        let now = unix_millis_now();
        let summary = summary.map(serde_json::to_string).transpose()?;
        match next {
            JobStatus::Running => conn.execute(
                "UPDATE jobs SET status = ?, started_at = ? WHERE id = ?",
                params![next.as_str(), now, id.as_str()],
            )?,
            _ => conn.execute(
                "UPDATE jobs SET status = ?, summary = ?, error = ?, finished_at = ? WHERE id = ?",
                params![next.as_str(), summary, error, now, id.as_str()],
            )?,
        };

        Self::fetch_job(&conn, id)?.ok_or_else(|| Error::NotFound(format!("job {id}")))
    }
}

impl Repository for SqliteRepository {
    fn list_locales(&self, app_id: &str, store: Store) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT locale FROM store_locales WHERE app_id = ? AND store = ? ORDER BY locale",
        )?;
        let locales = stmt
            .query_map(params![app_id, store.as_str()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(locales)
    }

    fn replace_locales(&self, app_id: &str, store: Store, locales: &[String]) -> Result<()> {
        let canonical: BTreeSet<&str> = locales.iter().map(|code| canonicalize(code)).collect();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM store_locales WHERE app_id = ? AND store = ?",
            params![app_id, store.as_str()],
        )?;
        for locale in canonical {
            tx.execute(
                "INSERT INTO store_locales (app_id, store, locale) VALUES (?, ?, ?)",
                params![app_id, store.as_str(), locale],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_locale_detail(
        &self,
        app_id: &str,
        store: Store,
        locale: &str,
    ) -> Result<Option<LocaleDetail>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT locale, fields, screenshot_count FROM locale_details
                 WHERE app_id = ? AND store = ? AND locale = ?",
                params![app_id, store.as_str(), canonicalize(locale)],
                |row| Self::parse_detail(store, row),
            )
            .optional()?)
    }

    fn list_locale_details(&self, app_id: &str, store: Store) -> Result<Vec<LocaleDetail>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT locale, fields, screenshot_count FROM locale_details
             WHERE app_id = ? AND store = ? ORDER BY locale",
        )?;
        let details = stmt
            .query_map(params![app_id, store.as_str()], |row| {
                Self::parse_detail(store, row)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(details)
    }

    fn replace_locale_details(&self, app_id: &str, snapshot: &Snapshot) -> Result<()> {
        let store = snapshot.store.as_str();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM locale_details WHERE app_id = ? AND store = ?",
            params![app_id, store],
        )?;
        for detail in snapshot.locales.values() {
            tx.execute(
                "INSERT INTO locale_details (app_id, store, locale, fields, screenshot_count)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    app_id,
                    store,
                    detail.locale,
                    serde_json::to_string(&detail.fields)?,
                    detail.screenshot_count.map(|count| count as i64),
                ],
            )?;
        }
        tx.execute(
            "INSERT INTO snapshots (app_id, store, captured_at) VALUES (?, ?, ?)
             ON CONFLICT(app_id, store) DO UPDATE SET captured_at = excluded.captured_at",
            params![app_id, store, snapshot.captured_at],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn load_snapshot(&self, app_id: &str, store: Store) -> Result<Option<Snapshot>> {
        let captured_at: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT captured_at FROM snapshots WHERE app_id = ? AND store = ?",
                params![app_id, store.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(captured_at) = captured_at else {
            return Ok(None);
        };
        let details = self.list_locale_details(app_id, store)?;
        Ok(Some(Snapshot::captured_at(store, captured_at, details)))
    }

    fn create_job(&self, job: &NewJob) -> Result<SyncJob> {
        let app_id = job.app_id.trim();
        if app_id.is_empty() {
            return Err(Error::InvalidInput("app id must not be empty".into()));
        }
        let created = SyncJob {
            id: JobId::new(),
            app_id: app_id.to_string(),
            scope: job.scope,
            status: JobStatus::Queued,
            payload: job.payload.clone(),
            summary: None,
            error: None,
            created_at: unix_millis_now(),
            started_at: None,
            finished_at: None,
        };

        self.conn()?.execute(
            "INSERT INTO jobs (id, app_id, scope, status, payload, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                created.id.as_str(),
                created.app_id,
                created.scope.as_str(),
                created.status.as_str(),
                serde_json::to_string(&created.payload)?,
                created.created_at,
            ],
        )?;
        Ok(created)
    }

    fn get_job(&self, id: &JobId) -> Result<Option<SyncJob>> {
        Self::fetch_job(&*self.conn()?, id)
    }

    fn list_jobs(&self, app_id: &str, limit: usize) -> Result<Vec<SyncJob>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE app_id = ? ORDER BY created_at DESC, id DESC LIMIT ?"
        ))?;
        let jobs = stmt
            .query_map(params![app_id, limit as i64], Self::parse_job)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn list_unfinished_jobs(&self) -> Result<Vec<SyncJob>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status IN ('queued', 'running')
             ORDER BY created_at, id"
        ))?;
        let jobs = stmt
            .query_map([], Self::parse_job)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn mark_running(&self, id: &JobId) -> Result<SyncJob> {
        self.transition(id, JobStatus::Running, None, None)
    }

    fn mark_succeeded(&self, id: &JobId, summary: &serde_json::Value) -> Result<SyncJob> {
        self.transition(id, JobStatus::Succeeded, Some(summary), None)
    }

    fn mark_failed(&self, id: &JobId, error: &str) -> Result<SyncJob> {
        self.transition(id, JobStatus::Failed, None, Some(error))
    }

    fn append_log(&self, id: &JobId, message: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO job_logs (job_id, at, message) VALUES (?, ?, ?)",
            params![id.as_str(), unix_millis_now(), message],
        )?;
        Ok(())
    }

    fn job_logs(&self, id: &JobId) -> Result<Vec<JobLogLine>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT at, message FROM job_logs WHERE job_id = ? ORDER BY id")?;
        let lines = stmt
            .query_map(params![id.as_str()], |row| {
                Ok(JobLogLine {
                    at: row.get(0)?,
                    message: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(lines)
    }
}
