//! Background job runner
//!
//! One worker drains a FIFO of job ids, so at most one job executes at a
//! time. Every dequeued job ends `succeeded` or `failed`, including jobs
//! whose executor panics.

mod preflight;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::Repository;
use crate::error::{Error, Result};
use crate::models::{JobId, JobStatus, NewJob, SyncJob};

pub use preflight::{
    DirectionWorkload, OverLimitLocale, PreflightExecutor, PreflightSummary, Workload,
};

/// Error recorded on jobs found `running` when the runner starts.
pub const INTERRUPTED: &str = "interrupted by restart";

/// Handle given to an executor for the job it is running.
#[derive(Clone)]
pub struct JobContext {
    repo: Arc<dyn Repository>,
    id: JobId,
}

impl JobContext {
    pub fn new(repo: Arc<dyn Repository>, id: JobId) -> Self {
        Self { repo, id }
    }

    pub const fn id(&self) -> JobId {
        self.id
    }

    pub fn repo(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// Append a line to the job's log. Failures are traced, not returned.
    pub fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::debug!(job_id = %self.id, "{}", message);
        if let Err(error) = self.repo.append_log(&self.id, message) {
            tracing::warn!(job_id = %self.id, "Failed to append job log: {}", error);
        }
    }
}

/// The work behind a job. The returned value becomes the job summary.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: SyncJob, context: JobContext) -> Result<serde_json::Value>;
}

pub struct JobRunner {
    repo: Arc<dyn Repository>,
    sender: mpsc::UnboundedSender<JobId>,
    worker: JoinHandle<()>,
}

impl JobRunner {
    /// Spawn the worker on the current runtime.
    ///
    /// Jobs left `running` by a previous process are failed; jobs still
    /// `queued` are enqueued again in creation order.
    pub fn start(repo: Arc<dyn Repository>, executor: Arc<dyn JobExecutor>) -> Result<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();

        for job in repo.list_unfinished_jobs()? {
            match job.status {
                JobStatus::Running => {
                    tracing::warn!(job_id = %job.id, "Failing job interrupted by restart");
                    repo.mark_failed(&job.id, INTERRUPTED)?;
                }
                _ => {
                    tracing::info!(job_id = %job.id, "Re-queueing job");
                    sender.send(job.id).map_err(|_| Error::RunnerStopped)?;
                }
            }
        }

        let worker = tokio::spawn(run_worker(repo.clone(), executor, receiver));
        Ok(Self {
            repo,
            sender,
            worker,
        })
    }

    /// Persist a new `queued` job and append it to the queue.
    pub fn submit(&self, job: &NewJob) -> Result<SyncJob> {
        let job = self.repo.create_job(job)?;
        self.sender.send(job.id).map_err(|_| Error::RunnerStopped)?;
        tracing::info!(job_id = %job.id, app_id = %job.app_id, "Job queued");
        Ok(job)
    }

    /// Stop accepting jobs and wait for the queue to drain.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(error) = self.worker.await {
            tracing::error!("Job worker ended abnormally: {}", error);
        }
    }
}

async fn run_worker(
    repo: Arc<dyn Repository>,
    executor: Arc<dyn JobExecutor>,
    mut receiver: mpsc::UnboundedReceiver<JobId>,
) {
    while let Some(id) = receiver.recv().await {
        run_job(&repo, &executor, id).await;
    }
    tracing::debug!("Job worker stopped");
}

async fn run_job(repo: &Arc<dyn Repository>, executor: &Arc<dyn JobExecutor>, id: JobId) {
    let job = match repo.mark_running(&id) {
        Ok(job) => job,
        Err(error) => {
            tracing::warn!(job_id = %id, "Skipping job: {}", error);
            return;
        }
    };
    let context = JobContext::new(repo.clone(), id);
    context.log(format!(
        "Started {} job for {}",
        job.scope.as_str(),
        job.app_id
    ));

    let task = {
        let executor = executor.clone();
        let context = context.clone();
        tokio::spawn(async move { executor.execute(job, context).await })
    };

    let finished = match task.await {
        Ok(Ok(summary)) => {
            context.log("Finished");
            repo.mark_succeeded(&id, &summary)
        }
        Ok(Err(error)) => {
            context.log(format!("Failed: {error}"));
            repo.mark_failed(&id, &error.to_string())
        }
        Err(join_error) => {
            let message = if join_error.is_panic() {
                format!("job panicked: {}", panic_message(join_error.into_panic().as_ref()))
            } else {
                "job was cancelled".to_string()
            };
            context.log(&message);
            repo.mark_failed(&id, &message)
        }
    };

    // A job must not stay `running` because its outcome could not be stored.
    let finished = finished.or_else(|error| {
        tracing::warn!(job_id = %id, "Recording job outcome failed: {}", error);
        repo.mark_failed(&id, &format!("could not record outcome: {error}"))
    });

    match finished {
        Ok(job) => tracing::info!(job_id = %id, status = %job.status, "Job finished"),
        Err(error) => tracing::error!(job_id = %id, "Failed to record job outcome: {}", error),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::SqliteRepository;
    use crate::models::{JobPayload, StoreScope};
    use crate::test_support::FlakyRepository;

    /// Succeeds, fails or panics depending on the job's app id.
    #[derive(Default)]
    struct ScriptedExecutor {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobExecutor for ScriptedExecutor {
        async fn execute(&self, job: SyncJob, context: JobContext) -> Result<serde_json::Value> {
            self.seen.lock().unwrap().push(job.app_id.clone());
            context.log(format!("Working on {}", job.app_id));
            match job.app_id.as_str() {
                "fail" => Err(Error::InvalidInput("boom".to_string())),
                "panic" => panic!("executor exploded"),
                app_id => Ok(serde_json::json!({ "app": app_id })),
            }
        }
    }

    fn new_job(app_id: &str) -> NewJob {
        NewJob {
            app_id: app_id.to_string(),
            scope: StoreScope::Both,
            payload: JobPayload::default(),
        }
    }

    fn setup() -> (Arc<SqliteRepository>, Arc<ScriptedExecutor>) {
        (
            Arc::new(SqliteRepository::open_in_memory().unwrap()),
            Arc::new(ScriptedExecutor::default()),
        )
    }

    #[tokio::test]
    async fn runs_jobs_in_submission_order() {
        let (repo, executor) = setup();
        let runner = JobRunner::start(repo.clone(), executor.clone()).unwrap();

        let jobs: Vec<SyncJob> = ["one", "two", "three"]
            .into_iter()
            .map(|app_id| runner.submit(&new_job(app_id)).unwrap())
            .collect();
        assert!(jobs.iter().all(|job| job.status == JobStatus::Queued));
        runner.shutdown().await;

        assert_eq!(*executor.seen.lock().unwrap(), vec!["one", "two", "three"]);
        for job in jobs {
            let stored = repo.get_job(&job.id).unwrap().unwrap();
            assert_eq!(stored.status, JobStatus::Succeeded);
            assert_eq!(
                stored.summary,
                Some(serde_json::json!({ "app": job.app_id }))
            );
        }
    }

    #[tokio::test]
    async fn failures_and_panics_are_terminal_and_do_not_stop_the_worker() {
        let (repo, executor) = setup();
        let runner = JobRunner::start(repo.clone(), executor.clone()).unwrap();

        let failing = runner.submit(&new_job("fail")).unwrap();
        let panicking = runner.submit(&new_job("panic")).unwrap();
        let healthy = runner.submit(&new_job("ok")).unwrap();
        runner.shutdown().await;

        let failing = repo.get_job(&failing.id).unwrap().unwrap();
        assert_eq!(failing.status, JobStatus::Failed);
        assert_eq!(failing.error.as_deref(), Some("Invalid input: boom"));

        let panicking = repo.get_job(&panicking.id).unwrap().unwrap();
        assert_eq!(panicking.status, JobStatus::Failed);
        assert_eq!(
            panicking.error.as_deref(),
            Some("job panicked: executor exploded")
        );

        assert_eq!(
            repo.get_job(&healthy.id).unwrap().unwrap().status,
            JobStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn job_logs_bracket_the_execution() {
        let (repo, executor) = setup();
        let runner = JobRunner::start(repo.clone(), executor).unwrap();
        let job = runner.submit(&new_job("demo")).unwrap();
        runner.shutdown().await;

        let messages: Vec<String> = repo
            .job_logs(&job.id)
            .unwrap()
            .into_iter()
            .map(|line| line.message)
            .collect();
        assert_eq!(
            messages,
            vec![
                "Started both job for demo".to_string(),
                "Working on demo".to_string(),
                "Finished".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn start_recovers_unfinished_jobs() {
        let (repo, executor) = setup();
        let interrupted = repo.create_job(&new_job("crashed")).unwrap();
        repo.mark_running(&interrupted.id).unwrap();
        let waiting = repo.create_job(&new_job("waiting")).unwrap();

        let runner = JobRunner::start(repo.clone(), executor.clone()).unwrap();
        runner.shutdown().await;

        let interrupted = repo.get_job(&interrupted.id).unwrap().unwrap();
        assert_eq!(interrupted.status, JobStatus::Failed);
        assert_eq!(interrupted.error.as_deref(), Some(INTERRUPTED));
        assert_eq!(
            repo.get_job(&waiting.id).unwrap().unwrap().status,
            JobStatus::Succeeded
        );
        assert_eq!(*executor.seen.lock().unwrap(), vec!["waiting"]);
    }

    #[tokio::test]
    async fn job_fails_when_its_success_cannot_be_recorded() {
        let repo = Arc::new(FlakyRepository::new().fail_finish(1));
        let runner =
            JobRunner::start(repo.clone(), Arc::new(ScriptedExecutor::default())).unwrap();
        let job = runner.submit(&new_job("demo")).unwrap();
        runner.shutdown().await;

        let job = repo.get_job(&job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.error.as_deref(),
            Some("could not record outcome: Database error: mark_succeeded: disk I/O error")
        );
    }
}
