use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use storesync_core::apply::{ApplyEngine, ApplyReport};
use storesync_core::config::{load_apps_manifest, StorefrontCredentials};
use storesync_core::db::{Database, Repository, SqliteRepository};
use storesync_core::diff::{diff_snapshots, DiffReport};
use storesync_core::jobs::{JobRunner, PreflightExecutor};
use storesync_core::locale::{build_locale_matrix, is_valid_code, known_locales, LocaleRow};
use storesync_core::models::{
    Field, JobId, JobLogLine, JobPayload, NewJob, Store, StoreScope, SyncJob,
};
use storesync_core::queue::{
    ChangeQueue, EnqueueReport, LocaleAction, PendingChange, QueueOutcome, WritePlan,
};
use storesync_core::storefront::{StaticToken, StorefrontRegistry, TokenSource};
use storesync_core::translate::{
    BatchRequest, OpenAiCompatibleGenerator, RetryPolicy, TranslationEvent, Translator,
};
use storesync_core::Snapshot;
use tokio::sync::Mutex as AsyncMutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AppError;

type SharedQueue = Arc<AsyncMutex<ChangeQueue>>;

#[derive(Clone)]
pub struct AppState {
    repo: Arc<dyn Repository>,
    registry: Arc<StorefrontRegistry>,
    runner: Arc<JobRunner>,
    engine: Arc<ApplyEngine>,
    translator: Option<Translator>,
    queues: Arc<Mutex<HashMap<String, SharedQueue>>>,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn Repository>,
        registry: Arc<StorefrontRegistry>,
        runner: JobRunner,
        translator: Option<Translator>,
    ) -> Self {
        Self {
            engine: Arc::new(ApplyEngine::new(repo.clone(), registry.clone())),
            repo,
            registry,
            runner: Arc::new(runner),
            translator,
            queues: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Open the database, build storefront clients and start the job worker.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let repo: Arc<dyn Repository> =
            Arc::new(SqliteRepository::new(Database::open(&config.db_path)?));

        let manifest = load_apps_manifest(&config.apps_file)
            .map_err(|error| AppError::Config(format!("{}: {error}", config.apps_file)))?;
        let credentials = StorefrontCredentials {
            app_store_url: config.app_store_api_url.clone(),
            app_store_token: static_token(config.app_store_token.as_deref())?,
            google_play_url: config.google_play_api_url.clone(),
            google_play_token: static_token(config.google_play_token.as_deref())?,
        };
        let registry = Arc::new(
            manifest
                .build_registry(&credentials)
                .map_err(|error| AppError::Config(error.to_string()))?,
        );
        tracing::info!(apps = ?registry.app_ids(), "Loaded apps manifest");

        let runner = JobRunner::start(
            repo.clone(),
            Arc::new(PreflightExecutor::new(registry.clone())),
        )?;

        let translator = config
            .text
            .as_ref()
            .map(|text| {
                let generator =
                    OpenAiCompatibleGenerator::new(&text.api_url, &text.api_key, &text.model)
                        .map_err(|error| AppError::Config(error.to_string()))?;
                Ok::<_, AppError>(Translator::new(
                    Arc::new(generator),
                    RetryPolicy {
                        max_retries: text.max_retries,
                        base_delay: text.retry_base_delay,
                    },
                    text.call_delay,
                ))
            })
            .transpose()?;
        if translator.is_none() {
            tracing::warn!("TEXT_API_KEY not set; translation is disabled");
        }

        Ok(Self::new(repo, registry, runner, translator))
    }

    fn require_app(&self, app_id: &str) -> Result<(), AppError> {
        if self.registry.contains_app(app_id) {
            Ok(())
        } else {
            Err(AppError::not_found(format!("unknown app '{app_id}'")))
        }
    }

    fn queue(&self, app_id: &str) -> Result<SharedQueue, AppError> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| AppError::Internal("queue registry lock poisoned".to_string()))?;
        Ok(queues.entry(app_id.to_string()).or_default().clone())
    }

    /// Diff two stored snapshots, with queued edits applied to the target.
    async fn diff(&self, app_id: &str, from: Store, to: Store) -> Result<DiffReport, AppError> {
        if from == to {
            return Err(AppError::bad_request("from and to must be different stores"));
        }
        let source = self.stored_snapshot(app_id, from)?;
        let target = self.stored_snapshot(app_id, to)?;
        let queue = self.queue(app_id)?;
        let target = queue.lock().await.project(&target);
        Ok(diff_snapshots(&source, &target))
    }

    fn stored_snapshot(
        &self,
        app_id: &str,
        store: Store,
    ) -> Result<Snapshot, AppError> {
        self.repo.load_snapshot(app_id, store)?.ok_or_else(|| {
            AppError::conflict(format!(
                "no {store} snapshot for '{app_id}'; run a sync job first"
            ))
        })
    }
}

fn validate_locale(code: &str) -> Result<(), AppError> {
    if is_valid_code(code) {
        Ok(())
    } else {
        Err(AppError::bad_request(format!("invalid locale code '{code}'")))
    }
}

fn static_token(token: Option<&str>) -> Result<Option<Arc<dyn TokenSource>>, AppError> {
    token
        .map(|token| {
            StaticToken::new(token)
                .map(|source| Arc::new(source) as Arc<dyn TokenSource>)
                .map_err(|error| AppError::Config(error.to_string()))
        })
        .transpose()
}

pub fn app_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/apps/{app_id}/locales", get(list_locales))
        .route("/apps/{app_id}/jobs", post(create_job))
        .route("/apps/{app_id}/diff", get(get_diff))
        .route("/apps/{app_id}/queue", get(get_queue).delete(clear_queue))
        .route("/apps/{app_id}/queue/fields", post(queue_field))
        .route("/apps/{app_id}/queue/locales", post(queue_locale))
        .route("/apps/{app_id}/queue/diff", post(queue_diff))
        .route("/apps/{app_id}/apply", post(apply))
        .route("/apps/{app_id}/translate", post(translate))
        .route("/jobs/{job_id}", get(get_job));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

async fn list_locales(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
) -> Result<Json<Vec<LocaleRow>>, AppError> {
    state.require_app(&app_id)?;
    let mut configured = BTreeMap::new();
    for store in Store::ALL {
        configured.insert(store, state.repo.list_locales(&app_id, store)?);
    }
    Ok(Json(build_locale_matrix(known_locales(), &configured)))
}

#[derive(Debug, Deserialize)]
struct CreateJobRequest {
    #[serde(default)]
    scope: StoreScope,
    #[serde(flatten)]
    payload: JobPayload,
}

async fn create_job(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<SyncJob>), AppError> {
    state.require_app(&app_id)?;
    let job = state.runner.submit(&NewJob {
        app_id,
        scope: request.scope,
        payload: request.payload,
    })?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

#[derive(Debug, Serialize)]
struct JobResponse {
    job: SyncJob,
    logs: Vec<JobLogLine>,
}

async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let id: JobId = job_id
        .parse()
        .map_err(|_| AppError::bad_request(format!("invalid job id '{job_id}'")))?;
    let job = state
        .repo
        .get_job(&id)?
        .ok_or_else(|| AppError::not_found(format!("job {id}")))?;
    let logs = state.repo.job_logs(&id)?;
    Ok(Json(JobResponse { job, logs }))
}

#[derive(Debug, Deserialize)]
struct DiffParams {
    from: Store,
    #[serde(default)]
    to: Option<Store>,
}

async fn get_diff(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    Query(params): Query<DiffParams>,
) -> Result<Json<DiffReport>, AppError> {
    state.require_app(&app_id)?;
    let to = params.to.unwrap_or_else(|| params.from.counterpart());
    Ok(Json(state.diff(&app_id, params.from, to).await?))
}

#[derive(Debug, Serialize)]
struct QueueResponse {
    pending: Vec<PendingChange>,
    plan: WritePlan,
}

async fn get_queue(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
) -> Result<Json<QueueResponse>, AppError> {
    state.require_app(&app_id)?;
    let queue = state.queue(&app_id)?;
    let queue = queue.lock().await;
    Ok(Json(QueueResponse {
        pending: queue.pending(),
        plan: queue.write_plan(),
    }))
}

async fn clear_queue(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.require_app(&app_id)?;
    state.queue(&app_id)?.lock().await.clear();
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct FieldEdit {
    store: Store,
    locale: String,
    field: Field,
    value: String,
}

#[derive(Debug, Serialize)]
struct QueueWriteResponse {
    outcome: QueueOutcome,
    pending: usize,
}

async fn queue_field(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    Json(edit): Json<FieldEdit>,
) -> Result<Json<QueueWriteResponse>, AppError> {
    state.require_app(&app_id)?;
    validate_locale(&edit.locale)?;
    let baseline = state
        .repo
        .get_locale_detail(&app_id, edit.store, &edit.locale)?
        .and_then(|detail| detail.fields.get(&edit.field).cloned());

    let queue = state.queue(&app_id)?;
    let mut queue = queue.lock().await;
    let outcome = queue.upsert_field(edit.store, &edit.locale, edit.field, baseline, &edit.value)?;
    Ok(Json(QueueWriteResponse {
        outcome,
        pending: queue.len(),
    }))
}

#[derive(Debug, Deserialize)]
struct LocaleEdit {
    store: Store,
    locale: String,
    action: LocaleAction,
}

async fn queue_locale(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    Json(edit): Json<LocaleEdit>,
) -> Result<Json<QueueWriteResponse>, AppError> {
    state.require_app(&app_id)?;
    validate_locale(&edit.locale)?;
    let queue = state.queue(&app_id)?;
    let mut queue = queue.lock().await;
    let outcome = match edit.action {
        LocaleAction::Add => queue.queue_locale_add(edit.store, &edit.locale)?,
        LocaleAction::Remove => queue.queue_locale_remove(edit.store, &edit.locale),
    };
    Ok(Json(QueueWriteResponse {
        outcome,
        pending: queue.len(),
    }))
}

async fn queue_diff(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    Json(params): Json<DiffParams>,
) -> Result<Json<EnqueueReport>, AppError> {
    state.require_app(&app_id)?;
    let to = params.to.unwrap_or_else(|| params.from.counterpart());
    let report = state.diff(&app_id, params.from, to).await?;
    let queue = state.queue(&app_id)?;
    let enqueued = queue.lock().await.enqueue_diff(&report);
    tracing::info!(
        app_id = %app_id,
        queued = enqueued.fields_queued,
        locales = enqueued.locales_added,
        rejected = enqueued.rejected.len(),
        "Queued diff"
    );
    Ok(Json(enqueued))
}

#[derive(Debug, Serialize)]
struct ApplyResponse {
    report: ApplyReport,
    /// Locale adds held back, with the reason
    blocked: Vec<String>,
    /// Queue entries left after acknowledging successes
    remaining: usize,
}

async fn apply(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
) -> Result<Json<ApplyResponse>, AppError> {
    state.require_app(&app_id)?;
    let queue = state.queue(&app_id)?;
    let mut queue = queue.lock().await;
    let plan = queue.write_plan();
    let report = state.engine.apply(&app_id, &plan).await;
    let acknowledged = queue.acknowledge(&report);
    tracing::info!(
        app_id = %app_id,
        succeeded = report.succeeded_count(),
        failed = report.failed_count(),
        acknowledged,
        "Apply finished"
    );
    Ok(Json(ApplyResponse {
        report,
        blocked: plan.blocked,
        remaining: queue.len(),
    }))
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct TranslateRequest {
    source_store: Store,
    source_locale: String,
    #[serde(default)]
    target_store: Option<Store>,
    target_locales: Vec<String>,
    #[serde(default)]
    fields: Vec<Field>,
    #[serde(default)]
    overwrite: bool,
    #[serde(default)]
    strict: bool,
    #[serde(default)]
    style: Option<String>,
    /// Queue the translations once the batch is done
    #[serde(default = "default_true")]
    enqueue: bool,
}

async fn translate(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    Json(request): Json<TranslateRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    state.require_app(&app_id)?;
    let translator = state
        .translator
        .clone()
        .ok_or_else(|| AppError::Config("text service is not configured".to_string()))?;
    if request.target_locales.is_empty() {
        return Err(AppError::bad_request("target_locales must not be empty"));
    }
    request
        .target_locales
        .iter()
        .try_for_each(|code| validate_locale(code))?;

    let source = state
        .repo
        .get_locale_detail(&app_id, request.source_store, &request.source_locale)?
        .ok_or_else(|| {
            AppError::not_found(format!(
                "{} has no stored {} listing for '{app_id}'",
                request.source_store, request.source_locale
            ))
        })?;
    let target_store = request
        .target_store
        .unwrap_or_else(|| request.source_store.counterpart());
    let target_snapshot = state.repo.load_snapshot(&app_id, target_store)?;

    let events = translator.spawn_batch(BatchRequest {
        source,
        target_store,
        target_locales: request.target_locales,
        fields: request.fields,
        target_snapshot,
        overwrite: request.overwrite,
        strict: request.strict,
        style: request.style,
    });

    let queue = state.queue(&app_id)?;
    let enqueue = request.enqueue;
    let stream = events
        .then(move |event| {
            let queue = queue.clone();
            async move {
                if let (true, TranslationEvent::Done { summary }) = (enqueue, &event) {
                    let report = queue.lock().await.enqueue_translations(&summary.translations);
                    tracing::info!(
                        queued = report.fields_queued,
                        rejected = report.rejected.len(),
                        "Queued translations"
                    );
                }
                event
            }
        })
        .map(|event| Ok(sse_event(&event)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn sse_event(event: &TranslationEvent) -> Event {
    Event::default()
        .event(event.name())
        .json_data(event)
        .unwrap_or_else(|error| Event::default().event("error").data(error.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use storesync_core::config::parse_apps_manifest;
    use storesync_core::models::LocaleDetail;
    use tower::ServiceExt;

    use super::*;

    const MANIFEST: &str = r#"{
        "schema_version": 1,
        "apps": {
            "demo": {
                "app_store": { "app_info_id": "info-1", "version_id": "ver-1" },
                "google_play": { "package_name": "com.example.demo" }
            }
        }
    }"#;

    fn test_state() -> (AppState, Arc<SqliteRepository>) {
        let repo = Arc::new(SqliteRepository::open_in_memory().unwrap());
        let token = || Some(Arc::new(StaticToken::new("token").unwrap()) as Arc<dyn TokenSource>);
        let registry = Arc::new(
            parse_apps_manifest(MANIFEST)
                .unwrap()
                .build_registry(&StorefrontCredentials {
                    app_store_url: "http://127.0.0.1:9".to_string(),
                    app_store_token: token(),
                    google_play_url: "http://127.0.0.1:9".to_string(),
                    google_play_token: token(),
                })
                .unwrap(),
        );
        let runner = JobRunner::start(
            repo.clone(),
            Arc::new(PreflightExecutor::new(registry.clone())),
        )
        .unwrap();
        (AppState::new(repo.clone(), registry, runner, None), repo)
    }

    fn seed_snapshots(repo: &SqliteRepository) {
        let play = LocaleDetail::new(
            Store::GooglePlay,
            "en-US",
            BTreeMap::from([
                (Field::Name, "Demo".to_string()),
                (Field::Description, "Hello".to_string()),
            ]),
        );
        repo.replace_locale_details("demo", &Snapshot::new(Store::GooglePlay, [play]))
            .unwrap();
        repo.replace_locale_details("demo", &Snapshot::new(Store::AppStore, []))
            .unwrap();
        repo.replace_locales("demo", Store::GooglePlay, &["en-US".to_string()])
            .unwrap();
    }

    async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.map_or_else(Body::empty, |body| Body::from(body.to_string())))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let (state, _) = test_state();
        let (status, body) = send(app_router(state), Method::GET, "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn unknown_app_is_not_found() {
        let (state, _) = test_state();
        let (status, body) =
            send(app_router(state), Method::GET, "/v1/apps/nope/locales", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn locale_matrix_marks_configured_stores() {
        let (state, repo) = test_state();
        seed_snapshots(&repo);
        let (status, body) =
            send(app_router(state), Method::GET, "/v1/apps/demo/locales", None).await;
        assert_eq!(status, StatusCode::OK);

        let rows = body.as_array().unwrap();
        let english = rows.iter().find(|row| row["locale"] == "en-US").unwrap();
        assert_eq!(english["stores"]["google_play"]["configured"], true);
        assert_eq!(english["stores"]["app_store"]["configured"], false);
        assert_eq!(english["addable_to"], json!(["app_store"]));
    }

    #[tokio::test]
    async fn diff_requires_snapshots() {
        let (state, _) = test_state();
        let (status, _) = send(
            app_router(state),
            Method::GET,
            "/v1/apps/demo/diff?from=google_play",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn queued_diff_hides_itself_from_the_next_diff() {
        let (state, repo) = test_state();
        seed_snapshots(&repo);
        let app = app_router(state);

        let (status, body) = send(
            app.clone(),
            Method::GET,
            "/v1/apps/demo/diff?from=google_play&to=app_store",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["entries"][0]["is_new_locale"], true);

        let (status, body) = send(
            app.clone(),
            Method::POST,
            "/v1/apps/demo/queue/diff",
            Some(json!({ "from": "google_play" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fields_queued"], 2);
        assert_eq!(body["locales_added"], 1);

        let (_, body) = send(
            app,
            Method::GET,
            "/v1/apps/demo/diff?from=google_play",
            None,
        )
        .await;
        assert_eq!(body["entries"], json!([]));
    }

    #[tokio::test]
    async fn locale_add_names_missing_fields() {
        let (state, repo) = test_state();
        seed_snapshots(&repo);
        let app = app_router(state);

        let (status, body) = send(
            app.clone(),
            Method::POST,
            "/v1/apps/demo/queue/fields",
            Some(json!({
                "store": "app_store",
                "locale": "ja",
                "field": "name",
                "value": "デモ"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "outcome": "queued", "pending": 1 }));

        let (status, body) = send(
            app.clone(),
            Method::POST,
            "/v1/apps/demo/queue/locales",
            Some(json!({ "store": "app_store", "locale": "ja", "action": "add" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .ends_with("missing mandatory fields: description"));

        let (status, _) = send(app.clone(), Method::DELETE, "/v1/apps/demo/queue", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, body) = send(app, Method::GET, "/v1/apps/demo/queue", None).await;
        assert_eq!(body["pending"], json!([]));
    }

    #[tokio::test]
    async fn jobs_are_queued_and_readable() {
        let (state, _) = test_state();
        let app = app_router(state);

        let (status, body) = send(
            app.clone(),
            Method::POST,
            "/v1/apps/demo/jobs",
            Some(json!({ "scope": "google_play", "compute_workload": false })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "queued");
        assert_eq!(body["payload"]["compute_workload"], false);

        let id = body["id"].as_str().unwrap().to_string();
        let (status, body) = send(app.clone(), Method::GET, &format!("/v1/jobs/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["job"]["id"], id.as_str());

        let (status, _) = send(app, Method::GET, "/v1/jobs/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn translate_without_text_service_is_a_config_error() {
        let (state, repo) = test_state();
        seed_snapshots(&repo);
        let (status, body) = send(
            app_router(state),
            Method::POST,
            "/v1/apps/demo/translate",
            Some(json!({
                "source_store": "google_play",
                "source_locale": "en-US",
                "target_locales": ["ja"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("text service"));
    }

    #[tokio::test]
    async fn malformed_locale_codes_are_rejected() {
        let (state, _) = test_state();
        let (status, body) = send(
            app_router(state),
            Method::POST,
            "/v1/apps/demo/queue/locales",
            Some(json!({ "store": "app_store", "locale": "Not A Locale", "action": "remove" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Not A Locale"));
    }

    #[test]
    fn sse_events_use_kebab_names() {
        let event = TranslationEvent::LocaleSkipped {
            locale: "ja".to_string(),
            reason: "already translated".to_string(),
        };
        assert_eq!(event.name(), "locale-skipped");
        let _ = sse_event(&event);
    }
}
