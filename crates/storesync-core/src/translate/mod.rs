//! Translate-then-shorten pipeline.
//!
//! Every call to the text service goes through a [`Throttle`] that spaces
//! consecutive calls, and through a [`RetryPolicy`] that backs off on rate
//! limits. A translation that overflows its budget gets exactly one shorten
//! call; if that still overflows, the field is reported as over budget.

mod generator;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;

use crate::locale::{canonicalize, is_supported};
use crate::models::{Field, LocaleDetail, Snapshot, Store, Unit};
use crate::util::normalize_listing_text;

pub use generator::{
    GenerationError, GenerationMode, GenerationRequest, OpenAiCompatibleGenerator, TextGenerator,
    TranslationContext, DEFAULT_TEXT_API_URL, DEFAULT_TEXT_MODEL,
};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("Text service still rate limited after {retries} retries")]
    RateLimitExhausted { retries: u32 },
    #[error("{0}")]
    Generation(String),
    #[error("{field} is {length} {} after shortening, limit is {max_len}", .unit.label())]
    OverBudget {
        field: Field,
        length: usize,
        max_len: usize,
        unit: Unit,
    },
}

/// Backoff applied to rate-limited calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (zero-based). A server hint wins.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        hint.unwrap_or_else(|| {
            self.base_delay
                .saturating_mul(2_u32.saturating_pow(attempt))
        })
    }
}

/// Enforces a minimum gap between the end of one call and the start of the
/// next.
#[derive(Debug)]
pub struct Throttle {
    call_delay: Duration,
    last_done: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(call_delay: Duration) -> Self {
        Self {
            call_delay,
            last_done: Mutex::new(None),
        }
    }

    /// Run `call` once the gap since the previous call has passed.
    ///
    /// Calls are serialized; the gap is measured from completion.
    pub async fn run<F: Future>(&self, call: F) -> F::Output {
        let mut last_done = self.last_done.lock().await;
        if let Some(done) = *last_done {
            tokio::time::sleep_until(done + self.call_delay).await;
        }
        let output = call.await;
        *last_done = Some(Instant::now());
        output
    }
}

/// A translated value that fits its field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldTranslation {
    pub field: Field,
    pub text: String,
    pub length: usize,
    /// Length of the first translation when a shorten call was needed
    pub shortened_from: Option<usize>,
}

/// One field value produced by a batch, ready to queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedField {
    pub store: Store,
    pub locale: String,
    pub field: Field,
    /// Value in the target snapshot before translation
    pub old_value: Option<String>,
    pub new_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranslationEvent {
    Start {
        source_locale: String,
        target_store: Store,
        locales: Vec<String>,
        fields: Vec<Field>,
    },
    FieldTranslated {
        locale: String,
        field: Field,
        text: String,
        length: usize,
        max_len: usize,
    },
    FieldShortened {
        locale: String,
        field: Field,
        from_length: usize,
        to_length: usize,
    },
    FieldError {
        locale: String,
        field: Field,
        error: String,
    },
    LocaleDone {
        locale: String,
        translated: usize,
        failed: usize,
    },
    LocaleSkipped {
        locale: String,
        reason: String,
    },
    Done {
        summary: BatchSummary,
    },
}

impl TranslationEvent {
    /// Event name on the wire, e.g. `field-translated`
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::FieldTranslated { .. } => "field-translated",
            Self::FieldShortened { .. } => "field-shortened",
            Self::FieldError { .. } => "field-error",
            Self::LocaleDone { .. } => "locale-done",
            Self::LocaleSkipped { .. } => "locale-skipped",
            Self::Done { .. } => "done",
        }
    }

    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// Translate one source locale into several target locales of one store.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub source: LocaleDetail,
    pub target_store: Store,
    pub target_locales: Vec<String>,
    /// Fields to translate; empty means every field both stores share
    pub fields: Vec<Field>,
    /// Current target listings, used to skip already-translated locales
    pub target_snapshot: Option<Snapshot>,
    pub overwrite: bool,
    /// Abort the whole batch when a field stays over budget
    pub strict: bool,
    pub style: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub translated: usize,
    pub shortened: usize,
    pub failed: usize,
    pub locales_done: usize,
    pub locales_skipped: usize,
    /// Why a strict batch stopped early
    #[serde(default)]
    pub aborted: Option<String>,
    #[serde(default)]
    pub translations: Vec<TranslatedField>,
}

/// Runs translation batches against one text service.
#[derive(Clone)]
pub struct Translator {
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
    throttle: Arc<Throttle>,
}

impl Translator {
    pub fn new(generator: Arc<dyn TextGenerator>, retry: RetryPolicy, call_delay: Duration) -> Self {
        Self {
            generator,
            retry,
            throttle: Arc::new(Throttle::new(call_delay)),
        }
    }

    /// One throttled call, retried on rate limits.
    async fn call(&self, request: &GenerationRequest) -> Result<String, TranslateError> {
        let mut attempt = 0;
        loop {
            match self.throttle.run(self.generator.generate(request)).await {
                Ok(text) => return Ok(normalize_listing_text(text.trim_start()).to_string()),
                Err(GenerationError::RateLimited { retry_after }) => {
                    if attempt >= self.retry.max_retries {
                        return Err(TranslateError::RateLimitExhausted { retries: attempt });
                    }
                    let delay = self.retry.delay_for(attempt, retry_after);
                    tracing::warn!(
                        locale = %request.target_locale,
                        field = %request.field,
                        attempt = attempt + 1,
                        delay = ?delay,
                        "Text service rate limited; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(GenerationError::Failed(message)) => {
                    return Err(TranslateError::Generation(message));
                }
            }
        }
    }

    /// Translate one field and bring it within budget.
    ///
    /// `request.mode` is ignored; the first call always translates.
    pub async fn translate_field(
        &self,
        request: GenerationRequest,
    ) -> Result<FieldTranslation, TranslateError> {
        let request = GenerationRequest {
            mode: GenerationMode::Translate,
            ..request
        };
        let translated = self.call(&request).await?;
        let length = request.unit.measure(&translated);
        if length <= request.max_len {
            return Ok(FieldTranslation {
                field: request.field,
                text: translated,
                length,
                shortened_from: None,
            });
        }

        tracing::debug!(
            locale = %request.target_locale,
            field = %request.field,
            length,
            max_len = request.max_len,
            "Translation over budget; shortening"
        );
        let shorten = GenerationRequest {
            mode: GenerationMode::Shorten,
            text: translated,
            ..request
        };
        let shortened = self.call(&shorten).await?;
        let shortened_length = shorten.unit.measure(&shortened);
        if shortened_length > shorten.max_len {
            return Err(TranslateError::OverBudget {
                field: shorten.field,
                length: shortened_length,
                max_len: shorten.max_len,
                unit: shorten.unit,
            });
        }

        Ok(FieldTranslation {
            field: shorten.field,
            text: shortened,
            length: shortened_length,
            shortened_from: Some(length),
        })
    }

    /// Run a batch, reporting progress on `events`.
    ///
    /// A `done` event is always the last event sent. In strict mode the first
    /// over-budget field stops the batch and its error is returned.
    pub async fn run_batch(
        &self,
        request: BatchRequest,
        events: mpsc::Sender<TranslationEvent>,
    ) -> Result<BatchSummary, TranslateError> {
        let source_store = request.source.store;
        let target_store = request.target_store;
        let source_locale = request.source.locale.clone();
        let fields = batch_fields(&request);

        let mut targets: Vec<String> = Vec::new();
        for locale in &request.target_locales {
            let locale = canonicalize(locale).to_string();
            if !targets.contains(&locale) {
                targets.push(locale);
            }
        }

        emit(
            &events,
            TranslationEvent::Start {
                source_locale: source_locale.clone(),
                target_store,
                locales: targets.clone(),
                fields: fields.clone(),
            },
        )
        .await;
        tracing::info!(
            source_store = %source_store,
            target_store = %target_store,
            source_locale = %source_locale,
            locales = targets.len(),
            "Starting translation batch"
        );

        let mut summary = BatchSummary::default();
        let mut result = Ok(());

        'locales: for locale in targets {
            let existing = request
                .target_snapshot
                .as_ref()
                .and_then(|snapshot| snapshot.locale(&locale));

            if let Some(reason) = skip_reason(&request, &locale, &fields, existing) {
                summary.locales_skipped += 1;
                emit(&events, TranslationEvent::LocaleSkipped { locale, reason }).await;
                continue;
            }

            let mut context = TranslationContext {
                app_title: existing.and_then(|detail| detail.value(Field::Name).map(str::to_string)),
                style: request.style.clone(),
            };
            let mut translated = 0;
            let mut failed = 0;

            for field in &fields {
                let field = *field;
                let old_value = existing.and_then(|detail| detail.value(field).map(str::to_string));
                if old_value.is_some() && !request.overwrite {
                    continue;
                }
                let (Some(text), Some(spec)) =
                    (request.source.value(field), target_store.field_spec(field))
                else {
                    continue;
                };

                let outcome = self
                    .translate_field(GenerationRequest {
                        mode: GenerationMode::Translate,
                        text: text.to_string(),
                        source_locale: source_locale.clone(),
                        target_locale: locale.clone(),
                        field,
                        max_len: spec.max_len,
                        unit: spec.unit,
                        context: context.clone(),
                    })
                    .await;

                match outcome {
                    Ok(translation) => {
                        if let Some(from_length) = translation.shortened_from {
                            summary.shortened += 1;
                            emit(
                                &events,
                                TranslationEvent::FieldShortened {
                                    locale: locale.clone(),
                                    field,
                                    from_length,
                                    to_length: translation.length,
                                },
                            )
                            .await;
                        }
                        emit(
                            &events,
                            TranslationEvent::FieldTranslated {
                                locale: locale.clone(),
                                field,
                                text: translation.text.clone(),
                                length: translation.length,
                                max_len: spec.max_len,
                            },
                        )
                        .await;
                        if field.is_title() {
                            context.app_title = Some(translation.text.clone());
                        }
                        translated += 1;
                        summary.translated += 1;
                        summary.translations.push(TranslatedField {
                            store: target_store,
                            locale: locale.clone(),
                            field,
                            old_value,
                            new_value: translation.text,
                        });
                    }
                    Err(error) => {
                        tracing::warn!(
                            locale = %locale,
                            field = %field,
                            "Field translation failed: {}",
                            error
                        );
                        failed += 1;
                        summary.failed += 1;
                        emit(
                            &events,
                            TranslationEvent::FieldError {
                                locale: locale.clone(),
                                field,
                                error: error.to_string(),
                            },
                        )
                        .await;
                        if request.strict && matches!(error, TranslateError::OverBudget { .. }) {
                            summary.aborted = Some(error.to_string());
                            result = Err(error);
                            break 'locales;
                        }
                    }
                }
            }

            summary.locales_done += 1;
            emit(
                &events,
                TranslationEvent::LocaleDone {
                    locale,
                    translated,
                    failed,
                },
            )
            .await;
        }

        tracing::info!(
            translated = summary.translated,
            shortened = summary.shortened,
            failed = summary.failed,
            skipped = summary.locales_skipped,
            "Translation batch finished"
        );
        emit(
            &events,
            TranslationEvent::Done {
                summary: summary.clone(),
            },
        )
        .await;

        result.map(|()| summary)
    }

    /// Run a batch in the background and stream its events.
    pub fn spawn_batch(&self, request: BatchRequest) -> ReceiverStream<TranslationEvent> {
        let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
        let translator = self.clone();
        tokio::spawn(async move {
            if let Err(error) = translator.run_batch(request, sender).await {
                tracing::warn!("Translation batch aborted: {}", error);
            }
        });
        ReceiverStream::new(receiver)
    }
}

/// Requested fields both stores define, name first.
fn batch_fields(request: &BatchRequest) -> Vec<Field> {
    let shared = crate::models::shared_fields(request.source.store, request.target_store);
    let mut fields: Vec<Field> = if request.fields.is_empty() {
        shared
    } else {
        request
            .fields
            .iter()
            .copied()
            .filter(|field| shared.contains(field))
            .collect()
    };
    fields.sort();
    fields.dedup();
    fields
}

fn skip_reason(
    request: &BatchRequest,
    locale: &str,
    fields: &[Field],
    existing: Option<&LocaleDetail>,
) -> Option<String> {
    if !is_supported(locale, request.target_store) {
        return Some(format!("{} does not support {locale}", request.target_store));
    }
    if request.source.store == request.target_store && request.source.locale == locale {
        return Some("target is the source locale".to_string());
    }
    if !fields.iter().any(|field| request.source.has_value(*field)) {
        return Some("source has no text to translate".to_string());
    }
    let already_done = existing.is_some_and(|detail| {
        fields
            .iter()
            .filter(|field| request.source.has_value(**field))
            .all(|field| detail.has_value(*field))
    });
    if already_done && !request.overwrite {
        return Some("already translated".to_string());
    }
    None
}

async fn emit(events: &mpsc::Sender<TranslationEvent>, event: TranslationEvent) {
    if events.send(event).await.is_err() {
        tracing::debug!("Translation event receiver dropped");
    }
}
