//! Data models for storesync

mod field;
mod job;
mod snapshot;
mod store;

pub use field::{shared_fields, Field, FieldSpec, Unit};
pub use job::{JobId, JobLogLine, JobPayload, JobStatus, NewJob, StoreScope, SyncJob};
pub use snapshot::{LocaleDetail, Snapshot};
pub use store::Store;
