//! storesync-core - Core library for storesync
//!
//! This crate contains the locale catalog, snapshot model, diff engine,
//! translation pipeline, change queue, apply engine, job runner, and the
//! repository used to keep App Store Connect and Google Play listings in sync.

pub mod apply;
pub mod config;
pub mod db;
pub mod diff;
pub mod error;
pub mod jobs;
pub mod locale;
pub mod models;
pub mod queue;
pub mod storefront;
pub mod translate;
pub mod util;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
pub use models::{Field, FieldSpec, LocaleDetail, Snapshot, Store, Unit};
