//! Database layer for storesync

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{Repository, SqliteRepository};
