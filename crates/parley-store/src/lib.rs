//! # parley-store
//!
//! Durable storage for the Parley messaging core, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection`. Every mutation of a message (append, reaction
//! toggle, deletion) runs in its own transaction, and reactions and
//! per-user deletions are one row each, so concurrent writers on the same
//! message cannot lose each other's updates.

pub mod database;
pub mod deletion;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod reactions;
pub mod users;

mod error;
mod row;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
