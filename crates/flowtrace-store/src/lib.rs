//! `SQLite` session provider and schema for the Flowtrace coordinator.
//!
//! Provides [`SqliteSessionProvider`] (connection ownership modes behind a
//! single `acquire()` interface), the idempotent table DDL, and the
//! store-level error type. Transaction boundaries are owned by the
//! coordinator operations, never by the provider.

#![warn(clippy::pedantic)]

pub mod error;
pub mod schema;
pub mod session;

pub use error::{Result, StoreError};
pub use session::{Session, SqliteSessionProvider};
