//! Shared model types for the Flowtrace dataset-run coordinator.
//!
//! Pure data types used by the store and coordinator crates: identifier
//! newtypes, status enums, dependency policies, and the record structs
//! persisted to the relational store. Kept in a leaf crate so store and
//! core can share them without circular dependencies.

#![warn(clippy::pedantic)]

pub mod dependency;
pub mod ids;
pub mod observer;
pub mod run;
