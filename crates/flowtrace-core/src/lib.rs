//! Dataset-run coordinator.
//!
//! Tracks dataset observers, the source→sink association graph between
//! them, and individual run lifecycles, so a downstream dataset can
//! discover fresh upstream data and start exactly once. All coordination
//! happens inside store transactions; see [`Coordinator`] for the
//! operation surface.

#![warn(clippy::pedantic)]

pub mod coordinator;
pub mod error;
mod graph;
mod lifecycle;
mod registry;
mod resolver;

pub use coordinator::Coordinator;
pub use error::{CoordinatorError, Result};
pub use resolver::parse_dependency_check;
