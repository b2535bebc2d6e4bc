//! Shared data structures and pure helpers for the campaign orchestrator.
//!
//! This crate contains the data model (`UniversePoint`, `TaskSpec`,
//! `TaskState`), the typed error enums used across the `worker` and
//! `coordinator` crates, and a handful of small, pure, self-contained
//! modules (`merge`, `paramspace`, `cluster`, `registry`) that the
//! coordinator's config pipeline and task submission are built on.

pub mod cluster;
pub mod error;
pub mod merge;
pub mod model;
pub mod paramspace;
pub mod registry;

pub use model::{TaskSpec, TaskState, TerminalStatus, UniversePoint};

/// Result type alias used throughout this crate.
pub type Result<T> = anyhow::Result<T>;
