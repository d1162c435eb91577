//! tagsync - tag/task association engine
//!
//! This library provides the core functionality for the tagsync CLI tool:
//! attaching user-defined tags to tasks and leaving a per-row change trail
//! that a sync client can upload.
//!
//! # Core Concepts
//!
//! - **Tags**: uniquely named (ignoring case) labels with a stable uuid
//! - **Links**: task/tag associations, soft-deleted with a tombstone
//! - **Synchronize**: minimal-diff reconciliation of a task's tag set
//! - **Change records**: one record per row written, for sync
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `.tagsync.toml`
//! - `error`: Error types and result aliases
//! - `model`: Tasks, tags and links
//! - `query`: Criteria used to select rows
//! - `store`: Row storage behind the `TagStore` trait
//! - `changes`: Change records and recorders
//! - `tags`: The tag engine (`TagService`)
//! - `palette`: Default tag images
//! - `storage`: File storage and directory management
//! - `lock`: File locking and atomic operations for concurrency safety

pub mod changes;
pub mod cli;
pub mod config;
pub mod error;
pub mod lock;
pub mod model;
pub mod output;
pub mod palette;
pub mod query;
pub mod storage;
pub mod store;
pub mod tags;

pub use error::{Error, Result};
