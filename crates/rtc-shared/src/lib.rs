//! Shared data model, error taxonomy, resilience and configuration primitives
//! used by both the RPC client and the controller crates.
//!
//! Nothing in this crate talks to a socket. It exists so the wire-level
//! client (`rtc-client`) and the orchestration logic (the root
//! `remote-task-controller` crate) can agree on the same `TaskStatus`,
//! `TaskInfo`, and error types without either depending on the other.

pub mod config;
pub mod errors;
pub mod model;
pub mod resilience;

pub use errors::{ErrorCode, Failure, RemoteTaskError, RemoteTaskResult};
