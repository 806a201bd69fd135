//! Task invocation layer.
//!
//! Two ways to run a build:
//!
//! - **Inline** ([`TaskRunner::call`], [`TaskRunner::call_all`]): the caller
//!   awaits the build and receives its result or error.
//! - **Detached** ([`TaskSpawner::spawn`]): the job is handed to a dispatcher
//!   and the caller returns immediately with a [`JobId`].
//!
//! ```text
//!   EventRouter ──spawn──▶ channel ──▶ dispatcher ──▶ JoinSet
//!                                                     ├─ job 1
//!                                                     ├─ job 2
//!                                                     └─ job N
//! ```
//!
//! Jobs are spawned in call order; completion order is unspecified. Nothing
//! is retried or persisted.

pub mod job;
pub mod runner;

pub use job::{Job, JobId, JobStatus};
pub use runner::{RunnerConfig, RunnerStats, TaskRunner, TaskSpawner};
