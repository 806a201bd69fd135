//! yamon-ci: CI build orchestrator for yamon.
//!
//! Receives repository webhook events, builds every (project, platform)
//! variant of yamon inside a containerized Go toolchain, reports per-artifact
//! commit statuses, and publishes artifacts to a latest channel or to a
//! GitHub release.

// Core modules
pub mod build;
pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod github;
pub mod latest;
pub mod matrix;
pub mod metrics;
pub mod platform;
pub mod router;
pub mod scheduler;
pub mod server;
pub mod signature;
pub mod utils;

// Re-export commonly used error types
pub use error::{
    BuildError, ConfigError, DockerError, GitHubError, PublishError, RouterError, SchedulerError,
    SignatureError,
};
