//! GitHub integration: commit statuses and releases.
//!
//! The orchestrator depends only on the [`StatusReporter`] and
//! [`ReleasePublisher`] traits; [`GitHubClient`] implements both against the
//! GitHub REST API.

pub mod client;
pub mod types;

pub use client::{GitHubClient, ReleasePublisher, StatusReporter};
pub use types::{is_commit_sha, CommitState, NewRelease, ReleaseHandle, StatusHandle};
