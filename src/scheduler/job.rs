//! Job definitions for detached builds.
//!
//! - `Job`: a build invocation queued for detached execution
//! - `JobId`: identifier handed back to the spawner
//! - `JobStatus`: terminal state of a job

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::build::BuildInvocation;

/// Identifier of a spawned job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Terminal state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
    Panicked,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Panicked => write!(f, "panicked"),
        }
    }
}

/// A build invocation queued for detached execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub invocation: BuildInvocation,
    /// When this job was spawned.
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(invocation: BuildInvocation) -> Self {
        Self {
            id: JobId::new(),
            invocation,
            created_at: Utc::now(),
        }
    }

    /// The ref or commit that triggered this job, if any.
    pub fn provenance(&self) -> &str {
        self.invocation
            .provenance
            .as_ref()
            .map(|p| p.git_ref.as_str())
            .unwrap_or("-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::Provenance;
    use crate::platform::Project;

    #[test]
    fn test_job_new() {
        let job = Job::new(
            BuildInvocation::new(Project::Agent).with_provenance(Provenance::new("abc123")),
        );
        assert_eq!(job.provenance(), "abc123");
        assert!(job.created_at <= Utc::now());

        let other = Job::new(BuildInvocation::new(Project::Agent));
        assert_ne!(job.id, other.id);
        assert_eq!(other.provenance(), "-");
    }

    #[test]
    fn test_job_status_display() {
        assert_eq!(JobStatus::Completed.to_string(), "completed");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
        assert_eq!(JobStatus::Panicked.to_string(), "panicked");
    }
}
