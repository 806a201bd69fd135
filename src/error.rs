//! Error types for yamon-ci operations.
//!
//! Defines error types for each subsystem:
//! - Configuration loading and validation
//! - Docker image builds and container runs
//! - GitHub commit statuses and releases
//! - Latest-channel uploads
//! - Build tasks, the task runner and the event router
//! - Webhook signature verification

use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Build matrix is empty")]
    EmptyMatrix,

    #[error("Duplicate matrix entry: {0}")]
    DuplicateEntry(String),

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Invalid platform '{0}': expected '<os>/<arch>'")]
    InvalidPlatform(String),

    #[error("Unknown project '{0}'")]
    UnknownProject(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur during Docker operations.
#[derive(Debug, Error)]
pub enum DockerError {
    #[error("Docker build failed: {0}")]
    BuildFailed(String),

    #[error("Docker run failed: {0}")]
    RunFailed(String),

    #[error("Container execution timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Docker daemon not available: {0}")]
    DaemonUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by the GitHub API client.
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("GitHub API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse GitHub response: {0}")]
    ParseError(String),

    #[error("Invalid release upload URL: {0}")]
    InvalidUploadUrl(String),
}

impl From<reqwest::Error> for GitHubError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GitHubError::ParseError(err.to_string())
        } else {
            GitHubError::RequestFailed(err.to_string())
        }
    }
}

/// Errors returned by the latest-channel uploader.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Upload of '{key}' rejected ({code}): {message}")]
    Rejected {
        key: String,
        code: u16,
        message: String,
    },
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        PublishError::RequestFailed(err.to_string())
    }
}

/// Errors that can occur while executing a build task.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Release upload requested for '{artifact}' but no GitHub client is available")]
    ReleaseClientUnavailable { artifact: String },

    #[error("Build of '{artifact}' exited with code {exit_code}: {log_tail}")]
    Execution {
        artifact: String,
        exit_code: i64,
        log_tail: String,
    },

    #[error("Artifact '{artifact}' missing after build: {source}")]
    MissingArtifact {
        artifact: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Docker(#[from] DockerError),

    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur in the task runner.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Task runner is shut down")]
    ShutDown,

    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(std::time::Duration),
}

/// Errors from webhook signature verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Missing X-Hub-Signature-256 header")]
    Missing,

    #[error("Malformed signature header: {0}")]
    Malformed(String),

    #[error("Signature does not match payload")]
    Mismatch,
}

/// Errors that can occur while routing a webhook event.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Release requested for '{tag}' but no GitHub client is available")]
    ReleaseClientUnavailable { tag: String },

    #[error("Failed to decode '{kind}' event: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_display() {
        let err = BuildError::ReleaseClientUnavailable {
            artifact: "yamon-agent-linux-arm64".to_string(),
        };
        assert!(err.to_string().contains("yamon-agent-linux-arm64"));
        assert!(err.to_string().contains("no GitHub client"));

        let err = BuildError::Execution {
            artifact: "yamon-server-linux-amd64".to_string(),
            exit_code: 2,
            log_tail: "undefined: foo".to_string(),
        };
        assert!(err.to_string().contains("code 2"));
        assert!(err.to_string().contains("undefined: foo"));
    }

    #[test]
    fn test_transparent_conversions() {
        let err: BuildError = DockerError::Timeout { seconds: 60 }.into();
        assert_eq!(
            err.to_string(),
            "Container execution timed out after 60 seconds"
        );

        let err: RouterError = SchedulerError::ShutDown.into();
        assert_eq!(err.to_string(), "Task runner is shut down");
    }
}
