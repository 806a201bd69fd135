//! Container execution layer for builds.
//!
//! The build task talks to the [`ContainerExecutor`] trait: build (or reuse)
//! the toolchain image, then run one command in a fresh container. The
//! source checkout is mounted read-only; each run gets its own writable
//! output directory so concurrent builds never see each other's files.
//!
//! # Example
//!
//! ```ignore
//! use yamon_ci::config::BuildEnvironment;
//! use yamon_ci::execution::{ContainerExecutor, DockerExecutor, RunSpec};
//!
//! let executor = DockerExecutor::new()?;
//! let image = executor.build_image(&BuildEnvironment::default()).await?;
//! let result = executor
//!     .run(&RunSpec {
//!         name: "yamon-agent-linux-amd64".into(),
//!         command: "go build -o /out/yamon-agent-linux-amd64 cmd/yamon-agent/main.go".into(),
//!         image,
//!         env: vec!["GOOS=linux".into(), "GOARCH=amd64".into()],
//!         host_dir: ".".into(),
//!         workdir: "/src".into(),
//!         output_dir: "/tmp/yamon-ci-build-1".into(),
//!         output_mount: "/out".into(),
//!     })
//!     .await?;
//! ```

pub mod docker_client;
pub mod executor;

use async_trait::async_trait;
use std::path::PathBuf;

use crate::config::BuildEnvironment;
use crate::error::DockerError;

pub use docker_client::DockerClient;
pub use executor::DockerExecutor;

/// A built toolchain image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    pub tag: String,
}

/// One command to run in a build container.
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Short name used to label the container.
    pub name: String,
    /// Shell command line.
    pub command: String,
    pub image: ImageHandle,
    /// Environment variables (`KEY=value`).
    pub env: Vec<String>,
    /// Source checkout mounted read-only at `workdir`.
    pub host_dir: PathBuf,
    /// Mount point and working directory inside the container.
    pub workdir: String,
    /// Host directory owned by this run, mounted writable at `output_mount`.
    pub output_dir: PathBuf,
    pub output_mount: String,
}

/// Outcome of a container run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub exit_code: i64,
    pub logs: String,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last `lines` lines of the container output.
    pub fn log_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.logs.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// Builds toolchain images and runs build commands in containers.
///
/// Implementations must be safe to use from many concurrent tasks, including
/// concurrent requests for the same image.
#[async_trait]
pub trait ContainerExecutor: Send + Sync {
    async fn build_image(&self, environment: &BuildEnvironment) -> Result<ImageHandle, DockerError>;

    async fn run(&self, spec: &RunSpec) -> Result<RunResult, DockerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_result_log_tail() {
        let result = RunResult {
            exit_code: 1,
            logs: "one\ntwo\nthree\nfour\n".to_string(),
        };
        assert!(!result.success());
        assert_eq!(result.log_tail(2), "three\nfour");
        assert_eq!(result.log_tail(10), "one\ntwo\nthree\nfour");
    }
}
