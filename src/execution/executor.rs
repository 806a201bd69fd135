//! Docker-backed [`ContainerExecutor`].

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::docker_client::{ContainerConfig, DockerClient};
use super::{ContainerExecutor, ImageHandle, RunResult, RunSpec};
use crate::config::BuildEnvironment;
use crate::error::DockerError;

/// Repository name of locally built toolchain images.
const IMAGE_REPOSITORY: &str = "yamon-ci-build";

/// Content-addressed tag for a Dockerfile.
pub fn image_tag(dockerfile: &str) -> String {
    let digest = Sha256::digest(dockerfile.as_bytes());
    format!("{}:{}", IMAGE_REPOSITORY, &hex::encode(digest)[..16])
}

/// Runs builds in containers on the local Docker daemon.
///
/// Image builds are serialized and cached by Dockerfile hash, so concurrent
/// tasks asking for the same environment share one image.
pub struct DockerExecutor {
    client: DockerClient,
    images: Mutex<HashMap<String, ImageHandle>>,
    run_timeout: Option<Duration>,
}

impl DockerExecutor {
    /// Connects to the local Docker daemon.
    pub fn new() -> Result<Self, DockerError> {
        Ok(Self::with_client(DockerClient::new()?))
    }

    pub fn with_client(client: DockerClient) -> Self {
        Self {
            client,
            images: Mutex::new(HashMap::new()),
            run_timeout: None,
        }
    }

    /// Limits how long a single container run may take.
    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    async fn run_container(&self, id: &str) -> Result<RunResult, DockerError> {
        self.client.start_container(id).await?;

        let exit_code = match self.run_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.client.wait_container(id))
                .await
                .map_err(|_| DockerError::Timeout {
                    seconds: timeout.as_secs(),
                })??,
            None => self.client.wait_container(id).await?,
        };

        let logs = self.client.get_logs(id).await?;
        Ok(RunResult { exit_code, logs })
    }
}

#[async_trait]
impl ContainerExecutor for DockerExecutor {
    async fn build_image(&self, environment: &BuildEnvironment) -> Result<ImageHandle, DockerError> {
        let tag = image_tag(&environment.dockerfile);

        let mut images = self.images.lock().await;
        if let Some(image) = images.get(&tag) {
            return Ok(image.clone());
        }

        if !self.client.image_exists(&tag).await {
            info!(image = %tag, "Building toolchain image");
            self.client
                .build_image(&tag, &environment.dockerfile)
                .await?;
        }

        let image = ImageHandle { tag: tag.clone() };
        images.insert(tag, image.clone());
        Ok(image)
    }

    async fn run(&self, spec: &RunSpec) -> Result<RunResult, DockerError> {
        let host_dir = std::fs::canonicalize(&spec.host_dir)?;
        let output_dir = std::fs::canonicalize(&spec.output_dir)?;
        let name = format!(
            "{}-{}-{}",
            IMAGE_REPOSITORY,
            spec.name,
            &Uuid::new_v4().simple().to_string()[..8]
        );

        let config = ContainerConfig::new(&name, &spec.image.tag)
            .with_shell_command(&spec.command)
            .with_env(spec.env.clone())
            .with_working_dir(&spec.workdir)
            .with_volumes(vec![
                format!("{}:{}:ro", host_dir.display(), spec.workdir),
                format!("{}:{}", output_dir.display(), spec.output_mount),
            ]);

        let id = self.client.create_container(config).await?;
        let result = self.run_container(&id).await;

        if let Err(e) = self.client.remove_container(&id).await {
            warn!(container = %name, error = %e, "Failed to remove build container");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_tag_is_content_addressed() {
        let a = image_tag("FROM golang:1.22-bullseye\n");
        let b = image_tag("FROM golang:1.22-bullseye\n");
        let c = image_tag("FROM golang:1.23-bookworm\n");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("yamon-ci-build:"));
        assert_eq!(a.len(), "yamon-ci-build:".len() + 16);
    }
}
