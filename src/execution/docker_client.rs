//! Docker API wrapper using the bollard crate.
//!
//! This module provides the low-level Docker operations a build needs:
//! building the toolchain image, and the create/start/wait/logs/remove
//! lifecycle of a build container.

use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::BuildImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use tracing::debug;

use crate::error::DockerError;

/// Configuration for creating a build container.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Unique name for the container.
    pub name: String,
    /// Image to run.
    pub image: String,
    /// Command to run in the container.
    pub cmd: Option<Vec<String>>,
    /// Environment variables (`KEY=value`).
    pub env: Vec<String>,
    /// Working directory inside the container.
    pub working_dir: Option<String>,
    /// Bind mounts (`host:container` format).
    pub volumes: Vec<String>,
}

impl ContainerConfig {
    /// Creates a new container configuration with the given name and image.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            cmd: None,
            env: Vec::new(),
            working_dir: None,
            volumes: Vec::new(),
        }
    }

    /// Runs `command` through `sh -c`.
    pub fn with_shell_command(mut self, command: &str) -> Self {
        self.cmd = Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            command.to_string(),
        ]);
        self
    }

    /// Adds environment variables.
    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    /// Sets the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds volume mounts.
    pub fn with_volumes(mut self, volumes: Vec<String>) -> Self {
        self.volumes = volumes;
        self
    }
}

/// Packs a Dockerfile into the tar build context the daemon expects.
pub fn dockerfile_context(dockerfile: &str) -> Result<Vec<u8>, DockerError> {
    let bytes = dockerfile.as_bytes();
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, "Dockerfile", bytes)?;
    Ok(builder.into_inner()?)
}

/// Docker client wrapper for build operations.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Creates a new Docker client connecting to the local Docker daemon.
    ///
    /// # Errors
    ///
    /// Returns `DockerError::DaemonUnavailable` if the Docker daemon is not accessible.
    pub fn new() -> Result<Self, DockerError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DockerError::DaemonUnavailable(format!("Failed to connect: {e}")))?;

        Ok(Self { docker })
    }

    /// Creates a new Docker client from an existing bollard Docker instance.
    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }

    /// Checks if an image exists locally.
    pub async fn image_exists(&self, image: &str) -> bool {
        self.docker.inspect_image(image).await.is_ok()
    }

    /// Builds an image from Dockerfile contents and tags it as `tag`.
    pub async fn build_image(&self, tag: &str, dockerfile: &str) -> Result<(), DockerError> {
        let context = dockerfile_context(dockerfile)?;
        let options = BuildImageOptions {
            dockerfile: "Dockerfile",
            t: tag,
            rm: true,
            ..Default::default()
        };

        let mut stream = self
            .docker
            .build_image(options, None, Some(context.into()));

        while let Some(result) = stream.next().await {
            let info = result
                .map_err(|e| DockerError::BuildFailed(format!("Failed to build image: {e}")))?;
            if let Some(error) = info.error {
                return Err(DockerError::BuildFailed(error));
            }
            if let Some(line) = info.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    debug!(image = tag, "{}", line);
                }
            }
        }

        Ok(())
    }

    /// Creates a new container with the given configuration.
    ///
    /// # Returns
    ///
    /// The container ID on success.
    pub async fn create_container(&self, config: ContainerConfig) -> Result<String, DockerError> {
        let host_config = HostConfig {
            binds: if config.volumes.is_empty() {
                None
            } else {
                Some(config.volumes.clone())
            },
            ..Default::default()
        };

        let container_config = Config {
            image: Some(config.image.clone()),
            cmd: config.cmd.clone(),
            env: if config.env.is_empty() {
                None
            } else {
                Some(config.env.clone())
            },
            working_dir: config.working_dir.clone(),
            host_config: Some(host_config),
            tty: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: config.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to create container: {e}")))?;

        Ok(response.id)
    }

    /// Starts a container by ID.
    pub async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to start container: {e}")))?;

        Ok(())
    }

    /// Waits for a container to stop and returns its exit code.
    pub async fn wait_container(&self, id: &str) -> Result<i64, DockerError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports non-zero exits as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(DockerError::RunFailed(format!(
                "Error waiting for container: {e}"
            ))),
            None => Err(DockerError::RunFailed(
                "Container wait returned no result".to_string(),
            )),
        }
    }

    /// Gets combined stdout and stderr logs from a container.
    pub async fn get_logs(&self, id: &str) -> Result<String, DockerError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            timestamps: false,
            ..Default::default()
        };

        let mut logs = self.docker.logs(id, Some(options));
        let mut output = String::new();

        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::StdErr { message }) => {
                    output.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(DockerError::RunFailed(format!("Error reading logs: {e}")));
                }
            }
        }

        Ok(output)
    }

    /// Removes a container by ID, including its anonymous volumes.
    pub async fn remove_container(&self, id: &str) -> Result<(), DockerError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to remove container: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_config_builder() {
        let config = ContainerConfig::new("yamon-ci-build", "yamon-ci-build:abc")
            .with_shell_command("go build -o out cmd/yamon-agent/main.go")
            .with_env(vec!["GOOS=linux".to_string()])
            .with_working_dir("/src")
            .with_volumes(vec!["/home/ci/yamon:/src".to_string()]);

        let cmd = config.cmd.expect("command set");
        assert_eq!(cmd[0], "sh");
        assert_eq!(cmd[1], "-c");
        assert!(cmd[2].starts_with("go build"));
        assert_eq!(config.env, vec!["GOOS=linux"]);
        assert_eq!(config.working_dir.as_deref(), Some("/src"));
        assert_eq!(config.volumes.len(), 1);
    }

    #[test]
    fn test_dockerfile_context_contains_dockerfile() {
        let dockerfile = "FROM golang:1.22-bullseye\n";
        let context = dockerfile_context(dockerfile).expect("build context");

        let mut archive = tar::Archive::new(context.as_slice());
        let mut entries = archive.entries().expect("entries");
        let mut entry = entries.next().expect("one entry").expect("valid entry");
        assert_eq!(
            entry.path().expect("path").to_string_lossy(),
            "Dockerfile"
        );

        let mut contents = String::new();
        std::io::Read::read_to_string(&mut entry, &mut contents).expect("read entry");
        assert_eq!(contents, dockerfile);
        assert!(entries.next().is_none());
    }
}
