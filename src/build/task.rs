//! The build task: one project, one platform, one artifact.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::invocation::BuildInvocation;
use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::execution::{ContainerExecutor, RunSpec};
use crate::github::{is_commit_sha, CommitState, ReleasePublisher, StatusHandle, StatusReporter};
use crate::latest::LatestChannel;
use crate::metrics;
use crate::platform::Platform;
use crate::utils::format_bytes;

/// Number of log lines kept in execution errors.
const LOG_TAIL_LINES: usize = 20;

/// GitHub rejects status descriptions longer than this.
const MAX_STATUS_DESCRIPTION: usize = 140;

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOutcome {
    pub artifact: String,
    pub platform: Platform,
    pub size_bytes: u64,
    pub published_latest: bool,
    pub release_asset: bool,
}

/// Builds one artifact in a container and reports/publishes it.
///
/// Collaborators other than the executor are optional: without a status
/// reporter builds are untracked, without a latest channel latest uploads
/// are skipped. A requested release upload without a release publisher is
/// an error raised before anything is built.
pub struct BuildTask {
    config: Arc<BuildConfig>,
    executor: Arc<dyn ContainerExecutor>,
    statuses: Option<Arc<dyn StatusReporter>>,
    releases: Option<Arc<dyn ReleasePublisher>>,
    latest: Option<Arc<dyn LatestChannel>>,
}

impl BuildTask {
    pub fn new(config: Arc<BuildConfig>, executor: Arc<dyn ContainerExecutor>) -> Self {
        Self {
            config,
            executor,
            statuses: None,
            releases: None,
            latest: None,
        }
    }

    pub fn with_status_reporter(mut self, statuses: Arc<dyn StatusReporter>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    pub fn with_release_publisher(mut self, releases: Arc<dyn ReleasePublisher>) -> Self {
        self.releases = Some(releases);
        self
    }

    pub fn with_latest_channel(mut self, latest: Arc<dyn LatestChannel>) -> Self {
        self.latest = Some(latest);
        self
    }

    pub fn config(&self) -> &Arc<BuildConfig> {
        &self.config
    }

    /// Builds the artifact described by `invocation`.
    #[instrument(skip_all, fields(project = %invocation.project))]
    pub async fn execute(&self, invocation: &BuildInvocation) -> Result<BuildOutcome, BuildError> {
        let platform = invocation.resolve_platform(&self.config);
        let artifact = self.config.artifact_name(invocation.project, platform);

        if invocation.publish.release().is_some() && self.releases.is_none() {
            return Err(BuildError::ReleaseClientUnavailable { artifact });
        }

        let status = self.begin_status(invocation, &artifact).await;

        metrics::build_started();
        let started = Instant::now();
        let result = self
            .build_and_publish(invocation, platform, &artifact, status.as_ref())
            .await;
        metrics::build_finished(
            invocation.project.as_str(),
            result.is_ok(),
            started.elapsed().as_secs_f64(),
        );

        match &result {
            Ok(outcome) => info!(
                artifact = %outcome.artifact,
                size = outcome.size_bytes,
                duration_ms = started.elapsed().as_millis() as u64,
                "Build completed"
            ),
            Err(e) => {
                warn!(artifact = %artifact, error = %e, "Build failed");
                if self.config.report_failures {
                    self.report_failure(status.as_ref(), e).await;
                }
            }
        }

        result
    }

    /// Creates the pending commit status, if a reporter and commit are known.
    ///
    /// Provenance that is not already a full SHA (a tag, for release builds)
    /// is resolved to the commit it points at first.
    async fn begin_status(
        &self,
        invocation: &BuildInvocation,
        artifact: &str,
    ) -> Option<StatusHandle> {
        let Some(statuses) = &self.statuses else {
            warn!(artifact, "No status reporter; build is untracked");
            return None;
        };
        let Some(provenance) = &invocation.provenance else {
            warn!(artifact, "No commit for build; build is untracked");
            return None;
        };

        let repository = &self.config.repository;
        let commit = if is_commit_sha(&provenance.git_ref) {
            provenance.git_ref.clone()
        } else {
            match statuses.resolve_commit(repository, &provenance.git_ref).await {
                Ok(sha) => sha,
                Err(e) => {
                    warn!(
                        artifact,
                        git_ref = %provenance.git_ref,
                        error = %e,
                        "Failed to resolve commit; continuing untracked"
                    );
                    return None;
                }
            }
        };

        match statuses
            .create_status(repository, &commit, CommitState::Pending, artifact)
            .await
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(artifact, error = %e, "Failed to create commit status; continuing untracked");
                None
            }
        }
    }

    async fn build_and_publish(
        &self,
        invocation: &BuildInvocation,
        platform: Platform,
        artifact: &str,
        status: Option<&StatusHandle>,
    ) -> Result<BuildOutcome, BuildError> {
        let environment = &self.config.build_environment;
        let image = self.executor.build_image(environment).await?;

        // Output directory owned by this invocation; removed on drop.
        let scratch = self.scratch_dir(artifact)?;
        let path = scratch.path().join(artifact);

        let spec = RunSpec {
            name: artifact.to_string(),
            command: invocation
                .project
                .build_command(&format!("{}/{}", environment.output_mount, artifact)),
            image,
            env: platform.build_env(),
            host_dir: self.config.workspace.clone(),
            workdir: environment.container_workdir.clone(),
            output_dir: scratch.path().to_path_buf(),
            output_mount: environment.output_mount.clone(),
        };

        info!(artifact, image = %spec.image.tag, platform = %platform, "Starting build");
        let run = self.executor.run(&spec).await?;
        if !run.success() {
            return Err(BuildError::Execution {
                artifact: artifact.to_string(),
                exit_code: run.exit_code,
                log_tail: run.log_tail(LOG_TAIL_LINES),
            });
        }

        let size_bytes = tokio::fs::metadata(&path)
            .await
            .map_err(|source| BuildError::MissingArtifact {
                artifact: artifact.to_string(),
                source,
            })?
            .len();

        if let (Some(statuses), Some(handle)) = (&self.statuses, status) {
            if let Err(e) = statuses
                .update_status(handle, CommitState::Success, &format_bytes(size_bytes))
                .await
            {
                warn!(artifact, error = %e, "Failed to mark commit status successful");
            }
        }

        let mut bytes = None;
        let mut published_latest = false;

        if invocation.publish.publishes_latest() {
            match &self.latest {
                Some(latest) => {
                    let data = tokio::fs::read(&path).await?;
                    latest.upload(artifact, data.clone()).await?;
                    bytes = Some(data);
                    published_latest = true;
                    info!(artifact, "Published to latest channel");
                }
                None => warn!(artifact, "No latest channel configured; skipping latest upload"),
            }
        }

        let mut release_asset = false;
        if let Some(release) = invocation.publish.release() {
            let releases =
                self.releases
                    .as_ref()
                    .ok_or_else(|| BuildError::ReleaseClientUnavailable {
                        artifact: artifact.to_string(),
                    })?;
            let data = match bytes.take() {
                Some(data) => data,
                None => tokio::fs::read(&path).await?,
            };
            releases
                .upload_release_asset(release, artifact, data)
                .await?;
            release_asset = true;
            info!(artifact, tag = %release.tag, "Uploaded release asset");
        }

        if let Some(dir) = &self.config.artifact_dir {
            keep_artifact(&path, dir, artifact).await?;
        }

        Ok(BuildOutcome {
            artifact: artifact.to_string(),
            platform,
            size_bytes,
            published_latest,
            release_asset,
        })
    }

    async fn report_failure(&self, status: Option<&StatusHandle>, error: &BuildError) {
        let (Some(statuses), Some(handle)) = (&self.statuses, status) else {
            return;
        };
        let description: String = error
            .to_string()
            .chars()
            .take(MAX_STATUS_DESCRIPTION)
            .collect();
        if let Err(e) = statuses
            .update_status(handle, CommitState::Failure, &description)
            .await
        {
            warn!(context = %handle.context, error = %e, "Failed to mark commit status failed");
        }
    }

    fn scratch_dir(&self, artifact: &str) -> Result<TempDir, BuildError> {
        let mut builder = tempfile::Builder::new();
        let prefix = format!("{}-", artifact);
        builder.prefix(&prefix);
        let dir = match &self.config.scratch_dir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        debug!(artifact, dir = %dir.path().display(), "Created build output directory");
        Ok(dir)
    }
}

/// Copies a finished artifact into `dir`, replacing any previous copy atomically.
async fn keep_artifact(path: &Path, dir: &Path, artifact: &str) -> Result<(), BuildError> {
    tokio::fs::create_dir_all(dir).await?;
    let partial = dir.join(format!(".{}.{}.partial", artifact, Uuid::new_v4().simple()));
    tokio::fs::copy(path, &partial).await?;
    tokio::fs::rename(&partial, dir.join(artifact)).await?;
    Ok(())
}
