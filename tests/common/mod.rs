//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Barrier;

use yamon_ci::build::{BuildInvocation, BuildTask};
use yamon_ci::config::{BuildConfig, BuildEnvironment};
use yamon_ci::error::{DockerError, GitHubError, PublishError, SchedulerError};
use yamon_ci::execution::{ContainerExecutor, ImageHandle, RunResult, RunSpec};
use yamon_ci::github::{
    CommitState, NewRelease, ReleaseHandle, ReleasePublisher, StatusHandle, StatusReporter,
};
use yamon_ci::latest::LatestChannel;
use yamon_ci::scheduler::{JobId, TaskSpawner};

/// Size of the artifact the fake executor writes.
pub const ARTIFACT_SIZE: usize = 1536;

/// Full SHA used as push provenance.
pub const HEAD_COMMIT: &str = "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";

/// Commit the `v2.0.0` tag points at in [`RecordingStatuses::with_tags`].
pub const TAGGED_COMMIT: &str = "6dcb09b5b57875f334f61aebed695e2e4193db5e";

/// Config pointing at a fresh temporary workspace.
pub fn temp_config() -> (TempDir, Arc<BuildConfig>) {
    let dir = tempfile::tempdir().expect("create temp workspace");
    let config = BuildConfig::default().with_workspace(dir.path());
    (dir, Arc::new(config))
}

pub fn release_handle(tag: &str) -> ReleaseHandle {
    ReleaseHandle {
        id: 42,
        tag: tag.to_string(),
        upload_url: "https://uploads.github.com/repos/b1naryth1ef/yamon/releases/42/assets{?name,label}"
            .to_string(),
    }
}

// ============================================================================
// Container executor
// ============================================================================

/// Executor that "builds" by writing a file named after the container
/// into the run's output directory.
#[derive(Default)]
pub struct FakeExecutor {
    pub images_built: AtomicUsize,
    pub runs: Mutex<Vec<RunSpec>>,
    /// Exit code returned by every run.
    pub exit_code: i64,
    /// Skip writing the artifact even on success.
    pub produce_nothing: bool,
    /// Sizes of successive artifacts; `ARTIFACT_SIZE` once exhausted.
    pub sizes: Mutex<VecDeque<usize>>,
    /// Runs wait here after writing, so every run has written before any returns.
    pub rendezvous: Option<Arc<Barrier>>,
}

impl FakeExecutor {
    pub fn failing(exit_code: i64) -> Self {
        Self {
            exit_code,
            ..Default::default()
        }
    }

    /// Executor whose runs write `sizes` in order and return together.
    pub fn overlapping(sizes: &[usize]) -> Self {
        Self {
            sizes: Mutex::new(sizes.iter().copied().collect()),
            rendezvous: Some(Arc::new(Barrier::new(sizes.len()))),
            ..Default::default()
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}

#[async_trait]
impl ContainerExecutor for FakeExecutor {
    async fn build_image(&self, environment: &BuildEnvironment) -> Result<ImageHandle, DockerError> {
        assert!(environment.dockerfile.starts_with("FROM golang"));
        self.images_built.fetch_add(1, Ordering::SeqCst);
        Ok(ImageHandle {
            tag: "yamon-ci-build:test".to_string(),
        })
    }

    async fn run(&self, spec: &RunSpec) -> Result<RunResult, DockerError> {
        self.runs.lock().unwrap().push(spec.clone());

        if self.exit_code != 0 {
            return Ok(RunResult {
                exit_code: self.exit_code,
                logs: "# command-line-arguments\nundefined: main\n".to_string(),
            });
        }

        if !self.produce_nothing {
            let size = self
                .sizes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ARTIFACT_SIZE);
            std::fs::write(spec.output_dir.join(&spec.name), vec![0u8; size])?;
        }
        if let Some(rendezvous) = &self.rendezvous {
            rendezvous.wait().await;
        }
        Ok(RunResult {
            exit_code: 0,
            logs: String::new(),
        })
    }
}

// ============================================================================
// GitHub
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCall {
    Create {
        commit: String,
        state: CommitState,
        context: String,
    },
    Update {
        commit: String,
        context: String,
        state: CommitState,
        description: String,
    },
}

#[derive(Default)]
pub struct RecordingStatuses {
    pub calls: Mutex<Vec<StatusCall>>,
    /// Refs looked up through `resolve_commit`.
    pub resolved: Mutex<Vec<String>>,
    /// Ref to commit SHA; unknown refs fail to resolve.
    pub refs: HashMap<String, String>,
    pub fail: bool,
}

impl RecordingStatuses {
    pub fn unavailable() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Reporter that knows the `v2.0.0` tag.
    pub fn with_tags() -> Self {
        Self {
            refs: HashMap::from([("v2.0.0".to_string(), TAGGED_COMMIT.to_string())]),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<StatusCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn resolved(&self) -> Vec<String> {
        self.resolved.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusReporter for RecordingStatuses {
    async fn resolve_commit(&self, _repository: &str, git_ref: &str) -> Result<String, GitHubError> {
        self.resolved.lock().unwrap().push(git_ref.to_string());
        self.refs
            .get(git_ref)
            .cloned()
            .ok_or_else(|| GitHubError::ApiError {
                code: 422,
                message: format!("No commit found for SHA: {}", git_ref),
            })
    }

    async fn create_status(
        &self,
        repository: &str,
        commit: &str,
        state: CommitState,
        context: &str,
    ) -> Result<StatusHandle, GitHubError> {
        if self.fail {
            return Err(GitHubError::ApiError {
                code: 503,
                message: "unavailable".to_string(),
            });
        }
        self.calls.lock().unwrap().push(StatusCall::Create {
            commit: commit.to_string(),
            state,
            context: context.to_string(),
        });
        Ok(StatusHandle {
            repository: repository.to_string(),
            commit: commit.to_string(),
            context: context.to_string(),
        })
    }

    async fn update_status(
        &self,
        handle: &StatusHandle,
        state: CommitState,
        description: &str,
    ) -> Result<(), GitHubError> {
        self.calls.lock().unwrap().push(StatusCall::Update {
            commit: handle.commit.clone(),
            context: handle.context.clone(),
            state,
            description: description.to_string(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingReleases {
    pub created: Mutex<Vec<NewRelease>>,
    /// (release id, asset name, asset size)
    pub uploads: Mutex<Vec<(u64, String, usize)>>,
}

impl RecordingReleases {
    pub fn created(&self) -> Vec<NewRelease> {
        self.created.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<(u64, String, usize)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReleasePublisher for RecordingReleases {
    async fn create_release(
        &self,
        _repository: &str,
        release: &NewRelease,
    ) -> Result<ReleaseHandle, GitHubError> {
        self.created.lock().unwrap().push(release.clone());
        Ok(release_handle(&release.tag))
    }

    async fn find_release(
        &self,
        _repository: &str,
        tag: &str,
    ) -> Result<Option<ReleaseHandle>, GitHubError> {
        let created = self.created.lock().unwrap();
        Ok(created
            .iter()
            .find(|release| release.tag == tag)
            .map(|release| release_handle(&release.tag)))
    }

    async fn upload_release_asset(
        &self,
        release: &ReleaseHandle,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), GitHubError> {
        self.uploads
            .lock()
            .unwrap()
            .push((release.id, name.to_string(), bytes.len()));
        Ok(())
    }
}

// ============================================================================
// Latest channel
// ============================================================================

#[derive(Default)]
pub struct RecordingLatest {
    /// (key, size)
    pub uploads: Mutex<Vec<(String, usize)>>,
    pub fail: bool,
}

impl RecordingLatest {
    pub fn uploads(&self) -> Vec<(String, usize)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl LatestChannel for RecordingLatest {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Rejected {
                key: key.to_string(),
                code: 500,
                message: "storage unavailable".to_string(),
            });
        }
        self.uploads
            .lock()
            .unwrap()
            .push((key.to_string(), bytes.len()));
        Ok(())
    }
}

// ============================================================================
// Spawner
// ============================================================================

#[derive(Default)]
pub struct RecordingSpawner {
    pub spawned: Mutex<Vec<BuildInvocation>>,
}

impl RecordingSpawner {
    pub fn spawned(&self) -> Vec<BuildInvocation> {
        self.spawned.lock().unwrap().clone()
    }
}

impl TaskSpawner for RecordingSpawner {
    fn spawn(&self, invocation: BuildInvocation) -> Result<JobId, SchedulerError> {
        self.spawned.lock().unwrap().push(invocation);
        Ok(JobId::new())
    }
}

/// Build task over a fake executor with every optional collaborator set.
pub struct Harness {
    pub workspace: TempDir,
    pub config: Arc<BuildConfig>,
    pub executor: Arc<FakeExecutor>,
    pub statuses: Arc<RecordingStatuses>,
    pub releases: Arc<RecordingReleases>,
    pub latest: Arc<RecordingLatest>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_executor(FakeExecutor::default())
    }

    pub fn with_executor(executor: FakeExecutor) -> Self {
        let (workspace, config) = temp_config();
        Self {
            workspace,
            config,
            executor: Arc::new(executor),
            statuses: Arc::new(RecordingStatuses::with_tags()),
            releases: Arc::new(RecordingReleases::default()),
            latest: Arc::new(RecordingLatest::default()),
        }
    }

    /// Task with no optional collaborators.
    pub fn bare_task(&self) -> BuildTask {
        BuildTask::new(self.config.clone(), self.executor.clone())
    }

    /// Task with statuses, releases and latest channel.
    pub fn full_task(&self) -> BuildTask {
        self.bare_task()
            .with_status_reporter(self.statuses.clone())
            .with_release_publisher(self.releases.clone())
            .with_latest_channel(self.latest.clone())
    }
}
