//! GitHub REST client for commit statuses and releases.

use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

use super::types::{
    CommitRef, CommitState, NewRelease, ReleaseHandle, StatusHandle, StatusRequest,
};
use crate::error::GitHubError;

/// GitHub REST API base URL.
const GITHUB_API_BASE: &str = "https://api.github.com";

/// API version pinned in every request.
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Records build progress against commits.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Resolves a branch, tag or abbreviated SHA to a full commit SHA.
    async fn resolve_commit(&self, repository: &str, git_ref: &str) -> Result<String, GitHubError>;

    /// Creates a status for `commit` under `context`.
    async fn create_status(
        &self,
        repository: &str,
        commit: &str,
        state: CommitState,
        context: &str,
    ) -> Result<StatusHandle, GitHubError>;

    /// Transitions an existing status.
    async fn update_status(
        &self,
        handle: &StatusHandle,
        state: CommitState,
        description: &str,
    ) -> Result<(), GitHubError>;
}

/// Creates releases and attaches assets to them.
#[async_trait]
pub trait ReleasePublisher: Send + Sync {
    async fn create_release(
        &self,
        repository: &str,
        release: &NewRelease,
    ) -> Result<ReleaseHandle, GitHubError>;

    /// Finds a release (drafts included) by tag.
    async fn find_release(
        &self,
        repository: &str,
        tag: &str,
    ) -> Result<Option<ReleaseHandle>, GitHubError>;

    async fn upload_release_asset(
        &self,
        release: &ReleaseHandle,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), GitHubError>;
}

/// Client for the GitHub REST API.
///
/// # Example
///
/// ```ignore
/// use yamon_ci::github::{CommitState, GitHubClient, StatusReporter};
///
/// let client = GitHubClient::new("ghp_xxxxx")?;
/// let status = client
///     .create_status("b1naryth1ef/yamon", "abc123", CommitState::Pending, "yamon-agent-linux-amd64")
///     .await?;
/// client.update_status(&status, CommitState::Success, "12.3 MB").await?;
/// ```
#[derive(Debug, Clone)]
pub struct GitHubClient {
    /// HTTP client for API requests.
    http_client: Client,
    /// Personal access or installation token.
    token: String,
    /// API base URL, overridable for GitHub Enterprise.
    api_base: String,
}

impl GitHubClient {
    /// Creates a client for api.github.com.
    pub fn new(token: impl Into<String>) -> Result<Self, GitHubError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("yamon-ci/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client,
            token: token.into(),
            api_base: GITHUB_API_BASE.to_string(),
        })
    }

    /// Overrides the API base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .bearer_auth(&self.token)
    }

    async fn post_status(
        &self,
        repository: &str,
        commit: &str,
        body: &StatusRequest<'_>,
    ) -> Result<(), GitHubError> {
        let url = format!("{}/repos/{}/statuses/{}", self.api_base, repository, commit);
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(body)
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }
}

/// Maps non-2xx responses to [`GitHubError::ApiError`].
async fn check_response(response: Response) -> Result<Response, GitHubError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(GitHubError::ApiError {
        code: status.as_u16(),
        message,
    })
}

#[async_trait]
impl StatusReporter for GitHubClient {
    async fn resolve_commit(&self, repository: &str, git_ref: &str) -> Result<String, GitHubError> {
        let url = format!(
            "{}/repos/{}/commits/{}",
            self.api_base,
            repository,
            urlencoding::encode(git_ref)
        );
        let response = self.request(reqwest::Method::GET, &url).send().await?;
        let commit: CommitRef = check_response(response).await?.json().await?;
        debug!(repository, git_ref, sha = %commit.sha, "Resolved commit");
        Ok(commit.sha)
    }

    async fn create_status(
        &self,
        repository: &str,
        commit: &str,
        state: CommitState,
        context: &str,
    ) -> Result<StatusHandle, GitHubError> {
        let body = StatusRequest {
            state,
            context,
            description: None,
        };
        self.post_status(repository, commit, &body).await?;
        debug!(repository, commit, context, %state, "Created commit status");

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
        let body = StatusRequest {
            state,
            context: &handle.context,
            description: Some(description),
        };
        self.post_status(&handle.repository, &handle.commit, &body)
            .await?;
        debug!(context = %handle.context, %state, description, "Updated commit status");
        Ok(())
    }
}

#[async_trait]
impl ReleasePublisher for GitHubClient {
    async fn create_release(
        &self,
        repository: &str,
        release: &NewRelease,
    ) -> Result<ReleaseHandle, GitHubError> {
        let url = format!("{}/repos/{}/releases", self.api_base, repository);
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(release)
            .send()
            .await?;
        let handle: ReleaseHandle = check_response(response).await?.json().await?;
        debug!(repository, tag = %handle.tag, id = handle.id, "Created release");
        Ok(handle)
    }

    async fn find_release(
        &self,
        repository: &str,
        tag: &str,
    ) -> Result<Option<ReleaseHandle>, GitHubError> {
        let url = format!(
            "{}/repos/{}/releases?per_page=100",
            self.api_base, repository
        );
        let response = self.request(reqwest::Method::GET, &url).send().await?;
        let releases: Vec<ReleaseHandle> = check_response(response).await?.json().await?;
        Ok(releases.into_iter().find(|release| release.tag == tag))
    }

    async fn upload_release_asset(
        &self,
        release: &ReleaseHandle,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), GitHubError> {
        if !release.upload_url.starts_with("http") {
            return Err(GitHubError::InvalidUploadUrl(release.upload_url.clone()));
        }
        let url = release.asset_upload_url(name);
        let size = bytes.len();
        let response = self
            .request(reqwest::Method::POST, &url)
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await?;
        check_response(response).await?;
        debug!(tag = %release.tag, asset = name, size, "Uploaded release asset");
        Ok(())
    }
}
