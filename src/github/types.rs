//! GitHub API data types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a commit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Pending,
    Success,
    Failure,
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitState::Pending => write!(f, "pending"),
            CommitState::Success => write!(f, "success"),
            CommitState::Failure => write!(f, "failure"),
        }
    }
}

/// Identifies a commit status so it can be transitioned later.
///
/// GitHub keeps the latest status per (commit, context), so an update is a
/// new status posted under the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHandle {
    pub repository: String,
    pub commit: String,
    pub context: String,
}

/// Commit object returned by `GET /repos/{repo}/commits/{ref}`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CommitRef {
    pub sha: String,
}

/// Returns true if `git_ref` is a full 40-character commit SHA.
pub fn is_commit_sha(git_ref: &str) -> bool {
    git_ref.len() == 40 && git_ref.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Body of `POST /repos/{repo}/statuses/{sha}`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct StatusRequest<'a> {
    pub state: CommitState,
    pub context: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
}

/// Parameters for creating a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRelease {
    #[serde(rename = "tag_name")]
    pub tag: String,
    pub name: String,
    pub draft: bool,
}

impl NewRelease {
    /// A draft release named after its tag.
    pub fn draft(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self {
            name: tag.clone(),
            tag,
            draft: true,
        }
    }
}

/// Reference to a release assets can be attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseHandle {
    pub id: u64,
    #[serde(alias = "tag_name")]
    pub tag: String,
    /// Hypermedia upload URL, e.g. `.../releases/1/assets{?name,label}`.
    pub upload_url: String,
}

impl ReleaseHandle {
    /// Expands the upload URL template for an asset file name.
    pub fn asset_upload_url(&self, name: &str) -> String {
        let base = match self.upload_url.find('{') {
            Some(idx) => &self.upload_url[..idx],
            None => self.upload_url.as_str(),
        };
        format!("{}?name={}", base, urlencoding::encode(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_upload_url_strips_template() {
        let release = ReleaseHandle {
            id: 1,
            tag: "v1.0.0".to_string(),
            upload_url: "https://uploads.github.com/repos/o/r/releases/1/assets{?name,label}"
                .to_string(),
        };
        assert_eq!(
            release.asset_upload_url("yamon-agent-linux-arm64"),
            "https://uploads.github.com/repos/o/r/releases/1/assets?name=yamon-agent-linux-arm64"
        );
    }

    #[test]
    fn test_release_handle_from_api_response() {
        let body = r#"{
            "id": 42,
            "tag_name": "v2.0.0",
            "name": "v2.0.0",
            "draft": true,
            "upload_url": "https://uploads.github.com/repos/o/r/releases/42/assets{?name,label}"
        }"#;
        let release: ReleaseHandle = serde_json::from_str(body).expect("parse release");
        assert_eq!(release.id, 42);
        assert_eq!(release.tag, "v2.0.0");
    }

    #[test]
    fn test_status_request_omits_missing_description() {
        let body = serde_json::to_value(StatusRequest {
            state: CommitState::Pending,
            context: "yamon-server-linux-amd64",
            description: None,
        })
        .expect("serialize");
        assert_eq!(body["state"], "pending");
        assert!(body.get("description").is_none());
    }

    #[test]
    fn test_is_commit_sha() {
        assert!(is_commit_sha("9fceb02d0ae598e95dc970b74767f19372d61af8"));
        assert!(!is_commit_sha("v2.0.0"));
        assert!(!is_commit_sha("abc123"));
        assert!(!is_commit_sha("refs/heads/main"));
    }

    #[test]
    fn test_commit_ref_from_api_response() {
        let body = r#"{"sha":"9fceb02d0ae598e95dc970b74767f19372d61af8","node_id":"C_x","commit":{}}"#;
        let commit: CommitRef = serde_json::from_str(body).expect("parse commit");
        assert!(is_commit_sha(&commit.sha));
    }

    #[test]
    fn test_new_release_draft() {
        let body = serde_json::to_value(NewRelease::draft("v2.0.0")).expect("serialize");
        assert_eq!(body["tag_name"], "v2.0.0");
        assert_eq!(body["name"], "v2.0.0");
        assert_eq!(body["draft"], true);
    }
}
