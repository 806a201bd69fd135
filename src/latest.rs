//! Latest-channel publication.
//!
//! The latest channel is a floating, unversioned location holding the most
//! recent build of each artifact from the primary branch.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::PublishError;

/// Upload target keyed by artifact name.
#[async_trait]
pub trait LatestChannel: Send + Sync {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<(), PublishError>;
}

/// Latest channel backed by an HTTP object store accepting `PUT {base}/{key}`.
#[derive(Debug, Clone)]
pub struct HttpLatestChannel {
    http_client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpLatestChannel {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, PublishError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(300))
            .user_agent(concat!("yamon-ci/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// URL an artifact key is uploaded to.
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(key))
    }
}

#[async_trait]
impl LatestChannel for HttpLatestChannel {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<(), PublishError> {
        let url = self.object_url(key);
        let size = bytes.len();

        let mut request = self
            .http_client
            .put(&url)
            .header("Content-Type", "application/octet-stream")
            .body(bytes);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                key: key.to_string(),
                code: status.as_u16(),
                message,
            });
        }

        debug!(key, size, "Uploaded artifact to latest channel");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url() {
        let channel = HttpLatestChannel::new("https://dl.example.com/yamon/latest/", None)
            .expect("channel");
        assert_eq!(
            channel.object_url("yamon-agent-linux-arm64"),
            "https://dl.example.com/yamon/latest/yamon-agent-linux-arm64"
        );
    }
}
