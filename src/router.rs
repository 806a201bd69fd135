//! Webhook event routing.
//!
//! Maps repository events onto matrix fan-outs:
//!
//! | Event                                   | Action                                  |
//! |-----------------------------------------|-----------------------------------------|
//! | push with head commit                   | build all; latest iff primary branch    |
//! | create, `ref_type == "tag"`, prefixed   | draft release, build all into it        |
//! | anything else                           | ignored                                 |

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::build::{Provenance, PublishIntent};
use crate::config::BuildConfig;
use crate::error::RouterError;
use crate::github::{NewRelease, ReleaseHandle, ReleasePublisher};
use crate::matrix::Trigger;
use crate::metrics;
use crate::scheduler::{JobId, TaskSpawner};

/// Head commit of a push.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeadCommit {
    pub id: String,
}

/// Push event payload (fields used for routing only).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Absent when a branch is deleted.
    #[serde(default)]
    pub head_commit: Option<HeadCommit>,
}

/// Create event payload (fields used for routing only).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateEvent {
    pub ref_type: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

/// A decoded webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    Push(PushEvent),
    Create(CreateEvent),
    Ping,
    /// Any other event kind, kept by name.
    Other(String),
}

impl WebhookEvent {
    /// Decodes a delivery given its `X-GitHub-Event` kind and JSON body.
    pub fn from_delivery(kind: &str, body: &[u8]) -> Result<Self, RouterError> {
        let decode_error = |source| RouterError::Decode {
            kind: kind.to_string(),
            source,
        };

        match kind {
            "push" => serde_json::from_slice(body)
                .map(WebhookEvent::Push)
                .map_err(decode_error),
            "create" => serde_json::from_slice(body)
                .map(WebhookEvent::Create)
                .map_err(decode_error),
            "ping" => Ok(WebhookEvent::Ping),
            other => Ok(WebhookEvent::Other(other.to_string())),
        }
    }

    /// Event kind as sent in the `X-GitHub-Event` header.
    pub fn kind(&self) -> &str {
        match self {
            WebhookEvent::Push(_) => "push",
            WebhookEvent::Create(_) => "create",
            WebhookEvent::Ping => "ping",
            WebhookEvent::Other(kind) => kind,
        }
    }
}

/// What routing an event did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteOutcome {
    /// Release created for a tag event.
    pub release: Option<ReleaseHandle>,
    /// Jobs spawned, in matrix order.
    pub jobs: Vec<JobId>,
}

impl RouteOutcome {
    /// Returns true if the event triggered nothing.
    pub fn is_ignored(&self) -> bool {
        self.release.is_none() && self.jobs.is_empty()
    }
}

/// Applies trigger policy to webhook events.
pub struct EventRouter {
    config: Arc<BuildConfig>,
    spawner: Arc<dyn TaskSpawner>,
    releases: Option<Arc<dyn ReleasePublisher>>,
}

impl EventRouter {
    pub fn new(
        config: Arc<BuildConfig>,
        spawner: Arc<dyn TaskSpawner>,
        releases: Option<Arc<dyn ReleasePublisher>>,
    ) -> Self {
        Self {
            config,
            spawner,
            releases,
        }
    }

    /// Routes one event, spawning builds and creating a release as needed.
    pub async fn route(&self, event: &WebhookEvent) -> Result<RouteOutcome, RouterError> {
        let result = match event {
            WebhookEvent::Push(push) => self.route_push(push),
            WebhookEvent::Create(create) => self.route_create(create).await,
            WebhookEvent::Ping | WebhookEvent::Other(_) => Ok(RouteOutcome::default()),
        };

        let action = match &result {
            Ok(outcome) if outcome.release.is_some() => "release",
            Ok(outcome) if !outcome.jobs.is_empty() => "build",
            Ok(_) => "ignored",
            Err(_) => "error",
        };
        metrics::webhook_event(event.kind(), action);
        debug!(kind = event.kind(), action, "Routed webhook event");

        result
    }

    fn route_push(&self, push: &PushEvent) -> Result<RouteOutcome, RouterError> {
        let Some(head_commit) = &push.head_commit else {
            debug!(git_ref = %push.git_ref, "Push without head commit; ignoring");
            return Ok(RouteOutcome::default());
        };

        let latest = push.git_ref == self.config.primary_branch_ref;
        let trigger = Trigger::new(
            PublishIntent::from_parts(latest, None),
            Some(Provenance::new(&head_commit.id)),
        );

        info!(
            git_ref = %push.git_ref,
            commit = %head_commit.id,
            latest,
            "Building push"
        );
        let jobs = self.spawn_all(&trigger)?;

        Ok(RouteOutcome { release: None, jobs })
    }

    async fn route_create(&self, create: &CreateEvent) -> Result<RouteOutcome, RouterError> {
        if create.ref_type != "tag" || !create.git_ref.starts_with(&self.config.release_prefix) {
            debug!(
                ref_type = %create.ref_type,
                git_ref = %create.git_ref,
                "Create event is not a release tag; ignoring"
            );
            return Ok(RouteOutcome::default());
        }

        let releases = self
            .releases
            .as_ref()
            .ok_or_else(|| RouterError::ReleaseClientUnavailable {
                tag: create.git_ref.clone(),
            })?;

        let release = releases
            .create_release(&self.config.repository, &NewRelease::draft(&create.git_ref))
            .await?;
        info!(tag = %release.tag, release_id = release.id, "Created draft release");

        let trigger = Trigger::new(
            PublishIntent::Release(release.clone()),
            Some(Provenance::new(&create.git_ref)),
        );
        let jobs = self.spawn_all(&trigger)?;

        Ok(RouteOutcome {
            release: Some(release),
            jobs,
        })
    }

    fn spawn_all(&self, trigger: &Trigger) -> Result<Vec<JobId>, RouterError> {
        self.config
            .matrix()
            .expand(trigger)
            .into_iter()
            .map(|invocation| self.spawner.spawn(invocation).map_err(RouterError::from))
            .collect()
    }
}
