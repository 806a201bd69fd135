//! Build task invocation records.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::BuildConfig;
use crate::github::ReleaseHandle;
use crate::platform::{Platform, Project};

/// What to do with an artifact once it has been built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "release", rename_all = "snake_case")]
pub enum PublishIntent {
    /// Build only.
    #[default]
    None,
    /// Upload to the latest channel.
    Latest,
    /// Attach to a draft release.
    Release(ReleaseHandle),
    /// Upload to the latest channel and attach to a release.
    LatestAndRelease(ReleaseHandle),
}

impl PublishIntent {
    /// Combines the two publication flags into an intent.
    pub fn from_parts(latest: bool, release: Option<ReleaseHandle>) -> Self {
        match (latest, release) {
            (false, None) => PublishIntent::None,
            (true, None) => PublishIntent::Latest,
            (false, Some(release)) => PublishIntent::Release(release),
            (true, Some(release)) => PublishIntent::LatestAndRelease(release),
        }
    }

    pub fn publishes_latest(&self) -> bool {
        matches!(
            self,
            PublishIntent::Latest | PublishIntent::LatestAndRelease(_)
        )
    }

    pub fn release(&self) -> Option<&ReleaseHandle> {
        match self {
            PublishIntent::Release(release) | PublishIntent::LatestAndRelease(release) => {
                Some(release)
            }
            PublishIntent::None | PublishIntent::Latest => None,
        }
    }
}

/// Why a build was triggered: the pushed commit id or the created tag ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub git_ref: String,
}

impl Provenance {
    pub fn new(git_ref: impl Into<String>) -> Self {
        Self {
            git_ref: git_ref.into(),
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.git_ref)
    }
}

/// A request to build one project for one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildInvocation {
    pub project: Project,
    /// Target platform; the configured default when absent.
    #[serde(default)]
    pub platform: Option<Platform>,
    #[serde(default)]
    pub publish: PublishIntent,
    #[serde(default)]
    pub provenance: Option<Provenance>,
}

impl BuildInvocation {
    /// Creates an invocation for the default platform with no publication.
    pub fn new(project: Project) -> Self {
        Self {
            project,
            platform: None,
            publish: PublishIntent::None,
            provenance: None,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_publish(mut self, publish: PublishIntent) -> Self {
        self.publish = publish;
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    /// Platform this invocation builds for.
    pub fn resolve_platform(&self, config: &BuildConfig) -> Platform {
        self.platform.unwrap_or(config.default_platform)
    }

    /// Name of the artifact this invocation produces.
    pub fn artifact_name(&self, config: &BuildConfig) -> String {
        config.artifact_name(self.project, self.resolve_platform(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Os};

    fn release() -> ReleaseHandle {
        ReleaseHandle {
            id: 7,
            tag: "v2.0.0".to_string(),
            upload_url: "https://uploads.github.com/repos/o/r/releases/7/assets{?name,label}"
                .to_string(),
        }
    }

    #[test]
    fn test_publish_intent_from_parts() {
        assert_eq!(PublishIntent::from_parts(false, None), PublishIntent::None);
        assert_eq!(PublishIntent::from_parts(true, None), PublishIntent::Latest);
        assert_eq!(
            PublishIntent::from_parts(false, Some(release())),
            PublishIntent::Release(release())
        );

        let both = PublishIntent::from_parts(true, Some(release()));
        assert!(both.publishes_latest());
        assert_eq!(both.release().map(|r| r.id), Some(7));
        assert!(PublishIntent::Release(release()).release().is_some());
        assert!(!PublishIntent::Release(release()).publishes_latest());
        assert!(PublishIntent::None.release().is_none());
    }

    #[test]
    fn test_invocation_defaults_to_config_platform() {
        let config = BuildConfig::default();
        let invocation = BuildInvocation::new(crate::platform::Project::Server);
        assert_eq!(invocation.resolve_platform(&config), Platform::default());
        assert_eq!(
            invocation.artifact_name(&config),
            "yamon-server-linux-amd64"
        );

        let arm = invocation.with_platform(Platform::new(Os::Linux, Arch::Arm64));
        assert_eq!(arm.artifact_name(&config), "yamon-server-linux-arm64");
    }

    #[test]
    fn test_invocation_deserializes_minimal_json() {
        let invocation: BuildInvocation =
            serde_json::from_str(r#"{"project":"agent"}"#).expect("deserialize");
        assert_eq!(invocation.project, crate::platform::Project::Agent);
        assert_eq!(invocation.platform, None);
        assert_eq!(invocation.publish, PublishIntent::None);
        assert!(invocation.provenance.is_none());
    }
}
