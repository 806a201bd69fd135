//! Orchestrator configuration.
//!
//! A single [`BuildConfig`] value is constructed at startup (from defaults or
//! a YAML file) and shared read-only by the build task, the event router and
//! the CLI. Its defaults are the production values for building yamon.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::matrix::{BuildMatrix, MatrixEntry};
use crate::platform::{artifact_name, Arch, Os, Platform, Project};

/// Image definition used for every build container.
pub const DEFAULT_DOCKERFILE: &str = "FROM golang:1.22-bullseye
RUN apt-get update -y && apt-get install -y build-essential libsystemd-dev:amd64 gcc-9-aarch64-linux-gnu
";

/// Definition of the containerized build environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEnvironment {
    /// Dockerfile contents used to build the toolchain image.
    pub dockerfile: String,
    /// Directory inside the container where the workspace is mounted.
    #[serde(default = "default_container_workdir")]
    pub container_workdir: String,
    /// Directory inside the container where the per-build output directory is mounted.
    #[serde(default = "default_output_mount")]
    pub output_mount: String,
}

fn default_container_workdir() -> String {
    "/src".to_string()
}

fn default_output_mount() -> String {
    "/out".to_string()
}

impl Default for BuildEnvironment {
    fn default() -> Self {
        Self {
            dockerfile: DEFAULT_DOCKERFILE.to_string(),
            container_workdir: default_container_workdir(),
            output_mount: default_output_mount(),
        }
    }
}

/// Configuration shared by all orchestrator components.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Prefix of every artifact name.
    pub system_name: String,
    /// GitHub repository (`owner/name`) statuses and releases are recorded on.
    pub repository: String,
    /// Ordered (project, platform) pairs built on every trigger.
    pub matrix: Vec<MatrixEntry>,
    /// Platform used when an invocation does not name one.
    pub default_platform: Platform,
    /// Toolchain image definition.
    pub build_environment: BuildEnvironment,
    /// Ref whose pushes are published to the latest channel.
    pub primary_branch_ref: String,
    /// Tags starting with this prefix create releases.
    pub release_prefix: String,
    /// Host directory holding the source checkout, mounted read-only.
    pub workspace: PathBuf,
    /// Parent of the per-build output directories; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    /// Finished artifacts are also copied here when set.
    pub artifact_dir: Option<PathBuf>,
    /// Mark the commit status as failed when a tracked build errors.
    pub report_failures: bool,
    /// Optional limit on a single container run.
    pub run_timeout_secs: Option<u64>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            system_name: "yamon".to_string(),
            repository: "b1naryth1ef/yamon".to_string(),
            matrix: vec![
                MatrixEntry::new(Project::Server, Platform::new(Os::Linux, Arch::Amd64)),
                MatrixEntry::new(Project::Agent, Platform::new(Os::Linux, Arch::Amd64)),
                MatrixEntry::new(Project::Agent, Platform::new(Os::Linux, Arch::Arm64)),
            ],
            default_platform: Platform::default(),
            build_environment: BuildEnvironment::default(),
            primary_branch_ref: "refs/heads/main".to_string(),
            release_prefix: "v".to_string(),
            workspace: PathBuf::from("."),
            scratch_dir: None,
            artifact_dir: None,
            report_failures: false,
            run_timeout_secs: None,
        }
    }
}

impl BuildConfig {
    /// Loads and validates a configuration from a YAML file.
    ///
    /// Fields missing from the file keep their default values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parses and validates a configuration from YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: BuildConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the rest of the crate relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.system_name.trim().is_empty() {
            return Err(ConfigError::MissingField("system_name"));
        }
        if self.repository.trim().is_empty() {
            return Err(ConfigError::MissingField("repository"));
        }
        if self.release_prefix.is_empty() {
            return Err(ConfigError::MissingField("release_prefix"));
        }
        let environment = &self.build_environment;
        if !environment.output_mount.starts_with('/')
            || environment.output_mount == environment.container_workdir
        {
            return Err(ConfigError::InvalidField {
                field: "build_environment.output_mount",
                reason: format!(
                    "'{}' must be an absolute path distinct from the workdir",
                    environment.output_mount
                ),
            });
        }
        if self.build_environment.dockerfile.trim().is_empty() {
            return Err(ConfigError::MissingField("build_environment.dockerfile"));
        }
        if self.matrix.is_empty() {
            return Err(ConfigError::EmptyMatrix);
        }

        let mut seen = HashSet::new();
        for entry in &self.matrix {
            if !seen.insert(*entry) {
                return Err(ConfigError::DuplicateEntry(self.artifact_name(
                    entry.project,
                    entry.platform,
                )));
            }
        }

        Ok(())
    }

    /// Returns the build matrix.
    pub fn matrix(&self) -> BuildMatrix {
        BuildMatrix::new(self.matrix.clone())
    }

    /// Artifact name for a project/platform under this system name.
    pub fn artifact_name(&self, project: Project, platform: Platform) -> String {
        artifact_name(&self.system_name, project, platform)
    }

    /// Sets the workspace directory.
    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BuildConfig::default();
        config.validate().expect("default config should be valid");
        assert_eq!(config.matrix.len(), 3);
        assert_eq!(config.primary_branch_ref, "refs/heads/main");
        assert_eq!(config.release_prefix, "v");
        assert!(!config.report_failures);
        assert!(config
            .build_environment
            .dockerfile
            .contains("gcc-9-aarch64-linux-gnu"));
    }

    #[test]
    fn test_from_yaml_partial_override() {
        let yaml = r#"
system_name: mon
primary_branch_ref: refs/heads/master
matrix:
  - project: agent
    platform: { os: linux, arch: arm64 }
"#;
        let config = BuildConfig::from_yaml(yaml).expect("valid yaml");
        assert_eq!(config.system_name, "mon");
        assert_eq!(config.repository, "b1naryth1ef/yamon");
        assert_eq!(config.matrix.len(), 1);
        assert_eq!(
            config.artifact_name(config.matrix[0].project, config.matrix[0].platform),
            "mon-agent-linux-arm64"
        );
        assert_eq!(config.build_environment.container_workdir, "/src");
        assert_eq!(config.build_environment.output_mount, "/out");
        assert!(config.scratch_dir.is_none());
        assert!(config.artifact_dir.is_none());
    }

    #[test]
    fn test_validate_rejects_output_mount_over_workdir() {
        let mut config = BuildConfig::default();
        config.build_environment.output_mount = "/src".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidField {
                field: "build_environment.output_mount",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut config = BuildConfig::default();
        config.matrix.push(config.matrix[0]);
        match config.validate() {
            Err(ConfigError::DuplicateEntry(name)) => {
                assert_eq!(name, "yamon-server-linux-amd64")
            }
            other => panic!("expected duplicate entry error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_empty_matrix() {
        let config = BuildConfig {
            matrix: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyMatrix)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("yamon-ci.yaml");
        std::fs::write(&path, "release_prefix: release-\nreport_failures: true\n")
            .expect("write config");

        let config = BuildConfig::load(&path).expect("load config");
        assert_eq!(config.release_prefix, "release-");
        assert!(config.report_failures);
    }
}
