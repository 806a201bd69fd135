//! Build targets: projects, platform descriptors and artifact naming.
//!
//! A [`Platform`] is an (operating system, CPU architecture) pair using Go
//! toolchain identifiers. Together with a [`Project`] it fully determines the
//! artifact name and the build environment of a matrix entry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Cross compiler used when targeting arm64 from the amd64 build image.
pub const ARM64_CROSS_COMPILER: &str = "aarch64-linux-gnu-gcc-9";

/// Target operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Darwin,
    Windows,
    Freebsd,
}

impl Os {
    /// Value of `GOOS` for this operating system.
    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Darwin => "darwin",
            Os::Windows => "windows",
            Os::Freebsd => "freebsd",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Os {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux" => Ok(Os::Linux),
            "darwin" => Ok(Os::Darwin),
            "windows" => Ok(Os::Windows),
            "freebsd" => Ok(Os::Freebsd),
            other => Err(ConfigError::InvalidPlatform(other.to_string())),
        }
    }
}

/// Target CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "amd64")]
    Amd64,
    #[serde(rename = "arm64")]
    Arm64,
    #[serde(rename = "386")]
    I386,
    #[serde(rename = "arm")]
    Arm,
}

impl Arch {
    /// Value of `GOARCH` for this architecture.
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
            Arch::I386 => "386",
            Arch::Arm => "arm",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amd64" => Ok(Arch::Amd64),
            "arm64" => Ok(Arch::Arm64),
            "386" => Ok(Arch::I386),
            "arm" => Ok(Arch::Arm),
            other => Err(ConfigError::InvalidPlatform(other.to_string())),
        }
    }
}

/// Platform descriptor: the (os, arch) pair a binary is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Environment variables selecting the Go cross-compilation toolchain.
    ///
    /// Always sets `GOOS`, `GOARCH` and enables cgo. arm64 targets also
    /// select the aarch64 cross compiler installed in the build image.
    pub fn build_env(&self) -> Vec<String> {
        let mut env = vec![
            format!("GOOS={}", self.os),
            format!("GOARCH={}", self.arch),
            "CGO_ENABLED=1".to_string(),
        ];
        if self.arch == Arch::Arm64 {
            env.push(format!("CC={ARM64_CROSS_COMPILER}"));
        }
        env
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::new(Os::Linux, Arch::Amd64)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

impl FromStr for Platform {
    type Err = ConfigError;

    /// Parses `"<os>/<arch>"`, e.g. `linux/arm64`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (os, arch) = s
            .split_once('/')
            .ok_or_else(|| ConfigError::InvalidPlatform(s.to_string()))?;
        let os = os
            .parse()
            .map_err(|_| ConfigError::InvalidPlatform(s.to_string()))?;
        let arch = arch
            .parse()
            .map_err(|_| ConfigError::InvalidPlatform(s.to_string()))?;
        Ok(Self { os, arch })
    }
}

/// A buildable program of the yamon repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Project {
    Agent,
    Server,
}

impl Project {
    pub fn as_str(&self) -> &'static str {
        match self {
            Project::Agent => "agent",
            Project::Server => "server",
        }
    }

    /// Go entry point of the project, relative to the repository root.
    pub fn entry_point(&self) -> String {
        format!("cmd/yamon-{}/main.go", self.as_str())
    }

    /// Shell command producing `output` for this project.
    pub fn build_command(&self, output: &str) -> String {
        format!("go build -o {} {}", output, self.entry_point())
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Project {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Project::Agent),
            "server" => Ok(Project::Server),
            other => Err(ConfigError::UnknownProject(other.to_string())),
        }
    }
}

/// Artifact file name for a project built for a platform.
///
/// Commit status contexts, release asset names and latest-channel keys are
/// all derived from this value.
pub fn artifact_name(system: &str, project: Project, platform: Platform) -> String {
    format!("{}-{}-{}-{}", system, project, platform.os, platform.arch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_name_is_deterministic() {
        let platform = Platform::new(Os::Linux, Arch::Arm64);
        let first = artifact_name("yamon", Project::Agent, platform);
        let second = artifact_name("yamon", Project::Agent, platform);
        assert_eq!(first, "yamon-agent-linux-arm64");
        assert_eq!(first, second);
    }

    #[test]
    fn test_build_env_amd64() {
        let env = Platform::default().build_env();
        assert_eq!(env, vec!["GOOS=linux", "GOARCH=amd64", "CGO_ENABLED=1"]);
        assert!(!env.iter().any(|v| v.starts_with("CC=")));
    }

    #[test]
    fn test_build_env_arm64_selects_cross_compiler() {
        let env = Platform::new(Os::Linux, Arch::Arm64).build_env();
        assert!(env.contains(&"GOARCH=arm64".to_string()));
        assert!(env.contains(&"CC=aarch64-linux-gnu-gcc-9".to_string()));
    }

    #[test]
    fn test_platform_parse() {
        let platform: Platform = "linux/arm64".parse().expect("valid platform");
        assert_eq!(platform, Platform::new(Os::Linux, Arch::Arm64));
        assert_eq!(platform.to_string(), "linux/arm64");

        assert!("linux".parse::<Platform>().is_err());
        assert!("linux/sparc".parse::<Platform>().is_err());
        assert!("plan9/amd64".parse::<Platform>().is_err());
    }

    #[test]
    fn test_project_build_command() {
        assert_eq!(
            Project::Server.build_command("yamon-server-linux-amd64"),
            "go build -o yamon-server-linux-amd64 cmd/yamon-server/main.go"
        );
        assert_eq!("agent".parse::<Project>().ok(), Some(Project::Agent));
        assert!("debug".parse::<Project>().is_err());
    }

    #[test]
    fn test_serde_identifiers() {
        let json = serde_json::to_string(&Platform::new(Os::Linux, Arch::I386))
            .expect("serialize");
        assert_eq!(json, r#"{"os":"linux","arch":"386"}"#);
        let project: Project = serde_json::from_str(r#""server""#).expect("deserialize");
        assert_eq!(project, Project::Server);
    }
}
