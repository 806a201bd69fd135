//! Static build matrix and its expansion into task invocations.

use serde::{Deserialize, Serialize};

use crate::build::{BuildInvocation, Provenance, PublishIntent};
use crate::platform::{Platform, Project};

/// One (project, platform) pair of the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatrixEntry {
    pub project: Project,
    pub platform: Platform,
}

impl MatrixEntry {
    pub const fn new(project: Project, platform: Platform) -> Self {
        Self { project, platform }
    }
}

/// Per-trigger fields merged into every invocation of a fan-out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trigger {
    pub publish: PublishIntent,
    pub provenance: Option<Provenance>,
}

impl Trigger {
    pub fn new(publish: PublishIntent, provenance: Option<Provenance>) -> Self {
        Self {
            publish,
            provenance,
        }
    }
}

/// Ordered list of matrix entries, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildMatrix {
    entries: Vec<MatrixEntry>,
}

impl BuildMatrix {
    pub fn new(entries: Vec<MatrixEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[MatrixEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Produces one invocation per entry, in matrix order.
    pub fn expand(&self, trigger: &Trigger) -> Vec<BuildInvocation> {
        self.entries
            .iter()
            .map(|entry| BuildInvocation {
                project: entry.project,
                platform: Some(entry.platform),
                publish: trigger.publish.clone(),
                provenance: trigger.provenance.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::platform::{Arch, Os};
    use std::collections::HashSet;

    #[test]
    fn test_expand_preserves_order_and_fields() {
        let matrix = BuildConfig::default().matrix();
        let trigger = Trigger::new(PublishIntent::Latest, Some(Provenance::new("abc123")));

        let invocations = matrix.expand(&trigger);

        assert_eq!(invocations.len(), matrix.len());
        for (invocation, entry) in invocations.iter().zip(matrix.entries()) {
            assert_eq!(invocation.project, entry.project);
            assert_eq!(invocation.platform, Some(entry.platform));
            assert_eq!(invocation.publish, PublishIntent::Latest);
            assert_eq!(
                invocation.provenance.as_ref().map(|p| p.git_ref.as_str()),
                Some("abc123")
            );
        }
    }

    #[test]
    fn test_expand_yields_unique_artifact_names() {
        let config = BuildConfig::default();
        let names: HashSet<String> = config
            .matrix()
            .expand(&Trigger::default())
            .iter()
            .map(|inv| inv.artifact_name(&config))
            .collect();
        assert_eq!(names.len(), config.matrix.len());
    }

    #[test]
    fn test_expand_empty_matrix() {
        let matrix = BuildMatrix::new(Vec::new());
        assert!(matrix.is_empty());
        assert!(matrix.expand(&Trigger::default()).is_empty());
    }

    #[test]
    fn test_matrix_entry_serde() {
        let entry = MatrixEntry::new(Project::Agent, Platform::new(Os::Linux, Arch::Arm64));
        let yaml = serde_yaml::to_string(&entry).expect("serialize");
        let back: MatrixEntry = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(entry, back);
    }
}
