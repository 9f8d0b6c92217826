//! Offline issue data from a JSON snapshot

use super::{IssueResult, IssueTracker};
use crate::models::{DefectReport, Release};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// On-disk layout of a snapshot file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueSnapshot {
    #[serde(default)]
    pub releases: Vec<Release>,
    #[serde(default)]
    pub tickets: Vec<DefectReport>,
}

/// Serves a single project's data from a snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotTracker {
    snapshot: IssueSnapshot,
}

impl SnapshotTracker {
    pub fn new(snapshot: IssueSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn load(path: &Path) -> IssueResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: IssueSnapshot = serde_json::from_str(&content)?;
        debug!(
            "Loaded snapshot {} ({} releases, {} tickets)",
            path.display(),
            snapshot.releases.len(),
            snapshot.tickets.len()
        );
        Ok(Self::new(snapshot))
    }
}

impl IssueTracker for SnapshotTracker {
    fn releases(&self, _project: &str) -> IssueResult<Vec<Release>> {
        Ok(self.snapshot.releases.clone())
    }

    fn defect_reports(&self, _project: &str) -> IssueResult<Vec<DefectReport>> {
        Ok(self.snapshot.tickets.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issues::IssueError;

    #[test]
    fn test_load_snapshot() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("issues.json");
        std::fs::write(
            &path,
            r#"{
                "releases": [{"name": "R1", "date": "2020-01-01"}],
                "tickets": [{"key": "P-1", "created": "2020-01-02", "resolved": "2020-01-03",
                             "affected_versions": ["R1"]}]
            }"#,
        )?;

        let tracker = SnapshotTracker::load(&path)?;
        assert_eq!(tracker.releases("P")?.len(), 1);
        let tickets = tracker.defect_reports("P")?;
        assert_eq!(tickets[0].key, "P-1");
        assert!(tickets[0].fix_versions.is_empty());
        Ok(())
    }

    #[test]
    fn test_missing_snapshot_is_io_error() {
        let err = SnapshotTracker::load(Path::new("/nonexistent/issues.json")).unwrap_err();
        assert!(matches!(err, IssueError::IoError(_)));
    }
}
