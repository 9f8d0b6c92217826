//! Project-level configuration support
//!
//! Loads configuration from `bugtrail.toml` in the working directory, or
//! from the path given with `--config`. Every field has a default, so the
//! file is optional.
//!
//! # Configuration Format
//!
//! ```toml
//! # bugtrail.toml
//!
//! [project]
//! key = "BOOKKEEPER"
//! repo_path = "../bookkeeper"
//!
//! [issues]
//! snapshot = "bookkeeper-issues.json"
//!
//! [szz]
//! window_size = 3
//! estimator = "incremental"
//! match_policy = "all"
//!
//! [dataset]
//! snoring_discard_ratio = 0.66
//!
//! [validation]
//! classifiers = ["random-forest", "naive-bayes"]
//! runs = 5
//! ```

use crate::matcher::MatchPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "bugtrail.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Root of `bugtrail.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BugtrailConfig {
    pub project: ProjectSection,
    pub issues: IssuesSection,
    pub szz: SzzConfig,
    pub dataset: DatasetConfig,
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    /// Issue-tracker project key
    pub key: String,
    pub repo_path: PathBuf,
    pub source_extension: String,
    /// Paths containing this marker are tests and are ignored everywhere
    pub test_path_marker: String,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            key: String::new(),
            repo_path: PathBuf::from("."),
            source_extension: ".java".to_string(),
            test_path_marker: "/test/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IssuesSection {
    pub jira_url: String,
    /// Offline JSON snapshot used instead of HTTP when set
    pub snapshot: Option<PathBuf>,
    pub page_size: usize,
}

impl Default for IssuesSection {
    fn default() -> Self {
        Self {
            jira_url: "https://issues.apache.org/jira/".to_string(),
            snapshot: None,
            page_size: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    #[default]
    Incremental,
    Fixed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SzzConfig {
    pub window_size: usize,
    pub default_proportion: f64,
    pub max_proportion: f64,
    pub estimator: EstimatorKind,
    pub fixed_proportion: f64,
    /// Take FV from the ticket's declared fix versions when one resolves
    pub prefer_declared_fix_version: bool,
    /// Commits later than resolution + grace days are mere mentions
    pub fix_commit_grace_days: i64,
    pub recover_unlinked_commits: bool,
    pub match_policy: MatchPolicy,
}

impl Default for SzzConfig {
    fn default() -> Self {
        Self {
            window_size: 3,
            default_proportion: 0.01,
            max_proportion: 10.0,
            estimator: EstimatorKind::Incremental,
            fixed_proportion: 1.5,
            prefer_declared_fix_version: false,
            fix_commit_grace_days: 1,
            recover_unlinked_commits: false,
            match_policy: MatchPolicy::All,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub snoring_discard_ratio: f64,
    pub snoring_keep_only_buggy: bool,
    /// Defaults to `<key>_dataset.csv`
    pub output: Option<PathBuf>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            snoring_discard_ratio: 0.66,
            snoring_keep_only_buggy: false,
            output: None,
        }
    }
}

impl DatasetConfig {
    pub fn output_path(&self, key: &str) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}_dataset.csv", key)))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub release_index_column: String,
    pub label_column: String,
    pub loc_column: String,
    pub buggy_label: String,
    pub metadata_columns: Vec<String>,
    pub classifiers: Vec<String>,
    pub feature_selection: Vec<String>,
    pub sampling: Vec<String>,
    pub runs: u32,
    pub base_seed: u64,
    pub parallel_folds: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            release_index_column: "ReleaseIndex".to_string(),
            label_column: "isBuggy".to_string(),
            loc_column: "LOC".to_string(),
            buggy_label: "True".to_string(),
            metadata_columns: strings(&[
                "Version",
                "ReleaseIndex",
                "ReleaseData",
                "File",
                "Class",
                "Signature",
            ]),
            classifiers: strings(&["random-forest", "naive-bayes", "knn"]),
            feature_selection: strings(&["none", "info-gain", "best-first"]),
            sampling: strings(&["none", "undersampling", "smote"]),
            runs: 1,
            base_seed: 42,
            parallel_folds: false,
        }
    }
}

impl BugtrailConfig {
    /// Parse a TOML document and check value ranges.
    pub fn from_toml(content: &str, path: &Path) -> ConfigResult<Self> {
        let config: BugtrailConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.szz.window_size == 0 {
            return Err(ConfigError::Invalid {
                field: "szz.window_size",
                reason: "must be at least 1".into(),
            });
        }
        if !(self.szz.max_proportion >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "szz.max_proportion",
                reason: format!("{} is negative", self.szz.max_proportion),
            });
        }
        if !(0.0..1.0).contains(&self.dataset.snoring_discard_ratio) {
            return Err(ConfigError::Invalid {
                field: "dataset.snoring_discard_ratio",
                reason: format!("{} is outside [0, 1)", self.dataset.snoring_discard_ratio),
            });
        }
        if self.validation.runs == 0 {
            return Err(ConfigError::Invalid {
                field: "validation.runs",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Load configuration.
///
/// With an explicit path the file must exist. Without one, `bugtrail.toml`
/// in `dir` is used when present and defaults apply otherwise. A file that
/// exists but does not parse is always an error.
pub fn load_config(explicit: Option<&Path>, dir: &Path) -> ConfigResult<BugtrailConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if !candidate.exists() {
                debug!("No project config found, using defaults");
                return Ok(BugtrailConfig::default());
            }
            candidate
        }
    };

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let config = BugtrailConfig::from_toml(&content, &path)?;
    debug!("Loaded project config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests;
