//! Configuration module for bugtrail
//!
//! This module handles:
//! - Project-level configuration (bugtrail.toml)
//! - SZZ and estimator tuning
//! - Dataset and validation defaults

mod project_config;

pub use project_config::{
    BugtrailConfig,
    ConfigError,
    ConfigResult,
    DatasetConfig,
    EstimatorKind,
    IssuesSection,
    ProjectSection,
    SzzConfig,
    ValidationConfig,
    load_config,
    CONFIG_FILE_NAME,
};
