//! Issue-tracker collaborator
//!
//! Supplies the release list and the fixed defect reports of a project.
//! Two sources are supported: a live Jira instance over sync HTTP and an
//! offline JSON snapshot with the same content.

mod jira;
mod snapshot;

pub use jira::JiraClient;
pub use snapshot::{IssueSnapshot, SnapshotTracker};

use crate::models::{DefectReport, Release};
use chrono::NaiveDate;
use thiserror::Error;

/// Errors that can occur while fetching issue data
#[derive(Error, Debug)]
pub enum IssueError {
    #[error("Request to {url} failed: {message}")]
    RequestFailed { url: String, message: String },

    #[error("Issue tracker error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse issue data: {0}")]
    ParseError(String),

    #[error("Snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type IssueResult<T> = Result<T, IssueError>;

/// Source of releases and fixed defect reports.
pub trait IssueTracker {
    /// Releases that carry both a name and a release date.
    fn releases(&self, project: &str) -> IssueResult<Vec<Release>>;

    /// Resolved or closed bug tickets with resolution "Fixed".
    fn defect_reports(&self, project: &str) -> IssueResult<Vec<DefectReport>>;
}

/// Parse the `yyyy-MM-dd` prefix of a tracker timestamp.
pub(crate) fn parse_date_prefix(raw: &str) -> Option<NaiveDate> {
    let prefix = raw.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}
