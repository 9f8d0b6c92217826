//! Version-control collaborator
//!
//! The SZZ engine and the dataset builder only see the [`VersionControl`]
//! trait. [`GitHistory`] is the libgit2-backed implementation; tests drive
//! the engine with in-memory implementations instead.

pub mod history;

pub use history::GitHistory;

use crate::models::{Commit, DiffEdit};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::collections::BTreeMap;

/// Read-only access to a project's commit history.
///
/// All calls are synchronous and fallible. Callers treat an error on one
/// commit or file as a skip, never as a reason to abort a whole run.
pub trait VersionControl {
    /// Commits whose message references `key` as a whole word.
    fn commits_referencing(&self, key: &str) -> Result<Vec<Commit>>;

    /// Edits of `commit` against its first parent (or the empty tree for a
    /// root commit), grouped by the path of the new file.
    fn diff_edits(&self, commit: &Commit) -> Result<BTreeMap<String, Vec<DiffEdit>>>;

    /// File text as of `commit`, or `None` when the path does not exist there.
    fn file_content_at(&self, commit: &Commit, path: &str) -> Result<Option<String>>;

    /// Commits with `after < time <= until`, ascending by time. With no
    /// lower bound the walk starts at the beginning of history.
    fn commits_between(
        &self,
        after: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Commit>>;

    /// Latest commit made on or before the end of `date`.
    fn last_commit_on_or_before(&self, date: NaiveDate) -> Result<Option<Commit>>;

    /// Paths of all files at `commit` ending with `extension`.
    fn source_files_at(&self, commit: &Commit, extension: &str) -> Result<Vec<String>>;

    /// Paths changed by `commit`.
    fn touched_paths(&self, commit: &Commit) -> Result<Vec<String>> {
        Ok(self.diff_edits(commit)?.into_keys().collect())
    }
}

/// Last representable instant of `date`, in UTC.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(time))
}

/// Whether `path` is a source file of interest: right extension, outside tests.
pub fn is_source_file(path: &str, extension: &str, test_marker: &str) -> bool {
    let normalized = format!("/{}", path.replace('\\', "/"));
    path.ends_with(extension) && (test_marker.is_empty() || !normalized.contains(test_marker))
}
