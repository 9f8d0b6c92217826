//! Core data models for bugtrail
//!
//! These models are shared by the issue and version-control collaborators,
//! the SZZ engine and the dataset builder.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::ops::Range;

/// A project release as published by the issue tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub name: String,
    pub date: NaiveDate,
}

impl Release {
    pub fn new(name: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            date,
        }
    }
}

impl std::fmt::Display for Release {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.date)
    }
}

/// A fixed defect report (ticket).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectReport {
    pub key: String,
    pub created: NaiveDate,
    pub resolved: NaiveDate,
    #[serde(default)]
    pub fix_versions: BTreeSet<String>,
    #[serde(default)]
    pub affected_versions: BTreeSet<String>,
}

impl DefectReport {
    pub fn new(key: impl Into<String>, created: NaiveDate, resolved: NaiveDate) -> Self {
        Self {
            key: key.into(),
            created,
            resolved,
            fix_versions: BTreeSet::new(),
            affected_versions: BTreeSet::new(),
        }
    }

    pub fn with_fix_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fix_versions = versions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_affected_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affected_versions = versions.into_iter().map(Into::into).collect();
        self
    }
}

/// A commit as seen by the version-control collaborator.
///
/// Two commits are the same commit when their hashes match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Commit {}

impl Hash for Commit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl Commit {
    /// Abbreviated hash for log lines.
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(12)]
    }
}

/// Shape of a diff hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Insert,
    Delete,
    Replace,
}

/// A contiguous block of changed lines between a commit and its first parent.
///
/// Ranges are 0-based and half-open, the same convention a hunk header
/// uses once its 1-based start is shifted down by one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEdit {
    pub file_id: String,
    pub old_range: Range<u32>,
    pub new_range: Range<u32>,
}

impl DiffEdit {
    pub fn new(file_id: impl Into<String>, old_range: Range<u32>, new_range: Range<u32>) -> Self {
        Self {
            file_id: file_id.into(),
            old_range,
            new_range,
        }
    }

    pub fn kind(&self) -> EditKind {
        match (self.old_range.is_empty(), self.new_range.is_empty()) {
            (true, false) => EditKind::Insert,
            (false, true) => EditKind::Delete,
            _ => EditKind::Replace,
        }
    }

    /// Lines present only in the new file.
    pub fn lines_added(&self) -> u32 {
        self.new_range.end - self.new_range.start
    }

    /// Lines present only in the old file.
    pub fn lines_deleted(&self) -> u32 {
        self.old_range.end - self.old_range.start
    }
}

/// Source lines of a parsed method, 1-based and inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpan {
    pub start: u32,
    pub end: u32,
}

impl LineSpan {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Stable identity of a method across revisions.
///
/// Equality, ordering and hashing use `full_signature` only, which is what
/// lets static metrics, process metrics and bug labels be joined even though
/// they are computed by independent passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodIdentity {
    pub full_signature: String,
    pub class_name: String,
    pub method_name: String,
}

impl MethodIdentity {
    pub fn new(
        full_signature: impl Into<String>,
        class_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        Self {
            full_signature: full_signature.into(),
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }
}

impl PartialEq for MethodIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.full_signature == other.full_signature
    }
}

impl Eq for MethodIdentity {}

impl Hash for MethodIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full_signature.hash(state);
    }
}

impl PartialOrd for MethodIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MethodIdentity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.full_signature.cmp(&other.full_signature)
    }
}

impl std::fmt::Display for MethodIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full_signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_method_identity_equality_uses_signature_only() {
        let a = MethodIdentity::new("org.demo.Foo.bar(int)", "Foo", "bar");
        let b = MethodIdentity::new("org.demo.Foo.bar(int)", "Other", "renamed");
        let c = MethodIdentity::new("org.demo.Foo.bar(long)", "Foo", "bar");

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_diff_edit_kind() {
        assert_eq!(DiffEdit::new("A.java", 3..3, 3..5).kind(), EditKind::Insert);
        assert_eq!(DiffEdit::new("A.java", 3..5, 3..3).kind(), EditKind::Delete);
        assert_eq!(DiffEdit::new("A.java", 3..5, 3..4).kind(), EditKind::Replace);

        let edit = DiffEdit::new("A.java", 10..12, 10..15);
        assert_eq!(edit.lines_added(), 5);
        assert_eq!(edit.lines_deleted(), 2);
    }

    #[test]
    fn test_line_span_len() {
        assert_eq!(LineSpan::new(4, 4).len(), 1);
        assert_eq!(LineSpan::new(4, 9).len(), 6);
    }

    #[test]
    fn test_commit_identity_is_hash() {
        let ts = Utc::now();
        let a = Commit {
            hash: "abc".into(),
            message: "one".into(),
            author: "x".into(),
            timestamp: ts,
        };
        let b = Commit {
            message: "two".into(),
            ..a.clone()
        };
        assert_eq!(a, b);
        assert_eq!(a.short_hash(), "abc");
    }
}
