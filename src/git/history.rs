//! Git history extraction using libgit2
//!
//! Walks the full commit graph once, caches every commit ascending by time,
//! and answers the diff/content queries of [`VersionControl`] on demand
//! using the git2 crate (Rust bindings to libgit2).

use super::{end_of_day, VersionControl};
use crate::models::{Commit, DiffEdit};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use git2::{DiffOptions, Oid, Repository, Sort};
use regex::Regex;
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;
use tracing::debug;

/// Git history analyzer using libgit2.
pub struct GitHistory {
    repo: Repository,
    /// Every commit reachable from HEAD, ascending by commit time.
    commits: Vec<Commit>,
}

impl GitHistory {
    /// Open a git repository and cache its history.
    ///
    /// # Arguments
    /// * `path` - Path to the repository (or any subdirectory)
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .with_context(|| format!("Failed to open git repository at {:?}", path))?;
        debug!("Opened git repository at {:?}", repo.path());

        let commits = load_commits(&repo)?;
        debug!("Cached {} commits", commits.len());
        Ok(Self { repo, commits })
    }

    /// Check if a path is inside a git repository.
    pub fn is_git_repo(path: &Path) -> bool {
        Repository::discover(path).is_ok()
    }

    /// All cached commits, oldest first.
    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    fn find_tree(&self, commit: &Commit) -> Result<git2::Tree<'_>> {
        let oid = Oid::from_str(&commit.hash)
            .with_context(|| format!("Invalid commit hash {}", commit.hash))?;
        let found = self
            .repo
            .find_commit(oid)
            .with_context(|| format!("Commit {} not found", commit.short_hash()))?;
        Ok(found.tree()?)
    }

    fn diff_against_parent(&self, commit: &Commit) -> Result<git2::Diff<'_>> {
        let oid = Oid::from_str(&commit.hash)?;
        let found = self.repo.find_commit(oid)?;

        let parent = found.parent(0).ok();
        let tree = found.tree()?;
        let parent_tree = parent.as_ref().map(|p| p.tree()).transpose()?;

        let mut diff_opts = DiffOptions::new();
        diff_opts.context_lines(0);

        let diff =
            self.repo
                .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut diff_opts))?;
        Ok(diff)
    }
}

impl VersionControl for GitHistory {
    fn commits_referencing(&self, key: &str) -> Result<Vec<Commit>> {
        let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(key)))
            .with_context(|| format!("Cannot build reference pattern for {key}"))?;
        Ok(self
            .commits
            .iter()
            .filter(|c| pattern.is_match(&c.message))
            .cloned()
            .collect())
    }

    fn diff_edits(&self, commit: &Commit) -> Result<BTreeMap<String, Vec<DiffEdit>>> {
        let diff = self.diff_against_parent(commit)?;

        let mut edits: BTreeMap<String, Vec<DiffEdit>> = BTreeMap::new();
        diff.foreach(
            &mut |_, _| true,
            None,
            Some(&mut |delta, hunk| {
                let path = delta.new_file().path().or_else(|| delta.old_file().path());
                if let Some(path) = path {
                    let path_str = path.to_string_lossy().to_string();
                    let edit = DiffEdit::new(
                        path_str.clone(),
                        hunk_range(hunk.old_start(), hunk.old_lines()),
                        hunk_range(hunk.new_start(), hunk.new_lines()),
                    );
                    edits.entry(path_str).or_default().push(edit);
                }
                true
            }),
            None,
        )?;

        Ok(edits)
    }

    fn file_content_at(&self, commit: &Commit, path: &str) -> Result<Option<String>> {
        let tree = self.find_tree(commit)?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let blob = entry
            .to_object(&self.repo)?
            .peel_to_blob()
            .with_context(|| format!("{path} is not a file at {}", commit.short_hash()))?;
        Ok(Some(String::from_utf8_lossy(blob.content()).into_owned()))
    }

    fn commits_between(
        &self,
        after: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Commit>> {
        Ok(self
            .commits
            .iter()
            .filter(|c| after.map_or(true, |a| c.timestamp > a) && c.timestamp <= until)
            .cloned()
            .collect())
    }

    fn last_commit_on_or_before(&self, date: NaiveDate) -> Result<Option<Commit>> {
        let limit = end_of_day(date);
        let idx = self.commits.partition_point(|c| c.timestamp <= limit);
        Ok(idx.checked_sub(1).and_then(|i| self.commits.get(i)).cloned())
    }

    fn source_files_at(&self, commit: &Commit, extension: &str) -> Result<Vec<String>> {
        let tree = self.find_tree(commit)?;

        let mut files = Vec::new();
        tree.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() == Some(git2::ObjectType::Blob) {
                let name = entry.name().unwrap_or("");
                if name.ends_with(extension) {
                    files.push(format!("{}{}", dir, name));
                }
            }
            git2::TreeWalkResult::Ok
        })?;

        Ok(files)
    }

    fn touched_paths(&self, commit: &Commit) -> Result<Vec<String>> {
        let diff = self.diff_against_parent(commit)?;
        Ok(diff
            .deltas()
            .filter_map(|d| d.new_file().path().or_else(|| d.old_file().path()))
            .map(|p| p.to_string_lossy().to_string())
            .collect())
    }
}

/// Load every commit reachable from HEAD, oldest first.
fn load_commits(repo: &Repository) -> Result<Vec<Commit>> {
    if repo.head().is_err() {
        debug!("Repository has no HEAD yet");
        return Ok(Vec::new());
    }

    let mut revwalk = repo.revwalk()?;
    revwalk.set_sorting(Sort::TIME | Sort::REVERSE)?;
    revwalk.push_head()?;

    let mut commits = Vec::new();
    for oid_result in revwalk {
        let oid = oid_result?;
        let commit = repo.find_commit(oid)?;
        commits.push(Commit {
            hash: commit.id().to_string(),
            message: commit.message().unwrap_or("").to_string(),
            author: commit.author().name().unwrap_or("Unknown").to_string(),
            timestamp: git_time(&commit.time()),
        });
    }

    // Revwalk time order follows the committer clock; keep it stable anyway.
    commits.sort_by_key(|c| c.timestamp);
    Ok(commits)
}

/// Convert a zero-context hunk side into a 0-based half-open range.
///
/// For an empty side, git reports the line *after which* the change sits,
/// which is already the 0-based insertion point.
fn hunk_range(start: u32, lines: u32) -> Range<u32> {
    if lines == 0 {
        start..start
    } else {
        let begin = start.saturating_sub(1);
        begin..begin + lines
    }
}

fn git_time(time: &git2::Time) -> DateTime<Utc> {
    Utc.timestamp_opt(time.seconds(), 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EditKind;
    use tempfile::tempdir;

    fn commit_file(
        repo: &Repository,
        dir: &Path,
        name: &str,
        content: &str,
        message: &str,
        seconds: i64,
    ) -> Result<Oid> {
        std::fs::write(dir.join(name), content)?;
        let mut index = repo.index()?;
        index.add_path(Path::new(name))?;
        index.write()?;
        let tree = repo.find_tree(index.write_tree()?)?;
        let sig = git2::Signature::new("Test User", "test@example.com", &git2::Time::new(seconds, 0))?;
        let parents = match repo.head() {
            Ok(head) => vec![head.peel_to_commit()?],
            Err(_) => Vec::new(),
        };
        let parent_refs: Vec<_> = parents.iter().collect();
        Ok(repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)?)
    }

    fn create_test_repo() -> Result<(tempfile::TempDir, Repository)> {
        let dir = tempdir()?;
        let repo = Repository::init(dir.path())?;
        commit_file(&repo, dir.path(), "A.java", "a\nb\nc\n", "Initial commit", 1_000)?;
        commit_file(&repo, dir.path(), "A.java", "a\nB\nc\nd\n", "PROJ-12 fix b", 2_000)?;
        commit_file(&repo, dir.path(), "A.java", "a\nB\nc\nd\ne\n", "PROJ-123 add e", 3_000)?;
        Ok((dir, repo))
    }

    #[test]
    fn test_open_repo_caches_ascending() -> Result<()> {
        let (dir, _repo) = create_test_repo()?;
        let history = GitHistory::open(dir.path())?;
        let messages: Vec<_> = history.commits().iter().map(|c| c.message.trim()).collect();
        assert_eq!(messages, ["Initial commit", "PROJ-12 fix b", "PROJ-123 add e"]);
        Ok(())
    }

    #[test]
    fn test_is_git_repo() -> Result<()> {
        let (dir, _repo) = create_test_repo()?;
        assert!(GitHistory::is_git_repo(dir.path()));

        let non_repo = tempdir()?;
        assert!(!GitHistory::is_git_repo(non_repo.path()));
        Ok(())
    }

    #[test]
    fn test_commits_referencing_whole_key() -> Result<()> {
        let (dir, _repo) = create_test_repo()?;
        let history = GitHistory::open(dir.path())?;

        let found = history.commits_referencing("PROJ-12")?;
        assert_eq!(found.len(), 1);
        assert!(found[0].message.starts_with("PROJ-12 fix"));
        Ok(())
    }

    #[test]
    fn test_diff_edits_are_zero_based_half_open() -> Result<()> {
        let (dir, _repo) = create_test_repo()?;
        let history = GitHistory::open(dir.path())?;

        let fix = &history.commits()[1];
        let edits = history.diff_edits(fix)?;
        let file_edits = &edits["A.java"];

        // "b" -> "B" on line 2, then "d" appended as line 4
        assert_eq!(file_edits.len(), 2);
        assert_eq!(file_edits[0].kind(), EditKind::Replace);
        assert_eq!(file_edits[0].new_range, 1..2);
        assert_eq!(file_edits[1].kind(), EditKind::Insert);
        assert_eq!(file_edits[1].new_range, 3..4);
        assert_eq!(file_edits[1].old_range, 3..3);
        Ok(())
    }

    #[test]
    fn test_root_commit_diffs_against_empty_tree() -> Result<()> {
        let (dir, _repo) = create_test_repo()?;
        let history = GitHistory::open(dir.path())?;

        let edits = history.diff_edits(&history.commits()[0])?;
        assert_eq!(edits["A.java"], vec![DiffEdit::new("A.java", 0..0, 0..3)]);
        Ok(())
    }

    #[test]
    fn test_file_content_at() -> Result<()> {
        let (dir, _repo) = create_test_repo()?;
        let history = GitHistory::open(dir.path())?;

        let first = &history.commits()[0];
        assert_eq!(history.file_content_at(first, "A.java")?.as_deref(), Some("a\nb\nc\n"));
        assert!(history.file_content_at(first, "Missing.java")?.is_none());
        Ok(())
    }

    #[test]
    fn test_commits_between_and_last_on_or_before() -> Result<()> {
        let (dir, _repo) = create_test_repo()?;
        let history = GitHistory::open(dir.path())?;

        let first_ts = history.commits()[0].timestamp;
        let all = history.commits_between(None, Utc::now())?;
        assert_eq!(all.len(), 3);
        let later = history.commits_between(Some(first_ts), Utc::now())?;
        assert_eq!(later.len(), 2);

        let last = history.last_commit_on_or_before(first_ts.date_naive())?;
        assert_eq!(last.map(|c| c.hash), history.commits().last().map(|c| c.hash.clone()));
        Ok(())
    }

    #[test]
    fn test_source_files_and_touched_paths() -> Result<()> {
        let (dir, repo) = create_test_repo()?;
        commit_file(&repo, dir.path(), "notes.txt", "x", "notes", 4_000)?;
        let history = GitHistory::open(dir.path())?;

        let head = history.commits().last().cloned().context("no commits")?;
        assert_eq!(history.source_files_at(&head, ".java")?, vec!["A.java".to_string()]);
        assert_eq!(history.touched_paths(&head)?, vec!["notes.txt".to_string()]);
        Ok(())
    }

    #[test]
    fn test_hunk_range() {
        assert_eq!(hunk_range(5, 0), 5..5);
        assert_eq!(hunk_range(5, 2), 4..6);
        assert_eq!(hunk_range(0, 0), 0..0);
    }
}
