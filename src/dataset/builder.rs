//! Method-per-release dataset generation
//!
//! For every release the builder replays the commits since the previous
//! release into the process-metric chain, parses every source file of the
//! release snapshot for static metrics, and labels each method from the
//! SZZ output. Rows are joined on the method's full signature.

use super::snoring::SnoringControl;
use super::{DatasetResult, Table};
use crate::git::{end_of_day, is_source_file, VersionControl};
use crate::metrics::{ProcessMetricChain, ProcessMetricsMap, StaticMetrics};
use crate::models::{Commit, Release};
use crate::parsers::{FileOutcome, ParsedMethod};
use crate::szz::BuggyMethodSet;
use crate::timeline::ReleaseTimeline;
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use rayon::prelude::*;
use tracing::{debug, info, warn};

const METADATA_HEADERS: [&str; 6] = ["Version", "ReleaseIndex", "ReleaseData", "File", "Class", "Signature"];
const LABEL_HEADER: &str = "isBuggy";

#[derive(Clone, Copy)]
struct ReleaseSlot<'r> {
    index: usize,
    release: &'r Release,
}

/// Totals of one build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetSummary {
    pub releases_processed: usize,
    pub releases_without_snapshot: usize,
    pub rows: usize,
    pub buggy_rows: usize,
    pub skipped_files: usize,
}

impl DatasetSummary {
    pub fn buggy_percentage(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.buggy_rows as f64 * 100.0 / self.rows as f64
        }
    }
}

pub struct DatasetBuilder<'a> {
    vcs: &'a dyn VersionControl,
    timeline: &'a ReleaseTimeline,
    labels: &'a BuggyMethodSet,
    chain: ProcessMetricChain,
    source_extension: String,
    test_path_marker: String,
    snoring_discard_ratio: f64,
    snoring_keep_only_buggy: bool,
    progress: Option<ProgressBar>,
}

impl<'a> DatasetBuilder<'a> {
    pub fn new(
        vcs: &'a dyn VersionControl,
        timeline: &'a ReleaseTimeline,
        labels: &'a BuggyMethodSet,
        source_extension: &str,
        test_path_marker: &str,
    ) -> Self {
        Self {
            vcs,
            timeline,
            labels,
            chain: ProcessMetricChain::standard(source_extension, test_path_marker),
            source_extension: source_extension.to_string(),
            test_path_marker: test_path_marker.to_string(),
            snoring_discard_ratio: 0.0,
            snoring_keep_only_buggy: false,
            progress: None,
        }
    }

    pub fn with_snoring(mut self, discard_ratio: f64, keep_only_buggy: bool) -> Self {
        self.snoring_discard_ratio = discard_ratio;
        self.snoring_keep_only_buggy = keep_only_buggy;
        self
    }

    pub fn with_chain(mut self, chain: ProcessMetricChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    pub fn headers(&self) -> Vec<String> {
        let mut headers: Vec<String> = METADATA_HEADERS.iter().map(|h| h.to_string()).collect();
        headers.extend(StaticMetrics::HEADERS.iter().map(|h| h.to_string()));
        headers.extend(self.chain.headers(false));
        headers.extend(self.chain.headers(true));
        headers.push(LABEL_HEADER.to_string());
        headers
    }

    /// Walk the timeline and produce the dataset table.
    pub fn build(self) -> Result<(Table, DatasetSummary)> {
        let mut snoring = SnoringControl::new(
            self.timeline.len(),
            self.snoring_discard_ratio,
            self.snoring_keep_only_buggy,
        );
        let mut table = Table::new(self.headers());
        let mut summary = DatasetSummary::default();
        let mut history = ProcessMetricsMap::new();
        let mut previous: Option<&Release> = None;

        for (index, release) in self.timeline.releases().iter().enumerate() {
            if snoring.should_stop(index) {
                info!("Snoring cutoff reached at release {} ({})", index + 1, release.name);
                break;
            }

            let commits = self
                .vcs
                .commits_between(previous.map(|r| end_of_day(r.date)), end_of_day(release.date))
                .with_context(|| format!("Failed to list commits for release {}", release.name))?;
            let interval = self.chain.extract(self.vcs, &commits);
            self.chain.merge_into(&mut history, &interval);
            debug!(
                release = %release.name,
                commits = commits.len(),
                methods = interval.len(),
                "Process metrics collected"
            );

            let snapshot = self
                .vcs
                .last_commit_on_or_before(release.date)
                .with_context(|| format!("Failed to find snapshot for release {}", release.name))?;
            match snapshot {
                Some(snapshot) => {
                    let files = self.parse_snapshot(&snapshot, &mut summary)?;
                    let slot = ReleaseSlot { index, release };
                    let metrics = (&interval, &history);
                    self.write_rows(slot, &files, metrics, &mut snoring, &mut table, &mut summary)?;
                }
                None => {
                    warn!("No commit on or before {} ({}), no rows", release.name, release.date);
                    summary.releases_without_snapshot += 1;
                }
            }

            summary.releases_processed += 1;
            previous = Some(release);
            if let Some(bar) = &self.progress {
                bar.inc(1);
            }
        }

        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }
        snoring.log_report();
        info!(
            rows = summary.rows,
            buggy = summary.buggy_rows,
            "Dataset complete: {:.2}% buggy",
            summary.buggy_percentage()
        );
        Ok((table, summary))
    }

    /// Parse every non-test source file at `snapshot`, sorted by path.
    fn parse_snapshot(
        &self,
        snapshot: &Commit,
        summary: &mut DatasetSummary,
    ) -> Result<Vec<(String, Vec<ParsedMethod>)>> {
        let mut paths = self
            .vcs
            .source_files_at(snapshot, &self.source_extension)
            .with_context(|| format!("Failed to list files at {}", snapshot.short_hash()))?;
        paths.retain(|p| is_source_file(p, &self.source_extension, &self.test_path_marker));
        paths.sort();

        let contents: Vec<(String, anyhow::Result<Option<String>>)> = paths
            .into_iter()
            .map(|path| {
                let content = self.vcs.file_content_at(snapshot, &path);
                (path, content)
            })
            .collect();

        let outcomes: Vec<(String, FileOutcome)> = contents
            .into_par_iter()
            .map(|(path, content)| (path, FileOutcome::from_content(content)))
            .collect();

        let mut files = Vec::with_capacity(outcomes.len());
        for (path, outcome) in outcomes {
            match outcome {
                FileOutcome::Parsed(methods) => files.push((path, methods)),
                FileOutcome::Skipped(reason) => {
                    debug!("Skip {} at {}: {}", path, snapshot.short_hash(), reason);
                    summary.skipped_files += 1;
                }
            }
        }
        Ok(files)
    }

    fn write_rows(
        &self,
        slot: ReleaseSlot<'_>,
        files: &[(String, Vec<ParsedMethod>)],
        (interval, history): (&ProcessMetricsMap, &ProcessMetricsMap),
        snoring: &mut SnoringControl,
        table: &mut Table,
        summary: &mut DatasetSummary,
    ) -> DatasetResult<()> {
        let ReleaseSlot { index, release } = slot;
        for (path, methods) in files {
            for method in methods {
                let buggy = self.labels.is_buggy(&release.name, &method.identity);
                if !snoring.keep_row(index, buggy) {
                    continue;
                }

                let mut row = vec![
                    release.name.clone(),
                    (index + 1).to_string(),
                    release.date.to_string(),
                    path.clone(),
                    method.identity.class_name.clone(),
                    method.identity.full_signature.clone(),
                ];
                row.extend(method.metrics.values().iter().map(u32::to_string));
                row.extend(
                    self.chain
                        .values(interval.get(&method.identity), false)
                        .into_iter()
                        .map(format_number),
                );
                row.extend(
                    self.chain
                        .values(history.get(&method.identity), true)
                        .into_iter()
                        .map(format_number),
                );
                row.push(if buggy { "True" } else { "False" }.to_string());
                table.push_row(row)?;

                summary.rows += 1;
                if buggy {
                    summary.buggy_rows += 1;
                }
            }
        }
        Ok(())
    }
}

/// Integers without a fraction, everything else with up to four decimals.
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{:.4}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiffEdit, MethodIdentity};
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use std::collections::BTreeMap;

    const V1: &str = "package p;\nclass A {\n  void f() {\n    int x = 1;\n  }\n}\n";
    const V2: &str = "package p;\nclass A {\n  void f() {\n    int x = 1;\n    x++;\n  }\n  int g() { return 2; }\n}\n";

    struct Snapshot {
        commit: Commit,
        files: BTreeMap<String, String>,
        edits: BTreeMap<String, Vec<DiffEdit>>,
    }

    /// Linear history where each commit replaces the full file set.
    struct LinearVcs {
        snapshots: Vec<Snapshot>,
    }

    impl LinearVcs {
        fn find(&self, commit: &Commit) -> Option<&Snapshot> {
            self.snapshots.iter().find(|s| s.commit.hash == commit.hash)
        }
    }

    impl VersionControl for LinearVcs {
        fn commits_referencing(&self, _key: &str) -> Result<Vec<Commit>> {
            Ok(Vec::new())
        }

        fn diff_edits(&self, commit: &Commit) -> Result<BTreeMap<String, Vec<DiffEdit>>> {
            Ok(self.find(commit).map(|s| s.edits.clone()).unwrap_or_default())
        }

        fn file_content_at(&self, commit: &Commit, path: &str) -> Result<Option<String>> {
            Ok(self.find(commit).and_then(|s| s.files.get(path).cloned()))
        }

        fn commits_between(
            &self,
            after: Option<DateTime<Utc>>,
            until: DateTime<Utc>,
        ) -> Result<Vec<Commit>> {
            Ok(self
                .snapshots
                .iter()
                .map(|s| s.commit.clone())
                .filter(|c| after.map_or(true, |a| c.timestamp > a) && c.timestamp <= until)
                .collect())
        }

        fn last_commit_on_or_before(&self, date: NaiveDate) -> Result<Option<Commit>> {
            let until = end_of_day(date);
            Ok(self
                .snapshots
                .iter()
                .rev()
                .map(|s| &s.commit)
                .find(|c| c.timestamp <= until)
                .cloned())
        }

        fn source_files_at(&self, commit: &Commit, extension: &str) -> Result<Vec<String>> {
            Ok(self
                .find(commit)
                .map(|s| s.files.keys().filter(|p| p.ends_with(extension)).cloned().collect())
                .unwrap_or_default())
        }
    }

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + chrono::Days::new(n as u64)
    }

    fn snapshot(hash: &str, author: &str, at_day: i64, source: &str, edit: DiffEdit) -> Snapshot {
        let mut files = BTreeMap::new();
        files.insert("src/p/A.java".to_string(), source.to_string());
        files.insert("src/test/p/ATest.java".to_string(), "class ATest { void t() {} }".to_string());
        let mut edits = BTreeMap::new();
        edits.insert("src/p/A.java".to_string(), vec![edit]);
        Snapshot {
            commit: Commit {
                hash: hash.into(),
                message: String::new(),
                author: author.into(),
                timestamp: Utc.from_utc_datetime(&day(at_day).and_hms_opt(12, 0, 0).unwrap()),
            },
            files,
            edits,
        }
    }

    fn fixture() -> (LinearVcs, ReleaseTimeline) {
        let vcs = LinearVcs {
            snapshots: vec![
                snapshot("c1", "ann", 1, V1, DiffEdit::new("src/p/A.java", 0..0, 0..6)),
                // adds `x++;` inside f() and the new g()
                snapshot("c2", "bob", 12, V2, DiffEdit::new("src/p/A.java", 4..4, 4..7)),
            ],
        };
        let timeline = ReleaseTimeline::new(vec![
            Release::new("R1", day(5)),
            Release::new("R2", day(15)),
            Release::new("R3", day(25)),
        ]);
        (vcs, timeline)
    }

    fn cell<'t>(table: &'t Table, row: usize, column: &str) -> &'t str {
        let idx = table.column_index(column).unwrap();
        &table.rows()[row][idx]
    }

    #[test]
    fn test_rows_join_static_process_and_labels() {
        let (vcs, timeline) = fixture();
        let mut labels = BuggyMethodSet::new();
        let f = MethodIdentity::new("p.A.f()", "p.A", "f");
        labels.mark("R2", [&f]);

        let (table, summary) = DatasetBuilder::new(&vcs, &timeline, &labels, ".java", "/test/")
            .build()
            .unwrap();

        // R1: f; R2: f, g; R3: f, g (test file excluded everywhere)
        assert_eq!(summary.rows, 5);
        assert_eq!(summary.buggy_rows, 1);
        assert_eq!(summary.releases_processed, 3);

        assert_eq!(cell(&table, 0, "Version"), "R1");
        assert_eq!(cell(&table, 0, "ReleaseIndex"), "1");
        assert_eq!(cell(&table, 0, "File"), "src/p/A.java");
        assert_eq!(cell(&table, 0, "Signature"), "p.A.f()");
        assert_eq!(cell(&table, 0, "NR"), "1");
        assert_eq!(cell(&table, 0, "isBuggy"), "False");

        // R2 row for f: one local revision, two global
        assert_eq!(cell(&table, 1, "Signature"), "p.A.f()");
        assert_eq!(cell(&table, 1, "NR"), "1");
        assert_eq!(cell(&table, 1, "NAuth"), "1");
        assert_eq!(cell(&table, 1, "Global_NR"), "2");
        assert_eq!(cell(&table, 1, "Global_NAuth"), "2");
        assert_eq!(cell(&table, 1, "isBuggy"), "True");

        // R3 has no commits of its own
        assert_eq!(cell(&table, 3, "NR"), "0");
        assert_eq!(cell(&table, 3, "Global_NR"), "2");
        assert_eq!(cell(&table, 3, "isBuggy"), "False");
    }

    #[test]
    fn test_header_layout() {
        let (vcs, timeline) = fixture();
        let labels = BuggyMethodSet::new();
        let builder = DatasetBuilder::new(&vcs, &timeline, &labels, ".java", "/test/");
        let headers = builder.headers();
        assert_eq!(&headers[..7], &["Version", "ReleaseIndex", "ReleaseData", "File", "Class", "Signature", "LOC"]);
        assert_eq!(headers.last().map(String::as_str), Some("isBuggy"));
        let nr = headers.iter().position(|h| h == "NR").unwrap();
        let global_nr = headers.iter().position(|h| h == "Global_NR").unwrap();
        assert!(nr < global_nr);
    }

    #[test]
    fn test_snoring_cutoff_stops_generation() {
        let (vcs, timeline) = fixture();
        let labels = BuggyMethodSet::new();
        let (table, summary) = DatasetBuilder::new(&vcs, &timeline, &labels, ".java", "/test/")
            .with_snoring(0.66, false)
            .build()
            .unwrap();
        // round(3 * 0.34) = 1 release kept
        assert_eq!(summary.releases_processed, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_release_before_first_commit_has_no_rows() {
        let (vcs, _) = fixture();
        let timeline = ReleaseTimeline::new(vec![Release::new("R0", day(0)), Release::new("R1", day(5))]);
        let labels = BuggyMethodSet::new();
        let (table, summary) = DatasetBuilder::new(&vcs, &timeline, &labels, ".java", "/test/")
            .build()
            .unwrap();
        assert_eq!(summary.releases_without_snapshot, 1);
        assert_eq!(table.len(), 1);
        assert_eq!(cell(&table, 0, "Version"), "R1");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(1.0 / 3.0), "0.3333");
        assert_eq!(format_number(0.0), "0");
    }
}
