//! Process (history) metrics per method
//!
//! Commits are replayed oldest first. Each commit's edits are mapped onto
//! the methods of the file as it existed at that commit, and every metric in
//! the chain updates its accumulator once per (commit, method).

use crate::git::{is_source_file, VersionControl};
use crate::matcher::{attribute_edits, MatchPolicy};
use crate::models::{Commit, DiffEdit, MethodIdentity};
use crate::parsers::FileOutcome;
use rayon::prelude::*;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// Which summary of a per-commit value to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricStat {
    Sum,
    Max,
    /// Sum divided by the number of revisions
    Avg,
}

pub const ALL_STATS: [MetricStat; 3] = [MetricStat::Sum, MetricStat::Max, MetricStat::Avg];

const NR_KEY: &str = "NR";

/// Accumulated history of one method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodProcessMetrics {
    values: BTreeMap<String, f64>,
    sets: BTreeMap<String, BTreeSet<String>>,
}

impl MethodProcessMetrics {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn increase(&mut self, key: &str, amount: f64) {
        *self.values.entry(key.to_string()).or_insert(0.0) += amount;
    }

    pub fn update_max(&mut self, key: &str, candidate: f64) {
        let slot = self.values.entry(key.to_string()).or_insert(candidate);
        *slot = slot.max(candidate);
    }

    pub fn add_to_set(&mut self, key: &str, item: &str) {
        let set = self.sets.entry(key.to_string()).or_default();
        set.insert(item.to_string());
        let len = set.len() as f64;
        self.values.insert(key.to_string(), len);
    }

    pub fn set(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.sets.get(key)
    }
}

/// One link of the metric chain.
pub trait ProcessMetric: Send + Sync {
    fn name(&self) -> &str;

    /// Record one commit that touched the method.
    fn update(&self, acc: &mut MethodProcessMetrics, commit: &Commit, added: u32, deleted: u32);

    /// Fold an interval's accumulator into the running history.
    fn merge(&self, history: &mut MethodProcessMetrics, interval: &MethodProcessMetrics);

    fn headers(&self, global: bool) -> Vec<String>;

    /// Column values; `None` means the method was never touched.
    fn values(&self, acc: Option<&MethodProcessMetrics>, global: bool) -> Vec<f64>;
}

/// Number of revisions (NR).
#[derive(Debug, Default)]
pub struct Revisions;

impl ProcessMetric for Revisions {
    fn name(&self) -> &str {
        NR_KEY
    }

    fn update(&self, acc: &mut MethodProcessMetrics, _commit: &Commit, _added: u32, _deleted: u32) {
        acc.increase(NR_KEY, 1.0);
    }

    fn merge(&self, history: &mut MethodProcessMetrics, interval: &MethodProcessMetrics) {
        if let Some(n) = interval.get(NR_KEY) {
            history.increase(NR_KEY, n);
        }
    }

    fn headers(&self, _global: bool) -> Vec<String> {
        vec![NR_KEY.to_string()]
    }

    fn values(&self, acc: Option<&MethodProcessMetrics>, _global: bool) -> Vec<f64> {
        vec![acc.and_then(|a| a.get(NR_KEY)).unwrap_or(0.0)]
    }
}

/// Distinct authors (NAuth).
#[derive(Debug, Default)]
pub struct Authors;

const NAUTH_KEY: &str = "NAuth";

impl ProcessMetric for Authors {
    fn name(&self) -> &str {
        NAUTH_KEY
    }

    fn update(&self, acc: &mut MethodProcessMetrics, commit: &Commit, _added: u32, _deleted: u32) {
        acc.add_to_set(NAUTH_KEY, &commit.author);
    }

    fn merge(&self, history: &mut MethodProcessMetrics, interval: &MethodProcessMetrics) {
        if let Some(authors) = interval.set(NAUTH_KEY) {
            for author in authors {
                history.add_to_set(NAUTH_KEY, author);
            }
        }
    }

    fn headers(&self, _global: bool) -> Vec<String> {
        vec![NAUTH_KEY.to_string()]
    }

    fn values(&self, acc: Option<&MethodProcessMetrics>, _global: bool) -> Vec<f64> {
        vec![acc.and_then(|a| a.get(NAUTH_KEY)).unwrap_or(0.0)]
    }
}

/// Per-commit line count a [`LineMetric`] measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMeasure {
    Added,
    Deleted,
    /// Added plus deleted
    Churn,
}

impl LineMeasure {
    fn of(self, added: u32, deleted: u32) -> f64 {
        match self {
            LineMeasure::Added => added as f64,
            LineMeasure::Deleted => deleted as f64,
            LineMeasure::Churn => (added + deleted) as f64,
        }
    }
}

/// A line-count metric reporting a configurable set of stats.
#[derive(Debug, Clone)]
pub struct LineMetric {
    name: String,
    max_name: String,
    measure: LineMeasure,
    local: Vec<MetricStat>,
    global: Vec<MetricStat>,
}

impl LineMetric {
    pub fn new(name: &str, measure: LineMeasure, local: &[MetricStat], global: &[MetricStat]) -> Self {
        // Column order is always SUM, MAX, AVG.
        let ordered = |stats: &[MetricStat]| -> Vec<MetricStat> {
            ALL_STATS.iter().copied().filter(|s| stats.contains(s)).collect()
        };
        Self {
            name: name.to_string(),
            max_name: format!("MAX_{}", name),
            measure,
            local: ordered(local),
            global: ordered(global),
        }
    }

    pub fn loc_added() -> Self {
        Self::new("LOC_Added", LineMeasure::Added, &ALL_STATS, &ALL_STATS)
    }

    pub fn loc_deleted() -> Self {
        Self::new("LOC_Deleted", LineMeasure::Deleted, &ALL_STATS, &ALL_STATS)
    }

    pub fn churn() -> Self {
        Self::new("Churn", LineMeasure::Churn, &ALL_STATS, &ALL_STATS)
    }

    fn stats(&self, global: bool) -> &[MetricStat] {
        if global {
            &self.global
        } else {
            &self.local
        }
    }
}

impl ProcessMetric for LineMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&self, acc: &mut MethodProcessMetrics, _commit: &Commit, added: u32, deleted: u32) {
        let value = self.measure.of(added, deleted);
        acc.increase(&self.name, value);
        acc.update_max(&self.max_name, value);
    }

    fn merge(&self, history: &mut MethodProcessMetrics, interval: &MethodProcessMetrics) {
        if let Some(sum) = interval.get(&self.name) {
            history.increase(&self.name, sum);
        }
        if let Some(max) = interval.get(&self.max_name) {
            history.update_max(&self.max_name, max);
        }
    }

    fn headers(&self, global: bool) -> Vec<String> {
        self.stats(global)
            .iter()
            .map(|stat| match stat {
                MetricStat::Sum => self.name.clone(),
                MetricStat::Max => self.max_name.clone(),
                MetricStat::Avg => format!("AVG_{}", self.name),
            })
            .collect()
    }

    fn values(&self, acc: Option<&MethodProcessMetrics>, global: bool) -> Vec<f64> {
        let stats = self.stats(global);
        let Some(acc) = acc else {
            return vec![0.0; stats.len()];
        };
        let sum = acc.get(&self.name).unwrap_or(0.0);
        let max = acc.get(&self.max_name).unwrap_or(0.0);
        let revisions = acc.get(NR_KEY).unwrap_or(0.0);
        stats
            .iter()
            .map(|stat| match stat {
                MetricStat::Sum => sum,
                MetricStat::Max => max,
                MetricStat::Avg if revisions > 0.0 => sum / revisions,
                MetricStat::Avg => 0.0,
            })
            .collect()
    }
}

pub type ProcessMetricsMap = HashMap<MethodIdentity, MethodProcessMetrics>;

/// Ordered chain of process metrics. Registration order is column order.
pub struct ProcessMetricChain {
    metrics: Vec<Box<dyn ProcessMetric>>,
    source_extension: String,
    test_path_marker: String,
}

impl ProcessMetricChain {
    pub fn new(source_extension: &str, test_path_marker: &str) -> Self {
        Self {
            metrics: Vec::new(),
            source_extension: source_extension.to_string(),
            test_path_marker: test_path_marker.to_string(),
        }
    }

    /// NR, NAuth, LOC_Added, LOC_Deleted and Churn with every stat.
    pub fn standard(source_extension: &str, test_path_marker: &str) -> Self {
        let mut chain = Self::new(source_extension, test_path_marker);
        chain.register(Box::new(Revisions));
        chain.register(Box::new(Authors));
        chain.register(Box::new(LineMetric::loc_added()));
        chain.register(Box::new(LineMetric::loc_deleted()));
        chain.register(Box::new(LineMetric::churn()));
        chain
    }

    pub fn register(&mut self, metric: Box<dyn ProcessMetric>) {
        self.metrics.push(metric);
    }

    /// Replay `commits` and accumulate per-method metrics.
    pub fn extract(&self, vcs: &dyn VersionControl, commits: &[Commit]) -> ProcessMetricsMap {
        let mut map = ProcessMetricsMap::new();
        for commit in commits {
            self.analyze_commit(vcs, commit, &mut map);
        }
        map
    }

    fn analyze_commit(&self, vcs: &dyn VersionControl, commit: &Commit, map: &mut ProcessMetricsMap) {
        let edits = match vcs.diff_edits(commit) {
            Ok(edits) => edits,
            Err(e) => {
                warn!("Cannot diff {}: {:#}", commit.short_hash(), e);
                return;
            }
        };

        let files: Vec<(String, Vec<DiffEdit>, anyhow::Result<Option<String>>)> = edits
            .into_iter()
            .filter(|(path, _)| is_source_file(path, &self.source_extension, &self.test_path_marker))
            .map(|(path, file_edits)| {
                let content = vcs.file_content_at(commit, &path);
                (path, file_edits, content)
            })
            .collect();

        // (added, deleted) per method for this commit
        let per_file: Vec<Vec<(MethodIdentity, u32, u32)>> = files
            .into_par_iter()
            .map(|(path, file_edits, content)| match FileOutcome::from_content(content) {
                FileOutcome::Parsed(methods) => {
                    let mut lines: BTreeMap<usize, (u32, u32)> = BTreeMap::new();
                    for (idx, edit) in attribute_edits(&methods, &file_edits, MatchPolicy::First) {
                        let slot = lines.entry(idx).or_default();
                        slot.0 += edit.lines_added();
                        slot.1 += edit.lines_deleted();
                    }
                    lines
                        .into_iter()
                        .map(|(idx, (a, d))| (methods[idx].identity.clone(), a, d))
                        .collect()
                }
                FileOutcome::Skipped(reason) => {
                    debug!("Skip file {} on commit {}: {}", path, commit.short_hash(), reason);
                    Vec::new()
                }
            })
            .collect();

        for (identity, added, deleted) in per_file.into_iter().flatten() {
            let acc = map.entry(identity).or_default();
            for metric in &self.metrics {
                metric.update(acc, commit, added, deleted);
            }
        }
    }

    /// Fold one interval into the global history.
    pub fn merge_into(&self, history: &mut ProcessMetricsMap, interval: &ProcessMetricsMap) {
        for (identity, current) in interval {
            let entry = history.entry(identity.clone()).or_default();
            for metric in &self.metrics {
                metric.merge(entry, current);
            }
        }
    }

    /// Column names; global ones carry the `Global_` prefix.
    pub fn headers(&self, global: bool) -> Vec<String> {
        self.metrics
            .iter()
            .flat_map(|m| m.headers(global))
            .map(|h| if global { format!("Global_{}", h) } else { h })
            .collect()
    }

    pub fn values(&self, acc: Option<&MethodProcessMetrics>, global: bool) -> Vec<f64> {
        self.metrics.iter().flat_map(|m| m.values(acc, global)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn commit(hash: &str, author: &str) -> Commit {
        Commit {
            hash: hash.into(),
            message: String::new(),
            author: author.into(),
            timestamp: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_headers_order_and_prefix() {
        let chain = ProcessMetricChain::standard(".java", "/test/");
        let local = chain.headers(false);
        assert_eq!(&local[..5], &["NR", "NAuth", "LOC_Added", "MAX_LOC_Added", "AVG_LOC_Added"]);
        assert_eq!(local.len(), 2 + 3 * 3);

        let global = chain.headers(true);
        assert_eq!(global[0], "Global_NR");
        assert_eq!(global.last().map(String::as_str), Some("Global_AVG_Churn"));
    }

    #[test]
    fn test_untouched_method_gets_zeros() {
        let chain = ProcessMetricChain::standard(".java", "/test/");
        let values = chain.values(None, false);
        assert_eq!(values.len(), chain.headers(false).len());
        assert!(values.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_update_and_merge() {
        let metric = LineMetric::churn();
        let mut interval = MethodProcessMetrics::default();
        Revisions.update(&mut interval, &commit("a", "x"), 3, 1);
        metric.update(&mut interval, &commit("a", "x"), 3, 1);
        Revisions.update(&mut interval, &commit("b", "y"), 1, 1);
        metric.update(&mut interval, &commit("b", "y"), 1, 1);

        // SUM 6, MAX 4, AVG 3
        assert_eq!(metric.values(Some(&interval), false), vec![6.0, 4.0, 3.0]);

        let mut history = MethodProcessMetrics::default();
        Revisions.merge(&mut history, &interval);
        metric.merge(&mut history, &interval);
        Revisions.merge(&mut history, &interval);
        metric.merge(&mut history, &interval);
        assert_eq!(metric.values(Some(&history), true), vec![12.0, 4.0, 3.0]);
    }

    #[test]
    fn test_authors_are_distinct_across_merge() {
        let mut a = MethodProcessMetrics::default();
        Authors.update(&mut a, &commit("1", "ann"), 0, 0);
        Authors.update(&mut a, &commit("2", "ann"), 0, 0);
        let mut b = MethodProcessMetrics::default();
        Authors.update(&mut b, &commit("3", "bob"), 0, 0);
        Authors.update(&mut b, &commit("4", "ann"), 0, 0);

        let mut history = MethodProcessMetrics::default();
        Authors.merge(&mut history, &a);
        Authors.merge(&mut history, &b);
        assert_eq!(Authors.values(Some(&history), true), vec![2.0]);
    }

    #[test]
    fn test_configurable_stats() {
        let metric = LineMetric::new(
            "LOC_Added",
            LineMeasure::Added,
            &[MetricStat::Avg, MetricStat::Sum],
            &[MetricStat::Max],
        );
        assert_eq!(metric.headers(false), vec!["LOC_Added", "AVG_LOC_Added"]);
        assert_eq!(metric.headers(true), vec!["MAX_LOC_Added"]);
        assert_eq!(metric.values(None, true), vec![0.0]);
    }
}
