//! SZZ bug-injection attribution
//!
//! Maps each fixed defect report to the releases in which the defect was
//! present and marks the methods its fix commits touched as buggy there.
//!
//! # Per-ticket flow
//!
//! 1. Anchors: opening release OV and fix release FV from the ticket dates.
//! 2. Injected release IV from the earliest affected version (fed to the
//!    estimator) or, lacking one, estimated.
//! 3. Fix commits referencing the key, parsed at each commit and matched to
//!    methods through their diff edits.
//! 4. Touched methods are buggy in every release of `[IV, FV)`.
//!
//! Tickets are handled in ascending resolution order so the estimator only
//! ever learns from what was known at the time.

pub mod estimator;
pub mod labels;

pub use estimator::{FixedProportion, IncrementalProportion, InjectedVersionEstimator};
pub use labels::BuggyMethodSet;

use crate::config::{EstimatorKind, ProjectSection, SzzConfig};
use crate::git::{end_of_day, is_source_file, VersionControl};
use crate::matcher::{touched_methods, MatchPolicy};
use crate::models::{Commit, DefectReport, DiffEdit, MethodIdentity};
use crate::parsers::FileOutcome;
use crate::timeline::ReleaseTimeline;
use chrono::TimeDelta;
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Build the estimator selected in config.
pub fn estimator_from_config(config: &SzzConfig) -> Box<dyn InjectedVersionEstimator> {
    match config.estimator {
        EstimatorKind::Incremental => Box::new(IncrementalProportion::new(
            config.window_size,
            config.default_proportion,
            config.max_proportion,
        )),
        EstimatorKind::Fixed => Box::new(FixedProportion::new(config.fixed_proportion)),
    }
}

/// Knobs of one attribution run.
#[derive(Debug, Clone)]
pub struct SzzOptions {
    pub source_extension: String,
    pub test_path_marker: String,
    pub match_policy: MatchPolicy,
    pub prefer_declared_fix_version: bool,
    pub fix_commit_grace_days: i64,
    pub recover_unlinked_commits: bool,
}

impl Default for SzzOptions {
    fn default() -> Self {
        Self::from_config(&ProjectSection::default(), &SzzConfig::default())
    }
}

impl SzzOptions {
    pub fn from_config(project: &ProjectSection, szz: &SzzConfig) -> Self {
        Self {
            source_extension: project.source_extension.clone(),
            test_path_marker: project.test_path_marker.clone(),
            match_policy: szz.match_policy,
            prefer_declared_fix_version: szz.prefer_declared_fix_version,
            fix_commit_grace_days: szz.fix_commit_grace_days,
            recover_unlinked_commits: szz.recover_unlinked_commits,
        }
    }
}

/// Where a ticket's injected release came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectedSource {
    GroundTruth,
    Estimated,
}

/// Releases and evidence for an attributed ticket. Positions are release indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribution {
    pub opening: usize,
    pub fixed: usize,
    pub injected: usize,
    pub injected_source: InjectedSource,
    pub fix_commits: usize,
    pub methods: usize,
    pub skipped_files: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoOpeningRelease,
    NoFixRelease,
    NoFixCommits,
    CommitLookupFailed(String),
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::NoOpeningRelease => "no_opening_release",
            SkipReason::NoFixRelease => "no_fix_release",
            SkipReason::NoFixCommits => "no_fix_commits",
            SkipReason::CommitLookupFailed(_) => "commit_lookup_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketOutcome {
    Attributed(Attribution),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketRecord {
    pub key: String,
    pub outcome: TicketOutcome,
}

/// Input and outcome counters of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttributionStats {
    pub tickets: usize,
    pub with_fix_versions: usize,
    pub with_affected_versions: usize,
    pub processed: usize,
    pub ground_truth: usize,
    pub estimated: usize,
    pub proportion_samples: usize,
    pub skipped_files: usize,
    pub skips: BTreeMap<String, usize>,
}

impl AttributionStats {
    fn log_summary(&self) {
        let share = if self.processed == 0 {
            0.0
        } else {
            self.ground_truth as f64 * 100.0 / self.processed as f64
        };
        info!(
            tickets = self.tickets,
            with_fix_versions = self.with_fix_versions,
            without_fix_versions = self.tickets - self.with_fix_versions,
            with_affected_versions = self.with_affected_versions,
            without_affected_versions = self.tickets - self.with_affected_versions,
            processed = self.processed,
            "SZZ input summary"
        );
        info!(
            "Processed {} tickets, {:.1}% with ground-truth affected versions, {} proportion samples",
            self.processed, share, self.proportion_samples
        );
        for (reason, count) in &self.skips {
            info!("Skipped {} tickets: {}", count, reason);
        }
    }
}

/// Result of one attribution run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AttributionRun {
    pub buggy: BuggyMethodSet,
    pub tickets: Vec<TicketRecord>,
    pub stats: AttributionStats,
}

/// SZZ engine over a version-control collaborator and a release timeline.
pub struct SzzEngine<'a> {
    vcs: &'a dyn VersionControl,
    timeline: &'a ReleaseTimeline,
    options: SzzOptions,
    progress: Option<ProgressBar>,
}

impl<'a> SzzEngine<'a> {
    pub fn new(vcs: &'a dyn VersionControl, timeline: &'a ReleaseTimeline, options: SzzOptions) -> Self {
        Self {
            vcs,
            timeline,
            options,
            progress: None,
        }
    }

    /// Report per-ticket progress on `bar`.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    /// Attribute every ticket, oldest resolution first.
    pub fn run(
        &self,
        tickets: &[DefectReport],
        estimator: &mut dyn InjectedVersionEstimator,
    ) -> AttributionRun {
        let mut ordered: Vec<&DefectReport> = tickets.iter().collect();
        ordered.sort_by(|a, b| a.resolved.cmp(&b.resolved).then_with(|| a.key.cmp(&b.key)));

        let mut run = AttributionRun::default();
        run.stats.tickets = tickets.len();
        run.stats.with_fix_versions = tickets.iter().filter(|t| !t.fix_versions.is_empty()).count();
        run.stats.with_affected_versions = tickets
            .iter()
            .filter(|t| !t.affected_versions.is_empty())
            .count();

        info!(
            "Attributing {} tickets with the {} estimator",
            tickets.len(),
            estimator.name()
        );

        for ticket in ordered {
            let outcome = self.attribute(ticket, estimator, &mut run);
            match &outcome {
                TicketOutcome::Attributed(a) => {
                    run.stats.processed += 1;
                    run.stats.skipped_files += a.skipped_files;
                    match a.injected_source {
                        InjectedSource::GroundTruth => run.stats.ground_truth += 1,
                        InjectedSource::Estimated => run.stats.estimated += 1,
                    }
                }
                TicketOutcome::Skipped(reason) => {
                    warn!("Skipping {}: {}", ticket.key, reason.label());
                    *run.stats.skips.entry(reason.label().to_string()).or_default() += 1;
                }
            }
            run.tickets.push(TicketRecord {
                key: ticket.key.clone(),
                outcome,
            });
            if let Some(bar) = &self.progress {
                bar.inc(1);
            }
        }

        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }
        run.stats.log_summary();
        run
    }

    fn attribute(
        &self,
        ticket: &DefectReport,
        estimator: &mut dyn InjectedVersionEstimator,
        run: &mut AttributionRun,
    ) -> TicketOutcome {
        let timeline = self.timeline;
        let Some(last_index) = timeline.last_index() else {
            return TicketOutcome::Skipped(SkipReason::NoFixRelease);
        };

        let declared = self
            .options
            .prefer_declared_fix_version
            .then(|| timeline.latest_of(&ticket.fix_versions))
            .flatten();
        let fixed = declared.or_else(|| {
            timeline
                .release_on_or_after(ticket.resolved)
                .and_then(|r| timeline.index_of(r))
        });
        let Some(fixed) = fixed else {
            return TicketOutcome::Skipped(SkipReason::NoFixRelease);
        };
        let Some(opening) = timeline
            .release_on_or_after(ticket.created)
            .and_then(|r| timeline.index_of(r))
        else {
            return TicketOutcome::Skipped(SkipReason::NoOpeningRelease);
        };

        let (mut injected, injected_source) = match timeline.earliest_of(&ticket.affected_versions) {
            Some(iv) => {
                if estimator.learn(iv, fixed, opening) {
                    run.stats.proportion_samples += 1;
                }
                (iv, InjectedSource::GroundTruth)
            }
            None => (
                estimator.estimate(fixed, opening, last_index),
                InjectedSource::Estimated,
            ),
        };
        if injected > fixed {
            injected = fixed;
        }

        let commits = match self.fix_commits(ticket) {
            Ok(commits) => commits,
            Err(e) => {
                return TicketOutcome::Skipped(SkipReason::CommitLookupFailed(format!("{:#}", e)))
            }
        };
        if commits.is_empty() {
            return TicketOutcome::Skipped(SkipReason::NoFixCommits);
        }

        let mut touched: HashSet<MethodIdentity> = HashSet::new();
        let mut skipped_files = 0;
        for commit in &commits {
            skipped_files += self.collect_touched(commit, &mut touched);
        }

        for release in &timeline.releases()[injected..fixed] {
            run.buggy.mark(&release.name, &touched);
        }
        debug!(
            key = %ticket.key,
            injected,
            opening,
            fixed,
            methods = touched.len(),
            "Attributed ticket"
        );

        TicketOutcome::Attributed(Attribution {
            opening,
            fixed,
            injected,
            injected_source,
            fix_commits: commits.len(),
            methods: touched.len(),
            skipped_files,
        })
    }

    /// Commits referencing the key, minus late mentions, plus recovered ones.
    fn fix_commits(&self, ticket: &DefectReport) -> anyhow::Result<Vec<Commit>> {
        let grace_end = ticket
            .resolved
            .checked_add_signed(TimeDelta::days(self.options.fix_commit_grace_days))
            .unwrap_or(ticket.resolved);
        let limit = end_of_day(grace_end);

        let mut commits: Vec<Commit> = self
            .vcs
            .commits_referencing(&ticket.key)?
            .into_iter()
            .filter(|c| {
                let keep = c.timestamp <= limit;
                if !keep {
                    debug!("{} mentions {} after resolution, ignored", c.short_hash(), ticket.key);
                }
                keep
            })
            .collect();

        if self.options.recover_unlinked_commits && !commits.is_empty() {
            let recovered = self.recover_unlinked(ticket, &commits)?;
            if !recovered.is_empty() {
                debug!("Recovered {} unlinked commits for {}", recovered.len(), ticket.key);
            }
            commits.extend(recovered);
        }
        Ok(commits)
    }

    /// Same-author commits in the ticket's lifetime touching the same source files.
    fn recover_unlinked(&self, ticket: &DefectReport, linked: &[Commit]) -> anyhow::Result<Vec<Commit>> {
        let authors: HashSet<&str> = linked.iter().map(|c| c.author.as_str()).collect();
        let mut files: HashSet<String> = HashSet::new();
        for commit in linked {
            files.extend(
                self.vcs
                    .touched_paths(commit)?
                    .into_iter()
                    .filter(|p| self.is_source(p)),
            );
        }

        let after = ticket
            .created
            .pred_opt()
            .map(end_of_day);
        let candidates = self.vcs.commits_between(after, end_of_day(ticket.resolved))?;

        let mut recovered = Vec::new();
        for candidate in candidates {
            if linked.contains(&candidate) || !authors.contains(candidate.author.as_str()) {
                continue;
            }
            let touches_same = self
                .vcs
                .touched_paths(&candidate)?
                .iter()
                .any(|p| files.contains(p));
            if touches_same {
                recovered.push(candidate);
            }
        }
        Ok(recovered)
    }

    fn is_source(&self, path: &str) -> bool {
        is_source_file(path, &self.options.source_extension, &self.options.test_path_marker)
    }

    /// Add methods touched by `commit` to `touched`; returns skipped file count.
    fn collect_touched(&self, commit: &Commit, touched: &mut HashSet<MethodIdentity>) -> usize {
        let edits = match self.vcs.diff_edits(commit) {
            Ok(edits) => edits,
            Err(e) => {
                warn!("Cannot diff {}: {:#}", commit.short_hash(), e);
                return 0;
            }
        };

        // Content is read sequentially; parsing fans out.
        let files: Vec<(String, Vec<DiffEdit>, anyhow::Result<Option<String>>)> = edits
            .into_iter()
            .filter(|(path, _)| self.is_source(path))
            .map(|(path, file_edits)| {
                let content = self.vcs.file_content_at(commit, &path);
                (path, file_edits, content)
            })
            .collect();

        let policy = self.options.match_policy;
        let results: Vec<(String, Result<Vec<MethodIdentity>, String>)> = files
            .into_par_iter()
            .map(|(path, file_edits, content)| {
                let result = match FileOutcome::from_content(content) {
                    FileOutcome::Parsed(methods) => Ok(touched_methods(&methods, &file_edits, policy)
                        .into_iter()
                        .map(|m| m.identity.clone())
                        .collect()),
                    FileOutcome::Skipped(reason) => Err(reason.to_string()),
                };
                (path, result)
            })
            .collect();

        let mut skipped = 0;
        for (path, result) in results {
            match result {
                Ok(methods) => touched.extend(methods),
                Err(reason) => {
                    debug!("Skipping {} at {}: {}", path, commit.short_hash(), reason);
                    skipped += 1;
                }
            }
        }
        skipped
    }
}
