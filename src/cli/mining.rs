//! `labels` and `dataset`: mine the issue tracker and the repository

use super::{progress_bar, project_key};
use crate::config::BugtrailConfig;
use crate::dataset::DatasetBuilder;
use crate::git::GitHistory;
use crate::issues::{IssueTracker, JiraClient, SnapshotTracker};
use crate::models::DefectReport;
use crate::szz::{estimator_from_config, AttributionRun, SzzEngine, SzzOptions};
use crate::timeline::ReleaseTimeline;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::info;

/// Issue data and the repository of one project.
struct Project {
    key: String,
    timeline: ReleaseTimeline,
    tickets: Vec<DefectReport>,
    history: GitHistory,
}

impl Project {
    fn load(config: &BugtrailConfig) -> Result<Self> {
        let key = project_key(config)?.to_string();

        let tracker: Box<dyn IssueTracker> = match &config.issues.snapshot {
            Some(path) => Box::new(
                SnapshotTracker::load(path)
                    .with_context(|| format!("Failed to load issue snapshot {}", path.display()))?,
            ),
            None => Box::new(JiraClient::new(
                config.issues.jira_url.clone(),
                config.issues.page_size,
            )),
        };

        let releases = tracker
            .releases(&key)
            .with_context(|| format!("Failed to fetch releases of {}", key))?;
        if releases.is_empty() {
            anyhow::bail!("Project {} has no dated releases", key);
        }
        let tickets = tracker
            .defect_reports(&key)
            .with_context(|| format!("Failed to fetch defect reports of {}", key))?;
        let timeline = ReleaseTimeline::new(releases);
        info!(releases = timeline.len(), tickets = tickets.len(), "Loaded issue data for {}", key);

        let history = GitHistory::open(&config.project.repo_path).with_context(|| {
            format!("Failed to open repository {}", config.project.repo_path.display())
        })?;

        Ok(Self {
            key,
            timeline,
            tickets,
            history,
        })
    }

    fn attribute(&self, config: &BugtrailConfig) -> AttributionRun {
        let options = SzzOptions::from_config(&config.project, &config.szz);
        let mut estimator = estimator_from_config(&config.szz);
        SzzEngine::new(&self.history, &self.timeline, options)
            .with_progress(progress_bar(self.tickets.len(), "tickets"))
            .run(&self.tickets, estimator.as_mut())
    }
}

#[derive(Serialize)]
struct LabelsReport<'a> {
    project: &'a str,
    releases: BTreeMap<String, BTreeSet<String>>,
    stats: &'a crate::szz::AttributionStats,
}

pub(super) fn run_labels(config: &BugtrailConfig, output: Option<PathBuf>) -> Result<()> {
    let project = Project::load(config)?;
    let run = project.attribute(config);

    let report = LabelsReport {
        project: &project.key,
        releases: run.buggy.to_sorted(),
        stats: &run.stats,
    };
    let path = output.unwrap_or_else(|| PathBuf::from(format!("{}_labels.json", project.key)));
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&path, json).with_context(|| format!("Cannot write {}", path.display()))?;
    info!("Wrote labels to {}", path.display());
    Ok(())
}

pub(super) fn run_dataset(config: &BugtrailConfig, output: Option<PathBuf>) -> Result<()> {
    let project = Project::load(config)?;
    let run = project.attribute(config);

    let (table, summary) = DatasetBuilder::new(
        &project.history,
        &project.timeline,
        &run.buggy,
        &config.project.source_extension,
        &config.project.test_path_marker,
    )
    .with_snoring(
        config.dataset.snoring_discard_ratio,
        config.dataset.snoring_keep_only_buggy,
    )
    .with_progress(progress_bar(project.timeline.len(), "releases"))
    .build()?;

    let path = output.unwrap_or_else(|| config.dataset.output_path(&project.key));
    table
        .write_csv(&path)
        .with_context(|| format!("Cannot write {}", path.display()))?;
    info!(
        rows = summary.rows,
        buggy = summary.buggy_rows,
        "Wrote dataset to {}",
        path.display()
    );
    Ok(())
}
