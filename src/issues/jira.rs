//! Jira REST client
//!
//! Uses ureq (sync HTTP); the pipeline is batch-oriented and needs no async
//! runtime.

use super::{parse_date_prefix, IssueError, IssueResult, IssueTracker};
use crate::models::{DefectReport, Release};
use serde::Deserialize;
use tracing::{debug, info, warn};

const SEARCH_FIELDS: &str = "key,created,resolutiondate,versions,fixVersions";

fn make_agent() -> ureq::Agent {
    ureq::config::Config::builder()
        .http_status_as_error(false)
        .timeout_global(Some(std::time::Duration::from_secs(60)))
        .build()
        .new_agent()
}

/// Jira client for one tracker instance.
pub struct JiraClient {
    base_url: String,
    page_size: usize,
    agent: ureq::Agent,
}

impl JiraClient {
    pub fn new(base_url: impl Into<String>, page_size: usize) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            base_url,
            page_size: page_size.max(1),
            agent: make_agent(),
        }
    }

    fn get_text(&self, url: &str, query: &[(&str, String)]) -> IssueResult<String> {
        let mut req = self.agent.get(url);
        for (key, value) in query {
            req = req.query(*key, value);
        }

        let response = req.call().map_err(|e| IssueError::RequestFailed {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        if status >= 400 {
            let error_text = response.into_body().read_to_string().unwrap_or_default();
            return Err(IssueError::ApiError {
                status,
                message: error_text,
            });
        }

        response
            .into_body()
            .read_to_string()
            .map_err(|e| IssueError::ParseError(e.to_string()))
    }
}

impl IssueTracker for JiraClient {
    fn releases(&self, project: &str) -> IssueResult<Vec<Release>> {
        let url = format!("{}rest/api/2/project/{}/versions", self.base_url, project);
        let body = self.get_text(&url, &[])?;
        let releases = parse_versions(&body)?;
        info!("Fetched {} releases for {}", releases.len(), project);
        Ok(releases)
    }

    fn defect_reports(&self, project: &str) -> IssueResult<Vec<DefectReport>> {
        let url = format!("{}rest/api/2/search", self.base_url);
        let jql = format!(
            "project = {} AND issuetype = Bug AND status in (Resolved, Closed) AND resolution = Fixed",
            project
        );

        let mut reports = Vec::new();
        let mut start_at = 0usize;
        loop {
            let body = self.get_text(
                &url,
                &[
                    ("jql", jql.clone()),
                    ("fields", SEARCH_FIELDS.to_string()),
                    ("startAt", start_at.to_string()),
                    ("maxResults", self.page_size.to_string()),
                ],
            )?;
            let page = parse_search_page(&body)?;
            debug!(start_at, fetched = page.issues, total = page.total, "Fetched ticket page");

            reports.extend(page.reports);
            start_at += page.issues;
            if page.issues == 0 || start_at >= page.total {
                break;
            }
        }

        info!("Fetched {} fixed tickets for {}", reports.len(), project);
        Ok(reports)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JiraVersion {
    name: Option<String>,
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JiraNamed {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JiraFields {
    created: Option<String>,
    resolutiondate: Option<String>,
    #[serde(default)]
    versions: Vec<JiraNamed>,
    #[serde(default)]
    fix_versions: Vec<JiraNamed>,
}

#[derive(Debug, Deserialize)]
struct JiraIssue {
    key: String,
    fields: JiraFields,
}

#[derive(Debug, Deserialize)]
struct JiraSearch {
    #[serde(default)]
    issues: Vec<JiraIssue>,
    #[serde(default)]
    total: usize,
}

/// One page of search results after conversion.
pub(crate) struct SearchPage {
    /// Issues on the page, including dropped ones, for pagination.
    pub issues: usize,
    pub total: usize,
    pub reports: Vec<DefectReport>,
}

/// Convert a project-versions response, dropping unnamed or undated versions.
pub(crate) fn parse_versions(body: &str) -> IssueResult<Vec<Release>> {
    let versions: Vec<JiraVersion> =
        serde_json::from_str(body).map_err(|e| IssueError::ParseError(e.to_string()))?;

    let mut releases = Vec::new();
    for version in versions {
        let date = version.release_date.as_deref().and_then(parse_date_prefix);
        match (version.name, date) {
            (Some(name), Some(date)) => releases.push(Release::new(name, date)),
            (name, _) => warn!("Dropping release {:?} without name or release date", name),
        }
    }
    Ok(releases)
}

pub(crate) fn parse_search_page(body: &str) -> IssueResult<SearchPage> {
    let search: JiraSearch =
        serde_json::from_str(body).map_err(|e| IssueError::ParseError(e.to_string()))?;

    let issues = search.issues.len();
    let mut reports = Vec::with_capacity(issues);
    for issue in search.issues {
        let created = issue.fields.created.as_deref().and_then(parse_date_prefix);
        let resolved = issue.fields.resolutiondate.as_deref().and_then(parse_date_prefix);
        let (Some(created), Some(resolved)) = (created, resolved) else {
            warn!("Dropping ticket {} without created or resolution date", issue.key);
            continue;
        };
        reports.push(
            DefectReport::new(issue.key, created, resolved)
                .with_fix_versions(issue.fields.fix_versions.into_iter().map(|v| v.name))
                .with_affected_versions(issue.fields.versions.into_iter().map(|v| v.name)),
        );
    }

    Ok(SearchPage {
        issues,
        total: search.total,
        reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_versions_drops_incomplete() {
        let body = r#"[
            {"name": "4.0.0", "releaseDate": "2011-12-07", "released": true},
            {"name": "4.1.0"},
            {"releaseDate": "2012-01-01"},
            {"name": "4.2.0", "releaseDate": "2013-01-16"}
        ]"#;
        let releases = parse_versions(body).unwrap();
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].name, "4.0.0");
        assert_eq!(releases[1].date, NaiveDate::from_ymd_opt(2013, 1, 16).unwrap());
    }

    #[test]
    fn test_parse_search_page() {
        let body = r#"{
            "startAt": 0, "maxResults": 2, "total": 7,
            "issues": [
                {"key": "BOOKKEEPER-1", "fields": {
                    "created": "2011-04-01T10:00:00.000+0000",
                    "resolutiondate": "2011-05-02T11:00:00.000+0000",
                    "versions": [{"name": "3.3.0"}],
                    "fixVersions": [{"name": "4.0.0"}, {"name": "3.4.0"}]
                }},
                {"key": "BOOKKEEPER-2", "fields": {
                    "created": "2011-04-01T10:00:00.000+0000",
                    "resolutiondate": null
                }}
            ]
        }"#;
        let page = parse_search_page(body).unwrap();
        assert_eq!(page.issues, 2);
        assert_eq!(page.total, 7);
        assert_eq!(page.reports.len(), 1);

        let report = &page.reports[0];
        assert_eq!(report.key, "BOOKKEEPER-1");
        assert_eq!(report.resolved, NaiveDate::from_ymd_opt(2011, 5, 2).unwrap());
        assert!(report.affected_versions.contains("3.3.0"));
        assert_eq!(report.fix_versions.len(), 2);
    }

    #[test]
    fn test_parse_search_page_rejects_garbage() {
        assert!(matches!(
            parse_search_page("<html>"),
            Err(IssueError::ParseError(_))
        ));
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = JiraClient::new("https://issues.example.org/jira", 0);
        assert_eq!(client.base_url, "https://issues.example.org/jira/");
        assert_eq!(client.page_size, 1);
    }
}
