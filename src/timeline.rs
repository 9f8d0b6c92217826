//! Ordered release timeline
//!
//! Releases are sorted ascending by date once, at construction. The position
//! of a release in that order is its *release index*, used both to window
//! defects in time and to build walk-forward folds.

use crate::models::Release;
use chrono::NaiveDate;

#[derive(Debug, Clone, Default)]
pub struct ReleaseTimeline {
    releases: Vec<Release>,
}

impl ReleaseTimeline {
    /// Build a timeline. Releases sharing a date keep their input order.
    pub fn new(mut releases: Vec<Release>) -> Self {
        releases.sort_by_key(|r| r.date);
        Self { releases }
    }

    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Release> {
        self.releases.get(index)
    }

    pub fn last_index(&self) -> Option<usize> {
        self.releases.len().checked_sub(1)
    }

    /// Earliest release whose date is on or after `date`.
    pub fn release_on_or_after(&self, date: NaiveDate) -> Option<&Release> {
        let idx = self.releases.partition_point(|r| r.date < date);
        self.releases.get(idx)
    }

    /// Case-insensitive exact name lookup.
    pub fn release_by_name(&self, name: &str) -> Option<&Release> {
        self.releases
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// Position of `release` in the timeline, or `None` when absent.
    pub fn index_of(&self, release: &Release) -> Option<usize> {
        self.releases.iter().position(|r| r == release)
    }

    /// Release index of the earliest named release that resolves.
    pub fn earliest_of<'a, I>(&self, names: I) -> Option<usize>
    where
        I: IntoIterator<Item = &'a String>,
    {
        names
            .into_iter()
            .filter_map(|n| self.release_by_name(n))
            .filter_map(|r| self.index_of(r))
            .min()
    }

    /// Release index of the latest named release that resolves.
    pub fn latest_of<'a, I>(&self, names: I) -> Option<usize>
    where
        I: IntoIterator<Item = &'a String>,
    {
        names
            .into_iter()
            .filter_map(|n| self.release_by_name(n))
            .filter_map(|r| self.index_of(r))
            .max()
    }
}
