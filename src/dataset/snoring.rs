//! Snoring control
//!
//! Defects in the most recent releases are mostly not yet discovered, so
//! their methods look clean when they are not. The tail of the timeline is
//! either cut off entirely or kept for buggy rows only.

use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnoringStats {
    pub rows_kept: usize,
    pub buggy_kept_in_tail: usize,
    pub clean_dropped_in_tail: usize,
    pub releases_skipped: usize,
}

#[derive(Debug, Clone)]
pub struct SnoringControl {
    discard_ratio: f64,
    keep_only_buggy: bool,
    total_releases: usize,
    stop_index: usize,
    stats: SnoringStats,
}

impl SnoringControl {
    pub fn new(total_releases: usize, discard_ratio: f64, keep_only_buggy: bool) -> Self {
        let mut stop_index = (total_releases as f64 * (1.0 - discard_ratio)).round() as usize;
        if stop_index < 1 && total_releases > 0 {
            stop_index = 1;
        }
        let stop_index = stop_index.min(total_releases);

        info!(
            total_releases,
            discard_ratio,
            stop_index,
            strategy = if keep_only_buggy { "filter" } else { "cutoff" },
            "Snoring control"
        );

        Self {
            discard_ratio,
            keep_only_buggy,
            total_releases,
            stop_index,
            stats: SnoringStats::default(),
        }
    }

    /// First release index in the snoring tail.
    pub fn stop_index(&self) -> usize {
        self.stop_index
    }

    pub fn discard_ratio(&self) -> f64 {
        self.discard_ratio
    }

    pub fn is_tail(&self, release_index: usize) -> bool {
        release_index >= self.stop_index
    }

    /// Whether release generation stops here (cutoff mode only).
    pub fn should_stop(&mut self, release_index: usize) -> bool {
        if self.is_tail(release_index) && !self.keep_only_buggy {
            self.stats.releases_skipped = self.total_releases - release_index;
            return true;
        }
        false
    }

    /// Whether a row at `release_index` is written.
    pub fn keep_row(&mut self, release_index: usize, buggy: bool) -> bool {
        if !self.is_tail(release_index) {
            self.stats.rows_kept += 1;
            return true;
        }
        if !self.keep_only_buggy {
            return false;
        }
        if buggy {
            self.stats.buggy_kept_in_tail += 1;
            self.stats.rows_kept += 1;
            true
        } else {
            self.stats.clean_dropped_in_tail += 1;
            false
        }
    }

    pub fn stats(&self) -> &SnoringStats {
        &self.stats
    }

    pub fn log_report(&self) {
        if self.keep_only_buggy {
            info!(
                rows_kept = self.stats.rows_kept,
                buggy_kept_in_tail = self.stats.buggy_kept_in_tail,
                clean_dropped_in_tail = self.stats.clean_dropped_in_tail,
                "Snoring filter report"
            );
        } else {
            info!(
                releases_processed = self.total_releases - self.stats.releases_skipped,
                releases_skipped = self.stats.releases_skipped,
                rows_kept = self.stats.rows_kept,
                "Snoring cutoff report"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_index() {
        assert_eq!(SnoringControl::new(10, 0.66, false).stop_index(), 3);
        assert_eq!(SnoringControl::new(3, 0.9, false).stop_index(), 1);
        assert_eq!(SnoringControl::new(0, 0.5, false).stop_index(), 0);
        assert_eq!(SnoringControl::new(4, 0.0, false).stop_index(), 4);
    }

    #[test]
    fn test_cutoff_mode() {
        let mut snoring = SnoringControl::new(10, 0.5, false);
        assert!(!snoring.should_stop(4));
        assert!(snoring.keep_row(4, false));
        assert!(snoring.should_stop(5));
        assert!(!snoring.keep_row(5, true));
        assert_eq!(snoring.stats().releases_skipped, 5);
    }

    #[test]
    fn test_filter_mode_keeps_only_buggy_in_tail() {
        let mut snoring = SnoringControl::new(10, 0.5, true);
        assert!(!snoring.should_stop(7));
        assert!(snoring.keep_row(7, true));
        assert!(!snoring.keep_row(7, false));
        assert!(snoring.keep_row(1, false));

        let stats = snoring.stats();
        assert_eq!(stats.rows_kept, 2);
        assert_eq!(stats.buggy_kept_in_tail, 1);
        assert_eq!(stats.clean_dropped_in_tail, 1);
    }
}
