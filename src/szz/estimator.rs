//! Injected-version estimation
//!
//! When a ticket carries no usable affected version, its injected release is
//! estimated from the proportion `P = (FV - IV) / (FV - OV)` observed on
//! earlier tickets that did carry one. All positions are release indices.

use std::collections::VecDeque;
use tracing::debug;

/// Pluggable strategy for learning and estimating injected versions.
pub trait InjectedVersionEstimator {
    fn name(&self) -> &'static str;

    /// Feed one ground-truth observation. Returns whether it was recorded.
    fn learn(&mut self, injected: usize, fixed: usize, opening: usize) -> bool;

    /// Estimate the injected release index for a ticket without ground truth.
    fn estimate(&self, fixed: usize, opening: usize, last_index: usize) -> usize;
}

/// Shared estimate step: walk back from `fixed` by `round(distance * p)`.
fn estimate_with(proportion: f64, fixed: usize, opening: usize, last_index: usize) -> usize {
    if fixed <= opening {
        return fixed;
    }
    let distance = (fixed - opening) as f64;
    let jump = (distance * proportion).round() as i64;
    (fixed as i64 - jump).clamp(0, last_index as i64) as usize
}

/// Moving-window proportion over the most recent ground-truth tickets.
///
/// Behaves as a cumulative average while the window fills and as a sliding
/// average once full.
#[derive(Debug, Clone)]
pub struct IncrementalProportion {
    window: VecDeque<f64>,
    window_size: usize,
    default_proportion: f64,
    max_proportion: f64,
}

impl Default for IncrementalProportion {
    fn default() -> Self {
        Self::new(3, 0.01, 10.0)
    }
}

impl IncrementalProportion {
    pub fn new(window_size: usize, default_proportion: f64, max_proportion: f64) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size + 1),
            window_size: window_size.max(1),
            default_proportion,
            max_proportion,
        }
    }

    /// Currently retained samples, oldest first.
    pub fn window(&self) -> impl Iterator<Item = f64> + '_ {
        self.window.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Mean of the window, or the default proportion when empty.
    pub fn average(&self) -> f64 {
        if self.window.is_empty() {
            self.default_proportion
        } else {
            self.window.iter().sum::<f64>() / self.window.len() as f64
        }
    }
}

impl InjectedVersionEstimator for IncrementalProportion {
    fn name(&self) -> &'static str {
        "incremental"
    }

    fn learn(&mut self, injected: usize, fixed: usize, opening: usize) -> bool {
        if fixed <= opening {
            debug!(injected, fixed, opening, "Proportion undefined, sample dropped");
            return false;
        }
        let p = (fixed as f64 - injected as f64) / (fixed - opening) as f64;
        if !(0.0..=self.max_proportion).contains(&p) {
            debug!(p, "Proportion out of range, sample dropped");
            return false;
        }

        self.window.push_back(p);
        if self.window.len() > self.window_size {
            self.window.pop_front();
        }
        true
    }

    fn estimate(&self, fixed: usize, opening: usize, last_index: usize) -> usize {
        estimate_with(self.average(), fixed, opening, last_index)
    }
}

/// A constant proportion that never learns.
#[derive(Debug, Clone, Copy)]
pub struct FixedProportion {
    pub proportion: f64,
}

impl FixedProportion {
    pub fn new(proportion: f64) -> Self {
        Self { proportion }
    }
}

impl InjectedVersionEstimator for FixedProportion {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn learn(&mut self, _injected: usize, _fixed: usize, _opening: usize) -> bool {
        false
    }

    fn estimate(&self, fixed: usize, opening: usize, last_index: usize) -> usize {
        estimate_with(self.proportion, fixed, opening, last_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learn_accepts_valid_sample() {
        let mut est = IncrementalProportion::default();
        // IV=0, FV=3, OV=1 -> p = 3/2
        assert!(est.learn(0, 3, 1));
        assert_eq!(est.window().collect::<Vec<_>>(), vec![1.5]);
    }

    #[test]
    fn test_learn_rejects_undefined_and_out_of_range() {
        let mut est = IncrementalProportion::default();
        assert!(!est.learn(0, 2, 2));
        assert!(!est.learn(0, 1, 3));
        // p = (20 - 0) / (20 - 19) = 20
        assert!(!est.learn(0, 20, 19));
        // IV after FV gives a negative p
        assert!(!est.learn(5, 3, 1));
        assert!(est.is_empty());
    }

    #[test]
    fn test_window_is_bounded_fifo() {
        let mut est = IncrementalProportion::new(3, 0.01, 10.0);
        // p = 0 four times, then p = 2 three times
        for _ in 0..4 {
            assert!(est.learn(4, 4, 2));
        }
        assert_eq!(est.len(), 3);
        assert_eq!(est.estimate(10, 5, 10), 10);

        for _ in 0..3 {
            assert!(est.learn(0, 4, 2));
        }
        assert_eq!(est.len(), 3);
        assert_eq!(est.average(), 2.0);
        // jump = round(5 * 2) = 10
        assert_eq!(est.estimate(10, 5, 10), 0);
    }

    #[test]
    fn test_estimate_uses_only_retained_samples() {
        let mut est = IncrementalProportion::new(2, 0.01, 10.0);
        est.learn(0, 4, 2); // 2.0, evicted below
        est.learn(3, 4, 2); // 0.5
        est.learn(3, 4, 2); // 0.5
        assert_eq!(est.average(), 0.5);
        // distance 4, jump 2
        assert_eq!(est.estimate(8, 4, 9), 6);
    }

    #[test]
    fn test_estimate_defaults_and_floor() {
        let est = IncrementalProportion::default();
        // 0.01 * 2 rounds to 0: IV = FV
        assert_eq!(est.estimate(3, 1, 3), 3);
        // FV not after OV
        assert_eq!(est.estimate(2, 2, 3), 2);
        assert_eq!(est.estimate(1, 2, 3), 1);
    }

    #[test]
    fn test_estimate_is_clamped() {
        let est = FixedProportion::new(10.0);
        assert_eq!(est.estimate(3, 1, 3), 0);
    }

    #[test]
    fn test_fixed_proportion_never_learns() {
        let mut est = FixedProportion::new(1.5);
        assert!(!est.learn(0, 3, 1));
        // distance 2, jump round(3.0) = 3
        assert_eq!(est.estimate(3, 1, 3), 0);
        assert_eq!(est.name(), "fixed");
    }
}
