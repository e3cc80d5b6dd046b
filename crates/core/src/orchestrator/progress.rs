//! Progress tracking: cumulative decision counts, per-iteration completeness
//! history and the completion estimate carried by every report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::protocol::{Decision, Gap, ProgressReport};

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    baseline: f64,
    distribution: BTreeMap<Decision, usize>,
    /// Completeness after each finished iteration and how long it took
    history: Vec<(f64, Duration)>,
    duplicates: usize,
}

impl ProgressTracker {
    /// `baseline` is the completeness before the first iteration
    pub fn new(baseline: f64) -> Self {
        let distribution = [Decision::Accept, Decision::Refine, Decision::Reject]
            .into_iter()
            .map(|d| (d, 0))
            .collect();
        Self {
            baseline,
            distribution,
            history: Vec::new(),
            duplicates: 0,
        }
    }

    pub fn record_decision(&mut self, decision: Decision) {
        *self.distribution.entry(decision).or_default() += 1;
    }

    pub fn record_duplicates(&mut self, count: usize) {
        self.duplicates += count;
    }

    pub fn record_iteration(&mut self, completeness: f64, elapsed: Duration) {
        self.history.push((completeness, elapsed));
    }

    pub fn distribution(&self) -> &BTreeMap<Decision, usize> {
        &self.distribution
    }

    pub fn decisions(&self, decision: Decision) -> usize {
        self.distribution.get(&decision).copied().unwrap_or(0)
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Extrapolate the average gain and duration per iteration to `target`.
    /// None until some iteration actually improved completeness.
    pub fn estimate_completion(&self, target: f64) -> Option<DateTime<Utc>> {
        let (current, _) = *self.history.last()?;
        let iterations = self.history.len() as f64;
        let gain = (current - self.baseline) / iterations;
        if gain <= 0.0 {
            return None;
        }

        let now = Utc::now();
        let remaining = target - current;
        if remaining <= 0.0 {
            return Some(now);
        }

        let total: Duration = self.history.iter().map(|(_, d)| *d).sum();
        let per_iteration = total.div_f64(iterations);
        let needed = (remaining / gain).ceil();
        let eta = chrono::Duration::from_std(per_iteration.mul_f64(needed)).ok()?;
        now.checked_add_signed(eta)
    }

    pub fn report(
        &self,
        iteration: u32,
        completeness: f64,
        gaps: Vec<Gap>,
        target: f64,
    ) -> ProgressReport {
        ProgressReport::new(
            iteration,
            completeness,
            gaps,
            self.distribution.clone(),
            self.estimate_completion(target),
        )
    }
}

/// Final tally of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub iterations: u32,
    pub submissions: usize,
    pub accepted: usize,
    pub refined: usize,
    pub rejected: usize,
    /// Items already present when their submission was merged
    pub duplicates: usize,
    pub completeness: f64,
    pub unmet_gaps: usize,
    /// Completeness reached the configured target
    pub ready_for_report: bool,
}

impl ExecutionSummary {
    pub fn from_tracker(
        tracker: &ProgressTracker,
        iterations: u32,
        completeness: f64,
        unmet_gaps: usize,
        target: f64,
    ) -> Self {
        let accepted = tracker.decisions(Decision::Accept);
        let refined = tracker.decisions(Decision::Refine);
        let rejected = tracker.decisions(Decision::Reject);
        Self {
            iterations,
            submissions: accepted + refined + rejected,
            accepted,
            refined,
            rejected,
            duplicates: tracker.duplicates(),
            completeness,
            unmet_gaps,
            ready_for_report: completeness >= target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_starts_at_zero() {
        let tracker = ProgressTracker::new(0.0);
        assert_eq!(tracker.distribution().len(), 3);
        assert_eq!(tracker.decisions(Decision::Accept), 0);
    }

    #[test]
    fn test_no_estimate_without_gain() {
        let mut tracker = ProgressTracker::new(0.3);
        assert!(tracker.estimate_completion(0.95).is_none());
        tracker.record_iteration(0.3, Duration::from_secs(10));
        assert!(tracker.estimate_completion(0.95).is_none());
    }

    #[test]
    fn test_estimate_extrapolates_gain() {
        let mut tracker = ProgressTracker::new(0.0);
        tracker.record_iteration(0.25, Duration::from_secs(10));
        tracker.record_iteration(0.5, Duration::from_secs(10));

        // 0.45 left at 0.25 per 10s iteration: two more iterations
        let eta = tracker.estimate_completion(0.95).unwrap();
        let ahead = (eta - Utc::now()).num_seconds();
        assert!((18..=20).contains(&ahead), "eta {ahead}s ahead");
    }

    #[test]
    fn test_summary_counts() {
        let mut tracker = ProgressTracker::new(0.0);
        tracker.record_decision(Decision::Accept);
        tracker.record_decision(Decision::Refine);
        tracker.record_decision(Decision::Accept);
        tracker.record_decision(Decision::Reject);
        tracker.record_duplicates(3);

        let summary = ExecutionSummary::from_tracker(&tracker, 2, 0.96, 0, 0.95);
        assert_eq!(summary.submissions, 4);
        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.duplicates, 3);
        assert!(summary.ready_for_report);
    }
}
