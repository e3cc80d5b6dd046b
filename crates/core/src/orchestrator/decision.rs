//! # Decision State Machine
//!
//! PENDING → VALIDATING → {ACCEPTED | REJECTED | REFINING}. A refine sends
//! the same logical task back out; once the refine budget is spent the next
//! middling score is a reject.

use serde::{Deserialize, Serialize};

use crate::config::OrchestratorConfig;
use crate::protocol::Decision;

/// Accept/refine score thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub accept: f64,
    pub refine: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            accept: 0.9,
            refine: 0.6,
        }
    }
}

impl From<&OrchestratorConfig> for Thresholds {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            accept: config.accept_threshold,
            refine: config.refine_threshold,
        }
    }
}

/// Decide on a combined score. Pure: same inputs, same decision.
pub fn decide(combined_score: f64, refine_attempts_remaining: u32, thresholds: Thresholds) -> Decision {
    if combined_score >= thresholds.accept {
        Decision::Accept
    } else if combined_score >= thresholds.refine && refine_attempts_remaining > 0 {
        Decision::Refine
    } else {
        Decision::Reject
    }
}

/// Stage of one logical task's current submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStage {
    Pending,
    Validating,
    Accepted,
    Rejected,
    Refining,
}

/// Lifecycle of one logical task across its refine attempts
#[derive(Debug, Clone)]
pub struct TaskLifecycle {
    pub stage: SubmissionStage,
    /// Refines already granted
    pub refines: u32,
    pub max_refines: u32,
}

impl TaskLifecycle {
    pub fn new(max_refines: u32) -> Self {
        Self {
            stage: SubmissionStage::Pending,
            refines: 0,
            max_refines,
        }
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.max_refines.saturating_sub(self.refines)
    }

    /// A submission arrived for the task
    pub fn begin_validation(&mut self) {
        self.stage = SubmissionStage::Validating;
    }

    /// Settle the current submission on its combined score
    pub fn settle(&mut self, combined_score: f64, thresholds: Thresholds) -> Decision {
        let decision = decide(combined_score, self.attempts_remaining(), thresholds);
        match decision {
            Decision::Accept => self.stage = SubmissionStage::Accepted,
            Decision::Reject => self.stage = SubmissionStage::Rejected,
            Decision::Refine => {
                self.refines += 1;
                self.stage = SubmissionStage::Refining;
            }
        }
        decision
    }

    /// The submission never reached validation (timeout, agent error)
    pub fn fail(&mut self) -> Decision {
        self.stage = SubmissionStage::Rejected;
        Decision::Reject
    }

    /// Accepted or rejected; nothing more will be dispatched
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.stage,
            SubmissionStage::Accepted | SubmissionStage::Rejected
        )
    }
}
