//! # Protocol Messages
//!
//! Typed envelopes exchanged between collection agents, validators and the
//! orchestrator. Validation results and decisions are append-only: once
//! created they are never mutated, only recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::payload::{DataType, Payload};
use super::source::Source;

/// Clamp a score into [0, 1], mapping NaN to 0
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Priority of gaps and tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        })
    }
}

/// Orchestrator decision on a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
    Refine,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::Accept => "accept",
            Decision::Reject => "reject",
            Decision::Refine => "refine",
        })
    }
}

/// Which validator produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationType {
    Quality,
    Source,
    Relevance,
    /// Synthetic result for submissions that never reached the validators
    Dispatch,
}

impl fmt::Display for ValidationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValidationType::Quality => "quality",
            ValidationType::Source => "source",
            ValidationType::Relevance => "relevance",
            ValidationType::Dispatch => "dispatch",
        })
    }
}

/// Collection agent submits data to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSubmission {
    #[serde(default = "new_id")]
    pub id: String,
    /// Logical task this attempt belongs to
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Agent's confidence in the data, [0, 1]
    #[serde(default)]
    pub confidence: f64,
    /// Agent's own quality estimate, [0, 1]
    #[serde(default)]
    pub quality_self_assessment: f64,
    #[serde(default)]
    pub reasoning: String,
}

impl DataSubmission {
    pub fn new(payload: Payload, sources: Vec<Source>) -> Self {
        Self {
            id: new_id(),
            task_id: String::new(),
            agent_id: String::new(),
            timestamp: Utc::now(),
            payload,
            sources,
            confidence: 0.0,
            quality_self_assessment: 0.0,
            reasoning: String::new(),
        }
    }

    pub fn with_task(mut self, task_id: &str, agent_id: &str) -> Self {
        self.task_id = task_id.to_string();
        self.agent_id = agent_id.to_string();
        self
    }

    pub fn with_scores(mut self, confidence: f64, quality_self_assessment: f64) -> Self {
        self.confidence = clamp_score(confidence);
        self.quality_self_assessment = clamp_score(quality_self_assessment);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn data_type(&self) -> DataType {
        self.payload.data_type()
    }
}

/// One validator's verdict on one submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub id: String,
    pub submission_id: String,
    pub validation_type: ValidationType,
    pub passed: bool,
    pub score: f64,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
}

impl ValidationResult {
    pub fn new(
        submission_id: &str,
        validation_type: ValidationType,
        score: f64,
        passed: bool,
        issues: Vec<String>,
        recommendations: Vec<String>,
        reasoning: String,
    ) -> Self {
        Self {
            id: new_id(),
            submission_id: submission_id.to_string(),
            validation_type,
            passed,
            score: clamp_score(score),
            issues,
            recommendations,
            reasoning,
            timestamp: Utc::now(),
        }
    }
}

/// The single terminal decision for a submission instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorDecision {
    pub id: String,
    pub submission_id: String,
    pub decision: Decision,
    pub reasoning: String,
    /// Present only when the decision is `Refine`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Combined (multiplicative) score of all validators
    pub quality_score: f64,
    pub timestamp: DateTime<Utc>,
}

impl OrchestratorDecision {
    pub fn new(
        submission_id: &str,
        decision: Decision,
        quality_score: f64,
        reasoning: String,
        feedback: Option<String>,
    ) -> Self {
        Self {
            id: new_id(),
            submission_id: submission_id.to_string(),
            decision,
            reasoning,
            feedback: if decision == Decision::Refine {
                feedback
            } else {
                None
            },
            quality_score: clamp_score(quality_score),
            timestamp: Utc::now(),
        }
    }
}

/// Orchestrator assigns a collection task to an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub id: String,
    /// Data type to collect; also selects the responsible agent
    pub task_type: DataType,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    /// Zero for the first attempt, incremented on every refine
    #[serde(default)]
    pub attempt: u32,
    /// Issues from the previous attempt, when refining
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl TaskAssignment {
    pub fn new(task_type: DataType) -> Self {
        Self {
            id: new_id(),
            task_type,
            parameters: serde_json::Map::new(),
            deadline: None,
            context: None,
            priority: Priority::default(),
            attempt: 0,
            feedback: None,
        }
    }

    pub fn with_parameter(mut self, key: &str, value: serde_json::Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Same logical task, next attempt, carrying the prior feedback
    pub fn refine(&self, feedback: impl Into<String>, deadline: Option<DateTime<Utc>>) -> Self {
        Self {
            attempt: self.attempt + 1,
            feedback: Some(feedback.into()),
            deadline,
            ..self.clone()
        }
    }
}

/// Kind of unmet requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapType {
    MissingData,
    InsufficientCount,
    LowQuality,
}

/// A structured record of an unmet requirement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub data_type: DataType,
    pub gap_type: GapType,
    pub description: String,
    pub current_value: usize,
    pub required_value: usize,
    pub priority: Priority,
    pub suggested_action: String,
}

/// Progress snapshot emitted once per iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub id: String,
    pub iteration: u32,
    pub completeness: f64,
    pub gaps: Vec<Gap>,
    /// Count of submissions per decision outcome
    pub quality_distribution: BTreeMap<Decision, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressReport {
    pub fn new(
        iteration: u32,
        completeness: f64,
        gaps: Vec<Gap>,
        quality_distribution: BTreeMap<Decision, usize>,
        estimated_completion: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: new_id(),
            iteration,
            completeness: clamp_score(completeness),
            gaps,
            quality_distribution,
            estimated_completion,
            timestamp: Utc::now(),
        }
    }
}
