//! # Audit Events
//!
//! Everything the orchestrator does, as a typed, append-only event stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::{DataSubmission, Decision, OrchestratorDecision, ValidationResult};

/// Kind of audit event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    RunStarted,
    IterationStarted,
    /// Gap analysis finished for the iteration
    GapsAnalyzed,
    /// A gap had no agent to serve it
    AgentMissing,
    TaskDispatched,
    /// Agent error, structural defect or timeout
    TaskFailed,
    SubmissionValidated,
    SubmissionAccepted,
    SubmissionRefined,
    SubmissionRejected,
    /// An accepted submission repeated already known items
    DuplicatesDetected,
    ProgressReported,
    StopRequested,
    RunCompleted,
}

/// An event in the audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: AuditEventKind,
    /// Agent or component that produced the event
    pub agent: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// Submission the event is about, if any
    #[serde(default)]
    pub submission_id: Option<String>,
}

impl AuditEvent {
    pub fn new(kind: AuditEventKind, agent: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            agent: agent.to_string(),
            data: None,
            submission_id: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_submission(mut self, submission_id: &str) -> Self {
        self.submission_id = Some(submission_id.to_string());
        self
    }
}

/// Per-run audit log: every event, submission, validation result and
/// decision, appended in the order they happened. Nothing is ever removed,
/// including issues of submissions that were eventually accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditTrail {
    pub events: Vec<AuditEvent>,
    pub submissions: Vec<DataSubmission>,
    pub validations: Vec<ValidationResult>,
    pub decisions: Vec<OrchestratorDecision>,
}

impl AuditTrail {
    pub fn validations_for<'a>(
        &'a self,
        submission_id: &'a str,
    ) -> impl Iterator<Item = &'a ValidationResult> + 'a {
        self.validations
            .iter()
            .filter(move |v| v.submission_id == submission_id)
    }

    pub fn decision_for(&self, submission_id: &str) -> Option<&OrchestratorDecision> {
        self.decisions
            .iter()
            .find(|d| d.submission_id == submission_id)
    }

    pub fn count(&self, decision: Decision) -> usize {
        self.decisions
            .iter()
            .filter(|d| d.decision == decision)
            .count()
    }

    pub fn events_of(&self, kind: AuditEventKind) -> impl Iterator<Item = &AuditEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = AuditEvent::new(AuditEventKind::SubmissionRejected, "orchestrator")
            .with_submission("sub-001")
            .with_data(serde_json::json!({ "score": 0.0 }));

        assert_eq!(event.agent, "orchestrator");
        assert_eq!(event.submission_id.as_deref(), Some("sub-001"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "submission_rejected");
    }

    #[test]
    fn test_trail_lookup() {
        let mut trail = AuditTrail::default();
        trail.decisions.push(OrchestratorDecision::new(
            "sub-1",
            Decision::Reject,
            0.0,
            "no sources".to_string(),
            None,
        ));
        trail.events.push(AuditEvent::new(AuditEventKind::RunStarted, "orchestrator"));

        assert_eq!(trail.count(Decision::Reject), 1);
        assert_eq!(trail.count(Decision::Accept), 0);
        assert!(trail.decision_for("sub-1").is_some());
        assert!(trail.decision_for("sub-2").is_none());
        assert_eq!(trail.events_of(AuditEventKind::RunStarted).count(), 1);
    }
}
