//! Audited agent wrapper.
//!
//! Wraps any [`CollectionAgent`] with the source self-check and an
//! inspectable execution log. The log is never consulted by the decision
//! path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

use super::{CollectionAgent, CollectionResult};
use crate::error::Result;
use crate::protocol::{DataSubmission, DataType, TaskAssignment};

/// Kind of execution log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    /// A cited source failed the publisher/blacklist self-check
    SourceDropped,
    /// Confidence and self-assessment both claimed to be perfect
    SuspiciousSelfAssessment,
    SubmissionCreated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub action: LogAction,
    pub task_id: String,
    pub attempt: u32,
    #[serde(default)]
    pub detail: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Append-only per-agent log, shared between clones
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl ExecutionLog {
    pub fn record(&self, action: LogAction, task: &TaskAssignment, detail: serde_json::Value) {
        let entry = LogEntry {
            action,
            task_id: task.id.clone(),
            attempt: task.attempt,
            detail,
            timestamp: Utc::now(),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, action: LogAction) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.action == action)
            .count()
    }
}

/// A collection agent with source self-checks and an execution log
pub struct Audited<A: ?Sized> {
    log: ExecutionLog,
    blacklist: Vec<String>,
    inner: Arc<A>,
}

impl<A: CollectionAgent + ?Sized> Audited<A> {
    pub fn new(inner: Arc<A>, blacklist: Vec<String>) -> Self {
        Self {
            log: ExecutionLog::default(),
            blacklist,
            inner,
        }
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    /// Collect and wrap the result in a submission for `task`
    pub async fn submit(&self, task: &TaskAssignment) -> Result<DataSubmission> {
        let result = self.collect(task).await?;
        let submission = result.into_submission(task, self.agent_id()).map_err(|e| {
            self.log.record(
                LogAction::TaskFailed,
                task,
                serde_json::json!({ "error": e.to_string() }),
            );
            e
        })?;
        self.log.record(
            LogAction::SubmissionCreated,
            task,
            serde_json::json!({ "submission_id": submission.id }),
        );
        Ok(submission)
    }
}

#[async_trait]
impl<A: CollectionAgent + ?Sized> CollectionAgent for Audited<A> {
    fn agent_id(&self) -> &str {
        self.inner.agent_id()
    }

    fn data_type(&self) -> DataType {
        self.inner.data_type()
    }

    async fn collect(&self, task: &TaskAssignment) -> Result<CollectionResult> {
        self.log.record(
            LogAction::TaskStarted,
            task,
            serde_json::json!({ "task_type": task.task_type }),
        );

        let mut result = match self.inner.collect(task).await {
            Ok(result) => result,
            Err(e) => {
                self.log.record(
                    LogAction::TaskFailed,
                    task,
                    serde_json::json!({ "error": e.to_string() }),
                );
                return Err(e);
            }
        };

        let cited = std::mem::take(&mut result.sources);
        for source in cited {
            match source.guard(&self.blacklist) {
                Ok(()) => result.sources.push(source),
                Err(e) => self.log.record(
                    LogAction::SourceDropped,
                    task,
                    serde_json::json!({ "url": source.url, "reason": e.to_string() }),
                ),
            }
        }

        if result.confidence >= 1.0 && result.quality_score >= 1.0 {
            self.log.record(
                LogAction::SuspiciousSelfAssessment,
                task,
                serde_json::json!({
                    "confidence": result.confidence,
                    "quality_score": result.quality_score
                }),
            );
        }

        self.log.record(
            LogAction::TaskCompleted,
            task,
            serde_json::json!({ "sources": result.sources.len() }),
        );
        Ok(result)
    }
}
