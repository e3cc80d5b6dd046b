//! # Orchestrator
//!
//! The main loop: analyze gaps, dispatch tasks for them, validate every
//! submission, decide, merge accepted data, report progress. The
//! orchestrator is the only writer of the accepted dataset and the audit
//! trail; agents and validators never see either.
//!
//! Refines are re-dispatched inside the same iteration, so every
//! submission of an iteration is settled before the next gap analysis.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::agents::{AgentRegistry, CollectionAgent};
use crate::config::EngineConfig;
use crate::dataset::{AcceptedDataset, AcceptedRecord, DatasetKey, DatasetSnapshot};
use crate::error::EngineError;
use crate::gaps;
use crate::protocol::{
    DataSubmission, Decision, Gap, OrchestratorDecision, ProgressReport, SchemaRegistry,
    TaskAssignment, ValidationResult, ValidationType,
};
use crate::state::AuditStore;
use crate::validation::{PipelineOutcome, ValidationPipeline};

use super::decision::{Thresholds, TaskLifecycle};
use super::dispatch::{AgentHandle, DispatchPool, Job};
use super::events::{AuditEvent, AuditEventKind, AuditTrail};
use super::progress::{ExecutionSummary, ProgressTracker};

const AGENT: &str = "orchestrator";

/// Commands accepted between iterations
#[derive(Debug)]
pub enum OrchestratorCommand {
    /// Finish the current iteration, then stop
    Stop,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Completeness reached the target
    Complete,
    /// Iterations ran out, nothing was left to dispatch, or a stop was requested
    Partial { unmet: Vec<Gap>, stopped: bool },
}

/// Result of a run, read by renderers once the loop has ended
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub iterations: u32,
    pub report: ProgressReport,
    pub summary: ExecutionSummary,
    pub dataset: DatasetSnapshot,
}

impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Complete
    }

    /// `RequirementsUnsatisfiable` for a partial run
    pub fn ensure_complete(&self) -> crate::error::Result<()> {
        match &self.status {
            RunStatus::Complete => Ok(()),
            RunStatus::Partial { unmet, .. } => Err(EngineError::RequirementsUnsatisfiable {
                iterations: self.iterations,
                unmet: unmet.len(),
            }),
        }
    }
}

pub struct Orchestrator {
    config: EngineConfig,
    agents: AgentRegistry,
    pipeline: ValidationPipeline,
    pool: DispatchPool,
    dataset: AcceptedDataset,
    trail: AuditTrail,
    latest_report: Option<ProgressReport>,
    event_tx: Option<mpsc::Sender<AuditEvent>>,
    command_rx: Option<mpsc::Receiver<OrchestratorCommand>>,
    store: Option<Arc<AuditStore>>,
}

impl Orchestrator {
    /// Fails with a configuration error when `config` is inconsistent
    pub fn new(config: EngineConfig, agents: AgentRegistry) -> crate::error::Result<Self> {
        config.validate()?;
        Ok(Self {
            pipeline: ValidationPipeline::from_config(&config),
            pool: DispatchPool::from_config(&config.orchestrator),
            config,
            agents,
            dataset: AcceptedDataset::new(),
            trail: AuditTrail::default(),
            latest_report: None,
            event_tx: None,
            command_rx: None,
            store: None,
        })
    }

    /// Stream audit events as they happen
    pub fn with_event_channel(mut self, tx: mpsc::Sender<AuditEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Accept cooperative stop commands, checked between iterations
    pub fn with_command_channel(mut self, rx: mpsc::Receiver<OrchestratorCommand>) -> Self {
        self.command_rx = Some(rx);
        self
    }

    /// Persist the audit trail and accepted records
    pub fn with_store(mut self, store: Arc<AuditStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Resume from previously accepted data
    pub fn with_dataset(mut self, dataset: AcceptedDataset) -> Self {
        self.dataset = dataset;
        self
    }

    /// Replace the mandatory-field schema used by the Quality validator
    pub fn with_schema(mut self, schema: SchemaRegistry) -> Self {
        self.pipeline = ValidationPipeline::with_schema(&self.config, schema);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn dataset(&self) -> &AcceptedDataset {
        &self.dataset
    }

    pub fn snapshot(&self) -> DatasetSnapshot {
        self.dataset.snapshot()
    }

    pub fn trail(&self) -> &AuditTrail {
        &self.trail
    }

    pub fn latest_report(&self) -> Option<&ProgressReport> {
        self.latest_report.as_ref()
    }

    /// Current gaps against the configured requirements
    pub fn gaps(&self) -> Vec<Gap> {
        gaps::analyze(&self.dataset, &self.config.requirements)
    }

    pub fn completeness(&self) -> f64 {
        gaps::completeness(&self.dataset, &self.config.requirements)
    }

    /// Validate and decide on one submission without recording or merging
    /// anything. The full refine budget is assumed to be available.
    pub fn evaluate(&self, submission: &DataSubmission) -> (PipelineOutcome, OrchestratorDecision) {
        let outcome = self.pipeline.run(submission);
        let mut lifecycle = TaskLifecycle::new(self.config.orchestrator.max_refine_attempts);
        lifecycle.begin_validation();
        let decision = self.decide(submission, &outcome, &mut lifecycle);
        (outcome, decision)
    }

    /// Emit an audit event
    fn emit(&mut self, event: AuditEvent) {
        self.trail.events.push(event.clone());
        if let Some(tx) = &self.event_tx {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event) {
                tracing::warn!("audit event channel full, event kept in trail only");
            }
        }
    }

    fn persist(&self, write: impl FnOnce(&AuditStore) -> Result<()>) -> Result<()> {
        match &self.store {
            Some(store) => write(store),
            None => Ok(()),
        }
    }

    fn stop_requested(&mut self) -> bool {
        match self.command_rx.as_mut() {
            Some(rx) => matches!(rx.try_recv(), Ok(OrchestratorCommand::Stop)),
            None => false,
        }
    }

    fn next_deadline(&self) -> Option<DateTime<Utc>> {
        let budget = chrono::Duration::from_std(self.config.orchestrator.task_deadline()).ok()?;
        Utc::now().checked_add_signed(budget)
    }

    /// Run the loop until completeness reaches the target, iterations run
    /// out, nothing is left to dispatch, or a stop is requested.
    #[tracing::instrument(skip(self), fields(max_iterations = self.config.orchestrator.max_iterations))]
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let target = self.config.orchestrator.completeness_target;
        let max_iterations = self.config.orchestrator.max_iterations;
        let mut tracker = ProgressTracker::new(self.completeness());
        let mut iteration = 0u32;
        let mut stopped = false;
        let mut reported = false;

        self.emit(
            AuditEvent::new(AuditEventKind::RunStarted, AGENT).with_data(serde_json::json!({
                "max_iterations": max_iterations,
                "completeness_target": target,
                "requirements": self.config.requirements.len(),
                "agents": self.agents.len()
            })),
        );

        loop {
            let completeness = self.completeness();
            if completeness >= target || iteration >= max_iterations {
                break;
            }
            if self.stop_requested() {
                tracing::info!(iteration, "stop requested");
                self.emit(AuditEvent::new(AuditEventKind::StopRequested, AGENT));
                stopped = true;
                break;
            }

            iteration += 1;
            let started = Instant::now();
            self.emit(
                AuditEvent::new(AuditEventKind::IterationStarted, AGENT).with_data(
                    serde_json::json!({ "iteration": iteration, "completeness": completeness }),
                ),
            );

            let open_gaps = self.gaps();
            self.emit(
                AuditEvent::new(AuditEventKind::GapsAnalyzed, AGENT).with_data(
                    serde_json::json!({ "iteration": iteration, "gaps": &open_gaps }),
                ),
            );

            let jobs = self.plan(&open_gaps);
            let idle = jobs.is_empty();
            if idle {
                tracing::warn!(iteration, gaps = open_gaps.len(), "no dispatchable gaps");
            } else {
                self.execute(jobs, &mut tracker).await?;
            }

            let completeness = self.completeness();
            tracker.record_iteration(completeness, started.elapsed());
            let report = tracker.report(iteration, completeness, self.gaps(), target);
            self.publish(report)?;
            reported = true;

            if idle {
                break;
            }
        }

        let completeness = self.completeness();
        let unmet = self.gaps();
        if !reported {
            let report = tracker.report(iteration, completeness, unmet.clone(), target);
            self.publish(report)?;
        }

        let summary =
            ExecutionSummary::from_tracker(&tracker, iteration, completeness, unmet.len(), target);
        let status = if completeness >= target {
            RunStatus::Complete
        } else {
            RunStatus::Partial {
                unmet: unmet.clone(),
                stopped,
            }
        };

        match &status {
            RunStatus::Complete => tracing::info!(
                iterations = iteration,
                completeness,
                "requirements satisfied"
            ),
            RunStatus::Partial { unmet, stopped } => tracing::warn!(
                iterations = iteration,
                completeness,
                unmet = unmet.len(),
                stopped,
                "run ended with unmet requirements"
            ),
        }

        self.emit(
            AuditEvent::new(AuditEventKind::RunCompleted, AGENT).with_data(serde_json::json!({
                "status": &status,
                "summary": &summary
            })),
        );

        let report = self
            .latest_report
            .clone()
            .ok_or_else(|| anyhow::anyhow!("run finished without a progress report"))?;

        Ok(RunOutcome {
            status,
            iterations: iteration,
            report,
            summary,
            dataset: self.dataset.snapshot(),
        })
    }

    /// One task per gap at or above the priority cutoff
    fn plan(&mut self, open_gaps: &[Gap]) -> Vec<Job> {
        let cutoff = self.config.orchestrator.priority_cutoff;
        let mut jobs = Vec::new();

        for gap in open_gaps.iter().filter(|g| g.priority >= cutoff) {
            let Some(agent) = self.agents.get(gap.data_type) else {
                tracing::warn!(data_type = %gap.data_type, "no collection agent for gap");
                self.emit(
                    AuditEvent::new(AuditEventKind::AgentMissing, AGENT)
                        .with_data(serde_json::json!({ "gap": gap })),
                );
                continue;
            };

            let mut task = TaskAssignment::new(gap.data_type)
                .with_priority(gap.priority)
                .with_parameter("gap_type", serde_json::json!(gap.gap_type))
                .with_parameter(
                    "needed",
                    serde_json::json!(gap.required_value.saturating_sub(gap.current_value)),
                )
                .with_context(format!("{} {}", gap.description, gap.suggested_action));
            task.deadline = self.next_deadline();
            if let Some(category) = &self.config.orchestrator.category {
                task = task.with_parameter("category", serde_json::json!(category));
            }
            if let Some(requirement) = self.config.requirements.get(gap.data_type) {
                if !requirement.mandatory_fields.is_empty() {
                    task = task.with_parameter(
                        "mandatory_fields",
                        serde_json::json!(requirement.mandatory_fields),
                    );
                }
            }

            jobs.push(Job { task, agent });
        }

        jobs
    }

    /// Dispatch, validate and decide until no refines remain
    async fn execute(&mut self, jobs: Vec<Job>, tracker: &mut ProgressTracker) -> Result<()> {
        let max_refines = self.config.orchestrator.max_refine_attempts;
        let mut lifecycles: BTreeMap<String, TaskLifecycle> = BTreeMap::new();
        let mut handles: BTreeMap<String, AgentHandle> = BTreeMap::new();
        let mut pending = jobs;

        while !pending.is_empty() {
            for job in &pending {
                handles.insert(job.task.id.clone(), Arc::clone(&job.agent));
                self.emit(
                    AuditEvent::new(AuditEventKind::TaskDispatched, job.agent.agent_id())
                        .with_data(serde_json::json!({
                            "task_id": job.task.id,
                            "task_type": job.task.task_type,
                            "attempt": job.task.attempt,
                            "priority": job.task.priority
                        })),
                );
            }

            let dispatched = self.pool.dispatch(pending).await;
            let mut refines = Vec::new();

            for outcome in dispatched {
                let lifecycle = lifecycles
                    .entry(outcome.task.id.clone())
                    .or_insert_with(|| TaskLifecycle::new(max_refines));

                let submission = match outcome.result {
                    Ok(submission) => submission,
                    Err(e) => {
                        self.record_failure(&outcome.task, &outcome.agent_id, e, lifecycle, tracker)?;
                        continue;
                    }
                };

                let decision = self.settle(submission, lifecycle, tracker)?;
                if let (Decision::Refine, Some(feedback)) = (decision.decision, decision.feedback) {
                    if let Some(agent) = handles.get(&outcome.task.id) {
                        let task = outcome.task.refine(feedback, self.next_deadline());
                        refines.push(Job {
                            task,
                            agent: Arc::clone(agent),
                        });
                    }
                }
            }

            pending = refines;
        }

        Ok(())
    }

    fn decide(
        &self,
        submission: &DataSubmission,
        outcome: &PipelineOutcome,
        lifecycle: &mut TaskLifecycle,
    ) -> OrchestratorDecision {
        let thresholds = Thresholds::from(&self.config.orchestrator);
        let score = outcome.combined_score;
        let decision = lifecycle.settle(score, thresholds);
        let issues = outcome.issues();

        let reasoning = match decision {
            Decision::Accept => format!(
                "Combined score {:.3} meets accept threshold {:.2}",
                score, thresholds.accept
            ),
            Decision::Refine => format!(
                "Combined score {:.3} below accept threshold {:.2}, {} refine attempt(s) left",
                score,
                thresholds.accept,
                lifecycle.attempts_remaining()
            ),
            Decision::Reject if score >= thresholds.refine => format!(
                "Combined score {:.3} below accept threshold {:.2}, refine attempts exhausted",
                score, thresholds.accept
            ),
            Decision::Reject => format!(
                "Combined score {:.3} below refine threshold {:.2}",
                score, thresholds.refine
            ),
        };

        let feedback = (decision == Decision::Refine).then(|| issues.join("; "));
        OrchestratorDecision::new(&submission.id, decision, score, reasoning, feedback)
    }

    /// Validate, decide, record and (on accept) merge one submission
    fn settle(
        &mut self,
        submission: DataSubmission,
        lifecycle: &mut TaskLifecycle,
        tracker: &mut ProgressTracker,
    ) -> Result<OrchestratorDecision> {
        lifecycle.begin_validation();
        let outcome = self.pipeline.run(&submission);

        self.persist(|store| {
            store.record_submission(&submission)?;
            for result in &outcome.results {
                store.record_validation(result)?;
            }
            Ok(())
        })?;
        self.trail.validations.extend(outcome.results.iter().cloned());

        self.emit(
            AuditEvent::new(AuditEventKind::SubmissionValidated, &submission.agent_id)
                .with_submission(&submission.id)
                .with_data(serde_json::json!({
                    "combined_score": outcome.combined_score,
                    "short_circuited": outcome.short_circuited,
                    "issues": outcome.issues()
                })),
        );

        let decision = self.decide(&submission, &outcome, lifecycle);
        tracker.record_decision(decision.decision);
        self.persist(|store| store.record_decision(&decision))?;
        self.trail.decisions.push(decision.clone());

        tracing::info!(
            submission_id = %submission.id,
            task_id = %submission.task_id,
            data_type = %submission.data_type(),
            score = decision.quality_score,
            decision = %decision.decision,
            "submission decided"
        );

        let kind = match decision.decision {
            Decision::Accept => {
                self.merge(&submission, decision.quality_score, tracker)?;
                AuditEventKind::SubmissionAccepted
            }
            Decision::Refine => AuditEventKind::SubmissionRefined,
            Decision::Reject => AuditEventKind::SubmissionRejected,
        };
        self.emit(
            AuditEvent::new(kind, AGENT)
                .with_submission(&submission.id)
                .with_data(serde_json::json!({
                    "score": decision.quality_score,
                    "reasoning": decision.reasoning,
                    "feedback": decision.feedback
                })),
        );

        self.trail.submissions.push(submission);
        Ok(decision)
    }

    fn merge(
        &mut self,
        submission: &DataSubmission,
        score: f64,
        tracker: &mut ProgressTracker,
    ) -> Result<()> {
        let key = DatasetKey::for_payload(
            &submission.payload,
            self.config.orchestrator.category.as_deref(),
        );
        let record = AcceptedRecord::from_submission(submission, key.clone(), score);
        self.persist(|store| store.record_accepted(&record))?;

        let merged = self.dataset.insert(record);
        if !merged.duplicates.is_empty() {
            tracing::debug!(key = %key, duplicates = merged.duplicates.len(), "duplicate items merged");
            tracker.record_duplicates(merged.duplicates.len());
            self.emit(
                AuditEvent::new(AuditEventKind::DuplicatesDetected, AGENT)
                    .with_submission(&submission.id)
                    .with_data(serde_json::json!({
                        "key": key.to_string(),
                        "duplicates": merged.duplicates
                    })),
            );
        }
        Ok(())
    }

    /// The task produced no submission: record a dispatch result and reject
    fn record_failure(
        &mut self,
        task: &TaskAssignment,
        agent_id: &str,
        error: EngineError,
        lifecycle: &mut TaskLifecycle,
        tracker: &mut ProgressTracker,
    ) -> Result<()> {
        let submission_id = Uuid::new_v4().to_string();
        let issue = error.to_string();
        tracing::warn!(
            task_id = %task.id,
            task_type = %task.task_type,
            attempt = task.attempt,
            agent = agent_id,
            error = %issue,
            "task failed"
        );

        let result = ValidationResult::new(
            &submission_id,
            ValidationType::Dispatch,
            0.0,
            false,
            vec![issue.clone()],
            Vec::new(),
            format!("Task {} attempt {} produced no submission", task.id, task.attempt),
        );
        let decision = OrchestratorDecision::new(
            &submission_id,
            lifecycle.fail(),
            0.0,
            format!("Agent {} failed: {}", agent_id, issue),
            None,
        );
        tracker.record_decision(decision.decision);

        self.persist(|store| {
            store.record_validation(&result)?;
            store.record_decision(&decision)
        })?;
        self.trail.validations.push(result);
        self.trail.decisions.push(decision);

        self.emit(
            AuditEvent::new(AuditEventKind::TaskFailed, agent_id)
                .with_submission(&submission_id)
                .with_data(serde_json::json!({
                    "task_id": task.id,
                    "attempt": task.attempt,
                    "error": issue
                })),
        );
        self.emit(
            AuditEvent::new(AuditEventKind::SubmissionRejected, AGENT)
                .with_submission(&submission_id)
                .with_data(serde_json::json!({ "score": 0.0, "issues": [issue] })),
        );
        Ok(())
    }

    fn publish(&mut self, report: ProgressReport) -> Result<()> {
        self.persist(|store| store.record_report(&report))?;
        tracing::info!(
            iteration = report.iteration,
            completeness = report.completeness,
            gaps = report.gaps.len(),
            "progress"
        );
        self.emit(
            AuditEvent::new(AuditEventKind::ProgressReported, AGENT).with_data(
                serde_json::json!({
                    "iteration": report.iteration,
                    "completeness": report.completeness,
                    "gaps": report.gaps.len(),
                    "estimated_completion": report.estimated_completion
                }),
            ),
        );
        self.latest_report = Some(report);
        Ok(())
    }
}
