//! # Bounded Dispatch Pool
//!
//! Fan-out/fan-in of task assignments to collection agents. In-flight
//! calls are bounded globally and per data_type; every call is bounded by
//! the task deadline. A slow, failing or panicking agent becomes an `Err`
//! for that one task and never takes the loop down with it.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::agents::{Audited, CollectionAgent};
use crate::config::OrchestratorConfig;
use crate::error::{EngineError, Result};
use crate::protocol::{DataSubmission, DataType, TaskAssignment};

/// Shared handle to a registered, audited agent
pub type AgentHandle = Arc<Audited<dyn CollectionAgent>>;

/// A task paired with the agent that will serve it
pub struct Job {
    pub task: TaskAssignment,
    pub agent: AgentHandle,
}

/// Result of one dispatched task
#[derive(Debug)]
pub struct Dispatched {
    pub task: TaskAssignment,
    pub agent_id: String,
    pub result: Result<DataSubmission>,
}

pub struct DispatchPool {
    global: Arc<Semaphore>,
    per_type: BTreeMap<DataType, Arc<Semaphore>>,
    per_type_limit: usize,
    default_deadline: Duration,
}

impl DispatchPool {
    pub fn new(max_concurrent: usize, per_type_limit: usize, default_deadline: Duration) -> Self {
        Self {
            global: Arc::new(Semaphore::new(max_concurrent.max(1))),
            per_type: BTreeMap::new(),
            per_type_limit: per_type_limit.max(1),
            default_deadline,
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(
            config.max_concurrent_tasks,
            config.max_tasks_per_type,
            config.task_deadline(),
        )
    }

    fn type_gate(&mut self, data_type: DataType) -> Arc<Semaphore> {
        let limit = self.per_type_limit;
        Arc::clone(
            self.per_type
                .entry(data_type)
                .or_insert_with(|| Arc::new(Semaphore::new(limit))),
        )
    }

    /// Dispatch every job and wait for all of them. Results come back in
    /// job order regardless of completion order.
    pub async fn dispatch(&mut self, jobs: Vec<Job>) -> Vec<Dispatched> {
        let total = jobs.len();
        let mut slots: Vec<Option<Dispatched>> = Vec::with_capacity(total);
        let mut fallback = Vec::with_capacity(total);
        let mut join_set = JoinSet::new();

        // SCATTER
        for (index, job) in jobs.into_iter().enumerate() {
            slots.push(None);
            fallback.push((job.task.clone(), job.agent.agent_id().to_string()));

            let global = Arc::clone(&self.global);
            let gate = self.type_gate(job.task.task_type);
            let default_deadline = self.default_deadline;

            join_set.spawn(async move {
                let agent_id = job.agent.agent_id().to_string();
                let result = call_agent(job.agent, &job.task, gate, global, default_deadline).await;
                (
                    index,
                    Dispatched {
                        task: job.task,
                        agent_id,
                        result,
                    },
                )
            });
        }

        // GATHER
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, dispatched)) => slots[index] = Some(dispatched),
                Err(e) => tracing::error!(error = %e, "dispatch task lost"),
            }
        }

        slots
            .into_iter()
            .zip(fallback)
            .map(|(slot, (task, agent_id))| {
                slot.unwrap_or_else(|| Dispatched {
                    task,
                    agent_id,
                    result: Err(EngineError::Agent("dispatch task lost".to_string())),
                })
            })
            .collect()
    }
}

/// Time left before `deadline`, or the default budget when there is none
pub fn remaining_budget(deadline: Option<DateTime<Utc>>, default: Duration) -> Duration {
    match deadline {
        Some(deadline) => (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO),
        None => default,
    }
}

async fn call_agent(
    agent: AgentHandle,
    task: &TaskAssignment,
    gate: Arc<Semaphore>,
    global: Arc<Semaphore>,
    default_deadline: Duration,
) -> Result<DataSubmission> {
    let closed = |_| EngineError::Agent("dispatch pool closed".to_string());
    let _type_permit = gate.acquire_owned().await.map_err(closed)?;
    let _global_permit = global.acquire_owned().await.map_err(closed)?;

    let budget = remaining_budget(task.deadline, default_deadline);
    let owned_task = task.clone();
    let mut handle = tokio::spawn(async move { agent.submit(&owned_task).await });

    match tokio::time::timeout(budget, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) if e.is_panic() => Err(EngineError::Agent(format!("agent panicked: {}", e))),
        Ok(Err(e)) => Err(EngineError::Agent(e.to_string())),
        Err(_) => {
            handle.abort();
            tracing::warn!(
                task_id = %task.id,
                task_type = %task.task_type,
                budget_ms = budget.as_millis() as u64,
                "agent exceeded its deadline"
            );
            Err(EngineError::Timeout)
        }
    }
}
