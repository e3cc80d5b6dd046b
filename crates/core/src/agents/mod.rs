//! # Collection Agents
//!
//! The contract external collectors implement. Agents are pure
//! request/response collaborators: they never touch the accepted dataset.
//!
//! "Nothing found" is not an error. An agent returns
//! [`CollectionResult::empty`] and the validation pipeline rejects it.

pub mod audited;
pub mod replay;

pub use audited::{Audited, ExecutionLog, LogAction, LogEntry};
pub use replay::{ReplayAgent, ReplayStep};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::protocol::{clamp_score, DataSubmission, DataType, Payload, Source, TaskAssignment};

/// What a collection agent hands back for one task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionResult {
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub quality_score: f64,
    #[serde(default)]
    pub reasoning: String,
}

impl CollectionResult {
    /// Empty data, empty sources
    pub fn empty(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: reasoning.into(),
            ..Self::default()
        }
    }

    /// Wrap the result in a submission for `task`.
    ///
    /// Fails with a structural error when the data does not fit the payload
    /// type of the task.
    pub fn into_submission(self, task: &TaskAssignment, agent_id: &str) -> Result<DataSubmission> {
        let payload = Payload::from_data(task.task_type, self.data)?;
        Ok(DataSubmission::new(payload, self.sources)
            .with_task(&task.id, agent_id)
            .with_scores(clamp_score(self.confidence), clamp_score(self.quality_score))
            .with_reasoning(self.reasoning))
    }
}

/// An external collector responsible for one data_type
#[async_trait]
pub trait CollectionAgent: Send + Sync {
    fn agent_id(&self) -> &str;

    fn data_type(&self) -> DataType;

    /// Execute one task. Must return an empty result, not an error, when
    /// nothing was found.
    async fn collect(&self, task: &TaskAssignment) -> Result<CollectionResult>;
}

/// Responsible agent per data_type, each wrapped in an [`Audited`] log
#[derive(Default)]
pub struct AgentRegistry {
    agents: BTreeMap<DataType, Arc<Audited<dyn CollectionAgent>>>,
    blacklist: Vec<String>,
}

impl AgentRegistry {
    /// `blacklist` is the fabrication marker list used for source self-checks
    pub fn new(blacklist: Vec<String>) -> Self {
        Self {
            agents: BTreeMap::new(),
            blacklist,
        }
    }

    /// Register an agent for its data_type, replacing any previous one
    pub fn register<A: CollectionAgent + 'static>(&mut self, agent: A) {
        let agent: Arc<dyn CollectionAgent> = Arc::new(agent);
        let data_type = agent.data_type();
        let audited = Arc::new(Audited::new(agent, self.blacklist.clone()));
        if let Some(previous) = self.agents.insert(data_type, audited) {
            tracing::warn!(
                data_type = %data_type,
                replaced = %previous.agent_id(),
                "collection agent replaced"
            );
        }
    }

    pub fn with<A: CollectionAgent + 'static>(mut self, agent: A) -> Self {
        self.register(agent);
        self
    }

    pub fn get(&self, data_type: DataType) -> Option<Arc<Audited<dyn CollectionAgent>>> {
        self.agents.get(&data_type).cloned()
    }

    pub fn data_types(&self) -> impl Iterator<Item = DataType> + '_ {
        self.agents.keys().copied()
    }

    /// Execution logs of every registered agent
    pub fn logs(&self) -> Vec<(String, Vec<LogEntry>)> {
        self.agents
            .values()
            .map(|a| (a.agent_id().to_string(), a.log().entries()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
