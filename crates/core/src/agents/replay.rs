//! Fixture replay agent.
//!
//! Replays canned collection results from JSON, one step per call. Drives
//! the `run --fixtures` CLI command and the end-to-end tests; it is not a
//! collector of its own.
//!
//! Fixture file shape:
//!
//! ```json
//! {
//!   "agent_id": "brand_collector",
//!   "data_type": "brand_data",
//!   "steps": [
//!     { "data": { "brand_name": "Gladiator", "tier": "premium" },
//!       "sources": [{ "url": "https://...", "publisher": "Reuters", "confidence": "high" }],
//!       "confidence": 0.9, "quality_score": 0.85 },
//!     { "delay_ms": 5000 },
//!     { "error": "upstream returned 503" }
//!   ]
//! }
//! ```

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::{CollectionAgent, CollectionResult};
use crate::error::{EngineError, Result};
use crate::protocol::{DataType, TaskAssignment};

/// One scripted response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayStep {
    #[serde(flatten)]
    pub result: CollectionResult,
    /// Sleep before answering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    /// Fail the call with this message instead of answering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<CollectionResult> for ReplayStep {
    fn from(result: CollectionResult) -> Self {
        Self {
            result,
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReplayFile {
    agent_id: String,
    data_type: DataType,
    #[serde(default)]
    steps: Vec<ReplayStep>,
}

pub struct ReplayAgent {
    agent_id: String,
    data_type: DataType,
    steps: Mutex<VecDeque<ReplayStep>>,
}

impl ReplayAgent {
    pub fn new(agent_id: &str, data_type: DataType, steps: Vec<ReplayStep>) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            data_type,
            steps: Mutex::new(steps.into()),
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: ReplayFile = serde_json::from_str(content)?;
        Ok(Self::new(&file.agent_id, file.data_type, file.steps))
    }

    /// Load every `*.json` fixture in a directory, in file name order
    pub fn load_dir(dir: impl AsRef<Path>) -> anyhow::Result<Vec<Self>> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read fixture directory: {:?}", dir))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        paths
            .iter()
            .map(|path| {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read fixture: {:?}", path))?;
                Self::from_json(&content)
                    .with_context(|| format!("Failed to parse fixture: {:?}", path))
            })
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl CollectionAgent for ReplayAgent {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    async fn collect(&self, _task: &TaskAssignment) -> Result<CollectionResult> {
        let step = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(step) = step else {
            return Ok(CollectionResult::empty("fixture exhausted"));
        };

        if let Some(ms) = step.delay_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        match step.error {
            Some(message) => Err(EngineError::Agent(message)),
            None => Ok(step.result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "agent_id": "taxonomy_collector",
        "data_type": "taxonomy",
        "steps": [
            { "data": { "subcategories": ["Shelving", "Cabinets"] },
              "sources": [{ "url": "https://www.homedepot.com/b/Storage-Organization", "publisher": "Home Depot", "confidence": "high" }],
              "confidence": 0.9, "quality_score": 0.9 },
            { "error": "rate limited" }
        ]
    }"#;

    #[tokio::test]
    async fn test_replays_in_order_then_runs_dry() {
        let agent = ReplayAgent::from_json(FIXTURE).unwrap();
        assert_eq!(agent.data_type(), DataType::Taxonomy);
        let task = TaskAssignment::new(DataType::Taxonomy);

        let first = agent.collect(&task).await.unwrap();
        assert_eq!(first.sources.len(), 1);

        let second = agent.collect(&task).await.unwrap_err();
        assert_eq!(second.to_string(), "agent error: rate limited");

        let third = agent.collect(&task).await.unwrap();
        assert!(third.data.is_empty());
        assert!(third.sources.is_empty());
        assert_eq!(agent.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_step_sleeps() {
        let agent = ReplayAgent::new(
            "slow",
            DataType::Pricing,
            vec![ReplayStep {
                delay_ms: Some(10_000),
                ..ReplayStep::default()
            }],
        );
        let task = TaskAssignment::new(DataType::Pricing);
        let outcome =
            tokio::time::timeout(Duration::from_secs(1), agent.collect(&task)).await;
        assert!(outcome.is_err());
    }
}
