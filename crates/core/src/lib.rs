//! # Sieve Core
//!
//! The engine of Sieve: validates research data submitted by collection
//! agents, keeps the accepted dataset, finds what is still missing and
//! drives agents until the requirements are met or the loop runs out.
//!
//! ## Architecture
//!
//! - `protocol/` - Message types, typed payloads, sources and the schema registry
//! - `validation/` - Quality → Source → Relevance pipeline (scores multiply)
//! - `agents/` - Collection agent contract, audited wrapper, fixture replay
//! - `gaps` - Gap analysis and completeness
//! - `dataset` - Accepted dataset keyed by (data_type, category)
//! - `orchestrator/` - Decision state machine, bounded dispatch, main loop
//! - `state/` - SQLite audit store and the `.sieve` runtime directory
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sieve_core::{AgentRegistry, EngineConfig, Orchestrator};
//!
//! let config = EngineConfig::default();
//! let agents = AgentRegistry::new(config.source.fabrication_markers.clone()).with(my_agent);
//! let mut orchestrator = Orchestrator::new(config, agents)?;
//! let outcome = orchestrator.run().await?;
//! ```

pub mod agents;
pub mod config;
pub mod dataset;
pub mod error;
pub mod gaps;
pub mod orchestrator;
pub mod protocol;
pub mod state;
pub mod validation;

pub use agents::{AgentRegistry, CollectionAgent, CollectionResult};
pub use config::{EngineConfig, Requirement, Requirements};
pub use dataset::{AcceptedDataset, DatasetSnapshot};
pub use error::{EngineError, Result};
pub use orchestrator::{Orchestrator, OrchestratorCommand, RunOutcome, RunStatus};
pub use validation::ValidationPipeline;
