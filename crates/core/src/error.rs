//! # Engine Errors
//!
//! Error taxonomy for the collection/validation engine.
//!
//! Most of these never escape the orchestration loop: a structural defect,
//! a fabrication marker, a sourceless submission or a timed-out agent all
//! become a REJECT decision whose issue text is the error's `Display`.
//! Only configuration, store and protocol-level failures abort a run.

use thiserror::Error;

/// Errors produced by the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// A message is missing a required protocol field or has the wrong shape
    #[error("structural error: {0}")]
    Structural(String),

    /// A fabrication marker was found in payload text or a source URL
    #[error("FABRICATION MARKER DETECTED: '{marker}' in {location}")]
    FabricationDetected { marker: String, location: String },

    /// The agent produced zero sources
    #[error("CRITICAL: No sources provided - all data must have sources")]
    SourceUnavailable,

    /// The agent exceeded its task deadline
    #[error("timeout")]
    Timeout,

    /// The loop ended with requirements still unmet
    #[error("requirements unsatisfiable after {iterations} iterations: {unmet} gap(s) remain")]
    RequirementsUnsatisfiable { iterations: u32, unmet: usize },

    /// A collection agent failed for a reason other than "nothing found"
    #[error("agent error: {0}")]
    Agent(String),

    /// Invalid engine configuration
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
