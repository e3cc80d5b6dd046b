//! # Message Protocol
//!
//! Typed envelopes passed between agents, validators and the orchestrator.
//! All message passing is in-process.

pub mod messages;
pub mod payload;
pub mod schema;
pub mod source;

pub use messages::{
    clamp_score, DataSubmission, Decision, Gap, GapType, OrchestratorDecision, Priority,
    ProgressReport, TaskAssignment, ValidationResult, ValidationType,
};
pub use payload::{DataType, ListItem, Numeric, Payload, PriceRange};
pub use schema::{FieldKind, FieldProblem, FieldSpec, SchemaRegistry};
pub use source::{Source, SourceConfidence};
