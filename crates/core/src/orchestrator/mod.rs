//! # Orchestrator Module
//!
//! Decision state machine, bounded dispatch, audit events, progress
//! tracking and the main collection loop.

pub mod coordinator;
pub mod decision;
pub mod dispatch;
pub mod events;
pub mod progress;

pub use coordinator::{Orchestrator, OrchestratorCommand, RunOutcome, RunStatus};
pub use decision::{decide, SubmissionStage, TaskLifecycle, Thresholds};
pub use dispatch::{DispatchPool, Dispatched, Job};
pub use events::{AuditEvent, AuditEventKind, AuditTrail};
pub use progress::{ExecutionSummary, ProgressTracker};
