//! Scan pipeline: traversal and the batch-stepped remediation driver.

pub mod orchestrator;
pub mod walker;

pub use orchestrator::{
    CoreRepairContext, EnginePhase, LogSink, NotificationSink, RemediationOrchestrator,
};
pub use walker::{FileWalker, WalkBatch};
