//! Analysis runtime: runs the signal producers concurrently under model
//! timeouts, joins them in the fusion engine, and hands a summary of each
//! report to the audit recorder without waiting on it.

mod audit;
mod pipeline;

pub use audit::{
    AuditEvent, AuditRecorder, AuditSink, DegradedFlags, MemoryRecorder, TracingRecorder,
    audit_batch, spawn_recorder,
};
pub use pipeline::{AnalysisError, Analyzer, Stage};
