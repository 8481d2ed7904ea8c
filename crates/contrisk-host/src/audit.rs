//! Audit channel.
//!
//! The analyzer hands each finished report's summary to an [`AuditSink`].
//! The sink is the sending half of a bounded channel; a background task owns
//! the receiving half and forwards events to an [`AuditRecorder`]. Submitting
//! never blocks and never fails the pipeline: a full or closed channel drops
//! the event with a warning.

use std::sync::{Arc, Mutex};

use arrow::array::{ArrayRef, BooleanArray, StringArray, TimestampNanosecondArray, UInt64Array};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use contrisk_core::schema::audit_schema;
use contrisk_core::{ReportSummary, RiskReport};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Which optional signals were missing from a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DegradedFlags {
    pub entity_extraction: bool,
    pub classification: bool,
}

/// Immutable record of one analysis, as sent to the audit recorder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub document_id: String,
    /// Wall-clock time the event was created.
    pub timestamp: DateTime<Utc>,
    /// The report's logical timestamp.
    pub generated_at: u64,
    pub report_summary: ReportSummary,
    pub degraded_flags: DegradedFlags,
}

impl AuditEvent {
    pub fn from_report(report: &RiskReport) -> Self {
        Self::from_report_at(report, Utc::now())
    }

    pub fn from_report_at(report: &RiskReport, timestamp: DateTime<Utc>) -> Self {
        Self {
            document_id: report.document_id.clone(),
            timestamp,
            generated_at: report.generated_at,
            report_summary: report.summary(),
            degraded_flags: DegradedFlags {
                entity_extraction: report.entity_extraction_degraded,
                classification: report.classification_degraded,
            },
        }
    }
}

/// Persists or forwards audit events. Failures are logged, never propagated
/// back to the pipeline.
#[async_trait]
pub trait AuditRecorder: Send + Sync + 'static {
    async fn record(&self, event: AuditEvent) -> anyhow::Result<()>;
}

/// Writes each event as a structured `tracing` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRecorder;

#[async_trait]
impl AuditRecorder for TracingRecorder {
    async fn record(&self, event: AuditEvent) -> anyhow::Result<()> {
        let s = &event.report_summary;
        tracing::info!(
            target: "contrisk::audit",
            document_id = %event.document_id,
            timestamp = %event.timestamp.to_rfc3339(),
            generated_at = event.generated_at,
            overall = %s.overall_risk_level,
            contract_type = %s.contract_type,
            findings = s.finding_count,
            high = s.high,
            medium = s.medium,
            low = s.low,
            entity_extraction_degraded = event.degraded_flags.entity_extraction,
            classification_degraded = event.degraded_flags.classification,
            "audit event"
        );
        Ok(())
    }
}

/// Keeps events in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, in arrival order.
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl AuditRecorder for MemoryRecorder {
    async fn record(&self, event: AuditEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .map_err(|e| anyhow::anyhow!("audit buffer poisoned: {e}"))?
            .push(event);
        Ok(())
    }
}

/// Sending half of the audit channel.
#[derive(Debug, Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<AuditEvent>,
}

impl AuditSink {
    /// Queue an event without waiting. Returns whether it was accepted.
    pub fn submit(&self, event: AuditEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::warn!(
                    document_id = %event.document_id,
                    "audit channel full, event dropped"
                );
                false
            }
            Err(TrySendError::Closed(event)) => {
                tracing::warn!(
                    document_id = %event.document_id,
                    "audit recorder gone, event dropped"
                );
                false
            }
        }
    }
}

/// Start a background task draining the audit channel into `recorder`.
///
/// The task ends once every [`AuditSink`] clone is dropped; its result is the
/// number of events the recorder accepted.
pub fn spawn_recorder<R: AuditRecorder>(
    recorder: R,
    capacity: usize,
) -> (AuditSink, JoinHandle<usize>) {
    let (tx, mut rx) = mpsc::channel::<AuditEvent>(capacity.max(1));
    let handle = tokio::spawn(async move {
        let mut recorded = 0usize;
        while let Some(event) = rx.recv().await {
            let document_id = event.document_id.clone();
            match recorder.record(event).await {
                Ok(()) => recorded += 1,
                Err(e) => {
                    tracing::warn!(document_id = %document_id, error = %e, "audit record failed")
                }
            }
        }
        tracing::debug!(recorded, "audit recorder stopped");
        recorded
    });
    (AuditSink { tx }, handle)
}

/// Flatten audit events into a [`RecordBatch`] with the audit schema.
pub fn audit_batch(events: &[AuditEvent]) -> Result<RecordBatch, ArrowError> {
    let u64_col = |get: fn(&AuditEvent) -> u64| {
        Arc::new(UInt64Array::from(events.iter().map(get).collect::<Vec<_>>())) as ArrayRef
    };
    let bool_col = |get: fn(&AuditEvent) -> bool| {
        Arc::new(BooleanArray::from(events.iter().map(get).collect::<Vec<_>>())) as ArrayRef
    };

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            events.iter().map(|e| e.document_id.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(
            TimestampNanosecondArray::from(
                events
                    .iter()
                    .map(|e| e.timestamp.timestamp_nanos_opt().unwrap_or(i64::MAX))
                    .collect::<Vec<_>>(),
            )
            .with_timezone("UTC"),
        ),
        u64_col(|e| e.generated_at),
        Arc::new(StringArray::from(
            events
                .iter()
                .map(|e| e.report_summary.overall_risk_level.as_str())
                .collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            events
                .iter()
                .map(|e| e.report_summary.contract_type.as_str())
                .collect::<Vec<_>>(),
        )),
        u64_col(|e| e.report_summary.finding_count as u64),
        u64_col(|e| e.report_summary.high as u64),
        u64_col(|e| e.report_summary.medium as u64),
        u64_col(|e| e.report_summary.low as u64),
        bool_col(|e| e.degraded_flags.entity_extraction),
        bool_col(|e| e.degraded_flags.classification),
    ];

    RecordBatch::try_new(Arc::new(audit_schema()), columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use contrisk_core::{ContractType, Severity};

    fn report(document_id: &str, generated_at: u64) -> RiskReport {
        RiskReport {
            document_id: document_id.into(),
            contract_type: ContractType::unknown(),
            overall_risk_level: Severity::Low,
            findings: vec![],
            generated_at,
            clause_count: 1,
            entities: vec![],
            entity_extraction_degraded: true,
            classification_degraded: false,
            degraded_signals: vec![],
        }
    }

    struct Failing;

    #[async_trait]
    impl AuditRecorder for Failing {
        async fn record(&self, _event: AuditEvent) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }

    #[test]
    fn event_copies_report_summary() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let event = AuditEvent::from_report_at(&report("doc-1", 4), at);
        assert_eq!(event.document_id, "doc-1");
        assert_eq!(event.generated_at, 4);
        assert_eq!(event.timestamp, at);
        assert_eq!(event.report_summary.finding_count, 0);
        assert!(event.degraded_flags.entity_extraction);
        assert!(!event.degraded_flags.classification);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["report_summary"]["overall_risk_level"], "low");
    }

    #[tokio::test]
    async fn recorder_receives_events_in_order() {
        let memory = MemoryRecorder::new();
        let (sink, handle) = spawn_recorder(memory.clone(), 8);
        assert!(sink.submit(AuditEvent::from_report(&report("a", 1))));
        assert!(sink.submit(AuditEvent::from_report(&report("b", 2))));
        drop(sink);

        assert_eq!(handle.await.unwrap(), 2);
        let ids: Vec<String> = memory.events().into_iter().map(|e| e.document_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn full_channel_drops_without_failing() {
        let (tx, _rx) = mpsc::channel(1);
        let sink = AuditSink { tx };
        assert!(sink.submit(AuditEvent::from_report(&report("a", 1))));
        assert!(!sink.submit(AuditEvent::from_report(&report("b", 2))));
    }

    #[tokio::test]
    async fn closed_channel_drops_without_failing() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let sink = AuditSink { tx };
        assert!(!sink.submit(AuditEvent::from_report(&report("a", 1))));
    }

    #[tokio::test]
    async fn recorder_errors_are_not_counted() {
        let (sink, handle) = spawn_recorder(Failing, 4);
        assert!(sink.submit(AuditEvent::from_report(&report("a", 1))));
        drop(sink);
        assert_eq!(handle.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn tracing_recorder_accepts_events() {
        let (sink, handle) = spawn_recorder(TracingRecorder, 0);
        assert!(sink.submit(AuditEvent::from_report(&report("a", 1))));
        drop(sink);
        assert_eq!(handle.await.unwrap(), 1);
    }

    #[test]
    fn audit_batch_has_one_row_per_event() {
        let events = vec![
            AuditEvent::from_report(&report("a", 1)),
            AuditEvent::from_report(&report("b", 2)),
        ];
        let batch = audit_batch(&events).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 11);

        let generated = batch
            .column_by_name("generated_at")
            .unwrap()
            .as_any()
            .downcast_ref::<UInt64Array>()
            .unwrap();
        assert_eq!(generated.value(1), 2);

        let degraded = batch
            .column_by_name("entity_extraction_degraded")
            .unwrap()
            .as_any()
            .downcast_ref::<BooleanArray>()
            .unwrap();
        assert!(degraded.value(0));
    }
}
