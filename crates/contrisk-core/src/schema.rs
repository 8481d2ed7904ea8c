//! Arrow schema definitions for columnar export of risk reports and audit events.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, Float64Array, ListBuilder, StringArray, StringBuilder, UInt32Array, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;

use crate::types::{Evidence, RiskReport};

/// One row per finding, in report order.
pub fn findings_schema() -> Schema {
    Schema::new(vec![
        Field::new("document_id", DataType::Utf8, false),
        Field::new("rank", DataType::UInt32, false),
        Field::new("clause_id", DataType::UInt64, false),
        Field::new("category", DataType::Utf8, false),
        Field::new("severity", DataType::Utf8, false),
        Field::new("confidence", DataType::Float64, false),
        Field::new("keyword_score", DataType::Float64, false),
        Field::new("entity_score", DataType::Float64, false),
        Field::new("classifier_score", DataType::Float64, false),
        Field::new(
            "terms",
            DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
            false,
        ),
    ])
}

/// Schema for audit events handed to the audit recorder.
pub fn audit_schema() -> Schema {
    Schema::new(vec![
        Field::new("document_id", DataType::Utf8, false),
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into())),
            false,
        ),
        Field::new("generated_at", DataType::UInt64, false),
        Field::new("overall_risk_level", DataType::Utf8, false),
        Field::new("contract_type", DataType::Utf8, false),
        Field::new("finding_count", DataType::UInt64, false),
        Field::new("high", DataType::UInt64, false),
        Field::new("medium", DataType::UInt64, false),
        Field::new("low", DataType::UInt64, false),
        Field::new("entity_extraction_degraded", DataType::Boolean, false),
        Field::new("classification_degraded", DataType::Boolean, false),
    ])
}

/// Flatten a report's findings into a [`RecordBatch`] with [`findings_schema`].
pub fn findings_batch(report: &RiskReport) -> Result<RecordBatch, ArrowError> {
    let n = report.findings.len();

    let document_id = StringArray::from(vec![report.document_id.as_str(); n]);
    let rank = UInt32Array::from((1..=n as u32).collect::<Vec<_>>());
    let clause_id = UInt64Array::from(
        report
            .findings
            .iter()
            .map(|f| f.clause_id as u64)
            .collect::<Vec<_>>(),
    );
    let category = StringArray::from(
        report
            .findings
            .iter()
            .map(|f| f.category.as_str())
            .collect::<Vec<_>>(),
    );
    let severity = StringArray::from(
        report
            .findings
            .iter()
            .map(|f| f.severity.as_str())
            .collect::<Vec<_>>(),
    );
    let float_col = |get: fn(&crate::types::RiskFinding) -> f64| {
        Float64Array::from(report.findings.iter().map(get).collect::<Vec<_>>())
    };

    let mut terms = ListBuilder::new(StringBuilder::new());
    for finding in &report.findings {
        for evidence in &finding.evidence {
            if let Evidence::Keyword { term, .. } = evidence {
                terms.values().append_value(term);
            }
        }
        terms.append(true);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(document_id),
        Arc::new(rank),
        Arc::new(clause_id),
        Arc::new(category),
        Arc::new(severity),
        Arc::new(float_col(|f| f.confidence)),
        Arc::new(float_col(|f| f.breakdown.keyword)),
        Arc::new(float_col(|f| f.breakdown.entity)),
        Arc::new(float_col(|f| f.breakdown.classifier)),
        Arc::new(terms.finish()),
    ];

    RecordBatch::try_new(Arc::new(findings_schema()), columns)
}
