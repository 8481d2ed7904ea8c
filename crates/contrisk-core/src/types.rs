//! Shared data model for a single contract analysis run.
//!
//! Offsets are byte offsets into the normalised document text produced by
//! [`normalize`](crate::normalize). Every value here is immutable once built;
//! producers hand them to the fusion engine by reference.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Risk severity. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed entity label set. External model vocabularies are mapped onto this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityLabel {
    Party,
    Date,
    Money,
    Obligation,
    Duration,
    Other,
}

impl EntityLabel {
    pub const ALL: [EntityLabel; 6] = [
        Self::Party,
        Self::Date,
        Self::Money,
        Self::Obligation,
        Self::Duration,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Party => "PARTY",
            Self::Date => "DATE",
            Self::Money => "MONEY",
            Self::Obligation => "OBLIGATION",
            Self::Duration => "DURATION",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn shifted(&self, by: usize) -> Span {
        Span::new(self.start + by, self.end + by)
    }
}

/// A contiguous span of normalised text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    pub id: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
}

impl Clause {
    pub fn span(&self) -> Span {
        Span::new(self.start_offset, self.end_offset)
    }
}

/// Output of the text normaliser: the cleaned text and its clause partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    pub text: String,
    pub clauses: Vec<Clause>,
}

/// A labelled region produced by the entity extractor adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub id: usize,
    pub clause_id: usize,
    pub start: usize,
    pub end: usize,
    pub label: EntityLabel,
    /// Clamped to `[0, 1]`.
    pub confidence: f64,
}

/// Where a keyword match came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    /// Literal dictionary phrase.
    Phrase,
    /// Regex risk pattern.
    Pattern,
}

/// A literal dictionary or pattern hit inside one clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordMatch {
    pub id: usize,
    pub clause_id: usize,
    pub span: Span,
    pub matched_term: String,
    pub risk_category: String,
    pub base_severity: Severity,
    pub source: MatchSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierTask {
    ContractType,
    RiskLevel,
}

impl ClassifierTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContractType => "contract_type",
            Self::RiskLevel => "risk_level",
        }
    }
}

impl fmt::Display for ClassifierTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierScore {
    pub task: ClassifierTask,
    pub label: String,
    pub probability: f64,
}

/// Normalised output of both classifiers. Each task's probabilities sum to 1,
/// or the task is empty when the model produced no usable mass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierOutput {
    pub contract_type: Vec<ClassifierScore>,
    pub risk_level: Vec<ClassifierScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractType {
    pub label: String,
    pub probability: f64,
}

impl ContractType {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn unknown() -> Self {
        Self {
            label: Self::UNKNOWN.to_string(),
            probability: 0.0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.label == Self::UNKNOWN
    }
}

/// One item of evidence backing a finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    Keyword {
        id: usize,
        start: usize,
        end: usize,
        term: String,
    },
    Entity {
        id: usize,
        start: usize,
        end: usize,
        label: EntityLabel,
        confidence: f64,
    },
    Classifier {
        label: String,
        probability: f64,
    },
}

/// The three weighted terms whose sum is a finding's raw score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub keyword: f64,
    pub entity: f64,
    pub classifier: f64,
}

impl ScoreBreakdown {
    pub fn raw(&self) -> f64 {
        self.keyword + self.entity + self.classifier
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFinding {
    pub category: String,
    pub severity: Severity,
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
    pub clause_id: usize,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    EntityExtraction,
    Classification,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntityExtraction => "entity_extraction",
            Self::Classification => "classification",
        }
    }
}

/// A signal source that was missing from a run, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedSignal {
    pub source: SignalSource,
    pub reason: String,
}

/// The fused, immutable result of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub document_id: String,
    pub contract_type: ContractType,
    pub overall_risk_level: Severity,
    /// Descending severity, then descending confidence, then ascending clause id.
    pub findings: Vec<RiskFinding>,
    /// Logical timestamp assigned by the caller.
    pub generated_at: u64,
    pub clause_count: usize,
    pub entities: Vec<EntitySpan>,
    pub entity_extraction_degraded: bool,
    pub classification_degraded: bool,
    pub degraded_signals: Vec<DegradedSignal>,
}

/// Counts by severity plus the headline fields, as sent to the audit recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub overall_risk_level: Severity,
    pub contract_type: String,
    pub finding_count: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl RiskReport {
    pub fn summary(&self) -> ReportSummary {
        let count = |s: Severity| self.findings.iter().filter(|f| f.severity == s).count();
        ReportSummary {
            overall_risk_level: self.overall_risk_level,
            contract_type: self.contract_type.label.clone(),
            finding_count: self.findings.len(),
            high: count(Severity::High),
            medium: count(Severity::Medium),
            low: count(Severity::Low),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.entity_extraction_degraded || self.classification_degraded
    }

    /// Findings attached to one clause, in report order.
    pub fn findings_for_clause(&self, clause_id: usize) -> impl Iterator<Item = &RiskFinding> {
        self.findings.iter().filter(move |f| f.clause_id == clause_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(severity: Severity, clause_id: usize) -> RiskFinding {
        RiskFinding {
            category: "payment_risk".into(),
            severity,
            confidence: 0.5,
            evidence: vec![Evidence::Keyword {
                id: 0,
                start: 0,
                end: 4,
                term: "fine".into(),
            }],
            clause_id,
            breakdown: ScoreBreakdown {
                keyword: 0.5,
                ..Default::default()
            },
        }
    }

    #[test]
    fn severity_orders_low_to_high() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert_eq!(Severity::High.to_string(), "high");
    }

    #[test]
    fn span_overlap_is_half_open() {
        let a = Span::new(0, 5);
        assert!(a.overlaps(&Span::new(4, 8)));
        assert!(!a.overlaps(&Span::new(5, 8)));
        assert_eq!(Span::new(3, 7).shifted(10), Span::new(13, 17));
    }

    #[test]
    fn summary_counts_by_severity() {
        let report = RiskReport {
            document_id: "doc-1".into(),
            contract_type: ContractType::unknown(),
            overall_risk_level: Severity::High,
            findings: vec![
                finding(Severity::High, 0),
                finding(Severity::Medium, 1),
                finding(Severity::Medium, 2),
            ],
            generated_at: 1,
            clause_count: 3,
            entities: vec![],
            entity_extraction_degraded: false,
            classification_degraded: true,
            degraded_signals: vec![],
        };
        let s = report.summary();
        assert_eq!(s.finding_count, 3);
        assert_eq!((s.high, s.medium, s.low), (1, 2, 0));
        assert_eq!(s.contract_type, "unknown");
        assert!(report.is_degraded());
        assert_eq!(report.findings_for_clause(1).count(), 1);
    }

    #[test]
    fn report_json_keeps_field_names() {
        let json = serde_json::to_value(finding(Severity::Medium, 4)).unwrap();
        assert_eq!(json["severity"], "medium");
        assert_eq!(json["clause_id"], 4);
        assert_eq!(json["evidence"][0]["kind"], "keyword");
        assert_eq!(
            serde_json::to_value(EntityLabel::Obligation).unwrap(),
            "OBLIGATION"
        );
    }
}
