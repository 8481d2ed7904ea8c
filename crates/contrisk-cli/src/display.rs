//! Terminal rendering for risk reports.
//!
//! `card` is a vertical, sectioned view of one report. `table` flattens the
//! findings through the Arrow findings schema and uses Arrow's pretty printer.

use std::fmt::Write;

use arrow::util::pretty::pretty_format_batches;
use contrisk_core::schema::findings_batch;
use contrisk_core::{Evidence, RiskDictionary, RiskFinding, RiskReport};

const MAX_EVIDENCE_ITEMS: usize = 10;

// ── Public API ──

/// Render a report as a card grouped into summary, signals, and findings.
pub fn render_card(report: &RiskReport) -> String {
    let mut out = String::new();
    let summary = report.summary();

    let _ = writeln!(out, "=== {} ===", report.document_id);
    let _ = writeln!(
        out,
        "{} risk, {} contract",
        summary.overall_risk_level.as_str().to_uppercase(),
        report.contract_type.label
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Summary");
    field(&mut out, "overall_risk_level", summary.overall_risk_level);
    field(
        &mut out,
        "contract_type",
        format_args!(
            "{} ({:.2})",
            report.contract_type.label, report.contract_type.probability
        ),
    );
    field(&mut out, "clauses", report.clause_count);
    field(&mut out, "entities", report.entities.len());
    field(
        &mut out,
        "findings",
        format_args!(
            "{} (high {}, medium {}, low {})",
            summary.finding_count, summary.high, summary.medium, summary.low
        ),
    );
    field(&mut out, "generated_at", report.generated_at);
    let _ = writeln!(out);

    if report.is_degraded() {
        let _ = writeln!(out, "Degraded Signals");
        for signal in &report.degraded_signals {
            field(&mut out, signal.source.as_str(), &signal.reason);
        }
        let _ = writeln!(out);
    }

    if report.findings.is_empty() {
        let _ = writeln!(out, "No risk findings.");
        return out;
    }

    let _ = writeln!(out, "Findings");
    for (rank, finding) in report.findings.iter().enumerate() {
        render_finding(&mut out, rank + 1, finding);
    }
    out
}

/// Render the findings as an ASCII table.
pub fn render_table(report: &RiskReport) -> anyhow::Result<String> {
    let batch = findings_batch(report)?;
    Ok(pretty_format_batches(&[batch])?.to_string())
}

/// Render the effective dictionary: phrases first, then patterns.
pub fn render_dictionary(dictionary: &RiskDictionary) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Phrases ({})", dictionary.phrase_count());
    for (phrase, category, severity) in dictionary.phrase_entries() {
        let _ = writeln!(out, "  {phrase:<26} {category:<26} {severity}");
    }

    if dictionary.pattern_count() > 0 {
        let _ = writeln!(out);
        let _ = writeln!(out, "Patterns ({})", dictionary.pattern_count());
        for (pattern, category, severity) in dictionary.pattern_entries() {
            let _ = writeln!(out, "  {category:<26} {:<8} {pattern}", severity.as_str());
        }
    }
    out
}

// ── Findings ──

fn render_finding(out: &mut String, rank: usize, finding: &RiskFinding) {
    let b = &finding.breakdown;
    let _ = writeln!(
        out,
        "  {rank:>2}. [{}] {:<24} clause {:<4} confidence {:.2}",
        finding.severity, finding.category, finding.clause_id, finding.confidence
    );
    let _ = writeln!(
        out,
        "      score: keyword {:.2} + entity {:.2} + classifier {:.2}",
        b.keyword, b.entity, b.classifier
    );

    let len = finding.evidence.len();
    for evidence in finding.evidence.iter().take(MAX_EVIDENCE_ITEMS) {
        let _ = match evidence {
            Evidence::Keyword {
                start, end, term, ..
            } => writeln!(out, "      keyword    {term:?} @ {start}..{end}"),
            Evidence::Entity {
                start,
                end,
                label,
                confidence,
                ..
            } => writeln!(
                out,
                "      entity     {label} @ {start}..{end} ({confidence:.2})"
            ),
            Evidence::Classifier { label, probability } => {
                writeln!(out, "      classifier {label} ({probability:.2})")
            }
        };
    }
    if len > MAX_EVIDENCE_ITEMS {
        let _ = writeln!(out, "      ... and {} more", len - MAX_EVIDENCE_ITEMS);
    }
}

// ── Helpers ──

fn field(out: &mut String, name: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "  {name:<26} {value}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use contrisk_core::{
        AnalysisConfig, ContractType, DegradedSignal, ScoreBreakdown, Severity, SignalSource,
    };

    fn report() -> RiskReport {
        RiskReport {
            document_id: "lease-7".into(),
            contract_type: ContractType {
                label: "lease".into(),
                probability: 0.8,
            },
            overall_risk_level: Severity::Medium,
            findings: vec![RiskFinding {
                category: "penalty_risk".into(),
                severity: Severity::Medium,
                confidence: 0.5,
                evidence: vec![Evidence::Keyword {
                    id: 0,
                    start: 10,
                    end: 22,
                    term: "late payment".into(),
                }],
                clause_id: 2,
                breakdown: ScoreBreakdown {
                    keyword: 0.5,
                    entity: 0.0,
                    classifier: 0.0,
                },
            }],
            generated_at: 1,
            clause_count: 3,
            entities: vec![],
            entity_extraction_degraded: true,
            classification_degraded: false,
            degraded_signals: vec![DegradedSignal {
                source: SignalSource::EntityExtraction,
                reason: "model ner timed out after 50 ms".into(),
            }],
        }
    }

    #[test]
    fn card_lists_summary_signals_and_findings() {
        let card = render_card(&report());
        assert!(card.starts_with("=== lease-7 ==="));
        assert!(card.contains("MEDIUM risk, lease contract"));
        assert!(card.contains("Degraded Signals"));
        assert!(card.contains("entity_extraction"));
        assert!(card.contains("[medium] penalty_risk"));
        assert!(card.contains("\"late payment\" @ 10..22"));
    }

    #[test]
    fn card_without_findings_says_so() {
        let mut r = report();
        r.findings.clear();
        r.degraded_signals.clear();
        r.entity_extraction_degraded = false;
        let card = render_card(&r);
        assert!(card.contains("No risk findings."));
        assert!(!card.contains("Degraded Signals"));
    }

    #[test]
    fn table_has_a_row_per_finding() {
        let table = render_table(&report()).unwrap();
        assert!(table.contains("penalty_risk"));
        assert!(table.contains("late payment"));
        assert!(table.contains("clause_id"));
    }

    #[test]
    fn dictionary_lists_builtin_phrases() {
        let dictionary = RiskDictionary::from_config(&AnalysisConfig::default()).unwrap();
        let text = render_dictionary(&dictionary);
        assert!(text.starts_with("Phrases ("));
        assert!(text.contains("liquidated damages"));
        assert!(text.contains("Patterns ("));
    }
}
