//! The fusion algorithm.
//!
//! 1. Group keyword matches and entity spans by clause.
//! 2. For each `(clause, category)` with at least one keyword match:
//!    `raw = w_kw * min(matches, 3) + w_ent * [corroborating entity in clause]
//!    + w_cls * P(category)`.
//! 3. Severity from the configured thresholds; `confidence = min(raw, 1)`.
//! 4. One finding per `(clause, category)`; all its evidence is merged.
//! 5. Sort by severity desc, confidence desc, clause id asc, category asc.
//! 6. Overall risk is the top finding's severity, or low.
//!
//! Every ordering decision is made on values, never on input order, so any
//! permutation of the input collections yields the same report.

use std::collections::{BTreeMap, BTreeSet};

use contrisk_core::{
    AnalysisConfig, ClassifierOutput, Clause, ConfigurationError, ContractType, DegradedSignal,
    EmptyInputError, EntityLabel, EntitySpan, Evidence, FusionWeights, KeywordMatch,
    ModelUnavailableError, RiskFinding, RiskReport, ScoreBreakdown, Severity, SeverityThresholds,
    SignalSource,
};

/// Keyword matches beyond this many per finding add evidence but no score.
pub const KEYWORD_COUNT_CAP: usize = 3;

/// Everything one fusion run consumes.
///
/// A degraded signal is passed as the error its adapter returned.
#[derive(Debug, Clone, Copy)]
pub struct FusionInput<'a> {
    pub document_id: &'a str,
    pub clauses: &'a [Clause],
    pub keyword_matches: &'a [KeywordMatch],
    pub entities: Result<&'a [EntitySpan], &'a ModelUnavailableError>,
    pub classification: Result<&'a ClassifierOutput, &'a ModelUnavailableError>,
    /// Logical timestamp supplied by the caller.
    pub generated_at: u64,
}

/// Stateless apart from its compiled configuration; [`fuse`](Self::fuse) is pure.
#[derive(Debug, Clone)]
pub struct FusionEngine {
    weights: FusionWeights,
    thresholds: SeverityThresholds,
    corroboration: BTreeMap<String, BTreeSet<EntityLabel>>,
    base_severity_floor: bool,
}

impl FusionEngine {
    pub fn new(config: &AnalysisConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            weights: config.fusion_weights,
            thresholds: config.severity_thresholds,
            corroboration: config
                .corroborating_entities
                .iter()
                .map(|(category, labels)| (category.clone(), labels.iter().copied().collect()))
                .collect(),
            base_severity_floor: config.base_severity_floor,
        })
    }

    /// Whether an entity with `label` corroborates a finding in `category`.
    pub fn corroborates(&self, category: &str, label: EntityLabel) -> bool {
        match self.corroboration.get(category) {
            Some(labels) => labels.contains(&label),
            None => label != EntityLabel::Other,
        }
    }

    /// Fuse one document's signals into a report.
    pub fn fuse(&self, input: FusionInput<'_>) -> Result<RiskReport, EmptyInputError> {
        if input.clauses.is_empty() {
            return Err(EmptyInputError);
        }

        let known_clauses: BTreeSet<usize> = input.clauses.iter().map(|c| c.id).collect();
        let entities: &[EntitySpan] = input.entities.unwrap_or(&[]);
        let classification = input.classification.ok();

        // ── Group ──

        let mut groups: BTreeMap<(usize, &str), Vec<&KeywordMatch>> = BTreeMap::new();
        for m in input.keyword_matches {
            if !known_clauses.contains(&m.clause_id) {
                tracing::debug!(
                    clause_id = m.clause_id,
                    term = %m.matched_term,
                    "match for unknown clause"
                );
                continue;
            }
            groups
                .entry((m.clause_id, m.risk_category.as_str()))
                .or_default()
                .push(m);
        }

        let mut entities_by_clause: BTreeMap<usize, Vec<&EntitySpan>> = BTreeMap::new();
        for e in entities {
            entities_by_clause.entry(e.clause_id).or_default().push(e);
        }

        // ── Score ──

        let mut findings: Vec<RiskFinding> = groups
            .into_iter()
            .map(|((clause_id, category), matches)| {
                let clause_entities = entities_by_clause
                    .get(&clause_id)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                self.score(clause_id, category, matches, clause_entities, classification)
            })
            .collect();

        // ── Rank ──

        findings.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
                .then_with(|| a.clause_id.cmp(&b.clause_id))
                .then_with(|| a.category.cmp(&b.category))
        });

        let overall_risk_level = findings
            .first()
            .map(|f| f.severity)
            .unwrap_or(Severity::Low);

        let contract_type = classification
            .and_then(top_contract_type)
            .unwrap_or_else(ContractType::unknown);

        let mut degraded_signals = Vec::new();
        if let Err(err) = input.entities {
            degraded_signals.push(DegradedSignal {
                source: SignalSource::EntityExtraction,
                reason: err.to_string(),
            });
        }
        if let Err(err) = input.classification {
            degraded_signals.push(DegradedSignal {
                source: SignalSource::Classification,
                reason: err.to_string(),
            });
        }

        let mut entities = entities.to_vec();
        entities.sort_by_key(|e| (e.start, e.end, e.id));

        tracing::info!(
            document_id = input.document_id,
            clause_count = input.clauses.len(),
            findings = findings.len(),
            overall = %overall_risk_level,
            degraded = degraded_signals.len(),
            "fusion complete"
        );

        Ok(RiskReport {
            document_id: input.document_id.to_string(),
            contract_type,
            overall_risk_level,
            findings,
            generated_at: input.generated_at,
            clause_count: input.clauses.len(),
            entities,
            entity_extraction_degraded: input.entities.is_err(),
            classification_degraded: input.classification.is_err(),
            degraded_signals,
        })
    }

    fn score(
        &self,
        clause_id: usize,
        category: &str,
        mut matches: Vec<&KeywordMatch>,
        clause_entities: &[&EntitySpan],
        classification: Option<&ClassifierOutput>,
    ) -> RiskFinding {
        matches.sort_by_key(|m| (m.span.start, m.span.end, m.id));

        let mut corroborating: Vec<&EntitySpan> = clause_entities
            .iter()
            .copied()
            .filter(|e| self.corroborates(category, e.label))
            .collect();
        corroborating.sort_by_key(|e| (e.start, e.end, e.id));

        let probability = classification
            .map(|c| category_probability(c, category))
            .unwrap_or(0.0);

        let breakdown = ScoreBreakdown {
            keyword: self.weights.w_kw * matches.len().min(KEYWORD_COUNT_CAP) as f64,
            entity: if corroborating.is_empty() {
                0.0
            } else {
                self.weights.w_ent
            },
            classifier: self.weights.w_cls * probability,
        };
        let raw = breakdown.raw();

        let mut severity = self.thresholds.severity_for(raw);
        if self.base_severity_floor
            && let Some(floor) = matches.iter().map(|m| m.base_severity).max()
        {
            severity = severity.max(floor);
        }

        let mut evidence: Vec<Evidence> = matches
            .iter()
            .map(|m| Evidence::Keyword {
                id: m.id,
                start: m.span.start,
                end: m.span.end,
                term: m.matched_term.clone(),
            })
            .collect();
        evidence.extend(corroborating.iter().map(|e| Evidence::Entity {
            id: e.id,
            start: e.start,
            end: e.end,
            label: e.label,
            confidence: e.confidence,
        }));
        if probability > 0.0 {
            evidence.push(Evidence::Classifier {
                label: category.to_string(),
                probability,
            });
        }

        RiskFinding {
            category: category.to_string(),
            severity,
            confidence: raw.clamp(0.0, 1.0),
            evidence,
            clause_id,
            breakdown,
        }
    }
}

/// Highest `risk_level` probability carrying `category` as its label.
fn category_probability(output: &ClassifierOutput, category: &str) -> f64 {
    output
        .risk_level
        .iter()
        .filter(|s| s.label == category && s.probability.is_finite())
        .map(|s| s.probability.clamp(0.0, 1.0))
        .fold(0.0, f64::max)
}

fn top_contract_type(output: &ClassifierOutput) -> Option<ContractType> {
    output
        .contract_type
        .iter()
        .filter(|s| s.probability.is_finite())
        .min_by(|a, b| {
            b.probability
                .total_cmp(&a.probability)
                .then_with(|| a.label.cmp(&b.label))
        })
        .map(|s| ContractType {
            label: s.label.clone(),
            probability: s.probability,
        })
}
