//! Entity extraction adapter and the built-in pattern recognizer.
//!
//! The adapter runs an [`EntityModel`] over each clause, maps the model's
//! labels onto [`EntityLabel`], clamps confidence to `[0, 1]`, and rebases
//! clause-local offsets onto the normalised document. Spans that fall outside
//! their clause or split a UTF-8 character are dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use contrisk_core::{Clause, EntityLabel, EntitySpan, ModelUnavailableError};
use regex::Regex;

use crate::labels::normalize_entity_label;

/// A span reported by an external NER model, in the model's own vocabulary.
///
/// Offsets are byte offsets into the text passed to [`EntityModel::extract`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntity {
    pub start: usize,
    pub end: usize,
    pub label: String,
    pub score: f64,
}

impl RawEntity {
    pub fn new(start: usize, end: usize, label: impl Into<String>, score: f64) -> Self {
        Self {
            start,
            end,
            label: label.into(),
            score,
        }
    }
}

/// Capability interface for named-entity recognition models.
#[async_trait]
pub trait EntityModel: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, text: &str) -> anyhow::Result<Vec<RawEntity>>;
}

/// Wraps an [`EntityModel`] with a timeout and label translation.
#[derive(Clone)]
pub struct EntityExtractor {
    model: Arc<dyn EntityModel>,
    timeout: Duration,
}

impl EntityExtractor {
    pub fn new(model: Arc<dyn EntityModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Extract entities from every clause.
    ///
    /// The whole run, across all clauses, shares one deadline.
    pub async fn extract(
        &self,
        clauses: &[Clause],
    ) -> Result<Vec<EntitySpan>, ModelUnavailableError> {
        let started = Instant::now();
        let spans = tokio::time::timeout(self.timeout, self.extract_all(clauses))
            .await
            .map_err(|_| ModelUnavailableError::TimedOut {
                model: self.model.name().to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            })??;

        tracing::info!(
            model = self.model.name(),
            entities = spans.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "entity extraction complete"
        );
        Ok(spans)
    }

    async fn extract_all(
        &self,
        clauses: &[Clause],
    ) -> Result<Vec<EntitySpan>, ModelUnavailableError> {
        let mut spans = Vec::new();
        for clause in clauses {
            let raw = self.model.extract(&clause.text).await.map_err(|e| {
                ModelUnavailableError::Invocation {
                    model: self.model.name().to_string(),
                    reason: format!("{e:#}"),
                }
            })?;
            let mut translated = translate(clause, raw);
            translated.sort_by_key(|s| (s.start, s.end, s.label));
            spans.extend(translated);
        }
        for (id, span) in spans.iter_mut().enumerate() {
            span.id = id;
        }
        Ok(spans)
    }
}

fn translate(clause: &Clause, raw: Vec<RawEntity>) -> Vec<EntitySpan> {
    raw.into_iter()
        .filter_map(|entity| {
            let in_bounds = entity.start < entity.end
                && entity.end <= clause.text.len()
                && clause.text.is_char_boundary(entity.start)
                && clause.text.is_char_boundary(entity.end);
            if !in_bounds {
                tracing::debug!(
                    clause_id = clause.id,
                    start = entity.start,
                    end = entity.end,
                    label = %entity.label,
                    "discarding out-of-range entity span"
                );
                return None;
            }
            Some(EntitySpan {
                id: 0,
                clause_id: clause.id,
                start: clause.start_offset + entity.start,
                end: clause.start_offset + entity.end,
                label: normalize_entity_label(&entity.label),
                confidence: clamp_confidence(entity.score),
            })
        })
        .collect()
}

fn clamp_confidence(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

// ── Built-in recognizer ──

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december";

/// Regex-based recognizer emitting spaCy-style labels.
///
/// Rules are tried in priority order; a later rule never claims text already
/// covered by an earlier one.
pub struct PatternRecognizer {
    rules: Vec<(Regex, &'static str, f64)>,
}

impl PatternRecognizer {
    pub fn new() -> Result<Self, regex::Error> {
        let money = Regex::new(
            r"(?i)(?:[$€£]\s?\d[\d,]*(?:\.\d+)?|\b\d[\d,]*(?:\.\d+)?\s?(?:usd|eur|gbp|dollars|euros|pounds)\b)",
        )?;
        let date = Regex::new(&format!(
            r"(?i)\b(?:\d{{4}}-\d{{2}}-\d{{2}}|\d{{1,2}}[/.-]\d{{1,2}}[/.-]\d{{2,4}}|(?:{MONTHS})\s+\d{{1,2}},?\s+\d{{4}}|\d{{1,2}}\s+(?:{MONTHS})\s+\d{{4}})\b"
        ))?;
        let duration = Regex::new(
            r"(?i)\b(?:\d+|one|two|three|four|five|six|seven|eight|nine|ten|twelve|thirty|sixty|ninety)\s*(?:\(\d+\)\s*)?(?:business\s+|calendar\s+)?(?:days?|weeks?|months?|years?)\b",
        )?;
        let org = Regex::new(
            r"\b[A-Z][A-Za-z&]*(?:\s+[A-Z][A-Za-z&]*)*,?\s+(?:Inc|LLC|Ltd|Limited|Corp|Corporation|GmbH|LLP|PLC)\b\.?",
        )?;
        let person = Regex::new(
            r"\b(?:Employee|Employer|Vendor|Supplier|Customer|Client|Landlord|Tenant|Licensor|Licensee|Contractor|Consultant|Partner|Disclosing Party|Receiving Party)s?\b",
        )?;
        let obligation = Regex::new(
            r"(?i)\b(?:shall(?:\s+not)?|must(?:\s+not)?|agrees?\s+to|is\s+required\s+to|undertakes?\s+to)\b",
        )?;

        Ok(Self {
            rules: vec![
                (money, "MONEY", 0.9),
                (date, "DATE", 0.85),
                (duration, "DURATION", 0.8),
                (org, "ORG", 0.75),
                (person, "PERSON", 0.7),
                (obligation, "OBLIGATION", 0.6),
            ],
        })
    }

    /// Synchronous core of [`EntityModel::extract`].
    pub fn recognize(&self, text: &str) -> Vec<RawEntity> {
        let mut found: Vec<RawEntity> = Vec::new();
        for (regex, label, score) in &self.rules {
            for m in regex.find_iter(text) {
                if m.is_empty() {
                    continue;
                }
                let overlaps = found.iter().any(|e| m.start() < e.end && e.start < m.end());
                if !overlaps {
                    found.push(RawEntity::new(m.start(), m.end(), *label, *score));
                }
            }
        }
        found.sort_by_key(|e| (e.start, e.end));
        found
    }
}

#[async_trait]
impl EntityModel for PatternRecognizer {
    fn name(&self) -> &str {
        "pattern-recognizer"
    }

    async fn extract(&self, text: &str) -> anyhow::Result<Vec<RawEntity>> {
        Ok(self.recognize(text))
    }
}
