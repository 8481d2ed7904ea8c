//! The per-document analysis pipeline.
//!
//! ```text
//! raw text ─ normalize ─┬─ entity extraction ─┐
//!                       ├─ keyword matching  ─┼─ fusion ─ report ─▶ audit sink
//!                       └─ classification    ─┘
//! ```
//!
//! Normalisation failures are fatal. Model failures and timeouts degrade the
//! run and are flagged on the report.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use contrisk_ai::{
    ClassifierAdapter, ClassifierModel, DocumentFeatures, EntityExtractor, EntityModel,
    LexiconClassifier, PatternRecognizer,
};
use contrisk_core::{
    AnalysisConfig, ConfigurationError, EmptyInputError, KeywordMatcher, MalformedInputError,
    Normalizer, RiskReport,
};
use contrisk_fusion::{FusionEngine, FusionInput};
use thiserror::Error;

use crate::audit::{AuditEvent, AuditSink};

/// Pipeline stage at which a fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    Fusion,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normalize => "normalize",
            Self::Fusion => "fusion",
        })
    }
}

/// A fatal error for one document.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("document {document_id}: {stage} failed: {source}")]
    MalformedInput {
        document_id: String,
        stage: Stage,
        #[source]
        source: MalformedInputError,
    },

    #[error("document {document_id}: {stage} failed: {source}")]
    EmptyInput {
        document_id: String,
        stage: Stage,
        #[source]
        source: EmptyInputError,
    },

    #[error("document {document_id}: analysis cancelled")]
    Cancelled { document_id: String },
}

impl AnalysisError {
    pub fn document_id(&self) -> &str {
        match self {
            Self::MalformedInput { document_id, .. }
            | Self::EmptyInput { document_id, .. }
            | Self::Cancelled { document_id } => document_id,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::MalformedInput { stage, .. } | Self::EmptyInput { stage, .. } => Some(*stage),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Runs the full pipeline for one document at a time.
///
/// Holds compiled copies of every component; safe to share across tasks.
pub struct Analyzer {
    normalizer: Normalizer,
    matcher: KeywordMatcher,
    entities: EntityExtractor,
    classifier: ClassifierAdapter,
    fusion: FusionEngine,
    clock: AtomicU64,
    audit: Option<AuditSink>,
}

impl Analyzer {
    /// Validate `config` and compile every component against it.
    pub fn new(
        config: &AnalysisConfig,
        entity_model: Arc<dyn EntityModel>,
        contract_type_model: Arc<dyn ClassifierModel>,
        risk_level_model: Arc<dyn ClassifierModel>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let timeout = Duration::from_millis(config.model_timeout_ms);
        Ok(Self {
            normalizer: Normalizer::new(config)?,
            matcher: KeywordMatcher::new(config)?,
            entities: EntityExtractor::new(entity_model, timeout),
            classifier: ClassifierAdapter::new(contract_type_model, risk_level_model, timeout),
            fusion: FusionEngine::new(config)?,
            clock: AtomicU64::new(0),
            audit: None,
        })
    }

    /// Use the built-in pattern recognizer and lexicon classifiers.
    pub fn with_builtin_models(config: &AnalysisConfig) -> Result<Self, ConfigurationError> {
        let recognizer =
            PatternRecognizer::new().map_err(|source| ConfigurationError::Pattern {
                kind: "entity",
                pattern: "built-in recognizer".to_string(),
                source,
            })?;
        let matcher = KeywordMatcher::new(config)?;
        let risk_level = LexiconClassifier::risk_categories(matcher.dictionary());
        Self::new(
            config,
            Arc::new(recognizer),
            Arc::new(LexiconClassifier::contract_types()),
            Arc::new(risk_level),
        )
    }

    /// Send an [`AuditEvent`] for every completed report.
    pub fn with_audit_sink(mut self, sink: AuditSink) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Analyse one document and publish its audit event.
    pub async fn analyze(
        &self,
        document_id: &str,
        raw_text: &str,
    ) -> Result<RiskReport, AnalysisError> {
        let report = self.run(document_id, raw_text).await?;
        self.publish(&report);
        Ok(report)
    }

    /// Like [`analyze`](Self::analyze), abandoned as soon as `cancel`
    /// completes. A cancelled run publishes nothing.
    pub async fn analyze_until<F>(
        &self,
        document_id: &str,
        raw_text: &str,
        cancel: F,
    ) -> Result<RiskReport, AnalysisError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                tracing::warn!(document_id, "analysis cancelled");
                Err(AnalysisError::Cancelled {
                    document_id: document_id.to_string(),
                })
            }
            result = self.run(document_id, raw_text) => {
                let report = result?;
                self.publish(&report);
                Ok(report)
            }
        }
    }

    async fn run(&self, document_id: &str, raw_text: &str) -> Result<RiskReport, AnalysisError> {
        let started = Instant::now();

        let doc = self
            .normalizer
            .normalize(raw_text)
            .map_err(|source| AnalysisError::MalformedInput {
                document_id: document_id.to_string(),
                stage: Stage::Normalize,
                source,
            })?;
        let features = DocumentFeatures::from_document(&doc);

        let (entities, matches, classification) = tokio::join!(
            self.entities.extract(&doc.clauses),
            async { self.matcher.match_clauses(&doc.clauses) },
            self.classifier.classify(&features),
        );

        if let Err(err) = &entities {
            tracing::warn!(
                document_id,
                model = err.model(),
                error = %err,
                "entity extraction degraded"
            );
        }
        if let Err(err) = &classification {
            tracing::warn!(
                document_id,
                model = err.model(),
                error = %err,
                "classification degraded"
            );
        }

        let generated_at = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        let report = self
            .fusion
            .fuse(FusionInput {
                document_id,
                clauses: &doc.clauses,
                keyword_matches: &matches,
                entities: entities.as_deref(),
                classification: classification.as_ref(),
                generated_at,
            })
            .map_err(|source| AnalysisError::EmptyInput {
                document_id: document_id.to_string(),
                stage: Stage::Fusion,
                source,
            })?;

        tracing::info!(
            document_id,
            clause_count = doc.clauses.len(),
            keyword_matches = matches.len(),
            findings = report.findings.len(),
            overall = %report.overall_risk_level,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis complete"
        );
        Ok(report)
    }

    fn publish(&self, report: &RiskReport) {
        if let Some(sink) = &self.audit {
            sink.submit(AuditEvent::from_report(report));
        }
    }
}
