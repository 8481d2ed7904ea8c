//! Analysis configuration.
//!
//! Loaded once per process (usually from TOML) and handed to each component
//! at construction. Components validate it and keep their own compiled copy.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::keywords::RiskDictionary;
use crate::types::{EntityLabel, Severity};

/// Risk category and base severity for one dictionary phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub category: String,
    pub severity: Severity,
}

/// A case-insensitive regex that flags a clause with a risk category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub pattern: String,
    pub category: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub w_kw: f64,
    pub w_ent: f64,
    pub w_cls: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            w_kw: 0.5,
            w_ent: 0.2,
            w_cls: 0.3,
        }
    }
}

/// Raw score below `low_max` is low, below `medium_max` medium, else high.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    pub low_max: f64,
    pub medium_max: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            low_max: 0.3,
            medium_max: 0.7,
        }
    }
}

impl SeverityThresholds {
    pub fn severity_for(&self, raw_score: f64) -> Severity {
        if raw_score < self.low_max {
            Severity::Low
        } else if raw_score < self.medium_max {
            Severity::Medium
        } else {
            Severity::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Phrase → (category, base severity). Phrases are matched case-insensitively
    /// on word boundaries.
    pub risk_keyword_dictionary: BTreeMap<String, DictionaryEntry>,
    pub risk_patterns: Vec<PatternRule>,
    pub fusion_weights: FusionWeights,
    pub severity_thresholds: SeverityThresholds,
    /// Upper bound for each external model call.
    pub model_timeout_ms: u64,
    /// Line-anchored regexes that start a new clause.
    pub section_patterns: Vec<String>,
    /// Entity labels that corroborate a category. Categories not listed are
    /// corroborated by any label except `OTHER`.
    pub corroborating_entities: BTreeMap<String, Vec<EntityLabel>>,
    /// Raise each finding to at least its strongest keyword's base severity.
    pub base_severity_floor: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            risk_keyword_dictionary: builtin_dictionary(),
            risk_patterns: builtin_patterns(),
            fusion_weights: FusionWeights::default(),
            severity_thresholds: SeverityThresholds::default(),
            model_timeout_ms: 5_000,
            section_patterns: default_section_patterns(),
            corroborating_entities: builtin_corroboration(),
            base_severity_floor: false,
        }
    }
}

impl AnalysisConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigurationError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(
            path = %path.display(),
            phrases = config.risk_keyword_dictionary.len(),
            patterns = config.risk_patterns.len(),
            "loaded analysis config"
        );
        Ok(config)
    }

    /// Check every option. Called by each component constructor.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        RiskDictionary::new(&self.risk_keyword_dictionary, &self.risk_patterns)?;

        for pattern in &self.section_patterns {
            compile_case_insensitive("section", pattern)?;
        }

        let w = &self.fusion_weights;
        for (name, value) in [("w_kw", w.w_kw), ("w_ent", w.w_ent), ("w_cls", w.w_cls)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigurationError::Weight { name, value });
            }
        }

        let t = &self.severity_thresholds;
        if !(t.low_max.is_finite() && t.medium_max.is_finite())
            || t.low_max < 0.0
            || t.low_max > t.medium_max
        {
            return Err(ConfigurationError::Thresholds {
                low_max: t.low_max,
                medium_max: t.medium_max,
            });
        }

        if self.model_timeout_ms == 0 {
            return Err(ConfigurationError::ZeroTimeout);
        }

        Ok(())
    }
}

pub(crate) fn compile_case_insensitive(
    kind: &'static str,
    pattern: &str,
) -> Result<Regex, ConfigurationError> {
    Regex::new(&format!("(?i){pattern}")).map_err(|source| ConfigurationError::Pattern {
        kind,
        pattern: pattern.to_string(),
        source,
    })
}

// ── Built-in defaults ──

/// Numbered (`1.`, `1.1.`, `2.3`), lettered `(a)`, `SECTION n`, `ARTICLE n|IV`.
pub fn default_section_patterns() -> Vec<String> {
    vec![
        r"^\s*\d+(\.\d+)*\.(\s|$)".to_string(),
        r"^\s*\d+(\.\d+)+(\s|$)".to_string(),
        r"^\s*\([a-z]\)\s".to_string(),
        r"^\s*SECTION\s+\d+".to_string(),
        r"^\s*ARTICLE\s+([IVXLC]+|\d+)\b".to_string(),
    ]
}

pub fn builtin_dictionary() -> BTreeMap<String, DictionaryEntry> {
    const ENTRIES: &[(&str, &str, Severity)] = &[
        ("penalty", "penalty_risk", Severity::Medium),
        ("liquidated damages", "penalty_risk", Severity::High),
        ("fine", "penalty_risk", Severity::Medium),
        ("forfeit", "penalty_risk", Severity::Medium),
        ("late payment", "penalty_risk", Severity::Medium),
        ("indemnify", "indemnity_risk", Severity::High),
        ("hold harmless", "indemnity_risk", Severity::High),
        ("defend", "indemnity_risk", Severity::Medium),
        ("terminate", "termination_risk", Severity::Medium),
        ("cancel", "termination_risk", Severity::Medium),
        ("expire", "termination_risk", Severity::Low),
        ("automatic renewal", "termination_risk", Severity::High),
        ("without cause", "termination_risk", Severity::High),
        ("unilateral termination", "termination_risk", Severity::High),
        ("jurisdiction", "jurisdiction_risk", Severity::Medium),
        ("exclusive jurisdiction", "jurisdiction_risk", Severity::High),
        ("venue", "jurisdiction_risk", Severity::Low),
        ("governing law", "jurisdiction_risk", Severity::Low),
        ("intellectual property", "ip_risk", Severity::Medium),
        ("copyright", "ip_risk", Severity::Medium),
        ("patent", "ip_risk", Severity::Medium),
        ("trade secret", "ip_risk", Severity::Medium),
        ("perpetual license", "ip_risk", Severity::High),
        ("confidential", "confidentiality_risk", Severity::Medium),
        ("non-disclosure", "confidentiality_risk", Severity::Medium),
        ("proprietary", "confidentiality_risk", Severity::Low),
    ];

    ENTRIES
        .iter()
        .map(|&(phrase, category, severity)| {
            (
                phrase.to_string(),
                DictionaryEntry {
                    category: category.to_string(),
                    severity,
                },
            )
        })
        .collect()
}

pub fn builtin_patterns() -> Vec<PatternRule> {
    const RULES: &[(&str, &str, Severity)] = &[
        (r"\bindemnify\b.*\ball losses\b", "indemnity_risk", Severity::High),
        (r"\birrevocable\b.*\bright", "ip_risk", Severity::High),
        (r"\bliquidated damages\b.*\bexcessive\b", "penalty_risk", Severity::High),
        (r"\bconfidentiality\b.*\bindefinite", "confidentiality_risk", Severity::Medium),
        (r"\bnon-compete\b.*\b2 years\b", "restrictive_covenant_risk", Severity::Medium),
        (r"\barbitration\b.*\bcompany\b.*\bvenue\b", "jurisdiction_risk", Severity::Medium),
        (r"\bforce majeure\b.*\bbroad", "force_majeure_risk", Severity::Medium),
    ];

    RULES
        .iter()
        .map(|&(pattern, category, severity)| PatternRule {
            pattern: pattern.to_string(),
            category: category.to_string(),
            severity,
        })
        .collect()
}

pub fn builtin_corroboration() -> BTreeMap<String, Vec<EntityLabel>> {
    use EntityLabel::*;
    [
        ("penalty_risk", vec![Money, Date, Obligation]),
        ("indemnity_risk", vec![Party, Obligation, Money]),
        ("termination_risk", vec![Date, Duration, Party]),
        ("jurisdiction_risk", vec![Party, Other]),
        ("ip_risk", vec![Party, Duration]),
        ("confidentiality_risk", vec![Party, Duration, Obligation]),
    ]
    .into_iter()
    .map(|(category, labels)| (category.to_string(), labels))
    .collect()
}
