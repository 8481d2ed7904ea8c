use std::path::PathBuf;

use thiserror::Error;

/// Document text that cannot be turned into clauses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedInputError {
    #[error("document text is empty")]
    Empty,

    #[error("document text contains no recoverable clause")]
    NoClauses,
}

/// Invalid dictionary, weights, thresholds, or patterns. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("config file not readable: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("dictionary phrase {0:?} is empty after normalisation")]
    EmptyPhrase(String),

    #[error("dictionary phrases {first:?} and {second:?} normalise to the same key {key:?}")]
    DuplicatePhrase {
        first: String,
        second: String,
        key: String,
    },

    #[error("dictionary entry {0:?} has an empty risk category")]
    EmptyCategory(String),

    #[error("invalid {kind} pattern {pattern:?}: {source}")]
    Pattern {
        kind: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("fusion weight {name} must be finite and non-negative, got {value}")]
    Weight { name: &'static str, value: f64 },

    #[error("severity thresholds must satisfy 0 <= low_max <= medium_max, got {low_max} / {medium_max}")]
    Thresholds { low_max: f64, medium_max: f64 },

    #[error("model_timeout_ms must be greater than zero")]
    ZeroTimeout,
}

/// An external model could not be invoked or did not answer in time.
///
/// Recoverable: the pipeline continues in degraded mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelUnavailableError {
    #[error("model {model} failed: {reason}")]
    Invocation { model: String, reason: String },

    #[error("model {model} timed out after {timeout_ms} ms")]
    TimedOut { model: String, timeout_ms: u64 },
}

impl ModelUnavailableError {
    pub fn model(&self) -> &str {
        match self {
            Self::Invocation { model, .. } | Self::TimedOut { model, .. } => model,
        }
    }
}

/// The fusion engine was handed zero clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("fusion received zero clauses")]
pub struct EmptyInputError;
