pub mod config;
pub mod error;
pub mod keywords;
pub mod normalize;
pub mod schema;
pub mod types;

pub use config::{AnalysisConfig, DictionaryEntry, FusionWeights, PatternRule, SeverityThresholds};
pub use error::{ConfigurationError, EmptyInputError, MalformedInputError, ModelUnavailableError};
pub use keywords::{KeywordMatcher, RiskDictionary, match_keywords, normalize_phrase};
pub use normalize::{Normalizer, normalize};
pub use types::*;
