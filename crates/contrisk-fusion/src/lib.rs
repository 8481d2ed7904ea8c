//! Risk fusion: keyword matches, entity context, and classifier probabilities
//! combined into one ranked, deduplicated, explainable [`RiskReport`].
//!
//! [`RiskReport`]: contrisk_core::RiskReport

mod engine;

pub use engine::{FusionEngine, FusionInput, KEYWORD_COUNT_CAP};
