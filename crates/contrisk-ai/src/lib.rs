//! Model adapters: entity extraction and contract/risk classification.
//!
//! External models sit behind [`EntityModel`] and [`ClassifierModel`]. The
//! adapters bound every call by a timeout, translate vocabularies onto the
//! fixed label sets, and turn any failure into [`ModelUnavailableError`].
//!
//! [`ModelUnavailableError`]: contrisk_core::ModelUnavailableError

mod classifier;
mod entities;
mod features;
pub mod labels;

pub use classifier::{
    CentroidClassifier, ClassifierAdapter, ClassifierModel, LexiconClassifier, normalize_scores,
};
pub use entities::{EntityExtractor, EntityModel, PatternRecognizer, RawEntity};
pub use features::DocumentFeatures;
