//! Document-level features handed to classifiers.

use std::collections::BTreeMap;

use contrisk_core::{NormalizedDocument, normalize_phrase};
use unicode_segmentation::UnicodeSegmentation;

/// Feature representation of one normalised document.
///
/// `embedding` is never computed here; callers with an embedding model attach
/// one with [`DocumentFeatures::with_embedding`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFeatures {
    pub text: String,
    pub clause_texts: Vec<String>,
    /// Lowercased Unicode words, in document order.
    pub tokens: Vec<String>,
    pub term_counts: BTreeMap<String, usize>,
    pub embedding: Option<Vec<f32>>,
}

impl DocumentFeatures {
    pub fn from_document(doc: &NormalizedDocument) -> Self {
        let tokens: Vec<String> = doc.text.unicode_words().map(str::to_lowercase).collect();
        let mut term_counts = BTreeMap::new();
        for token in &tokens {
            *term_counts.entry(token.clone()).or_insert(0) += 1;
        }
        Self {
            text: doc.text.clone(),
            clause_texts: doc.clauses.iter().map(|c| c.text.clone()).collect(),
            tokens,
            term_counts,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Occurrences of a (possibly multi-word) phrase as consecutive tokens.
    pub fn phrase_frequency(&self, phrase: &str) -> usize {
        let normalized = normalize_phrase(phrase);
        let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
        match words.len() {
            0 => 0,
            1 => self.term_counts.get(words[0]).copied().unwrap_or(0),
            n => self
                .tokens
                .windows(n)
                .filter(|window| window.iter().zip(&words).all(|(t, w)| t == w))
                .count(),
        }
    }
}
