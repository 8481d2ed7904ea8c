//! Keyword risk matching.
//!
//! Scans clauses against a risk dictionary of literal phrases and regex
//! patterns. Phrase matching is case-insensitive and works on Unicode word
//! boundaries: a phrase's words must appear consecutively, separated only by
//! whitespace or hyphens, so "late payment" matches "Late  payment" and
//! "late-payment" but not "late. Payment".
//!
//! Phrase and pattern hits are resolved in separate layers. Within the phrase
//! layer overlapping hits compete greedily: the longest span wins, equal
//! lengths go to the higher base severity, then the earlier start. Pattern
//! hits only compete with hits of their own category, so a broad pattern
//! absorbs the phrases of its category it covers and leaves every other
//! category's phrases in place.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::{AnalysisConfig, DictionaryEntry, PatternRule, compile_case_insensitive};
use crate::error::ConfigurationError;
use crate::types::{Clause, KeywordMatch, MatchSource, Severity, Span};

/// Lowercase a phrase and rejoin its words with single spaces.
///
/// `"Non-Disclosure  Agreement"` → `"non disclosure agreement"`.
pub fn normalize_phrase(phrase: &str) -> String {
    phrase
        .unicode_words()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
struct PhraseEntry {
    category: String,
    severity: Severity,
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    source: String,
    regex: Regex,
    category: String,
    severity: Severity,
}

/// A validated, compiled risk dictionary.
#[derive(Debug, Clone)]
pub struct RiskDictionary {
    phrases: HashMap<String, PhraseEntry>,
    max_words: usize,
    patterns: Vec<CompiledPattern>,
}

impl RiskDictionary {
    /// Compile phrases and patterns, rejecting malformed entries.
    pub fn new(
        entries: &BTreeMap<String, DictionaryEntry>,
        patterns: &[PatternRule],
    ) -> Result<Self, ConfigurationError> {
        let mut phrases: HashMap<String, PhraseEntry> = HashMap::with_capacity(entries.len());
        let mut originals: HashMap<String, &str> = HashMap::with_capacity(entries.len());
        let mut max_words = 0;

        for (phrase, entry) in entries {
            let key = normalize_phrase(phrase);
            if key.is_empty() {
                return Err(ConfigurationError::EmptyPhrase(phrase.clone()));
            }
            if entry.category.trim().is_empty() {
                return Err(ConfigurationError::EmptyCategory(phrase.clone()));
            }
            if let Some(first) = originals.insert(key.clone(), phrase) {
                return Err(ConfigurationError::DuplicatePhrase {
                    first: first.to_string(),
                    second: phrase.clone(),
                    key,
                });
            }
            max_words = max_words.max(key.split(' ').count());
            phrases.insert(
                key,
                PhraseEntry {
                    category: entry.category.trim().to_string(),
                    severity: entry.severity,
                },
            );
        }

        let patterns = patterns
            .iter()
            .map(|rule| {
                if rule.category.trim().is_empty() {
                    return Err(ConfigurationError::EmptyCategory(rule.pattern.clone()));
                }
                Ok(CompiledPattern {
                    source: rule.pattern.clone(),
                    regex: compile_case_insensitive("risk", &rule.pattern)?,
                    category: rule.category.trim().to_string(),
                    severity: rule.severity,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            phrases,
            max_words,
            patterns,
        })
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self, ConfigurationError> {
        Self::new(&config.risk_keyword_dictionary, &config.risk_patterns)
    }

    /// Number of literal phrases.
    pub fn phrase_count(&self) -> usize {
        self.phrases.len()
    }

    /// Number of regex patterns.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty() && self.patterns.is_empty()
    }

    /// Every risk category the dictionary can emit, sorted.
    pub fn categories(&self) -> BTreeSet<&str> {
        self.phrases
            .values()
            .map(|e| e.category.as_str())
            .chain(self.patterns.iter().map(|p| p.category.as_str()))
            .collect()
    }

    /// Normalised phrases of one category, sorted.
    pub fn phrases_for(&self, category: &str) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .phrases
            .iter()
            .filter(|(_, e)| e.category == category)
            .map(|(k, _)| k.as_str())
            .collect();
        out.sort_unstable();
        out
    }

    /// `(phrase, category, severity)` for every literal phrase, sorted by phrase.
    pub fn phrase_entries(&self) -> Vec<(&str, &str, Severity)> {
        let mut out: Vec<_> = self
            .phrases
            .iter()
            .map(|(k, e)| (k.as_str(), e.category.as_str(), e.severity))
            .collect();
        out.sort_unstable_by(|a, b| a.0.cmp(b.0));
        out
    }

    /// `(pattern, category, severity)` for every regex rule, in config order.
    pub fn pattern_entries(&self) -> impl Iterator<Item = (&str, &str, Severity)> {
        self.patterns
            .iter()
            .map(|p| (p.source.as_str(), p.category.as_str(), p.severity))
    }
}

/// Stateless matcher bound to one compiled dictionary.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    dictionary: RiskDictionary,
}

impl KeywordMatcher {
    pub fn new(config: &AnalysisConfig) -> Result<Self, ConfigurationError> {
        Ok(Self::with_dictionary(RiskDictionary::from_config(config)?))
    }

    pub fn with_dictionary(dictionary: RiskDictionary) -> Self {
        Self { dictionary }
    }

    pub fn dictionary(&self) -> &RiskDictionary {
        &self.dictionary
    }

    pub fn match_clauses(&self, clauses: &[Clause]) -> Vec<KeywordMatch> {
        match_keywords(clauses, &self.dictionary)
    }
}

/// Match every clause against `dictionary`.
///
/// Output is ordered by clause, then span start; ids are sequential in that
/// order. Identical input always yields identical output.
pub fn match_keywords(clauses: &[Clause], dictionary: &RiskDictionary) -> Vec<KeywordMatch> {
    let mut matches = Vec::new();
    for clause in clauses {
        for hit in match_clause(&clause.text, dictionary) {
            matches.push(KeywordMatch {
                id: matches.len(),
                clause_id: clause.id,
                span: hit.span.shifted(clause.start_offset),
                matched_term: hit.term.to_string(),
                risk_category: hit.category.to_string(),
                base_severity: hit.severity,
                source: hit.source,
            });
        }
    }
    tracing::debug!(clauses = clauses.len(), matches = matches.len(), "keyword matching done");
    matches
}

#[derive(Debug, Clone, Copy)]
struct Candidate<'d> {
    span: Span,
    term: &'d str,
    category: &'d str,
    severity: Severity,
    source: MatchSource,
}

struct Token {
    start: usize,
    end: usize,
    lower: String,
}

fn match_clause<'d>(text: &str, dictionary: &'d RiskDictionary) -> Vec<Candidate<'d>> {
    let phrases = resolve_overlaps(phrase_candidates(text, dictionary), |_, _| true);
    let patterns = resolve_overlaps(pattern_candidates(text, dictionary), |a, b| {
        a.category == b.category
    });

    let mut hits: Vec<Candidate<'d>> = phrases
        .into_iter()
        .filter(|p| {
            !patterns
                .iter()
                .any(|q| q.category == p.category && q.span.overlaps(&p.span))
        })
        .collect();
    hits.extend(patterns);
    hits.sort_by_key(|c| (c.span.start, c.span.end, c.category, c.term));
    hits
}

fn pattern_candidates<'d>(text: &str, dictionary: &'d RiskDictionary) -> Vec<Candidate<'d>> {
    let mut candidates = Vec::new();
    for pattern in &dictionary.patterns {
        for m in pattern.regex.find_iter(text) {
            if m.is_empty() {
                continue;
            }
            candidates.push(Candidate {
                span: Span::new(m.start(), m.end()),
                term: &pattern.source,
                category: &pattern.category,
                severity: pattern.severity,
                source: MatchSource::Pattern,
            });
        }
    }
    candidates
}

fn phrase_candidates<'d>(text: &str, dictionary: &'d RiskDictionary) -> Vec<Candidate<'d>> {
    if dictionary.phrases.is_empty() {
        return Vec::new();
    }

    let tokens: Vec<Token> = text
        .unicode_word_indices()
        .map(|(start, word)| Token {
            start,
            end: start + word.len(),
            lower: word.to_lowercase(),
        })
        .collect();

    let mut candidates = Vec::new();
    for i in 0..tokens.len() {
        let mut key = String::new();
        let last = (i + dictionary.max_words).min(tokens.len());
        for j in i..last {
            if j > i {
                let gap = &text[tokens[j - 1].end..tokens[j].start];
                if !gap.chars().all(|c| c.is_whitespace() || c == '-') {
                    break;
                }
                key.push(' ');
            }
            key.push_str(&tokens[j].lower);

            if let Some((term, entry)) = dictionary.phrases.get_key_value(&key) {
                candidates.push(Candidate {
                    span: Span::new(tokens[i].start, tokens[j].end),
                    term,
                    category: &entry.category,
                    severity: entry.severity,
                    source: MatchSource::Phrase,
                });
            }
        }
    }
    candidates
}

/// Greedy longest-match: accept candidates in priority order, skipping any
/// that overlap an accepted one it `competes` with. Returns accepted hits in
/// text order.
fn resolve_overlaps<'d>(
    mut candidates: Vec<Candidate<'d>>,
    competes: impl Fn(&Candidate<'d>, &Candidate<'d>) -> bool,
) -> Vec<Candidate<'d>> {
    candidates.sort_by(|a, b| {
        (Reverse(a.span.len()), Reverse(a.severity), a.span.start, a.category, a.term).cmp(&(
            Reverse(b.span.len()),
            Reverse(b.severity),
            b.span.start,
            b.category,
            b.term,
        ))
    });

    let mut accepted: Vec<Candidate<'d>> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if accepted
            .iter()
            .all(|a| !(competes(a, &candidate) && a.span.overlaps(&candidate.span)))
        {
            accepted.push(candidate);
        }
    }
    accepted.sort_by_key(|c| (c.span.start, c.span.end));
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Normalizer;

    fn dict(entries: &[(&str, &str, Severity)]) -> RiskDictionary {
        let map = entries
            .iter()
            .map(|&(p, c, s)| {
                (
                    p.to_string(),
                    DictionaryEntry {
                        category: c.to_string(),
                        severity: s,
                    },
                )
            })
            .collect();
        RiskDictionary::new(&map, &[]).unwrap()
    }

    fn clauses(raw: &str) -> Vec<Clause> {
        Normalizer::default().normalize(raw).unwrap().clauses
    }

    fn terms(matches: &[KeywordMatch]) -> Vec<&str> {
        matches.iter().map(|m| m.matched_term.as_str()).collect()
    }

    #[test]
    fn normalize_phrase_lowercases_and_splits_hyphens() {
        assert_eq!(normalize_phrase("Non-Disclosure  Agreement"), "non disclosure agreement");
        assert_eq!(normalize_phrase("  -- "), "");
    }

    #[test]
    fn longest_phrase_wins_overlap() {
        let d = dict(&[
            ("payment", "payment_risk", Severity::High),
            ("late payment penalty", "penalty_risk", Severity::Low),
        ]);
        let cs = clauses("late payment penalty applies");
        let matches = match_keywords(&cs, &d);
        assert_eq!(terms(&matches), vec!["late payment penalty"]);
        assert_eq!(matches[0].span, Span::new(0, 20));
        assert_eq!(matches[0].risk_category, "penalty_risk");
    }

    fn with_pattern(
        mut d: RiskDictionary,
        source: &str,
        category: &str,
        severity: Severity,
    ) -> RiskDictionary {
        d.patterns.push(CompiledPattern {
            source: source.into(),
            regex: compile_case_insensitive("risk", source).unwrap(),
            category: category.into(),
            severity,
        });
        d
    }

    #[test]
    fn equal_length_goes_to_higher_severity() {
        let d = dict(&[
            ("late fee", "payment_risk", Severity::Low),
            ("fee paid", "penalty_risk", Severity::High),
        ]);
        let matches = match_keywords(&clauses("A late fee paid twice."), &d);
        assert_eq!(terms(&matches), vec!["fee paid"]);
        assert_eq!(matches[0].base_severity, Severity::High);
    }

    #[test]
    fn pattern_absorbs_phrases_of_its_own_category() {
        let d = with_pattern(
            dict(&[("late fee", "payment_risk", Severity::Low)]),
            r"late\s+fee",
            "payment_risk",
            Severity::High,
        );
        let matches = match_keywords(&clauses("A late fee is charged."), &d);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].source, MatchSource::Pattern);
        assert_eq!(matches[0].base_severity, Severity::High);
    }

    #[test]
    fn pattern_leaves_other_categories_in_place() {
        let d = with_pattern(
            dict(&[("late fee", "payment_risk", Severity::Low)]),
            r"late\s+fee",
            "penalty_risk",
            Severity::High,
        );
        let matches = match_keywords(&clauses("A late fee is charged."), &d);
        let found: Vec<(&str, MatchSource)> = matches
            .iter()
            .map(|m| (m.risk_category.as_str(), m.source))
            .collect();
        assert_eq!(
            found,
            vec![
                ("payment_risk", MatchSource::Phrase),
                ("penalty_risk", MatchSource::Pattern),
            ]
        );
    }

    #[test]
    fn overlapping_patterns_of_different_categories_both_match() {
        let d = with_pattern(
            with_pattern(
                dict(&[]),
                r"\bindemnify\b.*\blosses\b",
                "indemnity_risk",
                Severity::High,
            ),
            r"\bpenalty\b.*\bdays\b",
            "penalty_risk",
            Severity::Medium,
        );
        let matches = match_keywords(
            &clauses("Tenant shall indemnify for a penalty and all losses within 30 days."),
            &d,
        );
        let categories: Vec<&str> = matches.iter().map(|m| m.risk_category.as_str()).collect();
        assert_eq!(categories, vec!["indemnity_risk", "penalty_risk"]);
    }

    #[test]
    fn builtin_patterns_keep_other_categories_in_the_clause() {
        let matcher = KeywordMatcher::new(&AnalysisConfig::default()).unwrap();
        let cs = clauses(
            "Supplier shall indemnify Customer, pay a penalty and liquidated damages, \
             keep all data confidential, and bear all losses.",
        );
        let matches = matcher.match_clauses(&cs);
        let found: Vec<(&str, &str)> = matches
            .iter()
            .map(|m| (m.risk_category.as_str(), m.matched_term.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("indemnity_risk", r"\bindemnify\b.*\ball losses\b"),
                ("penalty_risk", "penalty"),
                ("penalty_risk", "liquidated damages"),
                ("confidentiality_risk", "confidential"),
            ]
        );
        let ids: Vec<usize> = matches.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn matching_is_case_insensitive_and_word_bounded() {
        let d = dict(&[("fine", "penalty_risk", Severity::Medium)]);
        let cs = clauses("We define the finest FINE; a fine-grained fine.");
        let matches = match_keywords(&cs, &d);
        // "define" and "finest" are different words; "fine-grained" splits on the hyphen.
        assert_eq!(matches.len(), 3);
        assert!(matches.iter().all(|m| m.matched_term == "fine"));
        assert_eq!(&cs[0].text[matches[0].span.start..matches[0].span.end], "FINE");
    }

    #[test]
    fn phrases_do_not_cross_punctuation() {
        let d = dict(&[("late payment", "penalty_risk", Severity::Medium)]);
        assert!(match_keywords(&clauses("It was late. Payment followed."), &d).is_empty());
        assert_eq!(
            match_keywords(&clauses("Late\n  payment and late-payment"), &d).len(),
            2
        );
    }

    #[test]
    fn spans_are_document_offsets() {
        let d = dict(&[("penalty", "penalty_risk", Severity::Medium)]);
        let doc = Normalizer::default()
            .normalize("Intro text.\n\nA penalty applies.")
            .unwrap();
        let matches = match_keywords(&doc.clauses, &d);
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.clause_id, 1);
        assert_eq!(&doc.text[m.span.start..m.span.end], "penalty");
    }

    #[test]
    fn ids_follow_clause_then_offset_order() {
        let d = dict(&[
            ("terminate", "termination_risk", Severity::Medium),
            ("penalty", "penalty_risk", Severity::Medium),
        ]);
        let cs = clauses("penalty then terminate\n\nterminate then penalty");
        let matches = match_keywords(&cs, &d);
        let ids: Vec<usize> = matches.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(terms(&matches), vec!["penalty", "terminate", "terminate", "penalty"]);
        assert_eq!(matches[2].clause_id, 1);
    }

    #[test]
    fn matching_is_deterministic() {
        let config = AnalysisConfig::default();
        let matcher = KeywordMatcher::new(&config).unwrap();
        let cs = clauses(
            "1. The Vendor shall indemnify and hold harmless the Client against all losses.\n\
             2. Either party may terminate without cause; automatic renewal applies.\n\
             3. Confidential information remains proprietary.",
        );
        let first = matcher.match_clauses(&cs);
        let second = matcher.match_clauses(&cs);
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn builtin_patterns_flag_broad_indemnity() {
        let matcher = KeywordMatcher::new(&AnalysisConfig::default()).unwrap();
        let cs = clauses("Supplier agrees to indemnify Customer for all losses whatsoever.");
        let matches = matcher.match_clauses(&cs);
        // The pattern span covers "indemnify ... all losses" and outranks the bare phrase.
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].source, MatchSource::Pattern);
        assert_eq!(matches[0].risk_category, "indemnity_risk");
        assert_eq!(matches[0].base_severity, Severity::High);
    }

    #[test]
    fn dictionary_introspection() {
        let d = dict(&[
            ("penalty", "penalty_risk", Severity::Medium),
            ("Late Payment", "penalty_risk", Severity::Medium),
            ("venue", "jurisdiction_risk", Severity::Low),
        ]);
        assert_eq!(d.phrase_count(), 3);
        assert_eq!(d.pattern_count(), 0);
        assert_eq!(
            d.categories().into_iter().collect::<Vec<_>>(),
            vec!["jurisdiction_risk", "penalty_risk"]
        );
        assert_eq!(d.phrases_for("penalty_risk"), vec!["late payment", "penalty"]);
        assert_eq!(d.phrase_entries()[0].0, "late payment");
    }

    #[test]
    fn malformed_dictionary_is_configuration_error() {
        let mut map = BTreeMap::new();
        map.insert(
            "waiver".to_string(),
            DictionaryEntry {
                category: String::new(),
                severity: Severity::Low,
            },
        );
        assert!(matches!(
            RiskDictionary::new(&map, &[]),
            Err(ConfigurationError::EmptyCategory(_))
        ));

        let bad = PatternRule {
            pattern: "a(".into(),
            category: "x".into(),
            severity: Severity::Low,
        };
        assert!(matches!(
            RiskDictionary::new(&BTreeMap::new(), &[bad]),
            Err(ConfigurationError::Pattern { kind: "risk", .. })
        ));
    }

    #[test]
    fn empty_dictionary_matches_nothing() {
        let d = RiskDictionary::new(&BTreeMap::new(), &[]).unwrap();
        assert!(d.is_empty());
        assert!(match_keywords(&clauses("penalty"), &d).is_empty());
    }
}
