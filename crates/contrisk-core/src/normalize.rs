//! Text normalisation: raw extracted contract text → ordered clauses.
//!
//! # Algorithm
//!
//! 1. Unify line endings; page breaks and Unicode line separators become `\n`.
//! 2. Strip non-printable characters (controls, zero-width marks, BOM); tabs
//!    and no-break spaces become plain spaces.
//! 3. Walk lines. A blank line closes the current clause; a line matching any
//!    section-header pattern starts a new one.
//! 4. If that leaves a single block, fall back to sentences: group them three
//!    to a clause, closing a group early after a sentence or line that ends
//!    in `:` or `;`.
//! 5. Collapse each clause's internal whitespace to single spaces.
//! 6. Join clauses with `\n`. The separator belongs to the clause before it,
//!    so clause spans are contiguous and cover the whole normalised text.

use regex::RegexSet;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::{AnalysisConfig, default_section_patterns};
use crate::error::{ConfigurationError, MalformedInputError};
use crate::types::{Clause, NormalizedDocument};

const SENTENCES_PER_CLAUSE: usize = 3;

/// Splits raw text into clauses using a compiled set of header patterns.
#[derive(Debug, Clone)]
pub struct Normalizer {
    headers: RegexSet,
}

impl Default for Normalizer {
    fn default() -> Self {
        match Self::with_patterns(&default_section_patterns()) {
            Ok(normalizer) => normalizer,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "default section patterns rejected, splitting on blank lines only"
                );
                Self {
                    headers: RegexSet::empty(),
                }
            }
        }
    }
}

impl Normalizer {
    pub fn new(config: &AnalysisConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Self::with_patterns(&config.section_patterns)
    }

    /// Build from explicit header regexes (matched case-insensitively per line).
    pub fn with_patterns(patterns: &[String]) -> Result<Self, ConfigurationError> {
        for pattern in patterns {
            crate::config::compile_case_insensitive("section", pattern)?;
        }
        let headers = RegexSet::new(patterns.iter().map(|p| format!("(?i){p}"))).map_err(
            |source| ConfigurationError::Pattern {
                kind: "section",
                pattern: patterns.join(" | "),
                source,
            },
        )?;
        Ok(Self { headers })
    }

    /// Normalise `raw_text` and partition it into clauses.
    pub fn normalize(&self, raw_text: &str) -> Result<NormalizedDocument, MalformedInputError> {
        if raw_text.trim().is_empty() {
            return Err(MalformedInputError::Empty);
        }

        let cleaned = clean(raw_text);
        let segments = self.segment(&cleaned);
        if segments.is_empty() {
            return Err(MalformedInputError::NoClauses);
        }

        let mut text = String::with_capacity(cleaned.len());
        let mut clauses = Vec::with_capacity(segments.len());
        let last = segments.len() - 1;
        for (id, segment) in segments.iter().enumerate() {
            let start_offset = text.len();
            text.push_str(segment);
            if id < last {
                text.push('\n');
            }
            let end_offset = text.len();
            clauses.push(Clause {
                id,
                start_offset,
                end_offset,
                text: text[start_offset..end_offset].to_string(),
            });
        }

        tracing::debug!(clauses = clauses.len(), bytes = text.len(), "normalised document");
        Ok(NormalizedDocument { text, clauses })
    }

    fn segment(&self, cleaned: &str) -> Vec<String> {
        let mut blocks: Vec<Vec<&str>> = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for line in cleaned.split('\n') {
            if line.trim().is_empty() {
                close(&mut current, &mut blocks);
                continue;
            }
            if self.headers.is_match(line) {
                close(&mut current, &mut blocks);
            }
            current.push(line);
        }
        close(&mut current, &mut blocks);

        if let [block] = blocks.as_slice() {
            return sentence_groups(block);
        }
        blocks
            .iter()
            .map(|block| collapse(block))
            .filter(|text| !text.is_empty())
            .collect()
    }
}

/// Normalise with the default section-header patterns and return the clauses.
pub fn normalize(raw_text: &str) -> Result<Vec<Clause>, MalformedInputError> {
    Normalizer::default()
        .normalize(raw_text)
        .map(|doc| doc.clauses)
}

fn clean(raw: &str) -> String {
    raw.chars()
        .scan(false, |after_cr, c| {
            // "\r\n" collapses to a single newline.
            let out = match c {
                '\n' if *after_cr => None,
                '\r' | '\n' | '\u{0b}' | '\u{0c}' | '\u{2028}' | '\u{2029}' | '\u{85}' => {
                    Some('\n')
                }
                '\t' | '\u{a0}' | '\u{2007}' | '\u{202f}' => Some(' '),
                '\u{200b}'..='\u{200f}' | '\u{2060}' | '\u{feff}' | '\u{ad}' => None,
                c if c.is_control() => None,
                c => Some(c),
            };
            *after_cr = c == '\r';
            Some(out)
        })
        .flatten()
        .collect()
}

fn close<'a>(current: &mut Vec<&'a str>, blocks: &mut Vec<Vec<&'a str>>) {
    if !current.is_empty() {
        blocks.push(std::mem::take(current));
    }
}

fn collapse(lines: &[&str]) -> String {
    lines
        .iter()
        .flat_map(|line| line.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split an unstructured block into clauses of up to three sentences.
fn sentence_groups(lines: &[&str]) -> Vec<String> {
    let mut groups = Vec::new();
    let mut group: Vec<String> = Vec::new();

    for chunk in lines.split_inclusive(|line| line.trim_end().ends_with([':', ';'])) {
        let text = collapse(chunk);
        for sentence in text.split_sentence_bounds().map(str::trim) {
            if sentence.is_empty() {
                continue;
            }
            group.push(sentence.to_string());
            if group.len() >= SENTENCES_PER_CLAUSE || sentence.ends_with([':', ';']) {
                groups.push(group.join(" "));
                group.clear();
            }
        }
    }
    if !group.is_empty() {
        groups.push(group.join(" "));
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Spans are contiguous, non-overlapping, and cover the normalised text.
    fn assert_partition(doc: &NormalizedDocument) {
        let mut expected_start = 0;
        for (i, clause) in doc.clauses.iter().enumerate() {
            assert_eq!(clause.id, i);
            assert_eq!(clause.start_offset, expected_start, "gap before clause {i}");
            assert!(clause.end_offset > clause.start_offset, "empty clause {i}");
            assert_eq!(&doc.text[clause.start_offset..clause.end_offset], clause.text);
            expected_start = clause.end_offset;
        }
        assert_eq!(expected_start, doc.text.len(), "clauses do not reach the end");
    }

    #[test]
    fn single_clause_spans_whole_text() {
        let text = "Employee shall receive a penalty for late payment of wages.";
        let doc = Normalizer::default().normalize(text).unwrap();
        assert_eq!(doc.clauses.len(), 1);
        assert_eq!(doc.clauses[0].text, text);
        assert_eq!(doc.text, text);
        assert_partition(&doc);
    }

    #[test]
    fn blank_lines_split_clauses() {
        let doc = Normalizer::default()
            .normalize("First clause\ncontinues here.\n\n\nSecond clause.")
            .unwrap();
        assert_eq!(doc.clauses.len(), 2);
        assert_eq!(doc.clauses[0].text, "First clause continues here.\n");
        assert_eq!(doc.clauses[1].text, "Second clause.");
        assert_partition(&doc);
    }

    #[test]
    fn numbered_headers_split_without_blank_lines() {
        let raw = "AGREEMENT\n1. Payment is due monthly.\n1.1. Late fees apply.\n2.3 Termination\n(a) by notice\nSECTION 4 Venue\nArticle IV Law";
        let doc = Normalizer::default().normalize(raw).unwrap();
        let texts: Vec<&str> = doc.clauses.iter().map(|c| c.text.trim_end()).collect();
        assert_eq!(
            texts,
            vec![
                "AGREEMENT",
                "1. Payment is due monthly.",
                "1.1. Late fees apply.",
                "2.3 Termination",
                "(a) by notice",
                "SECTION 4 Venue",
                "Article IV Law",
            ]
        );
        assert_partition(&doc);
    }

    #[test]
    fn unstructured_text_falls_back_to_sentence_groups() {
        let raw = "The Employer shall pay a salary. Late payment incurs a penalty. \
                   Either party may terminate. The Supplier shall indemnify the Employer. \
                   Disputes go to arbitration. All information is confidential.";
        let doc = Normalizer::default().normalize(raw).unwrap();
        let texts: Vec<&str> = doc.clauses.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "The Employer shall pay a salary. Late payment incurs a penalty. Either party may terminate.\n",
                "The Supplier shall indemnify the Employer. Disputes go to arbitration. All information is confidential.",
            ]
        );
        assert_partition(&doc);
    }

    #[test]
    fn colon_and_semicolon_line_ends_close_a_sentence_group() {
        let doc = Normalizer::default()
            .normalize("The Supplier shall:\ndeliver goods on time;\npay all fees when due.")
            .unwrap();
        let texts: Vec<&str> = doc.clauses.iter().map(|c| c.text.trim_end()).collect();
        assert_eq!(
            texts,
            vec![
                "The Supplier shall:",
                "deliver goods on time;",
                "pay all fees when due.",
            ]
        );
        assert_partition(&doc);
    }

    #[test]
    fn structured_blocks_are_not_split_into_sentences() {
        let doc = Normalizer::default()
            .normalize("One. Two. Three. Four.\n\nFive.")
            .unwrap();
        assert_eq!(doc.clauses.len(), 2);
        assert_eq!(doc.clauses[0].text, "One. Two. Three. Four.\n");
    }

    #[test]
    fn years_at_line_start_are_not_headers() {
        let doc = Normalizer::default()
            .normalize("This term ends on 31 December\n2025 unless renewed.")
            .unwrap();
        assert_eq!(doc.clauses.len(), 1);
    }

    #[test]
    fn collapses_whitespace_and_strips_non_printables() {
        let raw = "  The\tParty\u{200b}  shall\u{0007}   pay\u{a0}fees. \r\n\r\n\u{feff}Next\r\nline ";
        let doc = Normalizer::default().normalize(raw).unwrap();
        assert_eq!(doc.clauses.len(), 2);
        assert_eq!(doc.clauses[0].text, "The Party shall pay fees.\n");
        assert_eq!(doc.clauses[1].text, "Next line");
        assert_partition(&doc);
    }

    #[test]
    fn page_breaks_act_as_line_breaks() {
        let doc = Normalizer::default()
            .normalize("Page one text.\u{0c}\u{0c}Page two text.")
            .unwrap();
        assert_eq!(doc.clauses.len(), 2);
    }

    #[test]
    fn empty_input_is_malformed() {
        assert_eq!(normalize(""), Err(MalformedInputError::Empty));
        assert_eq!(normalize(" \n\t \n"), Err(MalformedInputError::Empty));
    }

    #[test]
    fn unrecoverable_input_is_malformed() {
        assert_eq!(
            normalize("\u{0001}\u{0002}\u{200b}"),
            Err(MalformedInputError::NoClauses)
        );
    }

    #[test]
    fn custom_patterns_replace_defaults() {
        let normalizer = Normalizer::with_patterns(&[r"^CLAUSE\b".to_string()]).unwrap();
        let doc = normalizer
            .normalize("Preamble\nclause one text\n1. not a header here")
            .unwrap();
        assert_eq!(doc.clauses.len(), 2);
        assert_eq!(doc.clauses[1].text, "clause one text 1. not a header here");
    }

    #[test]
    fn invalid_pattern_is_configuration_error() {
        let err = Normalizer::with_patterns(&["([".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigurationError::Pattern { .. }));
    }

    #[test]
    fn default_patterns_all_compile() {
        let normalizer = Normalizer::with_patterns(&default_section_patterns()).unwrap();
        assert_eq!(normalizer.headers.len(), default_section_patterns().len());
        assert_eq!(Normalizer::default().headers.len(), normalizer.headers.len());
    }

    #[test]
    fn partition_holds_for_varied_documents() {
        let docs = [
            "a",
            "one\n\ntwo\n\nthree",
            "1. x\n2. y\n3. z",
            "Header\n\n\n(a) alpha\n(b) beta\n\nTrailer  ",
            "Ünïcödé  clause\n\nwith — dashes and “quotes”",
            "First sentence. Second one. Third one. Fourth one here.",
        ];
        for raw in docs {
            let doc = Normalizer::default().normalize(raw).unwrap();
            assert_partition(&doc);
        }
    }
}
