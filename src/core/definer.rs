// src/core/definer.rs
//! In-document definition search.
//!
//! Looks next to every occurrence of an acronym for a phrase whose word
//! initials spell it: `Long Form (LF)`, `LF (Long Form)`, `LF - Long form`,
//! `LF stands for Long form`, and as a last resort the words that simply
//! follow the acronym. Matching is purely lexical; nothing here does I/O.

use crate::core::detector::AcronymDetector;
use crate::core::types::{collapse_whitespace, Acronym, Candidate, DocumentHints, Occurrence, SourceKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

static WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9]+(?:['’-][A-Za-z0-9]+)*|&").expect("valid word regex"));

/// A sentence ends at . ! or ? followed by whitespace and a capital letter.
static SENTENCE_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+[A-Z]").expect("valid sentence regex"));

static STANDS_FOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*,?\s*(?:is\s+)?(?:short\s+for|stands\s+for)\s+").expect("valid stands-for regex")
});

const MINOR_WORDS: &[&str] = &[
    "of", "and", "the", "for", "in", "on", "to", "a", "an", "&", "with", "by", "at", "or", "de",
    "du", "la", "von", "der",
];

const HARD_STOPS: &[char] = &['.', ';', ':', '(', ')', '[', ']', '!', '?', '"', '\n'];

const TABLE_CONFIDENCE: f64 = 0.86;
const MAX_CONFIDENCE: f64 = 0.98;
const EVIDENCE_CHARS: usize = 240;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefinerConfig {
    /// Sentences searched on each side of the one holding the occurrence.
    pub sentence_span: usize,
    /// Words considered by the trailing-words fallback.
    pub max_tail_words: usize,
}

impl Default for DefinerConfig {
    fn default() -> Self {
        Self { sentence_span: 1, max_tail_words: 10 }
    }
}

/// Which textual shape produced a match. Each has its own base confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pattern {
    ExpansionFirst,
    AcronymFirst,
    Separator,
    StandsFor,
    Tail,
}

impl Pattern {
    fn base_confidence(self) -> f64 {
        match self {
            Pattern::ExpansionFirst => 0.95,
            Pattern::AcronymFirst => 0.90,
            Pattern::Separator | Pattern::StandsFor => 0.85,
            Pattern::Tail => 0.70,
        }
    }

    /// A tail phrase loses confidence for every word it runs past the
    /// acronym's length.
    fn span_factor(self, words: usize, letters: usize) -> f64 {
        match self {
            Pattern::Tail => (1.0 - 0.04 * words.saturating_sub(letters) as f64).max(0.8),
            _ => 1.0,
        }
    }

    fn min_alignment(self, letters: usize) -> f64 {
        match self {
            Pattern::ExpansionFirst | Pattern::AcronymFirst if letters <= 3 => 0.45,
            Pattern::Tail => 0.65,
            _ => 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PhraseMatch {
    phrase: String,
    alignment: f64,
    exact: bool,
    words: usize,
}

pub struct DocumentDefiner {
    config: DefinerConfig,
}

impl DocumentDefiner {
    pub fn new(config: &DefinerConfig) -> Self {
        Self { config: config.clone() }
    }

    /// Zero or more `document` candidates, at most one per occurrence.
    /// Candidates for the same definition are merged later by the ranker.
    pub fn define(&self, acronym: &Acronym, text: &str) -> Vec<Candidate> {
        let letters = acronym_letters(&acronym.text);
        if letters.is_empty() {
            return Vec::new();
        }
        let sentences = sentence_ranges(text);

        acronym
            .occurrences
            .iter()
            .filter(|o| o.end <= text.len() && o.start < o.end)
            .filter(|o| text.is_char_boundary(o.start) && text.is_char_boundary(o.end))
            .filter_map(|&occ| {
                let window = self.search_window(&sentences, occ);
                let (pattern, found) = self.match_occurrence(&letters, text, occ, window.clone())?;
                let confidence = (pattern.base_confidence()
                    * (0.8 + 0.2 * found.alignment)
                    * pattern.span_factor(found.words, letters.len()))
                .min(MAX_CONFIDENCE);
                let evidence = truncate_chars(text[window].trim(), EVIDENCE_CHARS);
                Candidate::new(&found.phrase, SourceKind::Document, confidence)
                    .map(|c| c.with_evidence(collapse_whitespace(&evidence)))
            })
            .collect()
    }

    /// Definitions taken from glossary-style tables, keyed by normalized acronym.
    pub fn glossary(&self, detector: &AcronymDetector, hints: &DocumentHints) -> Vec<(String, Candidate)> {
        let mut found = Vec::new();
        for row in hints.tables.iter().flatten() {
            let cells: Vec<&str> = row.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect();

            // "Long Form (ACR)" written inside any cell of the row
            let joined = cells.join(" | ");
            for acronym in detector.detect(&joined) {
                for candidate in self.define(&acronym, &joined) {
                    let mut candidate = candidate.with_evidence(format!("{} – {} (table)", acronym.text, joined));
                    candidate.confidence = candidate.confidence.max(TABLE_CONFIDENCE);
                    found.push((acronym.text.clone(), candidate));
                }
            }

            // two-column "ACR | Definition" rows, in either order
            if let [a, b, ..] = cells.as_slice() {
                for (left, right) in [(a, b), (b, a)] {
                    let Some(term) = detector.normalize(left) else { continue };
                    if right.chars().count() <= 2 || detector.normalize(right).is_some() {
                        continue;
                    }
                    if let Some(c) = Candidate::new(right, SourceKind::Document, TABLE_CONFIDENCE) {
                        let evidence = format!("{} – {} (table)", term, c.definition);
                        found.push((term, c.with_evidence(evidence)));
                    }
                }
            }
        }
        found
    }

    fn search_window(&self, sentences: &[Range<usize>], occ: Occurrence) -> Range<usize> {
        let Some(idx) = sentences.iter().position(|s| s.start <= occ.start && occ.start < s.end) else {
            return occ.start..occ.end;
        };
        let first = idx.saturating_sub(self.config.sentence_span);
        let last = (idx + self.config.sentence_span).min(sentences.len() - 1);
        sentences[first].start..sentences[last].end
    }

    fn match_occurrence(
        &self,
        letters: &[char],
        text: &str,
        occ: Occurrence,
        window: Range<usize>,
    ) -> Option<(Pattern, PhraseMatch)> {
        let before = &text[window.start.min(occ.start)..occ.start];
        let after = &text[occ.end..window.end.max(occ.end)];
        let after_trim = after.trim_start();
        let max_words = letters.len() * 2 + 3;

        // Long Form (ACR)
        if let Some(region) = before.trim_end().strip_suffix('(') {
            if after_trim.starts_with(')') {
                let region = &region[region.rfind(HARD_STOPS).map_or(0, |i| i + 1)..];
                if let Some(m) = accept(Pattern::ExpansionFirst, letters, best_suffix(letters, region, max_words)) {
                    return Some((Pattern::ExpansionFirst, m));
                }
            }
        }

        // ACR (Long Form)
        if let Some(inner) = after_trim.strip_prefix('(') {
            if let Some(close) = inner.find(')') {
                let inner = &inner[..close];
                let inner = &inner[..inner.find([',', ';']).unwrap_or(inner.len())];
                if let Some(m) = accept(Pattern::AcronymFirst, letters, best_prefix(letters, inner, max_words)) {
                    return Some((Pattern::AcronymFirst, m));
                }
            }
        }

        // ACR - Long form / ACR: Long form
        if let Some(sep @ ('-' | '–' | '—' | ':' | '=')) = after_trim.chars().next() {
            let rest = &after_trim[sep.len_utf8()..];
            let region = &rest[..rest.find(HARD_STOPS).unwrap_or(rest.len())];
            if let Some(m) = accept(Pattern::Separator, letters, best_prefix(letters, region, max_words)) {
                return Some((Pattern::Separator, m));
            }
        }

        // ACR, short for Long form / ACR stands for Long form
        if let Some(lead) = STANDS_FOR_RE.find(after) {
            let rest = &after[lead.end()..];
            let region = &rest[..rest.find(HARD_STOPS).unwrap_or(rest.len())];
            if let Some(m) = accept(Pattern::StandsFor, letters, best_prefix(letters, region, max_words)) {
                return Some((Pattern::StandsFor, m));
            }
        }

        // whatever follows the acronym
        let region = &after[..after.find(['(', ')', ';', '\n']).unwrap_or(after.len())];
        let tail_words = self.config.max_tail_words.min(max_words);
        accept(Pattern::Tail, letters, best_prefix(letters, region, tail_words)).map(|m| (Pattern::Tail, m))
    }
}

fn accept(pattern: Pattern, letters: &[char], found: Option<PhraseMatch>) -> Option<PhraseMatch> {
    let found = found?;
    if found.exact {
        return Some(found);
    }
    let capitalised = found.phrase.chars().next().is_some_and(char::is_uppercase);
    (capitalised && found.alignment >= pattern.min_alignment(letters.len())).then_some(found)
}

/// Best phrase made of the last N words of `region`.
fn best_suffix(letters: &[char], region: &str, max_words: usize) -> Option<PhraseMatch> {
    let words: Vec<Range<usize>> = WORD_RE.find_iter(region).map(|m| m.range()).collect();
    let n = words.len();
    let options = (1..=n.min(max_words)).map(|k| &words[n - k..]);
    best_of(letters, region, options)
}

/// Best phrase made of the first N words of `region`.
fn best_prefix(letters: &[char], region: &str, max_words: usize) -> Option<PhraseMatch> {
    let words: Vec<Range<usize>> = WORD_RE.find_iter(region).take(max_words).map(|m| m.range()).collect();
    let options = (1..=words.len()).map(|k| &words[..k]);
    best_of(letters, region, options)
}

/// Exact initials matches beat fuzzy ones; among equals fewer words win.
fn best_of<'a>(
    letters: &[char],
    region: &str,
    options: impl Iterator<Item = &'a [Range<usize>]>,
) -> Option<PhraseMatch> {
    let mut best: Option<PhraseMatch> = None;
    for span in options {
        let (Some(first), Some(last)) = (span.first(), span.last()) else { continue };
        let words: Vec<&str> = span.iter().map(|r| &region[r.clone()]).collect();
        if is_minor(words[0]) || is_minor(words[words.len() - 1]) {
            continue;
        }
        let phrase = region[first.start..last.end].trim_matches(|c: char| " .;:,".contains(c));
        let (alignment, exact) = match exact_alignment(letters, &words) {
            Some(skipped) => ((1.0 - 0.05 * skipped as f64).max(0.85), true),
            None => (fuzzy_alignment(letters, &words), false),
        };
        let candidate = PhraseMatch { phrase: phrase.to_string(), alignment, exact, words: words.len() };
        let better = match &best {
            None => true,
            Some(b) => (candidate.exact, candidate.alignment) > (b.exact, b.alignment)
                || (candidate.exact == b.exact && candidate.alignment == b.alignment && candidate.words < b.words),
        };
        if better {
            best = Some(candidate);
        }
    }
    best
}

/// Uppercased letters and digits of an acronym: "AT&T" -> [A, T, T].
pub(crate) fn acronym_letters(acronym: &str) -> Vec<char> {
    acronym.chars().filter(|c| c.is_alphanumeric()).map(|c| c.to_ascii_uppercase()).collect()
}

fn is_minor(word: &str) -> bool {
    MINOR_WORDS.contains(&word.to_lowercase().as_str())
}

/// Letters a word may contribute after its first: internal capitals
/// ("HyperText"), hyphen segment starts ("Wi-Fi") and digits.
fn inner_initials(word: &str) -> Vec<char> {
    let mut out = Vec::new();
    let mut prev = None;
    for (i, c) in word.chars().enumerate() {
        if i > 0 && (c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(prev, Some('-')) && c.is_alphanumeric()) {
            out.push(c.to_ascii_uppercase());
        }
        prev = Some(c);
    }
    out
}

/// Every content word must contribute its initial, in order; minor words may
/// contribute or be skipped. Returns the fewest skipped minor words.
///
/// `fewest[i][j]` answers the question for `words[i..]` spelling `letters[j..]`,
/// filled from the back, so the cost is words × letters × inner initials.
fn exact_alignment(letters: &[char], words: &[&str]) -> Option<usize> {
    let (n, m) = (words.len(), letters.len());
    let mut fewest: Vec<Vec<Option<usize>>> = vec![vec![None; m + 1]; n + 1];
    fewest[n][m] = Some(0);

    for i in (0..n).rev() {
        let word = words[i];
        let first = word.chars().next().map(|c| c.to_ascii_uppercase());
        let extras = inner_initials(word);
        let minor = is_minor(word);
        for j in 0..=m {
            let mut cell: Option<usize> = None;
            if j < m && first == Some(letters[j]) {
                for take in 0..=extras.len() {
                    let used = 1 + take;
                    if j + used > m || letters[j + 1..j + used] != extras[..take] {
                        continue;
                    }
                    if let Some(s) = fewest[i + 1][j + used] {
                        cell = Some(cell.map_or(s, |c| c.min(s)));
                    }
                }
            }
            if minor {
                if let Some(s) = fewest[i + 1][j] {
                    cell = Some(cell.map_or(s + 1, |c| c.min(s + 1)));
                }
            }
            fewest[i][j] = cell;
        }
    }
    fewest[0][0]
}

/// Leading agreement blended with Levenshtein similarity of the initials,
/// minus a small penalty for phrases much longer than the acronym.
fn fuzzy_alignment(letters: &[char], words: &[&str]) -> f64 {
    let acronym: String = letters.iter().collect();
    let initials: String = words
        .iter()
        .filter_map(|w| w.chars().next())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if initials.is_empty() {
        return 0.0;
    }
    let prefix = acronym.chars().zip(initials.chars()).take_while(|(a, b)| a == b).count();
    let similarity = strsim::normalized_levenshtein(&acronym, &initials);
    let score = 0.6 * (prefix as f64 / letters.len().max(1) as f64) + 0.4 * similarity;
    let penalty = ((words.len() as f64 - letters.len() as f64) * 0.02).clamp(0.0, 0.2);
    (score - penalty).clamp(0.0, 1.0)
}

/// Byte ranges of sentences in `text`.
fn sentence_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END_RE.find_iter(text) {
        ranges.push(start..m.start() + 1);
        start = m.end() - 1;
    }
    if start < text.len() {
        ranges.push(start..text.len());
    }
    ranges
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Used by the web heuristics: how well a free-text definition spells the acronym.
pub(crate) fn initials_alignment(acronym: &str, phrase: &str) -> f64 {
    let letters = acronym_letters(acronym);
    let words: Vec<&str> = WORD_RE.find_iter(phrase).map(|m| m.as_str()).collect();
    if letters.is_empty() || words.is_empty() {
        return 0.0;
    }
    match exact_alignment(&letters, &words) {
        Some(skipped) => (1.0 - 0.05 * skipped as f64).max(0.85),
        None => fuzzy_alignment(&letters, &words),
    }
}
