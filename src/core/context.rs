// File: src/core/context.rs
use crate::core::types::Occurrence;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

static WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z'-]{2,}").expect("valid word regex"));

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "with", "this", "that", "these", "those", "from",
    "into", "onto", "over", "under", "have", "has", "had", "not", "but", "you", "your", "our",
    "their", "they", "them", "its", "his", "her", "she", "him", "who", "whom", "which", "what",
    "when", "where", "why", "how", "all", "any", "each", "other", "some", "such", "than", "then",
    "there", "here", "also", "can", "could", "should", "would", "will", "shall", "may", "might",
    "must", "been", "being", "about", "after", "before", "between", "both", "more", "most",
    "only", "very", "used", "using", "use", "per", "via", "one", "two", "three", "within",
    "without", "upon", "while", "because", "does", "did", "done", "out", "off", "again", "same",
    "see", "new", "etc", "is", "of", "to", "in", "on", "at", "by", "an", "or", "as", "be",
];

static STOPWORD_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| STOPWORDS.iter().copied().collect());

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Characters taken on each side of an occurrence.
    pub radius_chars: usize,
    pub keyword_top_k: usize,
    /// How many of the top keywords form the active-learning fingerprint.
    pub fingerprint_size: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { radius_chars: 160, keyword_top_k: 8, fingerprint_size: 5 }
    }
}

/// Document-level keywords, most frequent first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keywords {
    ranked: Vec<String>,
}

impl Keywords {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let ranked = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty() && seen.insert(w.clone()))
            .collect();
        Self { ranked }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ranked
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn top(&self, n: usize) -> &[String] {
        &self.ranked[..n.min(self.ranked.len())]
    }

    /// Number of distinct keyword tokens appearing in `text`.
    pub fn overlap(&self, text: &str) -> usize {
        let tokens: HashSet<String> = tokenize(text).collect();
        self.ranked.iter().filter(|k| tokens.contains(k.as_str())).count()
    }

    /// Stable key built from the top `size` keywords, order-independent.
    /// `None` when there are no keywords to scope by.
    pub fn fingerprint(&self, size: usize) -> Option<String> {
        let mut top: Vec<&str> = self.top(size).iter().map(String::as_str).collect();
        if top.is_empty() {
            return None;
        }
        top.sort_unstable();
        Some(top.join("|"))
    }
}

/// Text around one occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextWindow {
    pub occurrence: Occurrence,
    pub text: String,
}

pub struct ContextExtractor {
    radius: usize,
    top_k: usize,
}

impl ContextExtractor {
    pub fn new(config: &ContextConfig) -> Self {
        Self { radius: config.radius_chars, top_k: config.keyword_top_k }
    }

    /// One window per occurrence, trimmed so no word is cut in half.
    pub fn windows(&self, text: &str, occurrences: &[Occurrence]) -> Vec<ContextWindow> {
        occurrences
            .iter()
            .filter(|o| o.start <= o.end && o.end <= text.len())
            .filter(|o| text.is_char_boundary(o.start) && text.is_char_boundary(o.end))
            .map(|&occurrence| ContextWindow {
                occurrence,
                text: window_around(text, occurrence, self.radius).to_string(),
            })
            .collect()
    }

    /// Top-K content words of the whole document, lowercased.
    /// Ties are broken alphabetically so the result is stable.
    pub fn keywords(&self, text: &str) -> Keywords {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for word in tokenize(text) {
            *counts.entry(word).or_insert(0) += 1;
        }
        let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Keywords::new(ranked.into_iter().take(self.top_k).map(|(w, _)| w))
    }
}

/// Lowercased content tokens, stopwords removed.
pub(crate) fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    WORD_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_matches(|c| c == '\'' || c == '-').to_lowercase())
        .filter(|w| w.len() >= 3 && !STOPWORD_SET.contains(w.as_str()))
}

pub(crate) fn window_around(text: &str, occurrence: Occurrence, radius: usize) -> &str {
    let mut start = floor_boundary(text, occurrence.start.saturating_sub(radius));
    let mut end = ceil_boundary(text, (occurrence.end + radius).min(text.len()));

    if start > 0 && !is_break_before(text, start) {
        // skip the partial word at the left edge
        if let Some(ws) = text[start..occurrence.start].find(char::is_whitespace) {
            start += ws;
        } else {
            start = occurrence.start;
        }
    }
    if end < text.len() && !is_break_at(text, end) {
        if let Some(ws) = text[occurrence.end..end].rfind(char::is_whitespace) {
            end = occurrence.end + ws;
        } else {
            end = occurrence.end;
        }
    }
    text[start..end].trim()
}

fn is_break_before(text: &str, idx: usize) -> bool {
    text[..idx].chars().next_back().map_or(true, |c| !c.is_alphanumeric())
}

fn is_break_at(text: &str, idx: usize) -> bool {
    text[idx..].chars().next().map_or(true, |c| !c.is_alphanumeric())
}

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
