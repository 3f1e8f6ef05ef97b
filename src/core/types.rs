// src/core/types.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Byte span of one occurrence inside the source text. Always on char boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occurrence {
    pub start: usize,
    pub end: usize,
}

/// A detected acronym. Identity is the normalized surface text within one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acronym {
    pub text: String,
    /// Every place the acronym (or one of its variant spellings) appears,
    /// in document order.
    pub occurrences: Vec<Occurrence>,
}

impl Acronym {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), occurrences: Vec::new() }
    }
}

/// Where a candidate definition came from.
///
/// Variant order is the default trust order; the ranker reads the actual
/// priority from its `ScoringPolicy`, not from this declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    ActiveLearning,
    Document,
    Canonical,
    Bing,
    Wikipedia,
    Wiktionary,
    Duckduckgo,
    Placeholder,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::ActiveLearning => "active-learning",
            SourceKind::Document => "document",
            SourceKind::Canonical => "canonical",
            SourceKind::Bing => "bing",
            SourceKind::Wikipedia => "wikipedia",
            SourceKind::Wiktionary => "wiktionary",
            SourceKind::Duckduckgo => "duckduckgo",
            SourceKind::Placeholder => "placeholder",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One proposed definition for an acronym.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Trimmed, non-empty definition text.
    pub definition: String,
    /// Every source that produced this definition (after merging).
    pub sources: BTreeSet<SourceKind>,
    /// Confidence assigned by the source, 0.0..=1.0. Max over merged sources.
    pub confidence: f64,
    /// Final rank score. Zero until the ranker has run.
    pub score: f64,
    /// Text the definition was found in, when there is any.
    pub evidence: Option<String>,
    /// Domain of a web result, e.g. "en.wikipedia.org".
    pub origin: Option<String>,
}

impl Candidate {
    /// Returns `None` when the definition is empty after trimming.
    pub fn new(definition: &str, source: SourceKind, confidence: f64) -> Option<Self> {
        let definition = collapse_whitespace(definition);
        if definition.is_empty() {
            return None;
        }
        Some(Self {
            definition,
            sources: BTreeSet::from([source]),
            confidence: confidence.clamp(0.0, 1.0),
            score: 0.0,
            evidence: None,
            origin: None,
        })
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Case- and whitespace-insensitive key used for deduplication.
    pub fn dedup_key(&self) -> String {
        collapse_whitespace(&self.definition).to_lowercase()
    }

    pub fn has_source(&self, kind: SourceKind) -> bool {
        self.sources.contains(&kind)
    }
}

/// Ranked candidates for one acronym. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateList {
    acronym: String,
    candidates: Vec<Candidate>,
}

impl CandidateList {
    /// Only the ranker builds lists; it upholds the non-empty invariant.
    pub(crate) fn from_ranked(acronym: &str, candidates: Vec<Candidate>) -> Self {
        debug_assert!(!candidates.is_empty());
        Self { acronym: acronym.to_string(), candidates }
    }

    pub fn acronym(&self) -> &str {
        &self.acronym
    }

    pub fn top(&self) -> &Candidate {
        &self.candidates[0]
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn get(&self, index: usize) -> Option<&Candidate> {
        self.candidates.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.candidates.iter()
    }

    pub fn is_placeholder(&self) -> bool {
        self.candidates.len() == 1 && self.top().has_source(SourceKind::Placeholder)
    }
}

impl<'a> IntoIterator for &'a CandidateList {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

/// Lightweight structure handed over by the document-to-text step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentHints {
    /// Tables as rows of cell texts.
    pub tables: Vec<Vec<Vec<String>>>,
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
