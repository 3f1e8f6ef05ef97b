// src/core/ranker.rs
use crate::core::context::Keywords;
use crate::core::types::{Candidate, CandidateList, SourceKind};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;

/// One row of the trust table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceWeight {
    pub source: SourceKind,
    pub weight: f64,
}

/// Weights and tie-break order consulted by the ranker.
///
/// `sources` is ordered most trusted first; that order is also the tie-break
/// order. A source missing from the table gets `fallback_weight` and sorts last.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub sources: Vec<SourceWeight>,
    pub fallback_weight: f64,
    /// Multiplier added per document keyword shared with the definition.
    pub keyword_bonus: f64,
    pub max_keyword_matches: usize,
    /// A human-confirmed definition always sorts first, whatever its score.
    pub pin_confirmed: bool,
    pub max_candidates: usize,
    pub placeholder_text: String,
    pub placeholder_confidence: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        let table = [
            (SourceKind::ActiveLearning, 3.0),
            (SourceKind::Document, 1.0),
            (SourceKind::Canonical, 0.9),
            (SourceKind::Bing, 0.75),
            (SourceKind::Wikipedia, 0.7),
            (SourceKind::Wiktionary, 0.65),
            (SourceKind::Duckduckgo, 0.6),
            (SourceKind::Placeholder, 0.1),
        ];
        Self {
            sources: table.into_iter().map(|(source, weight)| SourceWeight { source, weight }).collect(),
            fallback_weight: 0.1,
            keyword_bonus: 0.05,
            max_keyword_matches: 3,
            pin_confirmed: true,
            max_candidates: 10,
            placeholder_text: "No definition found".to_string(),
            placeholder_confidence: 0.05,
        }
    }
}

impl ScoringPolicy {
    /// Position in the trust table; lower is more trusted.
    pub fn priority(&self, source: SourceKind) -> usize {
        self.sources.iter().position(|s| s.source == source).unwrap_or(self.sources.len())
    }

    pub fn weight(&self, source: SourceKind) -> f64 {
        self.sources
            .iter()
            .find(|s| s.source == source)
            .map_or(self.fallback_weight, |s| s.weight)
    }

    /// Most trusted source a merged candidate carries.
    fn best_source(&self, candidate: &Candidate) -> Option<SourceKind> {
        candidate.sources.iter().copied().min_by_key(|s| self.priority(*s))
    }

    fn best_priority(&self, candidate: &Candidate) -> usize {
        self.best_source(candidate).map_or(usize::MAX, |s| self.priority(s))
    }

    pub fn context_boost(&self, candidate: &Candidate, keywords: &Keywords) -> f64 {
        let shared = keywords.overlap(&candidate.definition).min(self.max_keyword_matches);
        1.0 + self.keyword_bonus * shared as f64
    }

    /// confidence × source weight × context boost.
    pub fn score(&self, candidate: &Candidate, keywords: &Keywords) -> f64 {
        let weight = candidate
            .sources
            .iter()
            .map(|s| self.weight(*s))
            .fold(f64::NEG_INFINITY, f64::max);
        let weight = if weight.is_finite() { weight } else { self.fallback_weight };
        candidate.confidence * weight * self.context_boost(candidate, keywords)
    }

    fn placeholder(&self) -> Candidate {
        let text = self.placeholder_text.trim();
        Candidate {
            definition: if text.is_empty() { "No definition found".to_string() } else { text.to_string() },
            sources: [SourceKind::Placeholder].into_iter().collect(),
            confidence: self.placeholder_confidence.clamp(0.0, 1.0),
            score: 0.0,
            evidence: None,
            origin: None,
        }
    }
}

/// Scores compared on a fixed grid so float noise cannot reorder equal scores.
fn score_key(score: f64) -> i64 {
    (score * 1e9).round() as i64
}

pub struct CandidateRanker {
    policy: ScoringPolicy,
}

impl CandidateRanker {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    /// Deduplicates, scores and orders candidates. Never returns an empty list.
    /// The result does not depend on the order of `candidates`.
    pub fn rank(&self, acronym: &str, candidates: Vec<Candidate>, keywords: &Keywords) -> CandidateList {
        let mut merged = self.merge(candidates);

        for candidate in merged.iter_mut() {
            candidate.score = self.policy.score(candidate, keywords);
        }
        merged.sort_by(|a, b| self.compare(a, b));
        merged.truncate(self.policy.max_candidates.max(1));

        if merged.is_empty() {
            let mut placeholder = self.policy.placeholder();
            placeholder.score = self.policy.score(&placeholder, keywords);
            merged.push(placeholder);
        }
        CandidateList::from_ranked(acronym, merged)
    }

    fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering {
        let pinned = |c: &Candidate| self.policy.pin_confirmed && c.has_source(SourceKind::ActiveLearning);
        pinned(b)
            .cmp(&pinned(a))
            .then_with(|| score_key(b.score).cmp(&score_key(a.score)))
            .then_with(|| self.policy.best_priority(a).cmp(&self.policy.best_priority(b)))
            .then_with(|| a.definition.chars().count().cmp(&b.definition.chars().count()))
            .then_with(|| a.definition.cmp(&b.definition))
    }

    /// Groups case/whitespace variants. The representative text is the one
    /// with the highest confidence, then the most trusted source, then lexical.
    fn merge(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let mut groups: HashMap<String, Vec<Candidate>> = HashMap::new();
        for candidate in candidates {
            if candidate.definition.trim().is_empty() {
                continue;
            }
            groups.entry(candidate.dedup_key()).or_default().push(candidate);
        }

        groups
            .into_values()
            .filter_map(|mut members| {
                members.sort_by(|a, b| {
                    score_key(b.confidence)
                        .cmp(&score_key(a.confidence))
                        .then_with(|| self.policy.best_priority(a).cmp(&self.policy.best_priority(b)))
                        .then_with(|| a.definition.cmp(&b.definition))
                        .then_with(|| Reverse(a.evidence.is_some()).cmp(&Reverse(b.evidence.is_some())))
                        .then_with(|| a.evidence.cmp(&b.evidence))
                        .then_with(|| a.origin.cmp(&b.origin))
                });
                let mut iter = members.into_iter();
                let mut head = iter.next()?;
                for other in iter {
                    head.sources.extend(other.sources);
                    if head.evidence.is_none() {
                        head.evidence = other.evidence;
                    }
                    if head.origin.is_none() {
                        head.origin = other.origin;
                    }
                }
                Some(head)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(def: &str, source: SourceKind, confidence: f64) -> Candidate {
        Candidate::new(def, source, confidence).unwrap()
    }

    fn ranker() -> CandidateRanker {
        CandidateRanker::new(ScoringPolicy::default())
    }

    #[test]
    fn empty_input_yields_placeholder() {
        let list = ranker().rank("XYZZY", Vec::new(), &Keywords::default());
        assert_eq!(list.len(), 1);
        assert!(list.is_placeholder());
        assert_eq!(list.top().definition, "No definition found");
    }

    #[test]
    fn variants_merge_with_union_of_sources() {
        let list = ranker().rank(
            "RAM",
            vec![
                cand("Random Access Memory", SourceKind::Canonical, 0.85),
                cand("random  access memory", SourceKind::Wikipedia, 0.55),
            ],
            &Keywords::default(),
        );
        assert_eq!(list.len(), 1);
        let top = list.top();
        assert_eq!(top.definition, "Random Access Memory");
        assert!(top.has_source(SourceKind::Canonical) && top.has_source(SourceKind::Wikipedia));
        assert_eq!(top.confidence, 0.85);
    }

    #[test]
    fn confirmed_definition_is_pinned_first() {
        let mut policy = ScoringPolicy::default();
        policy.sources[0].weight = 0.01;
        let list = CandidateRanker::new(policy).rank(
            "HTTP",
            vec![
                cand("HyperText Transfer Protocol", SourceKind::Document, 0.98),
                cand("Hypertext Transport Program", SourceKind::ActiveLearning, 1.0),
            ],
            &Keywords::default(),
        );
        assert_eq!(list.top().definition, "Hypertext Transport Program");
    }

    #[test]
    fn document_beats_web_at_equal_confidence() {
        let list = ranker().rank(
            "SAR",
            vec![
                cand("Search and Rescue", SourceKind::Wikipedia, 0.6),
                cand("Synthetic Aperture Radar", SourceKind::Document, 0.6),
            ],
            &Keywords::default(),
        );
        assert_eq!(list.top().definition, "Synthetic Aperture Radar");
    }

    #[test]
    fn keyword_overlap_boosts_score() {
        let keywords = Keywords::new(["radar", "satellite"]);
        let list = ranker().rank(
            "SAR",
            vec![
                cand("Search and Rescue", SourceKind::Canonical, 0.85),
                cand("Synthetic Aperture Radar", SourceKind::Canonical, 0.85),
            ],
            &keywords,
        );
        assert_eq!(list.top().definition, "Synthetic Aperture Radar");
        assert!(list.top().score > list.get(1).unwrap().score);
    }

    #[test]
    fn equal_scores_break_ties_by_priority_then_length_then_lexical() {
        let mut policy = ScoringPolicy::default();
        for row in policy.sources.iter_mut() {
            row.weight = 1.0;
        }
        let list = CandidateRanker::new(policy).rank(
            "AB",
            vec![
                cand("Bravo Alpha", SourceKind::Wikipedia, 0.5),
                cand("Alpha Beta Long", SourceKind::Canonical, 0.5),
                cand("Zed Zed", SourceKind::Canonical, 0.5),
                cand("Able Baker", SourceKind::Canonical, 0.5),
            ],
            &Keywords::default(),
        );
        let order: Vec<_> = list.iter().map(|c| c.definition.as_str()).collect();
        assert_eq!(order, ["Zed Zed", "Able Baker", "Alpha Beta Long", "Bravo Alpha"]);
    }

    #[test]
    fn ranking_ignores_input_order() {
        let input = vec![
            cand("Alpha Beta", SourceKind::Wikipedia, 0.5),
            cand("alpha beta", SourceKind::Duckduckgo, 0.5),
            cand("Another Board", SourceKind::Wiktionary, 0.45),
        ];
        let mut reversed = input.clone();
        reversed.reverse();
        let a = ranker().rank("AB", input, &Keywords::default());
        let b = ranker().rank("AB", reversed, &Keywords::default());
        assert_eq!(a, b);
        assert_eq!(a.top().definition, "Alpha Beta");
    }

    #[test]
    fn list_is_truncated_but_never_empty() {
        let mut policy = ScoringPolicy::default();
        policy.max_candidates = 0;
        let list = CandidateRanker::new(policy).rank(
            "AB",
            vec![cand("Alpha Beta", SourceKind::Canonical, 0.8), cand("Able Baker", SourceKind::Canonical, 0.7)],
            &Keywords::default(),
        );
        assert_eq!(list.len(), 1);
        assert_eq!(list.top().definition, "Alpha Beta");
    }
}
