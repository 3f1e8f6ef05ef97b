// src/core/detector.rs
use crate::core::types::{Acronym, Occurrence};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Word-ish tokens, allowing internal periods, ampersands and apostrophes so
/// that "U.S.A.", "AT&T" and "RAM's" arrive in one piece. A trailing `-` or
/// `/` segment of capitals and digits keeps "TCP/IP" and "COVID-19" whole.
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9](?:[A-Za-z0-9&.'’]*[A-Za-z0-9])?(?:[-/][A-Z0-9]{2,9}s?\b)?\.?")
        .expect("valid token regex")
});

const COMPOUND_SEPARATORS: [char; 2] = ['-', '/'];

/// Always excluded: clock suffixes, calendar abbreviations and shouted function words.
const DEFAULT_STOPLIST: &[&str] = &[
    "AM", "PM", "OK", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN", "JAN", "FEB", "MAR",
    "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "SEPT", "OCT", "NOV", "DEC", "THE", "AND", "FOR",
    "NOT", "BUT", "ARE", "WAS", "YOU", "ALL", "NOTE",
];

/// Excluded only when `include_common` is off.
const COMMON_ACRONYMS: &[&str] = &[
    "IT", "ID", "TV", "AI", "UK", "USA", "EU", "US", "ASAP", "FYI", "ETA", "DIY", "VAT", "HR",
    "CEO", "CFO", "CTO", "CIO", "FAQ", "ERP", "CRM", "CAD", "CAM", "PDF", "DOCX", "CSV", "JSON",
    "HTML", "CSS", "JS", "API", "KPI", "R&D", "QA", "QC", "NDA", "SLA", "TBC", "TBA", "TBD",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub min_len: usize,
    pub max_len: usize,
    /// Extra words to ignore on top of the built-in stoplist.
    pub stoplist: Vec<String>,
    /// Keep everyday acronyms such as PDF or CEO.
    pub include_common: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self { min_len: 2, max_len: 10, stoplist: Vec::new(), include_common: true }
    }
}

/// Structural acronym detection over plain text. Pure; never fails.
pub struct AcronymDetector {
    min_len: usize,
    max_len: usize,
    stop: HashSet<String>,
}

impl AcronymDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        let mut stop: HashSet<String> = DEFAULT_STOPLIST.iter().map(|s| s.to_string()).collect();
        stop.extend(config.stoplist.iter().map(|s| s.trim().to_uppercase()));
        if !config.include_common {
            stop.extend(COMMON_ACRONYMS.iter().map(|s| s.to_string()));
        }
        Self { min_len: config.min_len.max(2), max_len: config.max_len, stop }
    }

    /// Returns acronyms ordered by first occurrence, one entry per normalized form.
    pub fn detect(&self, text: &str) -> Vec<Acronym> {
        let mut order: Vec<Acronym> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for m in TOKEN_RE.find_iter(text) {
            for (offset, surface, kept) in self.acronyms_in(m.as_str()) {
                let start = m.start() + offset;
                let occurrence = Occurrence { start, end: start + kept };
                match index.get(&surface) {
                    Some(&i) => order[i].occurrences.push(occurrence),
                    None => {
                        index.insert(surface.clone(), order.len());
                        let mut acronym = Acronym::new(surface);
                        acronym.occurrences.push(occurrence);
                        order.push(acronym);
                    }
                }
            }
        }
        order
    }

    /// A token is one acronym, or a compound whose halves are tried on
    /// their own ("Anti-NATO" still yields NATO).
    fn acronyms_in(&self, token: &str) -> Vec<(usize, String, usize)> {
        if let Some((surface, kept)) = self.normalize_with_span(token) {
            return vec![(0, surface, kept)];
        }
        let Some(sep) = token.find(COMPOUND_SEPARATORS) else {
            return Vec::new();
        };
        [(0, &token[..sep]), (sep + 1, &token[sep + 1..])]
            .into_iter()
            .filter_map(|(offset, part)| self.normalize_with_span(part).map(|(surface, kept)| (offset, surface, kept)))
            .collect()
    }

    /// Normalized form of a raw token, or `None` when it is not acronym-like.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        self.normalize_with_span(raw.trim()).map(|(surface, _)| surface)
    }

    /// Also returns how many leading bytes of `raw` belong to the acronym.
    fn normalize_with_span(&self, raw: &str) -> Option<(String, usize)> {
        let mut token = raw;
        for suffix in ["'s", "’s"] {
            if let Some(stripped) = token.strip_suffix(suffix) {
                token = stripped;
            }
        }
        let kept = token.trim_end_matches('.').len();
        let token = &token[..kept];

        let surface = if token.contains('.') {
            collapse_dotted(token)?
        } else if let Some(singular) = token.strip_suffix('s').filter(|s| is_all_caps(compound_tail(s))) {
            singular.to_string()
        } else {
            token.to_string()
        };

        if !self.has_acronym_shape(&surface) || self.stop.contains(&surface.to_uppercase()) {
            return None;
        }
        Some((surface, kept))
    }

    fn has_acronym_shape(&self, token: &str) -> bool {
        if let Some(sep) = token.find(COMPOUND_SEPARATORS) {
            let (head, tail) = (&token[..sep], &token[sep + 1..]);
            let tail_len = tail.chars().count();
            return is_all_caps(head)
                && self.has_acronym_shape(head)
                && (2..=9).contains(&tail_len)
                && tail.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        }
        let len = token.chars().count();
        if len < self.min_len || len > self.max_len {
            return false;
        }
        let mut chars = token.chars();
        if !chars.next().is_some_and(|c| c.is_ascii_uppercase()) {
            return false;
        }
        if !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '&') || token.ends_with('&') {
            return false;
        }
        let upper = token.chars().filter(|c| c.is_ascii_uppercase()).count();
        let lower = token.chars().filter(|c| c.is_ascii_lowercase()).count();
        // camel-case forms such as PhD or IoT, but not ordinary capitalised words
        lower == 0 || (upper >= 2 && upper >= lower)
    }
}

/// Part after the last `-` or `/`, or the whole token.
fn compound_tail(token: &str) -> &str {
    token.rsplit(COMPOUND_SEPARATORS).next().unwrap_or(token)
}

fn is_all_caps(token: &str) -> bool {
    token.chars().count() >= 2
        && token.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        && token.chars().any(|c| c.is_ascii_uppercase())
}

/// "U.S.A" -> "USA". Every part must be a single uppercase letter.
fn collapse_dotted(token: &str) -> Option<String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() < 2 {
        return None;
    }
    let mut out = String::with_capacity(parts.len());
    for part in parts {
        let mut chars = part.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_uppercase() => out.push(c),
            _ => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> AcronymDetector {
        AcronymDetector::new(&DetectorConfig::default())
    }

    fn surfaces(text: &str) -> Vec<String> {
        detector().detect(text).into_iter().map(|a| a.text).collect()
    }

    #[test]
    fn finds_acronym_with_expansion() {
        let text = "We used Synthetic Aperture Radar (SAR) in the trial. The SAR images were good.";
        let found = detector().detect(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "SAR");
        assert_eq!(found[0].occurrences.len(), 2);
        let first = found[0].occurrences[0];
        assert_eq!(&text[first.start..first.end], "SAR");
    }

    #[test]
    fn ordered_by_first_occurrence_without_duplicates() {
        assert_eq!(surfaces("NASA and the ESA met. NASA again, then JAXA."), ["NASA", "ESA", "JAXA"]);
    }

    #[test]
    fn accepts_digits_dots_and_camel_case() {
        assert_eq!(surfaces("MP3 files"), ["MP3"]);
        assert_eq!(surfaces("born in the U.S.A. long ago"), ["USA"]);
        assert_eq!(surfaces("a PhD on IoT"), ["PhD", "IoT"]);
        assert_eq!(surfaces("AT&T phones"), ["AT&T"]);
    }

    #[test]
    fn compound_acronyms_stay_whole() {
        assert_eq!(surfaces("We run TCP/IP over 5G. COVID-19 cases rose."), ["TCP/IP", "COVID-19"]);
        let found = detector().detect("Two TCP/IPs and one TCP/IP stack");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].occurrences.len(), 2);
    }

    #[test]
    fn compound_with_a_plain_word_keeps_the_acronym_half() {
        let text = "an Anti-NATO rally and a Wi-Fi router";
        let found = detector().detect(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "NATO");
        let occ = found[0].occurrences[0];
        assert_eq!(&text[occ.start..occ.end], "NATO");
    }

    #[test]
    fn plural_and_possessive_forms_merge() {
        let found = detector().detect("The API is fine. Two APIs exist. The API's docs.");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "API");
        assert_eq!(found[0].occurrences.len(), 3);
    }

    #[test]
    fn rejects_numbers_words_and_stoplist() {
        assert!(surfaces("1999 and 2024 were years").is_empty());
        assert!(surfaces("I think A cat is Here").is_empty());
        assert!(surfaces("Meet at 9 AM on MON in JAN").is_empty());
        assert!(surfaces("McDonald and JavaScript").is_empty());
        assert!(surfaces("ABCDEFGHIJK is too long").is_empty());
    }

    #[test]
    fn common_acronyms_can_be_excluded() {
        let config = DetectorConfig { include_common: false, ..Default::default() };
        let found = AcronymDetector::new(&config).detect("Send the PDF to the CEO about SAR");
        let names: Vec<_> = found.into_iter().map(|a| a.text).collect();
        assert_eq!(names, ["SAR"]);
    }

    #[test]
    fn custom_stoplist_is_case_insensitive() {
        let config = DetectorConfig { stoplist: vec!["tbd".into()], ..Default::default() };
        assert!(AcronymDetector::new(&config).detect("Owner TBD").is_empty());
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(surfaces("").is_empty());
        assert!(surfaces("   \n ").is_empty());
    }

    #[test]
    fn normalize_handles_single_tokens() {
        let d = detector();
        assert_eq!(d.normalize("RAM's").as_deref(), Some("RAM"));
        assert_eq!(d.normalize("CDs").as_deref(), Some("CD"));
        assert_eq!(d.normalize("e.g."), None);
        assert_eq!(d.normalize("Radar"), None);
    }
}
