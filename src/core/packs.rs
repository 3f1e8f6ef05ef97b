// src/core/packs.rs
use crate::core::types::{Candidate, SourceKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Curated packs are near-authoritative but rank below a confirmed document match.
pub const CANONICAL_CONFIDENCE: f64 = 0.85;
/// Same key in a different case ("Iot" for "IoT") is a slightly weaker hit.
const CASE_INSENSITIVE_CONFIDENCE: f64 = 0.80;

const WEB_STANDARDS: &[(&str, &[&str])] = &[
    ("AJAX", &["Asynchronous JavaScript and XML"]),
    ("API", &["Application Programming Interface"]),
    ("ARIA", &["Accessible Rich Internet Applications"]),
    ("CORS", &["Cross-Origin Resource Sharing"]),
    ("CSP", &["Content Security Policy"]),
    ("CSS", &["Cascading Style Sheets"]),
    ("DNS", &["Domain Name System"]),
    ("DOM", &["Document Object Model"]),
    ("HTML", &["HyperText Markup Language"]),
    ("HTTP", &["HyperText Transfer Protocol"]),
    ("HTTPS", &["HyperText Transfer Protocol Secure"]),
    ("JSON", &["JavaScript Object Notation"]),
    ("MIME", &["Multipurpose Internet Mail Extensions"]),
    ("PWA", &["Progressive Web App"]),
    ("REST", &["Representational State Transfer"]),
    ("SVG", &["Scalable Vector Graphics"]),
    ("TLS", &["Transport Layer Security"]),
    ("URI", &["Uniform Resource Identifier"]),
    ("URL", &["Uniform Resource Locator"]),
    ("W3C", &["World Wide Web Consortium"]),
    ("WCAG", &["Web Content Accessibility Guidelines"]),
    ("XML", &["Extensible Markup Language"]),
];

const GOVERNMENT_TECH: &[(&str, &[&str])] = &[
    ("AES", &["Advanced Encryption Standard"]),
    ("CPU", &["Central Processing Unit"]),
    ("CVE", &["Common Vulnerabilities and Exposures"]),
    ("DoD", &["Department of Defense"]),
    ("FIPS", &["Federal Information Processing Standards"]),
    ("GPU", &["Graphics Processing Unit"]),
    ("IoT", &["Internet of Things"]),
    ("MFA", &["Multi-Factor Authentication"]),
    ("NASA", &["National Aeronautics and Space Administration"]),
    ("NIST", &["National Institute of Standards and Technology"]),
    ("PII", &["Personally Identifiable Information"]),
    ("PKI", &["Public Key Infrastructure"]),
    ("RAM", &["Random Access Memory"]),
    ("SAR", &["Synthetic Aperture Radar", "Search and Rescue"]),
    ("SSD", &["Solid-State Drive"]),
    ("TRL", &["Technology Readiness Level"]),
    ("VPN", &["Virtual Private Network"]),
];

/// A named mapping from acronym to one or more definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalPack {
    pub name: String,
    pub entries: BTreeMap<String, Vec<String>>,
}

impl CanonicalPack {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), entries: BTreeMap::new() }
    }

    pub fn insert(&mut self, acronym: &str, definition: &str) {
        self.entries.entry(acronym.to_string()).or_default().push(definition.to_string());
    }

    fn from_static(name: &str, table: &[(&str, &[&str])]) -> Self {
        let mut pack = Self::new(name);
        for (acronym, definitions) in table {
            for definition in *definitions {
                pack.insert(acronym, definition);
            }
        }
        pack
    }

    /// Loads a pack from a JSON object of `"ACR": ["definition", ...]`.
    pub fn from_json_file(name: &str, path: &Path) -> Result<Self, std::io::Error> {
        let raw = std::fs::read_to_string(path)?;
        let entries: BTreeMap<String, Vec<String>> =
            serde_json::from_str(&raw).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self { name: name.to_string(), entries })
    }
}

/// All packs, queried together. Pure in-memory lookups.
#[derive(Debug, Clone, Default)]
pub struct CanonicalPacks {
    packs: Vec<CanonicalPack>,
    /// Uppercased acronym -> (pack index, original key).
    folded: HashMap<String, Vec<(usize, String)>>,
}

impl CanonicalPacks {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The web-standards and government/tech packs.
    pub fn builtin() -> Self {
        let mut packs = Self::empty();
        packs.add(CanonicalPack::from_static("web-standards", WEB_STANDARDS));
        packs.add(CanonicalPack::from_static("government-tech", GOVERNMENT_TECH));
        packs
    }

    pub fn add(&mut self, pack: CanonicalPack) {
        let idx = self.packs.len();
        for key in pack.entries.keys() {
            self.folded.entry(key.to_uppercase()).or_default().push((idx, key.clone()));
        }
        self.packs.push(pack);
    }

    pub fn pack_names(&self) -> impl Iterator<Item = &str> {
        self.packs.iter().map(|p| p.name.as_str())
    }

    /// `canonical` candidates for an acronym, exact key first, then case-folded.
    pub fn lookup(&self, acronym: &str) -> Vec<Candidate> {
        let Some(keys) = self.folded.get(&acronym.to_uppercase()) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (idx, key) in keys {
            let pack = &self.packs[*idx];
            let confidence = if key == acronym { CANONICAL_CONFIDENCE } else { CASE_INSENSITIVE_CONFIDENCE };
            for definition in pack.entries.get(key).into_iter().flatten() {
                if let Some(c) = Candidate::new(definition, SourceKind::Canonical, confidence) {
                    out.push(c.with_origin(pack.name.clone()));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_packs_resolve_exact_keys() {
        let packs = CanonicalPacks::builtin();
        let found = packs.lookup("HTTP");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].definition, "HyperText Transfer Protocol");
        assert_eq!(found[0].confidence, CANONICAL_CONFIDENCE);
        assert_eq!(found[0].origin.as_deref(), Some("web-standards"));
    }

    #[test]
    fn multiple_definitions_are_all_returned() {
        let found = CanonicalPacks::builtin().lookup("SAR");
        let defs: Vec<_> = found.iter().map(|c| c.definition.as_str()).collect();
        assert_eq!(defs, ["Synthetic Aperture Radar", "Search and Rescue"]);
    }

    #[test]
    fn case_insensitive_hits_are_weaker() {
        let found = CanonicalPacks::builtin().lookup("IOT");
        assert_eq!(found[0].definition, "Internet of Things");
        assert_eq!(found[0].confidence, CASE_INSENSITIVE_CONFIDENCE);
    }

    #[test]
    fn custom_pack_merges_with_builtin() {
        let mut packs = CanonicalPacks::builtin();
        let mut extra = CanonicalPack::new("telecom");
        extra.insert("RAM", "Radio Access Module");
        packs.add(extra);
        assert_eq!(packs.lookup("RAM").len(), 2);
        assert!(packs.pack_names().any(|n| n == "telecom"));
    }

    #[test]
    fn unknown_acronym_is_empty() {
        assert!(CanonicalPacks::builtin().lookup("XYZZY").is_empty());
    }

    #[test]
    fn pack_loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pack.json");
        std::fs::write(&path, r#"{"ESA": ["European Space Agency"]}"#).unwrap();
        let pack = CanonicalPack::from_json_file("space", &path).unwrap();
        assert_eq!(pack.entries["ESA"], vec!["European Space Agency".to_string()]);
    }
}
