// src/web/mod.rs
//! Web Lookup Orchestrator: fans one query out to every enabled provider,
//! each under its own timeout, and keeps whatever arrives before the
//! per-acronym deadline.

pub mod http;
pub mod providers;

use crate::core::context::Keywords;
use crate::core::definer::initials_alignment;
use crate::core::types::{Candidate, SourceKind};
use crate::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::error::ProviderError;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

pub use self::http::{HttpFetcher, DEFAULT_USER_AGENT};
pub use self::providers::{BingProvider, DuckDuckGoProvider, WikipediaProvider, WiktionaryProvider};

/// What a provider is asked. Never contains document text beyond a few keywords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupQuery {
    pub acronym: String,
    pub keywords: Vec<String>,
}

impl LookupQuery {
    pub fn new(acronym: &str, keywords: &Keywords, max_keywords: usize) -> Self {
        Self { acronym: acronym.to_string(), keywords: keywords.top(max_keywords).to_vec() }
    }

    /// `ACR kw1 kw2`
    pub fn text(&self) -> String {
        std::iter::once(self.acronym.as_str())
            .chain(self.keywords.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn primary_keyword(&self) -> Option<&str> {
        self.keywords.first().map(String::as_str)
    }
}

/// One external source of definitions.
#[async_trait]
pub trait LookupProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> SourceKind;

    /// Keyed providers return false when no credential is configured; they
    /// are then skipped rather than attempted.
    fn is_available(&self) -> bool {
        true
    }

    async fn attempt_lookup(&self, query: &LookupQuery) -> Result<Vec<Candidate>, ProviderError>;
}

/// The normalized result of one provider attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome {
    Found(Vec<Candidate>),
    Empty,
    Failed(ProviderError),
}

impl From<Result<Vec<Candidate>, ProviderError>> for ProviderOutcome {
    fn from(result: Result<Vec<Candidate>, ProviderError>) -> Self {
        match result {
            Ok(candidates) if candidates.is_empty() => ProviderOutcome::Empty,
            Ok(candidates) => ProviderOutcome::Found(candidates),
            Err(e) => ProviderOutcome::Failed(e),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebEndpoints {
    pub wikipedia_api: String,
    pub wikipedia_rest: String,
    pub duckduckgo: String,
    pub wiktionary: String,
    pub bing: String,
}

impl Default for WebEndpoints {
    fn default() -> Self {
        Self {
            wikipedia_api: "https://en.wikipedia.org/w/api.php".to_string(),
            wikipedia_rest: "https://en.wikipedia.org/api/rest_v1".to_string(),
            duckduckgo: "https://api.duckduckgo.com/".to_string(),
            wiktionary: "https://en.wiktionary.org/w/api.php".to_string(),
            bing: "https://api.bing.microsoft.com/v7.0/search".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub enabled: bool,
    /// Providers to query. Non-web kinds are ignored.
    pub providers: Vec<SourceKind>,
    pub provider_timeout_ms: u64,
    pub deadline_ms: u64,
    pub retries: u32,
    /// Per provider.
    pub max_candidates: usize,
    pub query_keywords: usize,
    pub confidence_cap: f64,
    pub user_agent: String,
    pub endpoints: WebEndpoints,
    pub bing_key: Option<String>,
    pub cache_ttl_secs: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            providers: vec![SourceKind::Bing, SourceKind::Wikipedia, SourceKind::Duckduckgo, SourceKind::Wiktionary],
            provider_timeout_ms: 4000,
            deadline_ms: 8000,
            retries: 3,
            max_candidates: 5,
            query_keywords: 2,
            confidence_cap: 0.6,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            endpoints: WebEndpoints::default(),
            bing_key: None,
            cache_ttl_secs: 3600,
        }
    }
}

impl WebConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

type CacheKey = (&'static str, String);

/// Successful outcomes per (provider, query). Failures are never stored.
struct ResultCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, (Instant, Vec<Candidate>)>>,
}

impl ResultCache {
    fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()) }
    }

    async fn get(&self, key: &CacheKey) -> Option<Vec<Candidate>> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .map(|(_, candidates)| candidates.clone())
    }

    async fn put(&self, key: CacheKey, candidates: Vec<Candidate>) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.write().await;
        entries.retain(|_, (stored, _)| stored.elapsed() < self.ttl);
        entries.insert(key, (Instant::now(), candidates));
    }
}

pub struct WebLookup {
    providers: Vec<Arc<dyn LookupProvider>>,
    provider_timeout: Duration,
    deadline: Duration,
    query_keywords: usize,
    max_candidates: usize,
    confidence_cap: f64,
    cache: ResultCache,
}

impl WebLookup {
    /// Builds the configured HTTP providers in configured order.
    pub fn from_config(config: &WebConfig) -> Result<Self, ProviderError> {
        if !config.enabled {
            return Ok(Self::with_providers(Vec::new(), config));
        }
        let fetcher = HttpFetcher::new(&config.user_agent, config.provider_timeout(), config.retries)?;
        let endpoints = &config.endpoints;
        let mut providers: Vec<Arc<dyn LookupProvider>> = Vec::new();
        for kind in &config.providers {
            match kind {
                SourceKind::Wikipedia => providers.push(Arc::new(WikipediaProvider::new(
                    fetcher.clone(),
                    &endpoints.wikipedia_api,
                    &endpoints.wikipedia_rest,
                ))),
                SourceKind::Duckduckgo => {
                    providers.push(Arc::new(DuckDuckGoProvider::new(fetcher.clone(), &endpoints.duckduckgo)))
                }
                SourceKind::Wiktionary => {
                    providers.push(Arc::new(WiktionaryProvider::new(fetcher.clone(), &endpoints.wiktionary)))
                }
                SourceKind::Bing => providers.push(Arc::new(BingProvider::new(
                    fetcher.clone(),
                    &endpoints.bing,
                    config.bing_key.clone(),
                    config.max_candidates,
                ))),
                other => debug!(kind = %other, "not a web provider, ignored"),
            }
        }
        Ok(Self::with_providers(providers, config))
    }

    pub fn with_providers(providers: Vec<Arc<dyn LookupProvider>>, config: &WebConfig) -> Self {
        Self {
            providers,
            provider_timeout: config.provider_timeout(),
            deadline: config.deadline(),
            query_keywords: config.query_keywords,
            max_candidates: config.max_candidates.max(1),
            confidence_cap: config.confidence_cap,
            cache: ResultCache::new(Duration::from_secs(config.cache_ttl_secs)),
        }
    }

    pub fn disabled() -> Self {
        Self::with_providers(Vec::new(), &WebConfig::default())
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Candidates from every provider that answered in time. Never fails.
    #[instrument(skip(self, keywords, diagnostics), fields(providers = self.providers.len()))]
    pub async fn lookup(&self, acronym: &str, keywords: &Keywords, diagnostics: &Diagnostics) -> Vec<Candidate> {
        if self.providers.is_empty() {
            return Vec::new();
        }
        let query = LookupQuery::new(acronym, keywords, self.query_keywords);
        let query_text = query.text().to_lowercase();
        let deadline = tokio::time::Instant::now() + self.deadline;
        let event_for = |provider: &str| (acronym.to_string(), provider.to_string());

        let mut collected = Vec::new();
        let mut in_flight = Vec::new();
        let mut pending = FuturesUnordered::new();

        for provider in &self.providers {
            let name = provider.name();
            if !provider.is_available() {
                let (acronym, provider) = event_for(name);
                diagnostics.record(DiagnosticEvent::ProviderSkipped { acronym, provider });
                continue;
            }
            let key: CacheKey = (name, query_text.clone());
            if let Some(cached) = self.cache.get(&key).await {
                let (acronym, provider) = event_for(name);
                diagnostics.record(DiagnosticEvent::CacheHit { acronym, provider });
                collected.extend(self.calibrate(&query, keywords, cached));
                continue;
            }

            let (acronym, provider_name) = event_for(name);
            diagnostics.record(DiagnosticEvent::ProviderAttempt { acronym, provider: provider_name });
            in_flight.push(name);
            let query = &query;
            let timeout = self.provider_timeout;
            let kind = provider.kind();
            pending.push(async move {
                let outcome = match tokio::time::timeout(timeout, provider.attempt_lookup(query)).await {
                    Ok(result) => ProviderOutcome::from(result),
                    Err(_) => ProviderOutcome::Failed(ProviderError::Timeout(timeout)),
                };
                (name, kind, outcome)
            });
        }

        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((name, kind, outcome))) => {
                    if let Some(pos) = in_flight.iter().position(|n| *n == name) {
                        in_flight.remove(pos);
                    }
                    let (acronym, provider) = event_for(name);
                    match outcome {
                        ProviderOutcome::Found(candidates) => {
                            let candidates = tag_with(kind, candidates);
                            diagnostics.record(DiagnosticEvent::ProviderFound {
                                acronym,
                                provider,
                                candidates: candidates.len(),
                            });
                            self.cache.put((name, query_text.clone()), candidates.clone()).await;
                            collected.extend(self.calibrate(&query, keywords, candidates));
                        }
                        ProviderOutcome::Empty => {
                            diagnostics.record(DiagnosticEvent::ProviderEmpty { acronym, provider });
                            self.cache.put((name, query_text.clone()), Vec::new()).await;
                        }
                        ProviderOutcome::Failed(err) => {
                            diagnostics.record(DiagnosticEvent::ProviderFailed {
                                acronym,
                                provider,
                                kind: err.kind(),
                                detail: err.to_string(),
                            });
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    for name in in_flight.drain(..) {
                        let (acronym, provider) = event_for(name);
                        diagnostics.record(DiagnosticEvent::ProviderAbandoned { acronym, provider });
                    }
                    break;
                }
            }
        }
        collected
    }

    /// Caps each provider's list and rescales its confidences into the web tier.
    fn calibrate(&self, query: &LookupQuery, keywords: &Keywords, candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates
            .into_iter()
            .take(self.max_candidates)
            .map(|mut candidate| {
                let heuristic = web_heuristic(&query.acronym, &candidate.definition, keywords);
                candidate.confidence = candidate.confidence.max(heuristic).min(self.confidence_cap).clamp(0.0, 1.0);
                candidate
            })
            .collect()
    }
}

/// A provider's candidates count as evidence of its kind only.
fn tag_with(kind: SourceKind, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    for candidate in &mut candidates {
        if candidate.sources.len() != 1 || !candidate.has_source(kind) {
            debug!(definition = %candidate.definition, %kind, "retagging provider candidate");
            candidate.sources = BTreeSet::from([kind]);
        }
    }
    candidates
}

/// Rewards a definition whose initials spell the acronym and that shares
/// words with the document.
fn web_heuristic(acronym: &str, definition: &str, keywords: &Keywords) -> f64 {
    let align = initials_alignment(acronym, definition);
    let bonus = 0.04 * keywords.overlap(definition) as f64;
    (0.5 + 0.3 * align + bonus).clamp(0.1, 0.9)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        name: &'static str,
        kind: SourceKind,
        /// Source the fake stamps on its candidates.
        emits: SourceKind,
        answer: Result<Vec<&'static str>, ProviderError>,
        delay: Duration,
        calls: AtomicUsize,
        available: bool,
    }

    impl Fixed {
        fn new(name: &'static str, kind: SourceKind, answer: Result<Vec<&'static str>, ProviderError>) -> Self {
            Self {
                name,
                kind,
                emits: kind,
                answer,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                available: true,
            }
        }
    }

    #[async_trait]
    impl LookupProvider for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn attempt_lookup(&self, _query: &LookupQuery) -> Result<Vec<Candidate>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.answer.clone().map(|defs| {
                defs.into_iter().filter_map(|d| Candidate::new(d, self.emits, 0.5)).collect()
            })
        }
    }

    fn config(timeout_ms: u64, deadline_ms: u64) -> WebConfig {
        WebConfig { provider_timeout_ms: timeout_ms, deadline_ms, ..WebConfig::default() }
    }

    #[test]
    fn query_uses_top_keywords_only() {
        let keywords = Keywords::new(["memory", "cache", "processor"]);
        let query = LookupQuery::new("RAM", &keywords, 2);
        assert_eq!(query.text(), "RAM memory cache");
        assert_eq!(query.primary_keyword(), Some("memory"));
    }

    #[test]
    fn heuristic_is_capped_into_web_tier() {
        let web = WebLookup::disabled();
        let query = LookupQuery::new("RAM", &Keywords::default(), 2);
        let out = web.calibrate(
            &query,
            &Keywords::default(),
            vec![Candidate::new("Random Access Memory", SourceKind::Wikipedia, 0.45).unwrap()],
        );
        assert_eq!(out[0].confidence, 0.6);
    }

    #[tokio::test]
    async fn failures_are_isolated_and_recorded() {
        let providers: Vec<Arc<dyn LookupProvider>> = vec![
            Arc::new(Fixed::new("good", SourceKind::Wikipedia, Ok(vec!["Random Access Memory"]))),
            Arc::new(Fixed::new("bad", SourceKind::Duckduckgo, Err(ProviderError::Malformed("eof".into())))),
        ];
        let web = WebLookup::with_providers(providers, &config(1000, 2000));
        let diag = Diagnostics::new(true);

        let found = web.lookup("RAM", &Keywords::default(), &diag).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].definition, "Random Access Memory");
        assert!(diag.events().iter().any(|e| matches!(
            e,
            DiagnosticEvent::ProviderFailed { kind: crate::error::FailureKind::ProviderMalformedResponse, .. }
        )));
    }

    #[tokio::test]
    async fn candidates_carry_their_provider_kind() {
        let mut mislabelled = Fixed::new("dict", SourceKind::Wiktionary, Ok(vec!["Random Access Memory"]));
        mislabelled.emits = SourceKind::Document;
        let web = WebLookup::with_providers(vec![Arc::new(mislabelled)], &config(1000, 2000));

        let found = web.lookup("RAM", &Keywords::default(), &Diagnostics::disabled()).await;
        assert_eq!(found.len(), 1);
        assert!(found[0].has_source(SourceKind::Wiktionary));
        assert!(!found[0].has_source(SourceKind::Document));
    }

    #[tokio::test]
    async fn slow_provider_times_out_without_blocking_others() {
        let mut slow = Fixed::new("slow", SourceKind::Wiktionary, Ok(vec!["Too Late"]));
        slow.delay = Duration::from_secs(30);
        let providers: Vec<Arc<dyn LookupProvider>> = vec![
            Arc::new(slow),
            Arc::new(Fixed::new("fast", SourceKind::Wikipedia, Ok(vec!["Random Access Memory"]))),
        ];
        let web = WebLookup::with_providers(providers, &config(100, 5000));
        let diag = Diagnostics::new(true);

        let started = Instant::now();
        let found = web.lookup("RAM", &Keywords::default(), &diag).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(found.len(), 1);
        assert!(diag.events().iter().any(|e| matches!(
            e,
            DiagnosticEvent::ProviderFailed { kind: crate::error::FailureKind::ProviderTimeout, .. }
        )));
    }

    #[tokio::test]
    async fn deadline_abandons_pending_providers() {
        let mut slow = Fixed::new("slow", SourceKind::Wiktionary, Ok(vec!["Too Late"]));
        slow.delay = Duration::from_secs(30);
        let web = WebLookup::with_providers(vec![Arc::new(slow)], &config(10_000, 50));
        let diag = Diagnostics::new(true);

        assert!(web.lookup("RAM", &Keywords::default(), &diag).await.is_empty());
        assert!(diag.events().iter().any(|e| matches!(e, DiagnosticEvent::ProviderAbandoned { .. })));
    }

    #[tokio::test]
    async fn unavailable_provider_is_skipped_not_attempted() {
        let mut keyed = Fixed::new("bing", SourceKind::Bing, Ok(vec!["Should Not Appear"]));
        keyed.available = false;
        let keyed = Arc::new(keyed);
        let web = WebLookup::with_providers(vec![keyed.clone()], &config(100, 200));
        let diag = Diagnostics::new(true);

        assert!(web.lookup("RAM", &Keywords::default(), &diag).await.is_empty());
        assert_eq!(keyed.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            diag.events(),
            vec![DiagnosticEvent::ProviderSkipped { acronym: "RAM".into(), provider: "bing".into() }]
        );
    }

    #[tokio::test]
    async fn successful_results_are_cached_failures_are_not() {
        let good = Arc::new(Fixed::new("good", SourceKind::Wikipedia, Ok(vec!["Random Access Memory"])));
        let bad = Arc::new(Fixed::new("bad", SourceKind::Duckduckgo, Err(ProviderError::Status(503))));
        let providers: Vec<Arc<dyn LookupProvider>> = vec![good.clone(), bad.clone()];
        let web = WebLookup::with_providers(providers, &config(1000, 2000));
        let diag = Diagnostics::disabled();

        web.lookup("RAM", &Keywords::default(), &diag).await;
        let again = web.lookup("RAM", &Keywords::default(), &diag).await;
        assert_eq!(again.len(), 1);
        assert_eq!(good.calls.load(Ordering::SeqCst), 1);
        assert_eq!(bad.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_ttl_disables_cache() {
        let good = Arc::new(Fixed::new("good", SourceKind::Wikipedia, Ok(vec!["Random Access Memory"])));
        let web = WebLookup::with_providers(vec![good.clone()], &WebConfig { cache_ttl_secs: 0, ..config(1000, 2000) });
        let diag = Diagnostics::disabled();
        web.lookup("RAM", &Keywords::default(), &diag).await;
        web.lookup("RAM", &Keywords::default(), &diag).await;
        assert_eq!(good.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn disabled_config_builds_no_providers() {
        let web = WebLookup::from_config(&WebConfig { enabled: false, ..WebConfig::default() }).unwrap();
        assert!(web.provider_names().is_empty());
    }

    #[test]
    fn config_order_is_provider_order() {
        let web = WebLookup::from_config(&WebConfig::default()).unwrap();
        assert_eq!(web.provider_names(), ["bing", "wikipedia", "duckduckgo", "wiktionary"]);
    }
}
