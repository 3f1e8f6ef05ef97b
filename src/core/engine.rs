// src/core/engine.rs
use crate::config::EngineConfig;
use crate::core::context::{ContextExtractor, ContextWindow, Keywords};
use crate::core::definer::DocumentDefiner;
use crate::core::detector::AcronymDetector;
use crate::core::packs::CanonicalPacks;
use crate::core::ranker::CandidateRanker;
use crate::core::types::{Acronym, Candidate, CandidateList, DocumentHints};
use crate::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::error::{EngineError, Result, StoreError, StoreResult};
use crate::learning::{ActiveLearningStore, Confirmation};
use crate::web::WebLookup;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{instrument, warn};

/// One acronym of a document with its ranked candidates.
#[derive(Debug, Clone, Serialize)]
pub struct RankedAcronym {
    pub acronym: Acronym,
    pub fingerprint: Option<String>,
    pub candidates: CandidateList,
}

/// Detection, lookup and ranking for one engine configuration. The
/// active-learning store is injected and outlives any single request.
pub struct AcronymEngine {
    detector: AcronymDetector,
    context: ContextExtractor,
    definer: DocumentDefiner,
    packs: CanonicalPacks,
    ranker: CandidateRanker,
    web: WebLookup,
    store: Arc<ActiveLearningStore>,
    diagnostics: Arc<Diagnostics>,
    limiter: Arc<Semaphore>,
    store_timeout: Duration,
    fingerprint_size: usize,
    max_acronym_len: usize,
}

impl AcronymEngine {
    pub fn new(config: &EngineConfig, store: Arc<ActiveLearningStore>) -> Result<Self> {
        let web = WebLookup::from_config(&config.web).map_err(|e| EngineError::Setup(e.to_string()))?;
        Ok(Self {
            detector: AcronymDetector::new(&config.detector),
            context: ContextExtractor::new(&config.context),
            definer: DocumentDefiner::new(&config.definer),
            packs: CanonicalPacks::builtin(),
            ranker: CandidateRanker::new(config.ranking.clone()),
            web,
            store,
            diagnostics: Arc::new(Diagnostics::new(config.diagnostics)),
            limiter: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            store_timeout: config.store.timeout(),
            fingerprint_size: config.context.fingerprint_size,
            max_acronym_len: config.detector.max_len,
        })
    }

    /// Opens the configured store (in memory when no path is set) and builds
    /// the engine around it. A store that cannot be opened is replaced by an
    /// empty in-memory one and reported through diagnostics.
    pub async fn open(config: &EngineConfig) -> Result<Self> {
        let store = match &config.store.path {
            Some(path) => match ActiveLearningStore::open(path).await {
                Ok(store) => Some(store.with_write_timeout(config.store.timeout())),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "store unavailable, continuing in memory");
                    None
                }
            },
            None => Some(ActiveLearningStore::in_memory()),
        };
        let opened = store.is_some();
        let engine = Self::new(config, Arc::new(store.unwrap_or_else(ActiveLearningStore::in_memory)))?;
        if !opened {
            engine.report_store("open", "could not open store file, using memory");
        }
        for issue in engine.store.take_load_issues() {
            engine.report_store("load", &issue);
        }
        Ok(engine)
    }

    pub fn with_web(mut self, web: WebLookup) -> Self {
        self.web = web;
        self
    }

    pub fn with_packs(mut self, packs: CanonicalPacks) -> Self {
        self.packs = packs;
        self
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn store(&self) -> &Arc<ActiveLearningStore> {
        &self.store
    }

    pub fn extract(&self, text: &str) -> Vec<Acronym> {
        self.detector.detect(text)
    }

    pub fn document_keywords(&self, text: &str) -> Keywords {
        self.context.keywords(text)
    }

    pub fn fingerprint(&self, keywords: &Keywords) -> Option<String> {
        keywords.fingerprint(self.fingerprint_size)
    }

    pub fn context_windows(&self, acronym: &Acronym, text: &str) -> Vec<ContextWindow> {
        self.context.windows(text, &self.locate(acronym, text).occurrences)
    }

    /// The acronym with its occurrences found afresh in `text`; offsets
    /// carried over from another document are never trusted.
    fn locate(&self, acronym: &Acronym, text: &str) -> Acronym {
        self.detector
            .detect(text)
            .into_iter()
            .find(|found| found.text == acronym.text)
            .unwrap_or_else(|| Acronym::new(acronym.text.clone()))
    }

    fn report_store(&self, operation: &str, detail: &str) {
        self.diagnostics.record(DiagnosticEvent::StoreUnavailable {
            operation: operation.to_string(),
            detail: detail.to_string(),
        });
    }

    fn validate(&self, acronym: &Acronym) -> Result<()> {
        let text = acronym.text.as_str();
        let bad = text.trim().is_empty()
            || text.chars().any(char::is_whitespace)
            || text.chars().count() > self.max_acronym_len.max(2);
        if bad {
            return Err(EngineError::InvalidAcronym(text.to_string()));
        }
        Ok(())
    }

    /// Ranked candidates for one acronym. Never empty; provider and store
    /// failures only show up in diagnostics. `text` need not be the text the
    /// acronym was extracted from.
    pub async fn rank(&self, acronym: &Acronym, text: &str, keywords: &Keywords) -> Result<CandidateList> {
        let located = self.locate(acronym, text);
        self.rank_with(&located, text, keywords, Vec::new()).await
    }

    #[instrument(skip(self, acronym, text, keywords, extra), fields(acronym = %acronym.text))]
    async fn rank_with(
        &self,
        acronym: &Acronym,
        text: &str,
        keywords: &Keywords,
        extra: Vec<Candidate>,
    ) -> Result<CandidateList> {
        self.validate(acronym)?;
        let mut candidates = extra;
        candidates.extend(self.definer.define(acronym, text));
        candidates.extend(self.packs.lookup(&acronym.text));

        let fingerprint = self.fingerprint(keywords);
        match tokio::time::timeout(self.store_timeout, self.store.lookup(&acronym.text, fingerprint.as_deref())).await
        {
            Ok(Ok(Some(confirmed))) => candidates.push(confirmed),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => self.report_store("lookup", &e.to_string()),
            Err(_) => self.report_store("lookup", &StoreError::Timeout(self.store_timeout).to_string()),
        }

        candidates.extend(self.web.lookup(&acronym.text, keywords, &self.diagnostics).await);

        let list = self.ranker.rank(&acronym.text, candidates, keywords);
        let top = list.top();
        self.diagnostics.record(DiagnosticEvent::Ranked {
            acronym: acronym.text.clone(),
            top: top.definition.clone(),
            top_sources: top.sources.iter().copied().collect(),
            candidates: list.len(),
        });
        Ok(list)
    }

    /// Detects every acronym, including those only named in glossary tables,
    /// and ranks them with at most `max_in_flight` passes running at once.
    /// Results keep first-occurrence order; glossary-only acronyms come last.
    pub async fn rank_document(&self, text: &str, hints: &DocumentHints) -> Vec<RankedAcronym> {
        let mut acronyms = self.extract(text);
        let mut glossary: HashMap<String, Vec<Candidate>> = HashMap::new();
        for (acronym, candidate) in self.definer.glossary(&self.detector, hints) {
            if !acronyms.iter().any(|a| a.text == acronym) {
                acronyms.push(Acronym::new(acronym.clone()));
            }
            glossary.entry(acronym).or_default().push(candidate);
        }

        let keywords = self.document_keywords(text);
        let fingerprint = self.fingerprint(&keywords);

        let passes = acronyms.into_iter().map(|acronym| {
            let extra = glossary.remove(&acronym.text).unwrap_or_default();
            let keywords = &keywords;
            async move {
                let _permit = self.limiter.acquire().await.ok();
                let ranked = self.rank_with(&acronym, text, keywords, extra).await;
                (acronym, ranked)
            }
        });
        let passes: Vec<_> = passes.collect();

        join_all(passes)
            .await
            .into_iter()
            .filter_map(|(acronym, ranked)| match ranked {
                Ok(candidates) => Some(RankedAcronym { acronym, fingerprint: fingerprint.clone(), candidates }),
                Err(e) => {
                    warn!(error = %e, "skipping acronym");
                    None
                }
            })
            .collect()
    }

    /// Records the user's pick. Returns false when the write was dropped, in
    /// which case nothing was stored; the reason is in diagnostics. The store
    /// bounds its own wait so a half-written confirmation is never abandoned.
    pub async fn confirm_selection(&self, acronym: &str, fingerprint: Option<&str>, definition: &str) -> bool {
        let confirmation = Confirmation {
            acronym: acronym.to_string(),
            fingerprint: fingerprint.map(str::to_string),
            definition: definition.to_string(),
        };
        match self.store.confirm(&confirmation).await {
            Ok(_) => true,
            Err(e) => {
                self.report_store("confirm", &e.to_string());
                false
            }
        }
    }

    pub async fn flush(&self) -> StoreResult<()> {
        self.store.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SourceKind;

    fn offline_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.web.enabled = false;
        config.diagnostics = true;
        config
    }

    fn engine() -> AcronymEngine {
        AcronymEngine::new(&offline_config(), Arc::new(ActiveLearningStore::in_memory())).unwrap()
    }

    #[tokio::test]
    async fn invalid_acronyms_are_rejected() {
        let engine = engine();
        for bad in ["", "   ", "TWO WORDS", "ABCDEFGHIJKLMNOP"] {
            let err = engine.rank(&Acronym::new(bad), "", &Keywords::default()).await.unwrap_err();
            assert_eq!(err, EngineError::InvalidAcronym(bad.to_string()));
        }
    }

    #[tokio::test]
    async fn ranking_is_recorded_in_diagnostics() {
        let engine = engine();
        let list = engine.rank(&Acronym::new("HTTP"), "", &Keywords::default()).await.unwrap();
        assert_eq!(list.top().definition, "HyperText Transfer Protocol");
        assert!(engine.diagnostics().events().iter().any(|e| matches!(
            e,
            DiagnosticEvent::Ranked { top_sources, .. } if top_sources == &vec![SourceKind::Canonical]
        )));
    }

    #[tokio::test]
    async fn closed_store_degrades_to_no_record() {
        let engine = engine();
        assert!(engine.confirm_selection("RAM", None, "Radio Access Module").await);
        engine.store().close().await.unwrap();

        let list = engine.rank(&Acronym::new("RAM"), "", &Keywords::default()).await.unwrap();
        assert_eq!(list.top().definition, "Random Access Memory");
        assert!(!engine.confirm_selection("RAM", None, "Radio Access Module").await);
        let store_events = engine
            .diagnostics()
            .events()
            .into_iter()
            .filter(|e| matches!(e, DiagnosticEvent::StoreUnavailable { .. }))
            .count();
        assert_eq!(store_events, 2);
    }

    #[tokio::test]
    async fn occurrences_are_found_in_the_ranked_text() {
        let engine = engine();
        let old = engine.extract("ab HTTP was confirmed earlier.").remove(0);
        assert_eq!(old.occurrences[0].start, 3);

        let text = "ééééé HTTP requests use the HyperText Transfer Protocol (HTTP).";
        let list = engine.rank(&old, text, &Keywords::default()).await.unwrap();
        assert_eq!(list.top().definition, "HyperText Transfer Protocol");
        assert!(list.top().has_source(SourceKind::Document));
        assert_eq!(engine.context_windows(&old, text).len(), 2);
    }

    #[tokio::test]
    async fn store_timeouts_degrade_without_changing_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            ActiveLearningStore::open(dir.path().join("learned.bin"))
                .await
                .unwrap()
                .with_write_timeout(Duration::from_millis(50)),
        );
        let mut config = offline_config();
        config.store.timeout_ms = 50;
        let engine = AcronymEngine::new(&config, Arc::clone(&store)).unwrap();
        let ram = Acronym::new("RAM");
        let store_events = |engine: &AcronymEngine, operation: &str| {
            engine
                .diagnostics()
                .events()
                .into_iter()
                .filter(|e| matches!(e, DiagnosticEvent::StoreUnavailable { operation: op, .. } if op == operation))
                .count()
        };

        let journal = store.hold_journal().await;
        assert!(!engine.confirm_selection("RAM", None, "Radio Access Module").await);
        assert_eq!(store_events(&engine, "confirm"), 1);
        let list = engine.rank(&ram, "", &Keywords::default()).await.unwrap();
        assert_eq!(list.top().definition, "Random Access Memory");
        assert!(!list.iter().any(|c| c.has_source(SourceKind::ActiveLearning)));
        drop(journal);

        assert!(engine.confirm_selection("RAM", None, "Radio Access Module").await);
        let shard = store.hold_shard("RAM", None).await;
        let list = engine.rank(&ram, "", &Keywords::default()).await.unwrap();
        assert_eq!(list.top().definition, "Random Access Memory");
        assert_eq!(store_events(&engine, "lookup"), 1);
        drop(shard);

        let list = engine.rank(&ram, "", &Keywords::default()).await.unwrap();
        assert_eq!(list.top().definition, "Radio Access Module");
        assert!(list.top().has_source(SourceKind::ActiveLearning));
    }

    #[tokio::test]
    async fn glossary_only_acronyms_are_ranked_last() {
        let engine = engine();
        let hints = DocumentHints {
            tables: vec![vec![
                vec!["Acronym".to_string(), "Meaning".to_string()],
                vec!["TRL".to_string(), "Technology Readiness Level".to_string()],
            ]],
        };
        let ranked = engine.rank_document("The CPU was upgraded.", &hints).await;
        let names: Vec<_> = ranked.iter().map(|r| r.acronym.text.as_str()).collect();
        assert_eq!(names, ["CPU", "TRL"]);
        let trl = &ranked[1].candidates;
        assert_eq!(trl.top().definition, "Technology Readiness Level");
        assert!(trl.top().has_source(SourceKind::Document));
    }

    #[tokio::test]
    async fn unopenable_store_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let mut config = offline_config();
        config.store.path = Some(blocker.join("learned.bin"));

        let engine = AcronymEngine::open(&config).await.unwrap();
        assert!(engine.store().path().is_none());
        assert!(engine.confirm_selection("RAM", None, "Random Access Memory").await);
        assert!(engine
            .diagnostics()
            .events()
            .iter()
            .any(|e| matches!(e, DiagnosticEvent::StoreUnavailable { operation, .. } if operation == "open")));
    }
}
