// src/diagnostics.rs
//! Opt-in record of provider attempts, failures and ranking decisions.
//! Recording never changes what gets ranked, only what can be inspected.

use crate::core::types::SourceKind;
use crate::error::FailureKind;
use serde::Serialize;
use std::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum DiagnosticEvent {
    ProviderAttempt { acronym: String, provider: String },
    ProviderFound { acronym: String, provider: String, candidates: usize },
    ProviderEmpty { acronym: String, provider: String },
    ProviderFailed { acronym: String, provider: String, kind: FailureKind, detail: String },
    /// Keyed provider without a credential; not an attempt and not a failure.
    ProviderSkipped { acronym: String, provider: String },
    /// Still running when the per-acronym deadline passed.
    ProviderAbandoned { acronym: String, provider: String },
    CacheHit { acronym: String, provider: String },
    StoreUnavailable { operation: String, detail: String },
    Ranked { acronym: String, top: String, top_sources: Vec<SourceKind>, candidates: usize },
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    enabled: bool,
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl Diagnostics {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, events: Mutex::new(Vec::new()) }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&self, event: DiagnosticEvent) {
        if !self.enabled {
            debug!(?event, "diagnostic");
            return;
        }
        match &event {
            DiagnosticEvent::ProviderFailed { acronym, provider, kind, detail } => {
                warn!(%acronym, %provider, ?kind, %detail, "provider failed");
            }
            DiagnosticEvent::ProviderAbandoned { acronym, provider } => {
                warn!(%acronym, %provider, "provider abandoned at deadline");
            }
            DiagnosticEvent::StoreUnavailable { operation, detail } => {
                warn!(%operation, %detail, "active-learning store unavailable");
            }
            DiagnosticEvent::Ranked { acronym, top, candidates, .. } => {
                info!(%acronym, %top, candidates, "ranked");
            }
            other => debug!(event = ?other, "diagnostic"),
        }
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Takes the recorded events, leaving the log empty.
    pub fn drain(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().map(|mut e| std::mem::take(&mut *e)).unwrap_or_default()
    }
}
