// src/config.rs
use crate::core::context::ContextConfig;
use crate::core::definer::DefinerConfig;
use crate::core::detector::DetectorConfig;
use crate::core::ranker::ScoringPolicy;
use crate::error::ConfigError;
use crate::web::WebConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Top-level engine configuration. Every section falls back to its defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub detector: DetectorConfig,
    pub context: ContextConfig,
    pub definer: DefinerConfig,
    pub ranking: ScoringPolicy,
    pub web: WebConfig,
    pub store: StoreConfig,
    /// Acronyms ranked concurrently by `rank_document`.
    pub max_in_flight: usize,
    pub diagnostics: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Snapshot file. The store lives in memory only when unset.
    pub path: Option<PathBuf>,
    pub timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            context: ContextConfig::default(),
            definer: DefinerConfig::default(),
            ranking: ScoringPolicy::default(),
            web: WebConfig::default(),
            store: StoreConfig::default(),
            max_in_flight: 4,
            diagnostics: false,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: None, timeout_ms: 500 }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Reads `path` if given, then applies environment overrides.
    /// A missing or unparseable file yields defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let config = match path {
            Some(path) => match Self::from_file(path) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Failed to load config at {}: {e}, using defaults", path.display());
                    Self::default()
                }
            },
            None => {
                debug!("No config file given, using defaults");
                Self::default()
            }
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// `BING_SUBSCRIPTION_KEY`, `BING_ENDPOINT`, `WEB_MAX_CANDIDATES` and
    /// `ACRONYM_DIAGNOSTICS`. Unparseable values are ignored.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("BING_SUBSCRIPTION_KEY").filter(|k| !k.trim().is_empty()) {
            self.web.bing_key = Some(key);
        }
        if let Some(endpoint) = lookup("BING_ENDPOINT").filter(|e| !e.trim().is_empty()) {
            self.web.endpoints.bing = endpoint;
        }
        match lookup("WEB_MAX_CANDIDATES").map(|v| v.trim().parse::<usize>()) {
            Some(Ok(n)) if n > 0 => self.web.max_candidates = n,
            Some(_) => warn!("Ignoring invalid WEB_MAX_CANDIDATES"),
            None => {}
        }
        if let Some(flag) = lookup("ACRONYM_DIAGNOSTICS") {
            self.diagnostics = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        self
    }
}
