// src/lib.rs

pub mod config;
pub mod core;
pub mod diagnostics;
pub mod error;
pub mod learning;
pub mod persistence;
pub mod web;

pub use crate::config::EngineConfig;
pub use crate::core::context::Keywords;
pub use crate::core::engine::{AcronymEngine, RankedAcronym};
pub use crate::core::types::{Acronym, Candidate, CandidateList, DocumentHints, Occurrence, SourceKind};
pub use crate::diagnostics::{DiagnosticEvent, Diagnostics};
pub use crate::error::{EngineError, ProviderError};
pub use crate::learning::ActiveLearningStore;
