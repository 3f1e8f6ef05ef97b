// src/core/mod.rs
pub mod context;
pub mod definer;
pub mod detector;
pub mod engine;
pub mod packs;
pub mod ranker;
pub mod types;
