//! Per-instrument matching engines

mod engine;

pub use engine::{MatchingConfig, OrderMatchingEngine};
