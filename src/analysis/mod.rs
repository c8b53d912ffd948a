//! Scoring: weighted aggregation and risk classification.

pub mod aggregator;
pub mod classifier;

pub use aggregator::{aggregate, ScoringWeights};
pub use classifier::classify;
