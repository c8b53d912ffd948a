//! Weighted score aggregation.
//!
//! Combines per-tool confidences into one normalized risk probability.
//! Only scored results (successes and neutral errors) count towards the
//! denominator, so a failed tool never drags the probability down.

use crate::models::{AggregatedScore, ContributingFactor, ToolResult};
use crate::tools::{
    CONTENT_ANALYSIS, DOMAIN_ANALYSIS, IMAGE_ANALYSIS, REPUTATION_LOOKUP, TEXT_ANALYSIS,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Weight applied to tools missing from the table.
pub const DEFAULT_FALLBACK_WEIGHT: f64 = 0.10;

/// Per-tool weights with a fallback for unlisted tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub weights: BTreeMap<String, f64>,
    pub fallback: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        let weights = [
            (REPUTATION_LOOKUP, 0.35),
            (DOMAIN_ANALYSIS, 0.25),
            (CONTENT_ANALYSIS, 0.25),
            (TEXT_ANALYSIS, 0.20),
            (IMAGE_ANALYSIS, 0.10),
        ]
        .into_iter()
        .map(|(name, w)| (name.to_string(), w))
        .collect();

        Self {
            weights,
            fallback: DEFAULT_FALLBACK_WEIGHT,
        }
    }
}

impl ScoringWeights {
    /// Default table with `overrides` applied on top.
    pub fn with_overrides(overrides: &BTreeMap<String, f64>, fallback: f64) -> Self {
        let mut weights = Self::default();
        weights
            .weights
            .extend(overrides.iter().map(|(k, v)| (k.clone(), *v)));
        weights.fallback = fallback;
        weights
    }

    /// Weight of a tool. Negative or non-finite weights count as zero.
    pub fn weight_for(&self, tool: &str) -> f64 {
        let w = self.weights.get(tool).copied().unwrap_or(self.fallback);
        if w.is_finite() {
            w.max(0.0)
        } else {
            0.0
        }
    }
}

/// Aggregate results given in execution order.
pub fn aggregate<'a>(
    results: impl IntoIterator<Item = &'a ToolResult>,
    weights: &ScoringWeights,
) -> AggregatedScore {
    let mut score = AggregatedScore::default();

    for result in results {
        if !result.is_scored() {
            continue;
        }
        let weight = weights.weight_for(&result.tool_name);
        let confidence = if result.is_success() {
            result.confidence.min(100)
        } else {
            0
        };

        score.weighted_sum += f64::from(confidence) * weight;
        score.max_possible_weighted_sum += 100.0 * weight;

        if confidence > 0 {
            score.contributing_factors.push(ContributingFactor {
                tool_name: result.tool_name.clone(),
                confidence,
            });
        }
    }

    score.normalized_probability = normalize(score.weighted_sum, score.max_possible_weighted_sum);
    score
}

fn normalize(weighted_sum: f64, max_possible: f64) -> u8 {
    if max_possible <= 0.0 {
        return 0;
    }
    (100.0 * weighted_sum / max_possible).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use serde_json::Value;

    fn ok(name: &str, confidence: u8) -> ToolResult {
        ToolResult::success(name, confidence, Value::Null)
    }

    fn failed(name: &str) -> ToolResult {
        ToolResult::error(name, &ToolError::Upstream("403".to_string()))
    }

    #[test]
    fn test_weighted_scenario_is_moderate() {
        let results = vec![
            ok(REPUTATION_LOOKUP, 90),
            ok(DOMAIN_ANALYSIS, 0),
            ok(CONTENT_ANALYSIS, 10),
        ];
        let score = aggregate(&results, &ScoringWeights::default());

        assert!((score.weighted_sum - 34.0).abs() < 1e-9);
        assert!((score.max_possible_weighted_sum - 85.0).abs() < 1e-9);
        assert_eq!(score.normalized_probability, 40);
        assert_eq!(
            score.contributing_factors,
            vec![
                ContributingFactor {
                    tool_name: REPUTATION_LOOKUP.to_string(),
                    confidence: 90
                },
                ContributingFactor {
                    tool_name: CONTENT_ANALYSIS.to_string(),
                    confidence: 10
                },
            ]
        );
    }

    #[test]
    fn test_all_errors_yield_zero() {
        let results = vec![failed(REPUTATION_LOOKUP), failed(TEXT_ANALYSIS)];
        let score = aggregate(&results, &ScoringWeights::default());
        assert_eq!(score.normalized_probability, 0);
        assert_eq!(score.max_possible_weighted_sum, 0.0);
        assert!(score.contributing_factors.is_empty());
    }

    #[test]
    fn test_empty_results_yield_zero() {
        let score = aggregate(&[], &ScoringWeights::default());
        assert_eq!(score, AggregatedScore::default());
    }

    #[test]
    fn test_all_max_yield_hundred() {
        let results = vec![
            ok(REPUTATION_LOOKUP, 100),
            ok(DOMAIN_ANALYSIS, 100),
            ok(IMAGE_ANALYSIS, 100),
            ok("custom_tool", 100),
        ];
        let score = aggregate(&results, &ScoringWeights::default());
        assert_eq!(score.normalized_probability, 100);
    }

    #[test]
    fn test_skipped_and_errors_are_excluded() {
        let results = vec![
            ok(REPUTATION_LOOKUP, 80),
            failed(DOMAIN_ANALYSIS),
            ToolResult::skipped(IMAGE_ANALYSIS, "dependency failed".to_string()),
        ];
        let score = aggregate(&results, &ScoringWeights::default());
        assert_eq!(score.normalized_probability, 80);
        assert_eq!(score.contributing_factors.len(), 1);
    }

    #[test]
    fn test_neutral_errors_count_as_zero() {
        let results = vec![ok(REPUTATION_LOOKUP, 80), failed(DOMAIN_ANALYSIS).as_neutral()];
        let score = aggregate(&results, &ScoringWeights::default());
        // 80 * 0.35 / (100 * 0.60)
        assert_eq!(score.normalized_probability, 47);
    }

    #[test]
    fn test_overrides_and_fallback() {
        let mut overrides = BTreeMap::new();
        overrides.insert(REPUTATION_LOOKUP.to_string(), 1.0);
        overrides.insert(DOMAIN_ANALYSIS.to_string(), -3.0);
        let weights = ScoringWeights::with_overrides(&overrides, 0.5);

        assert_eq!(weights.weight_for(REPUTATION_LOOKUP), 1.0);
        assert_eq!(weights.weight_for(DOMAIN_ANALYSIS), 0.0);
        assert_eq!(weights.weight_for(TEXT_ANALYSIS), 0.20);
        assert_eq!(weights.weight_for("unknown"), 0.5);
    }

    #[test]
    fn test_zero_weight_only_yields_zero() {
        let mut overrides = BTreeMap::new();
        overrides.insert(DOMAIN_ANALYSIS.to_string(), 0.0);
        let weights = ScoringWeights::with_overrides(&overrides, DEFAULT_FALLBACK_WEIGHT);
        let results = vec![ok(DOMAIN_ANALYSIS, 70)];
        let score = aggregate(&results, &weights);
        assert_eq!(score.normalized_probability, 0);
        // Still a contributing factor: it reported risk, it just carries no weight.
        assert_eq!(score.contributing_factors.len(), 1);
    }
}
