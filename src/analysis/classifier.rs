//! Maps a risk probability onto a discrete [`RiskLevel`].

use crate::models::RiskLevel;

/// Lower bounds of each level, ascending. Upper bounds are exclusive except
/// for the last level.
const THRESHOLDS: [(u8, RiskLevel); 5] = [
    (0, RiskLevel::Minimal),
    (20, RiskLevel::Low),
    (40, RiskLevel::Moderate),
    (60, RiskLevel::High),
    (80, RiskLevel::Extreme),
];

pub fn classify(probability: u8) -> RiskLevel {
    let probability = probability.min(100);
    THRESHOLDS
        .iter()
        .rev()
        .find(|(lower, _)| probability >= *lower)
        .map(|(_, level)| *level)
        .unwrap_or(RiskLevel::Minimal)
}
