//! Batch confidence scoring.
//!
//! Scoring weights per matched test:
//! - Source trust level: 60%
//! - Source priority: 40%
//!
//! The batch score blends the match rate (40%) with the mean per-test score
//! (60%), floored at a baseline.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{ConfidenceConfig, ScoreVariation};
use crate::models::{ClassifiedResult, ConfidenceLevel, ConfidenceScore};

/// Trust and priority assumed when a matched test carries none.
const DEFAULT_LEVEL: u8 = 3;

/// Half-width of the per-test jitter in seeded mode.
const PER_TEST_JITTER: f64 = 0.05;

/// Half-width of the seeded spread around the no-match score.
const NO_MATCH_SPREAD: f64 = 0.05;

/// Half-width of the seeded spread around the unmatched floor and baseline.
const FLOOR_SPREAD: f64 = 0.025;

/// What the scorer needs to know about one test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evidence {
    pub kb_matched: bool,
    pub trust_level: Option<u8>,
    pub source_priority: Option<u8>,
}

impl Evidence {
    pub fn matched(trust_level: u8, source_priority: u8) -> Self {
        Self {
            kb_matched: true,
            trust_level: Some(trust_level),
            source_priority: Some(source_priority),
        }
    }

    pub fn unmatched() -> Self {
        Self {
            kb_matched: false,
            trust_level: None,
            source_priority: None,
        }
    }
}

impl From<&ClassifiedResult> for Evidence {
    fn from(result: &ClassifiedResult) -> Self {
        Self {
            kb_matched: result.kb_found,
            trust_level: result.trust_level,
            source_priority: result.source_priority,
        }
    }
}

/// Source of score variation for one batch.
enum Jitter {
    Fixed,
    Seeded(StdRng),
}

impl Jitter {
    fn for_batch(variation: ScoreVariation) -> Self {
        match variation {
            ScoreVariation::Deterministic => Jitter::Fixed,
            ScoreVariation::Seeded { seed } => Jitter::Seeded(StdRng::seed_from_u64(seed)),
        }
    }

    /// Offset added to a matched test's score.
    fn offset(&mut self) -> f64 {
        match self {
            Jitter::Fixed => 0.0,
            Jitter::Seeded(rng) => rng.gen_range(-PER_TEST_JITTER..=PER_TEST_JITTER),
        }
    }

    /// `center` itself, or a draw from `center ± spread` when seeded.
    fn around(&mut self, center: f64, spread: f64) -> f64 {
        match self {
            Jitter::Fixed => center,
            Jitter::Seeded(rng) => rng
                .gen_range(center - spread..=center + spread)
                .clamp(0.0, 1.0),
        }
    }
}

/// Computes batch-level confidence from per-test evidence.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    config: ConfidenceConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConfidenceConfig {
        &self.config
    }

    /// Score one batch.
    ///
    /// Seeded variation restarts its RNG on every call, so a given batch
    /// always scores the same under the same seed.
    pub fn score(&self, evidence: &[Evidence]) -> ConfidenceScore {
        if evidence.is_empty() {
            return ConfidenceScore {
                score: 0.0,
                level: ConfidenceLevel::None,
                source_label: "No tests extracted".into(),
            };
        }

        let mut jitter = Jitter::for_batch(self.config.variation);
        let total = evidence.len();
        let matched = evidence.iter().filter(|e| e.kb_matched).count();

        if matched == 0 {
            let score = jitter.around(self.config.no_match_score, NO_MATCH_SPREAD);
            return ConfidenceScore {
                score: round2(score),
                level: ConfidenceLevel::Low,
                source_label: "AI Inference Only (No KB data)".into(),
            };
        }

        let mut sum = 0.0;
        for item in evidence {
            sum += if item.kb_matched {
                (per_test_score(item) + jitter.offset()).clamp(0.0, 1.0)
            } else {
                jitter.around(self.config.unmatched_floor, FLOOR_SPREAD)
            };
        }

        let average = sum / total as f64;
        let match_rate = matched as f64 / total as f64;
        let baseline = jitter.around(self.config.baseline, FLOOR_SPREAD);
        let score = round2((0.4 * match_rate + 0.6 * average).max(baseline));

        ConfidenceScore {
            score,
            level: self.level_for(score),
            source_label: format!("Knowledge Base ({}/{} tests matched)", matched, total),
        }
    }

    /// Band a score using the configured thresholds.
    pub fn level_for(&self, score: f64) -> ConfidenceLevel {
        if score >= self.config.high_threshold {
            ConfidenceLevel::High
        } else if score >= self.config.medium_threshold {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// Score of one matched test before jitter.
fn per_test_score(evidence: &Evidence) -> f64 {
    let trust = evidence.trust_level.unwrap_or(DEFAULT_LEVEL) as f64;
    let priority = evidence.source_priority.unwrap_or(DEFAULT_LEVEL) as f64;

    let trust_score = (trust - 1.0) / 4.0;
    let priority_score = (6.0 - priority) / 5.0;
    (0.6 * trust_score + 0.4 * priority_score).clamp(0.0, 1.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scorer() -> ConfidenceScorer {
        ConfidenceScorer::default()
    }

    fn seeded(seed: u64) -> ConfidenceScorer {
        ConfidenceScorer::new(ConfidenceConfig {
            variation: ScoreVariation::Seeded { seed },
            ..Default::default()
        })
    }

    #[test]
    fn test_empty_batch() {
        let score = scorer().score(&[]);
        assert_eq!(score.score, 0.0);
        assert_eq!(score.level, ConfidenceLevel::None);
        assert_eq!(score.source_label, "No tests extracted");
    }

    #[test]
    fn test_no_matches() {
        let score = scorer().score(&[Evidence::unmatched(); 5]);
        assert_eq!(score.score, 0.45);
        assert_eq!(score.level, ConfidenceLevel::Low);
        assert_eq!(score.source_label, "AI Inference Only (No KB data)");
    }

    #[test]
    fn test_all_matched_best_sources() {
        let score = scorer().score(&[Evidence::matched(5, 1), Evidence::matched(5, 1)]);
        assert_eq!(score.score, 1.0);
        assert_eq!(score.level, ConfidenceLevel::High);
        assert_eq!(score.source_label, "Knowledge Base (2/2 tests matched)");
    }

    #[test]
    fn test_mixed_batch() {
        // matched: 0.6 * 0.5 + 0.4 * 1.0 = 0.7; unmatched: 0.225
        // 0.4 * 0.5 + 0.6 * 0.4625 = 0.4775
        let score = scorer().score(&[Evidence::matched(3, 1), Evidence::unmatched()]);
        assert_eq!(score.score, 0.48);
        assert_eq!(score.level, ConfidenceLevel::Low);
        assert_eq!(score.source_label, "Knowledge Base (1/2 tests matched)");
    }

    #[test]
    fn test_missing_levels_default_to_three() {
        let evidence = Evidence {
            kb_matched: true,
            trust_level: None,
            source_priority: None,
        };
        // 0.6 * 0.5 + 0.4 * 0.6 = 0.54; 0.4 + 0.6 * 0.54 = 0.724
        let score = scorer().score(&[evidence]);
        assert_eq!(score.score, 0.72);
        assert_eq!(score.level, ConfidenceLevel::High);
    }

    #[test]
    fn test_baseline_floor() {
        let scorer = ConfidenceScorer::new(ConfidenceConfig {
            baseline: 0.3,
            ..Default::default()
        });
        let mut evidence = vec![Evidence::matched(1, 5)];
        evidence.extend([Evidence::unmatched(); 9]);

        let score = scorer.score(&evidence);
        assert_eq!(score.score, 0.3);
        assert_eq!(score.source_label, "Knowledge Base (1/10 tests matched)");
    }

    #[test]
    fn test_levels() {
        let scorer = scorer();
        assert_eq!(scorer.level_for(0.70), ConfidenceLevel::High);
        assert_eq!(scorer.level_for(0.69), ConfidenceLevel::Medium);
        assert_eq!(scorer.level_for(0.50), ConfidenceLevel::Medium);
        assert_eq!(scorer.level_for(0.49), ConfidenceLevel::Low);
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let evidence = [
            Evidence::matched(4, 2),
            Evidence::unmatched(),
            Evidence::matched(2, 3),
        ];
        let a = seeded(42).score(&evidence);
        let b = seeded(42).score(&evidence);
        assert_eq!(a, b);

        let scorer = seeded(42);
        assert_eq!(scorer.score(&evidence), scorer.score(&evidence));
    }

    #[test]
    fn test_seeded_no_match_interval() {
        for seed in 0..50 {
            let score = seeded(seed).score(&[Evidence::unmatched(); 3]);
            assert!((0.40..=0.50).contains(&score.score), "seed {}: {}", seed, score.score);
        }
    }

    #[test]
    fn test_seeded_draws_follow_config() {
        let config = ConfidenceConfig {
            no_match_score: 0.9,
            unmatched_floor: 0.6,
            baseline: 0.8,
            variation: ScoreVariation::Seeded { seed: 0 },
            ..Default::default()
        };
        for seed in 0..50 {
            let scorer = ConfidenceScorer::new(ConfidenceConfig {
                variation: ScoreVariation::Seeded { seed },
                ..config.clone()
            });

            let none = scorer.score(&[Evidence::unmatched(); 3]);
            assert!((0.85..=0.95).contains(&none.score), "seed {}: {}", seed, none.score);

            // Baseline dominates a weak batch
            let mut weak = vec![Evidence::matched(1, 5)];
            weak.extend([Evidence::unmatched(); 9]);
            let floored = scorer.score(&weak);
            assert!((0.77..=0.83).contains(&floored.score), "seed {}: {}", seed, floored.score);
        }
    }

    #[test]
    fn test_from_result() {
        let result = ClassifiedResult {
            test_name: "Hb".into(),
            normalized_name: "hemoglobin".into(),
            value: 12.0.into(),
            unit: "g/dL".into(),
            classification: crate::models::Classification::Low,
            unknown_reason: None,
            ref_low: Some(13.0),
            ref_high: Some(17.0),
            reference_range_display: "13.0 - 17.0 g/dL".into(),
            kb_found: true,
            test_id: Some(1),
            canonical_name: Some("Hemoglobin".into()),
            panel_name: None,
            source_id: Some(1),
            source_name: Some("WHO".into()),
            trust_level: Some(5),
            source_priority: Some(1),
            issue: None,
        };
        assert_eq!(Evidence::from(&result), Evidence::matched(5, 1));
    }

    fn evidence_strategy() -> impl Strategy<Value = Evidence> {
        (any::<bool>(), 1u8..=5, 1u8..=5).prop_map(|(kb_matched, trust, priority)| {
            if kb_matched {
                Evidence::matched(trust, priority)
            } else {
                Evidence::unmatched()
            }
        })
    }

    proptest! {
        #[test]
        fn prop_score_in_unit_interval(
            evidence in proptest::collection::vec(evidence_strategy(), 0..20),
            seed in any::<u64>(),
        ) {
            for scorer in [scorer(), seeded(seed)] {
                let score = scorer.score(&evidence);
                prop_assert!((0.0..=1.0).contains(&score.score));
            }
        }

        #[test]
        fn prop_deterministic_is_idempotent(
            evidence in proptest::collection::vec(evidence_strategy(), 0..20),
        ) {
            prop_assert_eq!(scorer().score(&evidence), scorer().score(&evidence));
        }
    }
}
