// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Calibration of generator confidence
//!
//! A well-calibrated generator with confidence 0.8 should be correct about
//! 80% of the time. Correctness is derived from the answer text (exact match,
//! containment either way, or numeric agreement within a relative tolerance)
//! and confidences are grouped into equal-width bins.
//!
//! ## Metrics
//!
//! - **ECE**: bin-weighted mean |accuracy - confidence|
//! - **MCE**: worst non-empty bin
//! - **ACE**: unweighted mean over non-empty bins
//! - **Brier Score**: mean squared error of confidence against correctness
//!
//! Bins are right-closed `(lower, upper]`; a confidence of exactly 0 falls in
//! the first bin. Empty bins never contribute.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fairscore_evals::evaluators::calibration::CalibrationEvaluator;
//!
//! let evaluator = CalibrationEvaluator::new(&config.calibration);
//! let score = evaluator.evaluate_predictions(
//!     &["Paris", "42"],
//!     &["paris", "41.5"],
//!     &[0.9, 0.6],
//! )?;
//! println!("ECE: {:.3}", score.ece);
//! ```

use crate::{error_details, EvalError, EvalInput, MetricEvaluator, MetricScore};
use async_trait::async_trait;
use fairscore_core::config::CalibrationConfig;
use fairscore_core::{clamp_unit, Details, MetricKind, MetricValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Complete calibration analysis result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationScore {
    /// `1 - ECE`
    pub overall: f64,
    pub ece: f64,
    pub mce: f64,
    pub ace: f64,
    pub brier_score: f64,
    /// Mean (confidence - accuracy) over overconfident bins
    pub overconfidence: f64,
    /// Mean (accuracy - confidence) over underconfident bins
    pub underconfidence: f64,
    pub accuracy: f64,
    pub mean_confidence: f64,
    pub n_samples: usize,
    pub reliability_diagram: Vec<ReliabilityBin>,
    pub details: Details,
}

/// Single bin in the reliability diagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityBin {
    pub bin_lower: f64,
    pub bin_upper: f64,
    pub bin_center: f64,
    /// Observed accuracy (0 for an empty bin)
    pub accuracy: f64,
    /// Mean confidence (the bin center for an empty bin)
    pub mean_confidence: f64,
    pub count: usize,
}

/// Aggregate over many calibration runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSummary {
    pub runs: usize,
    pub mean_ece: f64,
    pub std_ece: f64,
    pub min_ece: f64,
    pub max_ece: f64,
    pub mean_mce: f64,
    pub mean_ace: f64,
    pub mean_brier_score: f64,
}

impl MetricScore for CalibrationScore {
    fn kind(&self) -> MetricKind {
        MetricKind::Calibration
    }

    fn overall(&self) -> f64 {
        self.overall
    }

    fn sub_scores(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("ece", self.ece),
            ("mce", self.mce),
            ("ace", self.ace),
            ("brier_score", self.brier_score),
        ])
    }

    fn details(&self) -> &Details {
        &self.details
    }
}

/// Confidence calibration evaluator
#[derive(Debug, Clone)]
pub struct CalibrationEvaluator {
    config: CalibrationConfig,
}

impl CalibrationEvaluator {
    pub fn new(config: &CalibrationConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn with_bins(mut self, n: usize) -> Self {
        self.config.n_bins = n.max(1);
        self
    }

    pub fn n_bins(&self) -> usize {
        self.config.n_bins
    }

    /// Evaluate parallel lists of predictions, references and confidences
    pub fn evaluate_predictions<S: AsRef<str>, T: AsRef<str>>(
        &self,
        predictions: &[S],
        ground_truths: &[T],
        confidences: &[f64],
    ) -> Result<CalibrationScore, EvalError> {
        if predictions.len() != ground_truths.len() || predictions.len() != confidences.len() {
            return Err(EvalError::InvalidInput(format!(
                "length mismatch: {} predictions, {} ground truths, {} confidences",
                predictions.len(),
                ground_truths.len(),
                confidences.len()
            )));
        }

        let outcomes: Vec<(f64, bool)> = predictions
            .iter()
            .zip(ground_truths)
            .zip(confidences)
            .map(|((p, t), c)| (*c, self.is_correct(p.as_ref(), t.as_ref())))
            .collect();

        self.evaluate_outcomes(&outcomes)
    }

    /// Evaluate precomputed (confidence, correct) pairs
    pub fn evaluate_outcomes(&self, outcomes: &[(f64, bool)]) -> Result<CalibrationScore, EvalError> {
        if outcomes.is_empty() {
            return Err(EvalError::InvalidInput(
                "calibration needs at least one prediction".to_string(),
            ));
        }
        if outcomes.iter().any(|(c, _)| !c.is_finite()) {
            return Err(EvalError::InvalidInput("confidence must be finite".to_string()));
        }

        let outcomes: Vec<(f64, bool)> = outcomes.iter().map(|(c, o)| (clamp_unit(*c), *o)).collect();
        let n = outcomes.len() as f64;

        let brier_score = outcomes
            .iter()
            .map(|(conf, outcome)| {
                let o = if *outcome { 1.0 } else { 0.0 };
                (conf - o).powi(2)
            })
            .sum::<f64>()
            / n;

        let accuracy = outcomes.iter().filter(|(_, o)| *o).count() as f64 / n;
        let mean_confidence = outcomes.iter().map(|(c, _)| c).sum::<f64>() / n;

        let bins = self.create_bins(&outcomes);

        let mut ece = 0.0;
        let mut mce = 0.0f64;
        let mut gap_sum = 0.0;
        let mut overconfidence = 0.0;
        let mut underconfidence = 0.0;
        let mut over_count = 0;
        let mut under_count = 0;

        for bin in bins.iter().filter(|b| b.count > 0) {
            let gap = (bin.accuracy - bin.mean_confidence).abs();
            ece += (bin.count as f64 / n) * gap;
            mce = mce.max(gap);
            gap_sum += gap;

            if bin.mean_confidence > bin.accuracy {
                overconfidence += bin.mean_confidence - bin.accuracy;
                over_count += 1;
            } else if bin.accuracy > bin.mean_confidence {
                underconfidence += bin.accuracy - bin.mean_confidence;
                under_count += 1;
            }
        }

        let non_empty = bins.iter().filter(|b| b.count > 0).count();
        let ace = if non_empty > 0 {
            gap_sum / non_empty as f64
        } else {
            0.0
        };
        let overconfidence = if over_count > 0 {
            overconfidence / over_count as f64
        } else {
            0.0
        };
        let underconfidence = if under_count > 0 {
            underconfidence / under_count as f64
        } else {
            0.0
        };

        let confidence_std = (outcomes
            .iter()
            .map(|(c, _)| (c - mean_confidence).powi(2))
            .sum::<f64>()
            / n)
            .sqrt();

        let mut details = Details::new();
        details.insert("n_samples".into(), outcomes.len().into());
        details.insert("n_bins".into(), self.config.n_bins.into());
        details.insert("mean_confidence".into(), mean_confidence.into());
        details.insert("mean_accuracy".into(), accuracy.into());
        details.insert("confidence_std".into(), confidence_std.into());
        details.insert(
            "accuracy_by_confidence_bin".into(),
            MetricValue::from(bins.iter().map(|b| b.accuracy).collect::<Vec<f64>>()),
        );

        debug!(ece, mce, ace, brier_score, n = outcomes.len(), "Calibration computed");

        Ok(CalibrationScore {
            overall: clamp_unit(1.0 - ece),
            ece: clamp_unit(ece),
            mce: clamp_unit(mce),
            ace: clamp_unit(ace),
            brier_score: clamp_unit(brier_score),
            overconfidence,
            underconfidence,
            accuracy,
            mean_confidence,
            n_samples: outcomes.len(),
            reliability_diagram: bins,
            details,
        })
    }

    /// Aggregate ECE/MCE/ACE/Brier across runs
    pub fn aggregate(scores: &[CalibrationScore]) -> Option<CalibrationSummary> {
        if scores.is_empty() {
            return None;
        }
        let n = scores.len() as f64;
        let mean = |f: fn(&CalibrationScore) -> f64| scores.iter().map(f).sum::<f64>() / n;
        let mean_ece = mean(|s| s.ece);
        let std_ece = (scores.iter().map(|s| (s.ece - mean_ece).powi(2)).sum::<f64>() / n).sqrt();

        Some(CalibrationSummary {
            runs: scores.len(),
            mean_ece,
            std_ece,
            min_ece: scores.iter().map(|s| s.ece).fold(f64::INFINITY, f64::min),
            max_ece: scores.iter().map(|s| s.ece).fold(f64::NEG_INFINITY, f64::max),
            mean_mce: mean(|s| s.mce),
            mean_ace: mean(|s| s.ace),
            mean_brier_score: mean(|s| s.brier_score),
        })
    }

    /// Exact match, containment either way, or numeric agreement
    pub fn is_correct(&self, prediction: &str, ground_truth: &str) -> bool {
        let pred = prediction.trim().to_lowercase();
        let truth = ground_truth.trim().to_lowercase();

        if pred == truth {
            return true;
        }
        if !pred.is_empty() && !truth.is_empty() && (pred.contains(&truth) || truth.contains(&pred)) {
            return true;
        }
        self.is_numerical_match(&pred, &truth)
    }

    fn is_numerical_match(&self, pred: &str, truth: &str) -> bool {
        let pred_numbers = self.extract_numbers(pred);
        let truth_numbers = self.extract_numbers(truth);
        let tolerance = self.config.numeric_tolerance;

        pred_numbers.iter().any(|p| {
            truth_numbers
                .iter()
                .any(|t| (p - t).abs() / t.abs().max(1e-6) < tolerance)
        })
    }

    fn extract_numbers(&self, text: &str) -> Vec<f64> {
        self.config
            .number_pattern
            .regex()
            .find_iter(text)
            .filter_map(|m| m.as_str().parse::<f64>().ok())
            .collect()
    }

    /// Equal-width, right-closed bins over [0, 1]
    fn create_bins(&self, outcomes: &[(f64, bool)]) -> Vec<ReliabilityBin> {
        let n_bins = self.config.n_bins;
        let width = 1.0 / n_bins as f64;
        let mut counts = vec![0usize; n_bins];
        let mut correct = vec![0usize; n_bins];
        let mut conf_sum = vec![0.0f64; n_bins];

        for (conf, outcome) in outcomes {
            let idx = Self::bin_index(*conf, n_bins);
            counts[idx] += 1;
            conf_sum[idx] += conf;
            if *outcome {
                correct[idx] += 1;
            }
        }

        (0..n_bins)
            .map(|i| {
                let lower = i as f64 * width;
                let upper = (i + 1) as f64 * width;
                let center = (lower + upper) / 2.0;
                let count = counts[i];
                let (accuracy, mean_confidence) = if count > 0 {
                    (correct[i] as f64 / count as f64, conf_sum[i] / count as f64)
                } else {
                    (0.0, center)
                };
                ReliabilityBin {
                    bin_lower: lower,
                    bin_upper: upper,
                    bin_center: center,
                    accuracy,
                    mean_confidence,
                    count,
                }
            })
            .collect()
    }

    /// Index of the right-closed bin holding `conf`
    fn bin_index(conf: f64, n_bins: usize) -> usize {
        let scaled = conf * n_bins as f64;
        let idx = scaled.ceil() as usize;
        idx.saturating_sub(1).min(n_bins - 1)
    }
}

#[async_trait]
impl MetricEvaluator for CalibrationEvaluator {
    type Score = CalibrationScore;

    fn kind(&self) -> MetricKind {
        MetricKind::Calibration
    }

    /// Single-item calibration of the response against the ground truth
    /// (or the query when none is supplied)
    async fn try_evaluate(&self, input: &EvalInput<'_>) -> Result<CalibrationScore, EvalError> {
        self.evaluate_predictions(&[input.response], &[input.reference()], &[input.confidence])
    }

    fn fallback(&self, error: &str) -> CalibrationScore {
        CalibrationScore {
            overall: 0.0,
            ece: 1.0,
            mce: 1.0,
            ace: 1.0,
            brier_score: 1.0,
            overconfidence: 0.0,
            underconfidence: 0.0,
            accuracy: 0.0,
            mean_confidence: 0.0,
            n_samples: 0,
            reliability_diagram: Vec::new(),
            details: error_details(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairscore_core::FairConfig;

    fn evaluator() -> CalibrationEvaluator {
        CalibrationEvaluator::new(&FairConfig::builtin().unwrap().calibration)
    }

    #[test]
    fn test_perfect_calibration_has_zero_ece() {
        // 80% confidence, 8 of 10 correct; 30% confidence, 3 of 10 correct
        let mut outcomes = Vec::new();
        for i in 0..10 {
            outcomes.push((0.8, i < 8));
            outcomes.push((0.3, i < 3));
        }
        let score = evaluator().evaluate_outcomes(&outcomes).unwrap();
        assert!(score.ece.abs() < 1e-9);
        assert!(score.mce.abs() < 1e-9);
        assert!(score.ace.abs() < 1e-9);
        assert!((score.overall - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_wrong_full_confidence_brier_is_one() {
        let score = evaluator()
            .evaluate_predictions(&["cat", "dog"], &["paris", "rome"], &[1.0, 1.0])
            .unwrap();
        assert!((score.brier_score - 1.0).abs() < 1e-12);
        assert!((score.ece - 1.0).abs() < 1e-12);
        assert_eq!(score.overall, 0.0);
    }

    #[test]
    fn test_length_mismatch_is_invalid_input() {
        let err = evaluator()
            .evaluate_predictions(&["a", "b"], &["a"], &[0.5, 0.5])
            .unwrap_err();
        assert!(matches!(err, EvalError::InvalidInput(_)));
    }

    #[test]
    fn test_empty_input_is_invalid() {
        let empty: [&str; 0] = [];
        let err = evaluator().evaluate_predictions(&empty, &empty, &[]).unwrap_err();
        assert!(matches!(err, EvalError::InvalidInput(_)));
    }

    #[test]
    fn test_single_item_is_well_defined() {
        let score = evaluator().evaluate_predictions(&["Paris"], &["paris"], &[0.7]).unwrap();
        assert!((score.ece - 0.3).abs() < 1e-12);
        assert!((score.mce - 0.3).abs() < 1e-12);
        assert!((score.ace - 0.3).abs() < 1e-12);
        assert!((score.brier_score - 0.09).abs() < 1e-12);
        assert_eq!(score.n_samples, 1);
    }

    #[test]
    fn test_correctness_rules() {
        let e = evaluator();
        assert!(e.is_correct("  PARIS ", "paris"));
        assert!(e.is_correct("The capital is Paris", "paris"));
        assert!(e.is_correct("paris", "Paris, France"));
        assert!(e.is_correct("about 102 units", "100"));
        assert!(!e.is_correct("about 110 units", "100"));
        assert!(!e.is_correct("london", "paris"));
        assert!(!e.is_correct("", "paris"));
    }

    #[test]
    fn test_right_closed_bins() {
        assert_eq!(CalibrationEvaluator::bin_index(0.0, 10), 0);
        assert_eq!(CalibrationEvaluator::bin_index(0.1, 10), 0);
        assert_eq!(CalibrationEvaluator::bin_index(0.1000001, 10), 1);
        assert_eq!(CalibrationEvaluator::bin_index(1.0, 10), 9);
    }

    #[test]
    fn test_empty_bins_are_skipped() {
        let score = evaluator()
            .evaluate_outcomes(&[(0.95, true), (0.05, false)])
            .unwrap();
        let non_empty: Vec<_> = score.reliability_diagram.iter().filter(|b| b.count > 0).collect();
        assert_eq!(non_empty.len(), 2);
        // gaps 0.05 each; ACE averages only the two populated bins
        assert!((score.ace - 0.05).abs() < 1e-12);
        assert_eq!(score.reliability_diagram.len(), 10);
    }

    #[test]
    fn test_aggregate() {
        let e = evaluator();
        let a = e.evaluate_outcomes(&[(1.0, true)]).unwrap();
        let b = e.evaluate_outcomes(&[(1.0, false)]).unwrap();
        let summary = CalibrationEvaluator::aggregate(&[a, b]).unwrap();
        assert_eq!(summary.runs, 2);
        assert!((summary.mean_ece - 0.5).abs() < 1e-12);
        assert!((summary.std_ece - 0.5).abs() < 1e-12);
        assert_eq!(summary.min_ece, 0.0);
        assert_eq!(summary.max_ece, 1.0);
        assert!(CalibrationEvaluator::aggregate(&[]).is_none());
    }

    #[tokio::test]
    async fn test_single_evaluation_uses_query_when_no_ground_truth() {
        let e = evaluator();
        let input = EvalInput::new("What is the capital of France?", "Paris").with_confidence(0.9);
        let score = e.evaluate(&input).await;
        // "paris" is not contained in the query text
        assert!((score.brier_score - 0.81).abs() < 1e-12);

        let input = input.with_ground_truth(Some("Paris"));
        let score = e.evaluate(&input).await;
        assert!((score.brier_score - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_fallback_record() {
        let score = evaluator().fallback("boom");
        assert_eq!(score.ece, 1.0);
        assert_eq!(score.brier_score, 1.0);
        assert_eq!(score.error(), Some("boom"));
    }
}
