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

//! Evaluation report and FAIR aggregate
//!
//! Reports are plain serializable values: every map is a `BTreeMap` and
//! nothing time-dependent is recorded, so identical inputs produce
//! byte-identical JSON.

use crate::evaluators::{
    CalibrationEvaluator, CalibrationScore, CalibrationSummary, FaithfulnessScore,
    InterpretabilityScore, RobustnessScore, SafetyEvaluator, SafetyScore, SafetySummary,
};
use crate::quality::QualityAssessment;
use crate::MetricScore;
use fairscore_core::config::{FairMetric, FairSection};
use fairscore_core::{Domain, MetricKind, RoutingDecision};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metrics reported but carrying no weight in the aggregate
pub const UNWEIGHTED_METRICS: [&str; 2] = ["adaptability", "robustness"];

// ============================================================================
// FAIR score
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairScore {
    /// Weighted mean of the weighted components
    pub overall: f64,
    /// Effective weights after duplicate resolution
    pub weights_used: BTreeMap<FairMetric, f64>,
    pub components: BTreeMap<FairMetric, f64>,
    pub unweighted_metrics: Vec<String>,
    /// Per-metric comparison against the configured targets
    pub targets_met: BTreeMap<String, bool>,
}

impl FairScore {
    pub fn compute(
        section: &FairSection,
        faithfulness: &FaithfulnessScore,
        calibration: &CalibrationScore,
        safety: &SafetyScore,
        interpretability: &InterpretabilityScore,
    ) -> Self {
        let components = BTreeMap::from([
            (FairMetric::Faithfulness, faithfulness.overall),
            (FairMetric::Interpretability, interpretability.overall),
            (FairMetric::Safety, safety.overall),
        ]);
        let weights = section.resolved_weights();

        let total_weight: f64 = weights.values().sum();
        let overall = if total_weight > 0.0 {
            let weighted: f64 = weights
                .iter()
                .map(|(metric, w)| w * components.get(metric).copied().unwrap_or(0.0))
                .sum();
            fairscore_core::clamp_unit(weighted / total_weight)
        } else {
            0.0
        };

        let targets = &section.targets;
        let targets_met = BTreeMap::from([
            ("faithfulness".to_string(), faithfulness.overall >= targets.faithfulness),
            ("calibration_ece".to_string(), calibration.ece <= targets.calibration_ece),
            ("safety".to_string(), safety.overall >= targets.safety),
            ("interpretability".to_string(), interpretability.overall >= targets.interpretability),
        ]);

        Self {
            overall,
            weights_used: weights,
            components,
            unweighted_metrics: UNWEIGHTED_METRICS.iter().map(|m| m.to_string()).collect(),
            targets_met,
        }
    }
}

// ============================================================================
// Report
// ============================================================================

/// Everything produced for one (query, response) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub domain: Domain,
    pub routing: RoutingDecision,
    pub faithfulness: FaithfulnessScore,
    pub calibration: CalibrationScore,
    pub safety: SafetyScore,
    pub interpretability: InterpretabilityScore,
    pub robustness: RobustnessScore,
    pub fair_score: FairScore,
    pub quality: QualityAssessment,
}

impl EvaluationReport {
    pub fn passes(&self, threshold: f64) -> bool {
        self.fair_score.overall >= threshold
    }

    pub fn metric_overalls(&self) -> BTreeMap<MetricKind, f64> {
        BTreeMap::from([
            (MetricKind::Faithfulness, self.faithfulness.overall()),
            (MetricKind::Calibration, self.calibration.overall()),
            (MetricKind::Robustness, self.robustness.overall()),
            (MetricKind::Safety, self.safety.overall()),
            (MetricKind::Interpretability, self.interpretability.overall()),
        ])
    }

    /// Metrics that fell back to their default score, with the error
    pub fn errors(&self) -> BTreeMap<MetricKind, String> {
        let scores: [(MetricKind, Option<&str>); 5] = [
            (MetricKind::Faithfulness, self.faithfulness.error()),
            (MetricKind::Calibration, self.calibration.error()),
            (MetricKind::Robustness, self.robustness.error()),
            (MetricKind::Safety, self.safety.error()),
            (MetricKind::Interpretability, self.interpretability.error()),
        ];
        scores
            .into_iter()
            .filter_map(|(kind, err)| err.map(|e| (kind, e.to_string())))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ============================================================================
// Batch summary
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub count: usize,
    pub mean_fair_score: f64,
    pub metric_means: BTreeMap<MetricKind, f64>,
    pub domain_counts: BTreeMap<Domain, usize>,
    pub passed: usize,
    pub pass_threshold: f64,
    pub error_count: usize,
    pub calibration: Option<CalibrationSummary>,
    pub safety: Option<SafetySummary>,
}

impl BatchSummary {
    pub fn from_reports(reports: &[EvaluationReport], pass_threshold: f64) -> Self {
        let count = reports.len();
        let n = count.max(1) as f64;

        let mean_fair_score = reports.iter().map(|r| r.fair_score.overall).sum::<f64>() / n;

        let mut metric_means: BTreeMap<MetricKind, f64> = BTreeMap::new();
        let mut domain_counts: BTreeMap<Domain, usize> = BTreeMap::new();
        let mut error_count = 0;
        for report in reports {
            for (kind, value) in report.metric_overalls() {
                *metric_means.entry(kind).or_insert(0.0) += value / n;
            }
            *domain_counts.entry(report.domain).or_insert(0) += 1;
            error_count += report.errors().len();
        }

        let calibration_scores: Vec<CalibrationScore> =
            reports.iter().map(|r| r.calibration.clone()).collect();
        let safety_scores: Vec<SafetyScore> = reports.iter().map(|r| r.safety.clone()).collect();

        Self {
            count,
            mean_fair_score,
            metric_means,
            domain_counts,
            passed: reports.iter().filter(|r| r.passes(pass_threshold)).count(),
            pass_threshold,
            error_count,
            calibration: CalibrationEvaluator::aggregate(&calibration_scores),
            safety: SafetyEvaluator::summarize(&safety_scores),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::{
        CalibrationEvaluator, FaithfulnessEvaluator, InterpretabilityEvaluator,
        RobustnessEvaluator, SafetyEvaluator,
    };
    use crate::MetricEvaluator;
    use fairscore_core::config::FairWeightEntry;
    use fairscore_core::FairConfig;

    fn fallback_report(config: &FairConfig) -> EvaluationReport {
        let faithfulness = FaithfulnessEvaluator::new(&config.faithfulness).fallback("x");
        let calibration = CalibrationEvaluator::new(&config.calibration).fallback("x");
        let safety = SafetyEvaluator::new(&config.safety).fallback("x");
        let interpretability = InterpretabilityEvaluator::new(&config.interpretability).fallback("x");
        let robustness = RobustnessEvaluator::new(&config.robustness).fallback("x");
        let fair_score =
            FairScore::compute(&config.fair, &faithfulness, &calibration, &safety, &interpretability);
        EvaluationReport {
            domain: Domain::Unknown,
            routing: fairscore_core::DomainRouter::new(&config.router).route("hello"),
            faithfulness,
            calibration,
            safety,
            interpretability,
            robustness,
            fair_score,
            quality: QualityAssessment {
                passed: true,
                reasons: vec![],
            },
        }
    }

    #[test]
    fn test_fair_score_is_mean_of_three() {
        let config = FairConfig::builtin().unwrap();
        let mut report = fallback_report(&config);
        report.faithfulness.overall = 0.6;
        report.interpretability.overall = 0.3;
        report.safety.overall = 0.9;

        let fair = FairScore::compute(
            &config.fair,
            &report.faithfulness,
            &report.calibration,
            &report.safety,
            &report.interpretability,
        );
        assert!((fair.overall - 0.6).abs() < 1e-9);
        assert_eq!(fair.unweighted_metrics, vec!["adaptability", "robustness"]);
        assert_eq!(fair.components.len(), 3);
        assert!(fair.targets_met["faithfulness"]);
        assert!(!fair.targets_met["calibration_ece"]);
    }

    #[test]
    fn test_duplicate_weight_last_wins() {
        let mut config = FairConfig::builtin().unwrap();
        config.fair.weights.push(FairWeightEntry {
            metric: FairMetric::Interpretability,
            weight: 0.5,
        });
        let mut report = fallback_report(&config);
        report.faithfulness.overall = 1.0;
        report.interpretability.overall = 0.0;
        report.safety.overall = 1.0;

        let fair = FairScore::compute(
            &config.fair,
            &report.faithfulness,
            &report.calibration,
            &report.safety,
            &report.interpretability,
        );
        assert_eq!(fair.weights_used[&FairMetric::Interpretability], 0.5);
        assert!((fair.overall - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_report_errors_and_passes() {
        let config = FairConfig::builtin().unwrap();
        let report = fallback_report(&config);
        assert_eq!(report.errors().len(), 5);
        assert!(!report.passes(0.6));
        assert!(report.passes(0.0));
    }

    #[test]
    fn test_report_json_is_deterministic() {
        let config = FairConfig::builtin().unwrap();
        let a = fallback_report(&config).to_json().unwrap();
        let b = fallback_report(&config).to_json().unwrap();
        assert_eq!(a, b);
        let value: serde_json::Value = serde_json::from_str(&a).unwrap();
        assert_eq!(value["domain"], "unknown");
        assert!(value["fair_score"]["weights_used"]["safety"].is_number());
    }

    #[test]
    fn test_batch_summary() {
        let config = FairConfig::builtin().unwrap();
        let mut good = fallback_report(&config);
        good.domain = Domain::Medical;
        good.fair_score.overall = 0.8;
        let bad = fallback_report(&config);

        let summary = BatchSummary::from_reports(&[good, bad], 0.6);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.passed, 1);
        assert!((summary.mean_fair_score - 0.4).abs() < 1e-9);
        assert_eq!(summary.domain_counts[&Domain::Medical], 1);
        assert_eq!(summary.domain_counts[&Domain::Unknown], 1);
        assert_eq!(summary.error_count, 10);
        assert!(summary.calibration.is_some());
        assert_eq!(summary.safety.map(|s| s.count), Some(2));
    }

    #[test]
    fn test_empty_batch_summary() {
        let summary = BatchSummary::from_reports(&[], 0.6);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.mean_fair_score, 0.0);
        assert!(summary.calibration.is_none());
        assert!(summary.safety.is_none());
    }
}
