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

//! End-to-end behavior of the public evaluation API

use fairscore_core::{Domain, EvidenceSource, FairConfig};
use fairscore_evals::evaluators::PerturbationAxis;
use fairscore_evals::{
    BlockingGenerator, CalibrationEvaluator, EvaluationRequest, Generation, GeneratorError,
    MetricScore, Orchestrator, RobustnessEvaluator, SafetyEvaluator, StaticEvidence,
};
use std::sync::Arc;
use std::time::Duration;

fn config() -> FairConfig {
    FairConfig::builtin().unwrap()
}

// ============================================================================
// Routing examples
// ============================================================================

#[test]
fn routes_documented_examples() {
    let orch = Orchestrator::builder().build().unwrap();
    assert_eq!(orch.route("medicine", None).domain, Domain::Medical);
    assert_eq!(
        orch.route("What is the ROI on a $10,000 investment?", None).domain,
        Domain::Finance
    );
    assert_eq!(
        orch.route(
            "What are the symptoms of diabetes and what medication should I take?",
            None
        )
        .domain,
        Domain::Medical
    );
}

// ============================================================================
// Calibration
// ============================================================================

#[test]
fn perfectly_calibrated_dataset_has_zero_ece() {
    let evaluator = CalibrationEvaluator::new(&config().calibration);

    // 10 predictions at 0.8 confidence, 8 correct; 10 at 0.3, 3 correct
    let mut outcomes = Vec::new();
    for i in 0..10 {
        outcomes.push((0.8, i < 8));
        outcomes.push((0.3, i < 3));
    }

    let score = evaluator.evaluate_outcomes(&outcomes).unwrap();
    assert!(score.ece.abs() < 1e-9);
    assert!(score.mce.abs() < 1e-9);
    assert!((score.overall - 1.0).abs() < 1e-9);
}

#[test]
fn confident_and_wrong_has_brier_one() {
    let evaluator = CalibrationEvaluator::new(&config().calibration);
    let predictions = ["Paris", "4", "blue"];
    let truths = ["London", "5", "red"];
    let score = evaluator
        .evaluate_predictions(&predictions, &truths, &[1.0, 1.0, 1.0])
        .unwrap();
    assert!((score.brier_score - 1.0).abs() < 1e-9);
    assert!((score.ece - 1.0).abs() < 1e-9);
}

#[test]
fn mismatched_calibration_lists_are_rejected() {
    let evaluator = CalibrationEvaluator::new(&config().calibration);
    let result = evaluator.evaluate_predictions(&["a", "b"], &["a"], &[0.5, 0.5]);
    assert!(result.is_err());
}

// ============================================================================
// Safety
// ============================================================================

#[test]
fn doctor_referral_raises_medical_safety() {
    let evaluator = SafetyEvaluator::new(&config().safety);
    let query = "What helps with a mild headache?";
    let base = "Rest and hydration often help with a mild headache.";
    let referred = "Rest and hydration often help with a mild headache. Consult a doctor if it persists.";

    assert!(evaluator.medical_safety(query, referred) > evaluator.medical_safety(query, base));
}

// ============================================================================
// Robustness
// ============================================================================

#[tokio::test]
async fn echoing_generator_gives_perfect_similarity() {
    let baseline = Generation::new("Diversify across asset classes to reduce risk.", 0.7);
    let fixed = baseline.clone();
    let generator = BlockingGenerator::new(move |_: &str| Ok(fixed.clone()));
    let evaluator = RobustnessEvaluator::new(&config().robustness).with_generator(Arc::new(generator));

    let score = evaluator
        .evaluate_query("How should I diversify my portfolio?", Some(baseline), Domain::Finance)
        .await
        .unwrap();

    assert_eq!(score.axes.len(), PerturbationAxis::ALL.len());
    for axis in &score.axes {
        assert_eq!(axis.failures, 0);
        assert!(axis.similarities.iter().all(|s| (s - 1.0).abs() < 1e-12));
        assert!((axis.mean_similarity - 1.0).abs() < 1e-12);
    }
    assert!(score.overall <= 0.8 + 1e-9);
}

#[tokio::test]
async fn failing_generator_penalizes_without_aborting() {
    let generator = BlockingGenerator::new(|q: &str| {
        if q.len() % 2 == 0 {
            Err(GeneratorError::Failed("flaky backend".to_string()))
        } else {
            Ok(Generation::new("Some answer", 0.5))
        }
    });
    let evaluator = RobustnessEvaluator::new(&config().robustness).with_generator(Arc::new(generator));

    let score = evaluator
        .evaluate_query(
            "What is a bond?",
            Some(Generation::new("Some answer", 0.5)),
            Domain::Finance,
        )
        .await
        .unwrap();
    assert!(score.error().is_none());
    assert!((0.0..=1.0).contains(&score.overall));
}

// ============================================================================
// Orchestrator
// ============================================================================

#[tokio::test]
async fn identical_inputs_produce_identical_json() {
    let generator = BlockingGenerator::new(|q: &str| Ok(Generation::new(format!("Answer: {}", q), 0.6)));
    let orch = Orchestrator::builder()
        .with_generator(Arc::new(generator))
        .with_evidence_provider(Arc::new(StaticEvidence::new(vec![EvidenceSource::new(
            "Index funds",
            "Index funds track a market index at low cost",
            0.8,
        )])))
        .build()
        .unwrap();

    let request = EvaluationRequest::new(
        "Are index funds a good investment?",
        "Index funds offer low-cost diversification. Past performance does not guarantee \
         future results.",
        0.65,
    )
    .with_ground_truth("Index funds provide diversified exposure at low cost.");

    let first = orch.evaluate(request.clone()).await.to_json().unwrap();
    let second = orch.evaluate(request).await.to_json().unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn report_is_complete_for_degenerate_input() {
    let orch = Orchestrator::builder().build().unwrap();
    let report = orch.evaluate(EvaluationRequest::new("", "", f64::NAN)).await;

    assert_eq!(report.domain, Domain::Unknown);
    assert!(!report.quality.passed);
    for value in report.metric_overalls().values() {
        assert!((0.0..=1.0).contains(value), "overall out of range: {}", value);
    }
    assert!((0.0..=1.0).contains(&report.fair_score.overall));
}

#[tokio::test]
async fn slow_generator_times_out_per_variant() {
    let mut config = config();
    config.robustness.generator_timeout_ms = 10;
    let generator = BlockingGenerator::new(|_: &str| {
        std::thread::sleep(Duration::from_millis(50));
        Ok(Generation::new("late", 0.5))
    });
    let orch = Orchestrator::builder()
        .with_config(config)
        .with_generator(Arc::new(generator))
        .build()
        .unwrap();

    let report = orch
        .evaluate(EvaluationRequest::new(
            "What is inflation?",
            "Inflation is the rate at which prices rise.",
            0.6,
        ))
        .await;

    assert!(report.robustness.error().is_none());
    let failures: usize = report.robustness.axes.iter().map(|a| a.failures).sum();
    assert!(failures > 0);
}

#[tokio::test]
async fn batch_summary_counts_every_request() {
    let orch = Orchestrator::builder().build().unwrap();
    let requests = (0..6)
        .map(|i| {
            EvaluationRequest::new(
                format!("What are the side effects of drug {}?", i),
                "Side effects may include nausea. Consult a doctor before use.",
                0.6,
            )
        })
        .collect();

    let (reports, summary) = orch.evaluate_batch(requests).await;
    assert_eq!(reports.len(), 6);
    assert_eq!(summary.count, 6);
    assert!(!reports[3].routing.explanation.is_empty());
    assert!((0.0..=1.0).contains(&summary.mean_fair_score));
}
