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

//! # Fairscore Evaluation Engine
//!
//! Rule-based scoring of generated answers along five independent
//! dimensions, aggregated into a single FAIR score.
//!
//! ## Features
//!
//! - **Trait-based evaluators**: each metric implements [`MetricEvaluator`]
//!   and can be used on its own
//! - **Built-in evaluators**: faithfulness, calibration, robustness, safety,
//!   interpretability
//! - **Orchestration**: routing plus all five metrics in one call, with
//!   per-evaluator failure isolation
//! - **Presentation**: an ordered enhancement chain and quality gate that
//!   never feed back into scoring
//!
//! ## Example
//!
//! ```rust,ignore
//! use fairscore_evals::{EvaluationRequest, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orchestrator = Orchestrator::builder().build()?;
//!     let report = orchestrator
//!         .evaluate(EvaluationRequest::new(
//!             "What are the side effects of insulin?",
//!             "Insulin may cause low blood sugar. Consult a doctor.",
//!             0.7,
//!         ))
//!         .await;
//!     println!("FAIR score: {:.3}", report.fair_score.overall);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use fairscore_core::{Details, Domain, EvidenceSource, FairError, MetricKind, MetricValue};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

pub mod embedding;
pub mod enhance;
pub mod evaluators;
pub mod evidence;
pub mod generator;
pub mod orchestrator;
pub mod quality;
pub mod report;

pub use embedding::{EmbedError, EmbeddingClient};
pub use enhance::{
    Capability, DisclaimerEnhancer, EnhancedText, Enhancement, EnhancementChain, Enhancer,
    ReferralEnhancer,
};
pub use evaluators::{
    CalibrationEvaluator, CalibrationScore, FaithfulnessEvaluator, FaithfulnessScore,
    InterpretabilityEvaluator, InterpretabilityScore, RobustnessEvaluator, RobustnessScore,
    SafetyEvaluator, SafetyScore,
};
pub use evidence::{EvidenceError, EvidenceProvider, StaticEvidence};
pub use generator::{BlockingGenerator, Generation, GeneratorError, ResponseGenerator};
pub use orchestrator::{EvaluationRequest, Orchestrator, OrchestratorBuilder, Presentation};
pub use quality::{assess_quality, fallback_template, QualityAssessment, QualityIssue};
pub use report::{BatchSummary, EvaluationReport, FairScore};

/// Errors that can occur inside a single evaluator
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Evaluation timeout")]
    Timeout,

    #[error("Task panicked: {0}")]
    Panic(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Core(#[from] FairError),
}

/// Everything an evaluator may look at for one (query, response) pair
#[derive(Debug, Clone, Copy)]
pub struct EvalInput<'a> {
    pub query: &'a str,
    pub response: &'a str,
    /// Generator confidence in [0, 1]
    pub confidence: f64,
    pub ground_truth: Option<&'a str>,
    pub domain: Domain,
    pub evidence: &'a [EvidenceSource],
}

impl<'a> EvalInput<'a> {
    pub fn new(query: &'a str, response: &'a str) -> Self {
        Self {
            query,
            response,
            confidence: 0.5,
            ground_truth: None,
            domain: Domain::Unknown,
            evidence: &[],
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = fairscore_core::clamp_unit(confidence);
        self
    }

    pub fn with_ground_truth(mut self, ground_truth: Option<&'a str>) -> Self {
        self.ground_truth = ground_truth;
        self
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_evidence(mut self, evidence: &'a [EvidenceSource]) -> Self {
        self.evidence = evidence;
        self
    }

    /// Ground truth, or the query when none was supplied
    pub fn reference(&self) -> &'a str {
        self.ground_truth.unwrap_or(self.query)
    }
}

/// Common view over the five score records
pub trait MetricScore {
    fn kind(&self) -> MetricKind;

    /// Weighted aggregate in [0, 1]
    fn overall(&self) -> f64;

    /// Named sub-scores, each in [0, 1]
    fn sub_scores(&self) -> BTreeMap<&'static str, f64>;

    fn details(&self) -> &Details;

    /// Error recorded when this is a fallback score
    fn error(&self) -> Option<&str> {
        self.details().get("error").and_then(MetricValue::as_str)
    }
}

/// Core trait that all metric evaluators implement
#[async_trait]
pub trait MetricEvaluator: Send + Sync {
    type Score: MetricScore + Send;

    fn kind(&self) -> MetricKind;

    /// Evaluate, surfacing internal failures
    async fn try_evaluate(&self, input: &EvalInput<'_>) -> Result<Self::Score, EvalError>;

    /// The documented default record for a failed evaluation
    fn fallback(&self, error: &str) -> Self::Score;

    /// Evaluate; never fails
    async fn evaluate(&self, input: &EvalInput<'_>) -> Self::Score {
        match self.try_evaluate(input).await {
            Ok(score) => score,
            Err(e) => {
                warn!(metric = %self.kind(), error = %e, "Evaluation failed, using default score");
                self.fallback(&e.to_string())
            }
        }
    }
}

/// Details map holding only an error entry
pub(crate) fn error_details(error: &str) -> Details {
    let mut details = Details::new();
    details.insert("error".to_string(), MetricValue::from(error));
    details
}
