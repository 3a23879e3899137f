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

//! Evaluation orchestrator
//!
//! Routes the query, gathers optional evidence, runs all five evaluators and
//! folds the result into an [`EvaluationReport`]. Evaluation never fails: an
//! evaluator that errors or panics is replaced by its default score with the
//! error recorded in `details.error`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let orchestrator = Orchestrator::builder()
//!     .with_evidence_provider(Arc::new(StaticEvidence::new(sources)))
//!     .build()?;
//!
//! let report = orchestrator
//!     .evaluate(EvaluationRequest::new(query, response, 0.8).with_ground_truth(truth))
//!     .await;
//! ```

use crate::embedding::EmbeddingClient;
use crate::enhance::{EnhancedText, EnhancementChain};
use crate::evaluators::{
    CalibrationEvaluator, FaithfulnessEvaluator, InterpretabilityEvaluator, RobustnessEvaluator,
    SafetyEvaluator,
};
use crate::evidence::EvidenceProvider;
use crate::generator::ResponseGenerator;
use crate::quality::{assess_quality, fallback_template, QualityAssessment};
use crate::report::{BatchSummary, EvaluationReport, FairScore};
use crate::{EvalError, EvalInput, MetricEvaluator};
use fairscore_core::{Domain, DomainRouter, EvidenceSource, FairConfig, Query, RoutingDecision};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_EVIDENCE_TOP_K: usize = 5;
pub const DEFAULT_EVIDENCE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// One (query, response) pair to score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub query: String,
    pub response: String,
    pub confidence: f64,
    #[serde(default)]
    pub ground_truth: Option<String>,
    /// Bypasses routing when set
    #[serde(default)]
    pub domain: Option<Domain>,
}

impl EvaluationRequest {
    pub fn new(query: impl Into<String>, response: impl Into<String>, confidence: f64) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
            confidence,
            ground_truth: None,
            domain: None,
        }
    }

    pub fn with_ground_truth(mut self, ground_truth: impl Into<String>) -> Self {
        self.ground_truth = Some(ground_truth.into());
        self
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }
}

/// What to show a user, with the gate and chain results that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presentation {
    pub text: String,
    pub quality: QualityAssessment,
    /// The candidate was replaced by a domain template
    pub substituted: bool,
    pub enhancement: EnhancedText,
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Default)]
pub struct OrchestratorBuilder {
    config: Option<FairConfig>,
    generator: Option<Arc<dyn ResponseGenerator>>,
    evidence_provider: Option<Arc<dyn EvidenceProvider>>,
    embedding_client: Option<Arc<dyn EmbeddingClient>>,
    enhancers: Option<EnhancementChain>,
    evidence_top_k: Option<usize>,
    evidence_timeout: Option<Duration>,
    batch_concurrency: Option<usize>,
}

impl OrchestratorBuilder {
    pub fn with_config(mut self, config: FairConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Switches robustness to dynamic perturbation
    pub fn with_generator(mut self, generator: Arc<dyn ResponseGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_evidence_provider(mut self, provider: Arc<dyn EvidenceProvider>) -> Self {
        self.evidence_provider = Some(provider);
        self
    }

    pub fn with_embedding_client(mut self, client: Arc<dyn EmbeddingClient>) -> Self {
        self.embedding_client = Some(client);
        self
    }

    /// Replaces the standard disclaimer + referral chain
    pub fn with_enhancers(mut self, chain: EnhancementChain) -> Self {
        self.enhancers = Some(chain);
        self
    }

    pub fn with_evidence_top_k(mut self, top_k: usize) -> Self {
        self.evidence_top_k = Some(top_k);
        self
    }

    pub fn with_evidence_timeout(mut self, timeout: Duration) -> Self {
        self.evidence_timeout = Some(timeout);
        self
    }

    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = Some(concurrency);
        self
    }

    /// Validate the configuration and wire up the evaluators
    pub fn build(self) -> Result<Orchestrator, EvalError> {
        let config = match self.config {
            Some(config) => {
                config.validate()?;
                config
            }
            None => FairConfig::builtin()?,
        };

        for metric in config.fair.duplicate_metrics() {
            warn!(
                metric = metric.as_str(),
                "FAIR weight listed more than once, last entry wins"
            );
        }

        let mut faithfulness = FaithfulnessEvaluator::new(&config.faithfulness);
        if let Some(client) = self.embedding_client {
            faithfulness = faithfulness.with_embedding_client(client);
        }

        let mut robustness = RobustnessEvaluator::new(&config.robustness);
        if let Some(generator) = self.generator {
            robustness = robustness.with_generator(generator);
        }

        let enhancers = self
            .enhancers
            .unwrap_or_else(|| EnhancementChain::standard(&config.safety));

        Ok(Orchestrator {
            router: DomainRouter::new(&config.router),
            calibration: CalibrationEvaluator::new(&config.calibration),
            safety: SafetyEvaluator::new(&config.safety),
            interpretability: InterpretabilityEvaluator::new(&config.interpretability),
            faithfulness,
            robustness,
            evidence_provider: self.evidence_provider,
            enhancers,
            evidence_top_k: self.evidence_top_k.unwrap_or(DEFAULT_EVIDENCE_TOP_K),
            evidence_timeout: self.evidence_timeout.unwrap_or(DEFAULT_EVIDENCE_TIMEOUT),
            batch_concurrency: self.batch_concurrency.unwrap_or(DEFAULT_BATCH_CONCURRENCY).max(1),
            config: Arc::new(config),
        })
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Single entry point combining routing and all five metrics
pub struct Orchestrator {
    config: Arc<FairConfig>,
    router: DomainRouter,
    faithfulness: FaithfulnessEvaluator,
    calibration: CalibrationEvaluator,
    safety: SafetyEvaluator,
    interpretability: InterpretabilityEvaluator,
    robustness: RobustnessEvaluator,
    evidence_provider: Option<Arc<dyn EvidenceProvider>>,
    enhancers: EnhancementChain,
    evidence_top_k: usize,
    evidence_timeout: Duration,
    batch_concurrency: usize,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn config(&self) -> &FairConfig {
        &self.config
    }

    pub fn router(&self) -> &DomainRouter {
        &self.router
    }

    pub fn faithfulness(&self) -> &FaithfulnessEvaluator {
        &self.faithfulness
    }

    pub fn calibration(&self) -> &CalibrationEvaluator {
        &self.calibration
    }

    pub fn safety(&self) -> &SafetyEvaluator {
        &self.safety
    }

    pub fn interpretability(&self) -> &InterpretabilityEvaluator {
        &self.interpretability
    }

    pub fn robustness(&self) -> &RobustnessEvaluator {
        &self.robustness
    }

    /// Route a query, honoring a declared domain
    pub fn route(&self, query: &str, declared: Option<Domain>) -> RoutingDecision {
        let mut q = Query::new(query);
        if let Some(domain) = declared {
            q = q.with_domain(domain);
        }
        self.router.route_query(&q)
    }

    /// Score one pair. Always returns a complete report.
    pub async fn evaluate(&self, request: EvaluationRequest) -> EvaluationReport {
        let routing = self.route(&request.query, request.domain);
        let domain = routing.domain;
        debug!(domain = %domain, rule = %routing.rule, "Routed query");

        let evidence = self.fetch_evidence(&request.query, domain).await;

        let input = EvalInput::new(&request.query, &request.response)
            .with_confidence(request.confidence)
            .with_ground_truth(request.ground_truth.as_deref())
            .with_domain(domain)
            .with_evidence(&evidence);

        let (faithfulness, calibration, safety, interpretability, robustness) = tokio::join!(
            run_isolated(&self.faithfulness, &input),
            run_isolated(&self.calibration, &input),
            run_isolated(&self.safety, &input),
            run_isolated(&self.interpretability, &input),
            run_isolated(&self.robustness, &input),
        );

        let fair_score = FairScore::compute(
            &self.config.fair,
            &faithfulness,
            &calibration,
            &safety,
            &interpretability,
        );
        let quality = assess_quality(&self.config.safety, &request.query, &request.response);

        info!(
            domain = %domain,
            fair_score = fair_score.overall,
            faithfulness = faithfulness.overall,
            safety = safety.overall,
            interpretability = interpretability.overall,
            quality_passed = quality.passed,
            "Evaluation complete"
        );

        EvaluationReport {
            domain,
            routing,
            faithfulness,
            calibration,
            safety,
            interpretability,
            robustness,
            fair_score,
            quality,
        }
    }

    /// Score many pairs with bounded concurrency; reports keep input order
    pub async fn evaluate_batch(
        &self,
        requests: Vec<EvaluationRequest>,
    ) -> (Vec<EvaluationReport>, BatchSummary) {
        let reports: Vec<EvaluationReport> = stream::iter(requests)
            .map(|request| self.evaluate(request))
            .buffered(self.batch_concurrency)
            .collect()
            .await;

        let summary = BatchSummary::from_reports(&reports, self.config.fair.pass_threshold);
        info!(
            count = summary.count,
            mean_fair_score = summary.mean_fair_score,
            passed = summary.passed,
            "Batch evaluation complete"
        );
        (reports, summary)
    }

    /// Text to show a user. Scores are unaffected.
    pub fn present(&self, query: &str, response: &str, domain: Domain) -> Presentation {
        let quality = assess_quality(&self.config.safety, query, response);
        let base = if quality.passed {
            response
        } else {
            debug!(reasons = ?quality.reasons, "Candidate failed quality gate, using template");
            fallback_template(domain, &quality)
        };

        let enhancement = self.enhancers.apply(base, query, domain);
        Presentation {
            text: enhancement.text.clone(),
            substituted: !quality.passed,
            quality,
            enhancement,
        }
    }

    async fn fetch_evidence(&self, query: &str, domain: Domain) -> Vec<EvidenceSource> {
        let Some(provider) = &self.evidence_provider else {
            return Vec::new();
        };

        let search = provider.search(query, domain, self.evidence_top_k);
        match tokio::time::timeout(self.evidence_timeout, search).await {
            Ok(Ok(sources)) => {
                debug!(count = sources.len(), "Retrieved evidence");
                sources
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Evidence search failed, continuing without evidence");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.evidence_timeout.as_millis() as u64,
                    "Evidence search timed out, continuing without evidence"
                );
                Vec::new()
            }
        }
    }
}

/// Run one evaluator, turning a panic into its default score
async fn run_isolated<E: MetricEvaluator>(evaluator: &E, input: &EvalInput<'_>) -> E::Score {
    match AssertUnwindSafe(evaluator.evaluate(input)).catch_unwind().await {
        Ok(score) => score,
        Err(payload) => {
            let error = EvalError::Panic(panic_message(&*payload));
            warn!(metric = %evaluator.kind(), error = %error, "Evaluator panicked, using default score");
            evaluator.fallback(&error.to_string())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
