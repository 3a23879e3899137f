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

//! Robustness to query perturbations
//!
//! Two modes:
//!
//! - **Dynamic** (a [`ResponseGenerator`] is attached): the query is
//!   perturbed along three axes, each variant is sent to the generator and
//!   the answers are compared with the baseline answer.
//! - **Static** (no generator): robustness is estimated from the response
//!   text alone (contradictions, flow, topic coherence, specificity).
//!
//! Perturbations are deterministic: the RNG is seeded from the configured
//! seed, the axis and the query text, so one query always yields the same
//! variants. Generator calls run with bounded concurrency, each under its own
//! timeout; a failed or timed-out call is a penalty for that variant only.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let evaluator = RobustnessEvaluator::new(&config.robustness)
//!     .with_generator(Arc::new(my_generator));
//! let score = evaluator.evaluate_query("What is a bond?", None, Domain::Finance).await?;
//! for axis in &score.axes {
//!     println!("{}: {:.2}", axis.axis, axis.score);
//! }
//! ```

use crate::generator::{Generation, ResponseGenerator};
use crate::{error_details, EvalError, EvalInput, MetricEvaluator, MetricScore};
use async_trait::async_trait;
use fairscore_core::config::RobustnessConfig;
use fairscore_core::lexical::{jaccard, words};
use fairscore_core::{clamp_unit, Details, Domain, LexicalGroup, MetricKind, MetricValue};
use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use twox_hash::XxHash64;

/// Scaling applied to the weighted axis combination
const FRAGILITY_SCALE: f64 = 0.8;
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerturbationAxis {
    /// Synonym substitution
    Semantic,
    /// Typos and character edits
    Syntactic,
    /// Injected prefixes and distractors
    Adversarial,
}

impl PerturbationAxis {
    pub const ALL: [PerturbationAxis; 3] = [
        PerturbationAxis::Semantic,
        PerturbationAxis::Syntactic,
        PerturbationAxis::Adversarial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PerturbationAxis::Semantic => "semantic",
            PerturbationAxis::Syntactic => "syntactic",
            PerturbationAxis::Adversarial => "adversarial",
        }
    }
}

impl fmt::Display for PerturbationAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Static,
    Dynamic,
}

/// Outcome of one perturbation axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisResult {
    pub axis: PerturbationAxis,
    pub variants: Vec<String>,
    pub similarities: Vec<f64>,
    /// Confidence consistency per variant, or confidence drop on the
    /// adversarial axis
    pub confidence_signals: Vec<f64>,
    pub mean_similarity: f64,
    pub mean_confidence_signal: f64,
    pub failures: usize,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustnessScore {
    pub overall: f64,
    pub semantic_robustness: f64,
    pub syntactic_robustness: f64,
    pub adversarial_robustness: f64,
    /// Static: consistency indicators. Dynamic: mean similarity over all variants.
    pub consistency_score: f64,
    /// Static: estimated resistance. Dynamic: weighted axes before scaling.
    pub perturbation_resistance: f64,
    pub mode: AnalysisMode,
    /// Empty in static mode
    pub axes: Vec<AxisResult>,
    pub details: Details,
}

impl MetricScore for RobustnessScore {
    fn kind(&self) -> MetricKind {
        MetricKind::Robustness
    }

    fn overall(&self) -> f64 {
        self.overall
    }

    fn sub_scores(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("semantic_robustness", self.semantic_robustness),
            ("syntactic_robustness", self.syntactic_robustness),
            ("adversarial_robustness", self.adversarial_robustness),
            ("consistency_score", self.consistency_score),
            ("perturbation_resistance", self.perturbation_resistance),
        ])
    }

    fn details(&self) -> &Details {
        &self.details
    }
}

pub struct RobustnessEvaluator {
    config: RobustnessConfig,
    generator: Option<Arc<dyn ResponseGenerator>>,
}

impl RobustnessEvaluator {
    pub fn new(config: &RobustnessConfig) -> Self {
        Self {
            config: config.clone(),
            generator: None,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn ResponseGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn is_dynamic(&self) -> bool {
        self.generator.is_some()
    }

    // ========================================================================
    // Dynamic mode
    // ========================================================================

    /// Perturb `query`, re-run the generator and compare with the baseline
    ///
    /// The baseline is generated first when not supplied; failing to produce
    /// it is an error, while per-variant failures are only penalties.
    pub async fn evaluate_query(
        &self,
        query: &str,
        baseline: Option<Generation>,
        domain: Domain,
    ) -> Result<RobustnessScore, EvalError> {
        let generator = self
            .generator
            .as_deref()
            .ok_or_else(|| EvalError::InvalidInput("no response generator attached".to_string()))?;

        let baseline = match baseline {
            Some(baseline) => baseline,
            None => self.generate_with_timeout(generator, query).await?,
        };

        let mut axes = Vec::with_capacity(PerturbationAxis::ALL.len());
        for axis in PerturbationAxis::ALL {
            let variants = self.perturbations(query, axis);
            axes.push(self.run_axis(generator, axis, variants, &baseline).await);
        }

        let axis_score = |axis: PerturbationAxis| {
            axes.iter().find(|a| a.axis == axis).map_or(0.0, |a| a.score)
        };
        let semantic = clamp_unit(axis_score(PerturbationAxis::Semantic));
        let syntactic = clamp_unit(axis_score(PerturbationAxis::Syntactic));
        let adversarial = clamp_unit(axis_score(PerturbationAxis::Adversarial));

        let combined = self.combine(semantic, syntactic, adversarial);
        let all_similarities: Vec<f64> = axes.iter().flat_map(|a| a.similarities.iter().copied()).collect();
        let consistency = mean(&all_similarities);
        let failures: usize = axes.iter().map(|a| a.failures).sum();

        debug!(semantic, syntactic, adversarial, failures, "Dynamic robustness computed");

        let mut details = self.base_details(query, &baseline.response, domain, AnalysisMode::Dynamic);
        details.insert("generator_failures".into(), failures.into());
        details.insert("baseline_confidence".into(), baseline.confidence.into());

        Ok(RobustnessScore {
            overall: clamp_unit(combined * FRAGILITY_SCALE),
            semantic_robustness: semantic,
            syntactic_robustness: syntactic,
            adversarial_robustness: adversarial,
            consistency_score: clamp_unit(consistency),
            perturbation_resistance: clamp_unit(combined),
            mode: AnalysisMode::Dynamic,
            axes,
            details,
        })
    }

    async fn generate_with_timeout(
        &self,
        generator: &dyn ResponseGenerator,
        query: &str,
    ) -> Result<Generation, EvalError> {
        let timeout = Duration::from_millis(self.config.generator_timeout_ms);
        match tokio::time::timeout(timeout, generator.generate(query)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(EvalError::Timeout),
        }
    }

    async fn run_axis(
        &self,
        generator: &dyn ResponseGenerator,
        axis: PerturbationAxis,
        variants: Vec<String>,
        baseline: &Generation,
    ) -> AxisResult {
        let outcomes: Vec<Option<Generation>> = stream::iter(variants.iter().cloned())
            .map(move |variant| async move {
                match self.generate_with_timeout(generator, &variant).await {
                    Ok(generation) => Some(generation),
                    Err(e) => {
                        warn!(%axis, error = %e, "Generator failed on perturbed query");
                        None
                    }
                }
            })
            .buffered(self.config.max_concurrency)
            .collect()
            .await;

        let mut similarities = Vec::with_capacity(outcomes.len());
        let mut signals = Vec::with_capacity(outcomes.len());
        let mut failures = 0;

        for outcome in &outcomes {
            match outcome {
                Some(generation) => {
                    similarities.push(response_similarity(&baseline.response, &generation.response));
                    let delta = baseline.confidence - generation.confidence;
                    signals.push(match axis {
                        PerturbationAxis::Adversarial => delta.max(0.0),
                        _ => 1.0 - delta.abs(),
                    });
                }
                None => {
                    failures += 1;
                    similarities.push(0.0);
                    signals.push(match axis {
                        PerturbationAxis::Adversarial => 1.0,
                        _ => 0.0,
                    });
                }
            }
        }

        let mean_similarity = mean(&similarities);
        let mean_signal = mean(&signals);
        let score = match axis {
            PerturbationAxis::Semantic => 0.7 * mean_similarity + 0.3 * mean_signal,
            PerturbationAxis::Syntactic => 0.8 * mean_similarity + 0.2 * mean_signal,
            PerturbationAxis::Adversarial => 0.6 * mean_similarity + 0.4 * (1.0 - mean_signal),
        };

        AxisResult {
            axis,
            variants,
            similarities,
            confidence_signals: signals,
            mean_similarity,
            mean_confidence_signal: mean_signal,
            failures,
            score: clamp_unit(score),
        }
    }

    // ========================================================================
    // Perturbations
    // ========================================================================

    /// Deterministic variants of `query` along one axis
    pub fn perturbations(&self, query: &str, axis: PerturbationAxis) -> Vec<String> {
        let mut rng = self.rng_for(query, axis);
        (0..self.config.variants_per_axis)
            .map(|_| match axis {
                PerturbationAxis::Semantic => self.semantic_variant(query, &mut rng),
                PerturbationAxis::Syntactic => self.syntactic_variant(query, &mut rng),
                PerturbationAxis::Adversarial => self.adversarial_variant(query, &mut rng),
            })
            .collect()
    }

    fn rng_for(&self, query: &str, axis: PerturbationAxis) -> StdRng {
        let mut hasher = XxHash64::with_seed(self.config.seed);
        hasher.write(axis.as_str().as_bytes());
        hasher.write(query.as_bytes());
        StdRng::seed_from_u64(hasher.finish())
    }

    fn semantic_variant(&self, query: &str, rng: &mut StdRng) -> String {
        let original: Vec<&str> = query.split_whitespace().collect();
        if original.is_empty() {
            return query.to_string();
        }

        let n_changes = ((original.len() as f64 * self.config.perturbation_ratio) as usize)
            .max(1)
            .min(original.len());
        let mut perturbed: Vec<String> = original.iter().map(|w| w.to_string()).collect();

        for pos in rand::seq::index::sample(rng, original.len(), n_changes).iter() {
            let word = original[pos].to_lowercase();
            if let Some(synonym) = self.config.synonyms.get(&word).and_then(|s| s.choose(rng)) {
                perturbed[pos] = synonym.clone();
            }
        }
        perturbed.join(" ")
    }

    fn syntactic_variant(&self, query: &str, rng: &mut StdRng) -> String {
        let mut text = query.to_string();
        for rule in &self.config.typos {
            if text.contains(rule.word.as_str()) && rng.gen_bool(self.config.typo_probability) {
                text = text.replacen(rule.word.as_str(), &rule.typo, 1);
            }
        }

        let mut chars: Vec<char> = text.chars().collect();
        let n_changes = ((chars.len() as f64 * self.config.perturbation_ratio * 0.1) as usize).max(1);

        for _ in 0..n_changes {
            if chars.len() <= 1 {
                break;
            }
            let pos = rng.gen_range(0..chars.len());
            match rng.gen_range(0..4) {
                0 if chars[pos].is_alphabetic() => chars[pos] = random_letter(rng),
                1 => {
                    chars.remove(pos);
                }
                2 => chars.insert(pos, random_letter(rng)),
                3 if pos + 1 < chars.len() => chars.swap(pos, pos + 1),
                _ => {}
            }
        }
        chars.into_iter().collect()
    }

    fn adversarial_variant(&self, query: &str, rng: &mut StdRng) -> String {
        let prefix = self
            .config
            .adversarial_prefixes
            .choose(rng)
            .map(String::as_str)
            .unwrap_or_default();
        let mut variant = format!("{}{}", prefix, query);

        if rng.gen_bool(self.config.distractor_probability) {
            let boundaries: Vec<usize> = query
                .char_indices()
                .map(|(i, _)| i)
                .chain(std::iter::once(query.len()))
                .collect();
            let at = boundaries[rng.gen_range(0..boundaries.len())];
            if let Some(distractor) = self.config.distractors.choose(rng) {
                variant = format!("{}{}{}", &query[..at], distractor, &query[at..]);
            }
        }
        variant
    }

    // ========================================================================
    // Static mode
    // ========================================================================

    /// Estimate robustness from the response text alone
    pub fn static_score(&self, query: &str, response: &str, domain: Domain) -> RobustnessScore {
        let consistency = self.consistency_indicators(query, response);
        let resistance = self.estimated_resistance(response, domain);

        let semantic = (consistency * 0.6).min(0.5);
        let syntactic = (resistance * 0.7).min(0.45);
        let adversarial = (resistance * 0.4).min(0.3);
        let overall = clamp_unit(self.combine(semantic, syntactic, adversarial) * FRAGILITY_SCALE);

        debug!(consistency, resistance, overall, "Static robustness computed");

        RobustnessScore {
            overall,
            semantic_robustness: clamp_unit(semantic),
            syntactic_robustness: clamp_unit(syntactic),
            adversarial_robustness: clamp_unit(adversarial),
            consistency_score: clamp_unit(consistency),
            perturbation_resistance: clamp_unit(resistance),
            mode: AnalysisMode::Static,
            axes: Vec::new(),
            details: self.base_details(query, response, domain, AnalysisMode::Static),
        }
    }

    fn consistency_indicators(&self, query: &str, response: &str) -> f64 {
        let lower = response.to_lowercase();
        let mut score = 0.5;

        let contradicts = self
            .config
            .contradiction_pairs
            .iter()
            .any(|p| lower.contains(p.first.as_str()) && lower.contains(p.second.as_str()));
        if !contradicts {
            score += 0.2;
        }
        if self.config.flow_words.any(&lower) {
            score += 0.15;
        }
        if self.on_topic(query, response) {
            score += 0.15;
        }
        if response.split_whitespace().count() > 100 {
            score *= 0.9;
        }
        f64::min(score, 0.8)
    }

    fn on_topic(&self, query: &str, response: &str) -> bool {
        let query_terms: HashSet<String> = words(query)
            .into_iter()
            .filter(|w| !self.config.stopwords.contains(w))
            .collect();
        if query_terms.is_empty() {
            return true;
        }
        let response_terms: HashSet<String> = words(response).into_iter().collect();
        query_terms.intersection(&response_terms).count() as f64 / query_terms.len() as f64 > 0.3
    }

    fn estimated_resistance(&self, response: &str, domain: Domain) -> f64 {
        let mut score = 0.4;
        if self.config.specific_fact_patterns.any(response) {
            score -= 0.1;
        }
        if self.config.generic_phrases.any(response) {
            score += 0.1;
        }
        if domain.is_specialized() {
            score *= 0.8;
        }
        f64::min(score, 0.6)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn combine(&self, semantic: f64, syntactic: f64, adversarial: f64) -> f64 {
        let w = &self.config.weights;
        w.semantic * semantic + w.syntactic * syntactic + w.adversarial * adversarial
    }

    fn base_details(&self, query: &str, response: &str, domain: Domain, mode: AnalysisMode) -> Details {
        let w = &self.config.weights;
        let mut details = Details::new();
        details.insert("query".into(), query.into());
        details.insert("response_length".into(), response.split_whitespace().count().into());
        details.insert("domain".into(), domain.as_str().into());
        details.insert(
            "analysis_type".into(),
            match mode {
                AnalysisMode::Static => "static",
                AnalysisMode::Dynamic => "dynamic",
            }
            .into(),
        );
        details.insert(
            "weights".into(),
            MetricValue::Object(BTreeMap::from([
                ("semantic".to_string(), w.semantic.into()),
                ("syntactic".to_string(), w.syntactic.into()),
                ("adversarial".to_string(), w.adversarial.into()),
            ])),
        );
        details
    }
}

#[async_trait]
impl MetricEvaluator for RobustnessEvaluator {
    type Score = RobustnessScore;

    fn kind(&self) -> MetricKind {
        MetricKind::Robustness
    }

    async fn try_evaluate(&self, input: &EvalInput<'_>) -> Result<RobustnessScore, EvalError> {
        if self.is_dynamic() {
            let baseline = Generation::new(input.response, input.confidence);
            self.evaluate_query(input.query, Some(baseline), input.domain).await
        } else {
            Ok(self.static_score(input.query, input.response, input.domain))
        }
    }

    fn fallback(&self, error: &str) -> RobustnessScore {
        RobustnessScore {
            overall: 0.2,
            semantic_robustness: 0.0,
            syntactic_robustness: 0.0,
            adversarial_robustness: 0.0,
            consistency_score: 0.3,
            perturbation_resistance: 0.2,
            mode: if self.is_dynamic() {
                AnalysisMode::Dynamic
            } else {
                AnalysisMode::Static
            },
            axes: Vec::new(),
            details: error_details(error),
        }
    }
}

/// Jaccard similarity of lowercase whitespace tokens
pub fn response_similarity(a: &str, b: &str) -> f64 {
    let a: HashSet<String> = words(a).into_iter().collect();
    let b: HashSet<String> = words(b).into_iter().collect();
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => jaccard(&a, &b),
    }
}

fn random_letter(rng: &mut StdRng) -> char {
    LETTERS[rng.gen_range(0..LETTERS.len())] as char
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
