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

//! Interpretability of the reasoning in a response
//!
//! The response is first reduced to a [`ReasoningStructure`] (step, causal,
//! evidence and hedging markers, logical flow between sentences, conclusion,
//! depth), from which five sub-scores are derived:
//!
//! | Sub-score                | Range      |
//! |--------------------------|------------|
//! | reasoning clarity        | [0.1, 0.6] |
//! | explanation completeness | [0, 0.5]   |
//! | step-by-step quality     | [0.3, 1]   |
//! | evidence citation        | [0, 1]     |
//! | uncertainty expression   | [0.5, 1]   |

use crate::{error_details, EvalError, EvalInput, MetricEvaluator, MetricScore};
use async_trait::async_trait;
use fairscore_core::config::InterpretabilityConfig;
use fairscore_core::lexical::words;
use fairscore_core::{clamp_unit, Details, Domain, EvidenceSource, LexicalGroup, MetricKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Reasoning markers found in a response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStructure {
    pub step_indicators: Vec<String>,
    pub causal_indicators: Vec<String>,
    pub evidence_indicators: Vec<String>,
    pub uncertainty_indicators: Vec<String>,
    /// Share of sentences after the first that contain a connector
    pub logical_flow: f64,
    pub has_conclusion: bool,
    /// Highest matched depth level, 0 when none
    pub reasoning_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretabilityScore {
    pub overall: f64,
    pub reasoning_clarity: f64,
    pub explanation_completeness: f64,
    pub step_by_step_quality: f64,
    pub evidence_citation: f64,
    pub uncertainty_expression: f64,
    pub reasoning_structure: ReasoningStructure,
    pub details: Details,
}

impl MetricScore for InterpretabilityScore {
    fn kind(&self) -> MetricKind {
        MetricKind::Interpretability
    }

    fn overall(&self) -> f64 {
        self.overall
    }

    fn sub_scores(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("reasoning_clarity", self.reasoning_clarity),
            ("explanation_completeness", self.explanation_completeness),
            ("step_by_step_quality", self.step_by_step_quality),
            ("evidence_citation", self.evidence_citation),
            ("uncertainty_expression", self.uncertainty_expression),
        ])
    }

    fn details(&self) -> &Details {
        &self.details
    }
}

#[derive(Debug, Clone)]
pub struct InterpretabilityEvaluator {
    config: InterpretabilityConfig,
}

impl InterpretabilityEvaluator {
    pub fn new(config: &InterpretabilityConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Score a response directly
    pub fn score(
        &self,
        query: &str,
        response: &str,
        domain: Domain,
        evidence: &[EvidenceSource],
    ) -> InterpretabilityScore {
        let structure = self.analyze(response);

        let reasoning_clarity = clamp_unit(self.reasoning_clarity(response, &structure));
        let explanation_completeness = clamp_unit(self.explanation_completeness(query, response, domain));
        let step_by_step_quality = clamp_unit(self.step_by_step_quality(response, &structure));
        let evidence_citation = clamp_unit(self.evidence_citation(response, &structure, evidence));
        let uncertainty_expression = clamp_unit(self.uncertainty_expression(response, &structure, domain));

        let w = &self.config.weights;
        let overall = clamp_unit(
            w.reasoning_clarity * reasoning_clarity
                + w.explanation_completeness * explanation_completeness
                + w.step_by_step_quality * step_by_step_quality
                + w.evidence_citation * evidence_citation
                + w.uncertainty_expression * uncertainty_expression,
        );

        debug!(
            reasoning_clarity,
            explanation_completeness,
            step_by_step_quality,
            evidence_citation,
            uncertainty_expression,
            overall,
            "Interpretability computed"
        );

        let mut details = Details::new();
        details.insert("domain".into(), domain.as_str().into());
        details.insert("response_length".into(), response.split_whitespace().count().into());
        details.insert("num_steps".into(), structure.step_indicators.len().into());
        details.insert("num_causal_links".into(), structure.causal_indicators.len().into());
        details.insert("num_evidence_citations".into(), structure.evidence_indicators.len().into());
        details.insert(
            "num_uncertainty_expressions".into(),
            structure.uncertainty_indicators.len().into(),
        );
        details.insert("logical_flow_score".into(), structure.logical_flow.into());
        details.insert("has_conclusion".into(), structure.has_conclusion.into());
        details.insert("reasoning_depth".into(), structure.reasoning_depth.into());

        InterpretabilityScore {
            overall,
            reasoning_clarity,
            explanation_completeness,
            step_by_step_quality,
            evidence_citation,
            uncertainty_expression,
            reasoning_structure: structure,
            details,
        }
    }

    pub fn analyze(&self, response: &str) -> ReasoningStructure {
        let cfg = &self.config;
        let lower = response.to_lowercase();

        ReasoningStructure {
            step_indicators: cfg.step_patterns.find_all(&lower),
            causal_indicators: cfg.causal_patterns.find_all(&lower),
            evidence_indicators: cfg.evidence_patterns.find_all(&lower),
            uncertainty_indicators: cfg.uncertainty_patterns.find_all(&lower),
            logical_flow: self.logical_flow(response),
            has_conclusion: cfg.conclusion_markers.any(&lower),
            reasoning_depth: self.reasoning_depth(&lower),
        }
    }

    /// Fraction of sentences after the first carrying a connector
    pub fn logical_flow(&self, response: &str) -> f64 {
        let sentences: Vec<&str> = response.split('.').collect();
        if sentences.len() < 2 {
            return 0.5;
        }
        let connected = sentences[1..]
            .iter()
            .filter(|s| self.config.connectors.any(s))
            .count();
        (connected as f64 / (sentences.len() - 1).max(1) as f64).min(1.0)
    }

    fn reasoning_depth(&self, lower: &str) -> usize {
        self.config
            .depth_levels
            .iter()
            .enumerate()
            .filter(|(_, level)| level.any(lower))
            .map(|(i, _)| i + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn reasoning_clarity(&self, response: &str, structure: &ReasoningStructure) -> f64 {
        let lower = response.to_lowercase();
        let mut score: f64 = 0.25;

        if !structure.step_indicators.is_empty() {
            score += 0.15;
        }
        if !structure.causal_indicators.is_empty() {
            score += 0.1;
        }
        if structure.logical_flow > 0.5 {
            score += 0.08 * structure.logical_flow;
        }
        if structure.has_conclusion {
            score += 0.08;
        }
        if self.config.structure_patterns.distinct_count(&lower) >= 2 {
            score += 0.12;
        }

        score -= 0.08 * self.config.confusing_phrases.count(&lower) as f64;

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for word in lower.split_whitespace() {
            *counts.entry(word).or_insert(0) += 1;
        }
        if counts.values().any(|n| *n > 3) {
            score *= 0.8;
        }

        score.clamp(0.1, 0.6)
    }

    pub fn explanation_completeness(&self, query: &str, response: &str, domain: Domain) -> f64 {
        let cfg = &self.config;
        let lower = response.to_lowercase();
        let mut score: f64 = 0.0;

        if self.addresses_question(query, response) {
            score += 0.25;
        }
        if cfg.context_markers.any(&lower) {
            score += 0.15;
        }
        if cfg.example_markers.any(&lower) {
            score += 0.1;
        }
        if cfg.limitation_markers.any(&lower) {
            score += 0.1;
        }

        score += match domain {
            Domain::Medical if cfg.medical_disclaimers.any(&lower) => 0.08,
            Domain::Finance if cfg.finance_warnings.any(&lower) => 0.08,
            Domain::Medical | Domain::Finance => 0.0,
            Domain::CrossDomain | Domain::Unknown => 0.05,
        };

        let ratio = response.split_whitespace().count() as f64
            / query.split_whitespace().count().max(1) as f64;
        if (3.0..=20.0).contains(&ratio) {
            score += 0.08;
        }

        score *= if domain.is_specialized() { 0.7 } else { 0.8 };
        score.min(0.5)
    }

    fn addresses_question(&self, query: &str, response: &str) -> bool {
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

    pub fn step_by_step_quality(&self, response: &str, structure: &ReasoningStructure) -> f64 {
        if structure.step_indicators.is_empty() {
            return 0.3;
        }

        let mut score: f64 = 0.5;
        if (2..=6).contains(&structure.step_indicators.len()) {
            score += 0.2;
        }
        if structure.logical_flow > 0.6 {
            score += 0.2;
        }
        if self.steps_are_substantial(response) {
            score += 0.1;
        }
        score.min(1.0)
    }

    /// More than half of explicit step bodies have over three words
    fn steps_are_substantial(&self, response: &str) -> bool {
        let lower = response.to_lowercase();
        let bodies: Vec<usize> = self
            .config
            .step_body_pattern
            .regex()
            .captures_iter(&lower)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().split_whitespace().count())
            .collect();

        if bodies.is_empty() {
            return false;
        }
        let substantial = bodies.iter().filter(|n| **n > 3).count();
        substantial as f64 / bodies.len() as f64 > 0.5
    }

    pub fn evidence_citation(
        &self,
        response: &str,
        structure: &ReasoningStructure,
        evidence: &[EvidenceSource],
    ) -> f64 {
        let cfg = &self.config;
        let lower = response.to_lowercase();
        let mut score: f64 = 0.0;

        if !structure.evidence_indicators.is_empty() {
            score += 0.4;
        }

        let cites_source = evidence
            .iter()
            .any(|e| !e.title.trim().is_empty() && lower.contains(&e.title.to_lowercase()));
        if cfg.citation_patterns.any(&lower) || cites_source {
            score += 0.2;
        }
        if cfg.data_patterns.any(response) {
            score += 0.1;
        }
        if structure.evidence_indicators.len() > 2 {
            score += 0.1;
        }

        score.min(1.0)
    }

    pub fn uncertainty_expression(
        &self,
        response: &str,
        structure: &ReasoningStructure,
        domain: Domain,
    ) -> f64 {
        let cfg = &self.config;
        let lower = response.to_lowercase();
        let mut score: f64 = 0.5;

        if !structure.uncertainty_indicators.is_empty() {
            score += 0.3;
        }
        if cfg.confidence_qualifiers.any(&lower) {
            score += 0.2;
        }

        let cautious = match domain {
            Domain::Medical => cfg.medical_caution.any(&lower),
            Domain::Finance => cfg.finance_caution.any(&lower),
            Domain::CrossDomain | Domain::Unknown => false,
        };
        if cautious {
            score += 0.2;
        }

        score.min(1.0)
    }
}

#[async_trait]
impl MetricEvaluator for InterpretabilityEvaluator {
    type Score = InterpretabilityScore;

    fn kind(&self) -> MetricKind {
        MetricKind::Interpretability
    }

    async fn try_evaluate(&self, input: &EvalInput<'_>) -> Result<InterpretabilityScore, EvalError> {
        Ok(self.score(input.query, input.response, input.domain, input.evidence))
    }

    fn fallback(&self, error: &str) -> InterpretabilityScore {
        InterpretabilityScore {
            overall: 0.0,
            reasoning_clarity: 0.0,
            explanation_completeness: 0.0,
            step_by_step_quality: 0.0,
            evidence_citation: 0.0,
            uncertainty_expression: 0.0,
            reasoning_structure: ReasoningStructure::default(),
            details: error_details(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairscore_core::FairConfig;

    fn evaluator() -> InterpretabilityEvaluator {
        InterpretabilityEvaluator::new(&FairConfig::builtin().unwrap().interpretability)
    }

    #[test]
    fn test_logical_flow() {
        let e = evaluator();
        assert_eq!(e.logical_flow("No full stop here"), 0.5);
        // three pieces after the split, one of the two trailing ones connected
        assert!((e.logical_flow("Rates rose. However prices fell.") - 0.5).abs() < 1e-12);
        assert_eq!(e.logical_flow("A. Therefore b"), 1.0);
    }

    #[test]
    fn test_reasoning_depth() {
        let e = evaluator();
        assert_eq!(e.analyze("Plain words").reasoning_depth, 0);
        assert_eq!(e.analyze("It fell because of rain").reasoning_depth, 1);
        assert_eq!(
            e.analyze("Because of rain, and holistically speaking, it fell").reasoning_depth,
            5
        );
    }

    #[test]
    fn test_clarity_bounds() {
        let e = evaluator();
        let plain = "ok";
        assert!((e.reasoning_clarity(plain, &e.analyze(plain)) - 0.25).abs() < 1e-12);

        let muddled = "um uh sort of kind of maybe not";
        assert_eq!(e.reasoning_clarity(muddled, &e.analyze(muddled)), 0.1);

        let structured = "Step 1: collect data. Step 2: compare because trends differ. \
                          Therefore, in conclusion, the first option wins.";
        let score = e.reasoning_clarity(structured, &e.analyze(structured));
        assert!(score <= 0.6 && score > 0.5);
    }

    #[test]
    fn test_repetition_penalty() {
        let e = evaluator();
        let text = "money money money money";
        assert!((e.reasoning_clarity(text, &e.analyze(text)) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_completeness_domain_scaling() {
        let e = evaluator();
        let query = "What is inflation?";
        let response = "Inflation is typically a general rise in prices, for example food costs. \
                        However it varies by country.";
        let general = e.explanation_completeness(query, response, Domain::Unknown);
        let finance = e.explanation_completeness(query, response, Domain::Finance);
        // general: (0.25 + 0.15 + 0.1 + 0.1 + 0.05 + 0.08) * 0.8, capped
        assert_eq!(general, 0.5);
        // finance without a risk warning: 0.68 * 0.7
        assert!((finance - 0.476).abs() < 1e-9);
    }

    #[test]
    fn test_step_quality() {
        let e = evaluator();
        let none = "Just an answer";
        assert_eq!(e.step_by_step_quality(none, &e.analyze(none)), 0.3);

        let steps = "Step 1: gather every receipt from the year. Step 2: total the deductible amounts carefully.";
        let quality = e.step_by_step_quality(steps, &e.analyze(steps));
        assert!(quality >= 0.6);
        assert!(e.steps_are_substantial(steps));
    }

    #[test]
    fn test_evidence_citation() {
        let e = evaluator();
        let none = "An opinion";
        assert_eq!(e.evidence_citation(none, &e.analyze(none), &[]), 0.0);

        let cited = "According to the survey [1], research shows 45% agree.";
        let score = e.evidence_citation(cited, &e.analyze(cited), &[]);
        // three evidence matches, a bracket citation and a statistic
        assert!((score - 0.8).abs() < 1e-12);

        let titled = "The Insulin Handbook says so";
        let sources = vec![EvidenceSource::new("Insulin Handbook", "...", 0.9)];
        assert!((e.evidence_citation(titled, &e.analyze(titled), &sources) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_uncertainty_expression() {
        let e = evaluator();
        let bare = "Take it";
        assert_eq!(e.uncertainty_expression(bare, &e.analyze(bare), Domain::Medical), 0.5);

        let hedged = "It might help; results are possibly better. Consult doctor first.";
        assert_eq!(
            e.uncertainty_expression(hedged, &e.analyze(hedged), Domain::Medical),
            1.0
        );
    }

    #[test]
    fn test_sub_scores_saturate_at_caps() {
        let e = evaluator();
        let query = "Should I take insulin?";
        let response = "Step 1: check your blood sugar before every meal. \
                        Step 2: therefore adjust the insulin dose with your doctor. \
                        According to research [1], studies show 45% of patients might \
                        possibly improve; for example diet matters. However results vary. \
                        Consult doctor first, this is not medical advice.";
        let structure = e.analyze(response);

        let completeness = e.explanation_completeness(query, response, Domain::CrossDomain);
        assert!(completeness > 0.0 && completeness <= 0.5);
        let steps = e.step_by_step_quality(response, &structure);
        assert!(steps >= 0.7 && steps <= 1.0);
        let evidence = e.evidence_citation(response, &structure, &[]);
        assert!(evidence >= 0.7 - 1e-9 && evidence <= 1.0);
        assert_eq!(e.uncertainty_expression(response, &structure, Domain::Medical), 1.0);
    }

    #[tokio::test]
    async fn test_evaluate_scores_in_range() {
        let e = evaluator();
        let input = EvalInput::new(
            "How should I start investing?",
            "First, set a budget. Then diversify because markets are volatile. Past performance is not guaranteed.",
        )
        .with_domain(Domain::Finance);
        let score = e.evaluate(&input).await;
        assert!(score.error().is_none());
        assert!((0.0..=1.0).contains(&score.overall));
        assert!(score.reasoning_clarity <= 0.6);
        assert!(score.explanation_completeness <= 0.5);
        assert!(score.details.contains_key("reasoning_depth"));
    }

    #[test]
    fn test_fallback() {
        let score = evaluator().fallback("oops");
        assert_eq!(score.overall, 0.0);
        assert_eq!(score.reasoning_structure, ReasoningStructure::default());
    }
}
