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

//! Faithfulness of a response to its reference
//!
//! Four sub-scores, combined with the configured weights:
//!
//! - **Token overlap**: Jaccard and F1 over token sets, damped for low
//!   overlap and odd length ratios, capped at 0.6
//! - **Semantic similarity**: embedding cosine when an [`EmbeddingClient`] is
//!   attached, word-overlap ratio otherwise
//! - **Factual consistency**: key-term agreement between fact-like sentences
//! - **Citation accuracy**: citations found against evidence supplied
//!
//! The reference is the ground truth, or the query when none is given.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let evaluator = FaithfulnessEvaluator::new(&config.faithfulness)
//!     .with_embedding_client(Arc::new(my_client));
//! let input = EvalInput::new(query, response).with_ground_truth(Some(truth));
//! let score = evaluator.evaluate(&input).await;
//! ```

use crate::embedding::{cosine_similarity, EmbeddingClient};
use crate::{error_details, EvalError, EvalInput, MetricEvaluator, MetricScore};
use async_trait::async_trait;
use fairscore_core::config::FaithfulnessConfig;
use fairscore_core::lexical::{jaccard, plain_words, LexicalGroup};
use fairscore_core::{clamp_unit, Details, MetricKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

const TOKEN_OVERLAP_CAP: f64 = 0.6;
const EMBEDDING_CAP: f64 = 0.65;
const FALLBACK_CAP: f64 = 0.5;
const HIGH_SIMILARITY: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaithfulnessScore {
    pub overall: f64,
    pub token_overlap: f64,
    pub semantic_similarity: f64,
    pub factual_consistency: f64,
    pub citation_accuracy: f64,
    pub details: Details,
}

impl MetricScore for FaithfulnessScore {
    fn kind(&self) -> MetricKind {
        MetricKind::Faithfulness
    }

    fn overall(&self) -> f64 {
        self.overall
    }

    fn sub_scores(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("token_overlap", self.token_overlap),
            ("semantic_similarity", self.semantic_similarity),
            ("factual_consistency", self.factual_consistency),
            ("citation_accuracy", self.citation_accuracy),
        ])
    }

    fn details(&self) -> &Details {
        &self.details
    }
}

pub struct FaithfulnessEvaluator {
    config: FaithfulnessConfig,
    embedding_client: Option<Arc<dyn EmbeddingClient>>,
}

impl FaithfulnessEvaluator {
    pub fn new(config: &FaithfulnessConfig) -> Self {
        Self {
            config: config.clone(),
            embedding_client: None,
        }
    }

    pub fn with_embedding_client(mut self, client: Arc<dyn EmbeddingClient>) -> Self {
        self.embedding_client = Some(client);
        self
    }

    pub fn has_embeddings(&self) -> bool {
        self.embedding_client.is_some()
    }

    /// Jaccard/F1 blend, damped and capped
    pub fn token_overlap(&self, response: &str, reference: &str) -> f64 {
        let response_words = plain_words(response);
        let reference_words = plain_words(reference);
        let response_tokens: HashSet<&str> = response_words.iter().map(String::as_str).collect();
        let reference_tokens: HashSet<&str> = reference_words.iter().map(String::as_str).collect();

        if reference_tokens.is_empty() {
            return 0.0;
        }

        let common = response_tokens.intersection(&reference_tokens).count() as f64;
        let precision = if response_tokens.is_empty() {
            0.0
        } else {
            common / response_tokens.len() as f64
        };
        let recall = common / reference_tokens.len() as f64;
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        let base = (jaccard(&response_tokens, &reference_tokens) + f1) / 2.0;

        let length_ratio = response_words.len() as f64 / reference_words.len() as f64;
        let mut penalty = if (0.5..=2.0).contains(&length_ratio) { 1.0 } else { 0.8 };
        if recall < 0.3 {
            penalty *= 0.7;
        }

        (base * penalty).min(TOKEN_OVERLAP_CAP)
    }

    /// Embedding cosine, or word-overlap ratio without a client
    ///
    /// Both texts go to the client in one `embed_batch` call.
    pub async fn semantic_similarity(&self, response: &str, reference: &str) -> f64 {
        if let Some(client) = &self.embedding_client {
            let texts = [response.to_string(), reference.to_string()];
            match client.embed_batch(&texts).await {
                Ok(vectors) => match vectors.as_slice() {
                    [a, b] => {
                        if let Some(cosine) = cosine_similarity(a, b) {
                            let mut similarity = cosine.max(0.0);
                            if similarity > HIGH_SIMILARITY {
                                similarity *= 0.7;
                            }
                            return similarity.min(EMBEDDING_CAP);
                        }
                        debug!("Degenerate embeddings, using word overlap");
                    }
                    other => {
                        warn!(returned = other.len(), "Embedding batch size mismatch, using word overlap");
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Embedding failed, using word overlap");
                }
            }
        }
        self.word_overlap_similarity(response, reference)
    }

    fn word_overlap_similarity(&self, response: &str, reference: &str) -> f64 {
        let response_words: HashSet<String> = plain_words(response).into_iter().collect();
        let reference_words: HashSet<String> = plain_words(reference).into_iter().collect();

        if reference_words.is_empty() {
            return 0.0;
        }

        let mut ratio =
            response_words.intersection(&reference_words).count() as f64 / reference_words.len() as f64;
        if ratio > 0.6 {
            ratio *= 0.8;
        }
        ratio.min(FALLBACK_CAP)
    }

    /// Share of response facts backed by some reference fact
    pub fn factual_consistency(&self, response: &str, reference: &str, context: Option<&str>) -> f64 {
        let reference_facts = self.extract_facts(reference);
        let response_facts = self.extract_facts(response);

        if reference_facts.is_empty() {
            return 0.8;
        }
        if response_facts.is_empty() {
            return 0.5;
        }

        let reference_terms: Vec<HashSet<String>> =
            reference_facts.iter().map(|f| self.key_terms(f)).collect();

        let consistent = response_facts
            .iter()
            .filter(|fact| {
                let terms = self.key_terms(fact);
                !terms.is_empty()
                    && reference_terms.iter().any(|known| {
                        let overlap = terms.intersection(known).count();
                        overlap > 0 && overlap as f64 / terms.len() as f64 > 0.5
                    })
            })
            .count();

        let score = consistent as f64 / response_facts.len() as f64;

        match context {
            Some(context) => (score + self.context_consistency(response, context)) / 2.0,
            None => score,
        }
    }

    /// Share of response key terms present in the evidence text
    fn context_consistency(&self, response: &str, context: &str) -> f64 {
        let response_terms = self.key_terms(response);
        if response_terms.is_empty() {
            return 0.5;
        }
        let context_terms = self.key_terms(context);
        response_terms.intersection(&context_terms).count() as f64 / response_terms.len() as f64
    }

    /// Citations found per citation expected
    pub fn citation_accuracy(&self, response: &str, expected: usize) -> f64 {
        if expected == 0 {
            return 1.0;
        }
        let found = self.config.citation_patterns.count(response);
        if found == 0 {
            return 0.5;
        }
        (found as f64 / expected as f64).min(1.0)
    }

    fn extract_facts<'t>(&self, text: &'t str) -> Vec<&'t str> {
        text.split(['.', '!', '?'])
            .map(str::trim)
            .filter(|s| s.chars().count() > 10 && self.config.fact_patterns.any(s))
            .collect()
    }

    fn key_terms(&self, text: &str) -> HashSet<String> {
        plain_words(text)
            .into_iter()
            .filter(|w| w.chars().count() > 2 && !self.config.stopwords.contains(w))
            .collect()
    }
}

#[async_trait]
impl MetricEvaluator for FaithfulnessEvaluator {
    type Score = FaithfulnessScore;

    fn kind(&self) -> MetricKind {
        MetricKind::Faithfulness
    }

    async fn try_evaluate(&self, input: &EvalInput<'_>) -> Result<FaithfulnessScore, EvalError> {
        let reference = input.reference();
        let context = (!input.evidence.is_empty()).then(|| {
            input
                .evidence
                .iter()
                .map(|e| e.content.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        });

        let token_overlap = clamp_unit(self.token_overlap(input.response, reference));
        let semantic_similarity = clamp_unit(self.semantic_similarity(input.response, reference).await);
        let factual_consistency =
            clamp_unit(self.factual_consistency(input.response, reference, context.as_deref()));
        let citation_accuracy = clamp_unit(self.citation_accuracy(input.response, input.evidence.len()));

        let w = &self.config.weights;
        let overall = clamp_unit(
            w.token_overlap * token_overlap
                + w.semantic_similarity * semantic_similarity
                + w.factual_consistency * factual_consistency
                + w.citation_accuracy * citation_accuracy,
        );

        debug!(
            token_overlap,
            semantic_similarity, factual_consistency, citation_accuracy, overall, "Faithfulness computed"
        );

        let mut details = Details::new();
        details.insert("response_length".into(), plain_words(input.response).len().into());
        details.insert("ground_truth_length".into(), plain_words(reference).len().into());
        details.insert("context_provided".into(), context.is_some().into());
        details.insert("citations_provided".into(), input.evidence.len().into());
        details.insert("embeddings_used".into(), self.has_embeddings().into());

        Ok(FaithfulnessScore {
            overall,
            token_overlap,
            semantic_similarity,
            factual_consistency,
            citation_accuracy,
            details,
        })
    }

    fn fallback(&self, error: &str) -> FaithfulnessScore {
        FaithfulnessScore {
            overall: 0.0,
            token_overlap: 0.0,
            semantic_similarity: 0.0,
            factual_consistency: 0.0,
            citation_accuracy: 0.0,
            details: error_details(error),
        }
    }
}
