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

//! Evidence provider interface
//!
//! Retrieval is external. Providers return `(title, content, reliability)`
//! sources which feed the citation-related sub-scores; with no provider those
//! sub-scores fall back to their "no evidence" defaults.

use async_trait::async_trait;
use fairscore_core::lexical::plain_words;
use fairscore_core::{Domain, EvidenceSource};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("Evidence search failed: {0}")]
    SearchFailed(String),
}

#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        domain: Domain,
        top_k: usize,
    ) -> Result<Vec<EvidenceSource>, EvidenceError>;
}

/// In-memory corpus, ranked by query-term overlap then reliability
#[derive(Debug, Clone, Default)]
pub struct StaticEvidence {
    sources: Vec<EvidenceSource>,
}

impl StaticEvidence {
    pub fn new(sources: Vec<EvidenceSource>) -> Self {
        Self { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl EvidenceProvider for StaticEvidence {
    async fn search(
        &self,
        query: &str,
        _domain: Domain,
        top_k: usize,
    ) -> Result<Vec<EvidenceSource>, EvidenceError> {
        let terms: HashSet<String> = plain_words(query)
            .into_iter()
            .filter(|w| w.len() > 2)
            .collect();

        let mut ranked: Vec<(usize, &EvidenceSource)> = self
            .sources
            .iter()
            .map(|s| {
                let words: HashSet<String> =
                    plain_words(&format!("{} {}", s.title, s.content)).into_iter().collect();
                (terms.intersection(&words).count(), s)
            })
            .filter(|(hits, _)| *hits > 0)
            .collect();

        ranked.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.reliability.total_cmp(&a.1.reliability))
        });

        Ok(ranked.into_iter().take(top_k).map(|(_, s)| s.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_evidence_ranking() {
        let provider = StaticEvidence::new(vec![
            EvidenceSource::new("Dragons", "Mythical creatures", 0.9),
            EvidenceSource::new("Insulin dosing", "Insulin dose depends on weight", 0.6),
            EvidenceSource::new("Insulin overview", "What insulin does", 0.8),
        ]);

        let hits = provider
            .search("insulin dose for adults", Domain::Medical, 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Insulin dosing");
        assert_eq!(hits[1].title, "Insulin overview");

        let top1 = provider.search("insulin", Domain::Medical, 1).await.unwrap();
        assert_eq!(top1[0].title, "Insulin overview");
    }
}
