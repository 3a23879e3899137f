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

//! Response generator interface
//!
//! Text generation lives outside this crate. The robustness evaluator only
//! needs something that maps a (perturbed) query to a response and a
//! confidence value.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// One generated answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub response: String,
    pub confidence: f64,
}

impl Generation {
    pub fn new(response: impl Into<String>, confidence: f64) -> Self {
        Self {
            response: response.into(),
            confidence: fairscore_core::clamp_unit(confidence),
        }
    }
}

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Generation failed: {0}")]
    Failed(String),

    #[error("Generator unavailable: {0}")]
    Unavailable(String),
}

/// External text generator
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, query: &str) -> Result<Generation, GeneratorError>;
}

/// Adapts a blocking closure into a [`ResponseGenerator`]
///
/// Each call runs on tokio's blocking pool so a slow closure cannot stall the
/// runtime or the per-call timeout.
pub struct BlockingGenerator<F> {
    f: Arc<F>,
}

impl<F> BlockingGenerator<F>
where
    F: Fn(&str) -> Result<Generation, GeneratorError> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

#[async_trait]
impl<F> ResponseGenerator for BlockingGenerator<F>
where
    F: Fn(&str) -> Result<Generation, GeneratorError> + Send + Sync + 'static,
{
    async fn generate(&self, query: &str) -> Result<Generation, GeneratorError> {
        let f = Arc::clone(&self.f);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || f(&query))
            .await
            .map_err(|e| GeneratorError::Failed(format!("generator task aborted: {}", e)))?
    }
}
