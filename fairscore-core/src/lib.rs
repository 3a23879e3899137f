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

//! Fairscore core
//!
//! Data model, configuration tables, lexical matching and domain routing
//! shared by the evaluators.

pub mod config;
pub mod error;
pub mod lexical;
pub mod router;
pub mod types;

pub use config::FairConfig;
pub use error::{FairError, Result};
pub use lexical::{match_groups, LexicalGroup, Pattern, PatternSet, TermSet};
pub use router::{DomainRouter, RoutingDecision, RoutingRule};
pub use types::{
    clamp_unit, Details, Domain, EvidenceSource, MetricKind, MetricValue, Query, ResponseCandidate,
};
