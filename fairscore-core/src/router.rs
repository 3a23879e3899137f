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

//! Domain routing
//!
//! Single-shot classification of a query into one of four terminal domains.
//! Rules are evaluated in order and the first one that fires wins:
//!
//! 1. **Override**: the bare query `medicine` is always Medical.
//! 2. **Strong**: both keyword scores reach the strong threshold; the higher
//!    wins, a tie is CrossDomain (or Finance when cross-domain is disabled).
//! 3. **Weak**: the higher score reaches the weak threshold and is strictly
//!    greater than the other.
//! 4. **Heuristic**: no keyword hit at all; regex patterns (currency, dosage,
//!    symptom words) are counted and a strictly greater count wins.
//! 5. Otherwise Unknown.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fairscore_core::{config::FairConfig, router::DomainRouter, Domain};
//!
//! let router = DomainRouter::new(&FairConfig::builtin()?.router);
//! assert_eq!(router.classify("What is the ROI on a $10,000 investment?"), Domain::Finance);
//! ```

use crate::config::RouterConfig;
use crate::lexical::LexicalGroup;
use crate::types::{Domain, Query};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Query that always routes to Medical, independent of the keyword tables
pub const MEDICAL_OVERRIDE_TOKEN: &str = "medicine";

/// Which rule produced a routing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingRule {
    /// Caller declared the domain
    Declared,
    Override,
    Strong,
    Weak,
    Heuristic,
    NoMatch,
}

impl fmt::Display for RoutingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoutingRule::Declared => "declared",
            RoutingRule::Override => "override",
            RoutingRule::Strong => "strong",
            RoutingRule::Weak => "weak",
            RoutingRule::Heuristic => "heuristic",
            RoutingRule::NoMatch => "no_match",
        };
        f.write_str(s)
    }
}

/// Routing outcome with the scores that drove it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub domain: Domain,
    pub rule: RoutingRule,
    pub finance_score: usize,
    pub medical_score: usize,
    /// Regex counts, only populated when the heuristic rule ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heuristic_scores: Option<(usize, usize)>,
    pub explanation: String,
}

/// Keyword/regex domain router
#[derive(Debug, Clone)]
pub struct DomainRouter {
    config: RouterConfig,
}

impl DomainRouter {
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Classify a query. Total and deterministic.
    pub fn classify(&self, query: &str) -> Domain {
        self.route(query).domain
    }

    /// Route a [`Query`], honoring a declared domain
    pub fn route_query(&self, query: &Query) -> RoutingDecision {
        match query.domain {
            Some(domain) => RoutingDecision {
                domain,
                rule: RoutingRule::Declared,
                finance_score: 0,
                medical_score: 0,
                heuristic_scores: None,
                explanation: format!("Domain declared by caller: {}", domain),
            },
            None => self.route_text(query),
        }
    }

    /// Classify and explain
    pub fn route(&self, query: &str) -> RoutingDecision {
        self.route_text(&Query::new(query))
    }

    fn route_text(&self, query: &Query) -> RoutingDecision {
        if query.normalized() == MEDICAL_OVERRIDE_TOKEN {
            return RoutingDecision {
                domain: Domain::Medical,
                rule: RoutingRule::Override,
                finance_score: 0,
                medical_score: 0,
                heuristic_scores: None,
                explanation: format!("Query '{}' always routes to medical", MEDICAL_OVERRIDE_TOKEN),
            };
        }

        let finance = self.config.finance_keywords.count(&query.text);
        let medical = self.config.medical_keywords.count(&query.text);
        let strong = self.config.strong_threshold;
        let weak = self.config.weak_threshold;

        let decision = if finance >= strong && medical >= strong {
            let domain = if finance > medical {
                Domain::Finance
            } else if medical > finance {
                Domain::Medical
            } else if self.config.enable_cross_domain {
                Domain::CrossDomain
            } else {
                Domain::Finance
            };
            self.decision(domain, RoutingRule::Strong, finance, medical, None)
        } else if finance.max(medical) >= weak && finance != medical {
            let domain = if finance > medical {
                Domain::Finance
            } else {
                Domain::Medical
            };
            self.decision(domain, RoutingRule::Weak, finance, medical, None)
        } else if finance == 0 && medical == 0 {
            let fin_hits = self.config.finance_patterns.count(&query.text);
            let med_hits = self.config.medical_patterns.count(&query.text);
            let domain = if fin_hits > med_hits {
                Domain::Finance
            } else if med_hits > fin_hits {
                Domain::Medical
            } else {
                Domain::Unknown
            };
            self.decision(
                domain,
                RoutingRule::Heuristic,
                finance,
                medical,
                Some((fin_hits, med_hits)),
            )
        } else {
            self.decision(Domain::Unknown, RoutingRule::NoMatch, finance, medical, None)
        };

        debug!(
            domain = %decision.domain,
            rule = %decision.rule,
            finance = finance,
            medical = medical,
            "Routed query"
        );
        decision
    }

    fn decision(
        &self,
        domain: Domain,
        rule: RoutingRule,
        finance_score: usize,
        medical_score: usize,
        heuristic_scores: Option<(usize, usize)>,
    ) -> RoutingDecision {
        let explanation = match (rule, heuristic_scores) {
            (RoutingRule::Heuristic, Some((f, m))) => format!(
                "No domain keywords; pattern matches finance={} medical={} -> {}",
                f, m, domain
            ),
            _ => format!(
                "{} rule: finance keywords={} medical keywords={} -> {}",
                rule, finance_score, medical_score, domain
            ),
        };
        RoutingDecision {
            domain,
            rule,
            finance_score,
            medical_score,
            heuristic_scores,
            explanation,
        }
    }
}
