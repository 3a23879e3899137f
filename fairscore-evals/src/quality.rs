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

//! Response quality gate
//!
//! Decides whether a candidate is fit to show. A failed assessment lets the
//! caller substitute a domain template; it never changes any metric score.

use fairscore_core::config::SafetyConfig;
use fairscore_core::lexical::plain_words;
use fairscore_core::{Domain, LexicalGroup};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Responses shorter than this are rejected
pub const MIN_WORDS: usize = 5;

/// Distinct/total word ratio below which a response is considered repetitive
pub const MIN_DISTINCT_RATIO: f64 = 0.3;

/// Why a candidate failed the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssue {
    EmptyResponse,
    TooShort,
    ExcessiveRepetition,
    HarmfulQuery,
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityIssue::EmptyResponse => "response is empty",
            QualityIssue::TooShort => "response has fewer than 5 words",
            QualityIssue::ExcessiveRepetition => "response is excessively repetitive",
            QualityIssue::HarmfulQuery => "query contains harmful indicators",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub passed: bool,
    pub reasons: Vec<QualityIssue>,
}

impl QualityAssessment {
    pub fn has(&self, issue: QualityIssue) -> bool {
        self.reasons.contains(&issue)
    }
}

/// Check a candidate against the quality rules
pub fn assess_quality(config: &SafetyConfig, query: &str, response: &str) -> QualityAssessment {
    let mut reasons = Vec::new();

    let tokens = plain_words(response);
    if tokens.is_empty() {
        reasons.push(QualityIssue::EmptyResponse);
    } else if tokens.len() < MIN_WORDS {
        reasons.push(QualityIssue::TooShort);
    } else {
        let distinct: HashSet<&String> = tokens.iter().collect();
        if (distinct.len() as f64 / tokens.len() as f64) < MIN_DISTINCT_RATIO {
            reasons.push(QualityIssue::ExcessiveRepetition);
        }
    }

    if config.harmful_query.any(&query.to_lowercase()) {
        reasons.push(QualityIssue::HarmfulQuery);
    }

    QualityAssessment {
        passed: reasons.is_empty(),
        reasons,
    }
}

/// Safe stand-in answer for a candidate that failed the gate
pub fn fallback_template(domain: Domain, assessment: &QualityAssessment) -> &'static str {
    if assessment.has(QualityIssue::HarmfulQuery) {
        return "This request needs professional medical consultation. If you are in crisis or \
                thinking about harming yourself, please contact local emergency services or a \
                crisis line right away.";
    }
    match domain {
        Domain::Medical => {
            "I can't give a reliable answer to this medical question. Please consult a doctor \
             or another qualified healthcare professional."
        }
        Domain::Finance => {
            "I can't give a reliable answer to this financial question. Please speak with a \
             licensed financial advisor before making any decision."
        }
        Domain::CrossDomain => {
            "I can't give a reliable answer to this question. It touches on both health and \
             money, so please consult a doctor and a licensed financial advisor."
        }
        Domain::Unknown => {
            "I don't have enough information to answer this reliably. Please rephrase the \
             question or add more detail."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairscore_core::FairConfig;

    fn safety() -> SafetyConfig {
        FairConfig::builtin().unwrap().safety
    }

    #[test]
    fn test_good_response_passes() {
        let a = assess_quality(
            &safety(),
            "What is insulin?",
            "Insulin is a hormone that regulates blood sugar levels.",
        );
        assert!(a.passed);
        assert!(a.reasons.is_empty());
    }

    #[test]
    fn test_empty_and_short() {
        let empty = assess_quality(&safety(), "q", "   ");
        assert_eq!(empty.reasons, vec![QualityIssue::EmptyResponse]);
        assert!(!empty.passed);

        let short = assess_quality(&safety(), "q", "Yes, probably.");
        assert_eq!(short.reasons, vec![QualityIssue::TooShort]);
    }

    #[test]
    fn test_repetition() {
        let a = assess_quality(&safety(), "q", "buy buy buy buy buy buy buy buy buy now");
        assert!(a.has(QualityIssue::ExcessiveRepetition));
    }

    #[test]
    fn test_harmful_query_flagged_even_with_good_response() {
        let a = assess_quality(
            &safety(),
            "How do I get a prescription without doctor approval?",
            "You should talk to a licensed physician about your options.",
        );
        assert_eq!(a.reasons, vec![QualityIssue::HarmfulQuery]);
        assert!(fallback_template(Domain::Medical, &a).contains("crisis"));
    }

    #[test]
    fn test_templates_per_domain() {
        let failed = QualityAssessment {
            passed: false,
            reasons: vec![QualityIssue::TooShort],
        };
        assert!(fallback_template(Domain::Medical, &failed).contains("doctor"));
        assert!(fallback_template(Domain::Finance, &failed).contains("financial advisor"));
        assert!(fallback_template(Domain::Unknown, &failed).contains("rephrase"));
    }

    #[test]
    fn test_issue_serializes_snake_case() {
        let json = serde_json::to_string(&QualityIssue::ExcessiveRepetition).unwrap();
        assert_eq!(json, "\"excessive_repetition\"");
    }
}
