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

//! Plain value types passed between the router, the evaluators and callers.

use crate::error::FairError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Domain assigned to a query by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Domain {
    #[serde(rename = "finance")]
    Finance,
    #[serde(rename = "medical")]
    Medical,
    #[serde(rename = "cross-domain")]
    CrossDomain,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Finance => "finance",
            Domain::Medical => "medical",
            Domain::CrossDomain => "cross-domain",
            Domain::Unknown => "unknown",
        }
    }

    /// Finance and medical carry regulatory expectations (disclaimers,
    /// referrals) that the other domains don't.
    pub fn is_specialized(&self) -> bool {
        matches!(self, Domain::Finance | Domain::Medical)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = FairError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "finance" | "financial" => Ok(Domain::Finance),
            "medical" | "medicine" => Ok(Domain::Medical),
            "cross-domain" | "cross_domain" | "crossdomain" => Ok(Domain::CrossDomain),
            "unknown" | "general" => Ok(Domain::Unknown),
            other => Err(FairError::InvalidInput(format!("unknown domain '{}'", other))),
        }
    }
}

/// A free-text query, optionally with a caller-declared domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            domain: None,
        }
    }

    /// Force a domain, bypassing the router
    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Trimmed, lowercased text used for routing overrides
    pub fn normalized(&self) -> String {
        self.text.trim().to_lowercase()
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::new(text)
    }
}

/// Externally generated response text plus the generator's confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseCandidate {
    pub text: String,
    pub confidence: f64,
}

impl ResponseCandidate {
    /// Confidence is clamped into [0, 1]; NaN becomes 0.
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence: clamp_unit(confidence),
        }
    }
}

/// One piece of retrieved evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSource {
    pub title: String,
    pub content: String,
    /// Provider-assigned reliability in [0, 1]
    pub reliability: f64,
}

impl EvidenceSource {
    pub fn new(title: impl Into<String>, content: impl Into<String>, reliability: f64) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            reliability: clamp_unit(reliability),
        }
    }
}

/// The five metric families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Faithfulness,
    Calibration,
    Robustness,
    Safety,
    Interpretability,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Faithfulness,
        MetricKind::Calibration,
        MetricKind::Robustness,
        MetricKind::Safety,
        MetricKind::Interpretability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Faithfulness => "faithfulness",
            MetricKind::Calibration => "calibration",
            MetricKind::Robustness => "robustness",
            MetricKind::Safety => "safety",
            MetricKind::Interpretability => "interpretability",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic value stored in a score's details map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<MetricValue>),
    Object(BTreeMap<String, MetricValue>),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Float(v) => Some(*v),
            MetricValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetricValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        MetricValue::Int(v as i64)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::String(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::String(v)
    }
}

impl<T: Into<MetricValue>> From<Vec<T>> for MetricValue {
    fn from(v: Vec<T>) -> Self {
        MetricValue::Array(v.into_iter().map(Into::into).collect())
    }
}

/// Free-form diagnostics attached to every score. Ordered so that
/// serialized reports are byte-stable.
pub type Details = BTreeMap<String, MetricValue>;

/// Clamp into [0, 1], mapping NaN to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_display_and_parse() {
        for domain in [
            Domain::Finance,
            Domain::Medical,
            Domain::CrossDomain,
            Domain::Unknown,
        ] {
            let parsed: Domain = domain.to_string().parse().unwrap();
            assert_eq!(parsed, domain);
        }
        assert_eq!("cross_domain".parse::<Domain>().unwrap(), Domain::CrossDomain);
        assert!("astrology".parse::<Domain>().is_err());
    }

    #[test]
    fn test_domain_serde_names() {
        let json = serde_json::to_string(&Domain::CrossDomain).unwrap();
        assert_eq!(json, "\"cross-domain\"");
        let back: Domain = serde_json::from_str("\"finance\"").unwrap();
        assert_eq!(back, Domain::Finance);
    }

    #[test]
    fn test_response_candidate_clamps_confidence() {
        assert_eq!(ResponseCandidate::new("x", 1.7).confidence, 1.0);
        assert_eq!(ResponseCandidate::new("x", -0.2).confidence, 0.0);
        assert_eq!(ResponseCandidate::new("x", f64::NAN).confidence, 0.0);
    }

    #[test]
    fn test_query_normalized() {
        let q = Query::new("  Medicine \n").with_domain(Domain::Finance);
        assert_eq!(q.normalized(), "medicine");
        assert_eq!(q.domain, Some(Domain::Finance));
    }

    #[test]
    fn test_metric_value_untagged_serialization() {
        let mut details = Details::new();
        details.insert("n".into(), 3usize.into());
        details.insert("flag".into(), true.into());
        details.insert("names".into(), vec!["a", "b"].into());
        let json = serde_json::to_string(&details).unwrap();
        assert_eq!(json, r#"{"flag":true,"n":3,"names":["a","b"]}"#);
    }
}
