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

//! Presentation enhancers
//!
//! An [`EnhancementChain`] is an ordered list of capability-tagged
//! decorators. Each one may append to the response text and reports how much
//! it expects to improve the safety posture of the result. The chain only
//! shapes what is shown to a user; scores are always computed on the
//! original candidate.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let chain = EnhancementChain::standard(&config.safety);
//! let enhanced = chain.apply(response, query, Domain::Medical);
//! println!("{}", enhanced.text);
//! ```

use fairscore_core::config::SafetyConfig;
use fairscore_core::{Domain, LexicalGroup, TermSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

pub const MEDICAL_DISCLAIMER: &str = "Medical disclaimer: this information is for educational \
purposes only and is not medical advice. It is not a substitute for diagnosis or treatment by a \
qualified healthcare professional.";

pub const FINANCIAL_DISCLAIMER: &str = "Financial disclaimer: this information is for educational \
purposes only and is not financial advice. Past performance does not guarantee future results \
and you may lose money.";

pub const EMERGENCY_REFERRAL: &str = "If this is an emergency, contact your local emergency \
services or seek medical attention immediately.";

/// Separator placed between the response and an appended notice
const NOTICE_SEPARATOR: &str = "\n\n---\n";

const MEDICAL_CONTRIBUTION: f64 = 0.25;
const FINANCIAL_CONTRIBUTION: f64 = 0.20;
const REFERRAL_CONTRIBUTION: f64 = 0.30;

/// Total contribution a chain may report
pub const MAX_TOTAL_CONTRIBUTION: f64 = 0.40;

/// What an enhancer adds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Disclaimer,
    Referral,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Disclaimer => "disclaimer",
            Capability::Referral => "referral",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a single enhancer
#[derive(Debug, Clone, PartialEq)]
pub struct Enhancement {
    pub text: String,
    /// Expected safety improvement in [0, 1]; 0 when nothing was added
    pub contribution: f64,
}

impl Enhancement {
    pub fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            contribution: 0.0,
        }
    }
}

/// A presentation decorator
pub trait Enhancer: Send + Sync {
    fn capability(&self) -> Capability;

    fn enhance(&self, text: &str, query: &str, domain: Domain) -> Enhancement;
}

/// Final text plus what each capability contributed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedText {
    pub text: String,
    pub contributions: BTreeMap<Capability, f64>,
    /// Sum of contributions, capped at [`MAX_TOTAL_CONTRIBUTION`]
    pub total_contribution: f64,
}

/// Ordered list of enhancers applied by iteration
#[derive(Default)]
pub struct EnhancementChain {
    enhancers: Vec<Box<dyn Enhancer>>,
}

impl EnhancementChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disclaimer first, then emergency referral
    pub fn standard(config: &SafetyConfig) -> Self {
        Self::new()
            .with(DisclaimerEnhancer::new(config))
            .with(ReferralEnhancer::new(config))
    }

    pub fn with<E: Enhancer + 'static>(mut self, enhancer: E) -> Self {
        self.enhancers.push(Box::new(enhancer));
        self
    }

    pub fn push(&mut self, enhancer: Box<dyn Enhancer>) {
        self.enhancers.push(enhancer);
    }

    pub fn len(&self) -> usize {
        self.enhancers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enhancers.is_empty()
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        self.enhancers.iter().map(|e| e.capability()).collect()
    }

    /// Run every enhancer in order, each seeing the previous one's output
    pub fn apply(&self, text: &str, query: &str, domain: Domain) -> EnhancedText {
        let mut current = text.to_string();
        let mut contributions = BTreeMap::new();

        for enhancer in &self.enhancers {
            let step = enhancer.enhance(&current, query, domain);
            debug!(
                capability = %enhancer.capability(),
                contribution = step.contribution,
                "Applied enhancer"
            );
            *contributions.entry(enhancer.capability()).or_insert(0.0) += step.contribution;
            current = step.text;
        }

        let total: f64 = contributions.values().sum();
        EnhancedText {
            text: current,
            contributions,
            total_contribution: total.min(MAX_TOTAL_CONTRIBUTION),
        }
    }
}

impl fmt::Debug for EnhancementChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnhancementChain")
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

fn append_notice(text: &str, notice: &str) -> String {
    if text.trim().is_empty() {
        notice.to_string()
    } else {
        format!("{}{}{}", text.trim_end(), NOTICE_SEPARATOR, notice)
    }
}

// ============================================================================
// Built-in enhancers
// ============================================================================

/// Appends the domain disclaimer for medical and finance answers
#[derive(Debug, Clone)]
pub struct DisclaimerEnhancer {
    medical_markers: TermSet,
    financial_markers: TermSet,
}

impl DisclaimerEnhancer {
    /// Existing medical indicators and risk warnings count as a disclaimer
    /// already being present.
    pub fn new(config: &SafetyConfig) -> Self {
        Self {
            medical_markers: config.medical_indicators.clone(),
            financial_markers: config.risk_warnings.clone(),
        }
    }

    fn has_medical(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        lower.contains("not medical advice") || self.medical_markers.any(&lower)
    }

    fn has_financial(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        lower.contains("not financial advice") || self.financial_markers.any(&lower)
    }
}

impl Enhancer for DisclaimerEnhancer {
    fn capability(&self) -> Capability {
        Capability::Disclaimer
    }

    fn enhance(&self, text: &str, _query: &str, domain: Domain) -> Enhancement {
        let wants_medical = matches!(domain, Domain::Medical | Domain::CrossDomain);
        let wants_financial = matches!(domain, Domain::Finance | Domain::CrossDomain);

        let mut out = text.to_string();
        let mut contribution = 0.0;

        if wants_medical && !self.has_medical(&out) {
            out = append_notice(&out, MEDICAL_DISCLAIMER);
            contribution += MEDICAL_CONTRIBUTION;
        }
        if wants_financial && !self.has_financial(&out) {
            out = append_notice(&out, FINANCIAL_DISCLAIMER);
            contribution += FINANCIAL_CONTRIBUTION;
        }

        Enhancement {
            text: out,
            contribution,
        }
    }
}

/// Appends an emergency referral when the exchange mentions an emergency
#[derive(Debug, Clone)]
pub struct ReferralEnhancer {
    triggers: TermSet,
    crisis_triggers: TermSet,
    referrals: TermSet,
}

impl ReferralEnhancer {
    pub fn new(config: &SafetyConfig) -> Self {
        Self {
            triggers: config.emergency_terms.clone(),
            crisis_triggers: config.harmful_query.clone(),
            referrals: config.professional_referral.clone(),
        }
    }

    fn triggered(&self, text: &str, query: &str) -> bool {
        let combined = format!("{} {}", query, text).to_lowercase();
        self.triggers.any(&combined) || self.crisis_triggers.any(&combined)
    }
}

impl Enhancer for ReferralEnhancer {
    fn capability(&self) -> Capability {
        Capability::Referral
    }

    fn enhance(&self, text: &str, query: &str, _domain: Domain) -> Enhancement {
        if !self.triggered(text, query) || self.referrals.any(&text.to_lowercase()) {
            return Enhancement::unchanged(text);
        }
        Enhancement {
            text: append_notice(text, EMERGENCY_REFERRAL),
            contribution: REFERRAL_CONTRIBUTION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairscore_core::FairConfig;

    fn safety_config() -> SafetyConfig {
        FairConfig::builtin().unwrap().safety
    }

    struct Shout;

    impl Enhancer for Shout {
        fn capability(&self) -> Capability {
            Capability::Disclaimer
        }

        fn enhance(&self, text: &str, _query: &str, _domain: Domain) -> Enhancement {
            Enhancement {
                text: text.to_uppercase(),
                contribution: 0.5,
            }
        }
    }

    #[test]
    fn test_medical_disclaimer_appended() {
        let enhancer = DisclaimerEnhancer::new(&safety_config());
        let out = enhancer.enhance("Insulin lowers blood sugar.", "insulin?", Domain::Medical);
        assert!(out.text.starts_with("Insulin lowers blood sugar."));
        assert!(out.text.ends_with(MEDICAL_DISCLAIMER));
        assert!(out.text.contains("\n\n---\n"));
        assert!((out.contribution - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_disclaimer_skipped_when_present() {
        let enhancer = DisclaimerEnhancer::new(&safety_config());
        let text = "Rest helps. This is not medical advice.";
        let out = enhancer.enhance(text, "q", Domain::Medical);
        assert_eq!(out.text, text);
        assert_eq!(out.contribution, 0.0);
    }

    #[test]
    fn test_disclaimer_idempotent() {
        let enhancer = DisclaimerEnhancer::new(&safety_config());
        let once = enhancer.enhance("Stocks can rise.", "q", Domain::Finance);
        let twice = enhancer.enhance(&once.text, "q", Domain::Finance);
        assert_eq!(once.text, twice.text);
        assert_eq!(twice.contribution, 0.0);
    }

    #[test]
    fn test_cross_domain_gets_both() {
        let enhancer = DisclaimerEnhancer::new(&safety_config());
        let out = enhancer.enhance("Answer.", "q", Domain::CrossDomain);
        assert!(out.text.contains(MEDICAL_DISCLAIMER));
        assert!(out.text.contains(FINANCIAL_DISCLAIMER));
        assert!((out.contribution - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_domain_unchanged() {
        let enhancer = DisclaimerEnhancer::new(&safety_config());
        let out = enhancer.enhance("Paris is in France.", "q", Domain::Unknown);
        assert_eq!(out, Enhancement::unchanged("Paris is in France."));
    }

    #[test]
    fn test_referral_for_emergency() {
        let enhancer = ReferralEnhancer::new(&safety_config());
        let out = enhancer.enhance(
            "That could be many things.",
            "I have chest pain, what is it?",
            Domain::Medical,
        );
        assert!(out.text.ends_with(EMERGENCY_REFERRAL));
        assert!((out.contribution - 0.30).abs() < 1e-9);

        let again = enhancer.enhance(&out.text, "I have chest pain, what is it?", Domain::Medical);
        assert_eq!(again.text, out.text);
    }

    #[test]
    fn test_no_referral_without_trigger() {
        let enhancer = ReferralEnhancer::new(&safety_config());
        let out = enhancer.enhance("Drink water.", "How much water per day?", Domain::Medical);
        assert_eq!(out.contribution, 0.0);
        assert_eq!(out.text, "Drink water.");
    }

    #[test]
    fn test_chain_order_and_total_cap() {
        let chain = EnhancementChain::standard(&safety_config());
        assert_eq!(chain.capabilities(), vec![Capability::Disclaimer, Capability::Referral]);

        let out = chain.apply("It may be serious.", "sudden chest pain", Domain::Medical);
        let disclaimer_at = out.text.find(MEDICAL_DISCLAIMER).unwrap();
        let referral_at = out.text.find(EMERGENCY_REFERRAL).unwrap();
        assert!(disclaimer_at < referral_at);
        assert!((out.contributions[&Capability::Disclaimer] - 0.25).abs() < 1e-9);
        assert!((out.contributions[&Capability::Referral] - 0.30).abs() < 1e-9);
        assert!((out.total_contribution - MAX_TOTAL_CONTRIBUTION).abs() < 1e-9);
    }

    #[test]
    fn test_chain_each_step_sees_previous_output() {
        let chain = EnhancementChain::new()
            .with(DisclaimerEnhancer::new(&safety_config()))
            .with(Shout);
        let out = chain.apply("answer", "q", Domain::Finance);
        assert!(out.text.contains("FINANCIAL DISCLAIMER"));
        assert!((out.contributions[&Capability::Disclaimer] - 0.7).abs() < 1e-9);
        assert!((out.total_contribution - MAX_TOTAL_CONTRIBUTION).abs() < 1e-9);
    }

    #[test]
    fn test_empty_chain() {
        let chain = EnhancementChain::new();
        assert!(chain.is_empty());
        let out = chain.apply("text", "q", Domain::Medical);
        assert_eq!(out.text, "text");
        assert!(out.contributions.is_empty());
        assert_eq!(out.total_contribution, 0.0);
    }
}
