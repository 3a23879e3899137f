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

//! Evaluation configuration
//!
//! All keyword tables, regex groups and weight maps live in one immutable
//! [`FairConfig`] value. The built-in tables ship as `config/default.toml`;
//! a user file is layered on top (tables merge key by key, arrays replace).
//!
//! Every regex is compiled and every weight map is sanity-checked while
//! loading, so a bad table fails startup instead of a later evaluation.
//!
//! ## Environment overrides
//!
//! - `FAIRSCORE_ENABLE_CROSS_DOMAIN`: route ties to cross-domain (true/false)
//! - `FAIRSCORE_CALIBRATION_BINS`: number of calibration bins
//! - `FAIRSCORE_GENERATOR_TIMEOUT_MS`: per-call generator timeout
//! - `FAIRSCORE_SEED`: perturbation seed
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fairscore_core::config::FairConfig;
//!
//! let config = FairConfig::load(Some("fairscore.toml".into()))?;
//! assert_eq!(config.calibration.n_bins, 10);
//! ```

use crate::error::{FairError, Result};
use crate::lexical::{Pattern, PatternSet, TermSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const BUILTIN_TOML: &str = include_str!("../config/default.toml");
const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Complete evaluation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FairConfig {
    pub router: RouterConfig,
    pub calibration: CalibrationConfig,
    pub faithfulness: FaithfulnessConfig,
    pub safety: SafetyConfig,
    pub interpretability: InterpretabilityConfig,
    pub robustness: RobustnessConfig,
    pub fair: FairSection,
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    /// Both scores at or above this compare head to head
    pub strong_threshold: usize,
    /// A single domain at or above this wins outright
    pub weak_threshold: usize,
    /// Equal strong scores route to cross-domain (otherwise finance)
    pub enable_cross_domain: bool,
    pub finance_keywords: TermSet,
    pub medical_keywords: TermSet,
    pub finance_patterns: PatternSet,
    pub medical_patterns: PatternSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationConfig {
    pub n_bins: usize,
    /// Relative tolerance for numeric answer matching
    pub numeric_tolerance: f64,
    pub number_pattern: Pattern,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FaithfulnessConfig {
    pub fact_patterns: PatternSet,
    pub citation_patterns: PatternSet,
    pub stopwords: TermSet,
    pub weights: FaithfulnessWeights,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FaithfulnessWeights {
    pub token_overlap: f64,
    pub semantic_similarity: f64,
    pub factual_consistency: f64,
    pub citation_accuracy: f64,
}

impl FaithfulnessWeights {
    pub fn sum(&self) -> f64 {
        self.token_overlap + self.semantic_similarity + self.factual_consistency + self.citation_accuracy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyConfig {
    pub medical_harmful: TermSet,
    pub high_risk_medications: TermSet,
    pub emergency_terms: TermSet,
    pub medical_indicators: TermSet,
    /// Words that make medical-harm detection apply outside the medical domain
    pub medical_context: TermSet,
    pub financial_high_risk: TermSet,
    pub regulatory_concerns: TermSet,
    pub caution_products: TermSet,
    pub risk_warnings: TermSet,
    pub financial_indicators: TermSet,
    pub financial_context: TermSet,
    pub blocked_content: TermSet,
    pub professional_referral: TermSet,
    pub disclaimers: TermSet,
    pub misinformation: TermSet,
    pub inappropriate_advice: TermSet,
    pub medical_risks: TermSet,
    pub financial_risks: TermSet,
    pub general_risks: TermSet,
    pub diagnosis_phrases: TermSet,
    pub recommendation_phrases: TermSet,
    pub certainty_phrases: TermSet,
    pub advice_disclaimers: Vec<AdviceDisclaimer>,
    /// Query phrases that fail the quality gate outright
    pub harmful_query: TermSet,
    pub weights: SafetyWeightTable,
}

/// Advice type and the disclaimers that make mentioning it acceptable
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdviceDisclaimer {
    pub advice: String,
    pub disclaimers: TermSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyWeights {
    pub medical: f64,
    pub financial: f64,
    pub content: f64,
}

impl SafetyWeights {
    pub fn sum(&self) -> f64 {
        self.medical + self.financial + self.content
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyWeightTable {
    pub medical: SafetyWeights,
    pub finance: SafetyWeights,
    /// Cross-domain and unknown queries
    pub general: SafetyWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterpretabilityConfig {
    pub step_patterns: PatternSet,
    pub causal_patterns: PatternSet,
    pub evidence_patterns: PatternSet,
    pub uncertainty_patterns: PatternSet,
    pub structure_patterns: PatternSet,
    pub citation_patterns: PatternSet,
    pub data_patterns: PatternSet,
    /// Captures the body of an explicit step ("Step 2: ...")
    pub step_body_pattern: Pattern,
    pub connectors: TermSet,
    pub conclusion_markers: TermSet,
    pub confusing_phrases: TermSet,
    /// Ordered from basic causation to systems thinking
    pub depth_levels: Vec<TermSet>,
    pub context_markers: TermSet,
    pub example_markers: TermSet,
    pub limitation_markers: TermSet,
    pub medical_disclaimers: TermSet,
    pub finance_warnings: TermSet,
    pub confidence_qualifiers: TermSet,
    pub medical_caution: TermSet,
    pub finance_caution: TermSet,
    pub stopwords: TermSet,
    pub weights: InterpretabilityWeights,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterpretabilityWeights {
    pub reasoning_clarity: f64,
    pub explanation_completeness: f64,
    pub step_by_step_quality: f64,
    pub evidence_citation: f64,
    pub uncertainty_expression: f64,
}

impl InterpretabilityWeights {
    pub fn sum(&self) -> f64 {
        self.reasoning_clarity
            + self.explanation_completeness
            + self.step_by_step_quality
            + self.evidence_citation
            + self.uncertainty_expression
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RobustnessConfig {
    /// Fraction of words (semantic) or tenth of characters (syntactic) perturbed
    pub perturbation_ratio: f64,
    pub variants_per_axis: usize,
    pub generator_timeout_ms: u64,
    pub max_concurrency: usize,
    pub seed: u64,
    pub typo_probability: f64,
    pub distractor_probability: f64,
    pub typos: Vec<TypoRule>,
    pub adversarial_prefixes: Vec<String>,
    pub distractors: Vec<String>,
    pub contradiction_pairs: Vec<ContradictionPair>,
    pub flow_words: TermSet,
    pub generic_phrases: TermSet,
    pub specific_fact_patterns: PatternSet,
    pub stopwords: TermSet,
    pub synonyms: BTreeMap<String, Vec<String>>,
    pub weights: RobustnessWeights,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypoRule {
    pub word: String,
    pub typo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContradictionPair {
    pub first: String,
    pub second: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RobustnessWeights {
    pub semantic: f64,
    pub syntactic: f64,
    pub adversarial: f64,
}

impl RobustnessWeights {
    pub fn sum(&self) -> f64 {
        self.semantic + self.syntactic + self.adversarial
    }
}

/// Metrics that may carry a weight in the FAIR aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FairMetric {
    Faithfulness,
    Interpretability,
    Safety,
}

impl FairMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            FairMetric::Faithfulness => "faithfulness",
            FairMetric::Interpretability => "interpretability",
            FairMetric::Safety => "safety",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FairWeightEntry {
    pub metric: FairMetric,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FairTargets {
    pub faithfulness: f64,
    /// Upper bound: lower ECE is better
    pub calibration_ece: f64,
    pub safety: f64,
    pub interpretability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FairSection {
    /// Minimum FAIR score for a report to pass
    pub pass_threshold: f64,
    /// Ordered entries; a repeated metric is overridden by its last entry
    pub weights: Vec<FairWeightEntry>,
    pub targets: FairTargets,
}

impl FairSection {
    /// Effective weights after duplicate resolution (last entry wins)
    pub fn resolved_weights(&self) -> BTreeMap<FairMetric, f64> {
        self.weights.iter().map(|e| (e.metric, e.weight)).collect()
    }

    /// Metrics listed more than once
    pub fn duplicate_metrics(&self) -> Vec<FairMetric> {
        let mut seen = BTreeMap::new();
        for entry in &self.weights {
            *seen.entry(entry.metric).or_insert(0usize) += 1;
        }
        seen.into_iter().filter(|(_, n)| *n > 1).map(|(m, _)| m).collect()
    }
}

// ============================================================================
// Loading
// ============================================================================

impl FairConfig {
    /// The built-in tables
    pub fn builtin() -> Result<Self> {
        let config: Self = toml::from_str(BUILTIN_TOML)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document layered over the built-in tables
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut base: toml::Value = toml::from_str(BUILTIN_TOML)?;
        let overlay: toml::Value = toml::from_str(content)?;
        merge_values(&mut base, overlay);
        let config: Self = base.try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load configuration with priority: env > file > built-in
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = match config_file {
            Some(path) if path.exists() => {
                info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            }
            Some(path) => {
                warn!("Config file not found: {:?}, using built-in tables", path);
                Self::builtin()?
            }
            None => Self::builtin()?,
        };

        let config = config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FAIRSCORE_*` environment overrides
    fn merge_with_env(mut self) -> Result<Self> {
        if let Ok(value) = std::env::var("FAIRSCORE_ENABLE_CROSS_DOMAIN") {
            self.router.enable_cross_domain = parse_env("FAIRSCORE_ENABLE_CROSS_DOMAIN", &value)?;
        }
        if let Ok(value) = std::env::var("FAIRSCORE_CALIBRATION_BINS") {
            self.calibration.n_bins = parse_env("FAIRSCORE_CALIBRATION_BINS", &value)?;
        }
        if let Ok(value) = std::env::var("FAIRSCORE_GENERATOR_TIMEOUT_MS") {
            self.robustness.generator_timeout_ms = parse_env("FAIRSCORE_GENERATOR_TIMEOUT_MS", &value)?;
        }
        if let Ok(value) = std::env::var("FAIRSCORE_SEED") {
            self.robustness.seed = parse_env("FAIRSCORE_SEED", &value)?;
        }
        Ok(self)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| FairError::Configuration(e.to_string()))
    }

    /// Validate thresholds and weight maps
    ///
    /// Regex compilation and empty-entry checks already happened during
    /// deserialization; this covers the numeric invariants.
    pub fn validate(&self) -> Result<()> {
        let router = &self.router;
        if router.weak_threshold == 0 {
            return Err(config_err("router.weak_threshold must be at least 1"));
        }
        if router.strong_threshold < router.weak_threshold {
            return Err(config_err("router.strong_threshold must be >= router.weak_threshold"));
        }

        if self.calibration.n_bins == 0 {
            return Err(config_err("calibration.n_bins must be at least 1"));
        }
        if !(self.calibration.numeric_tolerance > 0.0) {
            return Err(config_err("calibration.numeric_tolerance must be positive"));
        }

        check_weight_sum("faithfulness.weights", self.faithfulness.weights.sum())?;
        check_weight_sum("interpretability.weights", self.interpretability.weights.sum())?;
        check_weight_sum("robustness.weights", self.robustness.weights.sum())?;
        check_weight_sum("safety.weights.medical", self.safety.weights.medical.sum())?;
        check_weight_sum("safety.weights.finance", self.safety.weights.finance.sum())?;
        check_weight_sum("safety.weights.general", self.safety.weights.general.sum())?;

        let rob = &self.robustness;
        if !(rob.perturbation_ratio > 0.0 && rob.perturbation_ratio <= 1.0) {
            return Err(config_err("robustness.perturbation_ratio must be in (0, 1]"));
        }
        if rob.variants_per_axis == 0 || rob.max_concurrency == 0 {
            return Err(config_err(
                "robustness.variants_per_axis and robustness.max_concurrency must be at least 1",
            ));
        }
        if rob.generator_timeout_ms == 0 {
            return Err(config_err("robustness.generator_timeout_ms must be positive"));
        }
        for (name, p) in [
            ("typo_probability", rob.typo_probability),
            ("distractor_probability", rob.distractor_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(config_err(&format!("robustness.{} must be in [0, 1]", name)));
            }
        }
        if rob.adversarial_prefixes.is_empty() || rob.distractors.is_empty() {
            return Err(config_err("robustness needs at least one adversarial prefix and distractor"));
        }

        self.validate_fair()?;
        debug!("Configuration validated");
        Ok(())
    }

    fn validate_fair(&self) -> Result<()> {
        let fair = &self.fair;
        if fair.weights.is_empty() {
            return Err(config_err("fair.weights must name at least one metric"));
        }
        if fair.weights.iter().any(|e| !(e.weight >= 0.0) || !e.weight.is_finite()) {
            return Err(config_err("fair.weights must be finite and non-negative"));
        }
        for metric in fair.duplicate_metrics() {
            warn!(
                metric = metric.as_str(),
                "fair.weights lists a metric more than once; the last entry wins"
            );
        }
        let total: f64 = fair.resolved_weights().values().sum();
        if total <= 0.0 {
            return Err(config_err("fair.weights must have a positive total"));
        }
        if !(0.0..=1.0).contains(&fair.pass_threshold) {
            return Err(config_err("fair.pass_threshold must be in [0, 1]"));
        }
        Ok(())
    }
}

fn config_err(msg: &str) -> FairError {
    FairError::Configuration(msg.to_string())
}

fn check_weight_sum(name: &str, sum: f64) -> Result<()> {
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(FairError::Configuration(format!(
            "{} must sum to 1.0 (got {:.6})",
            name, sum
        )));
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| FairError::Configuration(format!("{} has an invalid value '{}'", name, value)))
}

/// Deep-merge `overlay` into `base`: tables merge, everything else replaces
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    /// Serializes tests that read or write `FAIRSCORE_*` variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_builtin_config() {
        let config = FairConfig::builtin().unwrap();
        assert_eq!(config.router.strong_threshold, 2);
        assert_eq!(config.router.weak_threshold, 1);
        assert!(config.router.enable_cross_domain);
        assert_eq!(config.calibration.n_bins, 10);
        assert_eq!(config.interpretability.depth_levels.len(), 5);
        assert_eq!(config.robustness.synonyms.len(), 10);
        assert_eq!(config.safety.weights.medical.medical, 0.6);
    }

    #[test]
    fn test_builtin_fair_weights_are_three_equal_terms() {
        let config = FairConfig::builtin().unwrap();
        let weights = config.fair.resolved_weights();
        assert_eq!(weights.len(), 3);
        assert!(weights.values().all(|w| (*w - 0.25).abs() < 1e-12));
    }

    #[test]
    fn test_overlay_merges_tables() {
        let config = FairConfig::from_toml_str(
            r#"
            [router]
            enable_cross_domain = false

            [calibration]
            n_bins = 15
            "#,
        )
        .unwrap();
        assert!(!config.router.enable_cross_domain);
        assert_eq!(config.calibration.n_bins, 15);
        // untouched keys keep their built-in values
        assert_eq!(config.router.finance_keywords.len(), 23);
    }

    #[test]
    fn test_overlay_replaces_arrays() {
        let config = FairConfig::from_toml_str(
            r#"
            [router]
            finance_keywords = ["ledger"]
            "#,
        )
        .unwrap();
        assert_eq!(config.router.finance_keywords.terms(), ["ledger"]);
    }

    #[test]
    fn test_invalid_regex_is_configuration_error() {
        let err = FairConfig::from_toml_str(
            r#"
            [router]
            medical_patterns = ["(unclosed"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, FairError::Configuration(_)));
    }

    #[test]
    fn test_empty_keyword_is_configuration_error() {
        let err = FairConfig::from_toml_str(
            r#"
            [safety]
            emergency_terms = ["chest pain", ""]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, FairError::Configuration(_)));
    }

    #[test]
    fn test_weight_sum_is_checked() {
        let err = FairConfig::from_toml_str(
            r#"
            [faithfulness.weights]
            token_overlap = 0.5
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("faithfulness.weights"));
    }

    #[test]
    fn test_duplicate_fair_weight_last_wins() {
        let config = FairConfig::from_toml_str(
            r#"
            [fair]
            weights = [
                { metric = "faithfulness", weight = 0.25 },
                { metric = "interpretability", weight = 0.25 },
                { metric = "interpretability", weight = 0.5 },
                { metric = "safety", weight = 0.25 },
            ]
            "#,
        )
        .unwrap();
        let weights = config.fair.resolved_weights();
        assert_eq!(weights.len(), 3);
        assert_eq!(weights[&FairMetric::Interpretability], 0.5);
        assert_eq!(config.fair.duplicate_metrics(), vec![FairMetric::Interpretability]);
    }

    #[test]
    fn test_unknown_fair_metric_rejected() {
        let err = FairConfig::from_toml_str(
            r#"
            [fair]
            weights = [{ metric = "adaptability", weight = 0.25 }]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, FairError::Configuration(_)));
    }

    #[test]
    fn test_thresholds_validated() {
        let err = FairConfig::from_toml_str(
            r#"
            [router]
            strong_threshold = 1
            weak_threshold = 3
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, FairError::Configuration(_)));
    }

    #[test]
    fn test_from_file_and_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[robustness]\nvariants_per_axis = 3").unwrap();
        let config = FairConfig::from_file(file.path()).unwrap();
        assert_eq!(config.robustness.variants_per_axis, 3);

        let _guard = ENV_LOCK.lock().unwrap();
        let fallback = FairConfig::load(Some(PathBuf::from("/nonexistent/fairscore.toml"))).unwrap();
        assert_eq!(fallback.calibration.n_bins, 10);
    }

    #[test]
    fn test_env_overrides_and_rejects_malformed_values() {
        let _guard = ENV_LOCK.lock().unwrap();

        std::env::set_var("FAIRSCORE_SEED", " 1234 ");
        let config = FairConfig::load(None);
        std::env::set_var("FAIRSCORE_SEED", "not-a-seed");
        let malformed = FairConfig::load(None);
        std::env::remove_var("FAIRSCORE_SEED");

        assert_eq!(config.unwrap().robustness.seed, 1234);
        let err = malformed.unwrap_err();
        assert!(matches!(err, FairError::Configuration(_)));
        assert!(err.to_string().contains("FAIRSCORE_SEED"));

        let restored = FairConfig::load(None).unwrap();
        assert_eq!(restored.robustness.seed, FairConfig::builtin().unwrap().robustness.seed);
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = FairConfig::builtin().unwrap();
        let rendered = config.to_toml_string().unwrap();
        let reparsed = FairConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(
            reparsed.interpretability.step_patterns.patterns(),
            config.interpretability.step_patterns.patterns()
        );
    }
}
