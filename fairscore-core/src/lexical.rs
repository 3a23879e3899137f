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

//! Lexical matching
//!
//! Every indicator used by the router and the evaluators is one of two kinds
//! of group:
//!
//! - [`TermSet`]: lowercase keywords, counted as distinct case-insensitive
//!   substring hits (a keyword present three times still counts once).
//! - [`PatternSet`]: regular expressions compiled case-insensitively, counted
//!   as the total number of non-overlapping matches.
//!
//! Both validate at deserialization time, so a malformed table fails when the
//! configuration is loaded and never at call time.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fairscore_core::lexical::{match_groups, LexicalGroup, PatternSet, TermSet};
//!
//! let money = TermSet::new(["stock", "bond"])?;
//! let amounts = PatternSet::new([r"\$[\d,]+"])?;
//! let counts = match_groups("Buy the stock for $100", &[("kw", &money), ("re", &amounts)]);
//! assert_eq!(counts["kw"], 1);
//! ```

use crate::error::{FairError, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

/// A group that can be counted against text
pub trait LexicalGroup {
    fn count(&self, text: &str) -> usize;

    fn any(&self, text: &str) -> bool {
        self.count(text) > 0
    }
}

/// Count every named group against `text`
pub fn match_groups<'a>(
    text: &str,
    groups: &[(&'a str, &dyn LexicalGroup)],
) -> BTreeMap<&'a str, usize> {
    groups
        .iter()
        .map(|(name, group)| (*name, group.count(text)))
        .collect()
}

// ============================================================================
// Keyword groups
// ============================================================================

/// Lowercase keyword set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct TermSet {
    terms: Vec<String>,
}

impl TermSet {
    pub fn new<I, S>(terms: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let terms: Vec<String> = terms.into_iter().map(Into::into).collect();
        Self::try_from(terms).map_err(FairError::Configuration)
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Exact membership of a single token
    pub fn contains(&self, word: &str) -> bool {
        self.terms.iter().any(|t| t == word)
    }

    /// Terms present in `text`, in table order
    pub fn matches(&self, text: &str) -> Vec<&str> {
        let lower = text.to_lowercase();
        self.terms
            .iter()
            .filter(|t| lower.contains(t.as_str()))
            .map(String::as_str)
            .collect()
    }
}

impl LexicalGroup for TermSet {
    fn count(&self, text: &str) -> usize {
        let lower = text.to_lowercase();
        self.terms.iter().filter(|t| lower.contains(t.as_str())).count()
    }
}

impl TryFrom<Vec<String>> for TermSet {
    type Error = String;

    fn try_from(terms: Vec<String>) -> std::result::Result<Self, Self::Error> {
        let mut out = Vec::with_capacity(terms.len());
        for term in terms {
            if term.trim().is_empty() {
                return Err("keyword group contains an empty keyword".to_string());
            }
            out.push(term.to_lowercase());
        }
        Ok(Self { terms: out })
    }
}

impl From<TermSet> for Vec<String> {
    fn from(set: TermSet) -> Self {
        set.terms
    }
}

// ============================================================================
// Regex groups
// ============================================================================

/// Case-insensitive regex set, compiled once
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct PatternSet {
    sources: Vec<String>,
    regexes: Vec<Regex>,
}

impl PatternSet {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        Self::try_from(patterns).map_err(FairError::Configuration)
    }

    pub fn patterns(&self) -> &[String] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Source patterns with at least one match in `text`
    pub fn matches(&self, text: &str) -> Vec<&str> {
        self.sources
            .iter()
            .zip(&self.regexes)
            .filter(|(_, re)| re.is_match(text))
            .map(|(src, _)| src.as_str())
            .collect()
    }

    /// Number of patterns with at least one match
    pub fn distinct_count(&self, text: &str) -> usize {
        self.regexes.iter().filter(|re| re.is_match(text)).count()
    }

    /// Every matched substring, pattern by pattern
    pub fn find_all(&self, text: &str) -> Vec<String> {
        self.regexes
            .iter()
            .flat_map(|re| re.find_iter(text).map(|m| m.as_str().to_string()))
            .collect()
    }
}

impl LexicalGroup for PatternSet {
    fn count(&self, text: &str) -> usize {
        self.regexes.iter().map(|re| re.find_iter(text).count()).sum()
    }
}

impl TryFrom<Vec<String>> for PatternSet {
    type Error = String;

    fn try_from(sources: Vec<String>) -> std::result::Result<Self, Self::Error> {
        let mut regexes = Vec::with_capacity(sources.len());
        for src in &sources {
            if src.is_empty() {
                return Err("pattern group contains an empty regex".to_string());
            }
            let re = RegexBuilder::new(src)
                .case_insensitive(true)
                .build()
                .map_err(|e| format!("invalid regex '{}': {}", src, e))?;
            regexes.push(re);
        }
        Ok(Self { sources, regexes })
    }
}

impl From<PatternSet> for Vec<String> {
    fn from(set: PatternSet) -> Self {
        set.sources
    }
}

/// A single case-insensitive regex, for tables that need capture groups
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Result<Self> {
        Self::try_from(source.into()).map_err(FairError::Configuration)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

impl TryFrom<String> for Pattern {
    type Error = String;

    fn try_from(source: String) -> std::result::Result<Self, Self::Error> {
        let mut set = PatternSet::try_from(vec![source])?;
        let regex = set.regexes.remove(0);
        let source = set.sources.remove(0);
        Ok(Self { source, regex })
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.source
    }
}

// ============================================================================
// Tokenization helpers
// ============================================================================

/// Lowercased whitespace tokens
pub fn words(text: &str) -> Vec<String> {
    text.split_whitespace().map(|w| w.to_lowercase()).collect()
}

/// Lowercased tokens with punctuation replaced by whitespace
pub fn plain_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// |A ∩ B| / |A ∪ B|. Two empty sets are identical (1.0).
pub fn jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_set_counts_distinct_terms() {
        let set = TermSet::new(["stock", "Bond", "cash flow"]).unwrap();
        assert_eq!(set.count("STOCK stock and bonds"), 2);
        assert_eq!(set.count("negative Cash Flow"), 1);
        assert_eq!(set.matches("bond market"), vec!["bond"]);
        assert!(!set.any("nothing here"));
    }

    #[test]
    fn test_term_set_rejects_empty_keyword() {
        assert!(matches!(TermSet::new(["ok", "  "]), Err(FairError::Configuration(_))));
    }

    #[test]
    fn test_pattern_set_counts_non_overlapping_matches() {
        let set = PatternSet::new([r"\$[\d,]+", r"[\d.]+%"]).unwrap();
        assert_eq!(set.count("$10,000 at 5% and $20 at 3.5%"), 4);
        assert_eq!(set.distinct_count("$10 only"), 1);
        assert_eq!(set.find_all("$10 then 2%"), vec!["$10", "2%"]);
    }

    #[test]
    fn test_pattern_set_is_case_insensitive() {
        let set = PatternSet::new(["diagnos[ie]s"]).unwrap();
        assert!(set.any("DIAGNOSIS pending"));
    }

    #[test]
    fn test_pattern_set_rejects_invalid_and_empty() {
        assert!(matches!(PatternSet::new(["(unclosed"]), Err(FairError::Configuration(_))));
        assert!(matches!(PatternSet::new([""]), Err(FairError::Configuration(_))));
    }

    #[test]
    fn test_pattern_set_deserialization_fails_fast() {
        #[derive(Deserialize)]
        struct Holder {
            #[allow(dead_code)]
            patterns: PatternSet,
        }
        let result: std::result::Result<Holder, _> = toml::from_str(r#"patterns = ["[a-"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_single_pattern_exposes_captures() {
        let p = Pattern::new(r"step \d+[.:]\s*([^.]+)").unwrap();
        let caps = p.regex().captures("Step 1: gather the data.").unwrap();
        assert_eq!(&caps[1], "gather the data");
    }

    #[test]
    fn test_term_set_contains_is_exact() {
        let set = TermSet::new(["the", "and"]).unwrap();
        assert!(set.contains("the"));
        assert!(!set.contains("then"));
    }

    #[test]
    fn test_match_groups() {
        let kw = TermSet::new(["patient", "doctor"]).unwrap();
        let re = PatternSet::new([r"mg\b"]).unwrap();
        let counts = match_groups("The doctor gave the patient 5 mg", &[("kw", &kw), ("re", &re)]);
        assert_eq!(counts["kw"], 2);
        assert_eq!(counts["re"], 1);
    }

    #[test]
    fn test_plain_words_strips_punctuation() {
        assert_eq!(plain_words("Hello, World! It's"), vec!["hello", "world", "it", "s"]);
    }

    #[test]
    fn test_jaccard() {
        let a: HashSet<_> = ["a", "b"].into_iter().collect();
        let b: HashSet<_> = ["b", "c"].into_iter().collect();
        assert!((jaccard(&a, &b) - 1.0 / 3.0).abs() < 1e-12);
        let empty: HashSet<&str> = HashSet::new();
        assert_eq!(jaccard(&empty, &empty), 1.0);
        assert_eq!(jaccard(&a, &empty), 0.0);
    }
}
