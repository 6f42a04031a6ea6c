//! Test identity resolution.
//!
//! Cascade, first hit wins:
//! 1. Substring of a canonical name (ascending test_id)
//! 2. Substring of a short name (ascending test_id)
//! 3. Substring of a synonym (ascending synonym_id)

use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

use crate::kb::KnowledgeBase;
use crate::models::{ResolutionIssue, Test};

/// Minimum similarity for a near miss to be reported as a hint.
const CLOSEST_MIN_SIMILARITY: f64 = 0.85;

/// Which stage of the cascade matched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    CanonicalName,
    ShortName,
    Synonym,
}

/// A resolved test identity.
#[derive(Debug, Clone, Copy)]
pub struct IdentityMatch<'a> {
    pub test: &'a Test,
    pub method: MatchMethod,
}

/// Resolves normalized test names against the catalog.
pub struct IdentityResolver<'a> {
    kb: &'a KnowledgeBase,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(kb: &'a KnowledgeBase) -> Self {
        Self { kb }
    }

    /// Resolve an already-normalized name.
    ///
    /// `raw_name` is only used to describe a miss.
    pub fn resolve(
        &self,
        normalized: &str,
        raw_name: &str,
    ) -> Result<IdentityMatch<'a>, ResolutionIssue> {
        if normalized.is_empty() {
            return Err(ResolutionIssue::IdentityNotFound {
                raw_name: raw_name.to_string(),
                closest: None,
            });
        }

        let named_tests = || self.kb.tests().iter().filter(|t| !t.is_placeholder());

        if let Some(test) = named_tests().find(|t| contains_folded(&t.canonical_name, normalized)) {
            return Ok(IdentityMatch {
                test,
                method: MatchMethod::CanonicalName,
            });
        }

        if let Some(test) = named_tests().find(|t| {
            t.short_name
                .as_deref()
                .map_or(false, |short| contains_folded(short, normalized))
        }) {
            return Ok(IdentityMatch {
                test,
                method: MatchMethod::ShortName,
            });
        }

        let synonym_owner = self
            .kb
            .synonyms()
            .iter()
            .filter(|s| contains_folded(&s.synonym, normalized))
            .find_map(|s| self.kb.test(s.test_id));
        if let Some(test) = synonym_owner {
            return Ok(IdentityMatch {
                test,
                method: MatchMethod::Synonym,
            });
        }

        let closest = self.closest(normalized);
        tracing::debug!(raw_name, normalized, ?closest, "No test matched");

        Err(ResolutionIssue::IdentityNotFound {
            raw_name: raw_name.to_string(),
            closest,
        })
    }

    /// Most similar canonical name, if similar enough to be worth reporting.
    fn closest(&self, normalized: &str) -> Option<String> {
        let mut best: Option<(f64, &Test)> = None;
        for test in self.kb.tests().iter().filter(|t| !t.is_placeholder()) {
            let similarity = jaro_winkler(normalized, &test.canonical_name.to_lowercase());
            if similarity >= CLOSEST_MIN_SIMILARITY
                && best.map_or(true, |(score, _)| similarity > score)
            {
                best = Some((similarity, test));
            }
        }
        best.map(|(_, test)| test.canonical_name.clone())
    }
}

fn contains_folded(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}
