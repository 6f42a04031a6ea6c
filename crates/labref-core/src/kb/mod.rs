//! Immutable in-memory snapshot of the reference knowledge base.
//!
//! The snapshot is validated once at load time and never mutated afterwards,
//! so it can be shared freely across threads.

mod stats;

pub use stats::*;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::db::{Database, DbError, KnowledgeDataset, META_DATASET_VERSION};
use crate::models::{Range, Source, Synonym, Test, PLACEHOLDER_TEST_ID};

/// Fatal knowledge-base load errors.
#[derive(Error, Debug)]
pub enum KbError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Knowledge base contains no tests")]
    Empty,

    #[error("Duplicate {table} id: {id}")]
    DuplicateId { table: &'static str, id: i64 },

    #[error("Range {range_id} references unknown source {source_id}")]
    UnknownSource { range_id: i64, source_id: i64 },

    #[error("Synonym {synonym_id} references unknown test {test_id}")]
    UnknownTest { synonym_id: i64, test_id: i64 },

    #[error("Source {source_id} has trust level {trust_level}, expected 1-5")]
    TrustLevelOutOfRange { source_id: i64, trust_level: u8 },

    #[error("Range {range_id} has source priority {priority}, expected 1-5")]
    PriorityOutOfRange { range_id: i64, priority: u8 },
}

pub type KbResult<T> = Result<T, KbError>;

/// Validated, indexed reference data.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    /// Sorted by test_id
    tests: Vec<Test>,
    /// Sorted by source_id
    sources: Vec<Source>,
    /// Sorted by range_id
    ranges: Vec<Range>,
    /// Sorted by synonym_id
    synonyms: Vec<Synonym>,
    test_index: HashMap<i64, usize>,
    source_index: HashMap<i64, usize>,
    /// test_id -> indices into `ranges`, ascending range_id
    ranges_by_test: HashMap<i64, Vec<usize>>,
    fingerprint: String,
    dataset_version: Option<String>,
    loaded_at: DateTime<Utc>,
    placeholder_ranges: usize,
}

impl KnowledgeBase {
    /// Build a snapshot from raw record sets.
    ///
    /// Ranges whose test is unknown are attached to the placeholder test,
    /// which is created if absent.
    pub fn from_records(
        mut tests: Vec<Test>,
        mut sources: Vec<Source>,
        mut ranges: Vec<Range>,
        mut synonyms: Vec<Synonym>,
    ) -> KbResult<Self> {
        if tests.is_empty() {
            return Err(KbError::Empty);
        }

        tests.sort_by_key(|t| t.test_id);
        sources.sort_by_key(|s| s.source_id);
        ranges.sort_by_key(|r| r.range_id);
        synonyms.sort_by_key(|s| s.synonym_id);

        check_unique("tests", tests.iter().map(|t| t.test_id))?;
        check_unique("sources", sources.iter().map(|s| s.source_id))?;
        check_unique("ranges", ranges.iter().map(|r| r.range_id))?;
        check_unique("synonyms", synonyms.iter().map(|s| s.synonym_id))?;

        for source in &sources {
            if !(1..=5).contains(&source.trust_level) {
                return Err(KbError::TrustLevelOutOfRange {
                    source_id: source.source_id,
                    trust_level: source.trust_level,
                });
            }
        }

        let source_ids: HashSet<i64> = sources.iter().map(|s| s.source_id).collect();
        for range in &ranges {
            if !source_ids.contains(&range.source_id) {
                return Err(KbError::UnknownSource {
                    range_id: range.range_id,
                    source_id: range.source_id,
                });
            }
            if !(1..=5).contains(&range.source_priority) {
                return Err(KbError::PriorityOutOfRange {
                    range_id: range.range_id,
                    priority: range.source_priority,
                });
            }
        }

        let mut test_ids: HashSet<i64> = tests.iter().map(|t| t.test_id).collect();

        let mut placeholder_ranges = 0;
        for range in ranges.iter_mut() {
            if !test_ids.contains(&range.test_id) {
                range.test_id = PLACEHOLDER_TEST_ID;
                placeholder_ranges += 1;
            }
        }
        if placeholder_ranges > 0 && !test_ids.contains(&PLACEHOLDER_TEST_ID) {
            tests.push(Test::placeholder());
            tests.sort_by_key(|t| t.test_id);
            test_ids.insert(PLACEHOLDER_TEST_ID);
        }
        if placeholder_ranges > 0 {
            tracing::warn!(
                count = placeholder_ranges,
                "Attached ranges with unknown test to placeholder test"
            );
        }

        // Synonyms may name the placeholder created above
        for synonym in &synonyms {
            if !test_ids.contains(&synonym.test_id) {
                return Err(KbError::UnknownTest {
                    synonym_id: synonym.synonym_id,
                    test_id: synonym.test_id,
                });
            }
        }

        let test_index = tests
            .iter()
            .enumerate()
            .map(|(i, t)| (t.test_id, i))
            .collect();
        let source_index = sources
            .iter()
            .enumerate()
            .map(|(i, s)| (s.source_id, i))
            .collect();

        let mut ranges_by_test: HashMap<i64, Vec<usize>> = HashMap::new();
        for (i, range) in ranges.iter().enumerate() {
            ranges_by_test.entry(range.test_id).or_default().push(i);
        }

        let fingerprint = compute_fingerprint(&tests, &sources, &ranges, &synonyms)?;

        Ok(Self {
            tests,
            sources,
            ranges,
            synonyms,
            test_index,
            source_index,
            ranges_by_test,
            fingerprint,
            dataset_version: None,
            loaded_at: Utc::now(),
            placeholder_ranges,
        })
    }

    /// Build a snapshot from a parsed dataset.
    pub fn from_dataset(dataset: &KnowledgeDataset) -> KbResult<Self> {
        let mut kb = Self::from_records(
            dataset.tests.clone(),
            dataset.sources.clone(),
            dataset.ranges.clone(),
            dataset.synonyms.clone(),
        )?;
        kb.dataset_version = dataset.version.clone();
        Ok(kb)
    }

    /// Load and validate the snapshot from the database.
    pub fn load(db: &Database) -> KbResult<Self> {
        let mut kb = Self::from_records(
            db.list_tests()?,
            db.list_sources()?,
            db.list_ranges()?,
            db.list_synonyms()?,
        )?;
        kb.dataset_version = db.get_meta(META_DATASET_VERSION)?;

        tracing::info!(
            tests = kb.tests.len(),
            sources = kb.sources.len(),
            ranges = kb.ranges.len(),
            synonyms = kb.synonyms.len(),
            fingerprint = %kb.fingerprint,
            "Loaded knowledge base"
        );

        Ok(kb)
    }

    /// All tests, ascending test_id.
    pub fn tests(&self) -> &[Test] {
        &self.tests
    }

    /// All sources, ascending source_id.
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// All ranges, ascending range_id.
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    /// All synonyms, ascending synonym_id.
    pub fn synonyms(&self) -> &[Synonym] {
        &self.synonyms
    }

    pub fn test(&self, test_id: i64) -> Option<&Test> {
        self.test_index.get(&test_id).map(|&i| &self.tests[i])
    }

    pub fn source(&self, source_id: i64) -> Option<&Source> {
        self.source_index.get(&source_id).map(|&i| &self.sources[i])
    }

    /// Ranges owned by a test, ascending range_id.
    pub fn ranges_for_test(&self, test_id: i64) -> impl Iterator<Item = &Range> + '_ {
        self.ranges_by_test
            .get(&test_id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.ranges[i])
    }

    /// SHA-256 over the canonical record sets.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn dataset_version(&self) -> Option<&str> {
        self.dataset_version.as_deref()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Number of ranges attached to the placeholder test during load.
    pub fn placeholder_ranges(&self) -> usize {
        self.placeholder_ranges
    }
}

fn check_unique(table: &'static str, ids: impl Iterator<Item = i64>) -> KbResult<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(KbError::DuplicateId { table, id });
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct CanonicalRecords<'a> {
    tests: &'a [Test],
    sources: &'a [Source],
    ranges: &'a [Range],
    synonyms: &'a [Synonym],
}

fn compute_fingerprint(
    tests: &[Test],
    sources: &[Source],
    ranges: &[Range],
    synonyms: &[Synonym],
) -> KbResult<String> {
    let canonical = serde_json::to_vec(&CanonicalRecords {
        tests,
        sources,
        ranges,
        synonyms,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}
