//! Bulk import of a reference dataset.
//!
//! A dataset is the four record sets (tests, sources, ranges, synonyms) in one
//! JSON document. Ranges that name no known test are attached to the
//! placeholder test rather than dropped.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Database, DbError, DbResult};
use crate::models::{Range, Source, Synonym, Test, PLACEHOLDER_TEST_ID};

/// Metadata key holding the dataset version string.
pub const META_DATASET_VERSION: &str = "dataset_version";

/// Metadata key holding the last import timestamp.
pub const META_IMPORTED_AT: &str = "imported_at";

/// A complete reference dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeDataset {
    /// Curator-assigned version label
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub tests: Vec<Test>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub ranges: Vec<Range>,
    #[serde(default)]
    pub synonyms: Vec<Synonym>,
}

impl KnowledgeDataset {
    /// Parse a dataset from JSON text.
    pub fn from_json(json: &str) -> DbResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a dataset from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImportReport {
    pub tests: usize,
    pub sources: usize,
    pub ranges: usize,
    pub synonyms: usize,
    /// Ranges attached to the placeholder test
    pub placeholder_ranges: usize,
    /// Whether the placeholder test was created by this import
    pub placeholder_created: bool,
}

impl Database {
    /// Import a dataset inside a single transaction.
    ///
    /// Records are upserted by ID, so re-importing the same dataset is a
    /// no-op. Any failure rolls back the whole import.
    pub fn import_dataset(&self, dataset: &KnowledgeDataset) -> DbResult<ImportReport> {
        let tx = self.conn.unchecked_transaction()?;
        let mut report = ImportReport::default();

        for source in &dataset.sources {
            self.upsert_source(source)?;
            report.sources += 1;
        }

        for test in &dataset.tests {
            self.upsert_test(test)?;
            report.tests += 1;
        }

        let mut known_tests: HashSet<i64> = self
            .list_tests()?
            .into_iter()
            .map(|t| t.test_id)
            .collect();
        self.import_ranges(&dataset.ranges, &mut known_tests, &mut report)?;

        for synonym in &dataset.synonyms {
            if !known_tests.contains(&synonym.test_id) {
                return Err(DbError::Constraint(format!(
                    "synonym {} references unknown test {}",
                    synonym.synonym_id, synonym.test_id
                )));
            }
            self.upsert_synonym(synonym)?;
            report.synonyms += 1;
        }

        if let Some(version) = &dataset.version {
            self.set_meta(META_DATASET_VERSION, version)?;
        }
        self.set_meta(META_IMPORTED_AT, &chrono::Utc::now().to_rfc3339())?;

        tx.commit()?;

        if report.placeholder_ranges > 0 {
            tracing::warn!(
                count = report.placeholder_ranges,
                "Assigned placeholder test to ranges with missing test_id"
            );
        }
        tracing::info!(
            tests = report.tests,
            sources = report.sources,
            ranges = report.ranges,
            synonyms = report.synonyms,
            "Imported reference dataset"
        );

        Ok(report)
    }

    /// Upsert ranges, re-homing those whose test is unknown.
    ///
    /// `known_tests` is the set of test ids before any placeholder is
    /// created; it gains the placeholder id if one is needed.
    fn import_ranges(
        &self,
        ranges: &[Range],
        known_tests: &mut HashSet<i64>,
        report: &mut ImportReport,
    ) -> DbResult<()> {
        let orphaned: Vec<bool> = ranges
            .iter()
            .map(|r| !known_tests.contains(&r.test_id))
            .collect();

        if orphaned.contains(&true) && !known_tests.contains(&PLACEHOLDER_TEST_ID) {
            self.upsert_test(&Test::placeholder())?;
            known_tests.insert(PLACEHOLDER_TEST_ID);
            report.placeholder_created = true;
        }

        for (range, orphan) in ranges.iter().zip(orphaned) {
            if orphan {
                let mut rehomed = range.clone();
                rehomed.test_id = PLACEHOLDER_TEST_ID;
                self.upsert_range(&rehomed)?;
                report.placeholder_ranges += 1;
            } else {
                self.upsert_range(range)?;
            }
            report.ranges += 1;
        }
        Ok(())
    }

    /// Read and import a dataset file.
    pub fn import_dataset_file<P: AsRef<Path>>(&self, path: P) -> DbResult<ImportReport> {
        let dataset = KnowledgeDataset::from_file(path)?;
        self.import_dataset(&dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATASET: &str = r#"{
        "version": "2024.1",
        "sources": [
            {"source_id": 1, "name": "WHO", "type": "guideline", "trust_level": 5},
            {"source_id": 2, "name": "Lab Manual"}
        ],
        "tests": [
            {"test_id": 1, "canonical_name": "Hemoglobin", "short_name": "HGB"},
            {"test_id": 2, "canonical_name": "Platelet Count", "short_name": "PLT"}
        ],
        "ranges": [
            {"range_id": 1, "test_id": 1, "source_id": 1, "ref_low": 13.0, "ref_high": 17.0, "sex": "Male"},
            {"range_id": 2, "test_id": null, "source_id": 2, "ref_low": 0.5, "ref_high": 1.5},
            {"range_id": 3, "test_id": 77, "source_id": 2, "ref_text": "Negative", "value_type": "text"}
        ],
        "synonyms": [
            {"synonym_id": 1, "test_id": 1, "synonym": "Hb"}
        ]
    }"#;

    #[test]
    fn test_import_dataset() {
        let db = Database::open_in_memory().unwrap();
        let dataset = KnowledgeDataset::from_json(DATASET).unwrap();

        let report = db.import_dataset(&dataset).unwrap();
        assert_eq!(report.tests, 2);
        assert_eq!(report.sources, 2);
        assert_eq!(report.ranges, 3);
        assert_eq!(report.synonyms, 1);
        assert_eq!(report.placeholder_ranges, 2);
        assert!(report.placeholder_created);

        let placeholder = db.get_test(PLACEHOLDER_TEST_ID).unwrap().unwrap();
        assert_eq!(placeholder.canonical_name, "Unassigned Test");

        let ranges = db.list_ranges().unwrap();
        assert_eq!(ranges[0].test_id, 1);
        assert_eq!(ranges[1].test_id, PLACEHOLDER_TEST_ID);
        assert_eq!(ranges[2].test_id, PLACEHOLDER_TEST_ID);

        assert_eq!(db.get_meta(META_DATASET_VERSION).unwrap().as_deref(), Some("2024.1"));
        assert!(db.get_meta(META_IMPORTED_AT).unwrap().is_some());
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let dataset = KnowledgeDataset::from_json(DATASET).unwrap();

        db.import_dataset(&dataset).unwrap();
        let second = db.import_dataset(&dataset).unwrap();
        assert!(!second.placeholder_created);

        assert_eq!(db.count_tests().unwrap(), 3);
        assert_eq!(db.list_ranges().unwrap().len(), 3);
    }

    #[test]
    fn test_ranges_on_existing_placeholder_are_not_rehomed() {
        let db = Database::open_in_memory().unwrap();
        let mut dataset = KnowledgeDataset::from_json(DATASET).unwrap();
        dataset.tests.push(Test::placeholder());

        let report = db.import_dataset(&dataset).unwrap();
        assert!(!report.placeholder_created);
        // Only range 3 (test 77) was unknown; range 2 already names the placeholder
        assert_eq!(report.placeholder_ranges, 1);

        let again = db.import_dataset(&KnowledgeDataset::from_json(DATASET).unwrap()).unwrap();
        assert_eq!(again.placeholder_ranges, 1);
    }

    #[test]
    fn test_bad_synonym_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let mut dataset = KnowledgeDataset::from_json(DATASET).unwrap();
        dataset.synonyms.push(Synonym::new(2, 42, "mystery"));

        let result = db.import_dataset(&dataset);
        assert!(matches!(result, Err(DbError::Constraint(_))));

        // Nothing from the failed import is visible
        assert_eq!(db.count_tests().unwrap(), 0);
        assert!(db.list_ranges().unwrap().is_empty());
    }

    #[test]
    fn test_import_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(&path, DATASET).unwrap();

        let db = Database::open_in_memory().unwrap();
        let report = db.import_dataset_file(&path).unwrap();
        assert_eq!(report.tests, 2);
    }

    #[test]
    fn test_missing_file() {
        let db = Database::open_in_memory().unwrap();
        let result = db.import_dataset_file("/nonexistent/kb.json");
        assert!(matches!(result, Err(DbError::Io(_))));
    }
}
