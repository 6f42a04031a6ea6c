//! LabRef Core Library
//!
//! Resolves extracted lab measurements against a curated reference-range
//! knowledge base and classifies them.
//!
//! # Architecture
//!
//! ```text
//! (test name, value, unit) + patient
//!                 │
//!           Normalization          abbreviations, units
//!                 │
//!         Identity Resolution      canonical → short name → synonym
//!                 │
//!          Range Selection         sex/age filter, priority → trust → id
//!                 │
//!           Classification         LOW / NORMAL / HIGH / UNKNOWN
//!                 │
//!       ┌─────────▼─────────┐
//!       │ Confidence Scorer │      trust- and priority-weighted
//!       └─────────┬─────────┘
//!                 │
//!            BatchReport
//! ```
//!
//! # Core Principle
//!
//! **No measurement aborts a batch.** Anything that cannot be resolved is
//! reported as UNKNOWN with a structured issue attached.
//!
//! # Modules
//!
//! - [`db`]: SQLite storage and dataset import
//! - [`kb`]: Immutable validated knowledge-base snapshot and statistics
//! - [`models`]: Domain types (Test, Range, ClassifiedResult, etc.)
//! - [`resolver`]: Normalizer, identity, range selection, classifier, scorer
//! - [`engine`]: Long-lived engine with optional worker pool
//! - [`config`]: Engine configuration and logging setup

pub mod config;
pub mod db;
pub mod engine;
pub mod kb;
pub mod models;
pub mod resolver;

// Re-export commonly used types
pub use config::{ConfidenceConfig, EngineConfig, ScoreVariation};
pub use db::Database;
pub use engine::{EngineError, LabEngine};
pub use kb::{KbStatistics, KnowledgeBase};
pub use models::{
    BatchReport, Classification, ClassifiedResult, ConfidenceLevel, ConfidenceScore,
    LabMeasurement, MeasurementValue, PatientContext, ResolutionIssue, Sex,
};
pub use resolver::{Normalizer, Resolver};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::Arc;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum LabRefError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Knowledge base error: {0}")]
    KnowledgeBaseError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl From<db::DbError> for LabRefError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::Json(e) => e.into(),
            other => LabRefError::DatabaseError(other.to_string()),
        }
    }
}

impl From<kb::KbError> for LabRefError {
    fn from(e: kb::KbError) -> Self {
        match e {
            kb::KbError::Database(e) => e.into(),
            other => LabRefError::KnowledgeBaseError(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for LabRefError {
    fn from(e: config::ConfigError) -> Self {
        LabRefError::ConfigError(e.to_string())
    }
}

impl From<serde_json::Error> for LabRefError {
    fn from(e: serde_json::Error) -> Self {
        LabRefError::SerializationError(e.to_string())
    }
}

impl From<EngineError> for LabRefError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Database(e) => e.into(),
            EngineError::KnowledgeBase(e) => e.into(),
            EngineError::Config(e) => e.into(),
            EngineError::Json(e) => e.into(),
            EngineError::ThreadPool(e) => LabRefError::ConfigError(e.to_string()),
        }
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

fn parse_config(config_json: Option<String>) -> Result<EngineConfig, LabRefError> {
    match config_json {
        Some(json) => Ok(EngineConfig::from_json(&json)?),
        None => Ok(EngineConfig::default()),
    }
}

/// Open a SQLite knowledge base at the given path.
#[uniffi::export]
pub fn open_knowledge_base(
    path: String,
    config_json: Option<String>,
) -> Result<Arc<LabRefCore>, LabRefError> {
    let engine = LabEngine::open(&path, parse_config(config_json)?)?;
    Ok(Arc::new(LabRefCore { engine }))
}

/// Build an in-memory knowledge base from a JSON dataset.
#[uniffi::export]
pub fn open_knowledge_base_in_memory_from_json(
    dataset_json: String,
    config_json: Option<String>,
) -> Result<Arc<LabRefCore>, LabRefError> {
    let engine = LabEngine::from_dataset_json(&dataset_json, parse_config(config_json)?)?;
    Ok(Arc::new(LabRefCore { engine }))
}

/// Install the log subscriber. Safe to call more than once.
#[uniffi::export]
pub fn init_logging(filter: Option<String>) {
    config::init_logging(filter.as_deref());
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe engine wrapper for FFI.
///
/// The knowledge base is immutable, so no locking is needed.
#[derive(uniffi::Object)]
pub struct LabRefCore {
    engine: LabEngine,
}

#[uniffi::export]
impl LabRefCore {
    /// Resolve and classify one report.
    pub fn resolve_batch(
        &self,
        tests: Vec<FfiMeasurement>,
        patient: FfiPatientContext,
    ) -> Result<FfiBatchReport, LabRefError> {
        let patient = PatientContext::try_from(patient)?;
        let measurements: Vec<LabMeasurement> = tests.into_iter().map(Into::into).collect();
        let report = self.engine.resolve_batch(&measurements, &patient);
        Ok(report.into())
    }

    /// Resolve a JSON request, returning the JSON report.
    pub fn resolve_batch_json(&self, request_json: String) -> Result<String, LabRefError> {
        Ok(self.engine.resolve_request_json(&request_json)?)
    }

    /// Find the test a printed name resolves to.
    pub fn lookup_test(&self, name: String) -> Option<FfiTest> {
        self.engine.lookup_test(&name).cloned().map(Into::into)
    }

    /// Knowledge-base statistics as JSON.
    pub fn statistics_json(&self) -> Result<String, LabRefError> {
        Ok(serde_json::to_string_pretty(&self.engine.statistics())?)
    }

    /// SHA-256 fingerprint of the loaded knowledge base.
    pub fn fingerprint(&self) -> String {
        self.engine.knowledge_base().fingerprint().to_string()
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe measurement. Set `value` for numbers, `value_text` otherwise.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMeasurement {
    pub test_name: String,
    pub value: Option<f64>,
    pub value_text: Option<String>,
    pub unit: String,
}

impl From<FfiMeasurement> for LabMeasurement {
    fn from(m: FfiMeasurement) -> Self {
        let value = match (m.value, m.value_text) {
            (Some(v), _) => MeasurementValue::Number(v),
            (None, Some(text)) => MeasurementValue::Text(text),
            (None, None) => MeasurementValue::Missing,
        };
        LabMeasurement::new(m.test_name, value, m.unit)
    }
}

/// FFI-safe patient context. Empty sex means unknown.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientContext {
    pub sex: String,
    pub age: Option<f64>,
}

impl TryFrom<FfiPatientContext> for PatientContext {
    type Error = LabRefError;

    fn try_from(p: FfiPatientContext) -> Result<Self, Self::Error> {
        let sex: Sex = p
            .sex
            .parse()
            .map_err(|e: models::FieldParseError| LabRefError::InvalidInput(e.to_string()))?;
        Ok(PatientContext::new(sex, p.age))
    }
}

/// FFI-safe test identity.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTest {
    pub test_id: i64,
    pub canonical_name: String,
    pub short_name: Option<String>,
    pub panel_name: Option<String>,
    pub specimen_type: Option<String>,
    pub category: Option<String>,
    pub loinc_code: Option<String>,
}

impl From<models::Test> for FfiTest {
    fn from(test: models::Test) -> Self {
        Self {
            test_id: test.test_id,
            canonical_name: test.canonical_name,
            short_name: test.short_name,
            panel_name: test.panel_name,
            specimen_type: test.specimen_type,
            category: test.category,
            loinc_code: test.loinc_code,
        }
    }
}

/// FFI-safe classified result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiClassifiedResult {
    pub test_name: String,
    pub normalized_name: String,
    /// Raw value as text
    pub value: String,
    pub unit: String,
    /// LOW, NORMAL, HIGH or UNKNOWN
    pub classification: String,
    pub unknown_reason: Option<String>,
    pub ref_low: Option<f64>,
    pub ref_high: Option<f64>,
    pub reference_range_display: String,
    pub kb_found: bool,
    pub test_id: Option<i64>,
    pub canonical_name: Option<String>,
    pub panel_name: Option<String>,
    pub source_name: Option<String>,
    pub trust_level: Option<u8>,
    pub source_priority: Option<u8>,
    pub issue: Option<String>,
}

impl From<ClassifiedResult> for FfiClassifiedResult {
    fn from(r: ClassifiedResult) -> Self {
        Self {
            test_name: r.test_name,
            normalized_name: r.normalized_name,
            value: r.value.raw(),
            unit: r.unit,
            classification: r.classification.as_str().to_string(),
            unknown_reason: r.unknown_reason.map(|u| u.description().to_string()),
            ref_low: r.ref_low,
            ref_high: r.ref_high,
            reference_range_display: r.reference_range_display,
            kb_found: r.kb_found,
            test_id: r.test_id,
            canonical_name: r.canonical_name,
            panel_name: r.panel_name,
            source_name: r.source_name,
            trust_level: r.trust_level,
            source_priority: r.source_priority,
            issue: r.issue.map(|i| i.to_string()),
        }
    }
}

/// FFI-safe batch confidence.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiConfidence {
    pub score: f64,
    /// NONE, LOW, MEDIUM or HIGH
    pub level: String,
    pub source_label: String,
}

impl From<ConfidenceScore> for FfiConfidence {
    fn from(c: ConfidenceScore) -> Self {
        Self {
            score: c.score,
            level: c.level.as_str().to_string(),
            source_label: c.source_label,
        }
    }
}

/// FFI-safe batch report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBatchReport {
    pub results: Vec<FfiClassifiedResult>,
    pub confidence: FfiConfidence,
    pub total_tests: u32,
    pub kb_matched: u32,
    pub kb_match_rate: String,
    pub low: u32,
    pub normal: u32,
    pub high: u32,
    pub unknown: u32,
    pub kb_fingerprint: String,
}

impl From<BatchReport> for FfiBatchReport {
    fn from(report: BatchReport) -> Self {
        let summary = report.summary;
        Self {
            results: report.results.into_iter().map(Into::into).collect(),
            confidence: report.confidence.into(),
            total_tests: summary.total_tests as u32,
            kb_matched: summary.kb_matched as u32,
            kb_match_rate: summary.kb_match_rate,
            low: summary.low as u32,
            normal: summary.normal as u32,
            high: summary.high as u32,
            unknown: summary.unknown as u32,
            kb_fingerprint: report.kb_fingerprint,
        }
    }
}
