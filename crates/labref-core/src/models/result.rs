//! Classification results produced by the resolver.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{MeasurementValue, Range, Sex};

/// Outcome of comparing a value against its reference range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    Low,
    Normal,
    High,
    Unknown,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Low => "LOW",
            Classification::Normal => "NORMAL",
            Classification::High => "HIGH",
            Classification::Unknown => "UNKNOWN",
        }
    }
}

/// Why a result could not be classified.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnknownReason {
    NotInKnowledgeBase,
    NoApplicableRange,
    NonNumericValue,
    MalformedReference,
    NoNumericBounds,
}

impl UnknownReason {
    pub fn description(&self) -> &'static str {
        match self {
            UnknownReason::NotInKnowledgeBase => "test not found in knowledge base",
            UnknownReason::NoApplicableRange => "no reference range applies to this patient",
            UnknownReason::NonNumericValue => "value is not numeric",
            UnknownReason::MalformedReference => "reference range record is malformed",
            UnknownReason::NoNumericBounds => "no numeric bounds available",
        }
    }
}

/// Aggregation key for per-item issues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    IdentityNotFound,
    RangeNotFound,
    NonNumericValue,
    MalformedRecord,
}

/// A recoverable per-item resolution failure.
///
/// None of these abort a batch; the affected item is reported as unmatched.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionIssue {
    #[error("No test matches name: {raw_name}")]
    IdentityNotFound {
        raw_name: String,
        /// Closest canonical name, as a hint only
        closest: Option<String>,
    },

    #[error("No reference range for test {test_id} (sex {sex}, age {age:?})")]
    RangeNotFound {
        test_id: i64,
        sex: Sex,
        age: Option<f64>,
    },

    #[error("Value is not numeric: {raw_value:?}")]
    NonNumericValue { raw_value: String },

    #[error("Range {range_id} has no bounds and no reference text")]
    MalformedRecord { range_id: i64 },
}

impl ResolutionIssue {
    pub fn kind(&self) -> IssueKind {
        match self {
            ResolutionIssue::IdentityNotFound { .. } => IssueKind::IdentityNotFound,
            ResolutionIssue::RangeNotFound { .. } => IssueKind::RangeNotFound,
            ResolutionIssue::NonNumericValue { .. } => IssueKind::NonNumericValue,
            ResolutionIssue::MalformedRecord { .. } => IssueKind::MalformedRecord,
        }
    }

    pub fn unknown_reason(&self) -> UnknownReason {
        match self {
            ResolutionIssue::IdentityNotFound { .. } => UnknownReason::NotInKnowledgeBase,
            ResolutionIssue::RangeNotFound { .. } => UnknownReason::NoApplicableRange,
            ResolutionIssue::NonNumericValue { .. } => UnknownReason::NonNumericValue,
            ResolutionIssue::MalformedRecord { .. } => UnknownReason::MalformedReference,
        }
    }
}

/// The range chosen for a test, enriched with its source's standing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedRange {
    pub range: Range,
    pub source_name: String,
    /// Trust level of the owning source (1..=5)
    pub trust_level: u8,
}

/// Fully resolved result for one measurement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifiedResult {
    /// Test name as printed on the report
    pub test_name: String,
    /// Name after abbreviation expansion
    pub normalized_name: String,
    pub value: MeasurementValue,
    /// Unit after normalization
    pub unit: String,
    pub classification: Classification,
    /// Set whenever classification is UNKNOWN
    pub unknown_reason: Option<UnknownReason>,
    pub ref_low: Option<f64>,
    pub ref_high: Option<f64>,
    pub reference_range_display: String,
    /// True only when the test and a usable range were found
    pub kb_found: bool,
    pub test_id: Option<i64>,
    pub canonical_name: Option<String>,
    pub panel_name: Option<String>,
    pub source_id: Option<i64>,
    pub source_name: Option<String>,
    pub trust_level: Option<u8>,
    pub source_priority: Option<u8>,
    pub issue: Option<ResolutionIssue>,
}

/// Overall confidence band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLevel {
    None,
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::None => "NONE",
            ConfidenceLevel::Low => "LOW",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::High => "HIGH",
        }
    }
}

/// Batch-level confidence in the evidence behind the results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceScore {
    /// 0.0 - 1.0, rounded to two decimals
    pub score: f64,
    pub level: ConfidenceLevel,
    /// Where the confidence comes from (e.g., "Knowledge Base (3/4 tests matched)")
    pub source_label: String,
}

/// Counts over a batch of results.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchSummary {
    pub total_tests: usize,
    pub kb_matched: usize,
    /// Formatted percentage (e.g., "75.0%")
    pub kb_match_rate: String,
    pub low: usize,
    pub normal: usize,
    pub high: usize,
    pub unknown: usize,
    pub issues: BTreeMap<IssueKind, usize>,
}

impl BatchSummary {
    /// Tally a set of results.
    pub fn from_results(results: &[ClassifiedResult]) -> Self {
        let mut summary = BatchSummary {
            total_tests: results.len(),
            ..Default::default()
        };

        for result in results {
            if result.kb_found {
                summary.kb_matched += 1;
            }
            match result.classification {
                Classification::Low => summary.low += 1,
                Classification::Normal => summary.normal += 1,
                Classification::High => summary.high += 1,
                Classification::Unknown => summary.unknown += 1,
            }
            if let Some(issue) = &result.issue {
                *summary.issues.entry(issue.kind()).or_insert(0) += 1;
            }
        }

        summary.kb_match_rate = if summary.total_tests > 0 {
            format!(
                "{:.1}%",
                summary.kb_matched as f64 / summary.total_tests as f64 * 100.0
            )
        } else {
            "0%".into()
        };

        summary
    }
}

/// Everything the resolver produces for one report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchReport {
    /// Per-measurement results, in input order
    pub results: Vec<ClassifiedResult>,
    pub confidence: ConfidenceScore,
    pub summary: BatchSummary,
    /// Fingerprint of the knowledge base the batch was resolved against
    pub kb_fingerprint: String,
}

impl BatchReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
