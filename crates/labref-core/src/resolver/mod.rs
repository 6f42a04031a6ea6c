//! Resolver for extracted lab measurements.
//!
//! Pipeline: Normalization → Identity → Range Selection → Classification → Confidence

mod classifier;
mod confidence;
mod identity;
mod normalizer;
mod range_selector;

pub use classifier::*;
pub use confidence::*;
pub use identity::*;
pub use normalizer::*;
pub use range_selector::*;

use crate::config::ConfidenceConfig;
use crate::kb::KnowledgeBase;
use crate::models::{
    BatchReport, BatchSummary, Classification, ClassifiedResult, LabMeasurement, PatientContext,
    ResolutionIssue, UnknownReason,
};

/// Main resolver that coordinates the full pipeline.
pub struct Resolver<'a> {
    kb: &'a KnowledgeBase,
    normalizer: Normalizer,
    identity: IdentityResolver<'a>,
    ranges: RangeSelector<'a>,
    scorer: ConfidenceScorer,
}

impl<'a> Resolver<'a> {
    /// Create a resolver with default scoring.
    pub fn new(kb: &'a KnowledgeBase) -> Self {
        Self::with_config(kb, ConfidenceConfig::default())
    }

    /// Create a resolver with custom scoring.
    pub fn with_config(kb: &'a KnowledgeBase, config: ConfidenceConfig) -> Self {
        Self {
            kb,
            normalizer: Normalizer::new(),
            identity: IdentityResolver::new(kb),
            ranges: RangeSelector::new(kb),
            scorer: ConfidenceScorer::new(config),
        }
    }

    /// Resolve and classify one measurement.
    ///
    /// Never fails: any problem is recorded on the result, which is then
    /// UNKNOWN and not counted as a knowledge-base match.
    pub fn resolve_one(
        &self,
        measurement: &LabMeasurement,
        patient: &PatientContext,
    ) -> ClassifiedResult {
        // Step 1: Normalize name and unit
        let normalized_name = self.normalizer.normalize_name(&measurement.test_name);
        let unit = self.normalizer.normalize_unit(&measurement.unit);
        let mut result = unresolved(measurement, normalized_name, unit);

        // Step 2: Resolve the test identity
        let found = match self
            .identity
            .resolve(&result.normalized_name, &measurement.test_name)
        {
            Ok(found) => found,
            Err(issue) => return with_issue(result, issue),
        };
        result.test_id = Some(found.test.test_id);
        result.canonical_name = Some(found.test.canonical_name.clone());
        result.panel_name = found.test.panel_name.clone();

        // Step 3: Select the governing range
        let resolved = match self.ranges.select(found.test.test_id, patient) {
            Ok(resolved) => resolved,
            Err(issue) => return with_issue(result, issue),
        };
        let range = &resolved.range;
        result.ref_low = range.ref_low;
        result.ref_high = range.ref_high;
        result.reference_range_display = range.display();
        result.source_id = Some(range.source_id);
        result.source_name = Some(resolved.source_name.clone());
        result.trust_level = Some(resolved.trust_level);
        result.source_priority = Some(range.source_priority);

        // Step 4: Check the value
        let Some(value) = measurement.value.as_number() else {
            let issue = ResolutionIssue::NonNumericValue {
                raw_value: measurement.value.raw(),
            };
            return with_issue(result, issue);
        };

        // Step 5: Classify
        result.kb_found = true;
        if range.has_numeric_bounds() {
            result.classification = classify(value, range.ref_low, range.ref_high);
            result.unknown_reason = None;
        } else {
            result.unknown_reason = Some(UnknownReason::NoNumericBounds);
        }

        tracing::debug!(
            test_name = %measurement.test_name,
            test_id = found.test.test_id,
            range_id = range.range_id,
            classification = result.classification.as_str(),
            "Classified measurement"
        );

        result
    }

    /// Resolve a whole report sequentially.
    pub fn resolve_batch(
        &self,
        measurements: &[LabMeasurement],
        patient: &PatientContext,
    ) -> BatchReport {
        let results = measurements
            .iter()
            .map(|m| self.resolve_one(m, patient))
            .collect();
        self.finish(results)
    }

    /// Score and summarize per-item results, keeping their order.
    pub fn finish(&self, results: Vec<ClassifiedResult>) -> BatchReport {
        let evidence: Vec<Evidence> = results.iter().map(Evidence::from).collect();
        let confidence = self.scorer.score(&evidence);
        let summary = BatchSummary::from_results(&results);

        tracing::info!(
            total = summary.total_tests,
            matched = summary.kb_matched,
            unknown = summary.unknown,
            confidence = confidence.score,
            level = confidence.level.as_str(),
            "Resolved batch"
        );

        BatchReport {
            results,
            confidence,
            summary,
            kb_fingerprint: self.kb.fingerprint().to_string(),
        }
    }

    /// Get the normalizer for direct access.
    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Get the identity resolver for direct access.
    pub fn identity(&self) -> &IdentityResolver<'a> {
        &self.identity
    }

    /// Get the range selector for direct access.
    pub fn range_selector(&self) -> &RangeSelector<'a> {
        &self.ranges
    }

    /// Get the confidence scorer for direct access.
    pub fn scorer(&self) -> &ConfidenceScorer {
        &self.scorer
    }
}

/// A result with nothing resolved yet.
fn unresolved(
    measurement: &LabMeasurement,
    normalized_name: String,
    unit: String,
) -> ClassifiedResult {
    ClassifiedResult {
        test_name: measurement.test_name.clone(),
        normalized_name,
        value: measurement.value.clone(),
        unit,
        classification: Classification::Unknown,
        unknown_reason: Some(UnknownReason::NotInKnowledgeBase),
        ref_low: None,
        ref_high: None,
        reference_range_display: "N/A".into(),
        kb_found: false,
        test_id: None,
        canonical_name: None,
        panel_name: None,
        source_id: None,
        source_name: None,
        trust_level: None,
        source_priority: None,
        issue: None,
    }
}

fn with_issue(mut result: ClassifiedResult, issue: ResolutionIssue) -> ClassifiedResult {
    tracing::debug!(test_name = %result.test_name, %issue, "Measurement left unclassified");
    result.kb_found = false;
    result.classification = Classification::Unknown;
    result.unknown_reason = Some(issue.unknown_reason());
    result.issue = Some(issue);
    result
}
