//! Reference range selection.
//!
//! Among the ranges that apply to the patient, the winner is the one with the
//! lowest source priority, then the most trusted source, then the lowest
//! range_id.

use std::cmp::{Ordering, Reverse};

use crate::kb::KnowledgeBase;
use crate::models::{PatientContext, Range, ResolutionIssue, ResolvedRange, DEFAULT_TRUST_LEVEL};

/// Picks the governing range for a test and patient.
pub struct RangeSelector<'a> {
    kb: &'a KnowledgeBase,
}

impl<'a> RangeSelector<'a> {
    pub fn new(kb: &'a KnowledgeBase) -> Self {
        Self { kb }
    }

    /// Select the range for a test.
    ///
    /// A winning range that breaks the numeric-bounds invariant is reported
    /// as malformed rather than skipped.
    pub fn select(
        &self,
        test_id: i64,
        patient: &PatientContext,
    ) -> Result<ResolvedRange, ResolutionIssue> {
        let winner = self
            .kb
            .ranges_for_test(test_id)
            .filter(|r| r.applies_to(patient.sex, patient.age))
            .min_by(|a, b| self.precedence(a, b))
            .ok_or_else(|| ResolutionIssue::RangeNotFound {
                test_id,
                sex: patient.sex,
                age: patient.age,
            })?;

        if !winner.is_well_formed() {
            tracing::warn!(range_id = winner.range_id, test_id, "Selected range is malformed");
            return Err(ResolutionIssue::MalformedRecord {
                range_id: winner.range_id,
            });
        }

        let source = self.kb.source(winner.source_id);
        Ok(ResolvedRange {
            range: winner.clone(),
            source_name: source.map(|s| s.name.clone()).unwrap_or_default(),
            trust_level: source.map_or(DEFAULT_TRUST_LEVEL, |s| s.trust_level),
        })
    }

    fn trust_of(&self, range: &Range) -> u8 {
        self.kb
            .source(range.source_id)
            .map_or(DEFAULT_TRUST_LEVEL, |s| s.trust_level)
    }

    fn precedence(&self, a: &Range, b: &Range) -> Ordering {
        let key = |r: &Range| (r.source_priority, Reverse(self.trust_of(r)), r.range_id);
        key(a).cmp(&key(b))
    }
}
