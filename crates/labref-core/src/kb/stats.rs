//! Knowledge-base statistics.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::KnowledgeBase;

/// How many entries the ranked distributions keep.
const TOP_N: usize = 10;

/// A named bucket in a distribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamedCount {
    pub name: String,
    pub count: usize,
}

/// A source ranked by how many ranges it contributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRangeCount {
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub range_count: usize,
}

/// Headline totals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KbOverview {
    pub total_tests: usize,
    pub total_sources: usize,
    pub total_ranges: usize,
    pub total_synonyms: usize,
    /// Rounded to two decimals
    pub avg_synonyms_per_test: f64,
    pub tests_with_loinc: usize,
    /// Percentage rounded to one decimal
    pub loinc_coverage: f64,
}

/// Record distributions along the dimensions curators care about.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KbDistributions {
    pub by_category: Vec<NamedCount>,
    /// Top panels by test count
    pub by_panel: Vec<NamedCount>,
    pub by_source_type: Vec<NamedCount>,
    pub by_sex: Vec<NamedCount>,
    pub by_specimen: Vec<NamedCount>,
}

/// Full statistics report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KbStatistics {
    pub overview: KbOverview,
    pub distributions: KbDistributions,
    pub top_sources: Vec<SourceRangeCount>,
    pub fingerprint: String,
    pub dataset_version: Option<String>,
    /// RFC 3339 load timestamp
    pub loaded_at: String,
}

impl KnowledgeBase {
    /// Compute statistics over the snapshot.
    pub fn statistics(&self) -> KbStatistics {
        let total_tests = self.tests().len();
        let total_synonyms = self.synonyms().len();

        let tests_with_loinc = self
            .tests()
            .iter()
            .filter(|t| non_empty(t.loinc_code.as_deref()).is_some())
            .count();

        let avg_synonyms_per_test = if total_tests > 0 {
            round_to(total_synonyms as f64 / total_tests as f64, 2)
        } else {
            0.0
        };
        let loinc_coverage = if total_tests > 0 {
            round_to(tests_with_loinc as f64 / total_tests as f64 * 100.0, 1)
        } else {
            0.0
        };

        let overview = KbOverview {
            total_tests,
            total_sources: self.sources().len(),
            total_ranges: self.ranges().len(),
            total_synonyms,
            avg_synonyms_per_test,
            tests_with_loinc,
            loinc_coverage,
        };

        let mut by_panel = distribution(self.tests().iter().map(|t| t.panel_name.as_deref()));
        rank(&mut by_panel);
        by_panel.truncate(TOP_N);

        let distributions = KbDistributions {
            by_category: distribution(self.tests().iter().map(|t| t.category.as_deref())),
            by_panel,
            by_source_type: distribution(
                self.sources().iter().map(|s| s.source_type.as_deref()),
            ),
            by_sex: distribution(self.ranges().iter().map(|r| Some(r.sex.as_str()))),
            by_specimen: distribution(self.tests().iter().map(|t| t.specimen_type.as_deref())),
        };

        KbStatistics {
            overview,
            distributions,
            top_sources: self.top_sources(),
            fingerprint: self.fingerprint().to_string(),
            dataset_version: self.dataset_version().map(str::to_string),
            loaded_at: self.loaded_at().to_rfc3339(),
        }
    }

    fn top_sources(&self) -> Vec<SourceRangeCount> {
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for range in self.ranges() {
            *counts.entry(range.source_id).or_insert(0) += 1;
        }

        // Sources are already in ascending id order; the stable sort keeps
        // that order among equal counts.
        let mut ranked: Vec<SourceRangeCount> = self
            .sources()
            .iter()
            .filter_map(|s| {
                counts.get(&s.source_id).map(|&range_count| SourceRangeCount {
                    name: s.name.clone(),
                    source_type: non_empty(s.source_type.as_deref())
                        .unwrap_or("Unknown")
                        .to_string(),
                    range_count,
                })
            })
            .collect();
        ranked.sort_by(|a, b| b.range_count.cmp(&a.range_count));
        ranked.truncate(TOP_N);
        ranked
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Count non-empty values, sorted by name.
fn distribution<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Vec<NamedCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values.filter_map(non_empty) {
        *counts.entry(value).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(name, count)| NamedCount {
            name: name.to_string(),
            count,
        })
        .collect()
}

/// Order by descending count, keeping name order among ties.
fn rank(counts: &mut [NamedCount]) {
    counts.sort_by(|a, b| b.count.cmp(&a.count));
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
