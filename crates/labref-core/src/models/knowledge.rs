//! Reference knowledge-base records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Test id reserved for ranges whose owning test could not be resolved.
pub const PLACEHOLDER_TEST_ID: i64 = 999;

/// Canonical name of the placeholder test.
pub const PLACEHOLDER_TEST_NAME: &str = "Unassigned Test";

/// Trust level assumed when a source does not declare one.
pub const DEFAULT_TRUST_LEVEL: u8 = 3;

/// Source priority assumed when a range does not declare one.
pub const DEFAULT_SOURCE_PRIORITY: u8 = 1;

/// Error parsing an enumerated text field.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("unrecognized {field}: {value:?}")]
pub struct FieldParseError {
    pub field: &'static str,
    pub value: String,
}

/// A lab test in the master catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Test {
    /// Unique identifier
    pub test_id: i64,
    /// Authoritative display name (e.g., "Hemoglobin")
    pub canonical_name: String,
    /// Abbreviation as printed on reports (e.g., "HGB")
    #[serde(default)]
    pub short_name: Option<String>,
    /// Panel the test belongs to (e.g., "Complete Blood Count")
    #[serde(default)]
    pub panel_name: Option<String>,
    /// Specimen (e.g., "Whole blood", "Serum")
    #[serde(default)]
    pub specimen_type: Option<String>,
    /// Category (e.g., "Hematology")
    #[serde(default)]
    pub category: Option<String>,
    /// LOINC code
    #[serde(default)]
    pub loinc_code: Option<String>,
    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,
}

impl Test {
    /// Create a test with only the required fields.
    pub fn new(test_id: i64, canonical_name: impl Into<String>) -> Self {
        Self {
            test_id,
            canonical_name: canonical_name.into(),
            short_name: None,
            panel_name: None,
            specimen_type: None,
            category: None,
            loinc_code: None,
            description: None,
        }
    }

    /// The catch-all test that absorbs ranges with no resolvable owner.
    pub fn placeholder() -> Self {
        let mut test = Self::new(PLACEHOLDER_TEST_ID, PLACEHOLDER_TEST_NAME);
        test.short_name = Some("Unassigned".into());
        test.description =
            Some("Placeholder for reference ranges with missing test_id in source data".into());
        test
    }

    pub fn is_placeholder(&self) -> bool {
        self.test_id == PLACEHOLDER_TEST_ID
    }
}

/// A publication or guideline that reference ranges are taken from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub source_id: i64,
    pub name: String,
    /// Kind of source (e.g., "guideline", "textbook", "study")
    #[serde(default, rename = "type")]
    pub source_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    /// Reliability rating 1..=5, higher is more authoritative
    #[serde(default = "default_trust_level", deserialize_with = "deserialize_trust_level")]
    pub trust_level: u8,
}

fn default_trust_level() -> u8 {
    DEFAULT_TRUST_LEVEL
}

fn deserialize_trust_level<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u8>::deserialize(deserializer)?.unwrap_or(DEFAULT_TRUST_LEVEL))
}

impl Source {
    /// Create a source with only the required fields.
    pub fn new(source_id: i64, name: impl Into<String>, trust_level: u8) -> Self {
        Self {
            source_id,
            name: name.into(),
            source_type: None,
            url: None,
            year: None,
            trust_level,
        }
    }
}

/// Biological sex a range applies to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "Option<String>")]
pub enum Sex {
    Male,
    Female,
    /// Applies to everyone (or patient sex unknown)
    #[default]
    Any,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "Male",
            Sex::Female => "Female",
            Sex::Any => "Any",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sex {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Ok(Sex::Male),
            "female" | "f" => Ok(Sex::Female),
            "any" | "all" | "both" | "" => Ok(Sex::Any),
            _ => Err(FieldParseError {
                field: "sex",
                value: s.to_string(),
            }),
        }
    }
}

/// A null or absent sex means the record applies to everyone.
impl TryFrom<Option<String>> for Sex {
    type Error = FieldParseError;

    fn try_from(value: Option<String>) -> Result<Self, Self::Error> {
        value.map_or(Ok(Sex::Any), |s| s.parse())
    }
}

/// How a range expresses its reference values.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "Option<String>", rename_all = "lowercase")]
pub enum ValueType {
    /// Numeric bounds (ref_low / ref_high)
    #[default]
    Numeric,
    /// Text-only reference (e.g., "Negative")
    Qualitative,
}

impl ValueType {
    /// Parse a dataset value type. Empty means numeric; anything that is not
    /// a numeric spelling is treated as qualitative.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "" | "numeric" | "number" | "quantitative" | "float" | "decimal" => ValueType::Numeric,
            _ => ValueType::Qualitative,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Numeric => "numeric",
            ValueType::Qualitative => "qualitative",
        }
    }
}

impl From<Option<String>> for ValueType {
    fn from(value: Option<String>) -> Self {
        ValueType::parse(value.as_deref().unwrap_or_default())
    }
}

/// A reference range for one test, from one source, for one demographic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Range {
    pub range_id: i64,
    /// Owning test; a missing id attaches the range to the placeholder test
    #[serde(
        default = "placeholder_test_id",
        deserialize_with = "deserialize_test_id"
    )]
    pub test_id: i64,
    pub source_id: i64,
    /// Test name as written by the source
    #[serde(default)]
    pub canonical_name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub ref_low: Option<f64>,
    #[serde(default)]
    pub ref_high: Option<f64>,
    /// Text reference (e.g., "Negative")
    #[serde(default)]
    pub ref_text: Option<String>,
    #[serde(default)]
    pub sex: Sex,
    /// Inclusive lower age bound in years
    #[serde(default)]
    pub age_min: Option<f64>,
    /// Inclusive upper age bound in years
    #[serde(default)]
    pub age_max: Option<f64>,
    /// Clinical condition the range is conditioned on (e.g., "fasting")
    #[serde(default)]
    pub condition: Option<String>,
    /// Curator precedence 1..=5, lower wins
    #[serde(
        default = "default_source_priority",
        deserialize_with = "deserialize_source_priority"
    )]
    pub source_priority: u8,
    #[serde(default)]
    pub effective_year: Option<i32>,
}

fn placeholder_test_id() -> i64 {
    PLACEHOLDER_TEST_ID
}

fn deserialize_test_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(PLACEHOLDER_TEST_ID))
}

fn default_source_priority() -> u8 {
    DEFAULT_SOURCE_PRIORITY
}

fn deserialize_source_priority<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u8>::deserialize(deserializer)?.unwrap_or(DEFAULT_SOURCE_PRIORITY))
}

impl Range {
    /// Create a numeric range applying to everyone.
    pub fn new(range_id: i64, test_id: i64, source_id: i64) -> Self {
        Self {
            range_id,
            test_id,
            source_id,
            canonical_name: None,
            unit: None,
            value_type: ValueType::Numeric,
            ref_low: None,
            ref_high: None,
            ref_text: None,
            sex: Sex::Any,
            age_min: None,
            age_max: None,
            condition: None,
            source_priority: DEFAULT_SOURCE_PRIORITY,
            effective_year: None,
        }
    }

    /// Whether at least one numeric bound is present.
    pub fn has_numeric_bounds(&self) -> bool {
        self.ref_low.is_some() || self.ref_high.is_some()
    }

    fn has_ref_text(&self) -> bool {
        self.ref_text
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    }

    /// Numeric ranges must carry a bound or a text reference.
    pub fn is_well_formed(&self) -> bool {
        match self.value_type {
            ValueType::Numeric => self.has_numeric_bounds() || self.has_ref_text(),
            ValueType::Qualitative => true,
        }
    }

    /// Whether the range applies to a patient of the given sex and age.
    ///
    /// `Any` ranges apply to every patient; an unknown patient sex only
    /// matches `Any` ranges. Age bounds are inclusive and only checked when
    /// an age is supplied.
    pub fn applies_to(&self, sex: Sex, age: Option<f64>) -> bool {
        if self.sex != sex && self.sex != Sex::Any {
            return false;
        }
        match age {
            None => true,
            Some(age) => {
                self.age_min.map_or(true, |min| age >= min)
                    && self.age_max.map_or(true, |max| age <= max)
            }
        }
    }

    /// Human-readable reference range (e.g., "4.0 - 10.0 10^3/uL").
    pub fn display(&self) -> String {
        let unit = self.unit.as_deref().unwrap_or("").trim();
        let text = match (self.ref_low, self.ref_high) {
            (Some(low), Some(high)) => {
                format!("{} - {} {}", format_bound(low), format_bound(high), unit)
            }
            (Some(low), None) => format!("> {} {}", format_bound(low), unit),
            (None, Some(high)) => format!("< {} {}", format_bound(high), unit),
            (None, None) => {
                return self
                    .ref_text
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .unwrap_or("N/A")
                    .to_string();
            }
        };
        text.trim_end().to_string()
    }
}

/// Format a bound so whole numbers keep one decimal ("4.0", not "4").
pub fn format_bound(value: f64) -> String {
    format!("{:?}", value)
}

/// An alternative name for a test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Synonym {
    pub synonym_id: i64,
    pub test_id: i64,
    pub synonym: String,
    #[serde(default)]
    pub source_id: Option<i64>,
}

impl Synonym {
    pub fn new(synonym_id: i64, test_id: i64, synonym: impl Into<String>) -> Self {
        Self {
            synonym_id,
            test_id,
            synonym: synonym.into(),
            source_id: None,
        }
    }
}
