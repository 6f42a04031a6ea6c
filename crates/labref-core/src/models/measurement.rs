//! Extracted measurements and patient context fed into the resolver.

use serde::{Deserialize, Deserializer, Serialize};

use super::Sex;

/// A measured value as extracted from a report.
///
/// Extraction may hand over a number, a string, or nothing at all. Anything
/// else (booleans, arrays, objects) is kept verbatim and is never numeric.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MeasurementValue {
    Number(f64),
    Text(String),
    #[default]
    Missing,
    Other(serde_json::Value),
}

impl MeasurementValue {
    /// The value as a finite real number, if it is one.
    ///
    /// Text is accepted only when the whole trimmed string parses; partial
    /// numbers such as "<0.5" or "12 H" are not numeric.
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            MeasurementValue::Number(v) => *v,
            MeasurementValue::Text(s) => s.trim().parse::<f64>().ok()?,
            MeasurementValue::Missing | MeasurementValue::Other(_) => return None,
        };
        value.is_finite().then_some(value)
    }

    /// Raw textual form for diagnostics.
    pub fn raw(&self) -> String {
        match self {
            MeasurementValue::Number(v) => v.to_string(),
            MeasurementValue::Text(s) => s.clone(),
            MeasurementValue::Missing => String::new(),
            MeasurementValue::Other(v) => v.to_string(),
        }
    }
}

impl From<f64> for MeasurementValue {
    fn from(value: f64) -> Self {
        MeasurementValue::Number(value)
    }
}

impl From<&str> for MeasurementValue {
    fn from(value: &str) -> Self {
        MeasurementValue::Text(value.to_string())
    }
}

/// A single `(test name, value, unit)` triple from upstream extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabMeasurement {
    /// Test name as printed on the report
    #[serde(
        alias = "raw_name",
        alias = "rawName",
        alias = "name",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub test_name: String,
    /// Measured value
    #[serde(default)]
    pub value: MeasurementValue,
    /// Unit as printed on the report
    #[serde(default, deserialize_with = "null_as_empty")]
    pub unit: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl LabMeasurement {
    pub fn new(
        test_name: impl Into<String>,
        value: impl Into<MeasurementValue>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            value: value.into(),
            unit: unit.into(),
        }
    }
}

/// Patient attributes that condition range selection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientContext {
    #[serde(default)]
    pub sex: Sex,
    /// Age in years; unreadable ages are treated as unknown
    #[serde(default, deserialize_with = "lenient_age")]
    pub age: Option<f64>,
}

fn lenient_age<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(MeasurementValue::deserialize(deserializer)?.as_number())
}

impl PatientContext {
    pub fn new(sex: Sex, age: Option<f64>) -> Self {
        Self { sex, age }
    }
}

/// One report's worth of measurements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolutionRequest {
    pub tests: Vec<LabMeasurement>,
    #[serde(default)]
    pub patient: PatientContext,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_values() {
        assert_eq!(MeasurementValue::Number(5.2).as_number(), Some(5.2));
        assert_eq!(MeasurementValue::from(" 12.5 ").as_number(), Some(12.5));
        assert_eq!(MeasurementValue::from("Positive").as_number(), None);
        assert_eq!(MeasurementValue::from("<0.5").as_number(), None);
        assert_eq!(MeasurementValue::from("NaN").as_number(), None);
        assert_eq!(MeasurementValue::Number(f64::INFINITY).as_number(), None);
        assert_eq!(MeasurementValue::Missing.as_number(), None);
        assert_eq!(MeasurementValue::Other(serde_json::json!(true)).as_number(), None);
    }

    #[test]
    fn test_odd_fields_do_not_fail_request() {
        let json = r#"{
            "tests": [
                {"test_name": "Hb", "value": 12, "unit": null},
                {"test_name": "Flag", "value": true, "unit": "g/dL"},
                {"test_name": null, "value": [1, 2]}
            ],
            "patient": {"sex": null, "age": "34"}
        }"#;

        let request: ResolutionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.tests[0].unit, "");
        assert_eq!(request.tests[1].value, MeasurementValue::Other(serde_json::json!(true)));
        assert_eq!(request.tests[1].value.raw(), "true");
        assert_eq!(request.tests[2].test_name, "");
        assert_eq!(request.patient.sex, Sex::Any);
        assert_eq!(request.patient.age, Some(34.0));
    }

    #[test]
    fn test_request_deserialize() {
        let json = r#"{
            "tests": [
                {"test_name": "Hb", "value": 12, "unit": "g/dL"},
                {"rawName": "Urine Protein", "value": "Negative", "unit": ""},
                {"name": "ESR"}
            ],
            "patient": {"sex": "male", "age": 34}
        }"#;

        let request: ResolutionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.tests.len(), 3);
        assert_eq!(request.tests[0].value, MeasurementValue::Number(12.0));
        assert_eq!(request.tests[1].value, MeasurementValue::Text("Negative".into()));
        assert_eq!(request.tests[2].value, MeasurementValue::Missing);
        assert_eq!(request.patient.sex, Sex::Male);
        assert_eq!(request.patient.age, Some(34.0));
    }

    #[test]
    fn test_patient_defaults() {
        let request: ResolutionRequest = serde_json::from_str(r#"{"tests": []}"#).unwrap();
        assert_eq!(request.patient.sex, Sex::Any);
        assert_eq!(request.patient.age, None);
    }
}
