//! Test name and unit normalizer.
//!
//! Handles:
//! - Whitespace and case folding of printed test names
//! - Abbreviation expansion (hgb→hemoglobin, tsh→thyroid stimulating hormone)
//! - Unit canonicalization (g/dl→g/dL, umol/l→μmol/L)

use std::collections::HashMap;

/// Normalizer for printed test names and units.
#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Abbreviation map: lowercase abbreviation → expanded name
    abbreviations: HashMap<String, String>,
    /// Unit map: lowercase unit → canonical spelling
    units: HashMap<String, String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    /// Create a new normalizer with default mappings.
    pub fn new() -> Self {
        Self {
            abbreviations: Self::default_abbreviations(),
            units: Self::default_units(),
        }
    }

    /// Normalize a printed test name for matching.
    ///
    /// Lowercases, trims and collapses internal whitespace, then substitutes
    /// the expansion when the whole name is a known abbreviation.
    pub fn normalize_name(&self, name: &str) -> String {
        let collapsed = name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        self.abbreviations
            .get(&collapsed)
            .cloned()
            .unwrap_or(collapsed)
    }

    /// Canonicalize a unit. Unknown units pass through trimmed.
    pub fn normalize_unit(&self, unit: &str) -> String {
        let trimmed = unit.trim();
        self.units
            .get(&trimmed.to_lowercase())
            .cloned()
            .unwrap_or_else(|| trimmed.to_string())
    }

    /// Add a custom abbreviation.
    pub fn add_abbreviation(&mut self, abbreviation: &str, expansion: &str) {
        self.abbreviations
            .insert(abbreviation.to_lowercase(), expansion.to_lowercase());
    }

    /// Add a custom unit spelling.
    pub fn add_unit(&mut self, from: &str, to: &str) {
        self.units.insert(from.to_lowercase(), to.to_string());
    }

    /// Default abbreviation mappings.
    fn default_abbreviations() -> HashMap<String, String> {
        let mut map = HashMap::new();

        // Hematology
        map.insert("hb".into(), "hemoglobin".into());
        map.insert("hgb".into(), "hemoglobin".into());
        map.insert("wbc".into(), "white blood cell count".into());
        map.insert("rbc".into(), "red blood cell count".into());
        map.insert("plt".into(), "platelet count".into());
        map.insert("mcv".into(), "mean corpuscular volume".into());
        map.insert("mch".into(), "mean corpuscular hemoglobin".into());
        map.insert("mchc".into(), "mean corpuscular hemoglobin concentration".into());
        map.insert("esr".into(), "erythrocyte sedimentation rate".into());

        // Inflammation
        map.insert("crp".into(), "c-reactive protein".into());

        // Liver
        map.insert("alt".into(), "alanine aminotransferase".into());
        map.insert("ast".into(), "aspartate aminotransferase".into());
        map.insert("alp".into(), "alkaline phosphatase".into());
        map.insert("ggt".into(), "gamma-glutamyl transferase".into());

        // Lipids
        map.insert("ldl".into(), "ldl cholesterol".into());
        map.insert("hdl".into(), "hdl cholesterol".into());

        // Thyroid
        map.insert("tsh".into(), "thyroid stimulating hormone".into());
        map.insert("ft4".into(), "free thyroxine".into());
        map.insert("ft3".into(), "free triiodothyronine".into());

        // Diabetes
        map.insert("hba1c".into(), "hemoglobin a1c".into());
        map.insert("a1c".into(), "hemoglobin a1c".into());

        map
    }

    /// Default unit spellings.
    fn default_units() -> HashMap<String, String> {
        let mut map = HashMap::new();

        // Mass concentration
        map.insert("g/dl".into(), "g/dL".into());
        map.insert("g/l".into(), "g/L".into());
        map.insert("mg/dl".into(), "mg/dL".into());
        map.insert("pg/ml".into(), "pg/mL".into());
        map.insert("ng/ml".into(), "ng/mL".into());
        map.insert("ng/dl".into(), "ng/dL".into());

        // Molar concentration
        map.insert("mmol/l".into(), "mmol/L".into());
        map.insert("umol/l".into(), "μmol/L".into());

        // Enzyme activity
        map.insert("iu/l".into(), "IU/L".into());
        map.insert("u/l".into(), "U/L".into());

        map
    }
}
