//! Import of the four-table CSV export of the reference dataset.
//!
//! Cells are parsed leniently: blank or unparseable numbers fall back to
//! their defaults, integers may be written as decimals ("3.0"), and a range
//! with no readable test id is attached to the placeholder test. Only the
//! record ids that identify a row are required.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{Database, DbError, DbResult, ImportReport, KnowledgeDataset};
use crate::models::{
    Range, Sex, Source, Synonym, Test, ValueType, DEFAULT_SOURCE_PRIORITY, DEFAULT_TRUST_LEVEL,
    PLACEHOLDER_TEST_ID,
};

pub const SOURCES_TABLE: &str = "sources";
pub const TESTS_TABLE: &str = "tests";
pub const RANGES_TABLE: &str = "test_ranges";
pub const SYNONYMS_TABLE: &str = "test_synonyms";

/// File name prefix used by the spreadsheet export.
const EXPORT_PREFIX: &str = "LabWise AI KB - ";

#[derive(Debug, Deserialize)]
struct SourceRow {
    source_id: Option<String>,
    name: Option<String>,
    #[serde(default, rename = "type")]
    source_type: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    year: Option<String>,
    #[serde(default)]
    trust_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TestRow {
    test_id: Option<String>,
    canonical_name: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    panel_name: Option<String>,
    #[serde(default)]
    specimen_type: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    loinc_code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RangeRow {
    #[serde(default)]
    range_id: Option<String>,
    #[serde(default)]
    test_id: Option<String>,
    source_id: Option<String>,
    #[serde(default)]
    canonical_name: Option<String>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    value_type: Option<String>,
    #[serde(default)]
    ref_low: Option<String>,
    #[serde(default)]
    ref_high: Option<String>,
    #[serde(default)]
    ref_text: Option<String>,
    #[serde(default)]
    sex: Option<String>,
    #[serde(default)]
    age_min: Option<String>,
    #[serde(default)]
    age_max: Option<String>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    source_priority: Option<String>,
    #[serde(default)]
    effective_year: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SynonymRow {
    synonym_id: Option<String>,
    test_id: Option<String>,
    synonym: Option<String>,
    #[serde(default)]
    source_id: Option<String>,
}

impl KnowledgeDataset {
    /// Read the four CSV tables from a directory.
    ///
    /// Each table is looked up as `<table>.csv`, then under the spreadsheet
    /// export name `LabWise AI KB - <table>.csv`.
    pub fn from_csv_dir<P: AsRef<Path>>(dir: P) -> DbResult<Self> {
        let dir = dir.as_ref();

        let sources = read_table(dir, SOURCES_TABLE, source_from_row)?;
        let tests = read_table(dir, TESTS_TABLE, test_from_row)?;
        let ranges = read_table(dir, RANGES_TABLE, range_from_row)?;
        let synonyms = read_table(dir, SYNONYMS_TABLE, synonym_from_row)?;

        Ok(Self {
            version: None,
            tests,
            sources,
            ranges,
            synonyms,
        })
    }
}

impl Database {
    /// Read and import a directory of CSV tables.
    pub fn import_csv_dir<P: AsRef<Path>>(&self, dir: P) -> DbResult<ImportReport> {
        let dataset = KnowledgeDataset::from_csv_dir(dir)?;
        self.import_dataset(&dataset)
    }
}

fn table_path(dir: &Path, table: &str) -> PathBuf {
    let plain = dir.join(format!("{}.csv", table));
    if plain.exists() {
        return plain;
    }
    let exported = dir.join(format!("{}{}.csv", EXPORT_PREFIX, table));
    if exported.exists() {
        exported
    } else {
        plain
    }
}

fn read_table<R, T, F>(dir: &Path, table: &str, convert: F) -> DbResult<Vec<T>>
where
    R: for<'de> Deserialize<'de>,
    F: Fn(R, usize) -> DbResult<T>,
{
    let path = table_path(dir, table);
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(&path)?;

    let mut records = Vec::new();
    for (i, row) in reader.deserialize::<R>().enumerate() {
        // Header is line 1
        records.push(convert(row?, i + 2)?);
    }

    tracing::debug!(table, path = %path.display(), rows = records.len(), "Read CSV table");
    Ok(records)
}

fn source_from_row(row: SourceRow, line: usize) -> DbResult<Source> {
    let mut source = Source::new(
        required_id(row.source_id.as_deref(), SOURCES_TABLE, "source_id", line)?,
        text(row.name).unwrap_or_default(),
        small_int(row.trust_level.as_deref()).unwrap_or(DEFAULT_TRUST_LEVEL),
    );
    source.source_type = text(row.source_type);
    source.url = text(row.url);
    source.year = parse_int(row.year.as_deref()).and_then(|y| i32::try_from(y).ok());
    Ok(source)
}

fn test_from_row(row: TestRow, line: usize) -> DbResult<Test> {
    let mut test = Test::new(
        required_id(row.test_id.as_deref(), TESTS_TABLE, "test_id", line)?,
        text(row.canonical_name).unwrap_or_default(),
    );
    test.short_name = text(row.short_name);
    test.panel_name = text(row.panel_name);
    test.specimen_type = text(row.specimen_type);
    test.category = text(row.category);
    test.loinc_code = text(row.loinc_code);
    test.description = text(row.description);
    Ok(test)
}

/// Rows without a readable `range_id` are numbered by their position.
fn range_from_row(row: RangeRow, line: usize) -> DbResult<Range> {
    let range_id = parse_int(row.range_id.as_deref()).unwrap_or(line as i64 - 1);
    let test_id = parse_int(row.test_id.as_deref()).unwrap_or(PLACEHOLDER_TEST_ID);
    let source_id = required_id(row.source_id.as_deref(), RANGES_TABLE, "source_id", line)?;

    let mut range = Range::new(range_id, test_id, source_id);
    range.canonical_name = text(row.canonical_name);
    range.unit = text(row.unit);
    range.value_type = ValueType::parse(row.value_type.as_deref().unwrap_or_default());
    range.ref_low = parse_float(row.ref_low.as_deref());
    range.ref_high = parse_float(row.ref_high.as_deref());
    range.ref_text = text(row.ref_text);
    range.sex = match text(row.sex) {
        Some(sex) => sex.parse::<Sex>()?,
        None => Sex::Any,
    };
    range.age_min = parse_float(row.age_min.as_deref());
    range.age_max = parse_float(row.age_max.as_deref());
    range.condition = text(row.condition);
    range.source_priority =
        small_int(row.source_priority.as_deref()).unwrap_or(DEFAULT_SOURCE_PRIORITY);
    range.effective_year =
        parse_int(row.effective_year.as_deref()).and_then(|y| i32::try_from(y).ok());
    Ok(range)
}

fn synonym_from_row(row: SynonymRow, line: usize) -> DbResult<Synonym> {
    let mut synonym = Synonym::new(
        required_id(row.synonym_id.as_deref(), SYNONYMS_TABLE, "synonym_id", line)?,
        required_id(row.test_id.as_deref(), SYNONYMS_TABLE, "test_id", line)?,
        text(row.synonym).unwrap_or_default(),
    );
    synonym.source_id = parse_int(row.source_id.as_deref());
    Ok(synonym)
}

fn text(cell: Option<String>) -> Option<String> {
    cell.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())
}

fn parse_float(cell: Option<&str>) -> Option<f64> {
    cell?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integers, accepting decimal spellings truncated toward zero.
fn parse_int(cell: Option<&str>) -> Option<i64> {
    let cell = cell?.trim();
    cell.parse::<i64>()
        .ok()
        .or_else(|| parse_float(Some(cell)).map(|v| v.trunc() as i64))
}

fn small_int(cell: Option<&str>) -> Option<u8> {
    parse_int(cell).and_then(|v| u8::try_from(v).ok())
}

fn required_id(cell: Option<&str>, table: &str, field: &str, line: usize) -> DbResult<i64> {
    parse_int(cell).ok_or_else(|| {
        DbError::Constraint(format!("{} line {}: missing or invalid {}", table, line, field))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCES: &str = "source_id,name,type,url,year,trust_level\n\
        1,WHO,guideline,,2020,5\n\
        2,Lab Manual,manual,,,\n";

    const TESTS: &str = "test_id,canonical_name,short_name,panel_name,specimen_type,category,loinc_code,description\n\
        1,Hemoglobin,HGB,Complete Blood Count,Whole blood,Hematology,718-7,\n\
        2,Platelet Count,PLT,Complete Blood Count,,Hematology,,\n";

    const RANGES: &str = "test_id,source_id,canonical_name,unit,value_type,ref_low,ref_high,ref_text,sex,age_min,age_max,condition,source_priority,effective_year\n\
        1,1,Hemoglobin,g/dL,numeric,13.0,17.0,,Male,18,,,1.0,2020\n\
        1,1,Hemoglobin,g/dL,,12.0,15.5,,Female,,,,,\n\
        ,2,Mystery,,numeric,n/a,2.5,,,,,,abc,\n\
        2,2,Platelet Count,10^3/uL,numeric,150,400,,Any,,,,2,\n";

    const SYNONYMS: &str = "synonym_id,test_id,synonym,source_id\n\
        1,2,Thrombocytes,\n\
        2,1,Hb,1.0\n";

    fn write_tables(dir: &Path, prefix: &str) {
        for (table, body) in [
            (SOURCES_TABLE, SOURCES),
            (TESTS_TABLE, TESTS),
            (RANGES_TABLE, RANGES),
            (SYNONYMS_TABLE, SYNONYMS),
        ] {
            std::fs::write(dir.join(format!("{}{}.csv", prefix, table)), body).unwrap();
        }
    }

    #[test]
    fn test_lenient_cells() {
        assert_eq!(parse_int(Some("3.0")), Some(3));
        assert_eq!(parse_int(Some(" 7 ")), Some(7));
        assert_eq!(parse_int(Some("abc")), None);
        assert_eq!(parse_int(Some("")), None);
        assert_eq!(parse_float(Some("n/a")), None);
        assert_eq!(parse_float(Some("nan")), None);
        assert_eq!(small_int(Some("300")), None);
        assert_eq!(text(Some("   ".into())), None);
    }

    #[test]
    fn test_read_csv_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path(), "");

        let dataset = KnowledgeDataset::from_csv_dir(dir.path()).unwrap();
        assert_eq!(dataset.sources.len(), 2);
        assert_eq!(dataset.sources[1].trust_level, DEFAULT_TRUST_LEVEL);
        assert_eq!(dataset.sources[0].year, Some(2020));
        assert_eq!(dataset.tests[0].loinc_code.as_deref(), Some("718-7"));
        assert_eq!(dataset.tests[1].specimen_type, None);

        let ranges = &dataset.ranges;
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[0].range_id, 1);
        assert_eq!(ranges[0].sex, Sex::Male);
        assert_eq!(ranges[0].age_min, Some(18.0));
        assert_eq!(ranges[1].sex, Sex::Female);
        assert_eq!(ranges[1].value_type, ValueType::Numeric);
        assert_eq!(ranges[2].test_id, PLACEHOLDER_TEST_ID);
        assert_eq!(ranges[2].ref_low, None);
        assert_eq!(ranges[2].source_priority, DEFAULT_SOURCE_PRIORITY);
        assert_eq!(ranges[3].range_id, 4);
        assert_eq!(ranges[3].source_priority, 2);

        assert_eq!(dataset.synonyms[1].source_id, Some(1));
    }

    #[test]
    fn test_import_csv_dir_rehomes_missing_test() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path(), EXPORT_PREFIX);

        let db = Database::open_in_memory().unwrap();
        let report = db.import_csv_dir(dir.path()).unwrap();
        assert_eq!(report.sources, 2);
        assert_eq!(report.tests, 2);
        assert_eq!(report.ranges, 4);
        assert_eq!(report.synonyms, 2);
        assert_eq!(report.placeholder_ranges, 1);
        assert!(report.placeholder_created);

        let placeholder = db.get_test(PLACEHOLDER_TEST_ID).unwrap().unwrap();
        assert!(placeholder.is_placeholder());
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path(), "");
        std::fs::write(
            dir.path().join("tests.csv"),
            "test_id,canonical_name\n1,Hemoglobin\n,Orphan\n",
        )
        .unwrap();

        let result = KnowledgeDataset::from_csv_dir(dir.path());
        match result {
            Err(DbError::Constraint(msg)) => assert!(msg.contains("tests line 3")),
            other => panic!("expected constraint error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_sex_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path(), "");
        std::fs::write(
            dir.path().join("test_ranges.csv"),
            "test_id,source_id,ref_low,sex\n1,1,1.0,Robot\n",
        )
        .unwrap();

        assert!(matches!(
            KnowledgeDataset::from_csv_dir(dir.path()),
            Err(DbError::InvalidField(_))
        ));
    }

    #[test]
    fn test_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            KnowledgeDataset::from_csv_dir(dir.path()),
            Err(DbError::Csv(_))
        ));
    }
}
