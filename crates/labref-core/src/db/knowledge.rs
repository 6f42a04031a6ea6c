//! Knowledge-base table operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{Range, Sex, Source, Synonym, Test, ValueType};

impl Database {
    /// Insert or update a test.
    pub fn upsert_test(&self, test: &Test) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO tests (
                test_id, canonical_name, short_name, panel_name,
                specimen_type, category, loinc_code, description
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(test_id) DO UPDATE SET
                canonical_name = excluded.canonical_name,
                short_name = excluded.short_name,
                panel_name = excluded.panel_name,
                specimen_type = excluded.specimen_type,
                category = excluded.category,
                loinc_code = excluded.loinc_code,
                description = excluded.description
            "#,
            params![
                test.test_id,
                test.canonical_name,
                test.short_name,
                test.panel_name,
                test.specimen_type,
                test.category,
                test.loinc_code,
                test.description,
            ],
        )?;
        Ok(())
    }

    /// Insert or update a source.
    pub fn upsert_source(&self, source: &Source) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO sources (source_id, name, type, url, year, trust_level)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(source_id) DO UPDATE SET
                name = excluded.name,
                type = excluded.type,
                url = excluded.url,
                year = excluded.year,
                trust_level = excluded.trust_level
            "#,
            params![
                source.source_id,
                source.name,
                source.source_type,
                source.url,
                source.year,
                source.trust_level,
            ],
        )?;
        Ok(())
    }

    /// Insert or update a reference range.
    pub fn upsert_range(&self, range: &Range) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO ranges (
                range_id, test_id, source_id, canonical_name, unit, value_type,
                ref_low, ref_high, ref_text, sex, age_min, age_max,
                condition, source_priority, effective_year
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(range_id) DO UPDATE SET
                test_id = excluded.test_id,
                source_id = excluded.source_id,
                canonical_name = excluded.canonical_name,
                unit = excluded.unit,
                value_type = excluded.value_type,
                ref_low = excluded.ref_low,
                ref_high = excluded.ref_high,
                ref_text = excluded.ref_text,
                sex = excluded.sex,
                age_min = excluded.age_min,
                age_max = excluded.age_max,
                condition = excluded.condition,
                source_priority = excluded.source_priority,
                effective_year = excluded.effective_year
            "#,
            params![
                range.range_id,
                range.test_id,
                range.source_id,
                range.canonical_name,
                range.unit,
                range.value_type.as_str(),
                range.ref_low,
                range.ref_high,
                range.ref_text,
                range.sex.as_str(),
                range.age_min,
                range.age_max,
                range.condition,
                range.source_priority,
                range.effective_year,
            ],
        )?;
        Ok(())
    }

    /// Insert or update a synonym.
    pub fn upsert_synonym(&self, synonym: &Synonym) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO synonyms (synonym_id, test_id, synonym, source_id)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(synonym_id) DO UPDATE SET
                test_id = excluded.test_id,
                synonym = excluded.synonym,
                source_id = excluded.source_id
            "#,
            params![
                synonym.synonym_id,
                synonym.test_id,
                synonym.synonym,
                synonym.source_id,
            ],
        )?;
        Ok(())
    }

    /// Get a test by ID.
    pub fn get_test(&self, test_id: i64) -> DbResult<Option<Test>> {
        self.conn
            .query_row(
                r#"
                SELECT test_id, canonical_name, short_name, panel_name,
                       specimen_type, category, loinc_code, description
                FROM tests
                WHERE test_id = ?
                "#,
                [test_id],
                test_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// All tests in ascending ID order.
    pub fn list_tests(&self) -> DbResult<Vec<Test>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT test_id, canonical_name, short_name, panel_name,
                   specimen_type, category, loinc_code, description
            FROM tests
            ORDER BY test_id
            "#,
        )?;
        let rows = stmt.query_map([], test_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// All sources in ascending ID order.
    pub fn list_sources(&self) -> DbResult<Vec<Source>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT source_id, name, type, url, year, trust_level
            FROM sources
            ORDER BY source_id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Source {
                source_id: row.get(0)?,
                name: row.get(1)?,
                source_type: row.get(2)?,
                url: row.get(3)?,
                year: row.get(4)?,
                trust_level: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// All reference ranges in ascending ID order.
    pub fn list_ranges(&self) -> DbResult<Vec<Range>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT range_id, test_id, source_id, canonical_name, unit, value_type,
                   ref_low, ref_high, ref_text, sex, age_min, age_max,
                   condition, source_priority, effective_year
            FROM ranges
            ORDER BY range_id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RangeRow {
                range_id: row.get(0)?,
                test_id: row.get(1)?,
                source_id: row.get(2)?,
                canonical_name: row.get(3)?,
                unit: row.get(4)?,
                value_type: row.get(5)?,
                ref_low: row.get(6)?,
                ref_high: row.get(7)?,
                ref_text: row.get(8)?,
                sex: row.get(9)?,
                age_min: row.get(10)?,
                age_max: row.get(11)?,
                condition: row.get(12)?,
                source_priority: row.get(13)?,
                effective_year: row.get(14)?,
            })
        })?;

        let mut ranges = Vec::new();
        for row in rows {
            ranges.push(row?.try_into()?);
        }
        Ok(ranges)
    }

    /// All synonyms in ascending ID order.
    pub fn list_synonyms(&self) -> DbResult<Vec<Synonym>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT synonym_id, test_id, synonym, source_id
            FROM synonyms
            ORDER BY synonym_id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Synonym {
                synonym_id: row.get(0)?,
                test_id: row.get(1)?,
                synonym: row.get(2)?,
                source_id: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Number of tests stored.
    pub fn count_tests(&self) -> DbResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tests", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Read a metadata value.
    pub fn get_meta(&self, key: &str) -> DbResult<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kb_meta WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(Into::into)
    }

    /// Write a metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO kb_meta (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')
            "#,
            params![key, value],
        )?;
        Ok(())
    }
}

fn test_from_row(row: &Row<'_>) -> rusqlite::Result<Test> {
    Ok(Test {
        test_id: row.get(0)?,
        canonical_name: row.get(1)?,
        short_name: row.get(2)?,
        panel_name: row.get(3)?,
        specimen_type: row.get(4)?,
        category: row.get(5)?,
        loinc_code: row.get(6)?,
        description: row.get(7)?,
    })
}

/// Intermediate row struct for database mapping.
struct RangeRow {
    range_id: i64,
    test_id: i64,
    source_id: i64,
    canonical_name: Option<String>,
    unit: Option<String>,
    value_type: String,
    ref_low: Option<f64>,
    ref_high: Option<f64>,
    ref_text: Option<String>,
    sex: String,
    age_min: Option<f64>,
    age_max: Option<f64>,
    condition: Option<String>,
    source_priority: u8,
    effective_year: Option<i32>,
}

impl TryFrom<RangeRow> for Range {
    type Error = DbError;

    fn try_from(row: RangeRow) -> Result<Self, Self::Error> {
        Ok(Range {
            range_id: row.range_id,
            test_id: row.test_id,
            source_id: row.source_id,
            canonical_name: row.canonical_name,
            unit: row.unit,
            value_type: ValueType::parse(&row.value_type),
            ref_low: row.ref_low,
            ref_high: row.ref_high,
            ref_text: row.ref_text,
            sex: row.sex.parse::<Sex>()?,
            age_min: row.age_min,
            age_max: row.age_max,
            condition: row.condition,
            source_priority: row.source_priority,
            effective_year: row.effective_year,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.upsert_source(&Source::new(1, "WHO", 5)).unwrap();
        db.upsert_test(&Test::new(1, "Hemoglobin")).unwrap();
        db
    }

    #[test]
    fn test_upsert_and_get_test() {
        let db = setup_db();

        let mut test = Test::new(2, "Platelet Count");
        test.short_name = Some("PLT".into());
        test.panel_name = Some("Complete Blood Count".into());
        db.upsert_test(&test).unwrap();

        let retrieved = db.get_test(2).unwrap().unwrap();
        assert_eq!(retrieved, test);
        assert!(db.get_test(42).unwrap().is_none());
    }

    #[test]
    fn test_upsert_updates() {
        let db = setup_db();

        let mut test = Test::new(1, "Haemoglobin");
        test.category = Some("Hematology".into());
        db.upsert_test(&test).unwrap();

        let retrieved = db.get_test(1).unwrap().unwrap();
        assert_eq!(retrieved.canonical_name, "Haemoglobin");
        assert_eq!(db.count_tests().unwrap(), 1);
    }

    #[test]
    fn test_range_round_trip() {
        let db = setup_db();

        let mut range = Range::new(10, 1, 1);
        range.ref_low = Some(13.0);
        range.ref_high = Some(17.0);
        range.unit = Some("g/dL".into());
        range.sex = Sex::Male;
        range.age_min = Some(18.0);
        range.source_priority = 2;
        db.upsert_range(&range).unwrap();

        let ranges = db.list_ranges().unwrap();
        assert_eq!(ranges, vec![range]);
    }

    #[test]
    fn test_lists_are_ordered_by_id() {
        let db = setup_db();
        db.upsert_test(&Test::new(3, "Ferritin")).unwrap();
        db.upsert_test(&Test::new(2, "Albumin")).unwrap();
        db.upsert_synonym(&Synonym::new(7, 3, "serum ferritin")).unwrap();
        db.upsert_synonym(&Synonym::new(5, 1, "hgb")).unwrap();

        let ids: Vec<i64> = db.list_tests().unwrap().iter().map(|t| t.test_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let ids: Vec<i64> = db
            .list_synonyms()
            .unwrap()
            .iter()
            .map(|s| s.synonym_id)
            .collect();
        assert_eq!(ids, vec![5, 7]);
    }

    #[test]
    fn test_source_round_trip() {
        let db = setup_db();

        let mut source = Source::new(2, "Tietz Textbook", 4);
        source.source_type = Some("textbook".into());
        source.year = Some(2018);
        db.upsert_source(&source).unwrap();

        let sources = db.list_sources().unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1], source);
    }

    #[test]
    fn test_meta() {
        let db = setup_db();
        assert!(db.get_meta("dataset_version").unwrap().is_none());

        db.set_meta("dataset_version", "2024.1").unwrap();
        db.set_meta("dataset_version", "2024.2").unwrap();
        assert_eq!(db.get_meta("dataset_version").unwrap().as_deref(), Some("2024.2"));
    }
}
