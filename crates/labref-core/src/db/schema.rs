//! SQLite schema definition.

/// Complete database schema for the reference knowledge base.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Tests (master catalog)
-- ============================================================================

CREATE TABLE IF NOT EXISTS tests (
    test_id INTEGER PRIMARY KEY,
    canonical_name TEXT NOT NULL,
    short_name TEXT,
    panel_name TEXT,
    specimen_type TEXT,
    category TEXT,
    loinc_code TEXT,
    description TEXT
);

CREATE INDEX IF NOT EXISTS idx_tests_canonical_name ON tests(canonical_name);
CREATE INDEX IF NOT EXISTS idx_tests_short_name ON tests(short_name);

-- ============================================================================
-- Sources (trust levels)
-- ============================================================================

CREATE TABLE IF NOT EXISTS sources (
    source_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    type TEXT,
    url TEXT,
    year INTEGER,
    trust_level INTEGER NOT NULL DEFAULT 3 CHECK (trust_level BETWEEN 1 AND 5)
);

-- ============================================================================
-- Reference ranges
-- ============================================================================

CREATE TABLE IF NOT EXISTS ranges (
    range_id INTEGER PRIMARY KEY,
    test_id INTEGER NOT NULL REFERENCES tests(test_id),
    source_id INTEGER NOT NULL REFERENCES sources(source_id),
    canonical_name TEXT,
    unit TEXT,
    value_type TEXT NOT NULL DEFAULT 'numeric',   -- numeric, qualitative
    ref_low REAL,
    ref_high REAL,
    ref_text TEXT,
    sex TEXT NOT NULL DEFAULT 'Any' CHECK (sex IN ('Male', 'Female', 'Any')),
    age_min REAL,
    age_max REAL,
    condition TEXT,
    source_priority INTEGER NOT NULL DEFAULT 1 CHECK (source_priority BETWEEN 1 AND 5),
    effective_year INTEGER
);

CREATE INDEX IF NOT EXISTS idx_ranges_test ON ranges(test_id);
CREATE INDEX IF NOT EXISTS idx_ranges_source ON ranges(source_id);

-- ============================================================================
-- Synonyms
-- ============================================================================

CREATE TABLE IF NOT EXISTS synonyms (
    synonym_id INTEGER PRIMARY KEY,
    test_id INTEGER NOT NULL REFERENCES tests(test_id),
    synonym TEXT NOT NULL,
    source_id INTEGER
);

CREATE INDEX IF NOT EXISTS idx_synonyms_test ON synonyms(test_id);
CREATE INDEX IF NOT EXISTS idx_synonyms_synonym ON synonyms(synonym);

-- ============================================================================
-- Dataset metadata
-- ============================================================================

CREATE TABLE IF NOT EXISTS kb_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
