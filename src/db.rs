use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "assessmentd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            level TEXT,
            section TEXT,
            academic_year TEXT,
            credit_hours REAL,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS clo_definitions(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            clo_id TEXT NOT NULL,
            description TEXT NOT NULL,
            plo_mapping TEXT NOT NULL,
            weightage REAL,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_clo_definitions_course ON clo_definitions(course_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            benchmark REAL,
            achievement_data TEXT,
            achievement_fingerprint TEXT,
            achievement_computed_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_course ON assessments(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS result_sets(
            id TEXT PRIMARY KEY,
            assessment_id TEXT NOT NULL,
            exam_type TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(assessment_id) REFERENCES assessments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_result_sets_assessment ON result_sets(assessment_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_outcomes(
            id TEXT PRIMARY KEY,
            result_set_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            student_id TEXT NOT NULL,
            student_name TEXT NOT NULL,
            marks_scored REAL NOT NULL,
            total_marks REAL NOT NULL,
            FOREIGN KEY(result_set_id) REFERENCES result_sets(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_outcomes_set ON student_outcomes(result_set_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS clo_results(
            outcome_id TEXT NOT NULL,
            clo_ref TEXT NOT NULL,
            total_questions INTEGER NOT NULL,
            correct_answers INTEGER NOT NULL,
            marks_scored REAL NOT NULL,
            total_marks REAL NOT NULL,
            PRIMARY KEY(outcome_id, clo_ref),
            FOREIGN KEY(outcome_id) REFERENCES student_outcomes(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS indirect_assessments(
            id TEXT PRIMARY KEY,
            assessment_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            clo TEXT NOT NULL,
            achievement_rate REAL NOT NULL,
            benchmark TEXT NOT NULL,
            achievement_percentage REAL NOT NULL,
            FOREIGN KEY(assessment_id) REFERENCES assessments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_indirect_assessment ON indirect_assessments(assessment_id, sort_order)",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("settings value for {} is not valid JSON", key))?;
    Ok(Some(value))
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
