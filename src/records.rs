//! Workspace-backed persistence collaborator: loads the records the engine
//! consumes and stores the threshold-60 achievement write-back.

use crate::achievement::ThresholdRow;
use crate::calc::CalcError;
use crate::model::{
    AssessmentRecord, AssessmentResultSet, CloDefinition, CloResult, CourseRecord,
    IndirectAssessmentRecord, PloMapping, ScoreTotal, StudentOutcome,
};
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

fn query_err(e: rusqlite::Error) -> CalcError {
    CalcError::new("db_query_failed", e.to_string())
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn load_course(conn: &Connection, course_id: &str) -> Result<CourseRecord, CalcError> {
    conn.query_row(
        "SELECT id, name, level, section, academic_year, credit_hours FROM courses WHERE id = ?",
        [course_id],
        |r| {
            Ok(CourseRecord {
                id: r.get(0)?,
                name: r.get(1)?,
                level: r.get(2)?,
                section: r.get(3)?,
                academic_year: r.get(4)?,
                credit_hours: r.get(5)?,
            })
        },
    )
    .optional()
    .map_err(query_err)?
    .ok_or_else(|| CalcError::not_found("course"))
}

pub fn load_clo_definitions(
    conn: &Connection,
    course_id: &str,
) -> Result<Vec<CloDefinition>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT clo_id, description, plo_mapping, weightage
             FROM clo_definitions
             WHERE course_id = ?
             ORDER BY sort_order",
        )
        .map_err(query_err)?;
    let rows = stmt
        .query_map([course_id], |r| {
            let mapping: String = r.get(2)?;
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                mapping,
                r.get::<_, Option<f64>>(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_err)?;

    let mut out = Vec::with_capacity(rows.len());
    for (id, description, mapping, weightage) in rows {
        let plo_mapping: PloMapping = serde_json::from_str(&mapping).map_err(|e| {
            CalcError::new("db_query_failed", format!("stored PLO mapping is invalid: {}", e))
                .with_details(serde_json::json!({ "cloId": id }))
        })?;
        out.push(CloDefinition {
            id,
            description,
            plo_mapping,
            weightage,
        });
    }
    Ok(out)
}

fn load_result_sets(
    conn: &Connection,
    assessment_id: &str,
) -> Result<Vec<AssessmentResultSet>, CalcError> {
    let mut sets_stmt = conn
        .prepare(
            "SELECT id, exam_type FROM result_sets
             WHERE assessment_id = ?
             ORDER BY sort_order",
        )
        .map_err(query_err)?;
    let sets: Vec<(String, String)> = sets_stmt
        .query_map([assessment_id], |r| Ok((r.get(0)?, r.get(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_err)?;

    let mut clo_stmt = conn
        .prepare(
            "SELECT cr.outcome_id, cr.clo_ref, cr.total_questions, cr.correct_answers,
                    cr.marks_scored, cr.total_marks
             FROM clo_results cr
             JOIN student_outcomes so ON so.id = cr.outcome_id
             JOIN result_sets rs ON rs.id = so.result_set_id
             WHERE rs.assessment_id = ?",
        )
        .map_err(query_err)?;
    let mut clo_by_outcome: HashMap<String, BTreeMap<String, CloResult>> = HashMap::new();
    let clo_rows = clo_stmt
        .query_map([assessment_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                CloResult {
                    total_questions: r.get(2)?,
                    correct_answers: r.get(3)?,
                    marks_scored: r.get(4)?,
                    total_marks: r.get(5)?,
                },
            ))
        })
        .map_err(query_err)?;
    for row in clo_rows {
        let (outcome_id, clo_ref, result) = row.map_err(query_err)?;
        clo_by_outcome
            .entry(outcome_id)
            .or_default()
            .insert(clo_ref, result);
    }

    let mut outcome_stmt = conn
        .prepare(
            "SELECT id, student_id, student_name, marks_scored, total_marks
             FROM student_outcomes
             WHERE result_set_id = ?
             ORDER BY sort_order",
        )
        .map_err(query_err)?;

    let mut out = Vec::with_capacity(sets.len());
    for (set_id, exam_type) in sets {
        let outcomes = outcome_stmt
            .query_map([&set_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, f64>(3)?,
                    r.get::<_, f64>(4)?,
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(query_err)?;
        let results = outcomes
            .into_iter()
            .map(|(id, student_id, student_name, marks_scored, total_marks)| StudentOutcome {
                student_id,
                student_name,
                total_score: ScoreTotal {
                    marks_scored,
                    total_marks,
                },
                clo_results: clo_by_outcome.remove(&id).unwrap_or_default(),
            })
            .collect();
        out.push(AssessmentResultSet { exam_type, results });
    }
    Ok(out)
}

fn load_indirect(
    conn: &Connection,
    assessment_id: &str,
) -> Result<Vec<IndirectAssessmentRecord>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT clo, achievement_rate, benchmark, achievement_percentage
             FROM indirect_assessments
             WHERE assessment_id = ?
             ORDER BY sort_order",
        )
        .map_err(query_err)?;
    let rows = stmt
        .query_map([assessment_id], |r| {
            Ok(IndirectAssessmentRecord {
                clo: r.get(0)?,
                achievement_rate: r.get(1)?,
                benchmark: r.get(2)?,
                achievement_percentage: r.get(3)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_err)?;
    Ok(rows)
}

pub fn load_assessment(
    conn: &Connection,
    assessment_id: &str,
) -> Result<AssessmentRecord, CalcError> {
    let head: Option<(String, Option<f64>)> = conn
        .query_row(
            "SELECT course_id, benchmark FROM assessments WHERE id = ?",
            [assessment_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(query_err)?;
    let Some((course_id, benchmark)) = head else {
        return Err(CalcError::not_found("assessment"));
    };
    Ok(AssessmentRecord {
        id: assessment_id.to_string(),
        course_id,
        benchmark,
        result_sets: load_result_sets(conn, assessment_id)?,
        indirect_assessments: load_indirect(conn, assessment_id)?,
    })
}

/// Everything one report request needs, fully materialized.
#[derive(Debug, Clone)]
pub struct ReportInputs {
    pub course: CourseRecord,
    pub assessment: AssessmentRecord,
    pub definitions: Vec<CloDefinition>,
}

pub fn load_report_inputs(
    conn: &Connection,
    assessment_id: &str,
) -> Result<ReportInputs, CalcError> {
    let assessment = load_assessment(conn, assessment_id)?;
    let course = load_course(conn, &assessment.course_id)?;
    let definitions = load_clo_definitions(conn, &course.id)?;
    Ok(ReportInputs {
        course,
        assessment,
        definitions,
    })
}

pub fn replace_clo_definitions(
    conn: &Connection,
    course_id: &str,
    definitions: &[CloDefinition],
) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM clo_definitions WHERE course_id = ?", [course_id])?;
    for (i, def) in definitions.iter().enumerate() {
        tx.execute(
            "INSERT INTO clo_definitions(id, course_id, sort_order, clo_id, description, plo_mapping, weightage)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                course_id,
                i as i64,
                &def.id,
                &def.description,
                serde_json::to_string(&def.plo_mapping)?,
                def.weightage,
            ),
        )?;
    }
    tx.commit()?;
    Ok(())
}

fn delete_result_sets(conn: &Connection, assessment_id: &str) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM clo_results WHERE outcome_id IN (
           SELECT so.id FROM student_outcomes so
           JOIN result_sets rs ON rs.id = so.result_set_id
           WHERE rs.assessment_id = ?
         )",
        [assessment_id],
    )?;
    conn.execute(
        "DELETE FROM student_outcomes WHERE result_set_id IN (
           SELECT id FROM result_sets WHERE assessment_id = ?
         )",
        [assessment_id],
    )?;
    conn.execute("DELETE FROM result_sets WHERE assessment_id = ?", [assessment_id])?;
    Ok(())
}

pub fn replace_result_sets(
    conn: &Connection,
    assessment_id: &str,
    sets: &[AssessmentResultSet],
) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    delete_result_sets(&tx, assessment_id)?;
    let mut outcome_count = 0;
    for (si, set) in sets.iter().enumerate() {
        let set_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO result_sets(id, assessment_id, exam_type, sort_order) VALUES(?, ?, ?, ?)",
            (&set_id, assessment_id, &set.exam_type, si as i64),
        )
        .context("insert result set")?;
        for (oi, outcome) in set.results.iter().enumerate() {
            let outcome_id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO student_outcomes(id, result_set_id, sort_order, student_id, student_name, marks_scored, total_marks)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (
                    &outcome_id,
                    &set_id,
                    oi as i64,
                    &outcome.student_id,
                    &outcome.student_name,
                    outcome.total_score.marks_scored,
                    outcome.total_score.total_marks,
                ),
            )
            .context("insert student outcome")?;
            for (clo_ref, r) in &outcome.clo_results {
                tx.execute(
                    "INSERT INTO clo_results(outcome_id, clo_ref, total_questions, correct_answers, marks_scored, total_marks)
                     VALUES(?, ?, ?, ?, ?, ?)",
                    (
                        &outcome_id,
                        clo_ref,
                        r.total_questions,
                        r.correct_answers,
                        r.marks_scored,
                        r.total_marks,
                    ),
                )
                .context("insert CLO result")?;
            }
            outcome_count += 1;
        }
    }
    tx.execute(
        "UPDATE assessments SET updated_at = ? WHERE id = ?",
        (now_rfc3339(), assessment_id),
    )?;
    tx.commit()?;
    Ok(outcome_count)
}

pub fn replace_indirect(
    conn: &Connection,
    assessment_id: &str,
    records: &[IndirectAssessmentRecord],
) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM indirect_assessments WHERE assessment_id = ?",
        [assessment_id],
    )?;
    for (i, rec) in records.iter().enumerate() {
        tx.execute(
            "INSERT INTO indirect_assessments(id, assessment_id, sort_order, clo, achievement_rate, benchmark, achievement_percentage)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                assessment_id,
                i as i64,
                &rec.clo,
                rec.achievement_rate,
                &rec.benchmark,
                rec.achievement_percentage,
            ),
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Removes an assessment and everything hanging off it.
pub fn delete_assessment(conn: &Connection, assessment_id: &str) -> anyhow::Result<()> {
    delete_result_sets(conn, assessment_id)?;
    conn.execute(
        "DELETE FROM indirect_assessments WHERE assessment_id = ?",
        [assessment_id],
    )?;
    conn.execute("DELETE FROM assessments WHERE id = ?", [assessment_id])?;
    Ok(())
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    result_sets: &'a [AssessmentResultSet],
    definitions: &'a [CloDefinition],
    indirect: &'a [IndirectAssessmentRecord],
}

/// SHA-256 over the canonical JSON of every input the CLO pipeline reads.
pub fn input_fingerprint(
    result_sets: &[AssessmentResultSet],
    definitions: &[CloDefinition],
    indirect: &[IndirectAssessmentRecord],
) -> anyhow::Result<String> {
    let payload = serde_json::to_vec(&FingerprintInput {
        result_sets,
        definitions,
        indirect,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&payload);
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedAchievement {
    pub rows: Vec<ThresholdRow>,
    pub fingerprint: String,
    pub computed_at: Option<String>,
}

pub fn store_achievement_cache(
    conn: &Connection,
    assessment_id: &str,
    rows: &[ThresholdRow],
    fingerprint: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE assessments
         SET achievement_data = ?, achievement_fingerprint = ?, achievement_computed_at = ?
         WHERE id = ?",
        (
            serde_json::to_string(rows)?,
            fingerprint,
            now_rfc3339(),
            assessment_id,
        ),
    )?;
    Ok(())
}

pub fn load_achievement_cache(
    conn: &Connection,
    assessment_id: &str,
) -> Result<Option<CachedAchievement>, CalcError> {
    let row: Option<(Option<String>, Option<String>, Option<String>)> = conn
        .query_row(
            "SELECT achievement_data, achievement_fingerprint, achievement_computed_at
             FROM assessments WHERE id = ?",
            [assessment_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
        .map_err(query_err)?;
    let Some((data, fingerprint, computed_at)) = row else {
        return Err(CalcError::not_found("assessment"));
    };
    let (Some(data), Some(fingerprint)) = (data, fingerprint) else {
        return Ok(None);
    };
    let rows: Vec<ThresholdRow> = serde_json::from_str(&data).map_err(|e| {
        CalcError::new("db_query_failed", format!("stored achievement data is invalid: {}", e))
    })?;
    Ok(Some(CachedAchievement {
        rows,
        fingerprint,
        computed_at,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Missing,
    Fresh,
    Stale,
}

pub fn report_fingerprint(inputs: &ReportInputs) -> Result<String, CalcError> {
    input_fingerprint(
        &inputs.assessment.result_sets,
        &inputs.definitions,
        &inputs.assessment.indirect_assessments,
    )
    .map_err(|e| CalcError::new("fingerprint_failed", e.to_string()))
}

/// Compares the stored fingerprint with one recomputed from current inputs.
pub fn achievement_cache_status(
    conn: &Connection,
    inputs: &ReportInputs,
) -> Result<(CacheStatus, Option<CachedAchievement>), CalcError> {
    let Some(cached) = load_achievement_cache(conn, &inputs.assessment.id)? else {
        return Ok((CacheStatus::Missing, None));
    };
    let status = if cached.fingerprint == report_fingerprint(inputs)? {
        CacheStatus::Fresh
    } else {
        CacheStatus::Stale
    };
    Ok((status, Some(cached)))
}
