use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{calc_err, db_conn, required_param, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{AssessmentResultSet, IndirectAssessmentRecord};
use crate::performance::OVERALL_EXAM_TYPE;
use crate::records;
use serde_json::json;
use uuid::Uuid;

fn handle_assessments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let benchmark = match req.params.get("benchmark") {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => match v.as_f64().filter(|b| (0.0..=100.0).contains(b)) {
            Some(b) => Some(b),
            None => return err(&req.id, "bad_params", "benchmark must be in 0..=100", None),
        },
    };
    if let Err(e) = records::load_course(conn, &course_id) {
        return calc_err(req, e);
    }

    let assessment_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO assessments(id, course_id, benchmark, updated_at) VALUES(?, ?, ?, ?)",
        (&assessment_id, &course_id, benchmark, records::now_rfc3339()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "assessments" })),
        );
    }
    tracing::info!(course_id = %course_id, assessment_id = %assessment_id, "assessment created");
    ok(&req.id, json!({ "assessmentId": assessment_id }))
}

fn handle_assessments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = records::load_course(conn, &course_id) {
        return calc_err(req, e);
    }

    let mut stmt = match conn.prepare(
        "SELECT
           a.id,
           a.benchmark,
           a.achievement_computed_at,
           a.updated_at,
           (SELECT COUNT(*) FROM result_sets rs WHERE rs.assessment_id = a.id) AS result_set_count,
           (SELECT COUNT(*) FROM indirect_assessments ia WHERE ia.assessment_id = a.id) AS indirect_count
         FROM assessments a
         WHERE a.course_id = ?
         ORDER BY a.updated_at, a.id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&course_id], |row| {
            let id: String = row.get(0)?;
            let benchmark: Option<f64> = row.get(1)?;
            let computed_at: Option<String> = row.get(2)?;
            let updated_at: Option<String> = row.get(3)?;
            let result_set_count: i64 = row.get(4)?;
            let indirect_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "benchmark": benchmark,
                "achievementComputedAt": computed_at,
                "updatedAt": updated_at,
                "resultSetCount": result_set_count,
                "indirectCount": indirect_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(assessments) => ok(&req.id, json!({ "assessments": assessments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_assessments_import_results(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let result_sets: Vec<AssessmentResultSet> = match required_param(req, "resultSets") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Some(i) = result_sets.iter().position(|s| s.exam_type.trim().is_empty()) {
        return err(
            &req.id,
            "bad_params",
            "result set type must not be empty",
            Some(json!({ "index": i })),
        );
    }
    // "Overall" names the synthetic cross-type tier in performance reports.
    if let Some(i) = result_sets
        .iter()
        .position(|s| s.exam_type.trim().eq_ignore_ascii_case(OVERALL_EXAM_TYPE))
    {
        return err(
            &req.id,
            "bad_params",
            format!("result set type {OVERALL_EXAM_TYPE:?} is reserved"),
            Some(json!({ "index": i })),
        );
    }
    for (i, set) in result_sets.iter().enumerate() {
        if let Some(row) = set
            .results
            .iter()
            .position(|o| o.student_id.trim().is_empty() && o.student_name.trim().is_empty())
        {
            return err(
                &req.id,
                "bad_params",
                "student row needs a studentId or studentName",
                Some(json!({ "index": i, "row": row })),
            );
        }
    }
    if let Err(e) = records::load_assessment(conn, &assessment_id) {
        return calc_err(req, e);
    }

    match records::replace_result_sets(conn, &assessment_id, &result_sets) {
        Ok(outcomes) => {
            tracing::info!(
                assessment_id = %assessment_id,
                result_sets = result_sets.len(),
                outcomes,
                "results imported"
            );
            ok(
                &req.id,
                json!({ "resultSets": result_sets.len(), "outcomes": outcomes }),
            )
        }
        Err(e) => err(
            &req.id,
            "db_tx_failed",
            format!("{e:?}"),
            Some(json!({ "table": "result_sets" })),
        ),
    }
}

fn handle_assessments_set_indirect(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let records_in: Vec<IndirectAssessmentRecord> = match required_param(req, "records") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = records::load_assessment(conn, &assessment_id) {
        return calc_err(req, e);
    }

    if let Err(e) = records::replace_indirect(conn, &assessment_id, &records_in) {
        return err(
            &req.id,
            "db_tx_failed",
            e.to_string(),
            Some(json!({ "table": "indirect_assessments" })),
        );
    }
    ok(&req.id, json!({ "ok": true, "count": records_in.len() }))
}

fn handle_assessments_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let inputs = match records::load_report_inputs(conn, &assessment_id) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };
    let (status, cached) = match records::achievement_cache_status(conn, &inputs) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };

    let mut assessment = match serde_json::to_value(&inputs.assessment) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "serialize_failed", e.to_string(), None),
    };
    assessment["achievementCache"] = json!(status);
    assessment["achievementData"] = json!(cached.as_ref().map(|c| &c.rows));
    assessment["achievementComputedAt"] = json!(cached.and_then(|c| c.computed_at));
    ok(&req.id, assessment)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assessments.create" => Some(handle_assessments_create(state, req)),
        "assessments.list" => Some(handle_assessments_list(state, req)),
        "assessments.importResults" => Some(handle_assessments_import_results(state, req)),
        "assessments.setIndirect" => Some(handle_assessments_set_indirect(state, req)),
        "assessments.get" => Some(handle_assessments_get(state, req)),
        _ => None,
    }
}
