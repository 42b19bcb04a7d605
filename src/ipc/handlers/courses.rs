use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{calc_err, db_conn, ok_serialized, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::records;
use serde_json::json;
use uuid::Uuid;

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "courses": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.level,
           c.section,
           c.academic_year,
           (SELECT COUNT(*) FROM assessments a WHERE a.course_id = c.id) AS assessment_count,
           (SELECT COUNT(*) FROM clo_definitions d WHERE d.course_id = c.id) AS clo_count
         FROM courses c
         ORDER BY c.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let level: Option<String> = row.get(2)?;
            let section: Option<String> = row.get(3)?;
            let academic_year: Option<String> = row.get(4)?;
            let assessment_count: i64 = row.get(5)?;
            let clo_count: i64 = row.get(6)?;
            Ok(json!({
                "id": id,
                "name": name,
                "level": level,
                "section": section,
                "academicYear": academic_year,
                "assessmentCount": assessment_count,
                "cloCount": clo_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(courses) => ok(&req.id, json!({ "courses": courses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let credit_hours = match req.params.get("creditHours") {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => match v.as_f64().filter(|h| *h >= 0.0) {
            Some(h) => Some(h),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "creditHours must be a non-negative number",
                    None,
                )
            }
        },
    };

    let course_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO courses(id, name, level, section, academic_year, credit_hours, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &course_id,
            &name,
            optional_str(req, "level"),
            optional_str(req, "section"),
            optional_str(req, "academicYear"),
            credit_hours,
            records::now_rfc3339(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        );
    }

    tracing::info!(course_id = %course_id, name = %name, "course created");
    ok(&req.id, json!({ "courseId": course_id, "name": name }))
}

fn handle_courses_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match records::load_course(conn, &course_id) {
        Ok(course) => ok_serialized(req, &course),
        Err(e) => calc_err(req, e),
    }
}

fn handle_courses_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let assessment_ids: Vec<String> = match conn
        .prepare("SELECT id FROM assessments WHERE course_id = ?")
        .and_then(|mut stmt| {
            let ids = stmt
                .query_map([&course_id], |r| r.get(0))?
                .collect::<Result<Vec<_>, _>>();
            ids
        }) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Dependency order: no ON DELETE CASCADE.
    for assessment_id in &assessment_ids {
        if let Err(e) = records::delete_assessment(&tx, assessment_id) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "assessmentId": assessment_id })),
            );
        }
    }
    for (table, sql) in [
        ("clo_definitions", "DELETE FROM clo_definitions WHERE course_id = ?"),
        ("courses", "DELETE FROM courses WHERE id = ?"),
    ] {
        if let Err(e) = tx.execute(sql, [&course_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    tracing::info!(course_id = %course_id, assessments = assessment_ids.len(), "course deleted");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(handle_courses_list(state, req)),
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.get" => Some(handle_courses_get(state, req)),
        "courses.delete" => Some(handle_courses_delete(state, req)),
        _ => None,
    }
}
