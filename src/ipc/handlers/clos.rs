use crate::clo_key::normalize_clo_key;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{calc_err, db_conn, required_param, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::CloDefinition;
use crate::records;
use serde_json::json;

fn handle_clos_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let clos: Vec<CloDefinition> = match required_param(req, "clos") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = records::load_course(conn, &course_id) {
        return calc_err(req, e);
    }

    // Stored as given; unusable ids surface as report warnings, not here.
    let unkeyed: Vec<&str> = clos
        .iter()
        .filter(|d| normalize_clo_key(&d.id, Some(d.description.as_str())).is_none())
        .map(|d| d.id.as_str())
        .collect();

    if let Err(e) = records::replace_clo_definitions(conn, &course_id, &clos) {
        return err(
            &req.id,
            "db_tx_failed",
            e.to_string(),
            Some(json!({ "table": "clo_definitions" })),
        );
    }
    tracing::info!(course_id = %course_id, count = clos.len(), "CLO definitions replaced");
    ok(
        &req.id,
        json!({ "ok": true, "count": clos.len(), "unkeyed": unkeyed }),
    )
}

fn handle_clos_list(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    match records::load_clo_definitions(conn, &course_id) {
        Ok(clos) => ok(&req.id, json!({ "clos": clos })),
        Err(e) => calc_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "clos.set" => Some(handle_clos_set(state, req)),
        "clos.list" => Some(handle_clos_list(state, req)),
        _ => None,
    }
}
