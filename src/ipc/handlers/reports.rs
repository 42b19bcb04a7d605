use crate::calc::CalcError;
use crate::ipc::error::err;
use crate::ipc::helpers::{calc_err, db_conn, ok_serialized, optional_param, required_str};
use crate::ipc::types::{AppState, Request};
use crate::records::{self, ReportInputs};
use crate::reports::{self, CloAchievementReport, NarrativeKind};
use crate::settings;
use rusqlite::Connection;
use std::collections::BTreeMap;

fn load_inputs(conn: &Connection, req: &Request) -> Result<ReportInputs, serde_json::Value> {
    let assessment_id = required_str(req, "assessmentId")?;
    records::load_report_inputs(conn, &assessment_id).map_err(|e| calc_err(req, e))
}

fn weightage_param(req: &Request) -> Result<Option<BTreeMap<String, f64>>, serde_json::Value> {
    optional_param(req, "weightage")
}

fn write_back(
    conn: &Connection,
    inputs: &ReportInputs,
    report: &CloAchievementReport,
) -> Result<(), CalcError> {
    let fingerprint = records::report_fingerprint(inputs)?;
    records::store_achievement_cache(
        conn,
        &inputs.assessment.id,
        report.canonical_rows(),
        &fingerprint,
    )
    .map_err(|e| CalcError::new("db_update_failed", e.to_string()))?;
    tracing::debug!(
        assessment_id = %inputs.assessment.id,
        fingerprint = %fingerprint,
        "achievement data stored"
    );
    Ok(())
}

fn handle_reports_clo_achievement(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let inputs = match load_inputs(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let weightage = match weightage_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let report = match reports::clo_achievement(&inputs, weightage.as_ref()) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };
    if let Err(e) = write_back(conn, &inputs, &report) {
        return calc_err(req, e);
    }
    ok_serialized(req, &report)
}

fn handle_reports_performance(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let inputs = match load_inputs(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let settings = match settings::resolve(conn, &req.params) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };

    match reports::performance(&inputs, &settings) {
        Ok(report) => ok_serialized(req, &report),
        Err(e) => calc_err(req, e),
    }
}

fn handle_reports_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let inputs = match load_inputs(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let weightage = match weightage_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let settings = match settings::resolve(conn, &req.params) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };

    let bundle = match reports::bundle(&inputs, weightage.as_ref(), &settings) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };
    if let Err(e) = write_back(conn, &inputs, &bundle.clo_achievement) {
        return calc_err(req, e);
    }
    ok_serialized(req, &bundle)
}

fn handle_reports_narrative_input(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let kind_raw = match required_str(req, "kind") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(kind) = NarrativeKind::parse(&kind_raw) else {
        return err(
            &req.id,
            "bad_params",
            "kind must be one of: diagnostics, histogram",
            None,
        );
    };
    let inputs = match load_inputs(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let settings = match settings::resolve(conn, &req.params) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };

    match reports::narrative_input(&inputs, kind, &settings) {
        Ok(payload) => ok_serialized(req, &payload),
        Err(e) => calc_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.cloAchievement" => Some(handle_reports_clo_achievement(state, req)),
        "reports.performance" => Some(handle_reports_performance(state, req)),
        "reports.bundle" => Some(handle_reports_bundle(state, req)),
        "reports.narrativeInput" => Some(handle_reports_narrative_input(state, req)),
        _ => None,
    }
}
