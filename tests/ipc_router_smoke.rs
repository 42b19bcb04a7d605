mod test_support;

use serde_json::json;
use test_support::{request, request_err, request_ok, send_line, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("assessmentd-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    // Workspace-bound methods refuse to run before a workspace is selected.
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "2",
            "courses.create",
            json!({ "name": "Too early" })
        ),
        "no_workspace"
    );
    let listed = request_ok(&mut stdin, &mut reader, "3", "courses.list", json!({}));
    assert_eq!(listed["courses"], json!([]));

    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    assert!(workspace.path().join("assessmentd.sqlite3").is_file());

    let course = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "courses.create",
        json!({ "name": "Smoke Course" }),
    );
    let course_id = course["courseId"].as_str().expect("courseId").to_string();
    let assessment = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "assessments.create",
        json!({ "courseId": course_id }),
    );
    let assessment_id = assessment["assessmentId"]
        .as_str()
        .expect("assessmentId")
        .to_string();

    // Every routed method answers with something other than not_implemented.
    let calls = [
        ("courses.list", json!({})),
        ("courses.get", json!({ "courseId": course_id })),
        ("clos.set", json!({ "courseId": course_id, "clos": [] })),
        ("clos.list", json!({ "courseId": course_id })),
        ("assessments.list", json!({ "courseId": course_id })),
        (
            "assessments.importResults",
            json!({ "assessmentId": assessment_id, "resultSets": [] }),
        ),
        (
            "assessments.setIndirect",
            json!({ "assessmentId": assessment_id, "records": [] }),
        ),
        ("assessments.get", json!({ "assessmentId": assessment_id })),
        ("reports.cloAchievement", json!({ "assessmentId": assessment_id })),
        ("reports.performance", json!({ "assessmentId": assessment_id })),
        ("reports.bundle", json!({ "assessmentId": assessment_id })),
        (
            "reports.narrativeInput",
            json!({ "assessmentId": assessment_id, "kind": "histogram" }),
        ),
        ("setup.get", json!({})),
        (
            "setup.update",
            json!({ "section": "analytics", "patch": {} }),
        ),
    ];
    for (i, (method, params)) in calls.iter().enumerate() {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("m{}", i),
            method,
            params.clone(),
        );
        let code = resp
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str());
        assert_ne!(code, Some("not_implemented"), "{} was not routed", method);
    }

    assert_eq!(
        request_err(&mut stdin, &mut reader, "7", "grades.export", json!({})),
        "not_implemented"
    );

    let bad = send_line(&mut stdin, &mut reader, "{not json");
    assert_eq!(bad["ok"], json!(false));
    assert_eq!(bad["error"]["code"], json!("bad_json"));
    assert!(bad.get("id").is_none());

    // The sidecar keeps serving after a bad line.
    request_ok(&mut stdin, &mut reader, "8", "health", json!({}));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn missing_params_are_bad_params() {
    let workspace = temp_dir("assessmentd-bad-params");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );

    assert_eq!(
        request_err(&mut stdin, &mut reader, "2", "workspace.select", json!({})),
        "bad_params"
    );
    assert_eq!(
        request_err(&mut stdin, &mut reader, "3", "courses.create", json!({ "name": "  " })),
        "bad_params"
    );
    assert_eq!(
        request_err(&mut stdin, &mut reader, "4", "reports.performance", json!({})),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "5",
            "assessments.importResults",
            json!({ "assessmentId": "x", "resultSets": "nope" })
        ),
        "bad_params"
    );

    drop(stdin);
    let _ = child.wait();
}
