mod test_support;

use serde_json::json;
use test_support::{
    outcome, request, request_err, request_ok, setup_assessment, spawn_sidecar, temp_dir,
};

#[test]
fn course_clo_and_assessment_records_round_trip() {
    let workspace = temp_dir("assessmentd-courses");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (course_id, assessment_id) = setup_assessment(&mut stdin, &mut reader, &workspace);

    let course = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "courses.get",
        json!({ "courseId": course_id }),
    );
    assert_eq!(course["name"], json!("Physics I"));
    assert_eq!(course["academicYear"], json!("2025-2026"));
    assert_eq!(course["creditHours"], json!(3.0));
    assert!(course["section"].is_null());

    let clos = json!([
        {
            "id": "CLO 01",
            "description": "Describe kinematics",
            "ploMapping": { "k": [{ "k1": true }], "s": [], "v": [] },
            "weightage": 30.0
        },
        {
            "id": "Outcome",
            "description": "No number anywhere",
            "ploMapping": { "k": [], "s": [], "v": [{ "v2": true }] }
        }
    ]);
    let set = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "clos.set",
        json!({ "courseId": course_id, "clos": clos }),
    );
    assert_eq!(set["count"], json!(2));
    assert_eq!(set["unkeyed"], json!(["Outcome"]));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "clos.list",
        json!({ "courseId": course_id }),
    );
    assert_eq!(listed["clos"], clos);

    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "assessments.importResults",
        json!({
            "assessmentId": assessment_id,
            "resultSets": [
                { "type": "midterm", "results": [outcome("7", "Amal", &[("CLO1", 8.0, 10.0)])] },
                { "type": "final", "results": [] }
            ]
        }),
    );
    let summaries = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "assessments.list",
        json!({ "courseId": course_id }),
    );
    let first = &summaries["assessments"][0];
    assert_eq!(first["id"], json!(assessment_id));
    assert_eq!(first["benchmark"], json!(70.0));
    assert_eq!(first["resultSetCount"], json!(2));

    let record = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "assessments.get",
        json!({ "assessmentId": assessment_id }),
    );
    assert_eq!(record["courseId"], json!(course_id));
    assert_eq!(record["resultSets"][0]["type"], json!("midterm"));
    assert_eq!(
        record["resultSets"][0]["results"][0]["cloResults"]["CLO1"]["marksScored"],
        json!(8.0)
    );
    assert_eq!(record["resultSets"][1]["results"], json!([]));

    let courses = request_ok(&mut stdin, &mut reader, "7", "courses.list", json!({}));
    assert_eq!(courses["courses"][0]["assessmentCount"], json!(1));
    assert_eq!(courses["courses"][0]["cloCount"], json!(2));

    request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "courses.delete",
        json!({ "courseId": course_id }),
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "9",
            "courses.get",
            json!({ "courseId": course_id })
        ),
        "not_found"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "10",
            "assessments.get",
            json!({ "assessmentId": assessment_id })
        ),
        "not_found"
    );
    let after = request_ok(&mut stdin, &mut reader, "11", "courses.list", json!({}));
    assert_eq!(after["courses"], json!([]));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn missing_records_and_empty_assessments_fail_cleanly() {
    let workspace = temp_dir("assessmentd-missing");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (course_id, assessment_id) = setup_assessment(&mut stdin, &mut reader, &workspace);

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "1",
            "reports.cloAchievement",
            json!({ "assessmentId": "does-not-exist" })
        ),
        "not_found"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "2",
            "assessments.create",
            json!({ "courseId": "does-not-exist" })
        ),
        "not_found"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "3",
            "assessments.create",
            json!({ "courseId": course_id, "benchmark": 140 })
        ),
        "bad_params"
    );

    for (id, method) in [
        ("4", "reports.cloAchievement"),
        ("5", "reports.performance"),
        ("6", "reports.bundle"),
    ] {
        assert_eq!(
            request_err(
                &mut stdin,
                &mut reader,
                id,
                method,
                json!({ "assessmentId": assessment_id })
            ),
            "no_results",
            "{}",
            method
        );
    }

    // A result set with no students is an empty cohort, not an error.
    request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "assessments.importResults",
        json!({ "assessmentId": assessment_id, "resultSets": [{ "type": "quiz1", "results": [] }] }),
    );
    let report = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "reports.performance",
        json!({ "assessmentId": assessment_id }),
    );
    assert_eq!(report["overallGrades"]["totalStudents"], json!(0));
    assert_eq!(report["performanceCurveData"]["statistics"]["mean"], json!(0.0));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn import_rejects_reserved_type_and_anonymous_rows() {
    let workspace = temp_dir("assessmentd-import-guard");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (_course_id, assessment_id) = setup_assessment(&mut stdin, &mut reader, &workspace);

    let reserved = request(
        &mut stdin,
        &mut reader,
        "1",
        "assessments.importResults",
        json!({
            "assessmentId": assessment_id,
            "resultSets": [
                { "type": "midterm", "results": [outcome("1", "Amal", &[("CLO1", 8.0, 10.0)])] },
                { "type": " overall ", "results": [outcome("1", "Amal", &[("CLO1", 6.0, 10.0)])] }
            ]
        }),
    );
    assert_eq!(reserved["error"]["code"], json!("bad_params"));
    assert_eq!(reserved["error"]["details"]["index"], json!(1));

    let anonymous = request(
        &mut stdin,
        &mut reader,
        "2",
        "assessments.importResults",
        json!({
            "assessmentId": assessment_id,
            "resultSets": [{
                "type": "final",
                "results": [
                    outcome("1", "Amal", &[("CLO1", 8.0, 10.0)]),
                    outcome(" ", "", &[("CLO1", 2.0, 10.0)])
                ]
            }]
        }),
    );
    assert_eq!(anonymous["error"]["code"], json!("bad_params"));
    assert_eq!(anonymous["error"]["details"], json!({ "index": 0, "row": 1 }));

    // Rejected imports leave nothing behind.
    let record = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "assessments.get",
        json!({ "assessmentId": assessment_id }),
    );
    assert_eq!(record["resultSets"], json!([]));

    drop(stdin);
    let _ = child.wait();
}
