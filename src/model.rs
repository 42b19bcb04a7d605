//! Records exchanged with the persistence collaborator.
//!
//! Field names follow the camelCase documents the collaborator produces, so
//! every type here round-trips through `serde_json` unchanged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreTotal {
    #[serde(default)]
    pub marks_scored: f64,
    #[serde(default)]
    pub total_marks: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloResult {
    #[serde(default)]
    pub total_questions: u32,
    #[serde(default)]
    pub correct_answers: u32,
    #[serde(default)]
    pub marks_scored: f64,
    #[serde(default)]
    pub total_marks: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentOutcome {
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    #[serde(default)]
    pub total_score: ScoreTotal,
    /// Keyed by the raw CLO id as entered upstream ("CLO1", "clo 1", ..).
    #[serde(default)]
    pub clo_results: BTreeMap<String, CloResult>,
}

/// All student outcomes for one exam type ("midterm", "final", ..).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResultSet {
    #[serde(rename = "type")]
    pub exam_type: String,
    #[serde(default)]
    pub results: Vec<StudentOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PloMapping {
    #[serde(default)]
    pub k: Vec<BTreeMap<String, bool>>,
    #[serde(default)]
    pub s: Vec<BTreeMap<String, bool>>,
    #[serde(default)]
    pub v: Vec<BTreeMap<String, bool>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloDefinition {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub plo_mapping: PloMapping,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weightage: Option<f64>,
}

/// Survey-derived achievement for one CLO.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndirectAssessmentRecord {
    pub clo: String,
    #[serde(default)]
    pub achievement_rate: f64,
    #[serde(default)]
    pub benchmark: String,
    #[serde(default)]
    pub achievement_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    pub id: String,
    pub name: String,
    pub level: Option<String>,
    pub section: Option<String>,
    pub academic_year: Option<String>,
    pub credit_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRecord {
    pub id: String,
    pub course_id: String,
    pub benchmark: Option<f64>,
    pub result_sets: Vec<AssessmentResultSet>,
    pub indirect_assessments: Vec<IndirectAssessmentRecord>,
}
