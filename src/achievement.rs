use crate::calc::{fixed_2, safe_percent, EngineWarning};
use crate::clo_key::{normalize, CloKey};
use crate::identity::resolve_student_identity;
use crate::model::AssessmentResultSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

pub const ACHIEVEMENT_THRESHOLDS: [u32; 4] = [60, 70, 80, 90];

/// Threshold whose rows are written back as the assessment's achievement data.
pub const CANONICAL_THRESHOLD: u32 = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkPair {
    pub marks_scored: f64,
    pub total_marks: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentCloScores {
    pub student_id: String,
    pub student_name: String,
    pub clo_scores: BTreeMap<CloKey, MarkPair>,
    pub total_marks_obtained: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloAggregate {
    pub unique_clos: BTreeSet<CloKey>,
    pub clo_total_marks: BTreeMap<CloKey, f64>,
    /// Keyed by the resolved student identity.
    pub student_results: BTreeMap<String, StudentCloScores>,
    pub warnings: Vec<EngineWarning>,
}

struct WarningSink {
    seen: HashSet<String>,
    out: Vec<EngineWarning>,
}

impl WarningSink {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            out: Vec::new(),
        }
    }

    fn malformed(&mut self, reference: &str) {
        if self.seen.insert(reference.to_string()) {
            self.out
                .push(EngineWarning::malformed_clo_reference("cloResults", reference));
        }
    }
}

/// Learns the CLO universe and per-student CLO totals.
///
/// Total possible marks per CLO are read from the first student of each exam
/// type only; every student of a type is assumed to sit the same paper.
pub fn aggregate_clo_scores(result_sets: &[AssessmentResultSet]) -> CloAggregate {
    let mut warnings = WarningSink::new();
    let mut unique_clos: BTreeSet<CloKey> = BTreeSet::new();
    let mut clo_total_marks: BTreeMap<CloKey, f64> = BTreeMap::new();

    for set in result_sets {
        let Some(first) = set.results.first() else {
            continue;
        };
        for (raw, res) in &first.clo_results {
            let Some(key) = normalize(raw) else {
                warnings.malformed(raw);
                continue;
            };
            unique_clos.insert(key.clone());
            *clo_total_marks.entry(key).or_insert(0.0) += res.total_marks;
        }
    }

    let mut student_results: BTreeMap<String, StudentCloScores> = BTreeMap::new();
    for set in result_sets {
        for outcome in &set.results {
            let ident = resolve_student_identity(&outcome.student_id, &outcome.student_name);
            let entry = student_results
                .entry(ident.key.clone())
                .or_insert_with(|| StudentCloScores {
                    student_id: ident.student_id.clone(),
                    student_name: ident.student_name.clone(),
                    clo_scores: unique_clos
                        .iter()
                        .map(|k| (k.clone(), MarkPair::default()))
                        .collect(),
                    total_marks_obtained: 0.0,
                });
            for (raw, res) in &outcome.clo_results {
                let Some(key) = normalize(raw) else {
                    warnings.malformed(raw);
                    continue;
                };
                let pair = entry.clo_scores.entry(key).or_default();
                pair.marks_scored += res.marks_scored;
                pair.total_marks += res.total_marks;
            }
        }
    }

    for student in student_results.values_mut() {
        student.total_marks_obtained = student.clo_scores.values().map(|p| p.marks_scored).sum();
    }

    tracing::debug!(
        clos = unique_clos.len(),
        students = student_results.len(),
        "aggregated CLO scores"
    );

    CloAggregate {
        unique_clos,
        clo_total_marks,
        student_results,
        warnings: warnings.out,
    }
}

/// One CLO at one threshold. `clo` holds the canonical `clo<N>` text so the
/// rows survive a round-trip through the achievement cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdRow {
    pub clo: String,
    pub achievement_grade: String,
    pub percentage_achieving: String,
}

fn meets_threshold(marks_scored: f64, clo_total: f64, threshold: u32) -> bool {
    if clo_total <= 0.0 {
        return false;
    }
    marks_scored * 100.0 >= f64::from(threshold) * clo_total
}

pub fn threshold_rows(aggregate: &CloAggregate, threshold: u32) -> Vec<ThresholdRow> {
    let student_count = aggregate.student_results.len();
    aggregate
        .unique_clos
        .iter()
        .map(|clo| {
            let clo_total = aggregate.clo_total_marks.get(clo).copied().unwrap_or(0.0);
            let achieving = aggregate
                .student_results
                .values()
                .filter(|s| {
                    let scored = s.clo_scores.get(clo).map(|p| p.marks_scored).unwrap_or(0.0);
                    meets_threshold(scored, clo_total, threshold)
                })
                .count();
            ThresholdRow {
                clo: clo.to_string(),
                achievement_grade: fixed_2(clo_total * f64::from(threshold) / 100.0),
                percentage_achieving: fixed_2(safe_percent(
                    achieving as f64,
                    student_count as f64,
                )),
            }
        })
        .collect()
}

/// Rows for every threshold in [`ACHIEVEMENT_THRESHOLDS`], keyed by threshold.
pub fn achievement_by_threshold(aggregate: &CloAggregate) -> BTreeMap<u32, Vec<ThresholdRow>> {
    ACHIEVEMENT_THRESHOLDS
        .iter()
        .map(|t| (*t, threshold_rows(aggregate, *t)))
        .collect()
}
