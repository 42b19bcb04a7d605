//! Report composition: turns loaded records into the datasets renderers and
//! the narrative collaborator consume.

use crate::achievement::{
    achievement_by_threshold, aggregate_clo_scores, StudentCloScores, ThresholdRow,
    CANONICAL_THRESHOLD,
};
use crate::calc::{CalcError, EngineWarning};
use crate::clo_key::CloKey;
use crate::diagnostics::{merge_diagnostics, DiagnosticReport, GroupedDiagnostics};
use crate::model::CourseRecord;
use crate::performance::{
    analyze_performance, exam_type_percentages, grade_distribution, performance_curve,
    student_total_percentages, CurveStatistics, GradeCount, HistogramRange, PerformanceAnalysis,
    PerformanceCurve,
};
use crate::records::ReportInputs;
use crate::settings::AnalyticsSettings;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloAchievementReport {
    pub assessment_id: String,
    pub course_id: String,
    pub students: Vec<StudentCloScores>,
    /// Total possible marks per CLO, summed across exam types.
    pub clo_scores: BTreeMap<CloKey, f64>,
    pub achievement_data: BTreeMap<u32, Vec<ThresholdRow>>,
    pub sorted_clos: Vec<String>,
    pub diagnostics: DiagnosticReport,
    pub warnings: Vec<EngineWarning>,
}

impl CloAchievementReport {
    /// Rows persisted as the assessment's achievement data.
    pub fn canonical_rows(&self) -> &[ThresholdRow] {
        self.achievement_data
            .get(&CANONICAL_THRESHOLD)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn ensure_results(inputs: &ReportInputs) -> Result<(), CalcError> {
    if inputs.assessment.result_sets.is_empty() {
        return Err(CalcError::no_results(&inputs.assessment.id));
    }
    Ok(())
}

pub fn clo_achievement(
    inputs: &ReportInputs,
    weightage: Option<&BTreeMap<String, f64>>,
) -> Result<CloAchievementReport, CalcError> {
    ensure_results(inputs)?;
    let started = Instant::now();

    let aggregate = aggregate_clo_scores(&inputs.assessment.result_sets);
    let achievement_data = achievement_by_threshold(&aggregate);
    let direct = achievement_data
        .get(&CANONICAL_THRESHOLD)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let diagnostics = merge_diagnostics(
        direct,
        &inputs.definitions,
        &inputs.assessment.indirect_assessments,
        weightage,
    );

    let report = CloAchievementReport {
        assessment_id: inputs.assessment.id.clone(),
        course_id: inputs.course.id.clone(),
        students: aggregate.student_results.values().cloned().collect(),
        clo_scores: aggregate.clo_total_marks,
        sorted_clos: aggregate.unique_clos.iter().map(|k| k.as_key()).collect(),
        achievement_data,
        diagnostics,
        warnings: aggregate.warnings,
    };
    tracing::debug!(
        assessment_id = %report.assessment_id,
        clos = report.sorted_clos.len(),
        students = report.students.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "clo achievement computed"
    );
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub assessment_id: String,
    /// Grade counts per exam type.
    pub assessment_data: BTreeMap<String, GradeCount>,
    pub overall_grades: GradeCount,
    pub performance_analysis: PerformanceAnalysis,
    pub performance_curve_data: PerformanceCurve,
    pub excluded_students: usize,
    pub settings: AnalyticsSettings,
}

pub fn performance(
    inputs: &ReportInputs,
    settings: &AnalyticsSettings,
) -> Result<PerformanceReport, CalcError> {
    ensure_results(inputs)?;
    let started = Instant::now();
    let sets = &inputs.assessment.result_sets;

    let assessment_data = exam_type_percentages(sets)
        .into_iter()
        .map(|(exam_type, pcts)| (exam_type, grade_distribution(&pcts, settings.grade_scheme)))
        .collect();
    let (totals, excluded_students) = student_total_percentages(sets);
    let total_pcts: Vec<f64> = totals.iter().map(|t| t.percentage).collect();

    let report = PerformanceReport {
        assessment_id: inputs.assessment.id.clone(),
        assessment_data,
        overall_grades: grade_distribution(&total_pcts, settings.grade_scheme),
        performance_analysis: analyze_performance(sets, settings),
        performance_curve_data: performance_curve(&total_pcts),
        excluded_students,
        settings: *settings,
    };
    tracing::debug!(
        assessment_id = %report.assessment_id,
        students = total_pcts.len(),
        excluded = excluded_students,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "performance computed"
    );
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBundle {
    pub clo_achievement: CloAchievementReport,
    pub performance: PerformanceReport,
}

/// Both pipelines over the same borrowed inputs, on scoped threads.
pub fn bundle(
    inputs: &ReportInputs,
    weightage: Option<&BTreeMap<String, f64>>,
    settings: &AnalyticsSettings,
) -> Result<ReportBundle, CalcError> {
    ensure_results(inputs)?;
    let (clo, perf) = std::thread::scope(|s| {
        let clo = s.spawn(|| clo_achievement(inputs, weightage));
        let perf = s.spawn(|| performance(inputs, settings));
        (clo.join(), perf.join())
    });
    let panicked = |_| CalcError::new("internal", "report worker panicked");
    Ok(ReportBundle {
        clo_achievement: clo.map_err(panicked)??,
        performance: perf.map_err(panicked)??,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrativeKind {
    Diagnostics,
    Histogram,
}

impl NarrativeKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "diagnostics" => Some(Self::Diagnostics),
            "histogram" => Some(Self::Histogram),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeCourse {
    pub name: String,
    pub level: Option<String>,
    pub section: Option<String>,
    pub academic_year: Option<String>,
}

impl From<&CourseRecord> for NarrativeCourse {
    fn from(c: &CourseRecord) -> Self {
        Self {
            name: c.name.clone(),
            level: c.level.clone(),
            section: c.section.clone(),
            academic_year: c.academic_year.clone(),
        }
    }
}

/// Plain JSON handed to the narrative generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NarrativeInput {
    #[serde(rename_all = "camelCase")]
    Diagnostics {
        course: NarrativeCourse,
        benchmark: Option<f64>,
        diagnostics: GroupedDiagnostics,
    },
    #[serde(rename_all = "camelCase")]
    Histogram {
        course: NarrativeCourse,
        ranges: Vec<HistogramRange>,
        statistics: CurveStatistics,
    },
}

pub fn narrative_input(
    inputs: &ReportInputs,
    kind: NarrativeKind,
    settings: &AnalyticsSettings,
) -> Result<NarrativeInput, CalcError> {
    let course = NarrativeCourse::from(&inputs.course);
    match kind {
        NarrativeKind::Diagnostics => {
            let report = clo_achievement(inputs, None)?;
            Ok(NarrativeInput::Diagnostics {
                course,
                benchmark: inputs.assessment.benchmark,
                diagnostics: report.diagnostics.grouped,
            })
        }
        NarrativeKind::Histogram => {
            let report = performance(inputs, settings)?;
            Ok(NarrativeInput::Histogram {
                course,
                ranges: report.performance_curve_data.ranges,
                statistics: report.performance_curve_data.statistics,
            })
        }
    }
}
