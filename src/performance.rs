use crate::calc::{
    compute_median, mean, population_std_dev, round_2_decimals, safe_percent, z_score,
};
use crate::identity::resolve_student_identity;
use crate::model::AssessmentResultSet;
use crate::settings::{AnalyticsSettings, GradeScheme};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const OVERALL_EXAM_TYPE: &str = "Overall";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PerformanceTier {
    Low,
    Average,
    High,
}

pub fn classify(z: f64, settings: &AnalyticsSettings) -> PerformanceTier {
    if z < settings.low_z_boundary {
        PerformanceTier::Low
    } else if z > settings.high_z_boundary {
        PerformanceTier::High
    } else {
        PerformanceTier::Average
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub exam_type: String,
    pub score_out_of_100: f64,
    pub z_score: f64,
    pub performance: PerformanceTier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPerformance {
    pub student_id: String,
    pub student_name: String,
    pub records: Vec<PerformanceRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionMoments {
    pub mean: f64,
    pub std_dev: f64,
    pub student_count: usize,
    /// Rows skipped because their total marks were zero.
    pub excluded_students: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceAnalysis {
    pub result: Vec<StudentPerformance>,
    pub metadata: BTreeMap<String, DistributionMoments>,
    pub overall: Option<DistributionMoments>,
}

#[derive(Debug, Clone)]
struct StudentSlot {
    student_id: String,
    student_name: String,
}

/// Students in first-appearance order plus an index by resolved identity.
#[derive(Debug, Default)]
struct Roster {
    slots: Vec<StudentSlot>,
    index: HashMap<String, usize>,
}

impl Roster {
    fn slot_for(&mut self, student_id: &str, student_name: &str) -> usize {
        let ident = resolve_student_identity(student_id, student_name);
        if let Some(i) = self.index.get(&ident.key) {
            return *i;
        }
        let i = self.slots.len();
        self.slots.push(StudentSlot {
            student_id: ident.student_id,
            student_name: ident.student_name,
        });
        self.index.insert(ident.key, i);
        i
    }
}

/// Per exam type, each student's summed marks (a student may be listed twice
/// in one type when sets share a label).
struct ExamTypeScores {
    exam_type: String,
    marks: BTreeMap<usize, (f64, f64)>,
}

fn collect_scores(result_sets: &[AssessmentResultSet]) -> (Roster, Vec<ExamTypeScores>) {
    let mut roster = Roster::default();
    let mut types: Vec<ExamTypeScores> = Vec::new();
    for set in result_sets {
        let pos = match types.iter().position(|t| t.exam_type == set.exam_type) {
            Some(p) => p,
            None => {
                types.push(ExamTypeScores {
                    exam_type: set.exam_type.clone(),
                    marks: BTreeMap::new(),
                });
                types.len() - 1
            }
        };
        for outcome in &set.results {
            let slot = roster.slot_for(&outcome.student_id, &outcome.student_name);
            let entry = types[pos].marks.entry(slot).or_insert((0.0, 0.0));
            entry.0 += outcome.total_score.marks_scored;
            entry.1 += outcome.total_score.total_marks;
        }
    }
    (roster, types)
}

fn percentages(marks: &BTreeMap<usize, (f64, f64)>) -> (Vec<(usize, f64)>, usize) {
    let mut out = Vec::new();
    let mut excluded = 0;
    for (slot, (scored, total)) in marks {
        if *total > 0.0 {
            out.push((*slot, safe_percent(*scored, *total)));
        } else {
            excluded += 1;
        }
    }
    (out, excluded)
}

fn moments(scores: &[(usize, f64)], excluded: usize) -> DistributionMoments {
    let values: Vec<f64> = scores.iter().map(|(_, s)| *s).collect();
    let m = mean(&values);
    DistributionMoments {
        mean: m,
        std_dev: population_std_dev(&values, m),
        student_count: values.len(),
        excluded_students: excluded,
    }
}

fn rounded(d: DistributionMoments) -> DistributionMoments {
    DistributionMoments {
        mean: round_2_decimals(d.mean),
        std_dev: round_2_decimals(d.std_dev),
        ..d
    }
}

/// Z-score classification per exam type and across types ("Overall").
pub fn analyze_performance(
    result_sets: &[AssessmentResultSet],
    settings: &AnalyticsSettings,
) -> PerformanceAnalysis {
    let (roster, types) = collect_scores(result_sets);
    let mut records: Vec<Vec<PerformanceRecord>> = vec![Vec::new(); roster.slots.len()];
    let mut per_student_pcts: Vec<Vec<f64>> = vec![Vec::new(); roster.slots.len()];
    let mut metadata = BTreeMap::new();

    for t in &types {
        let (scores, excluded) = percentages(&t.marks);
        let dist = moments(&scores, excluded);
        for (slot, score) in &scores {
            let z = z_score(*score, dist.mean, dist.std_dev);
            records[*slot].push(PerformanceRecord {
                exam_type: t.exam_type.clone(),
                score_out_of_100: round_2_decimals(*score),
                z_score: round_2_decimals(z),
                performance: classify(z, settings),
            });
            per_student_pcts[*slot].push(*score);
        }
        tracing::debug!(
            exam_type = %t.exam_type,
            mean = dist.mean,
            std_dev = dist.std_dev,
            "exam type moments"
        );
        metadata.insert(t.exam_type.clone(), rounded(dist));
    }

    let overall = if settings.include_overall_tier {
        let mut scores = Vec::new();
        let mut excluded = 0;
        for (slot, pcts) in per_student_pcts.iter().enumerate() {
            if pcts.is_empty() {
                excluded += 1;
            } else {
                scores.push((slot, mean(pcts)));
            }
        }
        let dist = moments(&scores, excluded);
        for (slot, score) in &scores {
            let z = z_score(*score, dist.mean, dist.std_dev);
            records[*slot].push(PerformanceRecord {
                exam_type: OVERALL_EXAM_TYPE.to_string(),
                score_out_of_100: round_2_decimals(*score),
                z_score: round_2_decimals(z),
                performance: classify(z, settings),
            });
        }
        Some(rounded(dist))
    } else {
        None
    };

    let result = roster
        .slots
        .into_iter()
        .zip(records)
        .map(|(slot, records)| StudentPerformance {
            student_id: slot.student_id,
            student_name: slot.student_name,
            records,
        })
        .collect();

    PerformanceAnalysis {
        result,
        metadata,
        overall,
    }
}

const NINE_POINT: [(&str, f64); 9] = [
    ("A+", 95.0),
    ("A", 90.0),
    ("B+", 85.0),
    ("B", 80.0),
    ("C+", 75.0),
    ("C", 70.0),
    ("D+", 65.0),
    ("D", 60.0),
    ("F", 0.0),
];

const FIVE_POINT: [(&str, f64); 5] = [
    ("A", 90.0),
    ("B", 80.0),
    ("C", 70.0),
    ("D", 60.0),
    ("F", 0.0),
];

fn cutoffs(scheme: GradeScheme) -> &'static [(&'static str, f64)] {
    match scheme {
        GradeScheme::Nine => &NINE_POINT,
        GradeScheme::Five => &FIVE_POINT,
    }
}

pub fn letter_grade(percent: f64, scheme: GradeScheme) -> &'static str {
    cutoffs(scheme)
        .iter()
        .find(|(_, min)| percent >= *min)
        .map(|(g, _)| *g)
        .unwrap_or("F")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBucket {
    pub grade: String,
    pub min_percent: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeCount {
    pub scheme: GradeScheme,
    pub buckets: Vec<GradeBucket>,
    pub total_students: usize,
}

#[cfg(test)]
impl GradeCount {
    pub fn count_of(&self, grade: &str) -> usize {
        self.buckets
            .iter()
            .find(|b| b.grade == grade)
            .map(|b| b.count)
            .unwrap_or(0)
    }
}

pub fn grade_distribution(percentages: &[f64], scheme: GradeScheme) -> GradeCount {
    let mut buckets: Vec<GradeBucket> = cutoffs(scheme)
        .iter()
        .map(|(g, min)| GradeBucket {
            grade: g.to_string(),
            min_percent: *min,
            count: 0,
        })
        .collect();
    for p in percentages {
        let g = letter_grade(*p, scheme);
        if let Some(b) = buckets.iter_mut().find(|b| b.grade == g) {
            b.count += 1;
        }
    }
    GradeCount {
        scheme,
        buckets,
        total_students: percentages.len(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramRange {
    pub label: String,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveStatistics {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub total_students: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceCurve {
    pub ranges: Vec<HistogramRange>,
    pub statistics: CurveStatistics,
}

/// 0-60, then 5-point ranges up to 100.
fn histogram_edges() -> Vec<(f64, f64)> {
    let mut edges = vec![(0.0, 60.0)];
    let mut lo = 60.0;
    while lo < 100.0 {
        edges.push((lo, lo + 5.0));
        lo += 5.0;
    }
    edges
}

pub fn performance_curve(percentages: &[f64]) -> PerformanceCurve {
    let edges = histogram_edges();
    let last = edges.len() - 1;
    let mut ranges: Vec<HistogramRange> = edges
        .iter()
        .map(|(min, max)| HistogramRange {
            label: format!("{}-{}", min, max),
            min: *min,
            max: *max,
            count: 0,
        })
        .collect();
    for p in percentages {
        // Half-open ranges; the top range also takes 100 and anything above.
        let idx = edges
            .iter()
            .position(|(min, max)| *p >= *min && *p < *max)
            .unwrap_or(if *p < 0.0 { 0 } else { last });
        ranges[idx].count += 1;
    }

    let statistics = if percentages.is_empty() {
        CurveStatistics::default()
    } else {
        let m = mean(percentages);
        CurveStatistics {
            mean: round_2_decimals(m),
            median: round_2_decimals(compute_median(percentages)),
            min: round_2_decimals(percentages.iter().copied().fold(f64::INFINITY, f64::min)),
            max: round_2_decimals(percentages.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
            std_dev: round_2_decimals(population_std_dev(percentages, m)),
            total_students: percentages.len(),
        }
    };

    PerformanceCurve { ranges, statistics }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentTotal {
    pub student_id: String,
    pub student_name: String,
    pub percentage: f64,
}

/// Each student's total percentage across all exam types (sum of scored over
/// sum of possible). Students whose possible total is zero are returned as
/// the excluded count instead.
pub fn student_total_percentages(
    result_sets: &[AssessmentResultSet],
) -> (Vec<StudentTotal>, usize) {
    let (roster, types) = collect_scores(result_sets);
    let mut sums = vec![(0.0_f64, 0.0_f64); roster.slots.len()];
    for t in &types {
        for (slot, (scored, total)) in &t.marks {
            sums[*slot].0 += scored;
            sums[*slot].1 += total;
        }
    }
    let mut out = Vec::new();
    let mut excluded = 0;
    for (slot, (scored, total)) in roster.slots.into_iter().zip(sums) {
        if total > 0.0 {
            out.push(StudentTotal {
                student_id: slot.student_id,
                student_name: slot.student_name,
                percentage: safe_percent(scored, total),
            });
        } else {
            excluded += 1;
        }
    }
    (out, excluded)
}

/// Per exam type percentages for grade counting, with the same zero-total
/// exclusion as [`analyze_performance`].
pub fn exam_type_percentages(result_sets: &[AssessmentResultSet]) -> BTreeMap<String, Vec<f64>> {
    let (_, types) = collect_scores(result_sets);
    types
        .into_iter()
        .map(|t| {
            let (scores, _) = percentages(&t.marks);
            (t.exam_type, scores.into_iter().map(|(_, s)| s).collect())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ScoreTotal, StudentOutcome};

    fn outcome(id: &str, scored: f64, total: f64) -> StudentOutcome {
        StudentOutcome {
            student_id: id.to_string(),
            student_name: format!("Student {}", id),
            total_score: ScoreTotal {
                marks_scored: scored,
                total_marks: total,
            },
            clo_results: BTreeMap::new(),
        }
    }

    fn set(exam_type: &str, results: Vec<StudentOutcome>) -> AssessmentResultSet {
        AssessmentResultSet {
            exam_type: exam_type.to_string(),
            results,
        }
    }

    fn record<'a>(a: &'a PerformanceAnalysis, id: &str, exam_type: &str) -> &'a PerformanceRecord {
        a.result
            .iter()
            .find(|s| s.student_id == id)
            .and_then(|s| s.records.iter().find(|r| r.exam_type == exam_type))
            .expect("record")
    }

    #[test]
    fn five_scores_mean_eighty_top_is_high() {
        let sets = vec![set(
            "final",
            [60.0, 70.0, 80.0, 90.0, 100.0]
                .iter()
                .enumerate()
                .map(|(i, s)| outcome(&format!("{}", i + 1), *s, 100.0))
                .collect(),
        )];
        let a = analyze_performance(&sets, &AnalyticsSettings::default());
        let meta = a.metadata.get("final").expect("meta");
        assert_eq!(meta.mean, 80.0);
        assert_eq!(meta.std_dev, 14.14);
        let top = record(&a, "5", "final");
        assert_eq!(top.z_score, 1.41);
        assert_eq!(top.performance, PerformanceTier::High);
        assert_eq!(record(&a, "1", "final").performance, PerformanceTier::Low);
        assert_eq!(record(&a, "2", "final").performance, PerformanceTier::Average);
    }

    #[test]
    fn low_boundary_is_configurable() {
        let sets = vec![set(
            "final",
            vec![outcome("1", 60.0, 100.0), outcome("2", 70.0, 100.0), outcome("3", 80.0, 100.0)],
        )];
        let strict = AnalyticsSettings {
            low_z_boundary: 0.0,
            ..AnalyticsSettings::default()
        };
        let default = analyze_performance(&sets, &AnalyticsSettings::default());
        let zero_cut = analyze_performance(&sets, &strict);
        // z for 60 is about -1.22: Low either way. z for 70 is 0: never Low.
        assert_eq!(record(&default, "1", "final").performance, PerformanceTier::Low);
        assert_eq!(record(&zero_cut, "2", "final").performance, PerformanceTier::Average);

        // 65 sits between the two cuts: z is about -0.73.
        let sets = vec![set(
            "final",
            vec![
                outcome("1", 60.0, 100.0),
                outcome("2", 65.0, 100.0),
                outcome("3", 80.0, 100.0),
                outcome("4", 95.0, 100.0),
            ],
        )];
        let d = analyze_performance(&sets, &AnalyticsSettings::default());
        let z = analyze_performance(&sets, &strict);
        assert_eq!(record(&d, "2", "final").performance, PerformanceTier::Average);
        assert_eq!(record(&z, "2", "final").performance, PerformanceTier::Low);
    }

    #[test]
    fn identical_scores_have_zero_z() {
        let sets = vec![set(
            "quiz1",
            vec![outcome("1", 7.0, 10.0), outcome("2", 7.0, 10.0), outcome("3", 7.0, 10.0)],
        )];
        let a = analyze_performance(&sets, &AnalyticsSettings::default());
        assert_eq!(a.metadata["quiz1"].std_dev, 0.0);
        for s in &a.result {
            for r in &s.records {
                assert_eq!(r.z_score, 0.0);
                assert!(!r.z_score.is_nan());
                assert_eq!(r.performance, PerformanceTier::Average);
            }
        }
    }

    #[test]
    fn overall_averages_type_percentages() {
        let sets = vec![
            set("midterm", vec![outcome("1", 40.0, 50.0), outcome("2", 20.0, 50.0)]),
            set("final", vec![outcome("1", 60.0, 100.0)]),
        ];
        let a = analyze_performance(&sets, &AnalyticsSettings::default());
        assert_eq!(record(&a, "1", OVERALL_EXAM_TYPE).score_out_of_100, 70.0);
        assert_eq!(record(&a, "2", OVERALL_EXAM_TYPE).score_out_of_100, 40.0);
        let overall = a.overall.expect("overall");
        assert_eq!(overall.mean, 55.0);
        assert_eq!(overall.student_count, 2);

        let no_overall = analyze_performance(
            &sets,
            &AnalyticsSettings {
                include_overall_tier: false,
                ..AnalyticsSettings::default()
            },
        );
        assert!(no_overall.overall.is_none());
    }

    #[test]
    fn zero_total_marks_are_excluded_not_nan() {
        let sets = vec![set(
            "final",
            vec![outcome("1", 50.0, 100.0), outcome("2", 0.0, 0.0)],
        )];
        let a = analyze_performance(&sets, &AnalyticsSettings::default());
        let meta = a.metadata["final"];
        assert_eq!(meta.student_count, 1);
        assert_eq!(meta.excluded_students, 1);
        let s2 = a.result.iter().find(|s| s.student_id == "2").expect("student 2");
        assert!(s2.records.is_empty());

        let (totals, excluded) = student_total_percentages(&sets);
        assert_eq!(totals.len(), 1);
        assert_eq!(excluded, 1);
    }

    #[test]
    fn grade_counts_are_conserved() {
        let pcts = [99.0, 95.0, 94.9, 90.0, 86.0, 81.0, 77.0, 71.0, 66.0, 61.0, 59.99, 0.0, 100.0];
        for scheme in [GradeScheme::Nine, GradeScheme::Five] {
            let g = grade_distribution(&pcts, scheme);
            let sum: usize = g.buckets.iter().map(|b| b.count).sum();
            assert_eq!(sum, g.total_students);
            assert_eq!(g.total_students, pcts.len());
        }
        let nine = grade_distribution(&pcts, GradeScheme::Nine);
        assert_eq!(nine.count_of("A+"), 3);
        assert_eq!(nine.count_of("A"), 2);
        assert_eq!(nine.count_of("F"), 2);
        let five = grade_distribution(&pcts, GradeScheme::Five);
        assert_eq!(five.buckets.len(), 5);
        assert_eq!(five.count_of("A"), 5);
        assert_eq!(letter_grade(64.99, GradeScheme::Nine), "D");
    }

    #[test]
    fn histogram_ranges_and_statistics() {
        let pcts = [55.0, 60.0, 64.0, 72.5, 95.0, 100.0];
        let curve = performance_curve(&pcts);
        let labels: Vec<&str> = curve.ranges.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["0-60", "60-65", "65-70", "70-75", "75-80", "80-85", "85-90", "90-95", "95-100"]
        );
        let counts: Vec<usize> = curve.ranges.iter().map(|r| r.count).collect();
        assert_eq!(counts, vec![1, 2, 0, 1, 0, 0, 0, 0, 2]);
        assert_eq!(counts.iter().sum::<usize>(), pcts.len());
        assert_eq!(curve.statistics.min, 55.0);
        assert_eq!(curve.statistics.max, 100.0);
        assert_eq!(curve.statistics.median, 68.25);
        assert_eq!(curve.statistics.total_students, 6);

        let empty = performance_curve(&[]);
        assert_eq!(empty.statistics, CurveStatistics::default());
        assert_eq!(empty.ranges.len(), 9);
    }
}
