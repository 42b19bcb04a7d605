use serde::Serialize;
use std::cmp::Ordering;

/// Half-away-from-zero rounding to 2 decimals.
///
/// The nudge keeps values such as `72.345` (stored as `72.34499..`) on the
/// same side a report reader expects.
pub fn round_2_decimals(x: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    let nudge = if x >= 0.0 { 1e-9 } else { -1e-9 };
    ((x * 100.0) + nudge).round() / 100.0
}

/// Fixed 2-decimal text used for achievement grades and percentages.
pub fn fixed_2(x: f64) -> String {
    format!("{:.2}", round_2_decimals(x))
}

/// Ratio with an explicit zero-denominator guard. Never yields NaN/inf.
pub fn safe_ratio(num: f64, denom: f64) -> f64 {
    if denom == 0.0 || !denom.is_finite() || !num.is_finite() {
        return 0.0;
    }
    num / denom
}

pub fn safe_percent(num: f64, denom: f64) -> f64 {
    100.0 * safe_ratio(num, denom)
}

pub fn mean(values: &[f64]) -> f64 {
    safe_ratio(values.iter().sum::<f64>(), values.len() as f64)
}

/// Population standard deviation (divides by N).
pub fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let var = values
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / (values.len() as f64);
    var.sqrt()
}

/// Standard score; defined as 0 when the distribution has no spread.
pub fn z_score(value: f64, mean: f64, std_dev: f64) -> f64 {
    if std_dev == 0.0 {
        return 0.0;
    }
    (value - mean) / std_dev
}

pub fn compute_median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[(n / 2) - 1] + sorted[n / 2]) / 2.0
    }
}

#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn not_found(what: &str) -> Self {
        Self::new("not_found", format!("{} not found", what))
    }

    pub fn no_results(assessment_id: &str) -> Self {
        Self::new("no_results", "assessment has no result sets")
            .with_details(serde_json::json!({ "assessmentId": assessment_id }))
    }
}

/// Non-fatal data-quality finding carried alongside a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineWarning {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl EngineWarning {
    pub fn malformed_clo_reference(source: &str, reference: &str) -> Self {
        tracing::warn!(source, reference, "CLO reference has no usable number; excluded");
        Self {
            code: "malformed_clo_reference".to_string(),
            message: format!("{} CLO reference has no number: {:?}", source, reference),
            details: Some(serde_json::json!({ "source": source, "reference": reference })),
        }
    }
}
