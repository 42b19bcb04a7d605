use crate::calc::CalcError;
use crate::db;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const ANALYTICS_KEY: &str = "setup.analytics";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeScheme {
    /// A+ A B+ B C+ C D+ D F
    Nine,
    /// A B C D F
    Five,
}

impl GradeScheme {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nine" | "9" => Some(Self::Nine),
            "five" | "5" => Some(Self::Five),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nine => "nine",
            Self::Five => "five",
        }
    }
}

/// Tunables for the statistical performance report.
///
/// Two report call sites historically disagreed on the Low cut (`z < 0` vs
/// `z < -1`); `low_z_boundary` makes the choice explicit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSettings {
    pub low_z_boundary: f64,
    pub high_z_boundary: f64,
    pub grade_scheme: GradeScheme,
    pub include_overall_tier: bool,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            low_z_boundary: -1.0,
            high_z_boundary: 1.0,
            grade_scheme: GradeScheme::Nine,
            include_overall_tier: true,
        }
    }
}

pub fn default_section() -> Value {
    let d = AnalyticsSettings::default();
    json!({
        "lowZBoundary": d.low_z_boundary,
        "highZBoundary": d.high_z_boundary,
        "gradeScheme": d.grade_scheme.as_str(),
        "includeOverallTier": d.include_overall_tier
    })
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{} must be a number", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

pub fn merge_section_patch(current: &mut Value, patch: &Map<String, Value>) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match k.as_str() {
            "lowZBoundary" => {
                obj.insert(k.clone(), Value::from(parse_f64_range(v, k, -3.0, 0.0)?));
            }
            "highZBoundary" => {
                obj.insert(k.clone(), Value::from(parse_f64_range(v, k, 0.0, 3.0)?));
            }
            "gradeScheme" => {
                let scheme = v
                    .as_str()
                    .and_then(GradeScheme::parse)
                    .ok_or_else(|| "gradeScheme must be one of: nine, five".to_string())?;
                obj.insert(k.clone(), Value::String(scheme.as_str().to_string()));
            }
            "includeOverallTier" => {
                let b = v
                    .as_bool()
                    .ok_or_else(|| format!("{} must be boolean", k))?;
                obj.insert(k.clone(), Value::Bool(b));
            }
            _ => return Err(format!("unknown analytics field: {}", k)),
        }
    }
    Ok(())
}

/// Reads a merged section; every field has already been validated.
pub fn from_section(section: &Value) -> AnalyticsSettings {
    let d = AnalyticsSettings::default();
    AnalyticsSettings {
        low_z_boundary: section
            .get("lowZBoundary")
            .and_then(|v| v.as_f64())
            .unwrap_or(d.low_z_boundary),
        high_z_boundary: section
            .get("highZBoundary")
            .and_then(|v| v.as_f64())
            .unwrap_or(d.high_z_boundary),
        grade_scheme: section
            .get("gradeScheme")
            .and_then(|v| v.as_str())
            .and_then(GradeScheme::parse)
            .unwrap_or(d.grade_scheme),
        include_overall_tier: section
            .get("includeOverallTier")
            .and_then(|v| v.as_bool())
            .unwrap_or(d.include_overall_tier),
    }
}

pub fn load_section(conn: &Connection) -> anyhow::Result<Value> {
    let mut current = default_section();
    if let Some(saved) = db::settings_get_json(conn, ANALYTICS_KEY)? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: a malformed stored value must not block reports.
            if let Err(e) = merge_section_patch(&mut current, saved_obj) {
                tracing::warn!(error = %e, "ignoring stored analytics settings");
                current = default_section();
            }
        }
    }
    Ok(current)
}

/// Stored settings with any per-request overrides (same field names) applied.
pub fn resolve(conn: &Connection, params: &Value) -> Result<AnalyticsSettings, CalcError> {
    let mut section =
        load_section(conn).map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
    let mut overrides = Map::new();
    for key in ["lowZBoundary", "highZBoundary", "gradeScheme", "includeOverallTier"] {
        if let Some(v) = params.get(key).filter(|v| !v.is_null()) {
            overrides.insert(key.to_string(), v.clone());
        }
    }
    merge_section_patch(&mut section, &overrides)
        .map_err(|msg| CalcError::new("bad_params", msg))?;
    Ok(from_section(&section))
}
