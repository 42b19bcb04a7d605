use regex::Regex;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

fn digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]+").expect("static digit pattern"))
}

/// First run of ASCII digits in `s`, without leading zeros ("007" -> "7").
pub fn first_number(s: &str) -> Option<String> {
    let m = digits_re().find(s)?;
    let trimmed = m.as_str().trim_start_matches('0');
    Some(if trimmed.is_empty() { "0" } else { trimmed }.to_string())
}

/// Canonical `clo<N>` identifier shared by every module that matches CLOs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CloKey {
    number: String,
}

impl CloKey {
    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn as_key(&self) -> String {
        format!("clo{}", self.number)
    }
}

impl fmt::Display for CloKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clo{}", self.number)
    }
}

// Numeric order: clo2 < clo10.
impl Ord for CloKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number
            .len()
            .cmp(&other.number.len())
            .then_with(|| self.number.cmp(&other.number))
    }
}

impl PartialOrd for CloKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for CloKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Normalizes a free-text CLO reference, falling back to its description
/// when the id itself carries no number.
pub fn normalize_clo_key(id: &str, description: Option<&str>) -> Option<CloKey> {
    first_number(id)
        .or_else(|| description.and_then(first_number))
        .map(|number| CloKey { number })
}

pub fn normalize(reference: &str) -> Option<CloKey> {
    normalize_clo_key(reference, None)
}
