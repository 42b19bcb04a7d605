use crate::achievement::ThresholdRow;
use crate::calc::{fixed_2, EngineWarning};
use crate::clo_key::{first_number, normalize, normalize_clo_key, CloKey};
use crate::model::{CloDefinition, IndirectAssessmentRecord, PloMapping};
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementCell {
    pub achievement_grade: String,
    pub percentage_achieving: String,
}

impl AchievementCell {
    fn is_empty(&self) -> bool {
        self.achievement_grade.is_empty() && self.percentage_achieving.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticRecord {
    pub clo_key: CloKey,
    pub clo_number: String,
    pub clo_text: String,
    #[serde(rename = "mappedPLOs")]
    pub mapped_plos: Vec<String>,
    pub weightage: Option<f64>,
    pub direct: AchievementCell,
    pub indirect: AchievementCell,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupedDiagnostics {
    pub knowledge: Vec<DiagnosticRecord>,
    pub skills: Vec<DiagnosticRecord>,
    pub values: Vec<DiagnosticRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    /// Every merged CLO, including ones with no PLO mapping.
    pub records: Vec<DiagnosticRecord>,
    pub grouped: GroupedDiagnostics,
    pub warnings: Vec<EngineWarning>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloCatalogEntry {
    pub description: String,
    pub mapped_plos: Vec<String>,
    pub weightage: Option<f64>,
}

const PLO_CATEGORIES: [char; 3] = ['K', 'S', 'V'];

fn plo_tag(prefix: char, cell_key: &str) -> String {
    match first_number(cell_key) {
        Some(n) => format!("{}{}", prefix, n),
        None => {
            let upper = cell_key.trim().to_uppercase();
            if upper.starts_with(prefix) {
                upper
            } else {
                format!("{}{}", prefix, upper)
            }
        }
    }
}

fn tag_order(tag: &str) -> (usize, u64, String) {
    let category = tag
        .chars()
        .next()
        .and_then(|c| PLO_CATEGORIES.iter().position(|p| *p == c))
        .unwrap_or(PLO_CATEGORIES.len());
    let number = first_number(tag)
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(u64::MAX);
    (category, number, tag.to_string())
}

fn sort_tags(tags: impl IntoIterator<Item = String>) -> Vec<String> {
    let unique: BTreeSet<String> = tags.into_iter().collect();
    let mut out: Vec<String> = unique.into_iter().collect();
    out.sort_by_key(|t| tag_order(t));
    out
}

/// PLO tags for every true cell of a mapping matrix, e.g. `{s2: true}` -> `S2`.
pub fn plo_tags(mapping: &PloMapping) -> Vec<String> {
    let rows = [
        ('K', &mapping.k),
        ('S', &mapping.s),
        ('V', &mapping.v),
    ];
    let mut tags = Vec::new();
    for (prefix, cells) in rows {
        for row in cells.iter() {
            for (cell_key, on) in row {
                if *on {
                    tags.push(plo_tag(prefix, cell_key));
                }
            }
        }
    }
    sort_tags(tags)
}

/// Description and PLO mapping per normalized CLO.
///
/// Definitions colliding on one key take the union of their tags and the
/// lexicographically smallest non-empty description.
pub fn build_clo_catalog(
    definitions: &[CloDefinition],
) -> (BTreeMap<CloKey, CloCatalogEntry>, Vec<EngineWarning>) {
    let mut catalog: BTreeMap<CloKey, CloCatalogEntry> = BTreeMap::new();
    let mut warnings = Vec::new();

    for def in definitions {
        let Some(key) = normalize_clo_key(&def.id, Some(def.description.as_str())) else {
            warnings.push(EngineWarning::malformed_clo_reference("cloDefinition", &def.id));
            continue;
        };
        let tags = plo_tags(&def.plo_mapping);
        let description = def.description.trim().to_string();
        match catalog.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(CloCatalogEntry {
                    description,
                    mapped_plos: tags,
                    weightage: def.weightage,
                });
            }
            Entry::Occupied(mut slot) => {
                tracing::warn!(
                    clo = %slot.key(),
                    id = %def.id,
                    "duplicate CLO definition; merging"
                );
                let existing = slot.get_mut();
                if existing.description.is_empty()
                    || (!description.is_empty() && description < existing.description)
                {
                    existing.description = description;
                }
                let previous = std::mem::take(&mut existing.mapped_plos);
                existing.mapped_plos = sort_tags(previous.into_iter().chain(tags));
                existing.weightage = match (existing.weightage, def.weightage) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
            }
        }
    }

    (catalog, warnings)
}

fn normalize_weightage(weightage: Option<&BTreeMap<String, f64>>) -> BTreeMap<CloKey, f64> {
    let mut out = BTreeMap::new();
    let Some(raw) = weightage else {
        return out;
    };
    for (reference, w) in raw {
        match normalize(reference) {
            Some(key) => {
                out.insert(key, *w);
            }
            None => tracing::warn!(reference = %reference, "weightage key has no CLO number"),
        }
    }
    out
}

fn blank_record(key: &CloKey, catalog: &BTreeMap<CloKey, CloCatalogEntry>) -> DiagnosticRecord {
    let entry = catalog.get(key);
    DiagnosticRecord {
        clo_key: key.clone(),
        clo_number: key.number().to_string(),
        clo_text: entry.map(|e| e.description.clone()).unwrap_or_default(),
        mapped_plos: entry.map(|e| e.mapped_plos.clone()).unwrap_or_default(),
        weightage: entry.and_then(|e| e.weightage),
        direct: AchievementCell::default(),
        indirect: AchievementCell::default(),
    }
}

/// Merges direct (threshold-60) and indirect (survey) achievement by CLO.
///
/// The result does not depend on input order: inputs are keyed and sorted
/// before any field is populated, and records come out in CLO order.
pub fn merge_diagnostics(
    direct: &[ThresholdRow],
    definitions: &[CloDefinition],
    indirect: &[IndirectAssessmentRecord],
    weightage: Option<&BTreeMap<String, f64>>,
) -> DiagnosticReport {
    let (catalog, mut warnings) = build_clo_catalog(definitions);
    let weights = normalize_weightage(weightage);
    let mut merged: BTreeMap<CloKey, DiagnosticRecord> = BTreeMap::new();

    let mut direct_keyed: Vec<(CloKey, &ThresholdRow)> = Vec::new();
    for row in direct {
        match normalize(&row.clo) {
            Some(key) => direct_keyed.push((key, row)),
            None => warnings.push(EngineWarning::malformed_clo_reference("direct", &row.clo)),
        }
    }
    direct_keyed.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| a.1.achievement_grade.cmp(&b.1.achievement_grade))
            .then_with(|| a.1.percentage_achieving.cmp(&b.1.percentage_achieving))
    });
    for (key, row) in direct_keyed {
        let record = merged
            .entry(key.clone())
            .or_insert_with(|| blank_record(&key, &catalog));
        if record.direct.is_empty() {
            record.direct = AchievementCell {
                achievement_grade: row.achievement_grade.clone(),
                percentage_achieving: row.percentage_achieving.clone(),
            };
        }
    }

    let mut indirect_keyed: Vec<(CloKey, String)> = Vec::new();
    for rec in indirect {
        match normalize(&rec.clo) {
            Some(key) => indirect_keyed.push((key, fixed_2(rec.achievement_percentage))),
            None => warnings.push(EngineWarning::malformed_clo_reference("indirect", &rec.clo)),
        }
    }
    indirect_keyed.sort();
    for (key, pct) in indirect_keyed {
        let record = merged
            .entry(key.clone())
            .or_insert_with(|| blank_record(&key, &catalog));
        record.indirect = AchievementCell {
            achievement_grade: String::new(),
            percentage_achieving: pct,
        };
    }

    for (key, record) in merged.iter_mut() {
        if let Some(w) = weights.get(key) {
            record.weightage = Some(*w);
        }
    }

    let records: Vec<DiagnosticRecord> = merged.into_values().collect();
    let grouped = group_by_plo_category(&records);
    tracing::debug!(
        records = records.len(),
        knowledge = grouped.knowledge.len(),
        skills = grouped.skills.len(),
        values = grouped.values.len(),
        "merged CLO diagnostics"
    );

    DiagnosticReport {
        records,
        grouped,
        warnings,
    }
}

/// A CLO mapped to several categories is listed in each of them.
pub fn group_by_plo_category(records: &[DiagnosticRecord]) -> GroupedDiagnostics {
    let has = |r: &DiagnosticRecord, c: char| r.mapped_plos.iter().any(|t| t.starts_with(c));
    GroupedDiagnostics {
        knowledge: records.iter().filter(|r| has(r, 'K')).cloned().collect(),
        skills: records.iter().filter(|r| has(r, 'S')).cloned().collect(),
        values: records.iter().filter(|r| has(r, 'V')).cloned().collect(),
    }
}
