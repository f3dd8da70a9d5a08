use crate::core::normalize::Normalizer;
use crate::core::table::Table;
use crate::domain::model::{BoxesByCategory, BoxesBySubstance, StudiedSubstances, SubstanceCodeMap};
use crate::utils::error::{BuildError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// What to do with a CIP13 realizing more than one studied substance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Count the boxes under every matching substance.
    #[default]
    Share,
    /// Fail the run.
    Reject,
}

/// Everything the transform phase needs besides the data files.
#[derive(Debug, Clone)]
pub struct StudySetup {
    pub studied: StudiedSubstances,
    pub normalizer: Normalizer,
    pub categories: CategoryIndex,
}

/// One substance name per line; blank lines are ignored.
pub fn parse_allow_list(table: &Table, normalizer: &Normalizer) -> StudiedSubstances {
    table
        .rows
        .iter()
        .filter_map(|row| row.field(0))
        .map(|name| normalizer.normalize(name))
        .filter(|name| !name.is_empty())
        .collect()
}

/// Restricts `codes` to the studied substances.
pub fn restrict(codes: &SubstanceCodeMap, studied: &StudiedSubstances) -> SubstanceCodeMap {
    let mut restricted = SubstanceCodeMap::new();
    for substance in studied {
        match codes.get(substance) {
            Some(cip13s) => restricted.insert(substance.clone(), cip13s.clone()),
            None => tracing::warn!("⚠️ Studied substance '{}' matches no product code", substance),
        }
    }

    tracing::info!(
        "🎯 {} of {} studied substances resolved to product codes",
        restricted.len(),
        studied.len()
    );
    restricted
}

/// CIP13 -> studied substances, for membership tests while scanning extracts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeIndex {
    by_code: HashMap<String, Vec<String>>,
}

impl CodeIndex {
    pub fn build(restricted: &SubstanceCodeMap, policy: OverlapPolicy) -> Result<Self> {
        let mut by_code: HashMap<String, Vec<String>> = HashMap::new();
        for (substance, cip13s) in restricted.iter() {
            for cip13 in cip13s {
                by_code.entry(cip13.clone()).or_default().push(substance.clone());
            }
        }

        let mut shared = 0usize;
        for (cip13, substances) in by_code.iter_mut() {
            substances.sort();
            if substances.len() > 1 {
                shared += 1;
                if policy == OverlapPolicy::Reject {
                    return Err(BuildError::config(format!(
                        "CIP13 {} realizes several studied substances: {}",
                        cip13,
                        substances.join(", ")
                    )));
                }
            }
        }

        if shared > 0 {
            tracing::warn!(
                "⚠️ {} product codes belong to several studied substances; their boxes are counted under each",
                shared
            );
        }

        Ok(Self { by_code })
    }

    pub fn substances_for(&self, cip13: &str) -> Option<&[String]> {
        self.by_code.get(cip13).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// Substance -> category, from configuration.
#[derive(Debug, Clone)]
pub struct CategoryIndex {
    by_substance: HashMap<String, String>,
    uncategorized: String,
}

impl CategoryIndex {
    pub fn new(
        categories: &BTreeMap<String, Vec<String>>,
        uncategorized: impl Into<String>,
        normalizer: &Normalizer,
    ) -> Result<Self> {
        let mut by_substance: HashMap<String, String> = HashMap::new();
        for (category, substances) in categories {
            for name in substances {
                let substance = normalizer.normalize(name);
                if let Some(previous) = by_substance.insert(substance.clone(), category.clone()) {
                    if previous != *category {
                        return Err(BuildError::config(format!(
                            "substance '{}' is listed under both '{}' and '{}'",
                            substance, previous, category
                        )));
                    }
                }
            }
        }

        Ok(Self {
            by_substance,
            uncategorized: uncategorized.into(),
        })
    }

    pub fn category_of(&self, substance: &str) -> &str {
        self.by_substance
            .get(substance)
            .map(String::as_str)
            .unwrap_or(&self.uncategorized)
    }

    pub fn warn_unstudied(&self, studied: &StudiedSubstances) {
        for substance in self.by_substance.keys() {
            if !studied.contains(substance) {
                tracing::warn!(
                    "⚠️ Categorized substance '{}' is not in the allow-list",
                    substance
                );
            }
        }
    }

    pub fn group(&self, boxes: &BoxesBySubstance) -> BoxesByCategory {
        let mut grouped = BoxesByCategory::new();
        for (substance, by_year) in &boxes.0 {
            grouped
                .entry(self.category_of(substance).to_string())
                .or_default()
                .0
                .insert(substance.clone(), by_year.clone());
        }
        grouped
    }
}
