//! Joins the packaging registry (CIS -> CIP13) with the composition registry
//! (CIS -> substance) into a substance -> CIP13 mapping.

use crate::core::normalize::Normalizer;
use crate::core::table::{Row, Table};
use crate::domain::model::{CompositionEntry, ProductIdentity, SubstanceCodeMap};
use crate::utils::error::{BuildError, Result};
use std::collections::HashMap;

/// `CIS_CIP_bdpm.txt` columns.
pub const PACKAGING_CIS: usize = 0;
pub const PACKAGING_CIP13: usize = 6;

/// `CIS_COMPO_bdpm.txt` columns.
pub const COMPOSITION_CIS: usize = 0;
pub const COMPOSITION_SUBSTANCE: usize = 3;

fn required_field<'a>(table: &Table, row: &'a Row, index: usize, min_width: usize, what: &str) -> Result<&'a str> {
    if row.len() < min_width {
        return Err(BuildError::parse(
            &table.source,
            row.line,
            format!("expected at least {} fields, found {}", min_width, row.len()),
        ));
    }

    let value = row.field(index).map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(BuildError::parse(
            &table.source,
            row.line,
            format!("empty {} in column {}", what, index + 1),
        ));
    }
    Ok(value)
}

/// CIS -> product identity, from the packaging table.
pub fn parse_product_identities(table: &Table) -> Result<HashMap<String, ProductIdentity>> {
    let min_width = PACKAGING_CIS.max(PACKAGING_CIP13) + 1;
    let mut products: HashMap<String, ProductIdentity> = HashMap::new();
    let mut owners: HashMap<String, String> = HashMap::new();

    for row in &table.rows {
        let cis = required_field(table, row, PACKAGING_CIS, min_width, "CIS")?;
        let cip13 = required_field(table, row, PACKAGING_CIP13, min_width, "CIP13")?;

        if let Some(owner) = owners.get(cip13) {
            if owner != cis {
                return Err(BuildError::parse(
                    &table.source,
                    row.line,
                    format!("CIP13 {} is registered under CIS {} and {}", cip13, owner, cis),
                ));
            }
        }
        owners.insert(cip13.to_string(), cis.to_string());

        products
            .entry(cis.to_string())
            .or_insert_with(|| ProductIdentity {
                cis: cis.to_string(),
                cip13s: Default::default(),
            })
            .cip13s
            .insert(cip13.to_string());
    }

    tracing::debug!(
        "Parsed {} products with {} packagings from {}",
        products.len(),
        owners.len(),
        table.source
    );
    Ok(products)
}

pub fn parse_compositions(table: &Table, normalizer: &Normalizer) -> Result<Vec<CompositionEntry>> {
    let min_width = COMPOSITION_CIS.max(COMPOSITION_SUBSTANCE) + 1;

    table
        .rows
        .iter()
        .map(|row| {
            let cis = required_field(table, row, COMPOSITION_CIS, min_width, "CIS")?;
            let name = required_field(table, row, COMPOSITION_SUBSTANCE, min_width, "substance name")?;
            Ok(CompositionEntry {
                cis: cis.to_string(),
                substance: normalizer.normalize(name),
            })
        })
        .collect()
}

/// Compositions whose CIS has no registered packaging are not reportable and
/// are dropped.
pub fn join_codes(products: &HashMap<String, ProductIdentity>, compositions: &[CompositionEntry]) -> SubstanceCodeMap {
    let mut codes = SubstanceCodeMap::new();
    let mut unmatched = 0usize;

    for entry in compositions {
        match products.get(&entry.cis) {
            Some(product) => codes.extend_codes(&entry.substance, &product.cip13s),
            None => unmatched += 1,
        }
    }

    if unmatched > 0 {
        tracing::debug!(
            "Dropped {} composition rows whose CIS has no packaging",
            unmatched
        );
    }
    codes
}

pub fn resolve_substances(packagings: &Table, compositions: &Table, normalizer: &Normalizer) -> Result<SubstanceCodeMap> {
    let products = parse_product_identities(packagings)?;
    let entries = parse_compositions(compositions, normalizer)?;
    let codes = join_codes(&products, &entries);

    tracing::info!(
        "🔗 Resolved {} substances from {} composition rows",
        codes.len(),
        entries.len()
    );
    Ok(codes)
}
