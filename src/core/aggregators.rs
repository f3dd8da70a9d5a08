//! Yearly dispensation aggregators.
//!
//! Every aggregator scans its year files on separate tasks. Each task folds
//! its own file into a private partial result; partials are summed once all
//! tasks have joined, so no bucket is ever shared between tasks.

use crate::core::allow_list::CodeIndex;
use crate::core::table::{scan_rows, RecordView, TableFormat};
use crate::domain::model::{
    BoxesBySubstance, DispensationRecord, Sex, SexCount, SexCountByYear, SexCountByYearAndCode,
};
use crate::domain::ports::Storage;
use crate::utils::error::{BuildError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::sync::Arc;
use tokio::task::JoinSet;

/// 0-based column positions in a dispensation extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub cip13: usize,
    pub sex: usize,
    pub boxes: usize,
    /// Optional per-row dataset tag (region in the PHMEV extract).
    #[serde(default)]
    pub tag: Option<usize>,
}

impl ColumnLayout {
    fn min_width(&self) -> usize {
        [self.cip13, self.sex, self.boxes, self.tag.unwrap_or(0)]
            .into_iter()
            .max()
            .unwrap_or(0)
            + 1
    }
}

/// Sex field vocabulary. Codes outside both lists are not attributable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SexCodes {
    pub homme: Vec<String>,
    pub femme: Vec<String>,
}

impl Default for SexCodes {
    fn default() -> Self {
        Self {
            homme: vec!["1".to_string()],
            femme: vec!["2".to_string()],
        }
    }
}

impl SexCodes {
    pub fn classify(&self, code: &str) -> Option<Sex> {
        let code = code.trim();
        if self.homme.iter().any(|c| c == code) {
            Some(Sex::Homme)
        } else if self.femme.iter().any(|c| c == code) {
            Some(Sex::Femme)
        } else {
            None
        }
    }
}

/// One upstream dataset family: how to read it and where its yearly files are.
#[derive(Debug, Clone)]
pub struct DatasetSource {
    pub name: String,
    pub format: TableFormat,
    pub has_header: bool,
    pub columns: ColumnLayout,
    pub sex_codes: SexCodes,
    /// year -> file path
    pub years: BTreeMap<String, String>,
}

impl DatasetSource {
    /// Output key for the record: the family name, suffixed with the row tag
    /// when the family has one.
    pub fn dataset_key(&self, record: &DispensationRecord) -> String {
        match &record.tag {
            Some(tag) => format!("{} {}", self.name, tag),
            None => self.name.clone(),
        }
    }

    pub fn parse_record(&self, record: &RecordView<'_>) -> Result<DispensationRecord> {
        let min_width = self.columns.min_width();
        if record.len() < min_width {
            return Err(record.error(format!(
                "expected at least {} fields, found {}",
                min_width,
                record.len()
            )));
        }

        let field = |index: usize| -> Result<String> {
            Ok(record
                .field(index)?
                .map(|value| value.trim().to_string())
                .unwrap_or_default())
        };

        let raw_boxes = field(self.columns.boxes)?;
        let boxes = raw_boxes.parse::<u64>().map_err(|_| {
            record.error(format!(
                "box count '{}' is not a non-negative integer",
                raw_boxes
            ))
        })?;

        Ok(DispensationRecord {
            cip13: field(self.columns.cip13)?,
            sex: self.sex_codes.classify(&field(self.columns.sex)?),
            boxes,
            tag: self.columns.tag.map(field).transpose()?,
        })
    }

    /// Streams `reader` and folds every data row into `partial`. The header
    /// row, when the family has one, is skipped.
    pub fn fold_rows<R, T, F>(&self, file: &str, reader: R, partial: &mut T, mut fold: F) -> Result<u64>
    where
        R: Read,
        F: FnMut(&mut T, DispensationRecord),
    {
        let mut header = self.has_header;
        let visited = scan_rows(file, reader, &self.format, |row| {
            if std::mem::take(&mut header) {
                return Ok(());
            }
            fold(partial, self.parse_record(row)?);
            Ok(())
        })?;
        Ok(visited.saturating_sub(u64::from(self.has_header)))
    }
}

/// Streams every (source, year) file on its own task and folds each record
/// into a partial private to that task.
///
/// The first failure aborts the remaining tasks.
async fn scan_years<S, T, F>(
    storage: Arc<S>,
    sources: &[Arc<DatasetSource>],
    fold: F,
) -> Result<Vec<(String, T)>>
where
    S: Storage + 'static,
    T: Default + Send + 'static,
    F: Fn(&mut T, &DatasetSource, &str, DispensationRecord) + Send + Sync + 'static,
{
    let fold = Arc::new(fold);
    let mut tasks = JoinSet::new();

    for source in sources {
        for (year, path) in &source.years {
            let storage = Arc::clone(&storage);
            let source = Arc::clone(source);
            let fold = Arc::clone(&fold);
            let year = year.clone();
            let path = path.clone();

            tasks.spawn(async move {
                let reader = storage.open_reader(&path).await?;
                let partial = tokio::task::spawn_blocking({
                    let year = year.clone();
                    move || -> Result<T> {
                        let mut partial = T::default();
                        let rows = source.fold_rows(&path, reader, &mut partial, |partial, record| {
                            (*fold)(partial, source.as_ref(), &year, record)
                        })?;
                        tracing::debug!("{} {}: {} rows from {}", source.name, year, rows, path);
                        Ok(partial)
                    }
                })
                .await??;
                Ok::<_, BuildError>((year, partial))
            });
        }
    }

    let mut partials = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        partials.push(joined??);
    }
    Ok(partials)
}

fn tally_boxes(total: &mut SexCount, record: DispensationRecord) {
    if let Some(sex) = record.sex {
        total.add(sex, record.boxes);
    }
}

fn tally_by_code(by_code: &mut HashMap<String, SexCount>, record: DispensationRecord) {
    if let Some(sex) = record.sex {
        by_code.entry(record.cip13).or_default().add(sex, record.boxes);
    }
}

/// year -> boxes dispensed to each sex, all products.
pub async fn boxes_by_sex<S: Storage + 'static>(
    storage: Arc<S>,
    source: Arc<DatasetSource>,
) -> Result<SexCountByYear> {
    let partials = scan_years(storage, &[source], |total, _, _, record| tally_boxes(total, record)).await?;

    let mut by_year = SexCountByYear::new();
    for (year, count) in partials {
        *by_year.entry(year).or_default() += count;
    }
    tracing::info!("✅ Boxes by sex: {} years", by_year.len());
    Ok(by_year)
}

/// year -> number of distinct CIP13 codes dispensed to each sex.
pub async fn products_by_year<S: Storage + 'static>(
    storage: Arc<S>,
    source: Arc<DatasetSource>,
) -> Result<SexCountByYear> {
    let partials = scan_years(storage, &[source], |by_code, _, _, record| tally_by_code(by_code, record)).await?;

    let mut by_year: BTreeMap<String, HashMap<String, SexCount>> = BTreeMap::new();
    for (year, by_code) in partials {
        let merged = by_year.entry(year).or_default();
        for (cip13, count) in by_code {
            *merged.entry(cip13).or_default() += count;
        }
    }

    let counted: SexCountByYear = by_year
        .into_iter()
        .map(|(year, by_code)| {
            let mut products = SexCount::default();
            for count in by_code.values() {
                if count.homme > 0 {
                    products.add(Sex::Homme, 1);
                }
                if count.femme > 0 {
                    products.add(Sex::Femme, 1);
                }
            }
            (year, products)
        })
        .collect();

    tracing::info!("✅ Products by year: {} years", counted.len());
    Ok(counted)
}

/// year -> CIP13 -> boxes, for codes dispensed to women and never to men.
pub async fn women_only_products<S: Storage + 'static>(
    storage: Arc<S>,
    source: Arc<DatasetSource>,
) -> Result<SexCountByYearAndCode> {
    let partials = scan_years(storage, &[source], |by_code, _, _, record| tally_by_code(by_code, record)).await?;

    let mut by_year: SexCountByYearAndCode = BTreeMap::new();
    for (year, by_code) in partials {
        let merged = by_year.entry(year).or_default();
        for (cip13, count) in by_code {
            *merged.entry(cip13).or_default() += count;
        }
    }
    for by_code in by_year.values_mut() {
        by_code.retain(|_, count| count.femme > 0 && count.homme == 0);
    }

    tracing::info!(
        "✅ Women-only products: {} codes over {} years",
        by_year.values().map(BTreeMap::len).sum::<usize>(),
        by_year.len()
    );
    Ok(by_year)
}

/// substance -> year -> dataset -> boxes, for studied product codes only.
pub async fn boxes_by_substance<S: Storage + 'static>(
    storage: Arc<S>,
    sources: &[Arc<DatasetSource>],
    index: Arc<CodeIndex>,
) -> Result<BoxesBySubstance> {
    let partials = scan_years(storage, sources, move |partial: &mut BoxesBySubstance, source, year, record| {
        let (Some(sex), Some(substances)) = (record.sex, index.substances_for(&record.cip13)) else {
            return;
        };
        let dataset = source.dataset_key(&record);
        for substance in substances {
            partial.bucket(substance, year, &dataset).add(sex, record.boxes);
        }
    })
    .await?;

    let mut merged = BoxesBySubstance::default();
    for (_, partial) in partials {
        merged.merge(partial);
    }
    tracing::info!("✅ Boxes by substance: {} substances", merged.0.len());
    Ok(merged)
}
