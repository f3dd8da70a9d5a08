use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::AddAssign;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sex {
    Homme,
    Femme,
}

/// Box (or product) counts split by patient sex. Leaf value of every artifact map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SexCount {
    pub homme: u64,
    pub femme: u64,
}

impl SexCount {
    pub fn new(homme: u64, femme: u64) -> Self {
        Self { homme, femme }
    }

    pub fn add(&mut self, sex: Sex, count: u64) {
        match sex {
            Sex::Homme => self.homme += count,
            Sex::Femme => self.femme += count,
        }
    }

    pub fn total(&self) -> u64 {
        self.homme + self.femme
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }
}

impl AddAssign for SexCount {
    fn add_assign(&mut self, other: Self) {
        self.homme += other.homme;
        self.femme += other.femme;
    }
}

/// A CIS product with its CIP13 packagings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductIdentity {
    pub cis: String,
    pub cip13s: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionEntry {
    pub cis: String,
    pub substance: String,
}

/// Canonical substance name -> CIP13 codes realizing it.
///
/// A CIP13 may sit under several substances (combination products).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstanceCodeMap {
    codes: HashMap<String, BTreeSet<String>>,
}

impl SubstanceCodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend_codes<'a, I>(&mut self, substance: &str, cip13s: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let entry = self.codes.entry(substance.to_string()).or_default();
        entry.extend(cip13s.into_iter().cloned());
    }

    pub fn insert(&mut self, substance: String, cip13s: BTreeSet<String>) {
        self.codes.insert(substance, cip13s);
    }

    pub fn get(&self, substance: &str) -> Option<&BTreeSet<String>> {
        self.codes.get(substance)
    }

    pub fn contains(&self, substance: &str) -> bool {
        self.codes.contains_key(substance)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.codes.iter()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Normalized names of the substances under study.
pub type StudiedSubstances = BTreeSet<String>;

/// One parsed row of a yearly dispensation extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispensationRecord {
    pub cip13: String,
    pub sex: Option<Sex>,
    pub boxes: u64,
    pub tag: Option<String>,
}

/// substance -> year -> dataset -> SexCount
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoxesBySubstance(pub BTreeMap<String, BTreeMap<String, BTreeMap<String, SexCount>>>);

impl BoxesBySubstance {
    /// Bucket for the key, created with a zero count on first touch.
    pub fn bucket(&mut self, substance: &str, year: &str, dataset: &str) -> &mut SexCount {
        self.0
            .entry(substance.to_string())
            .or_default()
            .entry(year.to_string())
            .or_default()
            .entry(dataset.to_string())
            .or_default()
    }

    pub fn get(&self, substance: &str, year: &str, dataset: &str) -> Option<&SexCount> {
        self.0.get(substance)?.get(year)?.get(dataset)
    }

    pub fn merge(&mut self, other: BoxesBySubstance) {
        for (substance, by_year) in other.0 {
            for (year, by_dataset) in by_year {
                for (dataset, count) in by_dataset {
                    *self.bucket(&substance, &year, &dataset) += count;
                }
            }
        }
    }

    pub fn substances(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

/// category -> substance -> year -> dataset -> SexCount
pub type BoxesByCategory = BTreeMap<String, BoxesBySubstance>;

/// year -> SexCount
pub type SexCountByYear = BTreeMap<String, SexCount>;

/// year -> CIP13 -> SexCount
pub type SexCountByYearAndCode = BTreeMap<String, BTreeMap<String, SexCount>>;

/// The persisted document read by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    #[serde(rename = "boitesParSexe")]
    pub boxes_by_sex: SexCountByYear,
    #[serde(rename = "medicsParAnnee")]
    pub products_by_year: SexCountByYear,
    #[serde(rename = "medicsSeulementFemmes")]
    pub women_only_products: SexCountByYearAndCode,
    #[serde(rename = "boitesHFBySubstance")]
    pub boxes_by_substance: BoxesBySubstance,
    #[serde(rename = "boitesHFByCatégorie")]
    pub boxes_by_category: BoxesByCategory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sex_count_add() {
        let mut count = SexCount::default();
        count.add(Sex::Homme, 10);
        count.add(Sex::Femme, 5);
        count.add(Sex::Homme, 1);
        assert_eq!(count, SexCount::new(11, 5));
        assert_eq!(count.total(), 16);
    }

    #[test]
    fn test_bucket_created_with_zero() {
        let mut boxes = BoxesBySubstance::default();
        assert!(boxes.bucket("Foo", "2018", "Open Medic").is_zero());
        assert!(boxes.get("Foo", "2018", "Open Medic").is_some());
    }

    #[test]
    fn test_merge_adds_matching_buckets() {
        let mut left = BoxesBySubstance::default();
        left.bucket("Foo", "2018", "Open Medic").add(Sex::Homme, 3);

        let mut right = BoxesBySubstance::default();
        right.bucket("Foo", "2018", "Open Medic").add(Sex::Homme, 4);
        right.bucket("Bar", "2017", "Open Medic").add(Sex::Femme, 2);

        left.merge(right);
        assert_eq!(left.get("Foo", "2018", "Open Medic"), Some(&SexCount::new(7, 0)));
        assert_eq!(left.get("Bar", "2017", "Open Medic"), Some(&SexCount::new(0, 2)));
    }

    #[test]
    fn test_artifact_serializes_with_presentation_keys() {
        let mut artifact = BuildArtifact::default();
        artifact
            .boxes_by_sex
            .insert("2018".to_string(), SexCount::new(1, 2));

        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["boitesParSexe"]["2018"]["homme"], 1);
        assert_eq!(json["boitesParSexe"]["2018"]["femme"], 2);
        assert!(json.get("boitesHFByCatégorie").is_some());
        assert!(json.get("medicsSeulementFemmes").is_some());
    }
}
