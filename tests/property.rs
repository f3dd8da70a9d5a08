use proptest::prelude::*;
use substances_hf::canonical_name;
use substances_hf::domain::model::{BoxesBySubstance, Sex, SexCount};
use unicode_normalization::UnicodeNormalization;

const ACCENTED: &[(char, char)] = &[
    ('é', 'e'),
    ('è', 'e'),
    ('ê', 'e'),
    ('à', 'a'),
    ('â', 'a'),
    ('ç', 'c'),
    ('î', 'i'),
    ('ï', 'i'),
    ('ô', 'o'),
    ('ù', 'u'),
    ('ü', 'u'),
];

fn name_strategy() -> impl Strategy<Value = String> {
    "[a-zA-ZéèêàâçîïôùüÉÈÀÇ' -]{0,40}"
}

fn record_strategy() -> impl Strategy<Value = (usize, usize, bool, u64)> {
    // (substance, dataset, is_femme, boxes)
    (0..3usize, 0..2usize, any::<bool>(), 0..10_000u64)
}

fn fold(records: &[(usize, usize, bool, u64)]) -> BoxesBySubstance {
    let substances = ["Foo", "Bar", "Baz"];
    let datasets = ["Open Medic", "Open PHMEV 84"];
    let mut result = BoxesBySubstance::default();
    for &(substance, dataset, is_femme, boxes) in records {
        let sex = if is_femme { Sex::Femme } else { Sex::Homme };
        result
            .bucket(substances[substance], "2018", datasets[dataset])
            .add(sex, boxes);
    }
    result
}

fn grand_total(result: &BoxesBySubstance) -> u64 {
    result
        .0
        .values()
        .flat_map(|years| years.values())
        .flat_map(|datasets| datasets.values())
        .map(SexCount::total)
        .sum()
}

proptest! {
    #[test]
    fn canonical_name_is_idempotent(name in name_strategy()) {
        let once = canonical_name(&name);
        prop_assert_eq!(canonical_name(&once), once);
    }

    #[test]
    fn canonical_name_ignores_case_and_spacing(name in "[a-zéèàçœ ]{1,40}") {
        let shouted = format!("  {}\t", name.to_uppercase());
        prop_assert_eq!(canonical_name(&shouted), canonical_name(&name));
    }

    #[test]
    fn canonical_name_ignores_diacritics(
        picks in proptest::collection::vec((0..ACCENTED.len(), "[a-z]{0,3}"), 1..8)
    ) {
        let mut accented = String::new();
        let mut plain = String::new();
        for (index, filler) in &picks {
            let (with, without) = ACCENTED[*index];
            accented.push(with);
            accented.push_str(filler);
            plain.push(without);
            plain.push_str(filler);
        }
        let decomposed: String = accented.nfd().collect();
        prop_assert_eq!(canonical_name(&accented), canonical_name(&plain));
        prop_assert_eq!(canonical_name(&decomposed), canonical_name(&plain));
    }

    #[test]
    fn canonical_name_ignores_unicode_composition(name in name_strategy()) {
        let composed: String = name.nfc().collect();
        let decomposed: String = name.nfd().collect();
        prop_assert_eq!(canonical_name(&decomposed), canonical_name(&composed));
    }

    #[test]
    fn partial_merge_is_order_independent(
        records in proptest::collection::vec(record_strategy(), 0..64),
        split in 0..64usize,
    ) {
        let split = split.min(records.len());
        let (left, right) = records.split_at(split);

        let mut forward = fold(left);
        forward.merge(fold(right));
        let mut backward = fold(right);
        backward.merge(fold(left));

        prop_assert_eq!(&forward, &backward);
        prop_assert_eq!(&forward, &fold(&records));
    }

    #[test]
    fn totals_match_input_boxes(records in proptest::collection::vec(record_strategy(), 0..64)) {
        let result = fold(&records);
        let expected: u64 = records.iter().map(|&(_, _, _, boxes)| boxes).sum();
        prop_assert_eq!(grand_total(&result), expected);

        for datasets in result.0.values().flat_map(|years| years.values()) {
            for count in datasets.values() {
                prop_assert_eq!(count.total(), count.homme + count.femme);
            }
        }
    }

    #[test]
    fn shuffled_records_fold_identically(
        records in proptest::collection::vec(record_strategy(), 0..32)
            .prop_flat_map(|records| (Just(records.clone()), Just(records).prop_shuffle()))
    ) {
        let (original, shuffled) = records;
        prop_assert_eq!(fold(&original), fold(&shuffled));
    }
}
