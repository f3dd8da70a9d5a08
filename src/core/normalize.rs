use crate::utils::error::{BuildError, Result};
use std::collections::HashMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonical form of a substance name.
///
/// Whitespace is trimmed and collapsed, case and diacritics are folded, then a
/// leading ASCII letter is capitalized: `"  PARACÉTAMOL "` becomes
/// `"Paracetamol"`. Precomposed and decomposed spellings give the same result,
/// and running it twice changes nothing.
pub fn canonical_name(name: &str) -> String {
    let mut folded = String::with_capacity(name.len());
    for word in name.split_whitespace() {
        let word_start = folded.len();
        if word_start > 0 {
            folded.push(' ');
        }
        let letters_start = folded.len();

        for c in word
            .nfd()
            .filter(|c| !is_combining_mark(*c))
            .flat_map(char::to_lowercase)
        {
            push_folded(&mut folded, c);
        }

        // A word made only of combining marks leaves nothing behind.
        if folded.len() == letters_start {
            folded.truncate(word_start);
        }
    }

    if folded.starts_with(|c: char| c.is_ascii_lowercase()) {
        folded[..1].make_ascii_uppercase();
    }
    folded
}

/// Letters that carry their accent in the glyph itself and do not decompose.
fn push_folded(out: &mut String, c: char) {
    let folded = match c {
        'æ' => "ae",
        'œ' => "oe",
        'ß' => "ss",
        'ø' => "o",
        'đ' | 'ð' => "d",
        'ħ' => "h",
        'ı' => "i",
        'ł' => "l",
        'ŧ' => "t",
        // Typographic apostrophes show up in registry names.
        '\u{2019}' | '\u{2018}' => "'",
        other => {
            out.push(other);
            return;
        }
    };
    out.push_str(folded);
}

/// Name normalizer shared by the composition table and the allow-list.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    aliases: HashMap<String, String>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a normalizer with `variant -> canonical` aliases.
    ///
    /// Both sides are canonicalized. A target that is itself an alias would
    /// make normalization order dependent and is rejected.
    pub fn with_aliases<I, K, V>(aliases: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let aliases: HashMap<String, String> = aliases
            .into_iter()
            .map(|(from, to)| (canonical_name(from.as_ref()), canonical_name(to.as_ref())))
            .filter(|(from, to)| from != to)
            .collect();

        for (from, to) in &aliases {
            if from.is_empty() || to.is_empty() {
                return Err(BuildError::ConfigValidationError {
                    field: "aliases".to_string(),
                    message: "alias names cannot be empty".to_string(),
                });
            }
            if aliases.contains_key(to) {
                return Err(BuildError::config(format!(
                    "alias '{}' points to '{}', which is itself an alias",
                    from, to
                )));
            }
        }

        Ok(Self { aliases })
    }

    pub fn normalize(&self, name: &str) -> String {
        let canonical = canonical_name(name);
        match self.aliases.get(&canonical) {
            Some(target) => target.clone(),
            None => canonical,
        }
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_accent_and_whitespace_variants_collapse() {
        assert_eq!(canonical_name("Paracétamol "), canonical_name("PARACETAMOL"));
        assert_eq!(canonical_name("PARACÉTAMOL"), "Paracetamol");
        assert_eq!(canonical_name("  acide   ACÉTYLSALICYLIQUE\t"), "Acide acetylsalicylique");
        assert_eq!(canonical_name("IBUPROFÈNE"), "Ibuprofene");
    }

    #[test]
    fn test_ligatures_are_expanded() {
        assert_eq!(canonical_name("Œstradiol"), "Oestradiol");
        assert_eq!(canonical_name("oestradiol"), "Oestradiol");
    }

    #[test]
    fn test_decomposed_accents_are_folded() {
        assert_eq!(canonical_name("Parace\u{301}tamol"), canonical_name("Paracétamol"));
        assert_eq!(canonical_name("PARACE\u{301}TAMOL"), "Paracetamol");
        assert_eq!(canonical_name("ibuprofe\u{300}ne"), "Ibuprofene");
    }

    #[test]
    fn test_letters_without_decomposition_are_folded() {
        assert_eq!(canonical_name("Łódź"), "Lodz");
        assert_eq!(canonical_name("Øxazépam"), "Oxazepam");
    }

    #[test]
    fn test_stray_combining_marks_do_not_leave_spaces() {
        assert_eq!(canonical_name("foo \u{301} bar"), "Foo bar");
        assert_eq!(canonical_name("\u{301}"), "");
    }

    #[test]
    fn test_canonical_name_is_idempotent() {
        for name in ["foo", "  Lévothyroxine SODIQUE ", "Œstradiol", "", "  "] {
            let once = canonical_name(name);
            assert_eq!(canonical_name(&once), once);
        }
    }

    #[test]
    fn test_empty_and_blank_names() {
        assert_eq!(canonical_name(""), "");
        assert_eq!(canonical_name(" \t "), "");
    }

    #[test]
    fn test_aliases_apply_after_canonicalization() {
        let normalizer =
            Normalizer::with_aliases([("ACIDE ACÉTYLSALICYLIQUE", "aspirine")]).unwrap();
        assert_eq!(normalizer.normalize("acide acetylsalicylique"), "Aspirine");
        assert_eq!(normalizer.normalize("Aspirine"), "Aspirine");
        assert_eq!(normalizer.normalize("ibuprofène"), "Ibuprofene");
    }

    #[test]
    fn test_chained_aliases_are_rejected() {
        let result = Normalizer::with_aliases([("a", "b"), ("b", "c")]);
        assert!(matches!(result, Err(BuildError::ConfigError { .. })));
    }

    #[test]
    fn test_self_alias_is_ignored() {
        let normalizer = Normalizer::with_aliases([("Foo", "FOO")]).unwrap();
        assert_eq!(normalizer.alias_count(), 0);
    }
}
