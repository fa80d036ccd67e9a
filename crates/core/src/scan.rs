//! Cheap pre-filter for corruption scans.
//!
//! [`CandidateFilter`] turns a [`ReplacementMap`] into a set of "column
//! contains X" terms. A row that any map entry could change always satisfies
//! at least one term, so the filter may pass clean rows but never drops a
//! row that needs fixing. The fixer decides afterwards whether anything
//! actually changes.

use std::collections::BTreeSet;

use crate::replacement_map::{MapEntry, PatternKind, ReplacementMap};

/// Characters that begin the common mis-decoded UTF-8 sequences
/// (`Ã¶`, `Ä±`, `Å\u{178}`, `â€™`, `Â°`, `ï¿½`).
pub const MOJIBAKE_LEAD_CHARS: &[char] = &['Ã', 'Ä', 'Å', 'Â', 'â', 'ï'];

/// Disjunction of substring-presence tests derived from a map.
///
/// `needles` are matched case-sensitively (`LIKE`), `ci_needles`
/// case-insensitively (`ILIKE`). When both are empty the filter matches
/// every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateFilter {
    needles: BTreeSet<String>,
    ci_needles: BTreeSet<String>,
}

impl CandidateFilter {
    /// Derive the filter terms for every entry of `map`.
    ///
    /// - An entry containing a lead char contributes that char (for word
    ///   entries, each of its case variants, since word matching ignores
    ///   case).
    /// - An entry without one contributes its whole pattern, case-insensitive
    ///   for word entries.
    pub fn from_map(map: &ReplacementMap) -> Self {
        let mut filter = Self::default();
        for entry in map.entries() {
            filter.add_entry(entry);
        }
        filter
    }

    /// A filter that selects every row.
    pub fn match_all() -> Self {
        Self::default()
    }

    fn add_entry(&mut self, entry: &MapEntry) {
        let lead = entry
            .pattern
            .chars()
            .find(|c| MOJIBAKE_LEAD_CHARS.contains(c));

        match (lead, entry.kind) {
            (Some(c), PatternKind::Substring) => {
                self.needles.insert(c.to_string());
            }
            (Some(c), PatternKind::Word) => {
                self.needles.insert(c.to_string());
                self.needles.insert(c.to_lowercase().collect());
                self.needles.insert(c.to_uppercase().collect());
            }
            (None, PatternKind::Substring) => {
                self.needles.insert(entry.pattern.clone());
            }
            (None, PatternKind::Word) => {
                self.ci_needles.insert(entry.pattern.clone());
            }
        }
    }

    /// True when the filter degrades to "select all rows".
    pub fn matches_all(&self) -> bool {
        self.needles.is_empty() && self.ci_needles.is_empty()
    }

    /// Case-sensitive needles in deterministic order.
    pub fn needles(&self) -> impl Iterator<Item = &str> {
        self.needles.iter().map(String::as_str)
    }

    /// Case-insensitive needles in deterministic order.
    pub fn ci_needles(&self) -> impl Iterator<Item = &str> {
        self.ci_needles.iter().map(String::as_str)
    }

    /// `LIKE` patterns (`%needle%`, escaped) for the case-sensitive needles.
    pub fn like_patterns(&self) -> Vec<String> {
        self.needles().map(contains_pattern).collect()
    }

    /// `ILIKE` patterns for the case-insensitive needles.
    pub fn ilike_patterns(&self) -> Vec<String> {
        self.ci_needles().map(contains_pattern).collect()
    }

    /// Evaluate the same predicate in memory.
    pub fn could_match(&self, text: Option<&str>) -> bool {
        if self.matches_all() {
            return true;
        }
        let Some(text) = text else {
            return false;
        };
        if self.needles().any(|n| text.contains(n)) {
            return true;
        }
        if self.ci_needles.is_empty() {
            return false;
        }
        let lowered = text.to_lowercase();
        self.ci_needles()
            .any(|n| lowered.contains(n.to_lowercase().as_str()))
    }
}

/// `%needle%` with `\`, `%` and `_` escaped for PostgreSQL `LIKE`.
pub fn contains_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixer::TextFixer;

    #[test]
    fn lead_chars_collapse_substring_entries() {
        let map = ReplacementMap::builder()
            .substring("Ã¶", "ö")
            .substring("Ã§", "ç")
            .substring("ÄŸ", "ğ")
            .build()
            .unwrap();
        let filter = CandidateFilter::from_map(&map);
        let needles: Vec<&str> = filter.needles().collect();
        assert_eq!(needles, vec!["Ã", "Ä"]);
        assert!(filter.ilike_patterns().is_empty());
    }

    #[test]
    fn lead_char_found_past_first_position() {
        let map = ReplacementMap::builder()
            .substring("indirdiÄŸimiz", "indirdiğimiz")
            .build()
            .unwrap();
        let filter = CandidateFilter::from_map(&map);
        assert_eq!(filter.needles().collect::<Vec<_>>(), vec!["Ä"]);
    }

    #[test]
    fn word_entries_add_case_variants() {
        let map = ReplacementMap::builder().word("Ãok", "çok").build().unwrap();
        let filter = CandidateFilter::from_map(&map);
        let needles: Vec<&str> = filter.needles().collect();
        assert!(needles.contains(&"Ã"));
        assert!(needles.contains(&"ã"));
    }

    #[test]
    fn entries_without_lead_char_use_whole_pattern() {
        let map = ReplacementMap::builder()
            .word("gözel", "güzel")
            .substring("a_b", "ab")
            .build()
            .unwrap();
        let filter = CandidateFilter::from_map(&map);
        assert_eq!(filter.ilike_patterns(), vec!["%gözel%".to_string()]);
        assert_eq!(filter.like_patterns(), vec!["%a\\_b%".to_string()]);
    }

    #[test]
    fn empty_map_matches_all() {
        let map = ReplacementMap::builder().build().unwrap();
        let filter = CandidateFilter::from_map(&map);
        assert!(filter.matches_all());
        assert!(filter.could_match(None));
        assert!(filter.could_match(Some("anything")));
    }

    #[test]
    fn could_match_null_is_false_when_filtered() {
        let map = ReplacementMap::builder().substring("Ã¶", "ö").build().unwrap();
        assert!(!CandidateFilter::from_map(&map).could_match(None));
    }

    #[test]
    fn could_match_case_insensitive_needles() {
        let map = ReplacementMap::builder().word("gözel", "güzel").build().unwrap();
        let filter = CandidateFilter::from_map(&map);
        assert!(filter.could_match(Some("Çok GÖZEL")));
        assert!(!filter.could_match(Some("çok güzel")));
    }

    #[test]
    fn contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("100%"), "%100\\%%");
        assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
        assert_eq!(contains_pattern("Ã"), "%Ã%");
    }

    #[test]
    fn never_excludes_a_fixable_row() {
        let map = ReplacementMap::canonical().unwrap();
        let filter = CandidateFilter::from_map(&map);
        let fixer = TextFixer::new(&map);
        let samples = [
            "Ã¶ÄŸrenmek istiyorum",
            "GERÃEKTEN",
            "çok gözel",
            "YÖZDEN",
            "rockâ€™Ä ",
            "ÃƒÂ¶",
            "plain text",
        ];
        for sample in samples {
            if fixer.fix_if_changed(sample).is_some() {
                assert!(filter.could_match(Some(sample)), "filter dropped {sample:?}");
            }
        }
    }
}
