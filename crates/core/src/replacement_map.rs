//! Ordered mojibake replacement table.
//!
//! A [`ReplacementMap`] holds two kinds of entries:
//!
//! - **substring** patterns, replaced wherever they occur. They are kept in
//!   precedence order: longest pattern first, ties in insertion order.
//! - **word** patterns, replaced only when they form a whole token. They are
//!   compiled once into a single case-insensitive alternation anchored with
//!   `\b` on both ends.
//!
//! The map is immutable once built and is passed explicitly to every
//! operation that needs it.

use std::cmp::Reverse;
use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Canonical map shipped with the workspace.
const CANONICAL_MAP_JSON: &str = include_str!("../../../data/replacement_map.json");

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// How a pattern is matched against text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Literal sequence replaced regardless of token boundaries.
    Substring,
    /// Whole token, matched case-insensitively at word boundaries.
    Word,
}

/// One `(pattern, replacement)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapEntry {
    pub pattern: String,
    pub replacement: String,
    pub kind: PatternKind,
}

impl MapEntry {
    pub fn substring(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            kind: PatternKind::Substring,
        }
    }

    pub fn word(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            kind: PatternKind::Word,
        }
    }
}

// ---------------------------------------------------------------------------
// Case shape
// ---------------------------------------------------------------------------

/// Capitalisation of a matched token, used to shape the emitted replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseShape {
    /// First letter upper, remaining letters lower.
    Title,
    /// Every letter upper.
    Upper,
    /// Anything else: emit the replacement exactly as stored.
    AsStored,
}

impl CaseShape {
    /// Read the case shape of `matched` against the map key it matched.
    ///
    /// The first cased character of the token decides upper or lower. After
    /// it, only positions where the key spells a lowercase letter are
    /// inspected: garbled artefacts such as `Ã` are uppercase in the key
    /// itself and say nothing about how the author capitalised the rest of
    /// the word. A lowercase letter opening a later word (`Ã ok`) rules out
    /// title case.
    pub fn detect(matched: &str, pattern: &str) -> Self {
        let mut pairs = matched.chars().zip(pattern.chars());

        let first = loop {
            let Some((m, _)) = pairs.next() else {
                return Self::AsStored;
            };
            if is_cased(m) {
                break m;
            }
        };
        if !first.is_uppercase() {
            return Self::AsStored;
        }

        let (mut title, mut upper) = (true, true);
        let mut prev_cased = true;
        for (m, key) in pairs {
            if key.is_lowercase() {
                if m.is_uppercase() && prev_cased {
                    title = false;
                } else if m.is_lowercase() {
                    upper = false;
                    if !prev_cased {
                        title = false;
                    }
                }
            }
            prev_cased = is_cased(m);
        }

        if title {
            Self::Title
        } else if upper {
            Self::Upper
        } else {
            Self::AsStored
        }
    }

    /// Shape `replacement` (stored in its lowercase form).
    pub fn apply(self, replacement: &str) -> String {
        match self {
            Self::Title => {
                let mut chars = replacement.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
            Self::Upper => replacement.to_uppercase(),
            Self::AsStored => replacement.to_string(),
        }
    }
}

fn is_cased(c: char) -> bool {
    c.is_uppercase() || c.is_lowercase()
}

// ---------------------------------------------------------------------------
// ReplacementMap
// ---------------------------------------------------------------------------

/// Immutable, ordered replacement table.
#[derive(Debug, Clone)]
pub struct ReplacementMap {
    /// Substring entries in precedence order (longest first).
    substring: Vec<MapEntry>,
    /// First char of a substring pattern -> indexes into `substring`,
    /// preserving precedence order.
    by_first_char: HashMap<char, Vec<usize>>,
    /// Word entries in insertion order.
    word: Vec<MapEntry>,
    /// Lowercased word pattern -> index into `word`.
    word_lookup: HashMap<String, usize>,
    /// Single alternation over every word pattern, `None` when there are none.
    word_regex: Option<Regex>,
}

impl ReplacementMap {
    pub fn builder() -> ReplacementMapBuilder {
        ReplacementMapBuilder::default()
    }

    /// The canonical deduplicated map embedded from `data/replacement_map.json`.
    pub fn canonical() -> Result<Self, CoreError> {
        Self::from_json_str(CANONICAL_MAP_JSON)
    }

    /// Parse a map document of the form
    /// `{"substring": [{"pattern": .., "replacement": ..}], "word": [..]}`.
    ///
    /// Array order is insertion order.
    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let doc: MapDocument = serde_json::from_str(json)
            .map_err(|e| CoreError::InvalidMap(format!("malformed map document: {e}")))?;

        let mut builder = Self::builder();
        for pair in doc.substring {
            builder = builder.substring(pair.pattern, pair.replacement);
        }
        for pair in doc.word {
            builder = builder.word(pair.pattern, pair.replacement);
        }
        builder.build()
    }

    /// Substring entries in the order they are tried.
    pub fn substring_entries(&self) -> &[MapEntry] {
        &self.substring
    }

    /// Word entries in insertion order.
    pub fn word_entries(&self) -> &[MapEntry] {
        &self.word
    }

    /// The compiled word alternation, if the map has any word entries.
    pub fn word_regex(&self) -> Option<&Regex> {
        self.word_regex.as_ref()
    }

    pub fn len(&self) -> usize {
        self.substring.len() + self.word.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, substring entries first.
    pub fn entries(&self) -> impl Iterator<Item = &MapEntry> {
        self.substring.iter().chain(self.word.iter())
    }

    /// The longest substring entry that `text` starts with.
    pub fn substring_at(&self, text: &str) -> Option<&MapEntry> {
        let first = text.chars().next()?;
        self.by_first_char
            .get(&first)?
            .iter()
            .map(|&i| &self.substring[i])
            .find(|entry| text.starts_with(entry.pattern.as_str()))
    }

    /// Case-insensitive lookup of a word entry.
    pub fn word_entry(&self, token: &str) -> Option<&MapEntry> {
        self.word_lookup
            .get(&token.to_lowercase())
            .map(|&i| &self.word[i])
    }

    /// Replacement for a token matched by the word alternation, shaped to the
    /// token's capitalisation. `None` means the token has no map entry.
    pub fn resolve_word(&self, token: &str) -> Option<String> {
        let entry = self.word_entry(token)?;
        Some(CaseShape::detect(token, &entry.pattern).apply(&entry.replacement))
    }
}

#[derive(Debug, Deserialize)]
struct MapDocument {
    #[serde(default)]
    substring: Vec<RawPair>,
    #[serde(default)]
    word: Vec<RawPair>,
}

#[derive(Debug, Deserialize)]
struct RawPair {
    pattern: String,
    replacement: String,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects entries in insertion order and validates them on [`build`].
///
/// [`build`]: ReplacementMapBuilder::build
#[derive(Debug, Default)]
pub struct ReplacementMapBuilder {
    entries: Vec<MapEntry>,
}

impl ReplacementMapBuilder {
    pub fn substring(self, pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.entry(MapEntry::substring(pattern, replacement))
    }

    pub fn word(self, pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.entry(MapEntry::word(pattern, replacement))
    }

    pub fn entry(mut self, entry: MapEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Validate, deduplicate, order and compile the entries.
    ///
    /// Repeated identical entries are collapsed. A pattern listed twice with
    /// different replacements is rejected, as is an empty pattern or a word
    /// pattern with leading/trailing whitespace.
    pub fn build(self) -> Result<ReplacementMap, CoreError> {
        let mut substring: Vec<MapEntry> = Vec::new();
        let mut word: Vec<MapEntry> = Vec::new();
        let mut seen_substring: HashMap<String, String> = HashMap::new();
        let mut word_lookup: HashMap<String, usize> = HashMap::new();

        for entry in self.entries {
            if entry.pattern.is_empty() {
                return Err(CoreError::InvalidMap(format!(
                    "empty {:?} pattern (replacement '{}')",
                    entry.kind, entry.replacement
                )));
            }

            match entry.kind {
                PatternKind::Substring => {
                    if let Some(existing) = seen_substring.get(&entry.pattern) {
                        if *existing != entry.replacement {
                            return Err(CoreError::InvalidMap(format!(
                                "substring pattern '{}' maps to both '{existing}' and '{}'",
                                entry.pattern, entry.replacement
                            )));
                        }
                        continue;
                    }
                    seen_substring.insert(entry.pattern.clone(), entry.replacement.clone());
                    substring.push(entry);
                }
                PatternKind::Word => {
                    if entry.pattern.trim() != entry.pattern {
                        return Err(CoreError::InvalidMap(format!(
                            "word pattern '{}' has leading or trailing whitespace",
                            entry.pattern
                        )));
                    }
                    let key = entry.pattern.to_lowercase();
                    if let Some(&i) = word_lookup.get(&key) {
                        let existing: &MapEntry = &word[i];
                        if existing.replacement.to_lowercase() != entry.replacement.to_lowercase()
                        {
                            return Err(CoreError::InvalidMap(format!(
                                "word pattern '{}' maps to both '{}' and '{}'",
                                entry.pattern, existing.replacement, entry.replacement
                            )));
                        }
                        continue;
                    }
                    word_lookup.insert(key, word.len());
                    word.push(entry);
                }
            }
        }

        // Stable: equal lengths keep insertion order.
        substring.sort_by_key(|e| Reverse(e.pattern.chars().count()));

        let mut by_first_char: HashMap<char, Vec<usize>> = HashMap::new();
        for (i, entry) in substring.iter().enumerate() {
            if let Some(first) = entry.pattern.chars().next() {
                by_first_char.entry(first).or_default().push(i);
            }
        }

        let word_regex = compile_word_regex(&word)?;

        Ok(ReplacementMap {
            substring,
            by_first_char,
            word,
            word_lookup,
            word_regex,
        })
    }
}

/// Build `\b(?:k1|k2|..)\b`, longest alternatives first so a key that is a
/// prefix of another never shadows it.
fn compile_word_regex(word: &[MapEntry]) -> Result<Option<Regex>, CoreError> {
    if word.is_empty() {
        return Ok(None);
    }

    let mut keys: Vec<&str> = word.iter().map(|e| e.pattern.as_str()).collect();
    keys.sort_by_key(|k| Reverse(k.chars().count()));

    let alternation = keys
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(r"\b(?:{alternation})\b");

    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|e| CoreError::InvalidMap(format!("word patterns do not compile: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // -- ordering -------------------------------------------------------------

    #[test]
    fn substring_entries_sorted_longest_first() {
        let map = ReplacementMap::builder()
            .substring("Ã¶", "ö")
            .substring("ÃƒÂ¶", "ö")
            .substring("x", "y")
            .build()
            .unwrap();
        let patterns: Vec<&str> = map
            .substring_entries()
            .iter()
            .map(|e| e.pattern.as_str())
            .collect();
        assert_eq!(patterns, vec!["ÃƒÂ¶", "Ã¶", "x"]);
    }

    #[test]
    fn equal_length_patterns_keep_insertion_order() {
        let map = ReplacementMap::builder()
            .substring("ÅŸ", "ş")
            .substring("ÄŸ", "ğ")
            .substring("Ä±", "ı")
            .build()
            .unwrap();
        let patterns: Vec<&str> = map
            .substring_entries()
            .iter()
            .map(|e| e.pattern.as_str())
            .collect();
        assert_eq!(patterns, vec!["ÅŸ", "ÄŸ", "Ä±"]);
    }

    #[test]
    fn substring_at_prefers_longest() {
        let map = ReplacementMap::builder()
            .substring("Ä", "?")
            .substring("Ä±", "ı")
            .build()
            .unwrap();
        assert_eq!(map.substring_at("Ä±k").unwrap().replacement, "ı");
        assert_eq!(map.substring_at("Äk").unwrap().replacement, "?");
        assert!(map.substring_at("abc").is_none());
        assert!(map.substring_at("").is_none());
    }

    // -- validation -----------------------------------------------------------

    #[test]
    fn identical_duplicates_collapse() {
        let map = ReplacementMap::builder()
            .substring("Ä ", "ı")
            .substring("Ä ", "ı")
            .word("Ãok", "çok")
            .word("ÃOK", "çok")
            .build()
            .unwrap();
        assert_eq!(map.substring_entries().len(), 1);
        assert_eq!(map.word_entries().len(), 1);
    }

    #[test]
    fn conflicting_duplicates_rejected() {
        let result = ReplacementMap::builder()
            .substring("Ã¶", "ö")
            .substring("Ã¶", "o")
            .build();
        assert_matches!(result, Err(CoreError::InvalidMap(_)));
    }

    #[test]
    fn empty_pattern_rejected() {
        let result = ReplacementMap::builder().substring("", "x").build();
        assert_matches!(result, Err(CoreError::InvalidMap(_)));
    }

    #[test]
    fn word_pattern_with_trailing_space_rejected() {
        let result = ReplacementMap::builder().word("ilginÃ ", "ilginç").build();
        assert_matches!(result, Err(CoreError::InvalidMap(_)));
    }

    #[test]
    fn empty_map_has_no_word_regex() {
        let map = ReplacementMap::builder().build().unwrap();
        assert!(map.is_empty());
        assert!(map.word_regex().is_none());
    }

    // -- word lookup and case shape -------------------------------------------

    #[test]
    fn word_lookup_is_case_insensitive() {
        let map = ReplacementMap::builder()
            .word("gerÃekten", "gerçekten")
            .build()
            .unwrap();
        assert!(map.word_entry("GERÃEKTEN").is_some());
        assert!(map.word_entry("gerãekten").is_some());
        assert!(map.word_entry("gerekten").is_none());
    }

    #[test]
    fn resolve_word_preserves_case_shape() {
        let map = ReplacementMap::builder()
            .word("gerÃekten", "gerçekten")
            .build()
            .unwrap();
        assert_eq!(map.resolve_word("gerÃekten").as_deref(), Some("gerçekten"));
        assert_eq!(map.resolve_word("GerÃekten").as_deref(), Some("Gerçekten"));
        assert_eq!(map.resolve_word("GERÃEKTEN").as_deref(), Some("GERÇEKTEN"));
        assert_eq!(map.resolve_word("gErÃekten").as_deref(), Some("gerçekten"));
        assert_eq!(map.resolve_word("unknown"), None);
    }

    #[test]
    fn case_shape_ignores_garbled_positions() {
        assert_eq!(CaseShape::detect("GerÃekten", "gerÃekten"), CaseShape::Title);
        assert_eq!(CaseShape::detect("GERÃEKTEN", "gerÃekten"), CaseShape::Upper);
        assert_eq!(CaseShape::detect("ÃOK", "Ãok"), CaseShape::Upper);
        assert_eq!(CaseShape::detect("ÃOk", "Ãok"), CaseShape::AsStored);
    }

    #[test]
    fn case_shape_reads_garbled_first_letter() {
        assert_eq!(CaseShape::detect("Ãok", "Ãok"), CaseShape::Title);
        assert_eq!(CaseShape::detect("Ã", "Ã"), CaseShape::Title);
        assert_eq!(CaseShape::detect("ãok", "Ãok"), CaseShape::AsStored);
        assert_eq!(CaseShape::detect("¿Ãok", "¿Ãok"), CaseShape::Title);
    }

    #[test]
    fn case_shape_lowercase_later_word_is_not_title() {
        assert_eq!(CaseShape::detect("Ã ok", "Ã ok"), CaseShape::AsStored);
        assert_eq!(CaseShape::detect("Ã Ok", "Ã ok"), CaseShape::Title);
    }

    #[test]
    fn case_shape_apply() {
        assert_eq!(CaseShape::Title.apply("çok"), "Çok");
        assert_eq!(CaseShape::Upper.apply("çok"), "ÇOK");
        assert_eq!(CaseShape::AsStored.apply("çok"), "çok");
        assert_eq!(CaseShape::Title.apply(""), "");
    }

    // -- word regex -----------------------------------------------------------

    #[test]
    fn word_regex_is_anchored_at_boundaries() {
        let map = ReplacementMap::builder().word("ok", "wrong").build().unwrap();
        let re = map.word_regex().unwrap();
        assert!(re.is_match("it is ok."));
        assert!(!re.is_match("Ãok"));
        assert!(!re.is_match("okay"));
    }

    // -- JSON documents -------------------------------------------------------

    #[test]
    fn from_json_str_keeps_array_order() {
        let json = r#"{
            "substring": [
                {"pattern": "ÅŸ", "replacement": "ş"},
                {"pattern": "ÄŸ", "replacement": "ğ"}
            ],
            "word": [{"pattern": "Ãok", "replacement": "çok"}]
        }"#;
        let map = ReplacementMap::from_json_str(json).unwrap();
        assert_eq!(map.substring_entries()[0].pattern, "ÅŸ");
        assert_eq!(map.word_entries()[0].kind, PatternKind::Word);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn from_json_str_sections_optional() {
        let map = ReplacementMap::from_json_str(r#"{"word": []}"#).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn malformed_json_rejected() {
        assert_matches!(
            ReplacementMap::from_json_str("{not json"),
            Err(CoreError::InvalidMap(_))
        );
    }

    #[test]
    fn canonical_map_loads() {
        let map = ReplacementMap::canonical().unwrap();
        assert!(!map.substring_entries().is_empty());
        assert!(!map.word_entries().is_empty());
        assert!(map.word_regex().is_some());
    }

    #[test]
    fn canonical_map_outputs_contain_no_substring_keys() {
        let map = ReplacementMap::canonical().unwrap();
        for entry in map.entries() {
            for key in map.substring_entries() {
                assert!(
                    !entry.replacement.contains(key.pattern.as_str()),
                    "replacement '{}' contains key '{}'",
                    entry.replacement,
                    key.pattern
                );
            }
        }
    }
}
