//! Applies a [`ReplacementMap`] to a single text value.
//!
//! Two passes, in order:
//!
//! 1. One left-to-right scan over the input. At every position the longest
//!    substring pattern starting there is replaced; emitted replacements are
//!    never scanned again.
//! 2. One `replace_all` with the compiled word alternation.
//!
//! Neither pass loops, so a fixed value cannot re-trigger further matches
//! through the fixer itself.

use std::borrow::Cow;

use regex::Captures;

use crate::replacement_map::ReplacementMap;

/// Pure, I/O-free text repair bound to one map.
#[derive(Debug, Clone, Copy)]
pub struct TextFixer<'m> {
    map: &'m ReplacementMap,
}

impl<'m> TextFixer<'m> {
    pub fn new(map: &'m ReplacementMap) -> Self {
        Self { map }
    }

    pub fn map(&self) -> &'m ReplacementMap {
        self.map
    }

    /// Repair a nullable column value. `None` stays `None`.
    pub fn fix(&self, text: Option<&str>) -> Option<String> {
        text.map(|t| self.fix_str(t).into_owned())
    }

    /// Repair `text`, borrowing it back untouched when nothing matched.
    pub fn fix_str<'t>(&self, text: &'t str) -> Cow<'t, str> {
        match self.apply_substrings(text) {
            Cow::Borrowed(unchanged) => self.apply_words(unchanged),
            Cow::Owned(replaced) => Cow::Owned(self.apply_words(&replaced).into_owned()),
        }
    }

    /// The repaired value, only if it differs from `text`.
    pub fn fix_if_changed(&self, text: &str) -> Option<String> {
        match self.fix_str(text) {
            Cow::Borrowed(_) => None,
            Cow::Owned(fixed) if fixed == text => None,
            Cow::Owned(fixed) => Some(fixed),
        }
    }

    fn apply_substrings<'t>(&self, text: &'t str) -> Cow<'t, str> {
        if self.map.substring_entries().is_empty() {
            return Cow::Borrowed(text);
        }

        let mut out: Option<String> = None;
        let mut copied_to = 0;
        let mut pos = 0;

        while pos < text.len() {
            let rest = &text[pos..];
            if let Some(entry) = self.map.substring_at(rest) {
                let buf = out.get_or_insert_with(|| String::with_capacity(text.len()));
                buf.push_str(&text[copied_to..pos]);
                buf.push_str(&entry.replacement);
                pos += entry.pattern.len();
                copied_to = pos;
            } else {
                let Some(c) = rest.chars().next() else {
                    break;
                };
                pos += c.len_utf8();
            }
        }

        match out {
            None => Cow::Borrowed(text),
            Some(mut buf) => {
                buf.push_str(&text[copied_to..]);
                Cow::Owned(buf)
            }
        }
    }

    fn apply_words<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let Some(re) = self.map.word_regex() else {
            return Cow::Borrowed(text);
        };

        re.replace_all(text, |caps: &Captures| {
            let token = &caps[0];
            match self.map.resolve_word(token) {
                Some(replacement) => replacement,
                None => {
                    tracing::warn!(
                        token,
                        "Word pattern matched a token with no map entry; leaving it unchanged"
                    );
                    token.to_string()
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
