//! Typed operator confirmation for mutating steps.
//!
//! A gate only opens on an exact phrase. Anything else, including empty
//! input and an interrupted read (`None`), keeps it closed.

use crate::target::RepairTarget;

/// Phrase for the pre-run backup acknowledgement.
pub const BACKUP_PHRASE: &str = "YES";

/// Phrase for opening a single repair pass.
pub const PASS_PHRASE: &str = "yes";

/// Sequence removed by `purge` when none is given: U+FFFD mis-decoded once.
pub const DEFAULT_PURGE_SEQUENCE: &str = "ï¿½";

/// How typed input is compared against the phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Exact,
    CaseInsensitive,
}

/// A prompt and the phrase that must be typed to proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationGate {
    pub prompt: String,
    pub phrase: String,
    pub rule: MatchRule,
}

impl ConfirmationGate {
    /// Must be acknowledged once before anything in a full run mutates.
    pub fn backup() -> Self {
        Self {
            prompt: format!(
                "These operations rewrite stored text in place. Have you backed up the \
                 database? Type '{BACKUP_PHRASE}' to continue"
            ),
            phrase: BACKUP_PHRASE.to_string(),
            rule: MatchRule::Exact,
        }
    }

    pub fn pass(target: &RepairTarget, candidates: i64) -> Self {
        let mut prompt = format!(
            "Repair {} ({candidates} candidate rows)?",
            target.qualified()
        );
        if target.feeds_user_stats() {
            prompt.push_str(" user_stats will be rebuilt afterwards.");
        }
        prompt.push_str(&format!(" Type '{PASS_PHRASE}' to proceed"));
        Self {
            prompt,
            phrase: PASS_PHRASE.to_string(),
            rule: MatchRule::CaseInsensitive,
        }
    }

    pub fn purge(sequence: &str, target: &RepairTarget) -> Self {
        let phrase = format!("REMOVE {sequence}");
        Self {
            prompt: format!(
                "Remove every '{sequence}' from {}? Type '{phrase}' to confirm",
                target.qualified()
            ),
            phrase,
            rule: MatchRule::Exact,
        }
    }

    pub fn rebuild_stats() -> Self {
        Self {
            prompt: format!(
                "Drop and recompute user_stats from comments? Type '{PASS_PHRASE}' to proceed"
            ),
            phrase: PASS_PHRASE.to_string(),
            rule: MatchRule::CaseInsensitive,
        }
    }

    /// Whether `input` opens the gate. Surrounding whitespace is ignored.
    pub fn accepts(&self, input: Option<&str>) -> bool {
        let Some(input) = input.map(str::trim) else {
            return false;
        };
        if input.is_empty() {
            return false;
        }
        match self.rule {
            MatchRule::Exact => input == self.phrase,
            MatchRule::CaseInsensitive => input.to_lowercase() == self.phrase.to_lowercase(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_requires_exact_uppercase() {
        let gate = ConfirmationGate::backup();
        assert!(gate.accepts(Some("YES")));
        assert!(gate.accepts(Some("  YES\n")));
        assert!(!gate.accepts(Some("yes")));
        assert!(!gate.accepts(Some("Y")));
    }

    #[test]
    fn pass_gate_ignores_case() {
        let gate = ConfirmationGate::pass(&RepairTarget::comment_content(), 12);
        assert!(gate.accepts(Some("yes")));
        assert!(gate.accepts(Some("Yes")));
        assert!(!gate.accepts(Some("y")));
        assert!(!gate.accepts(Some("yes please")));
    }

    #[test]
    fn empty_and_interrupted_input_refused() {
        let gate = ConfirmationGate::pass(&RepairTarget::post_title(), 0);
        assert!(!gate.accepts(None));
        assert!(!gate.accepts(Some("")));
        assert!(!gate.accepts(Some("   ")));
    }

    #[test]
    fn purge_phrase_includes_sequence() {
        let gate = ConfirmationGate::purge(DEFAULT_PURGE_SEQUENCE, &RepairTarget::comment_content());
        assert_eq!(gate.phrase, "REMOVE ï¿½");
        assert!(gate.accepts(Some("REMOVE ï¿½")));
        assert!(!gate.accepts(Some("remove ï¿½")));
        assert!(!gate.accepts(Some("REMOVE")));
    }

    #[test]
    fn author_prompt_mentions_stats() {
        let gate = ConfirmationGate::pass(&RepairTarget::comment_author(), 3);
        assert!(gate.prompt.contains("user_stats"));
        assert!(gate.prompt.contains("comments.author"));
    }
}
