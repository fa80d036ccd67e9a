//! Repair targets, identifier validation, and the repairable-field registry.
//!
//! Table and column names end up interpolated into SQL text, so every name
//! that reaches the database layer goes through [`validate_identifier`]
//! first.

use std::fmt;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Schema names
// ---------------------------------------------------------------------------

pub const TABLE_POSTS: &str = "posts";
pub const TABLE_COMMENTS: &str = "comments";

pub const COLUMN_ID: &str = "id";
pub const COLUMN_TITLE: &str = "title";
pub const COLUMN_CONTENT: &str = "content";
pub const COLUMN_AUTHOR: &str = "author";

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// PostgreSQL truncates identifiers longer than this (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Rows per chunk when nothing else is configured.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Upper bound on rows per chunk; one chunk is held in memory at a time.
pub const MAX_BATCH_SIZE: usize = 50_000;

// ---------------------------------------------------------------------------
// Validation functions
// ---------------------------------------------------------------------------

/// Validate a lowercase SQL identifier: `[a-z_][a-z0-9_]*`, at most 63 bytes.
pub fn validate_identifier(kind: &str, name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Validation(format!("{kind} name must not be empty")));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(CoreError::Validation(format!(
            "{kind} name '{name}' exceeds {MAX_IDENTIFIER_LEN} bytes"
        )));
    }
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !(first_ok && rest_ok) {
        return Err(CoreError::Validation(format!(
            "{kind} name '{name}' must match [a-z_][a-z0-9_]*"
        )));
    }
    Ok(())
}

/// Validate a chunk size against `1..=MAX_BATCH_SIZE`.
pub fn validate_batch_size(batch_size: usize) -> Result<(), CoreError> {
    if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
        return Err(CoreError::Validation(format!(
            "Batch size must be between 1 and {MAX_BATCH_SIZE}, got {batch_size}"
        )));
    }
    Ok(())
}

/// Double-quote an identifier that already passed [`validate_identifier`].
pub fn quote_identifier(name: &str) -> String {
    format!("\"{name}\"")
}

// ---------------------------------------------------------------------------
// RepairTarget
// ---------------------------------------------------------------------------

/// One text column to repair, addressed by table, column and integer key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepairTarget {
    table: String,
    column: String,
    pk_column: String,
}

impl RepairTarget {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        pk_column: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let target = Self {
            table: table.into(),
            column: column.into(),
            pk_column: pk_column.into(),
        };
        validate_identifier("Table", &target.table)?;
        validate_identifier("Column", &target.column)?;
        validate_identifier("Key column", &target.pk_column)?;
        if target.column == target.pk_column {
            return Err(CoreError::Validation(format!(
                "Column '{}' cannot be both the repaired column and the key",
                target.column
            )));
        }
        Ok(target)
    }

    fn known(table: &str, column: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            pk_column: COLUMN_ID.to_string(),
        }
    }

    /// `comments.content`
    pub fn comment_content() -> Self {
        Self::known(TABLE_COMMENTS, COLUMN_CONTENT)
    }

    /// `posts.title`
    pub fn post_title() -> Self {
        Self::known(TABLE_POSTS, COLUMN_TITLE)
    }

    /// `comments.author`
    pub fn comment_author() -> Self {
        Self::known(TABLE_COMMENTS, COLUMN_AUTHOR)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn pk_column(&self) -> &str {
        &self.pk_column
    }

    /// `table.column`, as used in logs and prompts.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }

    /// Whether `user_stats` groups by this column and must be rebuilt after
    /// it changes.
    pub fn feeds_user_stats(&self) -> bool {
        self.table == TABLE_COMMENTS && self.column == COLUMN_AUTHOR
    }
}

impl fmt::Display for RepairTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} (key {})", self.table, self.column, self.pk_column)
    }
}

// ---------------------------------------------------------------------------
// Repairable field registry
// ---------------------------------------------------------------------------

/// Passes of a full run, in order. The author pass is last because it
/// invalidates `user_stats`.
pub fn full_run_passes(include_author: bool) -> Vec<RepairTarget> {
    let mut passes = vec![RepairTarget::comment_content(), RepairTarget::post_title()];
    if include_author {
        passes.push(RepairTarget::comment_author());
    }
    passes
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // -- identifiers ----------------------------------------------------------

    #[test]
    fn accepts_plain_identifiers() {
        assert!(validate_identifier("Table", "comments").is_ok());
        assert!(validate_identifier("Table", "_tmp_2").is_ok());
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        for bad in ["", "Comments", "1st", "a-b", "a b", "x\"; DROP TABLE posts; --"] {
            assert_matches!(
                validate_identifier("Table", bad),
                Err(CoreError::Validation(_)),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_overlong_identifier() {
        let name = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert_matches!(validate_identifier("Column", &name), Err(CoreError::Validation(_)));
        assert!(validate_identifier("Column", &name[..MAX_IDENTIFIER_LEN]).is_ok());
    }

    #[test]
    fn quote_wraps_in_double_quotes() {
        assert_eq!(quote_identifier("content"), "\"content\"");
    }

    // -- batch size -----------------------------------------------------------

    #[test]
    fn batch_size_bounds() {
        assert!(validate_batch_size(1).is_ok());
        assert!(validate_batch_size(DEFAULT_BATCH_SIZE).is_ok());
        assert!(validate_batch_size(MAX_BATCH_SIZE).is_ok());
        assert_matches!(validate_batch_size(0), Err(CoreError::Validation(_)));
        assert_matches!(
            validate_batch_size(MAX_BATCH_SIZE + 1),
            Err(CoreError::Validation(_))
        );
    }

    // -- targets --------------------------------------------------------------

    #[test]
    fn new_target_validates_every_name() {
        assert!(RepairTarget::new("comments", "content", "id").is_ok());
        assert_matches!(
            RepairTarget::new("comments", "Content", "id"),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            RepairTarget::new("comments", "id", "id"),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn only_author_feeds_user_stats() {
        assert!(RepairTarget::comment_author().feeds_user_stats());
        assert!(!RepairTarget::comment_content().feeds_user_stats());
        assert!(!RepairTarget::post_title().feeds_user_stats());
        assert!(!RepairTarget::new("posts", "author", "id").unwrap().feeds_user_stats());
    }

    #[test]
    fn full_run_order() {
        let names: Vec<String> = full_run_passes(true).iter().map(|t| t.qualified()).collect();
        assert_eq!(names, vec!["comments.content", "posts.title", "comments.author"]);
        assert_eq!(full_run_passes(false).len(), 2);
    }

    #[test]
    fn registry_targets_are_valid() {
        for target in full_run_passes(true) {
            let rebuilt = RepairTarget::new(target.table(), target.column(), target.pk_column());
            assert_eq!(rebuilt.unwrap(), target);
        }
    }
}
