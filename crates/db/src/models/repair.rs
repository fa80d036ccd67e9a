//! Row shapes used by repair passes. Not tied to a single table.

use mojifix_core::types::RowKey;
use serde::Serialize;
use sqlx::FromRow;

/// A candidate row read by the scanner: key plus the current column value.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct CandidateRow {
    pub pk: RowKey,
    pub text: Option<String>,
}

/// A row whose value changed, with the value it was read as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixedRow {
    pub pk: RowKey,
    pub original: String,
    pub fixed: String,
}
