use mojifix_core::error::CoreError;
use mojifix_core::types::RowKey;

/// Failures of a repair run, from fatal to per-chunk.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    /// Could not reach the database. Nothing has been written yet.
    #[error("Database connection failed: {0}")]
    Connection(#[source] sqlx::Error),

    /// The candidate scan broke; the pass cannot continue without it.
    #[error("Scan of {table}.{column} failed: {source}")]
    Query {
        table: String,
        column: String,
        #[source]
        source: sqlx::Error,
    },

    /// A chunk write was rolled back. The engine records these in
    /// [`crate::RepairReport::failures`] and keeps going.
    #[error("Write to {table}.{column} failed for keys {first_pk}..={last_pk}: {source}")]
    Write {
        table: String,
        column: String,
        first_pk: RowKey,
        last_pk: RowKey,
        #[source]
        source: sqlx::Error,
    },

    /// Any other database call outside the chunk loop.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export encoding failed: {0}")]
    Export(#[from] serde_json::Error),
}

impl RepairError {
    /// Ends only the pass it occurred in; a run carries on with the next one.
    pub fn is_pass_local(&self) -> bool {
        matches!(self, Self::Query { .. })
    }
}
