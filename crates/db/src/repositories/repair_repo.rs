//! Generic read and write queries for repair passes over any
//! `table.column` keyed by an integer column.
//!
//! Identifiers come from a validated [`RepairTarget`] and are double-quoted
//! when interpolated; every value is bound.

use futures::stream::BoxStream;
use mojifix_core::scan::CandidateFilter;
use mojifix_core::target::{quote_identifier, RepairTarget};
use mojifix_core::types::RowKey;
use sqlx::{PgConnection, PgPool};

use crate::models::repair::{CandidateRow, FixedRow};

// ---------------------------------------------------------------------------
// Candidate scan
// ---------------------------------------------------------------------------

/// The scanner's SELECT for one target and filter, built once per pass.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    target: RepairTarget,
    select_sql: String,
    count_sql: String,
    like: Vec<String>,
    ilike: Vec<String>,
}

impl CandidateQuery {
    pub fn new(target: &RepairTarget, filter: &CandidateFilter) -> Self {
        let table = quote_identifier(target.table());
        let column = quote_identifier(target.column());
        let pk = quote_identifier(target.pk_column());

        let predicate = if filter.matches_all() {
            "TRUE".to_string()
        } else {
            format!("({column} LIKE ANY($1) OR {column} ILIKE ANY($2))")
        };

        Self {
            target: target.clone(),
            select_sql: format!(
                "SELECT {pk}::bigint AS pk, {column}::text AS text
                 FROM {table}
                 WHERE {predicate}
                 ORDER BY {pk}"
            ),
            count_sql: format!("SELECT COUNT(*) FROM {table} WHERE {predicate}"),
            like: filter.like_patterns(),
            ilike: filter.ilike_patterns(),
        }
    }

    pub fn target(&self) -> &RepairTarget {
        &self.target
    }

    pub fn select_sql(&self) -> &str {
        &self.select_sql
    }

    fn has_params(&self) -> bool {
        !(self.like.is_empty() && self.ilike.is_empty())
    }

    /// Stream candidates in key order over a dedicated connection.
    ///
    /// Rows arrive as the server produces them, so memory stays bounded by
    /// what the caller buffers.
    pub fn stream<'a>(
        &'a self,
        conn: &'a mut PgConnection,
    ) -> BoxStream<'a, Result<CandidateRow, sqlx::Error>> {
        let query = sqlx::query_as::<_, CandidateRow>(&self.select_sql);
        if self.has_params() {
            query
                .bind(self.like.clone())
                .bind(self.ilike.clone())
                .fetch(conn)
        } else {
            query.fetch(conn)
        }
    }

    /// Number of rows the stream would yield right now.
    pub async fn count(&self, pool: &PgPool) -> Result<i64, sqlx::Error> {
        let query = sqlx::query_scalar::<_, i64>(&self.count_sql);
        if self.has_params() {
            query
                .bind(self.like.clone())
                .bind(self.ilike.clone())
                .fetch_one(pool)
                .await
        } else {
            query.fetch_one(pool).await
        }
    }
}

// ---------------------------------------------------------------------------
// Writes and single-row reads
// ---------------------------------------------------------------------------

pub struct RepairRepo;

impl RepairRepo {
    /// Write one chunk of fixes in its own transaction.
    ///
    /// A row is only updated while it still holds the value it was read as;
    /// the return value counts rows actually written. On error the
    /// transaction is rolled back and nothing from the chunk persists.
    pub async fn apply_fixes(
        pool: &PgPool,
        target: &RepairTarget,
        rows: &[FixedRow],
    ) -> Result<u64, sqlx::Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let column = quote_identifier(target.column());
        let query = format!(
            "UPDATE {table} AS t
             SET {column} = v.fixed
             FROM UNNEST($1::bigint[], $2::text[], $3::text[]) AS v(pk, original, fixed)
             WHERE t.{pk} = v.pk AND t.{column} = v.original",
            table = quote_identifier(target.table()),
            pk = quote_identifier(target.pk_column()),
        );

        let pks: Vec<RowKey> = rows.iter().map(|r| r.pk).collect();
        let originals: Vec<String> = rows.iter().map(|r| r.original.clone()).collect();
        let fixed: Vec<String> = rows.iter().map(|r| r.fixed.clone()).collect();

        let mut tx = pool.begin().await?;
        let result = sqlx::query(&query)
            .bind(pks)
            .bind(originals)
            .bind(fixed)
            .execute(&mut *tx)
            .await;

        match result {
            Ok(done) => {
                tx.commit().await?;
                Ok(done.rows_affected())
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Chunk rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Current value of one row, or `None` if the key does not exist.
    pub async fn find_row(
        pool: &PgPool,
        target: &RepairTarget,
        pk: RowKey,
    ) -> Result<Option<CandidateRow>, sqlx::Error> {
        let query = format!(
            "SELECT {pk}::bigint AS pk, {column}::text AS text FROM {table} WHERE {pk} = $1",
            pk = quote_identifier(target.pk_column()),
            column = quote_identifier(target.column()),
            table = quote_identifier(target.table()),
        );
        sqlx::query_as::<_, CandidateRow>(&query)
            .bind(pk)
            .fetch_optional(pool)
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
