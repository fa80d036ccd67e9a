//! PostgreSQL implementations of the engine's seams.
//!
//! A pass holds two independent sessions: a dedicated connection carrying
//! the candidate stream for the whole pass, and a one-connection pool that
//! commits chunk writes. Commits therefore never disturb the open read.

use futures::stream::BoxStream;
use futures::TryStreamExt;
use mojifix_core::scan::CandidateFilter;
use mojifix_core::target::RepairTarget;
use mojifix_db::models::repair::{CandidateRow, FixedRow};
use mojifix_db::repositories::{CandidateQuery, RepairRepo};
use mojifix_db::DbPool;
use sqlx::PgConnection;

use crate::engine::{CandidateSource, RepairEngine, RepairReport, RepairSink};
use crate::error::RepairError;

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// The sessions a repair run needs.
pub struct Connections {
    /// Counts, previews, stats rebuilds.
    pub pool: DbPool,
    /// Long-lived candidate stream.
    pub read: PgConnection,
    /// Chunk writes.
    pub write: DbPool,
}

impl Connections {
    pub async fn open(database_url: &str) -> Result<Self, RepairError> {
        let pool = mojifix_db::create_pool(database_url)
            .await
            .map_err(RepairError::Connection)?;
        let read = mojifix_db::connect(database_url)
            .await
            .map_err(RepairError::Connection)?;
        let write = mojifix_db::create_write_pool(database_url)
            .await
            .map_err(RepairError::Connection)?;
        tracing::debug!("Opened read connection and write pool");
        Ok(Self { pool, read, write })
    }
}

// ---------------------------------------------------------------------------
// Source and sink
// ---------------------------------------------------------------------------

/// Candidate rows pulled from a streaming SELECT.
pub struct PgCandidateSource<'a> {
    stream: BoxStream<'a, Result<CandidateRow, sqlx::Error>>,
}

impl<'a> PgCandidateSource<'a> {
    pub fn new(query: &'a CandidateQuery, conn: &'a mut PgConnection) -> Self {
        Self {
            stream: query.stream(conn),
        }
    }
}

impl CandidateSource for PgCandidateSource<'_> {
    async fn next_chunk(&mut self, max: usize) -> Result<Vec<CandidateRow>, sqlx::Error> {
        let mut chunk = Vec::with_capacity(max);
        while chunk.len() < max {
            match self.stream.try_next().await? {
                Some(row) => chunk.push(row),
                None => break,
            }
        }
        Ok(chunk)
    }
}

/// Writes chunks through [`RepairRepo::apply_fixes`].
pub struct PgRepairSink {
    pool: DbPool,
}

impl PgRepairSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl RepairSink for PgRepairSink {
    async fn write_chunk(&self, target: &RepairTarget, rows: &[FixedRow]) -> Result<u64, sqlx::Error> {
        RepairRepo::apply_fixes(&self.pool, target, rows).await
    }
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

/// Count the rows a pass over `target` would visit.
pub async fn count_candidates(
    pool: &DbPool,
    target: &RepairTarget,
    filter: &CandidateFilter,
) -> Result<i64, RepairError> {
    CandidateQuery::new(target, filter)
        .count(pool)
        .await
        .map_err(|source| RepairError::Query {
            table: target.table().to_string(),
            column: target.column().to_string(),
            source,
        })
}

/// Run one full pass of `engine` over `target` against PostgreSQL.
pub async fn repair_pass(
    conns: &mut Connections,
    engine: &RepairEngine<'_>,
    target: &RepairTarget,
    filter: &CandidateFilter,
) -> Result<RepairReport, RepairError> {
    let query = CandidateQuery::new(target, filter);
    let mut source = PgCandidateSource::new(&query, &mut conns.read);
    let sink = PgRepairSink::new(conns.write.clone());
    engine.repair(target, &mut source, &sink).await
}
