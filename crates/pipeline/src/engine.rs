//! Chunked repair of one `table.column`.
//!
//! Rows come from a [`CandidateSource`] in chunks of `batch_size`. Each
//! chunk is fixed in memory and the changed subset goes to a [`RepairSink`]
//! as one write, committed on its own. The next chunk is only read once the
//! previous write has returned, so one chunk is in memory at a time.
//!
//! A failed write is logged and recorded in the report; the pass moves on.
//! Re-running a pass from the start is safe: rows that were already fixed
//! produce no change and are skipped.

use std::future::Future;

use chrono::Utc;
use mojifix_core::error::CoreError;
use mojifix_core::fixer::TextFixer;
use mojifix_core::replacement_map::ReplacementMap;
use mojifix_core::target::{validate_batch_size, RepairTarget, DEFAULT_BATCH_SIZE};
use mojifix_core::types::{RowKey, Timestamp};
use mojifix_db::models::repair::{CandidateRow, FixedRow};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::RepairError;

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Ordered supply of candidate rows for one pass.
pub trait CandidateSource: Send {
    /// Up to `max` further rows; an empty chunk means the scan is exhausted.
    fn next_chunk(
        &mut self,
        max: usize,
    ) -> impl Future<Output = Result<Vec<CandidateRow>, sqlx::Error>> + Send;
}

/// Destination for fixed rows.
pub trait RepairSink: Sync {
    /// Persist one chunk atomically, returning how many rows were written.
    fn write_chunk(
        &self,
        target: &RepairTarget,
        rows: &[FixedRow],
    ) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// A chunk whose write was rolled back.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkFailure {
    /// 1-based chunk number within the pass.
    pub chunk: usize,
    pub first_pk: RowKey,
    pub last_pk: RowKey,
    /// Changed rows that were not written.
    pub rows: usize,
    pub message: String,
}

/// Outcome of one pass.
#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub run_id: Uuid,
    pub table: String,
    pub column: String,
    /// Candidate rows read.
    pub processed: u64,
    /// Rows whose fixed value differed from the stored one.
    pub changed: u64,
    /// Rows written.
    pub updated: u64,
    /// Changed rows skipped because their stored value moved after the read.
    pub stale: u64,
    pub chunks: usize,
    pub failures: Vec<ChunkFailure>,
    /// Stopped by the cancellation token.
    pub cancelled: bool,
    /// Stopped by the chunk limit.
    pub truncated: bool,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
}

impl RepairReport {
    fn new(target: &RepairTarget) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            table: target.table().to_string(),
            column: target.column().to_string(),
            processed: 0,
            changed: 0,
            updated: 0,
            stale: 0,
            chunks: 0,
            failures: Vec::new(),
            cancelled: false,
            truncated: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Changed rows lost to failed chunks.
    pub fn failed_rows(&self) -> u64 {
        self.failures.iter().map(|f| f.rows as u64).sum()
    }

    /// Every candidate was visited and every write succeeded.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && !self.truncated && self.failures.is_empty()
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{}.{}: processed {}, updated {}, stale {}, failed {} in {} chunk(s)",
            self.table,
            self.column,
            self.processed,
            self.updated,
            self.stale,
            self.failed_rows(),
            self.failures.len(),
        );
        if self.cancelled {
            line.push_str(" [cancelled]");
        } else if self.truncated {
            line.push_str(" [stopped at chunk limit]");
        }
        line
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Applies one [`ReplacementMap`] to repair targets chunk by chunk.
#[derive(Debug, Clone)]
pub struct RepairEngine<'m> {
    fixer: TextFixer<'m>,
    batch_size: usize,
    max_batches: Option<usize>,
    cancel: CancellationToken,
}

impl<'m> RepairEngine<'m> {
    pub fn new(map: &'m ReplacementMap) -> Self {
        Self {
            fixer: TextFixer::new(map),
            batch_size: DEFAULT_BATCH_SIZE,
            max_batches: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self, CoreError> {
        validate_batch_size(batch_size)?;
        self.batch_size = batch_size;
        Ok(self)
    }

    /// Stop a pass after `max` chunks.
    pub fn with_max_batches(mut self, max: Option<usize>) -> Self {
        self.max_batches = max;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn map(&self) -> &'m ReplacementMap {
        self.fixer.map()
    }

    /// Run one pass over `target`.
    ///
    /// Only a failing scan aborts the pass. Write failures end up in
    /// [`RepairReport::failures`].
    pub async fn repair<S, W>(
        &self,
        target: &RepairTarget,
        source: &mut S,
        sink: &W,
    ) -> Result<RepairReport, RepairError>
    where
        S: CandidateSource,
        W: RepairSink,
    {
        let mut report = RepairReport::new(target);
        let span = tracing::info_span!(
            "repair",
            run_id = %report.run_id,
            table = target.table(),
            column = target.column(),
        );

        async {
            tracing::info!(batch_size = self.batch_size, "Repair pass started");
            self.run_chunks(target, source, sink, &mut report).await?;
            report.finished_at = Some(Utc::now());
            tracing::info!(
                processed = report.processed,
                updated = report.updated,
                stale = report.stale,
                failed_chunks = report.failures.len(),
                cancelled = report.cancelled,
                "Repair pass finished"
            );
            Ok::<_, RepairError>(report)
        }
        .instrument(span)
        .await
    }

    async fn run_chunks<S, W>(
        &self,
        target: &RepairTarget,
        source: &mut S,
        sink: &W,
        report: &mut RepairReport,
    ) -> Result<(), RepairError>
    where
        S: CandidateSource,
        W: RepairSink,
    {
        loop {
            if self.max_batches.is_some_and(|max| report.chunks >= max) {
                tracing::info!(chunks = report.chunks, "Chunk limit reached");
                report.truncated = true;
                return Ok(());
            }

            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                rows = source.next_chunk(self.batch_size) => Some(rows),
            };
            let Some(rows) = next else {
                tracing::warn!(chunks = report.chunks, "Repair pass cancelled between chunks");
                report.cancelled = true;
                return Ok(());
            };
            let rows = rows.map_err(|source| RepairError::Query {
                table: target.table().to_string(),
                column: target.column().to_string(),
                source,
            })?;

            let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
                return Ok(());
            };
            let (first_pk, last_pk) = (first.pk, last.pk);

            report.chunks += 1;
            let chunk = report.chunks;
            report.processed += rows.len() as u64;

            let fixed = self.fix_chunk(&rows);
            report.changed += fixed.len() as u64;
            if fixed.is_empty() {
                tracing::debug!(chunk, first_pk, last_pk, "Chunk needs no changes");
                continue;
            }

            match sink.write_chunk(target, &fixed).await {
                Ok(written) => {
                    let stale = (fixed.len() as u64).saturating_sub(written);
                    report.updated += written;
                    report.stale += stale;
                    tracing::info!(
                        chunk,
                        first_pk,
                        last_pk,
                        processed = report.processed,
                        updated = report.updated,
                        stale,
                        "Chunk committed"
                    );
                }
                Err(source) => {
                    let err = RepairError::Write {
                        table: target.table().to_string(),
                        column: target.column().to_string(),
                        first_pk,
                        last_pk,
                        source,
                    };
                    tracing::error!(chunk, first_pk, last_pk, error = %err, "Chunk rolled back");
                    report.failures.push(ChunkFailure {
                        chunk,
                        first_pk,
                        last_pk,
                        rows: fixed.len(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    /// Rows of `rows` that the fixer changes. Null values never change.
    pub fn fix_chunk(&self, rows: &[CandidateRow]) -> Vec<FixedRow> {
        rows.iter()
            .filter_map(|row| {
                let original = row.text.as_deref()?;
                let fixed = self.fixer.fix_if_changed(original)?;
                Some(FixedRow {
                    pk: row.pk,
                    original: original.to_string(),
                    fixed,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
