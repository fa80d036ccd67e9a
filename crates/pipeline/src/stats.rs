//! Rebuild of the derived `user_stats` table.
//!
//! Must follow any pass that rewrote `comments.author`: a repaired name can
//! merge authors that were previously split by different corruptions, so
//! the old rows cannot be patched in place.

use mojifix_db::repositories::UserStatsRepo;
use mojifix_db::DbPool;
use serde::Serialize;

use crate::error::RepairError;

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Distinct authors written.
    pub authors: u64,
}

pub struct UserStatsRebuilder {
    pool: DbPool,
}

impl UserStatsRebuilder {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Recompute every row from `comments` in one transaction.
    pub async fn rebuild(&self) -> Result<StatsReport, RepairError> {
        tracing::info!("Rebuilding user_stats");
        let authors = UserStatsRepo::rebuild(&self.pool).await.map_err(|e| {
            tracing::error!(error = %e, "user_stats rebuild rolled back");
            RepairError::Database(e)
        })?;
        tracing::info!(authors, "user_stats rebuilt");
        Ok(StatsReport { authors })
    }
}
