//! Non-mutating checks on the archive.

use std::io::Write;

use mojifix_db::repositories::{CommentRepo, PostRepo, UserStatsRepo};
use mojifix_db::DbPool;
use serde::Serialize;

use crate::error::RepairError;

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub server_version: String,
    pub posts: i64,
    pub comments: i64,
    pub user_stats: i64,
}

/// Server version plus row counts of the archive tables.
pub async fn check(pool: &DbPool) -> Result<HealthReport, RepairError> {
    let server_version = mojifix_db::health_check(pool)
        .await
        .map_err(RepairError::Connection)?;
    Ok(HealthReport {
        server_version,
        posts: PostRepo::count(pool).await?,
        comments: CommentRepo::count(pool).await?,
        user_stats: UserStatsRepo::count(pool).await?,
    })
}

/// Write the IDs of posts without comments, one per line. Returns how many
/// were written.
pub async fn write_orphan_post_ids(
    pool: &DbPool,
    out: &mut impl Write,
) -> Result<usize, RepairError> {
    let ids = PostRepo::list_ids_without_comments(pool).await?;
    for id in &ids {
        writeln!(out, "{id}")?;
    }
    out.flush()?;
    tracing::info!(count = ids.len(), "Listed posts without comments");
    Ok(ids.len())
}
