//! Repository for the derived `user_stats` table.

use sqlx::PgPool;

use crate::models::user_stats::UserStats;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "username, total_comments, threads_participated, \
    first_comment_date, last_comment_date";

pub struct UserStatsRepo;

impl UserStatsRepo {
    /// Replace every row with aggregates recomputed from `comments`.
    ///
    /// Clearing and refilling happen in one transaction, so readers see
    /// either the old table or the complete new one. Returns the number of
    /// authors written.
    pub async fn rebuild(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM user_stats")
            .execute(&mut *tx)
            .await?;

        let inserted = sqlx::query(
            "INSERT INTO user_stats
                 (username, total_comments, threads_participated,
                  first_comment_date, last_comment_date)
             SELECT author,
                    COUNT(*)::int,
                    COUNT(DISTINCT post_id)::int,
                    MIN(comment_date),
                    MAX(comment_date)
             FROM comments
             WHERE author IS NOT NULL
             GROUP BY author",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(inserted)
    }

    /// Look up one author's aggregates.
    pub async fn find_by_username(
        pool: &PgPool,
        username: &str,
    ) -> Result<Option<UserStats>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM user_stats WHERE username = $1");
        sqlx::query_as::<_, UserStats>(&query)
            .bind(username)
            .fetch_optional(pool)
            .await
    }

    /// Most active authors first.
    pub async fn list_top(pool: &PgPool, limit: i64) -> Result<Vec<UserStats>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_stats
             ORDER BY total_comments DESC, username
             LIMIT $1"
        );
        sqlx::query_as::<_, UserStats>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM user_stats")
            .fetch_one(pool)
            .await
    }
}
