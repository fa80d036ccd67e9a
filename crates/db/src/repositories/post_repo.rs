//! Repository for the `posts` table.

use mojifix_core::types::DbId;
use sqlx::PgPool;

use crate::models::post::{CreatePost, Post};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, title, timestamp, wayback_url, original_url";

/// Read access to archived posts, plus inserts for seeding.
pub struct PostRepo;

impl PostRepo {
    /// Insert a post, returning the created row.
    pub async fn create(pool: &PgPool, body: &CreatePost) -> Result<Post, sqlx::Error> {
        let query = format!(
            "INSERT INTO posts (title, timestamp, wayback_url, original_url)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Post>(&query)
            .bind(&body.title)
            .bind(&body.timestamp)
            .bind(&body.wayback_url)
            .bind(&body.original_url)
            .fetch_one(pool)
            .await
    }

    /// Find a single post by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Post>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM posts WHERE id = $1");
        sqlx::query_as::<_, Post>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// IDs of posts with no comments at all, ascending.
    pub async fn list_ids_without_comments(pool: &PgPool) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT p.id FROM posts p
             WHERE NOT EXISTS (SELECT 1 FROM comments c WHERE c.post_id = p.id)
             ORDER BY p.id",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts")
            .fetch_one(pool)
            .await
    }
}
