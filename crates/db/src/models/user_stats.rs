//! Maps to the derived `user_stats` table introduced in migration 000002.

use serde::Serialize;
use sqlx::FromRow;

/// Aggregates for one author, computed from `comments`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct UserStats {
    pub username: String,
    pub total_comments: i32,
    pub threads_participated: i32,
    pub first_comment_date: Option<String>,
    pub last_comment_date: Option<String>,
}
