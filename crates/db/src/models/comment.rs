//! Maps to the `comments` table introduced in migration 000001.

use mojifix_core::types::DbId;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `comments` table. Date, time and number are kept as the
/// scraped text.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Comment {
    pub id: DbId,
    pub post_id: DbId,
    pub author: String,
    pub comment_date: Option<String>,
    pub comment_time: Option<String>,
    pub comment_number: Option<String>,
    pub content: String,
}

/// DTO for inserting a comment.
#[derive(Debug, Deserialize)]
pub struct CreateComment {
    pub post_id: DbId,
    pub author: String,
    pub comment_date: Option<String>,
    pub comment_time: Option<String>,
    pub comment_number: Option<String>,
    pub content: String,
}
