//! Maps to the `posts` table introduced in migration 000001.

use mojifix_core::types::DbId;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `posts` table. `timestamp` is stored as scraped text.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Post {
    pub id: DbId,
    pub title: String,
    pub timestamp: String,
    pub wayback_url: Option<String>,
    pub original_url: Option<String>,
}

/// DTO for inserting a post.
#[derive(Debug, Deserialize)]
pub struct CreatePost {
    pub title: String,
    pub timestamp: String,
    pub wayback_url: Option<String>,
    pub original_url: Option<String>,
}
