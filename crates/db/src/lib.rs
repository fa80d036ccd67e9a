//! PostgreSQL access for the forum archive: connections, migrations, row
//! models and repositories.

use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, PgConnection};

pub mod models;
pub mod repositories;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

/// Pool used only for repair writes. One connection, so chunk commits are
/// serialised and never share a session with the read stream.
pub async fn create_write_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(1)
        .connect(database_url)
        .await
}

/// Open a dedicated connection, outside any pool, for a long-lived read
/// stream.
pub async fn connect(database_url: &str) -> Result<PgConnection, sqlx::Error> {
    PgConnection::connect(database_url).await
}

/// Verify the database answers and return its version string.
pub async fn health_check(pool: &DbPool) -> Result<String, sqlx::Error> {
    let (version,): (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(version)
}

/// Apply pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}
