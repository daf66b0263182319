//! Job Store: durable `id -> Job` mapping behind the [`JobStore`] trait.
//!
//! Two backends ship with the crate:
//!
//! - [`MemoryJobStore`] keeps records in process memory (the default when
//!   no database is configured, and the one tests use).
//! - [`PgJobStore`] persists records in PostgreSQL via `sqlx`.

pub mod memory;
pub mod models;
pub mod pg;
pub mod store;

use sqlx::postgres::PgPoolOptions;

pub use memory::MemoryJobStore;
pub use pg::PgJobStore;
pub use store::{JobStore, StoreError};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Apply the bundled schema migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
