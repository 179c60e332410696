//! Database connection and pool management.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Creates a database connection pool.
///
/// Connections are opened on first use, so an unreachable database does not
/// stop the server from starting. Only a malformed URL fails here.
///
/// # Arguments
/// * `database_url` - PostgreSQL connection string
/// * `acquire_timeout` - How long a query waits for a free connection
pub fn create_pool(database_url: &str, acquire_timeout: Duration) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(acquire_timeout)
        .connect_lazy(database_url)
}

/// Runs all pending migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
