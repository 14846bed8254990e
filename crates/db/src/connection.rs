use std::str::FromStr;
use std::time::Duration;

use ksm_core::config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_from_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

/// Opens a pool with foreign keys, WAL and a busy timeout on every connection.
///
/// File databases are created on first use. An in-memory database lives inside a single
/// connection, so its pool is capped at one connection whatever `max_connections` says.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let in_memory = is_in_memory(database_url);
    let url = if database_url.trim() == ":memory:" { "sqlite::memory:" } else { database_url };
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    let max_connections = if in_memory { 1 } else { max_connections.max(1) };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_with(options)
        .await
}

fn is_in_memory(database_url: &str) -> bool {
    let url = database_url.trim();
    url == ":memory:" || url.starts_with("sqlite::memory:") || url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{connect_from_config, connect_with_settings, is_in_memory};
    use crate::migrations;
    use ksm_core::config::DatabaseConfig;

    #[tokio::test]
    async fn file_database_is_created_on_first_connect() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("ksm.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", path.display()),
            max_connections: 2,
            timeout_secs: 5,
        };

        let pool = connect_from_config(&config).await.expect("connect");
        let foreign_keys: i64 =
            sqlx::query_scalar("PRAGMA foreign_keys").fetch_one(&pool).await.expect("pragma");

        assert_eq!(foreign_keys, 1);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn bare_memory_url_is_accepted() {
        let pool = connect_with_settings(":memory:", 1, 5).await.expect("connect");
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&pool).await.expect("select");
        assert_eq!(one, 1);
    }

    #[tokio::test]
    async fn memory_pool_keeps_one_connection_so_migrations_stay_visible() {
        let pool = connect_with_settings(":memory:", 4, 5).await.expect("connect");
        assert_eq!(pool.options().get_max_connections(), 1);

        migrations::run_pending(&pool).await.expect("run migrations");
        for _ in 0..3 {
            let vendors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vendor")
                .fetch_one(&pool)
                .await
                .expect("vendor table on every acquire");
            assert_eq!(vendors, 0);
        }

        let foreign_keys: i64 =
            sqlx::query_scalar("PRAGMA foreign_keys").fetch_one(&pool).await.expect("pragma");
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn memory_urls_are_recognised() {
        assert!(is_in_memory(":memory:"));
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://file:ksm?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://data/ksm.db"));
    }
}
