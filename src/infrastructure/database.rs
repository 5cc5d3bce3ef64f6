//! SQLite pool shared by the repositories

use di::inject;
use di::injectable;
use log::info;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::env;
use std::ops::Deref;
use std::sync::Mutex;

const DEFAULT_DATABASE_URL: &str = "sqlite://assistant-hub.db?mode=rwc";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

static TEST_POOL: Mutex<Option<SqlitePool>> = Mutex::new(None);

pub struct DatabaseConnection {
    pool: SqlitePool,
}

#[injectable]
impl DatabaseConnection {
    #[inject]
    pub fn create() -> DatabaseConnection {
        if let Some(pool) = TEST_POOL.lock().ok().and_then(|p| p.clone()) {
            return DatabaseConnection { pool };
        }

        dotenvy::dotenv().ok();
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_owned());
        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        info!("using database {url} with up to {max_connections} connections");

        // connect_lazy only fails on a malformed url
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(&url)
            .expect("DATABASE_URL is not a valid sqlite url");

        DatabaseConnection { pool }
    }
}

impl DatabaseConnection {
    pub fn from_pool(pool: SqlitePool) -> DatabaseConnection {
        DatabaseConnection { pool }
    }

    /// Applies `./migrations`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.pool).await
    }

    /// Makes every DI-created connection share `pool` until cleared.
    pub fn set_test_pool(pool: SqlitePool) {
        if let Ok(mut slot) = TEST_POOL.lock() {
            *slot = Some(pool);
        }
    }

    pub fn clear_test_pool() {
        if let Ok(mut slot) = TEST_POOL.lock() {
            *slot = None;
        }
    }
}

impl Deref for DatabaseConnection {
    type Target = SqlitePool;

    fn deref(&self) -> &SqlitePool {
        &self.pool
    }
}
