use once_cell::sync::OnceCell;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;

static DB_POOL: OnceCell<DatabaseConnection> = OnceCell::new();

/// Returns the global connection pool.
/// Panics if `init_db` has not completed.
pub fn get_db_pool() -> &'static DatabaseConnection {
    DB_POOL
        .get()
        .expect("Database pool accessed before init_db() was called.")
}

/// Returns the global connection pool if it has been initialized.
pub fn try_get_db_pool() -> Option<&'static DatabaseConnection> {
    DB_POOL.get()
}

pub async fn init_db(database_url: String) {
    let mut options = ConnectOptions::new(database_url);
    options
        .max_connections(20)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .sqlx_logging(false);

    let pool = Database::connect(options)
        .await
        .expect("Failed to connect to the database.");

    if DB_POOL.set(pool).is_err() {
        log::warn!("init_db() called more than once; keeping the first pool.");
    }
}
