pub mod error;
pub mod flat_file;
pub mod models;
pub mod repository;
pub mod store;

pub use error::{Result, StorageError};
pub use flat_file::{FlatFileStore, LoadRetry};
pub use models::{GameType, HistoryPoint, RoundRecord};
pub use repository::RoundRepository;
pub use store::{RecordStore, RelationalStore};

use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

pub struct Database;

impl Database {
    /// Connect to PostgreSQL and bring the round tables up to date.
    pub async fn connect(database_url: &str) -> Result<PgPool> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Database initialized successfully");
        Ok(pool)
    }
}
