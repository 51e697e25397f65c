use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{GameType, HistoryPoint, RoundRecord};
use crate::store::{RecordStore, RelationalStore};

/// Repository for the per-game `stake_<game>` tables.
///
/// Table and column names come from [`GameType`], so queries are built at
/// runtime rather than checked by `query!`.
pub struct RoundRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> RoundRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Most recent start time, descending order, limit 1
    pub async fn latest_start_time(&self, game: GameType) -> Result<Option<NaiveDateTime>> {
        let sql = format!(
            "SELECT start_time FROM {} ORDER BY start_time DESC LIMIT 1",
            game.table_name()
        );

        let latest = sqlx::query_scalar::<_, NaiveDateTime>(&sql)
            .fetch_optional(self.pool)
            .await?;

        Ok(latest)
    }

    /// Insert a batch of rounds in a single transaction
    pub async fn insert_batch(&self, game: GameType, records: &[RoundRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "INSERT INTO {} (hash_id, {}, start_time) VALUES ($1, $2, $3)",
            game.table_name(),
            game.point_label()
        );

        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(&sql)
                .bind(&record.id)
                .bind(record.value)
                .bind(record.start_time)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(
            "Inserted {} new records into {}",
            records.len(),
            game.table_name()
        );
        Ok(records.len())
    }

    /// Full table scan ordered by start time ascending
    pub async fn export_ascending(&self, game: GameType) -> Result<Vec<HistoryPoint>> {
        let sql = format!(
            "SELECT {} AS value, start_time FROM {} ORDER BY start_time ASC",
            game.point_label(),
            game.table_name()
        );

        let rows = sqlx::query_as::<_, HistoryPoint>(&sql)
            .fetch_all(self.pool)
            .await?;

        debug!("Exported {} rows from {}", rows.len(), game.table_name());
        Ok(rows)
    }
}

#[async_trait]
impl<'a> RecordStore for RoundRepository<'a> {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn latest_start_time(&self, game: GameType) -> Result<Option<NaiveDateTime>> {
        RoundRepository::latest_start_time(self, game).await
    }

    async fn append(&self, game: GameType, records: &[RoundRecord]) -> Result<usize> {
        self.insert_batch(game, records).await
    }
}

#[async_trait]
impl<'a> RelationalStore for RoundRepository<'a> {
    async fn export_ascending(&self, game: GameType) -> Result<Vec<HistoryPoint>> {
        RoundRepository::export_ascending(self, game).await
    }
}
