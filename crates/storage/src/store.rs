use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::Result;
use crate::models::{GameType, HistoryPoint, RoundRecord};

/// Common surface of the two persistence backends.
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start time of the newest persisted round, `None` when nothing is stored.
    async fn latest_start_time(&self, game: GameType) -> Result<Option<NaiveDateTime>>;

    /// Persists a batch and returns how many rows were written.
    async fn append(&self, game: GameType, records: &[RoundRecord]) -> Result<usize>;
}

/// A backend that can also hand back its whole history, oldest first.
#[async_trait]
pub trait RelationalStore: RecordStore {
    async fn export_ascending(&self, game: GameType) -> Result<Vec<HistoryPoint>>;
}
