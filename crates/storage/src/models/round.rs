use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Timestamp layout used by the flat file (`YYYY-MM-DDTHH:MM:SS`).
pub const FILE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One round outcome as fetched from the remote feed.
///
/// `start_time` is local civil time with second precision. It is the ordering
/// key across runs; `id` only identifies a round inside a single batch and in
/// the relational table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub id: String,
    pub value: f64,
    pub start_time: NaiveDateTime,
}

/// A persisted `(value, start_time)` pair: one flat-file row or one row of a
/// relational export.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, FromRow)]
pub struct HistoryPoint {
    pub value: f64,
    pub start_time: NaiveDateTime,
}

impl From<&RoundRecord> for HistoryPoint {
    fn from(record: &RoundRecord) -> Self {
        Self {
            value: record.value,
            start_time: record.start_time,
        }
    }
}
