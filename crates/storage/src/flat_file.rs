use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use crate::error::{Result, StorageError};
use crate::models::{FILE_TIME_FORMAT, GameType, HistoryPoint, RoundRecord};

/// Retry policy for reading a history file back in.
#[derive(Debug, Clone, Copy)]
pub struct LoadRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for LoadRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(10),
        }
    }
}

/// Append-only two-column history file per game: `<label>,startTime`.
///
/// Rows are always kept ascending by start time. A file that exists but is
/// empty is treated like a missing one when reading.
#[derive(Debug, Clone)]
pub struct FlatFileStore {
    dir: PathBuf,
    retry: LoadRetry,
}

impl FlatFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            retry: LoadRetry::default(),
        }
    }

    pub fn with_retry(mut self, retry: LoadRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn path(&self, game: GameType) -> PathBuf {
        self.dir.join(game.data_file_name())
    }

    pub async fn exists(&self, game: GameType) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path(game)).await?)
    }

    /// Start time on the last data row, `None` for a missing or header-only file.
    pub async fn latest_start_time(&self, game: GameType) -> Result<Option<NaiveDateTime>> {
        let path = self.path(game);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let lines: Vec<&str> = content.lines().collect();
        if lines.len() < 2 {
            return Ok(None);
        }

        let Some((index, last)) = lines
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .find(|(_, line)| !line.trim().is_empty())
        else {
            return Ok(None);
        };

        let point = parse_row(last, index + 1)?;
        Ok(Some(point.start_time))
    }

    /// Appends a batch sorted ascending, writing the header first when the
    /// file is new or empty.
    pub async fn append_records(&self, game: GameType, records: &[RoundRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut points: Vec<HistoryPoint> = records.iter().map(HistoryPoint::from).collect();
        points.sort_by_key(|p| p.start_time);

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path(game);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let mut buffer = String::new();
        if file.metadata().await?.len() == 0 {
            buffer.push_str(&header(game));
        }
        for point in &points {
            buffer.push_str(&format_row(point));
        }

        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;

        info!("Appended {} new records to {}", points.len(), path.display());
        Ok(points.len())
    }

    /// Replaces the file with a header plus every given row.
    pub async fn write_all(&self, game: GameType, points: &[HistoryPoint]) -> Result<usize> {
        let mut sorted = points.to_vec();
        sorted.sort_by_key(|p| p.start_time);

        let mut buffer = header(game);
        for point in &sorted {
            buffer.push_str(&format_row(point));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path(game);
        tokio::fs::write(&path, buffer).await?;

        info!("Data exported successfully to {}", path.display());
        Ok(sorted.len())
    }

    /// Loads the whole history, keyed by start time (a later row with the same
    /// start time replaces an earlier one). Read failures are retried with a
    /// fixed delay up to the configured number of attempts.
    pub async fn load_all(&self, game: GameType) -> Result<Vec<HistoryPoint>> {
        let path = self.path(game);
        let attempts = self.retry.attempts.max(1);

        let mut attempt = 1;
        loop {
            match self.try_load(&path).await {
                Ok(points) => return Ok(points),
                Err(e) if attempt >= attempts => {
                    return Err(StorageError::LoadExhausted {
                        attempts,
                        last: e.to_string(),
                    });
                }
                Err(e) => {
                    error!(
                        "Error loading {} (attempt {}/{}): {}. Retrying after {:?}",
                        path.display(),
                        attempt,
                        attempts,
                        e,
                        self.retry.delay
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn try_load(&self, path: &Path) -> Result<Vec<HistoryPoint>> {
        if !tokio::fs::try_exists(path).await? {
            warn!("No history file at {}", path.display());
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let mut by_time: BTreeMap<NaiveDateTime, HistoryPoint> = BTreeMap::new();

        for (index, line) in content.lines().enumerate().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let point = parse_row(line, index + 1)?;
            by_time.insert(point.start_time, point);
        }

        Ok(by_time.into_values().collect())
    }
}

fn header(game: GameType) -> String {
    format!("{},startTime\n", game.point_label())
}

/// Whole values keep their `.0` so rows read `2.0`, not `2`.
fn format_row(point: &HistoryPoint) -> String {
    format!(
        "{:?},{}\n",
        point.value,
        point.start_time.format(FILE_TIME_FORMAT)
    )
}

fn parse_row(line: &str, line_no: usize) -> Result<HistoryPoint> {
    let invalid = |reason: String| StorageError::InvalidRow {
        line: line_no,
        reason,
    };

    let (value, start_time) = line
        .trim()
        .split_once(',')
        .ok_or_else(|| invalid(format!("expected two columns, got '{}'", line)))?;

    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| invalid(format!("bad value '{}': {}", value, e)))?;
    let start_time = NaiveDateTime::parse_from_str(start_time.trim(), FILE_TIME_FORMAT)
        .map_err(|e| invalid(format!("bad startTime '{}': {}", start_time, e)))?;

    Ok(HistoryPoint { value, start_time })
}
