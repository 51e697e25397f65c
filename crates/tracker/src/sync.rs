use std::collections::HashMap;

use chrono::NaiveDateTime;
use storage::{FlatFileStore, GameType, RelationalStore, RoundRecord};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::paginator::{FeedPaginator, PaginatorOptions, StopReason};
use crate::traits::PageFetcher;
use crate::Result;

/// Backend that is authoritative for the watermark during one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSource {
    Relational,
    FlatFile,
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub game: GameType,
    pub source: SyncSource,
    pub watermark: Option<NaiveDateTime>,
    /// Records collected from the feed, duplicates included.
    pub fetched: usize,
    pub relational_written: usize,
    pub file_written: usize,
    /// The flat file was rebuilt from the relational table.
    pub backfilled: bool,
    pub stop: StopReason,
    new_records: usize,
}

impl SyncReport {
    /// Number of new rounds that reached at least one backend.
    pub fn written(&self) -> usize {
        self.new_records
    }
}

/// Brings the stores up to date with the remote feed for one game.
///
/// The relational backend, when present, is the source of truth for the
/// watermark; otherwise the flat file is. The two backends are written
/// independently and a failure in one never blocks the other.
pub struct SyncEngine<'a> {
    fetcher: &'a dyn PageFetcher,
    file: &'a FlatFileStore,
    relational: Option<&'a dyn RelationalStore>,
    options: PaginatorOptions,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        file: &'a FlatFileStore,
        options: PaginatorOptions,
    ) -> Self {
        Self {
            fetcher,
            file,
            relational: None,
            options,
            shutdown: None,
        }
    }

    pub fn with_relational(mut self, store: &'a dyn RelationalStore) -> Self {
        self.relational = Some(store);
        self
    }

    /// An interrupted fetch still persists the rounds gathered before it.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn source(&self) -> SyncSource {
        if self.relational.is_some() {
            SyncSource::Relational
        } else {
            SyncSource::FlatFile
        }
    }

    pub async fn sync(&self, game: GameType) -> Result<SyncReport> {
        let (source, watermark) = self.resolve_watermark(game).await?;
        match watermark {
            Some(ts) => info!("Most recent startTime in {:?} store: {}", source, ts),
            None => info!("No stored {} history yet", game),
        }

        let mut paginator = FeedPaginator::new(self.fetcher, self.options);
        if let Some(shutdown) = &self.shutdown {
            paginator = paginator.with_shutdown(shutdown.clone());
        }
        let outcome = paginator.fetch_until_watermark(game, watermark).await;
        let fetched = outcome.records.len();
        let batch = dedup_by_id(outcome.records);
        info!(
            "Fetched {} {} rounds ({} unique), stopped: {:?}",
            fetched,
            game,
            batch.len(),
            outcome.stop
        );

        let mut report = SyncReport {
            game,
            source,
            watermark,
            fetched,
            relational_written: 0,
            file_written: 0,
            backfilled: false,
            stop: outcome.stop,
            new_records: 0,
        };

        if batch.is_empty() {
            return Ok(report);
        }

        let relational = match source {
            SyncSource::Relational => self.relational,
            SyncSource::FlatFile => None,
        };

        if let Some(store) = relational {
            match store.append(game, &batch).await {
                Ok(written) => {
                    report.relational_written = written;
                    let backfilled = self.backfill_if_missing(store, game, &mut report).await;
                    report.backfilled = backfilled;
                }
                Err(e) => error!("Error inserting {} data into {}: {}", game, store.name(), e),
            }
        }

        if !report.backfilled {
            match self.file.append_records(game, &batch).await {
                Ok(written) => report.file_written = written,
                Err(e) => error!("Failed to append new {} data to flat file: {}", game, e),
            }
        }

        if report.relational_written > 0 || report.file_written > 0 {
            report.new_records = batch.len();
        }
        Ok(report)
    }

    /// Picks the watermark source for this run. A relational read failure
    /// degrades the run to flat-file only.
    async fn resolve_watermark(
        &self,
        game: GameType,
    ) -> Result<(SyncSource, Option<NaiveDateTime>)> {
        if let Some(store) = self.relational {
            match store.latest_start_time(game).await {
                Ok(watermark) => return Ok((SyncSource::Relational, watermark)),
                Err(e) => warn!(
                    "Error fetching most recent {} start time from {}: {}; falling back to flat file",
                    game,
                    store.name(),
                    e
                ),
            }
        }

        let watermark = self.file.latest_start_time(game).await?;
        Ok((SyncSource::FlatFile, watermark))
    }

    /// Rebuilds a missing flat file from the full relational history.
    /// Returns whether the file now holds the batch.
    async fn backfill_if_missing(
        &self,
        store: &dyn RelationalStore,
        game: GameType,
        report: &mut SyncReport,
    ) -> bool {
        match self.file.exists(game).await {
            Ok(true) => return false,
            Ok(false) => {}
            Err(e) => {
                warn!("Cannot check {} flat file: {}", game, e);
                return false;
            }
        }

        info!("No {} flat file yet, exporting full history from {}", game, store.name());
        let history = match store.export_ascending(game).await {
            Ok(history) => history,
            Err(e) => {
                error!("Error exporting {} history: {}", game, e);
                return false;
            }
        };

        match self.file.write_all(game, &history).await {
            Ok(written) => {
                report.file_written = written;
                true
            }
            Err(e) => {
                error!("Error writing {} export: {}", game, e);
                false
            }
        }
    }
}

/// Collapses records sharing an id; the later one wins but keeps the first
/// one's position.
pub fn dedup_by_id(records: Vec<RoundRecord>) -> Vec<RoundRecord> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<RoundRecord> = Vec::with_capacity(records.len());

    for record in records {
        match positions.get(&record.id) {
            Some(&index) => unique[index] = record,
            None => {
                positions.insert(record.id.clone(), unique.len());
                unique.push(record);
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::stake::RawRound;
    use crate::TrackerError;
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate};
    use std::sync::Mutex;
    use storage::{HistoryPoint, RecordStore, StorageError};

    fn utc(minute: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            + Duration::minutes(minute)
    }

    /// July: civil time is UTC-4.
    fn civil(minute: i64) -> NaiveDateTime {
        utc(minute) - Duration::hours(4)
    }

    fn raw(id: &str, minute: i64, value: f64) -> RawRound {
        RawRound {
            id: id.to_string(),
            start_time: utc(minute).format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            value,
            hash: None,
        }
    }

    /// Serves a fixed newest-first list.
    struct ScriptedFeed(Vec<RawRound>);

    #[async_trait]
    impl PageFetcher for ScriptedFeed {
        async fn fetch_page(&self, _: GameType, limit: u32, offset: u32) -> Result<Vec<RawRound>> {
            let start = (offset as usize).min(self.0.len());
            let end = (start + limit as usize).min(self.0.len());
            Ok(self.0[start..end].to_vec())
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<RoundRecord>>,
        fail_reads: bool,
        fail_writes: bool,
    }

    fn backend_down() -> StorageError {
        StorageError::Database(sqlx::Error::PoolTimedOut)
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        fn name(&self) -> &'static str {
            "memory"
        }

        async fn latest_start_time(&self, _: GameType) -> storage::Result<Option<NaiveDateTime>> {
            if self.fail_reads {
                return Err(backend_down());
            }
            Ok(self.rows.lock().unwrap().iter().map(|r| r.start_time).max())
        }

        async fn append(&self, _: GameType, records: &[RoundRecord]) -> storage::Result<usize> {
            if self.fail_writes {
                return Err(backend_down());
            }
            self.rows.lock().unwrap().extend_from_slice(records);
            Ok(records.len())
        }
    }

    #[async_trait]
    impl RelationalStore for MemoryStore {
        async fn export_ascending(&self, _: GameType) -> storage::Result<Vec<HistoryPoint>> {
            let mut points: Vec<HistoryPoint> =
                self.rows.lock().unwrap().iter().map(HistoryPoint::from).collect();
            points.sort_by_key(|p| p.start_time);
            Ok(points)
        }
    }

    fn options() -> PaginatorOptions {
        PaginatorOptions::default().without_pause()
    }

    fn file_lines(file: &FlatFileStore, game: GameType) -> Vec<String> {
        std::fs::read_to_string(file.path(game))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_dedup_last_write_wins() {
        let records = vec![
            RoundRecord { id: "a".into(), value: 1.0, start_time: civil(3) },
            RoundRecord { id: "b".into(), value: 2.0, start_time: civil(2) },
            RoundRecord { id: "a".into(), value: 9.0, start_time: civil(3) },
        ];

        let unique = dedup_by_id(records);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].id, "a");
        assert_eq!(unique[0].value, 9.0);
        assert_eq!(unique[1].id, "b");
    }

    #[tokio::test]
    async fn test_flat_file_mode_is_incremental() {
        let dir = tempfile::tempdir().unwrap();
        let file = FlatFileStore::new(dir.path());

        let first = ScriptedFeed(vec![raw("r2", 2, 3.0), raw("r1", 1, 1.5), raw("r0", 0, 2.0)]);
        let report = SyncEngine::new(&first, &file, options())
            .sync(GameType::Crash)
            .await
            .unwrap();
        assert_eq!(report.source, SyncSource::FlatFile);
        assert_eq!(report.written(), 3);

        let second = ScriptedFeed(vec![
            raw("r4", 4, 10.0),
            raw("r3", 3, 4.0),
            raw("r2", 2, 3.0),
            raw("r1", 1, 1.5),
        ]);
        let report = SyncEngine::new(&second, &file, options())
            .sync(GameType::Crash)
            .await
            .unwrap();
        assert_eq!(report.watermark, Some(civil(2)));
        assert_eq!(report.stop, StopReason::Watermark);
        assert_eq!(report.written(), 2);

        let lines = file_lines(&file, GameType::Crash);
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "crashpoint,startTime");
        assert_eq!(lines[1], "2.0,2024-07-01T08:00:00");
        assert_eq!(lines[5], "10.0,2024-07-01T08:04:00");
    }

    #[tokio::test]
    async fn test_relational_mode_backfills_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = FlatFileStore::new(dir.path());
        let store = MemoryStore::default();
        store.rows.lock().unwrap().extend([
            RoundRecord { id: "old1".into(), value: 1.1, start_time: civil(-2) },
            RoundRecord { id: "old0".into(), value: 5.0, start_time: civil(-1) },
        ]);

        let feed = ScriptedFeed(vec![raw("n1", 1, 7.0), raw("n0", 0, 1.2), raw("old0", -1, 5.0)]);
        let report = SyncEngine::new(&feed, &file, options())
            .with_relational(&store)
            .sync(GameType::Slide)
            .await
            .unwrap();

        assert_eq!(report.source, SyncSource::Relational);
        assert!(report.backfilled);
        assert_eq!(report.relational_written, 2);
        assert_eq!(report.file_written, 4);
        assert_eq!(report.written(), 2);

        let lines = file_lines(&file, GameType::Slide);
        assert_eq!(lines.len(), 4 + 1);
        assert_eq!(lines[0], "slidepoint,startTime");
        assert_eq!(lines[1], "1.1,2024-07-01T07:58:00");
        assert_eq!(lines[4], "7.0,2024-07-01T08:01:00");
    }

    #[tokio::test]
    async fn test_relational_mode_appends_when_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let file = FlatFileStore::new(dir.path());
        let store = MemoryStore::default();
        store.rows.lock().unwrap().push(RoundRecord {
            id: "old0".into(),
            value: 5.0,
            start_time: civil(-1),
        });
        std::fs::write(
            file.path(GameType::Crash),
            "crashpoint,startTime\n5,2024-07-01T07:59:00\n",
        )
        .unwrap();

        let feed = ScriptedFeed(vec![raw("n0", 0, 1.2), raw("old0", -1, 5.0)]);
        let report = SyncEngine::new(&feed, &file, options())
            .with_relational(&store)
            .sync(GameType::Crash)
            .await
            .unwrap();

        assert!(!report.backfilled);
        assert_eq!(report.file_written, 1);
        assert_eq!(file_lines(&file, GameType::Crash).len(), 3);
    }

    #[tokio::test]
    async fn test_relational_write_failure_still_appends_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = FlatFileStore::new(dir.path());
        let store = MemoryStore {
            fail_writes: true,
            ..Default::default()
        };

        let feed = ScriptedFeed(vec![raw("n1", 1, 3.0), raw("n0", 0, 1.0)]);
        let report = SyncEngine::new(&feed, &file, options())
            .with_relational(&store)
            .sync(GameType::Crash)
            .await
            .unwrap();

        assert_eq!(report.relational_written, 0);
        assert!(!report.backfilled);
        assert_eq!(report.file_written, 2);
        assert_eq!(report.written(), 2);
    }

    #[tokio::test]
    async fn test_relational_read_failure_degrades_to_flat_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = FlatFileStore::new(dir.path());
        std::fs::write(
            file.path(GameType::Crash),
            "crashpoint,startTime\n2,2024-07-01T08:00:00\n",
        )
        .unwrap();
        let store = MemoryStore {
            fail_reads: true,
            ..Default::default()
        };

        let feed = ScriptedFeed(vec![raw("n1", 1, 3.0), raw("r0", 0, 2.0)]);
        let report = SyncEngine::new(&feed, &file, options())
            .with_relational(&store)
            .sync(GameType::Crash)
            .await
            .unwrap();

        assert_eq!(report.source, SyncSource::FlatFile);
        assert_eq!(report.watermark, Some(civil(0)));
        assert!(store.rows.lock().unwrap().is_empty());
        assert_eq!(report.file_written, 1);
    }

    #[tokio::test]
    async fn test_empty_fetch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = FlatFileStore::new(dir.path());

        let feed = ScriptedFeed(Vec::new());
        let report = SyncEngine::new(&feed, &file, options())
            .sync(GameType::Slide)
            .await
            .unwrap();

        assert_eq!(report.stop, StopReason::Exhausted);
        assert_eq!(report.written(), 0);
        assert!(!file.exists(GameType::Slide).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_failure_persists_partial_batch() {
        struct Flaky;

        #[async_trait]
        impl PageFetcher for Flaky {
            async fn fetch_page(&self, _: GameType, _: u32, offset: u32) -> Result<Vec<RawRound>> {
                if offset == 0 {
                    Ok(vec![raw("n1", 1, 3.0), raw("n0", 0, 1.0)])
                } else {
                    Err(TrackerError::Remote("timeout".to_string()))
                }
            }

            fn name(&self) -> &'static str {
                "flaky"
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let file = FlatFileStore::new(dir.path());
        let options = PaginatorOptions {
            limit: 2,
            ..options()
        };

        let report = SyncEngine::new(&Flaky, &file, options)
            .sync(GameType::Crash)
            .await
            .unwrap();

        assert!(matches!(report.stop, StopReason::Failed(_)));
        assert_eq!(report.written(), 2);
        assert_eq!(file_lines(&file, GameType::Crash).len(), 3);
    }

    #[tokio::test]
    async fn test_interrupted_fetch_persists_partial_batch() {
        struct Interrupting {
            stop: watch::Sender<bool>,
        }

        #[async_trait]
        impl PageFetcher for Interrupting {
            async fn fetch_page(&self, _: GameType, _: u32, offset: u32) -> Result<Vec<RawRound>> {
                if offset == 0 {
                    return Ok(vec![raw("n1", 1, 3.0), raw("n0", 0, 1.0)]);
                }
                self.stop.send_replace(true);
                std::future::pending().await
            }

            fn name(&self) -> &'static str {
                "interrupting"
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let file = FlatFileStore::new(dir.path());
        let store = MemoryStore::default();
        let (stop, shutdown) = watch::channel(false);
        let feed = Interrupting { stop };
        let options = PaginatorOptions {
            limit: 2,
            ..options()
        };

        let report = SyncEngine::new(&feed, &file, options)
            .with_relational(&store)
            .with_shutdown(shutdown)
            .sync(GameType::Crash)
            .await
            .unwrap();

        assert_eq!(report.stop, StopReason::Interrupted);
        assert_eq!(report.written(), 2);
        assert_eq!(store.rows.lock().unwrap().len(), 2);
        assert_eq!(file_lines(&file, GameType::Crash).len(), 3);
    }
}
