use chrono::Local;
use sqlx::PgPool;
use storage::{FlatFileStore, GameType, RoundRepository};
use tokio::sync::watch;
use tracing::{Instrument, error, info, info_span, warn};

use crate::analysis::HighPointAnalyzer;
use crate::config::TrackerConfig;
use crate::session::{Session, SessionProvider};
use crate::sources::stake::StakeClient;
use crate::paginator::StopReason;
use crate::sync::{SyncEngine, SyncReport};
use crate::traits::PageFetcher;
use crate::Result;

/// Turns an open session into a page fetcher for the remote feed.
pub trait FeedConnector: Send + Sync {
    fn connect(&self, session: &dyn Session) -> Result<Box<dyn PageFetcher>>;
}

pub struct StakeConnector {
    base_url: String,
}

impl StakeConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl FeedConnector for StakeConnector {
    fn connect(&self, session: &dyn Session) -> Result<Box<dyn PageFetcher>> {
        let client = StakeClient::new(self.base_url.clone(), session.cookie_header())?;
        Ok(Box::new(client))
    }
}

/// Everything a game run needs, passed explicitly.
pub struct RunContext<'a> {
    pub config: &'a TrackerConfig,
    pub pool: Option<&'a PgPool>,
    pub sessions: &'a dyn SessionProvider,
    pub connector: &'a dyn FeedConnector,
    /// Flips to `true` when the user asks to stop.
    pub shutdown: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct GameSummary {
    pub game: GameType,
    /// `None` when the session could not be opened or sync failed.
    pub sync: Option<SyncReport>,
    pub interrupted: bool,
    pub history_len: usize,
    pub reports_written: usize,
}

impl<'a> RunContext<'a> {
    /// Runs the given games one after another. Games not yet started when
    /// shutdown is requested are skipped.
    pub async fn run(&self, games: &[GameType]) -> Vec<GameSummary> {
        let mut summaries = Vec::with_capacity(games.len());
        for &game in games {
            if self.shutdown_requested() {
                warn!("Skipping {} after interruption", game);
                continue;
            }
            summaries.push(self.run_game(game).await);
        }
        summaries
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sync then analyse one game. Failures in either phase are logged; the
    /// analysis always runs on whatever history is on disk.
    pub async fn run_game(&self, game: GameType) -> GameSummary {
        let span = info_span!("game", game = %game);
        async move {
            info!("Starting {} process...", game);
            let file = FlatFileStore::new(&self.config.data_dir).with_retry(self.config.load_retry);

            let sync = self.sync_in_session(game, &file).await;
            if let Some(report) = &sync {
                info!("Persisted {} new {} rounds", report.written(), game);
            }
            let interrupted = sync
                .as_ref()
                .is_some_and(|report| report.stop == StopReason::Interrupted)
                || self.shutdown_requested();

            let history = match file.load_all(game).await {
                Ok(history) => history,
                Err(e) => {
                    error!("Cannot load {} history for analysis: {}", game, e);
                    Vec::new()
                }
            };

            let now = Local::now().naive_local();
            let mut reports_written = 0;
            for &threshold in &self.config.thresholds {
                let report = HighPointAnalyzer::analyze(&history, threshold, now);
                report.log(game);
                match report.write_json(&self.config.data_dir, game).await {
                    Ok(_) => reports_written += 1,
                    Err(e) => error!("Failed to write report over {}: {}", threshold, e),
                }
            }

            info!("Stopping {} process...", game);
            GameSummary {
                game,
                sync,
                interrupted,
                history_len: history.len(),
                reports_written,
            }
        }
        .instrument(span)
        .await
    }

    /// Holds the session for the duration of the sync and closes it on every
    /// path. Interruption ends pagination early but the partial batch is still
    /// persisted before the session closes.
    async fn sync_in_session(&self, game: GameType, file: &FlatFileStore) -> Option<SyncReport> {
        let mut session = match self.sessions.acquire(game).await {
            Ok(session) => session,
            Err(e) => {
                error!("Cannot open session for {}: {}", game, e);
                return None;
            }
        };

        let result = self.sync_once(game, file, session.as_ref()).await;

        if let Err(e) = session.close().await {
            error!("Error while closing session: {}", e);
        }

        match result {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Error in {} sync: {}", game, e);
                None
            }
        }
    }

    async fn sync_once(
        &self,
        game: GameType,
        file: &FlatFileStore,
        session: &dyn Session,
    ) -> Result<SyncReport> {
        let fetcher = self.connector.connect(session)?;
        let repository = self
            .pool
            .filter(|_| self.config.use_database)
            .map(RoundRepository::new);

        let mut engine = SyncEngine::new(fetcher.as_ref(), file, self.config.paginator)
            .with_shutdown(self.shutdown.clone());
        if let Some(repository) = repository.as_ref() {
            engine = engine.with_relational(repository);
        }

        engine.sync(game).await
    }
}
