use std::time::Duration;

use chrono::NaiveDateTime;
use rand::Rng;
use storage::{GameType, RoundRecord};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::time;
use crate::traits::PageFetcher;

#[derive(Debug, Clone, Copy)]
pub struct PaginatorOptions {
    pub limit: u32,
    /// Pagination stops once `offset` reaches this value.
    pub max_offset: u32,
    pub pause_min: Duration,
    pub pause_max: Duration,
}

impl Default for PaginatorOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            max_offset: 900,
            pause_min: Duration::from_secs(1),
            pause_max: Duration::from_secs(3),
        }
    }
}

impl PaginatorOptions {
    pub fn without_pause(self) -> Self {
        Self {
            pause_min: Duration::ZERO,
            pause_max: Duration::ZERO,
            ..self
        }
    }
}

/// Why pagination ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// A record matched the stored watermark.
    Watermark,
    /// The feed returned an empty page.
    Exhausted,
    /// The offset cap was reached.
    PageBudget,
    /// A page could not be fetched or contained malformed data.
    Failed(String),
    /// Shutdown was requested while paging.
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Newest first, as served by the feed.
    pub records: Vec<RoundRecord>,
    pub pages: u32,
    pub stop: StopReason,
}

/// Walks the remote history backwards in fixed-size pages until it reaches
/// already-known data.
pub struct FeedPaginator<'a> {
    fetcher: &'a dyn PageFetcher,
    options: PaginatorOptions,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<'a> FeedPaginator<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, options: PaginatorOptions) -> Self {
        Self {
            fetcher,
            options: PaginatorOptions {
                limit: options.limit.max(1),
                ..options
            },
            shutdown: None,
        }
    }

    /// Stops paging as soon as `true` is published on `shutdown`, keeping
    /// whatever was collected.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Collects rounds newer than `watermark`. Failures end pagination early
    /// but keep everything gathered up to that point.
    pub async fn fetch_until_watermark(
        &self,
        game: GameType,
        watermark: Option<NaiveDateTime>,
    ) -> FetchOutcome {
        let limit = self.options.limit;
        let mut records = Vec::new();
        let mut pages = 0;
        let mut offset = 0;

        let finish = |records, pages, stop| FetchOutcome {
            records,
            pages,
            stop,
        };

        while offset < self.options.max_offset {
            if self.shutdown_requested() {
                warn!("{} pagination stopped by user at offset {}", game, offset);
                return finish(records, pages, StopReason::Interrupted);
            }

            let fetched = tokio::select! {
                fetched = self.fetcher.fetch_page(game, limit, offset) => fetched,
                _ = self.wait_for_shutdown() => {
                    warn!("{} pagination stopped by user at offset {}", game, offset);
                    return finish(records, pages, StopReason::Interrupted);
                }
            };
            let page = match fetched {
                Ok(page) => page,
                Err(e) => {
                    error!(
                        "Failed to fetch {} page at offset {} from {}: {}",
                        game,
                        offset,
                        self.fetcher.name(),
                        e
                    );
                    return finish(records, pages, StopReason::Failed(e.to_string()));
                }
            };
            pages += 1;
            debug!("Fetched {} {} rounds at offset {}", page.len(), game, offset);

            if page.is_empty() {
                info!("No more {} history after offset {}", game, offset);
                return finish(records, pages, StopReason::Exhausted);
            }

            for raw in page {
                let start_time = match time::normalize(&raw.start_time) {
                    Ok(civil) => civil.naive(),
                    Err(e) => {
                        error!("Aborting {} pagination on round {}: {}", game, raw.id, e);
                        return finish(records, pages, StopReason::Failed(e.to_string()));
                    }
                };

                if watermark == Some(start_time) {
                    info!("Reached latest stored record.");
                    return finish(records, pages, StopReason::Watermark);
                }

                records.push(RoundRecord {
                    id: raw.id,
                    value: raw.value,
                    start_time,
                });
            }

            offset += limit;
            if offset < self.options.max_offset {
                let pause = self.pause_duration();
                if !pause.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        _ = self.wait_for_shutdown() => {}
                    }
                }
            }
        }

        info!("Page budget reached for {} at offset {}", game, offset);
        finish(records, pages, StopReason::PageBudget)
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once shutdown is requested. Never resolves without a
    /// receiver or after the sender is gone.
    async fn wait_for_shutdown(&self) {
        if let Some(rx) = &self.shutdown {
            let mut rx = rx.clone();
            if rx.wait_for(|stop| *stop).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await
    }

    fn pause_duration(&self) -> Duration {
        let min = self.options.pause_min.as_secs_f64();
        let max = self.options.pause_max.as_secs_f64();
        if max <= min {
            return self.options.pause_min;
        }
        Duration::from_secs_f64(rand::thread_rng().gen_range(min..=max))
    }
}
