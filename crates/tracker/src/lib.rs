pub mod analysis;
pub mod config;
pub mod error;
pub mod paginator;
pub mod runner;
pub mod session;
pub mod sources;
pub mod sync;
pub mod time;
pub mod traits;

pub use analysis::{HighPointAnalyzer, HighPointEntry, HighPointReport};
pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use paginator::{FeedPaginator, FetchOutcome, PaginatorOptions, StopReason};
pub use runner::{FeedConnector, GameSummary, RunContext, StakeConnector};
pub use session::{CookieSessionProvider, CookieSource, Session, SessionProvider};
pub use sync::{SyncEngine, SyncReport, SyncSource};
pub use traits::PageFetcher;
