use crate::Result;
use crate::sources::stake::RawRound;
use storage::GameType;

/// One page of the remote round history, newest first.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, game: GameType, limit: u32, offset: u32) -> Result<Vec<RawRound>>;

    fn name(&self) -> &'static str;
}
