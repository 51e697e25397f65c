use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE};
use storage::GameType;
use tracing::debug;

use super::models::{GraphqlRequest, PageVariables, RawRound, parse_page};
use super::spec::GameProfiles;
use crate::traits::PageFetcher;
use crate::{Result, TrackerError};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// GraphQL client for the casino's round history, authenticated with the
/// cookies of an established session.
pub struct StakeClient {
    base_url: String,
    cookie_header: String,
    profiles: GameProfiles,
    client: reqwest::Client,
}

impl StakeClient {
    pub fn new(base_url: impl Into<String>, cookie_header: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cookie_header: cookie_header.into(),
            profiles: GameProfiles::new(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/_api/graphql", self.base_url)
    }
}

#[async_trait::async_trait]
impl PageFetcher for StakeClient {
    async fn fetch_page(&self, game: GameType, limit: u32, offset: u32) -> Result<Vec<RawRound>> {
        let profile = self
            .profiles
            .get(game)
            .ok_or_else(|| TrackerError::Config(format!("No query profile for {}", game)))?;

        let request = GraphqlRequest {
            query: profile.graphql_document(),
            variables: PageVariables { limit, offset },
        };

        debug!("Requesting {} history limit={} offset={}", game, limit, offset);

        let response = self
            .client
            .post(self.endpoint())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/graphql+json, application/json")
            .header(COOKIE, &self.cookie_header)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body = response.json::<serde_json::Value>().await?;
        parse_page(body, profile)
    }

    fn name(&self) -> &'static str {
        "stake-graphql"
    }
}
