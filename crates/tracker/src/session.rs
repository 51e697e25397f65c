use std::path::PathBuf;

use storage::GameType;
use tracing::{info, warn};

use crate::sources::stake::GameProfiles;
use crate::{Result, TrackerError};

/// An authenticated browsing session whose cookies back the feed requests.
///
/// Callers must `close` it on every exit path; dropping an open session only
/// logs a warning.
#[async_trait::async_trait]
pub trait Session: Send + Sync {
    fn cookie_header(&self) -> String;

    async fn close(&mut self) -> Result<()>;
}

#[async_trait::async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self, game: GameType) -> Result<Box<dyn Session>>;
}

#[derive(Debug, Clone)]
pub enum CookieSource {
    /// `name=value; name2=value2`
    Inline(String),
    /// A file holding the same format, typically exported from a browser.
    File(PathBuf),
}

/// Provides sessions from cookies captured out of band.
pub struct CookieSessionProvider {
    source: CookieSource,
    base_url: String,
    profiles: GameProfiles,
}

impl CookieSessionProvider {
    pub fn new(source: CookieSource, base_url: impl Into<String>) -> Self {
        Self {
            source,
            base_url: base_url.into(),
            profiles: GameProfiles::new(),
        }
    }

    /// Game page the session is opened on.
    pub fn page_url(&self, game: GameType) -> Result<String> {
        let profile = self
            .profiles
            .get(game)
            .ok_or_else(|| TrackerError::Config(format!("No query profile for {}", game)))?;
        Ok(format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            profile.page_path()
        ))
    }

    async fn load_cookie_text(&self) -> Result<String> {
        match &self.source {
            CookieSource::Inline(text) => Ok(text.clone()),
            CookieSource::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                TrackerError::Session(format!("cannot read {}: {}", path.display(), e))
            }),
        }
    }
}

#[async_trait::async_trait]
impl SessionProvider for CookieSessionProvider {
    async fn acquire(&self, game: GameType) -> Result<Box<dyn Session>> {
        let text = self.load_cookie_text().await?;
        let cookies = parse_cookies(&text)?;
        let page_url = self.page_url(game)?;

        info!("Session ready for {} with {} cookies", page_url, cookies.len());
        Ok(Box::new(CookieSession {
            page_url,
            cookies,
            closed: false,
        }))
    }
}

pub struct CookieSession {
    page_url: String,
    cookies: Vec<(String, String)>,
    closed: bool,
}

#[async_trait::async_trait]
impl Session for CookieSession {
    fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.cookies.clear();
        self.closed = true;
        info!("Session for {} closed", self.page_url);
        Ok(())
    }
}

impl Drop for CookieSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Session for {} dropped without being closed", self.page_url);
        }
    }
}

/// Parses `name=value; name2=value2`, skipping empty segments.
pub fn parse_cookies(text: &str) -> Result<Vec<(String, String)>> {
    let mut cookies = Vec::new();

    for segment in text.trim().split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let (name, value) = segment
            .split_once('=')
            .ok_or_else(|| TrackerError::Session(format!("bad cookie segment '{}'", segment)))?;
        let name = name.trim();
        if name.is_empty() || value.chars().any(char::is_control) {
            return Err(TrackerError::Session(format!(
                "bad cookie segment '{}'",
                segment
            )));
        }

        cookies.push((name.to_string(), value.trim().to_string()));
    }

    if cookies.is_empty() {
        return Err(TrackerError::Session("no session cookies provided".to_string()));
    }

    Ok(cookies)
}
