use std::path::PathBuf;

use storage::LoadRetry;

use crate::analysis::DEFAULT_THRESHOLDS;
use crate::paginator::PaginatorOptions;
use crate::session::CookieSource;
use crate::{Result, TrackerError};

pub const DEFAULT_BASE_URL: &str = "https://stake.us";

/// Settings shared by every game run in one invocation.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub base_url: String,
    pub data_dir: PathBuf,
    pub cookies: CookieSource,
    /// Relational mode: the database is the watermark source and receives
    /// every batch.
    pub use_database: bool,
    /// Ascending cutoffs, each analysed independently.
    pub thresholds: Vec<f64>,
    pub paginator: PaginatorOptions,
    pub load_retry: LoadRetry,
}

impl TrackerConfig {
    pub fn new(data_dir: impl Into<PathBuf>, cookies: CookieSource) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            data_dir: data_dir.into(),
            cookies,
            use_database: false,
            thresholds: DEFAULT_THRESHOLDS.to_vec(),
            paginator: PaginatorOptions::default(),
            load_retry: LoadRetry::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: Vec<f64>) -> Result<Self> {
        self.thresholds = normalize_thresholds(thresholds)?;
        Ok(self)
    }
}

/// Sorts ascending and drops duplicates; rejects non-finite cutoffs.
pub fn normalize_thresholds(mut thresholds: Vec<f64>) -> Result<Vec<f64>> {
    if let Some(bad) = thresholds.iter().find(|t| !t.is_finite()) {
        return Err(TrackerError::Config(format!("invalid threshold {}", bad)));
    }
    if thresholds.is_empty() {
        return Ok(DEFAULT_THRESHOLDS.to_vec());
    }

    thresholds.sort_by(f64::total_cmp);
    thresholds.dedup();
    Ok(thresholds)
}
