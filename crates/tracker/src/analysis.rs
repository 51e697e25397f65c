use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use serde_json::{Map, Value, json};
use storage::models::FILE_TIME_FORMAT;
use storage::{GameType, HistoryPoint};
use tracing::info;

use crate::Result;

/// Maximum number of entries kept in a report.
pub const REPORT_CAP: usize = 500;

/// Maximum number of entries echoed to the log.
const LISTING_CAP: usize = 501;

pub const DEFAULT_THRESHOLDS: &[f64] = &[
    9.0, 19.0, 29.0, 59.0, 99.0, 199.0, 299.0, 499.0, 799.0, 999.0, 1299.0, 1499.0, 1999.0,
    2499.0, 2999.0, 3999.0, 4999.0, 6999.0, 9999.0, 12999.0, 14999.0, 19999.0, 22999.0, 24999.0,
    29999.0, 34999.0, 39999.0, 49999.0, 59999.0, 69999.0, 79999.0, 99999.0, 119999.0, 149999.0,
    199999.0, 249999.0, 299999.0,
];

/// A round above the threshold and its distance to the next newer one.
#[derive(Debug, Clone, PartialEq)]
pub struct HighPointEntry {
    pub value: f64,
    pub start_time: NaiveDateTime,
    /// Index distance, in the full newest-first history, to the previous
    /// qualifying round. Zero for the newest one.
    pub records_since_previous: usize,
    pub time_since_previous: Duration,
}

#[derive(Debug, Clone)]
pub struct HighPointReport {
    pub threshold: f64,
    pub total_records: usize,
    pub total_high: usize,
    /// Newest first, at most [`REPORT_CAP`] long.
    pub entries: Vec<HighPointEntry>,
    /// Rounds from the newest qualifying one to the present, counting it.
    pub records_since_latest: Option<usize>,
    pub time_since_latest: Option<Duration>,
}

pub struct HighPointAnalyzer;

impl HighPointAnalyzer {
    pub fn analyze(history: &[HistoryPoint], threshold: f64, now: NaiveDateTime) -> HighPointReport {
        let mut sorted: Vec<&HistoryPoint> = history.iter().collect();
        sorted.sort_by(|a, b| b.start_time.cmp(&a.start_time));

        let mut entries = Vec::new();
        let mut total_high = 0;
        let mut previous: Option<(usize, NaiveDateTime)> = None;
        let mut latest_index = None;

        for (index, point) in sorted.iter().enumerate() {
            if point.value <= threshold {
                continue;
            }

            let (records_since_previous, time_since_previous) = match previous {
                Some((prev_index, prev_time)) => (index - prev_index, prev_time - point.start_time),
                None => (0, Duration::zero()),
            };

            total_high += 1;
            latest_index.get_or_insert(index);
            previous = Some((index, point.start_time));

            if entries.len() < REPORT_CAP {
                entries.push(HighPointEntry {
                    value: point.value,
                    start_time: point.start_time,
                    records_since_previous,
                    time_since_previous,
                });
            }
        }

        HighPointReport {
            threshold,
            total_records: sorted.len(),
            total_high,
            time_since_latest: entries.first().map(|e| now - e.start_time),
            records_since_latest: latest_index.map(|index| index + 1),
            entries,
        }
    }
}

impl HighPointReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn log(&self, game: GameType) {
        let (Some(records), Some(elapsed)) = (self.records_since_latest, self.time_since_latest)
        else {
            info!("No records over threshold {}", self.threshold);
            return;
        };

        let label = capitalize(game.point_label());
        info!(
            "High {}s (>{}): {} | RecordsSinceLatest: {} | TimeSinceLatest: {}",
            label,
            self.threshold,
            self.total_high,
            records,
            format_gap(elapsed)
        );

        for entry in self.entries.iter().take(LISTING_CAP) {
            info!(
                "{}: {} At Time: {} | RecordsSincePrevious: {} | TimeSincePrevious: {}",
                label,
                entry.value,
                entry.start_time.format(FILE_TIME_FORMAT),
                entry.records_since_previous,
                format_gap(entry.time_since_previous)
            );
        }
    }

    pub fn to_json(&self, game: GameType) -> Value {
        let entries: Vec<Value> = self
            .entries
            .iter()
            .map(|entry| {
                let mut object = Map::new();
                object.insert(game.point_label().to_string(), json!(entry.value));
                object.insert(
                    "startTime".to_string(),
                    json!(entry.start_time.format(FILE_TIME_FORMAT).to_string()),
                );
                object.insert(
                    "records_since_previous".to_string(),
                    json!(entry.records_since_previous),
                );
                object.insert(
                    "time_since_previous".to_string(),
                    json!(format_gap(entry.time_since_previous)),
                );
                Value::Object(object)
            })
            .collect();

        Value::Array(entries)
    }

    pub fn file_name(threshold: f64, game: GameType) -> String {
        format!("over{}{}.json", threshold, game)
    }

    /// Overwrites `over<threshold><game>.json` in `dir`.
    pub async fn write_json(&self, dir: &Path, game: GameType) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(Self::file_name(self.threshold, game));
        let json = serde_json::to_string_pretty(&self.to_json(game))?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }
}

/// Renders a duration as `H:MM:SS`, prefixed with `N day(s), ` past 24 hours.
pub fn format_gap(gap: Duration) -> String {
    let total = gap.num_seconds();
    let (sign, total) = if total < 0 { ("-", -total) } else { ("", total) };

    let days = total / 86_400;
    let rest = total % 86_400;
    let clock = format!("{}:{:02}:{:02}", rest / 3600, (rest % 3600) / 60, rest % 60);

    match days {
        0 => format!("{}{}", sign, clock),
        1 => format!("{}1 day, {}", sign, clock),
        n => format!("{}{} days, {}", sign, n, clock),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
