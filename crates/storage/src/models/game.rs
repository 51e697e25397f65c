use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The games whose round history is tracked.
///
/// Each game owns a relational table (`stake_<game>`) and a flat file
/// (`<game>_data.csv`); the point label names the value column in both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Crash,
    Slide,
}

#[derive(Debug, Error)]
#[error("Unknown game type: '{0}'. Available: crash, slide")]
pub struct ParseGameTypeError(String);

impl GameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crash => "crash",
            Self::Slide => "slide",
        }
    }

    pub fn all() -> &'static [GameType] {
        &[Self::Crash, Self::Slide]
    }

    /// Name of the value column in the relational table and the flat file header.
    pub fn point_label(&self) -> &'static str {
        match self {
            Self::Crash => "crashpoint",
            Self::Slide => "slidepoint",
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Crash => "stake_crash",
            Self::Slide => "stake_slide",
        }
    }

    pub fn data_file_name(&self) -> String {
        format!("{}_data.csv", self.as_str())
    }

    fn parse_str(s: &str) -> Result<Self, ParseGameTypeError> {
        match s.trim().to_lowercase().as_str() {
            "crash" => Ok(Self::Crash),
            "slide" => Ok(Self::Slide),
            _ => Err(ParseGameTypeError(s.to_string())),
        }
    }
}

impl TryFrom<&str> for GameType {
    type Error = ParseGameTypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse_str(value)
    }
}

impl std::str::FromStr for GameType {
    type Err = ParseGameTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl std::fmt::Display for GameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
