use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::spec::GameProfile;
use crate::{Result, TrackerError};

#[derive(Debug, Serialize, Clone)]
pub struct GraphqlRequest {
    pub query: String,
    pub variables: PageVariables,
}

#[derive(Debug, Serialize, Clone, Copy)]
pub struct PageVariables {
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

/// A round as returned by the feed, before timestamp normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRound {
    pub id: String,
    /// GMT text, e.g. `Sun, 10 Mar 2024 06:59:59 GMT`
    pub start_time: String,
    pub value: f64,
    /// Provenance sub-object, carried through untouched.
    pub hash: Option<Value>,
}

impl RawRound {
    fn from_json(item: &Value, profile: &GameProfile) -> Result<Self> {
        let id = item
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| TrackerError::MalformedRecord(format!("missing id in {}", item)))?;

        let start_time = item
            .get("startTime")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                TrackerError::MalformedRecord(format!("round {} has no startTime", id))
            })?;

        let value = match item.get(profile.value_field) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            TrackerError::MalformedRecord(format!(
                "round {} has no numeric {}",
                id, profile.value_field
            ))
        })?;

        Ok(Self {
            id: id.to_string(),
            start_time: start_time.to_string(),
            value,
            hash: item.get("hash").cloned(),
        })
    }
}

/// Extracts the round list for `profile` from a GraphQL response body.
pub fn parse_page(body: Value, profile: &GameProfile) -> Result<Vec<RawRound>> {
    let response: GraphqlResponse = serde_json::from_value(body)?;

    if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
        return Err(TrackerError::Remote(messages.join("; ")));
    }

    let data = response
        .data
        .ok_or_else(|| TrackerError::Remote("response has no data".to_string()))?;

    let items = match data.get(profile.query_name) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(other) => {
            return Err(TrackerError::Remote(format!(
                "{} is not a list: {}",
                profile.query_name, other
            )));
        }
    };

    items
        .iter()
        .map(|item| RawRound::from_json(item, profile))
        .collect()
}
