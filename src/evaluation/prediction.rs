//! Prediction Log Decoding
//!
//! One tab-separated line per answered recommendation request:
//!
//! ```text
//! [0] type  [1] messageID  [2] timestamp  [3] responseTime
//! [4] itemID  [5] userID  [6] domainID  [7] {"recs":{"ints":{"3":[id, ...]}}}
//! ```
//!
//! Only the list under the configured key (default `"3"`) is evaluated, and
//! only its first `max_recommendations` entries.

use crate::evaluation::events::{
    DomainId, ItemId, Millis, PredictionCandidate, UserId, UNKNOWN_USER,
};
use crate::evaluation::timestamp::{parse_timestamp_field, TimestampError};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Recommendations evaluated per record; more would reward recommending everything.
pub const MAX_NUMBER_OF_RECOMMENDATIONS: usize = 3;

/// Key of the recommended-item list inside `recs.ints`.
pub const DEFAULT_RECOMMENDATION_KEY: &str = "3";

const COL_MESSAGE_ID: usize = 1;
const COL_TIMESTAMP: usize = 2;
const COL_RESPONSE_TIME: usize = 3;
const COL_ITEM_ID: usize = 4;
const COL_USER_ID: usize = 5;
const COL_DOMAIN_ID: usize = 6;
const COL_PAYLOAD: usize = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum PredictionParseError {
    MissingField { field: &'static str, column: usize },
    InvalidNumber { field: &'static str, value: String },
    InvalidTimestamp(TimestampError),
    InvalidPayload { message: String },
}

impl fmt::Display for PredictionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field, column } => {
                write!(f, "missing field {} (column {})", field, column)
            }
            Self::InvalidNumber { field, value } => {
                write!(f, "invalid {}: {:?}", field, value)
            }
            Self::InvalidTimestamp(e) => write!(f, "invalid timestamp: {}", e),
            Self::InvalidPayload { message } => {
                write!(f, "invalid recommendation payload: {}", message)
            }
        }
    }
}

impl std::error::Error for PredictionParseError {}

impl From<TimestampError> for PredictionParseError {
    fn from(e: TimestampError) -> Self {
        Self::InvalidTimestamp(e)
    }
}

#[derive(Debug, Deserialize)]
struct Payload {
    recs: Recs,
}

#[derive(Debug, Deserialize)]
struct Recs {
    ints: HashMap<String, Value>,
}

/// Leading fields of a prediction line, decoded before the rest of the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictionHeader {
    pub message_id: i64,
    pub timestamp: Millis,
    pub response_time_ms: i64,
}

impl PredictionHeader {
    pub fn parse(fields: &[&str]) -> Result<Self, PredictionParseError> {
        let message_id = parse_i64(required(fields, COL_MESSAGE_ID, "messageID")?, "messageID")?;
        let timestamp = parse_timestamp_field(required(fields, COL_TIMESTAMP, "timestamp")?)?;
        let response_time_ms = parse_i64(
            required(fields, COL_RESPONSE_TIME, "responseTime")?,
            "responseTime",
        )?;
        Ok(Self {
            message_id,
            timestamp,
            response_time_ms,
        })
    }
}

/// A decoded prediction line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionRecord {
    pub message_id: i64,
    pub timestamp: Millis,
    pub response_time_ms: i64,
    /// Item the request was made on, if present.
    pub request_item_id: Option<ItemId>,
    pub user_id: UserId,
    pub domain_id: DomainId,
    /// Recommended items in answer order. Empty if the key was absent.
    pub recommendations: Vec<ItemId>,
}

impl PredictionRecord {
    /// Comment, blank and too-short lines carry no record.
    pub fn is_skippable(line: &str) -> bool {
        line.len() < 2 || line.starts_with('#')
    }

    pub fn split_fields(line: &str) -> Vec<&str> {
        line.split('\t').collect()
    }

    /// Decode one line. `recommendation_key` selects the list under `recs.ints`.
    pub fn parse(line: &str, recommendation_key: &str) -> Result<Self, PredictionParseError> {
        let fields = Self::split_fields(line);
        let header = PredictionHeader::parse(&fields)?;
        Self::from_header(header, &fields, recommendation_key)
    }

    /// Decode the fields following an already parsed header.
    pub fn from_header(
        header: PredictionHeader,
        fields: &[&str],
        recommendation_key: &str,
    ) -> Result<Self, PredictionParseError> {
        let request_item_id = fields.get(COL_ITEM_ID).and_then(|s| s.trim().parse().ok());
        let user_id = fields
            .get(COL_USER_ID)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(UNKNOWN_USER);
        let domain_id = parse_i64(required(fields, COL_DOMAIN_ID, "domainID")?, "domainID")?;
        let recommendations = parse_recommendations(
            required(fields, COL_PAYLOAD, "recommendations")?,
            recommendation_key,
        )?;

        Ok(Self {
            message_id: header.message_id,
            timestamp: header.timestamp,
            response_time_ms: header.response_time_ms,
            request_item_id,
            user_id,
            domain_id,
            recommendations,
        })
    }

    /// Candidates for the first `max` recommended items.
    pub fn candidates(&self, max: usize) -> impl Iterator<Item = PredictionCandidate> + '_ {
        self.recommendations
            .iter()
            .take(max)
            .map(move |&item_id| {
                PredictionCandidate::new(self.user_id, item_id, self.domain_id, self.timestamp)
            })
    }
}

fn required<'a>(
    fields: &[&'a str],
    column: usize,
    name: &'static str,
) -> Result<&'a str, PredictionParseError> {
    fields
        .get(column)
        .map(|s| s.trim())
        .ok_or(PredictionParseError::MissingField {
            field: name,
            column,
        })
}

fn parse_i64(value: &str, field: &'static str) -> Result<i64, PredictionParseError> {
    value.parse().map_err(|_| PredictionParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn parse_recommendations(payload: &str, key: &str) -> Result<Vec<ItemId>, PredictionParseError> {
    let payload: Payload =
        serde_json::from_str(payload).map_err(|e| PredictionParseError::InvalidPayload {
            message: e.to_string(),
        })?;

    let list = match payload.recs.ints.get(key) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(list)) => list,
        Some(other) => {
            return Err(PredictionParseError::InvalidPayload {
                message: format!("recs.ints.{} is not a list: {}", key, other),
            })
        }
    };

    list.iter()
        .map(|v| {
            let parsed = match v {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            };
            parsed.ok_or_else(|| PredictionParseError::InvalidNumber {
                field: "recommended itemID",
                value: v.to_string(),
            })
        })
        .collect()
}
