//! # Event Normalizer
//!
//! Decodes the JSON wire shape produced by the upstream WAF filter into
//! [`SecurityEvent`] and [`Classification`]. Unknown fields are ignored
//! and missing fields take zero values.

use crate::model::{Classification, HttpRequest, RuleMatch, SecurityEvent};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// Explicit `null` takes the zero value, like an absent key
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Wire envelope: `{"transaction": {...}, "classification": {...}}`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireEnvelope {
    transaction: Option<WireTransaction>,
    classification: Option<WireClassification>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireTransaction {
    #[serde(deserialize_with = "null_as_default")]
    id: String,
    #[serde(deserialize_with = "null_as_default")]
    client_ip: String,
    #[serde(deserialize_with = "null_as_default")]
    anomaly_score: u32,
    #[serde(deserialize_with = "null_as_default")]
    time_stamp: String,
    request: Option<WireRequest>,
    response: Option<WireResponse>,
    messages: Option<Vec<Option<WireMessage>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireRequest {
    #[serde(deserialize_with = "null_as_default")]
    uri: String,
    #[serde(deserialize_with = "null_as_default")]
    method: String,
    headers: Option<HashMap<String, Option<String>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireResponse {
    #[serde(deserialize_with = "null_as_default")]
    http_code: u16,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireMessage {
    details: Option<WireMessageDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireMessageDetails {
    #[serde(rename = "ruleId", deserialize_with = "null_as_default")]
    rule_id: String,
    #[serde(deserialize_with = "null_as_default")]
    msg: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireClassification {
    #[serde(deserialize_with = "null_as_default")]
    track: String,
    #[serde(deserialize_with = "null_as_default")]
    anomaly_score: u32,
    #[serde(deserialize_with = "null_as_default")]
    rule_id: String,
    #[serde(deserialize_with = "null_as_default")]
    timestamp: String,
}

impl From<WireTransaction> for SecurityEvent {
    fn from(tx: WireTransaction) -> Self {
        let request = tx.request.unwrap_or_default();
        let matched_rules = tx
            .messages
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(|m| m.details)
            .map(|d| RuleMatch {
                rule_id: d.rule_id,
                message: d.msg,
            })
            .collect();

        Self {
            transaction_id: tx.id,
            client_ip: tx.client_ip,
            anomaly_score: tx.anomaly_score,
            timestamp: tx.time_stamp,
            request: HttpRequest {
                method: request.method,
                uri: request.uri,
                headers: request
                    .headers
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(name, value)| (name, value.unwrap_or_default()))
                    .collect(),
            },
            response_code: tx.response.unwrap_or_default().http_code,
            matched_rules,
        }
    }
}

impl From<WireClassification> for Classification {
    fn from(c: WireClassification) -> Self {
        Self {
            track: c.track,
            anomaly_score: c.anomaly_score,
            rule_id: c.rule_id,
            timestamp: c.timestamp,
        }
    }
}

/// Decode failure; the message is dropped by the caller
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Payload is not valid UTF-8: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),

    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,
}

/// Decode raw message bytes into an event and its classification
pub fn decode_event(payload: &[u8]) -> Result<(SecurityEvent, Classification), DecodeError> {
    let text = std::str::from_utf8(payload)?;
    let value: serde_json::Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }

    let envelope: WireEnvelope = serde_json::from_value(value)?;
    let event = SecurityEvent::from(envelope.transaction.unwrap_or_default());
    let classification = Classification::from(envelope.classification.unwrap_or_default());

    Ok((event, classification))
}
