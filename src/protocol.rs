//! Envelope protocol spoken over the activity socket.
//!
//! Outbound frames are subscribe/unsubscribe requests, each carrying a fresh
//! nonce. Inbound frames are either `response` acknowledgements or `message`
//! notifications; only notifications on [`ACTIVITIES_TOPIC`] carry activities.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::classifier::{numeric_value, tier_code};
use crate::types::{ActivityEvent, ActivityKind};
use crate::{ACTIVITIES_TOPIC, TOKEN_TYPE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Subscribe,
    Unsubscribe,
}

/// Outbound request envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    #[serde(rename = "type")]
    pub kind: RequestType,
    pub nonce: Uuid,
    pub data: RequestData,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestData {
    pub topic: String,
    pub token: String,
    pub token_type: &'static str,
}

impl Request {
    fn new(kind: RequestType, topic: &str, token: &str) -> Self {
        Self {
            kind,
            nonce: Uuid::new_v4(),
            data: RequestData {
                topic: topic.to_string(),
                token: token.to_string(),
                token_type: TOKEN_TYPE,
            },
        }
    }

    pub fn subscribe(topic: &str, token: &str) -> Self {
        Self::new(RequestType::Subscribe, topic, token)
    }

    pub fn unsubscribe(topic: &str, token: &str) -> Self {
        Self::new(RequestType::Unsubscribe, topic, token)
    }

    /// Serialize to the JSON text frame sent on the socket.
    pub fn to_text(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialize request envelope")
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Acknowledgement of a subscribe/unsubscribe request.
    Response {
        nonce: Option<String>,
        error: Option<String>,
        data: Value,
    },
    /// A viewer activity on the activities topic.
    Activity(ActivityEvent),
    /// Anything else: other topics or envelope types.
    Ignored {
        kind: String,
        topic: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    nonce: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct RawActivity {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<RawActivityData>,
}

#[derive(Debug, Default, Deserialize)]
struct RawActivityData {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    tier: Value,
    #[serde(default)]
    amount: Value,
}

impl From<RawActivity> for ActivityEvent {
    fn from(raw: RawActivity) -> Self {
        let data = raw.data.unwrap_or_default();
        ActivityEvent {
            kind: ActivityKind::from_wire(&raw.kind),
            username: data.username,
            tier: tier_code(&data.tier),
            amount: numeric_value(&data.amount),
        }
    }
}

/// Decode one inbound text frame.
///
/// Errors only when the frame is not a JSON envelope, or when an activities
/// notification does not contain an activity object.
pub fn decode(text: &str) -> Result<Inbound> {
    let envelope: RawEnvelope =
        serde_json::from_str(text).context("frame is not a valid envelope")?;

    match (envelope.kind.as_str(), envelope.topic.as_deref()) {
        ("response", _) => Ok(Inbound::Response {
            nonce: envelope.nonce,
            error: envelope.error,
            data: envelope.data,
        }),
        ("message", Some(ACTIVITIES_TOPIC)) => {
            let raw: RawActivity = serde_json::from_value(envelope.data)
                .context("activities message without an activity payload")?;
            Ok(Inbound::Activity(raw.into()))
        }
        _ => Ok(Inbound::Ignored {
            kind: envelope.kind,
            topic: envelope.topic,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    // ── Request ────────────────────────────────────────────────────

    #[test]
    fn subscribe_envelope_shape() {
        let req = Request::subscribe(ACTIVITIES_TOPIC, "secret");
        let value: Value = serde_json::from_str(&req.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "subscribe");
        assert_eq!(value["data"]["topic"], "channel.activities");
        assert_eq!(value["data"]["token"], "secret");
        assert_eq!(value["data"]["token_type"], "jwt");
        assert_eq!(value["nonce"], req.nonce.to_string());
    }

    #[test]
    fn unsubscribe_envelope_shape() {
        let req = Request::unsubscribe(ACTIVITIES_TOPIC, "secret");
        let value: Value = serde_json::from_str(&req.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "unsubscribe");
        assert_eq!(value["data"]["topic"], "channel.activities");
    }

    #[test]
    fn every_request_gets_a_fresh_nonce() {
        let a = Request::subscribe(ACTIVITIES_TOPIC, "t");
        let b = Request::subscribe(ACTIVITIES_TOPIC, "t");
        assert_ne!(a.nonce, b.nonce);
    }

    // ── decode ─────────────────────────────────────────────────────

    #[test]
    fn decodes_response() {
        let frame = json!({
            "type": "response",
            "nonce": "abc",
            "data": {"message": "successfully subscribed to topic"}
        });
        match decode(&frame.to_string()).unwrap() {
            Inbound::Response { nonce, error, data } => {
                assert_eq!(nonce.as_deref(), Some("abc"));
                assert!(error.is_none());
                assert_eq!(data["message"], "successfully subscribed to topic");
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn decodes_response_error() {
        let frame = json!({"type": "response", "error": "err_unauthorized", "data": {}});
        match decode(&frame.to_string()).unwrap() {
            Inbound::Response { error, .. } => {
                assert_eq!(error.as_deref(), Some("err_unauthorized"));
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn decodes_subscription_activity() {
        let frame = json!({
            "type": "message",
            "topic": "channel.activities",
            "data": {
                "type": "subscriber",
                "data": {"username": "alice", "tier": "2000", "amount": 3}
            }
        });
        let Inbound::Activity(event) = decode(&frame.to_string()).unwrap() else {
            panic!("expected activity");
        };
        assert_eq!(event.kind, ActivityKind::Subscription);
        assert_eq!(event.username.as_deref(), Some("alice"));
        assert_eq!(event.tier, Some(2000));
        assert_eq!(event.amount, Some(dec!(3)));
    }

    #[test]
    fn activity_without_inner_data_has_no_amount() {
        let frame = json!({
            "type": "message",
            "topic": "channel.activities",
            "data": {"type": "follow"}
        });
        let Inbound::Activity(event) = decode(&frame.to_string()).unwrap() else {
            panic!("expected activity");
        };
        assert_eq!(event.kind, ActivityKind::Follow);
        assert!(event.username.is_none());
        assert!(event.amount.is_none());
    }

    #[test]
    fn other_topics_are_ignored() {
        let frame = json!({"type": "message", "topic": "channel.chat", "data": {}});
        assert_eq!(
            decode(&frame.to_string()).unwrap(),
            Inbound::Ignored {
                kind: "message".to_string(),
                topic: Some("channel.chat".to_string()),
            }
        );
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(decode("not json").is_err());
        assert!(decode(r#"{"topic": "channel.activities"}"#).is_err());
        assert!(decode(r#"{"type": "message", "topic": "channel.activities", "data": 5}"#).is_err());
    }
}
