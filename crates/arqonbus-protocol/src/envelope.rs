use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error_codes;

/// The outermost wire object carrying a single logical message or command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub r#type: EnvelopeType,
    pub version: String,
    /// Milliseconds since the Unix epoch (UTC).
    pub timestamp: u64,
    pub from_client: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl Envelope {
    /// `room:channel` scope key, or a synthetic one for direct messages
    /// (§4.5 step 2). Used by both the router and CASIL's scope matcher.
    pub fn scope_key(&self) -> String {
        match (&self.room, &self.channel) {
            (Some(room), Some(channel)) => format!("{room}:{channel}"),
            (Some(room), None) => format!("{room}:*"),
            (None, _) => format!("_direct:{}", self.to_client.as_deref().unwrap_or("*")),
        }
    }

    /// True if metadata explicitly requests echo-to-sender (§4.4 rule 4).
    pub fn wants_echo(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("echo"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn payload_len(&self) -> usize {
        self.payload
            .as_ref()
            .map(|p| serde_json::to_string(p).map(|s| s.len()).unwrap_or(0))
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeType {
    Message,
    Command,
    Response,
    Telemetry,
    Error,
    Event,
}

/// A machine-readable error paired with a human message, used both for
/// envelope-level rejections and command responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ErrorShape {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retryable: None,
            retry_after_ms: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn retryable_after(mut self, ms: u64) -> Self {
        self.retryable = Some(true);
        self.retry_after_ms = Some(ms);
        self
    }

    /// Build the `type=error` response envelope sent back to the
    /// originating session (§4.1: "errors... do not enter CASIL or routing").
    pub fn into_envelope(self, request_id: &str, from_client: &str) -> Envelope {
        Envelope {
            id: format!("{request_id}:error"),
            r#type: EnvelopeType::Error,
            version: crate::PROTOCOL_VERSION.to_string(),
            timestamp: arqonbus_common::time::now_ms(),
            from_client: from_client.to_string(),
            to_client: Some(from_client.to_string()),
            room: None,
            channel: None,
            command: None,
            args: None,
            payload: Some(serde_json::json!({
                "code": self.code,
                "message": self.message,
                "details": self.details,
            })),
            metadata: None,
            correlation_id: Some(request_id.to_string()),
            tenant_id: None,
        }
    }
}

impl std::fmt::Display for ErrorShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorShape {}

/// Validate the mutual-exclusivity target rule (§3 invariant, §4.1 rule 5):
/// a data message must name exactly one of `to_client`/`channel`/`room` as
/// its primary target. `channel` implies its parent `room`, so
/// `(room, channel)` together count as the single channel target.
pub fn validate_targets(env: &Envelope) -> Result<(), ErrorShape> {
    if env.r#type != EnvelopeType::Message {
        return Ok(());
    }
    if env.channel.is_some() && env.room.is_none() {
        return Err(ErrorShape::new(
            error_codes::TARGET_ERROR,
            "message envelope sets channel without its parent room",
        ));
    }
    let targets = [
        env.to_client.is_some(),
        env.channel.is_some(),
        env.room.is_some() && env.channel.is_none(),
    ];
    let count = targets.iter().filter(|t| **t).count();
    match count {
        1 => Ok(()),
        0 => Err(ErrorShape::new(
            error_codes::TARGET_ERROR,
            "message envelope must set exactly one of to_client, room, or channel",
        )),
        _ => Err(ErrorShape::new(
            error_codes::TARGET_ERROR,
            "message envelope must set exactly one target",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Envelope {
        Envelope {
            id: "msg_1".into(),
            r#type: EnvelopeType::Message,
            version: "1".into(),
            timestamp: 0,
            from_client: "alice".into(),
            to_client: None,
            room: None,
            channel: None,
            command: None,
            args: None,
            payload: None,
            metadata: None,
            correlation_id: None,
            tenant_id: None,
        }
    }

    #[test]
    fn scope_key_room_channel() {
        let mut e = base();
        e.room = Some("ops".into());
        e.channel = Some("events".into());
        assert_eq!(e.scope_key(), "ops:events");
    }

    #[test]
    fn scope_key_direct() {
        let mut e = base();
        e.to_client = Some("bob".into());
        assert_eq!(e.scope_key(), "_direct:bob");
    }

    #[test]
    fn targets_reject_zero() {
        let e = base();
        assert!(validate_targets(&e).is_err());
    }

    #[test]
    fn targets_reject_multiple() {
        let mut e = base();
        e.to_client = Some("bob".into());
        e.room = Some("ops".into());
        assert!(validate_targets(&e).is_err());
    }

    #[test]
    fn targets_accept_channel_with_room() {
        let mut e = base();
        e.room = Some("ops".into());
        e.channel = Some("events".into());
        assert!(validate_targets(&e).is_ok());
    }

    #[test]
    fn targets_reject_channel_without_room() {
        let mut e = base();
        e.channel = Some("events".into());
        assert!(validate_targets(&e).is_err());
    }

    #[test]
    fn targets_accept_direct_only() {
        let mut e = base();
        e.to_client = Some("bob".into());
        assert!(validate_targets(&e).is_ok());
    }

    #[test]
    fn non_message_types_skip_target_check() {
        let mut e = base();
        e.r#type = EnvelopeType::Command;
        assert!(validate_targets(&e).is_ok());
    }

    #[test]
    fn wants_echo_defaults_false() {
        let e = base();
        assert!(!e.wants_echo());
    }

    #[test]
    fn wants_echo_reads_metadata() {
        let mut e = base();
        let mut m = Map::new();
        m.insert("echo".into(), Value::Bool(true));
        e.metadata = Some(m);
        assert!(e.wants_echo());
    }
}
