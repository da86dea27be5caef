//! ArqonBus wire protocol: the envelope, principal, and CASIL outcome types
//! shared by every crate that speaks the bus protocol.
//!
//! Protocol version 1. Envelopes are JSON over a WebSocket text frame.

pub mod envelope;
pub mod error_codes;
pub mod principal;

pub use envelope::{Envelope, EnvelopeType, ErrorShape};
pub use principal::{Principal, Role};

/// Wire protocol version advertised in the `WELCOME` event.
pub const PROTOCOL_VERSION: &str = "1";

/// Hard transport size ceiling for a single envelope's payload, distinct
/// from CASIL's soft `policies.max_payload_bytes` limit (§4.1 rule 8).
pub const DEFAULT_MAX_TRANSPORT_PAYLOAD_BYTES: usize = 1_048_576; // 1 MiB

/// Default allowed clock skew window for `timestamp` validation (§4.1 rule 4).
pub const DEFAULT_CLOCK_SKEW_MS: u64 = 5 * 60 * 1000;

/// Default opaque-id grammar: ASCII alnum, `_`, `-`, 1-128 chars.
pub const DEFAULT_ID_GRAMMAR: &str = r"^[A-Za-z0-9_-]{1,128}$";

/// Event name sent by the server immediately after a successful handshake.
pub const WELCOME_EVENT: &str = "welcome";

/// CASIL classification and outcome wire types.
pub mod casil {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Kind {
        Control,
        Telemetry,
        Data,
        System,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum RiskLevel {
        Low,
        Medium,
        High,
    }

    /// `(kind, risk_level, flags)` attached to an envelope by CASIL.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Classification {
        pub kind: Kind,
        pub risk_level: RiskLevel,
        pub flags: HashMap<String, bool>,
    }

    impl Classification {
        pub fn new(kind: Kind) -> Self {
            Self {
                kind,
                risk_level: RiskLevel::Low,
                flags: HashMap::new(),
            }
        }

        pub fn flag(&self, name: &str) -> bool {
            self.flags.get(name).copied().unwrap_or(false)
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Decision {
        Allow,
        AllowWithRedaction,
        Block,
    }

    /// The single decision CASIL emits for one envelope.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Outcome {
        pub decision: Decision,
        pub reason_code: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub classification: Option<Classification>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub redacted_payload: Option<serde_json::Value>,
        /// A redacted rendering of the payload safe to hand to logs/telemetry,
        /// independent of whether transport redaction is enabled (§4.5:
        /// "two independent targets — observability ... and transport").
        #[serde(skip_serializing_if = "Option::is_none")]
        pub observability_payload: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub metadata: Option<serde_json::Value>,
    }

    impl Outcome {
        pub fn allow(reason_code: &'static str) -> Self {
            Self {
                decision: Decision::Allow,
                reason_code,
                classification: None,
                redacted_payload: None,
                observability_payload: None,
                metadata: None,
            }
        }

        pub fn block(reason_code: &'static str, classification: Classification) -> Self {
            Self {
                decision: Decision::Block,
                reason_code,
                classification: Some(classification),
                redacted_payload: None,
                observability_payload: None,
                metadata: None,
            }
        }

        pub fn redacted(
            reason_code: &'static str,
            classification: Classification,
            redacted_payload: serde_json::Value,
        ) -> Self {
            Self {
                decision: Decision::AllowWithRedaction,
                reason_code,
                classification: Some(classification),
                redacted_payload: Some(redacted_payload),
                observability_payload: None,
                metadata: None,
            }
        }

        pub fn is_blocked(&self) -> bool {
            self.decision == Decision::Block
        }
    }
}
