//! Config schema: server, validation, CASIL, history, and registry sections.

use serde::{Deserialize, Serialize};

/// Top-level immutable config snapshot, produced once at startup (§6:
/// "reloads require process restart in v1").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArqonConfig {
    pub server: ServerConfig,
    pub validation: ValidationConfig,
    pub registry: RegistryConfig,
    pub rooms: RoomsConfig,
    pub casil: CasilConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub accept_limit: usize,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_miss_threshold: u32,
    /// Max inbound messages per connection per `rate_limit_window_ms`.
    pub rate_limit_messages: u32,
    pub rate_limit_window_ms: u64,
    /// Bounded processing-time budget per inbound operation (§5).
    pub operation_timeout_ms: u64,
    /// Writer-task drain grace period on connection close (§5).
    pub close_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".into(),
            port: 8780,
            accept_limit: 10_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_miss_threshold: 3,
            rate_limit_messages: 200,
            rate_limit_window_ms: 1_000,
            operation_timeout_ms: 5_000,
            close_grace_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub clock_skew_ms: u64,
    pub max_transport_payload_bytes: usize,
    pub id_grammar: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            clock_skew_ms: arqonbus_protocol::DEFAULT_CLOCK_SKEW_MS,
            max_transport_payload_bytes: arqonbus_protocol::DEFAULT_MAX_TRANSPORT_PAYLOAD_BYTES,
            id_grammar: arqonbus_protocol::DEFAULT_ID_GRAMMAR.to_string(),
        }
    }
}

/// Behavior when a second `register` arrives for a live `client_id`
/// (resolves spec §9 Open Question 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateIdentityPolicy {
    Supersede,
    Reject,
}

impl Default for DuplicateIdentityPolicy {
    fn default() -> Self {
        Self::Supersede
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub duplicate_identity_policy: DuplicateIdentityPolicy,
    /// Bounded outbound queue depth per session (§4.2).
    pub send_queue_depth: usize,
    /// Grace period a queue may stay saturated before the session is
    /// disconnected with `BACKPRESSURE_SATURATED` (§4.2, §5).
    pub backpressure_grace_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            duplicate_identity_policy: DuplicateIdentityPolicy::Supersede,
            send_queue_depth: 256,
            backpressure_grace_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    /// Auto-create a room/channel on first join unless this tenant opted out.
    pub auto_create_default: bool,
    pub auto_create_opt_out_tenants: Vec<String>,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            auto_create_default: true,
            auto_create_opt_out_tenants: Vec::new(),
        }
    }
}

// ── CASIL ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CasilMode {
    Monitor,
    Enforce,
}

impl Default for CasilMode {
    fn default() -> Self {
        Self::Enforce
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultDecision {
    Allow,
    Block,
}

impl Default for DefaultDecision {
    fn default() -> Self {
        Self::Allow
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CasilScope {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CasilLimits {
    pub max_inspect_bytes: usize,
    pub max_patterns: usize,
}

impl Default for CasilLimits {
    fn default() -> Self {
        Self {
            max_inspect_bytes: 65_536,
            max_patterns: 64,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionConfig {
    /// Structured field names redacted wherever they appear in a payload.
    pub paths: Vec<String>,
    /// Regex patterns whose matches are replaced with the redaction sentinel.
    pub patterns: Vec<String>,
    pub transport_redaction: bool,
    /// `room:channel` glob patterns that are never logged, even on allow.
    pub never_log_payload_for: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CasilPolicies {
    pub max_payload_bytes: usize,
    pub block_on_probable_secret: bool,
    pub redaction: RedactionConfig,
}

impl Default for CasilPolicies {
    fn default() -> Self {
        Self {
            max_payload_bytes: 262_144,
            block_on_probable_secret: true,
            redaction: RedactionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CasilMetadataEmission {
    pub to_logs: bool,
    pub to_telemetry: bool,
    pub to_envelope: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CasilConfig {
    pub enabled: bool,
    pub mode: CasilMode,
    pub default_decision: DefaultDecision,
    pub scope: CasilScope,
    pub limits: CasilLimits,
    pub policies: CasilPolicies,
    pub metadata: CasilMetadataEmission,
}

impl Default for CasilConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: CasilMode::Enforce,
            default_decision: DefaultDecision::Allow,
            scope: CasilScope::default(),
            limits: CasilLimits::default(),
            policies: CasilPolicies::default(),
            metadata: CasilMetadataEmission {
                to_logs: true,
                to_telemetry: true,
                to_envelope: false,
            },
        }
    }
}

// ── History ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    Memory,
    Sqlite,
}

impl Default for HistoryBackend {
    fn default() -> Self {
        Self::Memory
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RingOverflowPolicy {
    DropOldest,
    DropNewest,
}

impl Default for RingOverflowPolicy {
    fn default() -> Self {
        Self::DropOldest
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub backend: HistoryBackend,
    pub sqlite_path: Option<String>,
    pub ring_capacity: usize,
    pub ring_overflow_policy: RingOverflowPolicy,
    pub default_read_limit: usize,
    pub max_read_limit: usize,
    pub replay_max_window_ms: u64,
    /// Resolves spec §9 Open Question 3: persist the redacted form instead
    /// of the original when CASIL redacted the envelope.
    pub persist_redacted_form: bool,
    /// Resolves spec §9 Open Question 4: direct messages are not persisted
    /// by default.
    pub persist_direct_messages: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::Memory,
            sqlite_path: None,
            ring_capacity: 10_000,
            ring_overflow_policy: RingOverflowPolicy::DropOldest,
            default_read_limit: 100,
            max_read_limit: 1_000,
            replay_max_window_ms: 24 * 60 * 60 * 1000,
            persist_redacted_form: false,
            persist_direct_messages: false,
        }
    }
}
