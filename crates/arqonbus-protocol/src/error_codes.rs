//! Closed set of machine-readable error codes surfaced on the wire.
//!
//! Grouped by the stage that raises them; §4.1, §4.5, §6 of the spec.

// ── Envelope validation (§4.1) ───────────────────────────────────────────────

pub const DECODE_ERROR: &str = "DECODE_ERROR";
pub const SCHEMA_ERROR: &str = "SCHEMA_ERROR";
pub const ID_FORMAT_ERROR: &str = "ID_FORMAT_ERROR";
pub const TIMESTAMP_ERROR: &str = "TIMESTAMP_ERROR";
pub const TARGET_ERROR: &str = "TARGET_ERROR";
pub const IDENTITY_MISMATCH: &str = "IDENTITY_MISMATCH";
pub const TENANT_MISMATCH: &str = "TENANT_MISMATCH";
pub const OVERSIZE: &str = "OVERSIZE";

// ── CASIL (§4.5) ─────────────────────────────────────────────────────────────

pub const CASIL_DISABLED: &str = "CASIL_DISABLED";
pub const CASIL_OUT_OF_SCOPE: &str = "CASIL_OUT_OF_SCOPE";
pub const CASIL_POLICY_OVERSIZE: &str = "CASIL_POLICY_OVERSIZE";
pub const CASIL_POLICY_BLOCKED_SECRET: &str = "CASIL_POLICY_BLOCKED_SECRET";
pub const CASIL_POLICY_REDACTED: &str = "CASIL_POLICY_REDACTED";
pub const CASIL_POLICY_ALLOWED: &str = "CASIL_POLICY_ALLOWED";
pub const CASIL_MONITOR_MODE: &str = "CASIL_MONITOR_MODE";
pub const CASIL_INTERNAL_ERROR: &str = "CASIL_INTERNAL_ERROR";

// ── History (§4.6) ───────────────────────────────────────────────────────────

pub const OVERFLOW: &str = "OVERFLOW";
pub const SEQUENCE_GAP: &str = "SEQUENCE_GAP";

// ── Registry / session (§4.2, §5) ────────────────────────────────────────────

pub const DUPLICATE_IDENTITY: &str = "DUPLICATE_IDENTITY";
pub const HEARTBEAT_TIMEOUT: &str = "HEARTBEAT_TIMEOUT";
pub const BACKPRESSURE_SATURATED: &str = "BACKPRESSURE_SATURATED";

// ── Rooms/channels (§4.3) ────────────────────────────────────────────────────

pub const TENANT_ISOLATION_VIOLATION: &str = "TENANT_ISOLATION_VIOLATION";

// ── Client-facing surface (§6) ───────────────────────────────────────────────

pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const AUTHENTICATION_FAILED: &str = "AUTHENTICATION_FAILED";
pub const AUTHORIZATION_DENIED: &str = "AUTHORIZATION_DENIED";
pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
pub const TARGET_NOT_FOUND: &str = "TARGET_NOT_FOUND";
pub const COMMAND_NOT_FOUND: &str = "COMMAND_NOT_FOUND";
pub const COMMAND_VALIDATION_ERROR: &str = "COMMAND_VALIDATION_ERROR";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
