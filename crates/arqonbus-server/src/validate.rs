//! Envelope validator (§4.1): decode → schema → id grammar → clock skew →
//! target consistency → identity match → tenant match → oversize.
//!
//! Every rule is checked in order and the first failure wins, since later
//! rules may assume earlier ones held (e.g. target-consistency assumes the
//! envelope decoded and deserialized cleanly).

use arqonbus_config::schema::ValidationConfig;
use arqonbus_protocol::{Envelope, ErrorShape, Principal, envelope::validate_targets, error_codes};
use regex::Regex;

/// Precompiled at config-load time (§4.1 EXPANSION), never per-message.
pub struct Validator {
    id_grammar: Regex,
    clock_skew_ms: u64,
    max_transport_payload_bytes: usize,
}

impl Validator {
    pub fn new(config: &ValidationConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            id_grammar: Regex::new(&config.id_grammar)?,
            clock_skew_ms: config.clock_skew_ms,
            max_transport_payload_bytes: config.max_transport_payload_bytes,
        })
    }

    /// Decode a raw text frame into an envelope (rule 1: decode).
    pub fn decode(&self, text: &str) -> Result<Envelope, ErrorShape> {
        serde_json::from_str(text)
            .map_err(|e| ErrorShape::new(error_codes::DECODE_ERROR, format!("malformed envelope: {e}")))
    }

    /// Rules 2-8, given an already-decoded envelope and the session's
    /// authenticated principal.
    pub fn validate(&self, envelope: &Envelope, principal: &Principal) -> Result<(), ErrorShape> {
        self.check_schema(envelope)?;
        self.check_id_grammar(envelope)?;
        self.check_clock_skew(envelope)?;
        validate_targets(envelope)?;
        self.check_identity(envelope, principal)?;
        self.check_tenant(envelope, principal)?;
        self.check_oversize(envelope)?;
        Ok(())
    }

    fn check_schema(&self, envelope: &Envelope) -> Result<(), ErrorShape> {
        if envelope.version.is_empty() {
            return Err(ErrorShape::new(error_codes::SCHEMA_ERROR, "version is required"));
        }
        if envelope.from_client.is_empty() {
            return Err(ErrorShape::new(error_codes::SCHEMA_ERROR, "from_client is required"));
        }
        Ok(())
    }

    fn check_id_grammar(&self, envelope: &Envelope) -> Result<(), ErrorShape> {
        if self.id_grammar.is_match(&envelope.id) {
            Ok(())
        } else {
            Err(ErrorShape::new(
                error_codes::ID_FORMAT_ERROR,
                format!("id {:?} does not match the configured grammar", envelope.id),
            ))
        }
    }

    fn check_clock_skew(&self, envelope: &Envelope) -> Result<(), ErrorShape> {
        let now = arqonbus_common::time::now_ms();
        let skew = arqonbus_common::time::skew_ms(now, envelope.timestamp);
        if skew > self.clock_skew_ms {
            Err(ErrorShape::new(
                error_codes::TIMESTAMP_ERROR,
                format!("timestamp skew {skew}ms exceeds allowed {}ms", self.clock_skew_ms),
            ))
        } else {
            Ok(())
        }
    }

    /// Rule 6: `from_client` must match the authenticated principal, except
    /// an admin principal may set `from_client` to act on another client's
    /// behalf (§4.1 rule 6: "overridable only for admin principals").
    fn check_identity(&self, envelope: &Envelope, principal: &Principal) -> Result<(), ErrorShape> {
        if envelope.from_client == principal.client_id || principal.is_admin() {
            Ok(())
        } else {
            Err(ErrorShape::new(
                error_codes::IDENTITY_MISMATCH,
                "from_client does not match the authenticated session",
            ))
        }
    }

    fn check_tenant(&self, envelope: &Envelope, principal: &Principal) -> Result<(), ErrorShape> {
        match &envelope.tenant_id {
            Some(tenant_id) if tenant_id == &principal.tenant_id => Ok(()),
            Some(_) => Err(ErrorShape::new(
                error_codes::TENANT_MISMATCH,
                "tenant_id does not match the authenticated session",
            )),
            None => Ok(()),
        }
    }

    fn check_oversize(&self, envelope: &Envelope) -> Result<(), ErrorShape> {
        let size = envelope.payload_len();
        if size > self.max_transport_payload_bytes {
            Err(ErrorShape::new(
                error_codes::OVERSIZE,
                format!("payload of {size} bytes exceeds the {}-byte transport ceiling", self.max_transport_payload_bytes),
            ))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use arqonbus_protocol::{EnvelopeType, Role};

    use super::*;

    fn principal() -> Principal {
        Principal::new("t1", "alice", vec![Role::User])
    }

    fn envelope() -> Envelope {
        Envelope {
            id: "msg_1".into(),
            r#type: EnvelopeType::Message,
            version: "1".into(),
            timestamp: arqonbus_common::time::now_ms(),
            from_client: "alice".into(),
            to_client: Some("bob".into()),
            room: None,
            channel: None,
            command: None,
            args: None,
            payload: Some(serde_json::json!({"text": "hi"})),
            metadata: None,
            correlation_id: None,
            tenant_id: Some("t1".into()),
        }
    }

    fn validator() -> Validator {
        Validator::new(&ValidationConfig::default()).unwrap()
    }

    #[test]
    fn accepts_well_formed_envelope() {
        assert!(validator().validate(&envelope(), &principal()).is_ok());
    }

    #[test]
    fn rejects_bad_id_grammar() {
        let mut env = envelope();
        env.id = "has spaces!!".into();
        let err = validator().validate(&env, &principal()).unwrap_err();
        assert_eq!(err.code, error_codes::ID_FORMAT_ERROR);
    }

    #[test]
    fn rejects_clock_skew_beyond_window() {
        let mut env = envelope();
        env.timestamp = 0;
        let err = validator().validate(&env, &principal()).unwrap_err();
        assert_eq!(err.code, error_codes::TIMESTAMP_ERROR);
    }

    #[test]
    fn rejects_identity_mismatch() {
        let mut env = envelope();
        env.from_client = "mallory".into();
        let err = validator().validate(&env, &principal()).unwrap_err();
        assert_eq!(err.code, error_codes::IDENTITY_MISMATCH);
    }

    #[test]
    fn admin_principal_may_override_from_client() {
        let mut env = envelope();
        env.from_client = "someone-else".into();
        let admin = Principal::new("t1", "alice", vec![Role::Admin]);
        assert!(validator().validate(&env, &admin).is_ok());
    }

    #[test]
    fn rejects_tenant_mismatch() {
        let mut env = envelope();
        env.tenant_id = Some("other-tenant".into());
        let err = validator().validate(&env, &principal()).unwrap_err();
        assert_eq!(err.code, error_codes::TENANT_MISMATCH);
    }

    #[test]
    fn rejects_oversize_payload() {
        let cfg = ValidationConfig {
            max_transport_payload_bytes: 4,
            ..ValidationConfig::default()
        };
        let validator = Validator::new(&cfg).unwrap();
        let err = validator.validate(&envelope(), &principal()).unwrap_err();
        assert_eq!(err.code, error_codes::OVERSIZE);
    }

    #[test]
    fn rejects_ambiguous_targets() {
        let mut env = envelope();
        env.room = Some("ops".into());
        let err = validator().validate(&env, &principal()).unwrap_err();
        assert_eq!(err.code, error_codes::TARGET_ERROR);
    }

    #[test]
    fn decode_rejects_malformed_json() {
        let err = validator().decode("{not json").unwrap_err();
        assert_eq!(err.code, error_codes::DECODE_ERROR);
    }
}
