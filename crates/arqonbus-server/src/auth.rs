//! The out-of-scope `Authenticator` collaborator (§6 EXPANSION), modeled as
//! an injected trait so the core never hard-codes a credential mechanism.

use arqonbus_protocol::{ErrorShape, Principal, Role, error_codes};

/// Credentials offered during the handshake `connect` request. Shape
/// matches the reference gateway's `ConnectParams.auth` fields, trimmed to
/// the subset a token/password scheme needs.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ConnectAuth {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub token: Option<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
}

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credentials: &ConnectAuth, remote_ip: &str) -> Result<Principal, ErrorShape>;
}

/// Constant-time token comparison, matching the reference gateway's
/// `safe_equal` helper (avoids leaking the expected token's length via
/// early-exit timing).
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// A single shared-secret authenticator: every connection must present the
/// configured token and a `tenant_id`/`client_id` pair. Roles default to
/// `[Guest]` unless the caller names a higher role the token is configured
/// to grant (`granted_roles`), mirroring the reference gateway's
/// full-access-by-default `scopes` resolution for a non-scoped API key.
pub struct StaticTokenAuthenticator {
    expected_token: Option<String>,
    granted_roles: Vec<Role>,
}

impl StaticTokenAuthenticator {
    pub fn new(expected_token: Option<String>, granted_roles: Vec<Role>) -> Self {
        Self {
            expected_token,
            granted_roles,
        }
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate(&self, credentials: &ConnectAuth, _remote_ip: &str) -> Result<Principal, ErrorShape> {
        let Some(tenant_id) = credentials.tenant_id.clone() else {
            return Err(ErrorShape::new(error_codes::AUTHENTICATION_FAILED, "tenant_id required"));
        };
        let Some(client_id) = credentials.client_id.clone() else {
            return Err(ErrorShape::new(error_codes::AUTHENTICATION_FAILED, "client_id required"));
        };

        if let Some(expected) = &self.expected_token {
            match &credentials.token {
                Some(provided) if safe_equal(provided, expected) => {},
                Some(_) => return Err(ErrorShape::new(error_codes::AUTHENTICATION_FAILED, "invalid token")),
                None => return Err(ErrorShape::new(error_codes::AUTHENTICATION_FAILED, "token required")),
            }
        }

        let roles = if self.granted_roles.is_empty() {
            vec![Role::Guest]
        } else {
            self.granted_roles.clone()
        };
        Ok(Principal::new(tenant_id, client_id, roles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_token_configured_admits_any_named_identity() {
        let auth = StaticTokenAuthenticator::new(None, vec![Role::User]);
        let creds = ConnectAuth {
            tenant_id: Some("t1".into()),
            client_id: Some("alice".into()),
            token: None,
            roles: vec![],
        };
        let principal = auth.authenticate(&creds, "127.0.0.1").unwrap();
        assert_eq!(principal.tenant_id, "t1");
        assert!(principal.has_role(Role::User));
    }

    #[test]
    fn wrong_token_is_rejected() {
        let auth = StaticTokenAuthenticator::new(Some("secret".into()), vec![Role::User]);
        let creds = ConnectAuth {
            tenant_id: Some("t1".into()),
            client_id: Some("alice".into()),
            token: Some("wrong".into()),
            roles: vec![],
        };
        assert!(auth.authenticate(&creds, "127.0.0.1").is_err());
    }

    #[test]
    fn missing_client_id_is_rejected() {
        let auth = StaticTokenAuthenticator::new(None, vec![]);
        let creds = ConnectAuth {
            tenant_id: Some("t1".into()),
            client_id: None,
            token: None,
            roles: vec![],
        };
        assert!(auth.authenticate(&creds, "127.0.0.1").is_err());
    }
}
