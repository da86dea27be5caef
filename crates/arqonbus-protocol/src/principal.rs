use serde::{Deserialize, Serialize};

/// A caller's capability level. Ordered: `Admin` implies every lesser role's
/// permissions (§3 Principal/Session: "roles (ordered set)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    User,
    Admin,
}

/// An authenticated caller, produced by the out-of-scope `Authenticator`
/// collaborator (§6) and handed to the core as an already-validated fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub tenant_id: String,
    pub client_id: String,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn new(tenant_id: impl Into<String>, client_id: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            roles,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.iter().any(|r| *r >= role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_implies_user_and_guest() {
        let p = Principal::new("t1", "c1", vec![Role::Admin]);
        assert!(p.has_role(Role::Admin));
        assert!(p.has_role(Role::User));
        assert!(p.has_role(Role::Guest));
    }

    #[test]
    fn guest_does_not_imply_user() {
        let p = Principal::new("t1", "c1", vec![Role::Guest]);
        assert!(p.has_role(Role::Guest));
        assert!(!p.has_role(Role::User));
        assert!(!p.is_admin());
    }
}
