use std::sync::Arc;

use arqonbus_config::schema::DuplicateIdentityPolicy;
use arqonbus_protocol::{Envelope, Principal};
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::{
    error::{Error, Result},
    session::Session,
};

type Key = (String, String);

/// The client registry: the authoritative map of live sessions, keyed by
/// `(tenant_id, client_id)` (§4.2).
pub struct Registry {
    sessions: DashMap<Key, Arc<Session>>,
    queue_depth: usize,
    duplicate_identity_policy: DuplicateIdentityPolicy,
}

impl Registry {
    #[must_use]
    pub fn new(queue_depth: usize, duplicate_identity_policy: DuplicateIdentityPolicy) -> Self {
        Self {
            sessions: DashMap::new(),
            queue_depth,
            duplicate_identity_policy,
        }
    }

    /// Register a new session. Under [`DuplicateIdentityPolicy::Supersede`]
    /// a prior live session for the same `client_id` is sent a
    /// `DUPLICATE_IDENTITY` error envelope, marked closed, and woken (§4.2:
    /// "closes the prior session with reason DUPLICATE_IDENTITY"); its
    /// connection's read loop observes [`Session::closed`] and terminates.
    /// Under `Reject` this returns [`Error::DuplicateIdentity`] and the
    /// caller must close the new connection instead.
    pub fn register(
        &self,
        principal: Principal,
    ) -> Result<(Arc<Session>, mpsc::Receiver<Envelope>)> {
        let key = (principal.tenant_id.clone(), principal.client_id.clone());

        if let Some(existing) = self.sessions.get(&key).map(|e| Arc::clone(e.value())) {
            match self.duplicate_identity_policy {
                DuplicateIdentityPolicy::Reject => {
                    return Err(Error::DuplicateIdentity {
                        tenant_id: principal.tenant_id,
                        client_id: principal.client_id,
                    });
                },
                DuplicateIdentityPolicy::Supersede => {
                    tracing::info!(
                        tenant_id = %principal.tenant_id,
                        client_id = %principal.client_id,
                        "superseding existing session on duplicate register"
                    );
                    let shape = arqonbus_protocol::ErrorShape::new(
                        arqonbus_protocol::error_codes::DUPLICATE_IDENTITY,
                        "connection superseded by a newer session for this client_id",
                    );
                    let envelope = shape.into_envelope(&existing.client_id().to_string(), existing.client_id());
                    let _ = existing.sender.try_send(envelope);
                    existing.close();
                },
            }
        }

        let (tx, rx) = mpsc::channel(self.queue_depth);
        let session = Arc::new(Session::new(principal, tx));
        self.sessions.insert(key, Arc::clone(&session));
        metrics::gauge!("arqonbus_registry_sessions").set(self.sessions.len() as f64);
        Ok((session, rx))
    }

    /// Remove a session. A no-op if the caller's session was already
    /// superseded by a newer `register` for the same identity (checked via
    /// `Arc::ptr_eq` so a stale writer task cannot evict the live session).
    pub fn unregister(&self, tenant_id: &str, client_id: &str, handle: &Arc<Session>) {
        let key = (tenant_id.to_string(), client_id.to_string());
        if let Some((_, current)) = self.sessions.remove_if(&key, |_, v| Arc::ptr_eq(v, handle)) {
            drop(current);
            metrics::gauge!("arqonbus_registry_sessions").set(self.sessions.len() as f64);
        }
    }

    pub fn lookup(&self, tenant_id: &str, client_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .get(&(tenant_id.to_string(), client_id.to_string()))
            .map(|e| Arc::clone(e.value()))
    }

    pub fn is_connected(&self, tenant_id: &str, client_id: &str) -> bool {
        self.sessions
            .contains_key(&(tenant_id.to_string(), client_id.to_string()))
    }

    /// Best-effort, non-blocking delivery to one client. Returns `Ok(true)`
    /// on enqueue, `Ok(false)` if the client is not connected (at-most-once
    /// delivery — §7), or `Err` if the queue is saturated.
    pub fn try_deliver(&self, tenant_id: &str, client_id: &str, envelope: Envelope) -> Result<bool> {
        let Some(session) = self.lookup(tenant_id, client_id) else {
            return Ok(false);
        };
        session.try_enqueue(envelope).map(|()| true).map_err(|_| Error::QueueFull {
            client_id: client_id.to_string(),
        })
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use arqonbus_protocol::Role;

    use super::*;

    fn principal(tenant: &str, client: &str) -> Principal {
        Principal::new(tenant, client, vec![Role::User])
    }

    #[test]
    fn register_then_lookup() {
        let reg = Registry::new(8, DuplicateIdentityPolicy::Supersede);
        let (session, _rx) = reg.register(principal("t1", "alice")).unwrap();
        assert!(reg.is_connected("t1", "alice"));
        assert_eq!(reg.lookup("t1", "alice").unwrap().client_id(), session.client_id());
    }

    #[test]
    fn reject_policy_rejects_duplicate() {
        let reg = Registry::new(8, DuplicateIdentityPolicy::Reject);
        let (_s1, _rx1) = reg.register(principal("t1", "alice")).unwrap();
        let err = reg.register(principal("t1", "alice")).unwrap_err();
        assert!(matches!(err, Error::DuplicateIdentity { .. }));
    }

    #[test]
    fn supersede_policy_evicts_old_session() {
        let reg = Registry::new(8, DuplicateIdentityPolicy::Supersede);
        let (s1, _rx1) = reg.register(principal("t1", "alice")).unwrap();
        let (_s2, _rx2) = reg.register(principal("t1", "alice")).unwrap();
        assert_eq!(reg.session_count(), 1);
        assert!(s1.is_closed());
        // the old handle can no longer evict the new session.
        reg.unregister("t1", "alice", &s1);
        assert!(reg.is_connected("t1", "alice"));
    }

    #[test]
    fn supersede_policy_delivers_duplicate_identity_error_to_old_session() {
        let reg = Registry::new(8, DuplicateIdentityPolicy::Supersede);
        let (_s1, mut rx1) = reg.register(principal("t1", "alice")).unwrap();
        let (_s2, _rx2) = reg.register(principal("t1", "alice")).unwrap();
        let delivered = rx1.try_recv().expect("old session should receive a close notice");
        assert_eq!(delivered.payload.unwrap()["code"], arqonbus_protocol::error_codes::DUPLICATE_IDENTITY);
    }

    #[test]
    fn unregister_removes_current_session() {
        let reg = Registry::new(8, DuplicateIdentityPolicy::Supersede);
        let (session, _rx) = reg.register(principal("t1", "alice")).unwrap();
        reg.unregister("t1", "alice", &session);
        assert!(!reg.is_connected("t1", "alice"));
    }

    #[test]
    fn try_deliver_to_unknown_client_is_not_an_error() {
        let reg = Registry::new(8, DuplicateIdentityPolicy::Supersede);
        let envelope = arqonbus_protocol::Envelope {
            id: "m1".into(),
            r#type: arqonbus_protocol::EnvelopeType::Message,
            version: "1".into(),
            timestamp: 0,
            from_client: "alice".into(),
            to_client: Some("ghost".into()),
            room: None,
            channel: None,
            command: None,
            args: None,
            payload: None,
            metadata: None,
            correlation_id: None,
            tenant_id: None,
        };
        assert!(!reg.try_deliver("t1", "ghost", envelope).unwrap());
    }

    #[test]
    fn tenants_with_same_client_id_are_distinct() {
        let reg = Registry::new(8, DuplicateIdentityPolicy::Supersede);
        reg.register(principal("t1", "alice")).unwrap();
        reg.register(principal("t2", "alice")).unwrap();
        assert_eq!(reg.session_count(), 2);
    }
}
