use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arqonbus_protocol::{Envelope, Principal};
use tokio::sync::{mpsc, Notify};

/// A single connected client's outbound delivery channel and bookkeeping.
///
/// One `Session` is created per live `register` (§4.2). Superseding a
/// duplicate identity sets the atomic `closed` flag (§5: "an atomic 'closed'
/// flag") and fires `notify`, which the connection's read loop selects on
/// alongside the socket read so a superseded connection terminates promptly
/// rather than lingering until its next client-initiated frame or timeout.
pub struct Session {
    pub principal: Principal,
    pub sender: mpsc::Sender<Envelope>,
    connected_at_ms: u64,
    last_activity_ms: AtomicU64,
    last_pong_ms: AtomicU64,
    /// `0` while healthy; set to the wall-clock ms a send first failed with
    /// the queue full, so the caller can disconnect after the configured
    /// grace period (§4.2, §5).
    saturated_since_ms: AtomicU64,
    closed: AtomicBool,
    notify: Notify,
}

impl Session {
    pub(crate) fn new(principal: Principal, sender: mpsc::Sender<Envelope>) -> Self {
        let now = arqonbus_common::time::now_ms();
        Self {
            principal,
            sender,
            connected_at_ms: now,
            last_activity_ms: AtomicU64::new(now),
            last_pong_ms: AtomicU64::new(now),
            saturated_since_ms: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Mark this session closed and wake anything awaiting [`Session::closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Resolves once [`Session::close`] has been called. A connection's read
    /// loop selects on this alongside its socket read so a superseded or
    /// otherwise force-closed session terminates immediately.
    ///
    /// The `notified()` future is created before the flag check so a
    /// `close()` racing in between is never missed (per `tokio::sync::Notify`'s
    /// permit semantics).
    pub async fn closed(&self) {
        let notified = self.notify.notified();
        if self.is_closed() {
            return;
        }
        notified.await;
    }

    pub fn tenant_id(&self) -> &str {
        &self.principal.tenant_id
    }

    pub fn client_id(&self) -> &str {
        &self.principal.client_id
    }

    pub fn connected_at_ms(&self) -> u64 {
        self.connected_at_ms
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }

    pub fn touch(&self) {
        self.last_activity_ms
            .store(arqonbus_common::time::now_ms(), Ordering::Relaxed);
    }

    /// Record a received pong, resetting the heartbeat-miss clock (§5).
    pub fn note_pong(&self) {
        self.last_pong_ms
            .store(arqonbus_common::time::now_ms(), Ordering::Relaxed);
    }

    /// Milliseconds since the last pong (or since connect, if none yet).
    pub fn ms_since_pong(&self) -> u64 {
        arqonbus_common::time::now_ms().saturating_sub(self.last_pong_ms.load(Ordering::Relaxed))
    }

    /// Non-blocking enqueue. Returns `Err` if the bounded queue is full, the
    /// receiver (writer task) has gone away, or the session was closed
    /// (e.g. superseded by a later `register` for the same identity).
    pub fn try_enqueue(&self, envelope: Envelope) -> std::result::Result<(), Envelope> {
        if self.is_closed() {
            return Err(envelope);
        }
        match self.sender.try_send(envelope) {
            Ok(()) => {
                self.saturated_since_ms.store(0, Ordering::Relaxed);
                Ok(())
            },
            Err(mpsc::error::TrySendError::Full(e)) => {
                self.saturated_since_ms
                    .compare_exchange(
                        0,
                        arqonbus_common::time::now_ms(),
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    )
                    .ok();
                Err(e)
            },
            Err(mpsc::error::TrySendError::Closed(e)) => Err(e),
        }
    }

    /// How long (ms) the send queue has been continuously saturated, or
    /// `None` if it is currently draining fine.
    pub fn saturated_for_ms(&self) -> Option<u64> {
        let since = self.saturated_since_ms.load(Ordering::Relaxed);
        if since == 0 {
            return None;
        }
        Some(arqonbus_common::time::now_ms().saturating_sub(since))
    }
}
