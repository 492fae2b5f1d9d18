//! Presence registry: which live session, if any, currently speaks for an
//! identity.
//!
//! At most one session per identity; the most recent `auth` wins. A
//! session that loses its entry keeps running but no longer receives
//! pushes. Unregistering is guarded by session id so a late disconnect of
//! an old connection cannot evict the newer one.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use parley_shared::protocol::OutboundEvent;
use parley_shared::types::{SessionId, UserId};

/// Write side of one connection's outbound queue.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    tx: mpsc::Sender<OutboundEvent>,
}

impl SessionHandle {
    /// Create a handle and the receiver its connection task drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                id: SessionId::new(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Best-effort push. Returns whether the event was queued; a full or
    /// closed queue drops it and the client catches up by polling.
    pub fn push(&self, event: OutboundEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(session = %self.id, "Outbound queue full, dropping push");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(session = %self.id, "Session closed, dropping push");
                false
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct PresenceRegistry {
    sessions: Arc<DashMap<UserId, SessionHandle>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user` to `handle`, returning the handle it replaced.
    pub fn register(&self, user: UserId, handle: SessionHandle) -> Option<SessionHandle> {
        let session = handle.id();
        let replaced = self.sessions.insert(user, handle);
        info!(
            user = %user.short(),
            session = %session,
            replaced = replaced.is_some(),
            "Session registered"
        );
        replaced
    }

    pub fn lookup(&self, user: &UserId) -> Option<SessionHandle> {
        self.sessions.get(user).map(|entry| entry.value().clone())
    }

    /// Remove `user`'s entry only if it still points at `session`.
    pub fn unregister(&self, user: &UserId, session: SessionId) -> bool {
        let removed = self
            .sessions
            .remove_if(user, |_, handle| handle.id() == session)
            .is_some();
        if removed {
            info!(user = %user.short(), session = %session, "Session unregistered");
        } else {
            debug!(
                user = %user.short(),
                session = %session,
                "Stale unregister ignored"
            );
        }
        removed
    }

    pub fn online_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop every entry; used at shutdown.
    pub fn clear(&self) {
        let count = self.sessions.len();
        self.sessions.clear();
        info!(count, "Presence registry cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_unknown_is_none() {
        let registry = PresenceRegistry::new();
        assert!(registry.lookup(&UserId::new()).is_none());
    }

    #[test]
    fn test_newer_session_survives_stale_disconnect() {
        let registry = PresenceRegistry::new();
        let user = UserId::new();
        let (a, _rx_a) = SessionHandle::channel(4);
        let (b, _rx_b) = SessionHandle::channel(4);

        registry.register(user, a.clone());
        let replaced = registry.register(user, b.clone()).unwrap();
        assert_eq!(replaced.id(), a.id());

        assert!(!registry.unregister(&user, a.id()));
        assert_eq!(registry.lookup(&user).unwrap().id(), b.id());

        assert!(registry.unregister(&user, b.id()));
        assert!(registry.lookup(&user).is_none());
    }

    #[test]
    fn test_push_reports_closed_and_full_queues() {
        let (handle, rx) = SessionHandle::channel(1);
        let event = || OutboundEvent::Authenticated {
            user_id: UserId::new(),
        };

        assert!(handle.push(event()));
        assert!(!handle.push(event()), "queue of one is already full");

        drop(rx);
        assert!(!handle.is_open());
        assert!(!handle.push(event()));
    }

    #[test]
    fn test_identities_are_independent() {
        let registry = PresenceRegistry::new();
        let (alice, bob) = (UserId::new(), UserId::new());
        let (a, _rx_a) = SessionHandle::channel(1);
        let (b, _rx_b) = SessionHandle::channel(1);

        registry.register(alice, a.clone());
        registry.register(bob, b);
        assert!(registry.unregister(&alice, a.id()));
        assert!(registry.lookup(&bob).is_some());
        assert_eq!(registry.online_count(), 1);

        registry.clear();
        assert_eq!(registry.online_count(), 0);
    }
}
