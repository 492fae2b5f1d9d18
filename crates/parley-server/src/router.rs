//! Delivery router: persist first, then push best-effort.
//!
//! Every action that changes durable state is applied to the store before
//! anything is pushed, so a client that misses a push (offline, queue
//! full, socket closing) sees the same state on its next pull. Pushes are
//! attempted once per live session and never retried.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info};

use parley_shared::message::{DeletionSet, Message, ReactionMap};
use parley_shared::protocol::{
    CallSignalRequest, ChatRequest, DeleteRequest, OutboundEvent, ReactionRequest,
};
use parley_shared::types::{MessageId, UserId};
use parley_store::{Database, NewMessage, User};

use crate::error::ServerError;
use crate::policy;
use crate::presence::{PresenceRegistry, SessionHandle};

/// The one store connection, shared by every session and handler.
pub type SharedStore = Arc<Mutex<Database>>;

/// Result of a send that passed validation.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// Persisted and pushed to whichever participants are online.
    Delivered(Message),
    /// Dropped by the receiver's block list. The message was never stored;
    /// the sender is shown this unsaved copy so the send looks normal.
    Suppressed(Message),
}

impl SendOutcome {
    pub fn into_message(self) -> Message {
        match self {
            SendOutcome::Delivered(m) | SendOutcome::Suppressed(m) => m,
        }
    }
}

#[derive(Clone)]
pub struct DeliveryRouter {
    store: SharedStore,
    presence: PresenceRegistry,
}

impl DeliveryRouter {
    pub fn new(store: SharedStore, presence: PresenceRegistry) -> Self {
        Self { store, presence }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, Database>, ServerError> {
        self.store
            .lock()
            .map_err(|_| ServerError::Internal("store lock poisoned".into()))
    }

    /// Run `f` against the store while holding its lock.
    pub fn with_store<T>(
        &self,
        f: impl FnOnce(&Database) -> parley_store::Result<T>,
    ) -> Result<T, ServerError> {
        let db = self.lock_store()?;
        f(&db).map_err(ServerError::from)
    }

    pub fn resolve_user(&self, id: &UserId) -> Result<User, ServerError> {
        self.with_store(|db| db.get_user(id))
    }

    // ------------------------------------------------------------------
    // send
    // ------------------------------------------------------------------

    /// Policy check, append, push to the receiver, echo to the sender.
    ///
    /// `origin` is the connection the send arrived on, if any; it always
    /// gets the echo even when another session is registered for the
    /// sender.
    ///
    /// Mutations push while still holding the store lock, so every session
    /// sees the updates for one message in commit order.
    pub fn send(
        &self,
        origin: Option<&SessionHandle>,
        req: &ChatRequest,
    ) -> Result<SendOutcome, ServerError> {
        let new = NewMessage {
            sender_id: req.sender_id,
            receiver_id: req.receiver_id,
            content: req.content.clone(),
            kind: req.kind(),
            file_url: req.file_url.clone(),
            file_name: req.file_name.clone(),
        };

        let db = self.lock_store()?;
        let sender = db
            .find_user(&new.sender_id)?
            .ok_or_else(|| ServerError::Validation(format!("unknown sender {}", new.sender_id)))?;
        let receiver = db.find_user(&new.receiver_id)?.ok_or_else(|| {
            ServerError::Validation(format!("unknown receiver {}", new.receiver_id))
        })?;

        if !policy::is_allowed(&sender, &receiver) {
            drop(db);
            debug!(
                sender = %req.sender_id.short(),
                receiver = %req.receiver_id.short(),
                "Send suppressed by block list"
            );
            let unsaved = unsaved_copy(&new);
            self.fan_out(
                &[new.sender_id],
                origin,
                OutboundEvent::Chat {
                    message: unsaved.clone(),
                },
            );
            return Ok(SendOutcome::Suppressed(unsaved));
        }

        let message = db.append_message(&new)?;
        let receiver_online = self
            .presence
            .lookup(&message.receiver_id)
            .map_or(false, |h| h.is_open());
        let pushed = self.fan_out(
            &[message.receiver_id, message.sender_id],
            origin,
            OutboundEvent::Chat {
                message: message.clone(),
            },
        );
        drop(db);

        debug!(
            message = %message.id,
            receiver_online,
            pushed,
            "Message delivered"
        );

        Ok(SendOutcome::Delivered(message))
    }

    // ------------------------------------------------------------------
    // delete / reaction
    // ------------------------------------------------------------------

    pub fn delete(
        &self,
        origin: Option<&SessionHandle>,
        req: &DeleteRequest,
    ) -> Result<Message, ServerError> {
        let db = self.lock_store()?;
        let message = if req.for_everyone {
            db.delete_for_everyone(&req.message_id, &req.user_id)?
        } else {
            db.delete_for_user(&req.message_id, &req.user_id)?
        };
        let pushed = self.fan_out(
            &[message.sender_id, message.receiver_id],
            origin,
            OutboundEvent::DeleteMessage {
                message: message.clone(),
            },
        );
        drop(db);

        debug!(
            message = %message.id,
            for_everyone = req.for_everyone,
            pushed,
            "Deletion propagated"
        );

        Ok(message)
    }

    pub fn react(
        &self,
        origin: Option<&SessionHandle>,
        req: &ReactionRequest,
    ) -> Result<Message, ServerError> {
        let db = self.lock_store()?;
        let message = db.toggle_reaction(&req.message_id, &req.user_id, &req.emoji)?;
        let pushed = self.fan_out(
            &[message.sender_id, message.receiver_id],
            origin,
            OutboundEvent::Chat {
                message: message.clone(),
            },
        );
        drop(db);

        debug!(message = %message.id, pushed, "Reaction propagated");

        Ok(message)
    }

    // ------------------------------------------------------------------
    // call signaling
    // ------------------------------------------------------------------

    /// Forward a signaling payload to the target's live session. Nothing is
    /// stored; an offline target simply never sees it.
    pub fn relay_call_signal(&self, sender: UserId, req: CallSignalRequest) -> bool {
        let delivered = self.fan_out(
            &[req.target_id],
            None,
            OutboundEvent::CallSignal {
                sender_id: sender,
                signal: req.signal,
                call_type: req.call_type,
            },
        ) > 0;

        if !delivered {
            debug!(
                sender = %sender.short(),
                target = %req.target_id.short(),
                "Call signal dropped, target offline"
            );
        }
        delivered
    }

    // ------------------------------------------------------------------
    // pull
    // ------------------------------------------------------------------

    /// Current durable view for `viewer`; safe to call at any rate.
    pub fn conversation(&self, viewer: &UserId, other: &UserId) -> Result<Vec<Message>, ServerError> {
        self.with_store(|db| db.list_conversation(viewer, other))
    }

    /// Push `event` once to each distinct live session among the
    /// registered sessions of `users` and `origin`. Returns how many
    /// sessions accepted it.
    fn fan_out(
        &self,
        users: &[UserId],
        origin: Option<&SessionHandle>,
        event: OutboundEvent,
    ) -> usize {
        let mut targets: Vec<SessionHandle> = Vec::with_capacity(users.len() + 1);
        let candidates = users
            .iter()
            .filter_map(|user| self.presence.lookup(user))
            .chain(origin.cloned());
        for handle in candidates {
            if !targets.iter().any(|t| t.id() == handle.id()) {
                targets.push(handle);
            }
        }

        targets
            .iter()
            .filter(|handle| handle.push(event.clone()))
            .count()
    }
}

fn unsaved_copy(new: &NewMessage) -> Message {
    Message {
        id: MessageId::new(),
        sender_id: new.sender_id,
        receiver_id: new.receiver_id,
        content: new.content.clone(),
        kind: new.kind,
        file_url: new.file_url.clone(),
        file_name: new.file_name.clone(),
        reactions: ReactionMap::new(),
        deleted_by: DeletionSet::new(),
        deleted_for_everyone: false,
        created_at: Utc::now(),
    }
}

/// Open the store for `main`.
pub fn open_store(db: Database) -> SharedStore {
    info!(path = ?db.path(), "Message store ready");
    Arc::new(Mutex::new(db))
}
