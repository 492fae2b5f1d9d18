//! The direct message model and its mutable overlays.
//!
//! A [`Message`] is what the store persists and what every push carries.
//! Reactions and per-user deletions are typed collections here; how they
//! are laid out on disk is the store's business.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::TOMBSTONE_CONTENT;
use crate::types::{MessageId, MessageKind, UserId};

// ---------------------------------------------------------------------------
// Reactions
// ---------------------------------------------------------------------------

/// Emoji → reactors, listed in the order they reacted.
///
/// A reactor appears at most once per emoji; the same reactor may hold
/// several emojis on one message. Empty emoji keys are never kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReactionMap(BTreeMap<String, Vec<UserId>>);

impl ReactionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `reactor` under `emoji`. Returns `false` if already present.
    pub fn insert(&mut self, emoji: &str, reactor: UserId) -> bool {
        let reactors = self.0.entry(emoji.to_string()).or_default();
        if reactors.contains(&reactor) {
            return false;
        }
        reactors.push(reactor);
        true
    }

    pub fn reactors(&self, emoji: &str) -> &[UserId] {
        self.0.get(emoji).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, emoji: &str, reactor: &UserId) -> bool {
        self.reactors(emoji).contains(reactor)
    }

    pub fn emojis(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

// ---------------------------------------------------------------------------
// Per-user deletion
// ---------------------------------------------------------------------------

/// Users for whom a message is hidden ("delete for me").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeletionSet(BTreeSet<UserId>);

impl DeletionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, user: UserId) -> bool {
        self.0.insert(user)
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.0.contains(user)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A persisted direct message between two identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    /// Text body, or a caption for media kinds.
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub reactions: ReactionMap,
    pub deleted_by: DeletionSet,
    pub deleted_for_everyone: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Replace the payload with the tombstone: content, kind, file
    /// reference and reactions all go. Irreversible once persisted.
    pub fn tombstone(&mut self) {
        self.content = TOMBSTONE_CONTENT.to_string();
        self.kind = MessageKind::Deleted;
        self.file_url = None;
        self.file_name = None;
        self.reactions.clear();
        self.deleted_for_everyone = true;
    }
}
