//! Domain model structs persisted in the SQLite database.
//!
//! [`Message`] itself lives in `parley-shared` because it is also the
//! payload of every push frame; it is re-exported here.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parley_shared::types::{MessageKind, UserId};

pub use parley_shared::message::{DeletionSet, Message, ReactionMap};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A known identity, keyed by a server-assigned id and unique by phone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    /// Phone number; used for lookup and as the blocking key.
    pub phone: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub language: String,
    pub theme: Theme,
    /// Phone numbers this user refuses messages from.
    pub blocked_numbers: BTreeSet<String>,
    pub privacy_settings: PrivacySettings,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether this user has blocked `phone`.
    pub fn blocks(&self, phone: &str) -> bool {
        self.blocked_numbers.contains(phone.trim())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    /// Unknown values fall back to the default rather than failing a read.
    pub fn from_column(raw: &str) -> Self {
        match raw {
            "dark" => Self::Dark,
            _ => Self::Light,
        }
    }
}

/// Who may see a user's publications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    #[default]
    Everyone,
    Contacts,
    Nobody,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacySettings {
    #[serde(default)]
    pub publications: Audience,
}

/// Partial profile update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub language: Option<String>,
    pub theme: Option<Theme>,
    pub blocked_numbers: Option<BTreeSet<String>>,
    pub privacy_settings: Option<PrivacySettings>,
}

// ---------------------------------------------------------------------------
// Message input
// ---------------------------------------------------------------------------

/// Everything a caller supplies for [`Database::append_message`]; id and
/// timestamp are assigned by the store.
///
/// [`Database::append_message`]: crate::Database::append_message
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub kind: MessageKind,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
}

impl NewMessage {
    pub fn text(sender_id: UserId, receiver_id: UserId, content: impl Into<String>) -> Self {
        Self {
            sender_id,
            receiver_id,
            content: content.into(),
            kind: MessageKind::Text,
            file_url: None,
            file_name: None,
        }
    }
}
