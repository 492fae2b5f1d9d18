//! "Delete for me" and "delete for everyone".
//!
//! The two are independent: a message can be hidden for one participant,
//! tombstoned for both, or both, in any order.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use parley_shared::types::{MessageId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{DeletionSet, Message};
use crate::row::{decode_uuid, encode_ts};

impl Database {
    /// Hide the message from `requester`'s view only. Repeating it is a no-op.
    pub fn delete_for_user(&self, message_id: &MessageId, requester: &UserId) -> Result<Message> {
        let tx = self.conn().unchecked_transaction()?;

        let (sender, receiver) = participants(&tx, message_id)?;
        let requester_str = requester.to_string();
        if requester_str != sender && requester_str != receiver {
            return Err(StoreError::Unauthorized(
                "only conversation participants can delete a message".into(),
            ));
        }

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO message_hidden (message_id, user_id, hidden_at)
             VALUES (?1, ?2, ?3)",
            params![message_id.to_string(), requester_str, encode_ts(&Utc::now())],
        )?;
        tx.commit()?;

        if inserted > 0 {
            tracing::debug!(message = %message_id, user = %requester.short(), "message hidden for user");
        }

        self.get_message(message_id)
    }

    /// Replace the message with the tombstone for both participants. Only
    /// the sender may do this, and it cannot be undone. File reference and
    /// reactions are dropped along with the content.
    pub fn delete_for_everyone(
        &self,
        message_id: &MessageId,
        requester: &UserId,
    ) -> Result<Message> {
        let tx = self.conn().unchecked_transaction()?;

        let (sender, _) = participants(&tx, message_id)?;
        if requester.to_string() != sender {
            return Err(StoreError::Unauthorized(
                "only the sender can delete a message for everyone".into(),
            ));
        }

        let mut message = self.get_message(message_id)?;
        message.tombstone();

        tx.execute(
            "UPDATE messages
             SET deleted_for_everyone = ?2,
                 content   = ?3,
                 kind      = ?4,
                 file_url  = ?5,
                 file_name = ?6
             WHERE id = ?1",
            params![
                message_id.to_string(),
                message.deleted_for_everyone,
                message.content,
                message.kind.as_str(),
                message.file_url,
                message.file_name,
            ],
        )?;
        tx.execute(
            "DELETE FROM reactions WHERE message_id = ?1",
            params![message_id.to_string()],
        )?;
        tx.commit()?;

        tracing::debug!(message = %message_id, "message deleted for everyone");

        Ok(message)
    }

    /// Users who hid this message for themselves.
    pub fn load_hidden(&self, message_id: &MessageId) -> Result<DeletionSet> {
        let mut stmt = self
            .conn()
            .prepare_cached("SELECT user_id FROM message_hidden WHERE message_id = ?1")?;
        let rows = stmt.query_map(params![message_id.to_string()], |row| {
            let user_str: String = row.get(0)?;
            Ok(UserId(decode_uuid(0, &user_str)?))
        })?;

        let mut set = DeletionSet::new();
        for row in rows {
            set.insert(row?);
        }
        Ok(set)
    }
}

fn participants(conn: &rusqlite::Connection, message_id: &MessageId) -> Result<(String, String)> {
    conn.query_row(
        "SELECT sender_id, receiver_id FROM messages WHERE id = ?1",
        params![message_id.to_string()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("message {message_id}")))
}
