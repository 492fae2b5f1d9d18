use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use parley_shared::types::{MessageId, MessageKind, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{DeletionSet, Message, NewMessage, ReactionMap};
use crate::row::{decode_ts, decode_uuid, encode_ts};

pub(crate) const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, kind, file_url, \
                                          file_name, deleted_for_everyone, created_at";

impl Database {
    /// Persist a new message and return it as stored.
    ///
    /// Timestamps never go backwards: a clock step back reuses the latest
    /// stored timestamp, and ties keep insertion order.
    pub fn append_message(&self, new: &NewMessage) -> Result<Message> {
        validate_new_message(new, self.max_content_len())?;

        let tx = self.conn().unchecked_transaction()?;

        for (role, id) in [("sender", &new.sender_id), ("receiver", &new.receiver_id)] {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                params![id.to_string()],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(StoreError::Validation(format!("unknown {role} {id}")));
            }
        }

        let latest: Option<String> =
            tx.query_row("SELECT MAX(created_at) FROM messages", [], |row| row.get(0))?;
        let now = encode_ts(&Utc::now());
        let created_at = match latest {
            Some(latest) if latest > now => latest,
            _ => now,
        };

        let id = MessageId::new();
        tx.execute(
            "INSERT INTO messages (id, sender_id, receiver_id, content, kind, file_url, file_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id.to_string(),
                new.sender_id.to_string(),
                new.receiver_id.to_string(),
                new.content,
                new.kind.as_str(),
                new.file_url,
                new.file_name,
                created_at,
            ],
        )?;
        tx.commit()?;

        tracing::debug!(
            message = %id,
            sender = %new.sender_id.short(),
            receiver = %new.receiver_id.short(),
            kind = %new.kind,
            "message appended"
        );

        self.get_message(&id)
    }

    /// Canonical state of one message, overlays included.
    pub fn get_message(&self, id: &MessageId) -> Result<Message> {
        let message = self
            .conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("message {id}")))?;
        self.with_overlays(message)
    }

    /// The conversation between `viewer` and `other` as `viewer` sees it:
    /// oldest first, without messages `viewer` deleted for themselves.
    /// Messages deleted for everyone are returned as tombstones.
    pub fn list_conversation(&self, viewer: &UserId, other: &UserId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages m
             WHERE ((sender_id = ?1 AND receiver_id = ?2)
                 OR (sender_id = ?2 AND receiver_id = ?1))
               AND NOT EXISTS (
                   SELECT 1 FROM message_hidden h
                   WHERE h.message_id = m.id AND h.user_id = ?1)
             ORDER BY created_at ASC, rowid ASC"
        ))?;

        let rows = stmt.query_map(
            params![viewer.to_string(), other.to_string()],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(self.with_overlays(row?)?);
        }
        Ok(messages)
    }

    fn with_overlays(&self, mut message: Message) -> Result<Message> {
        message.reactions = self.load_reactions(&message.id)?;
        message.deleted_by = self.load_hidden(&message.id)?;
        Ok(message)
    }
}

fn validate_new_message(new: &NewMessage, max_len: usize) -> Result<()> {
    if new.kind == MessageKind::Deleted {
        return Err(StoreError::Validation(
            "kind 'deleted' is reserved for tombstones".into(),
        ));
    }
    if new.kind == MessageKind::Text && new.content.trim().is_empty() {
        return Err(StoreError::Validation("text message content is empty".into()));
    }
    if new.kind.is_media()
        && new.content.trim().is_empty()
        && new.file_url.as_deref().map_or(true, |u| u.trim().is_empty())
    {
        return Err(StoreError::Validation(format!(
            "{} message needs content or a file reference",
            new.kind
        )));
    }
    if new.content.len() > max_len {
        return Err(StoreError::Validation(format!(
            "content is {} bytes (max {max_len})",
            new.content.len()
        )));
    }
    Ok(())
}

/// Maps the base row; reactions and deletions are attached separately.
pub(crate) fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let sender_str: String = row.get(1)?;
    let receiver_str: String = row.get(2)?;
    let kind_str: String = row.get(4)?;
    let ts_str: String = row.get(8)?;

    let kind = kind_str
        .parse::<MessageKind>()
        .map_err(|e| crate::row::conversion(4, e))?;

    Ok(Message {
        id: MessageId(decode_uuid(0, &id_str)?),
        sender_id: UserId(decode_uuid(1, &sender_str)?),
        receiver_id: UserId(decode_uuid(2, &receiver_str)?),
        content: row.get(3)?,
        kind,
        file_url: row.get(5)?,
        file_name: row.get(6)?,
        reactions: ReactionMap::new(),
        deleted_by: DeletionSet::new(),
        deleted_for_everyone: row.get(7)?,
        created_at: decode_ts(8, &ts_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::temp_db;

    fn two_users(db: &Database) -> (UserId, UserId) {
        let a = db.login("+1000", Some("Alice")).unwrap();
        let b = db.login("+2000", Some("Bob")).unwrap();
        (a.id, b.id)
    }

    #[test]
    fn hello_is_visible_to_both_sides() {
        let (_dir, db) = temp_db();
        let (a, b) = two_users(&db);

        let sent = db.append_message(&NewMessage::text(a, b, "hello")).unwrap();
        assert!(sent.reactions.is_empty());
        assert!(sent.deleted_by.is_empty());
        assert!(!sent.deleted_for_everyone);

        for (viewer, other) in [(a, b), (b, a)] {
            let view = db.list_conversation(&viewer, &other).unwrap();
            assert_eq!(view.len(), 1);
            assert_eq!(view[0].content, "hello");
            assert_eq!(view[0].kind, MessageKind::Text);
            assert_eq!(view[0], sent);
        }
    }

    #[test]
    fn conversation_is_ordered_and_scoped_to_the_pair() {
        let (_dir, db) = temp_db();
        let (a, b) = two_users(&db);
        let c = db.login("+3000", None).unwrap().id;

        for i in 0..5 {
            let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
            db.append_message(&NewMessage::text(from, to, format!("m{i}")))
                .unwrap();
        }
        db.append_message(&NewMessage::text(a, c, "elsewhere")).unwrap();

        let view = db.list_conversation(&a, &b).unwrap();
        let contents: Vec<_> = view.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m0", "m1", "m2", "m3", "m4"]);
        assert!(view.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn append_rejects_unknown_participants() {
        let (_dir, db) = temp_db();
        let (a, _) = two_users(&db);

        let err = db
            .append_message(&NewMessage::text(a, UserId::new(), "hi"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = db
            .append_message(&NewMessage::text(UserId::new(), a, "hi"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn append_validates_content() {
        let (_dir, db) = temp_db();
        let (a, b) = two_users(&db);

        let empty = NewMessage::text(a, b, "   ");
        assert!(matches!(db.append_message(&empty), Err(StoreError::Validation(_))));

        let mut tombstone = NewMessage::text(a, b, "x");
        tombstone.kind = MessageKind::Deleted;
        assert!(matches!(db.append_message(&tombstone), Err(StoreError::Validation(_))));

        let mut bare_image = NewMessage::text(a, b, "");
        bare_image.kind = MessageKind::Image;
        assert!(matches!(db.append_message(&bare_image), Err(StoreError::Validation(_))));

        bare_image.file_url = Some("/uploads/cat.png".into());
        bare_image.file_name = Some("cat.png".into());
        let stored = db.append_message(&bare_image).unwrap();
        assert_eq!(stored.kind, MessageKind::Image);
        assert_eq!(stored.file_name.as_deref(), Some("cat.png"));

        let db = db.with_max_content_len(4);
        let long = NewMessage::text(a, b, "hello");
        assert!(matches!(db.append_message(&long), Err(StoreError::Validation(_))));
        assert_eq!(db.list_conversation(&a, &b).unwrap().len(), 1);
    }

    #[test]
    fn timestamps_never_decrease() {
        let (_dir, db) = temp_db();
        let (a, b) = two_users(&db);

        // Simulate a row written by a clock that ran ahead.
        let future = Utc::now() + chrono::Duration::hours(1);
        db.conn()
            .execute(
                "INSERT INTO messages (id, sender_id, receiver_id, content, kind, created_at)
                 VALUES (?1, ?2, ?3, 'early', 'text', ?4)",
                params![
                    MessageId::new().to_string(),
                    a.to_string(),
                    b.to_string(),
                    encode_ts(&future)
                ],
            )
            .unwrap();

        let next = db.append_message(&NewMessage::text(b, a, "later")).unwrap();
        let view = db.list_conversation(&a, &b).unwrap();
        assert_eq!(view.last().unwrap().id, next.id);
        assert!(next.created_at >= view[0].created_at);
    }

    #[test]
    fn get_unknown_message_is_not_found() {
        let (_dir, db) = temp_db();
        assert!(matches!(
            db.get_message(&MessageId::new()),
            Err(StoreError::NotFound(_))
        ));
    }
}
