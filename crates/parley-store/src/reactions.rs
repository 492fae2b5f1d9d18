use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use parley_shared::constants::MAX_EMOJI_LEN;
use parley_shared::types::{MessageId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Message, ReactionMap};
use crate::row::{decode_uuid, encode_ts};

impl Database {
    /// Add `reactor` to `emoji` on the message, or remove them if they had
    /// already reacted with it. Returns the updated message.
    ///
    /// Each (message, reactor, emoji) triple is its own row, so toggles of
    /// different emojis on one message never overwrite each other.
    pub fn toggle_reaction(
        &self,
        message_id: &MessageId,
        reactor: &UserId,
        emoji: &str,
    ) -> Result<Message> {
        let emoji = emoji.trim();
        if emoji.is_empty() || emoji.len() > MAX_EMOJI_LEN {
            return Err(StoreError::Validation(format!(
                "emoji must be 1..={MAX_EMOJI_LEN} bytes"
            )));
        }

        let tx = self.conn().unchecked_transaction()?;

        let row: Option<(String, String, bool)> = tx
            .query_row(
                "SELECT sender_id, receiver_id, deleted_for_everyone FROM messages WHERE id = ?1",
                params![message_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((sender, receiver, deleted_for_everyone)) = row else {
            return Err(StoreError::NotFound(format!("message {message_id}")));
        };

        let reactor_str = reactor.to_string();
        if reactor_str != sender && reactor_str != receiver {
            return Err(StoreError::Unauthorized(
                "only conversation participants can react".into(),
            ));
        }
        if deleted_for_everyone {
            return Err(StoreError::Validation(
                "cannot react to a deleted message".into(),
            ));
        }

        let removed = tx.execute(
            "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
            params![message_id.to_string(), reactor_str, emoji],
        )?;
        if removed == 0 {
            tx.execute(
                "INSERT INTO reactions (message_id, user_id, emoji, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    message_id.to_string(),
                    reactor_str,
                    emoji,
                    encode_ts(&Utc::now())
                ],
            )?;
        }
        tx.commit()?;

        tracing::debug!(
            message = %message_id,
            reactor = %reactor.short(),
            emoji,
            added = removed == 0,
            "reaction toggled"
        );

        self.get_message(message_id)
    }

    /// Reactions on one message, reactors in the order they reacted.
    pub fn load_reactions(&self, message_id: &MessageId) -> Result<ReactionMap> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT emoji, user_id FROM reactions WHERE message_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![message_id.to_string()], |row| {
            let emoji: String = row.get(0)?;
            let user_str: String = row.get(1)?;
            Ok((emoji, UserId(decode_uuid(1, &user_str)?)))
        })?;

        let mut map = ReactionMap::new();
        for row in rows {
            let (emoji, user) = row?;
            map.insert(&emoji, user);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::temp_db;
    use crate::models::NewMessage;

    fn setup(db: &Database) -> (UserId, UserId, MessageId) {
        let a = db.login("+1000", Some("Alice")).unwrap().id;
        let b = db.login("+2000", Some("Bob")).unwrap().id;
        let msg = db.append_message(&NewMessage::text(a, b, "hello")).unwrap();
        (a, b, msg.id)
    }

    #[test]
    fn both_participants_thumbs_up() {
        let (_dir, db) = temp_db();
        let (a, b, id) = setup(&db);

        db.toggle_reaction(&id, &a, "👍").unwrap();
        let msg = db.toggle_reaction(&id, &b, "👍").unwrap();

        assert_eq!(msg.reactions.reactors("👍"), &[a, b]);
        assert_eq!(msg.reactions.emojis().count(), 1);
    }

    #[test]
    fn toggle_twice_restores_prior_state() {
        let (_dir, db) = temp_db();
        let (a, b, id) = setup(&db);
        db.toggle_reaction(&id, &b, "❤️").unwrap();
        let before = db.get_message(&id).unwrap().reactions;

        db.toggle_reaction(&id, &a, "❤️").unwrap();
        let after = db.toggle_reaction(&id, &a, "❤️").unwrap().reactions;
        assert_eq!(before, after);

        let cleared = db.toggle_reaction(&id, &b, "❤️").unwrap();
        assert!(cleared.reactions.is_empty());
    }

    #[test]
    fn reactions_are_not_exclusive() {
        let (_dir, db) = temp_db();
        let (a, _, id) = setup(&db);

        db.toggle_reaction(&id, &a, "👍").unwrap();
        let msg = db.toggle_reaction(&id, &a, "😂").unwrap();
        assert!(msg.reactions.contains("👍", &a));
        assert!(msg.reactions.contains("😂", &a));
    }

    #[test]
    fn rejects_unknown_message_outsiders_and_bad_emoji() {
        let (_dir, db) = temp_db();
        let (a, _, id) = setup(&db);
        let outsider = db.login("+3000", None).unwrap().id;

        assert!(matches!(
            db.toggle_reaction(&MessageId::new(), &a, "👍"),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            db.toggle_reaction(&id, &outsider, "👍"),
            Err(StoreError::Unauthorized(_))
        ));
        assert!(matches!(
            db.toggle_reaction(&id, &a, "  "),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            db.toggle_reaction(&id, &a, &"x".repeat(MAX_EMOJI_LEN + 1)),
            Err(StoreError::Validation(_))
        ));
        assert!(db.get_message(&id).unwrap().reactions.is_empty());
    }
}
