//! Identity records.
//!
//! The messaging core only reads these (existence, block lists); the
//! writers here back the thin login/profile endpoints.

use std::collections::BTreeSet;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use parley_shared::types::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{PrivacySettings, ProfileUpdate, Theme, User};
use crate::row::{conversion, decode_ts, decode_uuid, encode_ts};

const USER_COLUMNS: &str = "id, phone, name, avatar_url, language, theme, blocked_numbers, \
                            privacy_settings, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Fetch the identity registered under `phone`, creating it on first
    /// login. `name` only applies to a newly created identity and defaults
    /// to the phone number.
    pub fn login(&self, phone: &str, name: Option<&str>) -> Result<User> {
        let phone = normalize_phone(phone)?;
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(phone.as_str());
        self.insert_if_absent(&phone, name)
    }

    /// Resolve `phone` to an identity, creating a shadow record for numbers
    /// that never logged in so they can be messaged.
    pub fn find_or_create_shadow(&self, phone: &str) -> Result<User> {
        let phone = normalize_phone(phone)?;
        self.insert_if_absent(&phone, &phone)
    }

    fn insert_if_absent(&self, phone: &str, name: &str) -> Result<User> {
        let id = UserId::new();
        let inserted = self.conn().execute(
            "INSERT INTO users (id, phone, name, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(phone) DO NOTHING",
            params![id.to_string(), phone, name, encode_ts(&Utc::now())],
        )?;
        if inserted > 0 {
            tracing::info!(user = %id.short(), "created identity");
        }

        self.find_user_by_phone(phone)?
            .ok_or_else(|| StoreError::NotFound(format!("user with phone {phone}")))
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_user(&self, id: &UserId) -> Result<User> {
        self.find_user(id)?
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    pub fn find_user(&self, id: &UserId) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE phone = ?1"),
                params![phone.trim()],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// All identities, oldest first.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map([], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn update_profile(&self, id: &UserId, update: &ProfileUpdate) -> Result<User> {
        let blocked = update
            .blocked_numbers
            .as_ref()
            .map(|set| serde_json::to_string(&normalize_blocked(set)))
            .transpose()?;
        let privacy = update
            .privacy_settings
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let affected = self.conn().execute(
            "UPDATE users
             SET name             = COALESCE(?1, name),
                 avatar_url       = COALESCE(?2, avatar_url),
                 language         = COALESCE(?3, language),
                 theme            = COALESCE(?4, theme),
                 blocked_numbers  = COALESCE(?5, blocked_numbers),
                 privacy_settings = COALESCE(?6, privacy_settings)
             WHERE id = ?7",
            params![
                update.name.as_deref().map(str::trim).filter(|n| !n.is_empty()),
                update.avatar_url,
                update.language,
                update.theme.map(|t| t.as_str()),
                blocked,
                privacy,
                id.to_string(),
            ],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound(format!("user {id}")));
        }
        self.get_user(id)
    }
}

fn normalize_phone(phone: &str) -> Result<String> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err(StoreError::Validation("phone number is required".into()));
    }
    Ok(phone.to_string())
}

fn normalize_blocked(set: &BTreeSet<String>) -> BTreeSet<String> {
    set.iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let theme_str: String = row.get(5)?;
    let blocked_json: String = row.get(6)?;
    let privacy_json: String = row.get(7)?;
    let ts_str: String = row.get(8)?;

    let blocked_numbers: BTreeSet<String> =
        serde_json::from_str(&blocked_json).map_err(|e| conversion(6, e))?;
    let privacy_settings: PrivacySettings =
        serde_json::from_str(&privacy_json).map_err(|e| conversion(7, e))?;

    Ok(User {
        id: UserId(decode_uuid(0, &id_str)?),
        phone: row.get(1)?,
        name: row.get(2)?,
        avatar_url: row.get(3)?,
        language: row.get(4)?,
        theme: Theme::from_column(&theme_str),
        blocked_numbers,
        privacy_settings,
        created_at: decode_ts(8, &ts_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::temp_db;
    use crate::models::Audience;

    #[test]
    fn login_creates_once_per_phone() {
        let (_dir, db) = temp_db();
        let first = db.login("+33600000001", Some("Alice")).unwrap();
        let again = db.login(" +33600000001 ", Some("Someone else")).unwrap();

        assert_eq!(first.id, again.id);
        assert_eq!(again.name, "Alice");
        assert_eq!(again.language, "en");
        assert_eq!(again.theme, Theme::Light);
        assert!(again.blocked_numbers.is_empty());
    }

    #[test]
    fn login_rejects_empty_phone() {
        let (_dir, db) = temp_db();
        assert!(matches!(db.login("   ", None), Err(StoreError::Validation(_))));
    }

    #[test]
    fn shadow_identity_uses_phone_as_name() {
        let (_dir, db) = temp_db();
        let shadow = db.find_or_create_shadow("+15550100").unwrap();
        assert_eq!(shadow.name, "+15550100");

        // A later login by the same number takes over the shadow record.
        let user = db.login("+15550100", Some("Bob")).unwrap();
        assert_eq!(user.id, shadow.id);
        assert_eq!(db.list_users().unwrap().len(), 1);
    }

    #[test]
    fn update_profile_keeps_absent_fields() {
        let (_dir, db) = temp_db();
        let user = db.login("+100", Some("Carol")).unwrap();

        let update = ProfileUpdate {
            theme: Some(Theme::Dark),
            blocked_numbers: Some(BTreeSet::from([" +200 ".to_string(), "".to_string()])),
            privacy_settings: Some(PrivacySettings {
                publications: Audience::Contacts,
            }),
            ..Default::default()
        };
        let updated = db.update_profile(&user.id, &update).unwrap();

        assert_eq!(updated.name, "Carol");
        assert_eq!(updated.theme, Theme::Dark);
        assert_eq!(updated.blocked_numbers, BTreeSet::from(["+200".to_string()]));
        assert!(updated.blocks("+200"));
        assert_eq!(updated.privacy_settings.publications, Audience::Contacts);
    }

    #[test]
    fn update_unknown_user_is_not_found() {
        let (_dir, db) = temp_db();
        let err = db
            .update_profile(&UserId::new(), &ProfileUpdate::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
