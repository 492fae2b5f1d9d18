//! Delivery policy evaluated before anything is persisted.

use parley_store::User;

/// Whether `sender` may deliver to `receiver`, judged on the receiver's
/// block list as stored right now.
///
/// A `false` here is never reported to the sender.
pub fn is_allowed(sender: &User, receiver: &User) -> bool {
    !receiver.blocks(&sender.phone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use chrono::Utc;
    use parley_shared::types::UserId;
    use parley_store::{PrivacySettings, Theme};

    fn user(phone: &str, blocked: &[&str]) -> User {
        User {
            id: UserId::new(),
            phone: phone.to_string(),
            name: phone.to_string(),
            avatar_url: None,
            language: "en".to_string(),
            theme: Theme::Light,
            blocked_numbers: blocked.iter().map(|p| p.to_string()).collect::<BTreeSet<_>>(),
            privacy_settings: PrivacySettings::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_blocked_phone_is_refused() {
        let alice = user("+100", &[]);
        let bob = user("+200", &["+100"]);
        assert!(!is_allowed(&alice, &bob));
        assert!(is_allowed(&bob, &alice), "blocking is one-directional");
    }

    #[test]
    fn test_unrelated_block_list_allows() {
        let alice = user("+100", &[]);
        let bob = user("+200", &["+999"]);
        assert!(is_allowed(&alice, &bob));
    }
}
