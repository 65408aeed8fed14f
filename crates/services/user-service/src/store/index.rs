//! Secondary indexes over the primary table.
//!
//! The email index is persisted with the primary table. Role and name-token
//! indexes are derived caches: they can always be rebuilt from the table
//! alone, and are rebuilt at startup.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use domain::{name_tokens, UserRecord, UserRole};

/// Normalized email -> identifier.
pub type EmailIndex = HashMap<String, Uuid>;

/// Role and name-token indexes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedIndexes {
    pub roles: HashMap<UserRole, HashSet<Uuid>>,
    pub name_tokens: HashMap<String, HashSet<Uuid>>,
}

impl DerivedIndexes {
    /// Build both indexes from scratch. Pure and idempotent.
    pub fn rebuild_from_primary(users: &HashMap<Uuid, UserRecord>) -> Self {
        let mut indexes = Self::default();
        for user in users.values() {
            indexes.insert(user);
        }
        indexes
    }

    /// Register a record in its role bucket and name-token buckets.
    pub fn insert(&mut self, user: &UserRecord) {
        self.roles.entry(user.role).or_default().insert(user.id);
        self.add_tokens(user.id, &user.name);
    }

    /// Remove a record from every bucket it occupies.
    pub fn remove(&mut self, user: &UserRecord) {
        self.remove_role(user.id, user.role);
        self.remove_tokens(user.id, &user.name);
    }

    pub fn move_role(&mut self, id: Uuid, from: UserRole, to: UserRole) {
        if from == to {
            return;
        }
        self.remove_role(id, from);
        self.roles.entry(to).or_default().insert(id);
    }

    pub fn rename(&mut self, id: Uuid, old_name: &str, new_name: &str) {
        if old_name == new_name {
            return;
        }
        self.remove_tokens(id, old_name);
        self.add_tokens(id, new_name);
    }

    pub fn ids_for_role(&self, role: UserRole) -> Option<&HashSet<Uuid>> {
        self.roles.get(&role)
    }

    fn remove_role(&mut self, id: Uuid, role: UserRole) {
        if let Some(bucket) = self.roles.get_mut(&role) {
            bucket.remove(&id);
        }
    }

    fn add_tokens(&mut self, id: Uuid, name: &str) {
        for token in name_tokens(name) {
            self.name_tokens.entry(token).or_default().insert(id);
        }
    }

    fn remove_tokens(&mut self, id: Uuid, name: &str) {
        for token in name_tokens(name) {
            if let Some(bucket) = self.name_tokens.get_mut(&token) {
                bucket.remove(&id);
                if bucket.is_empty() {
                    self.name_tokens.remove(&token);
                }
            }
        }
    }
}

/// Build the email index from the primary table.
pub fn rebuild_email_index(users: &HashMap<Uuid, UserRecord>) -> EmailIndex {
    users.values().map(|u| (u.email.clone(), u.id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::NewUser;

    fn record(name: &str, role: UserRole) -> UserRecord {
        let email = format!("{}@example.com", Uuid::new_v4());
        UserRecord::new(
            Uuid::new_v4(),
            NewUser::new(email, name, "secret").with_role(role),
            Utc::now(),
        )
    }

    fn table(records: &[UserRecord]) -> HashMap<Uuid, UserRecord> {
        records.iter().map(|r| (r.id, r.clone())).collect()
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let users = table(&[
            record("Anita Sharma", UserRole::User),
            record("Rohan Sharma", UserRole::Admin),
            record("Mod Person", UserRole::Moderator),
        ]);

        let first = DerivedIndexes::rebuild_from_primary(&users);
        let second = DerivedIndexes::rebuild_from_primary(&users);

        assert_eq!(first, second);
        assert_eq!(first.name_tokens["sharma"].len(), 2);
        assert_eq!(first.roles[&UserRole::Admin].len(), 1);
    }

    #[test]
    fn test_incremental_matches_rebuild() {
        let anita = record("Anita Sharma", UserRole::User);
        let mut rohan = record("Rohan Sharma", UserRole::User);

        let mut incremental = DerivedIndexes::default();
        incremental.insert(&anita);
        incremental.insert(&rohan);

        incremental.move_role(rohan.id, UserRole::User, UserRole::Admin);
        incremental.rename(rohan.id, "Rohan Sharma", "Rohan Mehta");
        rohan.role = UserRole::Admin;
        rohan.name = "Rohan Mehta".to_string();

        let rebuilt = DerivedIndexes::rebuild_from_primary(&table(&[anita, rohan]));
        // Rebuild never creates empty role buckets; compare populated ones.
        for role in UserRole::ALL {
            let a = incremental.ids_for_role(role).cloned().unwrap_or_default();
            let b = rebuilt.ids_for_role(role).cloned().unwrap_or_default();
            assert_eq!(a, b, "role {}", role);
        }
        assert_eq!(incremental.name_tokens, rebuilt.name_tokens);
    }

    #[test]
    fn test_remove_prunes_empty_token_buckets() {
        let user = record("Solo Name", UserRole::User);
        let mut indexes = DerivedIndexes::default();
        indexes.insert(&user);
        indexes.remove(&user);

        assert!(indexes.name_tokens.is_empty());
        assert!(indexes.roles[&UserRole::User].is_empty());
    }

    #[test]
    fn test_rebuild_email_index() {
        let user = record("Someone", UserRole::User);
        let emails = rebuild_email_index(&table(&[user.clone()]));
        assert_eq!(emails.get(&user.email), Some(&user.id));
    }
}
