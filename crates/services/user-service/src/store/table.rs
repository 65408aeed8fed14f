//! Primary table plus its indexes, mutated as one unit.
//!
//! Every method here is synchronous and storage-agnostic; `UserStore` wraps
//! the table in a lock and persists after each mutation.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use domain::{
    name_tokens, normalize_email, DomainError, DomainResult, NewUser, UpdateUser, UserRecord,
    UserRole,
};

use super::index::{rebuild_email_index, DerivedIndexes, EmailIndex};

/// Identifier -> record, with email, role and name-token indexes.
#[derive(Debug, Clone, Default)]
pub struct UserTable {
    pub(crate) users: HashMap<Uuid, UserRecord>,
    pub(crate) emails: EmailIndex,
    pub(crate) derived: DerivedIndexes,
}

impl UserTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a table from loaded parts. Derived indexes are rebuilt and
    /// the email index is replaced if it disagrees with the records.
    pub fn from_parts(users: HashMap<Uuid, UserRecord>, emails: EmailIndex) -> Self {
        let mut table = Self {
            users,
            emails,
            derived: DerivedIndexes::default(),
        };
        table.heal_email_index();
        table.rebuild_indexes();
        table
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&UserRecord> {
        self.users.get(&id)
    }

    pub fn get_by_email(&self, email: &str) -> Option<&UserRecord> {
        self.emails
            .get(&normalize_email(email))
            .and_then(|id| self.users.get(id))
    }

    pub fn contains_email(&self, email: &str) -> bool {
        self.emails.contains_key(&normalize_email(email))
    }

    pub fn records(&self) -> impl Iterator<Item = &UserRecord> {
        self.users.values()
    }

    pub fn role_ids(&self, role: UserRole) -> impl Iterator<Item = &Uuid> {
        self.derived.ids_for_role(role).into_iter().flatten()
    }

    /// Insert a new record, enforcing capacity and email uniqueness.
    pub fn insert_new(
        &mut self,
        input: NewUser,
        capacity: usize,
        now: DateTime<Utc>,
    ) -> DomainResult<&UserRecord> {
        if self.users.len() >= capacity {
            return Err(DomainError::CapacityExceeded { capacity });
        }
        if self.contains_email(&input.email) {
            return Err(DomainError::conflict("Email"));
        }

        let mut id = Uuid::new_v4();
        while self.users.contains_key(&id) {
            id = Uuid::new_v4();
        }

        let record = UserRecord::new(id, input, now);
        self.emails.insert(record.email.clone(), id);
        self.derived.insert(&record);
        Ok(&*self.users.entry(id).or_insert(record))
    }

    /// Merge `patch` into an existing record.
    ///
    /// Returns `Ok(None)` for an unknown id, `Conflict` if the new email
    /// belongs to another record and `Validation` for non-finite spend;
    /// nothing is modified in any of these cases.
    pub fn apply_update(&mut self, id: Uuid, patch: UpdateUser) -> DomainResult<Option<&UserRecord>> {
        let Some(current) = self.users.get(&id) else {
            return Ok(None);
        };

        let new_email = patch.email.as_deref().map(normalize_email);
        if let Some(email) = &new_email {
            if let Some(owner) = self.emails.get(email) {
                if *owner != id {
                    return Err(DomainError::conflict("Email"));
                }
            }
        }
        if let Some(stats) = &patch.stats {
            stats.validate()?;
        }

        let old_email = current.email.clone();
        let old_role = current.role;
        let old_name = current.name.clone();

        let Some(user) = self.users.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(email) = new_email {
            if email != old_email {
                self.emails.remove(&old_email);
                self.emails.insert(email.clone(), id);
                user.email = email;
            }
        }
        if let Some(role) = patch.role {
            self.derived.move_role(id, old_role, role);
            user.role = role;
        }
        if let Some(name) = patch.name {
            self.derived.rename(id, &old_name, &name);
            user.name = name;
        }
        if let Some(credential) = patch.credential {
            user.credential = credential;
        }
        if let Some(active) = patch.is_active {
            user.is_active = active;
        }
        if let Some(preferences) = patch.preferences {
            user.preferences = preferences;
        }
        if let Some(profile) = patch.profile {
            user.profile = profile;
        }
        if let Some(stats) = patch.stats {
            user.stats = stats;
        }

        Ok(Some(&*user))
    }

    /// Remove a record and every index entry pointing at it.
    pub fn remove(&mut self, id: Uuid) -> Option<UserRecord> {
        let user = self.users.remove(&id)?;
        if self.emails.get(&user.email) == Some(&id) {
            self.emails.remove(&user.email);
        }
        self.derived.remove(&user);
        Some(user)
    }

    pub fn set_active(&mut self, id: Uuid, active: bool) -> bool {
        match self.users.get_mut(&id) {
            Some(user) => {
                user.is_active = active;
                true
            }
            None => false,
        }
    }

    pub fn touch_last_login(&mut self, id: Uuid, now: DateTime<Utc>) -> bool {
        match self.users.get_mut(&id) {
            Some(user) => {
                user.last_login = Some(now);
                true
            }
            None => false,
        }
    }

    /// Delete inactive records idle for longer than `horizon`.
    pub fn purge_stale(&mut self, now: DateTime<Utc>, horizon: Duration) -> usize {
        let stale: Vec<Uuid> = self
            .users
            .values()
            .filter(|u| u.is_stale(now, horizon))
            .map(|u| u.id)
            .collect();

        for id in &stale {
            self.remove(*id);
        }
        stale.len()
    }

    /// Rebuild role and name-token indexes from the primary table.
    pub fn rebuild_indexes(&mut self) {
        self.derived = DerivedIndexes::rebuild_from_primary(&self.users);
    }

    /// Replace the email index if it disagrees with the records.
    /// Returns whether a rebuild happened.
    pub fn heal_email_index(&mut self) -> bool {
        let expected = rebuild_email_index(&self.users);
        if expected == self.emails {
            return false;
        }
        tracing::warn!(
            indexed = self.emails.len(),
            records = self.users.len(),
            "Email index out of sync, rebuilding"
        );
        self.emails = expected;
        true
    }

    /// Swap in a whole new set of records and rebuild every index.
    pub fn replace_records(&mut self, records: impl IntoIterator<Item = UserRecord>) {
        self.users = records.into_iter().map(|u| (u.id, u)).collect();
        self.emails = rebuild_email_index(&self.users);
        self.rebuild_indexes();
    }

    /// Describe every disagreement between the table and its indexes.
    /// Empty when all invariants hold.
    pub fn index_violations(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (email, id) in &self.emails {
            match self.users.get(id) {
                Some(user) if &user.email == email => {}
                Some(_) => problems.push(format!("email index '{}' points at {} with another email", email, id)),
                None => problems.push(format!("email index '{}' points at missing {}", email, id)),
            }
        }

        for user in self.users.values() {
            if self.emails.get(&user.email) != Some(&user.id) {
                problems.push(format!("record {} missing from email index", user.id));
            }

            for role in UserRole::ALL {
                let present = self
                    .derived
                    .ids_for_role(role)
                    .is_some_and(|ids| ids.contains(&user.id));
                if present != (role == user.role) {
                    problems.push(format!("record {} misplaced in role bucket '{}'", user.id, role));
                }
            }

            for token in name_tokens(&user.name) {
                let present = self
                    .derived
                    .name_tokens
                    .get(&token)
                    .is_some_and(|ids| ids.contains(&user.id));
                if !present {
                    problems.push(format!("record {} missing from token '{}'", user.id, token));
                }
            }
        }

        for (role, ids) in &self.derived.roles {
            for id in ids {
                if !self.users.contains_key(id) {
                    problems.push(format!("role bucket '{}' holds missing {}", role, id));
                }
            }
        }

        for (token, ids) in &self.derived.name_tokens {
            if ids.is_empty() {
                problems.push(format!("token '{}' has an empty bucket", token));
            }
            for id in ids {
                let owns = self
                    .users
                    .get(id)
                    .is_some_and(|u| name_tokens(&u.name).any(|t| &t == token));
                if !owns {
                    problems.push(format!("token '{}' holds stale {}", token, id));
                }
            }
        }

        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, name: &str) -> NewUser {
        NewUser::new(email, name, "secret")
    }

    #[test]
    fn test_insert_respects_capacity() {
        let mut table = UserTable::new();
        let now = Utc::now();
        table.insert_new(new_user("a@example.com", "A"), 2, now).unwrap();
        table.insert_new(new_user("b@example.com", "B"), 2, now).unwrap();

        let err = table.insert_new(new_user("c@example.com", "C"), 2, now).unwrap_err();
        assert_eq!(err, DomainError::CapacityExceeded { capacity: 2 });
        assert_eq!(table.len(), 2);
        assert!(!table.contains_email("c@example.com"));
    }

    #[test]
    fn test_insert_rejects_duplicate_email() {
        let mut table = UserTable::new();
        let now = Utc::now();
        table.insert_new(new_user("dup@example.com", "A"), 10, now).unwrap();

        let err = table
            .insert_new(new_user("  DUP@example.com", "B"), 10, now)
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_update_moves_all_indexes() {
        let mut table = UserTable::new();
        let id = table
            .insert_new(new_user("old@example.com", "Old Name"), 10, Utc::now())
            .unwrap()
            .id;

        let patch = UpdateUser {
            email: Some("New@Example.com".to_string()),
            name: Some("New Name".to_string()),
            role: Some(UserRole::Moderator),
            ..UpdateUser::default()
        };
        let updated = table.apply_update(id, patch).unwrap().unwrap();
        assert_eq!(updated.email, "new@example.com");

        assert!(table.get_by_email("old@example.com").is_none());
        assert_eq!(table.get_by_email("new@example.com").map(|u| u.id), Some(id));
        assert!(!table.derived.name_tokens.contains_key("old"));
        assert!(table.index_violations().is_empty());
    }

    #[test]
    fn test_update_rejects_non_finite_spend() {
        let mut table = UserTable::new();
        let id = table
            .insert_new(new_user("spend@example.com", "Big Spender"), 10, Utc::now())
            .unwrap()
            .id;

        let patch = UpdateUser {
            name: Some("Renamed".to_string()),
            stats: Some(domain::UsageStats {
                order_count: 1,
                total_spent: f64::INFINITY,
                loyalty_points: 0,
            }),
            ..UpdateUser::default()
        };
        let err = table.apply_update(id, patch).unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
        let user = table.get(id).unwrap();
        assert_eq!(user.name, "Big Spender");
        assert_eq!(user.stats.total_spent, 0.0);
        assert!(table.index_violations().is_empty());
    }

    #[test]
    fn test_update_unknown_id_is_none() {
        let mut table = UserTable::new();
        let result = table.apply_update(Uuid::new_v4(), UpdateUser::default()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_purge_stale_only_removes_old_inactive() {
        let mut table = UserTable::new();
        let now = Utc::now();
        let long_ago = now - Duration::days(800);

        let stale = table.insert_new(new_user("stale@example.com", "Stale"), 10, long_ago).unwrap().id;
        let old_active = table.insert_new(new_user("kept@example.com", "Kept"), 10, long_ago).unwrap().id;
        let recent = table.insert_new(new_user("recent@example.com", "Recent"), 10, now).unwrap().id;
        table.set_active(stale, false);
        table.set_active(recent, false);

        let removed = table.purge_stale(now, Duration::days(730));

        assert_eq!(removed, 1);
        assert!(table.get(stale).is_none());
        assert!(table.get(old_active).is_some());
        assert!(table.get(recent).is_some());
        assert!(table.index_violations().is_empty());
    }

    #[test]
    fn test_from_parts_heals_email_index() {
        let mut source = UserTable::new();
        let id = source
            .insert_new(new_user("heal@example.com", "Heal Me"), 10, Utc::now())
            .unwrap()
            .id;

        let mut bogus = EmailIndex::new();
        bogus.insert("ghost@example.com".to_string(), Uuid::new_v4());

        let table = UserTable::from_parts(source.users.clone(), bogus);
        assert_eq!(table.get_by_email("heal@example.com").map(|u| u.id), Some(id));
        assert!(table.index_violations().is_empty());
    }

    #[test]
    fn test_violations_detect_stale_token() {
        let mut table = UserTable::new();
        table.insert_new(new_user("x@example.com", "Xavier"), 10, Utc::now()).unwrap();
        table
            .derived
            .name_tokens
            .entry("ghost".to_string())
            .or_default()
            .insert(Uuid::new_v4());

        assert!(!table.index_violations().is_empty());
        table.rebuild_indexes();
        assert!(table.index_violations().is_empty());
    }
}
