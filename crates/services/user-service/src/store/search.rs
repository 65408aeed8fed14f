//! Read-side queries over the table.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use domain::{UserRecord, UserRole};

use super::table::UserTable;

impl UserTable {
    /// OR-search across whitespace-separated terms.
    ///
    /// A term matches any name token containing it, and any email containing
    /// it. Index entries that no longer resolve are skipped.
    pub fn search(&self, query: &str) -> Vec<&UserRecord> {
        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        let mut hits: HashSet<Uuid> = HashSet::new();

        for term in &terms {
            for (token, ids) in &self.derived.name_tokens {
                if token.contains(term.as_str()) {
                    hits.extend(ids.iter().copied());
                }
            }
            for (email, id) in &self.emails {
                if email.contains(term.as_str()) {
                    hits.insert(*id);
                }
            }
        }

        self.resolve(hits)
    }

    pub fn by_role(&self, role: UserRole) -> Vec<&UserRecord> {
        self.resolve(self.role_ids(role).copied())
    }

    /// Records created within `[start, end]`. Linear scan.
    pub fn by_creation_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&UserRecord> {
        sorted(
            self.records()
                .filter(|u| u.created_at >= start && u.created_at <= end)
                .collect(),
        )
    }

    /// Every record, oldest first.
    pub fn all(&self) -> Vec<&UserRecord> {
        sorted(self.records().collect())
    }

    fn resolve(&self, ids: impl IntoIterator<Item = Uuid>) -> Vec<&UserRecord> {
        sorted(ids.into_iter().filter_map(|id| self.get(id)).collect())
    }
}

fn sorted(mut users: Vec<&UserRecord>) -> Vec<&UserRecord> {
    users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    users
}
