//! User domain entity and related types.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{ROLE_ADMIN, ROLE_MODERATOR, ROLE_USER};
use crate::error::{DomainError, DomainResult};

/// User roles enumeration
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
    Moderator,
}

impl UserRole {
    /// Every role, in display order
    pub const ALL: [UserRole; 3] = [UserRole::User, UserRole::Admin, UserRole::Moderator];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => ROLE_USER,
            UserRole::Admin => ROLE_ADMIN,
            UserRole::Moderator => ROLE_MODERATOR,
        }
    }
}

/// Lenient conversion: unknown values fall back to the default role.
impl From<&str> for UserRole {
    fn from(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for UserRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" | "regular" => Ok(UserRole::User),
            "admin" | "administrator" => Ok(UserRole::Admin),
            "moderator" | "mod" => Ok(UserRole::Moderator),
            other => Err(DomainError::validation(format!("unknown role '{}'", other))),
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalize an email address for storage and lookup (trim + lower-case).
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Split a display name into its lower-cased, non-empty search tokens.
pub fn name_tokens(name: &str) -> impl Iterator<Item = String> + '_ {
    name.split_whitespace().map(str::to_lowercase)
}

/// Per-user preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub newsletter: bool,
    pub notifications: bool,
    pub theme: String,
    pub language: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            newsletter: false,
            notifications: true,
            theme: "light".to_string(),
            language: "en".to_string(),
        }
    }
}

/// Optional profile details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub bio: Option<String>,
}

/// Purchase activity counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub order_count: u32,
    pub total_spent: f64,
    pub loyalty_points: u32,
}

impl UsageStats {
    /// Spend must be finite; JSON has no encoding for NaN or infinity.
    pub fn validate(&self) -> DomainResult<()> {
        if self.total_spent.is_finite() {
            Ok(())
        } else {
            Err(DomainError::validation("total_spent must be a finite number"))
        }
    }
}

/// Full user record as held in the primary table.
///
/// Unlike [`UserView`], this carries the credential secret and is only
/// handed out by the credential lookup path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub credential: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub stats: UsageStats,
}

impl UserRecord {
    /// Build a fresh record with default sub-records.
    pub fn new(id: Uuid, input: NewUser, now: DateTime<Utc>) -> Self {
        Self {
            id,
            email: normalize_email(&input.email),
            name: input.name,
            credential: input.credential,
            role: input.role.unwrap_or_default(),
            is_active: true,
            created_at: now,
            last_login: None,
            preferences: Preferences::default(),
            profile: Profile {
                avatar: input.avatar,
                ..Profile::default()
            },
            stats: UsageStats::default(),
        }
    }

    /// Most recent activity: last login, else creation.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_login.unwrap_or(self.created_at)
    }

    /// Inactive and idle for longer than `horizon` as of `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, horizon: Duration) -> bool {
        !self.is_active && self.last_activity() < now - horizon
    }

    pub fn view(&self) -> UserView {
        UserView::from(self)
    }
}

/// User creation input
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    /// Email address (normalized on insert)
    pub email: String,
    /// Display name
    pub name: String,
    /// Opaque credential secret
    pub credential: String,
    /// Role, defaults to [`UserRole::User`]
    pub role: Option<UserRole>,
    /// Avatar URL
    pub avatar: Option<String>,
}

impl NewUser {
    pub fn new(
        email: impl Into<String>,
        name: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            credential: credential.into(),
            role: None,
            avatar: None,
        }
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub name: Option<String>,
    pub credential: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    pub preferences: Option<Preferences>,
    pub profile: Option<Profile>,
    pub stats: Option<UsageStats>,
}

/// User record without its credential (safe to return to callers)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub stats: UsageStats,
}

impl From<UserRecord> for UserView {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            is_active: user.is_active,
            created_at: user.created_at,
            last_login: user.last_login,
            preferences: user.preferences,
            profile: user.profile,
            stats: user.stats,
        }
    }
}

impl From<&UserRecord> for UserView {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            is_active: user.is_active,
            created_at: user.created_at,
            last_login: user.last_login,
            preferences: user.preferences.clone(),
            profile: user.profile.clone(),
            stats: user.stats.clone(),
        }
    }
}
