//! Domain-level constants.
//!
//! These constants define business rules and storage layout.

// =============================================================================
// User Roles
// =============================================================================

/// Default role assigned to new users
pub const ROLE_USER: &str = "user";

/// Administrator role with elevated privileges
pub const ROLE_ADMIN: &str = "admin";

/// Moderator role
pub const ROLE_MODERATOR: &str = "moderator";

// =============================================================================
// Capacity & Retention
// =============================================================================

/// Maximum number of records the store will hold
pub const DEFAULT_MAX_USERS: usize = 10_000;

/// Inactive records older than this are eligible for cleanup
pub const INACTIVE_RETENTION_DAYS: i64 = 730;

/// Window for "new this week" statistics
pub const NEW_USERS_WEEK_DAYS: i64 = 7;

/// Window for "new this month" statistics
pub const NEW_USERS_MONTH_DAYS: i64 = 30;

// =============================================================================
// Persistence Keys
// =============================================================================

/// Key holding the primary table and email index
pub const KEY_PRIMARY: &str = "users_db";

/// Key holding the role and name-token indexes
pub const KEY_INDEXES: &str = "users_indexes";

/// Key holding the cached current session
pub const KEY_CURRENT_SESSION: &str = "current_user";

/// Prefix for backup snapshot keys
pub const KEY_BACKUP_PREFIX: &str = "users_backup_";

// =============================================================================
// Backups
// =============================================================================

/// Default interval between backup snapshots in seconds (5 minutes)
pub const DEFAULT_BACKUP_INTERVAL_SECONDS: u64 = 300;

/// Number of snapshots retained after rotation
pub const DEFAULT_BACKUP_RETAIN: usize = 3;

// =============================================================================
// Import / Export
// =============================================================================

/// Field delimiter for tabular export
pub const CSV_DELIMITER: char = ',';

/// Header row written by export
pub const CSV_HEADER: &str =
    "ID,Name,Email,Role,Active,Created At,Last Login,Orders,Total Spent";

/// Credential assigned to imported records
pub const IMPORT_PLACEHOLDER_CREDENTIAL: &str = "imported-change-me";

// =============================================================================
// Seed Accounts
// =============================================================================

/// Baseline administrator account
pub const SEED_ADMIN_EMAIL: &str = "admin@shop.local";
pub const SEED_ADMIN_NAME: &str = "Store Admin";
pub const SEED_ADMIN_CREDENTIAL: &str = "admin123";

/// Baseline demo customer account
pub const SEED_DEMO_EMAIL: &str = "demo@shop.local";
pub const SEED_DEMO_NAME: &str = "Demo Customer";
pub const SEED_DEMO_CREDENTIAL: &str = "demo123";
