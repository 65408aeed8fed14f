//! Domain layer - Core user entities and value objects.
//!
//! This crate contains pure domain logic with no infrastructure dependencies.

pub mod constants;
pub mod error;
pub mod user;

pub use constants::*;
pub use error::{DomainError, DomainResult};
pub use user::{
    name_tokens, normalize_email, NewUser, Preferences, Profile, UpdateUser, UsageStats,
    UserRecord, UserRole, UserView,
};
