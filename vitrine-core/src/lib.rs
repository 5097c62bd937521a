//! VITRINE Core - Shared Types
//!
//! Pure data structures shared by the cache and API crates: the error
//! taxonomy, the session identity model, and the dashboard resource kinds.
//! This crate contains no I/O.

pub mod error;
pub mod identity;
pub mod resource;

pub use error::{
    CacheError, ConfigError, StorageError, ValidationError, VitrineError, VitrineResult,
};
pub use identity::{Role, SessionEnvelope, SessionIdentity, SessionUser};
pub use resource::{slugify, AnalyticsEvent, Brand, EventKind, Resource};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}
