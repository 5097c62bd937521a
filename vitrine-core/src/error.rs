//! Error types for VITRINE operations

use std::time::Duration;
use thiserror::Error;

use crate::resource::Resource;

/// Storage layer errors (the relational store behind the dashboard).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Count failed for {resource}: {reason}")]
    CountFailed { resource: Resource, reason: String },

    #[error("Insert failed for {entity}: {reason}")]
    InsertFailed { entity: String, reason: String },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors for inbound payloads.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidFieldValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Field {field} exceeds {max} characters")]
    TooLong { field: String, max: usize },
}

impl ValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            Self::RequiredFieldMissing { field }
            | Self::InvalidFieldValue { field, .. }
            | Self::TooLong { field, .. } => field,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Errors raised by the response cache itself (as opposed to errors
/// produced by the fetch functions it runs, which pass through unchanged).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache key must not be empty")]
    InvalidKey,

    #[error("Cache TTL must be positive for key {key}")]
    InvalidTtl { key: String },

    #[error("Fetch for {key} timed out after {timeout:?}")]
    FetchTimeout { key: String, timeout: Duration },

    #[error("Fetch for {key} panicked")]
    FetchPanicked { key: String },

    #[error("Failed to encode value for {key}: {reason}")]
    Encode { key: String, reason: String },

    #[error("Failed to decode cached value for {key}: {reason}")]
    Decode { key: String, reason: String },

    #[error("Fetch for {key} failed: {reason}")]
    Upstream { key: String, reason: String },
}

/// Master error type for all VITRINE errors.
///
/// `Clone` is required: a single failed fetch is handed to every caller that
/// was coalesced onto it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VitrineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Result type alias for VITRINE operations.
pub type VitrineResult<T> = Result<T, VitrineError>;

// =============================================================================
// TESTS
// =============================================================================
