//! API Request and Response Types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vitrine_core::{
    new_entity_id, slugify, AnalyticsEvent, Brand, EntityId, EventKind, SessionEnvelope,
    SessionIdentity, ValidationError,
};

/// Longest accepted `path` or `referrer`.
pub const MAX_URL_LEN: usize = 2048;

/// Largest accepted `metadata` object, serialized.
pub const MAX_METADATA_BYTES: usize = 4096;

/// Longest accepted brand name.
pub const MAX_BRAND_NAME_LEN: usize = 120;

// ============================================================================
// ANALYTICS
// ============================================================================

/// Body of `POST /api/analytics`.
///
/// Fields are kept as raw JSON so that a value of the wrong type produces a
/// field-level validation error instead of a body rejection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalyticsEventRequest {
    #[serde(default)]
    pub event: Option<Value>,
    #[serde(default)]
    pub path: Option<Value>,
    #[serde(default)]
    pub referrer: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl AnalyticsEventRequest {
    /// Validate and convert into an event stamped with the current time.
    pub fn validate(self) -> Result<AnalyticsEvent, ValidationError> {
        let event = non_empty(string_field(self.event, "event")?, "event")?;
        let kind: EventKind =
            event
                .parse()
                .map_err(|_| ValidationError::InvalidFieldValue {
                    field: "event".to_string(),
                    value: event.clone(),
                    reason: "expected one of page_view, click, signup".to_string(),
                })?;

        let path = non_empty(string_field(self.path, "path")?, "path")?;
        if !path.starts_with('/') {
            return Err(ValidationError::InvalidFieldValue {
                field: "path".to_string(),
                value: path,
                reason: "must start with '/'".to_string(),
            });
        }
        max_len(&path, "path", MAX_URL_LEN)?;

        let referrer = string_field(self.referrer, "referrer")?.filter(|r| !r.trim().is_empty());
        if let Some(referrer) = &referrer {
            max_len(referrer, "referrer", MAX_URL_LEN)?;
        }

        if let Some(metadata) = &self.metadata {
            if !metadata.is_object() {
                return Err(ValidationError::InvalidFieldValue {
                    field: "metadata".to_string(),
                    value: json_kind(metadata).to_string(),
                    reason: "must be an object".to_string(),
                });
            }
            if metadata.to_string().len() > MAX_METADATA_BYTES {
                return Err(ValidationError::TooLong {
                    field: "metadata".to_string(),
                    max: MAX_METADATA_BYTES,
                });
            }
        }

        Ok(AnalyticsEvent {
            event_id: new_entity_id(),
            kind,
            path,
            referrer,
            metadata: self.metadata,
            recorded_at: chrono::Utc::now(),
        })
    }
}

/// Response of an accepted analytics event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub event_id: EntityId,
}

// ============================================================================
// BRANDS
// ============================================================================

/// Body of `POST /api/admin/brands`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreateBrandRequest {
    #[serde(default)]
    pub name: Option<Value>,
}

impl CreateBrandRequest {
    /// The trimmed brand name.
    pub fn validate(self) -> Result<String, ValidationError> {
        let name = non_empty(string_field(self.name, "name")?, "name")?;
        max_len(&name, "name", MAX_BRAND_NAME_LEN)?;
        if slugify(&name).is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "name".to_string(),
                value: name,
                reason: "must contain a letter or digit".to_string(),
            });
        }
        Ok(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandListResponse {
    pub brands: Vec<Brand>,
    pub total: usize,
}

// ============================================================================
// DASHBOARD
// ============================================================================

/// Body of `GET /api/admin/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsResponse {
    pub brands: u64,
    pub products: u64,
    pub users: u64,
    pub page_views: u64,
}

// ============================================================================
// SESSION
// ============================================================================

/// Body of `GET /api/auth/session`: `{ "user": ... }` or `{ "user": null }`.
pub type SessionResponse = SessionEnvelope;

/// Identity of the caller as echoed to the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoAmIResponse {
    pub user_id: String,
    pub role: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl WhoAmIResponse {
    pub fn from_identity(identity: &SessionIdentity) -> Option<Self> {
        Some(Self {
            user_id: identity.user_id.clone()?,
            role: identity.role.map(|r| r.as_str().to_string()),
            name: identity.name().map(str::to_string),
            email: identity.email().map(str::to_string),
        })
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// A string field, with JSON `null` read as absent.
fn string_field(value: Option<Value>, field: &str) -> Result<Option<String>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(ValidationError::InvalidFieldValue {
            field: field.to_string(),
            value: json_kind(&other).to_string(),
            reason: "must be a string".to_string(),
        }),
    }
}

fn non_empty(value: Option<String>, field: &str) -> Result<String, ValidationError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        })
}

fn max_len(value: &str, field: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
