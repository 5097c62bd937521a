//! Session identity types.
//!
//! `SessionUser` is the wire shape returned by the introspection endpoint;
//! `SessionIdentity` is what route handlers see after resolution.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dashboard role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Staff => "STAFF",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    /// Parse a role (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "STAFF" => Ok(Role::Staff),
            _ => Err(()),
        }
    }
}

/// User object as carried in `{ "user": ... }` introspection bodies.
///
/// Fields other than `id` are passed through as-is. `role` stays a raw
/// string so that an unknown role does not make the whole body unparseable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Body of the introspection endpoint. Absence of a session is `user: null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnvelope {
    pub user: Option<SessionUser>,
}

impl SessionEnvelope {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn for_user(user: SessionUser) -> Self {
        Self { user: Some(user) }
    }
}

/// Resolved identity for one request.
///
/// Any identity without a `user_id` is anonymous, whatever produced it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionIdentity {
    pub user_id: Option<String>,
    pub role: Option<Role>,
    pub raw: Option<SessionUser>,
}

impl SessionIdentity {
    /// The anonymous identity.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Map an introspected user onto an identity.
    ///
    /// A blank `id` fails the presence check and yields anonymous.
    pub fn from_user(user: SessionUser) -> Self {
        let id = user.id.trim();
        if id.is_empty() {
            return Self::anonymous();
        }
        Self {
            user_id: Some(id.to_string()),
            role: user.role.as_deref().and_then(|r| r.parse().ok()),
            raw: Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn is_anonymous(&self) -> bool {
        !self.is_authenticated()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.is_authenticated() && self.role == Some(role)
    }

    /// Staff-level access: either dashboard role.
    pub fn is_staff_or_admin(&self) -> bool {
        self.is_authenticated() && self.role.is_some()
    }

    pub fn name(&self) -> Option<&str> {
        self.raw.as_ref().and_then(|u| u.name.as_deref())
    }

    pub fn email(&self) -> Option<&str> {
        self.raw.as_ref().and_then(|u| u.email.as_deref())
    }
}

impl From<SessionEnvelope> for SessionIdentity {
    fn from(envelope: SessionEnvelope) -> Self {
        envelope
            .user
            .map(SessionIdentity::from_user)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, role: Option<&str>) -> SessionUser {
        SessionUser {
            id: id.to_string(),
            name: Some("Ada".to_string()),
            email: Some("ada@example.com".to_string()),
            image: None,
            role: role.map(str::to_string),
        }
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("staff".parse::<Role>(), Ok(Role::Staff));
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_identity_from_user() {
        let identity = SessionIdentity::from_user(user("u_1", Some("ADMIN")));
        assert!(identity.is_authenticated());
        assert_eq!(identity.user_id.as_deref(), Some("u_1"));
        assert!(identity.has_role(Role::Admin));
        assert_eq!(identity.email(), Some("ada@example.com"));
    }

    #[test]
    fn test_blank_id_is_anonymous() {
        let identity = SessionIdentity::from_user(user("   ", Some("ADMIN")));
        assert!(identity.is_anonymous());
        assert!(!identity.has_role(Role::Admin));
    }

    #[test]
    fn test_unknown_role_keeps_user() {
        let identity = SessionIdentity::from_user(user("u_2", Some("OWNER")));
        assert!(identity.is_authenticated());
        assert_eq!(identity.role, None);
        assert!(!identity.is_staff_or_admin());
    }

    #[test]
    fn test_envelope_null_user() -> Result<(), serde_json::Error> {
        let envelope: SessionEnvelope = serde_json::from_str(r#"{"user":null}"#)?;
        assert_eq!(SessionIdentity::from(envelope), SessionIdentity::anonymous());
        Ok(())
    }

    #[test]
    fn test_envelope_optional_fields() -> Result<(), serde_json::Error> {
        let envelope: SessionEnvelope =
            serde_json::from_str(r#"{"user":{"id":"u_3","role":"STAFF"}}"#)?;
        let identity = SessionIdentity::from(envelope);
        assert!(identity.has_role(Role::Staff));
        assert_eq!(identity.name(), None);
        Ok(())
    }

    #[test]
    fn test_envelope_serialization_skips_absent_fields() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&SessionEnvelope::for_user(SessionUser {
            id: "u_4".to_string(),
            name: None,
            email: None,
            image: None,
            role: None,
        }))?;
        assert_eq!(json, r#"{"user":{"id":"u_4"}}"#);
        Ok(())
    }
}
