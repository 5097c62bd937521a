//! Dashboard resources and records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{EntityId, Timestamp};

/// A countable dashboard resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Brands,
    Products,
    Users,
    PageViews,
}

impl Resource {
    pub const ALL: [Resource; 4] = [
        Resource::Brands,
        Resource::Products,
        Resource::Users,
        Resource::PageViews,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Brands => "brands",
            Resource::Products => "products",
            Resource::Users => "users",
            Resource::PageViews => "page_views",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or(())
    }
}

/// A brand shown on the marketing site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub brand_id: EntityId,
    pub name: String,
    pub slug: String,
    pub created_at: Timestamp,
}

/// Kind of analytics event accepted from the site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PageView,
    Click,
    Signup,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PageView => "page_view",
            EventKind::Click => "click",
            EventKind::Signup => "signup",
        }
    }
}

impl FromStr for EventKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page_view" => Ok(EventKind::PageView),
            "click" => Ok(EventKind::Click),
            "signup" => Ok(EventKind::Signup),
            _ => Err(()),
        }
    }
}

/// A validated analytics event ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event_id: EntityId,
    pub kind: EventKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub recorded_at: Timestamp,
}

/// Lowercase, dash-separated slug for a brand name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(ch.to_ascii_lowercase());
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_round_trip_names() {
        for resource in Resource::ALL {
            assert_eq!(resource.as_str().parse::<Resource>(), Ok(resource));
        }
        assert!("orders".parse::<Resource>().is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Acme Outdoor Co."), "acme-outdoor-co");
        assert_eq!(slugify("  --Hello__World--  "), "hello-world");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_event_kind_parse() {
        assert_eq!("page_view".parse::<EventKind>(), Ok(EventKind::PageView));
        assert!("PageView".parse::<EventKind>().is_err());
    }
}
