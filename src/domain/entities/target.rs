use chrono::{DateTime, Utc};
use std::fmt;

/// An external account whose latest item is polled for changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedEntity {
    pub id: i64,
    pub display_name: Option<String>,
    /// Single-slot latch of the last observed item. Replaced in place.
    pub last_seen_version: Option<String>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl TrackedEntity {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            display_name: None,
            last_seen_version: None,
            last_updated_at: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Display name when known, id otherwise
    pub fn label(&self) -> String {
        match &self.display_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self.id.to_string(),
        }
    }
}

impl fmt::Display for TrackedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.display_name.as_deref().unwrap_or("unknown"))
    }
}

/// Latest externally observed state of one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestState {
    pub version: String,
    pub display_name: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl LatestState {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            display_name: None,
            published_at: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_published_at(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }
}
