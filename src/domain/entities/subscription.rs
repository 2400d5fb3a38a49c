use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Kind of chat a notification is delivered to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelType {
    Group,
    Private,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Group => "group",
            ChannelType::Private => "private",
        }
    }
}

impl FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group" => Ok(ChannelType::Group),
            "private" => Ok(ChannelType::Private),
            other => Err(format!("unknown channel type `{}`", other)),
        }
    }
}

/// A concrete chat: its kind plus platform id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelTarget {
    pub channel_type: ChannelType,
    pub channel_id: String,
}

impl ChannelTarget {
    pub fn group(id: impl Into<String>) -> Self {
        Self { channel_type: ChannelType::Group, channel_id: id.into() }
    }

    pub fn private(id: impl Into<String>) -> Self {
        Self { channel_type: ChannelType::Private, channel_id: id.into() }
    }
}

impl fmt::Display for ChannelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_type.as_str(), self.channel_id)
    }
}

/// Where updates of one entity are delivered.
/// Key is `(entity_id, channel)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub entity_id: i64,
    pub channel: ChannelTarget,
    pub added_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(entity_id: i64, channel: ChannelTarget) -> Self {
        Self {
            entity_id,
            channel,
            added_by: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_added_by(mut self, user_id: impl Into<String>) -> Self {
        self.added_by = Some(user_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_type_round_trip() {
        assert_eq!("group".parse::<ChannelType>().unwrap(), ChannelType::Group);
        assert_eq!("private".parse::<ChannelType>().unwrap(), ChannelType::Private);
        assert!("guild".parse::<ChannelType>().is_err());
    }

    #[test]
    fn test_channel_target_display() {
        assert_eq!(ChannelTarget::group("-100").to_string(), "group:-100");
    }
}
