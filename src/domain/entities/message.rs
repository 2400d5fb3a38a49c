use chrono::{DateTime, Utc};

use super::ChannelTarget;

/// Who sent a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: String,
    pub username: Option<String>,
}

impl Sender {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), username: None }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// An incoming plaintext message
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub channel: ChannelTarget,
    pub sender: Option<Sender>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub platform: String,
}

impl Message {
    pub fn new(channel: ChannelTarget, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel,
            sender: None,
            text: text.into(),
            timestamp: Utc::now(),
            platform: "unknown".to_string(),
        }
    }

    pub fn with_sender(mut self, sender: Sender) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Message body with surrounding whitespace removed
    pub fn plaintext(&self) -> &str {
        self.text.trim()
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.sender.as_ref().map(|s| s.id.as_str())
    }
}
