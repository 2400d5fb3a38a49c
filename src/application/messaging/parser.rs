//! Message parser - Turns raw input lines into domain messages

use crate::domain::entities::{ChannelTarget, ChannelType, Message, Sender};

/// Parses raw text lines into [`Message`]s.
///
/// A line may start with `@group:<id>` or `@private:<id>` to address a chat
/// other than the default one, which lets a local console act as any chat.
pub struct MessageParser {
    default_channel: ChannelTarget,
    platform: String,
}

impl MessageParser {
    pub fn new(default_channel: ChannelTarget, platform: impl Into<String>) -> Self {
        Self {
            default_channel,
            platform: platform.into(),
        }
    }

    pub fn parse(&self, line: &str, sender: Option<Sender>) -> Message {
        let line = line.trim();
        let (channel, text) = match Self::split_channel(line) {
            Some((channel, rest)) => (channel, rest),
            None => (self.default_channel.clone(), line),
        };

        let mut message = Message::new(channel, text).with_platform(self.platform.clone());
        if let Some(sender) = sender {
            message = message.with_sender(sender);
        }
        message
    }

    fn split_channel(line: &str) -> Option<(ChannelTarget, &str)> {
        let rest = line.strip_prefix('@')?;
        let (address, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let (kind, id) = address.split_once(':')?;
        let channel_type: ChannelType = kind.parse().ok()?;
        if id.is_empty() {
            return None;
        }
        Some((
            ChannelTarget {
                channel_type,
                channel_id: id.to_string(),
            },
            text.trim(),
        ))
    }
}
