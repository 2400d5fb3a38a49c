use async_trait::async_trait;
use regex_lite::Regex;
use std::sync::Arc;

use super::Message;
use crate::application::errors::CommandError;

/// How a plaintext message selects a command
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Whole message equals the keyword (ASCII case-insensitive)
    Exact(String),
    /// Message starts with the keyword; the rest becomes the arguments
    Prefix(String),
    /// Regex over the whole message; capture group 1 becomes the arguments
    Pattern(Regex),
}

impl Trigger {
    pub fn exact(keyword: impl Into<String>) -> Self {
        Trigger::Exact(keyword.into())
    }

    pub fn prefix(keyword: impl Into<String>) -> Self {
        Trigger::Prefix(keyword.into())
    }

    /// Returns the argument text when `input` matches
    pub fn matches(&self, input: &str) -> Option<String> {
        let input = input.trim();
        match self {
            Trigger::Exact(keyword) => input.eq_ignore_ascii_case(keyword).then(String::new),
            Trigger::Prefix(keyword) => {
                let head = input.get(..keyword.len())?;
                if !head.eq_ignore_ascii_case(keyword) {
                    return None;
                }
                Some(input[keyword.len()..].trim().to_string())
            }
            Trigger::Pattern(re) => {
                let caps = re.captures(input)?;
                Some(caps.get(1).map(|m| m.as_str().trim().to_string()).unwrap_or_default())
            }
        }
    }
}

/// Async command handler
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, message: &Message, args: &str) -> Result<String, CommandError>;
}

/// Adapts a synchronous closure into a [`CommandHandler`]
struct SyncHandler<F>(F);

#[async_trait]
impl<F> CommandHandler for SyncHandler<F>
where
    F: Fn(&Message, &str) -> Result<String, CommandError> + Send + Sync,
{
    async fn handle(&self, message: &Message, args: &str) -> Result<String, CommandError> {
        (self.0)(message, args)
    }
}

/// Represents a bot command
pub struct Command {
    pub name: String,
    pub description: Option<String>,
    pub usage: Option<String>,
    pub triggers: Vec<Trigger>,
    pub handler: Option<Arc<dyn CommandHandler>>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            usage: None,
            triggers: Vec::new(),
            handler: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn with_handler<H: CommandHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn with_reply<F>(mut self, reply: F) -> Self
    where
        F: Fn(&Message, &str) -> Result<String, CommandError> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(SyncHandler(reply)));
        self
    }

    /// Argument text of the first trigger that matches
    pub fn matches(&self, input: &str) -> Option<String> {
        self.triggers.iter().find_map(|t| t.matches(input))
    }
}

/// Command registry. Lookup is in registration order, first match wins.
#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<Command>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command, replacing any command with the same name
    pub fn register(&mut self, command: Command) {
        self.commands.retain(|c| c.name != command.name);
        self.commands.push(command);
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn find(&self, input: &str) -> Option<(&Command, String)> {
        self.commands
            .iter()
            .find_map(|c| c.matches(input).map(|args| (c, args)))
    }

    pub fn all(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
