use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::application::errors::CommandError;
use crate::domain::entities::{Command, CommandRegistry, Message, Trigger};

static HELP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^help(?:\s+(.+))?$").expect("static regex"));

/// Service for managing and executing commands
pub struct CommandService {
    registry: CommandRegistry,
    prefix: String,
}

impl CommandService {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            registry: CommandRegistry::new(),
            prefix: prefix.into(),
        }
    }

    pub fn register(&mut self, command: Command) {
        self.registry.register(command);
    }

    pub fn register_defaults(&mut self) {
        // Help is answered from the registry itself
        self.register(Command::new("help")
            .with_description("Show help message")
            .with_usage("help [command]")
            .with_trigger(Trigger::Pattern(HELP_PATTERN.clone())));

        self.register(Command::new("version")
            .with_description("Show bot version")
            .with_trigger(Trigger::exact("version"))
            .with_reply(|_, _| {
                Ok(format!("watch-bot v{}", env!("CARGO_PKG_VERSION")))
            }));
    }

    /// Strips the configured prefix. `None` when the text does not carry it.
    pub fn strip_prefix<'a>(&self, text: &'a str) -> Option<&'a str> {
        let text = text.trim();
        if self.prefix.is_empty() {
            return Some(text);
        }
        text.strip_prefix(self.prefix.as_str()).map(str::trim_start)
    }

    /// Command selected by a message, with its argument text
    pub fn resolve(&self, message: &Message) -> Option<(&Command, String)> {
        let body = self.strip_prefix(message.plaintext())?;
        self.registry.find(body)
    }

    pub async fn execute(
        &self,
        command: &Command,
        message: &Message,
        args: &str,
    ) -> Result<String, CommandError> {
        if command.name == "help" {
            return Ok(self.get_help((!args.is_empty()).then_some(args)));
        }
        match &command.handler {
            Some(handler) => handler.handle(message, args).await,
            None => Ok(format!("Command {} not implemented", command.name)),
        }
    }

    /// Runs the command a message selects. `Ok(None)` when the message is
    /// not a command.
    pub async fn handle(&self, message: &Message) -> Result<Option<String>, CommandError> {
        let Some((command, args)) = self.resolve(message) else {
            return Ok(None);
        };
        self.execute(command, message, &args).await.map(Some)
    }

    pub fn get_help(&self, command: Option<&str>) -> String {
        if let Some(name) = command {
            if let Some(cmd) = self.registry.get(name) {
                let mut help = format!("{} - {}", cmd.name, cmd.description.as_deref().unwrap_or("No description"));
                if let Some(usage) = &cmd.usage {
                    help.push_str(&format!("\nUsage: {}{}", self.prefix, usage));
                }
                return help;
            }
            return format!("Command {} not found", name);
        }

        let mut help = "Available commands:".to_string();
        for cmd in self.registry.all() {
            let usage = cmd.usage.as_deref().unwrap_or(&cmd.name);
            help.push_str(&format!("\n  {}{} - {}", self.prefix, usage, cmd.description.as_deref().unwrap_or("")));
        }
        help
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ChannelTarget;

    fn message(text: &str) -> Message {
        Message::new(ChannelTarget::private("1"), text)
    }

    #[tokio::test]
    async fn test_version_command() {
        let mut service = CommandService::new("");
        service.register_defaults();
        let reply = service.handle(&message("version")).await.unwrap().unwrap();
        assert!(reply.starts_with("watch-bot v"));
    }

    #[tokio::test]
    async fn test_non_command_is_ignored() {
        let mut service = CommandService::new("");
        service.register_defaults();
        assert_eq!(service.handle(&message("good morning")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_prefix_required_when_configured() {
        let mut service = CommandService::new("/");
        service.register_defaults();
        assert_eq!(service.handle(&message("version")).await.unwrap(), None);
        assert!(service.handle(&message("/version")).await.unwrap().is_some());
        assert!(service.handle(&message("/ version")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_help_lists_commands() {
        let mut service = CommandService::new("");
        service.register_defaults();
        let help = service.handle(&message("help")).await.unwrap().unwrap();
        assert!(help.starts_with("Available commands:"));
        assert!(help.contains("help [command] - Show help message"));
        assert!(help.contains("version - Show bot version"));

        let single = service.handle(&message("help version")).await.unwrap().unwrap();
        assert_eq!(single, "version - Show bot version");
        assert_eq!(service.handle(&message("helpful")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let mut service = CommandService::new("");
        service.register(Command::new("fail")
            .with_trigger(Trigger::exact("fail"))
            .with_reply(|_, _| Err(CommandError::ExecutionFailed("boom".to_string()))));
        let err = service.handle(&message("fail")).await.unwrap_err();
        assert_eq!(err.user_message(), "boom");
    }
}
