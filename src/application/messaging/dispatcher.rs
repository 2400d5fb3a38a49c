//! Message dispatcher - Routes messages through middleware to commands

use std::sync::Arc;

use super::middleware::{Context, Middleware};
use crate::application::services::CommandService;
use crate::domain::entities::Message;

/// Message dispatcher. Non-command messages are ignored; command failures
/// become reply text so one bad request never reaches the transport loop.
pub struct MessageDispatcher {
    commands: CommandService,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl MessageDispatcher {
    pub fn new(commands: CommandService) -> Self {
        Self {
            commands,
            middleware: Vec::new(),
        }
    }

    /// Add middleware to the chain
    pub fn with_middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Reply for a message, if it warrants one
    pub async fn dispatch(&self, message: &Message) -> Option<String> {
        let (command, args) = self.commands.resolve(message)?;

        let ctx = Context::new(message, &command.name);
        for middleware in &self.middleware {
            if let Err(e) = middleware.check(&ctx) {
                tracing::warn!("[{}] {} rejected: {}", ctx.chat_key, command.name, e);
                return Some(e.user_message());
            }
        }

        match self.commands.execute(command, message, &args).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                tracing::warn!("[{}] {} failed: {}", ctx.chat_key, command.name, e);
                Some(e.user_message())
            }
        }
    }
}
