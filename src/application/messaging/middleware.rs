//! Middleware run before a command executes

use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::domain::entities::Message;

/// What a middleware sees about a command invocation
#[derive(Debug, Clone)]
pub struct Context<'a> {
    pub message: &'a Message,
    pub command: &'a str,
    pub chat_key: String,
    pub user_id: Option<String>,
}

impl<'a> Context<'a> {
    pub fn new(message: &'a Message, command: &'a str) -> Self {
        Self {
            message,
            command,
            chat_key: message.channel.to_string(),
            user_id: message.sender_id().map(str::to_string),
        }
    }

    /// Key requests are counted under: the sender, else the chat
    pub fn rate_key(&self) -> &str {
        self.user_id.as_deref().unwrap_or(&self.chat_key)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MiddlewareError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MiddlewareError {
    /// Reply sent back to the chat
    pub fn user_message(&self) -> String {
        match self {
            MiddlewareError::RateLimited { retry_after } => format!(
                "Rate limited. Please try again in {}s.",
                retry_after.as_secs().max(1)
            ),
            MiddlewareError::Internal(_) => "Internal error, please try again later.".to_string(),
        }
    }
}

/// A check applied to every command before it runs
pub trait Middleware: Send + Sync {
    fn check(&self, ctx: &Context<'_>) -> Result<(), MiddlewareError>;
}

/// Sliding-window rate limit per sender
pub struct RateLimitMiddleware {
    requests: std::sync::Mutex<HashMap<String, Vec<Instant>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimitMiddleware {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            requests: std::sync::Mutex::new(HashMap::new()),
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    fn check_rate_limit(&self, key: &str) -> Result<(), MiddlewareError> {
        let mut requests = self.requests.lock()
            .map_err(|_| MiddlewareError::Internal("Lock poisoned".to_string()))?;

        let now = Instant::now();
        // Senders with no request inside the window are forgotten
        requests.retain(|_, times| {
            times.retain(|&t| now.duration_since(t) < self.window);
            !times.is_empty()
        });

        let times = requests.entry(key.to_string()).or_default();

        if times.len() >= self.max_requests as usize {
            let retry_after = times.first()
                .map(|t| self.window.saturating_sub(now.duration_since(*t)))
                .unwrap_or(self.window);
            return Err(MiddlewareError::RateLimited { retry_after });
        }

        times.push(now);
        Ok(())
    }
}

impl Middleware for RateLimitMiddleware {
    fn check(&self, ctx: &Context<'_>) -> Result<(), MiddlewareError> {
        self.check_rate_limit(ctx.rate_key())
    }
}

/// Logs every command invocation
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn check(&self, ctx: &Context<'_>) -> Result<(), MiddlewareError> {
        let preview: String = ctx.message.plaintext().chars().take(50).collect();
        tracing::debug!("[{}] {} <- {}", ctx.chat_key, ctx.command, preview);
        Ok(())
    }
}
