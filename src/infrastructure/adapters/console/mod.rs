//! Console adapter for development/testing

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use crate::domain::entities::ChannelTarget;
use crate::domain::traits::{Bot, BotInfo};
use crate::application::errors::BotError;

/// Chat id used for everything typed on the console
pub const CONSOLE_CHAT: &str = "console";

/// Console bot adapter for local development
pub struct ConsoleAdapter {
    info: BotInfo,
    stdin: Mutex<BufReader<Stdin>>,
}

impl ConsoleAdapter {
    pub fn new() -> Self {
        Self {
            info: BotInfo {
                id: "console".to_string(),
                name: "watch-bot".to_string(),
                username: "console".to_string(),
            },
            stdin: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }

    /// The chat console input is attributed to
    pub fn channel(&self) -> ChannelTarget {
        ChannelTarget::private(CONSOLE_CHAT)
    }

    /// Next trimmed input line, `None` on end of input
    pub async fn read_line(&self) -> Option<String> {
        let mut input = String::new();
        let mut stdin = self.stdin.lock().await;
        match stdin.read_line(&mut input).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(input.trim().to_string()),
        }
    }
}

impl Default for ConsoleAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bot for ConsoleAdapter {
    async fn start(&self) -> Result<(), BotError> {
        tracing::info!("Starting console bot (dev mode)");
        Ok(())
    }

    async fn send_message(&self, target: &ChannelTarget, text: &str) -> Result<String, BotError> {
        println!("[BOT -> {}] {}", target, text);
        Ok("console_msg".to_string())
    }

    fn bot_info(&self) -> BotInfo {
        self.info.clone()
    }
}
