//! Application layer errors

use thiserror::Error;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Source error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Command execution errors
#[derive(Error, Debug)]
pub enum CommandError {
    /// Malformed user input. The payload is the usage hint shown to the user.
    #[error("{0}")]
    Validation(String),

    #[error("Command not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

impl CommandError {
    /// Text safe to send back to the chat. Internal details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            CommandError::Validation(usage) => usage.clone(),
            CommandError::NotFound(name) => format!("Unknown command: {}", name),
            CommandError::Storage(_) => "Storage failure, please try again later.".to_string(),
            CommandError::ExecutionFailed(msg) => msg.clone(),
        }
    }
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid schema statement: {0}")]
    Schema(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Column error: {0}")]
    Column(String),

    #[error("Blocking task failed: {0}")]
    Task(String),
}

/// Errors reaching or decoding the external source
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("No parseable records for entity {0}")]
    NoRecords(i64),
}

/// Failure to deliver one notification to one subscriber
#[derive(Error, Debug)]
#[error("Delivery to {target} failed: {source}")]
pub struct DeliveryError {
    pub target: String,
    #[source]
    pub source: BotError,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
