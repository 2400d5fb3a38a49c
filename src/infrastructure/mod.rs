//! Infrastructure layer - External concerns
//! 
//! This layer contains:
//! - Config: Configuration loading
//! - Database: Embedded SQLite persistence
//! - Storage: In-memory persistence for development and tests
//! - Source: HTTP access to the tracked accounts' API
//! - Adapters: Platform integrations (Telegram, console)

pub mod adapters;
pub mod config;
pub mod database;
pub mod source;
pub mod storage;
