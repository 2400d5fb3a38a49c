//! watch-bot - tracks account dynamics and notifies subscribed chats
//!
//! Layers:
//! - `domain`: entities and the traits adapters implement
//! - `application`: polling, chat commands, message dispatch
//! - `infrastructure`: config, SQLite storage, HTTP source, chat adapters

pub mod application;
pub mod domain;
pub mod infrastructure;
