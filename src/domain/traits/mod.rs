//! Domain traits - Abstractions for infrastructure implementations

pub mod bot;
pub mod source;
pub mod store;

pub use bot::{Bot, BotInfo};
pub use source::UpdateSource;
pub use store::TargetStore;
