//! Domain entities - Core business objects with no external dependencies

pub mod command;
pub mod message;
pub mod subscription;
pub mod target;

pub use command::{Command, CommandHandler, CommandRegistry, Trigger};
pub use message::{Message, Sender};
pub use subscription::{ChannelTarget, ChannelType, Subscription};
pub use target::{LatestState, TrackedEntity};
