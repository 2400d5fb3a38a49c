//! Application services - Business logic orchestration

pub mod command_service;
pub mod poller;
pub mod tracker_commands;

pub use command_service::CommandService;
pub use poller::{format_notification, ChangePoller, PollScheduler, TickReport};
pub use tracker_commands::{extract_ids, TrackerCommands};
