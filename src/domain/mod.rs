//! Domain layer - Core business logic with no external dependencies
//! 
//! This layer contains:
//! - Entities: Core business objects (TrackedEntity, Subscription, Message, Command)
//! - Traits: Abstractions for infrastructure (Bot, TargetStore, UpdateSource)

pub mod entities;
pub mod traits;
