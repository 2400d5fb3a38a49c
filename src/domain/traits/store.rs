use async_trait::async_trait;
use crate::application::errors::StorageError;
use crate::domain::entities::{Subscription, TrackedEntity};

/// Persistence of tracked entities and their subscriptions
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Create backing tables if they do not exist yet
    async fn init(&self) -> Result<(), StorageError>;

    /// Insert the entity if missing. A `None` name keeps the stored one.
    /// Never touches `last_seen_version`.
    async fn upsert_target(&self, id: i64, display_name: Option<&str>) -> Result<(), StorageError>;

    /// Replace the last-seen version latch
    async fn set_last_version(&self, id: i64, version: &str) -> Result<(), StorageError>;

    async fn refresh_display_name(&self, id: i64, display_name: &str) -> Result<(), StorageError>;

    async fn get_target(&self, id: i64) -> Result<Option<TrackedEntity>, StorageError>;

    /// Case-insensitive lookup by stored display name
    async fn find_target_by_name(&self, name: &str) -> Result<Option<TrackedEntity>, StorageError>;

    /// All entities ordered by id ascending
    async fn list_targets(&self) -> Result<Vec<TrackedEntity>, StorageError>;

    /// Returns `false` when the subscription already existed
    async fn add_subscription(&self, subscription: &Subscription) -> Result<bool, StorageError>;

    async fn subscriptions_for(&self, id: i64) -> Result<Vec<Subscription>, StorageError>;

    /// Removes the entity and all of its subscriptions.
    /// Returns whether the entity existed.
    async fn delete_target(&self, id: i64) -> Result<bool, StorageError>;
}
