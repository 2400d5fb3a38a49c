use async_trait::async_trait;
use crate::application::errors::FetchError;
use crate::domain::entities::LatestState;

/// Read access to the external service that publishes entity updates
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Human readable kind used in notifications, e.g. "Bilibili dynamic"
    fn kind(&self) -> &str;

    /// Latest observable state of one entity
    async fn latest(&self, entity_id: i64) -> Result<LatestState, FetchError>;

    /// Public link to the item identified by `version`
    fn canonical_link(&self, version: &str) -> String;
}
