//! In-memory storage implementation

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::application::errors::StorageError;
use crate::domain::entities::{ChannelTarget, Subscription, TrackedEntity};
use crate::domain::traits::TargetStore;

/// Volatile [`TargetStore`] for development and tests
#[derive(Default, Clone)]
pub struct MemoryStore {
    targets: Arc<RwLock<BTreeMap<i64, TrackedEntity>>>,
    subscriptions: Arc<RwLock<BTreeMap<(i64, ChannelTarget), Subscription>>>,
    writes: Arc<RwLock<u64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating calls that changed stored state
    pub async fn write_count(&self) -> u64 {
        *self.writes.read().await
    }

    async fn bump(&self) {
        *self.writes.write().await += 1;
    }
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn init(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn upsert_target(&self, id: i64, display_name: Option<&str>) -> Result<(), StorageError> {
        {
            let mut targets = self.targets.write().await;
            let target = targets.entry(id).or_insert_with(|| TrackedEntity::new(id));
            if let Some(name) = display_name {
                target.display_name = Some(name.to_string());
            }
            target.last_updated_at = Some(Utc::now());
        }
        self.bump().await;
        Ok(())
    }

    async fn set_last_version(&self, id: i64, version: &str) -> Result<(), StorageError> {
        let changed = {
            let mut targets = self.targets.write().await;
            match targets.get_mut(&id) {
                Some(target) => {
                    target.last_seen_version = Some(version.to_string());
                    target.last_updated_at = Some(Utc::now());
                    true
                }
                None => false,
            }
        };
        if changed {
            self.bump().await;
        }
        Ok(())
    }

    async fn refresh_display_name(&self, id: i64, display_name: &str) -> Result<(), StorageError> {
        let changed = {
            let mut targets = self.targets.write().await;
            match targets.get_mut(&id) {
                Some(target) if target.display_name.as_deref() != Some(display_name) => {
                    target.display_name = Some(display_name.to_string());
                    target.last_updated_at = Some(Utc::now());
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.bump().await;
        }
        Ok(())
    }

    async fn get_target(&self, id: i64) -> Result<Option<TrackedEntity>, StorageError> {
        Ok(self.targets.read().await.get(&id).cloned())
    }

    async fn find_target_by_name(&self, name: &str) -> Result<Option<TrackedEntity>, StorageError> {
        let targets = self.targets.read().await;
        Ok(targets
            .values()
            .find(|t| {
                t.display_name
                    .as_deref()
                    .is_some_and(|n| n.to_lowercase() == name.to_lowercase())
            })
            .cloned())
    }

    async fn list_targets(&self) -> Result<Vec<TrackedEntity>, StorageError> {
        Ok(self.targets.read().await.values().cloned().collect())
    }

    async fn add_subscription(&self, subscription: &Subscription) -> Result<bool, StorageError> {
        let inserted = {
            let mut subs = self.subscriptions.write().await;
            let key = (subscription.entity_id, subscription.channel.clone());
            if subs.contains_key(&key) {
                false
            } else {
                subs.insert(key, subscription.clone());
                true
            }
        };
        if inserted {
            self.bump().await;
        }
        Ok(inserted)
    }

    async fn subscriptions_for(&self, id: i64) -> Result<Vec<Subscription>, StorageError> {
        let subs = self.subscriptions.read().await;
        Ok(subs
            .iter()
            .filter(|((entity_id, _), _)| *entity_id == id)
            .map(|(_, sub)| sub.clone())
            .collect())
    }

    async fn delete_target(&self, id: i64) -> Result<bool, StorageError> {
        {
            let mut subs = self.subscriptions.write().await;
            let keys: BTreeSet<_> = subs.keys().filter(|(e, _)| *e == id).cloned().collect();
            for key in keys {
                subs.remove(&key);
            }
        }
        let existed = self.targets.write().await.remove(&id).is_some();
        self.bump().await;
        Ok(existed)
    }
}
