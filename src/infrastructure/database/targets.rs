//! Tracker tables: tracked entities and their subscriptions

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Database, Record, SqlValue};
use crate::application::errors::StorageError;
use crate::domain::entities::{ChannelTarget, ChannelType, Subscription, TrackedEntity};
use crate::domain::traits::TargetStore;

const CREATE_TARGETS: &str = "CREATE TABLE IF NOT EXISTS targets (
    entity_id INTEGER PRIMARY KEY,
    display_name TEXT,
    last_seen_version TEXT,
    updated_at TEXT
)";

const CREATE_SUBSCRIPTIONS: &str = "CREATE TABLE IF NOT EXISTS subscriptions (
    entity_id INTEGER NOT NULL,
    channel_type TEXT NOT NULL,
    channel_id TEXT NOT NULL,
    added_by TEXT,
    created_at TEXT,
    PRIMARY KEY (entity_id, channel_type, channel_id)
)";

const TARGET_COLUMNS: &str = "entity_id, display_name, last_seen_version, updated_at";

/// [`TargetStore`] backed by the embedded database
#[derive(Debug, Clone)]
pub struct SqliteTargetStore {
    db: Database,
}

impl SqliteTargetStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn now_ts() -> SqlValue {
    SqlValue::from(Utc::now().to_rfc3339())
}

fn parse_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn target_from_record(record: &Record) -> Result<TrackedEntity, StorageError> {
    Ok(TrackedEntity {
        id: record.get_i64("entity_id")?,
        display_name: record.get_opt_str("display_name")?,
        last_seen_version: record.get_opt_str("last_seen_version")?,
        last_updated_at: parse_ts(record.get_opt_str("updated_at")?),
    })
}

fn subscription_from_record(record: &Record) -> Result<Subscription, StorageError> {
    let channel_type = record
        .get_str("channel_type")?
        .parse::<ChannelType>()
        .map_err(StorageError::Column)?;
    Ok(Subscription {
        entity_id: record.get_i64("entity_id")?,
        channel: ChannelTarget {
            channel_type,
            channel_id: record.get_str("channel_id")?,
        },
        added_by: record.get_opt_str("added_by")?,
        created_at: parse_ts(record.get_opt_str("created_at")?).unwrap_or_else(Utc::now),
    })
}

#[async_trait]
impl TargetStore for SqliteTargetStore {
    async fn init(&self) -> Result<(), StorageError> {
        self.db.create_table(CREATE_TARGETS).await?;
        self.db.create_table(CREATE_SUBSCRIPTIONS).await?;
        Ok(())
    }

    async fn upsert_target(&self, id: i64, display_name: Option<&str>) -> Result<(), StorageError> {
        self.db
            .execute_write(
                "INSERT INTO targets (entity_id, display_name, last_seen_version, updated_at) \
                 VALUES (?1, ?2, NULL, ?3) \
                 ON CONFLICT(entity_id) DO UPDATE SET \
                 display_name = COALESCE(excluded.display_name, targets.display_name), \
                 updated_at = excluded.updated_at",
                vec![
                    SqlValue::from(id),
                    SqlValue::from(display_name.map(str::to_string)),
                    now_ts(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn set_last_version(&self, id: i64, version: &str) -> Result<(), StorageError> {
        self.db
            .execute_write(
                "UPDATE targets SET last_seen_version = ?1, updated_at = ?2 WHERE entity_id = ?3",
                vec![SqlValue::from(version.to_string()), now_ts(), SqlValue::from(id)],
            )
            .await?;
        Ok(())
    }

    async fn refresh_display_name(&self, id: i64, display_name: &str) -> Result<(), StorageError> {
        self.db
            .execute_write(
                "UPDATE targets SET display_name = ?1, updated_at = ?2 \
                 WHERE entity_id = ?3 AND display_name IS NOT ?1",
                vec![SqlValue::from(display_name.to_string()), now_ts(), SqlValue::from(id)],
            )
            .await?;
        Ok(())
    }

    async fn get_target(&self, id: i64) -> Result<Option<TrackedEntity>, StorageError> {
        let record = self
            .db
            .fetch_one(
                format!("SELECT {} FROM targets WHERE entity_id = ?1", TARGET_COLUMNS),
                vec![SqlValue::from(id)],
            )
            .await?;
        record.as_ref().map(target_from_record).transpose()
    }

    async fn find_target_by_name(&self, name: &str) -> Result<Option<TrackedEntity>, StorageError> {
        let record = self
            .db
            .fetch_one(
                format!(
                    "SELECT {} FROM targets WHERE display_name = ?1 COLLATE NOCASE \
                     ORDER BY entity_id ASC",
                    TARGET_COLUMNS
                ),
                vec![SqlValue::from(name.to_string())],
            )
            .await?;
        record.as_ref().map(target_from_record).transpose()
    }

    async fn list_targets(&self) -> Result<Vec<TrackedEntity>, StorageError> {
        let records = self
            .db
            .fetch_all(
                format!("SELECT {} FROM targets ORDER BY entity_id ASC", TARGET_COLUMNS),
                vec![],
            )
            .await?;
        records.iter().map(target_from_record).collect()
    }

    async fn add_subscription(&self, subscription: &Subscription) -> Result<bool, StorageError> {
        let outcome = self
            .db
            .execute_write(
                "INSERT OR IGNORE INTO subscriptions \
                 (entity_id, channel_type, channel_id, added_by, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                vec![
                    SqlValue::from(subscription.entity_id),
                    SqlValue::from(subscription.channel.channel_type.as_str().to_string()),
                    SqlValue::from(subscription.channel.channel_id.clone()),
                    SqlValue::from(subscription.added_by.clone()),
                    SqlValue::from(subscription.created_at.to_rfc3339()),
                ],
            )
            .await?;
        Ok(outcome.affected_rows > 0)
    }

    async fn subscriptions_for(&self, id: i64) -> Result<Vec<Subscription>, StorageError> {
        let records = self
            .db
            .fetch_all(
                "SELECT entity_id, channel_type, channel_id, added_by, created_at \
                 FROM subscriptions WHERE entity_id = ?1 \
                 ORDER BY channel_type, channel_id",
                vec![SqlValue::from(id)],
            )
            .await?;
        records.iter().map(subscription_from_record).collect()
    }

    async fn delete_target(&self, id: i64) -> Result<bool, StorageError> {
        self.db
            .execute_write(
                "DELETE FROM subscriptions WHERE entity_id = ?1",
                vec![SqlValue::from(id)],
            )
            .await?;
        let outcome = self
            .db
            .execute_write("DELETE FROM targets WHERE entity_id = ?1", vec![SqlValue::from(id)])
            .await?;
        Ok(outcome.affected_rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::tests::temp_dir;

    async fn store() -> SqliteTargetStore {
        let store = SqliteTargetStore::new(Database::open(temp_dir(), "tracker.db").unwrap());
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_init_twice() {
        let store = store().await;
        store.init().await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_keeps_name_and_version() {
        let store = store().await;
        store.upsert_target(7, Some("alice")).await.unwrap();
        store.set_last_version(7, "v1").await.unwrap();
        store.upsert_target(7, None).await.unwrap();

        let target = store.get_target(7).await.unwrap().unwrap();
        assert_eq!(target.display_name.as_deref(), Some("alice"));
        assert_eq!(target.last_seen_version.as_deref(), Some("v1"));
        assert!(target.last_updated_at.is_some());

        store.upsert_target(7, Some("alice2")).await.unwrap();
        let target = store.get_target(7).await.unwrap().unwrap();
        assert_eq!(target.display_name.as_deref(), Some("alice2"));
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_id() {
        let store = store().await;
        for id in [30, 10, 20] {
            store.upsert_target(id, None).await.unwrap();
        }
        let ids: Vec<i64> = store.list_targets().await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_find_by_name_ignores_case() {
        let store = store().await;
        store.upsert_target(1, Some("Alice")).await.unwrap();
        let found = store.find_target_by_name("alice").await.unwrap().unwrap();
        assert_eq!(found.id, 1);
        assert!(store.find_target_by_name("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_subscription_is_noop() {
        let store = store().await;
        store.upsert_target(1, None).await.unwrap();
        let sub = Subscription::new(1, ChannelTarget::group("100")).with_added_by("u1");

        assert!(store.add_subscription(&sub).await.unwrap());
        assert!(!store.add_subscription(&sub).await.unwrap());
        assert!(store
            .add_subscription(&Subscription::new(1, ChannelTarget::private("100")))
            .await
            .unwrap());

        let subs = store.subscriptions_for(1).await.unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].channel, ChannelTarget::group("100"));
        assert_eq!(subs[0].added_by.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_subscriptions() {
        let store = store().await;
        store.upsert_target(12345, None).await.unwrap();
        store.upsert_target(2, None).await.unwrap();
        store
            .add_subscription(&Subscription::new(12345, ChannelTarget::group("1")))
            .await
            .unwrap();
        store
            .add_subscription(&Subscription::new(2, ChannelTarget::group("1")))
            .await
            .unwrap();

        assert!(store.delete_target(12345).await.unwrap());
        assert!(!store.delete_target(12345).await.unwrap());

        assert!(store.get_target(12345).await.unwrap().is_none());
        assert!(store.subscriptions_for(12345).await.unwrap().is_empty());
        assert_eq!(store.subscriptions_for(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = temp_dir();
        let store = SqliteTargetStore::new(Database::open(&dir, "tracker.db").unwrap());
        store.init().await.unwrap();
        store.upsert_target(5, Some("eve")).await.unwrap();
        store.set_last_version(5, "abc").await.unwrap();
        drop(store);

        let reopened = SqliteTargetStore::new(Database::open(&dir, "tracker.db").unwrap());
        reopened.init().await.unwrap();
        let target = reopened.get_target(5).await.unwrap().unwrap();
        assert_eq!(target.last_seen_version.as_deref(), Some("abc"));
    }
}
