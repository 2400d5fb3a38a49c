//! Change-detection poller
//!
//! One tick walks every tracked entity in id order, compares the latest
//! external version with the stored latch and notifies subscribers on change.
//! Failures are isolated per entity and per subscription; nothing escapes a
//! tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::application::errors::DeliveryError;
use crate::domain::entities::{LatestState, TrackedEntity};
use crate::domain::traits::{Bot, TargetStore, UpdateSource};

/// Run state owned by one poller
#[derive(Debug, Default)]
pub struct PollerState {
    pub warmup_completed: bool,
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick ran as the initial warmup
    pub warmup: bool,
    pub checked: usize,
    /// Entities seen for the first time, recorded without notification
    pub baselined: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub fetch_failed: usize,
    pub storage_failed: usize,
    pub delivered: usize,
    pub delivery_failed: usize,
}

/// Notification text for one new item
pub fn format_notification(kind: &str, label: &str, state: &LatestState, link: &str) -> String {
    let mut text = format!("{} update: {}\n", kind, label);
    if let Some(at) = state.published_at {
        text.push_str(&format!("published: {}\n", at.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    text.push_str(link);
    text
}

pub struct ChangePoller {
    store: Arc<dyn TargetStore>,
    source: Arc<dyn UpdateSource>,
    bot: Arc<dyn Bot>,
    fetch_timeout: Duration,
    state: Mutex<PollerState>,
}

impl ChangePoller {
    pub fn new(
        store: Arc<dyn TargetStore>,
        source: Arc<dyn UpdateSource>,
        bot: Arc<dyn Bot>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            source,
            bot,
            fetch_timeout,
            state: Mutex::new(PollerState::default()),
        }
    }

    pub async fn warmup_completed(&self) -> bool {
        self.state.lock().await.warmup_completed
    }

    /// Runs one tick. Returns `None` when another tick of this poller is
    /// still in progress; the request is skipped rather than queued.
    pub async fn run_tick(&self) -> Option<TickReport> {
        let Ok(mut state) = self.state.try_lock() else {
            tracing::warn!("Previous poll tick still running, skipping this one");
            return None;
        };

        let mut report = TickReport {
            warmup: !state.warmup_completed,
            ..TickReport::default()
        };

        match self.store.list_targets().await {
            Ok(targets) => {
                tracing::debug!("Polling {} targets", targets.len());
                for target in &targets {
                    self.poll_entity(target, &mut report).await;
                }
            }
            Err(e) => {
                tracing::warn!("Failed to load targets: {}", e);
                report.storage_failed += 1;
            }
        }

        state.warmup_completed = true;
        tracing::info!(
            warmup = report.warmup,
            checked = report.checked,
            updated = report.updated,
            baselined = report.baselined,
            fetch_failed = report.fetch_failed,
            "Poll tick finished"
        );
        Some(report)
    }

    async fn poll_entity(&self, target: &TrackedEntity, report: &mut TickReport) {
        report.checked += 1;

        let latest = match tokio::time::timeout(self.fetch_timeout, self.source.latest(target.id)).await {
            Ok(Ok(latest)) => latest,
            Ok(Err(e)) => {
                tracing::warn!("Fetch failed for {}: {}", target, e);
                report.fetch_failed += 1;
                return;
            }
            Err(_) => {
                tracing::warn!("Fetch for {} timed out after {:?}", target, self.fetch_timeout);
                report.fetch_failed += 1;
                return;
            }
        };

        if let Some(name) = latest.display_name.as_deref() {
            if target.display_name.as_deref() != Some(name) {
                if let Err(e) = self.store.refresh_display_name(target.id, name).await {
                    tracing::warn!("Failed to refresh name of {}: {}", target, e);
                    report.storage_failed += 1;
                }
            }
        }

        match target.last_seen_version.as_deref() {
            None => {
                // First sighting is recorded silently, during warmup or not.
                if let Err(e) = self.store.set_last_version(target.id, &latest.version).await {
                    tracing::warn!("Failed to record baseline of {}: {}", target, e);
                    report.storage_failed += 1;
                    return;
                }
                tracing::info!(
                    "Recorded baseline {} for {} ({})",
                    latest.version,
                    target,
                    if report.warmup { "warmup" } else { "first seen" }
                );
                report.baselined += 1;
            }
            Some(previous) if previous == latest.version => {
                tracing::debug!("No update for {}", target);
                report.unchanged += 1;
            }
            Some(previous) => {
                if let Err(e) = self.store.set_last_version(target.id, &latest.version).await {
                    tracing::warn!("Failed to store new version of {}: {}", target, e);
                    report.storage_failed += 1;
                    return;
                }
                tracing::info!("New version for {}: {} -> {}", target, previous, latest.version);
                report.updated += 1;

                let label = latest
                    .display_name
                    .clone()
                    .unwrap_or_else(|| target.label());
                self.notify(target, &label, &latest, report).await;
            }
        }
    }

    async fn notify(
        &self,
        target: &TrackedEntity,
        label: &str,
        latest: &LatestState,
        report: &mut TickReport,
    ) {
        let subscriptions = match self.store.subscriptions_for(target.id).await {
            Ok(subs) => subs,
            Err(e) => {
                tracing::warn!("Failed to load subscribers of {}: {}", target, e);
                report.storage_failed += 1;
                return;
            }
        };

        let link = self.source.canonical_link(&latest.version);
        let text = format_notification(self.source.kind(), label, latest, &link);

        for sub in &subscriptions {
            match self.bot.send_message(&sub.channel, &text).await {
                Ok(_) => report.delivered += 1,
                Err(source) => {
                    let err = DeliveryError {
                        target: sub.channel.to_string(),
                        source,
                    };
                    tracing::warn!("Update of {} not delivered: {}", target, err);
                    report.delivery_failed += 1;
                }
            }
        }
    }
}

/// Fixed-interval timer driving a [`ChangePoller`]
pub struct PollScheduler {
    poller: Arc<ChangePoller>,
    interval: Duration,
    running: AtomicBool,
}

impl PollScheduler {
    pub fn new(poller: Arc<ChangePoller>, interval: Duration) -> Arc<Self> {
        tracing::info!("Initializing poll scheduler with interval {:?}", interval);
        Arc::new(Self {
            poller,
            interval,
            running: AtomicBool::new(false),
        })
    }

    /// Starts the timer loop once. The first tick fires immediately.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            return None;
        }
        tracing::info!("Starting poll loop");

        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !this.running.load(Ordering::SeqCst) {
                    tracing::info!("Stopping poll loop");
                    break;
                }
                // Ticks run detached so a slow one makes the next find the
                // poller busy and skip.
                let poller = Arc::clone(&this.poller);
                tokio::spawn(async move {
                    poller.run_tick().await;
                });
            }
        }))
    }

    /// The loop exits at its next tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::application::errors::{BotError, FetchError};
    use crate::domain::entities::{ChannelTarget, Subscription};
    use crate::domain::traits::BotInfo;
    use crate::infrastructure::storage::MemoryStore;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::AtomicUsize;

    /// Source returning scripted states, optionally slow
    #[derive(Default)]
    pub(crate) struct FakeSource {
        states: std::sync::Mutex<HashMap<i64, LatestState>>,
        delay: Option<Duration>,
        pub(crate) calls: AtomicUsize,
        in_flight: AtomicUsize,
        pub(crate) max_in_flight: AtomicUsize,
    }

    impl FakeSource {
        pub(crate) fn with_delay(delay: Duration) -> Self {
            Self { delay: Some(delay), ..Self::default() }
        }

        pub(crate) fn set(&self, id: i64, state: LatestState) {
            self.states.lock().unwrap().insert(id, state);
        }

        pub(crate) fn set_version(&self, id: i64, version: &str) {
            self.set(id, LatestState::new(version));
        }

        pub(crate) fn remove(&self, id: i64) {
            self.states.lock().unwrap().remove(&id);
        }
    }

    #[async_trait]
    impl UpdateSource for FakeSource {
        fn kind(&self) -> &str {
            "Test feed"
        }

        async fn latest(&self, entity_id: i64) -> Result<LatestState, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.states
                .lock()
                .unwrap()
                .get(&entity_id)
                .cloned()
                .ok_or(FetchError::NoRecords(entity_id))
        }

        fn canonical_link(&self, version: &str) -> String {
            format!("https://example.test/{}", version)
        }
    }

    /// Bot recording deliveries; chats in `failing` reject messages
    #[derive(Default)]
    pub(crate) struct RecordingBot {
        pub(crate) sent: std::sync::Mutex<Vec<(ChannelTarget, String)>>,
        pub(crate) failing: HashSet<ChannelTarget>,
    }

    impl RecordingBot {
        pub(crate) fn sent(&self) -> Vec<(ChannelTarget, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Bot for RecordingBot {
        async fn start(&self) -> Result<(), BotError> {
            Ok(())
        }

        async fn send_message(&self, target: &ChannelTarget, text: &str) -> Result<String, BotError> {
            self.sent.lock().unwrap().push((target.clone(), text.to_string()));
            if self.failing.contains(target) {
                return Err(BotError::Network("chat rejected message".to_string()));
            }
            Ok("1".to_string())
        }

        fn bot_info(&self) -> BotInfo {
            BotInfo {
                id: "test".to_string(),
                name: "test".to_string(),
                username: "test".to_string(),
            }
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        source: Arc<FakeSource>,
        bot: Arc<RecordingBot>,
        poller: ChangePoller,
    }

    fn harness_with(source: FakeSource, bot: RecordingBot) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(source);
        let bot = Arc::new(bot);
        let poller = ChangePoller::new(
            store.clone(),
            source.clone(),
            bot.clone(),
            Duration::from_secs(5),
        );
        Harness { store, source, bot, poller }
    }

    fn harness() -> Harness {
        harness_with(FakeSource::default(), RecordingBot::default())
    }

    async fn subscribe(store: &MemoryStore, id: i64, chat: &str) {
        store.upsert_target(id, None).await.unwrap();
        store
            .add_subscription(&Subscription::new(id, ChannelTarget::group(chat)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_warmup_then_update_scenario() {
        let h = harness();
        subscribe(&h.store, 12345, "g1").await;
        subscribe(&h.store, 12345, "g2").await;

        h.source.set_version(12345, "abc");
        let first = h.poller.run_tick().await.unwrap();
        assert!(first.warmup);
        assert_eq!(first.baselined, 1);
        assert!(h.bot.sent().is_empty());
        let stored = h.store.get_target(12345).await.unwrap().unwrap();
        assert_eq!(stored.last_seen_version.as_deref(), Some("abc"));
        assert!(h.poller.warmup_completed().await);

        h.source.set_version(12345, "xyz");
        let writes = h.store.write_count().await;
        let second = h.poller.run_tick().await.unwrap();
        assert_eq!(h.store.write_count().await, writes + 1);
        assert!(!second.warmup);
        assert_eq!(second.updated, 1);
        assert_eq!(second.delivered, 2);

        let sent = h.bot.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(_, text)| text.contains("xyz")));
        let stored = h.store.get_target(12345).await.unwrap().unwrap();
        assert_eq!(stored.last_seen_version.as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn test_unchanged_version_no_write_no_notification() {
        let h = harness();
        subscribe(&h.store, 1, "g").await;
        h.source.set_version(1, "v1");
        h.poller.run_tick().await.unwrap();

        let writes = h.store.write_count().await;
        let report = h.poller.run_tick().await.unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(h.store.write_count().await, writes);
        assert!(h.bot.sent().is_empty());
    }

    #[tokio::test]
    async fn test_entity_added_mid_run_is_silent() {
        let h = harness();
        h.poller.run_tick().await.unwrap();

        subscribe(&h.store, 9, "g").await;
        h.source.set_version(9, "first");
        let report = h.poller.run_tick().await.unwrap();
        assert!(!report.warmup);
        assert_eq!(report.baselined, 1);
        assert!(h.bot.sent().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_isolated() {
        let bot = RecordingBot {
            failing: [ChannelTarget::group("bad")].into_iter().collect(),
            ..RecordingBot::default()
        };
        let h = harness_with(FakeSource::default(), bot);
        subscribe(&h.store, 1, "bad").await;
        subscribe(&h.store, 1, "good").await;
        h.source.set_version(1, "a");
        h.poller.run_tick().await.unwrap();

        h.source.set_version(1, "b");
        let writes = h.store.write_count().await;
        let report = h.poller.run_tick().await.unwrap();
        assert_eq!(h.store.write_count().await, writes + 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.delivery_failed, 1);
        assert_eq!(h.bot.sent().len(), 2);

        let stored = h.store.get_target(1).await.unwrap().unwrap();
        assert_eq!(stored.last_seen_version.as_deref(), Some("b"));

        // Committed version is not rolled back, so the next tick is quiet.
        let report = h.poller.run_tick().await.unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(h.bot.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_does_not_abort_tick() {
        let h = harness();
        for id in [1, 2, 3] {
            subscribe(&h.store, id, "g").await;
            h.source.set_version(id, "v1");
        }
        h.poller.run_tick().await.unwrap();

        h.source.remove(2);
        h.source.set_version(1, "v2");
        h.source.set_version(3, "v2");
        let report = h.poller.run_tick().await.unwrap();
        assert_eq!(report.checked, 3);
        assert_eq!(report.fetch_failed, 1);
        assert_eq!(report.updated, 2);
        assert_eq!(h.bot.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_timeout_counts_as_failure() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(FakeSource::with_delay(Duration::from_millis(200)));
        let poller = ChangePoller::new(
            store.clone(),
            source.clone(),
            Arc::new(RecordingBot::default()),
            Duration::from_millis(20),
        );
        store.upsert_target(1, None).await.unwrap();
        source.set_version(1, "v");

        let report = poller.run_tick().await.unwrap();
        assert_eq!(report.fetch_failed, 1);
        assert!(store.get_target(1).await.unwrap().unwrap().last_seen_version.is_none());
    }

    #[tokio::test]
    async fn test_display_name_refreshed() {
        let h = harness();
        subscribe(&h.store, 1, "g").await;
        h.source.set(1, LatestState::new("v1").with_display_name("alice"));
        h.poller.run_tick().await.unwrap();
        assert_eq!(
            h.store.get_target(1).await.unwrap().unwrap().display_name.as_deref(),
            Some("alice")
        );

        h.source.set(1, LatestState::new("v2").with_display_name("alice"));
        h.poller.run_tick().await.unwrap();
        let sent = h.bot.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.starts_with("Test feed update: alice\n"));
        assert!(sent[0].1.ends_with("https://example.test/v2"));
    }

    #[tokio::test]
    async fn test_concurrent_ticks_do_not_overlap() {
        let h = harness_with(
            FakeSource::with_delay(Duration::from_millis(100)),
            RecordingBot::default(),
        );
        for id in [1, 2] {
            subscribe(&h.store, id, "g").await;
            h.source.set_version(id, "v");
        }

        let (a, b) = tokio::join!(h.poller.run_tick(), h.poller.run_tick());
        assert_eq!(a.is_some() as u8 + b.is_some() as u8, 1);
        assert_eq!(h.source.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_entities_polled_in_id_order() {
        let h = harness();
        for id in [30, 10, 20] {
            subscribe(&h.store, id, &id.to_string()).await;
            h.source.set_version(id, "a");
        }
        h.poller.run_tick().await.unwrap();
        for id in [30, 10, 20] {
            h.source.set_version(id, "b");
        }
        h.poller.run_tick().await.unwrap();

        let order: Vec<String> = h.bot.sent().into_iter().map(|(t, _)| t.channel_id).collect();
        assert_eq!(order, vec!["10", "20", "30"]);
    }

    #[test]
    fn test_format_notification() {
        let published = chrono::DateTime::from_timestamp(1700000000, 0).unwrap();
        let state = LatestState::new("xyz").with_published_at(published);
        let text = format_notification("Bilibili dynamic", "alice", &state, "https://t.bilibili.com/xyz");
        assert_eq!(
            text,
            "Bilibili dynamic update: alice\npublished: 2023-11-14 22:13:20 UTC\nhttps://t.bilibili.com/xyz"
        );

        let text = format_notification("K", "1", &LatestState::new("v"), "link");
        assert_eq!(text, "K update: 1\nlink");
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_ticks_and_stops() {
        let h = harness();
        subscribe(&h.store, 1, "g").await;
        h.source.set_version(1, "v");
        let poller = Arc::new(h.poller);

        let scheduler = PollScheduler::new(poller.clone(), Duration::from_secs(90));
        let handle = scheduler.start().unwrap();
        assert!(scheduler.start().is_none());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(poller.warmup_completed().await);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 2);

        scheduler.stop();
        tokio::time::sleep(Duration::from_secs(90)).await;
        handle.await.unwrap();
        assert!(!scheduler.is_running());
    }
}
