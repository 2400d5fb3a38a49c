//! Chat commands for managing tracked entities

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::sync::Arc;

use super::command_service::CommandService;
use super::poller::format_notification;
use crate::application::errors::CommandError;
use crate::domain::entities::{Command, CommandHandler, Message, Subscription, TrackedEntity, Trigger};
use crate::domain::traits::{TargetStore, UpdateSource};

static ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{1,20}").expect("static regex"));
static SHOW_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^show\s+(.+?)\s+latest$").expect("static regex"));

const ADD_USAGE: &str = "Usage: add target <id>[,<id>...]";
const DELETE_USAGE: &str = "Usage: delete target <id>[,<id>...]";

/// Extracts entity ids from a comma separated list.
///
/// Full-width digits and commas are accepted, as is one leading plus sign.
/// Each token contributes its first run of digits; duplicates keep their
/// first position.
pub fn extract_ids(text: &str) -> Vec<i64> {
    let text = text.trim();
    let text = text.strip_prefix(['+', '＋']).unwrap_or(text);
    let text: String = text.chars().map(fold_full_width_digit).collect();

    let mut ids = Vec::new();
    for token in text.split([',', '，']) {
        let Some(m) = ID_PATTERN.find(token) else {
            continue;
        };
        if let Ok(id) = m.as_str().parse::<i64>() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

fn fold_full_width_digit(c: char) -> char {
    match c {
        '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
        _ => c,
    }
}

/// Add, list, delete and show operations over the target store
pub struct TrackerCommands {
    store: Arc<dyn TargetStore>,
    source: Arc<dyn UpdateSource>,
}

impl TrackerCommands {
    pub fn new(store: Arc<dyn TargetStore>, source: Arc<dyn UpdateSource>) -> Arc<Self> {
        Arc::new(Self { store, source })
    }

    /// Registers the tracker commands on `service`
    pub fn register(self: &Arc<Self>, service: &mut CommandService) {
        let handler = |action| TrackerHandler { commands: Arc::clone(self), action };

        service.register(
            Command::new("add-target")
                .with_description("Track entities and notify this chat")
                .with_usage("add target <id>[,<id>...]")
                .with_trigger(Trigger::prefix("add target"))
                .with_handler(handler(TrackerAction::Add)),
        );
        service.register(
            Command::new("list-targets")
                .with_description("List tracked entities")
                .with_usage("list targets")
                .with_trigger(Trigger::exact("list targets"))
                .with_handler(handler(TrackerAction::List)),
        );
        service.register(
            Command::new("delete-target")
                .with_description("Stop tracking entities")
                .with_usage("delete target <id>[,<id>...]")
                .with_trigger(Trigger::prefix("delete target"))
                .with_handler(handler(TrackerAction::Delete)),
        );
        service.register(
            Command::new("show-latest")
                .with_description("Fetch the newest item of an entity")
                .with_usage("show <id|name> latest")
                .with_trigger(Trigger::Pattern(SHOW_PATTERN.clone()))
                .with_handler(handler(TrackerAction::Show)),
        );
    }

    pub async fn add_targets(&self, message: &Message, args: &str) -> Result<String, CommandError> {
        let ids = extract_ids(args);
        if ids.is_empty() {
            return Err(CommandError::Validation(ADD_USAGE.to_string()));
        }

        let mut already_subscribed = 0;
        for &id in &ids {
            let existing = self.store.get_target(id).await?;
            let latest = match self.source.latest(id).await {
                Ok(latest) => Some(latest),
                Err(e) => {
                    tracing::warn!("Could not fetch {} while adding it: {}", id, e);
                    None
                }
            };

            let name = latest.as_ref().and_then(|l| l.display_name.as_deref());
            self.store.upsert_target(id, name).await?;

            let has_baseline = existing.is_some_and(|t| t.last_seen_version.is_some());
            if let (false, Some(latest)) = (has_baseline, latest.as_ref()) {
                self.store.set_last_version(id, &latest.version).await?;
            }

            let mut subscription = Subscription::new(id, message.channel.clone());
            if let Some(user) = message.sender_id() {
                subscription = subscription.with_added_by(user);
            }
            if !self.store.add_subscription(&subscription).await? {
                already_subscribed += 1;
            }
            tracing::info!("Tracking {} for {}", id, message.channel);
        }

        let mut reply = format!("Added {} target(s)", ids.len());
        if already_subscribed > 0 {
            reply.push_str(&format!(", {} already subscribed here", already_subscribed));
        }
        Ok(reply)
    }

    pub async fn list_targets(&self) -> Result<String, CommandError> {
        let targets = self.store.list_targets().await?;
        if targets.is_empty() {
            return Ok("No targets are being tracked".to_string());
        }

        let mut reply = "Tracked targets:".to_string();
        for target in &targets {
            reply.push_str(&format!(
                "\n{} - {}",
                target.id,
                target.display_name.as_deref().unwrap_or("unknown")
            ));
        }
        Ok(reply)
    }

    pub async fn delete_targets(&self, args: &str) -> Result<String, CommandError> {
        let ids = extract_ids(args);
        if ids.is_empty() {
            return Err(CommandError::Validation(DELETE_USAGE.to_string()));
        }

        let mut deleted = 0;
        for &id in &ids {
            if self.store.delete_target(id).await? {
                tracing::info!("Stopped tracking {}", id);
                deleted += 1;
            }
        }
        Ok(format!("Deleted {} target(s)", deleted))
    }

    /// Live fetch; the stored version is left alone
    pub async fn show_latest(&self, name: &str) -> Result<String, CommandError> {
        let target = self
            .resolve(name)
            .await?
            .ok_or_else(|| CommandError::ExecutionFailed(format!("Unknown target: {}", name)))?;

        let latest = self.source.latest(target.id).await.map_err(|e| {
            tracing::warn!("Show latest failed for {}: {}", target, e);
            CommandError::ExecutionFailed(format!(
                "Could not fetch the latest update of {}",
                target.label()
            ))
        })?;

        let label = latest.display_name.clone().unwrap_or_else(|| target.label());
        let link = self.source.canonical_link(&latest.version);
        Ok(format_notification(self.source.kind(), &label, &latest, &link))
    }

    async fn resolve(&self, name: &str) -> Result<Option<TrackedEntity>, CommandError> {
        if let Ok(id) = name.parse::<i64>() {
            if let Some(target) = self.store.get_target(id).await? {
                return Ok(Some(target));
            }
        }
        Ok(self.store.find_target_by_name(name).await?)
    }
}

#[derive(Debug, Clone, Copy)]
enum TrackerAction {
    Add,
    List,
    Delete,
    Show,
}

struct TrackerHandler {
    commands: Arc<TrackerCommands>,
    action: TrackerAction,
}

#[async_trait]
impl CommandHandler for TrackerHandler {
    async fn handle(&self, message: &Message, args: &str) -> Result<String, CommandError> {
        match self.action {
            TrackerAction::Add => self.commands.add_targets(message, args).await,
            TrackerAction::List => self.commands.list_targets().await,
            TrackerAction::Delete => self.commands.delete_targets(args).await,
            TrackerAction::Show => self.commands.show_latest(args).await,
        }
    }
}
