//! Typed records for the response shapes consumed from the dynamics API.
//!
//! Every field defaults when absent; a shape yields `None` when the payload
//! carries no usable record.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::application::errors::FetchError;
use crate::domain::entities::LatestState;

/// One way of asking the API for the latest item, tried in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `dynamic_svr/v1/dynamic_svr/space_history`
    SpaceHistory,
    /// `x/polymer/web-dynamic/v1/feed/space`
    PolymerFeed,
}

impl ResponseShape {
    /// Query parameters identifying `entity_id` for this endpoint
    pub fn query(&self, entity_id: i64) -> Vec<(&'static str, String)> {
        match self {
            ResponseShape::SpaceHistory => vec![
                ("host_uid", entity_id.to_string()),
                ("offset_dynamic_id", "0".to_string()),
            ],
            ResponseShape::PolymerFeed => vec![("host_mid", entity_id.to_string())],
        }
    }

    pub fn parse(&self, body: &[u8]) -> Result<Option<LatestState>, FetchError> {
        match self {
            ResponseShape::SpaceHistory => {
                let resp: SpaceHistoryResponse = decode(body)?;
                Ok(resp.into_latest())
            }
            ResponseShape::PolymerFeed => {
                let resp: PolymerFeedResponse = decode(body)?;
                Ok(resp.into_latest())
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResponseShape::SpaceHistory => "space_history",
            ResponseShape::PolymerFeed => "polymer_feed",
        }
    }
}

fn decode<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, FetchError> {
    serde_json::from_slice(body).map_err(|e| FetchError::Parse(e.to_string()))
}

/// Ids arrive as strings or numbers depending on endpoint revision
fn value_to_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

fn value_to_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let secs = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp(secs, 0)
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SpaceHistoryResponse {
    code: Option<i64>,
    data: Option<SpaceHistoryData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SpaceHistoryData {
    cards: Vec<SpaceHistoryCard>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SpaceHistoryCard {
    desc: CardDesc,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CardDesc {
    dynamic_id_str: Value,
    dynamic_id: Value,
    timestamp: Value,
    user_profile: UserProfile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserProfile {
    info: ProfileInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProfileInfo {
    uname: Option<String>,
}

impl SpaceHistoryResponse {
    fn into_latest(self) -> Option<LatestState> {
        if self.code != Some(0) {
            return None;
        }
        let desc = self.data?.cards.into_iter().next()?.desc;
        let version = value_to_string(&desc.dynamic_id_str)
            .or_else(|| value_to_string(&desc.dynamic_id))?;
        Some(LatestState {
            version,
            display_name: non_empty(desc.user_profile.info.uname),
            published_at: value_to_timestamp(&desc.timestamp),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PolymerFeedResponse {
    code: Option<i64>,
    data: Option<PolymerFeedData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PolymerFeedData {
    items: Vec<PolymerItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PolymerItem {
    id_str: Value,
    id: Value,
    basic: PolymerBasic,
    modules: PolymerModules,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PolymerBasic {
    comment_id_str: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PolymerModules {
    module_author: ModuleAuthor,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModuleAuthor {
    name: Option<String>,
    pub_ts: Value,
}

impl PolymerFeedResponse {
    fn into_latest(self) -> Option<LatestState> {
        if self.code != Some(0) {
            return None;
        }
        let item = self.data?.items.into_iter().next()?;
        let version = value_to_string(&item.id_str)
            .or_else(|| value_to_string(&item.id))
            .or_else(|| value_to_string(&item.basic.comment_id_str))?;
        let author = item.modules.module_author;
        Some(LatestState {
            version,
            display_name: non_empty(author.name),
            published_at: value_to_timestamp(&author.pub_ts),
        })
    }
}
