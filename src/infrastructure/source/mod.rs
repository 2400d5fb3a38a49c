//! HTTP source for account dynamics
//!
//! Each entity is looked up through an ordered list of endpoints. The first
//! endpoint that yields a parseable record wins; later ones are only asked
//! when the earlier ones fail or come back empty.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, COOKIE, ORIGIN, REFERER};
use reqwest::Client;
use std::time::Duration;

use crate::application::errors::FetchError;
use crate::domain::entities::LatestState;
use crate::domain::traits::UpdateSource;
use crate::infrastructure::config::SourceConfig;

pub mod shapes;

pub use shapes::ResponseShape;

/// One URL plus the shape its responses are decoded with
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: String,
    pub shape: ResponseShape,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, shape: ResponseShape) -> Self {
        Self { url: url.into(), shape }
    }
}

/// [`UpdateSource`] reading the public dynamics API
pub struct DynamicSource {
    client: Client,
    endpoints: Vec<Endpoint>,
    kind: String,
    link_base: String,
    timeout: Duration,
}

impl DynamicSource {
    pub fn new(config: &SourceConfig, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(default_headers(config)?)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            client,
            endpoints: vec![
                Endpoint::new(config.primary_url.clone(), ResponseShape::SpaceHistory),
                Endpoint::new(config.fallback_url.clone(), ResponseShape::PolymerFeed),
            ],
            kind: config.kind.clone(),
            link_base: config.link_base.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    async fn fetch_endpoint(
        &self,
        endpoint: &Endpoint,
        entity_id: i64,
    ) -> Result<Option<LatestState>, FetchError> {
        let response = self
            .client
            .get(&endpoint.url)
            .query(&endpoint.shape.query(entity_id))
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: endpoint.url.clone(),
            });
        }

        let body = response.bytes().await.map_err(|e| self.map_reqwest(e))?;
        endpoint.shape.parse(&body)
    }

    fn map_reqwest(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

fn default_headers(config: &SourceConfig) -> Result<HeaderMap, FetchError> {
    let header = |value: &str| {
        HeaderValue::from_str(value).map_err(|e| FetchError::Network(format!("bad header: {}", e)))
    };

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json,text/plain,*/*"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9"));
    if !config.referer.is_empty() {
        headers.insert(REFERER, header(&config.referer)?);
        headers.insert(ORIGIN, header(config.referer.trim_end_matches('/'))?);
    }
    if let Some(cookie) = config.cookie.as_deref().filter(|c| !c.is_empty()) {
        let mut value = header(cookie)?;
        value.set_sensitive(true);
        headers.insert(COOKIE, value);
    }
    Ok(headers)
}

#[async_trait]
impl UpdateSource for DynamicSource {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn latest(&self, entity_id: i64) -> Result<LatestState, FetchError> {
        let mut last_error = None;
        for endpoint in &self.endpoints {
            match self.fetch_endpoint(endpoint, entity_id).await {
                Ok(Some(state)) => return Ok(state),
                Ok(None) => {
                    tracing::debug!("No records from {} for {}", endpoint.shape.name(), entity_id);
                }
                Err(e) => {
                    tracing::debug!("{} failed for {}: {}", endpoint.shape.name(), entity_id, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(FetchError::NoRecords(entity_id)))
    }

    fn canonical_link(&self, version: &str) -> String {
        format!("{}/{}", self.link_base, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::json;

    fn source_for(server: &MockServer, cookie: Option<&str>) -> DynamicSource {
        let config = SourceConfig {
            primary_url: server.url("/space_history"),
            fallback_url: server.url("/feed/space"),
            cookie: cookie.map(str::to_string),
            ..SourceConfig::default()
        };
        DynamicSource::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_primary_endpoint_wins() {
        let server = MockServer::start();
        let primary = server.mock(|when, then| {
            when.method(GET)
                .path("/space_history")
                .query_param("host_uid", "12345")
                .query_param("offset_dynamic_id", "0")
                .header("cookie", "SESSDATA=abc");
            then.status(200).json_body(json!({
                "code": 0,
                "data": {"cards": [{"desc": {"dynamic_id_str": "abc",
                    "user_profile": {"info": {"uname": "alice"}}}}]}
            }));
        });
        let fallback = server.mock(|when, then| {
            when.method(GET).path("/feed/space");
            then.status(200).json_body(json!({"code": 0}));
        });

        let source = source_for(&server, Some("SESSDATA=abc"));
        let state = source.latest(12345).await.unwrap();

        primary.assert();
        fallback.assert_hits(0);
        assert_eq!(state.version, "abc");
        assert_eq!(state.display_name.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_fallback_used_when_primary_has_no_records() {
        let server = MockServer::start();
        let primary = server.mock(|when, then| {
            when.method(GET).path("/space_history");
            then.status(200).json_body(json!({"code": -352, "message": "blocked"}));
        });
        let fallback = server.mock(|when, then| {
            when.method(GET).path("/feed/space").query_param("host_mid", "12345");
            then.status(200).json_body(json!({
                "code": 0,
                "data": {"items": [{"id_str": "xyz",
                    "modules": {"module_author": {"name": "alice", "pub_ts": 1700000000}}}]}
            }));
        });

        let source = source_for(&server, None);
        let state = source.latest(12345).await.unwrap();

        primary.assert();
        fallback.assert();
        assert_eq!(state.version, "xyz");
        assert_eq!(state.published_at.unwrap().timestamp(), 1700000000);
    }

    #[tokio::test]
    async fn test_fallback_used_when_primary_errors() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/space_history");
            then.status(500);
        });
        server.mock(|when, then| {
            when.method(GET).path("/feed/space");
            then.status(200).json_body(json!({"code": 0, "data": {"items": [{"id_str": "9"}]}}));
        });

        let source = source_for(&server, None);
        assert_eq!(source.latest(1).await.unwrap().version, "9");
    }

    #[tokio::test]
    async fn test_all_endpoints_empty() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/space_history");
            then.status(200).json_body(json!({"code": 0, "data": {"cards": []}}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/feed/space");
            then.status(200).json_body(json!({"code": 0, "data": {"items": []}}));
        });

        let source = source_for(&server, None);
        let err = source.latest(77).await.unwrap_err();
        assert!(matches!(err, FetchError::NoRecords(77)));
    }

    #[tokio::test]
    async fn test_last_error_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/space_history");
            then.status(200).json_body(json!({"code": 0, "data": {"cards": []}}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/feed/space");
            then.status(412);
        });

        let source = source_for(&server, None);
        let err = source.latest(77).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 412, .. }));
    }

    #[test]
    fn test_canonical_link() {
        let config = SourceConfig {
            link_base: "https://t.bilibili.com/".to_string(),
            ..SourceConfig::default()
        };
        let source = DynamicSource::new(&config, Duration::from_secs(1)).unwrap();
        assert_eq!(source.canonical_link("xyz"), "https://t.bilibili.com/xyz");
        assert_eq!(source.kind(), "Bilibili dynamic");
        assert_eq!(source.endpoints().len(), 2);
    }
}
