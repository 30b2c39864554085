//! Backend boundary: REST calls behind the `WhiteboardApi` trait.
//!
//! DESIGN
//! ======
//! The session only sees the trait, so tests substitute an in-memory mock
//! and the connectivity tracker stays oblivious to HTTP. `HttpApi` is a thin
//! reqwest wrapper; envelope and payload parsing are pure functions for
//! testability.
//!
//! Every response is `{success, data}`. Non-2xx statuses, `success: false`
//! and bodies missing the expected `data` are all errors, and callers treat
//! them the same as an unreachable network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::config::SyncConfig;
use crate::error::ApiError;
use crate::ident::now_ms;
use crate::object::{DrawableObject, ObjectPatch};

/// ID prefix of a whiteboard synthesized while the backend is unreachable.
pub const OFFLINE_PREFIX: &str = "offline_";

// =============================================================================
// WHITEBOARD
// =============================================================================

/// A project's whiteboard as the backend returns it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Whiteboard {
    pub id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub objects: Vec<DrawableObject>,
}

impl Whiteboard {
    /// Local-only whiteboard used when the backend cannot be reached.
    #[must_use]
    pub fn offline(project_id: &str) -> Self {
        Self { id: format!("{OFFLINE_PREFIX}{}", now_ms()), project_id: project_id.to_owned(), objects: Vec::new() }
    }

    /// Offline-only whiteboards have no backend counterpart to write to.
    #[must_use]
    pub fn is_offline_only(&self) -> bool {
        self.id.starts_with(OFFLINE_PREFIX)
    }
}

// =============================================================================
// TRAIT
// =============================================================================

#[async_trait]
pub trait WhiteboardApi: Send + Sync {
    /// Lightweight reachability check.
    async fn health(&self) -> Result<(), ApiError>;

    /// The project's whiteboard, or `None` if it has not been created yet.
    async fn fetch_whiteboard(&self, project_id: &str) -> Result<Option<Whiteboard>, ApiError>;

    async fn create_whiteboard(&self, project_id: &str) -> Result<Whiteboard, ApiError>;

    /// Persist a new object. Returns the backend's copy.
    async fn add_object(&self, whiteboard_id: &str, object: &DrawableObject) -> Result<DrawableObject, ApiError>;

    async fn update_object(&self, whiteboard_id: &str, object_id: &str, patch: &ObjectPatch) -> Result<(), ApiError>;

    async fn delete_object(&self, whiteboard_id: &str, object_id: &str) -> Result<(), ApiError>;

    async fn clear(&self, whiteboard_id: &str) -> Result<(), ApiError>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

#[derive(Debug, Clone)]
pub struct HttpApi {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpApi {
    /// Build a client rooted at `base_url` (e.g. `http://host/api`).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidBaseUrl`] if `base_url` is not an absolute
    /// hierarchical URL, or [`ApiError::HttpClientBuild`] if the reqwest
    /// client cannot be built.
    pub fn new(base_url: &str, request_timeout: Duration, connect_timeout: Duration) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ApiError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url })
    }

    /// # Errors
    ///
    /// See [`HttpApi::new`].
    pub fn from_config(config: &SyncConfig) -> Result<Self, ApiError> {
        Self::new(&config.api_url, config.timeouts.request, config.timeouts.connect)
    }

    /// Base URL with `segments` appended, each percent-encoded so IDs
    /// cannot change the route.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn call(&self, method: Method, segments: &[&str], body: Option<&Value>) -> Result<(StatusCode, String), ApiError> {
        let mut request = self.http.request(method, self.url(segments));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;
        Ok((status, text))
    }

    async fn call_data(&self, method: Method, segments: &[&str], body: Option<&Value>) -> Result<Option<Value>, ApiError> {
        let (status, text) = self.call(method, segments, body).await?;
        parse_envelope(status.as_u16(), &text)
    }
}

#[async_trait]
impl WhiteboardApi for HttpApi {
    async fn health(&self) -> Result<(), ApiError> {
        let (status, body) = self.call(Method::GET, &["health"], None).await?;
        if !status.is_success() {
            return Err(ApiError::Status { status: status.as_u16(), body });
        }
        Ok(())
    }

    async fn fetch_whiteboard(&self, project_id: &str) -> Result<Option<Whiteboard>, ApiError> {
        let (status, text) = self.call(Method::GET, &["projects", project_id, "whiteboard"], None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        match parse_envelope(status.as_u16(), &text)? {
            None | Some(Value::Null) => Ok(None),
            Some(data) => parse_whiteboard(data).map(Some),
        }
    }

    async fn create_whiteboard(&self, project_id: &str) -> Result<Whiteboard, ApiError> {
        let body = serde_json::json!({ "projectId": project_id });
        let data = self.call_data(Method::POST, &["projects", project_id, "whiteboard"], Some(&body)).await?;
        parse_whiteboard(require_data(data)?)
    }

    async fn add_object(&self, whiteboard_id: &str, object: &DrawableObject) -> Result<DrawableObject, ApiError> {
        let body = serde_json::to_value(object).map_err(|e| ApiError::Parse(e.to_string()))?;
        let data = self.call_data(Method::POST, &["whiteboards", whiteboard_id, "objects"], Some(&body)).await?;
        serde_json::from_value(require_data(data)?).map_err(|e| ApiError::Parse(e.to_string()))
    }

    async fn update_object(&self, whiteboard_id: &str, object_id: &str, patch: &ObjectPatch) -> Result<(), ApiError> {
        let body = Value::Object(patch.clone());
        self.call_data(Method::PUT, &["whiteboards", whiteboard_id, "objects", object_id], Some(&body)).await?;
        Ok(())
    }

    async fn delete_object(&self, whiteboard_id: &str, object_id: &str) -> Result<(), ApiError> {
        self.call_data(Method::DELETE, &["whiteboards", whiteboard_id, "objects", object_id], None).await?;
        Ok(())
    }

    async fn clear(&self, whiteboard_id: &str) -> Result<(), ApiError> {
        self.call_data(Method::POST, &["whiteboards", whiteboard_id, "clear"], None).await?;
        Ok(())
    }
}

// =============================================================================
// PARSING
// =============================================================================

#[derive(Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default, alias = "error")]
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWhiteboard {
    id: String,
    #[serde(default)]
    project_id: String,
    #[serde(default)]
    objects: Vec<Value>,
}

/// Validate status and envelope, returning the `data` member.
fn parse_envelope(status: u16, body: &str) -> Result<Option<Value>, ApiError> {
    if !(200..300).contains(&status) {
        return Err(ApiError::Status { status, body: body.to_owned() });
    }
    if body.trim().is_empty() {
        return Err(ApiError::Parse("empty response body".into()));
    }
    let envelope: Envelope = serde_json::from_str(body).map_err(|e| ApiError::Parse(e.to_string()))?;
    if !envelope.success {
        return Err(ApiError::Rejected(
            envelope
                .message
                .unwrap_or_else(|| "success: false".to_owned()),
        ));
    }
    Ok(envelope.data)
}

fn require_data(data: Option<Value>) -> Result<Value, ApiError> {
    match data {
        Some(Value::Null) | None => Err(ApiError::Parse("missing `data` in response".into())),
        Some(v) => Ok(v),
    }
}

/// Parse a whiteboard payload, skipping objects that do not parse.
fn parse_whiteboard(data: Value) -> Result<Whiteboard, ApiError> {
    let raw: RawWhiteboard = serde_json::from_value(data).map_err(|e| ApiError::Parse(e.to_string()))?;
    let objects = raw
        .objects
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<DrawableObject>(v) {
            Ok(obj) => Some(obj),
            Err(e) => {
                warn!(whiteboard_id = %raw.id, error = %e, "skipping malformed object");
                None
            }
        })
        .collect();
    Ok(Whiteboard { id: raw.id, project_id: raw.project_id, objects })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
