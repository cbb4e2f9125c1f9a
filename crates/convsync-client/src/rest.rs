// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the conversation REST backend.
//!
//! Provides [`RestBackend`], the [`MessageBackend`] used in production. Every
//! endpoint answers in one of a handful of envelopes; [`extract_batch`] peels
//! them down to raw records and an optional pagination block.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;
use tracing::{debug, info, warn};

use convsync_config::model::BackendConfig;
use convsync_core::{
    AdapterType, ConversationKey, ConvsyncError, HealthStatus, MessageBackend, Pagination,
    PluginAdapter, RawBatch,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// REST implementation of [`MessageBackend`].
#[derive(Debug, Clone)]
pub struct RestBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl RestBackend {
    /// Creates a backend client for `config.base_url`.
    ///
    /// When an API key is configured it is sent both as `apikey` and as a
    /// bearer token on every request.
    pub fn new(config: &BackendConfig) -> Result<Self, ConvsyncError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ConvsyncError::Config(format!("invalid backend.base_url `{}`: {e}", config.base_url))
        })?;

        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            headers.insert("apikey", header_value(api_key)?);
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {api_key}"))?);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConvsyncError::Http {
                message: format!("failed to build HTTP client: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?;

        info!(base_url = %base_url, "REST backend initialized");
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ConvsyncError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ConvsyncError::Config(format!(
                    "backend.base_url `{}` cannot be a base",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn message_query(&self, key: &ConversationKey, limit: usize) -> Result<Url, ConvsyncError> {
        let mut url = self.endpoint(&["api", "messages"])?;
        url.query_pairs_mut()
            .append_pair("platform", &key.platform().to_string())
            .append_pair("contact_id", key.contact_id())
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }

    /// Sends a request and returns the decoded JSON body of a 2xx response.
    async fn send(&self, method: Method, url: Url) -> Result<(StatusCode, Value), ConvsyncError> {
        let path = url.path().to_string();
        let response = self
            .client
            .request(method.clone(), url)
            .send()
            .await
            .map_err(|e| ConvsyncError::Http {
                message: format!("{method} {path} failed: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(%method, path = %path, status = %status, "backend response received");

        let body = response.text().await.map_err(|e| ConvsyncError::Http {
            message: format!("failed to read response body of {path}: {e}"),
            status: Some(status.as_u16()),
            source: Some(Box::new(e)),
        })?;

        if !status.is_success() {
            return Err(ConvsyncError::http(
                format!("{method} {path} returned {status}: {}", truncate(&body)),
                Some(status.as_u16()),
            ));
        }

        if body.trim().is_empty() {
            return Ok((status, Value::Null));
        }
        let json = serde_json::from_str(&body)
            .map_err(|e| ConvsyncError::Decode(format!("invalid JSON from {path}: {e}")))?;
        Ok((status, json))
    }

    async fn get_batch(&self, url: Url) -> Result<RawBatch, ConvsyncError> {
        let (status, body) = self.send(Method::GET, url).await?;
        extract_batch(body, status)
    }
}

fn header_value(raw: &str) -> Result<HeaderValue, ConvsyncError> {
    HeaderValue::from_str(raw)
        .map_err(|e| ConvsyncError::Config(format!("invalid API key header value: {e}")))
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Rejects `{"success": false}` envelopes.
fn check_success(body: &Value, status: StatusCode) -> Result<(), ConvsyncError> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let reason = ["error", "message"]
            .iter()
            .find_map(|field| body.get(*field).and_then(Value::as_str))
            .unwrap_or("no reason given");
        return Err(ConvsyncError::http(
            format!("backend reported failure: {reason}"),
            Some(status.as_u16()),
        ));
    }
    Ok(())
}

fn records_of(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::Object(map) => map.get("messages").and_then(Value::as_array).cloned(),
        _ => None,
    }
}

fn pagination_of(value: &Value) -> Option<Pagination> {
    value
        .get("pagination")
        .and_then(|p| serde_json::from_value(p.clone()).ok())
}

/// Peels a response envelope down to its records.
///
/// Accepted shapes: `{success, data: {messages: []}}`, `{success, data: []}`,
/// `{data: []}`, `{messages: []}` and a bare array. The pagination block may
/// sit next to the records or at the top level.
pub fn extract_batch(body: Value, status: StatusCode) -> Result<RawBatch, ConvsyncError> {
    check_success(&body, status)?;

    if let Value::Array(records) = body {
        return Ok(RawBatch::new(records));
    }

    let data = body.get("data");
    let records = data
        .and_then(records_of)
        .or_else(|| body.get("messages").and_then(Value::as_array).cloned())
        .ok_or_else(|| {
            ConvsyncError::Decode("response carries no message records".to_string())
        })?;

    let pagination = data.and_then(pagination_of).or_else(|| pagination_of(&body));
    Ok(RawBatch {
        records,
        pagination,
    })
}

/// Extracts a single state row; `null` data means no state yet.
fn extract_state(body: Value, status: StatusCode) -> Result<Option<Value>, ConvsyncError> {
    check_success(&body, status)?;
    let row = match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or_default()
        }
        other => other,
    };
    Ok(match row {
        Value::Object(_) => Some(row),
        Value::Array(mut rows) if !rows.is_empty() => Some(rows.swap_remove(0)),
        _ => None,
    })
}

#[async_trait]
impl PluginAdapter for RestBackend {
    fn name(&self) -> &str {
        "rest"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Backend
    }

    async fn health_check(&self) -> Result<HealthStatus, ConvsyncError> {
        match self.client.get(self.base_url.clone()).send().await {
            Ok(response) if response.status().is_server_error() => Ok(HealthStatus::Degraded(
                format!("backend answered {}", response.status()),
            )),
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("backend unreachable: {e}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), ConvsyncError> {
        Ok(())
    }
}

#[async_trait]
impl MessageBackend for RestBackend {
    async fn conversation_messages(
        &self,
        key: &ConversationKey,
    ) -> Result<RawBatch, ConvsyncError> {
        let platform = key.platform().to_string();
        let url = self.endpoint(&["api", "conversations", &platform, key.contact_id()])?;
        self.get_batch(url).await
    }

    async fn message_list(
        &self,
        key: &ConversationKey,
        limit: usize,
    ) -> Result<RawBatch, ConvsyncError> {
        let url = self.message_query(key, limit)?;
        self.get_batch(url).await
    }

    async fn platform_messages(&self, key: &ConversationKey) -> Result<RawBatch, ConvsyncError> {
        let platform = key.platform().to_string();
        let url = self.endpoint(&["api", &platform, "messages", key.contact_id()])?;
        self.get_batch(url).await
    }

    async fn message_page(
        &self,
        key: &ConversationKey,
        limit: usize,
        offset: usize,
    ) -> Result<RawBatch, ConvsyncError> {
        let mut url = self.message_query(key, limit)?;
        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string());
        self.get_batch(url).await
    }

    async fn conversation_state(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<Value>, ConvsyncError> {
        let platform = key.platform().to_string();
        let url = self.endpoint(&["api", "conversation-state", &platform, key.match_key()])?;
        match self.send(Method::GET, url).await {
            Ok((status, body)) => extract_state(body, status),
            Err(ConvsyncError::Http {
                status: Some(404), ..
            }) => {
                debug!(conversation = %key, "no conversation state stored");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn notifications(&self, recipient: &str) -> Result<Vec<Value>, ConvsyncError> {
        let mut url = self.endpoint(&["api", "notifications"])?;
        url.query_pairs_mut().append_pair("recipient", recipient);
        let batch = self.get_batch(url).await?;
        Ok(batch.records)
    }

    async fn acknowledge_notification(&self, id: &str) -> Result<(), ConvsyncError> {
        let url = self.endpoint(&["api", "notifications", id, "read"])?;
        let (status, body) = self.send(Method::PATCH, url).await.inspect_err(|e| {
            warn!(notification = id, error = %e, "acknowledge request failed");
        })?;
        check_success(&body, status)
    }
}
