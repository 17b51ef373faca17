//! Instagram Graph API client
//!
//! Each operation is a single request/response round trip. Nothing is
//! retried here; callers own their retry policy.

use reqwest::{Client as HttpClient, Method, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

use super::types::{
    Conversation, DeliveryReceipt, GraphErrorBody, Message, Page, UserDetails, UserLookup,
};
use crate::config::GraphConfig;
use crate::error::{Error, Result, UpstreamError};
use crate::eventlog::{ErrorDetails, EventLog};
use crate::redact::mask_secret;

/// Messages fetched per conversation when no limit is given
pub const DEFAULT_MESSAGE_LIMIT: u32 = 100;

/// Client for the versioned Graph API
///
/// When built [`with_event_log`](Self::with_event_log), every call records an
/// `api_call` entry before the request and an `api_response` or `error`
/// entry after it.
#[derive(Clone)]
pub struct GraphClient {
    http: HttpClient,
    base_url: String,
    event_log: Option<EventLog>,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.base_url)
            .field("event_log", &self.event_log.is_some())
            .finish()
    }
}

impl GraphClient {
    /// Create a client from configuration
    pub fn new(config: &GraphConfig) -> Result<Self> {
        Self::with_base_url(&config.base_url, config.timeout())
    }

    /// Create a client for an explicit base URL
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url)
            .map_err(|e| Error::Internal(format!("Invalid Graph base URL {}: {}", base_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(Error::Internal(format!(
                "Graph base URL {} cannot carry a path",
                base_url
            )));
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .user_agent(concat!("hookline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            event_log: None,
        })
    }

    /// Record calls and their outcomes in `log`
    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.event_log = Some(log);
        self
    }

    /// Base URL requests are issued against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List the account's conversations
    pub async fn fetch_conversations(&self, token: &str) -> Result<Vec<Conversation>> {
        let page: Page<Conversation> = self
            .execute(
                Method::GET,
                &["me", "conversations"],
                vec![
                    ("platform", "instagram".to_string()),
                    ("fields", "id,updated_time,participants".to_string()),
                ],
                None,
                token,
            )
            .await?;
        Ok(page.data)
    }

    /// List messages in a conversation, newest first as the API returns them
    ///
    /// `limit` defaults to [`DEFAULT_MESSAGE_LIMIT`].
    pub async fn fetch_conversation_messages(
        &self,
        conversation_id: &str,
        token: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Message>> {
        let conversation_id = object_id("conversation id", conversation_id)?;

        let page: Page<Message> = self
            .execute(
                Method::GET,
                &[conversation_id, "messages"],
                vec![
                    ("fields", "id,created_time,from,to,message".to_string()),
                    ("limit", limit.unwrap_or(DEFAULT_MESSAGE_LIMIT).to_string()),
                ],
                None,
                token,
            )
            .await?;
        Ok(page.data)
    }

    /// Look up a user's profile
    ///
    /// Never fails: any error is logged and reported as
    /// [`UserLookup::Unknown`] so message handling can carry on without it.
    pub async fn fetch_user_details(&self, user_id: &str, token: &str) -> UserLookup {
        let result: Result<UserDetails> = match object_id("user id", user_id) {
            Ok(id) => {
                self.execute(
                    Method::GET,
                    &[id],
                    vec![("fields", "id,username,name".to_string())],
                    None,
                    token,
                )
                .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(details) => UserLookup::Found(details),
            Err(e) => {
                tracing::warn!(user_id, "User lookup degraded to placeholder: {}", e);
                UserLookup::Unknown {
                    user_id: user_id.to_string(),
                }
            }
        }
    }

    /// Send a text message
    pub async fn send_message(
        &self,
        recipient_id: &str,
        text: &str,
        token: &str,
    ) -> Result<DeliveryReceipt> {
        object_id("recipient id", recipient_id)?;
        if text.is_empty() {
            return Err(Error::BadRequest("message text is empty".to_string()));
        }

        let body = json!({
            "recipient": { "id": recipient_id },
            "message": { "text": text },
        });
        self.execute(Method::POST, &["me", "messages"], Vec::new(), Some(body), token)
            .await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        query: Vec<(&str, String)>,
        body: Option<Value>,
        token: &str,
    ) -> Result<T> {
        let url = self.endpoint(segments)?;
        let logged_url = logged_url(url.as_str(), &query, token);

        if let Some(ref log) = self.event_log {
            log.record_api_call(method.as_str(), &logged_url, body.clone())
                .await;
        }

        let mut request = self
            .http
            .request(method.clone(), url)
            .query(&query)
            .query(&[("access_token", token)]);
        if let Some(ref body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let err = UpstreamError::transport(e.to_string());
                self.record_failure(&method, &logged_url, &err).await;
                return Err(err.into());
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                let err = UpstreamError::transport(format!("failed to read response: {}", e));
                self.record_failure(&method, &logged_url, &err).await;
                return Err(err.into());
            }
        };
        let payload: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            let err = UpstreamError::status(status.as_u16(), upstream_message(status, &payload));
            self.record_failure(&method, &logged_url, &err).await;
            return Err(err.into());
        }

        if let Some(ref log) = self.event_log {
            log.record_api_response(method.as_str(), &logged_url, status.as_u16(), payload.clone())
                .await;
        }

        serde_json::from_value(payload).map_err(|e| {
            Error::Upstream(UpstreamError::status(
                status.as_u16(),
                format!("unexpected response shape: {}", e),
            ))
        })
    }

    /// Base URL extended by `segments`, each encoded as a single path segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Internal(format!("Invalid Graph base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Internal("Graph base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn record_failure(&self, method: &Method, logged_url: &str, err: &UpstreamError) {
        tracing::error!(method = %method, url = logged_url, "Graph API call failed: {}", err);
        if let Some(ref log) = self.event_log {
            let details = ErrorDetails {
                message: err.message.clone(),
                stack: None,
                name: Some("UpstreamError".to_string()),
            };
            log.record_error(
                details,
                Some(json!({
                    "method": method.as_str(),
                    "url": logged_url,
                    "status": err.status,
                })),
            )
            .await;
        }
    }
}

/// Graph object ids are alphanumeric with `_`, `.` or `-`
fn object_id<'a>(what: &str, id: &'a str) -> Result<&'a str> {
    let valid = !id.is_empty()
        && !id.chars().all(|c| c == '.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(id)
    } else {
        Err(Error::BadRequest(format!("invalid {}: {:?}", what, id)))
    }
}

/// URL as written to the event log, with the token masked
fn logged_url(url: &str, query: &[(&str, String)], token: &str) -> String {
    let mut pairs: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    pairs.push(format!("access_token={}", mask_secret(token)));
    format!("{}?{}", url, pairs.join("&"))
}

/// Best message available from a failed response
fn upstream_message(status: reqwest::StatusCode, payload: &Value) -> String {
    match serde_json::from_value::<GraphErrorBody>(payload.clone()) {
        Ok(body) => {
            let mut message = body.error.message;
            match (body.error.kind, body.error.code) {
                (Some(kind), Some(code)) => message.push_str(&format!(" ({}, code {})", kind, code)),
                (Some(kind), None) => message.push_str(&format!(" ({})", kind)),
                (None, Some(code)) => message.push_str(&format!(" (code {})", code)),
                (None, None) => {}
            }
            message
        }
        Err(_) => match payload {
            Value::String(text) if text.is_empty() => status.to_string(),
            Value::String(text) => format!("{}: {}", status, text),
            Value::Null => status.to_string(),
            other => format!("{}: {}", status, other),
        },
    }
}
