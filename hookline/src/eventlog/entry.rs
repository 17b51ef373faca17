//! Webhook event log entry types
//!
//! A [`LogEntry`] records one integration event: an inbound webhook delivery,
//! an outbound Graph API call, its response, or a failure along the way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// A single webhook event log record
///
/// Entries are appended once and never updated. `payload` and `metadata`
/// hold arbitrary JSON and are stored exactly as given; callers mask secrets
/// before building the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// Category of the event
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// HTTP method of the triggering interaction (if applicable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// URL of the triggering interaction (if applicable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Event body, copied as-is
    #[serde(default)]
    pub payload: Value,
    /// Auxiliary context (headers, counts, flags)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Failure details for `error` entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

impl LogEntry {
    /// Create a new entry of the given kind, stamped with the current time
    pub fn new(kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            method: None,
            url: None,
            payload: Value::Null,
            metadata: None,
            error: None,
        }
    }

    /// Set the triggering HTTP method and URL
    pub fn with_http(mut self, method: impl Into<String>, url: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self.url = Some(url.into());
        self
    }

    /// Set the event body
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set auxiliary metadata
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attach failure details
    pub fn with_error(mut self, error: ErrorDetails) -> Self {
        self.error = Some(error);
        self
    }

    /// Override the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Build an entry from an untyped JSON document
    ///
    /// The document must be an object with a recognised `type`. A missing or
    /// null `timestamp` is filled with the current time.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut object) = value else {
            return Err(Error::MalformedEntry(
                "log entry must be a JSON object".to_string(),
            ));
        };

        match object.get("type") {
            None | Some(Value::Null) => {
                return Err(Error::MalformedEntry(
                    "log entry is missing `type`".to_string(),
                ))
            }
            Some(Value::String(tag)) if EventKind::parse(tag).is_none() => {
                return Err(Error::MalformedEntry(format!(
                    "unknown log entry type `{}`",
                    tag
                )))
            }
            Some(Value::String(_)) => {}
            Some(other) => {
                return Err(Error::MalformedEntry(format!(
                    "log entry `type` must be a string, got {}",
                    other
                )))
            }
        }

        if matches!(object.get("timestamp"), None | Some(Value::Null)) {
            object.insert(
                "timestamp".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
        }

        serde_json::from_value(Value::Object(object))
            .map_err(|e| Error::MalformedEntry(e.to_string()))
    }

    /// One-line, type-tagged summary for the console
    pub fn summary(&self) -> String {
        let mut line = format!("[{}]", self.kind);
        if let Some(ref method) = self.method {
            line.push(' ');
            line.push_str(method);
        }
        if let Some(ref url) = self.url {
            line.push(' ');
            line.push_str(url);
        }
        if let Some(ref error) = self.error {
            line.push_str(" - ");
            line.push_str(&error.message);
        }
        line
    }
}

/// Categories of webhook log events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Subscription verification handshake
    Verification,
    /// Inbound webhook delivery received
    Received,
    /// Inbound webhook delivery fully handled
    Processed,
    /// Failure while handling an event or calling the upstream
    Error,
    /// Outbound Graph API request issued
    ApiCall,
    /// Graph API response received
    ApiResponse,
}

impl EventKind {
    /// All kinds, in declaration order
    pub const ALL: [EventKind; 6] = [
        EventKind::Verification,
        EventKind::Received,
        EventKind::Processed,
        EventKind::Error,
        EventKind::ApiCall,
        EventKind::ApiResponse,
    ];

    /// Wire name (`api_call`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verification => "verification",
            Self::Received => "received",
            Self::Processed => "processed",
            Self::Error => "error",
            Self::ApiCall => "api_call",
            Self::ApiResponse => "api_response",
        }
    }

    /// Parse a wire name
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verification => write!(f, "VERIFICATION"),
            Self::Received => write!(f, "RECEIVED"),
            Self::Processed => write!(f, "PROCESSED"),
            Self::Error => write!(f, "ERROR"),
            Self::ApiCall => write!(f, "API_CALL"),
            Self::ApiResponse => write!(f, "API_RESPONSE"),
        }
    }
}

/// Failure details carried by `error` entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Error message
    pub message: String,
    /// Backtrace or source chain, if captured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Error class name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ErrorDetails {
    /// Details with only a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
            name: None,
        }
    }

    /// Capture an error's message, its source chain as `stack` and a name
    pub fn from_error(name: &str, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        Self {
            message: error.to_string(),
            stack: (!chain.is_empty()).then(|| chain.join("\n")),
            name: Some(name.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_entry_new() {
        let entry = LogEntry::new(EventKind::Received);
        assert_eq!(entry.kind, EventKind::Received);
        assert!(entry.method.is_none());
        assert_eq!(entry.payload, Value::Null);
        assert!(entry.error.is_none());
    }

    #[test]
    fn test_log_entry_serializes_type_tag() {
        let entry = LogEntry::new(EventKind::ApiCall)
            .with_http("GET", "https://graph.instagram.com/v21.0/me/conversations")
            .with_metadata(json!({"attempt": 1}));

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "api_call");
        assert_eq!(value["method"], "GET");
        assert_eq!(value["metadata"]["attempt"], 1);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_from_value_fills_timestamp() {
        let before = Utc::now();
        let entry = LogEntry::from_value(json!({
            "type": "received",
            "payload": {"object": "instagram", "entry": [{"id": "1"}]}
        }))
        .unwrap();

        assert_eq!(entry.kind, EventKind::Received);
        assert!(entry.timestamp >= before);
        assert_eq!(entry.payload["entry"][0]["id"], "1");
    }

    #[test]
    fn test_from_value_fills_null_timestamp() {
        let before = Utc::now();
        let entry = LogEntry::from_value(json!({
            "type": "verification",
            "timestamp": null
        }))
        .unwrap();

        assert_eq!(entry.kind, EventKind::Verification);
        assert!(entry.timestamp >= before);
    }

    #[test]
    fn test_from_value_keeps_given_timestamp() {
        let entry = LogEntry::from_value(json!({
            "type": "processed",
            "timestamp": "2024-03-01T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(entry.timestamp.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn test_from_value_rejects_missing_type() {
        let err = LogEntry::from_value(json!({"payload": {}})).unwrap_err();
        assert!(matches!(err, Error::MalformedEntry(_)));

        let err = LogEntry::from_value(json!({"type": null})).unwrap_err();
        assert!(matches!(err, Error::MalformedEntry(_)));
    }

    #[test]
    fn test_from_value_rejects_unknown_type() {
        let err = LogEntry::from_value(json!({"type": "delivered"})).unwrap_err();
        match err {
            Error::MalformedEntry(msg) => assert!(msg.contains("delivered")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_value_rejects_non_object() {
        let err = LogEntry::from_value(json!(["received"])).unwrap_err();
        assert!(matches!(err, Error::MalformedEntry(_)));
    }

    #[test]
    fn test_event_kind_parse_and_display() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::ApiResponse.to_string(), "API_RESPONSE");
        assert_eq!(EventKind::parse("API_CALL"), None);
    }

    #[test]
    fn test_summary() {
        let entry = LogEntry::new(EventKind::Error)
            .with_http("POST", "/webhook")
            .with_error(ErrorDetails::new("payload missing entry"));
        assert_eq!(entry.summary(), "[ERROR] POST /webhook - payload missing entry");
    }

    #[test]
    fn test_error_details_from_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let details = ErrorDetails::from_error("IoError", &io);
        assert_eq!(details.message, "disk full");
        assert_eq!(details.name.as_deref(), Some("IoError"));
    }
}
