//! Graph API resource types

use serde::{Deserialize, Serialize};

/// Paged list envelope (`{"data": [...], "paging": {...}}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    /// Cursor information, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging: Option<serde_json::Value>,
}

/// Account taking part in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Instagram-scoped user ID
    pub id: String,
    /// Handle, when the API includes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Direct message thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation ID
    pub id: String,
    /// Last activity (ISO-8601)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_time: Option<String>,
    /// Participants, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Page<Participant>>,
}

impl Conversation {
    /// Participants of the thread (empty when not requested)
    pub fn participants(&self) -> &[Participant] {
        self.participants
            .as_ref()
            .map(|page| page.data.as_slice())
            .unwrap_or_default()
    }
}

/// Single direct message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID
    pub id: String,
    /// Send time (ISO-8601)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    /// Sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Participant>,
    /// Recipients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Page<Participant>>,
    /// Text body (absent for attachments and reactions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Profile fields of an Instagram user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    /// Instagram-scoped user ID
    pub id: String,
    /// Handle
    #[serde(default)]
    pub username: String,
    /// Display name
    #[serde(default)]
    pub name: String,
}

impl UserDetails {
    /// Placeholder used when a lookup fails
    pub fn unknown(user_id: impl Into<String>) -> Self {
        Self {
            id: user_id.into(),
            username: "unknown".to_string(),
            name: "Unknown User".to_string(),
        }
    }
}

/// Outcome of a best-effort user lookup
///
/// Keeps "lookup failed" distinguishable from a real profile until the
/// presentation edge, where [`UserLookup::into_details`] collapses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    /// The upstream returned the profile
    Found(UserDetails),
    /// The lookup failed; the reason was logged
    Unknown {
        /// ID that was looked up
        user_id: String,
    },
}

impl UserLookup {
    /// Whether the profile was actually retrieved
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Profile, or the `unknown` placeholder
    pub fn into_details(self) -> UserDetails {
        match self {
            Self::Found(details) => details,
            Self::Unknown { user_id } => UserDetails::unknown(user_id),
        }
    }
}

/// Acknowledgement returned by the send API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Recipient the message was delivered to
    pub recipient_id: String,
    /// ID of the created message
    pub message_id: String,
}

/// Graph API error envelope
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GraphErrorBody {
    pub error: GraphErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GraphErrorDetail {
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
}
