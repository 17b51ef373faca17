//! Instagram Graph API integration
//!
//! A thin client over the messaging endpoints. Conversation and message
//! fetches and sends are load-bearing and surface [`UpstreamError`]s; user
//! lookups are best-effort enrichment and degrade to
//! [`UserLookup::Unknown`] instead.
//!
//! [`UpstreamError`]: crate::error::UpstreamError

pub mod client;
pub mod types;

pub use client::{GraphClient, DEFAULT_MESSAGE_LIMIT};
pub use types::{
    Conversation, DeliveryReceipt, Message, Page, Participant, UserDetails, UserLookup,
};
