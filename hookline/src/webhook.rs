//! Webhook intake
//!
//! `GET /webhook` answers the subscription handshake, `POST /webhook`
//! receives deliveries. Every delivery is written to the event log as a
//! `received` entry, optionally enriched with sender profiles, and closed
//! with a `processed` entry. Entries written while handling one delivery
//! carry the same `request_id` in their metadata: the inbound
//! `x-request-id` when present, a fresh UUID otherwise.
//!
//! Sender lookups share one time budget and a per-delivery cap, so the
//! `processed` entry is written and the delivery acknowledged before the
//! request timeout fires. Senders left out are counted as `skipped`.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    eventlog::{ErrorDetails, EventKind, EventLog, LogEntry},
    redact::mask_secret,
    state::AppState,
};

/// Acknowledgement body for deliveries
pub const EVENT_RECEIVED: &str = "EVENT_RECEIVED";

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;

/// Query string of the subscription handshake
#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Delivery envelope
#[derive(Debug, Default, Deserialize)]
struct Delivery {
    #[serde(default)]
    object: Option<String>,
    #[serde(default)]
    entry: Vec<DeliveryEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct DeliveryEntry {
    #[serde(default)]
    messaging: Vec<MessagingEvent>,
    #[serde(default)]
    changes: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct MessagingEvent {
    sender: Party,
    #[serde(default)]
    message: Option<InboundMessage>,
}

#[derive(Debug, Deserialize)]
struct Party {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct InboundMessage {
    #[serde(default)]
    is_echo: bool,
}

/// Subscription verification handshake
///
/// Echoes `hub.challenge` when the mode is `subscribe` and the token matches
/// the configured one. Refused with 403 otherwise, including when no token
/// is configured.
pub async fn verify(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<String> {
    let expected = state.config().webhook.verify_token.as_deref();
    let accepted = params.mode.as_deref() == Some("subscribe")
        && expected.is_some()
        && params.verify_token.as_deref() == expected;

    let entry = LogEntry::new(EventKind::Verification)
        .with_http("GET", "/webhook")
        .with_payload(json!({
            "mode": params.mode,
            "verify_token": params.verify_token.as_deref().map(mask_secret),
            "challenge": params.challenge,
        }))
        .with_metadata(json!({ "accepted": accepted }));
    state.event_log().append(entry).await?;

    if !accepted {
        tracing::warn!(mode = ?params.mode, "Webhook verification refused");
        return Err(Error::Forbidden("Webhook verification failed".to_string()));
    }

    tracing::info!("Webhook subscription verified");
    Ok(params.challenge.unwrap_or_default())
}

/// Delivery intake
///
/// Always acknowledges with `200 EVENT_RECEIVED`; failures while handling the
/// delivery end up in the event log instead of the response.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let request_id = inbound_request_id(&headers).unwrap_or_else(|| Uuid::new_v4().to_string());
    let log = state.event_log().with_request_id(&request_id);

    if let Err(e) = handle_delivery(&state, &log, &body).await {
        tracing::error!(request_id = %request_id, "Webhook delivery handling failed: {}", e);
        log.record_error(
            ErrorDetails::from_error("WebhookError", &e),
            Some(json!({ "stage": "handle_delivery" })),
        )
        .await;
    }

    (StatusCode::OK, EVENT_RECEIVED)
}

fn inbound_request_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(REQUEST_ID_HEADER)?.to_str().ok()?.trim();
    (!value.is_empty() && value.len() <= MAX_REQUEST_ID_LEN).then(|| value.to_string())
}

async fn handle_delivery(state: &AppState, log: &EventLog, body: &[u8]) -> Result<()> {
    let payload: Value = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            log.append(
                LogEntry::new(EventKind::Received)
                    .with_http("POST", "/webhook")
                    .with_payload(Value::String(String::from_utf8_lossy(body).into_owned())),
            )
            .await?;
            log.record_error(
                ErrorDetails::from_error("InvalidJson", &e),
                Some(json!({ "stage": "parse" })),
            )
            .await;
            return Ok(());
        }
    };

    log.append(
        LogEntry::new(EventKind::Received)
            .with_http("POST", "/webhook")
            .with_payload(payload.clone()),
    )
    .await?;

    let delivery: Delivery = match serde_json::from_value(payload) {
        Ok(delivery) => delivery,
        Err(e) => {
            log.record_error(
                ErrorDetails::from_error("UnexpectedShape", &e),
                Some(json!({ "stage": "decode" })),
            )
            .await;
            Delivery::default()
        }
    };

    let messages: usize = delivery.entry.iter().map(|e| e.messaging.len()).sum();
    let changes: usize = delivery.entry.iter().map(|e| e.changes.len()).sum();

    // Echoes are the account's own outbound messages
    let senders: BTreeSet<&str> = delivery
        .entry
        .iter()
        .flat_map(|e| e.messaging.iter())
        .filter(|m| !m.message.as_ref().is_some_and(|msg| msg.is_echo))
        .map(|m| m.sender.id.as_str())
        .collect();

    let mut enriched = Vec::new();
    if let Some(token) = state.config().graph.access_token.as_deref() {
        let graph = state.graph().clone().with_event_log(log.clone());
        let budget = state.config().enrichment_budget();
        let deadline = Instant::now() + budget;
        let max_lookups = state.config().webhook.max_lookups;

        for sender in senders.iter().take(max_lookups) {
            let lookup =
                match tokio::time::timeout_at(deadline, graph.fetch_user_details(sender, token))
                    .await
                {
                    Ok(lookup) => lookup,
                    Err(_) => {
                        tracing::warn!(
                            budget_ms = budget.as_millis() as u64,
                            "Sender lookups ran out of time"
                        );
                        log.record_error(
                            ErrorDetails {
                                message: format!(
                                    "sender lookups exceeded {}ms",
                                    budget.as_millis()
                                ),
                                stack: None,
                                name: Some("EnrichmentTimeout".to_string()),
                            },
                            Some(json!({ "stage": "enrich", "sender": sender })),
                        )
                        .await;
                        break;
                    }
                };
            let found = lookup.is_found();
            let details = lookup.into_details();
            enriched.push(json!({
                "id": details.id,
                "username": details.username,
                "name": details.name,
                "found": found,
            }));
        }
        if senders.len() > max_lookups {
            tracing::debug!(
                senders = senders.len(),
                max_lookups,
                "Sender lookups capped for this delivery"
            );
        }
    } else if !senders.is_empty() {
        tracing::debug!("No Graph access token configured, skipping sender lookups");
    }
    let skipped = senders.len() - enriched.len();

    log.append(
        LogEntry::new(EventKind::Processed)
            .with_http("POST", "/webhook")
            .with_payload(json!({
                "object": delivery.object,
                "senders": enriched,
            }))
            .with_metadata(json!({
                "entries": delivery.entry.len(),
                "messages": messages,
                "changes": changes,
                "skipped": skipped,
            })),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, graph::GraphClient, handlers::router, server::Server};
    use axum::{
        body::Body,
        extract::Path,
        http::Request,
        routing::get,
        Json, Router,
    };
    use std::time::Duration;
    use tower::ServiceExt;

    const VERIFY_TOKEN: &str = "hookline-verify";

    fn state_with(config: Config, graph_url: &str) -> AppState {
        let log = EventLog::in_memory();
        let graph = GraphClient::with_base_url(graph_url, Duration::from_secs(5))
            .unwrap()
            .with_event_log(log.clone());
        AppState::new(config, log, graph)
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.event_log.path = None;
        config.webhook.verify_token = Some(VERIFY_TOKEN.to_string());
        config
    }

    async fn spawn_profiles() -> String {
        async fn profile(Path(user_id): Path<String>) -> axum::response::Response {
            use axum::response::IntoResponse;
            if user_id == "ghost" {
                return (StatusCode::NOT_FOUND, "no such user").into_response();
            }
            Json(json!({
                "id": user_id,
                "username": format!("user_{}", user_id),
                "name": "Someone",
            }))
            .into_response()
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/{user_id}", get(profile)))
                .await
                .unwrap();
        });
        format!("http://{}", addr)
    }

    async fn spawn_slow_profiles(delay: Duration) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/{user_id}",
            get(move |Path(user_id): Path<String>| async move {
                tokio::time::sleep(delay).await;
                Json(json!({"id": user_id, "username": "slow", "name": "Slow"}))
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn delivery(senders: &[&str]) -> Value {
        let messaging: Vec<Value> = senders
            .iter()
            .map(|id| {
                json!({
                    "sender": {"id": id},
                    "recipient": {"id": "page"},
                    "timestamp": 1714557600000u64,
                    "message": {"mid": format!("mid.{}", id), "text": "hi"}
                })
            })
            .collect();
        json!({
            "object": "instagram",
            "entry": [{"id": "page", "time": 1714557600000u64, "messaging": messaging}]
        })
    }

    async fn post(app: Router, body: Body) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_verification_echoes_challenge() {
        let state = state_with(config(), "http://127.0.0.1:9");
        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/webhook?hub.mode=subscribe&hub.verify_token=hookline-verify&hub.challenge=1158201444")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"1158201444");

        let entries = state.event_log().recent(None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EventKind::Verification);
        assert_eq!(entries[0].payload["verify_token"], "hook...");
        assert_eq!(entries[0].metadata, Some(json!({ "accepted": true })));
    }

    #[tokio::test]
    async fn test_verification_refuses_wrong_token() {
        let state = state_with(config(), "http://127.0.0.1:9");
        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/webhook?hub.mode=subscribe&hub.verify_token=guess&hub.challenge=42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let entries = state.event_log().recent(None).await.unwrap();
        assert_eq!(entries[0].metadata, Some(json!({ "accepted": false })));
    }

    #[tokio::test]
    async fn test_verification_refused_without_configured_token() {
        let mut config = config();
        config.webhook.verify_token = None;
        let state = state_with(config, "http://127.0.0.1:9");
        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri("/webhook?hub.mode=subscribe&hub.challenge=42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_delivery_without_token_logs_received_then_processed() {
        let state = state_with(config(), "http://127.0.0.1:9");
        let (status, body) = post(router(state.clone()), Body::from(delivery(&["u1"]).to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, EVENT_RECEIVED);

        let entries = state.event_log().recent(None).await.unwrap();
        let kinds: Vec<EventKind> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Received, EventKind::Processed]);
        assert_eq!(entries[0].payload["object"], "instagram");
        assert_eq!(entries[1].metadata.as_ref().unwrap()["messages"], 1);

        let first = &entries[0].metadata.as_ref().unwrap()["request_id"];
        assert!(first.is_string());
        assert_eq!(&entries[1].metadata.as_ref().unwrap()["request_id"], first);
    }

    #[tokio::test]
    async fn test_delivery_enriches_senders_in_causal_order() {
        let mut config = config();
        config.graph.access_token = Some("IGQVpagetoken".to_string());
        let state = state_with(config, &spawn_profiles().await);

        let (status, _) = post(
            router(state.clone()),
            Body::from(delivery(&["u1", "u1"]).to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let entries = state.event_log().recent(None).await.unwrap();
        let kinds: Vec<EventKind> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Received,
                EventKind::ApiCall,
                EventKind::ApiResponse,
                EventKind::Processed,
            ]
        );

        let request_id = entries[0].metadata.as_ref().unwrap()["request_id"].clone();
        for entry in &entries {
            assert_eq!(entry.metadata.as_ref().unwrap()["request_id"], request_id);
        }
        assert!(entries[1].url.as_deref().unwrap().contains("access_token=IGQV..."));
        assert_eq!(entries[3].payload["senders"][0]["username"], "user_u1");
        assert_eq!(entries[3].payload["senders"][0]["found"], true);
    }

    #[tokio::test]
    async fn test_delivery_with_failed_lookup_uses_placeholder() {
        let mut config = config();
        config.graph.access_token = Some("IGQVpagetoken".to_string());
        let state = state_with(config, &spawn_profiles().await);

        let (status, _) = post(router(state.clone()), Body::from(delivery(&["ghost"]).to_string())).await;
        assert_eq!(status, StatusCode::OK);

        let entries = state.event_log().recent(None).await.unwrap();
        let kinds: Vec<EventKind> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Received,
                EventKind::ApiCall,
                EventKind::Error,
                EventKind::Processed,
            ]
        );
        assert_eq!(entries[3].payload["senders"][0]["username"], "unknown");
        assert_eq!(entries[3].payload["senders"][0]["found"], false);
    }

    #[tokio::test]
    async fn test_echo_messages_are_not_looked_up() {
        let mut config = config();
        config.graph.access_token = Some("IGQVpagetoken".to_string());
        let state = state_with(config, "http://127.0.0.1:9");

        let body = json!({
            "object": "instagram",
            "entry": [{"messaging": [
                {"sender": {"id": "page"}, "message": {"mid": "m", "text": "sent", "is_echo": true}}
            ]}]
        });
        post(router(state.clone()), Body::from(body.to_string())).await;

        let entries = state.event_log().recent(None).await.unwrap();
        let kinds: Vec<EventKind> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Received, EventKind::Processed]);
    }

    #[tokio::test]
    async fn test_invalid_json_is_acknowledged_and_logged() {
        let state = state_with(config(), "http://127.0.0.1:9");
        let (status, body) = post(router(state.clone()), Body::from("{not json")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, EVENT_RECEIVED);

        let entries = state.event_log().recent(None).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EventKind::Received);
        assert_eq!(entries[0].payload, Value::String("{not json".to_string()));
        assert_eq!(entries[1].kind, EventKind::Error);
        assert_eq!(
            entries[1].error.as_ref().unwrap().name.as_deref(),
            Some("InvalidJson")
        );
    }

    #[tokio::test]
    async fn test_unexpected_shape_still_processed() {
        let state = state_with(config(), "http://127.0.0.1:9");
        post(
            router(state.clone()),
            Body::from(json!({"object": "instagram", "entry": "oops"}).to_string()),
        )
        .await;

        let entries = state.event_log().recent(None).await.unwrap();
        let kinds: Vec<EventKind> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Received, EventKind::Error, EventKind::Processed]
        );
    }

    #[tokio::test]
    async fn test_slow_lookups_still_close_delivery_before_request_timeout() {
        let mut config = config();
        config.service.timeout_secs = 2;
        config.graph.access_token = Some("IGQVpagetoken".to_string());
        let state = state_with(
            config.clone(),
            &spawn_slow_profiles(Duration::from_millis(800)).await,
        );
        let app = Server::new(config).apply_middleware(router(state.clone()));

        let (status, body) = post(app, Body::from(delivery(&["a", "b", "c", "d"]).to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, EVENT_RECEIVED);

        let entries = state.event_log().recent(None).await.unwrap();
        let last = entries.last().unwrap();
        assert_eq!(last.kind, EventKind::Processed);
        assert_eq!(last.payload["senders"].as_array().unwrap().len(), 1);
        assert_eq!(last.metadata.as_ref().unwrap()["skipped"], 3);
        assert!(entries.iter().any(|e| e
            .error
            .as_ref()
            .is_some_and(|err| err.name.as_deref() == Some("EnrichmentTimeout"))));
    }

    #[tokio::test]
    async fn test_lookups_capped_per_delivery() {
        let mut config = config();
        config.graph.access_token = Some("IGQVpagetoken".to_string());
        config.webhook.max_lookups = 2;
        let state = state_with(config, &spawn_profiles().await);

        post(
            router(state.clone()),
            Body::from(delivery(&["u1", "u2", "u3", "u4", "u5"]).to_string()),
        )
        .await;

        let entries = state.event_log().recent(None).await.unwrap();
        let calls = entries.iter().filter(|e| e.kind == EventKind::ApiCall).count();
        assert_eq!(calls, 2);
        let last = entries.last().unwrap();
        assert_eq!(last.kind, EventKind::Processed);
        assert_eq!(last.metadata.as_ref().unwrap()["skipped"], 3);
    }

    #[tokio::test]
    async fn test_inbound_request_id_is_reused() {
        let state = state_with(config(), "http://127.0.0.1:9");
        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("content-type", "application/json")
                    .header("x-request-id", "req-abc")
                    .body(Body::from(delivery(&["u1"]).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let entries = state.event_log().recent(None).await.unwrap();
        assert_eq!(entries.len(), 2);
        for entry in &entries {
            assert_eq!(entry.metadata.as_ref().unwrap()["request_id"], "req-abc");
        }
    }

    #[tokio::test]
    async fn test_request_id_matches_response_header_behind_middleware() {
        let config = config();
        let state = state_with(config.clone(), "http://127.0.0.1:9");
        let app = Server::new(config).apply_middleware(router(state.clone()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .body(Body::from(delivery(&[]).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let header = response
            .headers()
            .get("x-request-id")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let entries = state.event_log().recent(None).await.unwrap();
        assert_eq!(entries[0].metadata.as_ref().unwrap()["request_id"], header);
    }

    #[test]
    fn test_blank_or_oversized_request_id_is_ignored() {
        let mut headers = HeaderMap::new();
        assert_eq!(inbound_request_id(&headers), None);

        headers.insert(REQUEST_ID_HEADER, "  ".parse().unwrap());
        assert_eq!(inbound_request_id(&headers), None);

        headers.insert(REQUEST_ID_HEADER, "x".repeat(200).parse().unwrap());
        assert_eq!(inbound_request_id(&headers), None);

        headers.insert(REQUEST_ID_HEADER, "req-1".parse().unwrap());
        assert_eq!(inbound_request_id(&headers).as_deref(), Some("req-1"));
    }
}
