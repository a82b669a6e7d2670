use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, debug, error, info_span, warn};
use uuid::Uuid;

use crate::bot::Bot;
use crate::messaging::{WebhookBody, verify_signature};

const SIGNATURE_HEADER: &str = "x-line-signature";

/// Shared, read-only handler state.
#[derive(Clone)]
pub struct AppState {
    bot: Arc<Bot>,
    channel_secret: Arc<str>,
    sheet_connected: bool,
}

impl AppState {
    pub fn new(bot: Arc<Bot>, channel_secret: &str, sheet_connected: bool) -> Self {
        Self {
            bot,
            channel_secret: Arc::from(channel_secret),
            sheet_connected,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled, then drain in-flight requests.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "sheet_connected": state.sheet_connected,
        "default_exchange": state.bot.default_exchange(),
    }))
}

async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(state.channel_secret.as_bytes(), &body, signature) {
        warn!("webhook signature mismatch");
        return (StatusCode::UNAUTHORIZED, "Bad signature").into_response();
    }

    // platform verification requests may carry an empty or non-JSON body
    let Ok(value) = serde_json::from_slice::<Value>(&body) else {
        return Json(json!({ "ok": true, "note": "no json" })).into_response();
    };
    let payload = match serde_json::from_value::<WebhookBody>(value) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "unrecognised webhook payload");
            WebhookBody::default()
        }
    };
    debug!(destination = ?payload.destination, events = payload.events.len(), "webhook received");
    if payload.events.is_empty() {
        return Json(json!({ "ok": true, "note": "no events" })).into_response();
    }

    for event in &payload.events {
        let span = info_span!("event", event_id = %Uuid::new_v4(), kind = %event.kind);
        let Some((reply_token, text)) = event.text_message() else {
            span.in_scope(|| debug!("ignoring non-text event"));
            continue;
        };

        let result = state
            .bot
            .handle_text(reply_token, text.trim())
            .instrument(span.clone())
            .await;

        if let Err(report) = result {
            span.in_scope(|| error!(error = ?report, "reply failed"));
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "ok": false, "error": report.current_context().to_string() })),
            )
                .into_response();
        }
    }

    Json(json!({ "ok": true })).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use tower::ServiceExt;

    use super::*;
    use crate::bot::fakes::*;
    use crate::messaging::ReplyMessage;
    use crate::model::ExchangeKind;

    const SECRET: &str = "channel-secret";

    fn sign(body: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    fn app(h: Harness) -> (Router, Arc<RecordingMessenger>) {
        let messenger = h.messenger.clone();
        let state = AppState::new(Arc::new(h.bot), SECRET, true);
        (router(state), messenger)
    }

    fn default_app() -> (Router, Arc<RecordingMessenger>) {
        app(harness(
            FakeExchange::new(ExchangeKind::Upbit, &rising_closes()),
            FakeNarrator { fail: false },
            RecordingMessenger::default(),
            RecordingLog::default(),
        ))
    }

    async fn post_webhook(app: Router, body: &str, signature: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(body.to_owned()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn text_event(text: &str) -> String {
        json!({
            "destination": "U1",
            "events": [{
                "type": "message",
                "replyToken": "reply-1",
                "message": { "type": "text", "id": "1", "text": text }
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn health_reports_sheet_and_exchange() {
        let (app, _) = default_app();
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            json,
            json!({ "ok": true, "sheet_connected": true, "default_exchange": "upbit" })
        );
    }

    #[tokio::test]
    async fn bad_signature_is_unauthorized() {
        let (app, messenger) = default_app();
        let body = text_event("/price btc");
        let (status, _) = post_webhook(app, &body, "bm90LXRoZS1zaWduYXR1cmU=").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(messenger.replies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_signature_is_unauthorized() {
        let (app, _) = default_app();
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_json_body_is_acknowledged() {
        let (app, _) = default_app();
        let (status, json) = post_webhook(app, "", &sign("")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "ok": true, "note": "no json" }));
    }

    #[tokio::test]
    async fn empty_events_are_acknowledged() {
        let (app, _) = default_app();
        let body = r#"{"destination":"U1","events":[]}"#;
        let (status, json) = post_webhook(app, body, &sign(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "ok": true, "note": "no events" }));
    }

    #[tokio::test]
    async fn text_event_is_answered() {
        let (app, messenger) = default_app();
        let body = text_event("  /price eth  ");
        let (status, json) = post_webhook(app, &body, &sign(&body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "ok": true }));

        let replies = messenger.replies.lock().unwrap();
        assert_eq!(replies.len(), 1);
        let expected = ReplyMessage::text("ETHUSDT last: 42000.5000 | 24h: 1.25% | vol: n/a");
        assert_eq!(replies[0].0, "reply-1");
        assert_eq!(replies[0].1, vec![expected]);
    }

    #[tokio::test]
    async fn non_text_events_are_skipped() {
        let (app, messenger) = default_app();
        let body = json!({
            "events": [
                { "type": "follow", "replyToken": "r1" },
                {
                    "type": "message",
                    "replyToken": "r2",
                    "message": { "type": "sticker", "id": "2" }
                }
            ]
        })
        .to_string();
        let (status, json) = post_webhook(app, &body, &sign(&body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "ok": true }));
        assert!(messenger.replies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_text_event_is_answered_in_order() {
        let (app, messenger) = default_app();
        let body = json!({
            "events": [
                {
                    "type": "message",
                    "replyToken": "r1",
                    "message": { "type": "text", "id": "1", "text": "/price eth" }
                },
                {
                    "type": "message",
                    "replyToken": "r2",
                    "message": { "type": "text", "id": "2", "text": "/price btc" }
                }
            ]
        })
        .to_string();
        let (status, json) = post_webhook(app, &body, &sign(&body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "ok": true }));

        let replies = messenger.replies.lock().unwrap();
        let tokens: Vec<&str> = replies.iter().map(|(token, _)| token.as_str()).collect();
        let expected = ReplyMessage::text("BTCUSDT last: 42000.5000 | 24h: 1.25% | vol: n/a");
        assert_eq!(tokens, vec!["r1", "r2"]);
        assert_eq!(replies[1].1, vec![expected]);
    }

    #[tokio::test]
    async fn failed_reply_is_bad_gateway() {
        let (app, _) = app(harness(
            FakeExchange::new(ExchangeKind::Binance, &rising_closes()),
            FakeNarrator { fail: false },
            RecordingMessenger {
                fail: true,
                ..RecordingMessenger::default()
            },
            RecordingLog::default(),
        ));
        let body = text_event("hello");
        let (status, json) = post_webhook(app, &body, &sign(&body)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "messaging platform rejected the reply");
    }
}
