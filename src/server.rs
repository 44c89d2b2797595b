//! HTTP surface: the Meta webhook endpoints plus a small service API for
//! connection checks and manual testing.

use crate::dispatch::Dispatcher;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use bridge24_core::{
    config::Config,
    message::MediaKind,
    traits::{BitrixGateway, WhatsAppGateway},
    webhook::Envelope,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared state for HTTP handlers.
#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    whatsapp: Arc<dyn WhatsAppGateway>,
    bitrix_domain: String,
}

/// Webhook verification query parameters. Meta sends dotted keys.
#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode", default)]
    mode: String,
    #[serde(rename = "hub.challenge", default)]
    challenge: String,
    #[serde(rename = "hub.verify_token", default)]
    verify_token: String,
}

/// `POST /api/test-send` request body.
#[derive(Debug, Deserialize)]
struct TestSendRequest {
    #[serde(default)]
    to: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    media_url: String,
    #[serde(default)]
    media_type: String,
}

/// `GET /webhook` — Meta's verification handshake. Echoes the challenge on
/// a token match, 403 otherwise.
async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<String, (StatusCode, Json<Value>)> {
    state
        .dispatcher
        .verify(&params.mode, &params.verify_token, &params.challenge)
        .ok_or((
            StatusCode::FORBIDDEN,
            Json(json!({"error": "Verification failed"})),
        ))
}

/// `POST /webhook` — Cloud API event delivery.
async fn receive_webhook(
    State(state): State<AppState>,
    body: Result<Json<Envelope>, JsonRejection>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let Json(envelope) = body.map_err(|e| {
        warn!("unparseable webhook body: {e}");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid payload"})),
        )
    })?;

    let success = state.dispatcher.process_event(&envelope).await;
    Ok(Json(json!({"success": success})))
}

/// `GET /api/status` — probe both platform connections.
async fn status(State(state): State<AppState>) -> Json<Value> {
    let mut errors: Vec<String> = Vec::new();
    let mut body = json!({ "whatsapp": false, "bitrix24": false });

    match state.whatsapp.phone_number_info().await {
        Ok(info) => {
            body["whatsapp"] = json!(true);
            body["whatsapp_info"] = info;
        }
        Err(e) => errors.push(format!("WhatsApp API: {e}")),
    }

    if state.bitrix_domain.is_empty() {
        errors.push("Bitrix24: domain not configured".to_string());
    } else {
        body["bitrix24"] = json!(true);
        body["bitrix24_info"] = json!({ "domain": state.bitrix_domain });
    }

    body["errors"] = json!(errors);
    Json(body)
}

/// `POST /api/test-send` — manually push a message to a WhatsApp number.
async fn test_send(
    State(state): State<AppState>,
    body: Result<Json<TestSendRequest>, JsonRejection>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let Json(request) = body.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("invalid request: {e}")})),
        )
    })?;

    if request.to.is_empty() || request.message.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing required fields"})),
        ));
    }

    if let Err(e) = state.whatsapp.send_typing(&request.to).await {
        debug!("typing indicator failed: {e}");
    }

    let result = if request.media_url.is_empty() {
        state.whatsapp.send_text(&request.to, &request.message).await
    } else {
        match MediaKind::from_wire(&request.media_type) {
            Some(kind) => {
                state
                    .whatsapp
                    .send_media(&request.to, kind, &request.media_url, &request.message)
                    .await
            }
            // Unknown media type degrades to a text message carrying the URL.
            None => {
                let body_text = format!("{}\n\nMedia: {}", request.message, request.media_url);
                state.whatsapp.send_text(&request.to, &body_text).await
            }
        }
    };

    match result {
        Ok(_) => Ok(Json(json!({"success": true}))),
        Err(e) => {
            warn!("test send failed: {e}");
            Ok(Json(json!({"success": false})))
        }
    }
}

/// `POST /api/test-webhook` — feed an event envelope through message
/// processing without the business-account check.
async fn test_webhook(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let Json(raw) = body.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("invalid request: {e}")})),
        )
    })?;

    if !raw.get("entry").map(Value::is_array).unwrap_or(false) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid webhook payload"})),
        ));
    }

    let envelope: Envelope = serde_json::from_value(raw).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("Invalid webhook payload: {e}")})),
        )
    })?;

    let success = state.dispatcher.process_test(&envelope).await;
    Ok(Json(json!({"success": success})))
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "Endpoint not found"})),
    )
}

/// Build the axum router with shared state.
fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .route("/api/status", get(status))
        .route("/api/test-send", post(test_send))
        .route("/api/test-webhook", post(test_webhook))
        .fallback(not_found)
        .layer(axum::extract::DefaultBodyLimit::max(1024 * 1024)) // 1 MB max request body
        .with_state(state)
}

/// Start the HTTP server and run until shutdown.
pub async fn serve(
    config: Config,
    whatsapp: Arc<dyn WhatsAppGateway>,
    bitrix: Arc<dyn BitrixGateway>,
) -> anyhow::Result<()> {
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&whatsapp),
        bitrix,
        config.whatsapp.webhook_verify_token.clone(),
        config.whatsapp.business_account_id.clone(),
    ));

    let state = AppState {
        dispatcher,
        whatsapp,
        bitrix_domain: config.bitrix24.domain.clone(),
    };

    let app = build_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("webhook server listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
