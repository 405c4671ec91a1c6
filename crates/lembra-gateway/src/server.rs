// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router, state, and webhook handlers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lembra_agent::{Dispatcher, ProviderRegistry};
use lembra_core::types::Provider;
use lembra_core::{LembraError, WebhookRequest};

/// Shared state for all webhook handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Arc<ProviderRegistry>,
    /// WhatsApp Cloud subscription verify token (GET handshake).
    pub whatsapp_verify_token: Option<String>,
}

/// Response body for GET /healthz.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Build the gateway router.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/healthz", get(get_health))
        .route("/webhooks/telegram", post(telegram_webhook))
        .route(
            "/webhooks/whatsapp",
            get(whatsapp_subscribe).post(whatsapp_webhook),
        )
        .route("/webhooks/evolution", post(evolution_webhook))
        .route("/webhooks/discord", post(discord_webhook))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the cancellation token fires.
pub async fn serve(
    state: GatewayState,
    addr: SocketAddr,
    cancel: CancellationToken,
) -> Result<(), LembraError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| LembraError::Internal(format!("gateway bind failed: {e}")))?;
    info!(%addr, "gateway listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| LembraError::Internal(format!("gateway server error: {e}")))
}

async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn webhook_request(headers: &HeaderMap, body: &Bytes) -> WebhookRequest {
    let header_pairs = headers.iter().filter_map(|(name, value)| {
        value
            .to_str()
            .ok()
            .map(|v| (name.as_str().to_string(), v.to_string()))
    });
    WebhookRequest::new(header_pairs, body.to_vec())
}

/// Shared verify → parse → enqueue flow.
async fn ingest(
    state: &GatewayState,
    provider: Provider,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(adapter) = state.registry.get(provider) else {
        debug!(%provider, "webhook for unregistered provider");
        return StatusCode::NOT_FOUND;
    };

    let request = webhook_request(&headers, &body);
    if !adapter.verify_webhook(&request) {
        warn!(%provider, "webhook verification failed");
        return StatusCode::UNAUTHORIZED;
    }

    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return StatusCode::BAD_REQUEST;
    };

    match adapter.parse_incoming(&payload) {
        Some(message) => {
            if let Err(e) = state.dispatcher.submit(&message).await {
                warn!(%provider, error = %e, "enqueue failed");
                return StatusCode::INTERNAL_SERVER_ERROR;
            }
            StatusCode::OK
        }
        // Irrelevant/gated payloads still get a clean ack.
        None => StatusCode::OK,
    }
}

async fn telegram_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    ingest(&state, Provider::Telegram, headers, body).await
}

async fn whatsapp_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    ingest(&state, Provider::WhatsappCloud, headers, body).await
}

async fn evolution_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    ingest(&state, Provider::WhatsappEvolution, headers, body).await
}

/// WhatsApp Cloud subscription handshake: echo the challenge when the
/// verify token matches, 403 otherwise.
async fn whatsapp_subscribe(
    State(state): State<GatewayState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mode = params.get("hub.mode").map(String::as_str).unwrap_or("");
    let token = params
        .get("hub.verify_token")
        .map(String::as_str)
        .unwrap_or("");
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();

    let expected = state.whatsapp_verify_token.as_deref();
    if mode == "subscribe" && expected.is_some() && Some(token) == expected {
        challenge.into_response()
    } else {
        StatusCode::FORBIDDEN.into_response()
    }
}

/// Discord interactions endpoint. PING gets PONG inline (wire
/// requirement); everything else goes through the normal ingest flow.
async fn discord_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(adapter) = state.registry.get(Provider::Discord) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let request = webhook_request(&headers, &body);
    if !adapter.verify_webhook(&request) {
        warn!("discord webhook verification failed");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    if payload.get("type").and_then(|t| t.as_u64()) == Some(1) {
        return Json(serde_json::json!({ "type": 1 })).into_response();
    }

    match adapter.parse_incoming(&payload) {
        Some(message) => {
            if let Err(e) = state.dispatcher.submit(&message).await {
                warn!(error = %e, "discord enqueue failed");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            // Deferred ack: the dispatcher answers the interaction.
            Json(serde_json::json!({ "type": 6 })).into_response()
        }
        None => StatusCode::OK.into_response(),
    }
}
