//! Inbound HTTP boundary: the Twilio WhatsApp webhook.

use std::sync::Arc;

use axum::extract::{Form, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::dialog::{Dialog, InboundMessage};

/// Fields consumed from Twilio's form-encoded webhook payload.
#[derive(Debug, Deserialize)]
pub struct TwilioInbound {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "MediaUrl0")]
    pub media_url: Option<String>,
    #[serde(rename = "Latitude")]
    pub latitude: Option<f64>,
    #[serde(rename = "Longitude")]
    pub longitude: Option<f64>,
}

pub fn router(dialog: Arc<Dialog>) -> Router {
    Router::new()
        .route("/webhook/whatsapp", post(handle_webhook))
        .route("/health", get(health))
        .with_state(dialog)
}

/// Always acknowledges with 200: replies go out over the Twilio REST API,
/// not the webhook response, and Twilio retries non-2xx deliveries.
async fn handle_webhook(
    State(dialog): State<Arc<Dialog>>,
    Form(payload): Form<TwilioInbound>,
) -> Json<Value> {
    let msg = InboundMessage {
        from: payload.from,
        body: payload.body,
        media_url: payload.media_url,
        latitude: payload.latitude,
        longitude: payload.longitude,
    };

    if let Err(e) = dialog.handle_inbound(msg).await {
        warn!("Inbound turn failed: {e}");
    }
    Json(json!({"status": "received"}))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
