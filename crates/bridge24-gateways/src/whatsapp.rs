//! Meta WhatsApp Business (Cloud) API client.
//!
//! Everything goes through `graph.facebook.com`: message sends and read
//! receipts are POSTs to `/{phone_number_id}/messages`, media resolution is
//! a GET on the media ID.
//! Docs: <https://developers.facebook.com/docs/whatsapp/cloud-api>

use async_trait::async_trait;
use bridge24_core::{
    config::WhatsAppConfig, error::BridgeError, message::MediaKind, traits::WhatsAppGateway,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

const GRAPH_API_BASE: &str = "https://graph.facebook.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cloud API client bound to one business phone number.
pub struct WhatsAppClient {
    client: reqwest::Client,
    config: WhatsAppConfig,
    base_url: String,
}

// --- Cloud API response types ---

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MediaInfo {
    url: Option<String>,
}

// --- Request payload builders (pure, unit-tested) ---

fn text_payload(to: &str, body: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": { "preview_url": false, "body": body },
    })
}

fn media_payload(to: &str, kind: MediaKind, url: &str, caption: &str) -> Value {
    let mut media = json!({ "link": url });
    if !caption.is_empty() && kind.supports_caption() {
        media["caption"] = json!(caption);
    }
    let mut payload = json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": kind.as_str(),
    });
    payload[kind.as_str()] = media;
    payload
}

fn location_payload(to: &str, lat: f64, lon: f64, name: &str, address: &str) -> Value {
    let mut location = json!({ "latitude": lat, "longitude": lon });
    if !name.is_empty() {
        location["name"] = json!(name);
    }
    if !address.is_empty() {
        location["address"] = json!(address);
    }
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "location",
        "location": location,
    })
}

fn contacts_payload(to: &str, contacts: &Value) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "contacts",
        "contacts": contacts,
    })
}

fn read_receipt_payload(message_id: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "status": "read",
        "message_id": message_id,
    })
}

fn typing_payload(to: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "reaction",
        "reaction": {
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "typing",
        },
    })
}

impl WhatsAppClient {
    /// Create a client from config values.
    pub fn new(config: WhatsAppConfig) -> Self {
        let base_url = format!("{GRAPH_API_BASE}/{}", config.api_version);
        Self {
            client: reqwest::Client::new(),
            config,
            base_url,
        }
    }

    /// POST a message envelope to `/{phone_number_id}/messages`.
    async fn post_messages(&self, payload: Value) -> Result<SendResponse, BridgeError> {
        let url = format!("{}/{}/messages", self.base_url, self.config.phone_number_id);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .timeout(REQUEST_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(|e| BridgeError::Transport {
                service: "whatsapp",
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::Api {
                service: "whatsapp",
                status: status.as_u16(),
                body,
            });
        }

        resp.json().await.map_err(|e| BridgeError::Transport {
            service: "whatsapp",
            detail: format!("response parse failed: {e}"),
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value, BridgeError> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.config.api_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| BridgeError::Transport {
                service: "whatsapp",
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::Api {
                service: "whatsapp",
                status: status.as_u16(),
                body,
            });
        }

        resp.json().await.map_err(|e| BridgeError::Transport {
            service: "whatsapp",
            detail: format!("response parse failed: {e}"),
        })
    }
}

fn first_message_id(resp: SendResponse) -> String {
    resp.messages
        .into_iter()
        .next()
        .map(|m| m.id)
        .unwrap_or_default()
}

#[async_trait]
impl WhatsAppGateway for WhatsAppClient {
    async fn send_text(&self, to: &str, body: &str) -> Result<String, BridgeError> {
        let resp = self.post_messages(text_payload(to, body)).await?;
        let id = first_message_id(resp);
        info!("whatsapp: sent text to {to} ({id})");
        Ok(id)
    }

    async fn send_media(
        &self,
        to: &str,
        kind: MediaKind,
        url: &str,
        caption: &str,
    ) -> Result<String, BridgeError> {
        let resp = self
            .post_messages(media_payload(to, kind, url, caption))
            .await?;
        let id = first_message_id(resp);
        info!("whatsapp: sent {} to {to} ({id})", kind.as_str());
        Ok(id)
    }

    async fn send_location(
        &self,
        to: &str,
        lat: f64,
        lon: f64,
        name: &str,
        address: &str,
    ) -> Result<String, BridgeError> {
        let resp = self
            .post_messages(location_payload(to, lat, lon, name, address))
            .await?;
        let id = first_message_id(resp);
        info!("whatsapp: sent location to {to} ({id})");
        Ok(id)
    }

    async fn send_contacts(&self, to: &str, contacts: &Value) -> Result<String, BridgeError> {
        let resp = self.post_messages(contacts_payload(to, contacts)).await?;
        let id = first_message_id(resp);
        info!("whatsapp: sent contact cards to {to} ({id})");
        Ok(id)
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), BridgeError> {
        self.post_messages(read_receipt_payload(message_id)).await?;
        debug!("whatsapp: marked {message_id} as read");
        Ok(())
    }

    async fn send_typing(&self, to: &str) -> Result<(), BridgeError> {
        self.post_messages(typing_payload(to)).await?;
        debug!("whatsapp: sent typing indicator to {to}");
        Ok(())
    }

    async fn media_url(&self, media_id: &str) -> Result<String, BridgeError> {
        if media_id.is_empty() {
            return Err(BridgeError::Validation("empty media id".to_string()));
        }

        let url = format!("{}/{media_id}", self.base_url);
        let info: MediaInfo =
            serde_json::from_value(self.get_json(&url).await?).map_err(|e| {
                BridgeError::Transport {
                    service: "whatsapp",
                    detail: format!("media response parse failed: {e}"),
                }
            })?;

        // The signed URL is short-lived; downloading the bytes needs the
        // same bearer token.
        info.url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| BridgeError::Validation(format!("media {media_id} has no url")))
    }

    async fn phone_number_info(&self) -> Result<Value, BridgeError> {
        let url = format!("{}/{}", self.base_url, self.config.phone_number_id);
        self.get_json(&url).await
    }
}
