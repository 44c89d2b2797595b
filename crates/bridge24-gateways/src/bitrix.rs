//! Bitrix24 REST client for CRM contacts and Open Channel sessions.
//!
//! Every call is a single POST to `{webhook_url}{method}.json`; responses
//! follow the portal-wide `{result, error, error_description}` envelope.
//! Docs: <https://apidocs.bitrix24.com/>

use async_trait::async_trait;
use bridge24_core::{
    config::BitrixConfig,
    error::BridgeError,
    message::{
        ChannelMessage, Contact, DeliveryStatus, FileRef, MessageKind, RelayedMessage,
        SessionSummary,
    },
    session::{digits_only, SessionKey},
    traits::BitrixGateway,
};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// REST webhook client bound to one Bitrix24 portal.
pub struct BitrixClient {
    client: reqwest::Client,
    config: BitrixConfig,
    /// Webhook base, normalized to end with `/`.
    base_url: String,
}

impl BitrixClient {
    /// Create a client from config values.
    pub fn new(config: BitrixConfig) -> Self {
        let mut base_url = config.webhook_url.clone();
        if !base_url.is_empty() && !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            client: reqwest::Client::new(),
            config,
            base_url,
        }
    }

    /// Call one REST method, returning its `result` payload.
    async fn call(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let url = format!("{}{method}.json", self.base_url);
        debug!("bitrix24: calling {method}");

        let resp = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&params)
            .send()
            .await
            .map_err(|e| BridgeError::Transport {
                service: "bitrix24",
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::Api {
                service: "bitrix24",
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = resp.json().await.map_err(|e| BridgeError::Transport {
            service: "bitrix24",
            detail: format!("response parse failed: {e}"),
        })?;

        if let Some(error) = body.get("error").and_then(Value::as_str) {
            let description = body
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Err(BridgeError::Api {
                service: "bitrix24",
                status: status.as_u16(),
                body: format!("{error}: {description}"),
            });
        }

        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }
}

// --- Response parsing helpers (pure, unit-tested) ---

/// Bitrix24 list endpoints return numeric IDs as strings; accept both.
fn parse_id(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Split a display name into Bitrix24 first/last fields.
/// Empty names fall back to `WhatsApp`/`User`; a single token gets the
/// `User` last name.
fn split_contact_name(name: &str) -> (String, String) {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return ("WhatsApp".to_string(), "User".to_string());
    }
    match trimmed.split_once(' ') {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (trimmed.to_string(), "User".to_string()),
    }
}

/// Truthiness for message PARAMS flags: absent, empty, `0`, and `N` count
/// as unset.
fn param_is_set(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty() && s != "0" && s != "N",
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(_) => true,
    }
}

fn parse_contact(value: &Value) -> Contact {
    Contact {
        id: parse_id(value.get("ID").unwrap_or(&Value::Null)),
        name: str_field(value, "NAME"),
        last_name: str_field(value, "LAST_NAME"),
        phone: value
            .get("PHONE")
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("VALUE"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

/// Dialog file lists arrive either as arrays or as maps keyed by file ID.
fn parse_files(value: &Value) -> Vec<FileRef> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .map(|file| FileRef {
            url: str_field(file, "URL"),
            name: str_field(file, "NAME"),
        })
        .collect()
}

fn parse_message(value: &Value, session_id: i64) -> RelayedMessage {
    RelayedMessage {
        id: parse_id(value.get("ID").unwrap_or(&Value::Null)),
        session_id,
        author_id: parse_id(value.get("AUTHOR_ID").unwrap_or(&Value::Null)),
        body: str_field(value, "MESSAGE"),
        files: value.get("FILES").map(parse_files).unwrap_or_default(),
        already_relayed: param_is_set(
            value.get("PARAMS").and_then(|p| p.get("WHATSAPP_SENT")),
        ),
    }
}

#[async_trait]
impl BitrixGateway for BitrixClient {
    async fn find_or_create_contact(
        &self,
        phone: &str,
        name: &str,
    ) -> Result<Contact, BridgeError> {
        let clean_phone = digits_only(phone);
        let found = self
            .call(
                "crm.contact.list",
                json!({
                    "filter": { "PHONE": clean_phone },
                    "select": ["ID", "NAME", "LAST_NAME", "PHONE"],
                }),
            )
            .await?;

        if let Some(first) = found.as_array().and_then(|contacts| contacts.first()) {
            let contact = parse_contact(first);
            info!("bitrix24: found contact {} for {phone}", contact.id);
            return Ok(contact);
        }

        // Lookup-then-create: two concurrent first messages from the same
        // number can both reach this point and create duplicates.
        let (first_name, last_name) = split_contact_name(name);
        let created = self
            .call(
                "crm.contact.add",
                json!({
                    "fields": {
                        "NAME": first_name,
                        "LAST_NAME": last_name,
                        "SOURCE_ID": "WHATSAPP",
                        "PHONE": [ { "VALUE": phone, "VALUE_TYPE": "WORK" } ],
                    }
                }),
            )
            .await?;

        let contact_id = parse_id(&created);
        if contact_id == 0 {
            return Err(BridgeError::Validation(format!(
                "contact creation for {phone} returned no id"
            )));
        }
        info!("bitrix24: created contact {contact_id} for {phone}");

        let full = self.call("crm.contact.get", json!({ "id": contact_id })).await?;
        Ok(parse_contact(&full))
    }

    async fn get_or_create_session(
        &self,
        phone: &str,
        contact: &Contact,
    ) -> Result<i64, BridgeError> {
        let key = SessionKey::from_phone(phone);
        let found = self
            .call("imopenlines.session.get", json!({ "USER_CODE": key.as_str() }))
            .await?;

        let existing = parse_id(found.get("ID").unwrap_or(&Value::Null));
        if existing > 0 {
            debug!("bitrix24: found session {existing} ({key})");
            return Ok(existing);
        }

        let user_name = if contact.name.is_empty() {
            "WhatsApp User"
        } else {
            contact.name.as_str()
        };
        let created = self
            .call(
                "imopenlines.session.create",
                json!({
                    "USER_CODE": key.as_str(),
                    "LINE_ID": self.config.open_channel_id,
                    "CRM_CREATE": 0,
                    "CRM": { "ENTITY_TYPE": "CONTACT", "ENTITY_ID": contact.id },
                    "USER_NAME": user_name,
                    "USER_AVATAR": "",
                    "CHAT_TITLE": format!("WhatsApp: {phone}"),
                }),
            )
            .await?;

        let session_id = parse_id(&created);
        if session_id == 0 {
            return Err(BridgeError::Validation(format!(
                "session creation for {key} returned no id"
            )));
        }
        info!("bitrix24: created session {session_id} ({key})");
        Ok(session_id)
    }

    async fn post_message(
        &self,
        session_id: i64,
        message: &ChannelMessage,
    ) -> Result<i64, BridgeError> {
        let mut text = message.text.clone();
        let mut files = Vec::new();

        if let Some(url) = message.media.as_ref().and_then(|m| m.resolved_url.as_deref()) {
            match message.kind {
                // The real filename and mime type are not part of the
                // webhook payload; placeholders stand in.
                MessageKind::Image => files.push(json!({
                    "name": "image.jpg",
                    "type": "image/jpeg",
                    "tmp_name": url,
                    "size": 0,
                    "MODULE_ID": "imopenlines",
                })),
                MessageKind::Document => files.push(json!({
                    "name": "document.pdf",
                    "type": "application/pdf",
                    "tmp_name": url,
                    "size": 0,
                    "MODULE_ID": "imopenlines",
                })),
                _ => {
                    text.push_str("\n\nMedia URL: ");
                    text.push_str(url);
                }
            }
        }

        let result = self
            .call(
                "imopenlines.message.add",
                json!({
                    "SESSION_ID": session_id,
                    "MESSAGE": text,
                    "SYSTEM": "N",
                    "FILES": files,
                    "PARAMS": {
                        "WHATSAPP_MESSAGE_ID": message.external_id,
                        "WHATSAPP_MESSAGE_TYPE": message.raw_kind,
                        "WHATSAPP_TIMESTAMP": message.timestamp_unix.to_string(),
                    },
                }),
            )
            .await?;

        let message_id = parse_id(&result);
        if message_id == 0 {
            return Err(BridgeError::Validation(format!(
                "message post into session {session_id} returned no id"
            )));
        }
        info!("bitrix24: posted message {message_id} into session {session_id}");
        Ok(message_id)
    }

    async fn recent_messages(
        &self,
        session_id: i64,
        limit: u32,
    ) -> Result<Vec<RelayedMessage>, BridgeError> {
        let result = self
            .call(
                "imopenlines.dialog.messages.get",
                json!({ "SESSION_ID": session_id, "LIMIT": limit }),
            )
            .await?;

        // Dialog responses are either a bare array or nested under "messages".
        let items = match result {
            Value::Array(items) => items,
            Value::Object(ref map) => map
                .get("messages")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        Ok(items
            .iter()
            .map(|item| parse_message(item, session_id))
            .collect())
    }

    async fn active_sessions(&self) -> Result<Vec<SessionSummary>, BridgeError> {
        // The public REST surface has no session enumeration method; without
        // an external session registry the poll cycle has nothing to walk.
        warn!("bitrix24: session enumeration is not available over REST");
        Ok(Vec::new())
    }

    async fn mark_relayed(&self, message_id: i64) -> Result<(), BridgeError> {
        // Message params cannot be mutated over the public REST surface;
        // making this durable needs a persistent WhatsApp <-> Bitrix24
        // message ID mapping.
        info!("bitrix24: marking message {message_id} as relayed");
        Ok(())
    }

    async fn update_delivery_status(&self, status: &DeliveryStatus) -> Result<(), BridgeError> {
        // Same gap as `mark_relayed`: there is no stored mapping from
        // WhatsApp message IDs to Bitrix24 messages to update.
        info!(
            "bitrix24: delivery status '{}' for message {}",
            status.state.as_str(),
            status.message_id
        );
        Ok(())
    }
}
