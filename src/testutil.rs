//! In-memory gateway fakes for dispatcher, relay, and server tests.

use async_trait::async_trait;
use bridge24_core::{
    error::BridgeError,
    message::{
        ChannelMessage, Contact, DeliveryStatus, MediaKind, RelayedMessage, SessionSummary,
    },
    session::SessionKey,
    traits::{BitrixGateway, WhatsAppGateway},
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

fn api_error(service: &'static str) -> BridgeError {
    BridgeError::Api {
        service,
        status: 500,
        body: "mock failure".to_string(),
    }
}

/// Recording fake for the WhatsApp gateway.
#[derive(Default)]
pub struct MockWhatsApp {
    /// `(to, body)` pairs from `send_text`.
    pub sent_texts: Mutex<Vec<(String, String)>>,
    /// `(to, kind, url, caption)` tuples from `send_media`.
    pub sent_media: Mutex<Vec<(String, MediaKind, String, String)>>,
    pub read_marks: Mutex<Vec<String>>,
    pub typing_calls: Mutex<Vec<String>>,
    /// Media IDs resolvable to signed URLs; everything else errors.
    pub media_urls: Mutex<HashMap<String, String>>,
    fail_sends: bool,
    fail_mark_read: bool,
    fail_info: bool,
}

impl MockWhatsApp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn failing_mark_read(mut self) -> Self {
        self.fail_mark_read = true;
        self
    }

    pub fn failing_info(mut self) -> Self {
        self.fail_info = true;
        self
    }
}

#[async_trait]
impl WhatsAppGateway for MockWhatsApp {
    async fn send_text(&self, to: &str, body: &str) -> Result<String, BridgeError> {
        if self.fail_sends {
            return Err(api_error("whatsapp"));
        }
        self.sent_texts
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok("wamid.mock.text".to_string())
    }

    async fn send_media(
        &self,
        to: &str,
        kind: MediaKind,
        url: &str,
        caption: &str,
    ) -> Result<String, BridgeError> {
        if self.fail_sends {
            return Err(api_error("whatsapp"));
        }
        self.sent_media.lock().unwrap().push((
            to.to_string(),
            kind,
            url.to_string(),
            caption.to_string(),
        ));
        Ok("wamid.mock.media".to_string())
    }

    async fn send_location(
        &self,
        _to: &str,
        _lat: f64,
        _lon: f64,
        _name: &str,
        _address: &str,
    ) -> Result<String, BridgeError> {
        Ok("wamid.mock.location".to_string())
    }

    async fn send_contacts(&self, _to: &str, _contacts: &Value) -> Result<String, BridgeError> {
        Ok("wamid.mock.contacts".to_string())
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), BridgeError> {
        if self.fail_mark_read {
            return Err(api_error("whatsapp"));
        }
        self.read_marks.lock().unwrap().push(message_id.to_string());
        Ok(())
    }

    async fn send_typing(&self, to: &str) -> Result<(), BridgeError> {
        self.typing_calls.lock().unwrap().push(to.to_string());
        Ok(())
    }

    async fn media_url(&self, media_id: &str) -> Result<String, BridgeError> {
        self.media_urls
            .lock()
            .unwrap()
            .get(media_id)
            .cloned()
            .ok_or_else(|| api_error("whatsapp"))
    }

    async fn phone_number_info(&self) -> Result<Value, BridgeError> {
        if self.fail_info {
            return Err(api_error("whatsapp"));
        }
        Ok(json!({
            "display_phone_number": "+1 555-010-0001",
            "verified_name": "Test Business",
            "id": "106540352242922",
        }))
    }
}

/// Recording fake for the Bitrix24 gateway.
#[derive(Default)]
pub struct MockBitrix {
    /// `(phone, name)` pairs from `find_or_create_contact`.
    pub contact_calls: Mutex<Vec<(String, String)>>,
    /// User codes derived in `get_or_create_session`.
    pub session_calls: Mutex<Vec<String>>,
    pub posted: Mutex<Vec<(i64, ChannelMessage)>>,
    pub relayed: Mutex<Vec<i64>>,
    pub status_updates: Mutex<Vec<DeliveryStatus>>,
    /// What `active_sessions` returns.
    pub sessions: Mutex<Vec<SessionSummary>>,
    /// Per-session message lists for `recent_messages`.
    pub messages: Mutex<HashMap<i64, Vec<RelayedMessage>>>,
    fail_post: bool,
    fail_recent: bool,
}

impl MockBitrix {
    pub const CONTACT_ID: i64 = 315;
    pub const SESSION_ID: i64 = 42;
    pub const POSTED_MESSAGE_ID: i64 = 5001;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_post(mut self) -> Self {
        self.fail_post = true;
        self
    }

    pub fn failing_recent(mut self) -> Self {
        self.fail_recent = true;
        self
    }
}

#[async_trait]
impl BitrixGateway for MockBitrix {
    async fn find_or_create_contact(
        &self,
        phone: &str,
        name: &str,
    ) -> Result<Contact, BridgeError> {
        self.contact_calls
            .lock()
            .unwrap()
            .push((phone.to_string(), name.to_string()));
        Ok(Contact {
            id: Self::CONTACT_ID,
            name: name.to_string(),
            last_name: String::new(),
            phone: phone.to_string(),
        })
    }

    async fn get_or_create_session(
        &self,
        phone: &str,
        _contact: &Contact,
    ) -> Result<i64, BridgeError> {
        self.session_calls
            .lock()
            .unwrap()
            .push(SessionKey::from_phone(phone).as_str().to_string());
        Ok(Self::SESSION_ID)
    }

    async fn post_message(
        &self,
        session_id: i64,
        message: &ChannelMessage,
    ) -> Result<i64, BridgeError> {
        if self.fail_post {
            return Err(api_error("bitrix24"));
        }
        self.posted
            .lock()
            .unwrap()
            .push((session_id, message.clone()));
        Ok(Self::POSTED_MESSAGE_ID)
    }

    async fn recent_messages(
        &self,
        session_id: i64,
        limit: u32,
    ) -> Result<Vec<RelayedMessage>, BridgeError> {
        if self.fail_recent {
            return Err(api_error("bitrix24"));
        }
        let mut messages = self
            .messages
            .lock()
            .unwrap()
            .get(&session_id)
            .cloned()
            .unwrap_or_default();
        messages.truncate(limit as usize);
        Ok(messages)
    }

    async fn active_sessions(&self) -> Result<Vec<SessionSummary>, BridgeError> {
        Ok(self.sessions.lock().unwrap().clone())
    }

    async fn mark_relayed(&self, message_id: i64) -> Result<(), BridgeError> {
        self.relayed.lock().unwrap().push(message_id);
        Ok(())
    }

    async fn update_delivery_status(&self, status: &DeliveryStatus) -> Result<(), BridgeError> {
        self.status_updates.lock().unwrap().push(status.clone());
        Ok(())
    }
}
