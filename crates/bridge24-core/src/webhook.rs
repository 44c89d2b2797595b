//! WhatsApp Cloud API webhook wire types.
//!
//! Deliberately lenient: Meta omits most fields depending on the event type,
//! and other webhook senders probe endpoints with unrelated objects, so every
//! field defaults instead of failing the whole envelope.
//! Docs: <https://developers.facebook.com/docs/whatsapp/cloud-api/webhooks>

use serde::Deserialize;
use serde_json::Value;

/// Top-level webhook envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

/// One entry, scoped to a single WhatsApp Business Account.
#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    /// Business account ID the entry belongs to.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<WaMessage>,
    #[serde(default)]
    pub statuses: Vec<WaStatus>,
    #[serde(default)]
    pub contacts: Vec<WaContact>,
}

/// One inbound message item.
#[derive(Debug, Clone, Deserialize)]
pub struct WaMessage {
    #[serde(default)]
    pub id: String,
    /// Sender phone number (digits only, country code first).
    #[serde(default)]
    pub from: String,
    /// Unix seconds, sent as a string.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    pub text: Option<WaText>,
    pub image: Option<WaMedia>,
    pub video: Option<WaMedia>,
    pub audio: Option<WaMedia>,
    pub document: Option<WaMedia>,
    pub location: Option<WaLocation>,
    /// Shared contact cards, passed through untouched.
    pub contacts: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaText {
    #[serde(default)]
    pub body: String,
}

/// Media descriptor common to image/video/audio/document payloads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WaMedia {
    #[serde(default)]
    pub id: String,
    pub caption: Option<String>,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaLocation {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

/// Sender profile attached to a message batch.
#[derive(Debug, Clone, Deserialize)]
pub struct WaContact {
    #[serde(default)]
    pub wa_id: String,
    #[serde(default)]
    pub profile: WaProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WaProfile {
    #[serde(default)]
    pub name: String,
}

/// One delivery-status item.
#[derive(Debug, Clone, Deserialize)]
pub struct WaStatus {
    /// WhatsApp message ID the status refers to.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub recipient_id: String,
}
