//! Normalized message model shared by both relay directions.
//!
//! All durable identity (contacts, sessions, messages) is owned by Bitrix24;
//! these types are transient envelopes built per webhook event or per poll
//! cycle and never stored locally.

use serde::{Deserialize, Serialize};

/// Sender identity derived from an inbound WhatsApp message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRef {
    /// Digits-only phone number, country code first, no `+`.
    pub phone: String,
    /// Profile name supplied by WhatsApp; may be empty.
    pub display_name: String,
}

/// Opaque media handle plus its resolved short-lived URL, once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: String,
    pub resolved_url: Option<String>,
}

/// Geographic point from a location message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Classified inbound message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Location,
    Contacts,
    Unsupported,
}

impl MessageKind {
    /// Classify the wire value of a message `type` field.
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "text" => Self::Text,
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "document" => Self::Document,
            "location" => Self::Location,
            "contacts" => Self::Contacts,
            _ => Self::Unsupported,
        }
    }
}

/// Media kinds WhatsApp accepts for outbound hosted-media sends.
/// Anything outside this set is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Document,
    Audio,
    Video,
}

impl MediaKind {
    /// Wire value used in send envelopes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// Audio messages never carry a caption.
    pub fn supports_caption(&self) -> bool {
        !matches!(self, Self::Audio)
    }

    /// Parse a user-supplied media type string.
    pub fn from_wire(kind: &str) -> Option<Self> {
        match kind {
            "image" => Some(Self::Image),
            "document" => Some(Self::Document),
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

/// Normalized inbound message, built per webhook event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// WhatsApp message ID, stamped onto the Bitrix24 message as a parameter.
    pub external_id: String,
    pub sender: ContactRef,
    pub timestamp_unix: i64,
    pub kind: MessageKind,
    /// Raw wire value of the message type, kept for parameter stamping.
    pub raw_kind: String,
    /// Rendered text per the translation table.
    pub text: String,
    pub media: Option<MediaRef>,
    pub geo: Option<GeoPoint>,
}

/// CRM contact record as returned by Bitrix24.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub last_name: String,
    pub phone: String,
}

/// Minimal view of an Open Channel session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: i64,
    pub user_code: String,
}

/// File attached to a Bitrix24 message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRef {
    pub url: String,
    pub name: String,
}

/// Agent-side message read back from an Open Channel session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayedMessage {
    pub id: i64,
    pub session_id: i64,
    /// Positive for human agents; zero or negative for system/customer rows.
    pub author_id: i64,
    pub body: String,
    pub files: Vec<FileRef>,
    /// Set once the message has been delivered to WhatsApp; the idempotence
    /// guard for the poll loop.
    pub already_relayed: bool,
}

/// Delivery receipt state reported by WhatsApp status callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryState {
    pub fn from_wire(state: &str) -> Option<Self> {
        match state {
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }
}

/// One status callback, projected one-way into Bitrix24.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStatus {
    pub message_id: String,
    pub recipient_id: String,
    pub state: DeliveryState,
    pub timestamp_unix: i64,
}
