use crate::error::BridgeError;
use crate::message::{
    ChannelMessage, Contact, DeliveryStatus, MediaKind, RelayedMessage, SessionSummary,
};
use async_trait::async_trait;

/// Outbound WhatsApp Cloud API surface.
///
/// Pure request/response; implementations hold no relay state. The
/// dispatcher and relay coordinator only see this trait, so tests substitute
/// in-memory fakes.
#[async_trait]
pub trait WhatsAppGateway: Send + Sync {
    /// Send a plain text message. Returns the provider message ID.
    ///
    /// Send operations are not safe to blind-retry: a retry after an
    /// ambiguous failure risks duplicate delivery.
    async fn send_text(&self, to: &str, body: &str) -> Result<String, BridgeError>;

    /// Send a hosted media item by URL. Caption applies to image, document,
    /// and video; audio never carries one.
    async fn send_media(
        &self,
        to: &str,
        kind: MediaKind,
        url: &str,
        caption: &str,
    ) -> Result<String, BridgeError>;

    /// Send a location pin.
    async fn send_location(
        &self,
        to: &str,
        lat: f64,
        lon: f64,
        name: &str,
        address: &str,
    ) -> Result<String, BridgeError>;

    /// Forward contact cards verbatim.
    async fn send_contacts(
        &self,
        to: &str,
        contacts: &serde_json::Value,
    ) -> Result<String, BridgeError>;

    /// Mark an inbound message as read. Fire-and-forget at call sites: a
    /// failure must never block the relay path.
    async fn mark_read(&self, message_id: &str) -> Result<(), BridgeError>;

    /// Show a typing indicator to the recipient. Same fire-and-forget
    /// contract as [`mark_read`](Self::mark_read).
    async fn send_typing(&self, to: &str) -> Result<(), BridgeError>;

    /// Resolve an opaque media ID to its short-lived signed URL.
    ///
    /// Downloading the bytes requires the same bearer token; callers that
    /// only re-host by URL stop after this step.
    async fn media_url(&self, media_id: &str) -> Result<String, BridgeError>;

    /// Fetch metadata for the configured phone number.
    async fn phone_number_info(&self) -> Result<serde_json::Value, BridgeError>;
}

/// Outbound Bitrix24 REST surface.
#[async_trait]
pub trait BitrixGateway: Send + Sync {
    /// Look up a CRM contact by phone digits, creating it when absent.
    ///
    /// Lookup-then-create: two concurrent first messages from the same
    /// number can create duplicate contacts.
    async fn find_or_create_contact(
        &self,
        phone: &str,
        name: &str,
    ) -> Result<Contact, BridgeError>;

    /// Look up the Open Channel session for a phone number, creating it when
    /// absent. The session key is deterministic, so repeated calls for the
    /// same number converge on one session.
    async fn get_or_create_session(
        &self,
        phone: &str,
        contact: &Contact,
    ) -> Result<i64, BridgeError>;

    /// Post a translated inbound message into a session. Returns the
    /// Bitrix24 message ID.
    async fn post_message(
        &self,
        session_id: i64,
        message: &ChannelMessage,
    ) -> Result<i64, BridgeError>;

    /// Fetch up to `limit` recent messages from a session.
    async fn recent_messages(
        &self,
        session_id: i64,
        limit: u32,
    ) -> Result<Vec<RelayedMessage>, BridgeError>;

    /// Enumerate sessions the poll cycle should inspect.
    async fn active_sessions(&self) -> Result<Vec<SessionSummary>, BridgeError>;

    /// Flag a message as delivered to WhatsApp so later cycles skip it.
    async fn mark_relayed(&self, message_id: i64) -> Result<(), BridgeError>;

    /// Project a WhatsApp delivery receipt onto the Bitrix24 side.
    async fn update_delivery_status(&self, status: &DeliveryStatus) -> Result<(), BridgeError>;
}
