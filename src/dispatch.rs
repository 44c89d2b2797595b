//! Inbound webhook verification and event fan-out.
//!
//! One dispatcher handles both halves of the Meta webhook contract: the
//! one-time GET verification handshake and the POSTed event envelopes. Every
//! message in a batch is processed independently, so one bad message never
//! takes down its siblings.

use bridge24_core::{
    error::BridgeError,
    message::{ChannelMessage, DeliveryState, DeliveryStatus},
    traits::{BitrixGateway, WhatsAppGateway},
    translate,
    webhook::{Envelope, WaContact, WaMessage, WaStatus},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Routes verified WhatsApp webhook events into the Bitrix24 gateway.
pub struct Dispatcher {
    whatsapp: Arc<dyn WhatsAppGateway>,
    bitrix: Arc<dyn BitrixGateway>,
    verify_token: String,
    business_account_id: String,
}

impl Dispatcher {
    pub fn new(
        whatsapp: Arc<dyn WhatsAppGateway>,
        bitrix: Arc<dyn BitrixGateway>,
        verify_token: String,
        business_account_id: String,
    ) -> Self {
        Self {
            whatsapp,
            bitrix,
            verify_token,
            business_account_id,
        }
    }

    /// Webhook verification handshake. Returns the challenge to echo back,
    /// or `None` when the request must be rejected with 403.
    pub fn verify(&self, mode: &str, token: &str, challenge: &str) -> Option<String> {
        if mode == "subscribe" && token == self.verify_token {
            info!("webhook verification succeeded");
            Some(challenge.to_string())
        } else {
            warn!("webhook verification failed (mode '{mode}')");
            None
        }
    }

    /// Process one event envelope.
    ///
    /// Returns false when the envelope is not a WhatsApp Business Account
    /// event or when every message in it failed; a batch with at least one
    /// forwarded message (or none at all) counts as processed.
    pub async fn process_event(&self, envelope: &Envelope) -> bool {
        if envelope.object != "whatsapp_business_account" {
            warn!("ignoring webhook for object '{}'", envelope.object);
            return false;
        }

        let mut seen = 0usize;
        let mut forwarded = 0usize;

        for entry in &envelope.entry {
            if entry.id != self.business_account_id {
                debug!("skipping entry for foreign business account {}", entry.id);
                continue;
            }
            for change in &entry.changes {
                if change.field != "messages" {
                    debug!("ignoring change field '{}'", change.field);
                    continue;
                }
                for message in &change.value.messages {
                    seen += 1;
                    if self.process_message(message, &change.value.contacts).await {
                        forwarded += 1;
                    }
                }
                for status in &change.value.statuses {
                    self.process_status(status).await;
                }
            }
        }

        forwarded > 0 || seen == 0
    }

    /// Process a hand-fed test envelope: no business-account check, messages
    /// only. Returns true when at least one message was forwarded.
    pub async fn process_test(&self, envelope: &Envelope) -> bool {
        let mut forwarded = false;
        for entry in &envelope.entry {
            for change in &entry.changes {
                for message in &change.value.messages {
                    if self.process_message(message, &change.value.contacts).await {
                        forwarded = true;
                    }
                }
            }
        }
        forwarded
    }

    /// Translate and forward one inbound message. Failures are contained so
    /// sibling messages in the same batch still get processed.
    async fn process_message(&self, message: &WaMessage, contacts: &[WaContact]) -> bool {
        let name = display_name_for(&message.from, contacts);
        let mut channel_message = translate::to_channel_message(message, &name);

        // Exchange the opaque media ID for its signed URL before posting.
        if let Some(media) = channel_message.media.as_mut() {
            match self.whatsapp.media_url(&media.id).await {
                Ok(url) => media.resolved_url = Some(url),
                Err(e) => warn!("media URL resolution failed for {}: {e}", media.id),
            }
        }

        match self.forward(&channel_message).await {
            Ok(bitrix_id) => {
                info!(
                    "forwarded {} into bitrix24 message {bitrix_id}",
                    channel_message.external_id
                );
                // Read receipts are best-effort; a failure never fails the batch.
                if let Err(e) = self.whatsapp.mark_read(&channel_message.external_id).await {
                    debug!("mark-read failed for {}: {e}", channel_message.external_id);
                }
                true
            }
            Err(e) => {
                warn!("failed to forward {}: {e}", channel_message.external_id);
                false
            }
        }
    }

    /// Contact upsert → session upsert → message post.
    async fn forward(&self, message: &ChannelMessage) -> Result<i64, BridgeError> {
        let contact = self
            .bitrix
            .find_or_create_contact(&message.sender.phone, &message.sender.display_name)
            .await?;
        let session_id = self
            .bitrix
            .get_or_create_session(&message.sender.phone, &contact)
            .await?;
        self.bitrix.post_message(session_id, message).await
    }

    /// Forward delivery/read receipts; sent/failed are log-only.
    async fn process_status(&self, status: &WaStatus) {
        let Some(state) = DeliveryState::from_wire(&status.status) else {
            debug!("ignoring unknown status '{}' for {}", status.status, status.id);
            return;
        };

        match state {
            DeliveryState::Delivered | DeliveryState::Read => {
                let update = DeliveryStatus {
                    message_id: status.id.clone(),
                    recipient_id: status.recipient_id.clone(),
                    state,
                    timestamp_unix: status.timestamp.parse().unwrap_or_default(),
                };
                if let Err(e) = self.bitrix.update_delivery_status(&update).await {
                    warn!("status update failed for {}: {e}", status.id);
                }
            }
            DeliveryState::Sent | DeliveryState::Failed => {
                info!("message {} status: {}", status.id, status.status);
            }
        }
    }
}

/// Recover the sender's profile name from the contacts block. First match
/// wins; unmatched senders get an empty name.
fn display_name_for(from: &str, contacts: &[WaContact]) -> String {
    contacts
        .iter()
        .find(|contact| contact.wa_id == from)
        .map(|contact| contact.profile.name.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockBitrix, MockWhatsApp};
    use bridge24_core::message::MessageKind;
    use serde_json::json;

    const ACCOUNT_ID: &str = "102290129340398";
    const VERIFY_TOKEN: &str = "verify-secret";

    fn dispatcher(
        whatsapp: Arc<MockWhatsApp>,
        bitrix: Arc<MockBitrix>,
    ) -> Dispatcher {
        Dispatcher::new(
            whatsapp,
            bitrix,
            VERIFY_TOKEN.to_string(),
            ACCOUNT_ID.to_string(),
        )
    }

    fn text_envelope() -> Envelope {
        serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": ACCOUNT_ID,
                "changes": [{
                    "field": "messages",
                    "value": {
                        "contacts": [{"profile": {"name": "Maria Silva"}, "wa_id": "5511999887766"}],
                        "messages": [{
                            "from": "5511999887766",
                            "id": "wamid.text1",
                            "timestamp": "1712345678",
                            "type": "text",
                            "text": {"body": "Hello, I need help"}
                        }]
                    }
                }]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_verify_accepts_matching_token() {
        let d = dispatcher(Arc::new(MockWhatsApp::new()), Arc::new(MockBitrix::new()));
        assert_eq!(
            d.verify("subscribe", VERIFY_TOKEN, "1158201444"),
            Some("1158201444".to_string())
        );
    }

    #[test]
    fn test_verify_rejects_wrong_token_and_mode() {
        let d = dispatcher(Arc::new(MockWhatsApp::new()), Arc::new(MockBitrix::new()));
        assert_eq!(d.verify("subscribe", "wrong", "c"), None);
        assert_eq!(d.verify("", VERIFY_TOKEN, "c"), None);
        assert_eq!(d.verify("unsubscribe", VERIFY_TOKEN, "c"), None);
    }

    #[tokio::test]
    async fn test_inbound_text_message_end_to_end() {
        let whatsapp = Arc::new(MockWhatsApp::new());
        let bitrix = Arc::new(MockBitrix::new());
        let d = dispatcher(Arc::clone(&whatsapp), Arc::clone(&bitrix));

        assert!(d.process_event(&text_envelope()).await);

        // Contact upserted with the cross-referenced profile name.
        let contacts = bitrix.contact_calls.lock().unwrap();
        assert_eq!(contacts.as_slice(), &[(
            "5511999887766".to_string(),
            "Maria Silva".to_string()
        )]);

        // Session created under the deterministic key.
        let sessions = bitrix.session_calls.lock().unwrap();
        assert_eq!(sessions.as_slice(), &["whatsapp_5511999887766".to_string()]);

        // Message posted with the WhatsApp ID stamped on it.
        let posted = bitrix.posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        let (session_id, message) = &posted[0];
        assert_eq!(*session_id, MockBitrix::SESSION_ID);
        assert_eq!(message.external_id, "wamid.text1");
        assert_eq!(message.kind, MessageKind::Text);
        assert_eq!(message.text, "Hello, I need help");
        assert_eq!(message.timestamp_unix, 1712345678);

        // Marked read after the successful forward.
        let reads = whatsapp.read_marks.lock().unwrap();
        assert_eq!(reads.as_slice(), &["wamid.text1".to_string()]);
    }

    #[tokio::test]
    async fn test_foreign_object_rejected() {
        let bitrix = Arc::new(MockBitrix::new());
        let d = dispatcher(Arc::new(MockWhatsApp::new()), Arc::clone(&bitrix));

        let envelope: Envelope =
            serde_json::from_value(json!({"object": "page", "entry": []})).unwrap();
        assert!(!d.process_event(&envelope).await);
        assert!(bitrix.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_entry_skipped() {
        let bitrix = Arc::new(MockBitrix::new());
        let d = dispatcher(Arc::new(MockWhatsApp::new()), Arc::clone(&bitrix));

        let mut envelope = text_envelope();
        envelope.entry[0].id = "999999999".to_string();
        d.process_event(&envelope).await;
        assert!(bitrix.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_message_field_ignored() {
        let bitrix = Arc::new(MockBitrix::new());
        let d = dispatcher(Arc::new(MockWhatsApp::new()), Arc::clone(&bitrix));

        let envelope: Envelope = serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": ACCOUNT_ID,
                "changes": [{"field": "account_alerts", "value": {}}]
            }]
        }))
        .unwrap();
        assert!(d.process_event(&envelope).await);
        assert!(bitrix.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_media_message_resolves_url() {
        let whatsapp = Arc::new(MockWhatsApp::new());
        whatsapp
            .media_urls
            .lock()
            .unwrap()
            .insert("media-123".to_string(), "https://signed.example/m".to_string());
        let bitrix = Arc::new(MockBitrix::new());
        let d = dispatcher(Arc::clone(&whatsapp), Arc::clone(&bitrix));

        let envelope: Envelope = serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": ACCOUNT_ID,
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messages": [{
                            "from": "5511999887766",
                            "id": "wamid.img1",
                            "timestamp": "1712345678",
                            "type": "image",
                            "image": {"id": "media-123", "caption": "Our storefront"}
                        }]
                    }
                }]
            }]
        }))
        .unwrap();

        assert!(d.process_event(&envelope).await);
        let posted = bitrix.posted.lock().unwrap();
        let media = posted[0].1.media.as_ref().unwrap();
        assert_eq!(media.id, "media-123");
        assert_eq!(media.resolved_url.as_deref(), Some("https://signed.example/m"));
        // No contacts block: the sender gets an empty display name.
        assert_eq!(posted[0].1.sender.display_name, "");
    }

    #[tokio::test]
    async fn test_statuses_routed_by_state() {
        let bitrix = Arc::new(MockBitrix::new());
        let d = dispatcher(Arc::new(MockWhatsApp::new()), Arc::clone(&bitrix));

        let envelope: Envelope = serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": ACCOUNT_ID,
                "changes": [{
                    "field": "messages",
                    "value": {
                        "statuses": [
                            {"id": "wamid.a", "status": "delivered", "timestamp": "1712345680", "recipient_id": "551199"},
                            {"id": "wamid.b", "status": "read", "timestamp": "1712345681", "recipient_id": "551199"},
                            {"id": "wamid.c", "status": "sent", "timestamp": "1712345682", "recipient_id": "551199"},
                            {"id": "wamid.d", "status": "failed", "timestamp": "1712345683", "recipient_id": "551199"}
                        ]
                    }
                }]
            }]
        }))
        .unwrap();

        assert!(d.process_event(&envelope).await, "status-only batch still processed");

        let updates = bitrix.status_updates.lock().unwrap();
        assert_eq!(updates.len(), 2, "only delivered/read are forwarded");
        assert_eq!(updates[0].message_id, "wamid.a");
        assert_eq!(updates[0].state, DeliveryState::Delivered);
        assert_eq!(updates[1].state, DeliveryState::Read);
    }

    #[tokio::test]
    async fn test_mark_read_failure_does_not_fail_batch() {
        let whatsapp = Arc::new(MockWhatsApp::new().failing_mark_read());
        let bitrix = Arc::new(MockBitrix::new());
        let d = dispatcher(whatsapp, Arc::clone(&bitrix));

        assert!(d.process_event(&text_envelope()).await);
        assert_eq!(bitrix.posted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_forward_failure_reported() {
        let whatsapp = Arc::new(MockWhatsApp::new());
        let bitrix = Arc::new(MockBitrix::new().failing_post());
        let d = dispatcher(Arc::clone(&whatsapp), bitrix);

        assert!(!d.process_event(&text_envelope()).await);
        // Never marked read when the forward failed.
        assert!(whatsapp.read_marks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_process_test_skips_account_check() {
        let bitrix = Arc::new(MockBitrix::new());
        let d = dispatcher(Arc::new(MockWhatsApp::new()), Arc::clone(&bitrix));

        let mut envelope = text_envelope();
        envelope.entry[0].id = "some-other-account".to_string();
        assert!(d.process_test(&envelope).await);
        assert_eq!(bitrix.posted.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_display_name_first_match_wins() {
        let contacts: Vec<WaContact> = serde_json::from_value(json!([
            {"wa_id": "111", "profile": {"name": "First"}},
            {"wa_id": "222", "profile": {"name": "Other"}},
            {"wa_id": "111", "profile": {"name": "Second"}}
        ]))
        .unwrap();
        assert_eq!(display_name_for("111", &contacts), "First");
        assert_eq!(display_name_for("333", &contacts), "");
    }
}
