//! Poll cycle relaying agent replies from Bitrix24 back to WhatsApp.

use bridge24_core::{
    error::BridgeError,
    message::RelayedMessage,
    session::{is_whatsapp_session, phone_from_user_code},
    traits::{BitrixGateway, WhatsAppGateway},
    translate::{self, OutboundPlan},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One-shot Bitrix24 → WhatsApp relay cycle.
///
/// Cycles are driven by an external scheduler and must not overlap: two
/// concurrent cycles can both pick up the same un-relayed message and
/// double-send it.
pub struct RelayCoordinator {
    whatsapp: Arc<dyn WhatsAppGateway>,
    bitrix: Arc<dyn BitrixGateway>,
    message_limit: u32,
}

impl RelayCoordinator {
    pub fn new(
        whatsapp: Arc<dyn WhatsAppGateway>,
        bitrix: Arc<dyn BitrixGateway>,
        message_limit: u32,
    ) -> Self {
        Self {
            whatsapp,
            bitrix,
            message_limit,
        }
    }

    /// Run one poll cycle. Returns the number of messages relayed.
    ///
    /// A failing session is skipped, not fatal; only a failure to enumerate
    /// sessions aborts the cycle.
    pub async fn run_cycle(&self) -> Result<u32, BridgeError> {
        let sessions = self.bitrix.active_sessions().await?;
        let mut relayed = 0u32;

        for session in &sessions {
            if !is_whatsapp_session(&session.user_code) {
                debug!("session {} is not WhatsApp-origin, skipping", session.id);
                continue;
            }
            let phone = phone_from_user_code(&session.user_code);
            if phone.is_empty() {
                warn!("session {} has a malformed user code, skipping", session.id);
                continue;
            }

            let messages = match self
                .bitrix
                .recent_messages(session.id, self.message_limit)
                .await
            {
                Ok(messages) => messages,
                Err(e) => {
                    warn!("failed to read session {}: {e}", session.id);
                    continue;
                }
            };

            for message in filter_new_agent_messages(&messages) {
                match self.relay_message(&phone, message).await {
                    Ok(()) => relayed += 1,
                    Err(e) => warn!("relay of message {} failed: {e}", message.id),
                }
            }
        }

        info!("relay cycle complete: {relayed} message(s) sent");
        Ok(relayed)
    }

    /// Send one agent message to WhatsApp and flag it as relayed.
    async fn relay_message(
        &self,
        phone: &str,
        message: &RelayedMessage,
    ) -> Result<(), BridgeError> {
        match translate::outbound_plan(&message.body, &message.files) {
            OutboundPlan::Text { body } => {
                self.whatsapp.send_text(phone, &body).await?;
            }
            OutboundPlan::Media { kind, url, caption } => {
                self.whatsapp.send_media(phone, kind, &url, &caption).await?;
            }
        }

        // The send went through; a failure to flag it only risks a duplicate
        // on the next cycle, so it does not undo the relay.
        if let Err(e) = self.bitrix.mark_relayed(message.id).await {
            warn!("failed to flag message {} as relayed: {e}", message.id);
        }
        Ok(())
    }
}

/// Agent replies that still need delivery: human author (positive ID) and
/// not yet flagged as relayed. Input order is preserved.
pub fn filter_new_agent_messages(messages: &[RelayedMessage]) -> Vec<&RelayedMessage> {
    messages
        .iter()
        .filter(|message| message.author_id > 0 && !message.already_relayed)
        .collect()
}
