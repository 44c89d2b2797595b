//! Translation between WhatsApp payloads and Open Channel messages.
//!
//! Pure functions in both directions. Media URL resolution needs the
//! WhatsApp gateway and is left to the caller; everything here is payload
//! mapping.

use crate::message::{
    ChannelMessage, ContactRef, FileRef, GeoPoint, MediaKind, MediaRef, MessageKind,
};
use crate::webhook::WaMessage;

/// Build the normalized envelope for one inbound message.
///
/// The rendered text follows a fixed per-kind table; media messages carry
/// the opaque media ID for the caller to resolve into a URL.
pub fn to_channel_message(msg: &WaMessage, display_name: &str) -> ChannelMessage {
    let kind = MessageKind::from_wire(&msg.kind);
    let mut media_id = None;
    let mut geo = None;

    let text = match kind {
        MessageKind::Text => msg
            .text
            .as_ref()
            .map(|t| t.body.clone())
            .unwrap_or_default(),
        MessageKind::Image => {
            media_id = msg.image.as_ref().map(|m| m.id.clone());
            caption_of(msg.image.as_ref().and_then(|m| m.caption.as_deref()), "Image")
        }
        MessageKind::Video => {
            media_id = msg.video.as_ref().map(|m| m.id.clone());
            caption_of(msg.video.as_ref().and_then(|m| m.caption.as_deref()), "Video")
        }
        MessageKind::Audio => {
            media_id = msg.audio.as_ref().map(|m| m.id.clone());
            "Audio message".to_string()
        }
        MessageKind::Document => {
            let doc = msg.document.as_ref();
            media_id = doc.map(|m| m.id.clone());
            doc.and_then(|m| m.caption.as_deref().filter(|c| !c.is_empty()))
                .or_else(|| doc.and_then(|m| m.filename.as_deref().filter(|f| !f.is_empty())))
                .unwrap_or("Document")
                .to_string()
        }
        MessageKind::Location => {
            let (lat, lon) = msg
                .location
                .as_ref()
                .map(|l| (l.latitude, l.longitude))
                .unwrap_or_default();
            geo = Some(GeoPoint { lat, lon });
            format!("Location: {}, {}", fmt_coord(lat), fmt_coord(lon))
        }
        MessageKind::Contacts => {
            let count = msg.contacts.as_ref().map(Vec::len).unwrap_or(0);
            format!(
                "Shared {count} contact{}",
                if count > 1 { "s" } else { "" }
            )
        }
        MessageKind::Unsupported => format!("Unsupported message type: {}", msg.kind),
    };

    ChannelMessage {
        external_id: msg.id.clone(),
        sender: ContactRef {
            phone: msg.from.clone(),
            display_name: display_name.to_string(),
        },
        timestamp_unix: msg.timestamp.parse().unwrap_or_default(),
        kind,
        raw_kind: msg.kind.clone(),
        text,
        media: media_id
            .filter(|id| !id.is_empty())
            .map(|id| MediaRef {
                id,
                resolved_url: None,
            }),
        geo,
    }
}

fn caption_of(caption: Option<&str>, fallback: &str) -> String {
    match caption {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => fallback.to_string(),
    }
}

/// Format a coordinate, keeping one decimal on integral values so the
/// rendered pair still reads as a coordinate (`-74.0`, not `-74`).
fn fmt_coord(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Send plan for one Bitrix24 message relayed to WhatsApp.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPlan {
    Text { body: String },
    Media {
        kind: MediaKind,
        url: String,
        caption: String,
    },
}

/// Decide how a Bitrix24 message goes out.
///
/// WhatsApp carries a single media item per message, so only the first
/// attached file is sent; the message body rides along as its caption.
pub fn outbound_plan(body: &str, files: &[FileRef]) -> OutboundPlan {
    match files.first() {
        None => OutboundPlan::Text {
            body: body.to_string(),
        },
        Some(file) => OutboundPlan::Media {
            kind: media_kind_from_name(&file.name),
            url: file.url.clone(),
            caption: body.to_string(),
        },
    }
}

/// Infer the WhatsApp media kind from a filename extension.
/// Case-insensitive; unknown or missing extensions fall back to document.
pub fn media_kind_from_name(name: &str) -> MediaKind {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" | "png" | "gif" => MediaKind::Image,
        "mp4" | "mov" | "avi" => MediaKind::Video,
        "mp3" | "wav" | "ogg" => MediaKind::Audio,
        _ => MediaKind::Document,
    }
}
