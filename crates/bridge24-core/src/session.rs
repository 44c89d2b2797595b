//! Session identity for Open Channel chats.
//!
//! A WhatsApp conversation maps to exactly one Bitrix24 session through a
//! user code derived from the phone number alone: the same number always
//! produces the same code, so repeated lookups converge on one session.

/// Prefix marking an Open Channel user code as WhatsApp-origin.
pub const SESSION_PREFIX: &str = "whatsapp_";

/// Deterministic per-contact session identity (`whatsapp_<digits>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey(String);

impl SessionKey {
    /// Derive the key from a phone number. Punctuation and spacing are
    /// stripped, so every spelling of the same number yields the same key.
    pub fn from_phone(phone: &str) -> Self {
        Self(format!("{SESSION_PREFIX}{}", digits_only(phone)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip everything but ASCII digits.
pub fn digits_only(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

/// Whether an Open Channel user code belongs to this relay.
pub fn is_whatsapp_session(user_code: &str) -> bool {
    user_code.starts_with(SESSION_PREFIX)
}

/// Extract the phone number from a user code.
///
/// Malformed codes yield an empty string rather than an error; callers skip
/// those sessions.
pub fn phone_from_user_code(user_code: &str) -> String {
    user_code.split('_').nth(1).unwrap_or_default().to_string()
}
