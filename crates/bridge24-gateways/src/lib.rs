//! # bridge24-gateways
//!
//! Thin HTTP clients for the two upstream platforms: the Meta WhatsApp
//! Business (Cloud) API and the Bitrix24 REST webhook surface. Both are
//! stateless request/response clients implementing the capability traits
//! from `bridge24-core`.

pub mod bitrix;
pub mod whatsapp;
