//! # Clinic Push
//!
//! Web Push delivery for clinic notifications.
//!
//! Handles:
//! - Payload encryption for a browser subscription (`aes128gcm`, RFC 8291)
//! - VAPID application-server identification (ES256 JWT, RFC 8292)
//! - HTTP delivery to the push service and classification of the response
//!
//! No database concerns: the caller loads subscriptions and prunes the ones
//! reported as [`DeliveryOutcome::Gone`].

#![warn(rust_2018_idioms)]

mod encryption;
mod service;
mod vapid;

pub use encryption::{encrypt, SubscriptionKeys, MAX_PAYLOAD_BYTES, RECORD_SIZE};
pub use service::{DeliveryOutcome, PushPayload, PushService, Subscription};
pub use vapid::VapidKeys;

/// Errors raised while preparing or delivering a push message.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push delivery is not configured")]
    Disabled,
    #[error("invalid subscription key: {0}")]
    InvalidSubscriptionKey(&'static str),
    #[error("invalid push endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("payload of {0} bytes exceeds the single-record limit")]
    PayloadTooLarge(usize),
    #[error("payload encryption failed")]
    Encryption,
    #[error("invalid VAPID key")]
    InvalidVapidKey,
    #[error("failed to serialize push payload: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("push request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type PushResult<T> = std::result::Result<T, PushError>;

pub(crate) fn b64url_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Decodes base64url, tolerating the `=` padding some browsers emit.
pub(crate) fn b64url_decode(input: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(input.trim().trim_end_matches('='))
        .ok()
}
