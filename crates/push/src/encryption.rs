//! `aes128gcm` message encryption for Web Push (RFC 8291 / RFC 8188).
//!
//! A fresh ephemeral P-256 key and 16-byte salt are generated per message. The
//! body is a single record:
//!
//! ```text
//! salt (16) | rs (u32 BE) | idlen (1) = 65 | sender public key (65) | ciphertext
//! ```

use crate::{b64url_decode, PushError, PushResult};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce};
use hkdf::Hkdf;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

/// Record size advertised in the header.
pub const RECORD_SIZE: u32 = 4096;

/// Largest plaintext accepted; push services cap the whole body at 4096 bytes.
pub const MAX_PAYLOAD_BYTES: usize = 3993;

const SALT_LEN: usize = 16;
const PUBLIC_KEY_LEN: usize = 65;
const AUTH_SECRET_LEN: usize = 16;
const LAST_RECORD_DELIMITER: u8 = 0x02;

/// Decoded `keys` object of a browser `PushSubscription`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionKeys {
    p256dh: [u8; PUBLIC_KEY_LEN],
    auth: [u8; AUTH_SECRET_LEN],
}

impl SubscriptionKeys {
    /// Parses the base64url `p256dh` and `auth` strings from the subscription JSON.
    pub fn from_base64(p256dh: &str, auth: &str) -> PushResult<Self> {
        let p256dh: [u8; PUBLIC_KEY_LEN] = b64url_decode(p256dh)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(PushError::InvalidSubscriptionKey("p256dh"))?;
        if p256dh[0] != 0x04 || PublicKey::from_sec1_bytes(&p256dh).is_err() {
            return Err(PushError::InvalidSubscriptionKey("p256dh"));
        }
        let auth: [u8; AUTH_SECRET_LEN] = b64url_decode(auth)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(PushError::InvalidSubscriptionKey("auth"))?;
        Ok(Self { p256dh, auth })
    }
}

/// Encrypts `payload` for the subscription owning `keys`.
///
/// # Errors
///
/// Returns [`PushError::PayloadTooLarge`] above [`MAX_PAYLOAD_BYTES`] and
/// [`PushError::Encryption`] if key derivation or sealing fails.
pub fn encrypt(payload: &[u8], keys: &SubscriptionKeys) -> PushResult<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(PushError::PayloadTooLarge(payload.len()));
    }

    let ua_public = PublicKey::from_sec1_bytes(&keys.p256dh)
        .map_err(|_| PushError::InvalidSubscriptionKey("p256dh"))?;

    let as_secret = EphemeralSecret::random(&mut OsRng);
    let as_public = as_secret.public_key().to_encoded_point(false);
    let shared = as_secret.diffie_hellman(&ua_public);

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let (cek, nonce) = derive_content_keys(
        shared.raw_secret_bytes().as_slice(),
        &keys.auth,
        &keys.p256dh,
        as_public.as_bytes(),
        &salt,
    )?;

    let mut plaintext = Vec::with_capacity(payload.len() + 1);
    plaintext.extend_from_slice(payload);
    plaintext.push(LAST_RECORD_DELIMITER);

    let cipher = Aes128Gcm::new_from_slice(&cek).map_err(|_| PushError::Encryption)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|_| PushError::Encryption)?;

    let mut body = Vec::with_capacity(SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(PUBLIC_KEY_LEN as u8);
    body.extend_from_slice(as_public.as_bytes());
    body.extend_from_slice(&ciphertext);
    Ok(body)
}

/// Derives the content encryption key and nonce shared by both sides.
fn derive_content_keys(
    ecdh_secret: &[u8],
    auth_secret: &[u8],
    ua_public: &[u8],
    as_public: &[u8],
    salt: &[u8],
) -> PushResult<([u8; 16], [u8; 12])> {
    let mut key_info = Vec::with_capacity(14 + ua_public.len() + as_public.len());
    key_info.extend_from_slice(b"WebPush: info\0");
    key_info.extend_from_slice(ua_public);
    key_info.extend_from_slice(as_public);

    let mut ikm = [0u8; 32];
    Hkdf::<Sha256>::new(Some(auth_secret), ecdh_secret)
        .expand(&key_info, &mut ikm)
        .map_err(|_| PushError::Encryption)?;

    let content = Hkdf::<Sha256>::new(Some(salt), &ikm);
    let mut cek = [0u8; 16];
    content
        .expand(b"Content-Encoding: aes128gcm\0", &mut cek)
        .map_err(|_| PushError::Encryption)?;
    let mut nonce = [0u8; 12];
    content
        .expand(b"Content-Encoding: nonce\0", &mut nonce)
        .map_err(|_| PushError::Encryption)?;

    Ok((cek, nonce))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::b64url_encode;
    use p256::SecretKey;

    struct Browser {
        secret: SecretKey,
        keys: SubscriptionKeys,
    }

    fn browser() -> Browser {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key().to_encoded_point(false);
        let mut auth = [0u8; AUTH_SECRET_LEN];
        OsRng.fill_bytes(&mut auth);
        let keys =
            SubscriptionKeys::from_base64(&b64url_encode(public.as_bytes()), &b64url_encode(&auth))
                .unwrap();
        Browser { secret, keys }
    }

    /// Receiver side of the scheme, as a browser would run it.
    fn decrypt(body: &[u8], browser: &Browser) -> Vec<u8> {
        let salt = &body[..SALT_LEN];
        let rs = u32::from_be_bytes(body[16..20].try_into().unwrap());
        assert_eq!(rs, RECORD_SIZE);
        let idlen = body[20] as usize;
        assert_eq!(idlen, PUBLIC_KEY_LEN);
        let as_public_bytes = &body[21..21 + idlen];
        let ciphertext = &body[21 + idlen..];

        let as_public = PublicKey::from_sec1_bytes(as_public_bytes).unwrap();
        let shared = p256::ecdh::diffie_hellman(
            browser.secret.to_nonzero_scalar(),
            as_public.as_affine(),
        );
        let (cek, nonce) = derive_content_keys(
            shared.raw_secret_bytes().as_slice(),
            &browser.keys.auth,
            &browser.keys.p256dh,
            as_public_bytes,
            salt,
        )
        .unwrap();

        let cipher = Aes128Gcm::new_from_slice(&cek).unwrap();
        let mut plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext)
            .unwrap();
        assert_eq!(plaintext.pop(), Some(LAST_RECORD_DELIMITER));
        plaintext
    }

    #[test]
    fn test_browser_can_decrypt_payload() {
        let browser = browser();
        let payload = br#"{"title":"Treatment approved","body":"Tooth 36 filling"}"#;

        let body = encrypt(payload, &browser.keys).unwrap();

        assert_eq!(decrypt(&body, &browser), payload);
    }

    #[test]
    fn test_each_message_uses_fresh_salt_and_key() {
        let browser = browser();
        let first = encrypt(b"same", &browser.keys).unwrap();
        let second = encrypt(b"same", &browser.keys).unwrap();
        assert_ne!(first[..86], second[..86]);
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let browser = browser();
        let payload = vec![b'x'; MAX_PAYLOAD_BYTES + 1];
        assert!(matches!(
            encrypt(&payload, &browser.keys),
            Err(PushError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn test_subscription_keys_reject_bad_lengths() {
        let auth = b64url_encode(&[7u8; 16]);
        assert!(matches!(
            SubscriptionKeys::from_base64(&b64url_encode(&[4u8; 10]), &auth),
            Err(PushError::InvalidSubscriptionKey("p256dh"))
        ));

        let browser = browser();
        let p256dh = b64url_encode(&browser.keys.p256dh);
        assert!(matches!(
            SubscriptionKeys::from_base64(&p256dh, &b64url_encode(&[1u8; 8])),
            Err(PushError::InvalidSubscriptionKey("auth"))
        ));
    }

    #[test]
    fn test_subscription_keys_accept_padded_base64() {
        let browser = browser();
        let p256dh = format!("{}=", b64url_encode(&browser.keys.p256dh));
        let auth = format!("{}==", b64url_encode(&browser.keys.auth));
        assert_eq!(
            SubscriptionKeys::from_base64(&p256dh, &auth).unwrap(),
            browser.keys
        );
    }
}
