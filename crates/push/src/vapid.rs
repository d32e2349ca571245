//! VAPID application-server keys and `Authorization` headers (RFC 8292).

use crate::{b64url_decode, b64url_encode, PushError, PushResult};
use chrono::{DateTime, Duration, Utc};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::SecretKey;
use rand::rngs::OsRng;
use serde::Serialize;

/// Lifetime of the signed JWT; RFC 8292 caps it at 24 hours.
const TOKEN_LIFETIME_HOURS: i64 = 12;

#[derive(Serialize)]
struct JwtHeader {
    typ: &'static str,
    alg: &'static str,
}

#[derive(Serialize)]
struct VapidClaims<'a> {
    aud: &'a str,
    exp: i64,
    sub: &'a str,
}

/// The server's P-256 key pair used to sign push requests.
#[derive(Clone)]
pub struct VapidKeys {
    secret: SecretKey,
    public_key_b64: String,
}

impl std::fmt::Debug for VapidKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidKeys")
            .field("public_key", &self.public_key_b64)
            .finish_non_exhaustive()
    }
}

impl VapidKeys {
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::random(&mut OsRng))
    }

    /// Loads a key from the base64url-encoded 32-byte private scalar.
    pub fn from_base64_private(encoded: &str) -> PushResult<Self> {
        let bytes = b64url_decode(encoded).ok_or(PushError::InvalidVapidKey)?;
        if bytes.len() != 32 {
            return Err(PushError::InvalidVapidKey);
        }
        let secret = SecretKey::from_slice(&bytes).map_err(|_| PushError::InvalidVapidKey)?;
        Ok(Self::from_secret(secret))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key().to_encoded_point(false);
        Self {
            public_key_b64: b64url_encode(public.as_bytes()),
            secret,
        }
    }

    /// Private scalar, base64url, suitable for `VAPID_PRIVATE_KEY`.
    pub fn private_key_base64(&self) -> String {
        b64url_encode(self.secret.to_bytes().as_slice())
    }

    /// Uncompressed public point, base64url; browsers pass it as `applicationServerKey`.
    pub fn public_key_base64(&self) -> &str {
        &self.public_key_b64
    }

    /// Builds `vapid t=<jwt>, k=<public key>` for a request to `endpoint`.
    pub fn authorization_header(
        &self,
        endpoint: &str,
        subject: &str,
        now: DateTime<Utc>,
    ) -> PushResult<String> {
        let url = reqwest::Url::parse(endpoint)
            .map_err(|_| PushError::InvalidEndpoint(endpoint.to_string()))?;
        let audience = url.origin().ascii_serialization();

        let header = serde_json::to_vec(&JwtHeader {
            typ: "JWT",
            alg: "ES256",
        })?;
        let claims = serde_json::to_vec(&VapidClaims {
            aud: &audience,
            exp: (now + Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp(),
            sub: subject,
        })?;

        let signing_input = format!("{}.{}", b64url_encode(&header), b64url_encode(&claims));
        let signing_key = SigningKey::from(&self.secret);
        let signature: Signature = signing_key.sign(signing_input.as_bytes());
        let jwt = format!(
            "{}.{}",
            signing_input,
            b64url_encode(signature.to_bytes().as_slice())
        );

        Ok(format!("vapid t={}, k={}", jwt, self.public_key_b64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::VerifyingKey;

    fn split_header(header: &str) -> (String, String) {
        let rest = header.strip_prefix("vapid t=").unwrap();
        let (jwt, key) = rest.split_once(", k=").unwrap();
        (jwt.to_string(), key.to_string())
    }

    #[test]
    fn test_private_key_roundtrips_through_base64() {
        let keys = VapidKeys::generate();
        let restored = VapidKeys::from_base64_private(&keys.private_key_base64()).unwrap();
        assert_eq!(restored.public_key_base64(), keys.public_key_base64());
    }

    #[test]
    fn test_rejects_malformed_private_key() {
        assert!(VapidKeys::from_base64_private("not base64!").is_err());
        assert!(VapidKeys::from_base64_private(&b64url_encode(&[1u8; 16])).is_err());
        assert!(VapidKeys::from_base64_private(&b64url_encode(&[0u8; 32])).is_err());
    }

    #[test]
    fn test_authorization_header_is_verifiable() {
        let keys = VapidKeys::generate();
        let now = Utc::now();
        let header = keys
            .authorization_header(
                "https://fcm.googleapis.com/fcm/send/abc123",
                "mailto:ops@clinic.example",
                now,
            )
            .unwrap();

        let (jwt, key) = split_header(&header);
        assert_eq!(key, keys.public_key_base64());

        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);

        let claims: serde_json::Value =
            serde_json::from_slice(&b64url_decode(parts[1]).unwrap()).unwrap();
        assert_eq!(claims["aud"], "https://fcm.googleapis.com");
        assert_eq!(claims["sub"], "mailto:ops@clinic.example");
        assert_eq!(
            claims["exp"].as_i64().unwrap(),
            (now + Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp()
        );

        let verifying_key =
            VerifyingKey::from_sec1_bytes(&b64url_decode(&key).unwrap()).unwrap();
        let signature = Signature::from_slice(&b64url_decode(parts[2]).unwrap()).unwrap();
        let signing_input = format!("{}.{}", parts[0], parts[1]);
        assert!(verifying_key
            .verify(signing_input.as_bytes(), &signature)
            .is_ok());
    }

    #[test]
    fn test_authorization_header_rejects_bad_endpoint() {
        let keys = VapidKeys::generate();
        assert!(matches!(
            keys.authorization_header("not a url", "mailto:a@b.c", Utc::now()),
            Err(PushError::InvalidEndpoint(_))
        ));
    }
}
