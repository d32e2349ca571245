//! Principals and bearer tokens.
//!
//! Tokens are compact HS256 JWTs signed with the single configured secret. Every
//! role shares the same secret and the same claim layout; the `role` claim decides
//! which API surface a token may call.

use crate::{ClinicError, ClinicResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Who a token (or a timeline actor) is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Doctor,
    Patient,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Patient => "patient",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ClinicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "patient" => Ok(Role::Patient),
            other => Err(ClinicError::invalid("role", other)),
        }
    }
}

/// Token claims.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub clinic_id: Uuid,
    pub clinic_code: String,
    pub iat: i64,
    pub exp: i64,
}

/// The authenticated caller, derived from verified claims.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
    pub clinic_id: Uuid,
    pub clinic_code: String,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_doctor(&self) -> bool {
        self.role == Role::Doctor
    }
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            role: claims.role,
            clinic_id: claims.clinic_id,
            clinic_code: claims.clinic_code,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct JwtHeader {
    alg: String,
    typ: String,
}

/// Issues and verifies bearer tokens. Cheap to clone.
#[derive(Clone)]
pub struct TokenService {
    secret: Arc<[u8]>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl_hours", &self.ttl.num_hours())
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            secret: Arc::from(secret),
            ttl,
        }
    }

    pub fn from_config(cfg: &crate::ClinicConfig) -> Self {
        Self::new(cfg.jwt_secret(), cfg.token_ttl())
    }

    /// Issues a token for `principal`, valid from `now` for the configured lifetime.
    pub fn issue(&self, principal: &Principal, now: DateTime<Utc>) -> ClinicResult<String> {
        let claims = Claims {
            sub: principal.id,
            role: principal.role,
            clinic_id: principal.clinic_id,
            clinic_code: principal.clinic_code.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        self.sign(&claims)
    }

    pub fn sign(&self, claims: &Claims) -> ClinicResult<String> {
        let header = JwtHeader {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let message = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac()?;
        mac.update(message.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{message}.{signature}"))
    }

    /// Verifies signature, algorithm and expiry, returning the claims.
    ///
    /// # Errors
    ///
    /// Returns [`ClinicError::InvalidToken`] naming the first check that failed.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> ClinicResult<Claims> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ClinicError::InvalidToken("format"));
        };

        let header: JwtHeader = URL_SAFE_NO_PAD
            .decode(header_b64)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or(ClinicError::InvalidToken("header"))?;
        if header.alg != "HS256" {
            return Err(ClinicError::InvalidToken("algorithm"));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| ClinicError::InvalidToken("signature"))?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| ClinicError::InvalidToken("signature"))?;

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or(ClinicError::InvalidToken("claims"))?;

        if claims.exp <= now.timestamp() {
            return Err(ClinicError::InvalidToken("expired"));
        }

        Ok(claims)
    }

    fn mac(&self) -> ClinicResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ClinicError::TokenSigning(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(b"0123456789abcdef0123456789abcdef", Duration::hours(12))
    }

    fn principal(role: Role) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            role,
            clinic_id: Uuid::new_v4(),
            clinic_code: "smile-dental".into(),
        }
    }

    #[test]
    fn test_issue_then_verify_returns_claims() {
        let tokens = service();
        let doctor = principal(Role::Doctor);
        let now = Utc::now();

        let token = tokens.issue(&doctor, now).unwrap();
        let claims = tokens.verify(&token, now).unwrap();

        assert_eq!(Principal::from(claims.clone()), doctor);
        assert_eq!(claims.exp - claims.iat, 12 * 3600);
    }

    #[test]
    fn test_claims_use_camel_case_on_the_wire() {
        let tokens = service();
        let token = tokens.issue(&principal(Role::Admin), Utc::now()).unwrap();
        let payload = token.split('.').nth(1).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert_eq!(json["role"], "admin");
        assert_eq!(json["clinicCode"], "smile-dental");
        assert!(json.get("clinicId").is_some());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let tokens = service();
        let issued = Utc::now() - Duration::hours(13);
        let token = tokens.issue(&principal(Role::Patient), issued).unwrap();
        assert!(matches!(
            tokens.verify(&token, Utc::now()),
            Err(ClinicError::InvalidToken("expired"))
        ));
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let other = TokenService::new(b"another-secret-another-secret-xx", Duration::hours(1));
        let token = other.issue(&principal(Role::Admin), Utc::now()).unwrap();
        assert!(matches!(
            service().verify(&token, Utc::now()),
            Err(ClinicError::InvalidToken("signature"))
        ));
    }

    #[test]
    fn test_tampered_role_is_rejected() {
        let tokens = service();
        let token = tokens.issue(&principal(Role::Patient), Utc::now()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let mut claims: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        claims["role"] = "admin".into();
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap()),
            parts[2]
        );
        assert!(matches!(
            tokens.verify(&forged, Utc::now()),
            Err(ClinicError::InvalidToken("signature"))
        ));
    }

    #[test]
    fn test_malformed_tokens_are_rejected() {
        let tokens = service();
        for bad in ["", "abc", "a.b", "a.b.c.d", "!!.??.**"] {
            assert!(tokens.verify(bad, Utc::now()).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_alg_none_is_rejected() {
        let tokens = service();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let valid = tokens.issue(&principal(Role::Admin), Utc::now()).unwrap();
        let parts: Vec<&str> = valid.split('.').collect();
        let forged = format!("{}.{}.{}", header, parts[1], parts[2]);
        assert!(matches!(
            tokens.verify(&forged, Utc::now()),
            Err(ClinicError::InvalidToken("algorithm"))
        ));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("doctor".parse::<Role>().unwrap(), Role::Doctor);
        assert!("root".parse::<Role>().is_err());
    }
}
