use crate::{encrypt, PushError, PushResult, SubscriptionKeys, VapidKeys};
use chrono::Utc;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// How long the push service should hold an undelivered message, in seconds.
const DEFAULT_TTL_SECONDS: u32 = 86_400;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Notification content as read by the service worker.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A stored browser subscription.
#[derive(Clone, Debug)]
pub struct Subscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

/// How the push service answered a delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The subscription expired or was revoked; it should be deleted.
    Gone,
    /// Any other non-success status.
    Rejected(u16),
}

impl DeliveryOutcome {
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            s if s.is_success() => Self::Delivered,
            StatusCode::NOT_FOUND | StatusCode::GONE => Self::Gone,
            s => Self::Rejected(s.as_u16()),
        }
    }
}

/// Sends encrypted notifications. Cheap to clone.
#[derive(Clone, Debug)]
pub struct PushService {
    client: reqwest::Client,
    vapid: Option<Arc<VapidKeys>>,
    subject: Arc<str>,
    ttl_seconds: u32,
}

impl PushService {
    pub fn new(vapid: Option<VapidKeys>, subject: impl Into<String>) -> PushResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            vapid: vapid.map(Arc::new),
            subject: Arc::from(subject.into()),
            ttl_seconds: DEFAULT_TTL_SECONDS,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.vapid.is_some()
    }

    pub fn public_key(&self) -> Option<&str> {
        self.vapid.as_deref().map(VapidKeys::public_key_base64)
    }

    /// Checks that `endpoint` is an absolute `https` URL.
    pub fn validate_endpoint(endpoint: &str) -> PushResult<()> {
        let url = reqwest::Url::parse(endpoint)
            .map_err(|_| PushError::InvalidEndpoint(endpoint.to_string()))?;
        if url.scheme() != "https" || url.host_str().is_none() {
            return Err(PushError::InvalidEndpoint(endpoint.to_string()));
        }
        Ok(())
    }

    /// Encrypts `payload` for `subscription` and posts it to the push service.
    ///
    /// # Errors
    ///
    /// Returns `PushError` if:
    /// - push is not configured,
    /// - the endpoint or subscription keys are invalid,
    /// - the payload is too large or encryption fails,
    /// - the HTTP request itself fails (connection, timeout).
    ///
    /// A non-success HTTP status is not an error; it is reported through
    /// [`DeliveryOutcome`].
    pub async fn send(
        &self,
        subscription: &Subscription,
        payload: &PushPayload,
    ) -> PushResult<DeliveryOutcome> {
        let vapid = self.vapid.as_deref().ok_or(PushError::Disabled)?;
        Self::validate_endpoint(&subscription.endpoint)?;

        let keys = SubscriptionKeys::from_base64(&subscription.p256dh, &subscription.auth)?;
        let body = encrypt(&serde_json::to_vec(payload)?, &keys)?;
        let authorization =
            vapid.authorization_header(&subscription.endpoint, &self.subject, Utc::now())?;

        let response = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", self.ttl_seconds.to_string())
            .header("Content-Encoding", "aes128gcm")
            .header("Content-Type", "application/octet-stream")
            .header("Authorization", authorization)
            .body(body)
            .send()
            .await?;

        let outcome = DeliveryOutcome::from_status(response.status());
        if let DeliveryOutcome::Rejected(status) = outcome {
            tracing::warn!(status, endpoint = %subscription.endpoint, "push service rejected message");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_outcome_classification() {
        assert_eq!(
            DeliveryOutcome::from_status(StatusCode::CREATED),
            DeliveryOutcome::Delivered
        );
        assert_eq!(
            DeliveryOutcome::from_status(StatusCode::GONE),
            DeliveryOutcome::Gone
        );
        assert_eq!(
            DeliveryOutcome::from_status(StatusCode::NOT_FOUND),
            DeliveryOutcome::Gone
        );
        assert_eq!(
            DeliveryOutcome::from_status(StatusCode::TOO_MANY_REQUESTS),
            DeliveryOutcome::Rejected(429)
        );
    }

    #[test]
    fn test_validate_endpoint_requires_https() {
        assert!(PushService::validate_endpoint("https://updates.push.services.mozilla.com/wpush/v2/x").is_ok());
        assert!(PushService::validate_endpoint("http://push.example/x").is_err());
        assert!(PushService::validate_endpoint("file:///etc/passwd").is_err());
        assert!(PushService::validate_endpoint("garbage").is_err());
    }

    #[test]
    fn test_disabled_service_has_no_public_key() {
        let service = PushService::new(None, "mailto:ops@clinic.example").unwrap();
        assert!(!service.is_enabled());
        assert!(service.public_key().is_none());
    }

    #[test]
    fn test_payload_omits_missing_url() {
        let payload = PushPayload {
            title: "Reminder".into(),
            body: "Check-up tomorrow".into(),
            url: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("url").is_none());
    }
}
