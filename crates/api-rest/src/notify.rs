//! Push delivery to every subscription of a principal.

use clinic_core::Role;
use clinic_push::{DeliveryOutcome, PushPayload, Subscription};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Counts of how each subscription answered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Subscriptions the push service reported gone; they have been deleted.
    pub removed: usize,
    pub failed: usize,
}

impl DeliveryReport {
    fn record(&mut self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered => self.delivered += 1,
            DeliveryOutcome::Gone => self.removed += 1,
            DeliveryOutcome::Rejected(_) => self.failed += 1,
        }
    }
}

/// Sends `payload` to every subscription of the owner, pruning gone ones.
///
/// # Errors
/// [`ApiError::PushDisabled`] when no VAPID key is configured, or a database error while
/// loading subscriptions. Individual delivery failures are counted, not returned.
pub async fn deliver(
    state: &AppState,
    role: Role,
    owner_id: Uuid,
    payload: &PushPayload,
) -> ApiResult<DeliveryReport> {
    if !state.push.is_enabled() {
        return Err(ApiError::PushDisabled);
    }
    let mut report = DeliveryReport::default();
    for stored in state.subscriptions.for_owner(role, owner_id).await? {
        let subscription = Subscription {
            endpoint: stored.endpoint.clone(),
            p256dh: stored.p256dh.clone(),
            auth: stored.auth.clone(),
        };
        match state.push.send(&subscription, payload).await {
            Ok(outcome) => {
                report.record(&outcome);
                match outcome {
                    DeliveryOutcome::Gone => {
                        tracing::debug!("pruning expired push subscription {}", stored.id);
                        state.subscriptions.prune(stored.id).await?;
                    }
                    DeliveryOutcome::Rejected(status) => {
                        tracing::warn!("push to subscription {} rejected with {status}", stored.id);
                    }
                    DeliveryOutcome::Delivered => {}
                }
            }
            Err(err) => {
                tracing::warn!("push to subscription {} failed: {err}", stored.id);
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

/// Notifies a patient in the background. Never fails the calling request.
pub fn notify_patient(state: &AppState, patient_id: Uuid, payload: PushPayload) {
    if !state.push.is_enabled() {
        tracing::debug!("push disabled; skipping notification for patient {patient_id}");
        return;
    }
    let state = state.clone();
    tokio::spawn(async move {
        match deliver(&state, Role::Patient, patient_id, &payload).await {
            Ok(report) => tracing::debug!(
                "notified patient {patient_id}: {} delivered, {} removed, {} failed",
                report.delivered,
                report.removed,
                report.failed
            ),
            Err(err) => tracing::warn!("notification for patient {patient_id} failed: {err}"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts_outcomes() {
        let mut report = DeliveryReport::default();
        for outcome in [
            DeliveryOutcome::Delivered,
            DeliveryOutcome::Gone,
            DeliveryOutcome::Rejected(500),
            DeliveryOutcome::Delivered,
        ] {
            report.record(&outcome);
        }
        assert_eq!(
            report,
            DeliveryReport {
                delivered: 2,
                removed: 1,
                failed: 1
            }
        );
    }
}
