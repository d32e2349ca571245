//! Treatment item lifecycle and treatment group status derivation.

use crate::ClinicError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a single planned procedure.
///
/// Forward order is `draft → proposed → approved → planned → done`; `cancelled` is
/// reachable from any non-terminal status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentStatus {
    Draft,
    Proposed,
    Approved,
    Planned,
    Done,
    Cancelled,
}

impl TreatmentStatus {
    pub const ALL: [TreatmentStatus; 6] = [
        TreatmentStatus::Draft,
        TreatmentStatus::Proposed,
        TreatmentStatus::Approved,
        TreatmentStatus::Planned,
        TreatmentStatus::Done,
        TreatmentStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TreatmentStatus::Draft => "draft",
            TreatmentStatus::Proposed => "proposed",
            TreatmentStatus::Approved => "approved",
            TreatmentStatus::Planned => "planned",
            TreatmentStatus::Done => "done",
            TreatmentStatus::Cancelled => "cancelled",
        }
    }

    /// Position on the forward path; `None` for `cancelled`.
    fn rank(self) -> Option<u8> {
        match self {
            TreatmentStatus::Draft => Some(0),
            TreatmentStatus::Proposed => Some(1),
            TreatmentStatus::Approved => Some(2),
            TreatmentStatus::Planned => Some(3),
            TreatmentStatus::Done => Some(4),
            TreatmentStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TreatmentStatus::Done | TreatmentStatus::Cancelled)
    }

    /// Whether an item may move from `self` to `next`. Same-status moves are allowed.
    pub fn can_transition_to(self, next: TreatmentStatus) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(from), Some(to)) => to > from,
            (None, Some(_)) => false,
        }
    }

    /// Validates a move, returning the error the API reports on rejection.
    pub fn transition_to(self, next: TreatmentStatus) -> Result<TreatmentStatus, ClinicError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ClinicError::InvalidStatusTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Statuses that trigger a push notification to the patient.
    pub fn notifies_patient(self) -> bool {
        matches!(
            self,
            TreatmentStatus::Approved | TreatmentStatus::Planned | TreatmentStatus::Done
        )
    }
}

impl fmt::Display for TreatmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TreatmentStatus {
    type Err = ClinicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TreatmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ClinicError::invalid("status", s))
    }
}

/// Status of a treatment group, stored or derived from its items.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

impl GroupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupStatus::Planned => "planned",
            GroupStatus::InProgress => "in_progress",
            GroupStatus::Completed => "completed",
            GroupStatus::Cancelled => "cancelled",
        }
    }

    /// Derives the status reported to clients from the stored status and the
    /// statuses of the group's items.
    pub fn derive(stored: GroupStatus, items: &[TreatmentStatus]) -> GroupStatus {
        if stored == GroupStatus::Cancelled {
            return GroupStatus::Cancelled;
        }
        if items.is_empty() {
            return stored;
        }

        let active: Vec<TreatmentStatus> = items
            .iter()
            .copied()
            .filter(|s| *s != TreatmentStatus::Cancelled)
            .collect();
        if active.is_empty() {
            return GroupStatus::Cancelled;
        }
        if active.iter().all(|s| *s == TreatmentStatus::Done) {
            return GroupStatus::Completed;
        }
        if active.contains(&TreatmentStatus::Done) {
            return GroupStatus::InProgress;
        }
        let scheduled = active
            .iter()
            .any(|s| matches!(s, TreatmentStatus::Planned | TreatmentStatus::Approved));
        if scheduled && stored == GroupStatus::InProgress {
            return GroupStatus::InProgress;
        }
        stored
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupStatus {
    type Err = ClinicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(GroupStatus::Planned),
            "in_progress" => Ok(GroupStatus::InProgress),
            "completed" => Ok(GroupStatus::Completed),
            "cancelled" => Ok(GroupStatus::Cancelled),
            other => Err(ClinicError::invalid("status", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TreatmentStatus::*;

    #[test]
    fn test_forward_moves_may_skip() {
        assert!(Draft.can_transition_to(Proposed));
        assert!(Draft.can_transition_to(Done));
        assert!(Approved.can_transition_to(Planned));
        assert!(Planned.can_transition_to(Done));
    }

    #[test]
    fn test_backward_moves_are_rejected() {
        assert!(!Planned.can_transition_to(Draft));
        assert!(!Approved.can_transition_to(Proposed));
        assert!(matches!(
            Planned.transition_to(Proposed),
            Err(ClinicError::InvalidStatusTransition { from: Planned, to: Proposed })
        ));
    }

    #[test]
    fn test_terminal_statuses() {
        for next in TreatmentStatus::ALL {
            if next != Done {
                assert!(!Done.can_transition_to(next), "done -> {next}");
            }
            if next != Cancelled {
                assert!(!Cancelled.can_transition_to(next), "cancelled -> {next}");
            }
        }
    }

    #[test]
    fn test_cancel_from_any_open_status() {
        for from in [Draft, Proposed, Approved, Planned] {
            assert!(from.can_transition_to(Cancelled));
        }
    }

    #[test]
    fn test_same_status_is_noop() {
        for status in TreatmentStatus::ALL {
            assert_eq!(status.transition_to(status).unwrap(), status);
        }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("approved".parse::<TreatmentStatus>().unwrap(), Approved);
        assert!("finished".parse::<TreatmentStatus>().is_err());
        assert_eq!("in_progress".parse::<GroupStatus>().unwrap(), GroupStatus::InProgress);
        assert_eq!(
            serde_json::to_string(&GroupStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
    }

    #[test]
    fn test_derive_cancelled_stored_wins() {
        assert_eq!(
            GroupStatus::derive(GroupStatus::Cancelled, &[Done, Done]),
            GroupStatus::Cancelled
        );
    }

    #[test]
    fn test_derive_without_items_keeps_stored() {
        assert_eq!(
            GroupStatus::derive(GroupStatus::InProgress, &[]),
            GroupStatus::InProgress
        );
    }

    #[test]
    fn test_derive_all_items_cancelled() {
        assert_eq!(
            GroupStatus::derive(GroupStatus::Planned, &[Cancelled, Cancelled]),
            GroupStatus::Cancelled
        );
    }

    #[test]
    fn test_derive_completed_ignores_cancelled_items() {
        assert_eq!(
            GroupStatus::derive(GroupStatus::Planned, &[Done, Cancelled, Done]),
            GroupStatus::Completed
        );
    }

    #[test]
    fn test_derive_in_progress_when_some_done() {
        assert_eq!(
            GroupStatus::derive(GroupStatus::Planned, &[Done, Draft]),
            GroupStatus::InProgress
        );
    }

    #[test]
    fn test_derive_scheduled_items_keep_in_progress() {
        assert_eq!(
            GroupStatus::derive(GroupStatus::InProgress, &[Planned, Approved]),
            GroupStatus::InProgress
        );
        assert_eq!(
            GroupStatus::derive(GroupStatus::Planned, &[Planned, Approved]),
            GroupStatus::Planned
        );
    }

    #[test]
    fn test_derive_falls_back_to_stored() {
        assert_eq!(
            GroupStatus::derive(GroupStatus::Completed, &[Draft, Proposed]),
            GroupStatus::Completed
        );
    }
}
