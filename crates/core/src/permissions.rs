use serde::{Deserialize, Serialize};

/// Per-doctor capability flags, managed by admins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DoctorPermissions {
    pub can_view_all_patients: bool,
    pub can_edit_treatments: bool,
    pub can_manage_groups: bool,
}

impl Default for DoctorPermissions {
    /// Applied when a doctor has no stored permission row.
    fn default() -> Self {
        Self {
            can_view_all_patients: false,
            can_edit_treatments: true,
            can_manage_groups: false,
        }
    }
}

impl DoctorPermissions {
    pub fn require_edit_treatments(&self) -> crate::ClinicResult<()> {
        if self.can_edit_treatments {
            Ok(())
        } else {
            Err(crate::ClinicError::PermissionDenied)
        }
    }

    pub fn require_manage_groups(&self) -> crate::ClinicResult<()> {
        if self.can_manage_groups {
            Ok(())
        } else {
            Err(crate::ClinicError::PermissionDenied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = DoctorPermissions::default();
        assert!(!p.can_view_all_patients);
        assert!(p.can_edit_treatments);
        assert!(!p.can_manage_groups);
        assert!(p.require_edit_treatments().is_ok());
        assert!(p.require_manage_groups().is_err());
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(DoctorPermissions::default()).unwrap();
        assert_eq!(json["canEditTreatments"], true);
        assert_eq!(json["canViewAllPatients"], false);
    }
}
