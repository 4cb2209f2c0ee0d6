//! Beneficial-owner list operations.
//!
//! Pure functions over the owner collection. The manager decides which of
//! them a client type may use and writes the result back through the store.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::{IndividualBasics, OwnerRecord};

/// Ownership every owner list should add up to.
pub const FULL_OWNERSHIP: Decimal = Decimal::ONE_HUNDRED;

/// Partial update for an owner record. `None` fields are left as they are.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OwnerPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub ownership_percentage: Option<Decimal>,
    pub is_control_person: Option<bool>,
    pub id_uploaded: Option<bool>,
    pub verified: Option<bool>,
}

impl OwnerPatch {
    pub fn apply(&self, owner: &mut OwnerRecord) {
        if let Some(ref v) = self.first_name {
            owner.first_name = v.clone();
        }
        if let Some(ref v) = self.last_name {
            owner.last_name = v.clone();
        }
        if let Some(ref v) = self.email {
            owner.email = v.clone();
        }
        if let Some(v) = self.ownership_percentage {
            owner.ownership_percentage = v;
        }
        if let Some(v) = self.is_control_person {
            owner.is_control_person = v;
        }
        if let Some(v) = self.id_uploaded {
            owner.id_uploaded = v;
        }
        if let Some(v) = self.verified {
            owner.verified = v;
        }
    }

    /// The same patch with identity and ownership fields dropped.
    pub fn without_identity(&self) -> Self {
        Self {
            first_name: None,
            last_name: None,
            email: None,
            ownership_percentage: None,
            ..self.clone()
        }
    }

    pub fn touches_identity(&self) -> bool {
        self.first_name.is_some()
            || self.last_name.is_some()
            || self.email.is_some()
            || self.ownership_percentage.is_some()
    }
}

/// Append a blank owner with a fresh id. Returns the new id.
pub fn add_owner(owners: &mut Vec<OwnerRecord>) -> Uuid {
    let mut id = Uuid::new_v4();
    while owners.iter().any(|o| o.id == id) {
        id = Uuid::new_v4();
    }
    owners.push(OwnerRecord::blank(id));
    id
}

/// Return a copy of `owners` with the matching record patched. Unknown ids
/// leave the list unchanged.
pub fn update_owner(owners: &[OwnerRecord], id: Uuid, patch: &OwnerPatch) -> Vec<OwnerRecord> {
    owners
        .iter()
        .map(|owner| {
            let mut owner = owner.clone();
            if owner.id == id {
                patch.apply(&mut owner);
            }
            owner
        })
        .collect()
}

/// Return a copy of `owners` without the matching record. The caller is
/// responsible for refusing removals that would empty the list.
pub fn remove_owner(owners: &[OwnerRecord], id: Uuid) -> Vec<OwnerRecord> {
    owners.iter().filter(|o| o.id != id).cloned().collect()
}

/// Whether removing one owner would still leave at least one.
pub fn can_remove(owners: &[OwnerRecord]) -> bool {
    owners.len() > 1
}

pub fn total_ownership(owners: &[OwnerRecord]) -> Decimal {
    owners.iter().map(|o| o.ownership_percentage).sum()
}

/// How the aggregate ownership compares to 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OwnershipStatus {
    Complete,
    /// Below 100; submission allowed with a warning.
    Under { remaining: Decimal },
    /// Above 100; submission blocked.
    Over { excess: Decimal },
}

impl OwnershipStatus {
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Over { .. })
    }
}

pub fn ownership_status(owners: &[OwnerRecord]) -> OwnershipStatus {
    let total = total_ownership(owners);
    if total > FULL_OWNERSHIP {
        OwnershipStatus::Over {
            excess: total - FULL_OWNERSHIP,
        }
    } else if total < FULL_OWNERSHIP {
        OwnershipStatus::Under {
            remaining: FULL_OWNERSHIP - total,
        }
    } else {
        OwnershipStatus::Complete
    }
}

/// Fill an individual's owner record from their basics.
///
/// Only runs once: a record whose first name is already set is left alone,
/// so later edits to basics are not re-synced. Returns whether it changed.
pub fn prefill_from_basics(owner: &mut OwnerRecord, basics: &IndividualBasics) -> bool {
    if !owner.first_name.is_empty() {
        return false;
    }
    owner.first_name = basics.first_name.clone();
    owner.last_name = basics.last_name.clone();
    owner.email = basics.email.clone();
    owner.ownership_percentage = FULL_OWNERSHIP;
    true
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::onboarding::model::UboSection;

    fn percentage(pct: Decimal) -> OwnerPatch {
        OwnerPatch {
            ownership_percentage: Some(pct),
            ..Default::default()
        }
    }

    #[test]
    fn add_owner_appends_unique_blank_records() {
        let mut owners = UboSection::default().owners;
        let a = add_owner(&mut owners);
        let b = add_owner(&mut owners);
        assert_eq!(owners.len(), 3);
        assert_ne!(a, b);
        assert_eq!(owners[2].id, b);
        assert!(owners[2].first_name.is_empty());
        assert_eq!(owners[2].ownership_percentage, Decimal::ZERO);
    }

    #[test]
    fn update_owner_merges_only_given_fields() {
        let mut owners = Vec::new();
        let id = add_owner(&mut owners);
        let owners = update_owner(
            &owners,
            id,
            &OwnerPatch {
                first_name: Some("Grace".to_string()),
                is_control_person: Some(true),
                ..Default::default()
            },
        );
        let owners = update_owner(&owners, id, &percentage(dec!(40)));
        assert_eq!(owners[0].first_name, "Grace");
        assert!(owners[0].is_control_person);
        assert_eq!(owners[0].ownership_percentage, dec!(40));
    }

    #[test]
    fn update_unknown_owner_is_a_noop() {
        let owners = UboSection::default().owners;
        let updated = update_owner(&owners, Uuid::new_v4(), &percentage(dec!(10)));
        assert_eq!(updated, owners);
    }

    #[test]
    fn remove_owner_drops_matching_record() {
        let mut owners = UboSection::default().owners;
        let id = add_owner(&mut owners);
        assert!(can_remove(&owners));
        let owners = remove_owner(&owners, id);
        assert_eq!(owners.len(), 1);
        assert!(!can_remove(&owners));
    }

    #[test]
    fn over_allocation_blocks() {
        let mut owners = Vec::new();
        let a = add_owner(&mut owners);
        let owners = update_owner(&owners, a, &percentage(dec!(60)));
        let mut owners = owners;
        let b = add_owner(&mut owners);
        let owners = update_owner(&owners, b, &percentage(dec!(50)));

        assert_eq!(total_ownership(&owners), dec!(110));
        let status = ownership_status(&owners);
        assert_eq!(status, OwnershipStatus::Over { excess: dec!(10) });
        assert!(status.is_blocking());
    }

    #[test]
    fn under_allocation_is_a_warning() {
        let mut owners = Vec::new();
        let a = add_owner(&mut owners);
        let owners = update_owner(&owners, a, &percentage(dec!(75.5)));
        let status = ownership_status(&owners);
        assert_eq!(status, OwnershipStatus::Under { remaining: dec!(24.5) });
        assert!(!status.is_blocking());
    }

    #[test]
    fn fractional_shares_sum_exactly() {
        let mut owners = Vec::new();
        let a = add_owner(&mut owners);
        let owners = update_owner(&owners, a, &percentage(dec!(33.3)));
        let mut owners = owners;
        let b = add_owner(&mut owners);
        let owners = update_owner(&owners, b, &percentage(dec!(66.7)));
        assert_eq!(ownership_status(&owners), OwnershipStatus::Complete);
    }

    #[test]
    fn prefill_runs_once() {
        let mut owner = OwnerRecord::blank(Uuid::new_v4());
        let mut basics = IndividualBasics {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            ..Default::default()
        };
        assert!(prefill_from_basics(&mut owner, &basics));
        assert_eq!(owner.display_name(), "Ada Lovelace");
        assert_eq!(owner.ownership_percentage, FULL_OWNERSHIP);

        basics.first_name = "Augusta".to_string();
        assert!(!prefill_from_basics(&mut owner, &basics));
        assert_eq!(owner.first_name, "Ada");
    }

    #[test]
    fn identity_fields_can_be_stripped() {
        let patch = OwnerPatch {
            first_name: Some("X".to_string()),
            ownership_percentage: Some(dec!(5)),
            verified: Some(true),
            ..Default::default()
        };
        assert!(patch.touches_identity());
        let stripped = patch.without_identity();
        assert!(!stripped.touches_identity());
        assert_eq!(stripped.verified, Some(true));
    }
}
