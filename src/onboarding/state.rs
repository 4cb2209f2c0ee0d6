//! Step policy: the ordered wizard steps and their navigation gates.

use serde::{Deserialize, Serialize};

use super::model::OnboardingProfile;

/// Number of wizard steps.
pub const STEP_COUNT: u8 = 8;

/// The steps of the onboarding wizard.
///
/// Progresses linearly: ClientType → Eligibility → Basics → Address →
/// Ownership → Activity → Wallet → Review. Serialized as the step number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Step {
    ClientType = 1,
    Eligibility = 2,
    Basics = 3,
    Address = 4,
    Ownership = 5,
    Activity = 6,
    Wallet = 7,
    Review = 8,
}

impl Step {
    pub const ALL: [Step; STEP_COUNT as usize] = [
        Step::ClientType,
        Step::Eligibility,
        Step::Basics,
        Step::Address,
        Step::Ownership,
        Step::Activity,
        Step::Wallet,
        Step::Review,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(n: u8) -> Option<Step> {
        Self::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    /// Get the next step in the linear progression, if any.
    pub fn next(self) -> Option<Step> {
        Self::from_number(self.number() + 1)
    }

    /// Get the previous step, if any.
    pub fn prev(self) -> Option<Step> {
        Self::from_number(self.number().checked_sub(1)?)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ClientType => "Client Type",
            Self::Eligibility => "Eligibility",
            Self::Basics => "Basic Info",
            Self::Address => "Address",
            Self::Ownership => "Ownership",
            Self::Activity => "Activity",
            Self::Wallet => "Wallet",
            Self::Review => "Review",
        }
    }
}

impl Default for Step {
    fn default() -> Self {
        Self::ClientType
    }
}

impl TryFrom<u8> for Step {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::from_number(n).ok_or_else(|| format!("step must be 1..={STEP_COUNT}, got {n}"))
    }
}

impl From<Step> for u8 {
    fn from(step: Step) -> u8 {
        step.number()
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

pub fn step_count() -> u8 {
    STEP_COUNT
}

/// Label for a raw step number; empty outside 1..=8.
pub fn label_for(step: u8) -> &'static str {
    Step::from_number(step).map(Step::label).unwrap_or("")
}

/// Whether the progress stepper may jump to `requested`.
///
/// Only backward jumps are allowed here. Moving forward is granted solely by
/// a successful `advance` out of the current step.
pub fn can_navigate_to(requested: Step, current: Step) -> bool {
    requested < current
}

/// Whether the stored profile satisfies the prerequisites for viewing `step`.
pub fn precondition_met(step: Step, profile: &OnboardingProfile) -> bool {
    match step {
        Step::ClientType => true,
        Step::Eligibility => profile.client_type.is_some(),
        Step::Basics => profile.client_type.is_some() && profile.eligibility.completed,
        _ => profile.client_type.is_some() && profile.current_step >= step,
    }
}

/// The step to actually render for a requested step. Deep links into a step
/// whose prerequisites are missing land back on step 1.
pub fn resolve_view(requested: Step, profile: &OnboardingProfile) -> Step {
    if precondition_met(requested, profile) {
        requested
    } else {
        Step::ClientType
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::model::ClientType;

    #[test]
    fn next_walks_all_steps() {
        let mut current = Step::ClientType;
        for expected in &Step::ALL[1..] {
            let next = current.next().unwrap();
            assert_eq!(next, *expected);
            current = next;
        }
        assert!(current.next().is_none());
        assert!(Step::ClientType.prev().is_none());
        assert_eq!(Step::Review.prev(), Some(Step::Wallet));
    }

    #[test]
    fn labels() {
        assert_eq!(step_count(), 8);
        assert_eq!(label_for(1), "Client Type");
        assert_eq!(label_for(3), "Basic Info");
        assert_eq!(label_for(8), "Review");
        assert_eq!(label_for(0), "");
        assert_eq!(label_for(9), "");
    }

    #[test]
    fn navigation_is_backward_only() {
        assert!(can_navigate_to(Step::Basics, Step::Activity));
        assert!(!can_navigate_to(Step::Activity, Step::Activity));
        assert!(!can_navigate_to(Step::Wallet, Step::Activity));
    }

    #[test]
    fn serde_uses_step_number() {
        assert_eq!(serde_json::to_string(&Step::Wallet).unwrap(), "7");
        let parsed: Step = serde_json::from_str("4").unwrap();
        assert_eq!(parsed, Step::Address);
        assert!(serde_json::from_str::<Step>("0").is_err());
        assert!(serde_json::from_str::<Step>("9").is_err());
    }

    #[test]
    fn display_matches_serde() {
        for step in Step::ALL {
            assert_eq!(step.to_string(), serde_json::to_string(&step).unwrap());
        }
    }

    #[test]
    fn deep_links_without_client_type_redirect() {
        let profile = OnboardingProfile::default();
        assert_eq!(resolve_view(Step::ClientType, &profile), Step::ClientType);
        for step in &Step::ALL[1..] {
            assert_eq!(resolve_view(*step, &profile), Step::ClientType);
        }
    }

    #[test]
    fn basics_requires_completed_eligibility() {
        let mut profile = OnboardingProfile::default();
        profile.client_type = Some(ClientType::Entity);
        profile.current_step = Step::Basics;
        assert_eq!(resolve_view(Step::Eligibility, &profile), Step::Eligibility);
        assert_eq!(resolve_view(Step::Basics, &profile), Step::ClientType);

        profile.eligibility.completed = true;
        assert_eq!(resolve_view(Step::Basics, &profile), Step::Basics);
    }

    #[test]
    fn later_steps_require_reaching_them() {
        let mut profile = OnboardingProfile::default();
        profile.client_type = Some(ClientType::Individual);
        profile.current_step = Step::Ownership;
        assert_eq!(resolve_view(Step::Address, &profile), Step::Address);
        assert_eq!(resolve_view(Step::Ownership, &profile), Step::Ownership);
        assert_eq!(resolve_view(Step::Activity, &profile), Step::ClientType);
        assert_eq!(resolve_view(Step::Review, &profile), Step::ClientType);
    }
}
