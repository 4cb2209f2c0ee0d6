//! KYC onboarding wizard.
//!
//! An eight-step flow that collects a client's profile: client type,
//! eligibility, basics, address, beneficial owners, activity, wallet and a
//! final review. Progress lives in a single persisted profile so a
//! returning applicant resumes where they left off.

pub mod manager;
pub mod model;
pub mod owners;
pub mod state;
pub mod store;
pub mod validators;

pub use manager::{
    AdvanceOutcome, OnboardingManager, OnboardingStatus, StepInput, VerificationLink,
};
pub use model::{ClientType, OnboardingProfile, OwnerRecord};
pub use owners::{OwnerPatch, OwnershipStatus};
pub use state::Step;
pub use store::{ProfileStore, Section};
pub use validators::FieldErrors;
