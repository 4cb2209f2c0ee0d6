//! Error types for the onboarding wizard.

use crate::onboarding::state::Step;
use crate::onboarding::validators::FieldErrors;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Wizard error: {0}")]
    Wizard(#[from] WizardError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures reported by the external collaborators (screening, identity
/// verification, application handoff). All of them are retryable from the
/// user's point of view and leave the profile untouched.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Invalid wallet address format")]
    InvalidWalletAddress,

    #[error("Identity verification failed: {reason}")]
    VerificationFailed { reason: String, can_retry: bool },

    #[error("Invalid phone number format")]
    InvalidPhone,

    #[error("Failed to send SMS. Please try again.")]
    SmsFailed,

    #[error("Upload failed. Please try again.")]
    UploadFailed,

    #[error("{message}")]
    HandoffFailed { message: String },
}

/// Errors from wizard transitions.
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Applicant is ineligible: prohibited categories selected ({})", categories.join(", "))]
    Ineligible { categories: Vec<String> },

    #[error("High-risk jurisdictions require acknowledgement: {}", countries.join(", "))]
    HighRiskUnacknowledged { countries: Vec<String> },

    #[error("Input for step {input} submitted while at step {current}")]
    StepMismatch { input: Step, current: Step },

    #[error("Cannot navigate from step {from} to step {to}")]
    NavigationDenied { from: Step, to: Step },

    #[error("Client type is already set to {0} and cannot be changed without restarting")]
    ClientTypeLocked(String),

    #[error("Owner list is fixed for individual applicants")]
    OwnerListLocked,

    #[error("At least one beneficial owner is required")]
    LastOwner,

    #[error("Owner {0} not found")]
    OwnerNotFound(String),

    #[error("Wallet screening is only available on the wallet step")]
    ScanNotAvailable,

    #[error("Wallet scan was superseded before it completed")]
    ScanSuperseded,

    #[error("Application can only be submitted from the review step")]
    NotAtReview,

    #[error("Application has already been submitted")]
    AlreadySubmitted,

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
