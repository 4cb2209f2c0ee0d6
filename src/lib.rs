//! OTC desk client onboarding: a KYC wizard with persisted progress.

pub mod cli;
pub mod config;
pub mod error;
pub mod onboarding;
pub mod services;
pub mod store;
