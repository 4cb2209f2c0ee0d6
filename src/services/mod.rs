//! External collaborators the wizard depends on.
//!
//! - **Wallet screening**: risk scan of a wallet address
//! - **Identity verification**: per-owner ID checks, SMS links, document upload
//! - **Application handoff**: final submission to the business-development team
//!
//! Each is a trait so the controller can be driven by real or stub
//! implementations. The crate ships local mocks for all three.

pub mod handoff;
pub mod screening;
pub mod verification;

pub use handoff::{ApplicationRecord, LocalHandoff};
pub use screening::MockScreener;
pub use verification::MockVerifier;

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::onboarding::model::{MonthlyVolume, OnboardingProfile, ScanResult};

/// Declared activity passed along with a wallet scan for contextual flags.
#[derive(Debug, Clone, Default)]
pub struct ScanContext {
    pub monthly_volume: Option<MonthlyVolume>,
    pub operating_countries: BTreeSet<String>,
}

#[async_trait]
pub trait WalletScreener: Send + Sync {
    /// Scan `address`. Fails with `InvalidWalletAddress` for malformed input.
    async fn scan(&self, address: &str, context: &ScanContext) -> Result<ScanResult, ServiceError>;
}

/// Who is being verified.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub owner_id: Uuid,
    pub owner_name: String,
}

/// A mobile verification session the owner can open on their phone.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationSession {
    pub session_id: String,
    pub qr_url: String,
}

/// A successful identity check.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub verification_id: String,
    pub verified_at: DateTime<Utc>,
    pub document_type: String,
    pub confidence_score: u8,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentReceipt {
    pub document_id: String,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Open a verification session for an owner.
    fn start_session(&self) -> VerificationSession;

    /// Text a verification link. Returns the confirmation message.
    async fn send_link(
        &self,
        phone: &str,
        session: &VerificationSession,
    ) -> Result<String, ServiceError>;

    /// Run the identity check. Failures carry a retryable reason.
    async fn verify(&self, request: &VerificationRequest)
    -> Result<VerificationResult, ServiceError>;

    async fn upload_document(&self, file_name: &str) -> Result<DocumentReceipt, ServiceError>;
}

/// What the handoff returns on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandoffReceipt {
    pub application_id: String,
    pub message: String,
}

#[async_trait]
pub trait ApplicationHandoff: Send + Sync {
    /// Submit a completed profile for review.
    async fn submit(
        &self,
        user_id: &str,
        profile: &OnboardingProfile,
    ) -> Result<HandoffReceipt, ServiceError>;
}

/// Sleep for a random duration in `min_ms..max_ms` when enabled.
pub(crate) async fn simulate_latency(enabled: bool, min_ms: u64, max_ms: u64) {
    if !enabled {
        return;
    }
    let ms = rand::thread_rng().gen_range(min_ms..max_ms);
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Lowercase base-36 rendering, used for generated ids.
pub(crate) fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// `len` random base-36 characters.
pub(crate) fn random_base36(len: usize) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| DIGITS[rng.gen_range(0..DIGITS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_encoding() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "loyw3v28");
    }

    #[test]
    fn random_base36_has_requested_length() {
        let s = random_base36(6);
        assert_eq!(s.len(), 6);
        assert!(s.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[tokio::test]
    async fn latency_disabled_returns_immediately() {
        let started = std::time::Instant::now();
        simulate_latency(false, 5_000, 6_000).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
