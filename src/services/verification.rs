//! Mock identity verification (mobile ID check, SMS link, document upload).

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::ServiceError;

use super::{
    DocumentReceipt, IdentityVerifier, VerificationRequest, VerificationResult,
    VerificationSession, random_base36, simulate_latency, to_base36,
};

const FAILURE_REASONS: &[&str] = &[
    "Document image quality too low",
    "Face match confidence below threshold",
    "Document may be expired",
    "Unable to verify address from document",
    "Verification session timed out",
];

const SMS_SUCCESS_RATE: f64 = 0.95;
const UPLOAD_SUCCESS_RATE: f64 = 0.98;

pub struct MockVerifier {
    success_rate: f64,
    simulate_latency: bool,
}

impl MockVerifier {
    pub fn new(success_rate: f64, simulate_latency: bool) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
            simulate_latency,
        }
    }
}

fn millis_base36() -> String {
    to_base36(u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default())
}

/// Keep the last four characters, star the rest.
fn mask_phone(phone: &str) -> String {
    let len = phone.chars().count();
    phone
        .chars()
        .enumerate()
        .map(|(i, c)| if i + 4 < len { '*' } else { c })
        .collect()
}

/// Draw `true` with probability `rate`.
fn roll(rate: f64) -> bool {
    rand::thread_rng().gen_bool(rate.clamp(0.0, 1.0))
}

#[async_trait]
impl IdentityVerifier for MockVerifier {
    fn start_session(&self) -> VerificationSession {
        let session_id = format!("vs_{}_{}", Utc::now().timestamp_millis(), random_base36(9));
        VerificationSession {
            qr_url: format!("https://verify.arqitech.com/session/{session_id}"),
            session_id,
        }
    }

    async fn send_link(
        &self,
        phone: &str,
        session: &VerificationSession,
    ) -> Result<String, ServiceError> {
        simulate_latency(self.simulate_latency, 800, 1_300).await;

        let phone = phone.trim();
        if phone.chars().count() < 10 {
            return Err(ServiceError::InvalidPhone);
        }
        if !roll(SMS_SUCCESS_RATE) {
            tracing::warn!(session_id = %session.session_id, "Verification SMS failed");
            return Err(ServiceError::SmsFailed);
        }
        tracing::info!(session_id = %session.session_id, "Verification SMS sent");
        Ok(format!("Verification link sent to {}", mask_phone(phone)))
    }

    async fn verify(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationResult, ServiceError> {
        simulate_latency(self.simulate_latency, 2_500, 3_500).await;

        let outcome = {
            let mut rng = rand::thread_rng();
            if rng.gen_bool(self.success_rate) {
                Ok(rng.gen_range(85..100u8))
            } else {
                Err(FAILURE_REASONS
                    .choose(&mut rng)
                    .copied()
                    .unwrap_or("Verification failed")
                    .to_string())
            }
        };

        match outcome {
            Ok(confidence_score) => {
                tracing::info!(owner_id = %request.owner_id, confidence_score, "Identity verified");
                Ok(VerificationResult {
                    verification_id: format!("ver_{}", Utc::now().timestamp_millis()),
                    verified_at: Utc::now(),
                    document_type: "PASSPORT".to_string(),
                    confidence_score,
                    message: format!("Identity verified for {}", request.owner_name),
                })
            }
            Err(reason) => {
                tracing::warn!(owner_id = %request.owner_id, %reason, "Identity verification failed");
                Err(ServiceError::VerificationFailed {
                    reason,
                    can_retry: true,
                })
            }
        }
    }

    async fn upload_document(&self, file_name: &str) -> Result<DocumentReceipt, ServiceError> {
        simulate_latency(self.simulate_latency, 500, 1_500).await;

        if !roll(UPLOAD_SUCCESS_RATE) {
            return Err(ServiceError::UploadFailed);
        }
        let file_name = if file_name.trim().is_empty() {
            "document.pdf".to_string()
        } else {
            file_name.trim().to_string()
        };
        Ok(DocumentReceipt {
            document_id: format!("doc_{}_{}", millis_base36(), random_base36(6)),
            file_name,
            uploaded_at: Utc::now(),
        })
    }
}
