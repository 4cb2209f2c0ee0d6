//! Application handoff to the business-development team.
//!
//! `LocalHandoff` formats the profile into an `ApplicationRecord`, stores it
//! in the applications ledger and builds a notification email. There is no
//! mail transport; the rendered message is written to the log.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::Message;
use lettre::message::Mailbox;
use serde::Serialize;

use crate::error::ServiceError;
use crate::onboarding::model::{AddressRecord, Basics, ClientType, OnboardingProfile};
use crate::store::{Database, StoredApplication};

use super::{ApplicationHandoff, HandoffReceipt, random_base36, to_base36};

const SUBMIT_FAILED: &str =
    "An error occurred while submitting your application. Please try again.";

/// `ARQ-<base36 millis>-<6 random base36>`, uppercased.
pub fn generate_application_id(now: DateTime<Utc>) -> String {
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
    format!("ARQ-{}-{}", to_base36(millis), random_base36(6)).to_uppercase()
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ApplicantInfo {
    Individual {
        name: String,
        email: String,
        phone: String,
        citizenship: String,
        dob: String,
    },
    Entity {
        legal_name: String,
        dba: Option<String>,
        jurisdiction: String,
        ein: String,
        phone: String,
        website: String,
        industry: String,
        description: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct AddressSummary {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

impl From<&AddressRecord> for AddressSummary {
    fn from(addr: &AddressRecord) -> Self {
        let street = if addr.street2.trim().is_empty() {
            addr.street1.clone()
        } else {
            format!("{}, {}", addr.street1, addr.street2)
        };
        Self {
            street,
            city: addr.city.clone(),
            state: addr.state.clone(),
            zip: addr.postal_code.clone(),
            country: addr.country.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Addresses {
    pub primary: AddressSummary,
    pub physical: Option<AddressSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnerSummary {
    pub name: String,
    pub email: String,
    pub ownership: String,
    pub is_control_person: bool,
    pub id_verified: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityProfile {
    pub intended_use: String,
    pub sources_of_funds: Vec<String>,
    pub expected_trade_size: Option<String>,
    pub monthly_volume: Option<String>,
    pub operating_countries: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletVerification {
    pub address: String,
    pub risk_level: Option<String>,
    pub risk_score: Option<u8>,
    pub scan_reason: Option<String>,
    pub scanned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Compliance {
    pub eligibility_confirmed: bool,
    pub safe_disclaimer: bool,
    pub ubo_certified: bool,
}

/// The application as handed to reviewers.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationRecord {
    pub application_id: String,
    pub submitted_at: DateTime<Utc>,
    pub client_type: String,
    pub applicant_info: ApplicantInfo,
    pub addresses: Addresses,
    pub beneficial_owners: Vec<OwnerSummary>,
    pub activity_profile: ActivityProfile,
    pub wallet_verification: WalletVerification,
    pub compliance: Compliance,
}

impl ApplicationRecord {
    pub fn from_profile(
        profile: &OnboardingProfile,
        application_id: String,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        let client_type = match profile.client_type {
            Some(ClientType::Individual) => "Individual (HNW)",
            Some(ClientType::Entity) => "Entity/Company",
            None => "Unknown",
        }
        .to_string();

        let applicant_info = match profile.basics {
            Basics::Individual(ref b) => {
                let name = [
                    b.first_name.as_str(),
                    b.middle_name.as_str(),
                    b.last_name.as_str(),
                    b.suffix.as_str(),
                ]
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
                ApplicantInfo::Individual {
                    name,
                    email: b.email.clone(),
                    phone: format!("{} {}", b.phone_country_code, b.phone),
                    citizenship: b.citizenship.clone(),
                    dob: b.dob.clone(),
                }
            }
            Basics::Entity(ref b) => ApplicantInfo::Entity {
                legal_name: b.legal_business_name.clone(),
                dba: b.has_dba.then(|| b.dba_name.clone()),
                jurisdiction: if b.state_of_incorporation.trim().is_empty() {
                    b.country_of_incorporation.clone()
                } else {
                    format!("{}, {}", b.state_of_incorporation, b.country_of_incorporation)
                },
                ein: b.ein.clone(),
                phone: format!("{} {}", b.phone_country_code, b.business_phone),
                website: b.website.clone(),
                industry: b.industry.clone(),
                description: b.activity_description.clone(),
            },
        };

        let physical = if profile.address.has_separate_physical {
            profile.address.physical.as_ref().map(AddressSummary::from)
        } else {
            None
        };

        let beneficial_owners = profile
            .ubo
            .owners
            .iter()
            .map(|o| OwnerSummary {
                name: o.display_name(),
                email: o.email.clone(),
                ownership: format!("{}%", o.ownership_percentage.normalize()),
                is_control_person: o.is_control_person,
                id_verified: o.verified,
            })
            .collect();

        let activity = &profile.activity;
        let scan = profile.wallet.scan_result.as_ref();

        Self {
            application_id,
            submitted_at,
            client_type,
            applicant_info,
            addresses: Addresses {
                primary: AddressSummary::from(&profile.address.primary),
                physical,
            },
            beneficial_owners,
            activity_profile: ActivityProfile {
                intended_use: activity.usage_description.clone(),
                sources_of_funds: activity.sources_of_funds.iter().cloned().collect(),
                expected_trade_size: activity.expected_trade_size.map(|t| t.to_string()),
                monthly_volume: activity.monthly_volume.map(|v| v.to_string()),
                operating_countries: activity.operating_countries.iter().cloned().collect(),
            },
            wallet_verification: WalletVerification {
                address: profile.wallet.address.clone(),
                risk_level: scan.map(|s| s.risk.to_string()),
                risk_score: scan.map(|s| s.score),
                scan_reason: scan.map(|s| s.reason.clone()),
                scanned_at: scan.map(|s| s.timestamp),
            },
            compliance: Compliance {
                eligibility_confirmed: profile.eligibility.completed,
                safe_disclaimer: profile.safe_disclaimer,
                ubo_certified: profile.ubo.certified,
            },
        }
    }

    /// Plain-text body of the notification email.
    pub fn notification_body(&self) -> String {
        let rule = "=".repeat(51);
        let thin = "-".repeat(51);
        let mut out = String::new();

        out.push_str(&format!("{rule}\nNEW ONBOARDING APPLICATION RECEIVED\n{rule}\n\n"));
        out.push_str(&format!("Application ID: {}\n", self.application_id));
        out.push_str(&format!(
            "Submitted: {}\n",
            self.submitted_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        out.push_str(&format!("Client Type: {}\n\n", self.client_type));

        out.push_str(&format!("APPLICANT INFORMATION\n{thin}\n"));
        match self.applicant_info {
            ApplicantInfo::Individual {
                ref name,
                ref email,
                ref phone,
                ref citizenship,
                ..
            } => {
                out.push_str(&format!("Name: {name}\nEmail: {email}\nPhone: {phone}\n"));
                out.push_str(&format!("Citizenship: {citizenship}\n"));
            }
            ApplicantInfo::Entity {
                ref legal_name,
                ref dba,
                ref jurisdiction,
                ref ein,
                ref industry,
                ..
            } => {
                out.push_str(&format!("Legal Name: {legal_name}\n"));
                if let Some(dba) = dba {
                    out.push_str(&format!("DBA: {dba}\n"));
                }
                out.push_str(&format!(
                    "Jurisdiction: {jurisdiction}\nEIN: {ein}\nIndustry: {industry}\n"
                ));
            }
        }

        let activity = &self.activity_profile;
        out.push_str(&format!("\nACTIVITY PROFILE\n{thin}\n"));
        out.push_str(&format!(
            "Expected Trade Size: {}\n",
            activity.expected_trade_size.as_deref().unwrap_or("N/A")
        ));
        out.push_str(&format!(
            "Monthly Volume: {}\n",
            activity.monthly_volume.as_deref().unwrap_or("N/A")
        ));
        out.push_str(&format!(
            "Operating Countries: {}\n",
            activity.operating_countries.join(", ")
        ));

        let wallet = &self.wallet_verification;
        out.push_str(&format!("\nWALLET VERIFICATION\n{thin}\n"));
        out.push_str(&format!("Address: {}\n", wallet.address));
        out.push_str(&format!(
            "Risk Level: {}\n",
            wallet
                .risk_level
                .as_deref()
                .map(str::to_uppercase)
                .unwrap_or_else(|| "N/A".to_string())
        ));
        out.push_str(&format!(
            "Risk Score: {}\n",
            wallet
                .risk_score
                .map(|s| s.to_string())
                .unwrap_or_else(|| "N/A".to_string())
        ));

        out.push_str(&format!(
            "\n{rule}\nPlease review this application in the admin dashboard.\n{rule}\n"
        ));
        out
    }
}

/// Handoff that records applications in the local database.
pub struct LocalHandoff {
    db: Arc<dyn Database>,
    bizdev_email: String,
    from_email: String,
}

impl LocalHandoff {
    pub fn new(
        db: Arc<dyn Database>,
        bizdev_email: impl Into<String>,
        from_email: impl Into<String>,
    ) -> Self {
        Self {
            db,
            bizdev_email: bizdev_email.into(),
            from_email: from_email.into(),
        }
    }

    fn build_notification(&self, record: &ApplicationRecord) -> Result<Message, String> {
        let from: Mailbox = self
            .from_email
            .parse()
            .map_err(|e| format!("Invalid from address: {e}"))?;
        let to: Mailbox = self
            .bizdev_email
            .parse()
            .map_err(|e| format!("Invalid to address: {e}"))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(format!("New onboarding application {}", record.application_id))
            .body(record.notification_body())
            .map_err(|e| format!("Failed to build email: {e}"))
    }

    /// Notify business development. Failures are logged only; the stored
    /// application stands.
    fn notify(&self, record: &ApplicationRecord) {
        match self.build_notification(record) {
            Ok(email) => {
                let rendered = email.formatted();
                tracing::info!(
                    to = %self.bizdev_email,
                    application_id = %record.application_id,
                    "Notification email:\n{}",
                    String::from_utf8_lossy(&rendered)
                );
            }
            Err(e) => {
                tracing::warn!(
                    application_id = %record.application_id,
                    "Failed to notify business development: {}",
                    e
                );
            }
        }
    }
}

#[async_trait]
impl ApplicationHandoff for LocalHandoff {
    async fn submit(
        &self,
        user_id: &str,
        profile: &OnboardingProfile,
    ) -> Result<HandoffReceipt, ServiceError> {
        let submitted_at = Utc::now();
        let application_id = generate_application_id(submitted_at);
        let record = ApplicationRecord::from_profile(profile, application_id.clone(), submitted_at);

        let payload = serde_json::to_value(&record).map_err(|e| {
            tracing::error!("Failed to serialize application record: {}", e);
            ServiceError::HandoffFailed {
                message: SUBMIT_FAILED.to_string(),
            }
        })?;

        let stored = StoredApplication {
            application_id: application_id.clone(),
            user_id: user_id.to_string(),
            client_type: profile
                .client_type
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            payload,
            submitted_at,
        };
        if let Err(e) = self.db.insert_application(&stored).await {
            tracing::error!(%application_id, "Failed to store application: {}", e);
            return Err(ServiceError::HandoffFailed {
                message: SUBMIT_FAILED.to_string(),
            });
        }
        tracing::info!(%application_id, user_id, "Application stored");

        self.notify(&record);

        Ok(HandoffReceipt {
            message: format!(
                "Application {application_id} has been submitted successfully. Our business \
                 development team will contact you within 1-2 business days."
            ),
            application_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::onboarding::model::{EntityBasics, OwnerRecord, PRIMARY_OWNER_ID};
    use crate::store::LibSqlBackend;

    fn entity_profile() -> OnboardingProfile {
        let mut profile = OnboardingProfile::default();
        profile.client_type = Some(ClientType::Entity);
        profile.safe_disclaimer = true;
        profile.eligibility.completed = true;
        profile.basics = Basics::Entity(EntityBasics {
            legal_business_name: "Acme Holdings LLC".into(),
            has_dba: true,
            dba_name: "Acme".into(),
            country_of_incorporation: "US".into(),
            state_of_incorporation: "DE".into(),
            ein: "12-3456789".into(),
            industry: "asset_management".into(),
            ..Default::default()
        });
        profile.ubo.owners = vec![OwnerRecord {
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            email: "grace@acme.test".into(),
            ownership_percentage: dec!(60.50),
            ..OwnerRecord::blank(PRIMARY_OWNER_ID)
        }];
        profile.ubo.certified = true;
        profile.wallet.address = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e".into();
        profile
    }

    #[test]
    fn application_id_format() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let id = generate_application_id(now);
        assert!(id.starts_with("ARQ-LOYW3V28-"));
        let suffix = id.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 6);
        assert_eq!(id, id.to_uppercase());
    }

    #[test]
    fn record_formats_entity() {
        let record =
            ApplicationRecord::from_profile(&entity_profile(), "ARQ-TEST".into(), Utc::now());
        assert_eq!(record.client_type, "Entity/Company");
        match record.applicant_info {
            ApplicantInfo::Entity {
                ref jurisdiction,
                ref dba,
                ..
            } => {
                assert_eq!(jurisdiction, "DE, US");
                assert_eq!(dba.as_deref(), Some("Acme"));
            }
            _ => panic!("expected entity info"),
        }
        assert_eq!(record.beneficial_owners[0].ownership, "60.5%");
        assert!(record.addresses.physical.is_none());
        assert!(record.wallet_verification.risk_level.is_none());
        assert!(record.compliance.ubo_certified);

        let body = record.notification_body();
        assert!(body.contains("Application ID: ARQ-TEST"));
        assert!(body.contains("DBA: Acme"));
        assert!(body.contains("Risk Level: N/A"));
    }

    #[tokio::test]
    async fn submit_stores_application() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let handoff = LocalHandoff::new(db.clone(), "bizdev@arqitech.com", "onboarding@arqitech.com");

        let receipt = handoff.submit("default", &entity_profile()).await.unwrap();
        assert!(receipt.application_id.starts_with("ARQ-"));
        assert!(receipt.message.contains(&receipt.application_id));

        let stored = db.get_application(&receipt.application_id).await.unwrap().unwrap();
        assert_eq!(stored.client_type, "entity");
        assert_eq!(stored.payload["applicant_info"]["legal_name"], "Acme Holdings LLC");
    }

    #[tokio::test]
    async fn bad_notification_address_does_not_fail_submit() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let handoff = LocalHandoff::new(db.clone(), "not an address", "onboarding@arqitech.com");
        let receipt = handoff.submit("default", &entity_profile()).await.unwrap();
        assert_eq!(db.list_applications("default").await.unwrap().len(), 1);
        assert!(!receipt.application_id.is_empty());
    }
}
