//! OnboardingManager: the wizard controller.
//!
//! Validates the candidate input for the current step, merges it into the
//! profile store and moves the step pointer. Also fronts the owner list and
//! the external collaborators (screening, verification, handoff) so every
//! profile mutation goes through one place.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::{DatabaseError, WizardError};
use crate::services::{
    ApplicationHandoff, DocumentReceipt, HandoffReceipt, IdentityVerifier, ScanContext,
    VerificationRequest, VerificationResult, VerificationSession, WalletScreener,
};

use super::model::{
    ActivitySection, AddressSection, Basics, ClientType, OnboardingProfile, OwnerRecord,
    ScanResult, UboSection,
};
use super::owners::{self, OwnerPatch, OwnershipStatus};
use super::state::{self, STEP_COUNT, Step};
use super::store::{ProfileStore, Section};
use super::validators::{
    self, ClientTypeInput, EligibilityDecision, EligibilityInput, FieldErrors, WalletInput,
};

/// Candidate input for one step. The variant determines the step.
#[derive(Debug, Clone)]
pub enum StepInput {
    ClientType(ClientTypeInput),
    Eligibility(EligibilityInput),
    Basics(Basics),
    Address(AddressSection),
    /// Owner list and certification. Individual applicants keep their stored
    /// owner; only `certified` is taken from the input.
    Ownership(UboSection),
    Activity(ActivitySection),
    Wallet(WalletInput),
}

impl StepInput {
    pub fn step(&self) -> Step {
        match self {
            Self::ClientType(_) => Step::ClientType,
            Self::Eligibility(_) => Step::Eligibility,
            Self::Basics(_) => Step::Basics,
            Self::Address(_) => Step::Address,
            Self::Ownership(_) => Step::Ownership,
            Self::Activity(_) => Step::Activity,
            Self::Wallet(_) => Step::Wallet,
        }
    }

    /// Parse the JSON form of the input for the profile's current step.
    /// Review has no input and yields `None`. Basics without a `kind` take
    /// the stored client type; ownership without `owners` takes the stored
    /// owner list.
    pub fn from_json(
        profile: &OnboardingProfile,
        value: Value,
    ) -> Result<Option<Self>, serde_json::Error> {
        let mut value = value;
        let input = match profile.current_step {
            Step::ClientType => Self::ClientType(serde_json::from_value(value)?),
            Step::Eligibility => Self::Eligibility(serde_json::from_value(value)?),
            Step::Basics => {
                if let (Value::Object(map), Some(ct)) = (&mut value, profile.client_type) {
                    map.entry("kind")
                        .or_insert_with(|| Value::String(ct.to_string()));
                }
                Self::Basics(serde_json::from_value(value)?)
            }
            Step::Address => Self::Address(serde_json::from_value(value)?),
            Step::Ownership => {
                if let Value::Object(map) = &mut value {
                    if !map.contains_key("owners") {
                        map.insert("owners".into(), serde_json::to_value(&profile.ubo.owners)?);
                    }
                }
                Self::Ownership(serde_json::from_value(value)?)
            }
            Step::Activity => Self::Activity(serde_json::from_value(value)?),
            Step::Wallet => Self::Wallet(serde_json::from_value(value)?),
            Step::Review => return Ok(None),
        };
        Ok(Some(input))
    }
}

/// Result of a successful `advance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceOutcome {
    /// The step now current.
    pub step: Step,
    /// Non-blocking notices, e.g. ownership below 100%.
    pub warnings: Vec<String>,
}

/// A verification link sent to an owner's phone.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationLink {
    pub session: VerificationSession,
    pub message: String,
}

/// Snapshot of wizard progress.
#[derive(Debug, Clone, Serialize)]
pub struct OnboardingStatus {
    pub current_step: Step,
    pub label: &'static str,
    pub step_count: u8,
    pub submitted: bool,
    pub application_id: Option<String>,
    pub ownership_total: Decimal,
    pub ownership: OwnershipStatus,
    pub profile: OnboardingProfile,
}

/// Coordinates the wizard: validation, merges, step pointer, collaborators.
pub struct OnboardingManager {
    store: Arc<ProfileStore>,
    screener: Arc<dyn WalletScreener>,
    verifier: Arc<dyn IdentityVerifier>,
    handoff: Arc<dyn ApplicationHandoff>,
    /// Bumped by every step transition and every scan request. A scan whose
    /// generation is no longer current is discarded.
    scan_generation: AtomicU64,
}

impl OnboardingManager {
    pub fn new(
        store: Arc<ProfileStore>,
        screener: Arc<dyn WalletScreener>,
        verifier: Arc<dyn IdentityVerifier>,
        handoff: Arc<dyn ApplicationHandoff>,
    ) -> Self {
        Self {
            store,
            screener,
            verifier,
            handoff,
            scan_generation: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<ProfileStore> {
        &self.store
    }

    /// Copy of the current profile.
    pub async fn profile(&self) -> OnboardingProfile {
        self.store.snapshot().await
    }

    pub async fn current_step(&self) -> Step {
        self.store.snapshot().await.current_step
    }

    // ── Step transitions ────────────────────────────────────────────

    /// Validate `input` for the current step and, on success, merge it and
    /// move to the next step. On failure nothing but an eligibility
    /// rejection is written, and the step pointer never moves.
    pub async fn advance(&self, input: StepInput) -> Result<AdvanceOutcome, WizardError> {
        let profile = self.store.snapshot().await;
        ensure_open(&profile)?;

        let step = input.step();
        if step != profile.current_step {
            return Err(WizardError::StepMismatch {
                input: step,
                current: profile.current_step,
            });
        }

        let mut warnings = Vec::new();
        match input {
            StepInput::ClientType(input) => self.complete_client_type(&profile, input).await?,
            StepInput::Eligibility(input) => self.complete_eligibility(input).await?,
            StepInput::Basics(basics) => self.complete_basics(&profile, basics).await?,
            StepInput::Address(address) => self.complete_address(address).await?,
            StepInput::Ownership(ubo) => {
                if let Some(warning) = self.complete_ownership(&profile, ubo).await? {
                    warnings.push(warning);
                }
            }
            StepInput::Activity(activity) => self.complete_activity(activity).await?,
            StepInput::Wallet(wallet) => self.complete_wallet(&profile, wallet).await?,
        }

        let next = step.next().unwrap_or(Step::Review);
        self.move_to(next).await?;
        tracing::info!(from = %step, to = %next, "Onboarding step completed");
        Ok(AdvanceOutcome {
            step: next,
            warnings,
        })
    }

    /// Go back one step without touching section data. Step 1 stays put.
    pub async fn retreat(&self) -> Result<Step, WizardError> {
        let profile = self.store.snapshot().await;
        ensure_open(&profile)?;

        let target = profile.current_step.prev().unwrap_or(Step::ClientType);
        self.move_to(target).await?;
        tracing::debug!(from = %profile.current_step, to = %target, "Stepped back");
        Ok(target)
    }

    /// Jump back to an earlier step, as the progress stepper does.
    pub async fn navigate_to(&self, requested: Step) -> Result<Step, WizardError> {
        let profile = self.store.snapshot().await;
        ensure_open(&profile)?;

        if !state::can_navigate_to(requested, profile.current_step) {
            return Err(WizardError::NavigationDenied {
                from: profile.current_step,
                to: requested,
            });
        }
        self.move_to(requested).await?;
        tracing::debug!(from = %profile.current_step, to = %requested, "Navigated back");
        Ok(requested)
    }

    /// The step to render for a deep link to `requested`.
    pub async fn resolve_view(&self, requested: Step) -> Step {
        let profile = self.store.snapshot().await;
        let resolved = state::resolve_view(requested, &profile);
        if resolved != requested {
            tracing::debug!(requested = %requested, "Step preconditions unmet, redirecting to start");
        }
        resolved
    }

    /// Hand the application off for review. Only valid at step 8.
    pub async fn submit(&self) -> Result<HandoffReceipt, WizardError> {
        let profile = self.store.snapshot().await;
        ensure_open(&profile)?;
        if profile.current_step != Step::Review {
            return Err(WizardError::NotAtReview);
        }

        let receipt = match self.handoff.submit(self.store.user_id(), &profile).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!("Application handoff failed: {}", e);
                return Err(e.into());
            }
        };

        self.store
            .merge_root(json!({
                "submitted": true,
                "submitted_at": Utc::now(),
                "application_id": receipt.application_id,
            }))
            .await?;
        self.bump_generation();
        tracing::info!(application_id = %receipt.application_id, "Application submitted");
        Ok(receipt)
    }

    /// Discard all progress.
    pub async fn reset(&self) -> OnboardingProfile {
        self.bump_generation();
        self.store.reset().await
    }

    pub async fn status(&self) -> OnboardingStatus {
        let profile = self.store.snapshot().await;
        OnboardingStatus {
            current_step: profile.current_step,
            label: profile.current_step.label(),
            step_count: STEP_COUNT,
            submitted: profile.submitted,
            application_id: profile.application_id.clone(),
            ownership_total: owners::total_ownership(&profile.ubo.owners),
            ownership: owners::ownership_status(&profile.ubo.owners),
            profile,
        }
    }

    // ── Owner list ──────────────────────────────────────────────────

    /// Append a blank owner. Entity applicants only.
    pub async fn add_owner(&self) -> Result<Uuid, WizardError> {
        let profile = self.store.snapshot().await;
        ensure_open(&profile)?;
        if profile.is_individual() {
            return Err(WizardError::OwnerListLocked);
        }

        let mut list = profile.ubo.owners;
        let id = owners::add_owner(&mut list);
        self.write_owners(&list).await?;
        tracing::debug!(owner_id = %id, count = list.len(), "Owner added");
        Ok(id)
    }

    /// Patch one owner. For individual applicants, identity and ownership
    /// fields in the patch are ignored.
    pub async fn update_owner(&self, id: Uuid, patch: OwnerPatch) -> Result<OwnerRecord, WizardError> {
        let profile = self.store.snapshot().await;
        ensure_open(&profile)?;
        find_owner(&profile, id)?;

        let patch = if profile.is_individual() {
            if patch.touches_identity() {
                tracing::debug!(owner_id = %id, "Ignoring identity fields for individual owner");
            }
            patch.without_identity()
        } else {
            patch
        };

        let list = owners::update_owner(&profile.ubo.owners, id, &patch);
        self.write_owners(&list).await?;
        list.into_iter()
            .find(|o| o.id == id)
            .ok_or_else(|| WizardError::OwnerNotFound(id.to_string()))
    }

    /// Remove an owner. The list never drops below one record.
    pub async fn remove_owner(&self, id: Uuid) -> Result<(), WizardError> {
        let profile = self.store.snapshot().await;
        ensure_open(&profile)?;
        if profile.is_individual() {
            return Err(WizardError::OwnerListLocked);
        }
        find_owner(&profile, id)?;
        if !owners::can_remove(&profile.ubo.owners) {
            return Err(WizardError::LastOwner);
        }

        let list = owners::remove_owner(&profile.ubo.owners, id);
        self.write_owners(&list).await?;
        tracing::debug!(owner_id = %id, count = list.len(), "Owner removed");
        Ok(())
    }

    // ── Collaborators ───────────────────────────────────────────────

    /// Screen a wallet address. Only available on the wallet step. A result
    /// that arrives after the wizard has moved on (or after a newer scan was
    /// requested) is dropped.
    pub async fn scan_wallet(&self, address: &str) -> Result<ScanResult, WizardError> {
        let profile = self.store.snapshot().await;
        ensure_open(&profile)?;
        if profile.current_step != Step::Wallet {
            return Err(WizardError::ScanNotAvailable);
        }

        let generation = self.bump_generation();
        let address = address.trim().to_string();
        let context = ScanContext {
            monthly_volume: profile.activity.monthly_volume,
            operating_countries: profile.activity.operating_countries.clone(),
        };

        let result = match self.screener.scan(&address, &context).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(%address, "Wallet scan failed: {}", e);
                return Err(e.into());
            }
        };

        if self.scan_generation.load(Ordering::SeqCst) != generation {
            tracing::info!(%address, "Discarding superseded wallet scan result");
            return Err(WizardError::ScanSuperseded);
        }

        self.store
            .merge_section(
                Section::Wallet,
                json!({
                    "address": address,
                    "scan_completed": true,
                    "scan_result": to_json(&result)?,
                }),
            )
            .await?;
        Ok(result)
    }

    /// Text an owner a link to the mobile verification flow.
    pub async fn send_verification_link(
        &self,
        owner_id: Uuid,
        phone: &str,
    ) -> Result<VerificationLink, WizardError> {
        let profile = self.store.snapshot().await;
        ensure_open(&profile)?;
        find_owner(&profile, owner_id)?;

        let session = self.verifier.start_session();
        let message = self.verifier.send_link(phone, &session).await?;
        Ok(VerificationLink { session, message })
    }

    /// Run identity verification for an owner. Success marks them verified;
    /// failure leaves the profile as it was.
    pub async fn verify_owner(&self, owner_id: Uuid) -> Result<VerificationResult, WizardError> {
        let profile = self.store.snapshot().await;
        ensure_open(&profile)?;
        let owner = find_owner(&profile, owner_id)?;

        let request = VerificationRequest {
            owner_id,
            owner_name: owner.display_name(),
        };
        let result = self.verifier.verify(&request).await?;

        self.patch_owner_flags(
            owner_id,
            OwnerPatch {
                verified: Some(true),
                ..Default::default()
            },
        )
        .await?;
        Ok(result)
    }

    /// Upload an ID document for an owner. Success marks `id_uploaded`.
    pub async fn upload_owner_document(
        &self,
        owner_id: Uuid,
        file_name: &str,
    ) -> Result<DocumentReceipt, WizardError> {
        let profile = self.store.snapshot().await;
        ensure_open(&profile)?;
        find_owner(&profile, owner_id)?;

        let receipt = self.verifier.upload_document(file_name).await?;
        self.patch_owner_flags(
            owner_id,
            OwnerPatch {
                id_uploaded: Some(true),
                ..Default::default()
            },
        )
        .await?;
        tracing::info!(%owner_id, document_id = %receipt.document_id, "Owner document uploaded");
        Ok(receipt)
    }

    // ── Step handlers ───────────────────────────────────────────────

    async fn complete_client_type(
        &self,
        profile: &OnboardingProfile,
        input: ClientTypeInput,
    ) -> Result<(), WizardError> {
        validators::validate_client_type(&input).map_err(WizardError::Validation)?;
        let Some(chosen) = input.client_type else {
            return Err(WizardError::Validation(FieldErrors::new()));
        };

        match profile.client_type {
            Some(existing) if existing != chosen => {
                Err(WizardError::ClientTypeLocked(existing.to_string()))
            }
            Some(_) => {
                self.store
                    .merge_root(json!({ "safe_disclaimer": input.safe_disclaimer }))
                    .await?;
                Ok(())
            }
            None => {
                self.store
                    .merge_root(json!({
                        "client_type": chosen,
                        "safe_disclaimer": input.safe_disclaimer,
                        "basics": to_json(&Basics::for_client_type(chosen))?,
                    }))
                    .await?;
                tracing::info!(client_type = %chosen, "Client type selected");
                Ok(())
            }
        }
    }

    async fn complete_eligibility(&self, input: EligibilityInput) -> Result<(), WizardError> {
        match validators::validate_eligibility(&input) {
            EligibilityDecision::Eligible => {
                self.store
                    .merge_section(
                        Section::Eligibility,
                        json!({ "completed": true, "none_of_above": true, "checked_items": [] }),
                    )
                    .await?;
                Ok(())
            }
            EligibilityDecision::Ineligible(categories) => {
                self.store
                    .merge_section(
                        Section::Eligibility,
                        json!({
                            "completed": false,
                            "none_of_above": false,
                            "checked_items": categories,
                        }),
                    )
                    .await?;
                tracing::warn!(?categories, "Applicant selected prohibited categories");
                Err(WizardError::Ineligible { categories })
            }
            EligibilityDecision::Incomplete(errors) => Err(WizardError::Validation(errors)),
        }
    }

    async fn complete_basics(
        &self,
        profile: &OnboardingProfile,
        mut basics: Basics,
    ) -> Result<(), WizardError> {
        if profile.client_type != Some(basics.client_type()) {
            let mut errors = FieldErrors::new();
            errors.insert("kind", "Details do not match the selected client type");
            return Err(WizardError::Validation(errors));
        }
        validators::validate_basics(&basics, Utc::now().date_naive())
            .map_err(WizardError::Validation)?;
        validators::normalize_basics(&mut basics);

        self.store
            .merge_section(Section::Basics, to_json(&basics)?)
            .await?;
        Ok(())
    }

    async fn complete_address(&self, address: AddressSection) -> Result<(), WizardError> {
        validators::validate_address(&address).map_err(WizardError::Validation)?;
        let mut patch = to_json(&address)?;
        // Toggling the separate physical address off clears the stored one.
        if let Value::Object(map) = &mut patch {
            map.entry("physical").or_insert(Value::Null);
        }
        self.store.merge_section(Section::Address, patch).await?;

        // Entering the ownership step: seed an individual's owner record
        // from their basics, once.
        let profile = self.store.snapshot().await;
        if let (true, Some(basics)) = (profile.is_individual(), profile.basics.as_individual()) {
            let mut list = profile.ubo.owners.clone();
            if let Some(owner) = list.first_mut() {
                if owners::prefill_from_basics(owner, basics) {
                    list.truncate(1);
                    self.write_owners(&list).await?;
                    tracing::debug!("Pre-filled individual owner from basics");
                }
            }
        }
        Ok(())
    }

    async fn complete_ownership(
        &self,
        profile: &OnboardingProfile,
        mut ubo: UboSection,
    ) -> Result<Option<String>, WizardError> {
        let client_type = profile.client_type.unwrap_or(ClientType::Entity);
        if client_type == ClientType::Individual {
            ubo.owners = profile.ubo.owners.clone();
        }
        validators::validate_ownership(&ubo, client_type).map_err(WizardError::Validation)?;

        self.store.merge_section(Section::Ubo, to_json(&ubo)?).await?;

        let warning = match owners::ownership_status(&ubo.owners) {
            OwnershipStatus::Under { remaining } => Some(format!(
                "Total ownership is {}%; {}% is unaccounted for",
                owners::total_ownership(&ubo.owners).normalize(),
                remaining.normalize()
            )),
            _ => None,
        };
        Ok(warning)
    }

    async fn complete_activity(&self, activity: ActivitySection) -> Result<(), WizardError> {
        validators::validate_activity(&activity).map_err(WizardError::Validation)?;

        let countries = validators::unacknowledged_high_risk(&activity);
        if !countries.is_empty() {
            return Err(WizardError::HighRiskUnacknowledged { countries });
        }

        self.store
            .merge_section(Section::Activity, to_json(&activity)?)
            .await?;
        Ok(())
    }

    async fn complete_wallet(
        &self,
        profile: &OnboardingProfile,
        input: WalletInput,
    ) -> Result<(), WizardError> {
        validators::validate_wallet(&input, profile.wallet.scan_result.as_ref())
            .map_err(WizardError::Validation)?;
        self.store
            .merge_section(Section::Wallet, json!({ "address": input.address.trim() }))
            .await?;
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────────

    async fn move_to(&self, step: Step) -> Result<(), WizardError> {
        self.store.merge_root(json!({ "current_step": step })).await?;
        self.bump_generation();
        Ok(())
    }

    async fn write_owners(&self, list: &[OwnerRecord]) -> Result<(), WizardError> {
        self.store
            .merge_section(Section::Ubo, json!({ "owners": to_json(&list)? }))
            .await?;
        Ok(())
    }

    /// Apply a status-flag patch to the freshest copy of an owner.
    async fn patch_owner_flags(&self, owner_id: Uuid, patch: OwnerPatch) -> Result<(), WizardError> {
        let profile = self.store.snapshot().await;
        find_owner(&profile, owner_id)?;
        let list = owners::update_owner(&profile.ubo.owners, owner_id, &patch);
        self.write_owners(&list).await
    }

    /// Start a new generation and return it.
    fn bump_generation(&self) -> u64 {
        self.scan_generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn ensure_open(profile: &OnboardingProfile) -> Result<(), WizardError> {
    if profile.submitted {
        Err(WizardError::AlreadySubmitted)
    } else {
        Ok(())
    }
}

fn find_owner(profile: &OnboardingProfile, id: Uuid) -> Result<&OwnerRecord, WizardError> {
    profile
        .ubo
        .owners
        .iter()
        .find(|o| o.id == id)
        .ok_or_else(|| WizardError::OwnerNotFound(id.to_string()))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value, WizardError> {
    serde_json::to_value(value)
        .map_err(|e| WizardError::Store(DatabaseError::Serialization(e.to_string())))
}
