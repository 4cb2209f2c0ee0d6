//! Profile Store: the single owned copy of the onboarding profile.
//!
//! All mutation goes through `merge_section` / `merge_root`, which shallow
//! merge a JSON patch and then write the whole profile back to the settings
//! slot. Reads of a missing or corrupt slot fall back to the default profile.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::DatabaseError;
use crate::store::Database;

use super::model::{OnboardingProfile, settings_keys};

/// A named section of the profile that can be merged into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Eligibility,
    Basics,
    Address,
    Ubo,
    Activity,
    Wallet,
}

impl Section {
    /// The section's field name in the serialized profile.
    pub fn key(self) -> &'static str {
        match self {
            Self::Eligibility => "eligibility",
            Self::Basics => "basics",
            Self::Address => "address",
            Self::Ubo => "ubo",
            Self::Activity => "activity",
            Self::Wallet => "wallet",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

pub struct ProfileStore {
    db: Arc<dyn Database>,
    user_id: String,
    profile: RwLock<OnboardingProfile>,
}

impl ProfileStore {
    /// Create a store for `user_id` and load whatever the slot holds.
    pub async fn open(db: Arc<dyn Database>, user_id: impl Into<String>) -> Self {
        let store = Self {
            db,
            user_id: user_id.into(),
            profile: RwLock::new(OnboardingProfile::default()),
        };
        store.load().await;
        store
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn db(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// Re-read the persisted profile, replacing the in-memory copy.
    ///
    /// Never fails: an unreadable slot yields the default profile.
    pub async fn load(&self) -> OnboardingProfile {
        let loaded = match self
            .db
            .get_setting(&self.user_id, settings_keys::ONBOARDING_PROFILE)
            .await
        {
            Ok(Some(value)) => match serde_json::from_value::<OnboardingProfile>(value) {
                Ok(profile) => profile,
                Err(e) => {
                    tracing::warn!(user_id = %self.user_id, "Stored onboarding profile is corrupt, starting fresh: {}", e);
                    OnboardingProfile::default()
                }
            },
            Ok(None) => OnboardingProfile::default(),
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, "Failed to read onboarding profile: {}", e);
                OnboardingProfile::default()
            }
        };

        let mut profile = self.profile.write().await;
        *profile = loaded.clone();
        loaded
    }

    /// Copy of the current profile.
    pub async fn snapshot(&self) -> OnboardingProfile {
        self.profile.read().await.clone()
    }

    /// Shallow-merge `patch` into one section. Keys absent from the patch
    /// keep their current values. Does not validate.
    pub async fn merge_section(&self, section: Section, patch: Value) -> Result<(), DatabaseError> {
        let Value::Object(fields) = patch else {
            return Err(DatabaseError::Serialization(format!(
                "patch for section '{section}' must be a JSON object"
            )));
        };

        let merged = {
            let mut profile = self.profile.write().await;
            let mut root = to_object(&profile)?;
            let target = root
                .get_mut(section.key())
                .and_then(Value::as_object_mut)
                .ok_or_else(|| {
                    DatabaseError::Serialization(format!("section '{section}' is not an object"))
                })?;
            for (key, value) in fields {
                target.insert(key, value);
            }
            let next: OnboardingProfile = serde_json::from_value(Value::Object(root))
                .map_err(|e| DatabaseError::Serialization(format!("merge into {section}: {e}")))?;
            *profile = next.clone();
            next
        };

        tracing::debug!(user_id = %self.user_id, section = %section, "Merged profile section");
        self.persist(&merged).await;
        Ok(())
    }

    /// Shallow-merge `patch` into the profile root (`current_step`,
    /// `client_type`, whole-section replacement, ...).
    pub async fn merge_root(&self, patch: Value) -> Result<(), DatabaseError> {
        let Value::Object(fields) = patch else {
            return Err(DatabaseError::Serialization(
                "root patch must be a JSON object".to_string(),
            ));
        };

        let merged = {
            let mut profile = self.profile.write().await;
            let mut root = to_object(&profile)?;
            for (key, value) in fields {
                root.insert(key, value);
            }
            let next: OnboardingProfile = serde_json::from_value(Value::Object(root))
                .map_err(|e| DatabaseError::Serialization(format!("merge into root: {e}")))?;
            *profile = next.clone();
            next
        };

        tracing::debug!(user_id = %self.user_id, step = %merged.current_step, "Merged profile root");
        self.persist(&merged).await;
        Ok(())
    }

    /// Discard the profile and clear the persisted slot.
    pub async fn reset(&self) -> OnboardingProfile {
        {
            let mut profile = self.profile.write().await;
            *profile = OnboardingProfile::default();
        }
        if let Err(e) = self
            .db
            .delete_setting(&self.user_id, settings_keys::ONBOARDING_PROFILE)
            .await
        {
            tracing::warn!(user_id = %self.user_id, "Failed to clear onboarding profile: {}", e);
        }
        tracing::info!(user_id = %self.user_id, "Onboarding profile reset");
        OnboardingProfile::default()
    }

    /// Write the profile to the settings slot. Failures are logged and the
    /// in-memory copy stays authoritative.
    async fn persist(&self, profile: &OnboardingProfile) {
        let value = match serde_json::to_value(profile) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Failed to serialize onboarding profile: {}", e);
                return;
            }
        };
        if let Err(e) = self
            .db
            .set_setting(&self.user_id, settings_keys::ONBOARDING_PROFILE, &value)
            .await
        {
            tracing::warn!(user_id = %self.user_id, "Failed to persist onboarding profile: {}", e);
        }
    }
}

fn to_object(profile: &OnboardingProfile) -> Result<Map<String, Value>, DatabaseError> {
    match serde_json::to_value(profile) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DatabaseError::Serialization(
            "profile did not serialize to an object".to_string(),
        )),
        Err(e) => Err(DatabaseError::Serialization(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::onboarding::model::{ClientType, settings_keys::DEFAULT_USER};
    use crate::onboarding::state::Step;
    use crate::store::LibSqlBackend;

    async fn test_db() -> Arc<dyn Database> {
        Arc::new(LibSqlBackend::new_memory().await.unwrap())
    }

    #[tokio::test]
    async fn empty_slot_loads_default() {
        let store = ProfileStore::open(test_db().await, DEFAULT_USER).await;
        assert_eq!(store.snapshot().await, OnboardingProfile::default());
    }

    #[tokio::test]
    async fn merge_section_preserves_unspecified_fields() {
        let store = ProfileStore::open(test_db().await, DEFAULT_USER).await;
        store
            .merge_section(Section::Address, json!({"primary": {"country": "US", "city": "Austin"}}))
            .await
            .unwrap();
        store
            .merge_section(Section::Address, json!({"has_separate_physical": true}))
            .await
            .unwrap();

        let profile = store.snapshot().await;
        assert_eq!(profile.address.primary.city, "Austin");
        assert!(profile.address.has_separate_physical);
    }

    #[tokio::test]
    async fn last_merge_wins_within_a_section() {
        let store = ProfileStore::open(test_db().await, DEFAULT_USER).await;
        store
            .merge_section(Section::Wallet, json!({"address": "first"}))
            .await
            .unwrap();
        store
            .merge_section(Section::Wallet, json!({"address": "second"}))
            .await
            .unwrap();
        assert_eq!(store.snapshot().await.wallet.address, "second");
    }

    #[tokio::test]
    async fn merges_survive_reopen() {
        let db = test_db().await;
        let store = ProfileStore::open(db.clone(), DEFAULT_USER).await;
        store
            .merge_root(json!({"client_type": "entity", "current_step": 2}))
            .await
            .unwrap();

        let reopened = ProfileStore::open(db, DEFAULT_USER).await;
        let profile = reopened.snapshot().await;
        assert_eq!(profile.client_type, Some(ClientType::Entity));
        assert_eq!(profile.current_step, Step::Eligibility);
    }

    #[tokio::test]
    async fn non_object_patch_is_rejected_without_change() {
        let store = ProfileStore::open(test_db().await, DEFAULT_USER).await;
        let err = store
            .merge_section(Section::Activity, json!(["not", "an", "object"]))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Serialization(_)));
        assert_eq!(store.snapshot().await, OnboardingProfile::default());
    }

    #[tokio::test]
    async fn ill_typed_patch_leaves_profile_unchanged() {
        let store = ProfileStore::open(test_db().await, DEFAULT_USER).await;
        let err = store.merge_root(json!({"current_step": 12})).await;
        assert!(err.is_err());
        assert_eq!(store.snapshot().await.current_step, Step::ClientType);
    }

    #[tokio::test]
    async fn corrupt_slot_falls_back_to_default() {
        let db = test_db().await;
        db.set_setting(
            DEFAULT_USER,
            settings_keys::ONBOARDING_PROFILE,
            &json!({"current_step": 42, "client_type": "alien"}),
        )
        .await
        .unwrap();

        let store = ProfileStore::open(db, DEFAULT_USER).await;
        assert_eq!(store.snapshot().await, OnboardingProfile::default());
    }

    #[tokio::test]
    async fn blank_percentage_does_not_discard_profile() {
        let db = test_db().await;
        db.set_setting(
            DEFAULT_USER,
            settings_keys::ONBOARDING_PROFILE,
            &json!({
                "current_step": 5,
                "client_type": "entity",
                "ubo": {"owners": [
                    {"id": "00000000-0000-0000-0000-000000000001", "first_name": "Ann", "ownership_percentage": null},
                    {"id": "00000000-0000-0000-0000-000000000002", "ownership_percentage": ""}
                ]}
            }),
        )
        .await
        .unwrap();

        let profile = ProfileStore::open(db, DEFAULT_USER).await.snapshot().await;
        assert_eq!(profile.current_step, Step::Ownership);
        assert_eq!(profile.client_type, Some(ClientType::Entity));
        assert_eq!(profile.ubo.owners.len(), 2);
        assert_eq!(profile.ubo.owners[0].first_name, "Ann");
        assert!(profile.ubo.owners.iter().all(|o| o.ownership_percentage.is_zero()));
    }

    #[tokio::test]
    async fn reset_then_load_is_default() {
        let db = test_db().await;
        let store = ProfileStore::open(db.clone(), DEFAULT_USER).await;
        store
            .merge_root(json!({"client_type": "individual", "current_step": 5}))
            .await
            .unwrap();

        store.reset().await;
        let loaded = store.load().await;
        assert_eq!(loaded, OnboardingProfile::default());
        assert!(
            db.get_setting(DEFAULT_USER, settings_keys::ONBOARDING_PROFILE)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn users_have_separate_slots() {
        let db = test_db().await;
        let alice = ProfileStore::open(db.clone(), "alice").await;
        alice.merge_root(json!({"current_step": 3})).await.unwrap();

        let bob = ProfileStore::open(db, "bob").await;
        assert_eq!(bob.snapshot().await.current_step, Step::ClientType);
    }
}
