//! `Database` trait: the async persistence interface the wizard talks to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;

/// A submitted application as recorded in the handoff ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredApplication {
    pub application_id: String,
    pub user_id: String,
    pub client_type: String,
    /// The formatted application record.
    pub payload: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
}

/// Backend-agnostic database trait covering the settings slot and the
/// applications ledger.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    /// Get a setting value by user and key.
    async fn get_setting(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError>;

    /// Insert or replace a setting.
    async fn set_setting(
        &self,
        user_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError>;

    /// Delete a setting. Returns whether a row was removed.
    async fn delete_setting(&self, user_id: &str, key: &str) -> Result<bool, DatabaseError>;

    // ── Applications ────────────────────────────────────────────────

    /// Record a submitted application. Ids are unique.
    async fn insert_application(&self, app: &StoredApplication) -> Result<(), DatabaseError>;

    /// Look up an application by id.
    async fn get_application(
        &self,
        application_id: &str,
    ) -> Result<Option<StoredApplication>, DatabaseError>;

    /// Applications submitted by a user, newest first.
    async fn list_applications(
        &self,
        user_id: &str,
    ) -> Result<Vec<StoredApplication>, DatabaseError>;
}
