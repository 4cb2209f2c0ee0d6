//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Database, StoredApplication};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::Pool(format!("Failed to create database directory: {e}"))
                })?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

const APPLICATION_COLUMNS: &str = "application_id, user_id, client_type, payload, submitted_at";

/// Map a libsql Row to a StoredApplication.
///
/// Column order matches APPLICATION_COLUMNS.
fn row_to_application(row: &libsql::Row) -> Result<StoredApplication, libsql::Error> {
    let application_id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let client_type: String = row.get(2)?;
    let payload_str: String = row.get(3)?;
    let submitted_str: String = row.get(4)?;

    Ok(StoredApplication {
        application_id,
        user_id,
        client_type,
        payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null),
        submitted_at: parse_datetime(&submitted_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Settings ────────────────────────────────────────────────────

    async fn get_setting(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT value FROM settings WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_setting: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value_str: String = row.get(0).unwrap_or_else(|_| "null".to_string());
                let value: serde_json::Value =
                    serde_json::from_str(&value_str).unwrap_or(serde_json::Value::Null);
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_setting: {e}"))),
        }
    }

    async fn set_setting(
        &self,
        user_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let value_str = serde_json::to_string(value)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO settings (user_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id, key) DO UPDATE SET value = ?3, updated_at = ?4",
            params![user_id, key, value_str, now],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("set_setting: {e}")))?;

        Ok(())
    }

    async fn delete_setting(&self, user_id: &str, key: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let count = conn
            .execute(
                "DELETE FROM settings WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_setting: {e}")))?;
        Ok(count > 0)
    }

    // ── Applications ────────────────────────────────────────────────

    async fn insert_application(&self, app: &StoredApplication) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let payload = serde_json::to_string(&app.payload)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO applications (application_id, user_id, client_type, payload, submitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                app.application_id.as_str(),
                app.user_id.as_str(),
                app.client_type.as_str(),
                payload,
                app.submitted_at.to_rfc3339()
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_application: {e}")))?;

        Ok(())
    }

    async fn get_application(
        &self,
        application_id: &str,
    ) -> Result<Option<StoredApplication>, DatabaseError> {
        let conn = self.conn();
        let sql = format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE application_id = ?1");
        let mut rows = conn
            .query(&sql, params![application_id])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_application: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let app = row_to_application(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_application row: {e}")))?;
                Ok(Some(app))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_application: {e}"))),
        }
    }

    async fn list_applications(
        &self,
        user_id: &str,
    ) -> Result<Vec<StoredApplication>, DatabaseError> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE user_id = ?1
             ORDER BY submitted_at DESC"
        );
        let mut rows = conn
            .query(&sql, params![user_id])
            .await
            .map_err(|e| DatabaseError::Query(format!("list_applications: {e}")))?;

        let mut apps = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_applications: {e}")))?
        {
            apps.push(
                row_to_application(&row)
                    .map_err(|e| DatabaseError::Query(format!("list_applications row: {e}")))?,
            );
        }
        Ok(apps)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_application(id: &str, user: &str, submitted_at: DateTime<Utc>) -> StoredApplication {
        StoredApplication {
            application_id: id.to_string(),
            user_id: user.to_string(),
            client_type: "entity".to_string(),
            payload: serde_json::json!({"applicant": {"legal_name": "Acme Holdings LLC"}}),
            submitted_at,
        }
    }

    // ── Settings tests ──────────────────────────────────────────────

    #[tokio::test]
    async fn settings_crud() {
        let db = test_db().await;
        let value = serde_json::json!({"current_step": 3, "client_type": "entity"});

        db.set_setting("user1", "onboarding_profile", &value)
            .await
            .unwrap();

        let fetched = db
            .get_setting("user1", "onboarding_profile")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched["current_step"], 3);
        assert_eq!(fetched["client_type"], "entity");

        // Upsert
        let updated = serde_json::json!({"current_step": 4});
        db.set_setting("user1", "onboarding_profile", &updated)
            .await
            .unwrap();
        let fetched2 = db
            .get_setting("user1", "onboarding_profile")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched2["current_step"], 4);

        let deleted = db.delete_setting("user1", "onboarding_profile").await.unwrap();
        assert!(deleted);
        let gone = db.get_setting("user1", "onboarding_profile").await.unwrap();
        assert!(gone.is_none());

        let again = db.delete_setting("user1", "onboarding_profile").await.unwrap();
        assert!(!again);
    }

    #[tokio::test]
    async fn settings_user_isolation() {
        let db = test_db().await;

        db.set_setting("user1", "key", &serde_json::json!("val1"))
            .await
            .unwrap();
        db.set_setting("user2", "key", &serde_json::json!("val2"))
            .await
            .unwrap();

        let v1 = db.get_setting("user1", "key").await.unwrap().unwrap();
        let v2 = db.get_setting("user2", "key").await.unwrap().unwrap();
        assert_eq!(v1, "val1");
        assert_eq!(v2, "val2");
    }

    #[tokio::test]
    async fn corrupt_setting_reads_as_null() {
        let db = test_db().await;
        db.conn()
            .execute(
                "INSERT INTO settings (user_id, key, value) VALUES ('u', 'k', '{not json')",
                (),
            )
            .await
            .unwrap();
        let value = db.get_setting("u", "k").await.unwrap().unwrap();
        assert!(value.is_null());
    }

    // ── Application tests ───────────────────────────────────────────

    #[tokio::test]
    async fn insert_and_get_application() {
        let db = test_db().await;
        let app = make_application("ARQ-ABC-123456", "default", Utc::now());
        db.insert_application(&app).await.unwrap();

        let fetched = db.get_application("ARQ-ABC-123456").await.unwrap().unwrap();
        assert_eq!(fetched.user_id, "default");
        assert_eq!(fetched.client_type, "entity");
        assert_eq!(fetched.payload["applicant"]["legal_name"], "Acme Holdings LLC");

        assert!(db.get_application("ARQ-NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_application_id_is_rejected() {
        let db = test_db().await;
        let app = make_application("ARQ-DUP", "default", Utc::now());
        db.insert_application(&app).await.unwrap();
        let err = db.insert_application(&app).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Query(_)));
    }

    #[tokio::test]
    async fn list_applications_newest_first() {
        let db = test_db().await;
        let now = Utc::now();
        db.insert_application(&make_application("A1", "alice", now - Duration::hours(2)))
            .await
            .unwrap();
        db.insert_application(&make_application("A2", "alice", now))
            .await
            .unwrap();
        db.insert_application(&make_application("B1", "bob", now))
            .await
            .unwrap();

        let apps = db.list_applications("alice").await.unwrap();
        let ids: Vec<_> = apps.iter().map(|a| a.application_id.as_str()).collect();
        assert_eq!(ids, vec!["A2", "A1"]);
    }
}
