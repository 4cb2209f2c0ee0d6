//! Persistence layer: libSQL-backed settings slot and applications ledger.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, StoredApplication};
