//! SQLite database module for the business registry
//!
//! The registry is the source of truth for business attributes. Businesses
//! are normalized rows; their category assignment is a pair of plain string
//! fields (`root_category`, `subcategory`) that the storage layer does not
//! enforce as foreign keys — referential integrity against the taxonomy
//! documents is the synchronization engine's responsibility.
//!
//! ## Tables
//!
//! - `businesses` - one row per business (attributes, payment fields, status,
//!   category assignment)
//! - `business_files` - attached file URLs, one row per attachment

pub mod businesses;
pub mod schema;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::CatalogError;

/// SQLite database for business records
pub struct RegistryDb {
    conn: Mutex<Connection>,
}

impl RegistryDb {
    /// Open or create the registry database
    pub fn open(data_dir: &Path) -> Result<Self, CatalogError> {
        let db_path = data_dir.join("registry.db");
        info!("Opening SQLite registry at {:?}", db_path);

        let conn = Connection::open(&db_path)
            .map_err(|e| CatalogError::Internal(format!("Failed to open SQLite: {}", e)))?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| CatalogError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        debug!("Opening in-memory SQLite registry");

        let conn = Connection::open_in_memory()
            .map_err(|e| CatalogError::Internal(format!("Failed to open in-memory SQLite: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), CatalogError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CatalogError::Internal(format!("Lock poisoned: {}", e)))?;

        schema::init_schema(&conn)?;

        Ok(())
    }

    /// Run a read operation against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, CatalogError>
    where
        F: FnOnce(&Connection) -> Result<T, CatalogError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CatalogError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, CatalogError>
    where
        F: FnOnce(&mut Connection) -> Result<T, CatalogError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| CatalogError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get registry statistics
    pub fn stats(&self) -> Result<RegistryStats, CatalogError> {
        self.with_conn(|conn| {
            let total: i64 = conn
                .query_row("SELECT COUNT(*) FROM businesses", [], |row| row.get(0))
                .map_err(|e| CatalogError::Internal(format!("Query failed: {}", e)))?;

            let active: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM businesses WHERE status = 'active'",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| CatalogError::Internal(format!("Query failed: {}", e)))?;

            let uncategorized: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM businesses WHERE root_category IS NULL",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| CatalogError::Internal(format!("Query failed: {}", e)))?;

            Ok(RegistryStats {
                total: total as u64,
                active: active as u64,
                uncategorized: uncategorized as u64,
            })
        })
    }
}

/// Registry statistics
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub total: u64,
    pub active: u64,
    pub uncategorized: u64,
}
