//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::CatalogError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), CatalogError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new registry schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating registry schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    } else {
        info!("Registry schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, CatalogError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| {
        CatalogError::Internal(format!("Failed to create schema_version table: {}", e))
    })?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), CatalogError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| CatalogError::Internal(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| CatalogError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &Connection) -> Result<(), CatalogError> {
    conn.execute_batch(REGISTRY_SCHEMA)
        .map_err(|e| CatalogError::Internal(format!("Failed to create registry tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| CatalogError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), CatalogError> {
    // Add migration steps here as schema evolves
    match from_version {
        _ => {}
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Business registry schema
const REGISTRY_SCHEMA: &str = r#"
-- Normalized business records; source of truth for business attributes.
-- root_category/subcategory are plain strings, not foreign keys: the
-- taxonomy documents live in a different store entirely.
CREATE TABLE IF NOT EXISTS businesses (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    description TEXT,

    -- Contact
    email TEXT,
    phone TEXT,
    address TEXT,
    website TEXT,

    -- Payment: method plus method-specific fields
    payment_method TEXT NOT NULL DEFAULT 'platform-processor',
    merchant_id TEXT,
    bank_name TEXT,
    account_holder TEXT,
    account_number TEXT,

    status TEXT NOT NULL DEFAULT 'active',

    -- Category assignment (may both be NULL: uncategorized)
    root_category TEXT,
    subcategory TEXT,

    logo TEXT,

    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Attached file URLs stored separately
CREATE TABLE IF NOT EXISTS business_files (
    business_id TEXT NOT NULL,
    url TEXT NOT NULL,
    PRIMARY KEY (business_id, url),
    FOREIGN KEY (business_id) REFERENCES businesses(id) ON DELETE CASCADE
);
"#;

/// Index schema
const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_businesses_root ON businesses(root_category);
CREATE INDEX IF NOT EXISTS idx_businesses_root_sub ON businesses(root_category, subcategory);
CREATE INDEX IF NOT EXISTS idx_businesses_status ON businesses(status);
"#;
