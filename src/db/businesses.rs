//! Business CRUD operations

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::CatalogError;

/// Payment handled by the platform's processor; requires a merchant id.
pub const PAYMENT_PLATFORM: &str = "platform-processor";
/// Payment by direct bank transfer; requires full bank details.
pub const PAYMENT_BANK: &str = "bank-transfer";
/// The closed set of payment methods
pub const PAYMENT_METHODS: [&str; 2] = [PAYMENT_PLATFORM, PAYMENT_BANK];

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_INACTIVE: &str = "inactive";
/// The closed set of statuses; there is no state machine beyond this toggle
pub const STATUSES: [&str; 2] = [STATUS_ACTIVE, STATUS_INACTIVE];

/// Business row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub payment_method: String,
    pub merchant_id: Option<String>,
    pub bank_name: Option<String>,
    pub account_holder: Option<String>,
    pub account_number: Option<String>,
    pub status: String,
    pub root_category: Option<String>,
    pub subcategory: Option<String>,
    pub logo: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub files: Vec<String>,
}

impl BusinessRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            email: row.get("email")?,
            phone: row.get("phone")?,
            address: row.get("address")?,
            website: row.get("website")?,
            payment_method: row.get("payment_method")?,
            merchant_id: row.get("merchant_id")?,
            bank_name: row.get("bank_name")?,
            account_holder: row.get("account_holder")?,
            account_number: row.get("account_number")?,
            status: row.get("status")?,
            root_category: row.get("root_category")?,
            subcategory: row.get("subcategory")?,
            logo: row.get("logo")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            files: vec![], // Loaded separately
        })
    }

    /// The (root, sub) pair when the business is fully categorized
    pub fn category_pair(&self) -> Option<(&str, &str)> {
        match (self.root_category.as_deref(), self.subcategory.as_deref()) {
            (Some(root), Some(sub)) => Some((root, sub)),
            _ => None,
        }
    }
}

/// Input for creating a business
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBusinessInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub account_holder: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub root_category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

fn default_payment_method() -> String {
    PAYMENT_PLATFORM.to_string()
}
fn default_status() -> String {
    STATUS_ACTIVE.to_string()
}

/// Field-level patch for a business. `None` fields are left unchanged;
/// category assignment has its own operation because it triggers a leaf move.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BusinessPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub account_holder: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    /// Replaces the whole attachment list when present
    #[serde(default)]
    pub files: Option<Vec<String>>,
}

/// Query parameters for listing businesses - camelCase for URL params
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub root_category: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl Default for BusinessQuery {
    fn default() -> Self {
        Self {
            status: None,
            root_category: None,
            search: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

fn default_limit() -> u32 {
    100
}

/// Get a business by ID
pub fn get_business(conn: &Connection, id: &str) -> Result<Option<BusinessRow>, CatalogError> {
    let mut stmt = conn
        .prepare("SELECT * FROM businesses WHERE id = ?")
        .map_err(|e| CatalogError::Internal(format!("Prepare failed: {}", e)))?;

    let mut rows = stmt
        .query(params![id])
        .map_err(|e| CatalogError::Internal(format!("Query failed: {}", e)))?;

    if let Some(row) = rows
        .next()
        .map_err(|e| CatalogError::Internal(format!("Row fetch failed: {}", e)))?
    {
        let mut business = BusinessRow::from_row(row)
            .map_err(|e| CatalogError::Internal(format!("Row parse failed: {}", e)))?;

        business.files = get_files(conn, id)?;

        Ok(Some(business))
    } else {
        Ok(None)
    }
}

/// Get attached file URLs for a business
fn get_files(conn: &Connection, business_id: &str) -> Result<Vec<String>, CatalogError> {
    let mut stmt = conn
        .prepare("SELECT url FROM business_files WHERE business_id = ? ORDER BY url")
        .map_err(|e| CatalogError::Internal(format!("Prepare failed: {}", e)))?;

    let files: Vec<String> = stmt
        .query_map(params![business_id], |row| row.get(0))
        .map_err(|e| CatalogError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CatalogError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(files)
}

/// List businesses with optional filters
pub fn list_businesses(
    conn: &Connection,
    query: &BusinessQuery,
) -> Result<Vec<BusinessRow>, CatalogError> {
    let mut sql = String::from("SELECT * FROM businesses");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];
    let mut conditions = vec![];

    if let Some(ref status) = query.status {
        conditions.push("status = ?".to_string());
        params.push(Box::new(status.clone()));
    }

    if let Some(ref root) = query.root_category {
        conditions.push("root_category = ?".to_string());
        params.push(Box::new(root.clone()));
    }

    if let Some(ref search) = query.search {
        conditions.push("(name LIKE ? OR description LIKE ?)".to_string());
        let pattern = format!("%{}%", search);
        params.push(Box::new(pattern.clone()));
        params.push(Box::new(pattern));
    }

    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    sql.push_str(" ORDER BY name, id LIMIT ? OFFSET ?");
    params.push(Box::new(query.limit as i64));
    params.push(Box::new(query.offset as i64));

    debug!("Executing query: {}", sql);

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| CatalogError::Internal(format!("Prepare failed: {}", e)))?;

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let rows = stmt
        .query_map(param_refs.as_slice(), |row| BusinessRow::from_row(row))
        .map_err(|e| CatalogError::Internal(format!("Query failed: {}", e)))?;

    let mut results = vec![];
    for row_result in rows {
        let mut business = row_result
            .map_err(|e| CatalogError::Internal(format!("Row parse failed: {}", e)))?;
        business.files = get_files(conn, &business.id)?;
        results.push(business);
    }

    Ok(results)
}

/// List businesses assigned to a root category, optionally restricted to one
/// subcategory. Ordered by (name, id) so callers see a stable listing.
pub fn list_by_category(
    conn: &Connection,
    root_id: &str,
    sub_id: Option<&str>,
) -> Result<Vec<BusinessRow>, CatalogError> {
    let mut sql = String::from("SELECT * FROM businesses WHERE root_category = ?");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(root_id.to_string())];

    if let Some(sub) = sub_id {
        sql.push_str(" AND subcategory = ?");
        params.push(Box::new(sub.to_string()));
    }

    sql.push_str(" ORDER BY name, id");

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| CatalogError::Internal(format!("Prepare failed: {}", e)))?;

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let rows = stmt
        .query_map(param_refs.as_slice(), |row| BusinessRow::from_row(row))
        .map_err(|e| CatalogError::Internal(format!("Query failed: {}", e)))?;

    let mut results = vec![];
    for row_result in rows {
        let mut business = row_result
            .map_err(|e| CatalogError::Internal(format!("Row parse failed: {}", e)))?;
        business.files = get_files(conn, &business.id)?;
        results.push(business);
    }

    Ok(results)
}

/// Create a business with a store-assigned id
pub fn create_business(
    conn: &mut Connection,
    input: CreateBusinessInput,
) -> Result<BusinessRow, CatalogError> {
    let id = Uuid::new_v4().to_string();

    let tx = conn
        .transaction()
        .map_err(|e| CatalogError::Internal(format!("Transaction failed: {}", e)))?;

    tx.execute(
        r#"
        INSERT INTO businesses (
            id, name, description, email, phone, address, website,
            payment_method, merchant_id, bank_name, account_holder, account_number,
            status, root_category, subcategory, logo
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            input.name,
            input.description,
            input.email,
            input.phone,
            input.address,
            input.website,
            input.payment_method,
            input.merchant_id,
            input.bank_name,
            input.account_holder,
            input.account_number,
            input.status,
            input.root_category,
            input.subcategory,
            input.logo,
        ],
    )
    .map_err(|e| CatalogError::Internal(format!("Insert failed: {}", e)))?;

    for url in &input.files {
        tx.execute(
            "INSERT OR IGNORE INTO business_files (business_id, url) VALUES (?, ?)",
            params![id, url],
        )
        .map_err(|e| CatalogError::Internal(format!("File insert failed: {}", e)))?;
    }

    tx.commit()
        .map_err(|e| CatalogError::Internal(format!("Commit failed: {}", e)))?;

    get_business(conn, &id)?
        .ok_or_else(|| CatalogError::Internal("Business not found after insert".to_string()))
}

/// Apply a field-level patch to a business
pub fn update_business(
    conn: &mut Connection,
    id: &str,
    patch: &BusinessPatch,
) -> Result<BusinessRow, CatalogError> {
    let tx = conn
        .transaction()
        .map_err(|e| CatalogError::Internal(format!("Transaction failed: {}", e)))?;

    let mut sets = vec!["updated_at = datetime('now')".to_string()];
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

    macro_rules! set_field {
        ($field:ident) => {
            if let Some(ref value) = patch.$field {
                sets.push(format!("{} = ?", stringify!($field)));
                params.push(Box::new(value.clone()));
            }
        };
    }

    set_field!(name);
    set_field!(description);
    set_field!(email);
    set_field!(phone);
    set_field!(address);
    set_field!(website);
    set_field!(payment_method);
    set_field!(merchant_id);
    set_field!(bank_name);
    set_field!(account_holder);
    set_field!(account_number);
    set_field!(status);
    set_field!(logo);

    let sql = format!("UPDATE businesses SET {} WHERE id = ?", sets.join(", "));
    params.push(Box::new(id.to_string()));

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let changes = tx
        .execute(&sql, param_refs.as_slice())
        .map_err(|e| CatalogError::Internal(format!("Update failed: {}", e)))?;

    if changes == 0 {
        return Err(CatalogError::NotFound(format!("business '{}'", id)));
    }

    if let Some(ref files) = patch.files {
        tx.execute(
            "DELETE FROM business_files WHERE business_id = ?",
            params![id],
        )
        .map_err(|e| CatalogError::Internal(format!("File delete failed: {}", e)))?;
        for url in files {
            tx.execute(
                "INSERT OR IGNORE INTO business_files (business_id, url) VALUES (?, ?)",
                params![id, url],
            )
            .map_err(|e| CatalogError::Internal(format!("File insert failed: {}", e)))?;
        }
    }

    tx.commit()
        .map_err(|e| CatalogError::Internal(format!("Commit failed: {}", e)))?;

    get_business(conn, id)?
        .ok_or_else(|| CatalogError::Internal("Business not found after update".to_string()))
}

/// Set a business's category assignment. Either field may be NULL; an
/// uncategorized business has both cleared.
pub fn set_business_category(
    conn: &Connection,
    id: &str,
    root_id: Option<&str>,
    sub_id: Option<&str>,
) -> Result<BusinessRow, CatalogError> {
    let changes = conn
        .execute(
            "UPDATE businesses SET root_category = ?, subcategory = ?, updated_at = datetime('now') WHERE id = ?",
            params![root_id, sub_id, id],
        )
        .map_err(|e| CatalogError::Internal(format!("Update failed: {}", e)))?;

    if changes == 0 {
        return Err(CatalogError::NotFound(format!("business '{}'", id)));
    }

    get_business(conn, id)?
        .ok_or_else(|| CatalogError::Internal("Business not found after update".to_string()))
}

/// Delete a business and its attachments
pub fn delete_business(conn: &mut Connection, id: &str) -> Result<bool, CatalogError> {
    let tx = conn
        .transaction()
        .map_err(|e| CatalogError::Internal(format!("Transaction failed: {}", e)))?;

    tx.execute(
        "DELETE FROM business_files WHERE business_id = ?",
        params![id],
    )
    .map_err(|e| CatalogError::Internal(format!("File delete failed: {}", e)))?;

    let changes = tx
        .execute("DELETE FROM businesses WHERE id = ?", params![id])
        .map_err(|e| CatalogError::Internal(format!("Delete failed: {}", e)))?;

    tx.commit()
        .map_err(|e| CatalogError::Internal(format!("Commit failed: {}", e)))?;

    Ok(changes > 0)
}

/// Clear both category fields of every business assigned to a root.
/// Returns the number of businesses touched.
pub fn clear_category_for_root(conn: &Connection, root_id: &str) -> Result<u64, CatalogError> {
    let changes = conn
        .execute(
            "UPDATE businesses SET root_category = NULL, subcategory = NULL, updated_at = datetime('now') WHERE root_category = ?",
            params![root_id],
        )
        .map_err(|e| CatalogError::Internal(format!("Update failed: {}", e)))?;

    Ok(changes as u64)
}

/// Clear only the subcategory field of every business assigned to a
/// (root, sub) pair; the root assignment is retained. Returns the number of
/// businesses touched.
pub fn clear_subcategory(
    conn: &Connection,
    root_id: &str,
    sub_id: &str,
) -> Result<u64, CatalogError> {
    let changes = conn
        .execute(
            "UPDATE businesses SET subcategory = NULL, updated_at = datetime('now') WHERE root_category = ? AND subcategory = ?",
            params![root_id, sub_id],
        )
        .map_err(|e| CatalogError::Internal(format!("Update failed: {}", e)))?;

    Ok(changes as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RegistryDb;

    fn sample_input(name: &str) -> CreateBusinessInput {
        CreateBusinessInput {
            name: name.to_string(),
            description: Some("A neighborhood shop".to_string()),
            email: Some("owner@example.org".to_string()),
            phone: None,
            address: None,
            website: None,
            payment_method: PAYMENT_PLATFORM.to_string(),
            merchant_id: Some("merchant-1".to_string()),
            bank_name: None,
            account_holder: None,
            account_number: None,
            status: STATUS_ACTIVE.to_string(),
            root_category: Some("local-businesses".to_string()),
            subcategory: Some("bakeries".to_string()),
            logo: None,
            files: vec!["media://abc/menu.pdf".to_string()],
        }
    }

    #[test]
    fn test_create_and_get() {
        let db = RegistryDb::open_in_memory().unwrap();

        let row = db
            .with_conn_mut(|conn| create_business(conn, sample_input("Helena's Bakery")))
            .unwrap();
        assert!(!row.id.is_empty());
        assert_eq!(row.name, "Helena's Bakery");
        assert_eq!(row.files, vec!["media://abc/menu.pdf".to_string()]);
        assert_eq!(row.category_pair(), Some(("local-businesses", "bakeries")));

        let loaded = db
            .with_conn(|conn| get_business(conn, &row.id))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.name, "Helena's Bakery");
    }

    #[test]
    fn test_update_patch_touches_only_named_fields() {
        let db = RegistryDb::open_in_memory().unwrap();
        let row = db
            .with_conn_mut(|conn| create_business(conn, sample_input("Helena's Bakery")))
            .unwrap();

        let patch = BusinessPatch {
            name: Some("Helena's Fine Bakery".to_string()),
            files: Some(vec![
                "media://abc/menu.pdf".to_string(),
                "media://def/hours.pdf".to_string(),
            ]),
            ..Default::default()
        };
        let updated = db
            .with_conn_mut(|conn| update_business(conn, &row.id, &patch))
            .unwrap();

        assert_eq!(updated.name, "Helena's Fine Bakery");
        assert_eq!(updated.description.as_deref(), Some("A neighborhood shop"));
        assert_eq!(updated.files.len(), 2);
    }

    #[test]
    fn test_update_missing_business() {
        let db = RegistryDb::open_in_memory().unwrap();
        let err = db
            .with_conn_mut(|conn| update_business(conn, "ghost", &BusinessPatch::default()))
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[test]
    fn test_set_category_and_clear() {
        let db = RegistryDb::open_in_memory().unwrap();
        let row = db
            .with_conn_mut(|conn| create_business(conn, sample_input("Helena's Bakery")))
            .unwrap();

        let moved = db
            .with_conn(|conn| {
                set_business_category(conn, &row.id, Some("local-businesses"), Some("florists"))
            })
            .unwrap();
        assert_eq!(moved.subcategory.as_deref(), Some("florists"));

        let cleared = db
            .with_conn(|conn| set_business_category(conn, &row.id, None, None))
            .unwrap();
        assert_eq!(cleared.category_pair(), None);
        assert!(cleared.root_category.is_none());
    }

    #[test]
    fn test_list_by_category() {
        let db = RegistryDb::open_in_memory().unwrap();
        db.with_conn_mut(|conn| {
            create_business(conn, sample_input("Zed's Bakery"))?;
            create_business(conn, sample_input("Ada's Bakery"))?;
            let mut other = sample_input("Flora's Florist");
            other.subcategory = Some("florists".to_string());
            create_business(conn, other)?;
            let mut unrelated = sample_input("Elsewhere");
            unrelated.root_category = Some("services".to_string());
            unrelated.subcategory = None;
            create_business(conn, unrelated)
        })
        .unwrap();

        let in_root = db
            .with_conn(|conn| list_by_category(conn, "local-businesses", None))
            .unwrap();
        assert_eq!(in_root.len(), 3);
        // Ordered by name
        assert_eq!(in_root[0].name, "Ada's Bakery");

        let bakeries = db
            .with_conn(|conn| list_by_category(conn, "local-businesses", Some("bakeries")))
            .unwrap();
        assert_eq!(bakeries.len(), 2);
    }

    #[test]
    fn test_clear_subcategory_retains_root() {
        let db = RegistryDb::open_in_memory().unwrap();
        let row = db
            .with_conn_mut(|conn| create_business(conn, sample_input("Helena's Bakery")))
            .unwrap();

        let touched = db
            .with_conn(|conn| clear_subcategory(conn, "local-businesses", "bakeries"))
            .unwrap();
        assert_eq!(touched, 1);

        let loaded = db
            .with_conn(|conn| get_business(conn, &row.id))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.root_category.as_deref(), Some("local-businesses"));
        assert!(loaded.subcategory.is_none());
    }

    #[test]
    fn test_clear_category_for_root() {
        let db = RegistryDb::open_in_memory().unwrap();
        db.with_conn_mut(|conn| {
            create_business(conn, sample_input("One"))?;
            create_business(conn, sample_input("Two"))
        })
        .unwrap();

        let touched = db
            .with_conn(|conn| clear_category_for_root(conn, "local-businesses"))
            .unwrap();
        assert_eq!(touched, 2);

        let remaining = db
            .with_conn(|conn| list_by_category(conn, "local-businesses", None))
            .unwrap();
        assert!(remaining.is_empty());
    }

    #[test]
    fn test_delete_business() {
        let db = RegistryDb::open_in_memory().unwrap();
        let row = db
            .with_conn_mut(|conn| create_business(conn, sample_input("Helena's Bakery")))
            .unwrap();

        assert!(db
            .with_conn_mut(|conn| delete_business(conn, &row.id))
            .unwrap());
        assert!(!db
            .with_conn_mut(|conn| delete_business(conn, &row.id))
            .unwrap());
        assert!(db
            .with_conn(|conn| get_business(conn, &row.id))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_list_businesses_filters() {
        let db = RegistryDb::open_in_memory().unwrap();
        db.with_conn_mut(|conn| {
            let mut inactive = sample_input("Closed Shop");
            inactive.status = STATUS_INACTIVE.to_string();
            create_business(conn, inactive)?;
            create_business(conn, sample_input("Open Shop"))
        })
        .unwrap();

        let active = db
            .with_conn(|conn| {
                list_businesses(
                    conn,
                    &BusinessQuery {
                        status: Some(STATUS_ACTIVE.to_string()),
                        ..Default::default()
                    },
                )
            })
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Open Shop");

        let searched = db
            .with_conn(|conn| {
                list_businesses(
                    conn,
                    &BusinessQuery {
                        search: Some("Closed".to_string()),
                        ..Default::default()
                    },
                )
            })
            .unwrap();
        assert_eq!(searched.len(), 1);
    }
}
