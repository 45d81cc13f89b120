//! Catalog service - the synchronization engine
//!
//! The taxonomy documents and the business registry describe overlapping
//! state: every leaf in a root's tree mirrors one business row, and there is
//! no transaction spanning the two stores. This service is the single write
//! path that keeps them consistent.
//!
//! Rules:
//! - Validation failures abort before any write.
//! - The triggering mutation always lands first; its compensating write in
//!   the other store follows in the same call.
//! - A failed compensating write never fails the operation. It is logged at
//!   warning level and emitted as `SyncInconsistency`; `reconcile` is the
//!   idempotent repair that rebuilds a root's leaf lists from the registry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::businesses::{
    self, BusinessPatch, BusinessQuery, BusinessRow, CreateBusinessInput, PAYMENT_BANK,
    PAYMENT_PLATFORM, STATUSES,
};
use crate::db::{RegistryDb, RegistryStats};
use crate::error::CatalogError;
use crate::media::{MediaStore, ObjectStore};
use crate::taxonomy::{
    ImageTarget, LeafItem, ReorderTarget, RootCategory, Subcategory, TaxonomyStore,
};

use super::events::{CatalogEvent, EventBus};

/// Catalog service for cross-store consistency
pub struct CatalogService {
    taxonomy: Arc<TaxonomyStore>,
    registry: Arc<RegistryDb>,
    media: Arc<dyn ObjectStore>,
    events: Arc<EventBus>,
}

impl CatalogService {
    /// Create a new catalog service over already-open stores
    pub fn new(
        taxonomy: Arc<TaxonomyStore>,
        registry: Arc<RegistryDb>,
        media: Arc<dyn ObjectStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            taxonomy,
            registry,
            media,
            events,
        }
    }

    /// Open all stores from config and wire up the service
    pub fn open(config: &Config) -> Result<Self, CatalogError> {
        std::fs::create_dir_all(&config.data_dir)?;

        let taxonomy = Arc::new(TaxonomyStore::open(config.taxonomy_db_path())?);
        let registry = Arc::new(RegistryDb::open(&config.registry_dir())?);
        let media: Arc<dyn ObjectStore> = Arc::new(MediaStore::new(config.media_dir())?);
        let events = Arc::new(EventBus::with_capacity(config.event_capacity));

        Ok(Self::new(taxonomy, registry, media, events))
    }

    /// The event bus, for subscribing listeners
    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    // =========================================================================
    // Taxonomy reads
    // =========================================================================

    /// Get a root category document
    pub fn get_root(&self, root_id: &str) -> Result<Option<RootCategory>, CatalogError> {
        self.taxonomy.get_root(root_id)
    }

    /// List all root category documents
    pub fn list_roots(&self) -> Result<Vec<RootCategory>, CatalogError> {
        self.taxonomy.list_roots()
    }

    // =========================================================================
    // Taxonomy writes
    // =========================================================================

    /// Create a root category
    pub fn create_root(&self, name: &str) -> Result<RootCategory, CatalogError> {
        let doc = self.taxonomy.create_root(name)?;
        self.events.emit(CatalogEvent::RootCreated {
            id: doc.id.clone(),
            name: doc.name.clone(),
        });
        Ok(doc)
    }

    /// Rename a root category; its id (and every business pointing at it)
    /// stays stable.
    pub fn rename_root(&self, root_id: &str, new_name: &str) -> Result<RootCategory, CatalogError> {
        let doc = self.taxonomy.rename_root(root_id, new_name)?;
        self.events.emit(CatalogEvent::RootRenamed {
            id: doc.id.clone(),
            name: doc.name.clone(),
        });
        Ok(doc)
    }

    /// Delete a root category and its whole subtree.
    ///
    /// Businesses referencing the root are not deleted; both their category
    /// fields are cleared as the compensating write.
    pub fn delete_root(&self, root_id: &str) -> Result<RootCategory, CatalogError> {
        let doc = self.taxonomy.delete_root(root_id)?;

        let cleared = match self
            .registry
            .with_conn_mut(|conn| businesses::clear_category_for_root(conn, root_id))
        {
            Ok(n) => n,
            Err(e) => {
                warn!(root = %root_id, error = %e, "Failed to clear category assignments after root deletion");
                self.events.emit(CatalogEvent::SyncInconsistency {
                    business_id: None,
                    root_id: root_id.to_string(),
                    sub_id: None,
                    reason: format!("category clear after root deletion failed: {}", e),
                });
                0
            }
        };

        self.events.emit(CatalogEvent::RootDeleted {
            id: root_id.to_string(),
            businesses_cleared: cleared,
        });
        Ok(doc)
    }

    /// Add a subcategory to a root's ordered list
    pub fn add_subcategory(
        &self,
        root_id: &str,
        name: &str,
    ) -> Result<Subcategory, CatalogError> {
        let sub = self.taxonomy.add_subcategory(root_id, name)?;
        self.events.emit(CatalogEvent::SubcategoryAdded {
            root_id: root_id.to_string(),
            id: sub.id.clone(),
            name: sub.name.clone(),
        });
        Ok(sub)
    }

    /// Rename a subcategory; its id stays stable.
    pub fn rename_subcategory(
        &self,
        root_id: &str,
        sub_id: &str,
        new_name: &str,
    ) -> Result<Subcategory, CatalogError> {
        let sub = self.taxonomy.rename_subcategory(root_id, sub_id, new_name)?;
        self.events.emit(CatalogEvent::SubcategoryRenamed {
            root_id: root_id.to_string(),
            id: sub.id.clone(),
            name: sub.name.clone(),
        });
        Ok(sub)
    }

    /// Delete a subcategory and its leaf list.
    ///
    /// Affected businesses keep their root assignment; only their
    /// `subcategory` field is cleared (they become uncategorized within the
    /// root).
    pub fn delete_subcategory(
        &self,
        root_id: &str,
        sub_id: &str,
    ) -> Result<Subcategory, CatalogError> {
        let sub = self.taxonomy.delete_subcategory(root_id, sub_id)?;

        let cleared = match self
            .registry
            .with_conn_mut(|conn| businesses::clear_subcategory(conn, root_id, sub_id))
        {
            Ok(n) => n,
            Err(e) => {
                warn!(root = %root_id, sub = %sub_id, error = %e, "Failed to clear subcategory assignments after deletion");
                self.events.emit(CatalogEvent::SyncInconsistency {
                    business_id: None,
                    root_id: root_id.to_string(),
                    sub_id: Some(sub_id.to_string()),
                    reason: format!("subcategory clear after deletion failed: {}", e),
                });
                0
            }
        };

        self.events.emit(CatalogEvent::SubcategoryDeleted {
            root_id: root_id.to_string(),
            id: sub_id.to_string(),
            businesses_cleared: cleared,
        });
        Ok(sub)
    }

    /// Replace a parent's child ordering. The engine itself never reorders;
    /// this is the only way leaf or subcategory order changes.
    pub fn reorder(
        &self,
        target: &ReorderTarget,
        ordered_ids: &[String],
    ) -> Result<(), CatalogError> {
        self.taxonomy.reorder(target, ordered_ids)?;
        self.events.emit(CatalogEvent::Reordered {
            root_id: target.root_id().to_string(),
            sub_id: match target {
                ReorderTarget::Leaves { sub_id, .. } => Some(sub_id.clone()),
                ReorderTarget::Subcategories { .. } => None,
            },
            count: ordered_ids.len(),
        });
        Ok(())
    }

    /// Set the display image at any tree depth
    pub fn set_image(&self, target: &ImageTarget, url: &str) -> Result<(), CatalogError> {
        self.taxonomy.set_image(target, url)?;
        let (sub_id, leaf_id) = match target {
            ImageTarget::Root { .. } => (None, None),
            ImageTarget::Subcategory { sub_id, .. } => (Some(sub_id.clone()), None),
            ImageTarget::Leaf { sub_id, leaf_id, .. } => {
                (Some(sub_id.clone()), Some(leaf_id.clone()))
            }
        };
        self.events.emit(CatalogEvent::ImageSet {
            root_id: target.root_id().to_string(),
            sub_id,
            leaf_id,
        });
        Ok(())
    }

    /// Store media bytes, returning the URL to attach to a node or business.
    ///
    /// Structural consistency never waits on this: the owning node or record
    /// exists before its image URL is attached.
    pub fn upload_media(&self, data: &[u8], path: &str) -> Result<String, CatalogError> {
        self.media.store(data, path)
    }

    // =========================================================================
    // Business reads
    // =========================================================================

    /// Get a business by id
    pub fn get_business(&self, id: &str) -> Result<Option<BusinessRow>, CatalogError> {
        self.registry.with_conn(|conn| businesses::get_business(conn, id))
    }

    /// List businesses with filters
    pub fn list_businesses(&self, query: &BusinessQuery) -> Result<Vec<BusinessRow>, CatalogError> {
        self.registry
            .with_conn(|conn| businesses::list_businesses(conn, query))
    }

    /// List businesses assigned to a category
    pub fn list_by_category(
        &self,
        root_id: &str,
        sub_id: Option<&str>,
    ) -> Result<Vec<BusinessRow>, CatalogError> {
        self.registry
            .with_conn(|conn| businesses::list_by_category(conn, root_id, sub_id))
    }

    /// Registry statistics
    pub fn registry_stats(&self) -> Result<RegistryStats, CatalogError> {
        self.registry.stats()
    }

    // =========================================================================
    // Business writes
    // =========================================================================

    /// Create a business. When it arrives fully categorized, the matching
    /// leaf is appended to its subcategory's list.
    pub fn create_business(
        &self,
        input: CreateBusinessInput,
    ) -> Result<BusinessRow, CatalogError> {
        self.validate_create(&input)?;
        self.validate_category_refs(
            input.root_category.as_deref(),
            input.subcategory.as_deref(),
        )?;

        let row = self
            .registry
            .with_conn_mut(|conn| businesses::create_business(conn, input))?;

        self.events.emit(CatalogEvent::BusinessCreated {
            id: row.id.clone(),
            name: row.name.clone(),
        });

        if let Some((root_id, sub_id)) = row.category_pair() {
            let (root_id, sub_id) = (root_id.to_string(), sub_id.to_string());
            self.sync_leaf_upsert(&root_id, &sub_id, &row);
        }

        Ok(row)
    }

    /// Apply a field-level patch. A name change refreshes the denormalized
    /// copy on the business's leaf.
    pub fn update_business(
        &self,
        id: &str,
        patch: &BusinessPatch,
    ) -> Result<BusinessRow, CatalogError> {
        let old = self
            .get_business(id)?
            .ok_or_else(|| CatalogError::NotFound(format!("business '{}'", id)))?;

        self.validate_patch(&old, patch)?;

        let row = self
            .registry
            .with_conn_mut(|conn| businesses::update_business(conn, id, patch))?;

        self.events
            .emit(CatalogEvent::BusinessUpdated { id: id.to_string() });

        if row.name != old.name {
            if let Some((root_id, sub_id)) = row.category_pair() {
                let (root_id, sub_id) = (root_id.to_string(), sub_id.to_string());
                self.sync_leaf_upsert(&root_id, &sub_id, &row);
            }
        }

        Ok(row)
    }

    /// Change a business's category assignment, moving its leaf: removed
    /// from the old subcategory's list, appended to the new one.
    pub fn assign_business(
        &self,
        id: &str,
        root_id: Option<&str>,
        sub_id: Option<&str>,
    ) -> Result<BusinessRow, CatalogError> {
        let old = self
            .get_business(id)?
            .ok_or_else(|| CatalogError::NotFound(format!("business '{}'", id)))?;

        self.validate_category_refs(root_id, sub_id)?;

        let row = self
            .registry
            .with_conn_mut(|conn| businesses::set_business_category(conn, id, root_id, sub_id))?;

        self.events.emit(CatalogEvent::BusinessRecategorized {
            id: id.to_string(),
            root_id: row.root_category.clone(),
            sub_id: row.subcategory.clone(),
        });

        let old_pair = old
            .category_pair()
            .map(|(r, s)| (r.to_string(), s.to_string()));
        let new_pair = row
            .category_pair()
            .map(|(r, s)| (r.to_string(), s.to_string()));

        if old_pair != new_pair {
            if let Some((old_root, old_sub)) = &old_pair {
                self.sync_leaf_remove(old_root, old_sub, &old.id);
            }
            if let Some((new_root, new_sub)) = &new_pair {
                self.sync_leaf_upsert(new_root, new_sub, &row);
            }
        }

        Ok(row)
    }

    /// Delete a business, then speculatively remove its leaf; the leaf
    /// already being absent is fine.
    pub fn delete_business(&self, id: &str) -> Result<(), CatalogError> {
        let old = self
            .get_business(id)?
            .ok_or_else(|| CatalogError::NotFound(format!("business '{}'", id)))?;

        self.registry
            .with_conn_mut(|conn| businesses::delete_business(conn, id))?;

        self.events
            .emit(CatalogEvent::BusinessDeleted { id: id.to_string() });

        if let Some((root_id, sub_id)) = old.category_pair() {
            let (root_id, sub_id) = (root_id.to_string(), sub_id.to_string());
            self.sync_leaf_remove(&root_id, &sub_id, &old.id);
        }

        Ok(())
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Rebuild a root's leaf lists from the registry.
    ///
    /// This is the authoritative repair for any drift between the two
    /// stores: dangling leaves are dropped, missing leaves are appended,
    /// and every leaf's name is refreshed from its business. Surviving
    /// leaves keep their relative order (admin ordering is only ever changed
    /// by explicit reorder); newly discovered businesses append in (name, id)
    /// order. Running it twice is a no-op the second time.
    pub fn reconcile(&self, root_id: &str) -> Result<ReconcileReport, CatalogError> {
        let doc = self
            .taxonomy
            .get_root(root_id)?
            .ok_or_else(|| CatalogError::NotFound(format!("root category '{}'", root_id)))?;

        let assigned = self
            .registry
            .with_conn(|conn| businesses::list_by_category(conn, root_id, None))?;

        let sub_ids: HashSet<&str> = doc.subcategories.iter().map(|s| s.id.as_str()).collect();

        // Group categorized businesses by subcategory; list_by_category
        // returns (name, id) order, which fixes the append order below.
        let mut by_sub: HashMap<&str, Vec<&BusinessRow>> = HashMap::new();
        let mut placed = 0usize;
        for row in &assigned {
            match row.subcategory.as_deref() {
                Some(sub_id) if sub_ids.contains(sub_id) => {
                    by_sub.entry(sub_id).or_default().push(row);
                    placed += 1;
                }
                _ => {}
            }
        }

        let mut report = ReconcileReport {
            orphaned: assigned.len() - placed,
            ..Default::default()
        };

        let mut lists = Vec::with_capacity(doc.subcategories.len());
        for sub in &doc.subcategories {
            let rows = by_sub.remove(sub.id.as_str()).unwrap_or_default();
            let items = rebuild_leaf_list(&sub.items, &rows, &mut report);
            lists.push((sub.id.clone(), items));
        }

        let final_doc = self.taxonomy.replace_leaf_lists(root_id, lists)?;
        report.total = final_doc.leaf_ids().len();

        info!(
            root = %root_id,
            added = report.added,
            removed = report.removed,
            refreshed = report.refreshed,
            orphaned = report.orphaned,
            "Reconciled root category"
        );
        self.events.emit(CatalogEvent::Reconciled {
            root_id: root_id.to_string(),
            added: report.added,
            removed: report.removed,
            refreshed: report.refreshed,
            orphaned: report.orphaned,
        });

        Ok(report)
    }

    // =========================================================================
    // Compensating writes
    // =========================================================================

    /// Mirror a business into its leaf. Failure is recorded, never raised:
    /// the registry write already succeeded and reconcile repairs the drift.
    fn sync_leaf_upsert(&self, root_id: &str, sub_id: &str, business: &BusinessRow) {
        let leaf = LeafItem::new(business.id.clone(), business.name.clone());
        if let Err(e) = self.taxonomy.upsert_leaf(root_id, sub_id, leaf) {
            warn!(
                business = %business.id,
                root = %root_id,
                sub = %sub_id,
                error = %e,
                "Leaf sync failed; next reconcile will repair"
            );
            self.events.emit(CatalogEvent::SyncInconsistency {
                business_id: Some(business.id.clone()),
                root_id: root_id.to_string(),
                sub_id: Some(sub_id.to_string()),
                reason: format!("leaf upsert failed: {}", e),
            });
        }
    }

    /// Remove a business's leaf. Absence is fine; only storage failures are
    /// recorded.
    fn sync_leaf_remove(&self, root_id: &str, sub_id: &str, business_id: &str) {
        if let Err(e) = self.taxonomy.remove_leaf(root_id, sub_id, business_id) {
            warn!(
                business = %business_id,
                root = %root_id,
                sub = %sub_id,
                error = %e,
                "Leaf removal failed; next reconcile will repair"
            );
            self.events.emit(CatalogEvent::SyncInconsistency {
                business_id: Some(business_id.to_string()),
                root_id: root_id.to_string(),
                sub_id: Some(sub_id.to_string()),
                reason: format!("leaf removal failed: {}", e),
            });
        }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    fn validate_create(&self, input: &CreateBusinessInput) -> Result<(), CatalogError> {
        if input.name.trim().is_empty() {
            return Err(CatalogError::InvalidInput("name is required".into()));
        }
        validate_status(&input.status)?;
        validate_payment(
            &input.payment_method,
            input.merchant_id.as_deref(),
            input.bank_name.as_deref(),
            input.account_holder.as_deref(),
            input.account_number.as_deref(),
        )
    }

    /// Validate a patch against the row it will apply to: payment rules hold
    /// for the merged result, not the patch alone.
    fn validate_patch(
        &self,
        old: &BusinessRow,
        patch: &BusinessPatch,
    ) -> Result<(), CatalogError> {
        if let Some(ref name) = patch.name {
            if name.trim().is_empty() {
                return Err(CatalogError::InvalidInput("name is required".into()));
            }
        }
        if let Some(ref status) = patch.status {
            validate_status(status)?;
        }

        let method = patch
            .payment_method
            .as_deref()
            .unwrap_or(&old.payment_method);
        validate_payment(
            method,
            patch.merchant_id.as_deref().or(old.merchant_id.as_deref()),
            patch.bank_name.as_deref().or(old.bank_name.as_deref()),
            patch
                .account_holder
                .as_deref()
                .or(old.account_holder.as_deref()),
            patch
                .account_number
                .as_deref()
                .or(old.account_number.as_deref()),
        )
    }

    /// A category assignment must reference existing tree nodes, and a
    /// subcategory only makes sense under a root.
    fn validate_category_refs(
        &self,
        root_id: Option<&str>,
        sub_id: Option<&str>,
    ) -> Result<(), CatalogError> {
        match (root_id, sub_id) {
            (None, Some(_)) => Err(CatalogError::InvalidInput(
                "subcategory requires a root category".into(),
            )),
            (None, None) => Ok(()),
            (Some(root_id), maybe_sub) => {
                let doc = self.taxonomy.get_root(root_id)?.ok_or_else(|| {
                    CatalogError::NotFound(format!("root category '{}'", root_id))
                })?;
                if let Some(sub_id) = maybe_sub {
                    if doc.subcategory(sub_id).is_none() {
                        return Err(CatalogError::NotFound(format!(
                            "subcategory '{}' under root '{}'",
                            sub_id, root_id
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

fn validate_status(status: &str) -> Result<(), CatalogError> {
    if !STATUSES.contains(&status) {
        return Err(CatalogError::InvalidInput(format!(
            "status '{}' is not valid. Valid values: {:?}",
            status, STATUSES
        )));
    }
    Ok(())
}

/// Payment methods are a closed set, each with its own required fields.
fn validate_payment(
    method: &str,
    merchant_id: Option<&str>,
    bank_name: Option<&str>,
    account_holder: Option<&str>,
    account_number: Option<&str>,
) -> Result<(), CatalogError> {
    match method {
        PAYMENT_PLATFORM => require_field(merchant_id, "merchant_id"),
        PAYMENT_BANK => {
            require_field(bank_name, "bank_name")?;
            require_field(account_holder, "account_holder")?;
            require_field(account_number, "account_number")
        }
        other => Err(CatalogError::InvalidInput(format!(
            "payment_method '{}' is not valid. Valid values: {:?}",
            other,
            [PAYMENT_PLATFORM, PAYMENT_BANK]
        ))),
    }
}

fn require_field(value: Option<&str>, field: &str) -> Result<(), CatalogError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(CatalogError::MissingRequiredField(field.to_string())),
    }
}

/// Outcome of a reconcile run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Leaves appended for businesses that had none
    pub added: usize,
    /// Dangling leaves dropped
    pub removed: usize,
    /// Leaves whose denormalized name was stale
    pub refreshed: usize,
    /// Businesses in the root that no subcategory list could place
    pub orphaned: usize,
    /// Leaves under the root after reconciliation
    pub total: usize,
}

impl ReconcileReport {
    /// Whether the run changed nothing
    pub fn is_clean(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.refreshed == 0
    }
}

/// Rebuild one subcategory's leaf list from the businesses assigned to it.
///
/// Surviving leaves keep their relative order, name refreshed and image
/// kept; new businesses append in the order given (already (name, id)
/// sorted); everything else is dropped.
fn rebuild_leaf_list(
    current: &[LeafItem],
    rows: &[&BusinessRow],
    report: &mut ReconcileReport,
) -> Vec<LeafItem> {
    let by_id: HashMap<&str, &BusinessRow> =
        rows.iter().map(|r| (r.id.as_str(), *r)).collect();
    let current_ids: HashSet<&str> = current.iter().map(|i| i.id.as_str()).collect();

    let mut items = Vec::with_capacity(rows.len());

    for leaf in current {
        match by_id.get(leaf.id.as_str()) {
            Some(row) => {
                if leaf.name != row.name {
                    report.refreshed += 1;
                }
                items.push(LeafItem {
                    id: leaf.id.clone(),
                    name: row.name.clone(),
                    image: leaf.image.clone(),
                });
            }
            None => report.removed += 1,
        }
    }

    for row in rows {
        if !current_ids.contains(row.id.as_str()) {
            report.added += 1;
            items.push(LeafItem::new(row.id.clone(), row.name.clone()));
        }
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::businesses::{PAYMENT_BANK, PAYMENT_PLATFORM, STATUS_ACTIVE};

    /// Test double for the external object-storage collaborator
    struct NullMedia;

    impl ObjectStore for NullMedia {
        fn store(&self, _data: &[u8], path: &str) -> Result<String, CatalogError> {
            Ok(format!("media://test/{}", path))
        }
    }

    fn test_service() -> CatalogService {
        CatalogService::new(
            Arc::new(TaxonomyStore::open_temporary().unwrap()),
            Arc::new(RegistryDb::open_in_memory().unwrap()),
            Arc::new(NullMedia),
            Arc::new(EventBus::new()),
        )
    }

    fn bakery_input(name: &str) -> CreateBusinessInput {
        CreateBusinessInput {
            name: name.to_string(),
            description: None,
            email: None,
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
            files: vec![],
        }
    }

    fn setup_tree(service: &CatalogService) {
        service.create_root("LOCAL BUSINESSES").unwrap();
        service.add_subcategory("local-businesses", "Bakeries").unwrap();
    }

    fn leaf_names(service: &CatalogService, root: &str, sub: &str) -> Vec<(String, String)> {
        service
            .get_root(root)
            .unwrap()
            .unwrap()
            .subcategory(sub)
            .unwrap()
            .items
            .iter()
            .map(|i| (i.id.clone(), i.name.clone()))
            .collect()
    }

    #[test]
    fn test_business_lifecycle_mirrors_leaf() {
        let service = test_service();
        setup_tree(&service);

        // Create: the leaf appears with the business's id and name
        let row = service.create_business(bakery_input("Helena's Bakery")).unwrap();
        let leaves = leaf_names(&service, "local-businesses", "bakeries");
        assert_eq!(leaves, vec![(row.id.clone(), "Helena's Bakery".to_string())]);

        // Rename: the denormalized copy refreshes
        let patch = BusinessPatch {
            name: Some("Helena's Fine Bakery".to_string()),
            ..Default::default()
        };
        service.update_business(&row.id, &patch).unwrap();
        let leaves = leaf_names(&service, "local-businesses", "bakeries");
        assert_eq!(leaves[0].1, "Helena's Fine Bakery");

        // Delete: the leaf goes away, the subcategory stays
        service.delete_business(&row.id).unwrap();
        assert!(leaf_names(&service, "local-businesses", "bakeries").is_empty());
    }

    #[test]
    fn test_non_name_update_leaves_tree_version_alone() {
        let service = test_service();
        setup_tree(&service);
        let row = service.create_business(bakery_input("Helena's Bakery")).unwrap();
        let version = service.get_root("local-businesses").unwrap().unwrap().version;

        let patch = BusinessPatch {
            description: Some("Fresh bread daily".to_string()),
            ..Default::default()
        };
        service.update_business(&row.id, &patch).unwrap();

        assert_eq!(
            service.get_root("local-businesses").unwrap().unwrap().version,
            version
        );
    }

    #[test]
    fn test_recategorize_moves_leaf() {
        let service = test_service();
        setup_tree(&service);
        service.add_subcategory("local-businesses", "Florists").unwrap();

        let anchor = service.create_business(bakery_input("Anchor Bakery")).unwrap();
        let row = service.create_business(bakery_input("Helena's Bakery")).unwrap();

        service
            .assign_business(&row.id, Some("local-businesses"), Some("florists"))
            .unwrap();

        let bakeries = leaf_names(&service, "local-businesses", "bakeries");
        assert_eq!(bakeries.len(), 1);
        assert_eq!(bakeries[0].0, anchor.id);

        let florists = leaf_names(&service, "local-businesses", "florists");
        assert_eq!(florists, vec![(row.id.clone(), "Helena's Bakery".to_string())]);
    }

    #[test]
    fn test_uncategorize_removes_leaf() {
        let service = test_service();
        setup_tree(&service);
        let row = service.create_business(bakery_input("Helena's Bakery")).unwrap();

        service.assign_business(&row.id, None, None).unwrap();

        assert!(leaf_names(&service, "local-businesses", "bakeries").is_empty());
        let loaded = service.get_business(&row.id).unwrap().unwrap();
        assert!(loaded.root_category.is_none());
    }

    #[test]
    fn test_assignment_rejects_unknown_nodes() {
        let service = test_service();
        setup_tree(&service);
        let row = service.create_business(bakery_input("Helena's Bakery")).unwrap();

        let err = service
            .assign_business(&row.id, Some("ghost-root"), None)
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));

        let err = service
            .assign_business(&row.id, Some("local-businesses"), Some("ghost-sub"))
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));

        let err = service.assign_business(&row.id, None, Some("bakeries")).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidInput(_)));

        // Rejections left the assignment untouched
        let loaded = service.get_business(&row.id).unwrap().unwrap();
        assert_eq!(loaded.category_pair(), Some(("local-businesses", "bakeries")));
    }

    #[test]
    fn test_create_rejects_unknown_category_before_any_write() {
        let service = test_service();
        setup_tree(&service);

        let mut input = bakery_input("Helena's Bakery");
        input.subcategory = Some("ghost".to_string());
        let err = service.create_business(input).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));

        assert_eq!(service.registry_stats().unwrap().total, 0);
    }

    #[test]
    fn test_payment_validation() {
        let service = test_service();
        setup_tree(&service);

        let mut input = bakery_input("No Merchant");
        input.merchant_id = None;
        let err = service.create_business(input).unwrap_err();
        assert!(matches!(err, CatalogError::MissingRequiredField(_)));

        let mut input = bakery_input("Partial Bank");
        input.payment_method = PAYMENT_BANK.to_string();
        input.merchant_id = None;
        input.bank_name = Some("Community Credit Union".to_string());
        input.account_holder = Some("Helena".to_string());
        // account_number missing
        let err = service.create_business(input).unwrap_err();
        assert!(matches!(err, CatalogError::MissingRequiredField(_)));

        let mut input = bakery_input("Full Bank");
        input.payment_method = PAYMENT_BANK.to_string();
        input.merchant_id = None;
        input.bank_name = Some("Community Credit Union".to_string());
        input.account_holder = Some("Helena".to_string());
        input.account_number = Some("0042".to_string());
        service.create_business(input).unwrap();

        // Switching method by patch re-validates the merged row
        let row = service
            .list_businesses(&BusinessQuery::default())
            .unwrap()
            .into_iter()
            .find(|b| b.name == "Full Bank")
            .unwrap();
        let patch = BusinessPatch {
            payment_method: Some(PAYMENT_PLATFORM.to_string()),
            ..Default::default()
        };
        let err = service.update_business(&row.id, &patch).unwrap_err();
        assert!(matches!(err, CatalogError::MissingRequiredField(_)));
    }

    #[test]
    fn test_delete_subcategory_clears_only_subcategory() {
        let service = test_service();
        setup_tree(&service);
        let row = service.create_business(bakery_input("Helena's Bakery")).unwrap();

        service.delete_subcategory("local-businesses", "bakeries").unwrap();

        // The business survives, uncategorized within its root
        let loaded = service.get_business(&row.id).unwrap().unwrap();
        assert_eq!(loaded.root_category.as_deref(), Some("local-businesses"));
        assert!(loaded.subcategory.is_none());

        let doc = service.get_root("local-businesses").unwrap().unwrap();
        assert!(doc.subcategories.is_empty());
    }

    #[test]
    fn test_delete_root_clears_both_fields() {
        let service = test_service();
        setup_tree(&service);
        let row = service.create_business(bakery_input("Helena's Bakery")).unwrap();

        service.delete_root("local-businesses").unwrap();

        let loaded = service.get_business(&row.id).unwrap().unwrap();
        assert!(loaded.root_category.is_none());
        assert!(loaded.subcategory.is_none());
        assert!(service.get_root("local-businesses").unwrap().is_none());
    }

    #[test]
    fn test_reconcile_repairs_drift_and_is_idempotent() {
        let service = test_service();
        setup_tree(&service);

        let kept = service.create_business(bakery_input("Kept Bakery")).unwrap();
        let doomed = service.create_business(bakery_input("Doomed Bakery")).unwrap();

        // Simulate compensating-write failures by mutating the registry
        // behind the engine's back: one business disappears (dangling leaf),
        // one appears (missing leaf), one is renamed (stale leaf name).
        service
            .registry
            .with_conn_mut(|conn| businesses::delete_business(conn, &doomed.id))
            .unwrap();
        let ghost = service
            .registry
            .with_conn_mut(|conn| businesses::create_business(conn, bakery_input("Ghost Bakery")))
            .unwrap();
        service
            .registry
            .with_conn_mut(|conn| {
                businesses::update_business(
                    conn,
                    &kept.id,
                    &BusinessPatch {
                        name: Some("Kept & Renamed".to_string()),
                        ..Default::default()
                    },
                )
            })
            .unwrap();

        let report = service.reconcile("local-businesses").unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.total, 2);

        // The leaf id set now equals the registry's per-subcategory id set
        let leaves = leaf_names(&service, "local-businesses", "bakeries");
        assert_eq!(
            leaves,
            vec![
                (kept.id.clone(), "Kept & Renamed".to_string()),
                (ghost.id.clone(), "Ghost Bakery".to_string()),
            ]
        );

        // Second run changes nothing, down to the document version
        let version = service.get_root("local-businesses").unwrap().unwrap().version;
        let report = service.reconcile("local-businesses").unwrap();
        assert!(report.is_clean());
        assert_eq!(
            service.get_root("local-businesses").unwrap().unwrap().version,
            version
        );
    }

    #[test]
    fn test_reconcile_preserves_admin_leaf_order() {
        let service = test_service();
        setup_tree(&service);

        let a = service.create_business(bakery_input("Alpha")).unwrap();
        let b = service.create_business(bakery_input("Beta")).unwrap();
        let c = service.create_business(bakery_input("Gamma")).unwrap();

        // Admin reorders leaves explicitly
        service
            .reorder(
                &ReorderTarget::Leaves {
                    root_id: "local-businesses".into(),
                    sub_id: "bakeries".into(),
                },
                &[c.id.clone(), a.id.clone(), b.id.clone()],
            )
            .unwrap();

        let report = service.reconcile("local-businesses").unwrap();
        assert!(report.is_clean());

        let leaves = leaf_names(&service, "local-businesses", "bakeries");
        let ids: Vec<_> = leaves.iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids, vec![c.id, a.id, b.id]);
    }

    #[test]
    fn test_reconcile_counts_orphans() {
        let service = test_service();
        setup_tree(&service);

        // A business pointing at a subcategory that no longer exists can
        // only come from drift; inject it directly.
        let mut input = bakery_input("Stranded");
        input.subcategory = Some("demolished".to_string());
        service
            .registry
            .with_conn_mut(|conn| businesses::create_business(conn, input))
            .unwrap();

        let report = service.reconcile("local-businesses").unwrap();
        assert_eq!(report.orphaned, 1);
        assert_eq!(report.total, 0);
    }

    #[test]
    fn test_reconcile_unknown_root() {
        let service = test_service();
        let err = service.reconcile("ghost").unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[test]
    fn test_duplicate_subcategory_leaves_count_unchanged() {
        let service = test_service();
        setup_tree(&service);

        let err = service
            .add_subcategory("local-businesses", "BAKERIES")
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateIdentifier(_)));
        assert_eq!(
            service.get_root("local-businesses").unwrap().unwrap().subcategories.len(),
            1
        );
    }

    #[test]
    fn test_upload_media_returns_attachable_url() {
        let service = test_service();
        setup_tree(&service);

        let url = service.upload_media(b"png bytes", "storefront.png").unwrap();
        service
            .set_image(
                &ImageTarget::Subcategory {
                    root_id: "local-businesses".into(),
                    sub_id: "bakeries".into(),
                },
                &url,
            )
            .unwrap();

        let doc = service.get_root("local-businesses").unwrap().unwrap();
        assert_eq!(doc.subcategory("bakeries").unwrap().image.as_deref(), Some(url.as_str()));
    }
}
