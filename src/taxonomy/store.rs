//! Taxonomy document store
//!
//! One JSON document per root category, keyed by the root's slug in a sled
//! tree. Every structural write is a whole-document read-modify-write: load,
//! transform in memory, bump the version counter, and compare-and-swap the
//! serialized bytes back. A write-back that loses a race fails with
//! `Conflict` instead of silently overwriting the other writer — with a
//! single admin the CAS is uncontended and behavior is unchanged.

use sled::IVec;
use tracing::{debug, info};

use crate::error::CatalogError;
use crate::taxonomy::{ImageTarget, LeafItem, ReorderTarget, RootCategory, Subcategory};

/// Document store for root category trees
pub struct TaxonomyStore {
    db: sled::Db,
}

impl TaxonomyStore {
    /// Open or create the taxonomy store
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self, CatalogError> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Opened taxonomy document store");
        Ok(Self { db })
    }

    /// Open a temporary store (for testing)
    pub fn open_temporary() -> Result<Self, CatalogError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a root category document by id
    pub fn get_root(&self, root_id: &str) -> Result<Option<RootCategory>, CatalogError> {
        Ok(self.load_raw(root_id)?.map(|(doc, _)| doc))
    }

    /// Whether a root document exists
    pub fn root_exists(&self, root_id: &str) -> Result<bool, CatalogError> {
        Ok(self.db.contains_key(root_id.as_bytes())?)
    }

    /// List all root category documents, in key order
    pub fn list_roots(&self) -> Result<Vec<RootCategory>, CatalogError> {
        let mut roots = Vec::new();
        for item in self.db.iter() {
            let (_, value) = item?;
            let doc: RootCategory = serde_json::from_slice(&value)?;
            roots.push(doc);
        }
        Ok(roots)
    }

    /// Number of root documents
    pub fn root_count(&self) -> usize {
        self.db.len()
    }

    // =========================================================================
    // Root-level writes
    // =========================================================================

    /// Create a root category from a display name.
    ///
    /// Fails with `DuplicateIdentifier` when the derived slug already names a
    /// root document.
    pub fn create_root(&self, name: &str) -> Result<RootCategory, CatalogError> {
        let doc = RootCategory::new(name)?;
        let bytes = serde_json::to_vec(&doc)?;

        // CAS against absence so a raced create still collides explicitly
        self.db
            .compare_and_swap(doc.id.as_bytes(), None as Option<&[u8]>, Some(bytes))?
            .map_err(|_| {
                CatalogError::DuplicateIdentifier(format!(
                    "root category '{}' already exists",
                    doc.id
                ))
            })?;

        info!(root = %doc.id, name = %doc.name, "Created root category");
        Ok(doc)
    }

    /// Rename a root category in place; the id does not change.
    pub fn rename_root(&self, root_id: &str, new_name: &str) -> Result<RootCategory, CatalogError> {
        let (_, doc) = self.update_root(root_id, |doc| {
            doc.name = new_name.to_string();
            Ok(())
        })?;
        debug!(root = %root_id, name = %new_name, "Renamed root category");
        Ok(doc)
    }

    /// Delete a root document, returning its final state.
    pub fn delete_root(&self, root_id: &str) -> Result<RootCategory, CatalogError> {
        let (doc, old_bytes) = self
            .load_raw(root_id)?
            .ok_or_else(|| CatalogError::NotFound(format!("root category '{}'", root_id)))?;

        self.db
            .compare_and_swap(root_id.as_bytes(), Some(old_bytes), None as Option<&[u8]>)?
            .map_err(|_| {
                CatalogError::Conflict(format!(
                    "root category '{}' changed since read",
                    root_id
                ))
            })?;

        info!(root = %root_id, "Deleted root category");
        Ok(doc)
    }

    // =========================================================================
    // Subcategory writes
    // =========================================================================

    /// Append a subcategory derived from `name` to a root's ordered list.
    pub fn add_subcategory(
        &self,
        root_id: &str,
        name: &str,
    ) -> Result<Subcategory, CatalogError> {
        let (sub, _) = self.update_root(root_id, |doc| doc.add_subcategory(name))?;
        info!(root = %root_id, sub = %sub.id, "Added subcategory");
        Ok(sub)
    }

    /// Rename a subcategory in place; the id does not change.
    pub fn rename_subcategory(
        &self,
        root_id: &str,
        sub_id: &str,
        new_name: &str,
    ) -> Result<Subcategory, CatalogError> {
        let (sub, _) =
            self.update_root(root_id, |doc| doc.rename_subcategory(sub_id, new_name))?;
        debug!(root = %root_id, sub = %sub_id, name = %new_name, "Renamed subcategory");
        Ok(sub)
    }

    /// Remove a subcategory and its leaf list, returning the final state.
    pub fn delete_subcategory(
        &self,
        root_id: &str,
        sub_id: &str,
    ) -> Result<Subcategory, CatalogError> {
        let (sub, _) = self.update_root(root_id, |doc| doc.remove_subcategory(sub_id))?;
        info!(root = %root_id, sub = %sub_id, "Deleted subcategory");
        Ok(sub)
    }

    // =========================================================================
    // Leaf writes
    // =========================================================================

    /// Insert a leaf at the end of a subcategory's list, or replace its
    /// name/image in place. Returns true when the leaf was newly inserted.
    pub fn upsert_leaf(
        &self,
        root_id: &str,
        sub_id: &str,
        leaf: LeafItem,
    ) -> Result<bool, CatalogError> {
        let leaf_id = leaf.id.clone();
        let (inserted, _) = self.update_root(root_id, |doc| {
            let sub = doc.subcategory_mut(sub_id).ok_or_else(|| {
                CatalogError::NotFound(format!(
                    "subcategory '{}' under root '{}'",
                    sub_id, root_id
                ))
            })?;
            Ok(sub.upsert_item(leaf))
        })?;
        debug!(root = %root_id, sub = %sub_id, leaf = %leaf_id, inserted, "Upserted leaf");
        Ok(inserted)
    }

    /// Remove a leaf if present.
    ///
    /// Speculative removal: an absent leaf, subcategory, or root document all
    /// count as already removed and return `Ok(false)`.
    pub fn remove_leaf(
        &self,
        root_id: &str,
        sub_id: &str,
        leaf_id: &str,
    ) -> Result<bool, CatalogError> {
        let result = self.update_root(root_id, |doc| {
            Ok(match doc.subcategory_mut(sub_id) {
                Some(sub) => sub.remove_item(leaf_id),
                None => false,
            })
        });
        match result {
            Ok((removed, _)) => {
                if removed {
                    debug!(root = %root_id, sub = %sub_id, leaf = %leaf_id, "Removed leaf");
                }
                Ok(removed)
            }
            Err(CatalogError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Cross-level writes
    // =========================================================================

    /// Set the image URL at the addressed tree depth.
    pub fn set_image(&self, target: &ImageTarget, url: &str) -> Result<(), CatalogError> {
        self.update_root(target.root_id(), |doc| doc.set_image_at(target, url))?;
        debug!(root = %target.root_id(), "Set image");
        Ok(())
    }

    /// Replace a parent's child ordering to match `ordered_ids` exactly.
    pub fn reorder(
        &self,
        target: &ReorderTarget,
        ordered_ids: &[String],
    ) -> Result<(), CatalogError> {
        self.update_root(target.root_id(), |doc| match target {
            ReorderTarget::Subcategories { .. } => doc.reorder_subcategories(ordered_ids),
            ReorderTarget::Leaves { sub_id, .. } => {
                let sub = doc.subcategory_mut(sub_id).ok_or_else(|| {
                    CatalogError::NotFound(format!(
                        "subcategory '{}' under root '{}'",
                        sub_id,
                        target.root_id()
                    ))
                })?;
                sub.reorder_items(ordered_ids)
            }
        })?;
        debug!(root = %target.root_id(), count = ordered_ids.len(), "Reordered children");
        Ok(())
    }

    /// Wholesale replacement of leaf lists, used by reconciliation.
    ///
    /// Lists naming a subcategory that no longer exists are skipped.
    pub fn replace_leaf_lists(
        &self,
        root_id: &str,
        lists: Vec<(String, Vec<LeafItem>)>,
    ) -> Result<RootCategory, CatalogError> {
        let (_, doc) = self.update_root(root_id, |doc| {
            for (sub_id, items) in lists {
                match doc.subcategory_mut(&sub_id) {
                    Some(sub) => sub.items = items,
                    None => {
                        debug!(root = %root_id, sub = %sub_id, "Skipping leaf list for missing subcategory")
                    }
                }
            }
            Ok(())
        })?;
        Ok(doc)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn load_raw(&self, root_id: &str) -> Result<Option<(RootCategory, IVec)>, CatalogError> {
        match self.db.get(root_id.as_bytes())? {
            Some(bytes) => {
                let doc: RootCategory = serde_json::from_slice(&bytes)?;
                Ok(Some((doc, bytes)))
            }
            None => Ok(None),
        }
    }

    /// Read-modify-write a root document.
    ///
    /// The closure's edits are persisted with a version bump and a
    /// compare-and-swap against the bytes that were read; a lost race
    /// surfaces `Conflict`. A transformation that leaves the document
    /// byte-identical skips the write entirely (no version churn).
    fn update_root<T>(
        &self,
        root_id: &str,
        f: impl FnOnce(&mut RootCategory) -> Result<T, CatalogError>,
    ) -> Result<(T, RootCategory), CatalogError> {
        let (mut doc, old_bytes) = self
            .load_raw(root_id)?
            .ok_or_else(|| CatalogError::NotFound(format!("root category '{}'", root_id)))?;

        let out = f(&mut doc)?;

        if serde_json::to_vec(&doc)? == old_bytes.as_ref() {
            return Ok((out, doc));
        }

        let doc = self.write_back(root_id, &old_bytes, doc)?;
        Ok((out, doc))
    }

    /// Persist a transformed document against the bytes it was read from.
    fn write_back(
        &self,
        root_id: &str,
        old_bytes: &IVec,
        mut doc: RootCategory,
    ) -> Result<RootCategory, CatalogError> {
        doc.version += 1;
        doc.updated_at = chrono::Utc::now().to_rfc3339();
        let new_bytes = serde_json::to_vec(&doc)?;

        self.db
            .compare_and_swap(root_id.as_bytes(), Some(old_bytes.as_ref()), Some(new_bytes))?
            .map_err(|_| {
                CatalogError::Conflict(format!(
                    "root category '{}' changed since read",
                    root_id
                ))
            })?;

        Ok(doc)
    }
}
