//! Taxonomy document model
//!
//! The catalog taxonomy is a three-level hierarchy: root category →
//! subcategory → leaf item. Each root category is persisted as one document
//! holding its own scalar fields plus the full ordered subtree; the document
//! is the unit of consistency (see [`store::TaxonomyStore`]).
//!
//! Leaf items are not independent entities: a leaf's id equals the id of the
//! business it mirrors, and its name is a denormalized copy of the business
//! name at last sync. The synchronization engine keeps that mirror honest.

pub mod store;

pub use store::TaxonomyStore;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::slug::derive_slug;

/// Leaf node mirroring exactly one business
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafItem {
    /// Id of the business this leaf mirrors
    pub id: String,
    /// Display name, a copy of the business name at last sync
    pub name: String,
    /// Optional display image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl LeafItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: None,
        }
    }
}

/// Second-level node, owned by exactly one root category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subcategory {
    /// Slug derived from the name at creation; unique within the root
    pub id: String,
    /// Display name
    pub name: String,
    /// Optional display image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Ordered leaf items
    #[serde(default)]
    pub items: Vec<LeafItem>,
}

impl Subcategory {
    /// Create a subcategory, deriving its id from the name.
    pub fn new(name: &str) -> Result<Self, CatalogError> {
        let id = derive_slug(name);
        if id.is_empty() {
            return Err(CatalogError::InvalidInput(format!(
                "subcategory name '{}' derives an empty identifier",
                name
            )));
        }
        Ok(Self {
            id,
            name: name.to_string(),
            image: None,
            items: Vec::new(),
        })
    }

    /// Find a leaf item by id
    pub fn item(&self, leaf_id: &str) -> Option<&LeafItem> {
        self.items.iter().find(|i| i.id == leaf_id)
    }

    /// Insert a leaf at the end, or replace name/image in place.
    ///
    /// A replacement keeps the item's position; an image already on the leaf
    /// survives unless the incoming leaf carries one. Returns true when the
    /// leaf was newly inserted.
    pub fn upsert_item(&mut self, leaf: LeafItem) -> bool {
        if let Some(existing) = self.items.iter_mut().find(|i| i.id == leaf.id) {
            existing.name = leaf.name;
            if leaf.image.is_some() {
                existing.image = leaf.image;
            }
            false
        } else {
            self.items.push(leaf);
            true
        }
    }

    /// Remove a leaf item; absent items are not an error.
    pub fn remove_item(&mut self, leaf_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.id != leaf_id);
        self.items.len() != before
    }

    /// Replace the leaf ordering to match `ordered_ids` exactly.
    pub fn reorder_items(&mut self, ordered_ids: &[String]) -> Result<(), CatalogError> {
        reorder_in_place(&mut self.items, ordered_ids, |i| &i.id)
    }
}

/// Top-level taxonomy node, persisted as one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCategory {
    /// Slug derived from the name at creation; stable for the document's life
    pub id: String,
    /// Display name
    pub name: String,
    /// Optional display image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Ordered subcategories
    #[serde(default)]
    pub subcategories: Vec<Subcategory>,
    /// Optimistic-concurrency counter, bumped on every persisted write
    #[serde(default)]
    pub version: u64,
    /// Last write timestamp (RFC 3339)
    #[serde(default)]
    pub updated_at: String,
}

impl RootCategory {
    /// Create a root category, deriving its id from the name.
    pub fn new(name: &str) -> Result<Self, CatalogError> {
        let id = derive_slug(name);
        if id.is_empty() {
            return Err(CatalogError::InvalidInput(format!(
                "root category name '{}' derives an empty identifier",
                name
            )));
        }
        Ok(Self {
            id,
            name: name.to_string(),
            image: None,
            subcategories: Vec::new(),
            version: 0,
            updated_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Find a subcategory by id
    pub fn subcategory(&self, sub_id: &str) -> Option<&Subcategory> {
        self.subcategories.iter().find(|s| s.id == sub_id)
    }

    /// Find a subcategory by id, mutable
    pub fn subcategory_mut(&mut self, sub_id: &str) -> Option<&mut Subcategory> {
        self.subcategories.iter_mut().find(|s| s.id == sub_id)
    }

    /// Append a new subcategory derived from `name`.
    pub fn add_subcategory(&mut self, name: &str) -> Result<Subcategory, CatalogError> {
        let sub = Subcategory::new(name)?;
        if self.subcategory(&sub.id).is_some() {
            return Err(CatalogError::DuplicateIdentifier(format!(
                "subcategory '{}' already exists under root '{}'",
                sub.id, self.id
            )));
        }
        self.subcategories.push(sub.clone());
        Ok(sub)
    }

    /// Rename a subcategory in place; the id does not change.
    pub fn rename_subcategory(
        &mut self,
        sub_id: &str,
        new_name: &str,
    ) -> Result<Subcategory, CatalogError> {
        let root_id = self.id.clone();
        let sub = self.subcategory_mut(sub_id).ok_or_else(|| {
            CatalogError::NotFound(format!("subcategory '{}' under root '{}'", sub_id, root_id))
        })?;
        sub.name = new_name.to_string();
        Ok(sub.clone())
    }

    /// Remove a subcategory, returning its final state.
    pub fn remove_subcategory(&mut self, sub_id: &str) -> Result<Subcategory, CatalogError> {
        let pos = self
            .subcategories
            .iter()
            .position(|s| s.id == sub_id)
            .ok_or_else(|| {
                CatalogError::NotFound(format!(
                    "subcategory '{}' under root '{}'",
                    sub_id, self.id
                ))
            })?;
        Ok(self.subcategories.remove(pos))
    }

    /// Replace the subcategory ordering to match `ordered_ids` exactly.
    pub fn reorder_subcategories(&mut self, ordered_ids: &[String]) -> Result<(), CatalogError> {
        reorder_in_place(&mut self.subcategories, ordered_ids, |s| &s.id)
    }

    /// Set the image at the addressed depth of this document.
    pub fn set_image_at(&mut self, target: &ImageTarget, url: &str) -> Result<(), CatalogError> {
        match target {
            ImageTarget::Root { .. } => {
                self.image = Some(url.to_string());
                Ok(())
            }
            ImageTarget::Subcategory { sub_id, .. } => {
                let root_id = self.id.clone();
                let sub = self.subcategory_mut(sub_id).ok_or_else(|| {
                    CatalogError::NotFound(format!(
                        "subcategory '{}' under root '{}'",
                        sub_id, root_id
                    ))
                })?;
                sub.image = Some(url.to_string());
                Ok(())
            }
            ImageTarget::Leaf {
                sub_id, leaf_id, ..
            } => {
                let root_id = self.id.clone();
                let sub = self.subcategory_mut(sub_id).ok_or_else(|| {
                    CatalogError::NotFound(format!(
                        "subcategory '{}' under root '{}'",
                        sub_id, root_id
                    ))
                })?;
                let leaf = sub
                    .items
                    .iter_mut()
                    .find(|i| i.id == *leaf_id)
                    .ok_or_else(|| {
                        CatalogError::NotFound(format!(
                            "leaf '{}' under '{}/{}'",
                            leaf_id, root_id, sub_id
                        ))
                    })?;
                leaf.image = Some(url.to_string());
                Ok(())
            }
        }
    }

    /// All leaf ids anywhere under this root
    pub fn leaf_ids(&self) -> Vec<&str> {
        self.subcategories
            .iter()
            .flat_map(|s| s.items.iter().map(|i| i.id.as_str()))
            .collect()
    }
}

/// Addresses a node image at the right tree depth
#[derive(Debug, Clone, PartialEq)]
pub enum ImageTarget {
    Root {
        root_id: String,
    },
    Subcategory {
        root_id: String,
        sub_id: String,
    },
    Leaf {
        root_id: String,
        sub_id: String,
        leaf_id: String,
    },
}

impl ImageTarget {
    /// The root document this target lives in
    pub fn root_id(&self) -> &str {
        match self {
            ImageTarget::Root { root_id }
            | ImageTarget::Subcategory { root_id, .. }
            | ImageTarget::Leaf { root_id, .. } => root_id,
        }
    }
}

/// Addresses the parent whose children are being reordered
#[derive(Debug, Clone, PartialEq)]
pub enum ReorderTarget {
    /// Reorder the subcategories of a root
    Subcategories { root_id: String },
    /// Reorder the leaf items of a subcategory
    Leaves { root_id: String, sub_id: String },
}

impl ReorderTarget {
    /// The root document this target lives in
    pub fn root_id(&self) -> &str {
        match self {
            ReorderTarget::Subcategories { root_id }
            | ReorderTarget::Leaves { root_id, .. } => root_id,
        }
    }
}

/// Reorder `items` to match `ordered_ids`, which must contain exactly the
/// current ids (same length, same membership, no duplicates).
fn reorder_in_place<T>(
    items: &mut [T],
    ordered_ids: &[String],
    id_of: impl Fn(&T) -> &str,
) -> Result<(), CatalogError> {
    use std::collections::HashMap;

    if ordered_ids.len() != items.len() {
        return Err(CatalogError::InvalidOrdering(format!(
            "expected {} ids, got {}",
            items.len(),
            ordered_ids.len()
        )));
    }

    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(ordered_ids.len());
    for (pos, id) in ordered_ids.iter().enumerate() {
        if positions.insert(id.as_str(), pos).is_some() {
            return Err(CatalogError::InvalidOrdering(format!(
                "duplicate id '{}'",
                id
            )));
        }
    }

    for item in items.iter() {
        if !positions.contains_key(id_of(item)) {
            return Err(CatalogError::InvalidOrdering(format!(
                "id '{}' missing from ordering",
                id_of(item)
            )));
        }
    }

    items.sort_by_key(|item| positions[id_of(item)]);
    Ok(())
}
