//! Agora Catalog - taxonomy and business registry engine
//!
//! Keeps two stores describing overlapping state consistent: a denormalized
//! taxonomy tree (one document per root category, holding ordered
//! subcategories and leaf items) and a normalized registry of business
//! records. Leaves mirror businesses one-to-one; there is no transaction
//! spanning the stores, so every mutation carries its compensating write and
//! an idempotent `reconcile` operation is the correctness backstop.
//!
//! ## Architecture
//!
//! - **Business registry** (SQLite): source of truth for business attributes
//! - **Taxonomy documents** (sled): one JSON document per root category,
//!   whole-document read-modify-write with a version compare-and-swap
//! - **Catalog service**: the synchronization engine; the only write path
//! - **Media store**: content-addressed files behind the opaque
//!   `store(bytes, path) -> url` capability
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/agora-catalog/
//! ├── registry.db        # Business registry (SQLite)
//! ├── taxonomy.sled/     # Taxonomy documents
//! ├── media/             # Content-addressed uploads
//! │   └── objects/
//! └── config.toml        # Configuration
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod services;
pub mod slug;
pub mod taxonomy;

// Re-exports
pub use config::Config;
pub use db::RegistryDb;
pub use error::CatalogError;
pub use media::{MediaStore, ObjectStore};
pub use services::{CatalogEvent, CatalogService, EventBus, ReconcileReport};
pub use taxonomy::{
    ImageTarget, LeafItem, ReorderTarget, RootCategory, Subcategory, TaxonomyStore,
};
