//! Service layer: orchestration across the taxonomy and registry stores
//!
//! The catalog service is the only write path the admin surface talks to.
//! It owns the cross-store consistency rules; the stores underneath know
//! nothing about each other.

pub mod catalog_service;
pub mod events;

pub use catalog_service::{CatalogService, ReconcileReport};
pub use events::{CatalogEvent, EventBus, EventListener, LoggingEventListener};
