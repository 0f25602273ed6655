//! Local catalog of remote items and their style variants.
//!
//! The [`CatalogCache`] reconciles bulk listings from a [`CatalogSource`]
//! into a [`CatalogStore`] and answers variant lookups cache-first, only
//! reaching out to the remote source on a miss.

pub mod cache;
pub mod error;
pub mod source;
pub mod store;
pub mod types;

pub use cache::{CatalogCache, ReconcileReport};
pub use error::{CatalogError, SourceError};
pub use source::{CatalogSource, HttpCatalogSource, SourceFuture};
pub use store::{CatalogStore, InsertOutcome, SqliteCatalogStore, UpsertOutcome};
pub use types::{
    Category, DEFAULT_ICON, DEFAULT_RARITY, Item, RawItem, RawVariantChannel, RawVariantOption, Variant,
};
