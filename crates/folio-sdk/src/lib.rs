//! High-level SDK for Folio.
//!
//! Wires a [`WikiConfig`] into routed storage, the two indexes and the ACL
//! layer. This is the main entry point for applications embedding Folio.
//!
//! # Key Types
//!
//! - [`Wiki`] -- lifecycle, per-request protectors, reindexing, backup
//! - [`WikiConfig`] -- TOML configuration: storage, index, ACLs, principals

pub mod config;
pub mod error;
pub mod wiki;

pub use config::{IndexConfig, WikiConfig};
pub use error::{SdkError, SdkResult};
pub use wiki::Wiki;

// Re-export key types
pub use folio_gate::{
    AclConfig, AclMapping, GateError, ProtectedItem, ProtectedRevision, ProtectingMiddleware,
    RequestContext, Right, StaticPrincipals,
};
pub use folio_index::{
    Field, IndexError, IndexLocation, IndexingMiddleware, Item, Query, Revision, SearchOptions,
    SortKey, StoreOptions, WhichIndex,
};
pub use folio_pack::{DeserializeOptions, DumpStats, LoadStats};
pub use folio_schema::ValidationError;
pub use folio_store::{BackendSpec, StorageConfig};
pub use folio_types::{Action, ItemId, ItemSelector, RevisionId, RevisionMeta};
