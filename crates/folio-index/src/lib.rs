//! Indexing middleware for Folio.
//!
//! The backend stores flat revisions; this crate groups them into items and
//! makes them searchable. Two indexes are kept:
//!
//! - **ALL_REVS**: one document per stored revision, keyed by revid
//! - **LATEST_REVS**: one document per item, its current revision, keyed by
//!   itemid
//!
//! The current revision of an item is the one with the greatest
//! `(mtime, revid)`. Writes go to the backend first, then to ALL_REVS, then
//! LATEST_REVS is recomputed for the touched item. [`IndexingMiddleware::update`]
//! and [`IndexingMiddleware::rebuild`] repair indexes that fell behind the
//! backend.
//!
//! # Key Types
//!
//! - [`IndexingMiddleware`] -- lifecycle, indexing, search and item lookup
//! - [`Item`] -- one item: its revisions, parents, writes and destruction
//! - [`Revision`] -- read-only view of an indexed revision
//! - [`Query`] / [`SearchOptions`] -- what to find and how to order it
//! - [`DocIndex`] -- one index: `ArcSwap` snapshot readers, one journaled writer

pub mod document;
pub mod error;
pub mod index;
pub mod item;
pub mod journal;
pub mod middleware;
pub mod query;
pub mod revision;

pub use document::{Field, IndexDocument};
pub use error::{IndexError, IndexResult};
pub use index::{DocIndex, IndexState, IndexWriter};
pub use item::{Item, StoreOptions};
pub use journal::{Journal, JournalOp};
pub use middleware::{IndexLocation, IndexingMiddleware};
pub use query::{Query, SearchOptions, SortKey, WhichIndex};
pub use revision::{Revision, Search};
