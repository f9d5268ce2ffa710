//! Revision storage for Folio.
//!
//! Two layers live here. A [`Store`] is a plain key/value container; a
//! [`Backend`] composes a meta store and a data store into a revision store
//! keyed by generated [`RevisionId`](folio_types::RevisionId)s. The
//! [`RoutingBackend`] spreads revisions over several backends by namespace.
//!
//! # Stores
//!
//! - [`MemoryStore`] -- `HashMap`-based, for tests and embedding
//! - [`FsStore`] -- one file per key in a directory
//! - [`RedbStore`] -- one row per key in a table of an embedded redb database
//!
//! # Design Rules
//!
//! 1. Metadata and payload are stored separately; metadata reads never
//!    touch the payload.
//! 2. Declared size and hash are verified against the bytes; on mismatch
//!    nothing is left behind.
//! 3. Concurrent readers are always safe; writers use fresh revids.
//! 4. All I/O errors are propagated, never retried.

pub mod backend;
pub mod config;
pub mod embedded;
pub mod error;
pub mod fs;
pub mod hashing;
pub mod memory;
pub mod routing;
pub mod traits;

pub use backend::{Backend, StoresBackend};
pub use config::{BackendSpec, StorageConfig};
pub use embedded::RedbStore;
pub use error::{StoreError, StoreResult};
pub use fs::FsStore;
pub use hashing::{content_hash, HashingReader};
pub use memory::MemoryStore;
pub use routing::{BackendRevision, RoutingBackend};
pub use traits::Store;
