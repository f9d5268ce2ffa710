//! Foundation types for Folio, the persistence core of a wiki.
//!
//! Every other Folio crate depends on `folio-types`. The backend stores flat
//! revisions keyed by [`RevisionId`]; the index groups them into items by
//! [`ItemId`]. Metadata travels as a [`RevisionMeta`] record, which is also
//! the JSON shape persisted in the meta store and in serialized dumps.
//!
//! # Key Types
//!
//! - [`RevisionId`] / [`ItemId`] / [`DataId`] -- 32-char lowercase hex ids (UUID v7)
//! - [`RevisionMeta`] -- metadata of one revision, with extension fields
//! - [`Action`] -- what produced a revision (SAVE, REVERT, ...)
//! - [`ItemSelector`] -- how a caller names an item (namespace + name, or itemid)

pub mod error;
pub mod fqname;
pub mod id;
pub mod meta;

pub use error::TypeError;
pub use fqname::ItemSelector;
pub use id::{DataId, ItemId, RevisionId};
pub use meta::{utc_now, Action, RevisionMeta};

/// Default namespace (the empty prefix).
pub const NAMESPACE_DEFAULT: &str = "";

/// Namespace holding user profile items.
pub const NAMESPACE_USERPROFILES: &str = "userprofiles";

/// Content type used when neither the caller nor the current item supplies one.
pub const CONTENTTYPE_DEFAULT: &str = "text/plain;charset=utf-8";

/// Content type marking a user profile revision.
pub const CONTENTTYPE_USER: &str = "application/x.folio.userprofile";
