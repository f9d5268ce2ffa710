//! Protecting middleware for Folio.
//!
//! Every read and write through this crate is checked against ACLs. An item
//! either carries its own ACL or, in a hierarchic namespace, inherits the
//! ACLs of its parents; otherwise the namespace default applies. The
//! configured `before` and `after` ACLs wrap whichever applies, and entries
//! are evaluated left to right: the first entry that mentions the user and
//! the right decides.
//!
//! # Quick Start
//!
//! ```rust
//! use folio_gate::{AccessControlList, Right, StaticPrincipals};
//!
//! let principals = StaticPrincipals::default().with_group("Editors", ["alice"]);
//! let acl = AccessControlList::parse("Editors:read,write All:read", "");
//! assert_eq!(acl.may("alice", Right::Write, &principals, false), Some(true));
//! assert_eq!(acl.may("bob", Right::Write, &principals, false), Some(false));
//! ```
//!
//! # Key Types
//!
//! - [`ProtectingMiddleware`] -- per-request access checks and caches
//! - [`ProtectedItem`] / [`ProtectedRevision`] -- checked item and revision views
//! - [`AclMapping`] / [`AclConfig`] -- ACL configuration per namespace
//! - [`AccessControlList`] -- a parsed ACL string
//! - [`Principals`] -- known users and group membership

pub mod acl;
pub mod cache;
pub mod config;
pub mod error;
pub mod principals;
pub mod protecting;
pub mod rights;

pub use acl::{AccessControlList, AclEntry, SPECIAL_USERS};
pub use cache::AclCache;
pub use config::{AclConfig, AclMapping};
pub use error::{GateError, GateResult};
pub use principals::{Principals, StaticPrincipals};
pub use protecting::{ProtectedItem, ProtectedRevision, ProtectingMiddleware, RequestContext, ANONYMOUS};
pub use rights::{Right, Timing};
