//! Metadata validation for Folio.
//!
//! Every revision passes through [`validate_meta`] before it reaches a
//! backend. The schema fills defaults, overrides what an untrusted source
//! may not choose, and rejects malformed names, content types, hashes,
//! tags and subscriptions. Failures are reported as one
//! [`ValidationError`] listing every rejected field.
//!
//! # Key Types
//!
//! - [`ValidationState`] -- request facts plus the `trusted` flag
//! - [`ContentType`] -- parsed `major/minor;params` value
//! - [`Subscription`] -- parsed `keyword:namespace:value` pattern

pub mod contenttype;
pub mod error;
pub mod names;
pub mod schema;
pub mod subscriptions;

pub use contenttype::{validate_contenttype, ContentType};
pub use error::{FieldError, ValidationError};
pub use names::{parent_name, validate_name, validate_user_name};
pub use schema::{validate_data, validate_meta, ValidationState};
pub use subscriptions::Subscription;
