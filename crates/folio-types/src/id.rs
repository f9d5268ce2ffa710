use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length of the hex form of every Folio id.
pub const ID_HEX_LEN: usize = 32;

/// Returns `true` if `value` is a well-formed id (32 hex characters).
pub fn is_hex_id(value: &str) -> bool {
    value.len() == ID_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn parse_hex_id(value: &str) -> Result<String, TypeError> {
    if value.len() != ID_HEX_LEN {
        return Err(TypeError::InvalidId {
            value: value.to_string(),
            reason: format!("expected {ID_HEX_LEN} characters, got {}", value.len()),
        });
    }
    if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(TypeError::InvalidId {
            value: value.to_string(),
            reason: "not a hex string".into(),
        });
    }
    Ok(value.to_ascii_lowercase())
}

macro_rules! hex_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh, time-ordered id (UUID v7, simple hex form).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7().simple().to_string())
            }

            /// Parse an id from its hex form.
            pub fn parse(value: &str) -> Result<Self, TypeError> {
                parse_hex_id(value).map(Self)
            }

            /// The hex string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First 8 characters, for log lines.
            pub fn short(&self) -> &str {
                &self.0[..8]
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.short())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = TypeError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

hex_id!(
    /// Identifier of one stored revision. Generated per write, never reused.
    RevisionId
);

hex_id!(
    /// Identifier shared by all revisions of one logical item.
    ItemId
);

hex_id!(
    /// Key of a revision payload in the data store.
    DataId
);
