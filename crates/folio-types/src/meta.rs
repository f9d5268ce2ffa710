use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::TypeError;
use crate::id::{DataId, ItemId, RevisionId};

/// Current wall-clock time in UNIX seconds.
pub fn utc_now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// What produced a revision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Save,
    Revert,
    Trash,
    Copy,
    Rename,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Save => "SAVE",
            Self::Revert => "REVERT",
            Self::Trash => "TRASH",
            Self::Copy => "COPY",
            Self::Rename => "RENAME",
        };
        f.write_str(s)
    }
}

impl FromStr for Action {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SAVE" => Ok(Self::Save),
            "REVERT" => Ok(Self::Revert),
            "TRASH" => Ok(Self::Trash),
            "COPY" => Ok(Self::Copy),
            "RENAME" => Ok(Self::Rename),
            other => Err(TypeError::UnknownAction(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// RevisionMeta
// ---------------------------------------------------------------------------

/// Metadata of one revision.
///
/// This is the JSON document persisted in the meta store and written into
/// serialized dumps. Absent values are omitted on output. Keys that are not
/// modelled here are kept verbatim in [`RevisionMeta::extra`].
///
/// Older dumps carry `name` as a single string; it is read back as a
/// one-element list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RevisionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revid: Option<RevisionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itemid: Option<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parentid: Option<RevisionId>,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub name: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contenttype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// BLAKE3 hex digest of the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataid: Option<DataId>,
    /// Modification time, UNIX seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
    /// Publication time, UNIX seconds. Gates `pubread`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ptime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userid: Option<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wikiname: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trash: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscriptions: Vec<String>,
    /// Extension fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RevisionMeta {
    /// Metadata for a new revision with a single name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: vec![name.into()],
            ..Default::default()
        }
    }

    /// Encode as UTF-8 JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, TypeError> {
        serde_json::to_vec(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Decode from UTF-8 JSON.
    pub fn from_json(bytes: &[u8]) -> Result<Self, TypeError> {
        serde_json::from_slice(bytes).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Namespace, treating absent as the default namespace.
    pub fn namespace_or_default(&self) -> &str {
        self.namespace.as_deref().unwrap_or(crate::NAMESPACE_DEFAULT)
    }

    /// Whether the contenttype marks a user profile.
    pub fn is_user_profile(&self) -> bool {
        self.contenttype.as_deref() == Some(crate::CONTENTTYPE_USER)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(name)) => vec![name],
        Some(OneOrMany::Many(names)) => names,
    })
}
