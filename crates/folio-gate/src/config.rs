//! Per-namespace ACL configuration.
//!
//! An [`AclMapping`] maps namespace prefixes to [`AclConfig`]s; the longest
//! prefix covering a namespace wins, and the empty prefix covers all. It
//! loads from TOML as a table keyed by prefix:
//!
//! ```toml
//! [""]
//! default = "All:read,write,create"
//!
//! [userprofiles]
//! before = "All:"
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::acl::check_rights;
use crate::error::{GateError, GateResult};

/// ACL settings for one namespace prefix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    /// Evaluated before the item ACL.
    pub before: String,
    /// Used when an item has no ACL; also what `Default` expands to.
    pub default: String,
    /// Evaluated after the item ACL.
    pub after: String,
    /// Items without an ACL inherit their parents' ACLs instead of `default`.
    pub hierarchic: bool,
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            before: String::new(),
            default: "All:read,write,create".into(),
            after: String::new(),
            hierarchic: false,
        }
    }
}

impl AclConfig {
    /// A configuration granting `default` and nothing else.
    pub fn with_default(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            ..Self::default()
        }
    }

    /// Reject rights that do not exist in any of the three ACLs.
    pub fn validate(&self) -> GateResult<()> {
        for (which, acl) in [("before", &self.before), ("default", &self.default), ("after", &self.after)] {
            check_rights(acl).map_err(|e| GateError::Config(format!("{which} acl {acl:?}: {e}")))?;
        }
        Ok(())
    }
}

/// ACL configuration per namespace, matched by longest prefix.
///
/// A prefix matches a namespace equal to it or nested below it (`users`
/// matches `users/archive`). The empty prefix matches every namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, AclConfig>", into = "BTreeMap<String, AclConfig>")]
pub struct AclMapping {
    /// Longest prefix first.
    entries: Vec<(String, AclConfig)>,
}

impl AclMapping {
    pub fn new(entries: impl IntoIterator<Item = (String, AclConfig)>) -> GateResult<Self> {
        let mut entries: Vec<(String, AclConfig)> = entries.into_iter().collect();
        for (prefix, config) in &entries {
            config
                .validate()
                .map_err(|e| GateError::Config(format!("namespace {prefix:?}: {e}")))?;
        }
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        entries.dedup_by(|a, b| a.0 == b.0);
        Ok(Self { entries })
    }

    /// Open wiki: everyone may do everything, but user profiles are closed.
    pub fn simple() -> Self {
        Self {
            entries: vec![
                (
                    folio_types::NAMESPACE_USERPROFILES.to_string(),
                    AclConfig {
                        before: "All:".into(),
                        ..AclConfig::default()
                    },
                ),
                (
                    String::new(),
                    AclConfig::with_default("All:read,write,create,destroy,admin"),
                ),
            ],
        }
    }

    /// Configuration that applies to `namespace`.
    pub fn config_for(&self, namespace: &str) -> GateResult<&AclConfig> {
        self.entries
            .iter()
            .find(|(prefix, _)| covers(prefix, namespace))
            .map(|(_, config)| config)
            .ok_or_else(|| GateError::Config(format!("no acl configuration covers namespace {namespace:?}")))
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(prefix, _)| prefix.as_str())
    }
}

impl Default for AclMapping {
    fn default() -> Self {
        Self::simple()
    }
}

fn covers(prefix: &str, namespace: &str) -> bool {
    prefix.is_empty()
        || namespace == prefix
        || namespace
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

impl TryFrom<BTreeMap<String, AclConfig>> for AclMapping {
    type Error = GateError;

    fn try_from(map: BTreeMap<String, AclConfig>) -> Result<Self, Self::Error> {
        Self::new(map)
    }
}

impl From<AclMapping> for BTreeMap<String, AclConfig> {
    fn from(mapping: AclMapping) -> Self {
        mapping.entries.into_iter().collect()
    }
}
