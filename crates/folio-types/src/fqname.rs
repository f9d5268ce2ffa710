//! Fully qualified item names.
//!
//! A fully qualified name is `namespace/name`, `name` for the default
//! namespace, or `namespace/@itemid/<hex>` to address an item by id. Splitting
//! needs the set of configured namespaces, since `/` is also legal inside
//! item names.

use std::fmt;

use crate::id::ItemId;

const ITEMID_MARKER: &str = "@itemid/";

/// How a caller refers to an item.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ItemSelector {
    /// Exact name inside a namespace.
    Name { namespace: String, name: String },
    /// The item's id.
    ItemId(ItemId),
}

impl ItemSelector {
    /// Select by name in the given namespace.
    pub fn name(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Name {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Select by name in the default namespace.
    pub fn default_ns(name: impl Into<String>) -> Self {
        Self::name(crate::NAMESPACE_DEFAULT, name)
    }

    /// Split a fully qualified name using the known namespaces.
    ///
    /// The longest namespace that prefixes `fqname` followed by `/` wins;
    /// otherwise the whole string is a name in the default namespace. An
    /// `@itemid/` part that does not hold a valid id is kept as a name.
    pub fn parse<S: AsRef<str>>(fqname: &str, namespaces: &[S]) -> Self {
        let mut candidates: Vec<&str> = namespaces
            .iter()
            .map(AsRef::as_ref)
            .filter(|ns| !ns.is_empty())
            .collect();
        candidates.sort_by_key(|ns| std::cmp::Reverse(ns.len()));

        let (namespace, rest) = candidates
            .into_iter()
            .find_map(|ns| {
                fqname
                    .strip_prefix(ns)
                    .and_then(|r| r.strip_prefix('/'))
                    .map(|r| (ns, r))
            })
            .unwrap_or((crate::NAMESPACE_DEFAULT, fqname));

        if let Some(id) = rest.strip_prefix(ITEMID_MARKER) {
            if let Ok(itemid) = ItemId::parse(id) {
                return Self::ItemId(itemid);
            }
        }
        Self::name(namespace, rest)
    }
}

impl fmt::Display for ItemSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name { namespace, name } if namespace.is_empty() => f.write_str(name),
            Self::Name { namespace, name } => write!(f, "{namespace}/{name}"),
            Self::ItemId(id) => write!(f, "{ITEMID_MARKER}{id}"),
        }
    }
}
