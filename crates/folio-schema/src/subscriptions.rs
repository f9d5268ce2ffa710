//! Subscription patterns stored on user profiles.
//!
//! A subscription is `itemid:<id>` or `keyword:namespace:value` where the
//! keyword picks how `value` is matched against item names or tags.

use std::fmt;
use std::str::FromStr;

use folio_types::ItemId;
use regex::Regex;

use crate::names::{validate_name, validate_namespace, validate_tag};

/// A parsed subscription.
#[derive(Clone, Debug)]
pub enum Subscription {
    /// One specific item.
    ItemId(ItemId),
    /// Items with this exact name.
    Name { namespace: String, name: String },
    /// Items carrying this tag.
    Tags { namespace: String, tag: String },
    /// Items whose name matches the regex.
    NameRe { namespace: String, pattern: Regex },
    /// Items whose name starts with the prefix.
    NamePrefix { namespace: String, prefix: String },
}

impl Subscription {
    /// Whether this subscription targets an item id or a name/tag directly,
    /// as opposed to a pattern.
    pub fn is_direct(&self) -> bool {
        matches!(
            self,
            Self::ItemId(_) | Self::Name { .. } | Self::Tags { .. }
        )
    }

    /// Whether an item with these names and tags in `namespace` matches.
    pub fn matches(&self, itemid: &ItemId, namespace: &str, names: &[String], tags: &[String]) -> bool {
        match self {
            Self::ItemId(id) => id == itemid,
            Self::Name { namespace: ns, name } => ns == namespace && names.contains(name),
            Self::Tags { namespace: ns, tag } => ns == namespace && tags.contains(tag),
            Self::NameRe { namespace: ns, pattern } => {
                ns == namespace && names.iter().any(|n| pattern.is_match(n))
            }
            Self::NamePrefix { namespace: ns, prefix } => {
                ns == namespace && names.iter().any(|n| n.starts_with(prefix.as_str()))
            }
        }
    }
}

impl FromStr for Subscription {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (keyword, rest) = s
            .split_once(':')
            .ok_or_else(|| format!("{s:?} is not keyword:value"))?;
        if keyword == "itemid" {
            return ItemId::parse(rest)
                .map(Self::ItemId)
                .map_err(|e| e.to_string());
        }

        let (namespace, value) = rest
            .split_once(':')
            .ok_or_else(|| format!("{s:?} is not keyword:namespace:value"))?;
        validate_namespace(namespace)?;
        let namespace = namespace.to_string();

        match keyword {
            "name" => {
                validate_name(value)?;
                Ok(Self::Name {
                    namespace,
                    name: value.to_string(),
                })
            }
            "tags" => {
                validate_tag(value)?;
                Ok(Self::Tags {
                    namespace,
                    tag: value.to_string(),
                })
            }
            "namere" => Regex::new(value)
                .map(|pattern| Self::NameRe { namespace, pattern })
                .map_err(|e| format!("bad pattern {value:?}: {e}")),
            "nameprefix" => Ok(Self::NamePrefix {
                namespace,
                prefix: value.to_string(),
            }),
            other => Err(format!("unknown subscription keyword {other:?}")),
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ItemId(id) => write!(f, "itemid:{id}"),
            Self::Name { namespace, name } => write!(f, "name:{namespace}:{name}"),
            Self::Tags { namespace, tag } => write!(f, "tags:{namespace}:{tag}"),
            Self::NameRe { namespace, pattern } => write!(f, "namere:{namespace}:{}", pattern.as_str()),
            Self::NamePrefix { namespace, prefix } => write!(f, "nameprefix:{namespace}:{prefix}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_forms() {
        let id = ItemId::new();
        for s in [
            format!("itemid:{id}"),
            "name::foo".to_string(),
            "tags::bar".to_string(),
            "namere::".to_string(),
            "namere::^Help.*".to_string(),
            "nameprefix:userprofiles:a".to_string(),
        ] {
            let sub: Subscription = s.parse().unwrap_or_else(|e| panic!("{s}: {e}"));
            assert_eq!(sub.to_string(), s);
        }
    }

    #[test]
    fn rejected_forms() {
        for s in ["", "unknown_tag:123", "itemid:123", "name:foo", "namere::(", "name::/x"] {
            assert!(s.parse::<Subscription>().is_err(), "{s:?}");
        }
    }

    #[test]
    fn matching() {
        let itemid = ItemId::new();
        let names = vec!["HelpOnLinking".to_string()];
        let tags = vec!["docs".to_string()];
        let matches = |s: &str| {
            s.parse::<Subscription>()
                .unwrap()
                .matches(&itemid, "", &names, &tags)
        };
        assert!(matches(&format!("itemid:{itemid}")));
        assert!(matches("name::HelpOnLinking"));
        assert!(matches("tags::docs"));
        assert!(matches("namere::^Help"));
        assert!(matches("nameprefix::Help"));
        assert!(!matches("nameprefix:userprofiles:Help"));
        assert!(!matches("name::Other"));
    }

    #[test]
    fn direct_versus_pattern() {
        assert!("name::foo".parse::<Subscription>().unwrap().is_direct());
        assert!(!"namere::foo".parse::<Subscription>().unwrap().is_direct());
    }
}
