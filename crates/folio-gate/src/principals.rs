//! Who is known and who belongs to which group.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Answers the identity questions ACL evaluation asks.
pub trait Principals: Send + Sync {
    /// Is there an account named `user`?
    fn is_known(&self, user: &str) -> bool;

    /// Members of `group`, or `None` if no such group exists.
    fn group_members(&self, group: &str) -> Option<Vec<String>>;
}

/// Fixed users and groups, usually loaded from configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticPrincipals {
    pub known: BTreeSet<String>,
    pub groups: BTreeMap<String, Vec<String>>,
}

impl StaticPrincipals {
    pub fn with_known<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known.extend(users.into_iter().map(Into::into));
        self
    }

    pub fn with_group<I, S>(mut self, group: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .entry(group.into())
            .or_default()
            .extend(members.into_iter().map(Into::into));
        self
    }
}

impl Principals for StaticPrincipals {
    fn is_known(&self, user: &str) -> bool {
        self.known.contains(user)
    }

    fn group_members(&self, group: &str) -> Option<Vec<String>> {
        self.groups.get(group).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_and_known_users() {
        let p = StaticPrincipals::default()
            .with_known(["Alice"])
            .with_group("Editors", ["Alice", "Bob"])
            .with_group("Editors", ["Carol"]);
        assert!(p.is_known("Alice"));
        assert!(!p.is_known("Bob"));
        assert_eq!(p.group_members("Editors").unwrap(), vec!["Alice", "Bob", "Carol"]);
        assert!(p.group_members("Admins").is_none());
    }

    #[test]
    fn loads_from_toml() {
        let p: StaticPrincipals = toml::from_str(
            r#"
            known = ["Alice"]
            [groups]
            Admins = ["Alice"]
            "#,
        )
        .unwrap();
        assert!(p.is_known("Alice"));
        assert_eq!(p.group_members("Admins").unwrap(), vec!["Alice"]);
    }
}
