//! ACL strings: parsing and evaluation.
//!
//! An ACL is a space separated list of `[+|-]Entry[,Entry...]:[right[,right...]]`.
//! Without a modifier an entry lists every right it grants and denies the
//! rest; with `+` or `-` it only grants or denies the listed rights and leaves
//! the others undecided. `Default` inserts the configured default ACL.
//! Entries are evaluated in order and the first one that decides wins.

use std::collections::BTreeMap;

use crate::principals::Principals;
use crate::rights::Right;

/// Names with built-in meaning, in the order groups are checked for them.
pub const SPECIAL_USERS: [&str; 3] = ["All", "Known", "Trusted"];

/// One parsed ACL step before `Default` expansion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AclToken<'s> {
    pub modifier: Option<char>,
    /// `None` for a `Default` token.
    pub entries: Option<Vec<&'s str>>,
    pub rights: Vec<&'s str>,
}

/// Lexer over an ACL string. Stops at the first segment without a `:`.
pub(crate) struct AclTokens<'s> {
    rest: &'s str,
}

impl<'s> AclTokens<'s> {
    pub fn new(acl: &'s str) -> Self {
        Self { rest: acl.trim() }
    }
}

impl<'s> Iterator for AclTokens<'s> {
    type Item = AclToken<'s>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let mut modifier = None;
        if let Some(c @ ('+' | '-')) = self.rest.chars().next() {
            modifier = Some(c);
            self.rest = &self.rest[1..];
        }

        if self.rest == "Default" || self.rest.starts_with("Default ") {
            self.rest = self.rest["Default".len()..].trim_start();
            return Some(AclToken {
                modifier,
                entries: None,
                rights: Vec::new(),
            });
        }

        let Some((entries, rest)) = self.rest.split_once(':') else {
            self.rest = "";
            return None;
        };
        let (rights, rest) = match rest.split_once(' ') {
            Some((rights, rest)) => (rights, rest.trim_start()),
            None => (rest, ""),
        };
        self.rest = rest;
        let entries = if entries.is_empty() {
            Vec::new()
        } else {
            entries.split(',').collect()
        };
        Some(AclToken {
            modifier,
            entries: Some(entries),
            rights: rights.split(',').filter(|r| !r.is_empty()).collect(),
        })
    }
}

/// One ACL entry: who it applies to and the rights it decides.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AclEntry {
    pub who: String,
    pub rights: BTreeMap<Right, bool>,
}

/// A parsed ACL with `Default` expanded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessControlList {
    entries: Vec<AclEntry>,
}

impl AccessControlList {
    /// Parse `acl`, expanding `Default` to `default`. Unknown rights are
    /// ignored; a segment without `:` ends the ACL.
    pub fn parse(acl: &str, default: &str) -> Self {
        let mut list = Self::default();
        list.add(acl, Some(default));
        list
    }

    fn add(&mut self, acl: &str, default: Option<&str>) {
        for token in AclTokens::new(acl) {
            let Some(entries) = token.entries else {
                // `Default` inside the default ACL is not expanded again.
                if let Some(default) = default {
                    self.add(default, None);
                }
                continue;
            };
            let listed: Vec<Right> = token.rights.iter().filter_map(|r| r.parse().ok()).collect();
            let rights: BTreeMap<Right, bool> = match token.modifier {
                Some(modifier) => listed.iter().map(|r| (*r, modifier == '+')).collect(),
                None => Right::CONTENT
                    .into_iter()
                    .map(|r| (r, listed.contains(&r)))
                    .collect(),
            };
            self.entries.extend(entries.into_iter().map(|who| AclEntry {
                who: who.to_string(),
                rights: rights.clone(),
            }));
        }
    }

    pub fn entries(&self) -> &[AclEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// May `user` exercise `right`? `None` when no entry decides.
    ///
    /// `trusted` tells whether `user` is the requester and logged in by a
    /// trusted method; it is what the `Trusted` entry checks.
    pub fn may(&self, user: &str, right: Right, principals: &dyn Principals, trusted: bool) -> Option<bool> {
        for entry in &self.entries {
            let decided = if SPECIAL_USERS.contains(&entry.who.as_str()) {
                special(&entry.who, user, right, entry, principals, trusted)
            } else if let Some(members) = principals.group_members(&entry.who) {
                if members.iter().any(|m| m == user) {
                    entry.rights.get(&right).copied()
                } else {
                    SPECIAL_USERS
                        .iter()
                        .find(|s| members.iter().any(|m| m == *s))
                        .and_then(|s| special(s, user, right, entry, principals, trusted))
                }
            } else if entry.who == user {
                entry.rights.get(&right).copied()
            } else {
                None
            };
            if decided.is_some() {
                return decided;
            }
        }
        None
    }
}

fn special(
    who: &str,
    user: &str,
    right: Right,
    entry: &AclEntry,
    principals: &dyn Principals,
    trusted: bool,
) -> Option<bool> {
    let applies = match who {
        "All" => true,
        "Known" => principals.is_known(user),
        "Trusted" => trusted,
        _ => false,
    };
    if applies {
        entry.rights.get(&right).copied()
    } else {
        None
    }
}

/// Check that every right named in `acl` exists.
///
/// Item ACLs ignore unknown rights; configured ACLs are held to this.
pub fn check_rights(acl: &str) -> Result<(), String> {
    for token in AclTokens::new(acl) {
        for right in token.rights {
            right.parse::<Right>()?;
        }
    }
    Ok(())
}
