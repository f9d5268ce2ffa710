//! Queries and search options over index documents.

use serde::{Deserialize, Serialize};

use crate::document::{Field, IndexDocument};

/// Which of the two indexes to read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhichIndex {
    /// Every revision of every item.
    AllRevs,
    /// Only the current revision of each item.
    #[default]
    LatestRevs,
}

impl WhichIndex {
    /// On-disk name of the index.
    pub fn file_stem(self) -> &'static str {
        match self {
            Self::AllRevs => "all_revs",
            Self::LatestRevs => "latest_revs",
        }
    }
}

impl std::fmt::Display for WhichIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// A boolean query over document fields.
#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    /// Matches every document.
    Every,
    /// Exact match of any value of the field.
    Term(Field, String),
    /// Any value of the field starts with the prefix.
    Prefix(Field, String),
    /// Case-insensitive substring of names, tags, comment, summary or content.
    Text(String),
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
}

impl Query {
    pub fn term(field: Field, value: impl Into<String>) -> Self {
        Self::Term(field, value.into())
    }

    pub fn prefix(field: Field, value: impl Into<String>) -> Self {
        Self::Prefix(field, value.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Exact name within a namespace.
    pub fn name(namespace: &str, name: &str) -> Self {
        Self::And(vec![
            Self::term(Field::Namespace, namespace),
            Self::term(Field::Name, name),
        ])
    }

    pub fn not(query: Query) -> Self {
        Self::Not(Box::new(query))
    }

    /// Evaluate against one document.
    pub fn matches(&self, doc: &IndexDocument) -> bool {
        match self {
            Self::Every => true,
            Self::Term(field, value) => doc.values(field).iter().any(|v| v == value),
            Self::Prefix(field, prefix) => doc
                .values(field)
                .iter()
                .any(|v| v.starts_with(prefix.as_str())),
            Self::Text(needle) => doc.full_text().contains(&needle.to_lowercase()),
            Self::And(parts) => parts.iter().all(|q| q.matches(doc)),
            Self::Or(parts) => parts.iter().any(|q| q.matches(doc)),
            Self::Not(inner) => !inner.matches(doc),
        }
    }

    /// The narrowest exact-key lookup that every match must satisfy, if any.
    ///
    /// Lets the index consult its id and name maps instead of scanning.
    pub(crate) fn key_hint(&self) -> Option<KeyHint<'_>> {
        match self {
            Self::Term(Field::RevId, v) => Some(KeyHint::RevId(v)),
            Self::Term(Field::ItemId, v) => Some(KeyHint::ItemId(v)),
            Self::Term(Field::Name, v) => Some(KeyHint::Name(v)),
            Self::And(parts) => parts.iter().filter_map(Query::key_hint).min(),
            _ => None,
        }
    }
}

/// Exact-key lookups, ordered from most to least selective.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum KeyHint<'q> {
    RevId(&'q str),
    ItemId(&'q str),
    Name(&'q str),
}

/// Sort keys for search results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Mtime,
    Name,
    Size,
    RevId,
}

/// Ordering and paging of search results.
///
/// Without a sort key results come in revid order. `page` is 1-based; it
/// takes precedence over `limit`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub sort: Option<SortKey>,
    pub reverse: bool,
    pub limit: Option<usize>,
    pub page: Option<(usize, usize)>,
}

impl SearchOptions {
    pub fn sorted(sort: SortKey) -> Self {
        Self {
            sort: Some(sort),
            ..Self::default()
        }
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn page(mut self, page: usize, pagelen: usize) -> Self {
        self.page = Some((page, pagelen));
        self
    }

    /// Sort and cut a result set in place.
    pub(crate) fn apply<T: AsRef<IndexDocument>>(&self, docs: &mut Vec<T>) {
        match self.sort.unwrap_or(SortKey::RevId) {
            SortKey::RevId => docs.sort_by(|a, b| a.as_ref().revid.cmp(&b.as_ref().revid)),
            SortKey::Mtime => docs.sort_by(|a, b| a.as_ref().recency().cmp(&b.as_ref().recency())),
            SortKey::Size => docs.sort_by_key(|d| (d.as_ref().size, d.as_ref().revid.clone())),
            SortKey::Name => docs.sort_by(|a, b| {
                let (a, b) = (a.as_ref(), b.as_ref());
                a.name.first().cmp(&b.name.first()).then_with(|| a.revid.cmp(&b.revid))
            }),
        }
        if self.reverse {
            docs.reverse();
        }
        self.cut(docs);
    }

    /// The same ordering without paging or limit.
    pub fn unpaged(&self) -> Self {
        Self {
            limit: None,
            page: None,
            ..self.clone()
        }
    }

    /// Apply only the page or limit to already ordered results.
    pub fn cut<T>(&self, items: &mut Vec<T>) {
        if let Some((page, pagelen)) = self.page {
            let start = page.saturating_sub(1).saturating_mul(pagelen);
            let end = start.saturating_add(pagelen).min(items.len());
            if start >= items.len() {
                items.clear();
            } else {
                items.truncate(end);
                items.drain(..start);
            }
        } else if let Some(limit) = self.limit {
            items.truncate(limit);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use folio_types::{ItemId, RevisionId, RevisionMeta};

    use super::*;

    fn doc(name: &str, mtime: i64, size: usize) -> Arc<IndexDocument> {
        let meta = RevisionMeta {
            revid: Some(RevisionId::new()),
            itemid: Some(ItemId::new()),
            contenttype: Some("text/plain;charset=utf-8".into()),
            mtime: Some(mtime),
            tags: vec!["wiki".into()],
            ..RevisionMeta::named(name)
        };
        Arc::new(IndexDocument::from_meta("default", &meta, &vec![b'x'; size]).unwrap())
    }

    #[test]
    fn boolean_queries() {
        let d = doc("HelpOnMacros", 1, 3);
        assert!(Query::Every.matches(&d));
        assert!(Query::name("", "HelpOnMacros").matches(&d));
        assert!(!Query::name("users", "HelpOnMacros").matches(&d));
        assert!(Query::prefix(Field::Name, "Help").matches(&d));
        assert!(Query::text("onmacro").matches(&d));
        assert!(Query::text("XXX").matches(&d));
        assert!(Query::Or(vec![Query::term(Field::Tags, "nope"), Query::term(Field::Tags, "wiki")]).matches(&d));
        assert!(!Query::not(Query::Every).matches(&d));
    }

    #[test]
    fn key_hint_prefers_revid() {
        let q = Query::And(vec![
            Query::term(Field::Name, "A"),
            Query::term(Field::RevId, "r"),
            Query::text("t"),
        ]);
        assert_eq!(q.key_hint(), Some(KeyHint::RevId("r")));
        assert_eq!(Query::text("t").key_hint(), None);
        assert_eq!(Query::Or(vec![Query::term(Field::Name, "A")]).key_hint(), None);
    }

    #[test]
    fn sorting_and_paging() {
        let mut docs = vec![doc("b", 3, 1), doc("a", 1, 3), doc("c", 2, 2)];

        SearchOptions::sorted(SortKey::Name).apply(&mut docs);
        assert_eq!(docs[0].name[0], "a");

        SearchOptions::sorted(SortKey::Mtime).reversed().apply(&mut docs);
        assert_eq!(docs.iter().map(|d| d.mtime).collect::<Vec<_>>(), vec![3, 2, 1]);

        let mut paged = docs.clone();
        SearchOptions::sorted(SortKey::Size).page(2, 2).apply(&mut paged);
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].size, 3);

        let mut beyond = docs.clone();
        SearchOptions::default().page(5, 2).apply(&mut beyond);
        assert!(beyond.is_empty());

        SearchOptions::default().limit(2).apply(&mut docs);
        assert_eq!(docs.len(), 2);
        assert!(docs[0].revid < docs[1].revid);
    }
}
