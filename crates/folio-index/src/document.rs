//! Index documents: the searchable projection of one revision.

use std::borrow::Cow;
use std::collections::BTreeMap;

use folio_schema::{ContentType, Subscription};
use folio_types::{Action, DataId, ItemId, RevisionId, RevisionMeta};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{IndexError, IndexResult};

/// Denormalized projection of a revision's metadata plus derived content.
///
/// The same shape is stored in both indexes; LATEST_REVS simply holds the
/// document of each item's current revision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub revid: RevisionId,
    pub itemid: ItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parentid: Option<RevisionId>,
    /// Backend holding the revision. Known only to the index.
    pub backend: String,
    pub namespace: String,
    #[serde(default)]
    pub name: Vec<String>,
    #[serde(default)]
    pub mtime: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ptime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contenttype: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataid: Option<DataId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userid: Option<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wikiname: Option<String>,
    #[serde(default)]
    pub trash: bool,
    /// Text extracted from the payload, for full-text queries.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    /// Direct subscriptions of a user profile (`itemid:`, `name:`, `tags:`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscription_ids: Vec<String>,
    /// Pattern subscriptions of a user profile (`namere:`, `nameprefix:`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscription_patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl IndexDocument {
    /// Project stored metadata and payload into a document.
    ///
    /// The metadata must carry `revid` and `itemid`, which the backend and
    /// schema always fill.
    pub fn from_meta(backend: &str, meta: &RevisionMeta, data: &[u8]) -> IndexResult<Self> {
        let revid = meta
            .revid
            .clone()
            .ok_or_else(|| IndexError::InvalidDocument("missing revid".into()))?;
        let itemid = meta
            .itemid
            .clone()
            .ok_or_else(|| IndexError::InvalidDocument(format!("{revid}: missing itemid")))?;

        let (subscription_ids, subscription_patterns) = split_subscriptions(&meta.subscriptions);

        Ok(Self {
            revid,
            itemid,
            parentid: meta.parentid.clone(),
            backend: backend.to_string(),
            namespace: meta.namespace_or_default().to_string(),
            name: meta.name.clone(),
            mtime: meta.mtime.unwrap_or_default(),
            ptime: meta.ptime,
            contenttype: meta.contenttype.clone(),
            size: meta.size.unwrap_or(data.len() as u64),
            hash: meta.hash.clone(),
            dataid: meta.dataid.clone(),
            action: meta.action,
            acl: meta.acl.clone(),
            comment: meta.comment.clone(),
            summary: meta.summary.clone(),
            tags: meta.tags.clone(),
            userid: meta.userid.clone(),
            address: meta.address.clone(),
            wikiname: meta.wikiname.clone(),
            trash: meta.trash.unwrap_or(false),
            content: extract_content(meta.contenttype.as_deref(), data),
            subscription_ids,
            subscription_patterns,
            extra: meta.extra.clone(),
        })
    }

    /// Ordering key for "most recent": mtime, then revid.
    pub fn recency(&self) -> (i64, &RevisionId) {
        (self.mtime, &self.revid)
    }

    /// Values of a field, as strings, for query matching.
    pub fn values(&self, field: &Field) -> Vec<Cow<'_, str>> {
        fn one(v: &str) -> Vec<Cow<'_, str>> {
            vec![Cow::Borrowed(v)]
        }
        fn opt(v: Option<&str>) -> Vec<Cow<'_, str>> {
            v.map(one).unwrap_or_default()
        }
        fn many(v: &[String]) -> Vec<Cow<'_, str>> {
            v.iter().map(|s| Cow::Borrowed(s.as_str())).collect()
        }

        match field {
            Field::RevId => one(self.revid.as_str()),
            Field::ItemId => one(self.itemid.as_str()),
            Field::ParentId => opt(self.parentid.as_ref().map(RevisionId::as_str)),
            Field::Backend => one(&self.backend),
            Field::Namespace => one(&self.namespace),
            Field::Name => many(&self.name),
            Field::ContentType => opt(self.contenttype.as_deref()),
            Field::Hash => opt(self.hash.as_deref()),
            Field::DataId => opt(self.dataid.as_ref().map(DataId::as_str)),
            Field::Action => self
                .action
                .map(|a| vec![Cow::Owned(a.to_string())])
                .unwrap_or_default(),
            Field::Tags => many(&self.tags),
            Field::UserId => opt(self.userid.as_ref().map(ItemId::as_str)),
            Field::Wikiname => opt(self.wikiname.as_deref()),
            Field::Trash => vec![Cow::Borrowed(if self.trash { "true" } else { "false" })],
            Field::SubscriptionIds => many(&self.subscription_ids),
            Field::SubscriptionPatterns => many(&self.subscription_patterns),
            Field::Extra(key) => match self.extra.get(key) {
                Some(Value::String(s)) => one(s),
                Some(Value::Array(items)) => items.iter().map(value_text).collect(),
                Some(Value::Null) | None => Vec::new(),
                Some(other) => vec![value_text(other)],
            },
        }
    }

    /// Lowercased text searched by [`Query::Text`](crate::Query::Text).
    pub fn full_text(&self) -> String {
        let mut text = String::new();
        for part in self
            .name
            .iter()
            .chain(self.tags.iter())
            .map(String::as_str)
            .chain(self.comment.as_deref())
            .chain(self.summary.as_deref())
            .chain(std::iter::once(self.content.as_str()))
        {
            text.push_str(&part.to_lowercase());
            text.push('\n');
        }
        text
    }
}

fn value_text(v: &Value) -> Cow<'_, str> {
    match v {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}

/// Indexable fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    RevId,
    ItemId,
    ParentId,
    Backend,
    Namespace,
    /// Matches any of the item's names.
    Name,
    ContentType,
    Hash,
    DataId,
    Action,
    Tags,
    UserId,
    Wikiname,
    Trash,
    SubscriptionIds,
    SubscriptionPatterns,
    /// An extension field by key.
    Extra(String),
}

/// Text for full-text search: decoded `text/*` payloads, nothing otherwise.
fn extract_content(contenttype: Option<&str>, data: &[u8]) -> String {
    let is_text = contenttype
        .and_then(|ct| ContentType::parse(ct).ok())
        .is_some_and(|ct| ct.is_text());
    if is_text {
        String::from_utf8_lossy(data).into_owned()
    } else {
        String::new()
    }
}

/// Split subscriptions into direct ids and patterns. Malformed ones are
/// dropped; the schema rejects them before they are stored.
fn split_subscriptions(subscriptions: &[String]) -> (Vec<String>, Vec<String>) {
    let mut ids = Vec::new();
    let mut patterns = Vec::new();
    for raw in subscriptions {
        match raw.parse::<Subscription>() {
            Ok(sub) if sub.is_direct() => ids.push(raw.clone()),
            Ok(_) => patterns.push(raw.clone()),
            Err(_) => {}
        }
    }
    (ids, patterns)
}
