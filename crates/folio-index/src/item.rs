//! Items: the revisions sharing one item id, addressed by name or id.

use std::io::Read;
use std::sync::Arc;

use folio_schema::{parent_name, validate_data, validate_meta, Subscription, ValidationState};
use folio_types::{utc_now, Action, DataId, ItemId, ItemSelector, RevisionId, RevisionMeta};
use tracing::{debug, info};

use crate::document::{Field, IndexDocument};
use crate::error::{IndexError, IndexResult};
use crate::middleware::IndexingMiddleware;
use crate::query::{Query, SearchOptions, WhichIndex};
use crate::revision::{Revision, Search};

/// How [`Item::store_revision`] treats its input.
#[derive(Clone, Debug, Default)]
pub struct StoreOptions {
    /// Allow replacing a revision that already exists.
    pub overwrite: bool,
    /// Keep the submitted `itemid`, `mtime`, `action`, `address` and `userid`.
    pub trusted: bool,
    /// Recorded action; `SAVE` when unset.
    pub action: Option<Action>,
    /// Address of the requester.
    pub address: Option<String>,
    /// User id of the requester.
    pub userid: Option<ItemId>,
    /// Content type guessed from the name or data.
    pub contenttype_guessed: Option<String>,
}

impl StoreOptions {
    /// Options for restoring or rewriting revisions as they are.
    pub fn trusted_overwrite() -> Self {
        Self {
            overwrite: true,
            trusted: true,
            ..Self::default()
        }
    }
}

/// An item: existing, or about to be created by its first revision.
pub struct Item<'a> {
    indexer: &'a IndexingMiddleware,
    selector: ItemSelector,
    current: Option<Arc<IndexDocument>>,
}

impl std::fmt::Debug for Item<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("selector", &self.selector)
            .field("current", &self.current.as_ref().map(|d| &d.revid))
            .finish()
    }
}

impl<'a> Item<'a> {
    pub(crate) fn new(
        indexer: &'a IndexingMiddleware,
        selector: ItemSelector,
        current: Option<Arc<IndexDocument>>,
    ) -> Self {
        Self {
            indexer,
            selector,
            current,
        }
    }

    pub fn selector(&self) -> &ItemSelector {
        &self.selector
    }

    pub fn indexer(&self) -> &'a IndexingMiddleware {
        self.indexer
    }

    pub fn exists(&self) -> bool {
        self.current.is_some()
    }

    /// The current revision, if the item exists.
    pub fn current(&self) -> Option<Revision<'a>> {
        self.current
            .as_ref()
            .map(|doc| Revision::new(self.indexer, Arc::clone(doc)))
    }

    pub fn itemid(&self) -> Option<&ItemId> {
        match (&self.current, &self.selector) {
            (Some(doc), _) => Some(&doc.itemid),
            (None, ItemSelector::ItemId(itemid)) => Some(itemid),
            (None, ItemSelector::Name { .. }) => None,
        }
    }

    /// Names of the current revision, or the selected name for a new item.
    pub fn names(&self) -> Vec<String> {
        match (&self.current, &self.selector) {
            (Some(doc), _) => doc.name.clone(),
            (None, ItemSelector::Name { name, .. }) => vec![name.clone()],
            (None, ItemSelector::ItemId(_)) => Vec::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        match (&self.current, &self.selector) {
            (Some(doc), _) => &doc.namespace,
            (None, ItemSelector::Name { namespace, .. }) => namespace,
            (None, ItemSelector::ItemId(_)) => folio_types::NAMESPACE_DEFAULT,
        }
    }

    /// The item's own ACL, if it has one.
    pub fn acl(&self) -> Option<&str> {
        self.current.as_ref().and_then(|d| d.acl.as_deref())
    }

    /// Hierarchic parents: each name with its last `/` segment removed.
    pub fn parent_names(&self) -> Vec<String> {
        let mut parents: Vec<String> = Vec::new();
        for name in self.names() {
            if let Some(parent) = parent_name(&name) {
                if !parents.iter().any(|p| p == parent) {
                    parents.push(parent.to_string());
                }
            }
        }
        parents
    }

    /// Item ids of the existing parents.
    pub fn parent_ids(&self) -> IndexResult<Vec<ItemId>> {
        let mut ids = Vec::new();
        for parent in self.parent_names() {
            let selector = ItemSelector::name(self.namespace(), parent);
            if let Some(doc) = self.indexer.current_document(&selector)? {
                if !ids.contains(&doc.itemid) {
                    ids.push(doc.itemid.clone());
                }
            }
        }
        Ok(ids)
    }

    /// Current user profiles with a subscription matching this item.
    pub fn subscribers(&self) -> IndexResult<Search<'a>> {
        let Some(itemid) = self.itemid() else {
            return Ok(Search::new(self.indexer, Vec::new()));
        };
        let names = self.names();
        let tags = self
            .current
            .as_ref()
            .map(|doc| doc.tags.clone())
            .unwrap_or_default();
        let subscribed = Query::Or(vec![
            Query::prefix(Field::SubscriptionIds, ""),
            Query::prefix(Field::SubscriptionPatterns, ""),
        ]);
        let docs = self
            .indexer
            .query_docs(&subscribed, &SearchOptions::default(), WhichIndex::LatestRevs)?
            .into_iter()
            .filter(|doc| {
                doc.subscription_ids
                    .iter()
                    .chain(&doc.subscription_patterns)
                    .filter_map(|raw| raw.parse::<Subscription>().ok())
                    .any(|sub| sub.matches(itemid, self.namespace(), &names, &tags))
            })
            .collect();
        Ok(Search::new(self.indexer, docs))
    }

    /// Every revision, oldest first by `(mtime, revid)`.
    pub fn iter_revisions(&self) -> IndexResult<Search<'a>> {
        let docs = match self.itemid() {
            Some(itemid) => self.indexer.item_revisions(itemid)?,
            None => Vec::new(),
        };
        Ok(Search::new(self.indexer, docs))
    }

    /// One revision of this item.
    pub fn get_revision(&self, revid: &RevisionId) -> IndexResult<Revision<'a>> {
        let doc = self
            .indexer
            .revision_document(revid)?
            .filter(|doc| Some(&doc.itemid) == self.itemid())
            .ok_or_else(|| IndexError::NotFound(format!("revision {revid} of item {}", self.selector)))?;
        Ok(Revision::new(self.indexer, doc))
    }

    /// Reload the current revision from LATEST_REVS.
    pub fn refresh(&mut self) -> IndexResult<()> {
        let selector = match self.itemid() {
            Some(itemid) => ItemSelector::ItemId(itemid.clone()),
            None => self.selector.clone(),
        };
        self.current = self.indexer.current_document(&selector)?;
        Ok(())
    }

    fn validation_state(&self, options: &StoreOptions) -> ValidationState {
        let name = match &self.selector {
            ItemSelector::Name { name, .. } => Some(name.clone()),
            ItemSelector::ItemId(_) => self.names().into_iter().next(),
        };
        ValidationState {
            trusted: options.trusted,
            itemid: self.itemid().cloned(),
            name,
            namespace: self.namespace().to_string(),
            wikiname: self.indexer.wikiname().map(str::to_string),
            action: options.action.unwrap_or(Action::Save),
            address: options.address.clone(),
            userid: options.userid.clone(),
            contenttype_current: self.current.as_ref().and_then(|d| d.contenttype.clone()),
            contenttype_guessed: options.contenttype_guessed.clone(),
            now: utc_now(),
        }
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Validate, store and index a new revision.
    ///
    /// An existing `revid` is rejected unless `options.overwrite` is set.
    /// `parentid` defaults to the current revision and `summary` to empty.
    pub fn store_revision(
        &mut self,
        mut meta: RevisionMeta,
        data: &mut dyn Read,
        options: &StoreOptions,
    ) -> IndexResult<Revision<'a>> {
        let mut buf = Vec::new();
        data.read_to_end(&mut buf)?;

        validate_meta(&mut meta, &self.validation_state(options))?;
        validate_data(&meta, &buf)?;

        if !options.overwrite {
            if let Some(revid) = &meta.revid {
                if self.indexer.revision_document(revid)?.is_some()
                    || self.indexer.backend().locate(revid)?.is_some()
                {
                    return Err(IndexError::RevisionExists(revid.clone()));
                }
            }
            if meta.parentid.is_none() {
                meta.parentid = self.current.as_ref().map(|d| d.revid.clone());
            }
        }
        if meta.summary.is_none() {
            meta.summary = Some(String::new());
        }

        let backend = self.indexer.backend();
        let (backend_name, revid) = backend.store(meta, &mut buf.as_slice())?;
        let stored = backend.retrieve_meta(&backend_name, &revid)?;
        let doc = self.indexer.index_revision(&backend_name, &stored, &buf)?;
        self.refresh()?;

        debug!(revid = %revid, item = %self.selector, overwrite = options.overwrite, "revision stored");
        Ok(Revision::new(self.indexer, doc))
    }

    /// Overwrite every revision with the same metadata and payload, keeping
    /// each revision's id, and its `mtime` and `parentid` unless `meta` sets
    /// them. The payload is stored once and shared.
    pub fn store_all_revisions(&mut self, meta: RevisionMeta, data: &[u8]) -> IndexResult<usize> {
        let Some(itemid) = self.itemid().cloned() else {
            return Ok(0);
        };
        let docs: Vec<Arc<IndexDocument>> = self
            .iter_revisions()?
            .map(Revision::into_document)
            .collect();

        let options = StoreOptions::trusted_overwrite();
        let mut shared: Option<(DataId, u64, String)> = None;
        for doc in &docs {
            let mut rev_meta = meta.clone();
            rev_meta.revid = Some(doc.revid.clone());
            rev_meta.itemid = Some(itemid.clone());
            rev_meta.mtime = rev_meta.mtime.or(Some(doc.mtime));
            if rev_meta.parentid.is_none() {
                rev_meta.parentid = doc.parentid.clone();
            }
            match &shared {
                Some((dataid, size, hash)) => {
                    rev_meta.dataid = Some(dataid.clone());
                    rev_meta.size = Some(*size);
                    rev_meta.hash = Some(hash.clone());
                }
                None => rev_meta.dataid = None,
            }
            let stored = self.store_revision(rev_meta, &mut &data[..], &options)?;
            if shared.is_none() {
                let doc = stored.document();
                if let (Some(dataid), Some(hash)) = (doc.dataid.clone(), doc.hash.clone()) {
                    shared = Some((dataid, doc.size, hash));
                }
            }
        }
        info!(item = %self.selector, revisions = docs.len(), "all revisions overwritten");
        Ok(docs.len())
    }

    /// Destroy one revision for good.
    ///
    /// The payload is destroyed only when no other revision references its
    /// `dataid`. Revisions whose parent was the destroyed one are re-parented
    /// onto its parent.
    pub fn destroy_revision(&mut self, revid: &RevisionId) -> IndexResult<()> {
        let doc = self.get_revision(revid)?.into_document();
        self.destroy_document(&doc)?;

        let children: Vec<Revision<'a>> = self
            .indexer
            .documents(WhichIndex::AllRevs, &[(Field::ParentId, revid.as_str())])?
            .collect();
        for child in children {
            let mut meta = child.meta()?;
            let data = child.read_data()?;
            meta.parentid = doc.parentid.clone();
            self.store_revision(meta, &mut data.as_slice(), &StoreOptions::trusted_overwrite())?;
        }

        self.refresh()?;
        info!(revid = %revid, item = %self.selector, "revision destroyed");
        Ok(())
    }

    /// Destroy every revision of the item.
    pub fn destroy_all_revisions(&mut self) -> IndexResult<usize> {
        let docs: Vec<Arc<IndexDocument>> = self
            .iter_revisions()?
            .map(Revision::into_document)
            .collect();
        for doc in &docs {
            self.destroy_document(doc)?;
        }
        self.refresh()?;
        info!(item = %self.selector, revisions = docs.len(), "item destroyed");
        Ok(docs.len())
    }

    fn destroy_document(&self, doc: &IndexDocument) -> IndexResult<()> {
        let refcount = match &doc.dataid {
            Some(dataid) => self
                .indexer
                .documents(WhichIndex::AllRevs, &[(Field::DataId, dataid.as_str())])?
                .len(),
            None => 0,
        };
        self.indexer
            .backend()
            .remove(&doc.backend, &doc.revid, refcount <= 1)?;
        self.indexer.remove_revision(&doc.revid)
    }
}

#[cfg(test)]
mod tests {
    use folio_store::{MemoryStore, RoutingBackend, StoresBackend};
    use folio_types::{CONTENTTYPE_DEFAULT, NAMESPACE_USERPROFILES};

    use super::*;
    use crate::middleware::IndexLocation;

    fn indexer() -> IndexingMiddleware {
        let backend = || -> Arc<dyn folio_store::Backend> {
            Arc::new(StoresBackend::new(
                Arc::new(MemoryStore::new()),
                Arc::new(MemoryStore::new()),
            ))
        };
        let routing = RoutingBackend::new(
            vec![
                (NAMESPACE_USERPROFILES.to_string(), "users".to_string()),
                (String::new(), "default".to_string()),
            ],
            [
                ("default".to_string(), backend()),
                ("users".to_string(), backend()),
            ]
            .into_iter()
            .collect(),
        )
        .unwrap();
        let indexer = IndexingMiddleware::new(IndexLocation::Memory, Arc::new(routing))
            .with_wikiname("TestWiki");
        indexer.create(false).unwrap();
        indexer.open().unwrap();
        indexer
    }

    fn text_meta() -> RevisionMeta {
        RevisionMeta {
            contenttype: Some(CONTENTTYPE_DEFAULT.into()),
            ..RevisionMeta::default()
        }
    }

    fn store(item: &mut Item<'_>, data: &[u8]) -> RevisionId {
        item.store_revision(text_meta(), &mut &data[..], &StoreOptions::default())
            .unwrap()
            .revid()
            .clone()
    }

    // ---------------------------------------------------------------
    // Storing
    // ---------------------------------------------------------------

    #[test]
    fn two_revisions_then_destroy_latest() {
        let indexer = indexer();
        let mut item = indexer.create_item(ItemSelector::default_ns("Foo")).unwrap();
        let a = store(&mut item, b"x");
        let b = store(&mut item, b"xx");

        let current = item.current().unwrap();
        assert_eq!(current.revid(), &b);
        assert_eq!(current.read_data().unwrap(), b"xx");
        assert_eq!(current.parentid(), Some(&a));

        let revids: Vec<RevisionId> = item
            .iter_revisions()
            .unwrap()
            .map(|r| r.revid().clone())
            .collect();
        assert_eq!(revids, vec![a.clone(), b.clone()]);

        item.destroy_revision(&b).unwrap();
        let current = item.current().unwrap();
        assert_eq!(current.revid(), &a);
        assert_eq!(current.read_data().unwrap(), b"x");
        assert_eq!(item.iter_revisions().unwrap().len(), 1);
    }

    #[test]
    fn stored_metadata_is_completed() {
        let indexer = indexer();
        let mut item = indexer.get_item(ItemSelector::default_ns("Bar")).unwrap();
        assert!(!item.exists());
        store(&mut item, b"hello");

        let meta = item.current().unwrap().meta().unwrap();
        assert_eq!(meta.name, vec!["Bar".to_string()]);
        assert_eq!(meta.namespace.as_deref(), Some(""));
        assert_eq!(meta.size, Some(5));
        assert_eq!(meta.hash.as_deref().map(str::len), Some(64));
        assert_eq!(meta.summary.as_deref(), Some(""));
        assert_eq!(meta.wikiname.as_deref(), Some("TestWiki"));
        assert_eq!(meta.action, Some(Action::Save));
        assert!(meta.itemid.is_some());
        assert!(meta.parentid.is_none());
    }

    #[test]
    fn invalid_metadata_is_rejected_before_storing() {
        let indexer = indexer();
        let mut item = indexer.get_item(ItemSelector::default_ns("Bad")).unwrap();
        let meta = RevisionMeta {
            contenttype: Some("text/plain".into()),
            ..RevisionMeta::default()
        };
        let err = item
            .store_revision(meta, &mut &b"x"[..], &StoreOptions::default())
            .unwrap_err();
        assert!(matches!(err, IndexError::Validation(_)));
        assert!(indexer.backend().revisions().unwrap().is_empty());
    }

    #[test]
    fn existing_revid_needs_overwrite() {
        let indexer = indexer();
        let mut item = indexer.get_item(ItemSelector::default_ns("Foo")).unwrap();
        let revid = store(&mut item, b"x");

        let meta = RevisionMeta {
            revid: Some(revid.clone()),
            ..text_meta()
        };
        let err = item
            .store_revision(meta.clone(), &mut &b"y"[..], &StoreOptions::default())
            .unwrap_err();
        assert!(matches!(err, IndexError::RevisionExists(_)));

        let rev = item
            .store_revision(meta, &mut &b"y"[..], &StoreOptions { overwrite: true, ..Default::default() })
            .unwrap();
        assert_eq!(rev.revid(), &revid);
        assert_eq!(rev.read_data().unwrap(), b"y");
        assert_eq!(item.iter_revisions().unwrap().len(), 1);
    }

    #[test]
    fn unindexed_revid_needs_overwrite() {
        let indexer = indexer();
        let revid = RevisionId::new();
        let original = RevisionMeta {
            revid: Some(revid.clone()),
            itemid: Some(ItemId::new()),
            namespace: Some(String::new()),
            mtime: Some(utc_now()),
            ..RevisionMeta::named("Original")
        };
        let (backend_name, _) = indexer.backend().store(original, &mut &b"first"[..]).unwrap();

        let mut item = indexer.get_item(ItemSelector::default_ns("Intruder")).unwrap();
        let meta = RevisionMeta {
            revid: Some(revid.clone()),
            ..text_meta()
        };
        let err = item
            .store_revision(meta, &mut &b"second"[..], &StoreOptions::default())
            .unwrap_err();
        assert!(matches!(err, IndexError::RevisionExists(_)));

        let kept = indexer.backend().retrieve_meta(&backend_name, &revid).unwrap();
        assert_eq!(kept.name, vec!["Original".to_string()]);
        assert!(!item.exists());
    }

    #[test]
    fn user_profiles_route_to_their_backend() {
        let indexer = indexer();
        let mut item = indexer
            .get_item(ItemSelector::name(NAMESPACE_USERPROFILES, "alice"))
            .unwrap();
        let meta = RevisionMeta {
            contenttype: Some(folio_types::CONTENTTYPE_USER.into()),
            subscriptions: vec!["name::Foo".into()],
            ..RevisionMeta::default()
        };
        let rev = item
            .store_revision(meta, &mut &b""[..], &StoreOptions::default())
            .unwrap();
        assert_eq!(rev.backend_name(), "users");
        assert_eq!(rev.namespace(), NAMESPACE_USERPROFILES);
        assert_eq!(rev.document().subscription_ids, vec!["name::Foo".to_string()]);
        assert!(indexer.has_item(NAMESPACE_USERPROFILES, "alice").unwrap());
        assert!(!indexer.has_item("", "alice").unwrap());
    }

    #[test]
    fn subscribers_of_an_item() {
        let indexer = indexer();
        let mut page = indexer.get_item(ItemSelector::name("", "HelpOnLinking")).unwrap();
        assert_eq!(page.subscribers().unwrap().count(), 0);
        let meta = RevisionMeta {
            tags: vec!["docs".into()],
            ..text_meta()
        };
        page.store_revision(meta, &mut &b"links"[..], &StoreOptions::default())
            .unwrap();
        let itemid = page.itemid().unwrap().clone();

        let profile = |name: &str, subscriptions: &[String]| {
            let mut item = indexer
                .get_item(ItemSelector::name(NAMESPACE_USERPROFILES, name))
                .unwrap();
            let meta = RevisionMeta {
                contenttype: Some(folio_types::CONTENTTYPE_USER.into()),
                subscriptions: subscriptions.to_vec(),
                ..RevisionMeta::default()
            };
            item.store_revision(meta, &mut &b""[..], &StoreOptions::default())
                .unwrap();
        };
        profile("alice", &[format!("itemid:{itemid}")]);
        profile("bob", &["tags::docs".into()]);
        profile("carol", &["namere::^Help".into()]);
        profile("dave", &["name::Other".into(), "nameprefix:help:Help".into()]);
        profile("erin", &[]);

        let mut names: Vec<String> = page
            .subscribers()
            .unwrap()
            .flat_map(|rev| rev.document().name.clone())
            .collect();
        names.sort();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }

    // ---------------------------------------------------------------
    // Item lookup
    // ---------------------------------------------------------------

    #[test]
    fn create_and_existing_item() {
        let indexer = indexer();
        assert!(indexer
            .existing_item(ItemSelector::default_ns("Foo"))
            .unwrap_err()
            .is_not_found());

        let mut item = indexer.create_item(ItemSelector::default_ns("Foo")).unwrap();
        store(&mut item, b"x");
        let itemid = item.itemid().unwrap().clone();

        assert!(matches!(
            indexer.create_item(ItemSelector::default_ns("Foo")),
            Err(IndexError::ItemAlreadyExists(_))
        ));
        let by_id = indexer.existing_item(ItemSelector::ItemId(itemid.clone())).unwrap();
        assert_eq!(by_id.names(), vec!["Foo".to_string()]);

        let looked_up = indexer.lookup(&format!("@itemid/{itemid}")).unwrap();
        assert!(looked_up.exists());
        assert!(indexer.lookup("Foo").unwrap().exists());
    }

    #[test]
    fn parents_of_nested_names() {
        let indexer = indexer();
        let mut parent = indexer.get_item(ItemSelector::default_ns("Docs")).unwrap();
        store(&mut parent, b"parent");
        let child = indexer.get_item(ItemSelector::default_ns("Docs/Intro/Part")).unwrap();

        assert_eq!(child.parent_names(), vec!["Docs/Intro".to_string()]);
        assert!(child.parent_ids().unwrap().is_empty());

        let mid = indexer.get_item(ItemSelector::default_ns("Docs/Intro")).unwrap();
        assert_eq!(mid.parent_ids().unwrap(), vec![parent.itemid().unwrap().clone()]);
    }

    // ---------------------------------------------------------------
    // Destroying
    // ---------------------------------------------------------------

    #[test]
    fn destroying_reparents_children() {
        let indexer = indexer();
        let mut item = indexer.get_item(ItemSelector::default_ns("Foo")).unwrap();
        let a = store(&mut item, b"1");
        let b = store(&mut item, b"2");
        let c = store(&mut item, b"3");

        item.destroy_revision(&b).unwrap();
        let c_rev = item.get_revision(&c).unwrap();
        assert_eq!(c_rev.parentid(), Some(&a));
        assert_eq!(c_rev.meta().unwrap().parentid, Some(a));
        assert_eq!(item.current().unwrap().revid(), &c);
    }

    #[test]
    fn shared_payload_survives_until_last_reference() {
        let indexer = indexer();
        let mut item = indexer.get_item(ItemSelector::default_ns("Foo")).unwrap();
        store(&mut item, b"first");
        store(&mut item, b"second");

        let replaced = item.store_all_revisions(text_meta(), b"same").unwrap();
        assert_eq!(replaced, 2);
        let revs: Vec<Revision<'_>> = item.iter_revisions().unwrap().collect();
        assert_eq!(revs[0].document().dataid, revs[1].document().dataid);

        let first = revs[0].revid().clone();
        item.destroy_revision(&first).unwrap();
        assert_eq!(item.current().unwrap().read_data().unwrap(), b"same");
    }

    #[test]
    fn destroy_all_removes_item() {
        let indexer = indexer();
        let mut item = indexer.get_item(ItemSelector::default_ns("Foo")).unwrap();
        store(&mut item, b"1");
        store(&mut item, b"2");

        assert_eq!(item.destroy_all_revisions().unwrap(), 2);
        assert!(!item.exists());
        assert!(indexer.backend().revisions().unwrap().is_empty());
        let all = indexer
            .search(&Query::Every, &SearchOptions::default(), WhichIndex::AllRevs)
            .unwrap();
        assert_eq!(all.len(), 0);
    }
}
