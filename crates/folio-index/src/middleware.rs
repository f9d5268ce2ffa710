//! The indexing middleware: keeps ALL_REVS and LATEST_REVS in step with the
//! backend and answers item and search queries from them.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use folio_schema::ContentType;
use folio_store::RoutingBackend;
use folio_types::{ItemId, ItemSelector, RevisionId, RevisionMeta};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::document::{Field, IndexDocument};
use crate::error::{IndexError, IndexResult};
use crate::index::DocIndex;
use crate::item::Item;
use crate::journal::Journal;
use crate::query::{Query, SearchOptions, WhichIndex};
use crate::revision::{Revision, Search};

/// Where the indexes live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexLocation {
    /// Volatile indexes, lost when the middleware is dropped.
    Memory,
    /// Snapshot and journal files under this directory. The temporary
    /// location is the same path with `.temp` appended.
    Directory(PathBuf),
}

impl IndexLocation {
    fn dir(&self, tmp: bool) -> Option<PathBuf> {
        match self {
            Self::Memory => None,
            Self::Directory(path) if tmp => {
                let mut s: OsString = path.as_os_str().to_owned();
                s.push(".temp");
                Some(PathBuf::from(s))
            }
            Self::Directory(path) => Some(path.clone()),
        }
    }
}

/// ALL_REVS and LATEST_REVS, opened together.
#[derive(Debug)]
struct IndexPair {
    all: DocIndex,
    latest: DocIndex,
}

impl IndexPair {
    fn in_memory() -> Self {
        Self {
            all: DocIndex::in_memory(WhichIndex::AllRevs),
            latest: DocIndex::in_memory(WhichIndex::LatestRevs),
        }
    }

    fn create(dir: &Path) -> IndexResult<Self> {
        Ok(Self {
            all: DocIndex::create(dir, WhichIndex::AllRevs)?,
            latest: DocIndex::create(dir, WhichIndex::LatestRevs)?,
        })
    }

    fn open(dir: &Path) -> IndexResult<Self> {
        Ok(Self {
            all: DocIndex::open(dir, WhichIndex::AllRevs)?,
            latest: DocIndex::open(dir, WhichIndex::LatestRevs)?,
        })
    }

    fn get(&self, which: WhichIndex) -> &DocIndex {
        match which {
            WhichIndex::AllRevs => &self.all,
            WhichIndex::LatestRevs => &self.latest,
        }
    }

    /// Bring LATEST_REVS in line with the winners in ALL_REVS for `itemids`.
    ///
    /// ALL_REVS is read after the LATEST_REVS writer is held, so concurrent
    /// refreshes of the same item converge on the newest winner. A winner
    /// still filed under another item in LATEST_REVS evicts that entry, and
    /// the other item is refreshed in the same session.
    fn refresh_latest<'i>(&self, itemids: impl IntoIterator<Item = &'i ItemId>) -> IndexResult<bool> {
        let mut writer = self.latest.writer()?;
        let all = self.all.state();
        let mut pending: Vec<ItemId> = itemids.into_iter().cloned().collect();
        pending.reverse();
        let mut done = BTreeSet::new();
        let mut changed = false;
        while let Some(itemid) = pending.pop() {
            if !done.insert(itemid.clone()) {
                continue;
            }
            match all.winner(&itemid) {
                Some(winner) => {
                    let displaced = writer
                        .state()
                        .get(&winner.revid)
                        .map(|d| d.itemid.clone())
                        .filter(|owner| *owner != itemid);
                    if let Some(owner) = displaced {
                        writer.delete(&winner.revid);
                        pending.push(owner);
                    }
                    let current = writer.state().item_documents(&itemid).next();
                    if current.map(|d| &**d) != Some(&**winner) {
                        writer.upsert(IndexDocument::clone(winner))?;
                        changed = true;
                    }
                }
                None => changed |= writer.delete_item(&itemid) > 0,
            }
        }
        writer.commit()?;
        Ok(changed)
    }
}

#[derive(Default)]
struct MemorySlots {
    main: Option<Arc<IndexPair>>,
    tmp: Option<Arc<IndexPair>>,
}

impl MemorySlots {
    fn slot(&mut self, tmp: bool) -> &mut Option<Arc<IndexPair>> {
        if tmp {
            &mut self.tmp
        } else {
            &mut self.main
        }
    }
}

/// Indexing layer over a [`RoutingBackend`].
///
/// ALL_REVS holds a document per stored revision; LATEST_REVS holds the
/// current revision of each item, the one with the greatest `(mtime,
/// revid)`. Every write through [`Item`] goes to the backend first and is
/// then indexed.
pub struct IndexingMiddleware {
    location: IndexLocation,
    backend: Arc<RoutingBackend>,
    wikiname: Option<String>,
    live: ArcSwapOption<IndexPair>,
    memory: Mutex<MemorySlots>,
}

impl std::fmt::Debug for IndexingMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexingMiddleware")
            .field("location", &self.location)
            .field("wikiname", &self.wikiname)
            .field("open", &self.is_open())
            .finish()
    }
}

impl IndexingMiddleware {
    pub fn new(location: IndexLocation, backend: Arc<RoutingBackend>) -> Self {
        Self {
            location,
            backend,
            wikiname: None,
            live: ArcSwapOption::empty(),
            memory: Mutex::new(MemorySlots::default()),
        }
    }

    /// Set the wiki name stamped on new revisions.
    pub fn with_wikiname(mut self, wikiname: impl Into<String>) -> Self {
        self.wikiname = Some(wikiname.into());
        self
    }

    pub fn backend(&self) -> &Arc<RoutingBackend> {
        &self.backend
    }

    pub fn wikiname(&self) -> Option<&str> {
        self.wikiname.as_deref()
    }

    pub fn location(&self) -> &IndexLocation {
        &self.location
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Create empty indexes at the main or temporary location, replacing
    /// whatever was there.
    pub fn create(&self, tmp: bool) -> IndexResult<()> {
        match self.location.dir(tmp) {
            None => *self.memory.lock().slot(tmp) = Some(Arc::new(IndexPair::in_memory())),
            Some(dir) => {
                IndexPair::create(&dir)?;
            }
        }
        info!(tmp, "index created");
        Ok(())
    }

    /// Remove the indexes at the main or temporary location.
    pub fn destroy(&self, tmp: bool) -> IndexResult<()> {
        if !tmp {
            self.live.store(None);
        }
        match self.location.dir(tmp) {
            None => *self.memory.lock().slot(tmp) = None,
            Some(dir) => match std::fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        info!(tmp, "index destroyed");
        Ok(())
    }

    /// Open the main indexes for use. A missing index is an error.
    pub fn open(&self) -> IndexResult<()> {
        let pair = self.load_stored(false)?;
        self.live.store(Some(pair));
        debug!("index opened");
        Ok(())
    }

    pub fn close(&self) {
        self.live.store(None);
    }

    pub fn is_open(&self) -> bool {
        self.live.load().is_some()
    }

    /// Replace the main indexes with the temporary ones. If the main indexes
    /// are open they are reopened from the new files.
    pub fn move_index(&self) -> IndexResult<()> {
        match (self.location.dir(true), self.location.dir(false)) {
            (Some(tmp), Some(main)) => {
                if !Journal::exists(&tmp, WhichIndex::AllRevs) {
                    return Err(IndexError::NotCreated(tmp.display().to_string()));
                }
                match std::fs::remove_dir_all(&main) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                std::fs::rename(&tmp, &main)?;
            }
            _ => {
                let mut slots = self.memory.lock();
                let pair = slots
                    .tmp
                    .take()
                    .ok_or_else(|| IndexError::NotCreated("temporary index".into()))?;
                slots.main = Some(pair);
            }
        }
        if self.is_open() {
            self.open()?;
        }
        info!("temporary index moved into place");
        Ok(())
    }

    /// Indexes at the main or temporary location, preferring the open ones.
    fn load(&self, tmp: bool) -> IndexResult<Arc<IndexPair>> {
        if !tmp {
            if let Some(pair) = self.live.load_full() {
                return Ok(pair);
            }
        }
        self.load_stored(tmp)
    }

    fn load_stored(&self, tmp: bool) -> IndexResult<Arc<IndexPair>> {
        match self.location.dir(tmp) {
            None => self
                .memory
                .lock()
                .slot(tmp)
                .clone()
                .ok_or_else(|| IndexError::NotCreated(if tmp { "temporary index" } else { "index" }.into())),
            Some(dir) => Ok(Arc::new(IndexPair::open(&dir)?)),
        }
    }

    fn live(&self) -> IndexResult<Arc<IndexPair>> {
        self.live.load_full().ok_or(IndexError::NotOpen)
    }

    // ---------------------------------------------------------------
    // Indexing
    // ---------------------------------------------------------------

    /// Index one stored revision and refresh its item's latest entry.
    pub fn index_revision(
        &self,
        backend_name: &str,
        meta: &RevisionMeta,
        data: &[u8],
    ) -> IndexResult<Arc<IndexDocument>> {
        let pair = self.live()?;
        let doc = IndexDocument::from_meta(backend_name, meta, data)?;
        let itemid = doc.itemid.clone();

        let mut writer = pair.all.writer()?;
        let previous = writer
            .state()
            .get(&doc.revid)
            .map(|d| d.itemid.clone())
            .filter(|old| *old != itemid);
        let doc = writer.upsert(doc)?;
        writer.commit()?;

        pair.refresh_latest([&itemid].into_iter().chain(previous.as_ref()))?;
        debug!(revid = %doc.revid, itemid = %itemid, backend = backend_name, "revision indexed");
        Ok(doc)
    }

    /// Drop a revision from the indexes. If it was current, the next most
    /// recent revision of the item takes its place.
    pub fn remove_revision(&self, revid: &RevisionId) -> IndexResult<()> {
        let pair = self.live()?;
        let mut writer = pair.all.writer()?;
        let Some(itemid) = writer.state().get(revid).map(|d| d.itemid.clone()) else {
            return Err(IndexError::NotFound(format!("revision {revid}")));
        };
        writer.delete(revid);
        writer.commit()?;

        pair.refresh_latest([&itemid])?;
        debug!(revid = %revid, itemid = %itemid, "revision removed from index");
        Ok(())
    }

    /// Load a stored revision into a document, reading the payload only
    /// when the content type is text.
    fn load_document(&self, backend_name: &str, revid: &RevisionId) -> IndexResult<IndexDocument> {
        let (meta, mut reader) = self.backend.retrieve(backend_name, revid)?;
        let is_text = meta
            .contenttype
            .as_deref()
            .and_then(|ct| ContentType::parse(ct).ok())
            .is_some_and(|ct| ct.is_text());
        let mut data = Vec::new();
        if is_text {
            reader.read_to_end(&mut data)?;
        }
        IndexDocument::from_meta(backend_name, &meta, &data)
    }

    /// Clear the target indexes and reindex every stored revision.
    pub fn rebuild(&self, tmp: bool) -> IndexResult<()> {
        let pair = self.load(tmp)?;
        let revisions = self.backend.revisions()?;

        let mut writer = pair.all.writer()?;
        writer.clear();
        for rev in &revisions {
            writer.upsert(self.load_document(&rev.backend, &rev.revid)?)?;
        }
        let winners: Vec<IndexDocument> = {
            let state = writer.state();
            state
                .itemids()
                .filter_map(|itemid| state.winner(itemid))
                .map(|doc| IndexDocument::clone(doc))
                .collect()
        };
        writer.commit()?;

        let mut writer = pair.latest.writer()?;
        writer.clear();
        let items = winners.len();
        for doc in winners {
            writer.upsert(doc)?;
        }
        writer.commit()?;

        info!(tmp, revisions = revisions.len(), items, "index rebuilt");
        Ok(())
    }

    /// Reconcile the indexes with the backend. Returns whether anything
    /// changed in either index.
    pub fn update(&self, tmp: bool) -> IndexResult<bool> {
        let pair = self.load(tmp)?;
        let stored: BTreeMap<RevisionId, String> = self
            .backend
            .revisions()?
            .into_iter()
            .map(|r| (r.revid, r.backend))
            .collect();

        let mut writer = pair.all.writer()?;
        let indexed: BTreeSet<RevisionId> = writer
            .state()
            .documents()
            .map(|d| d.revid.clone())
            .collect();

        let missing: Vec<(&RevisionId, &String)> = stored
            .iter()
            .filter(|(revid, _)| !indexed.contains(*revid))
            .collect();
        let extra: Vec<&RevisionId> = indexed
            .iter()
            .filter(|revid| !stored.contains_key(*revid))
            .collect();

        for (revid, backend_name) in &missing {
            warn!(revid = %revid, backend = %backend_name, "indexing revision missing from index");
            writer.upsert(self.load_document(backend_name, revid)?)?;
        }
        for revid in &extra {
            warn!(revid = %revid, "dropping index entry without stored revision");
            writer.delete(revid);
        }
        let changed_all = !missing.is_empty() || !extra.is_empty();
        writer.commit()?;

        let mut itemids: BTreeSet<ItemId> = pair.all.state().itemids().cloned().collect();
        itemids.extend(pair.latest.state().itemids().cloned());
        let changed_latest = pair.refresh_latest(&itemids)?;

        info!(
            tmp,
            added = missing.len(),
            removed = extra.len(),
            changed_latest,
            "index updated"
        );
        Ok(changed_all || changed_latest)
    }

    /// Fold the journals at the main or temporary location into snapshots.
    pub fn optimize_index(&self, tmp: bool) -> IndexResult<()> {
        let pair = self.load(tmp)?;
        pair.all.optimize()?;
        pair.latest.optimize()?;
        info!(tmp, "index optimized");
        Ok(())
    }

    /// Every document of one index, in revid order.
    pub fn dump(&self, tmp: bool, which: WhichIndex) -> IndexResult<Vec<Arc<IndexDocument>>> {
        let pair = self.load(tmp)?;
        let mut docs: Vec<Arc<IndexDocument>> = pair.get(which).state().documents().cloned().collect();
        docs.sort_by(|a, b| a.revid.cmp(&b.revid));
        Ok(docs)
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    pub(crate) fn query_docs(
        &self,
        query: &Query,
        opts: &SearchOptions,
        which: WhichIndex,
    ) -> IndexResult<Vec<Arc<IndexDocument>>> {
        let pair = self.live()?;
        let mut docs = pair.get(which).state().search(query);
        opts.apply(&mut docs);
        Ok(docs)
    }

    pub fn search(&self, query: &Query, opts: &SearchOptions, which: WhichIndex) -> IndexResult<Search<'_>> {
        Ok(Search::new(self, self.query_docs(query, opts, which)?))
    }

    /// Number of matches, ignoring paging and limits.
    pub fn search_results_size(&self, query: &Query, which: WhichIndex) -> IndexResult<usize> {
        Ok(self.live()?.get(which).state().search(query).len())
    }

    /// All documents whose fields equal the given values.
    pub fn documents(&self, which: WhichIndex, fields: &[(Field, &str)]) -> IndexResult<Search<'_>> {
        self.search(&fields_query(fields), &SearchOptions::default(), which)
    }

    /// The first document (in revid order) whose fields equal the given values.
    pub fn document(&self, which: WhichIndex, fields: &[(Field, &str)]) -> IndexResult<Option<Revision<'_>>> {
        let opts = SearchOptions::default().limit(1);
        Ok(self.search(&fields_query(fields), &opts, which)?.next())
    }

    /// Current document of the item `selector` names, if any.
    pub(crate) fn current_document(&self, selector: &ItemSelector) -> IndexResult<Option<Arc<IndexDocument>>> {
        let state = self.live()?.latest.state();
        Ok(match selector {
            ItemSelector::ItemId(itemid) => state.item_documents(itemid).next().cloned(),
            ItemSelector::Name { namespace, name } => {
                let mut hits = state.search(&Query::name(namespace, name));
                hits.sort_by(|a, b| a.revid.cmp(&b.revid));
                if hits.len() > 1 {
                    warn!(namespace = %namespace, name = %name, count = hits.len(), "name is claimed by several items");
                }
                hits.into_iter().next()
            }
        })
    }

    /// A revision of ALL_REVS by id.
    pub(crate) fn revision_document(&self, revid: &RevisionId) -> IndexResult<Option<Arc<IndexDocument>>> {
        Ok(self.live()?.all.state().get(revid).cloned())
    }

    /// Every revision of an item, oldest first.
    pub(crate) fn item_revisions(&self, itemid: &ItemId) -> IndexResult<Vec<Arc<IndexDocument>>> {
        let state = self.live()?.all.state();
        let mut docs: Vec<Arc<IndexDocument>> = state.item_documents(itemid).cloned().collect();
        docs.sort_by(|a, b| a.recency().cmp(&b.recency()));
        Ok(docs)
    }

    // ---------------------------------------------------------------
    // Items
    // ---------------------------------------------------------------

    /// The item `selector` names, existing or not.
    pub fn get_item(&self, selector: ItemSelector) -> IndexResult<Item<'_>> {
        let current = self.current_document(&selector)?;
        Ok(Item::new(self, selector, current))
    }

    /// The item `selector` names; [`IndexError::NotFound`] if it does not exist.
    pub fn existing_item(&self, selector: ItemSelector) -> IndexResult<Item<'_>> {
        let item = self.get_item(selector)?;
        if !item.exists() {
            return Err(IndexError::NotFound(format!("item {}", item.selector())));
        }
        Ok(item)
    }

    /// A handle for a new item; [`IndexError::ItemAlreadyExists`] if it exists.
    pub fn create_item(&self, selector: ItemSelector) -> IndexResult<Item<'_>> {
        let item = self.get_item(selector)?;
        if item.exists() {
            return Err(IndexError::ItemAlreadyExists(item.selector().to_string()));
        }
        Ok(item)
    }

    pub fn has_item(&self, namespace: &str, name: &str) -> IndexResult<bool> {
        Ok(self
            .current_document(&ItemSelector::name(namespace, name))?
            .is_some())
    }

    /// Resolve a fully qualified name (`ns/name` or `@itemid/<id>`).
    pub fn lookup(&self, fqname: &str) -> IndexResult<Item<'_>> {
        let namespaces = self.backend.namespaces();
        self.get_item(ItemSelector::parse(fqname, &namespaces))
    }
}

fn fields_query(fields: &[(Field, &str)]) -> Query {
    if fields.is_empty() {
        return Query::Every;
    }
    Query::And(
        fields
            .iter()
            .map(|(field, value)| Query::term(field.clone(), *value))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use folio_store::{Backend, MemoryStore, StoresBackend};
    use folio_types::CONTENTTYPE_DEFAULT;

    use super::*;
    use crate::item::StoreOptions;
    use crate::query::SortKey;

    fn routing() -> Arc<RoutingBackend> {
        let backend: Arc<dyn Backend> = Arc::new(StoresBackend::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
        ));
        Arc::new(RoutingBackend::single("default", backend))
    }

    fn opened(location: IndexLocation) -> IndexingMiddleware {
        let indexer = IndexingMiddleware::new(location, routing());
        indexer.create(false).unwrap();
        indexer.open().unwrap();
        indexer
    }

    fn save(indexer: &IndexingMiddleware, name: &str, data: &[u8]) -> RevisionId {
        let mut item = indexer.get_item(ItemSelector::default_ns(name)).unwrap();
        let meta = RevisionMeta {
            contenttype: Some(CONTENTTYPE_DEFAULT.into()),
            tags: vec!["demo".into()],
            ..RevisionMeta::default()
        };
        item.store_revision(meta, &mut &data[..], &StoreOptions::default())
            .unwrap()
            .revid()
            .clone()
    }

    fn revids(indexer: &IndexingMiddleware, which: WhichIndex) -> Vec<RevisionId> {
        indexer
            .dump(false, which)
            .unwrap()
            .iter()
            .map(|d| d.revid.clone())
            .collect()
    }

    /// Store a revision behind the indexer's back.
    fn store_unindexed(indexer: &IndexingMiddleware, name: &str) -> RevisionId {
        let meta = RevisionMeta {
            itemid: Some(ItemId::new()),
            contenttype: Some(CONTENTTYPE_DEFAULT.into()),
            mtime: Some(utc_now_plus(10)),
            ..RevisionMeta::named(name)
        };
        indexer.backend().store(meta, &mut &b"quiet"[..]).unwrap().1
    }

    fn utc_now_plus(secs: i64) -> i64 {
        folio_types::utc_now() + secs
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    #[test]
    fn operations_need_an_open_index() {
        let indexer = IndexingMiddleware::new(IndexLocation::Memory, routing());
        assert!(matches!(indexer.open(), Err(IndexError::NotCreated(_))));
        assert!(matches!(
            indexer.search(&Query::Every, &SearchOptions::default(), WhichIndex::LatestRevs),
            Err(IndexError::NotOpen)
        ));
        indexer.create(false).unwrap();
        indexer.open().unwrap();
        assert!(indexer.is_open());
        indexer.close();
        assert!(!indexer.is_open());
    }

    #[test]
    fn directory_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let location = IndexLocation::Directory(dir.path().join("index"));
        let backend = routing();

        let indexer = IndexingMiddleware::new(location.clone(), Arc::clone(&backend));
        indexer.create(false).unwrap();
        indexer.open().unwrap();
        let revid = save(&indexer, "Foo", b"x");
        indexer.close();

        let reopened = IndexingMiddleware::new(location, backend);
        reopened.open().unwrap();
        assert_eq!(revids(&reopened, WhichIndex::LatestRevs), vec![revid]);
        assert!(reopened.has_item("", "Foo").unwrap());
    }

    #[test]
    fn missing_directory_index_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let indexer = IndexingMiddleware::new(IndexLocation::Directory(dir.path().join("none")), routing());
        assert!(matches!(indexer.open(), Err(IndexError::NotCreated(_))));
    }

    #[test]
    fn rebuild_in_tmp_then_move() {
        let dir = tempfile::tempdir().unwrap();
        let indexer = opened(IndexLocation::Directory(dir.path().join("index")));
        save(&indexer, "Foo", b"1");
        let b = save(&indexer, "Foo", b"2");
        let unindexed = store_unindexed(&indexer, "Quiet");

        indexer.create(true).unwrap();
        indexer.rebuild(true).unwrap();
        assert_eq!(indexer.dump(true, WhichIndex::AllRevs).unwrap().len(), 3);
        assert_eq!(revids(&indexer, WhichIndex::AllRevs).len(), 2);

        indexer.move_index().unwrap();
        assert!(indexer.is_open());
        let latest = revids(&indexer, WhichIndex::LatestRevs);
        assert_eq!(latest.len(), 2);
        assert!(latest.contains(&b));
        assert!(latest.contains(&unindexed));
        assert!(!dir.path().join("index.temp").exists());
    }

    #[test]
    fn move_index_in_memory() {
        let indexer = opened(IndexLocation::Memory);
        save(&indexer, "Foo", b"1");
        assert!(matches!(indexer.move_index(), Err(IndexError::NotCreated(_))));

        indexer.create(true).unwrap();
        indexer.move_index().unwrap();
        // The fresh temporary index has not been built yet.
        assert!(revids(&indexer, WhichIndex::AllRevs).is_empty());
        indexer.rebuild(false).unwrap();
        assert_eq!(revids(&indexer, WhichIndex::AllRevs).len(), 1);
    }

    // ---------------------------------------------------------------
    // Rebuild and update
    // ---------------------------------------------------------------

    #[test]
    fn rebuild_is_idempotent() {
        let indexer = opened(IndexLocation::Memory);
        save(&indexer, "Foo", b"1");
        save(&indexer, "Foo", b"2");
        save(&indexer, "Bar", b"3");

        indexer.rebuild(false).unwrap();
        let all_once = indexer.dump(false, WhichIndex::AllRevs).unwrap();
        let latest_once = indexer.dump(false, WhichIndex::LatestRevs).unwrap();
        indexer.rebuild(false).unwrap();
        assert_eq!(indexer.dump(false, WhichIndex::AllRevs).unwrap(), all_once);
        assert_eq!(indexer.dump(false, WhichIndex::LatestRevs).unwrap(), latest_once);
        assert_eq!(latest_once.len(), 2);
    }

    #[test]
    fn update_reconciles_with_backend() {
        let indexer = opened(IndexLocation::Memory);
        let a = save(&indexer, "Foo", b"1");
        let b = save(&indexer, "Foo", b"2");
        assert!(!indexer.update(false).unwrap());

        // Added behind the index's back.
        let quiet = store_unindexed(&indexer, "Quiet");
        // Removed behind the index's back: the current revision of Foo.
        indexer.backend().remove("default", &b, true).unwrap();

        assert!(indexer.update(false).unwrap());
        let mut stored: Vec<RevisionId> = indexer
            .backend()
            .revisions()
            .unwrap()
            .into_iter()
            .map(|r| r.revid)
            .collect();
        stored.sort();
        assert_eq!(revids(&indexer, WhichIndex::AllRevs), stored);

        let latest = revids(&indexer, WhichIndex::LatestRevs);
        assert_eq!(latest.len(), 2);
        assert!(latest.contains(&a));
        assert!(latest.contains(&quiet));

        assert!(!indexer.update(false).unwrap());
    }

    #[test]
    fn update_drops_items_without_revisions() {
        let indexer = opened(IndexLocation::Memory);
        let a = save(&indexer, "Foo", b"1");
        indexer.backend().remove("default", &a, true).unwrap();

        assert!(indexer.update(false).unwrap());
        assert!(revids(&indexer, WhichIndex::AllRevs).is_empty());
        assert!(revids(&indexer, WhichIndex::LatestRevs).is_empty());
        assert!(!indexer.has_item("", "Foo").unwrap());
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    #[test]
    fn search_and_document_lookups() {
        let indexer = opened(IndexLocation::Memory);
        save(&indexer, "Alpha", b"apples");
        save(&indexer, "Beta", b"bananas");
        let beta2 = save(&indexer, "Beta", b"more bananas");

        let latest = indexer
            .search(&Query::text("bananas"), &SearchOptions::default(), WhichIndex::LatestRevs)
            .unwrap();
        assert_eq!(latest.map(|r| r.revid().clone()).collect::<Vec<_>>(), vec![beta2.clone()]);
        assert_eq!(indexer.search_results_size(&Query::text("bananas"), WhichIndex::AllRevs).unwrap(), 2);

        let sorted: Vec<String> = indexer
            .search(&Query::Every, &SearchOptions::sorted(SortKey::Name).reversed(), WhichIndex::LatestRevs)
            .unwrap()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(sorted, vec!["Beta".to_string(), "Alpha".to_string()]);

        let doc = indexer
            .document(WhichIndex::LatestRevs, &[(Field::Name, "Beta"), (Field::Tags, "demo")])
            .unwrap()
            .unwrap();
        assert_eq!(doc.revid(), &beta2);
        assert_eq!(indexer.documents(WhichIndex::AllRevs, &[(Field::Name, "Beta")]).unwrap().len(), 2);
        assert!(indexer.document(WhichIndex::AllRevs, &[(Field::Name, "Gamma")]).unwrap().is_none());
    }

    #[test]
    fn remove_revision_promotes_previous() {
        let indexer = opened(IndexLocation::Memory);
        let a = save(&indexer, "Foo", b"1");
        let b = save(&indexer, "Foo", b"2");
        indexer.remove_revision(&b).unwrap();
        assert_eq!(revids(&indexer, WhichIndex::LatestRevs), vec![a.clone()]);
        indexer.remove_revision(&a).unwrap();
        assert!(revids(&indexer, WhichIndex::LatestRevs).is_empty());
        assert!(indexer.remove_revision(&a).unwrap_err().is_not_found());
    }

    #[test]
    fn overwrite_moving_revision_to_another_item() {
        let indexer = opened(IndexLocation::Memory);
        let first = save(&indexer, "Foo", b"1");
        let moved = save(&indexer, "Foo", b"2");
        let old_item = indexer.lookup("Foo").unwrap().itemid().unwrap().clone();

        let mut meta = indexer.backend().retrieve_meta("default", &moved).unwrap();
        let new_item = ItemId::new();
        meta.itemid = Some(new_item.clone());
        meta.name = vec!["Bar".into()];
        let (backend_name, _) = indexer.backend().store(meta, &mut &b"2"[..]).unwrap();
        let stored = indexer.backend().retrieve_meta(&backend_name, &moved).unwrap();
        indexer.index_revision(&backend_name, &stored, b"2").unwrap();

        let latest = indexer.dump(false, WhichIndex::LatestRevs).unwrap();
        assert_eq!(latest.len(), 2);
        let owner = |revid: &RevisionId| latest.iter().find(|d| &d.revid == revid).map(|d| d.itemid.clone());
        assert_eq!(owner(&first), Some(old_item));
        assert_eq!(owner(&moved), Some(new_item));
        assert!(!indexer.update(false).unwrap());
    }

    // ---------------------------------------------------------------
    // Concurrency
    // ---------------------------------------------------------------

    #[test]
    fn concurrent_writers_on_one_item() {
        let indexer = opened(IndexLocation::Memory);
        save(&indexer, "Shared", b"seed");
        let itemid = indexer.lookup("Shared").unwrap().itemid().unwrap().clone();

        std::thread::scope(|scope| {
            for t in 0..8 {
                let indexer = &indexer;
                let itemid = itemid.clone();
                scope.spawn(move || {
                    for i in 0..5 {
                        let mut item = indexer.get_item(ItemSelector::ItemId(itemid.clone())).unwrap();
                        let meta = RevisionMeta {
                            contenttype: Some(CONTENTTYPE_DEFAULT.into()),
                            ..RevisionMeta::default()
                        };
                        let data = format!("{t}-{i}");
                        item.store_revision(meta, &mut data.as_bytes(), &StoreOptions::default())
                            .unwrap();
                    }
                });
            }
        });

        let all = indexer.dump(false, WhichIndex::AllRevs).unwrap();
        let latest = indexer.dump(false, WhichIndex::LatestRevs).unwrap();
        assert_eq!(all.len(), 41);
        assert_eq!(latest.len(), 1);
        let newest = all.iter().max_by(|a, b| a.recency().cmp(&b.recency())).unwrap();
        assert_eq!(latest[0].revid, newest.revid);
        assert!(!indexer.update(false).unwrap());
    }

    #[test]
    fn readers_do_not_wait_for_a_writer() {
        let indexer = opened(IndexLocation::Memory);
        let alpha = save(&indexer, "Alpha", b"apples");
        let pair = indexer.live().unwrap();
        let mut writer = pair.latest.writer().unwrap();
        writer.clear();

        let (found, hits) = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let found = indexer
                        .document(WhichIndex::LatestRevs, &[(Field::Name, "Alpha")])
                        .unwrap()
                        .map(|r| r.revid().clone());
                    let hits = indexer
                        .search(&Query::text("apples"), &SearchOptions::default(), WhichIndex::AllRevs)
                        .unwrap()
                        .len();
                    (found, hits)
                })
                .join()
                .unwrap()
        });
        drop(writer);

        assert_eq!(found, Some(alpha));
        assert_eq!(hits, 1);
        assert_eq!(indexer.dump(false, WhichIndex::LatestRevs).unwrap().len(), 1);
    }

    // ---------------------------------------------------------------
    // Properties
    // ---------------------------------------------------------------

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

        #[test]
        fn latest_holds_newest_revision_per_item(names in proptest::collection::vec("[ABC]", 1..16)) {
            let indexer = opened(IndexLocation::Memory);
            for (i, name) in names.iter().enumerate() {
                save(&indexer, name, i.to_string().as_bytes());
            }
            indexer.rebuild(false).unwrap();

            let all = indexer.dump(false, WhichIndex::AllRevs).unwrap();
            let latest = indexer.dump(false, WhichIndex::LatestRevs).unwrap();
            let distinct: std::collections::BTreeSet<&String> = names.iter().collect();
            proptest::prop_assert_eq!(all.len(), names.len());
            proptest::prop_assert_eq!(latest.len(), distinct.len());
            for doc in &latest {
                let newest = all
                    .iter()
                    .filter(|d| d.itemid == doc.itemid)
                    .max_by(|a, b| a.recency().cmp(&b.recency()))
                    .unwrap();
                proptest::prop_assert_eq!(&newest.revid, &doc.revid);
            }
        }
    }
}
