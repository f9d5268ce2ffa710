//! A single document index with lock-free readers and one writer at a time.
//!
//! Readers take an `Arc` of the current [`IndexState`] and never block.
//! Writers hold the index's writer lock, edit a private copy of the state
//! through an [`IndexWriter`], and publish it on [`IndexWriter::commit`],
//! after the change is durable in the journal. A writer dropped without
//! committing leaves the index untouched.
//!
//! Persistent indexes also hold the journal's lock file for the whole
//! session, so writers in other processes wait too, and the session starts
//! from whatever they committed.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use folio_types::{ItemId, RevisionId};
use im::{HashMap, OrdSet};
use parking_lot::{Mutex, MutexGuard};

use crate::document::IndexDocument;
use crate::error::{IndexError, IndexResult};
use crate::journal::{CatchUp, Journal, JournalOp, Recovered};
use crate::query::{KeyHint, Query, WhichIndex};

/// Journal size past which a commit folds it into the snapshot.
const COMPACT_THRESHOLD: u64 = 8 * 1024 * 1024;

/// An immutable view of an index's documents.
///
/// Tables are persistent maps: cloning shares structure, and an edit copies
/// only the path it touches.
#[derive(Clone, Debug, Default)]
pub struct IndexState {
    docs: HashMap<RevisionId, Arc<IndexDocument>>,
    by_item: HashMap<ItemId, OrdSet<RevisionId>>,
    by_name: HashMap<String, OrdSet<RevisionId>>,
}

impl IndexState {
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn get(&self, revid: &RevisionId) -> Option<&Arc<IndexDocument>> {
        self.docs.get(revid)
    }

    pub fn contains(&self, revid: &RevisionId) -> bool {
        self.docs.contains_key(revid)
    }

    /// Documents of one item, in revid order.
    pub fn item_documents<'s>(
        &'s self,
        itemid: &ItemId,
    ) -> impl Iterator<Item = &'s Arc<IndexDocument>> + 's {
        self.by_item
            .get(itemid)
            .into_iter()
            .flatten()
            .filter_map(|revid| self.docs.get(revid))
    }

    /// Every document, in no particular order.
    pub fn documents(&self) -> impl Iterator<Item = &Arc<IndexDocument>> {
        self.docs.values()
    }

    /// Documents matching `query`, unordered.
    pub fn search(&self, query: &Query) -> Vec<Arc<IndexDocument>> {
        let candidates: Box<dyn Iterator<Item = &Arc<IndexDocument>> + '_> = match query.key_hint() {
            Some(KeyHint::RevId(v)) => match RevisionId::parse(v) {
                Ok(revid) => Box::new(self.docs.get(&revid).into_iter()),
                Err(_) => return Vec::new(),
            },
            Some(KeyHint::ItemId(v)) => match ItemId::parse(v) {
                Ok(itemid) => Box::new(self.item_documents(&itemid)),
                Err(_) => return Vec::new(),
            },
            Some(KeyHint::Name(name)) => Box::new(
                self.by_name
                    .get(name)
                    .into_iter()
                    .flatten()
                    .filter_map(|revid| self.docs.get(revid)),
            ),
            None => Box::new(self.docs.values()),
        };
        candidates
            .filter(|doc| query.matches(doc))
            .cloned()
            .collect()
    }

    /// The most recent revision of `itemid`: greatest (mtime, revid).
    pub fn winner(&self, itemid: &ItemId) -> Option<&Arc<IndexDocument>> {
        self.item_documents(itemid).max_by(|a, b| a.recency().cmp(&b.recency()))
    }

    /// Item ids present in this state.
    pub fn itemids(&self) -> impl Iterator<Item = &ItemId> {
        self.by_item.keys()
    }

    fn insert(&mut self, doc: Arc<IndexDocument>) {
        self.remove(&doc.revid);
        self.by_item
            .entry(doc.itemid.clone())
            .or_insert_with(OrdSet::new)
            .insert(doc.revid.clone());
        for name in &doc.name {
            self.by_name
                .entry(name.clone())
                .or_insert_with(OrdSet::new)
                .insert(doc.revid.clone());
        }
        self.docs.insert(doc.revid.clone(), doc);
    }

    fn remove(&mut self, revid: &RevisionId) -> Option<Arc<IndexDocument>> {
        let doc = self.docs.remove(revid)?;
        if let Some(set) = self.by_item.get_mut(&doc.itemid) {
            set.remove(revid);
            if set.is_empty() {
                self.by_item.remove(&doc.itemid);
            }
        }
        for name in &doc.name {
            if let Some(set) = self.by_name.get_mut(name) {
                set.remove(revid);
                if set.is_empty() {
                    self.by_name.remove(name);
                }
            }
        }
        Some(doc)
    }

    /// Insert honoring the unique key of `which`: the revid for ALL_REVS,
    /// the item id for LATEST_REVS.
    fn upsert(&mut self, which: WhichIndex, doc: Arc<IndexDocument>) -> IndexResult<()> {
        if which == WhichIndex::LatestRevs {
            if let Some(existing) = self.docs.get(&doc.revid) {
                if existing.itemid != doc.itemid {
                    return Err(IndexError::Corruption(format!(
                        "revision {} indexed under items {} and {}",
                        doc.revid, existing.itemid, doc.itemid
                    )));
                }
            }
            let stale: Vec<RevisionId> = self
                .item_documents(&doc.itemid)
                .map(|d| d.revid.clone())
                .collect();
            for revid in stale {
                self.remove(&revid);
            }
        }
        self.insert(doc);
        Ok(())
    }

    fn recover(which: WhichIndex, recovered: Recovered) -> IndexResult<Self> {
        let mut state = Self::default();
        for doc in recovered.documents {
            state.upsert(which, Arc::new(doc))?;
        }
        for op in recovered.ops {
            state.apply(which, op)?;
        }
        Ok(state)
    }

    fn apply(&mut self, which: WhichIndex, op: JournalOp) -> IndexResult<()> {
        match op {
            JournalOp::Upsert { doc } => self.upsert(which, Arc::new(*doc))?,
            JournalOp::Delete { revid } => {
                self.remove(&revid);
            }
            JournalOp::Clear => *self = Self::default(),
        }
        Ok(())
    }
}

/// One of the two indexes, in memory or backed by a journal directory.
pub struct DocIndex {
    which: WhichIndex,
    state: ArcSwap<IndexState>,
    writer: Mutex<Option<Journal>>,
}

impl std::fmt::Debug for DocIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocIndex")
            .field("which", &self.which)
            .field("documents", &self.state.load().len())
            .field("persistent", &self.writer.lock().is_some())
            .finish()
    }
}

impl DocIndex {
    /// A volatile, empty index.
    pub fn in_memory(which: WhichIndex) -> Self {
        Self {
            which,
            state: ArcSwap::from_pointee(IndexState::default()),
            writer: Mutex::new(None),
        }
    }

    /// Create an empty persistent index in `dir`, replacing any existing one.
    pub fn create(dir: &Path, which: WhichIndex) -> IndexResult<Self> {
        let journal = Journal::create(dir, which)?;
        Ok(Self {
            which,
            state: ArcSwap::from_pointee(IndexState::default()),
            writer: Mutex::new(Some(journal)),
        })
    }

    /// Open the persistent index in `dir`, replaying its journal.
    pub fn open(dir: &Path, which: WhichIndex) -> IndexResult<Self> {
        let (journal, recovered) = Journal::open(dir, which)?;
        let replayed = recovered.ops.len();
        let state = IndexState::recover(which, recovered)?;
        tracing::debug!(index = %which, documents = state.len(), replayed, "index opened");
        Ok(Self {
            which,
            state: ArcSwap::from_pointee(state),
            writer: Mutex::new(Some(journal)),
        })
    }

    pub fn which(&self) -> WhichIndex {
        self.which
    }

    /// The current state. Later commits do not affect the returned view.
    pub fn state(&self) -> Arc<IndexState> {
        self.state.load_full()
    }

    /// Take the writer lock, blocking while another writer holds it.
    pub fn writer(&self) -> IndexResult<IndexWriter<'_>> {
        let mut guard = self.writer.lock();
        if let Some(journal) = guard.as_mut() {
            let caught_up = journal.begin()?;
            if let Err(e) = self.publish_catch_up(caught_up) {
                journal.end();
                return Err(e);
            }
        }
        let working = IndexState::clone(&self.state.load());
        Ok(IndexWriter {
            index: self,
            journal: guard,
            working,
            ops: Vec::new(),
        })
    }

    /// Commits found on disk are already durable; readers may see them.
    fn publish_catch_up(&self, caught_up: CatchUp) -> IndexResult<()> {
        let state = match caught_up {
            CatchUp::Current => return Ok(()),
            CatchUp::Ops(ops) => {
                let mut state = IndexState::clone(&self.state.load());
                for op in ops {
                    state.apply(self.which, op)?;
                }
                state
            }
            CatchUp::Reload(recovered) => IndexState::recover(self.which, recovered)?,
        };
        self.state.store(Arc::new(state));
        Ok(())
    }

    /// Fold the journal into a fresh snapshot. No-op in memory.
    pub fn optimize(&self) -> IndexResult<()> {
        self.writer()?.finish(true)
    }
}

/// Exclusive, uncommitted edit of a [`DocIndex`].
pub struct IndexWriter<'a> {
    index: &'a DocIndex,
    journal: MutexGuard<'a, Option<Journal>>,
    working: IndexState,
    ops: Vec<JournalOp>,
}

impl IndexWriter<'_> {
    /// The state as edited so far.
    pub fn state(&self) -> &IndexState {
        &self.working
    }

    /// Add or replace a document. Returns the stored document.
    pub fn upsert(&mut self, doc: IndexDocument) -> IndexResult<Arc<IndexDocument>> {
        let doc = Arc::new(doc);
        self.working.upsert(self.index.which, Arc::clone(&doc))?;
        self.ops.push(JournalOp::Upsert {
            doc: Box::new(IndexDocument::clone(&doc)),
        });
        Ok(doc)
    }

    /// Remove one document. Returns whether it was present.
    pub fn delete(&mut self, revid: &RevisionId) -> bool {
        let removed = self.working.remove(revid).is_some();
        if removed {
            self.ops.push(JournalOp::Delete {
                revid: revid.clone(),
            });
        }
        removed
    }

    /// Remove every document of an item. Returns how many were removed.
    pub fn delete_item(&mut self, itemid: &ItemId) -> usize {
        let revids: Vec<RevisionId> = self
            .working
            .item_documents(itemid)
            .map(|d| d.revid.clone())
            .collect();
        revids.iter().filter(|revid| self.delete(revid)).count()
    }

    pub fn clear(&mut self) {
        self.working = IndexState::default();
        self.ops.clear();
        self.ops.push(JournalOp::Clear);
    }

    /// Make the edits durable, then visible to readers.
    pub fn commit(self) -> IndexResult<()> {
        self.finish(false)
    }

    fn finish(mut self, compact: bool) -> IndexResult<()> {
        let ops = std::mem::take(&mut self.ops);
        let working = std::mem::take(&mut self.working);
        if let Some(journal) = self.journal.as_mut() {
            journal.append(&ops)?;
            if compact || journal.journal_len()? > COMPACT_THRESHOLD {
                journal.compact(working.documents().map(Arc::as_ref))?;
            }
        }
        self.index.state.store(Arc::new(working));
        Ok(())
    }
}

impl Drop for IndexWriter<'_> {
    fn drop(&mut self) {
        if !self.ops.is_empty() {
            tracing::debug!(index = %self.index.which, ops = self.ops.len(), "index writer discarded");
        }
        if let Some(journal) = self.journal.as_ref() {
            journal.end();
        }
    }
}
