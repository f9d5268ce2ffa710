//! Read-only views of indexed revisions.

use std::cmp::Ordering;
use std::io::Read;
use std::sync::Arc;

use folio_types::{ItemId, RevisionId, RevisionMeta};

use crate::document::IndexDocument;
use crate::error::IndexResult;
use crate::middleware::IndexingMiddleware;

/// One revision as seen through the index.
///
/// Document fields are answered from the index. Metadata and payload are
/// fetched from the backend on each call to [`meta`](Self::meta) or
/// [`data`](Self::data).
#[derive(Clone)]
pub struct Revision<'a> {
    indexer: &'a IndexingMiddleware,
    doc: Arc<IndexDocument>,
}

impl<'a> Revision<'a> {
    pub(crate) fn new(indexer: &'a IndexingMiddleware, doc: Arc<IndexDocument>) -> Self {
        Self { indexer, doc }
    }

    pub fn revid(&self) -> &RevisionId {
        &self.doc.revid
    }

    pub fn itemid(&self) -> &ItemId {
        &self.doc.itemid
    }

    pub fn backend_name(&self) -> &str {
        &self.doc.backend
    }

    pub fn names(&self) -> &[String] {
        &self.doc.name
    }

    /// First name, or empty for a nameless revision.
    pub fn name(&self) -> &str {
        self.doc.name.first().map(String::as_str).unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        &self.doc.namespace
    }

    pub fn mtime(&self) -> i64 {
        self.doc.mtime
    }

    pub fn parentid(&self) -> Option<&RevisionId> {
        self.doc.parentid.as_ref()
    }

    pub fn acl(&self) -> Option<&str> {
        self.doc.acl.as_deref()
    }

    /// The indexed document.
    pub fn document(&self) -> &IndexDocument {
        &self.doc
    }

    pub fn into_document(self) -> Arc<IndexDocument> {
        self.doc
    }

    pub fn indexer(&self) -> &'a IndexingMiddleware {
        self.indexer
    }

    /// Full metadata from the backend.
    pub fn meta(&self) -> IndexResult<RevisionMeta> {
        Ok(self
            .indexer
            .backend()
            .retrieve_meta(&self.doc.backend, &self.doc.revid)?)
    }

    /// Stream the payload from the backend.
    pub fn data(&self) -> IndexResult<Box<dyn Read + Send>> {
        let (_, reader) = self
            .indexer
            .backend()
            .retrieve(&self.doc.backend, &self.doc.revid)?;
        Ok(reader)
    }

    /// Read the whole payload.
    pub fn read_data(&self) -> IndexResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.data()?.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl PartialEq for Revision<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.doc.revid == other.doc.revid
    }
}

impl Eq for Revision<'_> {}

impl PartialOrd for Revision<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Revision<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.doc.recency().cmp(&other.doc.recency())
    }
}

impl std::fmt::Debug for Revision<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Revision")
            .field("revid", &self.doc.revid)
            .field("itemid", &self.doc.itemid)
            .field("name", &self.doc.name)
            .field("backend", &self.doc.backend)
            .finish()
    }
}

/// A finite, single-pass sequence of search results.
pub struct Search<'a> {
    indexer: &'a IndexingMiddleware,
    docs: std::vec::IntoIter<Arc<IndexDocument>>,
}

impl<'a> Search<'a> {
    pub(crate) fn new(indexer: &'a IndexingMiddleware, docs: Vec<Arc<IndexDocument>>) -> Self {
        Self {
            indexer,
            docs: docs.into_iter(),
        }
    }
}

impl<'a> Iterator for Search<'a> {
    type Item = Revision<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.docs
            .next()
            .map(|doc| Revision::new(self.indexer, doc))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.docs.size_hint()
    }
}

impl ExactSizeIterator for Search<'_> {}

impl std::fmt::Debug for Search<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Search")
            .field("remaining", &self.docs.len())
            .finish()
    }
}
