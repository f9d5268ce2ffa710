//! What a dump can be read from and loaded into.

use std::io::Read;

use folio_store::{Backend, RoutingBackend, StoreResult};
use folio_types::{RevisionId, RevisionMeta};

/// A set of revisions that can be walked for serialization.
pub trait DumpSource {
    /// Opaque keys of every revision, in a stable order.
    fn dump_keys(&self) -> StoreResult<Vec<(String, RevisionId)>>;

    fn dump_retrieve(&self, key: &(String, RevisionId)) -> StoreResult<(RevisionMeta, Box<dyn Read + Send>)>;
}

/// Somewhere revisions can be stored as they are read from a dump.
pub trait LoadTarget {
    fn load(&self, meta: RevisionMeta, data: &mut dyn Read) -> StoreResult<RevisionId>;
}

impl DumpSource for RoutingBackend {
    fn dump_keys(&self) -> StoreResult<Vec<(String, RevisionId)>> {
        let mut keys: Vec<(String, RevisionId)> = self
            .revisions()?
            .into_iter()
            .map(|rev| (rev.backend, rev.revid))
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn dump_retrieve(&self, key: &(String, RevisionId)) -> StoreResult<(RevisionMeta, Box<dyn Read + Send>)> {
        RoutingBackend::retrieve(self, &key.0, &key.1)
    }
}

/// A single backend; the key's backend name is unused.
impl DumpSource for dyn Backend {
    fn dump_keys(&self) -> StoreResult<Vec<(String, RevisionId)>> {
        let mut revids = self.revids()?;
        revids.sort();
        Ok(revids.into_iter().map(|revid| (String::new(), revid)).collect())
    }

    fn dump_retrieve(&self, key: &(String, RevisionId)) -> StoreResult<(RevisionMeta, Box<dyn Read + Send>)> {
        Backend::retrieve(self, &key.1)
    }
}

impl LoadTarget for RoutingBackend {
    fn load(&self, meta: RevisionMeta, data: &mut dyn Read) -> StoreResult<RevisionId> {
        let (_, revid) = RoutingBackend::store(self, meta, data)?;
        Ok(revid)
    }
}

impl LoadTarget for dyn Backend {
    fn load(&self, meta: RevisionMeta, data: &mut dyn Read) -> StoreResult<RevisionId> {
        Backend::store(self, meta, data)
    }
}
