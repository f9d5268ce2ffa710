use std::io::Read;
use std::sync::Arc;

use folio_types::{DataId, RevisionId, RevisionMeta};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::hashing::HashingReader;
use crate::traits::Store;

/// A revision store: flat revisions keyed by generated revision ids.
///
/// The backend has no notion of items; grouping revisions is the index's
/// job. Metadata and payload are two separately retrievable artifacts, so a
/// metadata-only read never touches the payload.
pub trait Backend: Send + Sync {
    /// Prepare empty storage.
    fn create(&self) -> StoreResult<()>;

    /// Remove the storage and everything in it.
    fn destroy(&self) -> StoreResult<()>;

    /// Begin using the backend.
    fn open(&self) -> StoreResult<()>;

    /// Stop using the backend.
    fn close(&self) -> StoreResult<()>;

    /// Ids of all stored revisions, in no particular order.
    fn revids(&self) -> StoreResult<Vec<RevisionId>>;

    /// Whether a revision is stored.
    fn contains(&self, revid: &RevisionId) -> StoreResult<bool>;

    /// Metadata of a revision.
    fn retrieve_meta(&self, revid: &RevisionId) -> StoreResult<RevisionMeta>;

    /// Metadata and payload of a revision.
    fn retrieve(&self, revid: &RevisionId)
        -> StoreResult<(RevisionMeta, Box<dyn Read + Send>)>;

    /// Store a revision and return its id.
    ///
    /// A missing `revid` is generated. Declared `size`/`hash` are checked
    /// against the payload and filled in.
    fn store(&self, meta: RevisionMeta, data: &mut dyn Read) -> StoreResult<RevisionId>;

    /// Remove a revision's metadata, and its payload when `destroy_data`.
    fn remove(&self, revid: &RevisionId, destroy_data: bool) -> StoreResult<()>;
}

/// Backend composed of a meta store and a data store.
///
/// Metadata is JSON under the revid; payloads live under a separate
/// `dataid` so several revisions can share one payload.
pub struct StoresBackend {
    meta_store: Arc<dyn Store>,
    data_store: Arc<dyn Store>,
}

impl StoresBackend {
    pub fn new(meta_store: Arc<dyn Store>, data_store: Arc<dyn Store>) -> Self {
        Self {
            meta_store,
            data_store,
        }
    }

    fn load_meta(&self, revid: &RevisionId) -> StoreResult<RevisionMeta> {
        let bytes = self.meta_store.get(revid.as_str())?;
        RevisionMeta::from_json(&bytes).map_err(|source| StoreError::CorruptMeta {
            revid: revid.clone(),
            source,
        })
    }

    /// Write a new payload under `dataid`, verifying declared size and hash.
    ///
    /// On mismatch the payload is deleted again before the error returns.
    fn store_new_data(
        &self,
        meta: &mut RevisionMeta,
        dataid: &DataId,
        data: &mut dyn Read,
    ) -> StoreResult<()> {
        let mut reader = HashingReader::new(data);
        self.data_store.set_from_reader(dataid.as_str(), &mut reader)?;
        let size = reader.size();
        let hash = reader.hex_digest();

        if let Err(e) = check_declared(meta, size, &hash) {
            warn!(dataid = %dataid, error = %e, "payload rejected");
            self.data_store.delete(dataid.as_str())?;
            return Err(e);
        }
        meta.size = Some(size);
        meta.hash = Some(hash);
        Ok(())
    }
}

fn check_declared(meta: &RevisionMeta, size: u64, hash: &str) -> StoreResult<()> {
    if let Some(declared) = meta.size {
        if declared != size {
            return Err(StoreError::Validation {
                field: "size",
                declared: declared.to_string(),
                computed: size.to_string(),
            });
        }
    }
    if let Some(declared) = &meta.hash {
        if !declared.eq_ignore_ascii_case(hash) {
            return Err(StoreError::Validation {
                field: "hash",
                declared: declared.clone(),
                computed: hash.to_string(),
            });
        }
    }
    Ok(())
}

impl Backend for StoresBackend {
    fn create(&self) -> StoreResult<()> {
        self.meta_store.create()?;
        self.data_store.create()
    }

    fn destroy(&self) -> StoreResult<()> {
        self.meta_store.destroy()?;
        self.data_store.destroy()
    }

    fn open(&self) -> StoreResult<()> {
        self.meta_store.open()?;
        self.data_store.open()
    }

    fn close(&self) -> StoreResult<()> {
        self.meta_store.close()?;
        self.data_store.close()
    }

    fn revids(&self) -> StoreResult<Vec<RevisionId>> {
        let mut revids = Vec::new();
        for key in self.meta_store.keys()? {
            match RevisionId::parse(&key) {
                Ok(revid) => revids.push(revid),
                Err(e) => warn!(key = %key, error = %e, "skipping foreign key in meta store"),
            }
        }
        Ok(revids)
    }

    fn contains(&self, revid: &RevisionId) -> StoreResult<bool> {
        self.meta_store.contains(revid.as_str())
    }

    fn retrieve_meta(&self, revid: &RevisionId) -> StoreResult<RevisionMeta> {
        self.load_meta(revid)
    }

    fn retrieve(
        &self,
        revid: &RevisionId,
    ) -> StoreResult<(RevisionMeta, Box<dyn Read + Send>)> {
        let meta = self.load_meta(revid)?;
        let dataid = meta.dataid.clone().ok_or_else(|| StoreError::CorruptMeta {
            revid: revid.clone(),
            source: folio_types::TypeError::Serialization("missing dataid".into()),
        })?;
        let data = self.data_store.get_reader(dataid.as_str())?;
        Ok((meta, data))
    }

    fn store(&self, mut meta: RevisionMeta, data: &mut dyn Read) -> StoreResult<RevisionId> {
        let revid = meta.revid.get_or_insert_with(RevisionId::new).clone();

        match meta.dataid.clone() {
            Some(dataid) if self.data_store.contains(dataid.as_str())? => {
                // Shared payload: leave it alone, but keep the input consumed.
                let mut reader = HashingReader::new(data);
                reader.drain()?;
            }
            Some(dataid) => self.store_new_data(&mut meta, &dataid, data)?,
            None => {
                let dataid = DataId::new();
                self.store_new_data(&mut meta, &dataid, data)?;
                meta.dataid = Some(dataid);
            }
        }

        self.meta_store.set(revid.as_str(), &meta.to_json()?)?;
        debug!(revid = %revid, size = ?meta.size, "stored revision");
        Ok(revid)
    }

    fn remove(&self, revid: &RevisionId, destroy_data: bool) -> StoreResult<()> {
        let meta = self.load_meta(revid)?;
        self.meta_store.delete(revid.as_str())?;
        if destroy_data {
            if let Some(dataid) = meta.dataid {
                match self.data_store.delete(dataid.as_str()) {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {
                        warn!(revid = %revid, dataid = %dataid, "payload already gone")
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        debug!(revid = %revid, destroy_data, "removed revision");
        Ok(())
    }
}

impl std::fmt::Debug for StoresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoresBackend").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::content_hash;
    use crate::memory::MemoryStore;

    fn memory_backend() -> (StoresBackend, Arc<MemoryStore>, Arc<MemoryStore>) {
        let meta = Arc::new(MemoryStore::new());
        let data = Arc::new(MemoryStore::new());
        let backend = StoresBackend::new(meta.clone(), data.clone());
        backend.create().unwrap();
        (backend, meta, data)
    }

    fn read_all(mut reader: Box<dyn Read + Send>) -> Vec<u8> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    // -----------------------------------------------------------------------
    // Store / retrieve
    // -----------------------------------------------------------------------

    #[test]
    fn store_fills_generated_fields() {
        let (backend, _, _) = memory_backend();
        let revid = backend
            .store(RevisionMeta::named("Foo"), &mut &b"hello"[..])
            .unwrap();

        let (meta, data) = backend.retrieve(&revid).unwrap();
        assert_eq!(meta.revid.as_ref(), Some(&revid));
        assert_eq!(meta.name, vec!["Foo".to_string()]);
        assert_eq!(meta.size, Some(5));
        assert_eq!(meta.hash.as_deref(), Some(content_hash(b"hello").as_str()));
        assert!(meta.dataid.is_some());
        assert_eq!(read_all(data), b"hello");
    }

    #[test]
    fn explicit_revid_is_kept() {
        let (backend, _, _) = memory_backend();
        let revid = RevisionId::new();
        let meta = RevisionMeta {
            revid: Some(revid.clone()),
            ..RevisionMeta::named("Foo")
        };
        assert_eq!(backend.store(meta, &mut &b""[..]).unwrap(), revid);
    }

    #[test]
    fn metadata_read_skips_payload() {
        let (backend, _, data_store) = memory_backend();
        let revid = backend
            .store(RevisionMeta::named("Foo"), &mut &b"payload"[..])
            .unwrap();
        // Drop the payload; metadata must still be readable.
        for key in data_store.keys().unwrap() {
            data_store.delete(&key).unwrap();
        }
        assert_eq!(backend.retrieve_meta(&revid).unwrap().size, Some(7));
        assert!(backend.retrieve(&revid).is_err());
    }

    #[test]
    fn retrieve_missing_is_not_found() {
        let (backend, _, _) = memory_backend();
        let err = backend.retrieve(&RevisionId::new()).err().unwrap();
        assert!(err.is_not_found());
    }

    // -----------------------------------------------------------------------
    // Size / hash verification
    // -----------------------------------------------------------------------

    #[test]
    fn matching_declarations_are_accepted() {
        let (backend, _, _) = memory_backend();
        let meta = RevisionMeta {
            size: Some(3),
            hash: Some(content_hash(b"abc")),
            ..RevisionMeta::named("Foo")
        };
        assert!(backend.store(meta, &mut &b"abc"[..]).is_ok());
    }

    #[test]
    fn size_mismatch_writes_nothing() {
        let (backend, meta_store, data_store) = memory_backend();
        let meta = RevisionMeta {
            size: Some(99),
            ..RevisionMeta::named("Foo")
        };
        let err = backend.store(meta, &mut &b"abc"[..]).unwrap_err();
        assert!(matches!(err, StoreError::Validation { field: "size", .. }));
        assert!(meta_store.is_empty());
        assert!(data_store.is_empty());
    }

    #[test]
    fn hash_mismatch_writes_nothing() {
        let (backend, meta_store, data_store) = memory_backend();
        let meta = RevisionMeta {
            hash: Some(content_hash(b"something else")),
            ..RevisionMeta::named("Foo")
        };
        let err = backend.store(meta, &mut &b"abc"[..]).unwrap_err();
        assert!(matches!(err, StoreError::Validation { field: "hash", .. }));
        assert!(meta_store.is_empty());
        assert!(data_store.is_empty());
    }

    // -----------------------------------------------------------------------
    // Shared payloads / removal
    // -----------------------------------------------------------------------

    #[test]
    fn existing_dataid_is_not_rewritten() {
        let (backend, _, data_store) = memory_backend();
        let first = backend
            .store(RevisionMeta::named("Foo"), &mut &b"shared"[..])
            .unwrap();
        let first_meta = backend.retrieve_meta(&first).unwrap();

        let second_meta = RevisionMeta {
            dataid: first_meta.dataid.clone(),
            size: first_meta.size,
            hash: first_meta.hash.clone(),
            ..RevisionMeta::named("Foo")
        };
        let second = backend.store(second_meta, &mut &b"shared"[..]).unwrap();

        assert_eq!(data_store.len(), 1);
        let (_, data) = backend.retrieve(&second).unwrap();
        assert_eq!(read_all(data), b"shared");
    }

    #[test]
    fn remove_keeps_or_destroys_data() {
        let (backend, _, data_store) = memory_backend();
        let keep = backend
            .store(RevisionMeta::named("A"), &mut &b"1"[..])
            .unwrap();
        let drop = backend
            .store(RevisionMeta::named("B"), &mut &b"2"[..])
            .unwrap();

        backend.remove(&keep, false).unwrap();
        backend.remove(&drop, true).unwrap();
        assert_eq!(data_store.len(), 1);
        assert!(backend.revids().unwrap().is_empty());
        assert!(backend.remove(&keep, false).unwrap_err().is_not_found());
    }

    #[test]
    fn revids_lists_all() {
        let (backend, _, _) = memory_backend();
        let a = backend.store(RevisionMeta::named("A"), &mut &b""[..]).unwrap();
        let b = backend.store(RevisionMeta::named("B"), &mut &b""[..]).unwrap();
        let mut revids = backend.revids().unwrap();
        revids.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(revids, expected);
    }

    // -----------------------------------------------------------------------
    // Round trip
    // -----------------------------------------------------------------------

    proptest::proptest! {
        #[test]
        fn round_trip(
            data in proptest::collection::vec(proptest::num::u8::ANY, 0..2048),
            name in "[A-Za-z][A-Za-z0-9/]{0,20}",
            comment in proptest::option::of("[ -~]{0,30}"),
        ) {
            let (backend, _, _) = memory_backend();
            let input = RevisionMeta { comment, ..RevisionMeta::named(name) };
            let revid = backend.store(input.clone(), &mut &data[..]).unwrap();

            let (meta, reader) = backend.retrieve(&revid).unwrap();
            let expected = RevisionMeta {
                revid: Some(revid),
                size: Some(data.len() as u64),
                hash: Some(content_hash(&data)),
                dataid: meta.dataid.clone(),
                ..input
            };
            proptest::prop_assert_eq!(meta, expected);
            proptest::prop_assert_eq!(read_all(reader), data);
        }
    }
}
