//! Backup and restore of Folio revisions as a flat byte stream.
//!
//! # Format
//!
//! ```text
//! repeat per revision:
//!     u32 BE     length m of the metadata
//!     m bytes    metadata, UTF-8 JSON; carries the payload size d
//!     d bytes    payload
//! u32 BE 0       end marker
//! ```
//!
//! Dumps may be concatenated; inner end markers are skipped on load.
//! Loading writes to the backend only, so indexes must be rebuilt after.

pub mod error;
pub mod reader;
pub mod source;
pub mod writer;

pub use error::{PackError, PackResult};
pub use reader::{deserialize, DeserializeOptions, LoadStats};
pub use source::{DumpSource, LoadTarget};
pub use writer::{serialize, write_end, write_record, DumpStats};

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::io::Read;
    use std::sync::Arc;

    use folio_store::{Backend, MemoryStore, RoutingBackend, StoresBackend};
    use folio_types::{ItemId, RevisionId, RevisionMeta};

    use super::{deserialize, serialize, write_end, DeserializeOptions, LoadStats, PackError};

    fn memory_backend() -> Arc<dyn Backend> {
        Arc::new(StoresBackend::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
        ))
    }

    fn router() -> RoutingBackend {
        RoutingBackend::new(
            vec![
                (String::new(), "default".into()),
                ("userprofiles".into(), "users".into()),
                ("help".into(), "help".into()),
            ],
            HashMap::from([
                ("default".to_string(), memory_backend()),
                ("users".to_string(), memory_backend()),
                ("help".to_string(), memory_backend()),
            ]),
        )
        .unwrap()
    }

    fn meta(namespace: &str, name: &str) -> RevisionMeta {
        RevisionMeta {
            revid: Some(RevisionId::new()),
            itemid: Some(ItemId::new()),
            namespace: Some(namespace.into()),
            contenttype: Some("text/plain;charset=utf-8".into()),
            mtime: Some(1_700_000_000),
            ..RevisionMeta::named(name)
        }
    }

    fn populate(router: &RoutingBackend) {
        router.store(meta("", "Home"), &mut &b"welcome"[..]).unwrap();
        router.store(meta("", "Empty"), &mut &b""[..]).unwrap();
        router
            .store(meta("userprofiles", "alice"), &mut &b"{\"email\":\"a@x\"}"[..])
            .unwrap();
        router.store(meta("help", "Syntax"), &mut &[0u8, 1, 2, 255][..]).unwrap();
    }

    /// revid -> (meta, payload) for every revision.
    fn contents(router: &RoutingBackend) -> BTreeMap<RevisionId, (RevisionMeta, Vec<u8>)> {
        router
            .revisions()
            .unwrap()
            .into_iter()
            .map(|rev| {
                let (meta, mut data) = router.retrieve(&rev.backend, &rev.revid).unwrap();
                let mut buf = Vec::new();
                data.read_to_end(&mut buf).unwrap();
                (rev.revid, (meta, buf))
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Round trip
    // -----------------------------------------------------------------------

    #[test]
    fn round_trip_preserves_meta_and_data() {
        let source = router();
        populate(&source);

        let mut dump = Vec::new();
        let stats = serialize(&source, &mut dump).unwrap();
        assert_eq!(stats.revisions, 4);
        assert_eq!(stats.payload_bytes, 7 + 15 + 4);
        assert!(dump.ends_with(&[0, 0, 0, 0]));

        let target = router();
        let loaded = deserialize(&mut &dump[..], &target, &DeserializeOptions::default()).unwrap();
        assert_eq!(loaded, LoadStats { stored: 4, skipped: 0 });
        assert_eq!(contents(&target), contents(&source));
    }

    #[test]
    fn empty_backend_dumps_end_marker_only() {
        let mut dump = Vec::new();
        serialize(&router(), &mut dump).unwrap();
        assert_eq!(dump, vec![0, 0, 0, 0]);
        let stats = deserialize(&mut &dump[..], &router(), &DeserializeOptions::default()).unwrap();
        assert_eq!(stats, LoadStats::default());
    }

    #[test]
    fn single_backend_source_and_target() {
        let source = memory_backend();
        source.store(RevisionMeta::named("Foo"), &mut &b"foo"[..]).unwrap();
        let mut dump = Vec::new();
        serialize(&*source, &mut dump).unwrap();

        let target = memory_backend();
        deserialize(&mut &dump[..], &*target, &DeserializeOptions::default()).unwrap();
        assert_eq!(target.revids().unwrap(), source.revids().unwrap());
    }

    #[test]
    fn concatenated_dumps_load_fully() {
        let a = router();
        a.store(meta("", "A"), &mut &b"a"[..]).unwrap();
        let b = router();
        b.store(meta("", "B"), &mut &b"bb"[..]).unwrap();

        let mut dump = Vec::new();
        serialize(&a, &mut dump).unwrap();
        serialize(&b, &mut dump).unwrap();

        let target = router();
        let stats = deserialize(&mut &dump[..], &target, &DeserializeOptions::default()).unwrap();
        assert_eq!(stats.stored, 2);
    }

    #[test]
    fn shared_payload_is_skipped_without_desync() {
        let source = router();
        let first = meta("", "Orig");
        let (_, revid) = source.store(first, &mut &b"shared"[..]).unwrap();
        let dataid = source.retrieve_meta("default", &revid).unwrap().dataid;
        let copy = RevisionMeta {
            dataid,
            ..meta("", "Copy")
        };
        source.store(copy, &mut &b"shared"[..]).unwrap();
        source.store(meta("", "After"), &mut &b"tail"[..]).unwrap();

        let mut dump = Vec::new();
        serialize(&source, &mut dump).unwrap();
        let target = router();
        deserialize(&mut &dump[..], &target, &DeserializeOptions::default()).unwrap();
        assert_eq!(contents(&target), contents(&source));
    }

    // -----------------------------------------------------------------------
    // Options
    // -----------------------------------------------------------------------

    #[test]
    fn rename_and_kill_namespaces() {
        let source = router();
        populate(&source);
        let mut dump = Vec::new();
        serialize(&source, &mut dump).unwrap();

        let target = router();
        let options = DeserializeOptions {
            rename_ns: Some((String::new(), "help".into())),
            kill_ns: Some("userprofiles".into()),
        };
        let stats = deserialize(&mut &dump[..], &target, &options).unwrap();
        assert_eq!(stats, LoadStats { stored: 3, skipped: 1 });

        let namespaces: Vec<String> = contents(&target)
            .into_values()
            .map(|(meta, _)| meta.namespace.unwrap_or_default())
            .collect();
        assert_eq!(namespaces, vec!["help"; 3]);
        assert!(target.backend("users").unwrap().revids().unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Damage
    // -----------------------------------------------------------------------

    #[test]
    fn truncated_payload_is_error() {
        let source = router();
        source.store(meta("", "Big"), &mut &[7u8; 64][..]).unwrap();
        let mut dump = Vec::new();
        serialize(&source, &mut dump).unwrap();
        dump.truncate(dump.len() - 4 - 10);

        let err = deserialize(&mut &dump[..], &router(), &DeserializeOptions::default()).unwrap_err();
        assert!(matches!(err, PackError::Truncated { expected: 64, actual: 54, .. }));
    }

    #[test]
    fn oversized_meta_header_is_rejected() {
        let mut dump = Vec::new();
        dump.extend_from_slice(&u32::MAX.to_be_bytes());
        dump.extend_from_slice(b"{}");
        let err = deserialize(&mut &dump[..], &router(), &DeserializeOptions::default()).unwrap_err();
        assert!(matches!(err, PackError::MetaTooLarge { len: u32::MAX, .. }));

        let mut dump = Vec::new();
        dump.extend_from_slice(&1000u32.to_be_bytes());
        dump.extend_from_slice(br#"{"name":"Short"}"#);
        let err = deserialize(&mut &dump[..], &router(), &DeserializeOptions::default()).unwrap_err();
        assert!(matches!(err, PackError::TruncatedMeta { expected: 1000, actual: 16 }));
    }

    #[test]
    fn legacy_single_name_is_accepted() {
        let json = br#"{"name":"Old","namespace":"","size":2,"contenttype":"text/plain;charset=utf-8"}"#;
        let mut dump = Vec::new();
        dump.extend_from_slice(&(json.len() as u32).to_be_bytes());
        dump.extend_from_slice(json);
        dump.extend_from_slice(b"ok");
        write_end(&mut dump).unwrap();

        let target = router();
        deserialize(&mut &dump[..], &target, &DeserializeOptions::default()).unwrap();
        let (meta, data) = contents(&target).into_values().next().unwrap();
        assert_eq!(meta.name, vec!["Old".to_string()]);
        assert_eq!(data, b"ok");
    }
}
