use std::io::{Read, Write};
use std::sync::Arc;

use folio_gate::{ProtectingMiddleware, RequestContext};
use folio_index::{IndexingMiddleware, WhichIndex};
use folio_pack::{DeserializeOptions, DumpStats, LoadStats};
use folio_store::RoutingBackend;
use tracing::info;

use crate::config::WikiConfig;
use crate::error::SdkResult;

/// One wiki: storage, indexes and ACLs wired from a [`WikiConfig`].
///
/// Construction builds the backends but does not open anything. Call
/// [`create`](Self::create) for a new wiki or [`open`](Self::open) for an
/// existing one.
pub struct Wiki {
    config: WikiConfig,
    backend: Arc<RoutingBackend>,
    indexer: IndexingMiddleware,
}

impl std::fmt::Debug for Wiki {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wiki")
            .field("wikiname", &self.config.wikiname)
            .field("index", &self.config.index.location())
            .field("backend", &self.backend)
            .finish()
    }
}

impl Wiki {
    pub fn new(config: WikiConfig) -> SdkResult<Self> {
        config.validate()?;
        let backend = Arc::new(config.storage.build()?);
        let mut indexer = IndexingMiddleware::new(config.index.location(), Arc::clone(&backend));
        if let Some(wikiname) = &config.wikiname {
            indexer = indexer.with_wikiname(wikiname.clone());
        }
        Ok(Self {
            config,
            backend,
            indexer,
        })
    }

    pub fn config(&self) -> &WikiConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<RoutingBackend> {
        &self.backend
    }

    /// Unprotected access; use [`protector`](Self::protector) for requests.
    pub fn indexer(&self) -> &IndexingMiddleware {
        &self.indexer
    }

    // ---- Lifecycle ----

    /// Create empty storage and an empty index, and open both.
    pub fn create(&self) -> SdkResult<()> {
        self.backend.create()?;
        self.backend.open()?;
        self.indexer.create(false)?;
        self.indexer.open()?;
        info!(wikiname = ?self.config.wikiname, "wiki created");
        Ok(())
    }

    pub fn open(&self) -> SdkResult<()> {
        self.backend.open()?;
        self.indexer.open()?;
        Ok(())
    }

    pub fn close(&self) -> SdkResult<()> {
        self.indexer.close();
        self.backend.close()?;
        Ok(())
    }

    /// Remove storage and index.
    pub fn destroy(&self) -> SdkResult<()> {
        self.indexer.close();
        self.indexer.destroy(false)?;
        self.backend.destroy()?;
        info!(wikiname = ?self.config.wikiname, "wiki destroyed");
        Ok(())
    }

    // ---- Requests ----

    /// An access-checked view for one request.
    pub fn protector(&self, ctx: RequestContext) -> ProtectingMiddleware<'_> {
        ProtectingMiddleware::new(&self.indexer, &self.config.acl, &self.config.principals, ctx)
    }

    // ---- Maintenance ----

    /// Rebuild the index into the temporary location and swap it in.
    pub fn reindex(&self) -> SdkResult<()> {
        self.indexer.destroy(true)?;
        self.indexer.create(true)?;
        self.indexer.rebuild(true)?;
        self.indexer.move_index()?;
        Ok(())
    }

    /// Bring the live index in line with storage; `true` if anything changed.
    pub fn update_index(&self) -> SdkResult<bool> {
        Ok(self.indexer.update(false)?)
    }

    /// Number of items and revisions in the live index.
    pub fn counts(&self) -> SdkResult<(usize, usize)> {
        let items = self.indexer.dump(false, WhichIndex::LatestRevs)?.len();
        let revisions = self.indexer.dump(false, WhichIndex::AllRevs)?.len();
        Ok((items, revisions))
    }

    // ---- Backup ----

    /// Write every stored revision to `dst`.
    pub fn save<W: Write>(&self, dst: &mut W) -> SdkResult<DumpStats> {
        Ok(folio_pack::serialize(&*self.backend, dst)?)
    }

    /// Load revisions from `src` into storage and reindex.
    pub fn load<R: Read>(&self, src: &mut R, options: &DeserializeOptions) -> SdkResult<LoadStats> {
        let stats = folio_pack::deserialize(src, &*self.backend, options)?;
        self.reindex()?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use folio_gate::Right;
    use folio_index::{Query, SearchOptions, StoreOptions};
    use folio_types::{ItemSelector, RevisionMeta, CONTENTTYPE_DEFAULT};

    use super::*;
    use crate::config::IndexConfig;

    fn text(name: &str) -> RevisionMeta {
        RevisionMeta {
            contenttype: Some(CONTENTTYPE_DEFAULT.into()),
            ..RevisionMeta::named(name)
        }
    }

    fn memory_wiki() -> Wiki {
        let wiki = Wiki::new(WikiConfig::default()).unwrap();
        wiki.create().unwrap();
        wiki
    }

    #[test]
    fn store_and_read_through_protector() {
        let wiki = memory_wiki();
        let gate = wiki.protector(RequestContext::user("alice"));
        let mut item = gate.get_item(ItemSelector::name("", "Home")).unwrap();
        item.store_revision(text("Home"), &mut &b"hello"[..], &StoreOptions::default())
            .unwrap();

        assert!(gate.may("Home", Right::Read).unwrap());
        let home = gate.lookup("Home").unwrap();
        assert_eq!(home.current().unwrap().read_data().unwrap(), b"hello");
        assert_eq!(wiki.counts().unwrap(), (1, 1));
    }

    #[test]
    fn user_profiles_closed_by_default() {
        let wiki = memory_wiki();
        let gate = wiki.protector(RequestContext::anonymous());
        assert!(!gate.may("userprofiles/alice", Right::Read).unwrap());
        assert!(gate.may("Anything", Right::Write).unwrap());
    }

    #[test]
    fn save_load_round_trip() {
        let source = memory_wiki();
        for name in ["A", "B", "C"] {
            let mut item = source.indexer().get_item(ItemSelector::name("", name)).unwrap();
            item.store_revision(text(name), &mut name.as_bytes(), &StoreOptions::default())
                .unwrap();
        }
        let mut dump = Vec::new();
        let saved = source.save(&mut dump).unwrap();
        assert_eq!(saved.revisions, 3);

        let target = memory_wiki();
        let loaded = target.load(&mut &dump[..], &DeserializeOptions::default()).unwrap();
        assert_eq!(loaded.stored, 3);
        assert_eq!(target.counts().unwrap(), (3, 3));
        let hits = target
            .indexer()
            .search(&Query::Every, &SearchOptions::default(), WhichIndex::LatestRevs)
            .unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn on_disk_wiki_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = WikiConfig::simple(dir.path());
        {
            let wiki = Wiki::new(config.clone()).unwrap();
            wiki.create().unwrap();
            let mut item = wiki.indexer().get_item(ItemSelector::name("", "Foo")).unwrap();
            item.store_revision(text("Foo"), &mut &b"x"[..], &StoreOptions::default())
                .unwrap();
            wiki.close().unwrap();
        }
        let wiki = Wiki::new(config).unwrap();
        wiki.open().unwrap();
        assert!(wiki.indexer().has_item("", "Foo").unwrap());
        assert!(!wiki.update_index().unwrap());
    }

    #[test]
    fn memory_index_config() {
        let config = WikiConfig {
            index: IndexConfig { path: None },
            ..WikiConfig::default()
        };
        let wiki = Wiki::new(config).unwrap();
        assert!(format!("{wiki:?}").contains("Memory"));
    }
}
