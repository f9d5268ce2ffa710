//! Access-checked views over the indexing middleware.

use std::io::Read;

use folio_index::{
    Field, IndexDocument, IndexingMiddleware, Item, Query, Revision, SearchOptions, StoreOptions,
    WhichIndex,
};
use folio_types::{utc_now, ItemId, ItemSelector, RevisionId, RevisionMeta};
use tracing::debug;

use crate::cache::{AclAlternatives, AclCache};
use crate::config::AclMapping;
use crate::error::{GateError, GateResult};
use crate::principals::Principals;
use crate::rights::{Right, Timing};

/// Name used for requests without a logged-in user.
pub const ANONYMOUS: &str = "anonymous";

/// Who is asking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    /// Every name the requester goes by; any of them may be granted a right.
    pub user_names: Vec<String>,
    /// Logged in by a method that matches the `Trusted` ACL entry.
    pub trusted: bool,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self {
            user_names: vec![ANONYMOUS.to_string()],
            trusted: false,
        }
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self {
            user_names: vec![name.into()],
            trusted: false,
        }
    }

    pub fn trusted(mut self) -> Self {
        self.trusted = true;
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// Enforces ACLs for one request.
///
/// Owns the ACL caches, so a new instance should be made per request.
pub struct ProtectingMiddleware<'a> {
    indexer: &'a IndexingMiddleware,
    mapping: &'a AclMapping,
    principals: &'a dyn Principals,
    ctx: RequestContext,
    cache: AclCache,
}

impl std::fmt::Debug for ProtectingMiddleware<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectingMiddleware")
            .field("ctx", &self.ctx)
            .field("cache", &self.cache)
            .finish()
    }
}

impl<'a> ProtectingMiddleware<'a> {
    pub fn new(
        indexer: &'a IndexingMiddleware,
        mapping: &'a AclMapping,
        principals: &'a dyn Principals,
        ctx: RequestContext,
    ) -> Self {
        Self {
            indexer,
            mapping,
            principals,
            ctx,
            cache: AclCache::new(),
        }
    }

    pub fn indexer(&self) -> &'a IndexingMiddleware {
        self.indexer
    }

    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    pub fn cache(&self) -> &AclCache {
        &self.cache
    }

    // ---------------------------------------------------------------
    // ACL resolution
    // ---------------------------------------------------------------

    /// Alternative ACLs of `item`, without before/after.
    ///
    /// The item's own ACL if it has one; else, in a hierarchic namespace,
    /// the alternatives of every existing parent; else `[None]`, the
    /// namespace default.
    pub fn get_acls(&self, item: &Item<'_>) -> GateResult<AclAlternatives> {
        self.acls_inner(item, &mut Vec::new())
    }

    fn acls_inner(&self, item: &Item<'_>, visiting: &mut Vec<ItemId>) -> GateResult<AclAlternatives> {
        let key = match item.itemid() {
            Some(itemid) => itemid.to_string(),
            None => item.selector().to_string(),
        };
        if let Some(cached) = self.cache.lookup(&key) {
            return Ok(cached);
        }

        let alternatives = if let Some(acl) = item.acl() {
            vec![Some(acl.to_string())]
        } else if self.mapping.config_for(item.namespace())?.hierarchic {
            if let Some(itemid) = item.itemid() {
                visiting.push(itemid.clone());
            }
            let mut inherited = Vec::new();
            for parent in item.parent_ids()? {
                if visiting.contains(&parent) {
                    continue;
                }
                let parent = self.indexer.get_item(ItemSelector::ItemId(parent))?;
                inherited.extend(self.acls_inner(&parent, visiting)?.iter().cloned());
            }
            if inherited.is_empty() {
                vec![None]
            } else {
                inherited
            }
        } else {
            vec![None]
        };

        let alternatives = std::sync::Arc::new(alternatives);
        self.cache.store_lookup(key, std::sync::Arc::clone(&alternatives));
        Ok(alternatives)
    }

    /// Every full ACL that may apply to `item`: `before`, the alternative
    /// (or the namespace default), `after`.
    pub fn full_acls(&self, item: &Item<'_>) -> GateResult<Vec<String>> {
        let config = self.mapping.config_for(item.namespace())?;
        Ok(self
            .get_acls(item)?
            .iter()
            .map(|acl| full_acl(&config.before, acl.as_deref().unwrap_or(&config.default), &config.after))
            .collect())
    }

    fn decide(&self, namespace: &str, alternatives: &[Option<String>], right: Right, timing: &Timing) -> GateResult<bool> {
        let config = self.mapping.config_for(namespace)?;
        let now = utc_now();
        for user in &self.ctx.user_names {
            for acl in alternatives {
                let full = full_acl(&config.before, acl.as_deref().unwrap_or(&config.default), &config.after);
                let verdict = self.cache.verdict(&full, &config.default, user, right, || {
                    self.cache
                        .parsed(&full, &config.default)
                        .may(user, right, self.principals, self.ctx.trusted)
                });
                if verdict == Some(true) && right.refine(true, timing, now) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// May the requester exercise `right` on `item`?
    pub fn allows(&self, item: &Item<'_>, right: Right) -> GateResult<bool> {
        let timing = item
            .current()
            .map(|rev| timing_of(rev.document()))
            .unwrap_or_default();
        let alternatives = self.get_acls(item)?;
        self.decide(item.namespace(), &alternatives, right, &timing)
    }

    /// Succeeds if any of `rights` is allowed on `item`.
    pub fn require(&self, item: &Item<'_>, rights: &[Right]) -> GateResult<()> {
        for right in rights {
            if self.allows(item, *right)? {
                return Ok(());
            }
        }
        debug!(item = %item.selector(), users = ?self.ctx.user_names, ?rights, "access denied");
        Err(GateError::denied(rights, item.selector().to_string(), &self.ctx.user_names))
    }

    /// May the requester exercise `right` on the item named `fqname`?
    pub fn may(&self, fqname: &str, right: Right) -> GateResult<bool> {
        let item = self.indexer.lookup(fqname)?;
        self.allows(&item, right)
    }

    /// Readability of one indexed revision: its item's ACLs, its own
    /// publication time.
    fn may_read(&self, doc: &IndexDocument) -> GateResult<bool> {
        let item = self.indexer.get_item(ItemSelector::ItemId(doc.itemid.clone()))?;
        let alternatives = self.get_acls(&item)?;
        let timing = timing_of(doc);
        for right in [Right::Read, Right::PubRead] {
            if self.decide(item.namespace(), &alternatives, right, &timing)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ---------------------------------------------------------------
    // Items
    // ---------------------------------------------------------------

    pub fn get_item(&self, selector: ItemSelector) -> GateResult<ProtectedItem<'_>> {
        let item = self.indexer.get_item(selector)?;
        Ok(ProtectedItem { protector: self, item })
    }

    pub fn existing_item(&self, selector: ItemSelector) -> GateResult<ProtectedItem<'_>> {
        let item = self.indexer.existing_item(selector)?;
        Ok(ProtectedItem { protector: self, item })
    }

    pub fn create_item(&self, selector: ItemSelector) -> GateResult<ProtectedItem<'_>> {
        let item = self.indexer.create_item(selector)?;
        Ok(ProtectedItem { protector: self, item })
    }

    pub fn lookup(&self, fqname: &str) -> GateResult<ProtectedItem<'_>> {
        let item = self.indexer.lookup(fqname)?;
        Ok(ProtectedItem { protector: self, item })
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Search, dropping revisions the requester may not read. Paging and
    /// limits apply to the readable results.
    pub fn search(&self, query: &Query, opts: &SearchOptions, which: WhichIndex) -> GateResult<Vec<ProtectedRevision<'_>>> {
        let mut readable = Vec::new();
        for rev in self.indexer.search(query, &opts.unpaged(), which)? {
            if self.may_read(rev.document())? {
                readable.push(ProtectedRevision { protector: self, rev });
            }
        }
        opts.cut(&mut readable);
        Ok(readable)
    }

    pub fn documents(&self, which: WhichIndex, fields: &[(Field, &str)]) -> GateResult<Vec<ProtectedRevision<'_>>> {
        let mut readable = Vec::new();
        for rev in self.indexer.documents(which, fields)? {
            if self.may_read(rev.document())? {
                readable.push(ProtectedRevision { protector: self, rev });
            }
        }
        Ok(readable)
    }

    /// The first readable document matching `fields`.
    pub fn document(&self, which: WhichIndex, fields: &[(Field, &str)]) -> GateResult<Option<ProtectedRevision<'_>>> {
        for rev in self.indexer.documents(which, fields)? {
            if self.may_read(rev.document())? {
                return Ok(Some(ProtectedRevision { protector: self, rev }));
            }
        }
        Ok(None)
    }
}

fn full_acl(before: &str, acl: &str, after: &str) -> String {
    [before, acl, after].join(" ")
}

fn timing_of(doc: &IndexDocument) -> Timing {
    Timing {
        ptime: doc.ptime,
        mtime: Some(doc.mtime),
    }
}

/// An item whose every operation is checked against the requester's rights.
pub struct ProtectedItem<'p> {
    protector: &'p ProtectingMiddleware<'p>,
    item: Item<'p>,
}

impl std::fmt::Debug for ProtectedItem<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectedItem")
            .field("item", &self.item)
            .field("users", &self.protector.ctx.user_names)
            .finish()
    }
}

impl<'p> ProtectedItem<'p> {
    /// The unprotected item. Use for names and ids, not to bypass checks.
    pub fn item(&self) -> &Item<'p> {
        &self.item
    }

    pub fn exists(&self) -> bool {
        self.item.exists()
    }

    pub fn itemid(&self) -> Option<&ItemId> {
        self.item.itemid()
    }

    pub fn names(&self) -> Vec<String> {
        self.item.names()
    }

    pub fn namespace(&self) -> &str {
        self.item.namespace()
    }

    pub fn acl(&self) -> Option<&str> {
        self.item.acl()
    }

    pub fn full_acls(&self) -> GateResult<Vec<String>> {
        self.protector.full_acls(&self.item)
    }

    pub fn allows(&self, right: Right) -> GateResult<bool> {
        self.protector.allows(&self.item, right)
    }

    pub fn require(&self, rights: &[Right]) -> GateResult<()> {
        self.protector.require(&self.item, rights)
    }

    /// Every revision, oldest first. Requires `read`.
    pub fn iter_revisions(&self) -> GateResult<Vec<ProtectedRevision<'p>>> {
        self.require(&[Right::Read])?;
        Ok(self
            .item
            .iter_revisions()?
            .map(|rev| ProtectedRevision {
                protector: self.protector,
                rev,
            })
            .collect())
    }

    /// The current revision; reading it requires `read` or `pubread`.
    pub fn current(&self) -> Option<ProtectedRevision<'p>> {
        self.item.current().map(|rev| ProtectedRevision {
            protector: self.protector,
            rev,
        })
    }

    pub fn get_revision(&self, revid: &RevisionId) -> GateResult<ProtectedRevision<'p>> {
        let rev = self.item.get_revision(revid)?;
        Ok(ProtectedRevision {
            protector: self.protector,
            rev,
        })
    }

    /// Store a revision. Requires `write`; also `create` for a new item,
    /// `destroy` to overwrite and `admin` to change the ACL.
    pub fn store_revision(
        &mut self,
        meta: RevisionMeta,
        data: &mut dyn Read,
        options: &StoreOptions,
    ) -> GateResult<ProtectedRevision<'p>> {
        self.require(&[Right::Write])?;
        if !self.item.exists() {
            self.require(&[Right::Create])?;
        }
        if options.overwrite {
            self.require(&[Right::Destroy])?;
        }
        if meta.acl.as_deref() != self.item.acl() {
            self.require(&[Right::Admin])?;
        }
        let result = self.item.store_revision(meta, data, options);
        self.protector.cache.clear_lookup();
        let rev = result?;
        Ok(ProtectedRevision {
            protector: self.protector,
            rev,
        })
    }

    /// Requires `destroy`.
    pub fn store_all_revisions(&mut self, meta: RevisionMeta, data: &[u8]) -> GateResult<usize> {
        self.require(&[Right::Destroy])?;
        let result = self.item.store_all_revisions(meta, data);
        self.protector.cache.clear_lookup();
        Ok(result?)
    }

    /// Requires `destroy`.
    pub fn destroy_revision(&mut self, revid: &RevisionId) -> GateResult<()> {
        self.require(&[Right::Destroy])?;
        let result = self.item.destroy_revision(revid);
        self.protector.cache.clear_lookup();
        Ok(result?)
    }

    /// Requires `destroy`.
    pub fn destroy_all_revisions(&mut self) -> GateResult<usize> {
        self.require(&[Right::Destroy])?;
        let result = self.item.destroy_all_revisions();
        self.protector.cache.clear_lookup();
        Ok(result?)
    }
}

/// A revision whose metadata and payload require `read` or `pubread`.
pub struct ProtectedRevision<'p> {
    protector: &'p ProtectingMiddleware<'p>,
    rev: Revision<'p>,
}

impl std::fmt::Debug for ProtectedRevision<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectedRevision")
            .field("rev", &self.rev)
            .finish()
    }
}

impl<'p> ProtectedRevision<'p> {
    pub fn revid(&self) -> &RevisionId {
        self.rev.revid()
    }

    pub fn itemid(&self) -> &ItemId {
        self.rev.itemid()
    }

    pub fn name(&self) -> &str {
        self.rev.name()
    }

    pub fn names(&self) -> &[String] {
        self.rev.names()
    }

    pub fn namespace(&self) -> &str {
        self.rev.namespace()
    }

    pub fn mtime(&self) -> i64 {
        self.rev.mtime()
    }

    /// Checked against the item the revision belongs to.
    pub fn allows(&self, right: Right) -> GateResult<bool> {
        let item = self
            .protector
            .indexer
            .get_item(ItemSelector::ItemId(self.rev.itemid().clone()))?;
        self.protector.allows(&item, right)
    }

    pub fn require(&self, rights: &[Right]) -> GateResult<()> {
        for right in rights {
            if self.allows(*right)? {
                return Ok(());
            }
        }
        Err(GateError::denied(
            rights,
            format!("revision {}", self.rev.revid()),
            &self.protector.ctx.user_names,
        ))
    }

    pub fn meta(&self) -> GateResult<RevisionMeta> {
        self.require(&[Right::Read, Right::PubRead])?;
        Ok(self.rev.meta()?)
    }

    pub fn data(&self) -> GateResult<Box<dyn Read + Send>> {
        self.require(&[Right::Read, Right::PubRead])?;
        Ok(self.rev.data()?)
    }

    pub fn read_data(&self) -> GateResult<Vec<u8>> {
        self.require(&[Right::Read, Right::PubRead])?;
        Ok(self.rev.read_data()?)
    }

    /// The unprotected revision.
    pub fn revision(&self) -> &Revision<'p> {
        &self.rev
    }
}
