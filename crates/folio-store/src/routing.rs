use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use folio_types::{RevisionId, RevisionMeta};
use tracing::debug;

use crate::backend::Backend;
use crate::error::{StoreError, StoreResult};

/// A revision id qualified by the name of the backend holding it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendRevision {
    pub backend: String,
    pub revid: RevisionId,
}

/// Fans revision operations out over several backends by namespace.
///
/// Namespaces are matched longest first, with the default namespace `""`
/// last. The backend name ends up in the index; it is never written into
/// stored metadata.
pub struct RoutingBackend {
    /// `(namespace, backend name)`, longest namespace first.
    namespaces: Vec<(String, String)>,
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl RoutingBackend {
    /// Build the routing table.
    ///
    /// Every namespace must point at a backend present in `backends`.
    pub fn new(
        namespaces: Vec<(String, String)>,
        backends: HashMap<String, Arc<dyn Backend>>,
    ) -> StoreResult<Self> {
        for (_, backend) in &namespaces {
            if !backends.contains_key(backend) {
                return Err(StoreError::UnknownBackend(backend.clone()));
            }
        }
        let mut namespaces = namespaces;
        namespaces.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Ok(Self {
            namespaces,
            backends,
        })
    }

    /// A router with a single backend serving every namespace.
    pub fn single(name: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        let name = name.into();
        Self {
            namespaces: vec![(String::new(), name.clone())],
            backends: HashMap::from([(name, backend)]),
        }
    }

    /// Configured namespaces, longest first.
    pub fn namespaces(&self) -> Vec<String> {
        self.namespaces.iter().map(|(ns, _)| ns.clone()).collect()
    }

    /// Names of all backends.
    pub fn backend_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Look a backend up by name.
    pub fn backend(&self, name: &str) -> StoreResult<&Arc<dyn Backend>> {
        self.backends
            .get(name)
            .ok_or_else(|| StoreError::UnknownBackend(name.to_string()))
    }

    /// Name of the backend serving `namespace`.
    ///
    /// The default namespace only matches `""` itself; any other namespace
    /// must have a registered prefix ending at a `/` boundary or at its end.
    pub fn backend_for_namespace(&self, namespace: &str) -> StoreResult<&str> {
        self.namespaces
            .iter()
            .find(|(prefix, _)| namespace_matches(prefix, namespace))
            .map(|(_, backend)| backend.as_str())
            .ok_or_else(|| StoreError::NoBackend(namespace.to_string()))
    }

    /// Resolve the backend for a revision, normalizing its namespace.
    ///
    /// Without an explicit namespace, the first name is read as
    /// `namespace/name` and the prefix is moved into `namespace`.
    fn route(&self, meta: &mut RevisionMeta) -> StoreResult<String> {
        if let Some(namespace) = meta.namespace.as_deref() {
            return self.backend_for_namespace(namespace).map(str::to_string);
        }
        let first = meta.name.first().cloned().unwrap_or_default();
        for (prefix, backend) in &self.namespaces {
            if prefix.is_empty() {
                continue;
            }
            if strip_namespace(&first, prefix).is_some() {
                for name in &mut meta.name {
                    if let Some(rest) = strip_namespace(name, prefix).map(str::to_string) {
                        *name = rest;
                    }
                }
                debug!(namespace = %prefix, name = %first, "namespace taken from name");
                meta.namespace = Some(prefix.clone());
                return Ok(backend.clone());
            }
        }
        meta.namespace = Some(String::new());
        self.backend_for_namespace("").map(str::to_string)
    }

    pub fn create(&self) -> StoreResult<()> {
        self.backends.values().try_for_each(|b| b.create())
    }

    pub fn destroy(&self) -> StoreResult<()> {
        self.backends.values().try_for_each(|b| b.destroy())
    }

    pub fn open(&self) -> StoreResult<()> {
        self.backends.values().try_for_each(|b| b.open())
    }

    pub fn close(&self) -> StoreResult<()> {
        self.backends.values().try_for_each(|b| b.close())
    }

    /// Every stored revision across all backends, ordered by backend name.
    pub fn revisions(&self) -> StoreResult<Vec<BackendRevision>> {
        let mut out = Vec::new();
        for name in self.backend_names() {
            let backend = self.backend(&name)?;
            for revid in backend.revids()? {
                out.push(BackendRevision {
                    backend: name.clone(),
                    revid,
                });
            }
        }
        Ok(out)
    }

    pub fn contains(&self, backend: &str, revid: &RevisionId) -> StoreResult<bool> {
        self.backend(backend)?.contains(revid)
    }

    /// Name of the backend holding `revid`, whichever namespace it is in.
    pub fn locate(&self, revid: &RevisionId) -> StoreResult<Option<String>> {
        for name in self.backend_names() {
            if self.backend(&name)?.contains(revid)? {
                return Ok(Some(name));
            }
        }
        Ok(None)
    }

    pub fn retrieve_meta(&self, backend: &str, revid: &RevisionId) -> StoreResult<RevisionMeta> {
        self.backend(backend)?.retrieve_meta(revid)
    }

    pub fn retrieve(
        &self,
        backend: &str,
        revid: &RevisionId,
    ) -> StoreResult<(RevisionMeta, Box<dyn Read + Send>)> {
        self.backend(backend)?.retrieve(revid)
    }

    /// Store a revision in the backend serving its namespace.
    pub fn store(
        &self,
        mut meta: RevisionMeta,
        data: &mut dyn Read,
    ) -> StoreResult<(String, RevisionId)> {
        let name = self.route(&mut meta)?;
        let revid = self.backend(&name)?.store(meta, data)?;
        Ok((name, revid))
    }

    pub fn remove(&self, backend: &str, revid: &RevisionId, destroy_data: bool) -> StoreResult<()> {
        self.backend(backend)?.remove(revid, destroy_data)
    }
}

fn strip_namespace<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    name.strip_prefix(prefix).and_then(|r| r.strip_prefix('/'))
}

fn namespace_matches(prefix: &str, namespace: &str) -> bool {
    if prefix.is_empty() {
        return namespace.is_empty();
    }
    namespace
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

impl std::fmt::Debug for RoutingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingBackend")
            .field("namespaces", &self.namespaces)
            .finish()
    }
}
