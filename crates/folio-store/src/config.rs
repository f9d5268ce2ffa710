use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, StoresBackend};
use crate::embedded::RedbStore;
use crate::error::StoreResult;
use crate::fs::FsStore;
use crate::memory::MemoryStore;
use crate::routing::RoutingBackend;

/// How one backend keeps its meta and data stores.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendSpec {
    /// Both stores in memory.
    Memory,
    /// `<path>/meta` and `<path>/data` directories, one file per key.
    Fs { path: PathBuf },
    /// One redb file with `meta` and `data` tables.
    Redb { path: PathBuf },
}

impl BackendSpec {
    /// Instantiate the backend described by this spec.
    pub fn build(&self) -> StoreResult<Arc<dyn Backend>> {
        let backend = match self {
            Self::Memory => {
                StoresBackend::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
            }
            Self::Fs { path } => StoresBackend::new(
                Arc::new(FsStore::new(path.join("meta"))),
                Arc::new(FsStore::new(path.join("data"))),
            ),
            Self::Redb { path } => {
                let meta = RedbStore::open_file(path, "meta")?;
                let data = RedbStore::with_database(meta.database(), "data");
                StoresBackend::new(Arc::new(meta), Arc::new(data))
            }
        };
        Ok(Arc::new(backend))
    }

    /// This spec with every path placed below `root`.
    pub fn under(&self, root: &std::path::Path, name: &str) -> Self {
        match self {
            Self::Memory => Self::Memory,
            Self::Fs { .. } => Self::Fs {
                path: root.join(name),
            },
            Self::Redb { .. } => Self::Redb {
                path: root.join(format!("{name}.redb")),
            },
        }
    }
}

/// Namespace to backend mapping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Namespace prefix → backend name. `""` is the default namespace.
    pub namespaces: BTreeMap<String, String>,
    /// Backend name → how to build it.
    pub backends: BTreeMap<String, BackendSpec>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::simple(&BackendSpec::Memory, std::path::Path::new("."))
    }
}

impl StorageConfig {
    /// The usual two-backend layout: the default namespace in `default`,
    /// user profiles in `userprofiles`.
    pub fn simple(kind: &BackendSpec, root: &std::path::Path) -> Self {
        let namespaces = BTreeMap::from([
            (folio_types::NAMESPACE_DEFAULT.to_string(), "default".to_string()),
            (
                folio_types::NAMESPACE_USERPROFILES.to_string(),
                "userprofiles".to_string(),
            ),
        ]);
        let backends = BTreeMap::from([
            ("default".to_string(), kind.under(root, "default")),
            ("userprofiles".to_string(), kind.under(root, "userprofiles")),
        ]);
        Self {
            namespaces,
            backends,
        }
    }

    /// Build every backend and the routing table over them.
    pub fn build(&self) -> StoreResult<RoutingBackend> {
        let mut backends = HashMap::new();
        for (name, spec) in &self.backends {
            backends.insert(name.clone(), spec.build()?);
        }
        let namespaces = self
            .namespaces
            .iter()
            .map(|(ns, backend)| (ns.clone(), backend.clone()))
            .collect();
        RoutingBackend::new(namespaces, backends)
    }
}
