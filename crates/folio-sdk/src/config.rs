use std::path::{Path, PathBuf};

use folio_gate::{AclMapping, StaticPrincipals};
use folio_index::IndexLocation;
use folio_store::{BackendSpec, StorageConfig};
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Where the indexes live.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Index directory; in memory when unset.
    pub path: Option<PathBuf>,
}

impl IndexConfig {
    pub fn location(&self) -> IndexLocation {
        match &self.path {
            Some(path) => IndexLocation::Directory(path.clone()),
            None => IndexLocation::Memory,
        }
    }
}

/// Complete configuration of one wiki.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WikiConfig {
    /// Recorded in every revision stored through this wiki.
    pub wikiname: Option<String>,
    pub index: IndexConfig,
    pub storage: StorageConfig,
    pub acl: AclMapping,
    pub principals: StaticPrincipals,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            wikiname: None,
            index: IndexConfig::default(),
            storage: StorageConfig::default(),
            acl: AclMapping::simple(),
            principals: StaticPrincipals::default(),
        }
    }
}

impl WikiConfig {
    /// On-disk layout below `root`: redb backends and `root/index`.
    pub fn simple(root: &Path) -> Self {
        Self {
            index: IndexConfig {
                path: Some(root.join("index")),
            },
            storage: StorageConfig::simple(
                &BackendSpec::Redb {
                    path: root.to_path_buf(),
                },
                root,
            ),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> SdkResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SdkError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Every routed namespace must have an ACL configuration.
    pub fn validate(&self) -> SdkResult<()> {
        for (namespace, backend) in &self.storage.namespaces {
            if !self.storage.backends.contains_key(backend) {
                return Err(SdkError::Config(format!(
                    "namespace {namespace:?} routes to unknown backend {backend:?}"
                )));
            }
            self.acl
                .config_for(namespace)
                .map_err(|e| SdkError::Config(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_in_memory() {
        let config = WikiConfig::default();
        assert_eq!(config.index.location(), IndexLocation::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn simple_puts_everything_under_root() {
        let config = WikiConfig::simple(Path::new("/srv/wiki"));
        assert_eq!(config.index.path.as_deref(), Some(Path::new("/srv/wiki/index")));
        assert_eq!(
            config.storage.backends["default"],
            BackendSpec::Redb {
                path: "/srv/wiki/default.redb".into()
            }
        );
    }

    #[test]
    fn parses_full_toml() {
        let config = WikiConfig::from_toml_str(
            r#"
            wikiname = "MyWiki"

            [index]
            path = "/var/folio/index"

            [storage.namespaces]
            "" = "main"

            [storage.backends.main]
            kind = "fs"
            path = "/var/folio/main"

            [acl.""]
            default = "Known:read,write,create All:read"
            hierarchic = true

            [principals]
            known = ["alice"]
            "#,
        )
        .unwrap();
        assert_eq!(config.wikiname.as_deref(), Some("MyWiki"));
        assert!(config.acl.config_for("").unwrap().hierarchic);
        assert!(config.principals.known.contains("alice"));
    }

    #[test]
    fn rejects_namespace_without_acl() {
        let err = WikiConfig::from_toml_str(
            r#"
            [storage.namespaces]
            "" = "main"
            [storage.backends.main]
            kind = "memory"
            [acl.help]
            default = "All:read"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }

    #[test]
    fn rejects_unknown_rights() {
        let err = WikiConfig::from_toml_str("[acl.\"\"]\ndefault = \"All:fly\"\n").unwrap_err();
        assert!(matches!(err, SdkError::Toml(_)));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = WikiConfig::load(Path::new("/nonexistent/folio.toml")).unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }
}
