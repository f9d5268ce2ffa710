use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition, TableError};

use crate::error::{StoreError, StoreResult};
use crate::traits::Store;

/// Embedded table store: one row per key in a named `redb` table.
///
/// Several stores can share one database file, each with its own table.
/// The usual layout puts a backend's metadata and payloads into the
/// `meta` and `data` tables of one file.
pub struct RedbStore {
    db: Arc<Database>,
    table: String,
}

impl RedbStore {
    /// Open (or create) the database file at `path` and use `table` in it.
    pub fn open_file(path: &Path, table: impl Into<String>) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(redb::Error::from)?;
        Ok(Self::with_database(Arc::new(db), table))
    }

    /// Use `table` in an already opened database.
    pub fn with_database(db: Arc<Database>, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
        }
    }

    /// The shared database handle.
    pub fn database(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    fn definition(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.table)
    }
}

impl Store for RedbStore {
    fn create(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(redb::Error::from)?;
        {
            txn.open_table(self.definition()).map_err(redb::Error::from)?;
        }
        txn.commit().map_err(redb::Error::from)?;
        Ok(())
    }

    fn destroy(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(redb::Error::from)?;
        txn.delete_table(self.definition()).map_err(redb::Error::from)?;
        txn.commit().map_err(redb::Error::from)?;
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        let txn = self.db.begin_read().map_err(redb::Error::from)?;
        let table = match txn.open_table(self.definition()) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => {
                return Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => return Err(redb::Error::from(e).into()),
        };
        let value = table.get(key).map_err(redb::Error::from)?;
        value
            .map(|v| v.value().to_vec())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(redb::Error::from)?;
        {
            let mut table = txn.open_table(self.definition()).map_err(redb::Error::from)?;
            table.insert(key, value).map_err(redb::Error::from)?;
        }
        txn.commit().map_err(redb::Error::from)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(redb::Error::from)?;
        let existed = {
            let mut table = txn.open_table(self.definition()).map_err(redb::Error::from)?;
            let removed = table.remove(key).map_err(redb::Error::from)?;
            removed.is_some()
        };
        if !existed {
            txn.abort().map_err(redb::Error::from)?;
            return Err(StoreError::NotFound(key.to_string()));
        }
        txn.commit().map_err(redb::Error::from)?;
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(redb::Error::from)?;
        let table = match txn.open_table(self.definition()) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(redb::Error::from(e).into()),
        };
        let mut keys = Vec::new();
        for entry in table.iter().map_err(redb::Error::from)? {
            let (key, _) = entry.map_err(redb::Error::from)?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("table", &self.table)
            .finish()
    }
}
