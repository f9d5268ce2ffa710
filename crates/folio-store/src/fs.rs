use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{StoreError, StoreResult};
use crate::traits::Store;

/// Filesystem store: one file per key inside a directory.
///
/// Writes land in a temporary file in the same directory and are renamed
/// into place, so readers see either the old or the new value. Values are
/// streamed from and to disk.
#[derive(Debug, Clone)]
pub struct FsStore {
    path: PathBuf,
}

impl FsStore {
    /// Store rooted at `path`. Nothing is touched until `create`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The directory holding the values.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn key_path(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.path.join(key))
    }

    fn write_atomic(&self, key: &str, reader: &mut dyn Read) -> StoreResult<u64> {
        let target = self.key_path(key)?;
        let mut tmp = NamedTempFile::new_in(&self.path)?;
        let written = io::copy(reader, &mut tmp)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| StoreError::Io(e.error))?;
        Ok(written)
    }
}

fn validate_key(key: &str) -> StoreResult<()> {
    let reason = if key.is_empty() {
        Some("key must not be empty")
    } else if key == "." || key == ".." {
        Some("key must not be a relative directory")
    } else if key.contains(['/', '\\', '\0']) {
        Some("key must not contain path separators")
    } else if key.starts_with(".tmp") {
        Some("key collides with temporary files")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: reason.into(),
        }),
        None => Ok(()),
    }
}

fn not_found_or(key: &str, err: io::Error) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(key.to_string())
    } else {
        StoreError::Io(err)
    }
}

impl Store for FsStore {
    fn create(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.path)?;
        Ok(())
    }

    fn destroy(&self) -> StoreResult<()> {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        let path = self.key_path(key)?;
        fs::read(&path).map_err(|e| not_found_or(key, e))
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.write_atomic(key, &mut &value[..]).map(|_| ())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.key_path(key)?;
        fs::remove_file(&path).map_err(|e| not_found_or(key, e))
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with(".tmp") {
                    keys.push(name.to_string());
                }
            }
        }
        Ok(keys)
    }

    fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.key_path(key)?.is_file())
    }

    fn get_reader(&self, key: &str) -> StoreResult<Box<dyn Read + Send>> {
        let path = self.key_path(key)?;
        let file = File::open(&path).map_err(|e| not_found_or(key, e))?;
        Ok(Box::new(io::BufReader::new(file)))
    }

    fn set_from_reader(&self, key: &str, reader: &mut dyn Read) -> StoreResult<u64> {
        self.write_atomic(key, reader)
    }
}
