use std::io::{Cursor, Read};

use crate::error::StoreResult;

/// A byte-oriented key/value container.
///
/// All implementations must satisfy these invariants:
/// - `get` of a missing key is `StoreError::NotFound`, never an empty value.
/// - `set` replaces any previous value under the key.
/// - Concurrent readers are always safe; concurrent writers to different
///   keys are safe.
/// - All I/O errors are propagated, never silently ignored.
///
/// Lifecycle: `create` prepares empty storage, `destroy` removes it,
/// `open`/`close` bracket normal use. Stores that keep no session state
/// treat `open`/`close` as no-ops.
pub trait Store: Send + Sync {
    /// Prepare empty storage. Fails if the storage cannot be created.
    fn create(&self) -> StoreResult<()>;

    /// Remove the storage and everything in it.
    fn destroy(&self) -> StoreResult<()>;

    /// Begin using the store.
    fn open(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Stop using the store.
    fn close(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> StoreResult<Vec<u8>>;

    /// Store `value` under `key`.
    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Delete `key`. Missing keys are `StoreError::NotFound`.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// All keys, in no particular order.
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Check whether `key` is present.
    fn contains(&self, key: &str) -> StoreResult<bool> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Stream the value stored under `key`.
    ///
    /// Default implementation buffers the whole value. Stores backed by
    /// files override it to stream from disk.
    fn get_reader(&self, key: &str) -> StoreResult<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.get(key)?)))
    }

    /// Store everything `reader` yields under `key`, returning the byte count.
    ///
    /// Default implementation buffers the whole value.
    fn set_from_reader(&self, key: &str, reader: &mut dyn Read) -> StoreResult<u64> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        self.set(key, &buf)?;
        Ok(buf.len() as u64)
    }
}
