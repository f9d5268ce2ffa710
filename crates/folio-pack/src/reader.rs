//! Streaming import of revisions.

use std::io::{self, Read};

use folio_types::RevisionMeta;
use tracing::{debug, info};

use crate::error::{PackError, PackResult};
use crate::source::LoadTarget;

/// Largest metadata record accepted from a header.
pub const MAX_META_LEN: u32 = 16 * 1024 * 1024;

/// Rewrites applied while loading.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeserializeOptions {
    /// Move revisions of namespace `.0` into namespace `.1`.
    pub rename_ns: Option<(String, String)>,
    /// Skip revisions of this namespace.
    pub kill_ns: Option<String>,
}

/// Totals of a finished load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub stored: usize,
    pub skipped: usize,
}

/// Load every record of `src` into `target` until end of input.
///
/// Zero-length headers are end markers of concatenated dumps and are
/// skipped. The index is not touched; rebuild it afterwards.
pub fn deserialize<T, R>(src: &mut R, target: &T, options: &DeserializeOptions) -> PackResult<LoadStats>
where
    T: LoadTarget + ?Sized,
    R: Read,
{
    let mut stats = LoadStats::default();
    while let Some(len) = read_header(src)? {
        if len == 0 {
            continue;
        }
        if len > MAX_META_LEN {
            return Err(PackError::MetaTooLarge { len, max: MAX_META_LEN });
        }
        let mut json = Vec::new();
        Read::take(&mut *src, u64::from(len)).read_to_end(&mut json)?;
        if json.len() < len as usize {
            return Err(PackError::TruncatedMeta { expected: len, actual: json.len() });
        }
        let mut meta: RevisionMeta = serde_json::from_slice(&json)?;
        let revid = meta.revid.as_ref().map(ToString::to_string).unwrap_or_default();
        let size = meta.size.ok_or_else(|| PackError::MissingSize { revid: revid.clone() })?;

        let mut payload = Bounded::new(&mut *src, size);
        let keep = match &options.kill_ns {
            Some(kill) => meta.namespace_or_default() != kill,
            None => true,
        };
        if keep {
            if let Some((old, new)) = &options.rename_ns {
                if meta.namespace_or_default() == old {
                    meta.namespace = Some(new.clone());
                }
            }
            let stored = target.load(meta, &mut payload);
            if let Err(err) = stored {
                return Err(payload.truncation(&revid).unwrap_or(err.into()));
            }
            stats.stored += 1;
            debug!(revid = %revid, size, "record loaded");
        } else {
            stats.skipped += 1;
        }
        // The target may not read a payload it already has.
        io::copy(&mut payload, &mut io::sink())?;
        if let Some(err) = payload.truncation(&revid) {
            return Err(err);
        }
    }
    info!(stored = stats.stored, skipped = stats.skipped, "deserialized");
    Ok(stats)
}

/// Next meta length, or `None` at a clean end of input.
fn read_header<R: Read + ?Sized>(src: &mut R) -> PackResult<Option<u32>> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match src.read(&mut header[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 => Ok(None),
        4 => Ok(Some(u32::from_be_bytes(header))),
        n => Err(PackError::TruncatedHeader(n)),
    }
}

/// A reader that yields at most `limit` bytes and remembers whether the
/// inner reader ran dry before that.
struct Bounded<R> {
    inner: io::Take<R>,
    expected: u64,
    short: bool,
}

impl<R: Read> Bounded<R> {
    fn new(inner: R, limit: u64) -> Self {
        Self {
            inner: inner.take(limit),
            expected: limit,
            short: false,
        }
    }

    fn truncation(&self, revid: &str) -> Option<PackError> {
        self.short.then(|| PackError::Truncated {
            revid: revid.to_string(),
            expected: self.expected,
            actual: self.expected - self.inner.limit(),
        })
    }
}

impl<R: Read> Read for Bounded<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() && self.inner.limit() > 0 {
            self.short = true;
        }
        Ok(n)
    }
}
