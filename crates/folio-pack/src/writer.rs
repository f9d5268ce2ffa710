//! Streaming export of revisions.

use std::io::{self, Read, Write};

use folio_types::RevisionMeta;
use tracing::{debug, info};

use crate::error::{PackError, PackResult};
use crate::source::DumpSource;

/// Totals of a finished dump.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DumpStats {
    pub revisions: usize,
    pub payload_bytes: u64,
}

/// Write every revision of `source` to `dst`, then the end marker.
pub fn serialize<S, W>(source: &S, dst: &mut W) -> PackResult<DumpStats>
where
    S: DumpSource + ?Sized,
    W: Write,
{
    let mut stats = DumpStats::default();
    for key in source.dump_keys()? {
        let (meta, mut data) = source.dump_retrieve(&key)?;
        stats.payload_bytes += write_record(dst, &meta, &mut data)?;
        stats.revisions += 1;
    }
    write_end(dst)?;
    dst.flush()?;
    info!(revisions = stats.revisions, bytes = stats.payload_bytes, "serialized");
    Ok(stats)
}

/// One record: big-endian meta length, meta JSON, exactly `meta.size` payload bytes.
pub fn write_record<W: Write + ?Sized>(
    dst: &mut W,
    meta: &RevisionMeta,
    data: &mut dyn Read,
) -> PackResult<u64> {
    let revid = || meta.revid.as_ref().map(ToString::to_string).unwrap_or_default();
    let size = meta.size.ok_or_else(|| PackError::MissingSize { revid: revid() })?;

    let json = serde_json::to_vec(meta)?;
    let len = u32::try_from(json.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "metadata larger than 4 GiB"))?;
    dst.write_all(&len.to_be_bytes())?;
    dst.write_all(&json)?;

    let copied = io::copy(&mut Read::take(data, size), dst)?;
    if copied != size {
        return Err(PackError::Truncated {
            revid: revid(),
            expected: size,
            actual: copied,
        });
    }
    debug!(revid = %revid(), size, "record written");
    Ok(size)
}

/// The end marker: a zero meta length.
pub fn write_end<W: Write + ?Sized>(dst: &mut W) -> PackResult<()> {
    dst.write_all(&0u32.to_be_bytes())?;
    Ok(())
}
