//! On-disk persistence for one index: a snapshot plus an append-only journal.
//!
//! `<stem>.snapshot` holds the full document set as of the last compaction,
//! written to a temporary file, synced, then renamed into place.
//! `<stem>.journal` holds the operations committed since, one framed record
//! per operation:
//!
//! ```text
//! [len: u32 LE][crc32: u32 LE][JSON JournalOp]
//! ```
//!
//! A record cut short at the end of the journal (a crash mid-append) is
//! dropped on replay. A complete record whose checksum does not match is
//! corruption.
//!
//! `<stem>.lock` serializes writers across processes. It is held with an
//! exclusive file lock for a whole writer session and stores the snapshot
//! generation, bumped by every compaction. A session starts by catching up
//! on whatever other processes committed since this handle last looked.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use folio_types::RevisionId;
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::document::IndexDocument;
use crate::error::{IndexError, IndexResult};
use crate::query::WhichIndex;

const SNAPSHOT_MAGIC: &str = "folio-index";
const SNAPSHOT_VERSION: u32 = 1;
const FRAME_HEADER: usize = 8;

/// One committed change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalOp {
    Upsert { doc: Box<IndexDocument> },
    Delete { revid: RevisionId },
    Clear,
}

#[derive(Deserialize)]
struct Snapshot {
    magic: String,
    version: u32,
    documents: Vec<IndexDocument>,
}

/// What [`Journal::open`] recovered from disk.
#[derive(Debug)]
pub struct Recovered {
    pub documents: Vec<IndexDocument>,
    pub ops: Vec<JournalOp>,
    pub truncated_tail: bool,
}

/// Changes committed by other handles, found when a session begins.
#[derive(Debug)]
pub enum CatchUp {
    Current,
    /// Journal records appended since this handle last read or wrote.
    Ops(Vec<JournalOp>),
    /// The index was compacted or recreated; start over from this.
    Reload(Recovered),
}

/// Writable handle on an index's snapshot and journal files.
#[derive(Debug)]
pub struct Journal {
    snapshot: PathBuf,
    journal: PathBuf,
    file: File,
    lock: File,
    /// Snapshot generation this handle's view is based on.
    generation: u64,
    /// Journal bytes this handle has seen.
    seen: u64,
}

/// Releases the lock file on drop.
struct Held<'f>(&'f File);

impl<'f> Held<'f> {
    fn acquire(lock: &'f File) -> IndexResult<Self> {
        FileExt::lock_exclusive(lock)?;
        Ok(Self(lock))
    }
}

impl Drop for Held<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.0);
    }
}

impl Journal {
    fn paths(dir: &Path, which: WhichIndex) -> (PathBuf, PathBuf, PathBuf) {
        let stem = which.file_stem();
        (
            dir.join(format!("{stem}.snapshot")),
            dir.join(format!("{stem}.journal")),
            dir.join(format!("{stem}.lock")),
        )
    }

    fn open_lock(path: &Path) -> IndexResult<File> {
        Ok(OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?)
    }

    /// Whether `dir` holds an index of this kind.
    pub fn exists(dir: &Path, which: WhichIndex) -> bool {
        Self::paths(dir, which).0.is_file()
    }

    /// Start an empty index in `dir`, replacing any existing one.
    pub fn create(dir: &Path, which: WhichIndex) -> IndexResult<Self> {
        std::fs::create_dir_all(dir)?;
        let (snapshot, journal, lock_path) = Self::paths(dir, which);
        let lock = Self::open_lock(&lock_path)?;
        let (file, generation) = {
            let _held = Held::acquire(&lock)?;
            write_snapshot::<IndexDocument>(&snapshot, &[])?;
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&journal)?;
            file.sync_all()?;
            let generation = read_generation(&lock)? + 1;
            write_generation(&lock, generation)?;
            // Appends must land at the end after other handles compact.
            drop(file);
            let file = OpenOptions::new().append(true).open(&journal)?;
            (file, generation)
        };
        Ok(Self {
            snapshot,
            journal,
            file,
            lock,
            generation,
            seen: 0,
        })
    }

    /// Open an existing index and read back its snapshot and journal.
    pub fn open(dir: &Path, which: WhichIndex) -> IndexResult<(Self, Recovered)> {
        let (snapshot, journal, lock_path) = Self::paths(dir, which);
        if !snapshot.is_file() {
            return Err(IndexError::NotCreated(dir.display().to_string()));
        }
        let lock = Self::open_lock(&lock_path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal)?;

        let (generation, recovered, seen) = {
            let _held = Held::acquire(&lock)?;
            let generation = read_generation(&lock)?;
            let (recovered, seen) = recover(&snapshot, &journal, &file)?;
            (generation, recovered, seen)
        };

        Ok((
            Self {
                snapshot,
                journal,
                file,
                lock,
                generation,
                seen,
            },
            recovered,
        ))
    }

    /// Take the lock file and collect what other handles committed since
    /// this one last looked. Every successful call must be paired with
    /// [`end`](Self::end).
    pub fn begin(&mut self) -> IndexResult<CatchUp> {
        FileExt::lock_exclusive(&self.lock)?;
        let caught_up = self.catch_up();
        if caught_up.is_err() {
            self.end();
        }
        caught_up
    }

    /// Release the lock file taken by [`begin`](Self::begin).
    pub fn end(&self) {
        if let Err(e) = FileExt::unlock(&self.lock) {
            tracing::warn!(journal = %self.journal.display(), error = %e, "cannot release index lock");
        }
    }

    fn catch_up(&mut self) -> IndexResult<CatchUp> {
        let generation = read_generation(&self.lock)?;
        if generation != self.generation {
            let (recovered, seen) = recover(&self.snapshot, &self.journal, &self.file)?;
            tracing::debug!(journal = %self.journal.display(), generation, "index reloaded after compaction elsewhere");
            self.generation = generation;
            self.seen = seen;
            return Ok(CatchUp::Reload(recovered));
        }
        if self.journal_len()? == self.seen {
            return Ok(CatchUp::Current);
        }
        let (ops, valid_len, truncated_tail) = read_journal(&self.journal, self.seen)?;
        if truncated_tail {
            self.file.set_len(valid_len)?;
        }
        tracing::debug!(journal = %self.journal.display(), ops = ops.len(), "caught up with journal");
        self.seen = valid_len;
        Ok(CatchUp::Ops(ops))
    }

    /// Durably append committed operations.
    pub fn append(&mut self, ops: &[JournalOp]) -> IndexResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::new();
        for op in ops {
            let payload = serde_json::to_vec(op)?;
            let len = u32::try_from(payload.len()).map_err(|_| {
                IndexError::Corruption(format!("journal record of {} bytes", payload.len()))
            })?;
            buf.extend_from_slice(&len.to_le_bytes());
            buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
            buf.extend_from_slice(&payload);
        }
        self.file.write_all(&buf)?;
        self.file.sync_data()?;
        self.seen += buf.len() as u64;
        Ok(())
    }

    /// Fold the journal into a fresh snapshot of `documents`.
    pub fn compact<'a>(
        &mut self,
        documents: impl IntoIterator<Item = &'a IndexDocument>,
    ) -> IndexResult<()> {
        let documents: Vec<&IndexDocument> = documents.into_iter().collect();
        write_snapshot(&self.snapshot, &documents)?;
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.generation += 1;
        write_generation(&self.lock, self.generation)?;
        self.seen = 0;
        tracing::debug!(snapshot = %self.snapshot.display(), documents = documents.len(), "index compacted");
        Ok(())
    }

    /// Size of the uncompacted journal in bytes.
    pub fn journal_len(&self) -> IndexResult<u64> {
        Ok(std::fs::metadata(&self.journal)?.len())
    }
}

/// Snapshot plus every journal record, cutting a truncated tail. Returns the
/// journal length that was read.
fn recover(snapshot: &Path, journal: &Path, file: &File) -> IndexResult<(Recovered, u64)> {
    let documents = read_snapshot(snapshot)?;
    let (ops, valid_len, truncated_tail) = read_journal(journal, 0)?;
    if truncated_tail {
        tracing::warn!(journal = %journal.display(), valid_len, "dropping truncated journal tail");
        file.set_len(valid_len)?;
    }
    Ok((
        Recovered {
            documents,
            ops,
            truncated_tail,
        },
        valid_len,
    ))
}

fn read_generation(mut lock: &File) -> IndexResult<u64> {
    let mut text = String::new();
    lock.seek(SeekFrom::Start(0))?;
    lock.read_to_string(&mut text)?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }
    text.parse()
        .map_err(|_| IndexError::Corruption(format!("index lock file holds {text:?}")))
}

fn write_generation(mut lock: &File, generation: u64) -> IndexResult<()> {
    lock.set_len(0)?;
    lock.seek(SeekFrom::Start(0))?;
    lock.write_all(generation.to_string().as_bytes())?;
    lock.sync_data()?;
    Ok(())
}

fn write_snapshot<D: Serialize>(path: &Path, documents: &[D]) -> IndexResult<()> {
    #[derive(Serialize)]
    struct SnapshotRef<'a, D> {
        magic: &'a str,
        version: u32,
        documents: &'a [D],
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer(
        &mut tmp,
        &SnapshotRef {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            documents,
        },
    )?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| IndexError::Storage(e.error))?;
    Ok(())
}

fn read_snapshot(path: &Path) -> IndexResult<Vec<IndexDocument>> {
    let reader = BufReader::new(File::open(path)?);
    let snapshot: Snapshot = serde_json::from_reader(reader)
        .map_err(|e| IndexError::Corruption(format!("{}: {e}", path.display())))?;
    if snapshot.magic != SNAPSHOT_MAGIC || snapshot.version != SNAPSHOT_VERSION {
        return Err(IndexError::Corruption(format!(
            "{}: unsupported snapshot {} v{}",
            path.display(),
            snapshot.magic,
            snapshot.version
        )));
    }
    Ok(snapshot.documents)
}

/// Decodes the records from byte `from` on. Returns the ops, the end of the
/// valid prefix and whether a partial record followed it.
fn read_journal(path: &Path, from: u64) -> IndexResult<(Vec<JournalOp>, u64, bool)> {
    let mut bytes = Vec::new();
    if path.is_file() {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(from))?;
        file.read_to_end(&mut bytes)?;
    }

    let mut ops = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        let rest = &bytes[pos..];
        if rest.len() < FRAME_HEADER {
            return Ok((ops, from + pos as u64, true));
        }
        let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let crc = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]);
        let Some(payload) = rest.get(FRAME_HEADER..FRAME_HEADER + len) else {
            return Ok((ops, from + pos as u64, true));
        };
        if crc32fast::hash(payload) != crc {
            return Err(IndexError::Corruption(format!(
                "{}: checksum mismatch at offset {}",
                path.display(),
                from + pos as u64
            )));
        }
        let op = serde_json::from_slice(payload)
            .map_err(|e| IndexError::Corruption(format!("{}: offset {}: {e}", path.display(), from + pos as u64)))?;
        ops.push(op);
        pos += FRAME_HEADER + len;
    }
    Ok((ops, from + pos as u64, false))
}
