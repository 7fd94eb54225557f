use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{KeyValueBackend, RawBatch};
use crate::error::{Result, StoreError};
use crate::keyspace::KeySpace;
use crate::result::StoreResult;

/// Flush/sync strategy for the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every frame (safest, highest latency).
    EveryWrite,
    /// Rely on OS page-cache buffering (fastest, least durable).
    OsDefault,
}

impl Default for SyncMode {
    fn default() -> Self {
        Self::OsDefault
    }
}

/// Configuration for [`LogBackend`].
#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const FRAME_HEADER_SIZE: u64 = 8;

/// Record header: op, keyspace tag, key length, value length.
const RECORD_HEADER_SIZE: usize = 10;

/// Compaction packs live entries into frames of roughly this many bytes.
const COMPACT_FRAME_TARGET: usize = 1 << 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Put = 1,
    Clear = 2,
}

/// Location of a live value inside the log file.
#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    offset: u64,
    len: u32,
}

type Index = HashMap<KeySpace, HashMap<Vec<u8>, IndexEntry>>;

struct Record<'a> {
    op: Op,
    key_space: KeySpace,
    key: &'a [u8],
    value_start: usize,
    value_len: u32,
}

fn record_size(key_len: usize, value_len: u32) -> u64 {
    (RECORD_HEADER_SIZE + key_len) as u64 + u64::from(value_len)
}

fn len_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        StoreError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{len} bytes exceeds the log frame limit"),
        ))
    })
}

fn encode_record(
    out: &mut Vec<u8>,
    op: Op,
    key_space: KeySpace,
    key: &[u8],
    value: &[u8],
) -> Result<()> {
    out.push(op as u8);
    out.push(key_space.index());
    out.extend_from_slice(&len_u32(key.len())?.to_be_bytes());
    out.extend_from_slice(&len_u32(value.len())?.to_be_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(value);
    Ok(())
}

fn parse_records(payload: &[u8]) -> std::result::Result<Vec<Record<'_>>, String> {
    let mut records = Vec::new();
    let mut pos = 0;
    while pos < payload.len() {
        let h = payload
            .get(pos..pos + RECORD_HEADER_SIZE)
            .ok_or_else(|| format!("truncated record header at byte {pos}"))?;
        let op = match h[0] {
            1 => Op::Put,
            2 => Op::Clear,
            other => return Err(format!("unknown record op {other} at byte {pos}")),
        };
        let key_space = KeySpace::from_index(h[1])
            .ok_or_else(|| format!("unknown keyspace tag {} at byte {pos}", h[1]))?;
        let key_len = u32::from_be_bytes([h[2], h[3], h[4], h[5]]) as usize;
        let value_len = u32::from_be_bytes([h[6], h[7], h[8], h[9]]);

        let key_start = pos + RECORD_HEADER_SIZE;
        let value_start = key_start + key_len;
        let end = value_start + value_len as usize;
        if end > payload.len() {
            return Err(format!("record at byte {pos} runs past the end of its frame"));
        }
        records.push(Record {
            op,
            key_space,
            key: &payload[key_start..value_start],
            value_start,
            value_len,
        });
        pos = end;
    }
    Ok(records)
}

fn open_log(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
}

/// Make a rename in the log's directory durable.
fn sync_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) => File::open(dir)?.sync_all(),
        None => Ok(()),
    }
}

fn read_value(mut file: &File, entry: IndexEntry) -> io::Result<Bytes> {
    file.seek(SeekFrom::Start(entry.offset))?;
    let mut value = vec![0u8; entry.len as usize];
    file.read_exact(&mut value)?;
    Ok(Bytes::from(value))
}

/// Mutable state of an open log.
struct LogState {
    file: File,
    /// Length of the valid prefix of the file; the next frame goes here.
    len: u64,
    index: Index,
    /// Bytes held by overwritten entries and clear records.
    dead_bytes: u64,
}

impl LogState {
    /// Replay every frame in the file, rebuilding the index.
    ///
    /// Only the last frame can be torn: a header or payload that runs past
    /// the end of the file, or a final frame whose CRC does not match. Replay
    /// stops there and the file is cut back to the last good frame. A CRC
    /// mismatch with more frames after it, or a frame that passes its CRC but
    /// cannot be parsed, is corruption and fails the open without touching
    /// the file.
    fn recover(&mut self) -> Result<usize> {
        let file_len = self.file.metadata()?.len();
        let mut reader = BufReader::new(self.file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut offset = 0u64;
        let mut frames = 0;
        let mut torn = None;

        while offset < file_len {
            if offset + FRAME_HEADER_SIZE > file_len {
                torn = Some("truncated frame header");
                break;
            }
            let mut header = [0u8; FRAME_HEADER_SIZE as usize];
            reader.read_exact(&mut header)?;
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + FRAME_HEADER_SIZE + u64::from(length) > file_len {
                torn = Some("frame length runs past end of log");
                break;
            }

            let end = offset + FRAME_HEADER_SIZE + u64::from(length);
            let mut payload = vec![0u8; length as usize];
            reader.read_exact(&mut payload)?;
            if crc32fast::hash(&payload) != expected_crc {
                if end < file_len {
                    return Err(StoreError::CorruptLog {
                        offset,
                        reason: format!(
                            "CRC mismatch with {} bytes of later frames",
                            file_len - end
                        ),
                    });
                }
                torn = Some("CRC mismatch in final frame");
                break;
            }

            let records = parse_records(&payload)
                .map_err(|reason| StoreError::CorruptLog { offset, reason })?;
            self.apply(offset, records);

            offset = end;
            frames += 1;
        }

        if let Some(reason) = torn {
            warn!(offset, file_len, reason, "torn write at end of store log; truncating");
            self.file.set_len(offset)?;
        }
        self.len = offset;
        Ok(frames)
    }

    /// Update the index for a frame already present in the file at
    /// `frame_offset`.
    fn apply(&mut self, frame_offset: u64, records: Vec<Record<'_>>) {
        let base = frame_offset + FRAME_HEADER_SIZE;
        for record in records {
            match record.op {
                Op::Put => {
                    let entry = IndexEntry {
                        offset: base + record.value_start as u64,
                        len: record.value_len,
                    };
                    let previous = self
                        .index
                        .entry(record.key_space)
                        .or_default()
                        .insert(record.key.to_vec(), entry);
                    if let Some(old) = previous {
                        self.dead_bytes += record_size(record.key.len(), old.len);
                    }
                }
                Op::Clear => {
                    let removed = self.index.remove(&record.key_space).unwrap_or_default();
                    self.dead_bytes += RECORD_HEADER_SIZE as u64
                        + removed
                            .iter()
                            .map(|(key, entry)| record_size(key.len(), entry.len))
                            .sum::<u64>();
                }
            }
        }
    }

    /// Append one frame at the end of the valid prefix. On failure the file
    /// is cut back to where it was and the error returned.
    fn append(&mut self, payload: &[u8], sync_mode: SyncMode) -> Result<u64> {
        let offset = self.len;
        let length = len_u32(payload.len())?;
        let crc = crc32fast::hash(payload);

        if let Err(err) = self.write_frame_at(offset, length, crc, payload, sync_mode) {
            if let Err(rollback) = self.file.set_len(offset) {
                warn!(offset, error = %rollback, "failed to roll back partial frame");
            }
            return Err(err.into());
        }

        self.len = offset + FRAME_HEADER_SIZE + payload.len() as u64;
        Ok(offset)
    }

    fn write_frame_at(
        &mut self,
        offset: u64,
        length: u32,
        crc: u32,
        payload: &[u8],
        sync_mode: SyncMode,
    ) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&length.to_le_bytes())?;
        self.file.write_all(&crc.to_le_bytes())?;
        self.file.write_all(payload)?;
        if sync_mode == SyncMode::EveryWrite {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn lookup(&self, key_space: KeySpace, key: &[u8]) -> Option<IndexEntry> {
        self.index.get(&key_space)?.get(key).copied()
    }

    fn get(&self, key_space: KeySpace, key: &[u8]) -> Result<StoreResult> {
        match self.lookup(key_space, key) {
            Some(entry) => Ok(StoreResult::found(read_value(&self.file, entry)?)),
            None => Ok(StoreResult::missing()),
        }
    }

    /// Rewrite the live entries of every keyspace into `tmp_path`.
    fn write_compacted(&self, tmp_path: &Path) -> Result<(u64, Index)> {
        let mut out = FrameWriter::new(File::create(tmp_path)?);

        let mut key_spaces: Vec<_> = self.index.iter().collect();
        key_spaces.sort_by_key(|(ks, _)| **ks);
        for (key_space, entries) in key_spaces {
            let mut live: Vec<_> = entries.iter().collect();
            // Read in file order.
            live.sort_by_key(|(_, entry)| entry.offset);
            for (key, entry) in live {
                let value = read_value(&self.file, *entry)?;
                out.push(*key_space, key, &value)?;
            }
        }

        out.finish()
    }
}

/// Packs put records into frames for a freshly written log.
struct FrameWriter {
    out: BufWriter<File>,
    offset: u64,
    payload: Vec<u8>,
    placed: Vec<(KeySpace, Vec<u8>, usize, u32)>,
    index: Index,
}

impl FrameWriter {
    fn new(file: File) -> Self {
        Self {
            out: BufWriter::new(file),
            offset: 0,
            payload: Vec::with_capacity(COMPACT_FRAME_TARGET),
            placed: Vec::new(),
            index: Index::new(),
        }
    }

    fn push(&mut self, key_space: KeySpace, key: &[u8], value: &[u8]) -> Result<()> {
        let value_start = self.payload.len() + RECORD_HEADER_SIZE + key.len();
        encode_record(&mut self.payload, Op::Put, key_space, key, value)?;
        self.placed
            .push((key_space, key.to_vec(), value_start, len_u32(value.len())?));
        if self.payload.len() >= COMPACT_FRAME_TARGET {
            self.flush_frame()?;
        }
        Ok(())
    }

    fn flush_frame(&mut self) -> Result<()> {
        if self.payload.is_empty() {
            return Ok(());
        }
        let length = len_u32(self.payload.len())?;
        self.out.write_all(&length.to_le_bytes())?;
        self.out.write_all(&crc32fast::hash(&self.payload).to_le_bytes())?;
        self.out.write_all(&self.payload)?;

        let base = self.offset + FRAME_HEADER_SIZE;
        for (key_space, key, start, len) in self.placed.drain(..) {
            self.index.entry(key_space).or_default().insert(
                key,
                IndexEntry {
                    offset: base + start as u64,
                    len,
                },
            );
        }
        self.offset = base + self.payload.len() as u64;
        self.payload.clear();
        Ok(())
    }

    fn finish(mut self) -> Result<(u64, Index)> {
        self.flush_frame()?;
        let file = self.out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok((self.offset, self.index))
    }
}

/// Durable backend: a single append-only log file plus an in-memory index.
///
/// Every committed batch is written as one CRC-framed record group, so a
/// batch either survives a crash whole or not at all:
///
/// ```text
/// frame:  [4 bytes: payload length (LE u32)] [4 bytes: CRC32 of payload (LE u32)] [payload]
/// record: [1 byte: op] [1 byte: keyspace] [4 bytes: key len (BE)] [4 bytes: value len (BE)] [key] [value]
/// ```
///
/// Values are read back from the file on demand. Overwrites and clears leave
/// dead bytes behind until [`compact_key_space`](KeyValueBackend::compact_key_space)
/// rewrites the log.
pub struct LogBackend {
    path: PathBuf,
    config: LogConfig,
    state: Mutex<LogState>,
}

impl LogBackend {
    /// Name of the log file inside the store directory.
    pub const FILE_NAME: &'static str = "store.log";

    /// Open (or create) the log in `dir` and replay it.
    pub fn open(dir: impl AsRef<Path>, config: LogConfig) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(Self::FILE_NAME);

        let mut state = LogState {
            file: open_log(&path)?,
            len: 0,
            index: Index::new(),
            dead_bytes: 0,
        };
        let frames = state.recover()?;
        info!(
            path = %path.display(),
            frames,
            bytes = state.len,
            dead_bytes = state.dead_bytes,
            "opened store log"
        );

        Ok(Self {
            path,
            config,
            state: Mutex::new(state),
        })
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the log in bytes.
    pub fn log_len(&self) -> u64 {
        self.state.lock().expect("log state lock poisoned").len
    }

    /// Bytes a compaction would reclaim.
    pub fn dead_bytes(&self) -> u64 {
        self.state.lock().expect("log state lock poisoned").dead_bytes
    }

    /// Number of live entries in one keyspace.
    pub fn entry_count(&self, key_space: KeySpace) -> usize {
        self.state
            .lock()
            .expect("log state lock poisoned")
            .index
            .get(&key_space)
            .map_or(0, HashMap::len)
    }
}

impl KeyValueBackend for LogBackend {
    fn get(&self, key_space: KeySpace, key: &[u8]) -> Result<StoreResult> {
        self.state
            .lock()
            .expect("log state lock poisoned")
            .get(key_space, key)
    }

    fn get_batch(&self, key_space: KeySpace, keys: &[&[u8]]) -> Result<Vec<StoreResult>> {
        let state = self.state.lock().expect("log state lock poisoned");
        keys.iter().map(|key| state.get(key_space, key)).collect()
    }

    fn has_key(&self, key_space: KeySpace, key: &[u8]) -> Result<bool> {
        let state = self.state.lock().expect("log state lock poisoned");
        Ok(state.lookup(key_space, key).is_some())
    }

    fn commit(&self, batch: RawBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut payload = Vec::with_capacity(batch.payload_len() + batch.len() * RECORD_HEADER_SIZE);
        for (key_space, key, value) in batch.iter() {
            encode_record(&mut payload, Op::Put, key_space, key, value)?;
        }
        let records = parse_records(&payload)
            .map_err(|reason| StoreError::CorruptLog { offset: 0, reason })?;

        let mut state = self.state.lock().expect("log state lock poisoned");
        let offset = state.append(&payload, self.config.sync_mode)?;
        state.apply(offset, records);
        debug!(offset, writes = batch.len(), bytes = payload.len(), "committed batch to store log");
        Ok(())
    }

    fn clear_key_space(&self, key_space: KeySpace) -> Result<()> {
        let mut payload = Vec::with_capacity(RECORD_HEADER_SIZE);
        encode_record(&mut payload, Op::Clear, key_space, &[], &[])?;
        let records = parse_records(&payload)
            .map_err(|reason| StoreError::CorruptLog { offset: 0, reason })?;

        let mut state = self.state.lock().expect("log state lock poisoned");
        let offset = state.append(&payload, self.config.sync_mode)?;
        state.apply(offset, records);
        debug!(%key_space, offset, "cleared keyspace in store log");
        Ok(())
    }

    fn compact_key_space(&self, key_space: KeySpace) -> Result<()> {
        let mut state = self.state.lock().expect("log state lock poisoned");
        if state.dead_bytes == 0 {
            debug!(%key_space, "store log has no dead bytes; skipping compaction");
            return Ok(());
        }

        // The log is shared by every keyspace, so one rewrite compacts all of them.
        let tmp_path = self.path.with_extension("log.compact");
        let (len, index) = match state.write_compacted(&tmp_path) {
            Ok(rewritten) => rewritten,
            Err(err) => {
                if let Err(cleanup) = fs::remove_file(&tmp_path) {
                    warn!(path = %tmp_path.display(), error = %cleanup, "failed to remove partial compaction file");
                }
                return Err(err);
            }
        };
        // The state must never hold a handle to a log that was renamed over.
        let file = open_log(&tmp_path)?;
        fs::rename(&tmp_path, &self.path)?;

        let before = state.len;
        state.file = file;
        state.len = len;
        state.index = index;
        state.dead_bytes = 0;
        sync_dir(&self.path)?;
        info!(%key_space, before, after = len, "compacted store log");
        Ok(())
    }

    fn supports_deferred_reads(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for LogBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBackend")
            .field("path", &self.path)
            .field("sync_mode", &self.config.sync_mode)
            .finish()
    }
}
