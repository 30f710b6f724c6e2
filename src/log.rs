//! Append-only segment log: rotation, startup replay, and read dispatch.

use crate::config::EngineConfig;
use crate::error::{Result, TideError};
use crate::index::ValuePointer;
use crate::reader::SegmentReaders;
use crate::record::{Decoded, Record, VALUE_OFFSET};
use parking_lot::{Mutex, RwLock};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// File name prefix for segment files; the suffix is the decimal segment id.
pub const SEGMENT_FILE_PREFIX: &str = "data_file_";

/// Ordered collection of segment files with a single writable tail.
///
/// All mutation of the active segment (id, byte count, write handle) happens
/// inside one writer critical section; reads go through per-segment reader
/// pools and run in parallel with the writer and with each other.
pub struct Log {
    dir: PathBuf,
    config: EngineConfig,
    readers: RwLock<Vec<Arc<SegmentReaders>>>,
    writer: Mutex<WriterState>,
}

struct WriterState {
    active_id: usize,
    active_bytes: u64,
    file: Option<File>,
    closed: bool,
}

impl Log {
    /// Opens the log under `dir`, replaying every segment in id order.
    ///
    /// Returns the log plus the `(key, pointer)` pairs of all well-formed
    /// records in append order. A segment with trailing garbage or a
    /// partial record is truncated in place to its last valid byte. The
    /// last segment is reopened for appending when it is still below the
    /// rotation threshold; otherwise the next append starts a fresh one.
    pub fn open(
        dir: impl AsRef<Path>,
        config: EngineConfig,
    ) -> Result<(Self, Vec<(i32, ValuePointer)>)> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut entries = Vec::new();
        let mut readers = Vec::new();
        let mut next_id = 0usize;
        let mut bytes = 0u64;
        loop {
            let path = segment_path(&dir, next_id);
            if !path.exists() {
                break;
            }
            bytes = replay_segment(&path, next_id, &mut entries)?;
            let disk_len = fs::metadata(&path)?.len();
            if disk_len > bytes {
                warn!(
                    segment = next_id,
                    valid = bytes,
                    total = disk_len,
                    "truncating segment to last valid record"
                );
                let file = OpenOptions::new().write(true).open(&path)?;
                file.set_len(bytes)?;
                file.sync_all()?;
            }
            readers.push(Arc::new(SegmentReaders::open(
                &path,
                config.reader_pool_size,
            )?));
            next_id += 1;
        }

        let mut active_id = next_id;
        let mut file = None;
        if bytes < config.segment_size_limit {
            if active_id > 0 {
                active_id -= 1;
                file = Some(OpenOptions::new().append(true).open(segment_path(&dir, active_id))?);
            }
        } else {
            bytes = 0;
        }
        debug!(segments = next_id, active = active_id, bytes, "log opened");

        let log = Self {
            dir,
            config,
            readers: RwLock::new(readers),
            writer: Mutex::new(WriterState {
                active_id,
                active_bytes: bytes,
                file,
                closed: false,
            }),
        };
        Ok((log, entries))
    }

    /// Appends a record and returns a pointer to its value bytes.
    ///
    /// Records longer than the append chunk threshold are written and
    /// flushed in two phases. The byte count only advances after the whole
    /// record is flushed; a failed append publishes nothing.
    pub fn append(&self, record: &Record) -> Result<ValuePointer> {
        let encoded = record.encode();
        let mut state = self.writer.lock();
        let mut file = self.take_active_file(&mut state)?;
        let pointer = ValuePointer::new(
            state.active_id as u32,
            state.active_bytes + VALUE_OFFSET as u64,
            record.value_size(),
            record.timestamp,
        );
        let written = write_record(&mut file, &encoded, self.config.append_chunk_size);
        state.file = Some(file);
        written?;
        state.active_bytes += encoded.len() as u64;
        if state.active_bytes > self.config.segment_size_limit {
            state.file = None;
            state.active_id += 1;
            state.active_bytes = 0;
        }
        Ok(pointer)
    }

    /// Stops an append between its two flush phases, leaving the segment
    /// exactly as an interrupted process would: the first chunk is durable,
    /// the rest of the record never reaches the file, and the byte count
    /// does not advance. The record must be long enough to need two phases.
    pub fn append_then_crash(&self, record: &Record) -> Result<()> {
        let encoded = record.encode();
        if encoded.len() <= self.config.append_chunk_size {
            return Err(TideError::Io(io::Error::new(
                ErrorKind::InvalidInput,
                "record fits in a single chunk, nothing to interrupt",
            )));
        }
        let mut state = self.writer.lock();
        let mut file = self.take_active_file(&mut state)?;
        let written = write_flush(&mut file, &encoded[..self.config.append_chunk_size]);
        state.file = Some(file);
        Ok(written?)
    }

    /// Reads the value a pointer refers to via its segment's reader pool.
    pub fn read(&self, pointer: &ValuePointer) -> Result<Option<String>> {
        let pool = {
            let readers = self.readers.read();
            match readers.get(pointer.segment_id as usize) {
                Some(pool) => Arc::clone(pool),
                None => return Err(TideError::Closed),
            }
        };
        pool.read(pointer.offset, pointer.value_size)
    }

    /// Shuts the log down: every reader pool drains and joins its workers,
    /// then the active write handle closes. Later appends and reads fail
    /// with [`TideError::Closed`]. Idempotent.
    pub fn close(&self) {
        let pools: Vec<_> = {
            let mut readers = self.readers.write();
            readers.drain(..).collect()
        };
        for pool in &pools {
            pool.close();
        }
        let mut state = self.writer.lock();
        state.file = None;
        state.closed = true;
    }

    fn take_active_file(&self, state: &mut WriterState) -> Result<File> {
        if state.closed {
            return Err(TideError::Closed);
        }
        match state.file.take() {
            Some(file) => Ok(file),
            None => {
                let path = segment_path(&self.dir, state.active_id);
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                let mut readers = self.readers.write();
                if readers.len() == state.active_id {
                    readers.push(Arc::new(SegmentReaders::open(
                        &path,
                        self.config.reader_pool_size,
                    )?));
                }
                Ok(file)
            }
        }
    }
}

fn replay_segment(
    path: &Path,
    segment_id: usize,
    entries: &mut Vec<(i32, ValuePointer)>,
) -> Result<u64> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut bytes = 0u64;
    loop {
        match Record::read_from(&mut reader)? {
            Decoded::Entry(record) => {
                let pointer = ValuePointer::new(
                    segment_id as u32,
                    bytes + VALUE_OFFSET as u64,
                    record.value_size(),
                    record.timestamp,
                );
                bytes += record.encoded_len() as u64;
                entries.push((record.key, pointer));
            }
            Decoded::EndOfLog => break,
            Decoded::Corrupt => {
                warn!(
                    segment = segment_id,
                    offset = bytes,
                    "partial or corrupt record, replay of this segment stops here"
                );
                break;
            }
        }
    }
    Ok(bytes)
}

fn write_record(file: &mut File, encoded: &[u8], chunk: usize) -> io::Result<()> {
    if encoded.len() > chunk {
        write_flush(file, &encoded[..chunk])?;
        write_flush(file, &encoded[chunk..])
    } else {
        write_flush(file, encoded)
    }
}

fn write_flush(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes)?;
    file.sync_data()
}

fn segment_path(dir: &Path, id: usize) -> PathBuf {
    dir.join(format!("{SEGMENT_FILE_PREFIX}{id}"))
}
