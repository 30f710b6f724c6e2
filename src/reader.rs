//! Per-segment pools of read handles serving concurrent positioned reads.

use crate::error::{Result, TideError};
use crossbeam_channel::{Sender, bounded, unbounded};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

struct ReadRequest {
    offset: u64,
    len: usize,
    reply: Sender<io::Result<Vec<u8>>>,
}

/// Fixed-width pool of independent read handles onto one segment file.
///
/// Each handle keeps its own cursor and is driven by its own worker thread;
/// all workers consume a shared request queue, so a request is picked up by
/// whichever handle is free. The handle set is never changed once the pool
/// is open.
pub struct SegmentReaders {
    path: PathBuf,
    sender: Mutex<Option<Sender<ReadRequest>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SegmentReaders {
    /// Opens `width` read handles on the file and starts their workers.
    pub fn open(path: &Path, width: usize) -> io::Result<Self> {
        let (sender, receiver) = unbounded::<ReadRequest>();
        let mut workers = Vec::with_capacity(width);
        for _ in 0..width {
            let mut file = File::open(path)?;
            let receiver = receiver.clone();
            workers.push(thread::spawn(move || {
                while let Ok(request) = receiver.recv() {
                    let result = read_at(&mut file, request.offset, request.len);
                    let _ = request.reply.send(result);
                }
            }));
        }
        Ok(Self {
            path: path.to_path_buf(),
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    /// Reads exactly `size` bytes at `offset` through any free handle.
    ///
    /// A tombstone size of -1 short-circuits to `Ok(None)` without touching
    /// the file. Once shutdown has begun the call fails with
    /// [`TideError::Closed`].
    pub fn read(&self, offset: u64, size: i16) -> Result<Option<String>> {
        if size < 0 {
            return Ok(None);
        }
        let sender = self.sender.lock().clone().ok_or(TideError::Closed)?;
        let (reply, completion) = bounded(1);
        sender
            .send(ReadRequest {
                offset,
                len: size as usize,
                reply,
            })
            .map_err(|_| TideError::Closed)?;
        let bytes = completion
            .recv()
            .map_err(|_| TideError::Closed)?
            .map_err(|err| self.read_error(offset, size, err))?;
        match String::from_utf8(bytes) {
            Ok(value) => Ok(Some(value)),
            Err(_) => Err(TideError::Corrupt(format!(
                "value at offset {offset} in {} is not valid utf-8",
                self.path.display()
            ))),
        }
    }

    fn read_error(&self, offset: u64, size: i16, err: io::Error) -> TideError {
        if err.kind() == ErrorKind::UnexpectedEof {
            TideError::Corrupt(format!(
                "short read of {size} bytes at offset {offset} in {}",
                self.path.display()
            ))
        } else {
            TideError::Io(err)
        }
    }

    /// Stops accepting requests, lets queued and in-flight reads drain,
    /// joins every worker, and releases the handles as the workers exit.
    /// Idempotent.
    pub fn close(&self) {
        drop(self.sender.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.join();
        }
    }
}

impl Drop for SegmentReaders {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_at(file: &mut File, offset: u64, len: usize) -> io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)?;
    Ok(buf)
}
