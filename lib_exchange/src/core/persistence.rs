//! # Persistence Bridge
//!
//! When a ring store configured with the `File` overflow policy fills up, its
//! whole batch is handed to an external columnar writer. The bridge:
//!
//! 1.  Snapshots the batch into parallel key/payload columns (`WriteBatch`).
//! 2.  Dispatches the write onto Tokio's blocking pool and returns at once;
//!     the store continues with the insert that triggered the overflow.
//! 3.  On completion records every produced `FileDescriptor` in a bounded
//!     `FileRangeWindow`, deleting the oldest file once the window is full,
//!     then drops the batch and resolves the `SpillTicket` tied to it.
//!
//! Messages moved into the bridge are owned by the write task until it
//! finishes; nothing else can observe or release them in that interval.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::configs::exchange_config::PersistenceConfig;
use crate::core::message::Message;
use crate::error::{ExchangeError, Result};

const COLUMNAR_MAGIC: &[u8; 4] = b"RCOL";

/// Metadata describing one file produced by the writer.
///
/// `start_index`/`end_index` are inclusive positions inside the batch that
/// produced the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    pub start_index: usize,
    pub end_index: usize,
    pub filename: PathBuf,
}

/// Column-oriented snapshot of a full ring store.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub keys: Vec<u64>,
    pub payloads: Vec<Bytes>,
}

impl WriteBatch {
    pub fn from_messages(messages: &[Message]) -> Self {
        Self {
            keys: messages.iter().map(|m| m.key).collect(),
            payloads: messages.iter().map(|m| m.payload.clone()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Sum of payload lengths.
    pub fn total_bytes(&self) -> usize {
        self.payloads.iter().map(Bytes::len).sum()
    }
}

/// The external columnar writer contract: write this batch, report the files
/// it produced.
///
/// Called on a blocking thread; implementations may do synchronous file I/O.
pub trait BatchWriter: Send + Sync + 'static {
    fn write_batch(&self, batch: &WriteBatch) -> io::Result<Vec<FileDescriptor>>;
}

/// Bounded, oldest-first list of produced files.
#[derive(Debug)]
pub struct FileRangeWindow {
    files: VecDeque<FileDescriptor>,
    file_count: usize,
}

impl FileRangeWindow {
    pub fn new(file_count: usize) -> Self {
        Self {
            files: VecDeque::with_capacity(file_count),
            file_count,
        }
    }

    /// Appends a descriptor, returning the evicted oldest one when the window
    /// was already at `file_count`.
    pub fn push(&mut self, file: FileDescriptor) -> Option<FileDescriptor> {
        let evicted = if self.files.len() >= self.file_count {
            self.files.pop_front()
        } else {
            None
        };
        self.files.push_back(file);
        evicted
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> Vec<FileDescriptor> {
        self.files.iter().cloned().collect()
    }
}

/// Completion handle for one spilled batch.
#[derive(Debug)]
pub struct SpillTicket {
    batch_len: usize,
    rx: oneshot::Receiver<Result<Vec<FileDescriptor>>>,
}

impl SpillTicket {
    /// Number of messages in the spilled batch.
    pub fn batch_len(&self) -> usize {
        self.batch_len
    }

    /// Waits for the writer to finish and returns the files it produced.
    pub async fn wait(self) -> Result<Vec<FileDescriptor>> {
        self.rx.await.unwrap_or_else(|_| {
            Err(ExchangeError::Persistence(
                "write task ended without reporting a result".to_string(),
            ))
        })
    }
}

/// Hands full batches to a `BatchWriter` and tracks the files it produces.
#[derive(Clone)]
pub struct PersistenceBridge {
    writer: Arc<dyn BatchWriter>,
    window: Arc<Mutex<FileRangeWindow>>,
}

impl PersistenceBridge {
    pub fn new(writer: Arc<dyn BatchWriter>, file_count: usize) -> Self {
        Self {
            writer,
            window: Arc::new(Mutex::new(FileRangeWindow::new(file_count))),
        }
    }

    /// Builds a bridge backed by the bundled `ColumnarFileWriter`.
    pub fn from_config(config: &PersistenceConfig) -> Self {
        Self::new(Arc::new(ColumnarFileWriter::from_config(config)), config.file_count)
    }

    /// # Dispatch
    ///
    /// Takes ownership of `messages` and starts the asynchronous write. If
    /// the write cannot be started (no Tokio runtime to run it on) the batch is
    /// dropped here and `PersistenceDispatchFailed` is returned.
    pub fn dispatch(&self, messages: Vec<Message>) -> Result<SpillTicket> {
        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            log::error!(
                "Cannot dispatch batch of {} messages to persistence, messages will be dropped: {}",
                messages.len(),
                e
            );
            ExchangeError::PersistenceDispatchFailed(e.to_string())
        })?;

        let batch = WriteBatch::from_messages(&messages);
        let batch_len = batch.len();
        let (tx, rx) = oneshot::channel();
        let writer = Arc::clone(&self.writer);
        let window = Arc::clone(&self.window);

        handle.spawn_blocking(move || {
            let result = writer
                .write_batch(&batch)
                .map_err(|e| ExchangeError::Persistence(e.to_string()));

            match &result {
                Ok(files) => {
                    let mut window = window.lock().expect("FileRangeWindow lock poisoned");
                    for file in files {
                        log::warn!("Batch written to file {}", file.filename.display());
                        if let Some(evicted) = window.push(file.clone()) {
                            remove_old_file(&evicted.filename);
                        }
                    }
                }
                Err(e) => {
                    log::error!("Persistence writer failed for batch of {} messages: {}", batch_len, e);
                }
            }

            // The writer has consumed the batch; release it before reporting.
            drop(messages);
            let _ = tx.send(result);
        });

        Ok(SpillTicket { batch_len, rx })
    }

    /// Files currently retained in the window, oldest first.
    pub fn produced_files(&self) -> Vec<FileDescriptor> {
        self.window.lock().expect("FileRangeWindow lock poisoned").files()
    }
}

fn remove_old_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!("File '{}' removed successfully.", path.display()),
        Err(e) => log::error!("Error removing the file {}: {}", path.display(), e),
    }
}

/// Reference `BatchWriter` producing simple column-oriented files.
///
/// A batch is split into files of roughly `file_size` payload bytes (a
/// `file_size` of 0 writes the whole batch into one file). Each file is named
/// `<dir>/<prefix>-<start_key>~<end_key>.<ext>` and laid out as the magic
/// `RCOL`, a `u32` row count, the key column (`u64` LE), the length column
/// (`u32` LE) and finally the concatenated payloads.
#[derive(Debug, Clone)]
pub struct ColumnarFileWriter {
    dir: PathBuf,
    prefix: String,
    ext: String,
    file_size: u64,
}

impl ColumnarFileWriter {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, ext: impl Into<String>, file_size: u64) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            ext: ext.into(),
            file_size,
        }
    }

    pub fn from_config(config: &PersistenceConfig) -> Self {
        Self::new(&config.dir, &config.prefix, &config.ext, config.file_size)
    }

    /// File name for a batch slice covering `start_key..=end_key`.
    pub fn file_name(&self, start_key: u64, end_key: u64) -> PathBuf {
        self.dir
            .join(format!("{}-{}~{}.{}", self.prefix, start_key, end_key, self.ext))
    }

    /// Splits `0..len` into inclusive index ranges of about `file_size` bytes.
    fn split_ranges(&self, batch: &WriteBatch) -> Vec<(usize, usize)> {
        let mut ranges = Vec::new();
        if batch.is_empty() {
            return ranges;
        }
        if self.file_size == 0 {
            ranges.push((0, batch.len() - 1));
            return ranges;
        }

        let mut start = 0;
        let mut acc: u64 = 0;
        for (i, payload) in batch.payloads.iter().enumerate() {
            acc += payload.len() as u64;
            if acc >= self.file_size || i == batch.len() - 1 {
                ranges.push((start, i));
                start = i + 1;
                acc = 0;
            }
        }
        ranges
    }

    fn encode(batch: &WriteBatch, start: usize, end: usize) -> Bytes {
        let rows = end - start + 1;
        let payload_bytes: usize = batch.payloads[start..=end].iter().map(Bytes::len).sum();
        let mut buf = BytesMut::with_capacity(8 + rows * 12 + payload_bytes);

        buf.put_slice(COLUMNAR_MAGIC);
        buf.put_u32_le(rows as u32);
        for key in &batch.keys[start..=end] {
            buf.put_u64_le(*key);
        }
        for payload in &batch.payloads[start..=end] {
            buf.put_u32_le(payload.len() as u32);
        }
        for payload in &batch.payloads[start..=end] {
            buf.put_slice(payload);
        }
        buf.freeze()
    }
}

impl BatchWriter for ColumnarFileWriter {
    fn write_batch(&self, batch: &WriteBatch) -> io::Result<Vec<FileDescriptor>> {
        fs::create_dir_all(&self.dir)?;

        let mut produced = Vec::new();
        for (start, end) in self.split_ranges(batch) {
            let filename = self.file_name(batch.keys[start], batch.keys[end]);
            fs::write(&filename, Self::encode(batch, start, end))?;
            produced.push(FileDescriptor {
                start_index: start,
                end_index: end,
                filename,
            });
        }
        Ok(produced)
    }
}

/// Reads back a file produced by `ColumnarFileWriter` as `(key, payload)` rows.
pub fn read_columnar_file(path: &Path) -> io::Result<Vec<(u64, Bytes)>> {
    let mut data = Bytes::from(fs::read(path)?);
    let invalid = |what: &str| io::Error::new(io::ErrorKind::InvalidData, format!("{}: {}", path.display(), what));

    if data.len() < 8 || &data[..4] != COLUMNAR_MAGIC {
        return Err(invalid("not a columnar batch file"));
    }
    data.advance(4);
    let rows = data.get_u32_le() as usize;
    if data.remaining() < rows * 12 {
        return Err(invalid("truncated column header"));
    }

    let keys: Vec<u64> = (0..rows).map(|_| data.get_u64_le()).collect();
    let lengths: Vec<usize> = (0..rows).map(|_| data.get_u32_le() as usize).collect();
    if data.remaining() != lengths.iter().sum::<usize>() {
        return Err(invalid("payload section does not match length column"));
    }

    Ok(keys
        .into_iter()
        .zip(lengths)
        .map(|(key, len)| (key, data.split_to(len)))
        .collect())
}
