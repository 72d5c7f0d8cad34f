//! Per-partition append-only log storage.
//!
//! The on-disk wire format is deliberately minimal: a single growing file
//! per partition with a length-prefixed frame, not a segmented, indexed log.

use crate::error::StorageError;
use crate::file_io::FileIo;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One partition's durable record log: append-only, offset-addressed.
pub trait PartitionLogHandle: Send + Sync {
    /// Append one record, assigning it the next offset. Returns that offset.
    fn append(&self, data: &[u8]) -> Result<i64, StorageError>;

    /// Discard every record at or after `offset`. A no-op if `offset` is
    /// already at or past the log end.
    fn truncate(&self, offset: i64) -> Result<(), StorageError>;

    /// One past the highest offset this log contains.
    fn log_end_offset(&self) -> i64;
}

/// Opens and tracks [`PartitionLogHandle`]s for every partition hosted in a
/// broker's data directory.
pub trait LogManager: Send + Sync {
    fn get_or_create(
        &self,
        topic: &str,
        partition: i32,
    ) -> Result<Arc<dyn PartitionLogHandle>, StorageError>;

    /// Data directories currently open, for the periodic checkpoint task to
    /// iterate when collecting every local replica's HW.
    fn open_partitions(&self) -> Vec<(String, i32)>;
}

struct Frame {
    offset: i64,
    data: Vec<u8>,
}

fn encode_frame(offset: i64, data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + data.len());
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(&offset.to_be_bytes());
    buf.extend_from_slice(data);
    buf
}

fn decode_frames(bytes: &[u8]) -> Result<Vec<Frame>, StorageError> {
    let mut cursor = Cursor::new(bytes);
    let mut frames = Vec::new();
    loop {
        let mut len_buf = [0u8; 4];
        if cursor.read_exact(&mut len_buf).is_err() {
            break;
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut offset_buf = [0u8; 8];
        cursor
            .read_exact(&mut offset_buf)
            .map_err(|e| StorageError::from_io_error(e, "read frame offset"))?;
        let offset = i64::from_be_bytes(offset_buf);
        let mut data = vec![0u8; len];
        cursor
            .read_exact(&mut data)
            .map_err(|e| StorageError::from_io_error(e, "read frame payload"))?;
        frames.push(Frame { offset, data });
    }
    Ok(frames)
}

/// A single partition's log backed by one file on disk.
pub struct FilePartitionLog {
    path: PathBuf,
    state: Mutex<FileLogState>,
}

struct FileLogState {
    file: File,
    next_offset: i64,
}

impl FilePartitionLog {
    fn open(path: PathBuf) -> Result<Self, StorageError> {
        let mut file = FileIo::create_with_append_and_read_permissions(&path)?;
        let bytes = FileIo::read_all(&mut file)?;
        let frames = decode_frames(&bytes)?;
        let next_offset = frames.last().map(|f| f.offset + 1).unwrap_or(0);

        Ok(Self {
            path,
            state: Mutex::new(FileLogState { file, next_offset }),
        })
    }
}

impl PartitionLogHandle for FilePartitionLog {
    fn append(&self, data: &[u8]) -> Result<i64, StorageError> {
        let mut state = self.state.lock();
        let offset = state.next_offset;
        let frame = encode_frame(offset, data);
        FileIo::append_data_to_end(&mut state.file, &frame)?;
        state.next_offset += 1;
        Ok(offset)
    }

    fn truncate(&self, offset: i64) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if offset >= state.next_offset {
            return Ok(());
        }

        let bytes = FileIo::read_all(&mut state.file)?;
        let frames = decode_frames(&bytes)?;
        let kept: Vec<u8> = frames
            .iter()
            .filter(|f| f.offset < offset)
            .flat_map(|f| encode_frame(f.offset, &f.data))
            .collect();

        FileIo::set_len(&mut state.file, 0)?;
        FileIo::append_data_to_end(&mut state.file, &kept)?;
        state.next_offset = offset.max(0);
        Ok(())
    }

    fn log_end_offset(&self) -> i64 {
        self.state.lock().next_offset
    }
}

/// Opens [`FilePartitionLog`]s rooted at `data_dir/<topic>/<partition>.log`.
pub struct FileLogManager {
    data_dir: PathBuf,
    logs: Mutex<HashMap<(String, i32), Arc<dyn PartitionLogHandle>>>,
}

impl FileLogManager {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            logs: Mutex::new(HashMap::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl LogManager for FileLogManager {
    fn get_or_create(
        &self,
        topic: &str,
        partition: i32,
    ) -> Result<Arc<dyn PartitionLogHandle>, StorageError> {
        let key = (topic.to_string(), partition);
        let mut logs = self.logs.lock();
        if let Some(existing) = logs.get(&key) {
            return Ok(Arc::clone(existing));
        }

        let topic_dir = self.data_dir.join(topic);
        std::fs::create_dir_all(&topic_dir)
            .map_err(|e| StorageError::from_io_error(e, "create topic directory"))?;
        let path = topic_dir.join(format!("{partition}.log"));
        let log: Arc<dyn PartitionLogHandle> = Arc::new(FilePartitionLog::open(path)?);
        logs.insert(key, Arc::clone(&log));
        Ok(log)
    }

    fn open_partitions(&self) -> Vec<(String, i32)> {
        self.logs.lock().keys().cloned().collect()
    }
}

/// An in-memory [`PartitionLogHandle`], for tests that don't need durability.
pub struct InMemoryPartitionLog {
    records: Mutex<Vec<Vec<u8>>>,
}

impl Default for InMemoryPartitionLog {
    fn default() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }
}

impl PartitionLogHandle for InMemoryPartitionLog {
    fn append(&self, data: &[u8]) -> Result<i64, StorageError> {
        let mut records = self.records.lock();
        let offset = records.len() as i64;
        records.push(data.to_vec());
        Ok(offset)
    }

    fn truncate(&self, offset: i64) -> Result<(), StorageError> {
        let mut records = self.records.lock();
        if offset >= 0 && (offset as usize) < records.len() {
            records.truncate(offset as usize);
        }
        Ok(())
    }

    fn log_end_offset(&self) -> i64 {
        self.records.lock().len() as i64
    }
}

/// A [`LogManager`] that keeps every partition's log in memory, for tests.
#[derive(Default)]
pub struct InMemoryLogManager {
    logs: Mutex<HashMap<(String, i32), Arc<dyn PartitionLogHandle>>>,
}

impl LogManager for InMemoryLogManager {
    fn get_or_create(
        &self,
        topic: &str,
        partition: i32,
    ) -> Result<Arc<dyn PartitionLogHandle>, StorageError> {
        let key = (topic.to_string(), partition);
        let mut logs = self.logs.lock();
        Ok(Arc::clone(
            logs.entry(key)
                .or_insert_with(|| Arc::new(InMemoryPartitionLog::default())),
        ))
    }

    fn open_partitions(&self) -> Vec<(String, i32)> {
        self.logs.lock().keys().cloned().collect()
    }
}
