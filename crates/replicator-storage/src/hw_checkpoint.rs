//! Durable `{partition -> high watermark}` map for a single log directory.
//!
//! Writes replace the whole file atomically: serialize to a temp file in the
//! same directory, fsync it, then rename over the target. A reader therefore
//! always sees either the previous complete map or the new one, never a
//! partial write torn by a crash mid-write.

use crate::file_io::FileIo;
use crate::error::StorageError;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const FORMAT_VERSION: u32 = 0;
const CHECKPOINT_FILE_NAME: &str = "replication-offset-checkpoint";

/// Key identifying a partition's checkpoint row: (topic, partition index).
pub type PartitionKey = (String, i32);

/// One log directory's durable HW checkpoint file.
pub struct HwCheckpointStore {
    path: PathBuf,
    // Mints unique temp-file names; does not by itself order the renames
    // below, so it is not a substitute for `write_lock`.
    write_seq: AtomicU64,
    // Held across the temp-write-then-rename sequence in `write` so two
    // concurrent writers can never race the final rename onto `path`.
    write_lock: Mutex<()>,
}

impl HwCheckpointStore {
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Self {
        Self {
            path: log_dir.as_ref().join(CHECKPOINT_FILE_NAME),
            write_seq: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    /// Read back the last successfully written map. A missing or
    /// zero-length file is treated as an empty map, matching a broker's
    /// first-ever startup.
    pub fn read(&self) -> Result<HashMap<PartitionKey, i64>, StorageError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let mut file = FileIo::open_with_read_only_permissions(&self.path)?;
        let bytes = FileIo::read_all(&mut file)?;
        if bytes.is_empty() {
            return Ok(HashMap::new());
        }

        parse_checkpoint(&bytes)
    }

    /// Atomically replace the checkpoint file with `offsets`.
    ///
    /// A write failure here is fatal to the process: the caller is expected
    /// to call [`crate::error::abort_on_checkpoint_failure`] on `Err`, not
    /// retry or ignore it.
    pub fn write(&self, offsets: &HashMap<PartitionKey, i64>) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let seq = self.write_seq.fetch_add(1, Ordering::SeqCst);
        let tmp_path = self.path.with_extension(format!("tmp.{seq}"));

        let contents = render_checkpoint(offsets);
        {
            let mut tmp_file =
                FileIo::create_with_write_truncate_permissions(&tmp_path)?;
            tmp_file
                .write_all(contents.as_bytes())
                .map_err(|e| StorageError::from_io_error(e, "write checkpoint temp file"))?;
            FileIo::synchronize_to_disk(&mut tmp_file)?;
        }

        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| StorageError::from_io_error(e, "rename checkpoint temp file into place"))?;

        debug!(
            "checkpointed {} partition offsets to {}",
            offsets.len(),
            self.path.display()
        );
        Ok(())
    }
}

fn render_checkpoint(offsets: &HashMap<PartitionKey, i64>) -> String {
    let mut out = String::new();
    out.push_str(&FORMAT_VERSION.to_string());
    out.push('\n');
    out.push_str(&offsets.len().to_string());
    out.push('\n');
    // Sort for deterministic output; makes tests and diffs stable.
    let mut rows: Vec<_> = offsets.iter().collect();
    rows.sort_by(|a, b| a.0.cmp(b.0));
    for ((topic, partition), offset) in rows {
        out.push_str(&format!("{topic} {partition} {offset}\n"));
    }
    out
}

fn parse_checkpoint(bytes: &[u8]) -> Result<HashMap<PartitionKey, i64>, StorageError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| StorageError::from_serialization_error(e, "checkpoint file is not UTF-8"))?;
    let mut lines = text.lines();

    let _version: u32 = lines
        .next()
        .ok_or_else(|| missing_header("format version"))?
        .trim()
        .parse()
        .map_err(|e| StorageError::from_serialization_error(e, "parse format version"))?;

    let count: usize = lines
        .next()
        .ok_or_else(|| missing_header("entry count"))?
        .trim()
        .parse()
        .map_err(|e| StorageError::from_serialization_error(e, "parse entry count"))?;

    let mut map = HashMap::with_capacity(count);
    for line in lines.take(count) {
        let mut parts = line.split_whitespace();
        let topic = parts
            .next()
            .ok_or_else(|| malformed_row(line))?
            .to_string();
        let partition: i32 = parts
            .next()
            .ok_or_else(|| malformed_row(line))?
            .parse()
            .map_err(|e| StorageError::from_serialization_error(e, "parse partition index"))?;
        let offset: i64 = parts
            .next()
            .ok_or_else(|| malformed_row(line))?
            .parse()
            .map_err(|e| StorageError::from_serialization_error(e, "parse offset"))?;
        map.insert((topic, partition), offset);
    }
    Ok(map)
}

fn missing_header(field: &str) -> StorageError {
    StorageError::DataCorruption {
        context: "checkpoint file".to_string(),
        details: format!("missing {field}"),
    }
}

fn malformed_row(line: &str) -> StorageError {
    StorageError::DataCorruption {
        context: "checkpoint file".to_string(),
        details: format!("malformed row: {line:?}"),
    }
}
