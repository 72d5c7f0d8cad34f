//! Exclusive advisory lock on a broker's log directory, so two coordinator
//! processes never open the same partition logs concurrently.

use crate::error::StorageError;
use fs4::fs_std::FileExt;
use log::warn;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use sysinfo::{ProcessesToUpdate, System};

const LOCK_FILE_NAME: &str = ".replicator.lock";

/// Holds the directory's advisory lock for as long as this value lives;
/// the lock file is removed on drop.
pub struct DirectoryLock {
    _file: File,
    lock_path: PathBuf,
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            warn!("failed to remove directory lock {:?}: {e}", self.lock_path);
        }
    }
}

impl DirectoryLock {
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self, StorageError> {
        let data_dir = data_dir.as_ref();
        if !data_dir.exists() {
            std::fs::create_dir_all(data_dir)
                .map_err(|e| StorageError::from_io_error(e, "create log directory"))?;
        }
        let lock_path = data_dir.join(LOCK_FILE_NAME);
        let lock_file = open_lock_file(&lock_path)?;

        match lock_file.try_lock_exclusive() {
            Ok(true) => {
                write_lock_metadata(&lock_file)?;
                Ok(Self {
                    _file: lock_file,
                    lock_path,
                })
            }
            Ok(false) | Err(_) => handle_conflict(&lock_path, data_dir),
        }
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File, StorageError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|e| StorageError::from_io_error(e, "open directory lock file"))
}

fn write_lock_metadata(lock_file: &File) -> Result<(), StorageError> {
    use std::io::Write;
    let pid = std::process::id();
    let _ = lock_file.set_len(0);
    (&*lock_file)
        .write_all(format!("pid={pid}\n").as_bytes())
        .map_err(|e| StorageError::from_io_error(e, "write directory lock metadata"))
}

fn handle_conflict(lock_path: &Path, data_dir: &Path) -> Result<DirectoryLock, StorageError> {
    let holder_pid = std::fs::read_to_string(lock_path)
        .ok()
        .and_then(|s| s.trim().strip_prefix("pid=").map(str::to_string))
        .and_then(|s| s.parse::<u32>().ok());

    match holder_pid {
        Some(pid) if is_process_alive(pid) => Err(StorageError::DirectoryLocked {
            context: format!("log directory {} is in use", data_dir.display()),
            pid: Some(pid),
        }),
        // Stale lock left behind by a dead process: reclaim it.
        _ => {
            if std::fs::remove_file(lock_path).is_ok() {
                DirectoryLock::acquire(data_dir)
            } else {
                Err(StorageError::DirectoryLocked {
                    context: format!("log directory {} is in use", data_dir.display()),
                    pid: None,
                })
            }
        }
    }
}

fn is_process_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, false);
    system
        .processes()
        .get(&sysinfo::Pid::from(pid as usize))
        .is_some()
}
