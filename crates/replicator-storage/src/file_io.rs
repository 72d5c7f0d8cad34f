use crate::error::StorageError;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Thin wrapper over `std::fs::File` that turns every failure into a
/// `StorageError` carrying the operation's context.
pub struct FileIo;

impl FileIo {
    #[tracing::instrument(level = "debug", skip(path), fields(path = %path.display()))]
    pub fn create_with_append_and_read_permissions(path: &Path) -> Result<File, StorageError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)
            .map_err(|e| {
                StorageError::from_io_error(
                    e,
                    &format!("create file with append+read permissions: {path:?}"),
                )
            })
    }

    #[tracing::instrument(level = "debug", skip(path), fields(path = %path.display()))]
    pub fn create_with_write_truncate_permissions(path: &Path) -> Result<File, StorageError> {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| {
                StorageError::from_io_error(
                    e,
                    &format!("create file with write+truncate permissions: {path:?}"),
                )
            })
    }

    #[tracing::instrument(level = "debug", skip(path), fields(path = %path.display()))]
    pub fn open_with_read_only_permissions(path: &Path) -> Result<File, StorageError> {
        File::open(path)
            .map_err(|e| StorageError::from_io_error(e, &format!("open read-only: {path:?}")))
    }

    #[tracing::instrument(level = "debug", skip(handle, data), fields(len = data.len()))]
    pub fn append_data_to_end(handle: &mut File, data: &[u8]) -> Result<u64, StorageError> {
        let position = handle
            .seek(SeekFrom::End(0))
            .map_err(|e| StorageError::from_io_error(e, "seek to end of file"))?;

        handle
            .write_all(data)
            .map_err(|e| StorageError::from_io_error(e, "append data to file"))?;

        Ok(position)
    }

    #[tracing::instrument(level = "debug", skip(handle))]
    pub fn synchronize_to_disk(handle: &mut File) -> Result<(), StorageError> {
        handle
            .sync_all()
            .map_err(|e| StorageError::from_io_error(e, "sync file to disk"))
    }

    #[tracing::instrument(level = "debug", skip(handle))]
    pub fn get_file_size(handle: &File) -> Result<u64, StorageError> {
        handle
            .metadata()
            .map_err(|e| StorageError::from_io_error(e, "stat file"))
            .map(|metadata| metadata.len())
    }

    pub fn read_all(handle: &mut File) -> Result<Vec<u8>, StorageError> {
        handle
            .seek(SeekFrom::Start(0))
            .map_err(|e| StorageError::from_io_error(e, "seek to start of file"))?;
        let mut buf = Vec::new();
        handle
            .read_to_end(&mut buf)
            .map_err(|e| StorageError::from_io_error(e, "read entire file"))?;
        Ok(buf)
    }

    pub fn set_len(handle: &mut File, len: u64) -> Result<(), StorageError> {
        handle
            .set_len(len)
            .map_err(|e| StorageError::from_io_error(e, &format!("truncate file to {len} bytes")))
    }
}
