//! File and directory operations on a [`Driver`].
//!
//! Every mutating operation consults the permission gate before touching
//! the filesystem. Underlying I/O failures propagate with their native
//! kind; nothing here retries.

pub mod local;

use std::io::SeekFrom;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

use crate::driver::Driver;
use crate::errors::DriverError;
use crate::registry::{OpenFile, OpenMode};
use crate::resource::encoding::TextEncoding;
use crate::resource::{parent_logical, Directory, File, Resource, SerializedResource};

use self::local::{copy_dir_sync, io_context, read_directory_sync};

/// Payload accepted by [`Driver::write`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteData {
    Text(String),
    Bytes(Vec<u8>),
    /// Any other value; written as its JSON text.
    Json(Value),
}

/// New name for [`Driver::rename_object`].
#[derive(Debug, Clone)]
pub enum RenameTarget {
    Resource(Resource),
    /// A bare name, interpreted as a sibling in the same parent directory.
    Name(String),
}

impl Driver {
    /// Open `file` for writing, creating or truncating it.
    pub async fn create_file(&self, file: &File) -> Result<(), DriverError> {
        self.check_mutation("createFile")?;
        let handle = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(file.absolute_path())
            .await
            .map_err(|e| io_context(e, file.path()))?;
        self.registry().insert(file.clone(), OpenMode::Write, handle).await;
        debug!("Created file {} ({})", file.path(), file.id());
        Ok(())
    }

    /// Open `file` for reading.
    pub async fn open_file(&self, file: &File) -> Result<(), DriverError> {
        let handle = tokio::fs::File::open(file.absolute_path())
            .await
            .map_err(|e| io_context(e, file.path()))?;
        self.registry().insert(file.clone(), OpenMode::Read, handle).await;
        debug!("Opened file {} ({})", file.path(), file.id());
        Ok(())
    }

    /// Open `file` for appending, creating it when missing.
    pub async fn open_file_for_append(&self, file: &File) -> Result<(), DriverError> {
        self.check_mutation("openFileForAppend")?;
        let handle = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(file.absolute_path())
            .await
            .map_err(|e| io_context(e, file.path()))?;
        self.registry().insert(file.clone(), OpenMode::Append, handle).await;
        debug!("Opened file {} ({}) for append", file.path(), file.id());
        Ok(())
    }

    /// Release the handle of `file`. Closing a file that is not open is a no-op.
    pub async fn close(&self, file: &File) -> Result<(), DriverError> {
        self.registry()
            .close(file.id())
            .await
            .map_err(|e| io_context(e, file.path()))
    }

    /// `false` only when the path does not exist (or is not a regular file).
    ///
    /// Any other stat failure reports `true` so permission problems are not
    /// mistaken for absence.
    pub async fn file_exists(&self, file: &File) -> Result<bool, DriverError> {
        match tokio::fs::metadata(file.absolute_path()).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                debug!("stat of {} failed, assuming it exists: {}", file.path(), e);
                Ok(true)
            }
        }
    }

    /// Read up to `length` bytes (default: the file length) from the open
    /// handle, starting at `offset` or at the current position.
    pub async fn read(
        &self,
        file: &File,
        length: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<u8>, DriverError> {
        let open = self.open_entry(file, "File not opened").await?;
        let mut handle = open.lock().await;

        let length = match length {
            Some(length) if length > 0 => length,
            _ => handle.metadata().await?.len(),
        };
        if let Some(offset) = offset {
            handle.seek(SeekFrom::Start(offset)).await?;
        }

        let mut buf = Vec::new();
        (&mut *handle).take(length).read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Read the whole file as text using its encoding (utf-8 by default).
    pub async fn read_all(&self, file: &File) -> Result<String, DriverError> {
        let encoding = TextEncoding::parse(file.encoding())?;
        let bytes = tokio::fs::read(file.absolute_path())
            .await
            .map_err(|e| io_context(e, file.path()))?;
        encoding.decode(bytes)
    }

    /// Write `data` through the open handle of `file`.
    ///
    /// Text is encoded with the file's encoding. For byte payloads `offset`
    /// and `length` select a range of `data`; `position` is the file offset
    /// (current position when `None`, ignored in append mode).
    pub async fn write(
        &self,
        file: &File,
        data: Option<WriteData>,
        offset: Option<i64>,
        length: Option<u64>,
        position: Option<u64>,
    ) -> Result<(), DriverError> {
        self.check_mutation("write")?;
        let open = self.open_entry(file, "File not open for write").await?;

        let bytes = match data {
            None => return Err(DriverError::NoData),
            Some(WriteData::Text(text)) if text.is_empty() => return Err(DriverError::NoData),
            Some(WriteData::Bytes(bytes)) if bytes.is_empty() => return Err(DriverError::NoData),
            Some(WriteData::Json(Value::Null | Value::Bool(false))) => {
                return Err(DriverError::NoData)
            }
            Some(WriteData::Json(Value::Number(n))) if n.as_f64() == Some(0.0) => {
                return Err(DriverError::NoData)
            }
            Some(WriteData::Text(text)) => {
                TextEncoding::parse(open.file().encoding())?.encode(&text)?
            }
            Some(WriteData::Json(value)) => {
                let text = serde_json::to_string(&value)
                    .map_err(|e| DriverError::invalid(format!("Cannot serialize data: {e}")))?;
                TextEncoding::parse(open.file().encoding())?.encode(&text)?
            }
            Some(WriteData::Bytes(bytes)) => slice_payload(bytes, offset, length),
        };

        let mut handle = open.lock().await;
        if let Some(position) = position {
            if open.mode() != OpenMode::Append {
                handle.seek(SeekFrom::Start(position)).await?;
            }
        }
        handle.write_all(&bytes).await?;
        handle.flush().await?;
        Ok(())
    }

    /// Copy `file` to `new_file`. The source must exist.
    pub async fn copy_file(&self, file: &File, new_file: &File) -> Result<(), DriverError> {
        self.check_mutation("copyFile")?;
        if !self.file_exists(file).await? {
            return Err(DriverError::NotFound(format!(
                "file to copy doesn't exist: {}",
                file.path()
            )));
        }
        tokio::fs::copy(file.absolute_path(), new_file.absolute_path())
            .await
            .map_err(|e| io_context(e, new_file.path()))?;
        Ok(())
    }

    /// Rename a file or directory.
    pub async fn rename_object(
        &self,
        obj: &Resource,
        target: RenameTarget,
    ) -> Result<(), DriverError> {
        let (from_path, from_abs) = match obj {
            Resource::File(f) => (f.path(), f.absolute_path()),
            Resource::Directory(d) => (d.path(), d.absolute_path()),
            Resource::Url(_) => {
                return Err(DriverError::invalid(
                    "The provided parameter 'obj' must be a file or a directory",
                ))
            }
        };
        self.check_mutation("renameObject")?;

        let to_abs = match target {
            RenameTarget::Name(name) => {
                let sibling = format!("{}{}", parent_logical(from_path), name);
                match obj {
                    Resource::File(_) => self.file(&sibling)?.absolute_path().to_path_buf(),
                    _ => self.directory(&sibling)?.absolute_path().to_path_buf(),
                }
            }
            RenameTarget::Resource(Resource::File(f)) => f.absolute_path().to_path_buf(),
            RenameTarget::Resource(Resource::Directory(d)) => d.absolute_path().to_path_buf(),
            RenameTarget::Resource(Resource::Url(_)) => {
                return Err(DriverError::invalid(
                    "The provided parameter 'newObj' must be a file or a directory",
                ))
            }
        };

        tokio::fs::rename(from_abs, &to_abs)
            .await
            .map_err(|e| io_context(e, from_path))?;
        Ok(())
    }

    /// Delete `file`. The file must exist.
    pub async fn delete_file(&self, file: &File) -> Result<(), DriverError> {
        self.check_mutation("deleteFile")?;
        if !self.file_exists(file).await? {
            return Err(DriverError::NotFound(format!(
                "file to delete doesn't exist: {}",
                file.path()
            )));
        }
        tokio::fs::remove_file(file.absolute_path())
            .await
            .map_err(|e| io_context(e, file.path()))?;
        Ok(())
    }

    /// Size of `file` in bytes.
    pub async fn file_length(&self, file: &File) -> Result<u64, DriverError> {
        let metadata = tokio::fs::metadata(file.absolute_path())
            .await
            .map_err(|e| io_context(e, file.path()))?;
        Ok(metadata.len())
    }

    /// Last modification time of `file`.
    pub async fn file_date_time(&self, file: &File) -> Result<DateTime<Utc>, DriverError> {
        let metadata = tokio::fs::metadata(file.absolute_path())
            .await
            .map_err(|e| io_context(e, file.path()))?;
        let modified = metadata.modified().map_err(|e| io_context(e, file.path()))?;
        Ok(DateTime::<Utc>::from(modified))
    }

    /// Create `directory` and any missing parents.
    pub async fn mk_dir(&self, directory: &Directory) -> Result<(), DriverError> {
        self.check_mutation("mkDir")?;
        tokio::fs::create_dir_all(directory.absolute_path())
            .await
            .map_err(|e| io_context(e, directory.path()))
    }

    /// Same asymmetry as [`Driver::file_exists`], for directories.
    pub async fn dir_exists(&self, directory: &Directory) -> Result<bool, DriverError> {
        match tokio::fs::metadata(directory.absolute_path()).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                debug!("stat of {} failed, assuming it exists: {}", directory.path(), e);
                Ok(true)
            }
        }
    }

    /// Recursively copy `src` into `dst`.
    pub async fn copy_dir(&self, src: &Directory, dst: &Directory) -> Result<(), DriverError> {
        self.check_mutation("copyDir")?;
        if !self.dir_exists(src).await? {
            return Err(DriverError::NotFound(format!(
                "Directory {} doesn't exist",
                src.path()
            )));
        }
        let from = src.absolute_path().to_path_buf();
        let to = dst.absolute_path().to_path_buf();
        tokio::task::spawn_blocking(move || copy_dir_sync(&from, &to)).await?
    }

    /// Remove `directory` and its content. Missing directories are ignored.
    pub async fn remove_dir_recursive(&self, directory: &Directory) -> Result<(), DriverError> {
        self.check_mutation("removeDirRecursive")?;
        if !self.dir_exists(directory).await? {
            return Ok(());
        }
        tokio::fs::remove_dir_all(directory.absolute_path())
            .await
            .map_err(|e| io_context(e, directory.path()))
    }

    /// List `directory`, descending into subdirectories while `depth > 0`.
    ///
    /// An omitted or negative depth lists the immediate children only.
    pub async fn read_directory(
        &self,
        directory: &Directory,
        depth: Option<i64>,
    ) -> Result<Vec<SerializedResource>, DriverError> {
        let abs = directory.absolute_path().to_path_buf();
        let logical = directory.path().to_string();
        let depth = depth.unwrap_or(0);
        tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            read_directory_sync(&abs, &logical, depth, &mut out)?;
            Ok(out)
        })
        .await?
    }

    async fn open_entry(&self, file: &File, message: &str) -> Result<Arc<OpenFile>, DriverError> {
        self.registry()
            .get(file.id())
            .await
            .ok_or_else(|| DriverError::FileNotOpen(format!("{message}: {}", file.path())))
    }
}

/// Select `data[offset..offset + length]`, clamped to the buffer.
fn slice_payload(mut data: Vec<u8>, offset: Option<i64>, length: Option<u64>) -> Vec<u8> {
    let start = offset.filter(|o| *o > 0).unwrap_or(0) as usize;
    let start = start.min(data.len());
    let end = match length {
        Some(length) if length > 0 => start.saturating_add(length as usize).min(data.len()),
        _ => data.len(),
    };
    if start == 0 && end == data.len() {
        return data;
    }
    data.truncate(end);
    data.split_off(start)
}
