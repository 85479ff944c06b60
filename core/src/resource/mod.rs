//! Resource identity model: files, directories and URLs addressed by
//! logical path instead of native handle.
//!
//! Resources are plain values. A [`File`] never owns its open handle; the
//! handle lives in the driver's [`HandleRegistry`](crate::registry::HandleRegistry)
//! keyed by the file's [`FileId`].

pub mod encoding;

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::DriverError;
use crate::http::progress::ProgressListener;

/// Numeric identifier correlating a [`File`] with its open handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file addressed by logical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    id: FileId,
    path: String,
    absolute_path: PathBuf,
    encoding: Option<String>,
}

impl File {
    pub(crate) fn new(id: FileId, path: &str, base: &Path) -> Result<Self, DriverError> {
        Ok(Self {
            id,
            path: path.to_string(),
            absolute_path: absolute_path(base, path)?,
            encoding: None,
        })
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    /// Logical path, relative to the driver's base path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }

    /// Text encoding used by `readAll` and text writes (`None` = utf-8).
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn with_encoding(mut self, encoding: Option<String>) -> Self {
        self.encoding = encoding;
        self
    }

    /// Last segment of the logical path.
    pub fn name(&self) -> &str {
        last_segment(&self.path)
    }
}

/// A directory addressed by logical path. Directories are never "open".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    path: String,
    absolute_path: PathBuf,
}

impl Directory {
    pub(crate) fn new(path: &str, base: &Path) -> Result<Self, DriverError> {
        Ok(Self {
            path: path.to_string(),
            absolute_path: absolute_path(base, path)?,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }
}

/// An HTTP endpoint plus the listener notified about transfer progress.
#[derive(Clone)]
pub struct Url {
    url: String,
    listener: Option<Arc<dyn ProgressListener>>,
}

impl Url {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn listener(&self) -> Option<&Arc<dyn ProgressListener>> {
        self.listener.as_ref()
    }
}

impl fmt::Debug for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Url")
            .field("url", &self.url)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

/// Closed set of resources a command argument can refer to.
#[derive(Debug, Clone)]
pub enum Resource {
    File(File),
    Directory(Directory),
    Url(Url),
}

impl Resource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Directory(_) => "directory",
            Self::Url(_) => "url",
        }
    }

    /// Descriptor handed back to the caller.
    pub fn serialize(&self) -> SerializedResource {
        match self {
            Self::File(f) => SerializedResource::Entry {
                path: f.path.clone(),
                kind: ResourceKind::File,
            },
            Self::Directory(d) => SerializedResource::Entry {
                path: d.path.clone(),
                kind: ResourceKind::Directory,
            },
            Self::Url(u) => SerializedResource::Url { url: u.url.clone() },
        }
    }
}

/// Kind tag of a filesystem entry descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    File,
    Directory,
}

/// Outgoing descriptor: `{path, type}` for files and directories,
/// `{url}` for URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SerializedResource {
    Entry {
        path: String,
        #[serde(rename = "type")]
        kind: ResourceKind,
    },
    Url {
        url: String,
    },
}

/// Incoming descriptor, tagged by `_t`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "_t", rename_all = "lowercase")]
pub enum ResourceDescriptor {
    File {
        path: String,
        #[serde(default)]
        id: Option<FileId>,
        #[serde(default)]
        encoding: Option<String>,
    },
    Directory {
        path: String,
    },
    Url {
        url: String,
    },
}

/// Join `logical` onto `base`, stripping a trailing separator.
///
/// Logical paths are rooted at `base`; a leading `/` does not escape it and
/// `..` components are rejected.
pub fn absolute_path(base: &Path, logical: &str) -> Result<PathBuf, DriverError> {
    let relative = logical.trim_start_matches('/').trim_end_matches('/');
    let relative = Path::new(relative);
    if relative
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(DriverError::invalid(format!(
            "Path '{logical}' escapes the driver base path"
        )));
    }
    if relative.as_os_str().is_empty() {
        return Ok(base.to_path_buf());
    }
    Ok(base.join(relative))
}

/// Join a child name onto a logical parent path.
pub fn join_logical(parent: &str, name: &str) -> String {
    if parent.is_empty() || parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Logical parent of `path`, keeping the trailing separator (`""` at the root).
pub fn parent_logical(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(idx) => &path[..=idx],
        None => "",
    }
}

fn last_segment(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
