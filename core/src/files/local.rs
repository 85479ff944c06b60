//! Blocking filesystem helpers, run through `spawn_blocking` by the driver.

use std::path::Path;

use walkdir::WalkDir;

use crate::errors::DriverError;
use crate::resource::{join_logical, ResourceKind, SerializedResource};

/// Attach the logical path to an I/O error, keeping its kind.
pub fn io_context(e: std::io::Error, path: &str) -> DriverError {
    DriverError::Io(std::io::Error::new(e.kind(), format!("{path}: {e}")))
}

/// List `abs` as descriptors rooted at the logical path `logical`.
///
/// Entries are sorted by name. Subdirectories are descended into while
/// `depth > 0`, each level with `depth - 1`; children follow their parent.
pub fn read_directory_sync(
    abs: &Path,
    logical: &str,
    depth: i64,
    out: &mut Vec<SerializedResource>,
) -> Result<(), DriverError> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(abs).map_err(|e| io_context(e, logical))? {
        let entry = entry.map_err(|e| io_context(e, logical))?;
        names.push(entry.file_name().to_string_lossy().to_string());
    }
    names.sort();

    for name in names {
        let child_abs = abs.join(&name);
        let child_logical = join_logical(logical, &name);
        // Follow symlinks, so a link to a directory lists as a directory.
        let metadata =
            std::fs::metadata(&child_abs).map_err(|e| io_context(e, &child_logical))?;
        let kind = if metadata.is_file() {
            ResourceKind::File
        } else {
            ResourceKind::Directory
        };
        out.push(SerializedResource::Entry {
            path: child_logical.clone(),
            kind,
        });
        if kind == ResourceKind::Directory && depth > 0 {
            read_directory_sync(&child_abs, &child_logical, depth - 1, out)?;
        }
    }
    Ok(())
}

/// Recursively copy `src` into `dst`, creating `dst` and merging into it
/// when it exists.
pub fn copy_dir_sync(src: &Path, dst: &Path) -> Result<(), DriverError> {
    std::fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| DriverError::Io(std::io::Error::other(e)))?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_directory_sync_sorts_by_name() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("c")).unwrap();

        let mut out = Vec::new();
        read_directory_sync(dir.path(), "root", 0, &mut out).unwrap();
        let paths: Vec<_> = out
            .iter()
            .map(|e| match e {
                SerializedResource::Entry { path, .. } => path.as_str(),
                SerializedResource::Url { url } => url.as_str(),
            })
            .collect();
        assert_eq!(paths, ["root/a.txt", "root/b.txt", "root/c"]);
    }

    #[test]
    fn read_directory_sync_missing_dir() {
        let mut out = Vec::new();
        let err = read_directory_sync(Path::new("/nonexistent/abc123"), "x", 0, &mut out)
            .unwrap_err();
        assert!(matches!(err, DriverError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    }

    #[test]
    fn copy_dir_sync_copies_nested_tree() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("nested/deep")).unwrap();
        std::fs::write(src.join("top.txt"), "top").unwrap();
        std::fs::write(src.join("nested/deep/leaf.bin"), [0u8, 1, 2]).unwrap();
        std::fs::create_dir(src.join("empty")).unwrap();

        let dst = dir.path().join("dst");
        copy_dir_sync(&src, &dst).unwrap();

        assert_eq!(std::fs::read_to_string(dst.join("top.txt")).unwrap(), "top");
        assert_eq!(std::fs::read(dst.join("nested/deep/leaf.bin")).unwrap(), [0, 1, 2]);
        assert!(dst.join("empty").is_dir());
    }
}
