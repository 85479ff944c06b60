//! Zip archive creation and extraction.
//!
//! All codec work is blocking and runs through `spawn_blocking`. Writers
//! stream entry content with `std::io::copy`, so memory use is bounded by
//! the copy buffer regardless of archive size.

use std::io;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::driver::Driver;
use crate::errors::DriverError;
use crate::resource::{Directory, File};

impl Driver {
    /// Compress `file` into `zip_file` as a single entry named after the
    /// source's last path segment.
    pub async fn zip_file(&self, file: &File, zip_file: &File) -> Result<(), DriverError> {
        self.check_mutation("zipFile")?;
        let src = file.absolute_path().to_path_buf();
        let dst = zip_file.absolute_path().to_path_buf();
        let entry_name = file.name().to_string();
        tokio::task::spawn_blocking(move || zip_file_sync(&src, &entry_name, &dst)).await??;
        debug!("Zipped {} into {}", file.path(), zip_file.path());
        Ok(())
    }

    /// Compress the content of `directory` into `zip_file`.
    pub async fn zip_directory(
        &self,
        directory: &Directory,
        zip_file: &File,
    ) -> Result<(), DriverError> {
        self.check_mutation("zipDirectory")?;
        if !self.dir_exists(directory).await? {
            return Err(DriverError::NotFound(format!(
                "Directory {} doesn't exist",
                directory.path()
            )));
        }
        let src = directory.absolute_path().to_path_buf();
        let dst = zip_file.absolute_path().to_path_buf();
        tokio::task::spawn_blocking(move || zip_directory_sync(&src, &dst)).await??;
        debug!("Zipped {} into {}", directory.path(), zip_file.path());
        Ok(())
    }

    /// Extract every entry of `file` below `directory`.
    ///
    /// Returns only after the last entry is written. The first failing
    /// entry aborts the extraction; entries already written stay on disk.
    pub async fn unzip(&self, file: &File, directory: &Directory) -> Result<(), DriverError> {
        self.check_mutation("unzip")?;
        let src = file.absolute_path().to_path_buf();
        let dst = directory.absolute_path().to_path_buf();
        let count = tokio::task::spawn_blocking(move || unzip_sync(&src, &dst)).await??;
        debug!("Extracted {} entries from {} into {}", count, file.path(), directory.path());
        Ok(())
    }
}

fn deflated() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Write a one-entry archive at `zip_path`.
pub fn zip_file_sync(src: &Path, entry_name: &str, zip_path: &Path) -> Result<(), DriverError> {
    let mut writer = ZipWriter::new(std::fs::File::create(zip_path)?);
    let filled = (|| -> Result<(), DriverError> {
        let mut input = std::fs::File::open(src)?;
        writer.start_file(entry_name, deflated())?;
        io::copy(&mut input, &mut writer)?;
        Ok(())
    })();
    seal(writer, filled, zip_path)
}

/// Write an archive of everything below `src` at `zip_path`.
///
/// Entry names are relative to `src` with `/` separators. The archive
/// itself is skipped when it lies inside `src`.
pub fn zip_directory_sync(src: &Path, zip_path: &Path) -> Result<(), DriverError> {
    let mut writer = ZipWriter::new(std::fs::File::create(zip_path)?);
    let filled = (|| -> Result<(), DriverError> {
        for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            if entry.path() == zip_path {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(src)
                .map_err(|e| DriverError::Io(io::Error::other(e)))?;
            let rel_str = rel.to_string_lossy().replace('\\', "/");

            if entry.file_type().is_dir() {
                writer.add_directory(format!("{rel_str}/"), SimpleFileOptions::default())?;
            } else {
                writer.start_file(rel_str, deflated())?;
                let mut input = std::fs::File::open(entry.path())?;
                io::copy(&mut input, &mut writer)?;
            }
        }
        Ok(())
    })();
    seal(writer, filled, zip_path)
}

/// Finish the archive, or discard it when anything failed.
///
/// On failure the original error wins over whatever finishing or removal
/// reports.
fn seal(
    writer: ZipWriter<std::fs::File>,
    filled: Result<(), DriverError>,
    zip_path: &Path,
) -> Result<(), DriverError> {
    let error = match filled {
        Ok(()) => match writer.finish() {
            Ok(_) => return Ok(()),
            Err(e) => DriverError::from(e),
        },
        Err(e) => {
            let _ = writer.finish();
            e
        }
    };
    if let Err(e) = std::fs::remove_file(zip_path) {
        warn!("Could not remove partial archive {}: {}", zip_path.display(), e);
    }
    Err(error)
}

/// Extract `zip_path` below `dest`, one entry at a time. Returns the
/// number of entries processed.
pub fn unzip_sync(zip_path: &Path, dest: &Path) -> Result<usize, DriverError> {
    let mut archive = ZipArchive::new(std::fs::File::open(zip_path)?)?;
    std::fs::create_dir_all(dest)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(rel) = entry.enclosed_name() else {
            return Err(DriverError::invalid(format!(
                "Archive entry '{}' escapes the destination directory",
                entry.name()
            )));
        };
        let target = dest.join(rel);

        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut output = std::fs::File::create(&target)?;
        io::copy(&mut entry, &mut output)?;
    }
    Ok(archive.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::permission::Permission;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    fn make_driver(dir: &TempDir, permissions: Permission) -> Driver {
        Driver::new(DriverConfig::new("test", dir.path(), permissions))
    }

    fn entry_names(zip_path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(std::fs::File::open(zip_path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    // ── zipFile ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn zip_file_uses_last_segment_as_entry_name() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/report.txt"), "quarterly numbers").unwrap();
        let d = make_driver(&dir, Permission::ReadWrite);

        let zip = d.file("report.zip").unwrap();
        d.zip_file(&d.file("docs/report.txt").unwrap(), &zip)
            .await
            .unwrap();

        let mut archive = ZipArchive::new(std::fs::File::open(zip.absolute_path()).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "report.txt");
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "quarterly numbers");
    }

    #[tokio::test]
    async fn zip_file_removes_partial_archive_on_error() {
        let dir = TempDir::new().unwrap();
        let d = make_driver(&dir, Permission::ReadWrite);
        let zip = d.file("out.zip").unwrap();

        let err = d
            .zip_file(&d.file("missing.txt").unwrap(), &zip)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));
        assert!(!zip.absolute_path().exists());
    }

    // ── zipDirectory ────────────────────────────────────────────────

    #[cfg(unix)]
    #[tokio::test]
    async fn zip_directory_removes_partial_archive_on_error() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("tree")).unwrap();
        std::fs::write(dir.path().join("tree/a.txt"), "written before the failure").unwrap();
        // Sorted after a.txt, so the archive already holds an entry.
        std::os::unix::fs::symlink(
            dir.path().join("gone.txt"),
            dir.path().join("tree/b-dangling"),
        )
        .unwrap();
        let d = make_driver(&dir, Permission::ReadWrite);
        let zip = d.file("tree.zip").unwrap();

        let err = d
            .zip_directory(&d.directory("tree").unwrap(), &zip)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));
        assert!(!zip.absolute_path().exists());
        assert!(dir.path().join("tree/a.txt").exists());
    }

    #[tokio::test]
    async fn zip_directory_records_relative_names() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("site/css")).unwrap();
        std::fs::create_dir_all(dir.path().join("site/empty")).unwrap();
        std::fs::write(dir.path().join("site/index.html"), "<html/>").unwrap();
        std::fs::write(dir.path().join("site/css/main.css"), "body{}").unwrap();
        let d = make_driver(&dir, Permission::ReadWrite);

        let zip = d.file("site.zip").unwrap();
        d.zip_directory(&d.directory("site").unwrap(), &zip)
            .await
            .unwrap();

        assert_eq!(
            entry_names(zip.absolute_path()),
            ["css/", "css/main.css", "empty/", "index.html"]
        );
    }

    #[tokio::test]
    async fn zip_directory_skips_archive_inside_source() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let d = make_driver(&dir, Permission::ReadWrite);

        let zip = d.file("self.zip").unwrap();
        d.zip_directory(&d.directory("").unwrap(), &zip).await.unwrap();
        assert_eq!(entry_names(zip.absolute_path()), ["a.txt"]);
    }

    #[tokio::test]
    async fn zip_directory_requires_existing_source() {
        let dir = TempDir::new().unwrap();
        let d = make_driver(&dir, Permission::ReadWrite);
        let zip = d.file("none.zip").unwrap();
        let err = d
            .zip_directory(&d.directory("nope").unwrap(), &zip)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::NotFound(_)));
        assert!(!zip.absolute_path().exists());
    }

    // ── unzip ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn zip_directory_then_unzip_restores_tree() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/a/b")).unwrap();
        std::fs::write(dir.path().join("src/top.txt"), "top").unwrap();
        std::fs::write(dir.path().join("src/a/b/leaf.bin"), [7u8; 4096]).unwrap();
        let d = make_driver(&dir, Permission::ReadWrite);

        let zip = d.file("src.zip").unwrap();
        d.zip_directory(&d.directory("src").unwrap(), &zip)
            .await
            .unwrap();
        d.unzip(&zip, &d.directory("out").unwrap()).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("out/top.txt")).unwrap(),
            "top"
        );
        assert_eq!(
            std::fs::read(dir.path().join("out/a/b/leaf.bin")).unwrap(),
            vec![7u8; 4096]
        );
    }

    #[tokio::test]
    async fn unzip_rejects_escaping_entries() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("evil.zip");
        {
            let mut writer = ZipWriter::new(std::fs::File::create(&zip_path).unwrap());
            writer
                .start_file("../escaped.txt", SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"gotcha").unwrap();
            writer.finish().unwrap();
        }
        let d = make_driver(&dir, Permission::ReadWrite);
        std::fs::create_dir(dir.path().join("dest")).unwrap();

        let err = d
            .unzip(&d.file("evil.zip").unwrap(), &d.directory("dest").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument(_)));
        assert!(!dir.path().join("escaped.txt").exists());
    }

    #[tokio::test]
    async fn unzip_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("not.zip"), "definitely not a zip").unwrap();
        let d = make_driver(&dir, Permission::ReadWrite);
        let err = d
            .unzip(&d.file("not.zip").unwrap(), &d.directory("dest").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Archive(_)));
    }

    // ── Permission gate ─────────────────────────────────────────────

    #[tokio::test]
    async fn read_only_driver_refuses_archive_operations() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let d = make_driver(&dir, Permission::Read);
        let a = d.file("a.txt").unwrap();
        let zip = d.file("a.zip").unwrap();
        let root = d.directory("").unwrap();

        assert!(matches!(
            d.zip_file(&a, &zip).await,
            Err(DriverError::PermissionDenied(_))
        ));
        assert!(matches!(
            d.zip_directory(&root, &zip).await,
            Err(DriverError::PermissionDenied(_))
        ));
        assert!(matches!(
            d.unzip(&zip, &root).await,
            Err(DriverError::PermissionDenied(_))
        ));
        assert!(!zip.absolute_path().exists());
    }
}
