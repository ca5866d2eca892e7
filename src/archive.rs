//! Zip archive helpers for dependency inputs and cached artifacts

use crate::error::{DevloopError, DevloopResult};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Upper bound on the buffer reserved up front for one entry
const READ_HINT_LIMIT: u64 = 1 << 20;

/// Read access to a zip/jar archive
pub struct ArchiveReader {
    inner: ZipArchive<File>,
    path: PathBuf,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> DevloopResult<Self> {
        let file = File::open(path)
            .map_err(|e| DevloopError::io(format!("opening archive {}", path.display()), e))?;
        let inner = ZipArchive::new(file).map_err(|e| DevloopError::archive(path, e))?;
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }

    /// Names of all file entries (directories excluded)
    pub fn file_names(&self) -> Vec<String> {
        self.inner
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect()
    }

    /// Read one entry fully into memory
    pub fn read(&mut self, name: &str) -> DevloopResult<Vec<u8>> {
        let mut entry = self
            .inner
            .by_name(name)
            .map_err(|e| DevloopError::archive(&self.path, e))?;
        // The declared size comes from the archive header and may be forged
        let mut bytes = Vec::with_capacity(entry.size().min(READ_HINT_LIMIT) as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| DevloopError::io(format!("reading {} from {}", name, self.path.display()), e))?;
        Ok(bytes)
    }

    /// Extract one entry below `dest`, keeping its relative path.
    ///
    /// Entries whose names would escape `dest` are rejected.
    pub fn extract(&mut self, name: &str, dest: &Path) -> DevloopResult<PathBuf> {
        let mut entry = self
            .inner
            .by_name(name)
            .map_err(|e| DevloopError::archive(&self.path, e))?;
        let relative = entry.enclosed_name().map(|p| p.to_path_buf()).ok_or_else(|| {
            DevloopError::User(format!(
                "archive {} contains unsafe entry name {}",
                self.path.display(),
                name
            ))
        })?;

        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DevloopError::io(format!("creating {}", parent.display()), e))?;
        }
        let mut out = File::create(&target)
            .map_err(|e| DevloopError::io(format!("creating {}", target.display()), e))?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| DevloopError::io(format!("extracting {}", name), e))?;
        Ok(target)
    }
}

/// Builds a new zip archive; duplicate entry names are skipped
pub struct ArchiveWriter {
    inner: ZipWriter<File>,
    path: PathBuf,
    names: HashSet<String>,
}

impl ArchiveWriter {
    pub fn create(path: &Path) -> DevloopResult<Self> {
        let file = File::create(path)
            .map_err(|e| DevloopError::io(format!("creating archive {}", path.display()), e))?;
        Ok(Self {
            inner: ZipWriter::new(file),
            path: path.to_path_buf(),
            names: HashSet::new(),
        })
    }

    fn start(&mut self, name: &str) -> DevloopResult<bool> {
        if !self.names.insert(name.to_string()) {
            return Ok(false);
        }
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.inner
            .start_file(name, options)
            .map_err(|e| DevloopError::archive(&self.path, e))?;
        Ok(true)
    }

    /// Add an in-memory entry. Returns false if the name was already taken.
    pub fn add_bytes(&mut self, name: &str, bytes: &[u8]) -> DevloopResult<bool> {
        if !self.start(name)? {
            return Ok(false);
        }
        self.inner
            .write_all(bytes)
            .map_err(|e| DevloopError::io(format!("writing {} to {}", name, self.path.display()), e))?;
        Ok(true)
    }

    /// Add a file from disk. Returns false if the name was already taken.
    pub fn add_file(&mut self, name: &str, source: &Path) -> DevloopResult<bool> {
        if !self.start(name)? {
            return Ok(false);
        }
        let mut file = File::open(source)
            .map_err(|e| DevloopError::io(format!("opening {}", source.display()), e))?;
        io::copy(&mut file, &mut self.inner)
            .map_err(|e| DevloopError::io(format!("archiving {}", source.display()), e))?;
        Ok(true)
    }

    /// Add every file below `dir`, named by its path relative to `dir`.
    ///
    /// Returns the number of entries added.
    pub fn add_dir(&mut self, dir: &Path) -> DevloopResult<usize> {
        let mut added = 0;
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry =
                entry.map_err(|e| DevloopError::io(format!("scanning {}", dir.display()), e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(dir) else {
                continue;
            };
            if self.add_file(&entry_name(relative), entry.path())? {
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn finish(self) -> DevloopResult<()> {
        let mut file = self
            .inner
            .finish()
            .map_err(|e| DevloopError::archive(&self.path, e))?;
        file.flush()
            .map_err(|e| DevloopError::io(format!("flushing {}", self.path.display()), e))?;
        file.sync_all()
            .map_err(|e| DevloopError::io(format!("syncing {}", self.path.display()), e))
    }
}

/// Zip entry name for a relative path (always `/`-separated)
pub fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_archive(dir: &Path) -> PathBuf {
        let path = dir.join("dep.jar");
        let mut writer = ArchiveWriter::create(&path).unwrap();
        writer.add_bytes("com/example/Foo.java", b"class Foo {}").unwrap();
        writer.add_bytes("com/example/Foo.native.js", b"// native").unwrap();
        writer.finish().unwrap();
        path
    }

    #[test]
    fn write_then_read_entries() {
        let dir = TempDir::new().unwrap();
        let path = sample_archive(dir.path());

        let mut reader = ArchiveReader::open(&path).unwrap();
        let mut names = reader.file_names();
        names.sort();
        assert_eq!(
            names,
            vec!["com/example/Foo.java", "com/example/Foo.native.js"]
        );
        assert_eq!(reader.read("com/example/Foo.java").unwrap(), b"class Foo {}");
    }

    /// Overwrite the declared uncompressed size of every entry
    fn forge_sizes(bytes: &mut [u8], size: u32) {
        let le = size.to_le_bytes();
        for i in 0..bytes.len().saturating_sub(28) {
            match bytes[i..i + 4] {
                [0x50, 0x4b, 0x03, 0x04] => bytes[i + 22..i + 26].copy_from_slice(&le),
                [0x50, 0x4b, 0x01, 0x02] => bytes[i + 24..i + 28].copy_from_slice(&le),
                _ => {}
            }
        }
    }

    #[test]
    fn forged_entry_size_is_not_reserved() {
        let dir = TempDir::new().unwrap();
        let path = sample_archive(dir.path());
        let mut bytes = fs::read(&path).unwrap();
        forge_sizes(&mut bytes, 0xF000_0000);
        fs::write(&path, &bytes).unwrap();

        // Either the real bytes or an error for this entry; the process survives
        let Ok(mut reader) = ArchiveReader::open(&path) else {
            return;
        };
        if let Ok(content) = reader.read("com/example/Foo.java") {
            assert_eq!(content, b"class Foo {}");
        }
    }

    #[test]
    fn extract_keeps_relative_path() {
        let dir = TempDir::new().unwrap();
        let path = sample_archive(dir.path());
        let dest = dir.path().join("out");

        let mut reader = ArchiveReader::open(&path).unwrap();
        let extracted = reader.extract("com/example/Foo.java", &dest).unwrap();

        assert_eq!(extracted, dest.join("com/example/Foo.java"));
        assert_eq!(fs::read(extracted).unwrap(), b"class Foo {}");
    }

    #[test]
    fn duplicate_names_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dup.zip");
        let mut writer = ArchiveWriter::create(&path).unwrap();
        assert!(writer.add_bytes("a.js", b"first").unwrap());
        assert!(!writer.add_bytes("a.js", b"second").unwrap());
        writer.finish().unwrap();

        let mut reader = ArchiveReader::open(&path).unwrap();
        assert_eq!(reader.read("a.js").unwrap(), b"first");
    }

    #[test]
    fn add_dir_uses_slash_names() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("tree");
        fs::create_dir_all(tree.join("a/b")).unwrap();
        fs::write(tree.join("a/b/c.js"), "c").unwrap();
        fs::write(tree.join("top.js"), "t").unwrap();

        let path = dir.path().join("tree.zip");
        let mut writer = ArchiveWriter::create(&path).unwrap();
        assert_eq!(writer.add_dir(&tree).unwrap(), 2);
        writer.finish().unwrap();

        let reader = ArchiveReader::open(&path).unwrap();
        let mut names = reader.file_names();
        names.sort();
        assert_eq!(names, vec!["a/b/c.js", "top.js"]);
    }

    #[test]
    fn not_an_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bogus.jar");
        fs::write(&path, "not a zip").unwrap();

        let err = ArchiveReader::open(&path).err().unwrap();
        assert!(matches!(err, DevloopError::Archive { .. }));
    }
}
