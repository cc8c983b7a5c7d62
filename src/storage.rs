//! Crate storage backends.
//!
//! Checks never touch the filesystem directly; they go through
//! [`CrateStorage`], which is implemented for a local directory, a local
//! tar archive (optionally gzip-compressed), and an in-memory crate.
//! All paths are crate-relative (`./` prefix and percent-encoding allowed).

use crate::error::StorageError;
use flate2::read::GzDecoder;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Read-only access to the files of a crate.
pub trait CrateStorage: Send + Sync {
    /// Human-readable location (directory, archive path, or label).
    fn location(&self) -> &str;

    fn exists(&self, path: &str) -> bool;

    fn is_directory(&self, path: &str) -> bool;

    /// Size in bytes of a regular file.
    fn size(&self, path: &str) -> Result<u64, StorageError>;

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    fn read_text(&self, path: &str) -> Result<String, StorageError> {
        let bytes = self.read_bytes(path)?;
        String::from_utf8(bytes).map_err(|_| StorageError::NotText {
            path: path.to_string(),
        })
    }
}

/// Open a crate by location, picking the backend from its shape.
///
/// - directories ⇒ [`LocalDirectory`]
/// - `*.tar`, `*.tar.gz`, `*.tgz` ⇒ [`TarArchive`]
/// - `http(s)://` ⇒ unsupported
pub fn open_crate(location: &str) -> Result<Box<dyn CrateStorage>, StorageError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        return Err(StorageError::Unsupported(location.to_string()));
    }
    let path = PathBuf::from(location);
    if path.is_dir() {
        return Ok(Box::new(LocalDirectory::new(path)?));
    }
    if path.is_file() {
        let lower = location.to_ascii_lowercase();
        if lower.ends_with(".tar") || lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            return Ok(Box::new(TarArchive::open(&path)?));
        }
        return Err(StorageError::Unsupported(location.to_string()));
    }
    Err(StorageError::CrateNotFound(location.to_string()))
}

/// Normalize a crate-relative path into `a/b/c` form.
///
/// The crate root normalizes to the empty string.
pub fn normalize_path(path: &str) -> Result<String, StorageError> {
    let decoded = percent_decode(path);
    let mut parts: Vec<&str> = Vec::new();
    for seg in decoded.split(['/', '\\']) {
        match seg {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(StorageError::InvalidPath(path.to_string()));
                }
            }
            s => parts.push(s),
        }
    }
    Ok(parts.join("/"))
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(b) = decoded {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| s.to_string())
}

/// A crate unpacked in a local directory.
pub struct LocalDirectory {
    root: PathBuf,
    label: String,
}

impl LocalDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StorageError::CrateNotFound(root.to_string_lossy().to_string()));
        }
        let label = root.to_string_lossy().to_string();
        Ok(LocalDirectory { root, label })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let rel = normalize_path(path)?;
        Ok(if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        })
    }
}

impl CrateStorage for LocalDirectory {
    fn location(&self) -> &str {
        &self.label
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.exists()).unwrap_or(false)
    }

    fn is_directory(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_dir()).unwrap_or(false)
    }

    fn size(&self, path: &str) -> Result<u64, StorageError> {
        let p = self.resolve(path)?;
        let meta = fs::metadata(&p).map_err(|e| io_error(path, e))?;
        if !meta.is_file() {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(meta.len())
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let p = self.resolve(path)?;
        if !p.is_file() {
            return Err(StorageError::NotFound(path.to_string()));
        }
        fs::read(&p).map_err(|e| io_error(path, e))
    }
}

fn io_error(path: &str, source: std::io::Error) -> StorageError {
    if source.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(path.to_string())
    } else {
        StorageError::Io {
            path: path.to_string(),
            source,
        }
    }
}

/// An in-memory crate. Directories are implied by file paths and may also
/// be declared explicitly.
#[derive(Default)]
pub struct MemoryCrate {
    label: String,
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl MemoryCrate {
    pub fn new(label: impl Into<String>) -> Self {
        MemoryCrate {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Add a file; parent directories are registered implicitly.
    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.insert_file(path, content.into());
        self
    }

    pub fn with_dir(mut self, path: &str) -> Self {
        if let Ok(p) = normalize_path(path) {
            self.insert_dir(&p);
        }
        self
    }

    fn insert_file(&mut self, path: &str, content: Vec<u8>) {
        if let Ok(p) = normalize_path(path) {
            if let Some((parent, _)) = p.rsplit_once('/') {
                self.insert_dir(parent);
            }
            self.files.insert(p, content);
        }
    }

    fn insert_dir(&mut self, path: &str) {
        let mut cur = String::new();
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            if !cur.is_empty() {
                cur.push('/');
            }
            cur.push_str(seg);
            self.dirs.insert(cur.clone());
        }
    }

    fn lookup(&self, path: &str) -> Option<&Vec<u8>> {
        normalize_path(path).ok().and_then(|p| self.files.get(&p))
    }
}

impl CrateStorage for MemoryCrate {
    fn location(&self) -> &str {
        &self.label
    }

    fn exists(&self, path: &str) -> bool {
        self.lookup(path).is_some() || self.is_directory(path)
    }

    fn is_directory(&self, path: &str) -> bool {
        match normalize_path(path) {
            Ok(p) if p.is_empty() => true,
            Ok(p) => self.dirs.contains(&p),
            Err(_) => false,
        }
    }

    fn size(&self, path: &str) -> Result<u64, StorageError> {
        self.lookup(path)
            .map(|b| b.len() as u64)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.lookup(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}

/// A crate packed as a local tar archive, indexed fully in memory on open.
///
/// When every entry lives under one top-level folder holding the metadata
/// descriptor, that folder is treated as the crate root.
pub struct TarArchive {
    inner: MemoryCrate,
}

impl TarArchive {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let label = path.to_string_lossy().to_string();
        let file = fs::File::open(path).map_err(|e| StorageError::Io {
            path: label.clone(),
            source: e,
        })?;
        let lower = label.to_ascii_lowercase();
        let reader: Box<dyn Read> = if lower.ends_with(".gz") || lower.ends_with(".tgz") {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let mut raw_files: Vec<(String, Vec<u8>)> = Vec::new();
        let mut raw_dirs: Vec<String> = Vec::new();
        let mut archive = tar::Archive::new(reader);
        let entries = archive.entries().map_err(|e| StorageError::Io {
            path: label.clone(),
            source: e,
        })?;
        for entry in entries {
            let mut entry = entry.map_err(|e| StorageError::Io {
                path: label.clone(),
                source: e,
            })?;
            let name = match entry.path() {
                Ok(p) => p.to_string_lossy().to_string(),
                Err(_) => continue,
            };
            let Ok(name) = normalize_path(&name) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            let kind = entry.header().entry_type();
            if kind.is_dir() {
                raw_dirs.push(name);
            } else if kind.is_file() {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf).map_err(|e| StorageError::Io {
                    path: name.clone(),
                    source: e,
                })?;
                raw_files.push((name, buf));
            }
        }

        let prefix = common_top_folder(&raw_files);
        let strip = |p: &str| -> String {
            match &prefix {
                Some(pre) => p
                    .strip_prefix(pre.as_str())
                    .map(|rest| rest.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| p.to_string()),
                None => p.to_string(),
            }
        };
        let mut inner = MemoryCrate::new(label);
        for d in raw_dirs {
            let d = strip(&d);
            if !d.is_empty() {
                inner.insert_dir(&d);
            }
        }
        for (name, content) in raw_files {
            inner.insert_file(&strip(&name), content);
        }
        tracing::debug!(
            files = inner.files.len(),
            root_prefix = prefix.as_deref().unwrap_or(""),
            "indexed tar archive"
        );
        Ok(TarArchive { inner })
    }
}

fn common_top_folder(files: &[(String, Vec<u8>)]) -> Option<String> {
    let mut top: Option<&str> = None;
    for (name, _) in files {
        let (first, _) = name.split_once('/')?;
        match top {
            None => top = Some(first),
            Some(t) if t == first => {}
            Some(_) => return None,
        }
    }
    let top = top?;
    let descriptor = format!("{}/{}", top, crate::context::DESCRIPTOR_FILE);
    files
        .iter()
        .any(|(name, _)| *name == descriptor)
        .then(|| top.to_string())
}

impl CrateStorage for TarArchive {
    fn location(&self) -> &str {
        self.inner.location()
    }

    fn exists(&self, path: &str) -> bool {
        self.inner.exists(path)
    }

    fn is_directory(&self, path: &str) -> bool {
        self.inner.is_directory(path)
    }

    fn size(&self, path: &str) -> Result<u64, StorageError> {
        self.inner.size(path)
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.read_bytes(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::tempdir;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./").unwrap(), "");
        assert_eq!(normalize_path("./data/a.txt").unwrap(), "data/a.txt");
        assert_eq!(normalize_path("data/../b.txt").unwrap(), "b.txt");
        assert_eq!(normalize_path("my%20file.txt").unwrap(), "my file.txt");
        assert!(normalize_path("../outside").is_err());
    }

    #[test]
    fn test_local_directory_backend() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/x.csv"), b"a,b\n").unwrap();
        let st = LocalDirectory::new(dir.path()).unwrap();
        assert!(st.exists("./data/x.csv"));
        assert!(st.is_directory("data/"));
        assert!(!st.is_directory("data/x.csv"));
        assert_eq!(st.size("data/x.csv").unwrap(), 4);
        assert_eq!(st.read_text("data/x.csv").unwrap(), "a,b\n");
        assert!(matches!(
            st.read_bytes("missing.txt"),
            Err(StorageError::NotFound(_))
        ));
        assert!(!st.exists("../etc/passwd"));
    }

    #[test]
    fn test_memory_crate_implies_directories() {
        let st = MemoryCrate::new("mem").with_file("a/b/c.txt", "hi").with_dir("empty/");
        assert!(st.is_directory("a"));
        assert!(st.is_directory("a/b/"));
        assert!(st.is_directory("empty"));
        assert!(st.is_directory("./"));
        assert_eq!(st.size("a/b/c.txt").unwrap(), 2);
        assert!(!st.exists("a/c.txt"));
    }

    #[test]
    fn test_tar_gz_archive_strips_single_top_folder() {
        let dir = tempdir().unwrap();
        let tgz = dir.path().join("crate.tar.gz");
        {
            let file = fs::File::create(&tgz).unwrap();
            let enc = GzEncoder::new(file, Compression::default());
            let mut builder = tar::Builder::new(enc);
            let body = b"{}";
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "mycrate/ro-crate-metadata.json", &body[..])
                .unwrap();
            let data = b"x";
            let mut h2 = tar::Header::new_gnu();
            h2.set_size(1);
            h2.set_mode(0o644);
            h2.set_cksum();
            builder
                .append_data(&mut h2, "mycrate/data/file.txt", &data[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }
        let st = open_crate(tgz.to_str().unwrap()).unwrap();
        assert!(st.exists("ro-crate-metadata.json"));
        assert!(st.is_directory("data"));
        assert_eq!(st.read_text("data/file.txt").unwrap(), "x");
    }

    #[test]
    fn test_open_crate_rejects_remote_and_missing() {
        assert!(matches!(
            open_crate("https://example.org/crate.zip"),
            Err(StorageError::Unsupported(_))
        ));
        assert!(matches!(
            open_crate("/definitely/not/here"),
            Err(StorageError::CrateNotFound(_))
        ));
    }
}
