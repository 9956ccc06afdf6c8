//! Filesystem adapter.
//!
//! The build reads sources and writes output only through [`Filesystem`], so
//! the same pipeline runs against the real disk ([`LocalFs`]) or a virtual
//! tree held in memory ([`InMemoryFs`], used for previews and tests).
//! Directory existence in the virtual tree is synthetic: a directory exists
//! when some file lives beneath it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot list {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("file is not valid UTF-8: {0}")]
    Utf8(PathBuf),
    #[error("cannot compile stylesheet {path}: {message}")]
    Stylesheet { path: PathBuf, message: String },
}

impl FsError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        FsError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub trait Filesystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// Direct children of `dir`, sorted by name.
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError>;

    fn read_text(&self, path: &Path) -> Result<String, FsError>;

    fn read_binary(&self, path: &Path) -> Result<Vec<u8>, FsError>;

    /// Write a file, creating parent directories as needed.
    fn write(&self, path: &Path, contents: &[u8]) -> Result<(), FsError>;

    /// Remove a file or a whole directory. Missing paths are not an error.
    fn remove(&self, path: &Path) -> Result<(), FsError>;

    /// CSS for a stylesheet source. Plain `.css` passes through; SCSS needs
    /// an adapter that can compile it.
    fn compile_stylesheet(&self, path: &Path) -> Result<String, FsError> {
        let is_css = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("css"));
        if is_css {
            self.read_text(path)
        } else {
            Err(FsError::Stylesheet {
                path: path.to_path_buf(),
                message: "no SCSS compiler available".into(),
            })
        }
    }

    /// Sitemap XML for `paths` (site-relative, starting with `/`).
    fn generate_sitemap(&self, paths: &[String], base_url: &str) -> String {
        crate::sitemap::render(paths, base_url)
    }
}

// ============================================================================
// Local disk
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl Filesystem for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError> {
        WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .map(|entry| {
                entry.map(|e| e.into_path()).map_err(|source| FsError::Walk {
                    path: dir.to_path_buf(),
                    source,
                })
            })
            .collect()
    }

    fn read_text(&self, path: &Path) -> Result<String, FsError> {
        let bytes = self.read_binary(path)?;
        String::from_utf8(bytes).map_err(|_| FsError::Utf8(path.to_path_buf()))
    }

    fn read_binary(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        std::fs::read(path).map_err(|e| FsError::io(path, e))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<(), FsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FsError::io(parent, e))?;
        }
        std::fs::write(path, contents).map_err(|e| FsError::io(path, e))
    }

    fn remove(&self, path: &Path) -> Result<(), FsError> {
        if path.is_dir() {
            std::fs::remove_dir_all(path).map_err(|e| FsError::io(path, e))
        } else if path.exists() {
            std::fs::remove_file(path).map_err(|e| FsError::io(path, e))
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// In memory
// ============================================================================

/// A virtual tree of files keyed by normalized path.
#[derive(Debug, Default)]
pub struct InMemoryFs {
    files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl AsRef<Path>, contents: &str) -> Self {
        if let Ok(mut files) = self.files.write() {
            files.insert(normalize(path.as_ref()), contents.as_bytes().to_vec());
        }
        self
    }

    /// Every stored file path, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files
            .read()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Drop `.` components so `./src/a` and `src/a` name the same file.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

impl Filesystem for InMemoryFs {
    fn exists(&self, path: &Path) -> bool {
        let key = normalize(path);
        self.files
            .read()
            .map(|f| f.contains_key(&key))
            .unwrap_or(false)
            || self.is_dir(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        let key = normalize(path);
        self.files
            .read()
            .map(|f| f.keys().any(|k| k != &key && k.starts_with(&key)))
            .unwrap_or(false)
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError> {
        let key = normalize(dir);
        let files = self
            .files
            .read()
            .map_err(|_| FsError::NotFound(dir.to_path_buf()))?;
        let children: BTreeSet<PathBuf> = files
            .keys()
            .filter_map(|k| k.strip_prefix(&key).ok())
            .filter_map(|rest| rest.components().next())
            .map(|first| dir.join(first.as_os_str()))
            .collect();
        Ok(children.into_iter().collect())
    }

    fn read_text(&self, path: &Path) -> Result<String, FsError> {
        let bytes = self.read_binary(path)?;
        String::from_utf8(bytes).map_err(|_| FsError::Utf8(path.to_path_buf()))
    }

    fn read_binary(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        self.files
            .read()
            .ok()
            .and_then(|f| f.get(&normalize(path)).cloned())
            .ok_or_else(|| FsError::NotFound(path.to_path_buf()))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<(), FsError> {
        let mut files = self
            .files
            .write()
            .map_err(|_| FsError::NotFound(path.to_path_buf()))?;
        files.insert(normalize(path), contents.to_vec());
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), FsError> {
        let key = normalize(path);
        if let Ok(mut files) = self.files.write() {
            files.retain(|k, _| !k.starts_with(&key));
        }
        Ok(())
    }
}
