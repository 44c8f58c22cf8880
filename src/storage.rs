//! Storage adapters over a hierarchical vault namespace.
//!
//! The harness never touches the filesystem directly; everything goes
//! through [`VaultStorage`]. Paths are `/`-separated keys relative to the
//! adapter root. Adapters that cannot list or remove recursively return
//! [`StorageError::Unsupported`] and callers degrade to no-ops.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Errors from storage adapter operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Not a folder: {0}")]
    NotAFolder(String),

    #[error("Path escapes the permitted root: {0}")]
    PathEscape(String),

    #[error("Adapter does not support {0}")]
    Unsupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Direct children of a folder, as full vault paths.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub files: Vec<String>,
    pub folders: Vec<String>,
}

/// Key-path storage over a hierarchical namespace.
///
/// `list` and `remove_recursive` are optional capabilities; the default
/// implementations report [`StorageError::Unsupported`].
pub trait VaultStorage: Send + Sync {
    fn exists(&self, path: &str) -> Result<bool, StorageError>;
    fn read(&self, path: &str) -> Result<String, StorageError>;
    fn write(&self, path: &str, text: &str) -> Result<(), StorageError>;
    /// Creates a folder. Pre-existing folders are not an error.
    fn create_folder(&self, path: &str) -> Result<(), StorageError>;
    /// Removes a single file or an empty folder.
    fn remove(&self, path: &str) -> Result<(), StorageError>;

    fn list(&self, _path: &str) -> Result<Listing, StorageError> {
        Err(StorageError::Unsupported("list"))
    }

    fn remove_recursive(&self, _path: &str) -> Result<(), StorageError> {
        Err(StorageError::Unsupported("remove_recursive"))
    }
}

/// Returns the parent key of a path, or `None` at the root.
pub fn parent(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(dir, _)| dir)
}

/// Joins two vault keys, treating the empty string as the root.
pub fn join(base: &str, rest: &str) -> String {
    if base.is_empty() {
        rest.to_string()
    } else if rest.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, rest)
    }
}

/// Reads every file under `root` into a map keyed by root-relative path.
///
/// Adapters without listing support, and missing roots, yield an empty
/// tree rather than an error.
pub fn read_tree(
    storage: &dyn VaultStorage,
    root: &str,
) -> Result<BTreeMap<String, String>, StorageError> {
    let mut tree = BTreeMap::new();
    let prefix = if root.is_empty() {
        String::new()
    } else {
        format!("{}/", root)
    };
    let mut pending = vec![root.to_string()];
    while let Some(folder) = pending.pop() {
        let listing = match storage.list(&folder) {
            Ok(listing) => listing,
            Err(StorageError::Unsupported(_)) | Err(StorageError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        };
        for file in listing.files {
            let content = storage.read(&file)?;
            let rel = file.strip_prefix(&prefix).unwrap_or(&file).to_string();
            tree.insert(rel, content);
        }
        pending.extend(listing.folders);
    }
    Ok(tree)
}

/// Creates `path` and every missing ancestor folder.
pub fn create_folders(storage: &dyn VaultStorage, path: &str) -> Result<(), StorageError> {
    let mut chain = Vec::new();
    let mut current = Some(path);
    while let Some(dir) = current {
        if dir.is_empty() {
            break;
        }
        chain.push(dir);
        current = parent(dir);
    }
    for dir in chain.into_iter().rev() {
        storage.create_folder(dir)?;
    }
    Ok(())
}

fn validate_relative(path: &str) -> Result<(), StorageError> {
    if path.starts_with('/') || path.split('/').any(|c| c == "..") {
        return Err(StorageError::PathEscape(path.to_string()));
    }
    Ok(())
}

#[derive(Default)]
struct MemoryState {
    files: BTreeMap<String, String>,
    folders: BTreeSet<String>,
}

/// In-memory vault, primarily for tests and dry runs.
#[derive(Default)]
pub struct MemoryVault {
    state: Mutex<MemoryState>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the vault with a set of files.
    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let vault = Self::new();
        for (path, content) in files {
            vault.write(&path.into(), &content.into()).ok();
        }
        vault
    }

    fn register_ancestors(state: &mut MemoryState, path: &str) {
        let mut current = parent(path);
        while let Some(dir) = current {
            if !dir.is_empty() {
                state.folders.insert(dir.to_string());
            }
            current = parent(dir);
        }
    }
}

impl VaultStorage for MemoryVault {
    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(path.is_empty()
            || state.files.contains_key(path)
            || state.folders.contains(path))
    }

    fn read(&self, path: &str) -> Result<String, StorageError> {
        let state = self.state.lock().unwrap();
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    fn write(&self, path: &str, text: &str) -> Result<(), StorageError> {
        validate_relative(path)?;
        let mut state = self.state.lock().unwrap();
        if state.folders.contains(path) {
            return Err(StorageError::Other(format!(
                "Cannot write file over folder: {}",
                path
            )));
        }
        Self::register_ancestors(&mut state, path);
        state.files.insert(path.to_string(), text.to_string());
        Ok(())
    }

    fn create_folder(&self, path: &str) -> Result<(), StorageError> {
        validate_relative(path)?;
        let mut state = self.state.lock().unwrap();
        if state.files.contains_key(path) {
            return Err(StorageError::Other(format!(
                "Cannot create folder over file: {}",
                path
            )));
        }
        Self::register_ancestors(&mut state, path);
        if !path.is_empty() {
            state.folders.insert(path.to_string());
        }
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        if state.files.remove(path).is_some() {
            return Ok(());
        }
        if state.folders.contains(path) {
            let prefix = format!("{}/", path);
            let occupied = state.files.keys().any(|f| f.starts_with(&prefix))
                || state.folders.iter().any(|f| f.starts_with(&prefix));
            if occupied {
                return Err(StorageError::Other(format!("Folder not empty: {}", path)));
            }
            state.folders.remove(path);
            return Ok(());
        }
        Err(StorageError::NotFound(path.to_string()))
    }

    fn list(&self, path: &str) -> Result<Listing, StorageError> {
        let state = self.state.lock().unwrap();
        if state.files.contains_key(path) {
            return Err(StorageError::NotAFolder(path.to_string()));
        }
        if !path.is_empty() && !state.folders.contains(path) {
            return Err(StorageError::NotFound(path.to_string()));
        }
        let is_child = |candidate: &str| parent(candidate).unwrap_or("") == path;
        Ok(Listing {
            files: state.files.keys().filter(|f| is_child(f)).cloned().collect(),
            folders: state
                .folders
                .iter()
                .filter(|f| is_child(f))
                .cloned()
                .collect(),
        })
    }

    fn remove_recursive(&self, path: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        let prefix = format!("{}/", path);
        state
            .files
            .retain(|f, _| f != path && !f.starts_with(&prefix));
        state
            .folders
            .retain(|f| f != path && !f.starts_with(&prefix));
        Ok(())
    }
}

/// Filesystem-backed vault rooted at a directory.
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        validate_relative(path)?;
        Ok(self.root.join(path))
    }
}

impl VaultStorage for FsVault {
    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.resolve(path)?.exists())
    }

    fn read(&self, path: &str) -> Result<String, StorageError> {
        let full = self.resolve(path)?;
        std::fs::read_to_string(&full).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path.to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }

    fn write(&self, path: &str, text: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        if let Some(dir) = full.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&full, text)?;
        Ok(())
    }

    fn create_folder(&self, path: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(self.resolve(path)?)?;
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            std::fs::remove_dir(&full)?;
        } else {
            std::fs::remove_file(&full).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StorageError::NotFound(path.to_string())
                } else {
                    StorageError::Io(e)
                }
            })?;
        }
        Ok(())
    }

    fn list(&self, path: &str) -> Result<Listing, StorageError> {
        let full = self.resolve(path)?;
        if full.is_file() {
            return Err(StorageError::NotAFolder(path.to_string()));
        }
        if !full.exists() {
            return Err(StorageError::NotFound(path.to_string()));
        }
        let mut listing = Listing::default();
        for entry in std::fs::read_dir(&full)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let key = join(path, &name);
            if entry.path().is_dir() {
                listing.folders.push(key);
            } else {
                listing.files.push(key);
            }
        }
        listing.files.sort();
        listing.folders.sort();
        Ok(listing)
    }

    fn remove_recursive(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            std::fs::remove_dir_all(&full)?;
        } else if full.exists() {
            std::fs::remove_file(&full)?;
        }
        Ok(())
    }
}

/// A storage handle restricted to a subtree of another vault.
///
/// Handed to agent drivers so that a case can only mutate the active
/// sandbox root, whatever permissions the outer adapter carries.
pub struct ScopedVault {
    inner: Arc<dyn VaultStorage>,
    root: String,
}

impl ScopedVault {
    pub fn new(inner: Arc<dyn VaultStorage>, root: impl Into<String>) -> Self {
        Self {
            inner,
            root: root.into(),
        }
    }

    fn full(&self, path: &str) -> Result<String, StorageError> {
        validate_relative(path)?;
        Ok(join(&self.root, path))
    }
}

impl VaultStorage for ScopedVault {
    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        self.inner.exists(&self.full(path)?)
    }

    fn read(&self, path: &str) -> Result<String, StorageError> {
        self.inner.read(&self.full(path)?)
    }

    fn write(&self, path: &str, text: &str) -> Result<(), StorageError> {
        self.inner.write(&self.full(path)?, text)
    }

    fn create_folder(&self, path: &str) -> Result<(), StorageError> {
        self.inner.create_folder(&self.full(path)?)
    }

    fn remove(&self, path: &str) -> Result<(), StorageError> {
        self.inner.remove(&self.full(path)?)
    }

    fn list(&self, path: &str) -> Result<Listing, StorageError> {
        let full = self.full(path)?;
        let listing = self.inner.list(&full)?;
        let strip = |p: String| {
            p.strip_prefix(&format!("{}/", self.root))
                .map(str::to_string)
                .unwrap_or(p)
        };
        Ok(Listing {
            files: listing.files.into_iter().map(strip).collect(),
            folders: listing.folders.into_iter().map(strip).collect(),
        })
    }

    fn remove_recursive(&self, path: &str) -> Result<(), StorageError> {
        self.inner.remove_recursive(&self.full(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_vault_roundtrip() {
        let vault = MemoryVault::new();
        vault.write("notes/a.md", "hello").unwrap();

        assert!(vault.exists("notes/a.md").unwrap());
        assert!(vault.exists("notes").unwrap());
        assert_eq!(vault.read("notes/a.md").unwrap(), "hello");
        assert!(matches!(
            vault.read("notes/missing.md"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_memory_vault_list_direct_children_only() {
        let vault = MemoryVault::with_files([
            ("a.md", "1"),
            ("dir/b.md", "2"),
            ("dir/sub/c.md", "3"),
        ]);

        let root = vault.list("").unwrap();
        assert_eq!(root.files, vec!["a.md"]);
        assert_eq!(root.folders, vec!["dir"]);

        let dir = vault.list("dir").unwrap();
        assert_eq!(dir.files, vec!["dir/b.md"]);
        assert_eq!(dir.folders, vec!["dir/sub"]);
    }

    #[test]
    fn test_memory_vault_list_file_is_not_a_folder() {
        let vault = MemoryVault::with_files([("a.md", "1")]);
        assert!(matches!(
            vault.list("a.md"),
            Err(StorageError::NotAFolder(_))
        ));
    }

    #[test]
    fn test_memory_vault_remove_recursive() {
        let vault = MemoryVault::with_files([("dir/a.md", "1"), ("dir/sub/b.md", "2"), ("keep.md", "3")]);
        vault.remove_recursive("dir").unwrap();

        assert!(!vault.exists("dir").unwrap());
        assert!(!vault.exists("dir/sub/b.md").unwrap());
        assert!(vault.exists("keep.md").unwrap());
    }

    #[test]
    fn test_scoped_vault_confined_to_root() {
        let inner = Arc::new(MemoryVault::new());
        inner.write("outside.md", "secret").unwrap();

        let scoped = ScopedVault::new(inner.clone(), "bench/active");
        scoped.write("note.md", "inside").unwrap();

        assert_eq!(inner.read("bench/active/note.md").unwrap(), "inside");
        assert!(matches!(
            scoped.read("../../outside.md"),
            Err(StorageError::PathEscape(_))
        ));
        assert!(matches!(
            scoped.write("/outside.md", "x"),
            Err(StorageError::PathEscape(_))
        ));
    }

    #[test]
    fn test_scoped_vault_list_strips_prefix() {
        let inner = Arc::new(MemoryVault::with_files([("root/a.md", "1"), ("root/d/b.md", "2")]));
        let scoped = ScopedVault::new(inner, "root");

        let listing = scoped.list("").unwrap();
        assert_eq!(listing.files, vec!["a.md"]);
        assert_eq!(listing.folders, vec!["d"]);
    }

    #[test]
    fn test_fs_vault_roundtrip() {
        let temp = tempfile::TempDir::new().unwrap();
        let vault = FsVault::new(temp.path());

        vault.write("dir/file.md", "content").unwrap();
        assert!(vault.exists("dir/file.md").unwrap());
        assert_eq!(vault.read("dir/file.md").unwrap(), "content");

        let listing = vault.list("dir").unwrap();
        assert_eq!(listing.files, vec!["dir/file.md"]);

        vault.remove_recursive("dir").unwrap();
        assert!(!vault.exists("dir").unwrap());
    }

    #[test]
    fn test_fs_vault_rejects_escape() {
        let temp = tempfile::TempDir::new().unwrap();
        let vault = FsVault::new(temp.path());
        assert!(matches!(
            vault.write("../escape.md", "x"),
            Err(StorageError::PathEscape(_))
        ));
    }

    #[test]
    fn test_read_tree_relative_keys() {
        let vault = MemoryVault::with_files([
            ("bench/active/a.md", "1"),
            ("bench/active/dir/b.md", "2"),
            ("bench/runs/x/c.md", "3"),
        ]);
        let tree = read_tree(&vault, "bench/active").unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree["a.md"], "1");
        assert_eq!(tree["dir/b.md"], "2");
    }

    #[test]
    fn test_read_tree_missing_root_is_empty() {
        let vault = MemoryVault::new();
        assert!(read_tree(&vault, "nope").unwrap().is_empty());
    }

    #[test]
    fn test_create_folders_builds_chain() {
        let vault = MemoryVault::new();
        create_folders(&vault, "a/b/c").unwrap();
        assert!(vault.exists("a").unwrap());
        assert!(vault.exists("a/b").unwrap());
        assert!(vault.exists("a/b/c").unwrap());
        // Idempotent on a second pass.
        create_folders(&vault, "a/b/c").unwrap();
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(parent("a/b/c.md"), Some("a/b"));
        assert_eq!(parent("c.md"), None);
        assert_eq!(join("", "a.md"), "a.md");
        assert_eq!(join("dir", "a.md"), "dir/a.md");
    }
}
